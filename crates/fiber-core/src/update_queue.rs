//! Prioritized update queues shared by the root and by state hooks.
//!
//! Dispatchers append to a shared pending list. Each render folds the pending
//! updates into its own copy of the queue, so a discarded pass never loses an
//! update: the committed copy still knows which updates it has consumed.

use std::cell::RefCell;
use std::rc::Rc;

use crate::expiration::ExpirationTime;

#[derive(Clone, Debug)]
pub(crate) struct Update<A> {
    pub(crate) expiration_time: ExpirationTime,
    seq: u64,
    pub(crate) action: A,
}

struct SharedQueue<A> {
    pending: Vec<Update<A>>,
    next_seq: u64,
}

/// Enqueue side of an [`UpdateQueue`], held by dispatchers.
pub(crate) struct QueueHandle<A> {
    shared: Rc<RefCell<SharedQueue<A>>>,
}

impl<A> Clone for QueueHandle<A> {
    fn clone(&self) -> Self {
        Self {
            shared: Rc::clone(&self.shared),
        }
    }
}

impl<A> QueueHandle<A> {
    pub(crate) fn enqueue(&self, expiration_time: ExpirationTime, action: A) {
        let mut shared = self.shared.borrow_mut();
        shared.next_seq += 1;
        let seq = shared.next_seq;
        shared.pending.push(Update {
            expiration_time,
            seq,
            action,
        });
    }
}

pub(crate) struct Processed<S> {
    pub(crate) state: S,
    /// Most urgent expiration among updates that were skipped.
    pub(crate) remaining: ExpirationTime,
}

pub(crate) struct UpdateQueue<S, A> {
    base_state: S,
    base_queue: Vec<Update<A>>,
    consumed_through: u64,
    /// Updates at or below this sequence are folded into a committed copy.
    committed_through: u64,
    shared: Rc<RefCell<SharedQueue<A>>>,
}

impl<S: Clone, A: Clone> Clone for UpdateQueue<S, A> {
    fn clone(&self) -> Self {
        Self {
            base_state: self.base_state.clone(),
            base_queue: self.base_queue.clone(),
            consumed_through: self.consumed_through,
            committed_through: self.committed_through,
            shared: Rc::clone(&self.shared),
        }
    }
}

impl<S: Clone, A: Clone> UpdateQueue<S, A> {
    pub(crate) fn new(initial: S) -> Self {
        Self {
            base_state: initial,
            base_queue: Vec::new(),
            consumed_through: 0,
            committed_through: 0,
            shared: Rc::new(RefCell::new(SharedQueue {
                pending: Vec::new(),
                next_seq: 0,
            })),
        }
    }

    pub(crate) fn handle(&self) -> QueueHandle<A> {
        QueueHandle {
            shared: Rc::clone(&self.shared),
        }
    }

    /// Work copy of a committed queue. Only what the committed copy consumed
    /// may be pruned from the shared list while the copy is processed.
    pub(crate) fn fork(&self) -> Self {
        let mut copy = self.clone();
        copy.committed_through = self.consumed_through;
        copy
    }

    #[cfg(test)]
    pub(crate) fn base_state(&self) -> &S {
        &self.base_state
    }

    #[cfg(test)]
    pub(crate) fn pending_len(&self) -> usize {
        self.shared.borrow().pending.len()
    }

    /// Folds pending updates into this copy and reduces every update that
    /// `render_time` includes.
    ///
    /// Once an update is skipped, the base state freezes and every later
    /// update stays in the base queue so the next pass replays them in order.
    pub(crate) fn process(
        &mut self,
        render_time: ExpirationTime,
        mut reduce: impl FnMut(&S, &A) -> S,
    ) -> Processed<S> {
        let incoming = {
            let mut shared = self.shared.borrow_mut();
            let committed = self.committed_through;
            shared.pending.retain(|update| update.seq > committed);
            let consumed = self.consumed_through;
            shared
                .pending
                .iter()
                .filter(|update| update.seq > consumed)
                .cloned()
                .collect::<Vec<_>>()
        };
        if let Some(last) = incoming.last() {
            self.consumed_through = last.seq;
        }

        let mut queue = std::mem::take(&mut self.base_queue);
        queue.extend(incoming);

        let mut state = self.base_state.clone();
        let mut frozen_base: Option<S> = None;
        let mut remaining = ExpirationTime::NO_WORK;
        for update in queue {
            if !render_time.includes(update.expiration_time) {
                if frozen_base.is_none() {
                    frozen_base = Some(state.clone());
                }
                remaining = remaining.more_urgent(update.expiration_time);
                self.base_queue.push(update);
                continue;
            }
            state = reduce(&state, &update.action);
            if frozen_base.is_some() {
                // already applied once, so the replay must not be skipped again
                self.base_queue.push(Update {
                    expiration_time: ExpirationTime::SYNC,
                    ..update
                });
            }
        }

        self.base_state = frozen_base.unwrap_or_else(|| state.clone());
        Processed { state, remaining }
    }
}

#[cfg(test)]
#[path = "tests/update_queue_tests.rs"]
mod tests;
