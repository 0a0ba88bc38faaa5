//! Per-component persistent state: state, reducer, effect, callback, memo and ref hooks.
//!
//! A component receives a [`Hooks`] cursor while it renders. Each call
//! consumes the next slot, so hooks must be called in the same order on every
//! render. The committed slots are read, a fresh list is written, and the
//! fresh list becomes the fiber's hook state when the pass finishes.

use std::any::Any;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::element::{ComponentType, Element, Props};
use crate::error::RenderError;
use crate::expiration::ExpirationTime;
use crate::fiber::{FiberFlags, FiberId};
use crate::owned::Owned;
use crate::root::RootInner;
use crate::update_queue::{QueueHandle, UpdateQueue};

/// Render-phase self-updates allowed before a component is rejected.
pub const RE_RENDER_LIMIT: usize = 25;

bitflags::bitflags! {
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
    pub struct HookEffectFlags: u8 {
        const HAS_EFFECT = 1 << 0;
        const LAYOUT = 1 << 1;
        const PASSIVE = 1 << 2;
    }
}

/// Teardown returned by an effect.
#[derive(Default)]
pub struct Cleanup(Option<Box<dyn FnOnce()>>);

impl Cleanup {
    pub fn new(teardown: impl FnOnce() + 'static) -> Self {
        Cleanup(Some(Box::new(teardown)))
    }

    pub fn none() -> Self {
        Cleanup(None)
    }

    pub(crate) fn run(self) {
        if let Some(teardown) = self.0 {
            teardown();
        }
    }
}

impl From<()> for Cleanup {
    fn from(_: ()) -> Self {
        Cleanup::none()
    }
}

impl<F: FnOnce() + 'static> From<Option<F>> for Cleanup {
    fn from(value: Option<F>) -> Self {
        Cleanup(value.map(|teardown| Box::new(teardown) as Box<dyn FnOnce()>))
    }
}

impl fmt::Debug for Cleanup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(if self.0.is_some() { "Cleanup(Some)" } else { "Cleanup(None)" })
    }
}

/// Dependency marker that never compares equal, so the hook re-runs every render.
#[derive(Copy, Clone, Debug, Default)]
pub struct EveryRender;

impl PartialEq for EveryRender {
    fn eq(&self, _: &Self) -> bool {
        false
    }
}

pub(crate) type EffectCreate = Box<dyn FnOnce() -> Cleanup>;

#[derive(Clone)]
pub(crate) struct EffectHook {
    pub(crate) tag: HookEffectFlags,
    pub(crate) create: Owned<Option<EffectCreate>>,
    pub(crate) destroy: Owned<Option<Cleanup>>,
    deps: Rc<dyn Any>,
}

impl EffectHook {
    pub(crate) fn needs_commit(&self, kind: HookEffectFlags) -> bool {
        self.tag.contains(kind | HookEffectFlags::HAS_EFFECT)
    }
}

#[derive(Clone)]
pub(crate) struct MemoHook {
    value: Rc<dyn Any>,
    deps: Rc<dyn Any>,
}

pub(crate) trait ErasedState: Any {
    fn clone_box(&self) -> Box<dyn ErasedState>;
    fn as_any(&self) -> &dyn Any;
}

struct StateHook<S, A> {
    queue: UpdateQueue<S, A>,
}

impl<S: Clone + 'static, A: Clone + 'static> ErasedState for StateHook<S, A> {
    fn clone_box(&self) -> Box<dyn ErasedState> {
        Box::new(StateHook {
            queue: self.queue.clone(),
        })
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub(crate) enum Hook {
    State(Box<dyn ErasedState>),
    Effect(EffectHook),
    Memo(MemoHook),
    Ref(Rc<dyn Any>),
}

impl Clone for Hook {
    fn clone(&self) -> Self {
        match self {
            Hook::State(slot) => Hook::State(slot.clone_box()),
            Hook::Effect(effect) => Hook::Effect(effect.clone()),
            Hook::Memo(memo) => Hook::Memo(memo.clone()),
            Hook::Ref(cell) => Hook::Ref(Rc::clone(cell)),
        }
    }
}

impl Hook {
    fn kind(&self) -> &'static str {
        match self {
            Hook::State(_) => "state",
            Hook::Effect(_) => "effect",
            Hook::Memo(_) => "memo",
            Hook::Ref(_) => "ref",
        }
    }

    pub(crate) fn as_effect(&self) -> Option<&EffectHook> {
        match self {
            Hook::Effect(effect) => Some(effect),
            _ => None,
        }
    }
}

fn deps_equal<D: PartialEq + 'static>(previous: &Rc<dyn Any>, next: &D) -> bool {
    previous
        .downcast_ref::<D>()
        .is_some_and(|previous| previous == next)
}

struct DispatchTarget<A> {
    queue: QueueHandle<A>,
    fiber: FiberId,
    root: Weak<RootInner>,
}

/// Enqueues actions on a reducer hook and schedules its fiber.
///
/// Dispatching on a fiber that has since been deleted is ignored.
pub struct Dispatch<A> {
    target: Option<Rc<DispatchTarget<A>>>,
}

impl<A> Clone for Dispatch<A> {
    fn clone(&self) -> Self {
        Self {
            target: self.target.clone(),
        }
    }
}

impl<A> PartialEq for Dispatch<A> {
    fn eq(&self, other: &Self) -> bool {
        match (&self.target, &other.target) {
            (Some(a), Some(b)) => Rc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        }
    }
}

impl<A> fmt::Debug for Dispatch<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.target {
            Some(target) => write!(f, "Dispatch({:?})", target.fiber),
            None => f.write_str("Dispatch(inert)"),
        }
    }
}

impl<A: 'static> Dispatch<A> {
    fn inert() -> Self {
        Self { target: None }
    }

    pub fn dispatch(&self, action: A) -> Result<(), RenderError> {
        let Some(target) = &self.target else {
            return Ok(());
        };
        let Some(root) = target.root.upgrade() else {
            log::warn!("dispatch ignored: root was dropped");
            return Ok(());
        };
        let expiration = root.request_update_time(target.fiber);
        target.queue.enqueue(expiration, action);
        root.schedule_update_on_fiber(target.fiber, expiration)
    }
}

pub enum StateAction<T> {
    Set(T),
    Update(Rc<dyn Fn(&T) -> T>),
}

impl<T: Clone> Clone for StateAction<T> {
    fn clone(&self) -> Self {
        match self {
            StateAction::Set(value) => StateAction::Set(value.clone()),
            StateAction::Update(f) => StateAction::Update(Rc::clone(f)),
        }
    }
}

fn apply_state_action<T: Clone>(state: &T, action: StateAction<T>) -> T {
    match action {
        StateAction::Set(value) => value,
        StateAction::Update(f) => f(state),
    }
}

/// Setter returned by [`Hooks::use_state`].
pub struct SetState<T> {
    dispatch: Dispatch<StateAction<T>>,
}

impl<T> Clone for SetState<T> {
    fn clone(&self) -> Self {
        Self {
            dispatch: self.dispatch.clone(),
        }
    }
}

impl<T> PartialEq for SetState<T> {
    fn eq(&self, other: &Self) -> bool {
        self.dispatch == other.dispatch
    }
}

impl<T> fmt::Debug for SetState<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SetState({:?})", self.dispatch)
    }
}

impl<T: Clone + 'static> SetState<T> {
    pub fn set(&self, value: T) -> Result<(), RenderError> {
        self.dispatch.dispatch(StateAction::Set(value))
    }

    /// Queues `f` to run against the state it is processed on.
    pub fn update(&self, f: impl Fn(&T) -> T + 'static) -> Result<(), RenderError> {
        self.dispatch.dispatch(StateAction::Update(Rc::new(f)))
    }
}

struct ClientHooks<'a> {
    root: &'a Weak<RootInner>,
    fiber: FiberId,
    committed: &'a [Hook],
    /// Slots written by the previous attempt when re-rendering after a render-phase update.
    attempt: Option<&'a [Hook]>,
    next: Vec<Hook>,
    cursor: usize,
    render_time: ExpirationTime,
    remaining: ExpirationTime,
    flags: FiberFlags,
}

impl<'a> ClientHooks<'a> {
    fn claim(&mut self) -> usize {
        let index = self.cursor;
        self.cursor += 1;
        index
    }

    /// Slot to continue from; the previous attempt wins over the committed list.
    fn carried(&self, index: usize) -> Option<&'a Hook> {
        let committed: &'a [Hook] = self.committed;
        self.attempt
            .and_then(|slots| slots.get(index))
            .or_else(|| committed.get(index))
    }

    fn mismatch(&self, index: usize, expected: &'static str, found: &Hook) {
        log::warn!(
            "hook {index} changed from {} to {expected}; hooks must run in the same order every render",
            found.kind()
        );
    }

    fn reducer<S, A, R>(&mut self, reducer: R, init: impl FnOnce() -> S) -> (S, Dispatch<A>)
    where
        S: Clone + 'static,
        A: Clone + 'static,
        R: Fn(&S, A) -> S,
    {
        let index = self.claim();
        let from_attempt = self.attempt.is_some_and(|slots| index < slots.len());
        let previous = match self.carried(index) {
            Some(Hook::State(slot)) => slot
                .as_any()
                .downcast_ref::<StateHook<S, A>>()
                .map(|slot| {
                    if from_attempt {
                        slot.queue.clone()
                    } else {
                        slot.queue.fork()
                    }
                }),
            Some(other) => {
                self.mismatch(index, "state", other);
                None
            }
            None => None,
        };
        let mut queue = previous.unwrap_or_else(|| UpdateQueue::new(init()));
        let processed = queue.process(self.render_time, |state, action| {
            reducer(state, action.clone())
        });
        self.remaining = self.remaining.more_urgent(processed.remaining);
        let dispatch = Dispatch {
            target: Some(Rc::new(DispatchTarget {
                queue: queue.handle(),
                fiber: self.fiber,
                root: self.root.clone(),
            })),
        };
        self.next.push(Hook::State(Box::new(StateHook { queue })));
        (processed.state, dispatch)
    }

    fn effect<D: PartialEq + 'static>(
        &mut self,
        kind: HookEffectFlags,
        fiber_flag: FiberFlags,
        create: EffectCreate,
        deps: D,
    ) {
        let index = self.claim();
        let committed: &'a [Hook] = self.committed;
        let previous = match committed.get(index) {
            Some(Hook::Effect(effect)) => Some(effect.clone()),
            Some(other) => {
                self.mismatch(index, "effect", other);
                None
            }
            None => None,
        };
        let destroy = previous
            .as_ref()
            .map(|effect| effect.destroy.clone())
            .unwrap_or_else(|| Owned::new(None));
        let unchanged = previous
            .as_ref()
            .is_some_and(|effect| deps_equal(&effect.deps, &deps));
        let (tag, create) = if unchanged {
            (kind, None)
        } else {
            self.flags |= fiber_flag;
            (kind | HookEffectFlags::HAS_EFFECT, Some(create))
        };
        self.next.push(Hook::Effect(EffectHook {
            tag,
            create: Owned::new(create),
            destroy,
            deps: Rc::new(deps),
        }));
    }

    fn memo<T: 'static, D: PartialEq + 'static>(
        &mut self,
        compute: impl FnOnce() -> T,
        deps: D,
    ) -> Rc<T> {
        let index = self.claim();
        match self.carried(index) {
            Some(Hook::Memo(memo)) if deps_equal(&memo.deps, &deps) => {
                if let Ok(value) = Rc::clone(&memo.value).downcast::<T>() {
                    self.next.push(Hook::Memo(memo.clone()));
                    return value;
                }
            }
            Some(Hook::Memo(_)) | None => {}
            Some(other) => self.mismatch(index, "memo", other),
        }
        let value = Rc::new(compute());
        self.next.push(Hook::Memo(MemoHook {
            value: Rc::clone(&value) as Rc<dyn Any>,
            deps: Rc::new(deps),
        }));
        value
    }

    fn reference<T: 'static>(&mut self, init: impl FnOnce() -> T) -> Owned<T> {
        let index = self.claim();
        let existing = match self.carried(index) {
            Some(Hook::Ref(cell)) => cell.downcast_ref::<Owned<T>>().cloned(),
            Some(other) => {
                self.mismatch(index, "ref", other);
                None
            }
            None => None,
        };
        let cell = existing.unwrap_or_else(|| Owned::new(init()));
        self.next.push(Hook::Ref(Rc::new(cell.clone())));
        cell
    }
}

enum HooksMode<'a> {
    Client(ClientHooks<'a>),
    /// Single pass with no persistence; setters are inert and effects never run.
    Server,
}

/// Hook cursor handed to a component for one render.
pub struct Hooks<'a> {
    mode: HooksMode<'a>,
}

impl<'a> Hooks<'a> {
    pub(crate) fn server() -> Hooks<'static> {
        Hooks {
            mode: HooksMode::Server,
        }
    }

    fn client(
        root: &'a Weak<RootInner>,
        fiber: FiberId,
        committed: &'a [Hook],
        attempt: Option<&'a [Hook]>,
        render_time: ExpirationTime,
    ) -> Self {
        Hooks {
            mode: HooksMode::Client(ClientHooks {
                root,
                fiber,
                committed,
                attempt,
                next: Vec::with_capacity(committed.len()),
                cursor: 0,
                render_time,
                remaining: ExpirationTime::NO_WORK,
                flags: FiberFlags::empty(),
            }),
        }
    }

    fn finish(self) -> HookOutput {
        match self.mode {
            HooksMode::Client(hooks) => HookOutput {
                used: hooks.cursor,
                hooks: hooks.next,
                flags: hooks.flags,
                remaining: hooks.remaining,
            },
            HooksMode::Server => HookOutput {
                used: 0,
                hooks: Vec::new(),
                flags: FiberFlags::empty(),
                remaining: ExpirationTime::NO_WORK,
            },
        }
    }

    /// `true` while rendering on the server, where effects never run.
    pub fn is_server(&self) -> bool {
        matches!(self.mode, HooksMode::Server)
    }

    pub fn use_reducer<S, A, R>(&mut self, reducer: R, init: impl FnOnce() -> S) -> (S, Dispatch<A>)
    where
        S: Clone + 'static,
        A: Clone + 'static,
        R: Fn(&S, A) -> S,
    {
        match &mut self.mode {
            HooksMode::Client(hooks) => hooks.reducer(reducer, init),
            HooksMode::Server => (init(), Dispatch::inert()),
        }
    }

    /// Local state. `init` only runs when the slot is first created.
    pub fn use_state<T: Clone + 'static>(&mut self, init: impl FnOnce() -> T) -> (T, SetState<T>) {
        let (value, dispatch) = self.use_reducer(apply_state_action::<T>, init);
        (value, SetState { dispatch })
    }

    /// Runs `create` after the commit is painted, when `deps` changed.
    pub fn use_effect<C, D>(&mut self, create: impl FnOnce() -> C + 'static, deps: D)
    where
        C: Into<Cleanup>,
        D: PartialEq + 'static,
    {
        if let HooksMode::Client(hooks) = &mut self.mode {
            let create: EffectCreate = Box::new(move || create().into());
            hooks.effect(HookEffectFlags::PASSIVE, FiberFlags::PASSIVE, create, deps);
        }
    }

    /// Runs `create` synchronously during commit, when `deps` changed.
    pub fn use_layout_effect<C, D>(&mut self, create: impl FnOnce() -> C + 'static, deps: D)
    where
        C: Into<Cleanup>,
        D: PartialEq + 'static,
    {
        if let HooksMode::Client(hooks) = &mut self.mode {
            let create: EffectCreate = Box::new(move || create().into());
            hooks.effect(HookEffectFlags::LAYOUT, FiberFlags::UPDATE, create, deps);
        }
    }

    /// Returns the same `Rc` across renders while `deps` compare equal.
    pub fn use_callback<F: 'static, D: PartialEq + 'static>(&mut self, callback: F, deps: D) -> Rc<F> {
        match &mut self.mode {
            HooksMode::Client(hooks) => hooks.memo(move || callback, deps),
            HooksMode::Server => Rc::new(callback),
        }
    }

    pub fn use_memo<T: Clone + 'static, D: PartialEq + 'static>(
        &mut self,
        compute: impl FnOnce() -> T,
        deps: D,
    ) -> T {
        match &mut self.mode {
            HooksMode::Client(hooks) => T::clone(&hooks.memo(compute, deps)),
            HooksMode::Server => compute(),
        }
    }

    /// Mutable cell that survives re-renders; writing to it does not schedule work.
    pub fn use_ref<T: 'static>(&mut self, init: impl FnOnce() -> T) -> Owned<T> {
        match &mut self.mode {
            HooksMode::Client(hooks) => hooks.reference(init),
            HooksMode::Server => Owned::new(init()),
        }
    }
}

struct HookOutput {
    used: usize,
    hooks: Vec<Hook>,
    flags: FiberFlags,
    remaining: ExpirationTime,
}

pub(crate) struct HookRender {
    pub(crate) element: Element,
    pub(crate) hooks: Vec<Hook>,
    pub(crate) flags: FiberFlags,
    pub(crate) remaining: ExpirationTime,
}

/// Invokes `component` with a hook cursor over `committed`, re-running it
/// while it schedules updates on itself during render.
pub(crate) fn render_with_hooks(
    root: &Rc<RootInner>,
    fiber: FiberId,
    component: &ComponentType,
    props: &Props,
    committed: &[Hook],
    render_time: ExpirationTime,
) -> Result<HookRender, RenderError> {
    let weak = Rc::downgrade(root);
    let mut attempt: Option<Vec<Hook>> = None;
    for _ in 0..RE_RENDER_LIMIT {
        root.take_render_phase_update();
        let mut hooks = Hooks::client(&weak, fiber, committed, attempt.as_deref(), render_time);
        let element = component
            .render(&mut hooks, props)
            .map_err(|source| RenderError::Component {
                component: component.name(),
                source,
            })?;
        let output = hooks.finish();
        if output.used < committed.len() {
            log::warn!(
                "{} rendered {} hooks, previously {}",
                component.name(),
                output.used,
                committed.len()
            );
        }
        if !root.take_render_phase_update() {
            return Ok(HookRender {
                element,
                hooks: output.hooks,
                flags: output.flags,
                remaining: output.remaining,
            });
        }
        log::trace!("{} updated itself while rendering; rendering again", component.name());
        attempt = Some(output.hooks);
    }
    Err(RenderError::TooManyRenders {
        component: component.name(),
    })
}

#[cfg(test)]
#[path = "tests/hooks_tests.rs"]
mod tests;
