#![doc = r"Fiber reconciliation and cooperative scheduling for declarative host trees."]

mod begin_work;
mod child_reconciler;
pub mod collections;
mod commit;
mod complete_work;
pub mod element;
pub mod error;
pub mod expiration;
pub mod fiber;
pub mod hash;
pub mod hooks;
pub mod host;
pub mod owned;
pub mod platform;
mod root;
pub mod server;
mod update_queue;
mod work_loop;

pub type Key = u64;
pub type NodeId = usize;

pub use element::{component, h, text, Component, ComponentType, Element, PropValue, Props};
pub use error::{ComponentError, HostError, RenderError};
pub use expiration::ExpirationTime;
pub use fiber::{FiberFlags, FiberId, FiberTag};
pub use hash::hash_key;
pub use hooks::{Cleanup, Dispatch, EveryRender, HookEffectFlags, Hooks, SetState, StateAction};
pub use host::{ConcreteHost, HostCall, HostConfig, HostGuard, HostHolder, MemoryHost};
pub use owned::Owned;
pub use platform::{Clock, SchedulerPriority, SchedulerTask, TaskHandle, TaskScheduler};
pub use root::{FiberRoot, Renderer};
pub use server::render_to_string;

#[cfg(test)]
pub(crate) mod test_support;
