//! Deterministic harness for exercising `fiber-core` renderers in tests.
//!
//! [`TestRenderer`] owns a [`fiber_core::MemoryHost`] container and a
//! [`ManualScheduler`] whose tasks only run when the test pumps them, so
//! preemption and expiry can be staged step by step with a [`ManualClock`].

mod manual;
mod testing;

pub use manual::{ManualClock, ManualScheduler, YieldPolicy};
pub use testing::{run_test_renderer, TestRenderer};

#[cfg(test)]
#[path = "tests/scenario_tests.rs"]
mod scenario_tests;
