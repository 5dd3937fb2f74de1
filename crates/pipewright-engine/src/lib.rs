//! Pipewright engine.
//!
//! Runs checkpointed task pipelines:
//! - [`ProcessDefinition`]: an ordered list of tasks plus input defaults,
//!   the summary and the breakpoint question
//! - [`EffectStore`] / [`RunStore`]: where effects and run records live
//! - [`TaskExecutor`]: the external worker that performs a task
//! - [`ApprovalGate`]: who answers the end-of-run breakpoint
//! - [`ProcessRunner`]: ties them together for one [`RunContext`]

pub mod clock;
pub mod context;
pub mod definition;
pub mod error;
pub mod executor;
pub mod gate;
pub mod inputs;
pub mod runner;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use context::RunContext;
pub use definition::{ProcessDefinition, TaskArgs, TaskBuilder, TaskDefinition};
pub use error::RunError;
pub use executor::{ExecutorError, ExecutorRequest, TaskExecutor};
pub use gate::{ApprovalGate, AutoApprove, DeferredGate, GateError, GateOutcome};
pub use inputs::InputSpec;
pub use runner::{ProcessRunner, RunnerConfig, DEFAULT_RECLAIM_AFTER};
pub use store::{EffectStore, FsStore, MemoryStore, Reservation, RunStore, StoreError};
