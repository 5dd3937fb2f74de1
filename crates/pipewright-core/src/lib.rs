//! Pipewright Core Domain Types
//!
//! This crate contains pure domain types with no dependencies on:
//! - An async runtime
//! - Storage backends
//! - Executors or approval channels
//!
//! All types here describe checkpointed task pipelines: how a task is
//! specified, how its identity is derived, how its output is validated, and
//! what a run records.

pub mod artifact;
pub mod breakpoint;
pub mod effect;
pub mod error;
pub mod ids;
pub mod run;
pub mod schema;
pub mod status;
pub mod task;

// Re-export commonly used types
pub use artifact::{Artifact, ArtifactAggregator, ArtifactRef, ARTIFACTS_FIELD};
pub use breakpoint::{ApprovalMethod, BreakpointDecision, BreakpointRequest};
pub use effect::EffectRecord;
pub use error::{CoreError, DefinitionError};
pub use ids::{EffectId, RunId};
pub use run::{HaltInfo, HaltKind, PipelineResult, RunMetadata, RunRecord};
pub use schema::{OutputSchema, SchemaType, TypeMismatch, ValidationError};
pub use status::{EffectStatus, RunState};
pub use task::{ExecutorDirective, TaskContext, TaskIo, TaskKind, TaskSpec};
