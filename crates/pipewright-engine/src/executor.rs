//! The boundary to whatever actually performs a task.

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use pipewright_core::{EffectId, TaskContext, TaskKind, TaskSpec};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Errors an executor reports for a dispatch.
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// The executor could not be reached or started.
    #[error("executor unavailable: {0}")]
    Unavailable(String),

    /// No response within the dispatch timeout.
    #[error("executor did not respond within {0:?}")]
    Timeout(Duration),

    /// The executor ran and reported failure.
    #[error("task failed: {0}")]
    Failed(String),

    /// The executor produced something that is not a result document.
    #[error("unreadable output: {0}")]
    InvalidOutput(String),
}

/// The document submitted to an executor; also persisted as the effect's
/// `input.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutorRequest {
    pub effect_id: EffectId,
    pub task_name: String,
    pub kind: TaskKind,
    pub task_title: String,
    pub agent_role: String,
    pub task_description: String,
    pub context: Value,
    pub instructions: Vec<String>,
    pub output_schema: Value,
    /// Where the input document lives, relative to the state directory.
    pub input_doc: String,
    /// Where the result document is expected, relative to the state directory.
    pub output_doc: String,
    pub labels: BTreeSet<String>,
}

impl ExecutorRequest {
    pub fn new(ctx: &TaskContext, spec: &TaskSpec) -> Self {
        Self {
            effect_id: ctx.effect_id().clone(),
            task_name: ctx.task_name().to_string(),
            kind: spec.kind,
            task_title: spec.title.clone(),
            agent_role: spec.payload.role.clone(),
            task_description: spec.payload.task.clone(),
            context: spec.payload.context.clone(),
            instructions: spec.payload.instructions.clone(),
            output_schema: spec.payload.output_schema.to_json(),
            input_doc: spec.io.input_path.clone(),
            output_doc: spec.io.output_path.clone(),
            labels: spec.labels.clone(),
        }
    }
}

/// Performs the external work for a task.
///
/// Implementations return the result document; the runner validates and
/// persists it at `output_doc`.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn execute(&self, request: &ExecutorRequest) -> Result<Value, ExecutorError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipewright_core::{ExecutorDirective, OutputSchema, RunId};
    use serde_json::json;

    #[test]
    fn test_request_mirrors_spec() {
        let ctx = TaskContext::new(&RunId::parse("r").unwrap(), 2, "version-embedding");
        let spec = TaskSpec::agent(
            &ctx,
            "Embed version",
            ExecutorDirective {
                role: "build engineer".to_string(),
                task: "Embed version info".to_string(),
                context: json!({"language": "go"}),
                instructions: vec!["Use ldflags".to_string()],
                output_schema: OutputSchema::object().required("versionVariable", OutputSchema::string()),
            },
        );

        let request = ExecutorRequest::new(&ctx, &spec);
        assert_eq!(request.task_name, "version-embedding");
        assert_eq!(request.agent_role, "build engineer");
        assert_eq!(request.output_schema["required"], json!(["versionVariable"]));
        assert_eq!(request.output_doc, format!("tasks/{}/result.json", ctx.effect_id()));

        let doc = serde_json::to_value(&request).unwrap();
        assert_eq!(doc["taskTitle"], json!("Embed version"));
        assert_eq!(doc["kind"], json!("agent"));
    }
}
