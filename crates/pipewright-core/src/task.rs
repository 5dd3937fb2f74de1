//! Task specifications and the context a task builder sees.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

use crate::error::DefinitionError;
use crate::ids::{EffectId, RunId};
use crate::schema::{OutputSchema, SchemaType};

/// How a task is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum TaskKind {
    /// Dispatched to an external agent executor.
    Agent,
}

/// What external work to perform. Opaque to the runner apart from the
/// output schema it validates results against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutorDirective {
    /// Specialist role the agent plays (e.g. "release engineer").
    pub role: String,

    /// What the agent is asked to do.
    pub task: String,

    /// Structured context for the agent.
    pub context: Value,

    /// Free-form instructions, in order.
    pub instructions: Vec<String>,

    /// Required shape of the result document.
    pub output_schema: OutputSchema,
}

/// Durable document locations for one task invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskIo {
    pub input_path: String,
    pub output_path: String,
}

impl TaskIo {
    /// Conventional locations for `effect_id`: `tasks/<effectId>/input.json`
    /// and `tasks/<effectId>/result.json`.
    pub fn for_effect(effect_id: &EffectId) -> Self {
        Self {
            input_path: format!("tasks/{}/input.json", effect_id),
            output_path: format!("tasks/{}/result.json", effect_id),
        }
    }
}

/// Immutable description of one task invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSpec {
    pub kind: TaskKind,
    pub title: String,
    pub payload: ExecutorDirective,
    pub io: TaskIo,
    pub labels: BTreeSet<String>,
}

impl TaskSpec {
    /// Create an agent task with conventional io locations for `ctx`.
    pub fn agent(ctx: &TaskContext, title: impl Into<String>, payload: ExecutorDirective) -> Self {
        Self {
            kind: TaskKind::Agent,
            title: title.into(),
            payload,
            io: ctx.io(),
            labels: BTreeSet::new(),
        }
    }

    /// Builder method to add a label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.labels.insert(label.into());
        self
    }

    /// Check the spec is structurally usable for the invocation in `ctx`.
    pub fn check(&self, ctx: &TaskContext) -> Result<(), DefinitionError> {
        let fail = |message: &str| Err(DefinitionError::new(ctx.task_name(), message));

        if self.title.trim().is_empty() {
            return fail("title is empty");
        }
        if self.payload.role.trim().is_empty() {
            return fail("agent role is empty");
        }
        if self.payload.task.trim().is_empty() {
            return fail("task description is empty");
        }
        if self.payload.output_schema.schema_type != SchemaType::Object {
            return fail("output schema must describe an object");
        }
        if self.io != ctx.io() {
            return fail("io locations do not match the task's effect id");
        }
        Ok(())
    }
}

/// What a task builder may see about its invocation.
///
/// Only identity is exposed; anything else a builder reads must come
/// through its arguments so replays build identical specs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskContext {
    run_id: RunId,
    index: usize,
    task_name: String,
    effect_id: EffectId,
}

impl TaskContext {
    pub fn new(run_id: &RunId, index: usize, task_name: impl Into<String>) -> Self {
        let task_name = task_name.into();
        Self {
            effect_id: EffectId::derive(run_id, index, &task_name),
            run_id: run_id.clone(),
            index,
            task_name,
        }
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    /// Zero-based position of the task in its process.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn task_name(&self) -> &str {
        &self.task_name
    }

    pub fn effect_id(&self) -> &EffectId {
        &self.effect_id
    }

    pub fn io(&self) -> TaskIo {
        TaskIo::for_effect(&self.effect_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn directive() -> ExecutorDirective {
        ExecutorDirective {
            role: "release engineer".to_string(),
            task: "Generate checksums".to_string(),
            context: json!({"projectName": "demo"}),
            instructions: vec!["Use sha256".to_string()],
            output_schema: OutputSchema::object(),
        }
    }

    fn ctx() -> TaskContext {
        TaskContext::new(&RunId::parse("run-1").unwrap(), 5, "checksum-generation")
    }

    #[test]
    fn test_io_paths_follow_effect_id() {
        let ctx = ctx();
        let io = ctx.io();
        assert_eq!(io.input_path, format!("tasks/{}/input.json", ctx.effect_id()));
        assert_eq!(io.output_path, format!("tasks/{}/result.json", ctx.effect_id()));
    }

    #[test]
    fn test_well_formed_spec_passes_check() {
        let ctx = ctx();
        let spec = TaskSpec::agent(&ctx, "Checksums", directive()).with_label("security");
        assert!(spec.check(&ctx).is_ok());
        assert!(spec.labels.contains("security"));
    }

    #[test]
    fn test_check_rejects_blank_title_and_foreign_io() {
        let ctx = ctx();
        let blank = TaskSpec::agent(&ctx, "  ", directive());
        let err = blank.check(&ctx).unwrap_err();
        assert_eq!(err.task, "checksum-generation");

        let other = TaskContext::new(ctx.run_id(), 6, "checksum-generation");
        let foreign = TaskSpec::agent(&other, "Checksums", directive());
        assert!(foreign.check(&ctx).is_err());
    }

    #[test]
    fn test_check_rejects_non_object_schema() {
        let ctx = ctx();
        let mut payload = directive();
        payload.output_schema = OutputSchema::string();
        let spec = TaskSpec::agent(&ctx, "Checksums", payload);
        assert!(spec.check(&ctx).is_err());
    }
}
