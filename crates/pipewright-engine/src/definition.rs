//! Task and process definitions.
//!
//! A process is a fixed, ordered list of [`TaskDefinition`]s plus the
//! pipeline-specific pieces the runner needs around them: input defaults,
//! the final summary and the breakpoint question.

use std::collections::BTreeMap;
use std::fmt;

use pipewright_core::{BreakpointRequest, DefinitionError, TaskContext, TaskSpec};
use serde_json::Value;

/// What a task builder receives.
#[derive(Debug, Clone, Copy)]
pub struct TaskArgs<'a> {
    /// Resolved pipeline inputs (defaults applied).
    pub inputs: &'a Value,
    /// Validated outputs of the tasks completed so far, by task name.
    pub previous: &'a BTreeMap<String, Value>,
}

impl<'a> TaskArgs<'a> {
    /// A string input, or `""` when absent.
    pub fn input_str(&self, key: &str) -> &'a str {
        self.inputs.get(key).and_then(Value::as_str).unwrap_or("")
    }

    /// A raw input value, or `Null` when absent.
    pub fn input(&self, key: &str) -> Value {
        self.inputs.get(key).cloned().unwrap_or(Value::Null)
    }

    /// The output of an earlier task, if it ran.
    pub fn previous(&self, task: &str) -> Option<&'a Value> {
        self.previous.get(task)
    }

    /// A field of an earlier task's output, or `Null`.
    pub fn previous_field(&self, task: &str, field: &str) -> Value {
        self.previous(task)
            .and_then(|output| output.get(field))
            .cloned()
            .unwrap_or(Value::Null)
    }
}

/// Builds a task's spec. A plain function pointer: builders cannot capture
/// state, so the same arguments always produce the same spec.
pub type TaskBuilder = fn(&TaskArgs<'_>, &TaskContext) -> TaskSpec;

/// A named task factory.
#[derive(Clone, Copy)]
pub struct TaskDefinition {
    name: &'static str,
    builder: TaskBuilder,
}

impl TaskDefinition {
    pub const fn define(name: &'static str, builder: TaskBuilder) -> Self {
        Self { name, builder }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Build and check the spec for one invocation.
    pub fn build(&self, args: &TaskArgs<'_>, ctx: &TaskContext) -> Result<TaskSpec, DefinitionError> {
        let spec = (self.builder)(args, ctx);
        spec.check(ctx)?;
        Ok(spec)
    }
}

impl fmt::Debug for TaskDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskDefinition")
            .field("name", &self.name)
            .finish()
    }
}

/// A declarative pipeline.
pub trait ProcessDefinition: Send + Sync {
    /// Pipeline name used for lookup and in run metadata.
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// Tasks in declaration (= execution) order.
    fn tasks(&self) -> &[TaskDefinition];

    /// Apply documented defaults and reject values outside the closed
    /// option sets.
    fn resolve_inputs(&self, raw: &Value) -> Result<Value, DefinitionError>;

    /// Per-component summaries for the final result.
    fn summarize(&self, inputs: &Value, outputs: &BTreeMap<String, Value>) -> BTreeMap<String, Value>;

    /// The approval question asked once every task has succeeded.
    fn breakpoint(&self, inputs: &Value, summaries: &BTreeMap<String, Value>) -> BreakpointRequest;
}
