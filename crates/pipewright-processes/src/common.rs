//! Pieces every pipeline shares.

use std::collections::BTreeMap;

use pipewright_core::{
    Artifact, ArtifactRef, BreakpointRequest, ExecutorDirective, OutputSchema, TaskContext, TaskSpec,
    ARTIFACTS_FIELD,
};
use pipewright_engine::TaskArgs;
use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer};
use serde_json::{json, Map, Value};

/// Label attached to every task of a pipeline.
pub(crate) const LABEL_AGENT: &str = "agent";

/// `schema` plus the `artifacts` list every task reports.
pub(crate) fn with_artifacts(schema: OutputSchema) -> OutputSchema {
    schema.required(ARTIFACTS_FIELD, Artifact::list_schema())
}

pub(crate) fn string_list() -> OutputSchema {
    OutputSchema::array_of(OutputSchema::string())
}

/// An agent task under construction. Its output schema always requires
/// `artifacts`.
pub(crate) struct AgentTask {
    title: &'static str,
    role: &'static str,
    task: String,
    context: Value,
    instructions: Vec<String>,
    schema: OutputSchema,
}

impl AgentTask {
    pub fn new(title: &'static str, role: &'static str, task: impl Into<String>) -> Self {
        Self {
            title,
            role,
            task: task.into(),
            context: Value::Object(Map::new()),
            instructions: Vec::new(),
            schema: OutputSchema::object(),
        }
    }

    pub fn context(mut self, context: Value) -> Self {
        self.context = context;
        self
    }

    pub fn instructions(mut self, instructions: &[&str]) -> Self {
        self.instructions = instructions.iter().map(|s| s.to_string()).collect();
        self
    }

    /// The task-specific part of the result shape.
    pub fn returns(mut self, schema: OutputSchema) -> Self {
        self.schema = schema;
        self
    }

    pub fn build(self, ctx: &TaskContext, pipeline: &'static str) -> TaskSpec {
        TaskSpec::agent(
            ctx,
            self.title,
            ExecutorDirective {
                role: self.role.to_string(),
                task: self.task,
                context: self.context,
                instructions: self.instructions,
                output_schema: with_artifacts(self.schema),
            },
        )
        .with_label(LABEL_AGENT)
        .with_label(pipeline)
    }
}

/// The inputs every task sees, plus `extra` entries.
pub(crate) fn task_context(args: &TaskArgs<'_>, keys: &[&str], extra: &[(&str, Value)]) -> Value {
    let mut context = Map::new();
    context.insert("projectName".to_string(), args.input("projectName"));
    context.insert("outputDir".to_string(), args.input("outputDir"));
    for key in keys {
        context.insert(key.to_string(), args.input(key));
    }
    for (key, value) in extra {
        context.insert(key.to_string(), value.clone());
    }
    Value::Object(context)
}

/// Deserialize the validated output of `task` into its result type.
pub(crate) fn typed<T: DeserializeOwned>(outputs: &BTreeMap<String, Value>, task: &str) -> Option<T> {
    outputs
        .get(task)
        .and_then(|output| serde_json::from_value(output.clone()).ok())
}

/// Read an integer that may arrive as an integral float (`2.0`).
pub(crate) fn integral<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    let number = serde_json::Number::deserialize(deserializer)?;
    number
        .as_i64()
        .or_else(|| number.as_f64().filter(|n| n.fract() == 0.0).map(|n| n as i64))
        .ok_or_else(|| D::Error::custom(format!("expected an integer, got {number}")))
}

/// Files a task reported, as carried in every result.
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct Produced {
    #[serde(default)]
    pub artifacts: Vec<ArtifactRef>,
}

impl Produced {
    pub fn paths(&self) -> Vec<&str> {
        self.artifacts.iter().map(|a| a.path.as_str()).collect()
    }
}

/// Breakpoint asking to approve a pipeline's output.
pub(crate) fn review(
    pipeline: &str,
    title: &str,
    inputs: &Value,
    keys: &[&str],
    summaries: &BTreeMap<String, Value>,
) -> BreakpointRequest {
    let project = inputs["projectName"].as_str().unwrap_or_default();
    let mut parameters = Map::new();
    for key in keys {
        parameters.insert(key.to_string(), inputs[*key].clone());
    }

    BreakpointRequest {
        question: format!(
            "Review the {} output for '{}' in {}. Approve to mark it ready for use?",
            title.to_lowercase(),
            project,
            inputs["outputDir"].as_str().unwrap_or_default()
        ),
        title: format!("{}: {}", title, project),
        context: json!({
            "pipeline": pipeline,
            "projectName": project,
            "parameters": parameters,
            "components": summaries.keys().collect::<Vec<_>>(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipewright_core::RunId;

    #[test]
    fn test_agent_task_requires_artifacts() {
        let ctx = TaskContext::new(&RunId::parse("c").unwrap(), 0, "t");
        let spec = AgentTask::new("Title", "role", "do it")
            .instructions(&["one"])
            .build(&ctx, "demo");

        assert!(spec.check(&ctx).is_ok());
        assert!(spec.labels.contains("demo"));
        let err = spec.payload.output_schema.validate(&json!({})).unwrap_err();
        assert_eq!(err.missing_fields, vec!["artifacts"]);
    }

    #[test]
    fn test_typed_ignores_missing_and_malformed() {
        #[derive(Deserialize)]
        struct Needs {
            #[allow(dead_code)]
            value: String,
        }

        let mut outputs = BTreeMap::new();
        outputs.insert("good".to_string(), json!({"value": "x"}));
        outputs.insert("bad".to_string(), json!({"value": 3}));

        assert!(typed::<Needs>(&outputs, "good").is_some());
        assert!(typed::<Needs>(&outputs, "bad").is_none());
        assert!(typed::<Needs>(&outputs, "absent").is_none());
    }

    #[test]
    fn test_review_carries_parameters() {
        let inputs = json!({"projectName": "tool", "outputDir": "dist", "language": "go"});
        let mut summaries = BTreeMap::new();
        summaries.insert("buildConfig".to_string(), json!({}));

        let request = review("cli-binary-distribution", "Binary distribution", &inputs, &["language"], &summaries);
        assert_eq!(request.title, "Binary distribution: tool");
        assert!(request.question.contains("'tool' in dist"));
        assert_eq!(request.context["parameters"], json!({"language": "go"}));
        assert_eq!(request.context["components"], json!(["buildConfig"]));
    }
}
