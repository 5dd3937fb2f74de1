//! Runs each pipeline end to end against an executor that answers with the
//! smallest document its output schema accepts.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use pipewright_core::{HaltKind, RunId, RunState};
use pipewright_engine::{
    AutoApprove, DeferredGate, ExecutorError, ExecutorRequest, MemoryStore, ProcessDefinition, ProcessRunner,
    RunContext, RunStore, TaskExecutor,
};
use serde_json::{json, Map, Value};

/// Answers every task from its declared schema. Fields listed in `omit`
/// are left out of that task's answer.
#[derive(Default)]
struct SchemaStub {
    omit: HashMap<String, Vec<String>>,
    seen: Mutex<Vec<String>>,
}

impl SchemaStub {
    fn omitting(task: &str, field: &str) -> Self {
        let mut omit = HashMap::new();
        omit.insert(task.to_string(), vec![field.to_string()]);
        Self { omit, ..Self::default() }
    }

    fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

fn minimal(task: &str, key: &str, schema: &Value) -> Value {
    match schema["type"].as_str() {
        Some("object") => {
            let mut object = Map::new();
            let required = schema["required"].as_array().cloned().unwrap_or_default();
            for name in required.iter().filter_map(Value::as_str) {
                object.insert(name.to_string(), minimal(task, name, &schema["properties"][name]));
            }
            Value::Object(object)
        }
        Some("array") if key == "artifacts" => {
            json!([{ "path": format!("{}.out", task), "kind": "file" }])
        }
        Some("array") => json!([minimal(task, key, &schema["items"])]),
        Some("integer") | Some("number") => json!(1),
        Some("boolean") => json!(true),
        _ => json!(format!("{}-value", key)),
    }
}

#[async_trait]
impl TaskExecutor for SchemaStub {
    async fn execute(&self, request: &ExecutorRequest) -> Result<Value, ExecutorError> {
        self.seen.lock().unwrap().push(request.task_name.clone());

        let mut output = minimal(&request.task_name, "", &request.output_schema);
        if let (Some(fields), Some(object)) = (self.omit.get(&request.task_name), output.as_object_mut()) {
            for field in fields {
                object.remove(field);
            }
        }
        Ok(output)
    }
}

fn context(run: &str, store: &Arc<MemoryStore>) -> RunContext {
    RunContext::new(RunId::parse(run).unwrap(), store.clone())
}

#[tokio::test]
async fn test_binary_distribution_end_to_end() {
    let stub = Arc::new(SchemaStub::default());
    let store = Arc::new(MemoryStore::new());
    let runner = ProcessRunner::new(stub.clone(), Arc::new(AutoApprove::new()));
    let inputs = json!({
        "projectName": "my-cli-tool",
        "language": "go",
        "platforms": ["linux-amd64", "darwin-arm64"],
    });

    let process = pipewright_processes::find("cli-binary-distribution").unwrap();
    let result = runner.run(process, &inputs, &context("dist-1", &store)).await.unwrap();

    assert!(result.success);
    assert!(result.is_approved());
    assert_eq!(result.artifacts.len(), 10);
    assert_eq!(result.artifacts[0].path, "build-configuration.out");
    assert_eq!(result.per_component_summaries["buildConfig"]["system"], json!("buildSystem-value"));
    assert_eq!(result.metadata.pipeline_id, "cli-binary-distribution");
    assert!(result.breakpoint.title.contains("my-cli-tool"));

    let expected: Vec<_> = process.tasks().iter().map(|t| t.name().to_string()).collect();
    assert_eq!(stub.seen(), expected);
}

#[tokio::test]
async fn test_missing_required_field_halts_the_run() {
    let stub = Arc::new(SchemaStub::omitting("checksum-generation", "checksumConfig"));
    let store = Arc::new(MemoryStore::new());
    let runner = ProcessRunner::new(stub.clone(), Arc::new(AutoApprove::new()));
    let inputs = json!({"projectName": "my-cli-tool"});

    let err = runner
        .run(&pipewright_processes::BinaryDistribution, &inputs, &context("dist-2", &store))
        .await
        .unwrap_err();

    assert_eq!(err.task(), Some("checksum-generation"));
    assert_eq!(err.halt_kind(), Some(HaltKind::Validation));
    assert_eq!(err.validation().unwrap().missing_fields, vec!["checksumConfig"]);

    let record = store.load_run(&RunId::parse("dist-2").unwrap()).await.unwrap().unwrap();
    assert_eq!(record.state, RunState::Failed);
    assert_eq!(record.artifacts.len(), 5);
    assert_eq!(stub.seen().len(), 6);
}

#[tokio::test]
async fn test_every_pipeline_reaches_the_breakpoint() {
    for process in pipewright_processes::all() {
        let stub = Arc::new(SchemaStub::default());
        let store = Arc::new(MemoryStore::new());
        let runner = ProcessRunner::new(stub.clone(), Arc::new(DeferredGate));

        let result = runner
            .run(*process, &json!({"projectName": "tool"}), &context(process.name(), &store))
            .await
            .unwrap();

        assert!(result.is_awaiting_approval(), "{}", process.name());
        assert_eq!(result.artifacts.len(), process.tasks().len(), "{}", process.name());
        assert_eq!(
            result.per_component_summaries.len(),
            process.tasks().len(),
            "every task of {} should be summarized",
            process.name()
        );
        assert!(result.breakpoint.question.contains("'tool'"));
    }
}
