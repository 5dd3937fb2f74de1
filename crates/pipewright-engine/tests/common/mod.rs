//! Shared fixtures: a three-step process and a scripted executor.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use pipewright_core::{
    Artifact, BreakpointRequest, DefinitionError, ExecutorDirective, OutputSchema, TaskContext, TaskSpec,
    ARTIFACTS_FIELD,
};
use pipewright_engine::{
    ExecutorError, ExecutorRequest, InputSpec, ProcessDefinition, TaskArgs, TaskDefinition, TaskExecutor,
};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

pub const TASK_NAMES: [&str; 3] = ["plan", "build", "ship"];

fn schema() -> OutputSchema {
    OutputSchema::object()
        .required("step", OutputSchema::string())
        .required(ARTIFACTS_FIELD, Artifact::list_schema())
}

fn plan(args: &TaskArgs<'_>, ctx: &TaskContext) -> TaskSpec {
    TaskSpec::agent(
        ctx,
        "Plan the work",
        ExecutorDirective {
            role: "planner".to_string(),
            task: format!("Plan {}", args.input_str("projectName")),
            context: json!({ "flavor": args.input("flavor") }),
            instructions: vec!["Keep it short".to_string()],
            output_schema: schema(),
        },
    )
}

fn build(args: &TaskArgs<'_>, ctx: &TaskContext) -> TaskSpec {
    TaskSpec::agent(
        ctx,
        "Build it",
        ExecutorDirective {
            role: "builder".to_string(),
            task: "Build from the plan".to_string(),
            context: json!({ "plan": args.previous_field("plan", "step") }),
            instructions: Vec::new(),
            output_schema: schema(),
        },
    )
}

fn ship(args: &TaskArgs<'_>, ctx: &TaskContext) -> TaskSpec {
    TaskSpec::agent(
        ctx,
        "Ship it",
        ExecutorDirective {
            role: "releaser".to_string(),
            task: "Ship the build".to_string(),
            context: json!({ "build": args.previous_field("build", "step") }),
            instructions: Vec::new(),
            output_schema: schema(),
        },
    )
}

static TASKS: [TaskDefinition; 3] = [
    TaskDefinition::define("plan", plan),
    TaskDefinition::define("build", build),
    TaskDefinition::define("ship", ship),
];

/// A small process exercising inputs, chained outputs and artifacts.
pub struct DemoProcess {
    inputs: InputSpec,
}

impl DemoProcess {
    pub fn new() -> Self {
        Self {
            inputs: InputSpec::new("demo").string("flavor", "plain"),
        }
    }
}

impl ProcessDefinition for DemoProcess {
    fn name(&self) -> &'static str {
        "demo"
    }

    fn description(&self) -> &'static str {
        "Plan, build and ship"
    }

    fn tasks(&self) -> &[TaskDefinition] {
        &TASKS
    }

    fn resolve_inputs(&self, raw: &Value) -> Result<Value, DefinitionError> {
        self.inputs.resolve(raw)
    }

    fn summarize(&self, _inputs: &Value, outputs: &BTreeMap<String, Value>) -> BTreeMap<String, Value> {
        outputs
            .iter()
            .map(|(task, output)| (task.clone(), output["step"].clone()))
            .collect()
    }

    fn breakpoint(&self, inputs: &Value, summaries: &BTreeMap<String, Value>) -> BreakpointRequest {
        BreakpointRequest {
            question: format!("Ship {}?", inputs["projectName"].as_str().unwrap_or_default()),
            title: "Demo review".to_string(),
            context: json!({ "summaries": summaries }),
        }
    }
}

pub fn inputs() -> Value {
    json!({ "projectName": "acme" })
}

/// The output a well-behaved executor produces for `task`.
pub fn good_output(task: &str) -> Value {
    json!({
        "step": format!("{} done", task),
        "artifacts": [{ "path": format!("{}.txt", task), "kind": "file" }],
    })
}

enum Script {
    Fail,
    Malformed,
    Hang(CancellationToken),
    Slow(Duration),
}

/// Executor whose behavior per task is set by the test. Counts dispatches.
#[derive(Default)]
pub struct ScriptedExecutor {
    calls: Mutex<HashMap<String, usize>>,
    requests: Mutex<Vec<ExecutorRequest>>,
    scripts: Mutex<HashMap<String, Script>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    fn script(&self, task: &str, script: Script) {
        self.scripts.lock().unwrap().insert(task.to_string(), script);
    }

    pub fn fail_on(&self, task: &str) {
        self.script(task, Script::Fail);
    }

    /// Output missing the `step` field.
    pub fn malformed_on(&self, task: &str) {
        self.script(task, Script::Malformed);
    }

    /// Cancel `token`, then never answer.
    pub fn hang_on(&self, task: &str, token: CancellationToken) {
        self.script(task, Script::Hang(token));
    }

    pub fn slow_on(&self, task: &str, delay: Duration) {
        self.script(task, Script::Slow(delay));
    }

    pub fn clear(&self) {
        self.scripts.lock().unwrap().clear();
    }

    pub fn calls(&self, task: &str) -> usize {
        self.calls.lock().unwrap().get(task).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }

    pub fn requests(&self) -> Vec<ExecutorRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl TaskExecutor for ScriptedExecutor {
    async fn execute(&self, request: &ExecutorRequest) -> Result<Value, ExecutorError> {
        let task = request.task_name.clone();
        *self.calls.lock().unwrap().entry(task.clone()).or_default() += 1;
        self.requests.lock().unwrap().push(request.clone());

        let action = self.scripts.lock().unwrap().remove(&task);
        match action {
            None => Ok(good_output(&task)),
            Some(Script::Fail) => Err(ExecutorError::Failed(format!("{} exploded", task))),
            Some(Script::Malformed) => Ok(json!({ "artifacts": [] })),
            Some(Script::Hang(token)) => {
                token.cancel();
                std::future::pending().await
            }
            Some(Script::Slow(delay)) => {
                tokio::time::sleep(delay).await;
                Ok(good_output(&task))
            }
        }
    }
}
