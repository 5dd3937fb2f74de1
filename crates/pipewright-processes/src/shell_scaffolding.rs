//! `shell-script-scaffolding`: a well-structured shell script CLI.

use std::collections::BTreeMap;

use pipewright_core::{BreakpointRequest, DefinitionError, OutputSchema, TaskContext, TaskSpec};
use pipewright_engine::{InputSpec, ProcessDefinition, TaskArgs, TaskDefinition};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::common::{review, string_list, task_context, typed, AgentTask, Produced};

pub const NAME: &str = "shell-script-scaffolding";

pub const SHELLS: &[&str] = &["bash", "zsh", "sh", "fish"];
const DEFAULT_SHELLS: &[&str] = &["bash"];

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptStructure {
    pub entrypoint: String,
    #[serde(default)]
    pub libraries: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArgumentParsing {
    pub flags: Vec<String>,
    #[serde(default)]
    pub subcommands: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorHandling {
    pub strict_mode: bool,
    #[serde(default)]
    pub exit_codes: BTreeMap<String, i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggingSetup {
    pub levels: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Portability {
    pub supported_shells: Vec<String>,
    #[serde(default)]
    pub caveats: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptTests {
    pub framework: String,
    #[serde(flatten)]
    produced: Produced,
}

#[derive(Debug, Deserialize)]
pub struct ShellCompletion {
    #[serde(flatten)]
    produced: Produced,
}

#[derive(Debug, Deserialize)]
pub struct ScriptDocs {
    #[serde(flatten)]
    produced: Produced,
}

fn script_structure(args: &TaskArgs<'_>, ctx: &TaskContext) -> TaskSpec {
    AgentTask::new(
        "Script structure",
        "shell scripting expert",
        format!("Lay out the script project for '{}'", args.input_str("projectName")),
    )
    .context(task_context(args, &["shells"], &[]))
    .instructions(&[
        "One entrypoint script that sources small library files",
        "Keep functions in the library files, not in the entrypoint",
    ])
    .returns(
        OutputSchema::object()
            .required("entrypoint", OutputSchema::string())
            .optional("libraries", string_list()),
    )
    .build(ctx, NAME)
}

fn argument_parsing(args: &TaskArgs<'_>, ctx: &TaskContext) -> TaskSpec {
    AgentTask::new("Argument parsing", "shell scripting expert", "Parse flags and subcommands")
        .context(task_context(
            args,
            &["shells"],
            &[("entrypoint", args.previous_field("script-structure", "entrypoint"))],
        ))
        .instructions(&[
            "Support --help and --version",
            "Reject unknown flags with a usage message",
        ])
        .returns(
            OutputSchema::object()
                .required("flags", string_list())
                .optional("subcommands", string_list()),
        )
        .build(ctx, NAME)
}

fn error_handling(args: &TaskArgs<'_>, ctx: &TaskContext) -> TaskSpec {
    AgentTask::new("Error handling", "shell scripting expert", "Fail loudly and clean up on error")
        .context(task_context(args, &["shells"], &[]))
        .instructions(&[
            "Enable strict mode where the shell supports it",
            "Trap exit to remove temporary files",
        ])
        .returns(
            OutputSchema::object()
                .required("strictMode", OutputSchema::boolean())
                .optional("exitCodes", OutputSchema::object()),
        )
        .build(ctx, NAME)
}

fn logging_setup(args: &TaskArgs<'_>, ctx: &TaskContext) -> TaskSpec {
    AgentTask::new("Logging", "shell scripting expert", "Add leveled logging to stderr")
        .context(task_context(args, &[], &[]))
        .instructions(&["Honour a LOG_LEVEL variable and disable color when stderr is not a tty"])
        .returns(OutputSchema::object().required("levels", string_list()))
        .build(ctx, NAME)
}

fn portability(args: &TaskArgs<'_>, ctx: &TaskContext) -> TaskSpec {
    AgentTask::new("Portability", "shell scripting expert", "Make the scripts run on every selected shell")
        .context(task_context(
            args,
            &["shells"],
            &[("libraries", args.previous_field("script-structure", "libraries"))],
        ))
        .instructions(&[
            "Avoid GNU-only flags so the scripts run on macOS and BSD",
            "Guard shell-specific features behind detection",
        ])
        .returns(
            OutputSchema::object()
                .required("supportedShells", string_list())
                .optional("caveats", string_list()),
        )
        .build(ctx, NAME)
}

fn script_tests(args: &TaskArgs<'_>, ctx: &TaskContext) -> TaskSpec {
    AgentTask::new("Script tests", "test engineer", "Write automated tests for the scripts")
        .context(task_context(
            args,
            &["shells"],
            &[("flags", args.previous_field("argument-parsing", "flags"))],
        ))
        .instructions(&["Cover argument parsing and error exits"])
        .returns(OutputSchema::object().required("framework", OutputSchema::string()))
        .build(ctx, NAME)
}

fn shell_completion(args: &TaskArgs<'_>, ctx: &TaskContext) -> TaskSpec {
    AgentTask::new("Shell completion", "shell scripting expert", "Generate completion scripts")
        .context(task_context(
            args,
            &["shells"],
            &[
                ("flags", args.previous_field("argument-parsing", "flags")),
                ("subcommands", args.previous_field("argument-parsing", "subcommands")),
            ],
        ))
        .instructions(&["One completion file per selected shell"])
        .build(ctx, NAME)
}

fn script_docs(args: &TaskArgs<'_>, ctx: &TaskContext) -> TaskSpec {
    AgentTask::new("Script docs", "technical writer", "Document installation and usage")
        .context(task_context(
            args,
            &["shells"],
            &[("flags", args.previous_field("argument-parsing", "flags"))],
        ))
        .build(ctx, NAME)
}

static TASKS: [TaskDefinition; 8] = [
    TaskDefinition::define("script-structure", script_structure),
    TaskDefinition::define("argument-parsing", argument_parsing),
    TaskDefinition::define("error-handling", error_handling),
    TaskDefinition::define("logging-setup", logging_setup),
    TaskDefinition::define("portability", portability),
    TaskDefinition::define("script-tests", script_tests),
    TaskDefinition::define("shell-completion", shell_completion),
    TaskDefinition::define("script-docs", script_docs),
];

#[derive(Debug, Clone, Copy, Default)]
pub struct ShellScaffolding;

impl ProcessDefinition for ShellScaffolding {
    fn name(&self) -> &'static str {
        NAME
    }

    fn description(&self) -> &'static str {
        "Portable shell script CLI with parsing, logging, tests and completion"
    }

    fn tasks(&self) -> &[TaskDefinition] {
        &TASKS
    }

    fn resolve_inputs(&self, raw: &Value) -> Result<Value, DefinitionError> {
        InputSpec::new(NAME)
            .subset_of("shells", SHELLS, DEFAULT_SHELLS)
            .string("outputDir", "scripts")
            .resolve(raw)
    }

    fn summarize(&self, _inputs: &Value, outputs: &BTreeMap<String, Value>) -> BTreeMap<String, Value> {
        let mut summary = BTreeMap::new();

        if let Some(structure) = typed::<ScriptStructure>(outputs, "script-structure") {
            summary.insert(
                "structure".to_string(),
                json!({ "entrypoint": structure.entrypoint, "libraries": structure.libraries }),
            );
        }
        if let Some(parsing) = typed::<ArgumentParsing>(outputs, "argument-parsing") {
            summary.insert(
                "arguments".to_string(),
                json!({ "flags": parsing.flags, "subcommands": parsing.subcommands }),
            );
        }
        if let Some(errors) = typed::<ErrorHandling>(outputs, "error-handling") {
            summary.insert(
                "errors".to_string(),
                json!({ "strictMode": errors.strict_mode, "exitCodes": errors.exit_codes }),
            );
        }
        if let Some(logging) = typed::<LoggingSetup>(outputs, "logging-setup") {
            summary.insert("logging".to_string(), json!({ "levels": logging.levels }));
        }
        if let Some(port) = typed::<Portability>(outputs, "portability") {
            summary.insert(
                "portability".to_string(),
                json!({ "shells": port.supported_shells, "caveats": port.caveats }),
            );
        }
        if let Some(tests) = typed::<ScriptTests>(outputs, "script-tests") {
            summary.insert(
                "tests".to_string(),
                json!({ "framework": tests.framework, "files": tests.produced.paths() }),
            );
        }
        if let Some(completion) = typed::<ShellCompletion>(outputs, "shell-completion") {
            summary.insert("completion".to_string(), json!({ "files": completion.produced.paths() }));
        }
        if let Some(docs) = typed::<ScriptDocs>(outputs, "script-docs") {
            summary.insert("docs".to_string(), json!({ "files": docs.produced.paths() }));
        }
        summary
    }

    fn breakpoint(&self, inputs: &Value, summaries: &BTreeMap<String, Value>) -> BreakpointRequest {
        review(NAME, "Shell script scaffolding", inputs, &["shells"], summaries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shells_default() {
        let inputs = ShellScaffolding.resolve_inputs(&json!({"projectName": "x"})).unwrap();
        assert_eq!(inputs["shells"], json!(["bash"]));
        assert_eq!(inputs["outputDir"], json!("scripts"));
    }

    #[test]
    fn test_summary_reads_typed_results() {
        let mut outputs = BTreeMap::new();
        outputs.insert(
            "error-handling".to_string(),
            json!({"strictMode": true, "exitCodes": {"usage": 64}, "artifacts": []}),
        );
        outputs.insert(
            "shell-completion".to_string(),
            json!({"artifacts": [{"path": "completions/x.bash", "kind": "completion"}]}),
        );

        let summary = ShellScaffolding.summarize(&json!({}), &outputs);
        assert_eq!(summary["errors"], json!({"strictMode": true, "exitCodes": {"usage": 64}}));
        assert_eq!(summary["completion"]["files"], json!(["completions/x.bash"]));
        assert!(!summary.contains_key("docs"));
    }
}
