//! `cli-plugin-architecture`: an extension system for a CLI.

use std::collections::BTreeMap;

use pipewright_core::{BreakpointRequest, DefinitionError, OutputSchema, TaskContext, TaskSpec};
use pipewright_engine::{InputSpec, ProcessDefinition, TaskArgs, TaskDefinition};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::common::{review, string_list, task_context, typed, AgentTask, Produced};

pub const NAME: &str = "cli-plugin-architecture";

pub const DISCOVERY: &[&str] = &["directory", "package", "registry"];

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginInterface {
    pub interface_file: String,
    pub hooks: Vec<String>,
    #[serde(default)]
    pub api_version: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginDiscovery {
    pub mechanism: String,
    pub locations: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginLoader {
    pub loading_strategy: String,
    #[serde(default)]
    pub version_check: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginLifecycle {
    pub states: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginSandboxing {
    pub isolation: String,
    #[serde(default)]
    pub permissions: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginRegistry {
    pub commands: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginSdk {
    pub template_dir: String,
    #[serde(flatten)]
    produced: Produced,
}

#[derive(Debug, Deserialize)]
pub struct PluginDocs {
    #[serde(flatten)]
    produced: Produced,
}

fn plugin_interface(args: &TaskArgs<'_>, ctx: &TaskContext) -> TaskSpec {
    AgentTask::new(
        "Plugin interface",
        "CLI architect",
        format!("Define the plugin contract for '{}'", args.input_str("projectName")),
    )
    .context(task_context(args, &["discovery"], &[]))
    .instructions(&[
        "Plugins may add commands and hook into the command lifecycle",
        "Version the interface so incompatible plugins are rejected",
    ])
    .returns(
        OutputSchema::object()
            .required("interfaceFile", OutputSchema::string())
            .required("hooks", string_list())
            .optional("apiVersion", OutputSchema::string()),
    )
    .build(ctx, NAME)
}

fn plugin_discovery(args: &TaskArgs<'_>, ctx: &TaskContext) -> TaskSpec {
    AgentTask::new(
        "Plugin discovery",
        "CLI engineer",
        format!("Find installed plugins by {}", args.input_str("discovery")),
    )
    .context(task_context(
        args,
        &["discovery"],
        &[("interfaceFile", args.previous_field("plugin-interface", "interfaceFile"))],
    ))
    .instructions(&["Discovery must not execute plugin code"])
    .returns(
        OutputSchema::object()
            .required("mechanism", OutputSchema::string())
            .required("locations", string_list()),
    )
    .build(ctx, NAME)
}

fn plugin_loader(args: &TaskArgs<'_>, ctx: &TaskContext) -> TaskSpec {
    AgentTask::new("Plugin loader", "CLI engineer", "Load discovered plugins on demand")
        .context(task_context(
            args,
            &[],
            &[
                ("mechanism", args.previous_field("plugin-discovery", "mechanism")),
                ("apiVersion", args.previous_field("plugin-interface", "apiVersion")),
            ],
        ))
        .instructions(&[
            "Load lazily, only when a plugin command is invoked",
            "Check the plugin's interface version before calling into it",
        ])
        .returns(
            OutputSchema::object()
                .required("loadingStrategy", OutputSchema::string())
                .optional("versionCheck", OutputSchema::boolean()),
        )
        .build(ctx, NAME)
}

fn plugin_lifecycle(args: &TaskArgs<'_>, ctx: &TaskContext) -> TaskSpec {
    AgentTask::new("Plugin lifecycle", "CLI engineer", "Manage plugin install, enable, disable and removal")
        .context(task_context(
            args,
            &[],
            &[("hooks", args.previous_field("plugin-interface", "hooks"))],
        ))
        .instructions(&["Expose lifecycle operations as a `plugins` subcommand"])
        .returns(OutputSchema::object().required("states", string_list()))
        .build(ctx, NAME)
}

fn plugin_sandboxing(args: &TaskArgs<'_>, ctx: &TaskContext) -> TaskSpec {
    AgentTask::new("Plugin sandboxing", "security engineer", "Limit what plugins can access")
        .context(task_context(
            args,
            &[],
            &[("loadingStrategy", args.previous_field("plugin-loader", "loadingStrategy"))],
        ))
        .instructions(&[
            "Deny filesystem and network access unless the plugin declares it",
            "Surface declared permissions at install time",
        ])
        .returns(
            OutputSchema::object()
                .required("isolation", OutputSchema::string())
                .optional("permissions", string_list()),
        )
        .build(ctx, NAME)
}

fn plugin_registry(args: &TaskArgs<'_>, ctx: &TaskContext) -> TaskSpec {
    AgentTask::new("Plugin registry", "CLI engineer", "Register plugin commands alongside built-in commands")
        .context(task_context(
            args,
            &[],
            &[("hooks", args.previous_field("plugin-interface", "hooks"))],
        ))
        .instructions(&["Built-in commands win on name conflicts; warn about the shadowed plugin"])
        .returns(OutputSchema::object().required("commands", string_list()))
        .build(ctx, NAME)
}

fn plugin_sdk(args: &TaskArgs<'_>, ctx: &TaskContext) -> TaskSpec {
    AgentTask::new("Plugin SDK and template", "developer experience engineer", "Ship a starter template for plugin authors")
        .context(task_context(
            args,
            &["discovery"],
            &[("interfaceFile", args.previous_field("plugin-interface", "interfaceFile"))],
        ))
        .instructions(&["The template must build and load without edits"])
        .returns(OutputSchema::object().required("templateDir", OutputSchema::string()))
        .build(ctx, NAME)
}

fn plugin_docs(args: &TaskArgs<'_>, ctx: &TaskContext) -> TaskSpec {
    AgentTask::new("Plugin docs", "technical writer", "Document writing, installing and publishing plugins")
        .context(task_context(
            args,
            &["discovery"],
            &[
                ("hooks", args.previous_field("plugin-interface", "hooks")),
                ("permissions", args.previous_field("plugin-sandboxing", "permissions")),
            ],
        ))
        .build(ctx, NAME)
}

static TASKS: [TaskDefinition; 8] = [
    TaskDefinition::define("plugin-interface", plugin_interface),
    TaskDefinition::define("plugin-discovery", plugin_discovery),
    TaskDefinition::define("plugin-loader", plugin_loader),
    TaskDefinition::define("plugin-lifecycle", plugin_lifecycle),
    TaskDefinition::define("plugin-sandboxing", plugin_sandboxing),
    TaskDefinition::define("plugin-registry", plugin_registry),
    TaskDefinition::define("plugin-sdk", plugin_sdk),
    TaskDefinition::define("plugin-docs", plugin_docs),
];

#[derive(Debug, Clone, Copy, Default)]
pub struct PluginArchitecture;

impl ProcessDefinition for PluginArchitecture {
    fn name(&self) -> &'static str {
        NAME
    }

    fn description(&self) -> &'static str {
        "Plugin interface, discovery, loading, lifecycle, sandboxing and SDK"
    }

    fn tasks(&self) -> &[TaskDefinition] {
        &TASKS
    }

    fn resolve_inputs(&self, raw: &Value) -> Result<Value, DefinitionError> {
        InputSpec::new(NAME)
            .one_of("discovery", DISCOVERY, "directory")
            .string("outputDir", "src/plugins")
            .resolve(raw)
    }

    fn summarize(&self, _inputs: &Value, outputs: &BTreeMap<String, Value>) -> BTreeMap<String, Value> {
        let mut summary = BTreeMap::new();

        if let Some(interface) = typed::<PluginInterface>(outputs, "plugin-interface") {
            summary.insert(
                "interface".to_string(),
                json!({
                    "file": interface.interface_file,
                    "hooks": interface.hooks,
                    "apiVersion": interface.api_version,
                }),
            );
        }
        if let Some(discovery) = typed::<PluginDiscovery>(outputs, "plugin-discovery") {
            summary.insert(
                "discovery".to_string(),
                json!({ "mechanism": discovery.mechanism, "locations": discovery.locations }),
            );
        }
        if let Some(loader) = typed::<PluginLoader>(outputs, "plugin-loader") {
            summary.insert(
                "loader".to_string(),
                json!({
                    "strategy": loader.loading_strategy,
                    "versionCheck": loader.version_check.unwrap_or(false),
                }),
            );
        }
        if let Some(lifecycle) = typed::<PluginLifecycle>(outputs, "plugin-lifecycle") {
            summary.insert("lifecycle".to_string(), json!({ "states": lifecycle.states }));
        }
        if let Some(sandbox) = typed::<PluginSandboxing>(outputs, "plugin-sandboxing") {
            summary.insert(
                "sandbox".to_string(),
                json!({ "isolation": sandbox.isolation, "permissions": sandbox.permissions }),
            );
        }
        if let Some(registry) = typed::<PluginRegistry>(outputs, "plugin-registry") {
            summary.insert("registry".to_string(), json!({ "commands": registry.commands }));
        }
        if let Some(sdk) = typed::<PluginSdk>(outputs, "plugin-sdk") {
            summary.insert(
                "sdk".to_string(),
                json!({ "templateDir": sdk.template_dir, "files": sdk.produced.paths() }),
            );
        }
        if let Some(docs) = typed::<PluginDocs>(outputs, "plugin-docs") {
            summary.insert("docs".to_string(), json!({ "files": docs.produced.paths() }));
        }
        summary
    }

    fn breakpoint(&self, inputs: &Value, summaries: &BTreeMap<String, Value>) -> BreakpointRequest {
        review(NAME, "Plugin architecture", inputs, &["discovery"], summaries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discovery_is_single_choice() {
        let inputs = PluginArchitecture.resolve_inputs(&json!({"projectName": "x"})).unwrap();
        assert_eq!(inputs["discovery"], json!("directory"));
        assert_eq!(inputs["outputDir"], json!("src/plugins"));

        assert!(PluginArchitecture
            .resolve_inputs(&json!({"projectName": "x", "discovery": ["package"]}))
            .is_err());
        assert!(PluginArchitecture
            .resolve_inputs(&json!({"projectName": "x", "discovery": "marketplace"}))
            .is_err());
    }

    #[test]
    fn test_loader_sees_discovery_output() {
        let run = pipewright_core::RunId::parse("plug").unwrap();
        let inputs = PluginArchitecture.resolve_inputs(&json!({"projectName": "x"})).unwrap();
        let mut previous = BTreeMap::new();
        previous.insert(
            "plugin-discovery".to_string(),
            json!({"mechanism": "directory", "locations": ["~/.x/plugins"], "artifacts": []}),
        );

        let spec = TASKS[2]
            .build(
                &TaskArgs { inputs: &inputs, previous: &previous },
                &TaskContext::new(&run, 2, "plugin-loader"),
            )
            .unwrap();
        assert_eq!(spec.payload.context["mechanism"], json!("directory"));
        assert_eq!(spec.payload.context["apiVersion"], Value::Null);
    }
}
