//! `cli-configuration-system`: layered configuration loading for a CLI.

use std::collections::BTreeMap;

use pipewright_core::{BreakpointRequest, DefinitionError, OutputSchema, TaskContext, TaskSpec};
use pipewright_engine::{InputSpec, ProcessDefinition, TaskArgs, TaskDefinition};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::common::{review, string_list, task_context, typed, AgentTask, Produced};

pub const NAME: &str = "cli-configuration-system";

pub const FORMATS: &[&str] = &["json", "yaml", "toml", "ini", "env"];
const DEFAULT_FORMATS: &[&str] = &["json", "yaml"];

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigSchema {
    pub schema_file: String,
    pub keys: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileLoading {
    pub search_paths: Vec<String>,
    pub loaders: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrecedenceMerge {
    /// Sources from lowest to highest priority.
    pub precedence: Vec<String>,
    #[serde(default)]
    pub merge_strategy: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvVarMapping {
    pub prefix: String,
    #[serde(default)]
    pub separator: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigValidation {
    pub validator: String,
    #[serde(default)]
    pub rules: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigMigration {
    #[serde(deserialize_with = "crate::common::integral")]
    pub current_version: i64,
    #[serde(default)]
    pub migrations: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct ConfigDocs {
    #[serde(flatten)]
    produced: Produced,
}

fn config_schema(args: &TaskArgs<'_>, ctx: &TaskContext) -> TaskSpec {
    AgentTask::new(
        "Configuration schema",
        "CLI architect",
        format!("Define the configuration schema for '{}'", args.input_str("projectName")),
    )
    .context(task_context(args, &["formats"], &[]))
    .instructions(&[
        "Declare every key with its type, default and description",
        "Keep the schema in a single source file other modules import",
    ])
    .returns(
        OutputSchema::object()
            .required("schemaFile", OutputSchema::string())
            .required("keys", string_list()),
    )
    .build(ctx, NAME)
}

fn file_loading(args: &TaskArgs<'_>, ctx: &TaskContext) -> TaskSpec {
    AgentTask::new("Configuration file loading", "CLI engineer", "Load configuration files in every supported format")
        .context(task_context(
            args,
            &["formats"],
            &[("schemaFile", args.previous_field("config-schema", "schemaFile"))],
        ))
        .instructions(&[
            "Search the working directory, the user config directory and an explicit --config path",
            "Pick the parser from the file extension",
        ])
        .returns(
            OutputSchema::object()
                .required("searchPaths", string_list())
                .required("loaders", string_list()),
        )
        .build(ctx, NAME)
}

fn precedence_merge(args: &TaskArgs<'_>, ctx: &TaskContext) -> TaskSpec {
    AgentTask::new("Precedence and merging", "CLI engineer", "Merge configuration sources by precedence")
        .context(task_context(
            args,
            &[],
            &[("searchPaths", args.previous_field("file-loading", "searchPaths"))],
        ))
        .instructions(&[
            "Order: defaults, config files, environment variables, command-line flags",
            "Deep-merge objects and replace arrays",
        ])
        .returns(
            OutputSchema::object()
                .required("precedence", string_list())
                .optional("mergeStrategy", OutputSchema::string()),
        )
        .build(ctx, NAME)
}

fn env_var_mapping(args: &TaskArgs<'_>, ctx: &TaskContext) -> TaskSpec {
    AgentTask::new("Environment variable mapping", "CLI engineer", "Map environment variables onto configuration keys")
        .context(task_context(
            args,
            &[],
            &[("keys", args.previous_field("config-schema", "keys"))],
        ))
        .instructions(&[
            "Derive the prefix from the project name in upper snake case",
            "Use a double underscore for nesting",
        ])
        .returns(
            OutputSchema::object()
                .required("prefix", OutputSchema::string())
                .optional("separator", OutputSchema::string()),
        )
        .build(ctx, NAME)
}

fn config_validation(args: &TaskArgs<'_>, ctx: &TaskContext) -> TaskSpec {
    AgentTask::new("Configuration validation", "CLI engineer", "Validate merged configuration against the schema")
        .context(task_context(
            args,
            &[],
            &[("schemaFile", args.previous_field("config-schema", "schemaFile"))],
        ))
        .instructions(&[
            "Report every invalid key with its source file or variable",
            "Fail before any command runs",
        ])
        .returns(
            OutputSchema::object()
                .required("validator", OutputSchema::string())
                .optional("rules", string_list()),
        )
        .build(ctx, NAME)
}

fn config_migration(args: &TaskArgs<'_>, ctx: &TaskContext) -> TaskSpec {
    AgentTask::new("Configuration migration", "CLI engineer", "Version the configuration format and migrate old files")
        .context(task_context(args, &["formats"], &[]))
        .instructions(&[
            "Store a version field in every written config file",
            "Back up a file before migrating it",
        ])
        .returns(
            OutputSchema::object()
                .required("currentVersion", OutputSchema::integer())
                .optional("migrations", string_list()),
        )
        .build(ctx, NAME)
}

fn config_docs(args: &TaskArgs<'_>, ctx: &TaskContext) -> TaskSpec {
    AgentTask::new("Configuration docs", "technical writer", "Document every configuration option")
        .context(task_context(
            args,
            &["formats"],
            &[
                ("keys", args.previous_field("config-schema", "keys")),
                ("precedence", args.previous_field("precedence-merge", "precedence")),
                ("envPrefix", args.previous_field("env-var-mapping", "prefix")),
            ],
        ))
        .instructions(&["Include an example file for each format"])
        .build(ctx, NAME)
}

static TASKS: [TaskDefinition; 7] = [
    TaskDefinition::define("config-schema", config_schema),
    TaskDefinition::define("file-loading", file_loading),
    TaskDefinition::define("precedence-merge", precedence_merge),
    TaskDefinition::define("env-var-mapping", env_var_mapping),
    TaskDefinition::define("config-validation", config_validation),
    TaskDefinition::define("config-migration", config_migration),
    TaskDefinition::define("config-docs", config_docs),
];

/// Layered configuration for a CLI.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfigurationSystem;

impl ProcessDefinition for ConfigurationSystem {
    fn name(&self) -> &'static str {
        NAME
    }

    fn description(&self) -> &'static str {
        "Schema, multi-format loading, precedence, env mapping, validation and migration"
    }

    fn tasks(&self) -> &[TaskDefinition] {
        &TASKS
    }

    fn resolve_inputs(&self, raw: &Value) -> Result<Value, DefinitionError> {
        InputSpec::new(NAME)
            .subset_of("formats", FORMATS, DEFAULT_FORMATS)
            .string("outputDir", "src/config")
            .resolve(raw)
    }

    fn summarize(&self, inputs: &Value, outputs: &BTreeMap<String, Value>) -> BTreeMap<String, Value> {
        let mut summary = BTreeMap::new();

        if let Some(schema) = typed::<ConfigSchema>(outputs, "config-schema") {
            summary.insert(
                "schema".to_string(),
                json!({ "file": schema.schema_file, "keyCount": schema.keys.len() }),
            );
        }
        if let Some(loading) = typed::<FileLoading>(outputs, "file-loading") {
            summary.insert(
                "loading".to_string(),
                json!({
                    "formats": inputs["formats"],
                    "searchPaths": loading.search_paths,
                    "loaders": loading.loaders,
                }),
            );
        }
        if let Some(merge) = typed::<PrecedenceMerge>(outputs, "precedence-merge") {
            summary.insert(
                "precedence".to_string(),
                json!({ "order": merge.precedence, "strategy": merge.merge_strategy }),
            );
        }
        if let Some(env) = typed::<EnvVarMapping>(outputs, "env-var-mapping") {
            summary.insert(
                "environment".to_string(),
                json!({ "prefix": env.prefix, "separator": env.separator }),
            );
        }
        if let Some(validation) = typed::<ConfigValidation>(outputs, "config-validation") {
            summary.insert(
                "validation".to_string(),
                json!({ "validator": validation.validator, "rules": validation.rules }),
            );
        }
        if let Some(migration) = typed::<ConfigMigration>(outputs, "config-migration") {
            summary.insert(
                "migration".to_string(),
                json!({ "currentVersion": migration.current_version, "migrations": migration.migrations }),
            );
        }
        if let Some(docs) = typed::<ConfigDocs>(outputs, "config-docs") {
            summary.insert("docs".to_string(), json!({ "files": docs.produced.paths() }));
        }
        summary
    }

    fn breakpoint(&self, inputs: &Value, summaries: &BTreeMap<String, Value>) -> BreakpointRequest {
        review(NAME, "Configuration system", inputs, &["formats"], summaries)
    }
}
