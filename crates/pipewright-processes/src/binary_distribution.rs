//! `cli-binary-distribution`: build, sign and ship release binaries of a CLI.

use std::collections::BTreeMap;

use pipewright_core::{BreakpointRequest, DefinitionError, OutputSchema, TaskContext, TaskSpec};
use pipewright_engine::{InputSpec, ProcessDefinition, TaskArgs, TaskDefinition};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::common::{review, string_list, task_context, typed, AgentTask, Produced};

pub const NAME: &str = "cli-binary-distribution";

pub const LANGUAGES: &[&str] = &["go", "rust", "node", "python"];
pub const PLATFORMS: &[&str] = &[
    "linux-amd64",
    "linux-arm64",
    "darwin-amd64",
    "darwin-arm64",
    "windows-amd64",
];
pub const CHANNELS: &[&str] = &["github-releases", "homebrew", "scoop", "apt", "npm"];

const DEFAULT_PLATFORMS: &[&str] = &["linux-amd64", "darwin-arm64", "windows-amd64"];
const DEFAULT_CHANNELS: &[&str] = &["github-releases", "homebrew"];

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildConfiguration {
    pub build_system: String,
    #[serde(default)]
    pub config_file: Option<String>,
    #[serde(flatten)]
    produced: Produced,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrossCompilation {
    pub toolchain: String,
    pub targets: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BinaryOptimization {
    pub optimizations: Vec<String>,
    #[serde(default)]
    pub estimated_size_reduction: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionEmbedding {
    pub version_source: String,
    pub variables: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SigningPlan {
    pub platforms: Vec<String>,
    #[serde(default)]
    pub tool: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeSigning {
    pub signing: SigningPlan,
    #[serde(default)]
    pub secrets_required: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChecksumConfig {
    pub algorithm: String,
    pub file: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChecksumGeneration {
    pub checksum_config: ChecksumConfig,
    #[serde(default)]
    pub signed: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Archive {
    pub platform: String,
    pub format: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleasePackaging {
    pub archives: Vec<Archive>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallerScripts {
    pub install_command: String,
    #[serde(flatten)]
    produced: Produced,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelManifest {
    pub channel: String,
    pub manifest: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageManagerDistribution {
    pub channels: Vec<ChannelManifest>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseWorkflow {
    pub ci: String,
    pub trigger: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseAutomation {
    pub workflow: ReleaseWorkflow,
    #[serde(default)]
    pub steps: Vec<String>,
}

fn build_configuration(args: &TaskArgs<'_>, ctx: &TaskContext) -> TaskSpec {
    AgentTask::new(
        "Build configuration",
        "build and release engineer",
        format!(
            "Set up the release build configuration for the {} CLI '{}'",
            args.input_str("language"),
            args.input_str("projectName")
        ),
    )
    .context(task_context(args, &["language", "platforms"], &[]))
    .instructions(&[
        "Pick the idiomatic release build tool for the language (e.g. goreleaser, cargo-dist)",
        "Write its configuration file at the project root",
        "Report the chosen tool as buildSystem",
    ])
    .returns(
        OutputSchema::object()
            .required("buildSystem", OutputSchema::string())
            .optional("configFile", OutputSchema::string()),
    )
    .build(ctx, NAME)
}

fn cross_compilation(args: &TaskArgs<'_>, ctx: &TaskContext) -> TaskSpec {
    AgentTask::new(
        "Cross-compilation",
        "build engineer",
        "Configure cross-compilation for every target platform",
    )
    .context(task_context(
        args,
        &["language", "platforms"],
        &[("buildSystem", args.previous_field("build-configuration", "buildSystem"))],
    ))
    .instructions(&[
        "Produce one binary per platform in the platforms list",
        "Prefer static linking where the language allows it",
    ])
    .returns(
        OutputSchema::object()
            .required("toolchain", OutputSchema::string())
            .required("targets", string_list()),
    )
    .build(ctx, NAME)
}

fn binary_optimization(args: &TaskArgs<'_>, ctx: &TaskContext) -> TaskSpec {
    AgentTask::new(
        "Binary optimization",
        "performance engineer",
        "Reduce release binary size and startup time",
    )
    .context(task_context(args, &["language"], &[]))
    .instructions(&[
        "Strip debug symbols from release builds",
        "Enable link-time optimization if supported",
    ])
    .returns(
        OutputSchema::object()
            .required("optimizations", string_list())
            .optional("estimatedSizeReduction", OutputSchema::string()),
    )
    .build(ctx, NAME)
}

fn version_embedding(args: &TaskArgs<'_>, ctx: &TaskContext) -> TaskSpec {
    AgentTask::new(
        "Version embedding",
        "build engineer",
        "Embed version, commit and build date into the binary",
    )
    .context(task_context(
        args,
        &["language"],
        &[("buildSystem", args.previous_field("build-configuration", "buildSystem"))],
    ))
    .instructions(&[
        "Derive the version from git tags",
        "Expose it through a --version flag",
    ])
    .returns(
        OutputSchema::object()
            .required("versionSource", OutputSchema::string())
            .required("variables", string_list()),
    )
    .build(ctx, NAME)
}

fn code_signing(args: &TaskArgs<'_>, ctx: &TaskContext) -> TaskSpec {
    AgentTask::new(
        "Code signing",
        "release security engineer",
        "Sign release binaries for the platforms that require it",
    )
    .context(task_context(args, &["platforms"], &[]))
    .instructions(&[
        "Use notarization for darwin targets and Authenticode for windows targets",
        "Read all credentials from CI secrets; never commit them",
    ])
    .returns(
        OutputSchema::object()
            .required(
                "signing",
                OutputSchema::object()
                    .required("platforms", string_list())
                    .optional("tool", OutputSchema::string()),
            )
            .optional("secretsRequired", string_list()),
    )
    .build(ctx, NAME)
}

fn checksum_generation(args: &TaskArgs<'_>, ctx: &TaskContext) -> TaskSpec {
    AgentTask::new(
        "Checksum generation",
        "release security engineer",
        "Publish checksums for every release archive",
    )
    .context(task_context(
        args,
        &[],
        &[("signing", args.previous_field("code-signing", "signing"))],
    ))
    .instructions(&[
        "Use SHA-256",
        "Write a single checksums file alongside the archives",
    ])
    .returns(
        OutputSchema::object()
            .required(
                "checksumConfig",
                OutputSchema::object()
                    .required("algorithm", OutputSchema::string())
                    .required("file", OutputSchema::string()),
            )
            .optional("signed", OutputSchema::boolean()),
    )
    .build(ctx, NAME)
}

fn release_packaging(args: &TaskArgs<'_>, ctx: &TaskContext) -> TaskSpec {
    AgentTask::new(
        "Release packaging",
        "release engineer",
        "Package binaries into per-platform archives",
    )
    .context(task_context(
        args,
        &["platforms"],
        &[("checksumConfig", args.previous_field("checksum-generation", "checksumConfig"))],
    ))
    .instructions(&[
        "Use zip for windows and tar.gz elsewhere",
        "Include the license and README in every archive",
    ])
    .returns(OutputSchema::object().required(
        "archives",
        OutputSchema::array_of(
            OutputSchema::object()
                .required("platform", OutputSchema::string())
                .required("format", OutputSchema::string()),
        ),
    ))
    .build(ctx, NAME)
}

fn installer_scripts(args: &TaskArgs<'_>, ctx: &TaskContext) -> TaskSpec {
    AgentTask::new(
        "Installer scripts",
        "developer experience engineer",
        "Write one-line installer scripts",
    )
    .context(task_context(
        args,
        &["platforms"],
        &[("archives", args.previous_field("release-packaging", "archives"))],
    ))
    .instructions(&[
        "Provide install.sh for unix and install.ps1 for windows",
        "Verify the downloaded archive against the published checksums",
    ])
    .returns(OutputSchema::object().required("installCommand", OutputSchema::string()))
    .build(ctx, NAME)
}

fn package_manager_distribution(args: &TaskArgs<'_>, ctx: &TaskContext) -> TaskSpec {
    AgentTask::new(
        "Package manager distribution",
        "distribution engineer",
        "Publish the CLI through each selected distribution channel",
    )
    .context(task_context(
        args,
        &["channels", "platforms"],
        &[("buildSystem", args.previous_field("build-configuration", "buildSystem"))],
    ))
    .instructions(&[
        "Write one manifest per channel (formula, bucket manifest, package spec)",
        "Skip channels not listed in channels",
    ])
    .returns(OutputSchema::object().required(
        "channels",
        OutputSchema::array_of(
            OutputSchema::object()
                .required("channel", OutputSchema::string())
                .required("manifest", OutputSchema::string()),
        ),
    ))
    .build(ctx, NAME)
}

fn release_automation(args: &TaskArgs<'_>, ctx: &TaskContext) -> TaskSpec {
    AgentTask::new(
        "Release automation",
        "CI/CD engineer",
        "Automate the whole release on tag push",
    )
    .context(task_context(
        args,
        &["channels"],
        &[
            ("buildSystem", args.previous_field("build-configuration", "buildSystem")),
            ("secretsRequired", args.previous_field("code-signing", "secretsRequired")),
        ],
    ))
    .instructions(&[
        "Run build, sign, checksum, package and publish in one workflow",
        "Trigger on version tags only",
    ])
    .returns(
        OutputSchema::object()
            .required(
                "workflow",
                OutputSchema::object()
                    .required("ci", OutputSchema::string())
                    .required("trigger", OutputSchema::string()),
            )
            .optional("steps", string_list()),
    )
    .build(ctx, NAME)
}

static TASKS: [TaskDefinition; 10] = [
    TaskDefinition::define("build-configuration", build_configuration),
    TaskDefinition::define("cross-compilation", cross_compilation),
    TaskDefinition::define("binary-optimization", binary_optimization),
    TaskDefinition::define("version-embedding", version_embedding),
    TaskDefinition::define("code-signing", code_signing),
    TaskDefinition::define("checksum-generation", checksum_generation),
    TaskDefinition::define("release-packaging", release_packaging),
    TaskDefinition::define("installer-scripts", installer_scripts),
    TaskDefinition::define("package-manager-distribution", package_manager_distribution),
    TaskDefinition::define("release-automation", release_automation),
];

/// Release binaries of a CLI for several platforms and channels.
#[derive(Debug, Clone, Copy, Default)]
pub struct BinaryDistribution;

impl BinaryDistribution {
    fn inputs() -> InputSpec {
        InputSpec::new(NAME)
            .one_of("language", LANGUAGES, "go")
            .subset_of("platforms", PLATFORMS, DEFAULT_PLATFORMS)
            .subset_of("channels", CHANNELS, DEFAULT_CHANNELS)
            .string("outputDir", "dist")
    }
}

impl ProcessDefinition for BinaryDistribution {
    fn name(&self) -> &'static str {
        NAME
    }

    fn description(&self) -> &'static str {
        "Cross-compile, sign, checksum, package and publish release binaries"
    }

    fn tasks(&self) -> &[TaskDefinition] {
        &TASKS
    }

    fn resolve_inputs(&self, raw: &Value) -> Result<Value, DefinitionError> {
        Self::inputs().resolve(raw)
    }

    fn summarize(&self, _inputs: &Value, outputs: &BTreeMap<String, Value>) -> BTreeMap<String, Value> {
        let mut summary = BTreeMap::new();

        if let Some(build) = typed::<BuildConfiguration>(outputs, "build-configuration") {
            summary.insert(
                "buildConfig".to_string(),
                json!({
                    "system": build.build_system,
                    "configFile": build.config_file,
                    "files": build.produced.paths(),
                }),
            );
        }
        if let Some(cross) = typed::<CrossCompilation>(outputs, "cross-compilation") {
            summary.insert(
                "crossCompilation".to_string(),
                json!({ "toolchain": cross.toolchain, "targets": cross.targets }),
            );
        }
        if let Some(opt) = typed::<BinaryOptimization>(outputs, "binary-optimization") {
            summary.insert(
                "optimization".to_string(),
                json!({
                    "techniques": opt.optimizations,
                    "estimatedSizeReduction": opt.estimated_size_reduction,
                }),
            );
        }
        if let Some(version) = typed::<VersionEmbedding>(outputs, "version-embedding") {
            summary.insert(
                "versioning".to_string(),
                json!({ "source": version.version_source, "variables": version.variables }),
            );
        }
        if let Some(signing) = typed::<CodeSigning>(outputs, "code-signing") {
            summary.insert(
                "signing".to_string(),
                json!({
                    "platforms": signing.signing.platforms,
                    "tool": signing.signing.tool,
                    "secretsRequired": signing.secrets_required,
                }),
            );
        }
        if let Some(checksums) = typed::<ChecksumGeneration>(outputs, "checksum-generation") {
            summary.insert(
                "checksums".to_string(),
                json!({
                    "algorithm": checksums.checksum_config.algorithm,
                    "file": checksums.checksum_config.file,
                    "signed": checksums.signed.unwrap_or(false),
                }),
            );
        }
        if let Some(packaging) = typed::<ReleasePackaging>(outputs, "release-packaging") {
            let archives: Vec<Value> = packaging
                .archives
                .iter()
                .map(|a| json!({ "platform": a.platform, "format": a.format }))
                .collect();
            summary.insert("packaging".to_string(), json!({ "archives": archives }));
        }
        if let Some(installers) = typed::<InstallerScripts>(outputs, "installer-scripts") {
            summary.insert(
                "installers".to_string(),
                json!({
                    "command": installers.install_command,
                    "scripts": installers.produced.paths(),
                }),
            );
        }
        if let Some(dist) = typed::<PackageManagerDistribution>(outputs, "package-manager-distribution") {
            let channels: BTreeMap<&str, &str> = dist
                .channels
                .iter()
                .map(|c| (c.channel.as_str(), c.manifest.as_str()))
                .collect();
            summary.insert("distribution".to_string(), json!({ "channels": channels }));
        }
        if let Some(automation) = typed::<ReleaseAutomation>(outputs, "release-automation") {
            summary.insert(
                "automation".to_string(),
                json!({
                    "ci": automation.workflow.ci,
                    "trigger": automation.workflow.trigger,
                    "steps": automation.steps,
                }),
            );
        }
        summary
    }

    fn breakpoint(&self, inputs: &Value, summaries: &BTreeMap<String, Value>) -> BreakpointRequest {
        review(
            NAME,
            "Binary distribution",
            inputs,
            &["language", "platforms", "channels"],
            summaries,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipewright_core::RunId;

    #[test]
    fn test_task_order() {
        let names: Vec<&str> = TASKS.iter().map(|t| t.name()).collect();
        assert_eq!(names.len(), 10);
        assert_eq!(names[0], "build-configuration");
        assert_eq!(names[5], "checksum-generation");
        assert_eq!(names[9], "release-automation");
    }

    #[test]
    fn test_defaults() {
        let inputs = BinaryDistribution
            .resolve_inputs(&json!({"projectName": "my-cli-tool"}))
            .unwrap();
        assert_eq!(inputs["language"], json!("go"));
        assert_eq!(inputs["platforms"], json!(DEFAULT_PLATFORMS));
        assert_eq!(inputs["channels"], json!(["github-releases", "homebrew"]));
        assert_eq!(inputs["outputDir"], json!("dist"));
    }

    #[test]
    fn test_closed_option_sets() {
        let bad_language = json!({"projectName": "x", "language": "cobol"});
        assert!(BinaryDistribution.resolve_inputs(&bad_language).is_err());

        let bad_platform = json!({"projectName": "x", "platforms": ["plan9-mips"]});
        assert!(BinaryDistribution.resolve_inputs(&bad_platform).is_err());
    }

    #[test]
    fn test_every_task_builds_a_valid_spec() {
        let inputs = BinaryDistribution.resolve_inputs(&json!({"projectName": "x"})).unwrap();
        let previous = BTreeMap::new();
        let args = TaskArgs {
            inputs: &inputs,
            previous: &previous,
        };
        let run = RunId::parse("spec-check").unwrap();

        for (i, task) in TASKS.iter().enumerate() {
            let ctx = TaskContext::new(&run, i, task.name());
            let spec = task.build(&args, &ctx).unwrap();
            assert!(spec.payload.output_schema.required.contains(&"artifacts".to_string()));
        }
    }

    #[test]
    fn test_summary_build_config_system() {
        let mut outputs = BTreeMap::new();
        outputs.insert(
            "build-configuration".to_string(),
            json!({
                "buildSystem": "goreleaser",
                "configFile": ".goreleaser.yaml",
                "artifacts": [{"path": ".goreleaser.yaml", "kind": "config"}],
            }),
        );

        let summary = BinaryDistribution.summarize(&json!({}), &outputs);
        assert_eq!(summary["buildConfig"]["system"], json!("goreleaser"));
        assert_eq!(summary["buildConfig"]["files"], json!([".goreleaser.yaml"]));
    }
}
