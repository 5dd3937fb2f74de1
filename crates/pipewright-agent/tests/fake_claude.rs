//! Drives the executor against a stand-in `claude` script.

#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use pipewright_agent::ClaudeAgentExecutor;
use pipewright_core::{ExecutorDirective, OutputSchema, RunId, TaskContext, TaskSpec};
use pipewright_engine::{ExecutorError, ExecutorRequest, TaskExecutor};
use serde_json::json;

fn write_script(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("claude");
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

fn request() -> ExecutorRequest {
    let ctx = TaskContext::new(&RunId::parse("agent-test").unwrap(), 0, "build-configuration");
    let spec = TaskSpec::agent(
        &ctx,
        "Build configuration",
        ExecutorDirective {
            role: "build engineer".to_string(),
            task: "Configure the build".to_string(),
            context: json!({"language": "go"}),
            instructions: Vec::new(),
            output_schema: OutputSchema::object().required("buildSystem", OutputSchema::string()),
        },
    );
    ExecutorRequest::new(&ctx, &spec)
}

#[tokio::test]
async fn test_streamed_result_becomes_output() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(
        dir.path(),
        r#"[ "$1" = "--output-format=stream-json" ] || exit 9
printf '%s\n' '{"type":"system","subtype":"init","session_id":"fake"}'
printf '%s\n' 'not json at all'
printf '%s\n' '{"type":"assistant","message":{"content":[{"type":"text","text":"working"}]}}'
printf '%s\n' '{"type":"result","subtype":"success","is_error":false,"result":"```json\n{\"buildSystem\":\"goreleaser\",\"artifacts\":[{\"path\":\".goreleaser.yaml\",\"kind\":\"config\"}]}\n```"}'"#,
    );

    let executor = ClaudeAgentExecutor::new(script.to_string_lossy()).with_working_dir(dir.path());
    let output = executor.execute(&request()).await.unwrap();

    assert_eq!(output["buildSystem"], json!("goreleaser"));
    assert_eq!(output["artifacts"][0]["path"], json!(".goreleaser.yaml"));
}

#[tokio::test]
async fn test_nonzero_exit_is_failure() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(dir.path(), "echo boom >&2\nexit 3");

    let executor = ClaudeAgentExecutor::new(script.to_string_lossy()).with_working_dir(dir.path());
    let err = executor.execute(&request()).await.unwrap_err();

    assert!(matches!(err, ExecutorError::Failed(ref m) if m.contains("code 3")));
}
