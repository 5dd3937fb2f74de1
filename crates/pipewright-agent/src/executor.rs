//! Task executor backed by the Claude Code CLI.
//!
//! Each dispatch spawns a one-shot `claude --print` process with streaming
//! JSON output, waits for its final `result` message and turns the answer
//! into the task's result document.

use std::io::ErrorKind;
use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use pipewright_engine::{ExecutorError, ExecutorRequest, TaskExecutor};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, error, info, warn};

use crate::error::AgentError;
use crate::prompt::render_prompt;
use crate::repair::{extract_json_object, repair_text};
use crate::types::{ClaudeMessage, PermissionMode};

/// What the stream said by the time the process exited.
#[derive(Debug, Default)]
struct Transcript {
    session_id: Option<String>,
    assistant_text: String,
    result: Option<(bool, Option<Value>, Option<String>)>,
    messages: u64,
}

impl Transcript {
    fn record(&mut self, message: ClaudeMessage) {
        self.messages += 1;
        match message {
            ClaudeMessage::System { session_id, model, .. } => {
                debug!(session_id = ?session_id, model = ?model, "Claude session started");
                if session_id.is_some() {
                    self.session_id = session_id;
                }
            }
            ClaudeMessage::Assistant { message, .. } => {
                let text = message.text();
                if !text.is_empty() {
                    self.assistant_text = text;
                }
            }
            ClaudeMessage::Result {
                is_error,
                result,
                error,
                duration_ms,
                ..
            } => {
                info!(is_error = ?is_error, duration_ms = ?duration_ms, "Claude result received");
                self.result = Some((is_error.unwrap_or(false), result, error));
            }
            ClaudeMessage::Unknown(_) => {}
        }
    }

    /// The task output carried by the transcript.
    fn into_output(self) -> Result<Value, AgentError> {
        let answer = match self.result {
            Some((true, result, error)) => {
                let detail = error
                    .or_else(|| result.as_ref().and_then(Value::as_str).map(str::to_string))
                    .unwrap_or_else(|| "unknown error".to_string());
                return Err(AgentError::ResultError(detail));
            }
            Some((false, Some(Value::Object(map)), _)) => return Ok(Value::Object(map)),
            Some((false, Some(Value::String(text)), _)) => text,
            _ if !self.assistant_text.is_empty() => self.assistant_text,
            _ => return Err(AgentError::NoResult),
        };

        let repaired = repair_text(&answer);
        extract_json_object(&repaired).ok_or_else(|| {
            let preview: String = repaired.chars().take(200).collect();
            AgentError::NoJsonObject(preview)
        })
    }
}

/// Runs tasks through the Claude Code CLI.
///
/// ```rust,no_run
/// use pipewright_agent::{ClaudeAgentExecutor, PermissionMode};
///
/// let executor = ClaudeAgentExecutor::new("claude")
///     .with_working_dir("./my-cli")
///     .with_permission_mode(PermissionMode::AcceptEdits);
/// ```
#[derive(Debug, Clone)]
pub struct ClaudeAgentExecutor {
    /// Path to the Claude CLI executable.
    claude_path: String,

    /// Directory the agent works in; artifacts are relative to it.
    working_dir: PathBuf,

    permission_mode: PermissionMode,

    model: Option<String>,

    system_prompt: Option<String>,

    env_vars: Vec<(String, String)>,
}

impl ClaudeAgentExecutor {
    /// Create an executor for the given Claude CLI path.
    ///
    /// The path can be just "claude" to use PATH lookup, or a full path.
    pub fn new(claude_path: impl Into<String>) -> Self {
        Self {
            claude_path: claude_path.into(),
            working_dir: PathBuf::from("."),
            permission_mode: PermissionMode::Default,
            model: None,
            system_prompt: None,
            env_vars: Vec::new(),
        }
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = dir.into();
        self
    }

    pub fn with_permission_mode(mut self, mode: PermissionMode) -> Self {
        self.permission_mode = mode;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Add an environment variable for the Claude process.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars.push((key.into(), value.into()));
        self
    }

    fn command(&self, prompt: &str) -> Command {
        let mut cmd = Command::new(&self.claude_path);
        cmd.arg("--output-format=stream-json").arg("--verbose");

        if self.permission_mode != PermissionMode::Default {
            cmd.arg("--permission-mode").arg(self.permission_mode.to_string());
        }
        if let Some(model) = &self.model {
            cmd.arg("--model").arg(model);
        }
        if let Some(system) = &self.system_prompt {
            cmd.arg("--append-system-prompt").arg(system);
        }
        cmd.arg("--print").arg(prompt);

        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .current_dir(&self.working_dir)
            .kill_on_drop(true);

        for (key, value) in &self.env_vars {
            cmd.env(key, value);
        }
        cmd
    }

    /// Run one prompt to completion and return the parsed answer.
    pub async fn run_prompt(&self, prompt: &str) -> Result<Value, AgentError> {
        info!(
            claude_path = %self.claude_path,
            working_dir = %self.working_dir.display(),
            prompt_len = prompt.len(),
            "Spawning Claude process"
        );

        let mut child = self.command(prompt).spawn().map_err(|e| {
            error!(error = %e, "Failed to spawn Claude process");
            if e.kind() == ErrorKind::NotFound {
                AgentError::ClaudeNotFound(self.claude_path.clone())
            } else {
                AgentError::SpawnError(e)
            }
        })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AgentError::ProcessError("stdout not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| AgentError::ProcessError("stderr not captured".to_string()))?;

        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let trimmed = line.trim();
                if !trimmed.is_empty() {
                    warn!(stderr = %trimmed, "Claude stderr");
                }
            }
        });

        let mut transcript = Transcript::default();
        let mut lines = BufReader::new(stdout).lines();
        while let Some(line) = lines.next_line().await? {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<ClaudeMessage>(trimmed) {
                Ok(message) => {
                    debug!(kind = message.kind(), "Claude message");
                    transcript.record(message);
                }
                Err(e) => {
                    let preview: String = trimmed.chars().take(200).collect();
                    warn!(error = %e, preview = %preview, "Failed to parse Claude message");
                }
            }
        }

        let status = child.wait().await?;
        let exit_code = status.code().unwrap_or(-1);
        info!(
            exit_code,
            messages = transcript.messages,
            session_id = ?transcript.session_id,
            "Claude process exited"
        );

        if !status.success() {
            return Err(AgentError::ProcessError(format!("Claude exited with code {}", exit_code)));
        }
        transcript.into_output()
    }
}

impl Default for ClaudeAgentExecutor {
    fn default() -> Self {
        Self::new("claude")
    }
}

#[async_trait]
impl TaskExecutor for ClaudeAgentExecutor {
    async fn execute(&self, request: &ExecutorRequest) -> Result<Value, ExecutorError> {
        info!(task = %request.task_name, effect_id = %request.effect_id, "Running agent task");
        let prompt = render_prompt(request);
        Ok(self.run_prompt(&prompt).await?)
    }
}
