//! Terminal approval prompt.

use async_trait::async_trait;
use pipewright_core::{ApprovalMethod, BreakpointDecision, BreakpointRequest};
use pipewright_engine::{ApprovalGate, GateError, GateOutcome};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;

const HELP: &str = "Commands:\n  a/approve/y/yes - Approve the run\n  r/reject/n/no   - Reject the run\n  d/defer/s/skip  - Decide later with `pipewright approve|reject`\n";

type Reader = Box<dyn AsyncBufRead + Unpin + Send>;
type Writer = Box<dyn AsyncWrite + Unpin + Send>;

/// Asks the breakpoint question on a terminal.
pub struct PromptGate {
    io: Mutex<(Reader, Writer)>,
}

enum Answer {
    Approve,
    Reject,
    Defer,
}

impl PromptGate {
    pub fn new(
        reader: impl AsyncBufRead + Unpin + Send + 'static,
        writer: impl AsyncWrite + Unpin + Send + 'static,
    ) -> Self {
        let reader: Reader = Box::new(reader);
        let writer: Writer = Box::new(writer);
        Self {
            io: Mutex::new((reader, writer)),
        }
    }

    /// Prompt on stdin/stdout.
    pub fn stdio() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
    }
}

fn parse_answer(input: &str) -> Option<Answer> {
    match input.trim().to_lowercase().as_str() {
        "a" | "approve" | "y" | "yes" => Some(Answer::Approve),
        "r" | "reject" | "n" | "no" => Some(Answer::Reject),
        "d" | "defer" | "s" | "skip" => Some(Answer::Defer),
        _ => None,
    }
}

async fn read_line(reader: &mut Reader) -> Result<String, GateError> {
    let mut line = String::new();
    if reader.read_line(&mut line).await? == 0 {
        return Err(GateError::ChannelClosed);
    }
    Ok(line.trim().to_string())
}

#[async_trait]
impl ApprovalGate for PromptGate {
    async fn request_approval(&self, request: &BreakpointRequest) -> Result<GateOutcome, GateError> {
        let mut io = self.io.lock().await;
        let (reader, writer) = &mut *io;

        let rule = "-".repeat(60);
        let context = serde_json::to_string_pretty(&request.context).unwrap_or_default();
        let banner = format!(
            "\n{rule}\n{}\n{rule}\n\n{}\n\n{}\n",
            request.title, context, request.question
        );
        writer.write_all(banner.as_bytes()).await?;

        let answer = loop {
            writer.write_all(b"\n[a]pprove  [r]eject  [d]efer  [?]help\n> ").await?;
            writer.flush().await?;

            match parse_answer(&read_line(reader).await?) {
                Some(answer) => break answer,
                None => writer.write_all(HELP.as_bytes()).await?,
            }
        };

        if matches!(answer, Answer::Defer) {
            return Ok(GateOutcome::Deferred);
        }

        writer.write_all(b"Notes (optional): ").await?;
        writer.flush().await?;
        let notes = Some(read_line(reader).await?).filter(|n| !n.is_empty());

        let decision = match answer {
            Answer::Approve => BreakpointDecision::approve(request, ApprovalMethod::Cli, notes),
            _ => BreakpointDecision::reject(request, ApprovalMethod::Cli, notes),
        };
        Ok(GateOutcome::Decided(decision))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request() -> BreakpointRequest {
        BreakpointRequest {
            question: "Ship it?".to_string(),
            title: "Release: tool".to_string(),
            context: json!({"pipeline": "demo"}),
        }
    }

    async fn answer(input: &'static str) -> Result<GateOutcome, GateError> {
        PromptGate::new(input.as_bytes(), tokio::io::sink())
            .request_approval(&request())
            .await
    }

    #[tokio::test]
    async fn test_approve_with_notes() {
        let GateOutcome::Decided(decision) = answer("a\nlooks good\n").await.unwrap() else {
            panic!("expected a decision");
        };
        assert!(decision.approved);
        assert_eq!(decision.method, ApprovalMethod::Cli);
        assert_eq!(decision.notes.as_deref(), Some("looks good"));
        assert_eq!(decision.question, "Ship it?");
    }

    #[tokio::test]
    async fn test_unknown_input_asks_again() {
        let GateOutcome::Decided(decision) = answer("maybe\nno\n\n").await.unwrap() else {
            panic!("expected a decision");
        };
        assert!(!decision.approved);
        assert_eq!(decision.notes, None);
    }

    #[tokio::test]
    async fn test_defer() {
        assert_eq!(answer("d\n").await.unwrap(), GateOutcome::Deferred);
    }

    #[tokio::test]
    async fn test_closed_input() {
        assert!(matches!(answer("").await, Err(GateError::ChannelClosed)));
        assert!(matches!(answer("yes\n").await, Err(GateError::ChannelClosed)));
    }
}
