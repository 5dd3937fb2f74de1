//! Prompt rendering for agent tasks.

use std::fmt::Write;

use pipewright_engine::ExecutorRequest;
use serde_json::Value;

/// Render the prompt sent to the agent for `request`.
pub fn render_prompt(request: &ExecutorRequest) -> String {
    let mut prompt = String::new();

    let _ = writeln!(prompt, "You are a {}.", request.agent_role);
    let _ = writeln!(prompt);
    let _ = writeln!(prompt, "# {}", request.task_title);
    let _ = writeln!(prompt);
    let _ = writeln!(prompt, "{}", request.task_description);

    if !is_empty(&request.context) {
        let _ = writeln!(prompt);
        let _ = writeln!(prompt, "## Context");
        let _ = writeln!(prompt);
        let _ = writeln!(prompt, "```json\n{}\n```", pretty(&request.context));
    }

    if !request.instructions.is_empty() {
        let _ = writeln!(prompt);
        let _ = writeln!(prompt, "## Instructions");
        let _ = writeln!(prompt);
        for (i, instruction) in request.instructions.iter().enumerate() {
            let _ = writeln!(prompt, "{}. {}", i + 1, instruction);
        }
    }

    let _ = writeln!(prompt);
    let _ = writeln!(prompt, "## Output");
    let _ = writeln!(prompt);
    let _ = writeln!(
        prompt,
        "Write the files this task produces, then answer with a single JSON object \
         matching the schema below inside a ```json fenced block. List every file you \
         wrote in `artifacts` as {{\"path\", \"kind\"}}."
    );
    let _ = writeln!(prompt);
    let _ = writeln!(prompt, "```json\n{}\n```", pretty(&request.output_schema));

    prompt
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipewright_core::{ExecutorDirective, OutputSchema, RunId, TaskContext, TaskSpec};
    use serde_json::json;

    fn request(context: Value, instructions: Vec<String>) -> ExecutorRequest {
        let ctx = TaskContext::new(&RunId::parse("p").unwrap(), 0, "code-signing");
        let spec = TaskSpec::agent(
            &ctx,
            "Code signing",
            ExecutorDirective {
                role: "release engineer".to_string(),
                task: "Set up code signing".to_string(),
                context,
                instructions,
                output_schema: OutputSchema::object().required("signing", OutputSchema::object()),
            },
        );
        ExecutorRequest::new(&ctx, &spec)
    }

    #[test]
    fn test_prompt_sections() {
        let prompt = render_prompt(&request(
            json!({"platforms": ["darwin-arm64"]}),
            vec!["Sign macOS binaries".to_string(), "Notarize".to_string()],
        ));

        assert!(prompt.starts_with("You are a release engineer.\n"));
        assert!(prompt.contains("# Code signing\n"));
        assert!(prompt.contains("\"darwin-arm64\""));
        assert!(prompt.contains("1. Sign macOS binaries\n2. Notarize\n"));
        assert!(prompt.contains("\"required\": [\n    \"signing\"\n  ]"));
    }

    #[test]
    fn test_empty_context_and_instructions_omitted() {
        let prompt = render_prompt(&request(json!({}), Vec::new()));
        assert!(!prompt.contains("## Context"));
        assert!(!prompt.contains("## Instructions"));
        assert!(prompt.contains("## Output"));
    }
}
