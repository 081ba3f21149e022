//! The agent loop for one question: chat, execute tool calls, feed the
//! results back, stop when the model answers in plain text.

use anyhow::{Result, anyhow};
use tokio::runtime::Runtime;
use tracing::debug;

use crate::llm_client::{ChatMessage, LlmClient, LlmResponse};
use crate::prompt;
use crate::tools::{self, ToolContext};

/// Upper bound on chat rounds for a single question; a looping model is
/// cut off rather than left running.
const MAX_ROUNDS: usize = 16;

const DIM: &str = "\x1b[2m";
const RESET: &str = "\x1b[0m";

/// Drive one user question to a final answer. Tool activity is echoed to
/// stderr so the user can follow along.
pub fn run_question(
    rt: &Runtime,
    llm: &LlmClient,
    ctx: &mut ToolContext,
    question: &str,
) -> Result<String> {
    let mut history = vec![LlmClient::user_message(question)];

    for _ in 0..MAX_ROUNDS {
        let system = prompt::system_prompt(ctx);
        let response = rt.block_on(llm.chat(&system, &history))?;

        match response {
            LlmResponse::Done { text } => return Ok(text),
            LlmResponse::Error { error } => return Err(anyhow!(error)),
            LlmResponse::Message { text, tool_calls } => {
                if tool_calls.is_empty() {
                    return Ok(text.unwrap_or_default());
                }
                history.push(LlmClient::assistant_message(text.as_deref(), &tool_calls));

                for call in &tool_calls {
                    eprintln!("{DIM}[tool] {}({}){RESET}", call.name, call.args);
                    let result = tools::execute(&call.name, &call.args, ctx);
                    debug!(
                        "tool {} -> {}",
                        call.name,
                        if result.success { "ok" } else { "error" }
                    );
                    history.push(LlmClient::tool_result_message(&call.id, &result.output));
                }
            }
        }
    }

    Ok("Stopped after reaching the tool-call limit for a single question.".to_string())
}
