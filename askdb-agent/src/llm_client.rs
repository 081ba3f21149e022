//! Direct LLM client with native function calling.
//!
//! Talks to an OpenAI-compatible chat-completions endpoint (Groq by
//! default) and returns structured JSON tool calls as part of the API
//! response -- no text parsing of tool invocations needed.

use anyhow::{Result, anyhow};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::tools;

/// A message in the conversation history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<NativeToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

/// A native tool call returned by the LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NativeToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub call_type: String,
    pub function: FunctionCall,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: String, // JSON string
}

/// Parsed tool call ready for execution.
#[derive(Debug, Clone)]
pub struct ParsedToolCall {
    pub id: String,
    pub name: String,
    pub args: Value,
}

/// Result of an LLM API call.
#[derive(Debug)]
pub enum LlmResponse {
    /// Model returned tool calls (possibly alongside text).
    Message {
        text: Option<String>,
        tool_calls: Vec<ParsedToolCall>,
    },
    /// Model produced its final answer.
    Done { text: String },
    /// Error from the API, surfaced as data rather than a failure.
    Error { error: String },
}

/// Wrap the tool definitions in OpenAI function-calling format.
fn to_openai_tools() -> Vec<Value> {
    tools::definitions()
        .into_iter()
        .map(|def| {
            serde_json::json!({
                "type": "function",
                "function": {
                    "name": def["name"],
                    "description": def["description"],
                    "parameters": def["parameters"],
                }
            })
        })
        .collect()
}

pub struct LlmClient {
    http: Client,
    endpoint: String,
    model: String,
    api_key: String,
}

impl LlmClient {
    pub fn new(endpoint: &str, model: &str, api_key: &str) -> Self {
        Self {
            http: Client::builder()
                .timeout(std::time::Duration::from_secs(120))
                .build()
                .unwrap_or_default(),
            endpoint: endpoint.to_string(),
            model: model.to_string(),
            api_key: api_key.to_string(),
        }
    }

    /// Send a conversation to the LLM with native function calling.
    pub async fn chat(
        &self,
        system_prompt: &str,
        messages: &[ChatMessage],
    ) -> Result<LlmResponse> {
        let mut api_messages = vec![serde_json::json!({
            "role": "system",
            "content": system_prompt,
        })];
        for msg in messages {
            api_messages.push(serde_json::to_value(msg)?);
        }

        let body = serde_json::json!({
            "model": self.model,
            "messages": api_messages,
            "tools": to_openai_tools(),
            "max_tokens": 4096,
        });

        let resp = self
            .http
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await?;

        if !status.is_success() {
            let detail: String = text.chars().take(500).collect();
            return Ok(LlmResponse::Error {
                error: format!("API error {status}: {detail}"),
            });
        }

        let json: Value = serde_json::from_str(&text)
            .map_err(|e| anyhow!("Failed to parse response: {}", e))?;

        let choice = json
            .get("choices")
            .and_then(|c| c.as_array())
            .and_then(|arr| arr.first())
            .ok_or_else(|| anyhow!("No choices in response"))?;

        let message = choice
            .get("message")
            .ok_or_else(|| anyhow!("No message in choice"))?;

        let finish_reason = choice
            .get("finish_reason")
            .and_then(|f| f.as_str())
            .unwrap_or("stop");

        let content = message
            .get("content")
            .and_then(|c| c.as_str())
            .map(|s| s.to_string());

        let tool_calls = if let Some(tcs) = message.get("tool_calls").and_then(|t| t.as_array()) {
            tcs.iter()
                .filter_map(|tc| {
                    let id = tc.get("id")?.as_str()?.to_string();
                    let func = tc.get("function")?;
                    let name = func.get("name")?.as_str()?.to_string();
                    let args_str = func.get("arguments")?.as_str().unwrap_or("{}");
                    let args: Value = serde_json::from_str(args_str)
                        .unwrap_or(Value::Object(Default::default()));
                    Some(ParsedToolCall { id, name, args })
                })
                .collect()
        } else {
            Vec::new()
        };

        if !tool_calls.is_empty() || finish_reason == "tool_calls" {
            Ok(LlmResponse::Message {
                text: content,
                tool_calls,
            })
        } else {
            Ok(LlmResponse::Done {
                text: content.unwrap_or_default(),
            })
        }
    }

    /// Build a ChatMessage for the assistant's response (including tool
    /// calls) so it can be replayed into conversation history.
    pub fn assistant_message(text: Option<&str>, tool_calls: &[ParsedToolCall]) -> ChatMessage {
        let native_tcs: Vec<NativeToolCall> = tool_calls
            .iter()
            .map(|tc| NativeToolCall {
                id: tc.id.clone(),
                call_type: "function".to_string(),
                function: FunctionCall {
                    name: tc.name.clone(),
                    arguments: serde_json::to_string(&tc.args).unwrap_or_default(),
                },
            })
            .collect();

        ChatMessage {
            role: "assistant".to_string(),
            content: text.map(|t| t.to_string()),
            tool_calls: if native_tcs.is_empty() {
                None
            } else {
                Some(native_tcs)
            },
            tool_call_id: None,
        }
    }

    /// Build a tool result message to send back to the model.
    pub fn tool_result_message(tool_call_id: &str, output: &str) -> ChatMessage {
        ChatMessage {
            role: "tool".to_string(),
            content: Some(output.to_string()),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.to_string()),
        }
    }

    pub fn user_message(content: &str) -> ChatMessage {
        ChatMessage {
            role: "user".to_string(),
            content: Some(content.to_string()),
            tool_calls: None,
            tool_call_id: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_definitions_are_wrapped_in_function_calling_format() {
        let wrapped = to_openai_tools();
        assert!(!wrapped.is_empty());
        for def in &wrapped {
            assert_eq!(def["type"], "function");
            assert!(def["function"]["name"].is_string());
            assert!(def["function"]["parameters"].is_object());
        }
    }

    #[test]
    fn assistant_messages_round_trip_tool_calls() {
        let calls = vec![ParsedToolCall {
            id: "call_1".to_string(),
            name: "run_sql".to_string(),
            args: serde_json::json!({"sql": "SELECT 1"}),
        }];
        let msg = LlmClient::assistant_message(Some("running"), &calls);

        assert_eq!(msg.role, "assistant");
        let tcs = msg.tool_calls.unwrap();
        assert_eq!(tcs[0].function.name, "run_sql");
        assert_eq!(tcs[0].function.arguments, r#"{"sql":"SELECT 1"}"#);

        let plain = LlmClient::assistant_message(Some("done"), &[]);
        assert!(plain.tool_calls.is_none());
    }
}
