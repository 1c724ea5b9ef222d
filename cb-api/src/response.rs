//! Wire types for the chat-completions and SMS provider APIs.
//!
//! Chat messages use the OpenAI-compatible shape so the same struct is
//! sent in requests and received in responses.

use serde::{Deserialize, Serialize};

/// One message in a chat-completions conversation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WireMessage {
    pub role: String,
    /// Text content. Absent on assistant turns that only call tools.
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    /// Set on `tool` messages to link the result to its call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl WireMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self::text("system", content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::text("user", content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::text("assistant", content)
    }

    /// Result of executing a tool call.
    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: "tool".into(),
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.into()),
        }
    }

    fn text(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    /// Whether the model asked for at least one tool invocation.
    pub fn has_tool_calls(&self) -> bool {
        self.tool_calls.as_ref().is_some_and(|c| !c.is_empty())
    }
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type", default = "default_tool_type")]
    pub call_type: String,
    pub function: FunctionCall,
}

fn default_tool_type() -> String {
    "function".into()
}

/// Function name plus JSON-encoded arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// Raw JSON string as produced by the model; may be malformed.
    #[serde(default)]
    pub arguments: String,
}

impl FunctionCall {
    /// Parse the arguments as a JSON object. Empty input yields `{}`.
    pub fn parsed_arguments(&self) -> Result<serde_json::Value, serde_json::Error> {
        if self.arguments.trim().is_empty() {
            return Ok(serde_json::json!({}));
        }
        serde_json::from_str(&self.arguments)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    #[serde(default)]
    pub index: u32,
    pub message: WireMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

/// Response body of `POST /chat/completions`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionResponse {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

impl ChatCompletionResponse {
    /// The first choice's message, if any.
    pub fn first_message(&self) -> Option<&WireMessage> {
        self.choices.first().map(|c| &c.message)
    }
}

/// Error envelope: `{"error": {"message": ..}}`.
#[derive(Debug, Clone, Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum ErrorDetail {
    Object {
        #[serde(default)]
        message: Option<String>,
    },
    Text(String),
}

/// Twilio-style flat error body: `{"code": 21211, "message": ..}`.
#[derive(Debug, Clone, Deserialize)]
struct FlatError {
    message: String,
}

/// Pull a human-readable message out of an error response body.
pub fn extract_error_message(body: &str) -> String {
    if let Ok(env) = serde_json::from_str::<ErrorEnvelope>(body) {
        match env.error {
            ErrorDetail::Object { message: Some(m) } => return m,
            ErrorDetail::Text(t) => return t,
            ErrorDetail::Object { message: None } => {}
        }
    }
    if let Ok(flat) = serde_json::from_str::<FlatError>(body) {
        return flat.message;
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        "empty response body".into()
    } else {
        trimmed.chars().take(500).collect()
    }
}

/// A message or call resource created at the SMS provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResource {
    pub sid: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub error_code: Option<i64>,
    #[serde(default)]
    pub error_message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tool_call_response() {
        let json = r#"{
            "id": "chatcmpl-1",
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {"name": "check_availability", "arguments": "{\"appointment_date\":\"2025-06-10 10:00\"}"}
                    }]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
        }"#;
        let resp: ChatCompletionResponse = serde_json::from_str(json).unwrap();
        let msg = resp.first_message().unwrap();
        assert!(msg.has_tool_calls());
        assert!(msg.content.is_none());
        let call = &msg.tool_calls.as_ref().unwrap()[0];
        assert_eq!(call.function.name, "check_availability");
        let args = call.function.parsed_arguments().unwrap();
        assert_eq!(args["appointment_date"], "2025-06-10 10:00");
    }

    #[test]
    fn test_tool_message_serialization() {
        let msg = WireMessage::tool("call_9", "ok");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "tool");
        assert_eq!(json["tool_call_id"], "call_9");
        assert!(json.get("tool_calls").is_none());
    }

    #[test]
    fn test_empty_arguments_parse_as_object() {
        let call = FunctionCall {
            name: "current_time".into(),
            arguments: "".into(),
        };
        assert!(call.parsed_arguments().unwrap().is_object());
    }

    #[test]
    fn test_malformed_arguments_error() {
        let call = FunctionCall {
            name: "bookAppointment".into(),
            arguments: "{not json".into(),
        };
        assert!(call.parsed_arguments().is_err());
    }

    #[test]
    fn test_extract_error_message() {
        assert_eq!(
            extract_error_message(r#"{"error":{"message":"bad key","type":"auth"}}"#),
            "bad key"
        );
        assert_eq!(
            extract_error_message(r#"{"code":21211,"message":"invalid To number"}"#),
            "invalid To number"
        );
        assert_eq!(extract_error_message("  "), "empty response body");
        assert_eq!(extract_error_message("gateway down"), "gateway down");
    }

    #[test]
    fn test_provider_resource_parse() {
        let json = r#"{"sid":"SM123","status":"queued","error_code":null}"#;
        let res: ProviderResource = serde_json::from_str(json).unwrap();
        assert_eq!(res.sid, "SM123");
        assert_eq!(res.status.as_deref(), Some("queued"));
    }
}
