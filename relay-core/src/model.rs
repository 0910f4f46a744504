use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One conversation turn. Immutable once appended; the in-progress assistant
/// message is the only one mutated (by appending fragments) during streaming.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    #[serde(rename = "type", default = "default_kind")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    #[serde(rename = "timestamp", default)]
    pub timestamp_ms: i64,
}

fn default_kind() -> String {
    "text".to_string()
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        let content = content.into();
        Self {
            id: format!("msg-{}", now_ms()),
            role,
            content,
            kind: default_kind(),
            metadata: None,
            timestamp_ms: now_ms(),
        }
    }
}

pub fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// Constructed per call; never mutated after being handed to a provider.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CompletionRequest {
    pub messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub streaming: bool,
}

impl CompletionRequest {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            system_prompt: None,
            temperature: 0.7,
            max_tokens: 2000,
            streaming: false,
        }
    }

    /// Content of the most recent user message, if any. The demo fallback
    /// keys off this alone; earlier turns are ignored by design.
    pub fn last_user_content(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub struct TokenUsage {
    pub prompt: u32,
    pub completion: u32,
    pub total: u32,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CompletionResponse {
    pub content: String,
    pub model: String,
    pub usage: TokenUsage,
    pub latency_ms: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_json_roundtrip() {
        let msg = Message::new(Role::User, "Hello");
        let json = serde_json::to_string(&msg).unwrap();
        let de: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(msg, de);
    }

    #[test]
    fn role_json_is_lowercase() {
        let json = r#"{"id":"m1","role":"assistant","content":"ok"}"#;
        let msg: Message = serde_json::from_str(json).unwrap();
        assert_eq!(msg.role, Role::Assistant);
        assert_eq!(msg.kind, "text"); // defaulted
        let back = serde_json::to_string(&msg).unwrap();
        assert!(back.contains("\"assistant\""));
    }

    #[test]
    fn last_user_content_skips_assistant_turns() {
        let req = CompletionRequest::new(vec![
            Message::new(Role::User, "first"),
            Message::new(Role::Assistant, "reply"),
            Message::new(Role::User, "second"),
            Message::new(Role::Assistant, "reply again"),
        ]);
        assert_eq!(req.last_user_content(), Some("second"));
    }

    #[test]
    fn last_user_content_empty_conversation() {
        let req = CompletionRequest::new(vec![]);
        assert_eq!(req.last_user_content(), None);
    }

    #[test]
    fn completion_response_roundtrip() {
        let resp = CompletionResponse {
            content: "Hello back".into(),
            model: "gpt-4-turbo-preview".into(),
            usage: TokenUsage {
                prompt: 10,
                completion: 20,
                total: 30,
            },
            latency_ms: 42,
        };
        let json = serde_json::to_string(&resp).unwrap();
        let de: CompletionResponse = serde_json::from_str(&json).unwrap();
        assert_eq!(resp, de);
    }
}
