use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const MARKDOWN_STATIC: &str = "log:markdown:static";
pub const MARKDOWN_START: &str = "log:markdown:start";
pub const MARKDOWN_CHUNK: &str = "log:markdown:chunk";
pub const MARKDOWN_END: &str = "log:markdown:end";
pub const NARRATION: &str = "log:narration";
pub const STATUS: &str = "status";
pub const EXIT: &str = "exit";
const LOG_PREFIX: &str = "log:";
const ERROR_PREFIX: &str = "error:";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Debug,
    Log,
    Info,
    Warn,
}

impl LogLevel {
    fn from_suffix(suffix: &str) -> Option<Self> {
        match suffix {
            "debug" => Some(Self::Debug),
            "log" => Some(Self::Log),
            "info" => Some(Self::Info),
            "warn" => Some(Self::Warn),
            _ => None,
        }
    }

    fn as_suffix(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Log => "log",
            Self::Info => "info",
            Self::Warn => "warn",
        }
    }
}

/// Every event the agent can emit. Names outside the known set land in `Other`.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    MarkdownStatic { markdown: String },
    MarkdownStart { stream_id: String },
    MarkdownChunk { stream_id: String, chunk: String },
    MarkdownEnd { stream_id: String },
    Narration { text: String },
    Log { level: LogLevel, message: String },
    Status { message: String },
    Error { kind: String, message: String },
    Exit { code: Option<i32> },
    Other { name: String, data: Value },
}

impl AgentEvent {
    pub fn from_wire(name: &str, data: Value) -> Self {
        match name {
            MARKDOWN_STATIC => Self::MarkdownStatic {
                markdown: text_field(&data, &["markdown", "content", "text"]),
            },
            MARKDOWN_START => Self::MarkdownStart {
                stream_id: stream_id_field(&data),
            },
            MARKDOWN_CHUNK => {
                let (stream_id, chunk) = match &data {
                    Value::Array(items) => (
                        items.first().map(value_text).unwrap_or_default(),
                        items.get(1).map(value_text).unwrap_or_default(),
                    ),
                    _ => (
                        stream_id_field(&data),
                        text_field(&data, &["chunk", "text", "content"]),
                    ),
                };
                Self::MarkdownChunk { stream_id, chunk }
            }
            MARKDOWN_END => Self::MarkdownEnd {
                stream_id: stream_id_field(&data),
            },
            NARRATION => Self::Narration {
                text: text_field(&data, &["text", "message"]),
            },
            STATUS => Self::Status {
                message: text_field(&data, &["message", "status"]),
            },
            EXIT => Self::Exit {
                code: match &data {
                    Value::Number(n) => n.as_i64().and_then(|c| i32::try_from(c).ok()),
                    Value::Object(map) => map
                        .get("code")
                        .and_then(Value::as_i64)
                        .and_then(|c| i32::try_from(c).ok()),
                    _ => None,
                },
            },
            _ => {
                if let Some(level) = name
                    .strip_prefix(LOG_PREFIX)
                    .and_then(LogLevel::from_suffix)
                {
                    return Self::Log {
                        level,
                        message: text_field(&data, &["message", "text"]),
                    };
                }
                if let Some(kind) = name.strip_prefix(ERROR_PREFIX) {
                    return Self::Error {
                        kind: kind.to_string(),
                        message: text_field(&data, &["message", "error"]),
                    };
                }
                Self::Other {
                    name: name.to_string(),
                    data,
                }
            }
        }
    }

    pub fn name(&self) -> String {
        match self {
            Self::MarkdownStatic { .. } => MARKDOWN_STATIC.to_string(),
            Self::MarkdownStart { .. } => MARKDOWN_START.to_string(),
            Self::MarkdownChunk { .. } => MARKDOWN_CHUNK.to_string(),
            Self::MarkdownEnd { .. } => MARKDOWN_END.to_string(),
            Self::Narration { .. } => NARRATION.to_string(),
            Self::Log { level, .. } => format!("{LOG_PREFIX}{}", level.as_suffix()),
            Self::Status { .. } => STATUS.to_string(),
            Self::Error { kind, .. } => format!("{ERROR_PREFIX}{kind}"),
            Self::Exit { .. } => EXIT.to_string(),
            Self::Other { name, .. } => name.clone(),
        }
    }

    pub fn to_wire(&self) -> (String, Value) {
        let data = match self {
            Self::MarkdownStatic { markdown } => json!({ "markdown": markdown }),
            Self::MarkdownStart { stream_id } | Self::MarkdownEnd { stream_id } => {
                json!({ "streamId": stream_id })
            }
            Self::MarkdownChunk { stream_id, chunk } => {
                json!({ "streamId": stream_id, "chunk": chunk })
            }
            Self::Narration { text } => json!(text),
            Self::Log { message, .. } | Self::Status { message } => json!(message),
            Self::Error { message, .. } => json!({ "message": message }),
            Self::Exit { code } => json!({ "code": code }),
            Self::Other { data, .. } => data.clone(),
        };
        (self.name(), data)
    }

    /// Any `log:*` event, streaming markdown and unrecognized levels included.
    pub fn is_log_family(&self) -> bool {
        match self {
            Self::MarkdownStatic { .. }
            | Self::MarkdownStart { .. }
            | Self::MarkdownChunk { .. }
            | Self::MarkdownEnd { .. }
            | Self::Narration { .. }
            | Self::Log { .. } => true,
            Self::Other { name, .. } => name.starts_with(LOG_PREFIX),
            _ => false,
        }
    }

    /// Plain text suitable for a per-test output log, if the event carries any.
    pub fn output_text(&self) -> Option<String> {
        match self {
            Self::MarkdownStatic { markdown } => Some(format!("{markdown}\n")),
            Self::MarkdownChunk { chunk, .. } => Some(chunk.clone()),
            Self::MarkdownEnd { .. } => Some("\n".to_string()),
            Self::Narration { text } => Some(format!("{text}\n")),
            Self::Log { level, message } if *level != LogLevel::Debug => {
                Some(format!("{message}\n"))
            }
            Self::Status { message } => Some(format!("{message}\n")),
            Self::Error { message, .. } => Some(format!("{message}\n")),
            _ => None,
        }
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn text_field(data: &Value, keys: &[&str]) -> String {
    if let Value::Object(map) = data {
        for key in keys {
            if let Some(value) = map.get(*key) {
                return value_text(value);
            }
        }
        return data.to_string();
    }
    value_text(data)
}

fn stream_id_field(data: &Value) -> String {
    text_field(data, &["streamId", "stream_id", "id"])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_markdown_events_accept_string_and_object_payloads() {
        assert_eq!(
            AgentEvent::from_wire(MARKDOWN_START, json!("s1")),
            AgentEvent::MarkdownStart {
                stream_id: "s1".to_string()
            }
        );
        assert_eq!(
            AgentEvent::from_wire(MARKDOWN_END, json!({ "streamId": "s1" })),
            AgentEvent::MarkdownEnd {
                stream_id: "s1".to_string()
            }
        );
        assert_eq!(
            AgentEvent::from_wire(MARKDOWN_CHUNK, json!(["s1", "# Hi"])),
            AgentEvent::MarkdownChunk {
                stream_id: "s1".to_string(),
                chunk: "# Hi".to_string()
            }
        );
        assert_eq!(
            AgentEvent::from_wire(MARKDOWN_CHUNK, json!({ "streamId": "s2", "chunk": "x" })),
            AgentEvent::MarkdownChunk {
                stream_id: "s2".to_string(),
                chunk: "x".to_string()
            }
        );
    }

    #[test]
    fn test_log_and_error_families_are_parsed_by_prefix() {
        assert_eq!(
            AgentEvent::from_wire("log:warn", json!("careful")),
            AgentEvent::Log {
                level: LogLevel::Warn,
                message: "careful".to_string()
            }
        );
        assert_eq!(
            AgentEvent::from_wire("error:fatal", json!({ "message": "boom" })),
            AgentEvent::Error {
                kind: "fatal".to_string(),
                message: "boom".to_string()
            }
        );
        assert_eq!(
            AgentEvent::from_wire("exit", json!(3)),
            AgentEvent::Exit { code: Some(3) }
        );
    }

    #[test]
    fn test_unknown_names_are_preserved() {
        let event = AgentEvent::from_wire("log:trace", json!({ "a": 1 }));
        assert_eq!(
            event,
            AgentEvent::Other {
                name: "log:trace".to_string(),
                data: json!({ "a": 1 })
            }
        );
        assert_eq!(event.name(), "log:trace");
        assert!(event.is_log_family());
        assert!(!AgentEvent::from_wire("vm:booted", json!(null)).is_log_family());
    }

    #[test]
    fn test_to_wire_parses_back_to_same_event() {
        let events = [
            AgentEvent::MarkdownChunk {
                stream_id: "s1".to_string(),
                chunk: "text".to_string(),
            },
            AgentEvent::Error {
                kind: "sdk".to_string(),
                message: "down".to_string(),
            },
            AgentEvent::Log {
                level: LogLevel::Info,
                message: "hi".to_string(),
            },
        ];
        for event in events {
            let (name, data) = event.to_wire();
            assert_eq!(AgentEvent::from_wire(&name, data), event);
        }
    }

    #[test]
    fn test_output_text_skips_debug_and_lifecycle_events() {
        let debug = AgentEvent::Log {
            level: LogLevel::Debug,
            message: "noise".to_string(),
        };
        assert_eq!(debug.output_text(), None);
        assert_eq!(
            AgentEvent::MarkdownStart {
                stream_id: "s".to_string()
            }
            .output_text(),
            None
        );
        assert_eq!(
            AgentEvent::Status {
                message: "ok".to_string()
            }
            .output_text()
            .as_deref(),
            Some("ok\n")
        );
    }
}
