use crate::types::{AgentEvent, LogLevel};
use bytes::BytesMut;
use serde::Deserialize;
use serde_json::Value;

#[derive(Deserialize)]
struct WireEvent {
    event: String,
    #[serde(default)]
    data: Value,
}

/// Splits agent stdout into JSON-lines events, buffering partial lines
/// across chunk boundaries. Lines are decoded only once complete, so a
/// multi-byte character split between chunks survives.
#[derive(Default)]
pub struct EventLineParser {
    buffer: BytesMut,
}

impl EventLineParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn process(&mut self, chunk: &[u8]) -> Vec<AgentEvent> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();

        while let Some(end) = self.buffer.iter().position(|&b| b == b'\n') {
            let line = self.buffer.split_to(end + 1);
            let text = String::from_utf8_lossy(&line);
            if let Some(event) = parse_line(text.trim_end_matches(['\r', '\n'])) {
                events.push(event);
            }
        }

        events
    }

    /// Parses whatever is left after the stream closes without a newline.
    pub fn flush(&mut self) -> Option<AgentEvent> {
        let rest = self.buffer.split();
        parse_line(String::from_utf8_lossy(&rest).trim_end_matches(['\r', '\n']))
    }
}

fn parse_line(line: &str) -> Option<AgentEvent> {
    if line.trim().is_empty() {
        return None;
    }

    if line.trim_start().starts_with('{') {
        match serde_json::from_str::<WireEvent>(line) {
            Ok(wire) => return Some(AgentEvent::from_wire(&wire.event, wire.data)),
            Err(e) => {
                tracing::debug!(error = %e, "agent output line is not an event; treating as log");
            }
        }
    }

    Some(AgentEvent::Log {
        level: LogLevel::Log,
        message: line.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_split_across_chunks() {
        let mut parser = EventLineParser::new();

        let first = parser.process(br#"{"event":"log:markdown:chunk","da"#);
        assert!(first.is_empty());

        let second = parser.process(b"ta\":{\"streamId\":\"s1\",\"chunk\":\"Hi\"}}\n");
        assert_eq!(
            second,
            vec![AgentEvent::MarkdownChunk {
                stream_id: "s1".to_string(),
                chunk: "Hi".to_string()
            }]
        );
    }

    #[test]
    fn test_plain_lines_become_log_events() {
        let mut parser = EventLineParser::new();
        let events = parser.process(b"booting sandbox\r\n\n{not json}\n");
        assert_eq!(
            events,
            vec![
                AgentEvent::Log {
                    level: LogLevel::Log,
                    message: "booting sandbox".to_string()
                },
                AgentEvent::Log {
                    level: LogLevel::Log,
                    message: "{not json}".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_flush_returns_unterminated_tail() {
        let mut parser = EventLineParser::new();
        assert!(parser.process(br#"{"event":"exit","data":0}"#).is_empty());
        assert_eq!(parser.flush(), Some(AgentEvent::Exit { code: Some(0) }));
        assert_eq!(parser.flush(), None);
    }

    #[test]
    fn test_multibyte_character_split_between_chunks() {
        let line = "{\"event\":\"status\",\"data\":\"caf\u{e9}\"}\n".as_bytes();
        let split = line.len() - 4;
        let mut parser = EventLineParser::new();
        assert!(parser.process(&line[..split]).is_empty());
        assert_eq!(
            parser.process(&line[split..]),
            vec![AgentEvent::Status {
                message: "caf\u{e9}".to_string()
            }]
        );
    }
}
