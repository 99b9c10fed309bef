use super::markdown::render_markdown;
use serde::{Deserialize, Serialize};

/// One in-flight streamed markdown entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StreamingBlock {
    pub stream_id: String,
    /// Everything received so far; the rendered entry is always derived from it.
    pub buffer: String,
    /// Set once the block owns a transcript entry.
    pub attached: bool,
    #[serde(skip)]
    pub(crate) entry_index: Option<usize>,
}

impl StreamingBlock {
    pub fn new(stream_id: impl Into<String>) -> Self {
        Self {
            stream_id: stream_id.into(),
            buffer: String::new(),
            attached: false,
            entry_index: None,
        }
    }

    pub fn append(&mut self, chunk: &str) {
        self.buffer.push_str(chunk);
    }

    pub fn render(&self) -> String {
        render_markdown(&self.buffer)
    }

    pub(crate) fn attach(&mut self, entry_index: usize) {
        self.entry_index = Some(entry_index);
        self.attached = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_uses_whole_buffer() {
        let mut block = StreamingBlock::new("s1");
        block.append("**bo");
        assert_eq!(block.render(), "<p>**bo</p>\n");
        block.append("ld**");
        assert_eq!(block.render(), "<p><strong>bold</strong></p>\n");
        assert!(!block.attached);
    }
}
