pub mod markdown;
mod stream_block;
mod transcript;
mod webview;

#[cfg(test)]
mod tests;

pub use stream_block::StreamingBlock;
pub use transcript::{ChatMessage, Role, SpinnerState, TranscriptEntry};
pub use webview::{ActionLabel, Controls, FileIndicatorView, RunState, WebviewState};
