pub mod event;
pub mod protocol;

pub use event::{AgentEvent, LogLevel};
pub use protocol::{HostMessage, WebviewCommand};
