//! The external agent boundary.
//!
//! Every component that talks to the agent receives an `Arc<dyn Agent>`; the
//! binary (or the embedding host) constructs exactly one and tears it down via
//! [`Agent::shutdown`] when the session ends.

pub mod mock;
pub mod process;
pub mod stream;

use crate::types::AgentEvent;
use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub use mock::ScriptedAgent;
pub use process::ProcessAgent;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("agent is not reachable: {0}")]
    Unreachable(String),
    #[error("{0}")]
    Execution(String),
    #[error("agent call was cancelled")]
    Cancelled,
    #[error("agent i/o failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Ordered, unbatched event channel handed to a single agent call.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<AgentEvent>,
}

impl EventSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<AgentEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Returns false once the receiving side is gone.
    pub fn emit(&self, event: AgentEvent) -> bool {
        self.tx.send(event).is_ok()
    }
}

#[async_trait]
pub trait Agent: Send + Sync {
    /// Fails fast with [`AgentError::Unreachable`]; callers do not retry.
    async fn ensure_ready(&self) -> Result<(), AgentError>;

    /// Runs a YAML test document. Resolves once the agent settles, even after
    /// `cancel` fires.
    async fn run(
        &self,
        yaml: &str,
        events: EventSink,
        cancel: CancellationToken,
    ) -> Result<(), AgentError>;

    /// Sends a free-form chat instruction.
    async fn send_message(
        &self,
        message: &str,
        events: EventSink,
        cancel: CancellationToken,
    ) -> Result<(), AgentError>;

    async fn stop(&self) -> Result<(), AgentError> {
        Ok(())
    }

    async fn shutdown(&self) {}
}
