//! Host side of the webview channel.
//!
//! Webview commands become agent calls; every event an agent call emits is
//! forwarded as one `agentEvent` message, in order, before the call's
//! terminal message (`chatResponse` or `error`).

mod file_indicator;

pub use file_indicator::{FileIndicator, NO_FILE_LABEL};

use crate::agent::{Agent, AgentError, EventSink};
use crate::types::{HostMessage, WebviewCommand};
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::{self, JoinHandle};
use tokio_util::sync::CancellationToken;

/// Example prompts shown in an empty chat.
pub const EXAMPLES: &[&str] = &[
    "Open Google Chrome and search for TestDriver",
    "Log in to the app with the test account",
    "Add an item to the cart and check out",
    "Verify the dashboard shows the latest report",
];

const NO_TEST_FILE_ERROR: &str = "Select a YAML test file before running tests";

/// What the embedder has to do after a command was handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayOutcome {
    Handled,
    OpenFile(PathBuf),
}

#[derive(Debug)]
enum CallKind {
    Chat(String),
    Run(String),
}

#[derive(Debug)]
struct CallRequest {
    kind: CallKind,
    cancel: CancellationToken,
}

pub struct EventRelay {
    agent: Arc<dyn Agent>,
    outbound: mpsc::UnboundedSender<HostMessage>,
    indicator: FileIndicator,
    call_tx: mpsc::UnboundedSender<CallRequest>,
    calls_cancel: CancellationToken,
    worker: JoinHandle<()>,
}

impl EventRelay {
    /// Fails fast when the agent is not reachable.
    pub async fn connect(
        agent: Arc<dyn Agent>,
        outbound: mpsc::UnboundedSender<HostMessage>,
        workspace_name: Option<String>,
    ) -> Result<Self> {
        agent
            .ensure_ready()
            .await
            .context("Failed to connect to the agent")?;

        let (call_tx, call_rx) = mpsc::unbounded_channel();
        let worker = task::spawn(call_worker(Arc::clone(&agent), call_rx, outbound.clone()));

        Ok(Self {
            agent,
            outbound,
            indicator: FileIndicator::new(workspace_name),
            call_tx,
            calls_cancel: CancellationToken::new(),
            worker,
        })
    }

    pub fn file_indicator(&self) -> &FileIndicator {
        &self.indicator
    }

    pub async fn handle(&mut self, command: WebviewCommand) -> Result<RelayOutcome> {
        match command {
            WebviewCommand::WebviewReady => {
                self.post(HostMessage::ShowExamples {
                    examples: EXAMPLES.iter().map(|e| e.to_string()).collect(),
                });
                self.publish_indicator();
            }
            WebviewCommand::SendMessage { message } => {
                self.enqueue(CallKind::Chat(message));
            }
            WebviewCommand::RunTests => self.run_selected_file().await,
            WebviewCommand::StopTest => self.stop().await,
            WebviewCommand::SelectFile { path } => {
                if path.is_some() {
                    self.active_editor_changed(path);
                } else {
                    tracing::debug!("selectFile without a path; nothing to pick from");
                }
            }
            WebviewCommand::OpenCurrentFile => {
                if let Some(path) = self.indicator.selected_file_path() {
                    return Ok(RelayOutcome::OpenFile(path.to_path_buf()));
                }
                self.post(HostMessage::error("No file is selected"));
            }
        }
        Ok(RelayOutcome::Handled)
    }

    /// The focused editor changed (or a file was picked explicitly).
    pub fn active_editor_changed(&mut self, path: Option<PathBuf>) {
        self.indicator.select(path);
        self.publish_indicator();
    }

    pub fn clear_chat(&self) {
        self.post(HostMessage::ClearChat);
    }

    /// Cancels in-flight and queued calls, then stops the worker.
    pub async fn shutdown(self) {
        self.calls_cancel.cancel();
        drop(self.call_tx);
        if let Err(join_error) = self.worker.await {
            tracing::warn!("Agent call worker ended abnormally: {join_error}");
        }
    }

    async fn run_selected_file(&mut self) {
        let Some(path) = self.indicator.runnable_file().map(|p| p.to_path_buf()) else {
            self.post(HostMessage::error(NO_TEST_FILE_ERROR));
            return;
        };
        match tokio::fs::read_to_string(&path).await {
            Ok(yaml) => self.enqueue(CallKind::Run(yaml)),
            Err(error) => self.post(HostMessage::error(format!(
                "Failed to read {}: {error}",
                path.display()
            ))),
        }
    }

    async fn stop(&mut self) {
        // Everything enqueued so far shares this token.
        let cancelled = std::mem::replace(&mut self.calls_cancel, CancellationToken::new());
        cancelled.cancel();
        if let Err(error) = self.agent.stop().await {
            tracing::warn!("Agent stop failed: {error}");
        }
        self.post(HostMessage::TestStopped);
    }

    fn enqueue(&self, kind: CallKind) {
        let request = CallRequest {
            kind,
            cancel: self.calls_cancel.child_token(),
        };
        if self.call_tx.send(request).is_err() {
            self.post(HostMessage::error("Agent call worker is not running"));
        }
    }

    fn publish_indicator(&self) {
        for message in self.indicator.messages() {
            self.post(message);
        }
    }

    fn post(&self, message: HostMessage) {
        if self.outbound.send(message).is_err() {
            tracing::debug!("Webview channel closed; dropping host message");
        }
    }
}

/// Runs agent calls one at a time, in the order they were requested.
async fn call_worker(
    agent: Arc<dyn Agent>,
    mut requests: mpsc::UnboundedReceiver<CallRequest>,
    outbound: mpsc::UnboundedSender<HostMessage>,
) {
    while let Some(CallRequest { kind, cancel }) = requests.recv().await {
        if cancel.is_cancelled() {
            tracing::debug!("Skipping agent call cancelled before it started");
            continue;
        }

        let (events, forwarder) = {
            let outbound = outbound.clone();
            let (events, mut event_rx) = EventSink::channel();
            let handle = task::spawn(async move {
                while let Some(event) = event_rx.recv().await {
                    let _ = outbound.send(HostMessage::agent_event(&event));
                }
            });
            (events, handle)
        };

        let result = match &kind {
            CallKind::Chat(message) => agent.send_message(message, events, cancel.clone()).await,
            CallKind::Run(yaml) => agent.run(yaml, events, cancel.clone()).await,
        };

        if let Err(join_error) = forwarder.await {
            let _ = outbound.send(HostMessage::error(format!(
                "Event forwarding failed: {join_error}"
            )));
            continue;
        }

        match result {
            Ok(()) if cancel.is_cancelled() => {}
            Ok(()) => {
                let _ = outbound.send(HostMessage::ChatResponse);
            }
            Err(AgentError::Cancelled) => tracing::debug!("Agent call cancelled"),
            Err(error) if cancel.is_cancelled() => {
                tracing::debug!("Agent call failed after cancellation: {error}");
            }
            Err(error) => {
                tracing::warn!("Agent call failed: {error}");
                let _ = outbound.send(HostMessage::error(error.to_string()));
            }
        }
    }
}
