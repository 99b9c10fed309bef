use super::{Agent, AgentError, EventSink};
use crate::types::AgentEvent;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub enum ScriptedOutcome {
    Pass,
    Fail(String),
    /// Blocks until the call's cancellation token fires.
    WaitForCancel,
}

#[derive(Debug, Clone)]
pub struct ScriptedCall {
    pub events: Vec<AgentEvent>,
    pub outcome: ScriptedOutcome,
}

impl ScriptedCall {
    pub fn pass(events: Vec<AgentEvent>) -> Self {
        Self {
            events,
            outcome: ScriptedOutcome::Pass,
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            events: Vec::new(),
            outcome: ScriptedOutcome::Fail(message.into()),
        }
    }

    pub fn wait_for_cancel(events: Vec<AgentEvent>) -> Self {
        Self {
            events,
            outcome: ScriptedOutcome::WaitForCancel,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedCall {
    Run(String),
    Message(String),
    Stop,
}

#[derive(Default)]
struct ScriptState {
    responses: VecDeque<ScriptedCall>,
    calls: Vec<RecordedCall>,
}

/// In-process agent that replays canned responses in call order.
#[derive(Clone)]
pub struct ScriptedAgent {
    state: Arc<Mutex<ScriptState>>,
    reachable: bool,
}

impl ScriptedAgent {
    pub fn new(responses: Vec<ScriptedCall>) -> Self {
        Self {
            state: Arc::new(Mutex::new(ScriptState {
                responses: responses.into(),
                calls: Vec::new(),
            })),
            reachable: true,
        }
    }

    pub fn unreachable() -> Self {
        Self {
            reachable: false,
            ..Self::new(Vec::new())
        }
    }

    pub fn push_response(&self, call: ScriptedCall) {
        self.lock().responses.push_back(call);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.lock().calls.clone()
    }

    fn lock(&self) -> MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn play(
        &self,
        record: RecordedCall,
        events: EventSink,
        cancel: CancellationToken,
    ) -> Result<(), AgentError> {
        let next = {
            let mut state = self.lock();
            state.calls.push(record);
            state.responses.pop_front()
        };
        let Some(call) = next else {
            return Err(AgentError::Execution(
                "ScriptedAgent: no more responses configured".to_string(),
            ));
        };

        for event in call.events {
            events.emit(event);
        }

        match call.outcome {
            ScriptedOutcome::Pass => Ok(()),
            ScriptedOutcome::Fail(message) => Err(AgentError::Execution(message)),
            ScriptedOutcome::WaitForCancel => {
                cancel.cancelled().await;
                Err(AgentError::Cancelled)
            }
        }
    }
}

#[async_trait]
impl Agent for ScriptedAgent {
    async fn ensure_ready(&self) -> Result<(), AgentError> {
        if self.reachable {
            Ok(())
        } else {
            Err(AgentError::Unreachable("scripted agent offline".to_string()))
        }
    }

    async fn run(
        &self,
        yaml: &str,
        events: EventSink,
        cancel: CancellationToken,
    ) -> Result<(), AgentError> {
        self.play(RecordedCall::Run(yaml.to_string()), events, cancel)
            .await
    }

    async fn send_message(
        &self,
        message: &str,
        events: EventSink,
        cancel: CancellationToken,
    ) -> Result<(), AgentError> {
        self.play(RecordedCall::Message(message.to_string()), events, cancel)
            .await
    }

    async fn stop(&self) -> Result<(), AgentError> {
        self.lock().calls.push(RecordedCall::Stop);
        Ok(())
    }
}
