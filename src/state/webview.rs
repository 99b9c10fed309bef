use super::stream_block::StreamingBlock;
use super::transcript::{ChatMessage, Role, SpinnerState, TranscriptEntry};
use crate::types::{AgentEvent, HostMessage, LogLevel, WebviewCommand};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;

const RUNNING_TESTS_TEXT: &str = "Running tests...";
const STOPPING_TEXT: &str = "Stopping test...";

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Running,
}

/// What the primary action control currently offers.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActionLabel {
    Send,
    Stop,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Controls {
    pub run_button_visible: bool,
    pub input_visible: bool,
}

impl Default for Controls {
    fn default() -> Self {
        Self {
            run_button_visible: false,
            input_visible: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FileIndicatorView {
    pub workspace_name: String,
    pub file_name: String,
}

/// Webview-side UI state. It only changes in response to host messages and
/// user actions; user actions hand back the command to post to the host.
#[derive(Debug)]
pub struct WebviewState {
    transcript: Vec<TranscriptEntry>,
    open_streams: HashMap<String, StreamingBlock>,
    run_state: RunState,
    active_spinner: Option<usize>,
    controls: Controls,
    file_indicator: Option<FileIndicatorView>,
    test_file_name: Option<String>,
    examples: Vec<String>,
    focus_input: bool,
    next_message_id: u64,
}

impl Default for WebviewState {
    fn default() -> Self {
        Self::new()
    }
}

impl WebviewState {
    pub fn new() -> Self {
        Self {
            transcript: Vec::new(),
            open_streams: HashMap::new(),
            run_state: RunState::Idle,
            active_spinner: None,
            controls: Controls::default(),
            file_indicator: None,
            test_file_name: None,
            examples: Vec::new(),
            focus_input: false,
            next_message_id: 1,
        }
    }

    pub fn transcript(&self) -> &[TranscriptEntry] {
        &self.transcript
    }

    pub fn messages(&self) -> impl Iterator<Item = &ChatMessage> {
        self.transcript.iter().filter_map(TranscriptEntry::as_message)
    }

    pub fn run_state(&self) -> RunState {
        self.run_state
    }

    pub fn is_running(&self) -> bool {
        self.run_state == RunState::Running
    }

    pub fn action_label(&self) -> ActionLabel {
        match self.run_state {
            RunState::Idle => ActionLabel::Send,
            RunState::Running => ActionLabel::Stop,
        }
    }

    pub fn controls(&self) -> &Controls {
        &self.controls
    }

    pub fn file_indicator(&self) -> Option<&FileIndicatorView> {
        self.file_indicator.as_ref()
    }

    pub fn test_file_name(&self) -> Option<&str> {
        self.test_file_name.as_deref()
    }

    pub fn examples(&self) -> &[String] {
        &self.examples
    }

    pub fn is_empty(&self) -> bool {
        self.transcript.is_empty()
    }

    pub fn open_stream_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.open_streams.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// Rendered HTML of the most recent transcript entry for `stream_id`.
    pub fn stream_html(&self, stream_id: &str) -> Option<&str> {
        self.transcript.iter().rev().find_map(|entry| match entry {
            TranscriptEntry::Stream {
                stream_id: id,
                html,
                ..
            } if id == stream_id => Some(html.as_str()),
            _ => None,
        })
    }

    /// Returns and clears a pending request to focus the input box.
    pub fn take_focus_request(&mut self) -> bool {
        std::mem::take(&mut self.focus_input)
    }

    // User actions.

    pub fn ready(&self) -> WebviewCommand {
        WebviewCommand::WebviewReady
    }

    /// Appends the user message regardless of run state.
    pub fn send_message(&mut self, text: &str) -> Option<WebviewCommand> {
        let message = text.trim();
        if message.is_empty() {
            return None;
        }
        self.push_message(Role::User, message);
        self.run_state = RunState::Running;
        Some(WebviewCommand::SendMessage {
            message: message.to_string(),
        })
    }

    /// The send control doubles as the cancel control while running.
    pub fn primary_action(&mut self, input: &str) -> Option<WebviewCommand> {
        if self.is_running() && input.trim().is_empty() {
            return self.stop_test();
        }
        self.send_message(input)
    }

    pub fn run_tests(&mut self) -> WebviewCommand {
        let text = match &self.test_file_name {
            Some(name) => format!("Running {name}..."),
            None => RUNNING_TESTS_TEXT.to_string(),
        };
        self.push_message(Role::Status, text);
        self.run_state = RunState::Running;
        WebviewCommand::RunTests
    }

    pub fn stop_test(&mut self) -> Option<WebviewCommand> {
        if !self.is_running() {
            return None;
        }
        self.push_message(Role::Status, STOPPING_TEXT);
        self.run_state = RunState::Idle;
        Some(WebviewCommand::StopTest)
    }

    pub fn select_file(&self, path: Option<PathBuf>) -> WebviewCommand {
        WebviewCommand::SelectFile { path }
    }

    pub fn open_current_file(&self) -> WebviewCommand {
        WebviewCommand::OpenCurrentFile
    }

    // Host messages.

    pub fn apply(&mut self, message: HostMessage) {
        match message {
            HostMessage::AgentEvent { event_name, data } => {
                self.apply_agent_event(AgentEvent::from_wire(&event_name, data));
            }
            HostMessage::ChatResponse | HostMessage::TestStopped => self.finish_run(),
            HostMessage::Error { data } => {
                self.complete_spinner();
                self.push_message(Role::Error, payload_text(&data));
                self.finish_run();
            }
            HostMessage::ShowExamples { examples } => self.examples = examples,
            HostMessage::TestFileInfo { file_name } => self.test_file_name = Some(file_name),
            HostMessage::UpdateFileIndicator {
                workspace_name,
                file_name,
            } => {
                self.file_indicator = Some(FileIndicatorView {
                    workspace_name,
                    file_name,
                });
            }
            HostMessage::ClearChat => {
                self.transcript.clear();
                self.open_streams.clear();
                self.active_spinner = None;
            }
            HostMessage::ShowRunButton => self.controls.run_button_visible = true,
            HostMessage::HideRunButton => self.controls.run_button_visible = false,
            HostMessage::HideInputAndRunButton => {
                self.controls.input_visible = false;
                self.controls.run_button_visible = false;
            }
            HostMessage::ShowInputAndRunButton => {
                self.controls.input_visible = true;
                self.controls.run_button_visible = true;
            }
        }
    }

    pub fn apply_agent_event(&mut self, event: AgentEvent) {
        if matches!(
            event,
            AgentEvent::Log {
                level: LogLevel::Debug,
                ..
            }
        ) {
            return;
        }
        if event.is_log_family() {
            self.complete_spinner();
        }

        match event {
            AgentEvent::MarkdownStatic { markdown } => {
                let role = if markdown.trim_start().starts_with("```") {
                    Role::Code
                } else {
                    Role::Assistant
                };
                self.push_message(role, markdown);
            }
            AgentEvent::MarkdownStart { stream_id } => self.open_stream(stream_id),
            AgentEvent::MarkdownChunk { stream_id, chunk } => self.append_chunk(stream_id, &chunk),
            AgentEvent::MarkdownEnd { stream_id } => self.close_stream(&stream_id),
            AgentEvent::Narration { text } => self.start_spinner(text),
            AgentEvent::Log { message, .. } => self.push_message(Role::Status, message),
            AgentEvent::Status { message } => self.push_message(Role::Status, message),
            AgentEvent::Error { message, .. } => self.push_message(Role::Error, message),
            AgentEvent::Exit { .. } => {
                self.complete_spinner();
                self.finish_run();
            }
            AgentEvent::Other { name, .. } => {
                tracing::warn!(event = %name, "ignoring unrecognized agent event");
            }
        }
    }

    fn finish_run(&mut self) {
        self.run_state = RunState::Idle;
        self.focus_input = true;
    }

    fn push_message(&mut self, role: Role, content: impl Into<String>) {
        let id = self.next_message_id;
        self.next_message_id += 1;
        self.transcript
            .push(TranscriptEntry::Message(ChatMessage::new(id, role, content)));
    }

    fn open_stream(&mut self, stream_id: String) {
        if self.open_streams.contains_key(&stream_id) {
            self.close_stream(&stream_id);
        }
        self.open_streams
            .insert(stream_id.clone(), StreamingBlock::new(stream_id));
    }

    fn append_chunk(&mut self, stream_id: String, chunk: &str) {
        let block = self
            .open_streams
            .entry(stream_id.clone())
            .or_insert_with(|| StreamingBlock::new(stream_id.clone()));
        block.append(chunk);
        let html = block.render();

        match block.entry_index {
            Some(index) => {
                if let Some(TranscriptEntry::Stream { html: current, .. }) =
                    self.transcript.get_mut(index)
                {
                    *current = html;
                }
            }
            None => {
                block.attach(self.transcript.len());
                self.transcript.push(TranscriptEntry::Stream {
                    stream_id,
                    html,
                    finished: false,
                });
            }
        }
    }

    fn close_stream(&mut self, stream_id: &str) {
        let Some(block) = self.open_streams.remove(stream_id) else {
            tracing::debug!(stream_id, "end for unknown stream");
            return;
        };
        if let Some(TranscriptEntry::Stream { finished, .. }) =
            block.entry_index.and_then(|index| self.transcript.get_mut(index))
        {
            *finished = true;
        }
    }

    fn start_spinner(&mut self, text: String) {
        self.complete_spinner();
        self.active_spinner = Some(self.transcript.len());
        self.transcript.push(TranscriptEntry::Loading {
            text,
            state: SpinnerState::Active,
        });
    }

    fn complete_spinner(&mut self) {
        let Some(index) = self.active_spinner.take() else {
            return;
        };
        if let Some(TranscriptEntry::Loading { state, .. }) = self.transcript.get_mut(index) {
            *state = SpinnerState::Done;
        }
    }
}

fn payload_text(data: &Value) -> String {
    match data {
        Value::String(text) => text.clone(),
        Value::Object(map) => map
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| data.to_string()),
        other => other.to_string(),
    }
}
