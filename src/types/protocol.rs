use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;

/// Messages posted by the webview to the host.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "command", rename_all = "camelCase")]
pub enum WebviewCommand {
    WebviewReady,
    SendMessage {
        message: String,
    },
    StopTest,
    RunTests,
    SelectFile {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        path: Option<PathBuf>,
    },
    OpenCurrentFile,
}

/// Messages posted by the host into the webview.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "command", rename_all = "camelCase")]
pub enum HostMessage {
    #[serde(rename_all = "camelCase")]
    AgentEvent {
        event_name: String,
        data: Value,
    },
    ChatResponse,
    TestStopped,
    ShowExamples {
        examples: Vec<String>,
    },
    #[serde(rename_all = "camelCase")]
    TestFileInfo {
        file_name: String,
    },
    #[serde(rename_all = "camelCase")]
    UpdateFileIndicator {
        workspace_name: String,
        file_name: String,
    },
    ClearChat,
    ShowRunButton,
    HideRunButton,
    HideInputAndRunButton,
    ShowInputAndRunButton,
    Error {
        data: Value,
    },
}

impl HostMessage {
    pub fn agent_event(event: &crate::types::AgentEvent) -> Self {
        let (event_name, data) = event.to_wire();
        Self::AgentEvent { event_name, data }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            data: Value::String(message.into()),
        }
    }
}
