use crate::types::HostMessage;
use crate::util::is_yaml_path;
use std::path::{Path, PathBuf};

pub const NO_FILE_LABEL: &str = "No file selected";

/// Which YAML file chat actions target.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileIndicator {
    workspace_name: Option<String>,
    file_name: Option<String>,
    selected_file_path: Option<PathBuf>,
}

impl FileIndicator {
    pub fn new(workspace_name: Option<String>) -> Self {
        Self {
            workspace_name,
            ..Self::default()
        }
    }

    pub fn workspace_name(&self) -> Option<&str> {
        self.workspace_name.as_deref()
    }

    pub fn file_name(&self) -> Option<&str> {
        self.file_name.as_deref()
    }

    pub fn selected_file_path(&self) -> Option<&Path> {
        self.selected_file_path.as_deref()
    }

    pub fn has_workspace(&self) -> bool {
        self.workspace_name.is_some()
    }

    /// The selected file, but only when it is a YAML test file.
    pub fn runnable_file(&self) -> Option<&Path> {
        self.selected_file_path().filter(|path| is_yaml_path(path))
    }

    pub fn select(&mut self, path: Option<PathBuf>) {
        self.file_name = path
            .as_deref()
            .and_then(Path::file_name)
            .map(|name| name.to_string_lossy().into_owned());
        self.selected_file_path = path;
    }

    /// Messages that bring the webview in line with this indicator.
    pub fn messages(&self) -> Vec<HostMessage> {
        let Some(workspace_name) = &self.workspace_name else {
            return vec![HostMessage::HideInputAndRunButton];
        };
        let file_name = self
            .file_name
            .clone()
            .unwrap_or_else(|| NO_FILE_LABEL.to_string());

        let mut messages = vec![
            HostMessage::ShowInputAndRunButton,
            HostMessage::UpdateFileIndicator {
                workspace_name: workspace_name.clone(),
                file_name: file_name.clone(),
            },
        ];
        if self.selected_file_path.is_some() {
            messages.push(HostMessage::TestFileInfo { file_name });
        }
        messages.push(if self.runnable_file().is_some() {
            HostMessage::ShowRunButton
        } else {
            HostMessage::HideRunButton
        });
        messages
    }
}
