use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_TEST_DIR: &str = "testdriver";
pub const DEFAULT_AGENT_COMMAND: &str = "testdriverai";
const DEFAULT_READY_TIMEOUT_MS: u64 = 10_000;

const WORKSPACE_ENV: &str = "TDCHAT_WORKSPACE";
const TEST_DIR_ENV: &str = "TDCHAT_TEST_DIR";
const AGENT_COMMAND_ENV: &str = "TDCHAT_AGENT_COMMAND";
const AGENT_ARGS_ENV: &str = "TDCHAT_AGENT_ARGS";
const SCHEMA_PATH_ENV: &str = "TDCHAT_SCHEMA_PATH";
const READY_TIMEOUT_ENV: &str = "TDCHAT_READY_TIMEOUT_MS";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub workspace_dir: PathBuf,
    pub test_dir: String,
    pub agent_command: String,
    pub agent_args: Vec<String>,
    pub schema_path: Option<PathBuf>,
    pub ready_timeout_ms: u64,
}

impl Config {
    pub fn load() -> Result<Self> {
        let workspace_dir = match non_empty_env(WORKSPACE_ENV) {
            Some(dir) => PathBuf::from(dir),
            None => std::env::current_dir()?,
        };
        let test_dir = non_empty_env(TEST_DIR_ENV).unwrap_or_else(|| DEFAULT_TEST_DIR.to_string());
        let agent_command =
            non_empty_env(AGENT_COMMAND_ENV).unwrap_or_else(|| DEFAULT_AGENT_COMMAND.to_string());
        let agent_args = match non_empty_env(AGENT_ARGS_ENV) {
            Some(raw) => shell_words::split(&raw)
                .with_context(|| format!("Invalid {AGENT_ARGS_ENV} '{raw}'"))?,
            None => Vec::new(),
        };
        let schema_path = non_empty_env(SCHEMA_PATH_ENV).map(PathBuf::from);
        let ready_timeout_ms = match non_empty_env(READY_TIMEOUT_ENV) {
            Some(raw) => raw
                .parse::<u64>()
                .with_context(|| format!("Invalid {READY_TIMEOUT_ENV} '{raw}'"))?,
            None => DEFAULT_READY_TIMEOUT_MS,
        };

        Ok(Self {
            workspace_dir,
            test_dir,
            agent_command,
            agent_args,
            schema_path,
            ready_timeout_ms,
        })
    }

    pub fn validate(&self) -> Result<()> {
        if !self.workspace_dir.is_dir() {
            bail!(
                "Workspace directory '{}' does not exist",
                self.workspace_dir.display()
            );
        }

        if self.agent_command.trim().is_empty() {
            bail!("Agent command must not be empty");
        }

        if self.test_dir.trim().is_empty() || self.test_dir.contains(['/', '\\']) {
            bail!(
                "Invalid test directory name '{}': expected a single directory name",
                self.test_dir
            );
        }

        if let Some(schema_path) = &self.schema_path {
            if !schema_path.is_file() {
                bail!("Schema file '{}' does not exist", schema_path.display());
            }
        }

        if self.ready_timeout_ms == 0 {
            bail!("{READY_TIMEOUT_ENV} must be greater than zero");
        }

        Ok(())
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_millis(self.ready_timeout_ms)
    }

    pub fn workspace_name(&self) -> String {
        self.workspace_dir
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.workspace_dir.display().to_string())
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
