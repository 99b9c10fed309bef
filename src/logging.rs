use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

const LOG_FILTER_ENV: &str = "TDCHAT_LOG";
const LOG_PATH_ENV: &str = "TDCHAT_LOG_PATH";

/// Where log lines end up. Protocol-carrying stdout is never a target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogTarget {
    Stderr,
    File(PathBuf),
}

pub fn resolve_log_target() -> LogTarget {
    std::env::var(LOG_PATH_ENV)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .map(|v| LogTarget::File(PathBuf::from(v)))
        .unwrap_or(LogTarget::Stderr)
}

pub fn init_logging() -> Result<()> {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .with_env_var(LOG_FILTER_ENV)
        .from_env_lossy();

    match resolve_log_target() {
        LogTarget::File(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
                .map_err(|e| anyhow::anyhow!("Failed to install logger: {e}"))?;
        }
        LogTarget::Stderr => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_ansi(std::io::stderr().is_terminal())
                .with_target(false)
                .with_writer(std::io::stderr)
                .compact()
                .try_init()
                .map_err(|e| anyhow::anyhow!("Failed to install logger: {e}"))?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScopedEnv;

    #[test]
    fn test_resolve_log_target_uses_log_path() {
        let env = ScopedEnv::cleared(&[LOG_PATH_ENV]);
        assert_eq!(resolve_log_target(), LogTarget::Stderr);

        env.set(LOG_PATH_ENV, "/tmp/tdchat-test.log");
        assert_eq!(
            resolve_log_target(),
            LogTarget::File(PathBuf::from("/tmp/tdchat-test.log"))
        );
        env.set(LOG_PATH_ENV, "   ");
        assert_eq!(resolve_log_target(), LogTarget::Stderr);
    }
}
