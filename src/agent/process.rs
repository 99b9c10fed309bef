use super::stream::EventLineParser;
use super::{Agent, AgentError, EventSink};
use crate::config::Config;
use crate::types::AgentEvent;
use async_trait::async_trait;
use futures::StreamExt;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;

const RUN_SUBCOMMAND: &str = "run";
const CHAT_SUBCOMMAND: &str = "chat";
const STDIN_MARKER: &str = "-";

/// Agent backed by the external CLI. Each call spawns one process that reads
/// its payload from stdin and writes JSON-lines events to stdout.
pub struct ProcessAgent {
    command: String,
    args: Vec<String>,
    working_dir: PathBuf,
    ready_timeout: Duration,
    active: Mutex<Option<CancellationToken>>,
}

impl ProcessAgent {
    pub fn new(config: &Config) -> Self {
        Self {
            command: config.agent_command.clone(),
            args: config.agent_args.clone(),
            working_dir: config.workspace_dir.clone(),
            ready_timeout: config.ready_timeout(),
            active: Mutex::new(None),
        }
    }

    fn base_command(&self) -> Command {
        let mut command = Command::new(&self.command);
        command
            .args(&self.args)
            .current_dir(&self.working_dir)
            .kill_on_drop(true);
        command
    }

    fn spawn(&self, subcommand: &str) -> Result<Child, AgentError> {
        self.base_command()
            .arg(subcommand)
            .arg(STDIN_MARKER)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| AgentError::Unreachable(format!("failed to start '{}': {e}", self.command)))
    }

    async fn invoke(
        &self,
        subcommand: &str,
        payload: &str,
        events: EventSink,
        cancel: CancellationToken,
    ) -> Result<(), AgentError> {
        let mut child = self.spawn(subcommand)?;
        let call_token = cancel.child_token();
        *self.active.lock().await = Some(call_token.clone());

        let result = self
            .drive_child(&mut child, payload, &events, &call_token)
            .await;
        *self.active.lock().await = None;

        if matches!(result, Err(AgentError::Cancelled)) {
            if let Err(e) = child.kill().await {
                tracing::warn!(error = %e, "failed to kill cancelled agent process");
            }
        }
        result
    }

    async fn drive_child(
        &self,
        child: &mut Child,
        payload: &str,
        events: &EventSink,
        cancel: &CancellationToken,
    ) -> Result<(), AgentError> {
        let stdin_task = child.stdin.take().map(|mut stdin| {
            let payload = payload.to_string();
            tokio::spawn(async move {
                stdin.write_all(payload.as_bytes()).await?;
                stdin.shutdown().await
            })
        });
        let stderr_task = child.stderr.take().map(spawn_stderr_tail);
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AgentError::Unreachable("agent stdout was not captured".to_string()))?;

        let mut stdout = ReaderStream::new(stdout);
        let mut parser = EventLineParser::new();
        let mut last_error: Option<String> = None;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Err(AgentError::Cancelled),
                chunk = stdout.next() => match chunk {
                    Some(Ok(bytes)) => {
                        for event in parser.process(&bytes) {
                            forward_event(events, event, &mut last_error);
                        }
                    }
                    Some(Err(e)) => return Err(AgentError::Io(e)),
                    None => break,
                }
            }
        }
        if let Some(event) = parser.flush() {
            forward_event(events, event, &mut last_error);
        }

        let status = tokio::select! {
            _ = cancel.cancelled() => return Err(AgentError::Cancelled),
            status = child.wait() => status?,
        };

        if let Some(task) = stdin_task {
            match task.await {
                Ok(Err(e)) if e.kind() != std::io::ErrorKind::BrokenPipe => {
                    tracing::warn!(error = %e, "failed to write agent payload");
                }
                Err(e) => tracing::warn!(error = %e, "agent stdin writer panicked"),
                _ => {}
            }
        }
        let stderr_tail = match stderr_task {
            Some(task) => task.await.unwrap_or_default(),
            None => None,
        };

        events.emit(AgentEvent::Exit {
            code: status.code(),
        });
        exit_result(status, last_error, stderr_tail)
    }
}

fn forward_event(events: &EventSink, event: AgentEvent, last_error: &mut Option<String>) {
    if let AgentEvent::Error { message, .. } = &event {
        *last_error = Some(message.clone());
    }
    // The agent reports its own exit through the process status.
    if matches!(event, AgentEvent::Exit { .. }) {
        return;
    }
    events.emit(event);
}

fn spawn_stderr_tail(stderr: tokio::process::ChildStderr) -> JoinHandle<Option<String>> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        let mut last = None;
        while let Ok(Some(line)) = lines.next_line().await {
            let trimmed = line.trim();
            if !trimmed.is_empty() {
                tracing::debug!(target: "agent_stderr", "{trimmed}");
                last = Some(trimmed.to_string());
            }
        }
        last
    })
}

fn exit_result(
    status: ExitStatus,
    last_error: Option<String>,
    stderr_tail: Option<String>,
) -> Result<(), AgentError> {
    if status.success() {
        return Ok(());
    }
    let message = last_error.or(stderr_tail).unwrap_or_else(|| match status.code() {
        Some(code) => format!("agent exited with status {code}"),
        None => "agent terminated by signal".to_string(),
    });
    Err(AgentError::Execution(message))
}

#[async_trait]
impl Agent for ProcessAgent {
    async fn ensure_ready(&self) -> Result<(), AgentError> {
        let mut probe = self.base_command();
        probe
            .arg("--version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        let output = match tokio::time::timeout(self.ready_timeout, probe.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(AgentError::Unreachable(format!(
                    "failed to start '{}': {e}",
                    self.command
                )))
            }
            Err(_) => {
                return Err(AgentError::Unreachable(format!(
                    "'{}' did not answer within {}ms",
                    self.command,
                    self.ready_timeout.as_millis()
                )))
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(AgentError::Unreachable(if stderr.is_empty() {
                format!("'{}' --version failed", self.command)
            } else {
                stderr
            }));
        }
        Ok(())
    }

    async fn run(
        &self,
        yaml: &str,
        events: EventSink,
        cancel: CancellationToken,
    ) -> Result<(), AgentError> {
        self.invoke(RUN_SUBCOMMAND, yaml, events, cancel).await
    }

    async fn send_message(
        &self,
        message: &str,
        events: EventSink,
        cancel: CancellationToken,
    ) -> Result<(), AgentError> {
        self.invoke(CHAT_SUBCOMMAND, message, events, cancel).await
    }

    async fn stop(&self) -> Result<(), AgentError> {
        if let Some(token) = self.active.lock().await.as_ref() {
            token.cancel();
        }
        Ok(())
    }

    async fn shutdown(&self) {
        if let Some(token) = self.active.lock().await.take() {
            token.cancel();
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn script_agent(temp: &TempDir, body: &str) -> ProcessAgent {
        let script = temp.path().join("fake-agent.sh");
        fs::write(&script, format!("#!/bin/sh\n{body}\n")).expect("write script");
        let mut perms = fs::metadata(&script).expect("metadata").permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&script, perms).expect("chmod");

        ProcessAgent {
            command: script.display().to_string(),
            args: Vec::new(),
            working_dir: temp.path().to_path_buf(),
            ready_timeout: Duration::from_secs(5),
            active: Mutex::new(None),
        }
    }

    #[tokio::test]
    async fn test_missing_binary_is_unreachable() {
        let temp = TempDir::new().expect("temp dir");
        let mut agent = script_agent(&temp, "exit 0");
        agent.command = temp.path().join("nope").display().to_string();

        assert!(matches!(
            agent.ensure_ready().await,
            Err(AgentError::Unreachable(_))
        ));
        let (sink, _rx) = EventSink::channel();
        assert!(matches!(
            agent.run("steps: []", sink, CancellationToken::new()).await,
            Err(AgentError::Unreachable(_))
        ));
    }

    #[tokio::test]
    async fn test_events_are_forwarded_in_order_then_exit() {
        let temp = TempDir::new().expect("temp dir");
        let agent = script_agent(
            &temp,
            r#"cat > /dev/null
echo '{"event":"log:markdown:start","data":"s1"}'
echo '{"event":"log:markdown:chunk","data":{"streamId":"s1","chunk":"ok"}}'
echo 'plain line'
exit 0"#,
        );

        let (sink, mut rx) = EventSink::channel();
        agent
            .run("steps: []", sink, CancellationToken::new())
            .await
            .expect("run");

        let mut names = Vec::new();
        while let Ok(event) = rx.try_recv() {
            names.push(event.name());
        }
        assert_eq!(
            names,
            vec!["log:markdown:start", "log:markdown:chunk", "log:log", "exit"]
        );
    }

    #[tokio::test]
    async fn test_failure_uses_last_error_event_message() {
        let temp = TempDir::new().expect("temp dir");
        let agent = script_agent(
            &temp,
            r#"cat > /dev/null
echo '{"event":"error:fatal","data":"timeout"}'
exit 2"#,
        );

        let (sink, _rx) = EventSink::channel();
        match agent.run("steps: []", sink, CancellationToken::new()).await {
            Err(AgentError::Execution(message)) => assert_eq!(message, "timeout"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_cancellation_kills_the_process() {
        let temp = TempDir::new().expect("temp dir");
        let agent = script_agent(&temp, "sleep 30");
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let (sink, _rx) = EventSink::channel();
        let result = tokio::time::timeout(
            Duration::from_secs(10),
            agent.run("steps: []", sink, cancel),
        )
        .await
        .expect("cancelled call settles");
        assert!(matches!(result, Err(AgentError::Cancelled)));
    }
}
