use crate::discovery::TestNode;
use std::io::Write;
use std::time::Duration;

/// Receives per-leaf results while a run is in progress.
pub trait TestRunReporter: Send {
    fn started(&mut self, node: &TestNode);
    fn passed(&mut self, node: &TestNode, duration: Duration);
    fn failed(&mut self, node: &TestNode, message: &str, duration: Duration);
    /// Output text for one test; line endings are already `\r\n`.
    fn append_output(&mut self, node: &TestNode, text: &str);
    /// Called exactly once, after the last leaf.
    fn end(&mut self);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TestOutcome {
    Passed,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportEvent {
    Started(String),
    Finished { id: String, outcome: TestOutcome },
    Output { id: String, text: String },
    End,
}

/// Keeps every report call, in order.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    pub events: Vec<ReportEvent>,
}

impl RecordingReporter {
    pub fn results(&self) -> Vec<(&str, &TestOutcome)> {
        self.events
            .iter()
            .filter_map(|event| match event {
                ReportEvent::Finished { id, outcome } => Some((id.as_str(), outcome)),
                _ => None,
            })
            .collect()
    }

    pub fn started(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|event| match event {
                ReportEvent::Started(id) => Some(id.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn output_for(&self, id: &str) -> String {
        self.events
            .iter()
            .filter_map(|event| match event {
                ReportEvent::Output { id: out_id, text } if out_id == id => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn end_count(&self) -> usize {
        self.events
            .iter()
            .filter(|event| matches!(event, ReportEvent::End))
            .count()
    }
}

impl TestRunReporter for RecordingReporter {
    fn started(&mut self, node: &TestNode) {
        self.events.push(ReportEvent::Started(node.id.clone()));
    }

    fn passed(&mut self, node: &TestNode, _duration: Duration) {
        self.events.push(ReportEvent::Finished {
            id: node.id.clone(),
            outcome: TestOutcome::Passed,
        });
    }

    fn failed(&mut self, node: &TestNode, message: &str, _duration: Duration) {
        self.events.push(ReportEvent::Finished {
            id: node.id.clone(),
            outcome: TestOutcome::Failed(message.to_string()),
        });
    }

    fn append_output(&mut self, node: &TestNode, text: &str) {
        self.events.push(ReportEvent::Output {
            id: node.id.clone(),
            text: text.to_string(),
        });
    }

    fn end(&mut self) {
        self.events.push(ReportEvent::End);
    }
}

/// Plain-text reporter used by the CLI.
pub struct ConsoleReporter<W> {
    out: W,
    show_output: bool,
}

impl<W: Write + Send> ConsoleReporter<W> {
    pub fn new(out: W, show_output: bool) -> Self {
        Self { out, show_output }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn line(&mut self, text: std::fmt::Arguments<'_>) {
        if let Err(error) = writeln!(self.out, "{text}") {
            tracing::debug!("Failed to write test report: {error}");
        }
    }
}

impl<W: Write + Send> TestRunReporter for ConsoleReporter<W> {
    fn started(&mut self, node: &TestNode) {
        self.line(format_args!("RUN   {}", node.id));
    }

    fn passed(&mut self, node: &TestNode, duration: Duration) {
        self.line(format_args!(
            "PASS  {} ({} ms)",
            node.id,
            duration.as_millis()
        ));
    }

    fn failed(&mut self, node: &TestNode, message: &str, duration: Duration) {
        self.line(format_args!(
            "FAIL  {} ({} ms): {message}",
            node.id,
            duration.as_millis()
        ));
    }

    fn append_output(&mut self, _node: &TestNode, text: &str) {
        if self.show_output {
            let text = text.replace("\r\n", "\n");
            if let Err(error) = write!(self.out, "{text}") {
                tracing::debug!("Failed to write test output: {error}");
            }
        }
    }

    fn end(&mut self) {
        if let Err(error) = self.out.flush() {
            tracing::debug!("Failed to flush test report: {error}");
        }
    }
}
