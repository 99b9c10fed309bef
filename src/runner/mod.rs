//! Executes a subset of the test tree against the agent, one leaf at a time.

mod reporter;

pub use reporter::{ConsoleReporter, RecordingReporter, ReportEvent, TestOutcome, TestRunReporter};

use crate::agent::{Agent, AgentError, EventSink};
use crate::discovery::{extract_subdocument, SchemaValidator, TestNode, TestTree};
use crate::types::AgentEvent;
use crate::util::normalize_crlf;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Which items to run. `include: None` means the whole tree.
#[derive(Debug, Clone, Default)]
pub struct RunRequest {
    pub include: Option<Vec<String>>,
    pub exclude: HashSet<String>,
}

impl RunRequest {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn only<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            include: Some(ids.into_iter().map(Into::into).collect()),
            exclude: HashSet::new(),
        }
    }

    pub fn excluding<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude.extend(ids.into_iter().map(Into::into));
        self
    }

    pub fn is_excluded(&self, id: &str) -> bool {
        self.exclude.contains(id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub passed: usize,
    pub failed: usize,
    /// Leaves skipped because their file no longer parses or validates.
    pub skipped: usize,
    pub cancelled: bool,
}

impl RunSummary {
    pub fn is_success(&self) -> bool {
        self.failed == 0 && !self.cancelled
    }
}

enum LeafResult {
    Passed,
    Failed,
    Skipped,
    Cancelled,
}

pub struct TestRunExecutor {
    agent: Arc<dyn Agent>,
    validator: Arc<SchemaValidator>,
}

impl TestRunExecutor {
    pub fn new(agent: Arc<dyn Agent>, validator: Arc<SchemaValidator>) -> Self {
        Self { agent, validator }
    }

    pub async fn run(
        &self,
        tree: &TestTree,
        request: &RunRequest,
        reporter: &mut dyn TestRunReporter,
        cancel: &CancellationToken,
    ) -> RunSummary {
        let mut queue: VecDeque<&TestNode> = match &request.include {
            Some(ids) => ids
                .iter()
                .filter_map(|id| {
                    let node = tree.find(id);
                    if node.is_none() {
                        tracing::warn!("Requested test '{id}' is not in the test tree");
                    }
                    node
                })
                .collect(),
            None => tree.roots().iter().collect(),
        };

        // Overlapping ids (a step and one of its commands) run each leaf once.
        let mut seen: HashSet<&str> = HashSet::new();
        let mut summary = RunSummary::default();
        while let Some(node) = queue.pop_front() {
            if cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }
            if request.is_excluded(&node.id) || !seen.insert(node.id.as_str()) {
                continue;
            }
            if !node.is_leaf() {
                queue.extend(
                    node.children
                        .iter()
                        .filter(|child| !request.is_excluded(&child.id)),
                );
                continue;
            }

            match self.run_leaf(node, reporter, cancel).await {
                LeafResult::Passed => summary.passed += 1,
                LeafResult::Failed => summary.failed += 1,
                LeafResult::Skipped => summary.skipped += 1,
                LeafResult::Cancelled => summary.cancelled = true,
            }
        }
        summary.cancelled |= cancel.is_cancelled();

        reporter.end();
        summary
    }

    async fn run_leaf(
        &self,
        node: &TestNode,
        reporter: &mut dyn TestRunReporter,
        cancel: &CancellationToken,
    ) -> LeafResult {
        let yaml = match extract_subdocument(&node.file, &node.path, &self.validator) {
            Ok(yaml) => yaml,
            Err(error) => {
                tracing::warn!("Skipping {}: {error}", node.id);
                return LeafResult::Skipped;
            }
        };

        reporter.started(node);
        let started = Instant::now();

        let (events, mut event_rx) = EventSink::channel();
        let call = self.agent.run(&yaml, events, cancel.child_token());
        tokio::pin!(call);

        let result = loop {
            tokio::select! {
                biased;
                Some(event) = event_rx.recv() => forward_output(node, &event, reporter),
                result = &mut call => break result,
            }
        };
        while let Ok(event) = event_rx.try_recv() {
            forward_output(node, &event, reporter);
        }

        let duration = started.elapsed();
        match result {
            Ok(()) => {
                reporter.passed(node, duration);
                LeafResult::Passed
            }
            Err(AgentError::Cancelled) => {
                tracing::debug!("Run of {} cancelled", node.id);
                LeafResult::Cancelled
            }
            Err(error) => {
                reporter.failed(node, &error.to_string(), duration);
                LeafResult::Failed
            }
        }
    }
}

fn forward_output(node: &TestNode, event: &AgentEvent, reporter: &mut dyn TestRunReporter) {
    if let Some(text) = event.output_text() {
        reporter.append_output(node, &normalize_crlf(&text));
    }
}
