use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use testdriver_chat::agent::{Agent, ProcessAgent};
use testdriver_chat::config::Config;
use testdriver_chat::discovery::{TestDiscovery, TestNode, TestWatcher};
use testdriver_chat::relay::{EventRelay, RelayOutcome};
use testdriver_chat::runner::{ConsoleReporter, RunRequest, TestRunExecutor};
use testdriver_chat::state::WebviewState;
use testdriver_chat::types::{HostMessage, WebviewCommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Parser)]
#[command(
    name = "tdchat",
    about = "Chat bridge, test discovery and test runner for TestDriver YAML tests",
    version
)]
struct Cli {
    #[arg(long, env = "TDCHAT_WORKSPACE", help = "Workspace root to search for tests")]
    workspace: Option<PathBuf>,

    #[arg(
        long = "test-dir",
        env = "TDCHAT_TEST_DIR",
        help = "Name of the directory test files live under"
    )]
    test_dir: Option<String>,

    #[arg(
        long = "agent-command",
        env = "TDCHAT_AGENT_COMMAND",
        help = "Executable of the external agent"
    )]
    agent_command: Option<String>,

    #[arg(
        long = "schema",
        env = "TDCHAT_SCHEMA_PATH",
        help = "JSON Schema file used to validate test files"
    )]
    schema: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the discovered test tree.
    Discover {
        #[arg(long, help = "Print the tree as JSON")]
        json: bool,
    },
    /// Run tests against the external agent.
    Run {
        #[arg(help = "Test ids to run; all tests when omitted")]
        ids: Vec<String>,
        #[arg(long, help = "Test ids to skip, including their descendants")]
        exclude: Vec<String>,
        #[arg(long = "show-output", help = "Print agent output for each test")]
        show_output: bool,
    },
    /// Speak the webview protocol as JSON lines over stdin/stdout.
    Bridge,
    /// Feed recorded host messages into the webview state and print the transcript.
    Replay { file: PathBuf },
}

impl Cli {
    fn config(&self) -> Result<Config> {
        let mut config = Config::load()?;
        if let Some(workspace) = &self.workspace {
            config.workspace_dir = workspace.clone();
        }
        if let Some(test_dir) = &self.test_dir {
            config.test_dir = test_dir.clone();
        }
        if let Some(agent_command) = &self.agent_command {
            config.agent_command = agent_command.clone();
        }
        if let Some(schema) = &self.schema {
            config.schema_path = Some(schema.clone());
        }
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    testdriver_chat::logging::init_logging()?;
    let cli = Cli::parse();

    match &cli.command {
        Command::Replay { file } => replay(file),
        Command::Discover { json } => discover(&cli.config()?, *json),
        Command::Run {
            ids,
            exclude,
            show_output,
        } => {
            let success = run_tests(&cli.config()?, ids, exclude, *show_output).await?;
            if !success {
                std::process::exit(1);
            }
            Ok(())
        }
        Command::Bridge => bridge(&cli.config()?).await,
    }
}

fn discover(config: &Config, json: bool) -> Result<()> {
    let tree = TestDiscovery::from_config(config)?.discover();
    let mut out = std::io::stdout().lock();
    if json {
        serde_json::to_writer_pretty(&mut out, &tree)?;
        writeln!(out)?;
        return Ok(());
    }
    for file in tree.roots() {
        print_node(&mut out, file, 0)?;
    }
    writeln!(out, "{} runnable test(s)", tree.leaf_count())?;
    Ok(())
}

fn print_node(out: &mut impl Write, node: &TestNode, depth: usize) -> Result<()> {
    writeln!(
        out,
        "{:indent$}{}  [{}:{}]  {}",
        "",
        node.label,
        node.range.start.line + 1,
        node.range.start.character + 1,
        node.id,
        indent = depth * 2
    )?;
    for child in &node.children {
        print_node(out, child, depth + 1)?;
    }
    Ok(())
}

async fn run_tests(
    config: &Config,
    ids: &[String],
    exclude: &[String],
    show_output: bool,
) -> Result<bool> {
    let discovery = TestDiscovery::from_config(config)?;
    let tree = discovery.discover();
    if tree.is_empty() {
        bail!(
            "No valid test files found under '{}' in {}",
            config.test_dir,
            config.workspace_dir.display()
        );
    }

    let agent: Arc<dyn Agent> = Arc::new(ProcessAgent::new(config));
    agent.ensure_ready().await?;

    let request = if ids.is_empty() {
        RunRequest::all()
    } else {
        RunRequest::only(ids.iter().cloned())
    }
    .excluding(exclude.iter().cloned());

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Interrupted; cancelling test run");
                cancel.cancel();
            }
        });
    }

    let executor = TestRunExecutor::new(Arc::clone(&agent), discovery.validator());
    let mut reporter = ConsoleReporter::new(std::io::stdout(), show_output);
    let summary = executor.run(&tree, &request, &mut reporter, &cancel).await;
    agent.shutdown().await;

    println!(
        "{} passed, {} failed, {} skipped{}",
        summary.passed,
        summary.failed,
        summary.skipped,
        if summary.cancelled { " (cancelled)" } else { "" }
    );
    Ok(summary.is_success())
}

async fn bridge(config: &Config) -> Result<()> {
    let discovery = TestDiscovery::from_config(config)?;
    let (_watcher, mut tree_updates) = TestWatcher::spawn(discovery)?;
    tokio::spawn(async move {
        while let Some(tree) = tree_updates.recv().await {
            tracing::info!("Test tree now has {} runnable test(s)", tree.leaf_count());
        }
    });

    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<HostMessage>();
    let writer = tokio::spawn(async move {
        let mut stdout = std::io::stdout();
        while let Some(message) = outbound_rx.recv().await {
            let line = match serde_json::to_string(&message) {
                Ok(line) => line,
                Err(error) => {
                    tracing::error!("Failed to encode host message: {error}");
                    continue;
                }
            };
            if writeln!(stdout, "{line}").and_then(|_| stdout.flush()).is_err() {
                break;
            }
        }
    });

    let agent: Arc<dyn Agent> = Arc::new(ProcessAgent::new(config));
    let mut relay = EventRelay::connect(
        Arc::clone(&agent),
        outbound_tx,
        Some(config.workspace_name()),
    )
    .await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let command: WebviewCommand = match serde_json::from_str(line) {
            Ok(command) => command,
            Err(error) => {
                tracing::warn!("Ignoring malformed webview command: {error}");
                continue;
            }
        };
        if let RelayOutcome::OpenFile(path) = relay.handle(command).await? {
            tracing::info!("Open requested for {}", path.display());
        }
    }

    relay.shutdown().await;
    agent.shutdown().await;
    if let Err(join_error) = writer.await {
        tracing::warn!("Output writer ended abnormally: {join_error}");
    }
    Ok(())
}

fn replay(file: &Path) -> Result<()> {
    let raw = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let mut state = WebviewState::new();
    for (number, line) in raw.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let message: HostMessage = serde_json::from_str(line)
            .with_context(|| format!("Invalid host message on line {}", number + 1))?;
        state.apply(message);
    }

    let mut out = std::io::stdout().lock();
    for entry in state.transcript() {
        writeln!(out, "{}", entry.summary())?;
    }
    writeln!(out, "-- {:?}", state.run_state())?;
    Ok(())
}
