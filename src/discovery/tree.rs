use super::path::StructuralPath;
use super::position::{PositionIndex, SourceRange};
use super::schema::SchemaValidator;
use super::DiscoveryError;
use serde::Serialize;
use serde_yaml::Value;
use std::path::{Path, PathBuf};

const STEPS_KEY: &str = "steps";
const COMMANDS_KEY: &str = "commands";
const PROMPT_KEY: &str = "prompt";
const COMMAND_KEY: &str = "command";

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    File,
    Step,
    Command,
}

/// A runnable item. Nodes without children are executed directly.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TestNode {
    pub id: String,
    pub label: String,
    pub kind: NodeKind,
    pub file: PathBuf,
    pub path: StructuralPath,
    pub range: SourceRange,
    pub children: Vec<TestNode>,
}

impl TestNode {
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    pub fn find(&self, id: &str) -> Option<&TestNode> {
        if self.id == id {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(id))
    }

    pub fn leaf_count(&self) -> usize {
        if self.is_leaf() {
            1
        } else {
            self.children.iter().map(TestNode::leaf_count).sum()
        }
    }
}

/// `<file>` for the file itself, `<file>:<dotted path>` below it.
pub fn node_id(file: &Path, path: &StructuralPath) -> String {
    if path.is_root() {
        file.display().to_string()
    } else {
        format!("{}:{path}", file.display())
    }
}

pub fn parse_document(source: &str) -> Result<Value, DiscoveryError> {
    Ok(serde_yaml::from_str(source)?)
}

/// Parses, validates and materializes one test file.
pub fn build_file_node(
    file: &Path,
    source: &str,
    validator: &SchemaValidator,
) -> Result<TestNode, DiscoveryError> {
    let document = parse_document(source)?;
    validator.validate(&document)?;
    let positions = PositionIndex::build(source);

    let root = StructuralPath::root();
    let steps_path = root.key(STEPS_KEY);
    let steps = document
        .get(STEPS_KEY)
        .and_then(Value::as_sequence)
        .map(|steps| {
            steps
                .iter()
                .enumerate()
                .map(|(i, step)| build_step(file, &steps_path.index(i), i, step, &positions))
                .collect()
        })
        .unwrap_or_default();

    Ok(TestNode {
        id: node_id(file, &root),
        label: file
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| file.display().to_string()),
        kind: NodeKind::File,
        file: file.to_path_buf(),
        path: root,
        range: positions.document(),
        children: steps,
    })
}

fn build_step(
    file: &Path,
    path: &StructuralPath,
    position: usize,
    step: &Value,
    positions: &PositionIndex,
) -> TestNode {
    let label = step
        .get(PROMPT_KEY)
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| format!("Step {}", position + 1));

    let commands_path = path.key(COMMANDS_KEY);
    let children = step
        .get(COMMANDS_KEY)
        .and_then(Value::as_sequence)
        .map(|commands| {
            commands
                .iter()
                .enumerate()
                .map(|(i, command)| {
                    let command_path = commands_path.index(i);
                    TestNode {
                        id: node_id(file, &command_path),
                        label: command
                            .get(COMMAND_KEY)
                            .and_then(Value::as_str)
                            .map(str::to_string)
                            .unwrap_or_else(|| format!("Command {}", i + 1)),
                        kind: NodeKind::Command,
                        file: file.to_path_buf(),
                        range: positions.nearest(&command_path),
                        path: command_path,
                        children: Vec::new(),
                    }
                })
                .collect()
        })
        .unwrap_or_default();

    TestNode {
        id: node_id(file, path),
        label,
        kind: NodeKind::Step,
        file: file.to_path_buf(),
        path: path.clone(),
        range: positions.nearest(path),
        children,
    }
}

/// Re-reads `file` and returns the YAML text of the node at `path`.
pub fn extract_subdocument(
    file: &Path,
    path: &StructuralPath,
    validator: &SchemaValidator,
) -> Result<String, DiscoveryError> {
    let source = std::fs::read_to_string(file).map_err(|source| DiscoveryError::Io {
        path: file.to_path_buf(),
        source,
    })?;
    let document = parse_document(&source)?;
    validator.validate(&document)?;
    let node = path
        .resolve(&document)
        .ok_or_else(|| DiscoveryError::MissingNode(node_id(file, path)))?;
    Ok(serde_yaml::to_string(node)?)
}
