//! Test discovery: finds YAML test files under the configured test directory
//! and turns each into a tree of runnable nodes with source ranges.

pub mod path;
pub mod position;
pub mod schema;
mod tree;
pub mod watch;

pub use path::{PathSegment, StructuralPath};
pub use position::{Position, PositionIndex, SourceRange};
pub use schema::SchemaValidator;
pub use tree::{build_file_node, extract_subdocument, node_id, parse_document, NodeKind, TestNode};
pub use watch::TestWatcher;

use crate::config::Config;
use crate::util::is_yaml_path;
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use thiserror::Error;
use walkdir::{DirEntry, WalkDir};

/// Directory names never descended into.
pub const EXCLUDED_DIRS: &[&str] = &["generated", "screenshots", "node_modules", ".git"];

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("schema validation failed: {0}")]
    Schema(String),
    #[error("invalid schema: {0}")]
    InvalidSchema(String),
    #[error("invalid test glob: {0}")]
    Glob(#[from] globset::Error),
    #[error("no node at {0}")]
    MissingNode(String),
    #[error("file watcher failed: {0}")]
    Watch(#[from] notify::Error),
}

/// All valid test files found in one discovery pass, sorted by path.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct TestTree {
    pub files: Vec<TestNode>,
}

impl TestTree {
    pub fn find(&self, id: &str) -> Option<&TestNode> {
        self.files.iter().find_map(|file| file.find(id))
    }

    pub fn roots(&self) -> &[TestNode] {
        &self.files
    }

    pub fn leaf_count(&self) -> usize {
        self.files.iter().map(TestNode::leaf_count).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct TestDiscovery {
    root: PathBuf,
    test_dir: String,
    validator: Arc<SchemaValidator>,
    matcher: GlobSet,
}

impl TestDiscovery {
    pub fn new(
        root: impl Into<PathBuf>,
        test_dir: impl Into<String>,
        validator: Arc<SchemaValidator>,
    ) -> Result<Self, DiscoveryError> {
        let test_dir = test_dir.into();
        let glob = GlobBuilder::new(&format!("**/{test_dir}/**/*.{{yaml,yml}}"))
            .literal_separator(true)
            .build()?;
        let matcher = GlobSetBuilder::new().add(glob).build()?;
        Ok(Self {
            root: root.into(),
            test_dir,
            validator,
            matcher,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, DiscoveryError> {
        let validator = SchemaValidator::load(config.schema_path.as_deref())?;
        Self::new(&config.workspace_dir, &config.test_dir, Arc::new(validator))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn test_dir(&self) -> &str {
        &self.test_dir
    }

    pub fn validator(&self) -> Arc<SchemaValidator> {
        Arc::clone(&self.validator)
    }

    /// True for YAML files under a `<test_dir>` directory, relative to the root.
    pub fn is_test_path(&self, path: &Path) -> bool {
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        is_yaml_path(relative) && self.matcher.is_match(relative)
    }

    /// Walks the workspace and builds a fresh tree. Files that fail to parse
    /// or validate are left out.
    pub fn discover(&self) -> TestTree {
        let mut files: Vec<TestNode> = WalkDir::new(&self.root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|entry| !is_excluded_dir(entry))
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(error) => {
                    tracing::debug!("Skipping unreadable entry: {error}");
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file() && self.is_test_path(entry.path()))
            .filter_map(|entry| match self.load_file(entry.path()) {
                Ok(node) => Some(node),
                Err(error) => {
                    tracing::warn!("Excluding {}: {error}", entry.path().display());
                    None
                }
            })
            .collect();
        files.sort_by(|a, b| a.file.cmp(&b.file));
        tracing::debug!("Discovered {} test file(s)", files.len());
        TestTree { files }
    }

    pub fn load_file(&self, path: &Path) -> Result<TestNode, DiscoveryError> {
        let source = std::fs::read_to_string(path).map_err(|source| DiscoveryError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        build_file_node(path, &source, &self.validator)
    }
}

fn is_excluded_dir(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| EXCLUDED_DIRS.contains(&name))
}

/// Shared view of the latest tree. `replace` swaps the whole tree so readers
/// never see a partial refresh.
#[derive(Debug, Clone, Default)]
pub struct TestCatalog {
    tree: Arc<RwLock<Arc<TestTree>>>,
}

impl TestCatalog {
    pub fn new(tree: TestTree) -> Self {
        Self {
            tree: Arc::new(RwLock::new(Arc::new(tree))),
        }
    }

    pub fn snapshot(&self) -> Arc<TestTree> {
        match self.tree.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    pub fn replace(&self, tree: TestTree) {
        let tree = Arc::new(tree);
        match self.tree.write() {
            Ok(mut guard) => *guard = tree,
            Err(poisoned) => *poisoned.into_inner() = tree,
        }
    }
}
