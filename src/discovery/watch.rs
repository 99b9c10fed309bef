use super::{DiscoveryError, TestCatalog, TestDiscovery, TestTree};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::Path;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Bursts of file events closer together than this trigger one rebuild.
const SETTLE_DELAY: Duration = Duration::from_millis(150);

/// Rebuilds the catalog whenever a file under the test directory is created,
/// changed or removed. Dropping the watcher stops both the OS watch and the
/// rebuild task.
pub struct TestWatcher {
    _watcher: RecommendedWatcher,
    task: JoinHandle<()>,
}

impl TestWatcher {
    /// Every rebuilt tree is sent on the returned channel.
    pub fn spawn(
        discovery: TestDiscovery,
    ) -> Result<(Self, mpsc::UnboundedReceiver<TestTree>), DiscoveryError> {
        Self::start(discovery, None)
    }

    /// Like [`TestWatcher::spawn`], and each tree is stored in `catalog` before
    /// it is sent.
    pub fn spawn_with_catalog(
        discovery: TestDiscovery,
        catalog: TestCatalog,
    ) -> Result<(Self, mpsc::UnboundedReceiver<TestTree>), DiscoveryError> {
        Self::start(discovery, Some(catalog))
    }

    fn start(
        discovery: TestDiscovery,
        catalog: Option<TestCatalog>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<TestTree>), DiscoveryError> {
        let (raw_tx, mut raw_rx) = mpsc::unbounded_channel::<notify::Result<Event>>();
        let mut watcher = notify::recommended_watcher(move |result: notify::Result<Event>| {
            let _ = raw_tx.send(result);
        })?;
        watcher.watch(discovery.root(), RecursiveMode::Recursive)?;

        let (updates_tx, updates_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(async move {
            while let Some(result) = raw_rx.recv().await {
                if !is_relevant(&discovery, result) {
                    continue;
                }
                // Collapse whatever else arrives while the filesystem settles.
                tokio::time::sleep(SETTLE_DELAY).await;
                while raw_rx.try_recv().is_ok() {}

                let walker = discovery.clone();
                let tree = match tokio::task::spawn_blocking(move || walker.discover()).await {
                    Ok(tree) => tree,
                    Err(error) => {
                        tracing::error!("Test discovery task failed: {error}");
                        continue;
                    }
                };
                tracing::info!("Test tree refreshed: {} file(s)", tree.files.len());
                if let Some(catalog) = &catalog {
                    catalog.replace(tree.clone());
                }
                if updates_tx.send(tree).is_err() {
                    break;
                }
            }
        });

        Ok((
            Self {
                _watcher: watcher,
                task,
            },
            updates_rx,
        ))
    }
}

impl Drop for TestWatcher {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn is_relevant(discovery: &TestDiscovery, result: notify::Result<Event>) -> bool {
    match result {
        Ok(event) => {
            is_content_change(&event.kind)
                && event
                    .paths
                    .iter()
                    .any(|path| touches_test_dir(path, discovery.test_dir()))
        }
        Err(error) => {
            tracing::warn!("File watcher error: {error}");
            false
        }
    }
}

fn is_content_change(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    )
}

/// Any path inside (or naming) a `<test_dir>` directory. Deleting the whole
/// directory must also refresh, so the extension is not checked here.
fn touches_test_dir(path: &Path, test_dir: &str) -> bool {
    path.components()
        .any(|component| component.as_os_str() == std::ffi::OsStr::new(test_dir))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::SchemaValidator;
    use notify::event::{AccessKind, CreateKind, ModifyKind};
    use std::path::PathBuf;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn discovery() -> TestDiscovery {
        let validator = Arc::new(SchemaValidator::builtin().expect("schema"));
        TestDiscovery::new("/ws", "testdriver", validator).expect("discovery")
    }

    fn event(kind: EventKind, path: &str) -> notify::Result<Event> {
        Ok(Event::new(kind).add_path(PathBuf::from(path)))
    }

    #[test]
    fn test_only_changes_under_test_dir_are_relevant() {
        let discovery = discovery();
        assert!(is_relevant(
            &discovery,
            event(EventKind::Create(CreateKind::File), "/ws/testdriver/a.yaml")
        ));
        assert!(is_relevant(
            &discovery,
            event(EventKind::Modify(ModifyKind::Any), "/ws/testdriver")
        ));
        assert!(!is_relevant(
            &discovery,
            event(EventKind::Create(CreateKind::File), "/ws/src/a.yaml")
        ));
        assert!(!is_relevant(
            &discovery,
            event(EventKind::Access(AccessKind::Any), "/ws/testdriver/a.yaml")
        ));
        assert!(!is_relevant(&discovery, Err(notify::Error::generic("boom"))));
    }

    /// Waits for the first published tree matching `ready`. A single save can
    /// surface as several rebuilds, so intermediate trees are skipped.
    async fn next_tree(
        updates: &mut mpsc::UnboundedReceiver<TestTree>,
        ready: impl Fn(&TestTree) -> bool,
    ) -> TestTree {
        tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                let tree = updates.recv().await.expect("watcher stopped");
                if ready(&tree) {
                    return tree;
                }
            }
        })
        .await
        .expect("no matching tree before timeout")
    }

    #[tokio::test]
    async fn test_created_and_deleted_files_refresh_the_catalog() {
        let temp = TempDir::new().expect("temp dir");
        let tests = temp.path().join("testdriver");
        std::fs::create_dir_all(&tests).expect("mkdir");

        let validator = Arc::new(SchemaValidator::builtin().expect("schema"));
        let discovery =
            TestDiscovery::new(temp.path(), "testdriver", validator).expect("discovery");
        let catalog = TestCatalog::default();
        let (_watcher, mut updates) =
            TestWatcher::spawn_with_catalog(discovery, catalog.clone()).expect("watcher");

        let file = tests.join("login.yaml");
        let id = file.display().to_string();
        std::fs::write(
            &file,
            "steps:\n  - prompt: sign in\n    commands:\n      - command: wait\n",
        )
        .expect("write");

        let tree = next_tree(&mut updates, |tree| tree.find(&id).is_some()).await;
        assert_eq!(tree.leaf_count(), 1);
        let snapshot = catalog.snapshot();
        let node = snapshot.find(&id).expect("catalog holds the new file");
        assert_eq!(node.children[0].label, "sign in");

        std::fs::remove_file(&file).expect("remove");
        let tree = next_tree(&mut updates, TestTree::is_empty).await;
        assert!(tree.is_empty());
        assert!(catalog.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_watcher_without_catalog_still_publishes_trees() {
        let temp = TempDir::new().expect("temp dir");
        let validator = Arc::new(SchemaValidator::builtin().expect("schema"));
        let discovery =
            TestDiscovery::new(temp.path(), "testdriver", validator).expect("discovery");
        let (_watcher, mut updates) = TestWatcher::spawn(discovery).expect("watcher");

        let tests = temp.path().join("testdriver/nested");
        std::fs::create_dir_all(&tests).expect("mkdir");
        std::fs::write(tests.join("smoke.yml"), "steps:\n  - prompt: look around\n")
            .expect("write");

        let tree = next_tree(&mut updates, |tree| tree.files.len() == 1).await;
        assert_eq!(tree.files[0].label, "smoke.yml");
        assert_eq!(tree.leaf_count(), 1);
    }
}
