//! Shared test doubles for the session tests
#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::time::Duration;
use tessera_core::{storage_error, StoragePath, TesseraResult};
use tessera_session::{SchemaNode, StorageStrategy, TableKind, TemporaryStorage, WorkspaceSchema};

/// In-memory storage counting every create and delete
#[derive(Default)]
pub struct MemoryStorage {
    paths: Mutex<HashSet<StoragePath>>,
    pub creates: AtomicUsize,
    pub deletes: AtomicUsize,
    /// `create` reports success without the path appearing
    pub phantom_create: bool,
    /// `delete` always fails
    pub failing_delete: bool,
    /// `create` fails once, then behaves
    pub fail_next_create: Mutex<bool>,
}

impl MemoryStorage {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with(configure: impl FnOnce(&mut MemoryStorage)) -> Arc<Self> {
        let mut storage = Self::default();
        configure(&mut storage);
        Arc::new(storage)
    }

    pub fn creates(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn deletes(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    pub fn contains(&self, path: &StoragePath) -> bool {
        self.paths.lock().unwrap().contains(path)
    }
}

#[async_trait]
impl TemporaryStorage for MemoryStorage {
    fn uri(&self) -> String {
        "memory:///".to_string()
    }

    async fn exists(&self, path: &StoragePath) -> TesseraResult<bool> {
        Ok(self.contains(path))
    }

    async fn create(&self, path: &StoragePath, _strategy: &StorageStrategy) -> TesseraResult<()> {
        // Widen the window in which concurrent callers can race
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.creates.fetch_add(1, Ordering::SeqCst);

        {
            let mut fail = self.fail_next_create.lock().unwrap();
            if *fail {
                *fail = false;
                return Err(storage_error!("disk full", "memory_storage"));
            }
        }
        if !self.phantom_create {
            self.paths.lock().unwrap().insert(path.clone());
        }
        Ok(())
    }

    async fn delete(&self, path: &StoragePath, _recursive: bool) -> TesseraResult<bool> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        if self.failing_delete {
            return Err(storage_error!("permission denied", "memory_storage"));
        }
        Ok(self.paths.lock().unwrap().remove(path))
    }
}

/// Workspace backed by [`MemoryStorage`] with a plain table map
pub struct MemoryWorkspace {
    pub name: String,
    pub storage: Arc<MemoryStorage>,
    pub root: StoragePath,
    pub tables: Mutex<HashMap<String, TableKind>>,
    pub failing_drop: bool,
}

impl MemoryWorkspace {
    pub fn new(name: &str, storage: Arc<MemoryStorage>) -> Self {
        Self {
            name: name.to_string(),
            storage,
            root: StoragePath::new("memory", "").join("tmp"),
            tables: Mutex::new(HashMap::new()),
            failing_drop: false,
        }
    }

    /// Pretend the planner materialized `generated` as `kind`
    pub fn materialize(&self, generated: &str, kind: TableKind) {
        self.tables
            .lock()
            .unwrap()
            .insert(generated.to_string(), kind);
    }
}

#[async_trait]
impl WorkspaceSchema for MemoryWorkspace {
    fn full_schema_name(&self) -> String {
        self.name.clone()
    }

    fn storage(&self) -> Arc<dyn TemporaryStorage> {
        self.storage.clone()
    }

    fn temporary_root(&self) -> StoragePath {
        self.root.clone()
    }

    async fn table_kind(&self, name: &str) -> TesseraResult<Option<TableKind>> {
        Ok(self.tables.lock().unwrap().get(name).copied())
    }

    async fn drop_table(&self, name: &str) -> TesseraResult<()> {
        if self.failing_drop {
            return Err(storage_error!(format!("Cannot drop {}", name), "memory_workspace"));
        }
        self.tables.lock().unwrap().remove(name);
        Ok(())
    }
}

/// Schema tree node with a weak parent link
pub struct TreeNode {
    name: String,
    parent: Option<Weak<TreeNode>>,
    children: RwLock<HashMap<String, Arc<TreeNode>>>,
}

impl TreeNode {
    pub fn root() -> Arc<TreeNode> {
        Arc::new(TreeNode {
            name: String::new(),
            parent: None,
            children: RwLock::new(HashMap::new()),
        })
    }

    pub fn add(self: &Arc<Self>, name: &str) -> Arc<TreeNode> {
        let child = Arc::new(TreeNode {
            name: name.to_string(),
            parent: Some(Arc::downgrade(self)),
            children: RwLock::new(HashMap::new()),
        });
        self.children
            .write()
            .unwrap()
            .insert(name.to_string(), child.clone());
        child
    }
}

impl SchemaNode for TreeNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn parent(&self) -> Option<Arc<dyn SchemaNode>> {
        self.parent
            .as_ref()
            .and_then(Weak::upgrade)
            .map(|p| p as Arc<dyn SchemaNode>)
    }

    fn sub_schema(&self, name: &str) -> Option<Arc<dyn SchemaNode>> {
        self.children
            .read()
            .unwrap()
            .get(name)
            .map(|c| c.clone() as Arc<dyn SchemaNode>)
    }
}

/// `root -> dfs -> {tmp, work}` and `root -> cp`
pub fn sample_tree() -> Arc<TreeNode> {
    let root = TreeNode::root();
    let dfs = root.add("dfs");
    dfs.add("tmp");
    dfs.add("work");
    root.add("cp");
    root
}
