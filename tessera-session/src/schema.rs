//! Schema/catalog boundary
//!
//! The planner's schema tree is external. The session needs to walk it to
//! resolve default schema paths, and needs table lookups and drops on the
//! temporary workspace.

use crate::storage::TemporaryStorage;
use async_trait::async_trait;
use std::sync::Arc;
use tessera_core::{ErrorContext, StoragePath, TesseraError, TesseraResult};

/// Kind of object a name resolves to inside a schema
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TableKind {
    Table,
    View,
}

/// A node of the schema tree. The root node has an empty name.
pub trait SchemaNode: Send + Sync {
    fn name(&self) -> &str;
    fn parent(&self) -> Option<Arc<dyn SchemaNode>>;
    fn sub_schema(&self, name: &str) -> Option<Arc<dyn SchemaNode>>;
}

/// Walk `segments` down from `start`
pub fn find_schema(start: &Arc<dyn SchemaNode>, segments: &[&str]) -> Option<Arc<dyn SchemaNode>> {
    let mut current = Arc::clone(start);
    for segment in segments {
        current = current.sub_schema(segment)?;
    }
    Some(current)
}

/// Root of the tree `node` belongs to
pub fn root_of(node: &Arc<dyn SchemaNode>) -> Arc<dyn SchemaNode> {
    let mut current = Arc::clone(node);
    while let Some(parent) = current.parent() {
        current = parent;
    }
    current
}

/// Canonical dotted path of `node`, excluding the root
pub fn schema_path(node: &Arc<dyn SchemaNode>) -> String {
    let mut names = Vec::new();
    let mut current = Some(Arc::clone(node));
    while let Some(schema) = current {
        let parent = schema.parent();
        if parent.is_some() {
            names.push(schema.name().to_string());
        }
        current = parent;
    }
    names.reverse();
    names.join(".")
}

/// Resolve `path` relative to `current`, then from the root of its tree
pub fn resolve_schema(
    current: &Arc<dyn SchemaNode>,
    path: &str,
) -> TesseraResult<Arc<dyn SchemaNode>> {
    let segments: Vec<&str> = path.split('.').collect();

    find_schema(current, &segments)
        .or_else(|| find_schema(&root_of(current), &segments))
        .ok_or_else(|| TesseraError::SchemaResolution {
            path: path.to_string(),
            context: ErrorContext::new("schema")
                .with_operation("resolve_schema")
                .with_metadata("current_schema", &schema_path(current))
                .with_suggestion("Use a path relative to the current schema or an absolute path"),
        })
}

/// A workspace schema that can hold temporary tables
#[async_trait]
pub trait WorkspaceSchema: Send + Sync {
    /// Dotted full name, e.g. `dfs.tmp`
    fn full_schema_name(&self) -> String;

    /// Storage handle backing this workspace
    fn storage(&self) -> Arc<dyn TemporaryStorage>;

    /// Root under which session temporary locations are created
    fn temporary_root(&self) -> StoragePath;

    /// Kind of the object stored under `name`, if any
    async fn table_kind(&self, name: &str) -> TesseraResult<Option<TableKind>>;

    async fn drop_table(&self, name: &str) -> TesseraResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::{RwLock, Weak};

    struct Node {
        name: String,
        parent: Option<Weak<Node>>,
        children: RwLock<HashMap<String, Arc<Node>>>,
    }

    impl Node {
        fn root() -> Arc<Node> {
            Arc::new(Node {
                name: String::new(),
                parent: None,
                children: RwLock::new(HashMap::new()),
            })
        }

        fn add(self: &Arc<Self>, name: &str) -> Arc<Node> {
            let child = Arc::new(Node {
                name: name.to_string(),
                parent: Some(Arc::downgrade(self)),
                children: RwLock::new(HashMap::new()),
            });
            self.children
                .write()
                .unwrap()
                .insert(name.to_string(), Arc::clone(&child));
            child
        }
    }

    impl SchemaNode for Node {
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
                .map(|c| Arc::clone(c) as Arc<dyn SchemaNode>)
        }
    }

    #[test]
    fn test_resolves_relative_before_absolute() {
        let root = Node::root();
        let dfs = root.add("dfs");
        dfs.add("tmp");
        root.add("tmp");

        let current: Arc<dyn SchemaNode> = dfs;
        let relative = resolve_schema(&current, "tmp").unwrap();
        assert_eq!(schema_path(&relative), "dfs.tmp");

        let absolute = resolve_schema(&current, "dfs").unwrap();
        assert_eq!(schema_path(&absolute), "dfs");
    }

    #[test]
    fn test_unknown_path_names_attempted_path() {
        let root = Node::root();
        let current: Arc<dyn SchemaNode> = root.add("cp");

        match resolve_schema(&current, "missing.schema") {
            Err(TesseraError::SchemaResolution { path, .. }) => assert_eq!(path, "missing.schema"),
            _ => panic!("Expected SchemaResolution error"),
        }
    }
}
