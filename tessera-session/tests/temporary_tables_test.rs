//! Temporary table registration, lookup, removal, and session cleanup

mod helpers;

use futures::future::join_all;
use helpers::{MemoryStorage, MemoryWorkspace};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tessera_core::{TemporaryConfig, TesseraError, UserCredentials};
use tessera_session::{Session, SessionConfig, TableKind};

fn new_session() -> Arc<Session> {
    Arc::new(Session::build(SessionConfig::new(UserCredentials::new("alice"))).unwrap())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_registration_agrees_on_one_name() {
    let session = new_session();
    let storage = MemoryStorage::new();
    let workspace = Arc::new(MemoryWorkspace::new("dfs.tmp", storage.clone()));

    let handles: Vec<_> = ["Foo", "foo", "FOO", "fOo", "foO", "FoO", "foo", "FOO"]
        .into_iter()
        .map(|name| {
            let session = session.clone();
            let workspace = workspace.clone();
            tokio::spawn(async move {
                session
                    .register_temporary_table(workspace.as_ref(), name)
                    .await
                    .unwrap()
            })
        })
        .collect();

    let names: HashSet<String> = join_all(handles)
        .await
        .into_iter()
        .map(|result| result.unwrap())
        .collect();

    assert_eq!(names.len(), 1);
    assert_eq!(storage.creates(), 1);
    assert_eq!(session.temporary_table_count(), 1);
    assert_eq!(session.temporary_location_count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_two_tasks_registering_same_table() {
    let session = new_session();
    let storage = MemoryStorage::new();
    let workspace = Arc::new(MemoryWorkspace::new("dfs.tmp", storage.clone()));

    let first = {
        let (session, workspace) = (session.clone(), workspace.clone());
        tokio::spawn(async move { session.register_temporary_table(workspace.as_ref(), "T").await })
    };
    let second = {
        let (session, workspace) = (session.clone(), workspace.clone());
        tokio::spawn(async move { session.register_temporary_table(workspace.as_ref(), "T").await })
    };

    let first = first.await.unwrap().unwrap();
    let second = second.await.unwrap().unwrap();

    assert_eq!(first, second);
    assert_eq!(storage.creates(), 1);

    // Both callers observe the location as ready
    let location = workspace.root.join(session.id());
    assert!(storage.contains(&location));
}

#[tokio::test]
async fn test_generated_names_are_distinct_across_tables_and_sessions() {
    let storage = MemoryStorage::new();
    let workspace = MemoryWorkspace::new("dfs.tmp", storage.clone());
    let left = new_session();
    let right = new_session();

    let mut generated = HashSet::new();
    for name in ["orders", "customers", "Orders_2"] {
        let from_left = left.register_temporary_table(&workspace, name).await.unwrap();
        let from_right = right.register_temporary_table(&workspace, name).await.unwrap();
        assert!(from_left.starts_with(left.id()));
        assert!(from_right.starts_with(right.id()));
        assert!(generated.insert(from_left));
        assert!(generated.insert(from_right));
    }

    assert_eq!(generated.len(), 6);
    assert_eq!(storage.creates(), 2);
}

#[tokio::test]
async fn test_resolution_is_case_insensitive() {
    let session = new_session();
    let workspace = MemoryWorkspace::new("dfs.tmp", MemoryStorage::new());

    let generated = session
        .register_temporary_table(&workspace, "Foo")
        .await
        .unwrap();

    assert_eq!(session.resolve_temporary_table_name("foo"), Some(generated.clone()));
    assert_eq!(session.resolve_temporary_table_name("FOO"), Some(generated));
    assert_eq!(session.resolve_temporary_table_name("bar"), None);
}

#[tokio::test]
async fn test_provisioning_failure_when_location_never_appears() {
    let session = new_session();
    let storage = MemoryStorage::with(|s| s.phantom_create = true);
    let workspace = MemoryWorkspace::new("dfs.tmp", storage);

    let err = session
        .register_temporary_table(&workspace, "t")
        .await
        .unwrap_err();

    assert!(matches!(err, TesseraError::StorageProvisioning { .. }));
    assert!(err.is_recoverable());
    assert_eq!(session.resolve_temporary_table_name("t"), None);
}

#[tokio::test]
async fn test_session_stays_usable_after_provisioning_failure() {
    let session = new_session();
    let storage = MemoryStorage::with(|s| *s.fail_next_create.get_mut().unwrap() = true);
    let workspace = MemoryWorkspace::new("dfs.tmp", storage.clone());

    let err = session
        .register_temporary_table(&workspace, "t")
        .await
        .unwrap_err();
    assert!(matches!(err, TesseraError::StorageProvisioning { .. }));

    let generated = session
        .register_temporary_table(&workspace, "t")
        .await
        .unwrap();
    assert_eq!(session.resolve_temporary_table_name("T"), Some(generated));
    assert_eq!(storage.creates(), 2);
}

#[tokio::test]
async fn test_is_temporary_table_requires_workspace_registration_and_table_kind() {
    let config = TemporaryConfig::default();
    let session = new_session();
    let storage = MemoryStorage::new();
    let temp = MemoryWorkspace::new("DFS.TMP", storage.clone());
    let other = MemoryWorkspace::new("dfs.work", storage);

    // Not registered
    assert!(!session.is_temporary_table(&temp, &config, "t").await.unwrap());

    // Registered, never materialized
    let generated = session.register_temporary_table(&temp, "t").await.unwrap();
    assert!(!session.is_temporary_table(&temp, &config, "t").await.unwrap());

    temp.materialize(&generated, TableKind::Table);
    assert!(session.is_temporary_table(&temp, &config, "T").await.unwrap());

    // Same name looked up in a workspace that is not the temporary one
    other.materialize(&generated, TableKind::Table);
    assert!(!session.is_temporary_table(&other, &config, "t").await.unwrap());

    // A view is not a temporary table
    let view = session.register_temporary_table(&temp, "v").await.unwrap();
    temp.materialize(&view, TableKind::View);
    assert!(!session.is_temporary_table(&temp, &config, "v").await.unwrap());

    // Dropped behind the session's back
    temp.tables.lock().unwrap().remove(&generated);
    assert!(!session.is_temporary_table(&temp, &config, "t").await.unwrap());
}

#[tokio::test]
async fn test_remove_drops_then_forgets_mapping() {
    let config = TemporaryConfig::default();
    let session = new_session();
    let workspace = MemoryWorkspace::new("dfs.tmp", MemoryStorage::new());

    // Nothing registered: no-op
    session.remove_temporary_table(&workspace, "missing").await.unwrap();

    let generated = session.register_temporary_table(&workspace, "t").await.unwrap();
    workspace.materialize(&generated, TableKind::Table);

    session.remove_temporary_table(&workspace, "T").await.unwrap();
    assert_eq!(session.resolve_temporary_table_name("t"), None);
    assert!(workspace.tables.lock().unwrap().is_empty());
    assert!(!session.is_temporary_table(&workspace, &config, "t").await.unwrap());
}

#[tokio::test]
async fn test_failed_drop_keeps_mapping() {
    let session = new_session();
    let mut workspace = MemoryWorkspace::new("dfs.tmp", MemoryStorage::new());
    workspace.failing_drop = true;

    let generated = session.register_temporary_table(&workspace, "t").await.unwrap();
    workspace.materialize(&generated, TableKind::Table);

    assert!(session.remove_temporary_table(&workspace, "t").await.is_err());
    assert_eq!(session.resolve_temporary_table_name("t"), Some(generated));
}

#[tokio::test]
async fn test_close_twice_deletes_only_once() {
    let session = new_session();
    let storage = MemoryStorage::new();
    let workspace = MemoryWorkspace::new("dfs.tmp", storage.clone());

    session.register_temporary_table(&workspace, "a").await.unwrap();
    session.register_temporary_table(&workspace, "b").await.unwrap();
    let location = workspace.root.join(session.id());
    assert!(storage.contains(&location));

    session.close().await;
    assert_eq!(storage.deletes(), 1);
    assert!(!storage.contains(&location));
    assert_eq!(session.temporary_location_count(), 0);

    session.close().await;
    assert_eq!(storage.deletes(), 1);
}

#[tokio::test]
async fn test_close_continues_past_failing_deletion() {
    let session = new_session();
    let broken = MemoryStorage::with(|s| s.failing_delete = true);
    let healthy = MemoryStorage::new();

    let mut first = MemoryWorkspace::new("dfs.tmp", broken.clone());
    first.root = tessera_core::StoragePath::new("memory", "broken").join("tmp");
    let second = MemoryWorkspace::new("dfs.tmp", healthy.clone());

    session.register_temporary_table(&first, "a").await.unwrap();
    session.register_temporary_table(&second, "b").await.unwrap();
    assert_eq!(session.temporary_location_count(), 2);

    session.close().await;

    assert_eq!(broken.deletes(), 1);
    assert_eq!(healthy.deletes(), 1);
    assert!(!healthy.contains(&second.root.join(session.id())));
    assert_eq!(session.temporary_location_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_close_waits_for_location_being_created() {
    let session = new_session();
    let storage = MemoryStorage::new();
    let workspace = Arc::new(MemoryWorkspace::new("dfs.tmp", storage.clone()));
    let location = workspace.root.join(session.id());

    let registration = {
        let (session, workspace) = (session.clone(), workspace.clone());
        tokio::spawn(async move { session.register_temporary_table(workspace.as_ref(), "t").await })
    };

    // Memory storage takes 20ms to create a location
    tokio::time::sleep(Duration::from_millis(5)).await;
    session.close().await;
    let registered = registration.await.unwrap();

    // Whichever side won, nothing is left on storage or in the session
    assert!(!storage.contains(&location));
    assert_eq!(session.temporary_location_count(), 0);
    if registered.is_ok() {
        assert_eq!(storage.creates(), 1);
        assert_eq!(storage.deletes(), 1);
    } else {
        assert!(matches!(registered, Err(TesseraError::StorageProvisioning { .. })));
        assert_eq!(storage.creates(), 0);
    }
}

#[tokio::test]
async fn test_register_after_close_is_refused() {
    let session = new_session();
    let storage = MemoryStorage::new();
    let workspace = MemoryWorkspace::new("dfs.tmp", storage.clone());

    session.close().await;

    let err = session
        .register_temporary_table(&workspace, "t")
        .await
        .unwrap_err();
    assert!(matches!(err, TesseraError::StorageProvisioning { .. }));
    assert_eq!(storage.creates(), 0);
    assert_eq!(session.resolve_temporary_table_name("t"), None);
}

#[tokio::test]
async fn test_close_skips_locations_never_created() {
    let session = new_session();
    let storage = MemoryStorage::with(|s| s.phantom_create = true);
    let workspace = MemoryWorkspace::new("dfs.tmp", storage.clone());

    assert!(session.register_temporary_table(&workspace, "t").await.is_err());
    assert_eq!(session.temporary_location_count(), 0);

    session.close().await;
    assert_eq!(storage.deletes(), 0);
}
