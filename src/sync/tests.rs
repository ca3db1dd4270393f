//! Stock Module Tests
//!
//! Two farm nodes in one process, sharing a `LocalTransport`. `node-1` dispatches,
//! `node-2` executes against its own registry, settings and file root.

#[cfg(test)]
mod tests {
    use crate::config::SyncSettings;
    use crate::error::FarmError;
    use crate::farm::clock::{Clock, ManualClock};
    use crate::farm::registry::ServerRegistry;
    use crate::farm::types::ServerId;
    use crate::sync::SyncModules;
    use crate::sync::cache::{self, LocalCache};
    use crate::sync::files::{self, FileSync};
    use crate::sync::sessions::{self, SessionStore};
    use crate::tasks::dispatcher::TaskDispatcher;
    use crate::tasks::executor::TaskExecutor;
    use crate::tasks::queue::TaskQueue;
    use crate::tasks::registry::TaskRegistry;
    use crate::tasks::transport::{LocalTransport, Transport};
    use crate::tasks::types::{DispatchOutcome, ExecutionOutcome, Task, TaskTarget};

    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    const NOW: u64 = 1_700_000_000_000;

    struct Node {
        registry: Arc<TaskRegistry>,
        modules: SyncModules,
        settings: Arc<SyncSettings>,
        dispatcher: Arc<TaskDispatcher>,
        executor: Arc<TaskExecutor>,
        dir: TempDir,
    }

    struct Farm {
        queue: Arc<TaskQueue>,
        origin: Node,
        peer: Node,
    }

    fn start_node(id: &str, servers: &Arc<ServerRegistry>, queue: &Arc<TaskQueue>) -> Node {
        let dir = tempfile::tempdir().unwrap();
        let registry = TaskRegistry::new();
        let settings = SyncSettings::new();
        let modules = SyncModules::new(FileSync::new(dir.path()));
        modules.register_all(&registry, &settings).unwrap();

        let transport: Arc<dyn Transport> = LocalTransport::new(servers.clone(), queue.clone());
        let clock: Arc<dyn Clock> = ManualClock::starting_at(NOW);
        let dispatcher = TaskDispatcher::new(ServerId::new(id), registry.clone(), transport, clock);
        let executor = TaskExecutor::new(
            ServerId::new(id),
            queue.clone(),
            registry.clone(),
            Duration::from_millis(10),
        );

        Node {
            registry,
            modules,
            settings,
            dispatcher,
            executor,
            dir,
        }
    }

    fn farm() -> Farm {
        let servers = ServerRegistry::new();
        servers.register(ServerId::new("node-1"), true);
        servers.register(ServerId::new("node-2"), true);
        let queue = TaskQueue::new();

        Farm {
            origin: start_node("node-1", &servers, &queue),
            peer: start_node("node-2", &servers, &queue),
            queue,
        }
    }

    async fn dispatch(farm: &Farm, task: Task) {
        let outcome = farm.origin.dispatcher.dispatch(task).await.unwrap();
        assert!(
            matches!(outcome, DispatchOutcome::Dispatched { targets: 1, .. }),
            "unexpected outcome: {:?}",
            outcome
        );
    }

    // ============================================================
    // REGISTRATION
    // ============================================================

    #[test]
    fn test_register_all_registers_stock_types() {
        let dir = tempfile::tempdir().unwrap();
        let registry = TaskRegistry::new();
        let modules = SyncModules::new(FileSync::new(dir.path()));

        modules.register_all(&registry, &SyncSettings::new()).unwrap();

        for tag in [
            files::UPDATE_FILE,
            files::DELETE_FILE,
            cache::CLEAR_CACHE_ITEM,
            cache::CLEAR_CACHE,
            sessions::REMOVE_USER_SESSION,
        ] {
            assert!(registry.has_task(tag), "{} missing", tag);
        }
        assert_eq!(registry.len(), 5);
    }

    #[test]
    fn test_register_all_twice_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let registry = TaskRegistry::new();
        let modules = SyncModules::new(FileSync::new(dir.path()));
        let settings = SyncSettings::new();
        modules.register_all(&registry, &settings).unwrap();

        let second = modules.register_all(&registry, &settings);

        assert!(matches!(
            second,
            Err(FarmError::DuplicateTaskType(tag)) if tag == files::UPDATE_FILE
        ));
    }

    // ============================================================
    // FILES
    // ============================================================

    #[tokio::test]
    async fn test_update_file_writes_bytes_on_peer() {
        // ARRANGE
        let farm = farm();
        let content: Vec<u8> = (0..=255u8).cycle().take(4096).collect();

        // ACT
        dispatch(&farm, FileSync::update_task("media/logo.png", content.clone())).await;
        let executed = farm.peer.executor.run_pending().await;

        // ASSERT
        assert_eq!(executed, 1);
        let written = tokio::fs::read(farm.peer.dir.path().join("media/logo.png"))
            .await
            .unwrap();
        assert_eq!(written, content);
        assert!(
            !farm.origin.dir.path().join("media/logo.png").exists(),
            "sender never executes its own task"
        );
    }

    #[tokio::test]
    async fn test_update_file_overwrites_previous_content() {
        let farm = farm();
        let path = farm.peer.dir.path().join("page.html");
        tokio::fs::write(&path, b"old").await.unwrap();

        dispatch(&farm, FileSync::update_task("page.html", b"new".to_vec())).await;
        farm.peer.executor.run_pending().await;

        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"new");
    }

    #[tokio::test]
    async fn test_update_without_payload_removes_file() {
        let farm = farm();
        let path = farm.peer.dir.path().join("stale.txt");
        tokio::fs::write(&path, b"stale").await.unwrap();

        let task = Task::new(files::UPDATE_FILE, TaskTarget::AllOthers).arg("stale.txt");
        dispatch(&farm, task).await;
        farm.peer.executor.run_pending().await;

        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_delete_file_removes_and_tolerates_missing() {
        let farm = farm();
        let path = farm.peer.dir.path().join("gone.txt");
        tokio::fs::write(&path, b"x").await.unwrap();

        dispatch(&farm, FileSync::delete_task("gone.txt")).await;
        dispatch(&farm, FileSync::delete_task("gone.txt")).await;

        let first = farm.queue.pop(&ServerId::new("node-2")).unwrap();
        let second = farm.queue.pop(&ServerId::new("node-2")).unwrap();
        assert_eq!(farm.peer.executor.execute_received(&first).await, ExecutionOutcome::Executed);
        assert_eq!(farm.peer.executor.execute_received(&second).await, ExecutionOutcome::Executed);
        assert!(!path.exists());
    }

    #[test]
    fn test_resolve_rejects_paths_outside_root() {
        let dir = tempfile::tempdir().unwrap();
        let sync = FileSync::new(dir.path());

        assert!(sync.resolve(files::UPDATE_FILE, "../etc/passwd").is_err());
        assert!(sync.resolve(files::UPDATE_FILE, "a/../../b").is_err());
        assert!(sync.resolve(files::UPDATE_FILE, "/etc/passwd").is_err());
        assert!(sync.resolve(files::UPDATE_FILE, "").is_err());
        assert!(sync.resolve(files::UPDATE_FILE, ".").is_err());

        let resolved = sync.resolve(files::UPDATE_FILE, "./a/b.txt").unwrap();
        assert_eq!(resolved, dir.path().join("a").join("b.txt"));
    }

    #[test]
    fn test_resolve_error_names_requesting_task() {
        let dir = tempfile::tempdir().unwrap();
        let sync = FileSync::new(dir.path());

        let err = sync.resolve(files::DELETE_FILE, "../x.txt").unwrap_err();

        assert!(matches!(
            err,
            FarmError::MalformedTaskPayload { ref type_tag, .. } if type_tag == files::DELETE_FILE
        ));
    }

    #[tokio::test]
    async fn test_escaping_delete_fails_without_touching_outside_file() {
        let farm = farm();
        let outside = farm.peer.dir.path().parent().unwrap().join(format!(
            "outside-{}.txt",
            uuid::Uuid::new_v4().simple()
        ));
        tokio::fs::write(&outside, b"keep").await.unwrap();
        let relative = format!("../{}", outside.file_name().unwrap().to_string_lossy());

        dispatch(&farm, FileSync::delete_task(&relative)).await;
        let envelope = farm.queue.pop(&ServerId::new("node-2")).unwrap();
        let outcome = farm.peer.executor.execute_received(&envelope).await;

        assert!(matches!(outcome, ExecutionOutcome::Failed(_)));
        assert!(outside.exists());
        tokio::fs::remove_file(&outside).await.unwrap();
    }

    #[tokio::test]
    async fn test_disabled_file_sync_on_peer_skips_execution() {
        // ARRANGE: only the receiver has file sync switched off.
        let farm = farm();
        farm.peer.settings.set_files(false);

        // ACT
        dispatch(&farm, FileSync::update_task("a.txt", b"hello".to_vec())).await;
        let envelope = farm.queue.pop(&ServerId::new("node-2")).unwrap();
        let outcome = farm.peer.executor.execute_received(&envelope).await;

        // ASSERT
        assert_eq!(outcome, ExecutionOutcome::SkippedCondition);
        assert!(!farm.peer.dir.path().join("a.txt").exists());
    }

    #[tokio::test]
    async fn test_disabled_file_sync_on_origin_sends_nothing() {
        let farm = farm();
        farm.origin.settings.set_files(false);

        let outcome = farm
            .origin
            .dispatcher
            .dispatch(FileSync::update_task("a.txt", b"hello".to_vec()))
            .await
            .unwrap();

        assert_eq!(outcome, DispatchOutcome::SkippedCondition);
        assert_eq!(farm.queue.total_pending(), 0);
    }

    // ============================================================
    // CACHE
    // ============================================================

    #[tokio::test]
    async fn test_cache_item_and_full_clear() {
        let farm = farm();
        let peer_cache = farm.peer.modules.cache.clone();
        peer_cache.insert("home", json!({"title": "Home"}));
        peer_cache.insert("about", json!({"title": "About"}));

        dispatch(&farm, LocalCache::clear_item_task("home")).await;
        farm.peer.executor.run_pending().await;

        assert!(peer_cache.get("home").is_none());
        assert_eq!(peer_cache.get("about"), Some(json!({"title": "About"})));

        dispatch(&farm, LocalCache::clear_task()).await;
        farm.peer.executor.run_pending().await;

        assert!(peer_cache.is_empty());
    }

    #[tokio::test]
    async fn test_cache_item_without_key_rejected_at_dispatch() {
        let farm = farm();

        let result = farm
            .origin
            .dispatcher
            .dispatch(Task::new(cache::CLEAR_CACHE_ITEM, TaskTarget::AllOthers).memory_only(true))
            .await;

        assert!(matches!(result, Err(FarmError::MalformedTaskPayload { .. })));
        assert_eq!(farm.queue.total_pending(), 0);
    }

    // ============================================================
    // SESSIONS
    // ============================================================

    #[tokio::test]
    async fn test_kick_removes_only_target_user() {
        let farm = farm();
        let peer_sessions: Arc<SessionStore> = farm.peer.modules.sessions.clone();
        peer_sessions.open("alice", "s-1");
        peer_sessions.open("alice", "s-2");
        peer_sessions.open("bob", "s-3");
        assert_eq!(peer_sessions.sessions_of("alice").len(), 2);

        dispatch(&farm, SessionStore::kick_task("alice")).await;
        farm.peer.executor.run_pending().await;

        assert!(!peer_sessions.has_user("alice"));
        assert_eq!(peer_sessions.sessions_of("bob"), vec!["s-3".to_string()]);
    }

    #[tokio::test]
    async fn test_kick_task_is_memory_only() {
        let farm = farm();

        dispatch(&farm, SessionStore::kick_task("carol")).await;

        assert_eq!(farm.queue.pending_memory_only(&ServerId::new("node-2")), 1);
        assert!(farm.origin.registry.has_task(sessions::REMOVE_USER_SESSION));
    }
}
