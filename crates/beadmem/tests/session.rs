//! Session start, store and checkpoints through the facade.

use beadmem::{Beadmem, BeadmemConfig, EngineMode};
use beadmem_bd::{
    DepKind, Dependency, Issue, MemoryCategory, Priority, Status, read_issues_from_path,
};
use beadmem_engine::fakes::{FakeEngine, FakeMode};
use beadmem_provider::ProviderContext;
use beadmem_sync::{ConflictStrategy, SyncState};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

fn fixture_config() -> BeadmemConfig {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/beadmem.toml");
    BeadmemConfig::load(&path)
        .unwrap_or_else(|e| panic!("failed to load {}: {e}", path.display()))
}

fn config_in(dir: &Path, local_fallback: bool) -> BeadmemConfig {
    let mut config = fixture_config();
    config.engine.working_dir = Some(dir.to_path_buf());
    config.memory.local_fallback = local_fallback;
    config
}

fn open(config: BeadmemConfig, fake: &Arc<FakeEngine>) -> Beadmem<Arc<FakeEngine>> {
    let context = ProviderContext::new("planner", "s-1").expect("context");
    Beadmem::with_runner(config, context, Arc::clone(fake))
}

/// Counts warn-level events.
struct WarnCounter(Arc<AtomicUsize>);

impl<S: Subscriber> Layer<S> for WarnCounter {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() == Level::WARN {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }
}

fn work_item(id: &str, session: &str, priority: i64) -> Issue {
    let mut issue = Issue::new(id, format!("work {id}"));
    issue.labels = vec![format!("session:{session}")];
    issue.priority = Priority::new(priority).expect("priority");
    issue
}

#[test]
fn fixture_config_parses() {
    let config = fixture_config();
    assert_eq!(config.engine.working_dir, Some(PathBuf::from(".")));
    assert_eq!(config.sync.debounce_secs, 0);
    assert_eq!(config.sync.conflict_strategy, ConflictStrategy::Newest);
    assert!(config.memory.local_fallback);
}

#[test]
fn session_start_restores_entries_and_ready_work() {
    let dir = tempfile::tempdir().expect("tempdir");
    let fake = Arc::new(FakeEngine::new());
    fake.seed(work_item("bd-100", "s-1", 2));
    fake.seed(work_item("bd-101", "s-1", 0));
    fake.seed(work_item("bd-102", "s-2", 0));
    let mut blocked = work_item("bd-103", "s-1", 0);
    blocked
        .dependencies
        .push(Dependency::new("bd-103", "bd-100", DepKind::Blocks).expect("edge"));
    fake.seed(blocked);

    let memory = open(config_in(dir.path(), false), &fake);
    let ctx = memory.provider().context().clone();
    for title in ["first", "second"] {
        memory
            .store(&ctx.entry(MemoryCategory::Context, title, "x").expect("entry"))
            .expect("store");
    }

    let start = memory.start_session().expect("start session");
    assert_eq!(start.mode, EngineMode::Engine);
    assert_eq!(start.context.session_id, "s-1");
    assert_eq!(start.context.entries.len(), 2);

    let ready: Vec<&str> = start
        .context
        .ready_work
        .iter()
        .map(|issue| issue.id.as_str())
        .collect();
    assert_eq!(ready, vec!["bd-101", "bd-100"]);
}

#[test]
fn missing_engine_is_reported_once_as_local_only() {
    let dir = tempfile::tempdir().expect("tempdir");
    let fake = Arc::new(FakeEngine::with_mode(FakeMode::NotInstalled));
    let memory = open(config_in(dir.path(), false), &fake);

    for _ in 0..2 {
        let start = memory.start_session().expect("start session");
        assert_eq!(start.mode, EngineMode::LocalOnly);
        assert!(start.context.entries.is_empty());
        assert!(start.context.ready_work.is_empty());
    }
    // Availability is checked once and cached.
    assert_eq!(fake.call_count(), 1);
}

#[test]
fn uninitialized_engine_with_fallback_keeps_memory_local() {
    let dir = tempfile::tempdir().expect("tempdir");
    let fake = Arc::new(FakeEngine::with_mode(FakeMode::NotInitialized));
    let memory = open(config_in(dir.path(), true), &fake);
    let ctx = memory.provider().context().clone();

    let id = memory
        .store(&ctx.entry(MemoryCategory::Decision, "offline", "kept").expect("entry"))
        .expect("store");
    assert!(id.starts_with("local-"));

    let start = memory.start_session().expect("start session");
    assert_eq!(start.mode, EngineMode::LocalOnly);
    assert_eq!(start.context.entries.len(), 1);
    assert_eq!(start.context.entries[0].id, id);
}

#[test]
fn local_only_session_start_warns_once() {
    let dir = tempfile::tempdir().expect("tempdir");
    let fake = Arc::new(FakeEngine::with_mode(FakeMode::NotInitialized));
    let memory = open(config_in(dir.path(), true), &fake);
    let warnings = Arc::new(AtomicUsize::new(0));
    let subscriber = tracing_subscriber::registry().with(WarnCounter(Arc::clone(&warnings)));

    let start = tracing::subscriber::with_default(subscriber, || {
        memory.start_session().expect("start session")
    });

    assert_eq!(start.mode, EngineMode::LocalOnly);
    assert_eq!(warnings.load(Ordering::SeqCst), 1);
    assert!(memory.provider().is_degraded());
}

#[test]
fn delete_reopens_pending_write_after_commit() {
    let dir = tempfile::tempdir().expect("tempdir");
    let fake = Arc::new(FakeEngine::new());
    let memory = open(config_in(dir.path(), false), &fake);
    let ctx = memory.provider().context().clone();

    let id = memory
        .store(&ctx.entry(MemoryCategory::Context, "short lived", "x").expect("entry"))
        .expect("store");
    assert!(memory.before_commit().expect("before commit"));
    assert_eq!(memory.sync().state(), SyncState::InSync);

    std::thread::sleep(Duration::from_millis(20));
    assert!(memory.delete(&id).expect("delete"));
    assert!(matches!(
        memory.sync().state(),
        SyncState::PendingWrite { .. }
    ));

    assert!(memory.before_commit().expect("second commit"));
    assert_eq!(memory.sync().stats().flushes, 2);
    let log = read_issues_from_path(memory.sync().log_path()).expect("read log");
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].status, Status::Closed);

    // Nothing left to close, so nothing new to flush.
    assert!(!memory.delete(&id).expect("second delete"));
    assert_eq!(memory.sync().state(), SyncState::InSync);
}

#[test]
fn link_and_touch_open_pending_writes() {
    let dir = tempfile::tempdir().expect("tempdir");
    let fake = Arc::new(FakeEngine::new());
    let memory = open(config_in(dir.path(), false), &fake);
    let ctx = memory.provider().context().clone();

    let a = memory
        .store(&ctx.entry(MemoryCategory::Context, "a", "a").expect("entry"))
        .expect("store");
    let b = memory
        .store(&ctx.entry(MemoryCategory::Context, "b", "b").expect("entry"))
        .expect("store");

    assert!(memory.before_commit().expect("before commit"));
    std::thread::sleep(Duration::from_millis(20));
    assert!(memory.link_entries(&a, &b, DepKind::Related).expect("link"));
    assert!(matches!(
        memory.sync().state(),
        SyncState::PendingWrite { .. }
    ));

    assert!(memory.before_commit().expect("before commit"));
    std::thread::sleep(Duration::from_millis(20));
    memory.touch(&a).expect("touch");
    assert!(matches!(
        memory.sync().state(),
        SyncState::PendingWrite { .. }
    ));
    assert!(memory.before_commit().expect("before commit"));
    assert_eq!(memory.sync().stats().flushes, 3);
}

#[test]
fn store_then_commit_flushes_log() {
    let dir = tempfile::tempdir().expect("tempdir");
    let fake = Arc::new(FakeEngine::new());
    let memory = open(config_in(dir.path(), false), &fake);
    let ctx = memory.provider().context().clone();

    let id = memory
        .store(&ctx.entry(MemoryCategory::Learning, "flush me", "x").expect("entry"))
        .expect("store");
    assert!(matches!(
        memory.sync().state(),
        SyncState::PendingWrite { .. }
    ));

    assert!(memory.before_commit().expect("before commit"));
    assert_eq!(memory.sync().state(), SyncState::InSync);

    let log = read_issues_from_path(memory.sync().log_path()).expect("read log");
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].id, id);
    assert_eq!(log[0].status, Status::Open);
}

#[test]
fn after_pull_imports_log_into_engine() {
    let dir = tempfile::tempdir().expect("tempdir");
    let fake = Arc::new(FakeEngine::new());
    let memory = open(config_in(dir.path(), false), &fake);

    assert!(!memory.after_pull().expect("no log yet"));

    let log = memory.sync().log_path();
    std::fs::create_dir_all(log.parent().expect("parent")).expect("mkdir");
    std::fs::write(
        &log,
        "{\"id\":\"bd-7\",\"title\":\"pulled\",\"labels\":[\"session:s-1\"]}\n",
    )
    .expect("write log");

    assert!(memory.after_pull().expect("after pull"));
    assert!(fake.issue("bd-7").is_some());

    let start = memory.start_session().expect("start session");
    assert_eq!(start.context.ready_work.len(), 1);
    assert_eq!(start.context.ready_work[0].id, "bd-7");
}
