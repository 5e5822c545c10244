//! 同步引擎测试
//!
//! Drives `SyncEngine` over a scripted in-memory repository: lifecycle,
//! pull/push cycles, conflict pauses, checkpoint navigation and shutdown.

mod test_utils;

use std::sync::Arc;
use std::time::Duration;

use wavesync::checkpoint::CheckpointTrigger;
use wavesync::git::{ConflictInfo, ConflictKind, GitError, GitErrorCode, RepoError};
use wavesync::sync::{EngineState, PauseReason, StopOutcome, SyncError};
use wavesync::SyncEngine;

use test_utils::fixtures::{fast_settings, quiet_settings, FakeRepository, BASE_TREE};
use test_utils::helpers::wait_for;

fn engine_over(
    settings: wavesync::config::SyncSettings,
    dir: &std::path::Path,
) -> (SyncEngine, Arc<FakeRepository>) {
    let repo = Arc::new(FakeRepository::new(&dir.join("state")));
    let engine = SyncEngine::with_repository(settings, repo.clone());
    (engine, repo)
}

#[tokio::test]
async fn start_records_initial_checkpoint_and_stops_gracefully() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, _repo) = engine_over(fast_settings(dir.path()), dir.path());

    engine.start().await.unwrap();
    assert_eq!(engine.state(), EngineState::Running);

    let status = engine.status();
    assert_eq!(status.position.total, 1);
    let initial = engine.history(10, 0).unwrap().iter().next().unwrap();
    assert_eq!(initial.checkpoint.trigger, CheckpointTrigger::Manual);
    assert!(initial.is_current);

    assert!(matches!(
        engine.start().await,
        Err(SyncError::InvalidState { operation: "start", .. })
    ));

    assert_eq!(engine.stop().await.unwrap(), StopOutcome::Graceful);
    assert_eq!(engine.state(), EngineState::Stopped);
    // history stays readable after a stop
    assert_eq!(engine.history(10, 0).unwrap().len(), 1);
}

#[tokio::test]
async fn restart_does_not_duplicate_initial_checkpoint() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, _repo) = engine_over(fast_settings(dir.path()), dir.path());

    engine.start().await.unwrap();
    engine.stop().await.unwrap();
    engine.start().await.unwrap();
    assert_eq!(engine.status().position.total, 1);
    engine.stop().await.unwrap();
}

#[tokio::test]
async fn remote_changes_are_pulled_and_checkpointed() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, repo) = engine_over(fast_settings(dir.path()), dir.path());
    repo.remote_commit("from-laptop");

    engine.start().await.unwrap();
    let status = wait_for(&engine, "a pull", |s| s.stats.pulls >= 1).await;
    assert!(status.last_sync_time.is_some());
    assert_eq!(repo.head_tree(), "from-laptop");

    let pulled = engine.search("auto-pull").unwrap();
    assert_eq!(pulled.len(), 1);
    assert_eq!(pulled[0].trigger, CheckpointTrigger::Auto);
    assert_eq!(pulled[0].commit_summary, "remote change");

    engine.stop().await.unwrap();
}

#[tokio::test]
async fn local_edits_are_committed_and_pushed() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, repo) = engine_over(fast_settings(dir.path()), dir.path());

    engine.start().await.unwrap();
    repo.edit("edited");

    wait_for(&engine, "a push", |s| s.stats.pushes >= 1).await;
    assert_eq!(repo.head_tree(), "edited");
    assert_eq!(repo.ahead(), 0);

    let pushed = engine.search("auto-push").unwrap();
    assert_eq!(pushed.len(), 1);
    assert!(pushed[0].commit_summary.starts_with("[auto] "));
    assert!(pushed[0].commit_summary.ends_with("todo.txt"));

    engine.stop().await.unwrap();
}

#[tokio::test]
async fn ticks_converge_with_alternating_changes() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, repo) = engine_over(fast_settings(dir.path()), dir.path());
    engine.start().await.unwrap();

    repo.remote_commit("remote-1");
    wait_for(&engine, "first pull", |s| s.stats.pulls >= 1).await;
    repo.edit("local-1");
    wait_for(&engine, "first push", |s| s.stats.pushes >= 1).await;
    repo.remote_commit("remote-2");
    wait_for(&engine, "second pull", |s| s.stats.pulls >= 2).await;

    let state = wavesync::git::RemoteRepository::status(repo.as_ref()).await.unwrap();
    assert!(!state.has_remote_changes);
    assert!(!state.has_local_changes);
    assert_eq!(engine.state(), EngineState::Running);

    engine.stop().await.unwrap();
}

#[tokio::test]
async fn merge_conflict_pauses_until_resolved() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, repo) = engine_over(fast_settings(dir.path()), dir.path());
    repo.remote_commit("theirs");
    repo.script_pull(Err(RepoError::Conflict(ConflictInfo::new(
        ConflictKind::MergeConflict,
        ["src/lib.rs".to_string()],
        "CONFLICT (content): Merge conflict in src/lib.rs",
    ))));

    engine.start().await.unwrap();
    let status = wait_for(&engine, "a conflict pause", |s| s.state == EngineState::Paused).await;

    let conflict = status.conflict.expect("conflict is surfaced");
    assert_eq!(conflict.kind, ConflictKind::MergeConflict);
    assert!(conflict.paths.contains("src/lib.rs"));
    assert!(conflict.message.contains("Merge conflict in src/lib.rs"));
    assert!(status.remediation_hint.unwrap().contains("src/lib.rs"));
    assert_eq!(status.stats.conflicts, 1);

    // paused loop does not retry the pull on its own
    let pulls_while_paused = repo.pulls();
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(repo.pulls(), pulls_while_paused);

    engine.resolve_and_resume().unwrap();
    wait_for(&engine, "the retried pull", |s| s.stats.pulls >= 1).await;
    let status = engine.status();
    assert_eq!(status.state, EngineState::Running);
    assert!(status.conflict.is_none());

    engine.stop().await.unwrap();
}

#[tokio::test]
async fn rejected_push_pauses_with_merge_conflict() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, repo) = engine_over(fast_settings(dir.path()), dir.path());
    repo.script_push(Err(RepoError::Conflict(ConflictInfo::new(
        ConflictKind::MergeConflict,
        ["notes/todo.txt".to_string()],
        "! [rejected] HEAD -> main (fetch first)",
    ))));

    engine.start().await.unwrap();
    repo.edit("local");

    let status = wait_for(&engine, "a rejected push", |s| s.state == EngineState::Paused).await;
    assert!(matches!(
        status.pause_reason,
        Some(PauseReason::Conflict(ref c)) if c.kind == ConflictKind::MergeConflict
    ));
    // the local commit is kept, never force-pushed away
    assert_eq!(repo.head_tree(), "local");
    assert_eq!(repo.ahead(), 1);

    engine.stop().await.unwrap();
}

#[tokio::test]
async fn push_timeout_pauses_like_a_conflict() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, repo) = engine_over(fast_settings(dir.path()), dir.path());
    repo.script_push(Err(RepoError::Git(GitError::timeout(
        "push",
        Duration::from_secs(60),
    ))));

    engine.start().await.unwrap();
    repo.edit("slow");

    let status = wait_for(&engine, "a timeout pause", |s| s.state == EngineState::Paused).await;
    match status.pause_reason {
        Some(PauseReason::Timeout { operation, .. }) => assert_eq!(operation, "push"),
        other => panic!("unexpected pause reason {:?}", other),
    }
    assert!(status.conflict.is_none());

    // a manual retry that succeeds resumes the loop
    engine.manual_sync().await.unwrap();
    assert_eq!(engine.state(), EngineState::Running);
    assert_eq!(repo.ahead(), 0);

    engine.stop().await.unwrap();
}

#[tokio::test]
async fn network_errors_are_reported_and_retried() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, repo) = engine_over(fast_settings(dir.path()), dir.path());
    repo.set_network_down(true);

    engine.start().await.unwrap();
    let status = wait_for(&engine, "a network error", |s| s.last_error.is_some()).await;
    assert_eq!(status.state, EngineState::Running);
    assert!(status.last_error.unwrap().contains("Could not resolve host"));

    repo.set_network_down(false);
    repo.remote_commit("after-outage");
    wait_for(&engine, "recovery", |s| s.stats.pulls >= 1).await;
    assert!(engine.status().last_error.is_none());

    engine.stop().await.unwrap();
}

#[tokio::test]
async fn revert_and_forward_navigate_the_log() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, repo) = engine_over(quiet_settings(dir.path()), dir.path());
    engine.start().await.unwrap();
    wait_for(&engine, "the first tick", |s| s.last_sync_time.is_some()).await;

    let mut ids = Vec::new();
    for tree in ["A", "B", "C"] {
        repo.edit(tree);
        ids.push(engine.checkpoint(&format!("state {}", tree)).await.unwrap().id);
    }
    // initial checkpoint plus A, B, C
    assert_eq!(engine.status().position.cursor, Some(3));

    let a = engine.revert(2).await.unwrap();
    assert_eq!(a.id, ids[0]);
    assert_eq!(repo.worktree(), "A");
    assert_eq!(engine.status().position.cursor, Some(1));

    let b = engine.forward(1).await.unwrap();
    assert_eq!(b.id, ids[1]);
    assert_eq!(repo.worktree(), "B");
    assert_eq!(engine.status().position.cursor, Some(2));

    // navigation only ever adds commits
    let post = engine
        .history(20, 0)
        .unwrap()
        .iter()
        .filter(|e| e.checkpoint.trigger == CheckpointTrigger::PostRevert)
        .count();
    assert_eq!(post, 2);

    engine.stop().await.unwrap();
}

#[tokio::test]
async fn revert_then_forward_restores_content() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, repo) = engine_over(quiet_settings(dir.path()), dir.path());
    engine.start().await.unwrap();
    wait_for(&engine, "the first tick", |s| s.last_sync_time.is_some()).await;

    repo.edit("one");
    engine.checkpoint("one").await.unwrap();
    repo.edit("two");
    engine.checkpoint("two").await.unwrap();

    engine.revert(2).await.unwrap();
    assert_eq!(repo.worktree(), BASE_TREE);
    engine.forward(2).await.unwrap();
    assert_eq!(repo.worktree(), "two");

    engine.stop().await.unwrap();
}

#[tokio::test]
async fn dirty_edits_are_committed_before_revert() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, repo) = engine_over(quiet_settings(dir.path()), dir.path());
    engine.start().await.unwrap();
    wait_for(&engine, "the first tick", |s| s.last_sync_time.is_some()).await;

    repo.edit("saved");
    engine.checkpoint("saved").await.unwrap();
    repo.edit("unsaved work");

    engine.revert(1).await.unwrap();
    assert_eq!(repo.worktree(), BASE_TREE);

    let pre = engine
        .history(20, 0)
        .unwrap()
        .iter()
        .find(|e| e.checkpoint.trigger == CheckpointTrigger::PreRevert)
        .expect("dirty state recorded");
    assert!(pre.checkpoint.description.starts_with("Before revert"));

    engine.stop().await.unwrap();
}

#[tokio::test]
async fn out_of_range_navigation_changes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, repo) = engine_over(quiet_settings(dir.path()), dir.path());
    engine.start().await.unwrap();
    wait_for(&engine, "the first tick", |s| s.last_sync_time.is_some()).await;

    repo.edit("only");
    engine.checkpoint("only").await.unwrap();
    let before = engine.status().position;
    let commits = repo.commit_count();

    assert!(matches!(
        engine.revert(5).await,
        Err(SyncError::OutOfRange {
            requested: 5,
            available: 1
        })
    ));
    assert!(matches!(engine.forward(1).await, Err(SyncError::OutOfRange { .. })));
    assert!(matches!(engine.goto(999).await, Err(SyncError::NotFound(999))));

    assert_eq!(engine.status().position, before);
    assert_eq!(repo.commit_count(), commits);
    assert!(repo.checkouts().is_empty());

    engine.stop().await.unwrap();
}

#[tokio::test]
async fn manual_sync_while_busy_is_rejected_and_hung_stop_is_forced() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, repo) = engine_over(fast_settings(dir.path()), dir.path());
    repo.remote_commit("never arrives");
    repo.hang_pulls();

    engine.start().await.unwrap();
    // give the first tick time to get stuck in pull
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert!(matches!(engine.manual_sync().await, Err(SyncError::Busy)));
    assert!(matches!(engine.checkpoint("x").await, Err(SyncError::Busy)));

    let started = std::time::Instant::now();
    assert_eq!(engine.stop().await.unwrap(), StopOutcome::Forced);
    assert!(started.elapsed() < Duration::from_secs(3));
    assert_eq!(engine.state(), EngineState::Stopped);
}

#[tokio::test]
async fn emergency_stop_tears_down_immediately() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, repo) = engine_over(fast_settings(dir.path()), dir.path());
    repo.remote_commit("never arrives");
    repo.hang_pulls();

    engine.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    engine.emergency_stop();
    let status = engine.status();
    assert_eq!(status.state, EngineState::Stopped);
    assert!(!status.monitor.unwrap().watching);
}

#[tokio::test]
async fn stop_waits_for_manual_sync_and_forces_a_hung_one() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, repo) = engine_over(quiet_settings(dir.path()), dir.path());
    engine.start().await.unwrap();
    wait_for(&engine, "the first tick", |s| s.last_sync_time.is_some()).await;

    repo.remote_commit("never arrives");
    repo.hang_pulls();
    let syncing = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.manual_sync().await })
    };
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!syncing.is_finished());

    // the loop itself is idle, the manual cycle is what holds things up
    let started = std::time::Instant::now();
    assert_eq!(engine.stop().await.unwrap(), StopOutcome::Forced);
    assert!(started.elapsed() >= Duration::from_millis(900));
    assert!(started.elapsed() < Duration::from_secs(3));

    let report = tokio::time::timeout(Duration::from_secs(1), syncing)
        .await
        .expect("manual sync dropped by the forced stop")
        .unwrap()
        .unwrap();
    assert!(report.cancelled);
    assert!(report.pull.is_none());

    engine.start().await.unwrap();
    engine.checkpoint("after restart").await.unwrap();
    assert_eq!(engine.stop().await.unwrap(), StopOutcome::Graceful);
}

#[tokio::test]
async fn emergency_stop_drops_manual_sync_in_flight() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, repo) = engine_over(quiet_settings(dir.path()), dir.path());
    engine.start().await.unwrap();
    wait_for(&engine, "the first tick", |s| s.last_sync_time.is_some()).await;

    repo.remote_commit("never arrives");
    repo.hang_pulls();
    let syncing = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.manual_sync().await })
    };
    tokio::time::sleep(Duration::from_millis(200)).await;

    engine.emergency_stop();
    let report = tokio::time::timeout(Duration::from_secs(1), syncing)
        .await
        .expect("manual sync dropped by the emergency stop")
        .unwrap()
        .unwrap();
    assert!(report.cancelled);

    engine.start().await.unwrap();
    assert!(engine.checkpoint("after restart").await.is_ok());
    engine.stop().await.unwrap();
}

#[tokio::test]
async fn memory_ceiling_stops_the_engine() {
    let dir = tempfile::tempdir().unwrap();
    let mut settings = fast_settings(dir.path());
    settings.max_memory_mb = 1;
    let (engine, _repo) = engine_over(settings, dir.path());

    engine.start().await.unwrap();
    let status = wait_for(&engine, "the memory watchdog", |s| {
        s.state == EngineState::Stopped
    })
    .await;
    let reason = status.last_error.unwrap();
    assert!(reason.contains("memory usage"), "{}", reason);
    assert!(!status.monitor.unwrap().watching);
    assert!(matches!(
        engine.manual_sync().await,
        Err(SyncError::InvalidState { .. })
    ));

    let mut relaxed = fast_settings(dir.path());
    relaxed.max_memory_mb = 0;
    engine.reinitialize(relaxed).await.unwrap();
    engine.start().await.unwrap();
    wait_for(&engine, "a tick without the watchdog", |s| s.last_sync_time.is_some()).await;
    assert_eq!(engine.state(), EngineState::Running);
    assert_eq!(engine.stop().await.unwrap(), StopOutcome::Graceful);
}

#[tokio::test]
async fn invalid_settings_fail_start_until_reinitialized() {
    let dir = tempfile::tempdir().unwrap();
    let mut settings = fast_settings(dir.path());
    settings.sync_interval = Duration::ZERO;
    let (engine, _repo) = engine_over(settings, dir.path());

    match engine.start().await {
        Err(SyncError::Configuration { field, .. }) => {
            assert_eq!(field, "remote.syncIntervalSeconds")
        }
        other => panic!("unexpected {:?}", other),
    }
    assert!(matches!(engine.state(), EngineState::Failed(ref r) if r.contains("remote.syncIntervalSeconds")));
    assert!(matches!(
        engine.start().await,
        Err(SyncError::InvalidState { .. })
    ));

    engine.reinitialize(fast_settings(dir.path())).await.unwrap();
    assert_eq!(engine.state(), EngineState::Stopped);
    engine.start().await.unwrap();
    engine.stop().await.unwrap();
}

#[tokio::test]
async fn navigation_and_profile_switch_respect_state() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, _repo) = engine_over(quiet_settings(dir.path()), dir.path());

    assert!(matches!(
        engine.revert(1).await,
        Err(SyncError::InvalidState { operation: "revert", .. })
    ));
    assert!(matches!(engine.resolve_and_resume(), Err(SyncError::InvalidState { .. })));

    engine.start().await.unwrap();
    let mut config = wavesync::config::ConfigStore::default();
    let profile = wavesync::config::Profile::new("work", "https://example.invalid/work.git", dir.path().join("code"));
    assert!(matches!(
        engine.switch_profile(&mut config, &profile).await,
        Err(SyncError::InvalidState { .. })
    ));
    engine.stop().await.unwrap();

    engine.switch_profile(&mut config, &profile).await.unwrap();
    assert_eq!(engine.settings().remote_url, "https://example.invalid/work.git");
    assert_eq!(
        config.get("remote.url").and_then(|v| v.as_str()),
        Some("https://example.invalid/work.git")
    );
}

#[tokio::test]
async fn status_reports_memory_and_position() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, _repo) = engine_over(quiet_settings(dir.path()), dir.path());
    engine.start().await.unwrap();

    let status = engine.status();
    assert!(status.memory_usage.unwrap_or(1) > 0);
    assert_eq!(status.position.total, 1);
    assert!(!status.position.can_revert());

    let json = serde_json::to_value(&status).unwrap();
    assert_eq!(json["state"]["state"], "running");

    engine.stop().await.unwrap();
}

#[tokio::test]
async fn unknown_quarantine_entry_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, _repo) = engine_over(quiet_settings(dir.path()), dir.path());
    engine.start().await.unwrap();
    wait_for(&engine, "the first tick", |s| s.last_sync_time.is_some()).await;

    assert!(engine.quarantined().await.unwrap().is_empty());
    match engine.discard_quarantined("missing").await {
        Err(SyncError::Git(e)) => assert_eq!(e.code, GitErrorCode::NotFound),
        other => panic!("unexpected {:?}", other),
    }

    engine.stop().await.unwrap();
}
