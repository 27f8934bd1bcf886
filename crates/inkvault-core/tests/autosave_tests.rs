//! Integration tests for the autosave scheduler.
//!
//! Tests cover:
//!  1. End-to-end timer save of a dirty note
//!  2. Clean notes are skipped
//!  3. Retry bound for encrypted vs plain notes
//!  4. Mutual exclusion of concurrent saves, across re-registration too
//!  5. Timer failures recorded in status and rescheduled
//!  6. Registration lifecycle (unknown, stop, restart, shutdown)
//!  7. Interval resolution through an interval policy

use inkvault_core::autosave::{AutoSaveService, IntervalPolicy, RetryPolicy, SchedulerOptions};
use inkvault_core::{AutoSaveError, AutoSaveScheduler, Note, Persistor};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;

#[derive(Default)]
struct RecordingPersistor {
    calls: AtomicUsize,
    active: AtomicUsize,
    peak_active: AtomicUsize,
    fail: AtomicBool,
    delay: Duration,
}

impl RecordingPersistor {
    fn failing() -> Self {
        Self {
            fail: AtomicBool::new(true),
            ..Self::default()
        }
    }

    fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn peak_active(&self) -> usize {
        self.peak_active.load(Ordering::SeqCst)
    }
}

impl Persistor for RecordingPersistor {
    fn save(&self, _note: &Note) -> anyhow::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_active.fetch_max(active, Ordering::SeqCst);
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        self.active.fetch_sub(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("disk unavailable");
        }
        Ok(())
    }
}

struct FixedInterval(Duration);

impl IntervalPolicy for FixedInterval {
    fn base_interval(&self) -> anyhow::Result<Duration> {
        Ok(self.0)
    }
}

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        base_delay: Duration::from_millis(10),
        ..RetryPolicy::default()
    }
}

fn scheduler(persistor: &Arc<RecordingPersistor>) -> AutoSaveScheduler {
    AutoSaveScheduler::with_options(
        persistor.clone(),
        Handle::current(),
        SchedulerOptions {
            retry: fast_retry(),
            ..SchedulerOptions::default()
        },
    )
}

async fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}

// ─── Test 1: End-to-end timer save ──────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_dirty_note_saved_by_timer() {
    let persistor = Arc::new(RecordingPersistor::default());
    let scheduler = scheduler(&persistor);

    let note = Note::new("groceries", "milk").into_shared();
    let id = note.read().id.clone();
    note.write().mark_saved();
    scheduler.start_auto_save(note.clone(), Duration::from_millis(50));
    note.write().update_content("milk, eggs");

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(
        wait_until(Duration::from_secs(2), || scheduler.save_status(&id).save_count >= 1).await
    );

    assert!(persistor.calls() >= 1);
    let status = scheduler.save_status(&id);
    assert!(status.last_saved.is_some());
    assert!(status.last_error.is_none());
    assert!(!status.is_saving);
    assert!(!note.read().is_modified());
    assert!(note.read().last_saved.is_some());
}

// ─── Test 2: Clean notes are skipped ────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_clean_note_is_not_persisted() {
    let persistor = Arc::new(RecordingPersistor::default());
    let scheduler = scheduler(&persistor);

    let note = Note::new("draft", "unchanged").into_shared();
    note.write().mark_saved();
    let id = note.read().id.clone();
    scheduler.start_auto_save(note, Duration::from_millis(30));

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(persistor.calls(), 0);
    assert!(scheduler.is_auto_save_active(&id));
    assert_eq!(scheduler.save_status(&id).save_count, 0);
}

// ─── Test 3: Retry bound ────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_encrypted_save_retries_three_times() {
    let persistor = Arc::new(RecordingPersistor::failing());
    let scheduler = scheduler(&persistor);

    let note = Note::encrypted("diary", "secret", "aes256").into_shared();
    let id = note.read().id.clone();
    scheduler.start_auto_save(note, Duration::from_secs(3600));

    let err = scheduler.save_now(&id).unwrap_err();
    assert_eq!(err.code(), "ENCRYPTED_SAVE_RETRY_FAILED");
    assert_eq!(
        err,
        AutoSaveError::EncryptedSaveRetryFailed {
            attempts: 3,
            last_error: "disk unavailable".into(),
        }
    );
    assert_eq!(persistor.calls(), 3);

    let status = scheduler.save_status(&id);
    assert!(!status.is_saving);
    assert_eq!(status.save_count, 0);
    assert_eq!(status.last_error, Some(err));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_plain_save_is_attempted_once() {
    let persistor = Arc::new(RecordingPersistor::failing());
    let scheduler = scheduler(&persistor);

    let note = Note::new("todo", "x").into_shared();
    let id = note.read().id.clone();
    scheduler.start_auto_save(note, Duration::from_secs(3600));

    let err = scheduler.save_now(&id).unwrap_err();
    assert_eq!(err, AutoSaveError::Persist("disk unavailable".into()));
    assert_eq!(err.code(), "SAVE_FAILED");
    assert_eq!(persistor.calls(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_save_now_success_counts_once() {
    let persistor = Arc::new(RecordingPersistor::default());
    let scheduler = scheduler(&persistor);

    let note = Note::encrypted("diary", "secret", "chacha20").into_shared();
    let id = note.read().id.clone();
    scheduler.start_auto_save(note.clone(), Duration::from_secs(3600));

    scheduler.save_now(&id).unwrap();
    let status = scheduler.save_status(&id);
    assert_eq!(status.save_count, 1);
    assert!(status.last_saved.is_some());
    assert_eq!(persistor.calls(), 1);
    assert!(!note.read().is_modified());
}

// ─── Test 4: Mutual exclusion ───────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_save_now_is_rejected() {
    let persistor = Arc::new(RecordingPersistor::slow(Duration::from_millis(300)));
    let scheduler = Arc::new(scheduler(&persistor));

    let note = Note::new("long", "body").into_shared();
    let id = note.read().id.clone();
    scheduler.start_auto_save(note, Duration::from_secs(3600));

    let first = {
        let scheduler = scheduler.clone();
        let id = id.clone();
        tokio::task::spawn_blocking(move || scheduler.save_now(&id))
    };

    assert!(
        wait_until(Duration::from_secs(2), || scheduler.save_status(&id).is_saving).await
    );
    let second = scheduler.save_now(&id);
    assert_eq!(second, Err(AutoSaveError::SaveInProgress(id.clone())));
    assert_eq!(second.unwrap_err().code(), "SAVE_IN_PROGRESS");

    assert_eq!(first.await.unwrap(), Ok(()));
    assert_eq!(persistor.calls(), 1);
    assert!(!scheduler.save_status(&id).is_saving);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_restart_during_save_keeps_claim() {
    let persistor = Arc::new(RecordingPersistor::slow(Duration::from_millis(200)));
    let scheduler = Arc::new(scheduler(&persistor));

    let note = Note::new("busy", "body").into_shared();
    let id = note.read().id.clone();
    scheduler.start_auto_save(note.clone(), Duration::from_secs(3600));

    let first = {
        let scheduler = scheduler.clone();
        let id = id.clone();
        tokio::task::spawn_blocking(move || scheduler.save_now(&id))
    };
    assert!(
        wait_until(Duration::from_secs(2), || scheduler.save_status(&id).is_saving).await
    );

    scheduler.start_auto_save(note.clone(), Duration::from_secs(3600));
    assert!(scheduler.save_status(&id).is_saving);
    assert_eq!(
        scheduler.save_now(&id),
        Err(AutoSaveError::SaveInProgress(id.clone()))
    );

    assert_eq!(first.await.unwrap(), Ok(()));
    let status = scheduler.save_status(&id);
    assert!(!status.is_saving);
    // The earlier registration's result is not recorded.
    assert_eq!(status.save_count, 0);
    assert!(note.read().is_modified());
    assert_eq!(persistor.calls(), 1);
    assert_eq!(persistor.peak_active(), 1);

    scheduler.save_now(&id).unwrap();
    assert_eq!(scheduler.save_status(&id).save_count, 1);
    assert_eq!(persistor.peak_active(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stop_and_restart_during_save_keeps_claim() {
    let persistor = Arc::new(RecordingPersistor::slow(Duration::from_millis(200)));
    let scheduler = Arc::new(scheduler(&persistor));

    let note = Note::new("busy", "body").into_shared();
    let id = note.read().id.clone();
    scheduler.start_auto_save(note.clone(), Duration::from_secs(3600));

    let first = {
        let scheduler = scheduler.clone();
        let id = id.clone();
        tokio::task::spawn_blocking(move || scheduler.save_now(&id))
    };
    assert!(
        wait_until(Duration::from_secs(2), || scheduler.save_status(&id).is_saving).await
    );

    scheduler.stop_auto_save(&id);
    scheduler.start_auto_save(note, Duration::from_secs(3600));
    assert_eq!(
        scheduler.save_now(&id),
        Err(AutoSaveError::SaveInProgress(id.clone()))
    );

    assert_eq!(first.await.unwrap(), Ok(()));
    assert!(!scheduler.save_status(&id).is_saving);
    assert_eq!(persistor.peak_active(), 1);
}

// ─── Test 5: Timer failures ─────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_timer_failure_recorded_and_rescheduled() {
    let persistor = Arc::new(RecordingPersistor::failing());
    let scheduler = scheduler(&persistor);

    let note = Note::encrypted("diary", "secret", "aes256").into_shared();
    let id = note.read().id.clone();
    scheduler.start_auto_save(note.clone(), Duration::from_millis(20));

    assert!(
        wait_until(Duration::from_secs(3), || scheduler
            .save_status(&id)
            .last_error
            .is_some())
        .await
    );
    let status = scheduler.save_status(&id);
    let err = status.last_error.unwrap();
    assert_eq!(err.code(), "ENCRYPTED_SAVE_FAILED");
    assert!(err.to_string().contains("after 3 attempts"));

    // Autosave never gives up on its own.
    assert!(wait_until(Duration::from_secs(3), || persistor.calls() >= 6).await);
    assert!(scheduler.is_auto_save_active(&id));
    assert!(note.read().is_modified());

    persistor.fail.store(false, Ordering::SeqCst);
    assert!(
        wait_until(Duration::from_secs(3), || scheduler.save_status(&id).save_count >= 1).await
    );
    assert!(scheduler.save_status(&id).last_error.is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_plain_timer_failure_keeps_cause() {
    let persistor = Arc::new(RecordingPersistor::failing());
    let scheduler = scheduler(&persistor);

    let note = Note::new("todo", "x").into_shared();
    let id = note.read().id.clone();
    scheduler.start_auto_save(note, Duration::from_millis(20));

    assert!(
        wait_until(Duration::from_secs(2), || scheduler
            .save_status(&id)
            .last_error
            .is_some())
        .await
    );
    let err = scheduler.save_status(&id).last_error.unwrap();
    assert_eq!(err, AutoSaveError::Persist("disk unavailable".into()));
}

// ─── Test 6: Registration lifecycle ─────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_unknown_note_reports_not_found() {
    let persistor = Arc::new(RecordingPersistor::default());
    let scheduler = scheduler(&persistor);

    let err = scheduler.save_now("missing").unwrap_err();
    assert_eq!(err.code(), "NOTE_NOT_FOUND");

    let status = scheduler.save_status("missing");
    assert_eq!(status.note_id, "missing");
    assert_eq!(status.last_error.unwrap().code(), "STATUS_NOT_FOUND");

    assert_eq!(
        scheduler.update_auto_save_interval("missing", Duration::from_secs(1)),
        Err(AutoSaveError::NoteNotFound("missing".into()))
    );
    assert!(!scheduler.is_auto_save_active("missing"));
    scheduler.stop_auto_save("missing");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stop_cancels_pending_timer() {
    let persistor = Arc::new(RecordingPersistor::default());
    let scheduler = scheduler(&persistor);

    let note = Note::new("scratch", "dirty").into_shared();
    let id = note.read().id.clone();
    scheduler.start_auto_save(note, Duration::from_millis(50));
    scheduler.stop_auto_save(&id);

    assert!(!scheduler.is_auto_save_active(&id));
    assert!(scheduler.all_save_statuses().is_empty());
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(persistor.calls(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_restart_resets_status() {
    let persistor = Arc::new(RecordingPersistor::default());
    let scheduler = scheduler(&persistor);

    let note = Note::new("a", "b").into_shared();
    let id = note.read().id.clone();
    scheduler.start_auto_save(note.clone(), Duration::from_secs(3600));
    scheduler.save_now(&id).unwrap();
    assert_eq!(scheduler.save_status(&id).save_count, 1);

    scheduler.start_auto_save(note, Duration::from_secs(3600));
    assert_eq!(scheduler.save_status(&id).save_count, 0);
    assert_eq!(scheduler.all_save_statuses().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_shutdown_clears_everything() {
    let persistor = Arc::new(RecordingPersistor::default());
    let scheduler = scheduler(&persistor);

    for i in 0..3 {
        let note = Note::encrypted(format!("n{i}"), "x", "aes256").into_shared();
        scheduler.start_auto_save(note, Duration::from_millis(50));
    }
    scheduler.start_auto_save(Note::new("plain", "x").into_shared(), Duration::from_millis(50));
    assert_eq!(scheduler.encrypted_note_count(), 3);
    assert_eq!(scheduler.all_save_statuses().len(), 4);

    scheduler.shutdown();
    assert!(scheduler.all_save_statuses().is_empty());
    assert_eq!(scheduler.encrypted_note_count(), 0);
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(persistor.calls(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_update_interval_rearms_timer() {
    let persistor = Arc::new(RecordingPersistor::default());
    let scheduler = scheduler(&persistor);

    let note = Note::new("slow", "dirty").into_shared();
    let id = note.read().id.clone();
    scheduler.start_auto_save(note, Duration::from_secs(3600));
    scheduler
        .update_auto_save_interval(&id, Duration::from_millis(30))
        .unwrap();

    assert!(wait_until(Duration::from_secs(2), || persistor.calls() >= 1).await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_edit_during_save_stays_dirty() {
    let persistor = Arc::new(RecordingPersistor::slow(Duration::from_millis(150)));
    let scheduler = scheduler(&persistor);

    let note = Note::new("live", "v1").into_shared();
    let id = note.read().id.clone();
    scheduler.start_auto_save(note.clone(), Duration::from_millis(20));

    assert!(wait_until(Duration::from_secs(2), || scheduler.save_status(&id).is_saving).await);
    note.write().update_content("v2");

    assert!(
        wait_until(Duration::from_secs(2), || scheduler.save_status(&id).save_count >= 1).await
    );
    // The second tick picks up the edit made during the first save.
    assert!(wait_until(Duration::from_secs(3), || persistor.calls() >= 2).await);
    assert!(
        wait_until(Duration::from_secs(3), || !note.read().is_modified()).await
    );
}

// ─── Test 7: Interval resolution ────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_interval_policy_and_backoff() {
    let persistor = Arc::new(RecordingPersistor::default());
    let scheduler = AutoSaveScheduler::with_options(
        persistor.clone(),
        Handle::current(),
        SchedulerOptions {
            interval_policy: Some(Arc::new(FixedInterval(Duration::from_millis(40)))),
            retry: fast_retry(),
            ..SchedulerOptions::default()
        },
    );

    let plain = Note::new("p", "x");
    let secret = Note::encrypted("s", "x", "aes256");
    assert_eq!(scheduler.effective_interval(&plain), Duration::from_millis(40));
    assert_eq!(
        scheduler.effective_interval(&secret),
        Duration::from_millis(40) + Duration::from_secs(30)
    );

    scheduler.set_encrypted_backoff(Duration::from_millis(10));
    assert_eq!(scheduler.effective_interval(&secret), Duration::from_millis(50));

    let shared = secret.into_shared();
    scheduler.start_auto_save_with_settings(shared);
    assert!(wait_until(Duration::from_secs(2), || persistor.calls() >= 1).await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_default_interval_without_policy() {
    let persistor = Arc::new(RecordingPersistor::default());
    let scheduler = scheduler(&persistor);

    assert_eq!(
        scheduler.effective_interval(&Note::new("p", "x")),
        Duration::from_secs(300)
    );
    assert_eq!(
        scheduler.effective_interval(&Note::encrypted("s", "x", "aes256")),
        Duration::from_secs(330)
    );
}
