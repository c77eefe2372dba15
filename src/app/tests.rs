use super::*;
use crate::testing::{ChannelSource, LogLevel, RecordingLog};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;

fn graceful(name: &str) -> StopEvent {
    StopEvent::Graceful(ShutdownReason::Signal(name.to_string()))
}

fn controller(log: &Arc<RecordingLog>) -> Controller {
    Controller::new(log.clone())
}

#[tokio::test]
async fn test_immediate_return_closes_subscription_once() {
    let log = RecordingLog::new();
    let (_tx, source) = ChannelSource::channel();
    let closes = source.close_counter();

    let outcome = controller(&log)
        .run(|_stop| Ok(()), source)
        .await
        .unwrap();

    assert!(outcome.is_success());
    assert_eq!(outcome.reason, ShutdownReason::WorkerExited);
    assert!(!outcome.stop_requested());
    assert_eq!(closes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_immediate_failure_is_reported_without_waiting() {
    let log = RecordingLog::new();
    let (_tx, source) = ChannelSource::channel();
    let waited = Arc::new(AtomicBool::new(false));
    let waited_in_worker = Arc::clone(&waited);

    let outcome = controller(&log)
        .run(
            move |stop| {
                waited_in_worker.store(stop.is_stopped(), Ordering::SeqCst);
                Err(anyhow::anyhow!("failed"))
            },
            source,
        )
        .await
        .unwrap();

    assert!(!waited.load(Ordering::SeqCst));
    assert_eq!(outcome.reason, ShutdownReason::WorkerExited);
    assert_eq!(outcome.error.as_ref().unwrap().to_string(), "failed");

    let errors = log.messages(LogLevel::Error);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("failed"));
}

#[tokio::test]
async fn test_graceful_stop_waits_for_worker() {
    let log = RecordingLog::new();
    let (tx, source) = ChannelSource::channel();
    let closes = source.close_counter();
    let worker_done = Arc::new(AtomicBool::new(false));
    let worker_done_flag = Arc::clone(&worker_done);

    tokio::spawn(async move {
        sleep(Duration::from_millis(100)).await;
        let _ = tx.send(graceful("SIGTERM"));
    });

    let outcome = controller(&log)
        .run(
            move |stop| {
                stop.wait();
                std::thread::sleep(Duration::from_millis(50));
                worker_done_flag.store(true, Ordering::SeqCst);
                Ok(())
            },
            source,
        )
        .await
        .unwrap();

    assert!(worker_done.load(Ordering::SeqCst));
    assert!(outcome.is_success());
    assert_eq!(outcome.reason, ShutdownReason::Signal("SIGTERM".to_string()));
    assert_eq!(closes.load(Ordering::SeqCst), 1);
    assert!(log.dumps().is_empty());
}

#[tokio::test]
async fn test_stop_during_sleeping_worker() {
    let log = RecordingLog::new();
    let (tx, source) = ChannelSource::channel();
    tx.send(graceful("SIGINT")).unwrap();

    let started = Instant::now();
    let outcome = controller(&log)
        .run(
            |_stop| {
                std::thread::sleep(Duration::from_millis(150));
                Ok(())
            },
            source,
        )
        .await
        .unwrap();

    assert!(started.elapsed() >= Duration::from_millis(150));
    assert!(outcome.is_success());
    assert!(outcome.stop_requested());
    assert!(log.messages(LogLevel::Error).is_empty());
}

#[tokio::test]
async fn test_abort_dumps_once_then_stops() {
    let log = RecordingLog::new();
    let (tx, source) = ChannelSource::channel();
    tx.send(StopEvent::Abort(ShutdownReason::Signal("SIGABRT".to_string())))
        .unwrap();

    let outcome = controller(&log)
        .run(
            |stop| {
                stop.wait();
                Ok(())
            },
            source,
        )
        .await
        .unwrap();

    assert_eq!(log.dumps(), vec!["signal SIGABRT".to_string()]);
    assert_eq!(outcome.reason, ShutdownReason::Signal("SIGABRT".to_string()));
}

/// Records, for each dump, whether the worker had already been stopped and
/// whether the dump listed the worker thread.
#[derive(Default)]
struct DumpOrderLog {
    worker_stopped: Arc<AtomicBool>,
    dumps: parking_lot::Mutex<Vec<(bool, bool)>>,
}

impl crate::diagnostics::LifecycleLog for DumpOrderLog {
    fn info(&self, _message: &str) {}
    fn warn(&self, _message: &str) {}
    fn error(&self, _message: &str) {}
    fn debug(&self, _message: &str) {}

    fn dump(&self, dump: &crate::diagnostics::ThreadDump) {
        let listed_worker = dump.threads.iter().any(|t| t.name == "svcmain-worker");
        self.dumps
            .lock()
            .push((self.worker_stopped.load(Ordering::SeqCst), listed_worker));
    }
}

#[tokio::test]
async fn test_abort_dump_is_taken_before_the_worker_is_stopped() {
    let log = Arc::new(DumpOrderLog::default());
    let worker_stopped = Arc::clone(&log.worker_stopped);
    let (tx, source) = ChannelSource::channel();

    let outcome = Controller::new(log.clone())
        .run(
            move |stop| {
                tx.send(StopEvent::Abort(ShutdownReason::Signal("SIGQUIT".to_string())))
                    .unwrap();
                stop.wait();
                worker_stopped.store(true, Ordering::SeqCst);
                Ok(())
            },
            source,
        )
        .await
        .unwrap();

    assert_eq!(outcome.reason, ShutdownReason::Signal("SIGQUIT".to_string()));
    let dumps = log.dumps.lock().clone();
    assert_eq!(dumps.len(), 1);
    assert!(!dumps[0].0);
    if cfg!(target_os = "linux") {
        assert!(dumps[0].1);
    }
}

#[tokio::test]
async fn test_diagnostic_dumps_and_keeps_running() {
    let log = RecordingLog::new();
    let (tx, source) = ChannelSource::channel();
    let stopped_early = Arc::new(AtomicBool::new(false));
    let stopped_flag = Arc::clone(&stopped_early);

    tx.send(StopEvent::Diagnostic("SIGUSR1".to_string())).unwrap();
    tx.send(StopEvent::Diagnostic("SIGUSR1".to_string())).unwrap();
    tokio::spawn(async move {
        sleep(Duration::from_millis(150)).await;
        let _ = tx.send(graceful("SIGTERM"));
    });

    let outcome = controller(&log)
        .run(
            move |stop| {
                stopped_flag.store(stop.wait_timeout(Duration::from_millis(100)), Ordering::SeqCst);
                stop.wait();
                Ok(())
            },
            source,
        )
        .await
        .unwrap();

    assert!(!stopped_early.load(Ordering::SeqCst));
    assert_eq!(log.dumps().len(), 2);
    assert_eq!(outcome.reason, ShutdownReason::Signal("SIGTERM".to_string()));
}

#[tokio::test]
async fn test_ignored_events_do_not_stop_the_run() {
    let log = RecordingLog::new();
    let (tx, source) = ChannelSource::channel();
    let stopped_early = Arc::new(AtomicBool::new(false));
    let stopped_flag = Arc::clone(&stopped_early);

    tx.send(StopEvent::Ignored("SIGHUP".to_string())).unwrap();
    tokio::spawn(async move {
        sleep(Duration::from_millis(150)).await;
        let _ = tx.send(graceful("SIGINT"));
    });

    let outcome = controller(&log)
        .run(
            move |stop| {
                stopped_flag.store(stop.wait_timeout(Duration::from_millis(100)), Ordering::SeqCst);
                stop.wait();
                Ok(())
            },
            source,
        )
        .await
        .unwrap();

    assert!(!stopped_early.load(Ordering::SeqCst));
    assert!(log.dumps().is_empty());
    assert_eq!(outcome.reason, ShutdownReason::Signal("SIGINT".to_string()));
}

#[tokio::test]
async fn test_exhausted_source_waits_for_worker() {
    let log = RecordingLog::new();
    let (tx, source) = ChannelSource::channel();
    let closes = source.close_counter();
    drop(tx);

    let outcome = controller(&log)
        .run(
            |stop| {
                let stopped = stop.wait_timeout(Duration::from_millis(100));
                anyhow::ensure!(!stopped, "worker was stopped by an exhausted source");
                Ok(())
            },
            source,
        )
        .await
        .unwrap();

    assert!(outcome.is_success());
    assert_eq!(outcome.reason, ShutdownReason::WorkerExited);
    assert_eq!(closes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_worker_panic_is_reported() {
    let log = RecordingLog::new();
    let (_tx, source) = ChannelSource::channel();

    let outcome = controller(&log)
        .run(|_stop| -> anyhow::Result<()> { panic!("boom") }, source)
        .await
        .unwrap();

    let message = outcome.error.unwrap().to_string();
    assert!(message.contains("worker panicked"));
    assert!(message.contains("boom"));
}

#[tokio::test]
async fn test_late_events_after_stop_are_noops() {
    let log = RecordingLog::new();
    let (tx, source) = ChannelSource::channel();
    let waits = Arc::new(AtomicUsize::new(0));
    let waits_in_worker = Arc::clone(&waits);

    tx.send(graceful("SIGTERM")).unwrap();
    tx.send(graceful("SIGINT")).unwrap();
    tx.send(StopEvent::Abort(ShutdownReason::Signal("SIGABRT".to_string())))
        .unwrap();

    let outcome = controller(&log)
        .run(
            move |stop| {
                for _ in 0..3 {
                    stop.wait();
                    waits_in_worker.fetch_add(1, Ordering::SeqCst);
                }
                Ok(())
            },
            source,
        )
        .await
        .unwrap();

    assert_eq!(waits.load(Ordering::SeqCst), 3);
    assert_eq!(outcome.reason, ShutdownReason::Signal("SIGTERM".to_string()));
    assert!(log.dumps().is_empty());
}
