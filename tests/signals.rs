//! Real signal delivery to the test process. Kept in its own test binary so
//! the signals only reach this run.

#![cfg(unix)]

use std::time::{Duration, Instant};
use svcmain::testing::RecordingLog;
use svcmain::{Controller, ShutdownReason, SignalSource};
use tokio::sync::oneshot;

fn raise(signum: i32) {
    let rc = unsafe { libc::kill(libc::getpid(), signum) };
    assert_eq!(rc, 0, "kill({}) failed", signum);
}

#[tokio::test]
async fn test_usr1_dumps_and_term_stops_worker() {
    let source = SignalSource::subscribe().unwrap();
    let log = RecordingLog::new();
    let (ready_tx, ready_rx) = oneshot::channel();

    let controller_log = log.clone();
    let run = tokio::spawn(async move {
        Controller::new(controller_log)
            .run(
                move |stop| {
                    let _ = ready_tx.send(());
                    stop.wait();
                    Ok(())
                },
                source,
            )
            .await
    });

    ready_rx.await.unwrap();

    raise(libc::SIGUSR1);
    let deadline = Instant::now() + Duration::from_secs(5);
    while log.dumps().is_empty() {
        assert!(Instant::now() < deadline, "SIGUSR1 produced no thread dump");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(log.dumps(), vec!["SIGUSR1".to_string()]);
    assert!(!run.is_finished());

    raise(libc::SIGTERM);
    let outcome = tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .expect("SIGTERM did not stop the run")
        .unwrap()
        .unwrap();

    assert!(outcome.is_success());
    assert_eq!(outcome.reason, ShutdownReason::Signal("SIGTERM".to_string()));
    assert_eq!(log.dumps().len(), 1);
}
