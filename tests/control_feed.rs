//! systemd control feed driven by real signals. Its own test binary so the
//! signals only reach this run.

#![cfg(target_os = "linux")]

use std::sync::Arc;
use std::time::Duration;
use svcmain::service::systemd::spawn_control_feed;
use svcmain::service::{ControlKind, ControlRequest, ServiceHandle, ServiceState, ServiceStatus};
use svcmain::testing::{RecordingLog, RecordingReporter};
use tokio::sync::mpsc;

fn raise(signum: i32) {
    let rc = unsafe { libc::kill(libc::getpid(), signum) };
    assert_eq!(rc, 0, "kill({}) failed", signum);
}

async fn next(rx: &mut mpsc::Receiver<ControlRequest>) -> ControlRequest {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("no control request delivered")
        .expect("control feed closed")
}

#[tokio::test]
async fn test_signals_map_to_control_requests() {
    let handle = Arc::new(ServiceHandle::new(
        RecordingReporter::new(),
        RecordingLog::new(),
    ));
    handle
        .set_status(ServiceStatus::new(ServiceState::Running))
        .unwrap();
    let mut rx = spawn_control_feed(Arc::clone(&handle), None).unwrap();

    raise(libc::SIGTERM);
    let request = next(&mut rx).await;
    assert_eq!(request.kind, ControlKind::Stop);
    assert_eq!(request.current.state, ServiceState::Running);

    raise(libc::SIGINT);
    assert_eq!(next(&mut rx).await.kind, ControlKind::Shutdown);

    raise(libc::SIGHUP);
    assert_eq!(next(&mut rx).await.kind, ControlKind::Unknown(1));

    assert!(rx.try_recv().is_err());
}
