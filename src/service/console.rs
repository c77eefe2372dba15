use super::status::{ControlKind, ControlRequest, ServiceHandle, ServiceStatus, StatusReporter};
use crate::error::Result;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Reporter for the `debug` command: status transitions go to the log.
#[derive(Debug, Clone)]
pub struct ConsoleReporter {
    service: String,
}

impl ConsoleReporter {
    pub fn new<S: Into<String>>(service: S) -> Self {
        Self {
            service: service.into(),
        }
    }
}

impl StatusReporter for ConsoleReporter {
    fn report(&self, status: &ServiceStatus) -> Result<()> {
        info!(service = %self.service, "Service status: {}", status.state);
        Ok(())
    }

    fn acknowledge(&self, status: &ServiceStatus) -> Result<()> {
        info!(service = %self.service, "Interrogate: {}", status.state);
        Ok(())
    }
}

/// Feed for the `debug` command: Ctrl+C becomes a stop request.
pub fn spawn_console_feed(handle: Arc<ServiceHandle>) -> mpsc::Receiver<ControlRequest> {
    let (tx, rx) = mpsc::channel(4);
    tokio::spawn(async move {
        loop {
            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    if let Err(e) = result {
                        warn!("Unable to listen for Ctrl+C: {}", e);
                        break;
                    }
                    let request = ControlRequest {
                        kind: ControlKind::Stop,
                        current: handle.current(),
                    };
                    if tx.send(request).await.is_err() {
                        break;
                    }
                }
                _ = tx.closed() => break,
            }
        }
    });
    rx
}
