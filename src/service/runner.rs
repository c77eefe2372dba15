use super::status::{
    Accepts, ControlKind, ControlRequest, ServiceHandle, ServiceState, ServiceStatus,
    StatusReporter,
};
use crate::app::{Controller, RunOutcome, ShutdownReason, StopEvent, StopSource};
use crate::diagnostics::LifecycleLog;
use crate::error::Result;
use crate::gate::StopWaiter;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Delay between the two acknowledgements of an interrogate request. Some
/// managers race with a service that answers only once.
pub const DEFAULT_INTERROGATE_DELAY: Duration = Duration::from_millis(100);

/// Interrogate answers still in flight.
///
/// Each answer runs as its own task so that the controller dropping
/// `next_event` mid-delay cannot cut the pair short.
#[derive(Clone, Default)]
pub struct PendingAcks(Arc<Mutex<Vec<JoinHandle<()>>>>);

impl PendingAcks {
    fn push(&self, task: JoinHandle<()>) {
        self.0.lock().push(task);
    }

    /// Wait until every answer started so far has been sent.
    pub async fn wait(&self) {
        loop {
            let tasks: Vec<_> = self.0.lock().drain(..).collect();
            if tasks.is_empty() {
                break;
            }
            for task in tasks {
                let _ = task.await;
            }
        }
    }
}

/// Stop source over control requests delivered by a service manager.
pub struct ControlRequestSource {
    requests: mpsc::Receiver<ControlRequest>,
    handle: Arc<ServiceHandle>,
    log: Arc<dyn LifecycleLog>,
    interrogate_delay: Duration,
    acks: PendingAcks,
}

impl ControlRequestSource {
    pub fn new(
        requests: mpsc::Receiver<ControlRequest>,
        handle: Arc<ServiceHandle>,
        log: Arc<dyn LifecycleLog>,
        interrogate_delay: Duration,
    ) -> Self {
        Self {
            requests,
            handle,
            log,
            interrogate_delay,
            acks: PendingAcks::default(),
        }
    }

    pub fn pending_acks(&self) -> PendingAcks {
        self.acks.clone()
    }

    fn answer_interrogate(&self, request: ControlRequest) -> oneshot::Receiver<()> {
        let (done_tx, done_rx) = oneshot::channel();
        let handle = Arc::clone(&self.handle);
        let delay = self.interrogate_delay;
        self.acks.push(tokio::spawn(async move {
            handle.acknowledge(&request.current);
            tokio::time::sleep(delay).await;
            handle.acknowledge(&request.current);
            let _ = done_tx.send(());
        }));
        done_rx
    }
}

#[async_trait]
impl StopSource for ControlRequestSource {
    async fn next_event(&mut self) -> Option<StopEvent> {
        let request = self.requests.recv().await?;
        let event = match request.kind {
            ControlKind::Interrogate => {
                let _ = self.answer_interrogate(request).await;
                StopEvent::Ignored(request.kind.to_string())
            }
            ControlKind::Stop | ControlKind::Shutdown => {
                self.log.info("Stopping Service");
                StopEvent::Graceful(ShutdownReason::ControlRequest(request.kind.to_string()))
            }
            ControlKind::Unknown(_) => {
                self.log
                    .error(&format!("unexpected control request {}", request.kind));
                StopEvent::Ignored(request.kind.to_string())
            }
        };
        Some(event)
    }

    fn close(&mut self) {
        self.requests.close();
    }
}

/// Runs a worker under a service manager's control protocol.
///
/// Reports `StartPending -> Running` before the worker starts and
/// `StopPending -> Stopped` after it returns, whichever way the run ended.
pub struct ServiceRunner {
    name: String,
    handle: Arc<ServiceHandle>,
    log: Arc<dyn LifecycleLog>,
    interrogate_delay: Duration,
}

impl ServiceRunner {
    pub fn new<S: Into<String>>(
        name: S,
        reporter: Arc<dyn StatusReporter>,
        log: Arc<dyn LifecycleLog>,
    ) -> Self {
        let handle = Arc::new(ServiceHandle::new(reporter, Arc::clone(&log)));
        Self {
            name: name.into(),
            handle,
            log,
            interrogate_delay: DEFAULT_INTERROGATE_DELAY,
        }
    }

    pub fn with_interrogate_delay(mut self, delay: Duration) -> Self {
        self.interrogate_delay = delay;
        self
    }

    /// Shared status handle, for feeds that stamp requests with the current status.
    pub fn handle(&self) -> Arc<ServiceHandle> {
        Arc::clone(&self.handle)
    }

    pub async fn run<F>(
        &self,
        worker: F,
        requests: mpsc::Receiver<ControlRequest>,
    ) -> Result<RunOutcome>
    where
        F: FnOnce(StopWaiter) -> anyhow::Result<()> + Send + 'static,
    {
        self.log.info(&format!("starting {} service", self.name));

        let started = self
            .handle
            .set_status(ServiceStatus::new(ServiceState::StartPending))
            .and_then(|_| {
                self.handle.set_status(
                    ServiceStatus::new(ServiceState::Running).with_accepts(Accepts::STOP_AND_SHUTDOWN),
                )
            });

        let outcome = match started {
            Ok(()) => {
                let source = ControlRequestSource::new(
                    requests,
                    Arc::clone(&self.handle),
                    Arc::clone(&self.log),
                    self.interrogate_delay,
                );
                let acks = source.pending_acks();
                let outcome = Controller::new(Arc::clone(&self.log))
                    .run(worker, source)
                    .await;
                acks.wait().await;
                outcome
            }
            Err(e) => Err(e),
        };

        self.handle
            .set_status_logged(ServiceStatus::new(ServiceState::StopPending));
        self.handle
            .set_status_logged(ServiceStatus::new(ServiceState::Stopped));

        match &outcome {
            Ok(_) => self.log.info(&format!("{} service stopped", self.name)),
            Err(e) => self
                .log
                .error(&format!("{} service failed: {}", self.name, e)),
        }
        outcome
    }
}
