use super::signals::SignalSource;
use super::source::{StopSource, Subscription};
use super::types::{RunOutcome, ShutdownReason, StopEvent};
use crate::diagnostics::{LifecycleLog, ThreadDump, TracingLog};
use crate::error::{Result, SvcError};
use crate::gate::{Gate, ReleaseOnDrop, StopWaiter};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use tokio::sync::oneshot;

const DEFAULT_WORKER_THREAD: &str = "svcmain-worker";

/// Runs one worker and drives its shutdown from a stop source.
///
/// Each call to [`Controller::run`] arms a fresh gate, starts the worker on
/// its own thread and races the worker's completion against the stop source.
/// Whichever comes first decides the shutdown path; it runs exactly once.
///
/// Cancellation is cooperative. After signaling the gate the controller waits
/// for the worker without any timeout, so a worker that never observes its
/// [`StopWaiter`] keeps the run alive indefinitely.
pub struct Controller {
    log: Arc<dyn LifecycleLog>,
    worker_thread: String,
}

impl Controller {
    pub fn new(log: Arc<dyn LifecycleLog>) -> Self {
        Self {
            log,
            worker_thread: DEFAULT_WORKER_THREAD.to_string(),
        }
    }

    /// Name given to the worker's OS thread, visible in thread dumps.
    pub fn with_worker_thread<S: Into<String>>(mut self, name: S) -> Self {
        self.worker_thread = name.into();
        self
    }

    pub fn log(&self) -> &Arc<dyn LifecycleLog> {
        &self.log
    }

    /// Subscribe to the process's termination signals and run the worker.
    pub async fn run_interactive<F>(&self, worker: F) -> Result<RunOutcome>
    where
        F: FnOnce(StopWaiter) -> anyhow::Result<()> + Send + 'static,
    {
        let signals = SignalSource::subscribe()?;
        self.run(worker, signals).await
    }

    /// Run `worker` until it returns, stopping it when `source` asks to.
    ///
    /// Only fails if the worker thread cannot be started; worker errors are
    /// logged and carried in the returned [`RunOutcome`].
    pub async fn run<F, S>(&self, worker: F, source: S) -> Result<RunOutcome>
    where
        F: FnOnce(StopWaiter) -> anyhow::Result<()> + Send + 'static,
        S: StopSource,
    {
        let gate = Arc::new(Gate::new());
        let _release = ReleaseOnDrop(Arc::clone(&gate));
        let mut subscription = Subscription::new(source);

        let (done_tx, mut done_rx) = oneshot::channel();
        let waiter = gate.waiter();
        thread::Builder::new()
            .name(self.worker_thread.clone())
            .spawn(move || {
                let result = panic::catch_unwind(AssertUnwindSafe(|| worker(waiter)))
                    .unwrap_or_else(|payload| Err(worker_panic(payload)));
                let _ = done_tx.send(result);
            })
            .map_err(|e| SvcError::setup(format!("failed to start worker thread: {}", e)))?;

        self.log.debug("Worker started");

        let mut source_open = true;
        let reason = loop {
            tokio::select! {
                result = &mut done_rx => {
                    subscription.close();
                    gate.release();
                    return Ok(self.finish(result, ShutdownReason::WorkerExited));
                }
                event = subscription.next_event(), if source_open => match event {
                    Some(StopEvent::Graceful(reason)) => break reason,
                    Some(StopEvent::Abort(reason)) => {
                        self.log.dump(&capture_dump(reason.to_string()).await);
                        break reason;
                    }
                    Some(StopEvent::Diagnostic(source)) => {
                        self.log.dump(&capture_dump(source).await);
                    }
                    Some(StopEvent::Ignored(source)) => {
                        self.log.debug(&format!("Ignoring {}", source));
                    }
                    None => {
                        self.log.debug("Stop source exhausted, waiting for worker");
                        subscription.close();
                        source_open = false;
                    }
                },
            }
        };

        self.log.info(&format!("Shutdown initiated: {}", reason));
        subscription.close();
        gate.signal();
        let result = done_rx.await;
        gate.release();
        Ok(self.finish(result, reason))
    }

    fn finish(
        &self,
        result: std::result::Result<anyhow::Result<()>, oneshot::error::RecvError>,
        reason: ShutdownReason,
    ) -> RunOutcome {
        let error = match result {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e),
            Err(_) => Some(anyhow::anyhow!("worker exited without reporting a result")),
        };

        match &error {
            Some(e) => self.log.error(&format!("ERROR: {:#}", e)),
            None => self.log.debug(&format!("Worker finished ({})", reason)),
        }

        RunOutcome { error, reason }
    }
}

impl Default for Controller {
    fn default() -> Self {
        Self::new(TracingLog::new().shared())
    }
}

/// Capture a thread dump off the async task; it reads `/proc` and resolves a
/// backtrace.
async fn capture_dump(reason: String) -> ThreadDump {
    let fallback = reason.clone();
    tokio::task::spawn_blocking(move || ThreadDump::capture(reason))
        .await
        .unwrap_or_else(|_| ThreadDump::capture(fallback))
}

fn worker_panic(payload: Box<dyn Any + Send>) -> anyhow::Error {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string());
    anyhow::anyhow!("worker panicked: {}", message)
}
