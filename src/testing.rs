//! Helpers for exercising workers and the lifecycle machinery in tests.

use crate::app::{StopEvent, StopSource};
use crate::diagnostics::{LifecycleLog, ThreadDump};
use crate::error::{Result, SvcError};
use crate::gate::Gate;
use crate::service::{ServiceStatus, StatusReporter};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc as std_mpsc, Arc};
use std::thread;
use std::time::Instant;
use tokio::sync::mpsc;

/// A worker started in the background with its own gate.
pub struct WorkerHandle {
    gate: Arc<Gate>,
    done: std_mpsc::Receiver<anyhow::Result<()>>,
}

/// Start `worker` on a background thread, as the controller would, without
/// touching signals or a service manager.
pub fn spawn_worker<F>(worker: F) -> WorkerHandle
where
    F: FnOnce(crate::StopWaiter) -> anyhow::Result<()> + Send + 'static,
{
    let gate = Arc::new(Gate::new());
    let waiter = gate.waiter();
    let (tx, done) = std_mpsc::channel();
    thread::spawn(move || {
        let _ = tx.send(worker(waiter));
    });
    WorkerHandle { gate, done }
}

impl WorkerHandle {
    /// Ask the worker to stop and wait for its result.
    pub fn stop(self) -> anyhow::Result<()> {
        self.gate.signal();
        let result = self
            .done
            .recv()
            .unwrap_or_else(|_| Err(anyhow::anyhow!("worker exited without reporting a result")));
        self.gate.release();
        result
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// Log collaborator that keeps everything in memory.
#[derive(Default)]
pub struct RecordingLog {
    records: Mutex<Vec<(LogLevel, String)>>,
    dumps: Mutex<Vec<String>>,
}

impl RecordingLog {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn records(&self) -> Vec<(LogLevel, String)> {
        self.records.lock().clone()
    }

    pub fn messages(&self, level: LogLevel) -> Vec<String> {
        self.records
            .lock()
            .iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, m)| m.clone())
            .collect()
    }

    /// Reasons of all recorded thread dumps, in order.
    pub fn dumps(&self) -> Vec<String> {
        self.dumps.lock().clone()
    }

    fn push(&self, level: LogLevel, message: &str) {
        self.records.lock().push((level, message.to_string()));
    }
}

impl LifecycleLog for RecordingLog {
    fn info(&self, message: &str) {
        self.push(LogLevel::Info, message);
    }

    fn warn(&self, message: &str) {
        self.push(LogLevel::Warn, message);
    }

    fn error(&self, message: &str) {
        self.push(LogLevel::Error, message);
    }

    fn debug(&self, message: &str) {
        self.push(LogLevel::Debug, message);
    }

    fn dump(&self, dump: &ThreadDump) {
        self.dumps.lock().push(dump.reason.clone());
    }
}

/// Stop source fed from a channel, counting how often it is closed.
pub struct ChannelSource {
    events: mpsc::UnboundedReceiver<StopEvent>,
    closes: Arc<AtomicUsize>,
}

impl ChannelSource {
    pub fn channel() -> (mpsc::UnboundedSender<StopEvent>, Self) {
        let (tx, events) = mpsc::unbounded_channel();
        let source = Self {
            events,
            closes: Arc::new(AtomicUsize::new(0)),
        };
        (tx, source)
    }

    /// Shared counter of `close` calls, readable after the source is consumed.
    pub fn close_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.closes)
    }
}

#[async_trait]
impl StopSource for ChannelSource {
    async fn next_event(&mut self) -> Option<StopEvent> {
        self.events.recv().await
    }

    fn close(&mut self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.events.close();
    }
}

/// Status reporter that records every report with the time it was made.
#[derive(Default)]
pub struct RecordingReporter {
    reports: Mutex<Vec<(ServiceStatus, Instant)>>,
    acknowledgements: Mutex<Vec<(ServiceStatus, Instant)>>,
    failing: bool,
}

impl RecordingReporter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A reporter whose manager is unreachable.
    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            failing: true,
            ..Self::default()
        })
    }

    pub fn reports(&self) -> Vec<(ServiceStatus, Instant)> {
        self.reports.lock().clone()
    }

    pub fn acknowledgements(&self) -> Vec<(ServiceStatus, Instant)> {
        self.acknowledgements.lock().clone()
    }

    fn check(&self) -> Result<()> {
        if self.failing {
            return Err(SvcError::setup("service manager unreachable"));
        }
        Ok(())
    }
}

impl StatusReporter for RecordingReporter {
    fn report(&self, status: &ServiceStatus) -> Result<()> {
        self.check()?;
        self.reports.lock().push((*status, Instant::now()));
        Ok(())
    }

    fn acknowledge(&self, status: &ServiceStatus) -> Result<()> {
        self.check()?;
        self.acknowledgements.lock().push((*status, Instant::now()));
        Ok(())
    }
}
