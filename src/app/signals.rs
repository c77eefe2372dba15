use super::source::StopSource;
use super::types::{ShutdownReason, StopEvent};
use crate::error::{Result, SvcError};
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

/// How the controller reacts to a given signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalAction {
    Graceful,
    Abort,
    Diagnostic,
    Ignore,
}

pub fn classify(signum: i32) -> SignalAction {
    match signum {
        libc::SIGINT | libc::SIGTERM => SignalAction::Graceful,
        libc::SIGABRT => SignalAction::Abort,
        #[cfg(unix)]
        libc::SIGQUIT => SignalAction::Abort,
        #[cfg(unix)]
        libc::SIGUSR1 => SignalAction::Diagnostic,
        _ => SignalAction::Ignore,
    }
}

pub fn signal_name(signum: i32) -> String {
    let name = match signum {
        libc::SIGINT => "SIGINT",
        libc::SIGTERM => "SIGTERM",
        libc::SIGABRT => "SIGABRT",
        #[cfg(unix)]
        libc::SIGQUIT => "SIGQUIT",
        #[cfg(unix)]
        libc::SIGUSR1 => "SIGUSR1",
        #[cfg(unix)]
        libc::SIGHUP => "SIGHUP",
        other => return format!("signal {}", other),
    };
    name.to_string()
}

/// Translate a delivered signal into a controller event.
pub fn signal_event(signum: i32) -> StopEvent {
    let name = signal_name(signum);
    match classify(signum) {
        SignalAction::Graceful => StopEvent::Graceful(ShutdownReason::Signal(name)),
        SignalAction::Abort => StopEvent::Abort(ShutdownReason::Signal(name)),
        SignalAction::Diagnostic => StopEvent::Diagnostic(name),
        SignalAction::Ignore => StopEvent::Ignored(name),
    }
}

/// Signals an interactive run listens to. SIGHUP is delivered and ignored.
#[cfg(unix)]
pub fn terminal_signals() -> Vec<i32> {
    vec![
        libc::SIGINT,
        libc::SIGTERM,
        libc::SIGABRT,
        libc::SIGQUIT,
        libc::SIGUSR1,
        libc::SIGHUP,
    ]
}

#[cfg(not(unix))]
pub fn terminal_signals() -> Vec<i32> {
    vec![libc::SIGINT]
}

/// Stop source backed by OS signal delivery.
///
/// One listener task per signal forwards deliveries into a channel; closing
/// the source aborts the listeners.
///
/// Closing does not restore the default dispositions: tokio keeps its
/// handlers installed for the life of the process, so after a run the
/// subscribed signals are delivered to nobody and no longer terminate it.
/// Callers that need the defaults back must exit the process.
pub struct SignalSource {
    events: mpsc::Receiver<i32>,
    listeners: Vec<JoinHandle<()>>,
}

impl SignalSource {
    /// Subscribe to [`terminal_signals`]. Must be called inside a tokio runtime.
    pub fn subscribe() -> Result<Self> {
        Self::subscribe_to(&terminal_signals())
    }

    #[cfg(unix)]
    pub fn subscribe_to(signals: &[i32]) -> Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        let (tx, events) = mpsc::channel(16);
        let mut listeners = Vec::with_capacity(signals.len());

        for &signum in signals {
            let mut stream = match signal(SignalKind::from_raw(signum)) {
                Ok(stream) => stream,
                Err(e) => {
                    listeners.iter().for_each(|l: &JoinHandle<()>| l.abort());
                    return Err(SvcError::setup(format!(
                        "failed to register {} handler: {}",
                        signal_name(signum),
                        e
                    )));
                }
            };
            let tx = tx.clone();
            listeners.push(tokio::spawn(async move {
                while stream.recv().await.is_some() {
                    if tx.send(signum).await.is_err() {
                        break;
                    }
                }
            }));
        }

        debug!("Subscribed to {} signals", signals.len());
        Ok(Self { events, listeners })
    }

    #[cfg(not(unix))]
    pub fn subscribe_to(_signals: &[i32]) -> Result<Self> {
        let (tx, events) = mpsc::channel(16);
        let listener = tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                if tx.send(libc::SIGINT).await.is_err() {
                    break;
                }
            }
        });
        Ok(Self {
            events,
            listeners: vec![listener],
        })
    }
}

#[async_trait]
impl StopSource for SignalSource {
    async fn next_event(&mut self) -> Option<StopEvent> {
        self.events.recv().await.map(signal_event)
    }

    fn close(&mut self) {
        for listener in self.listeners.drain(..) {
            listener.abort();
        }
        self.events.close();
        debug!("Signal subscription closed");
    }
}
