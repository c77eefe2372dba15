mod controller;
mod signals;
mod source;
mod types;

#[cfg(test)]
mod tests;

pub use controller::Controller;
pub use signals::{classify, signal_event, signal_name, terminal_signals, SignalAction, SignalSource};
pub use source::StopSource;
pub use types::{RunOutcome, ShutdownReason, StopEvent};
