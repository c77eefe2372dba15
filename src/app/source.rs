use super::types::StopEvent;
use async_trait::async_trait;

/// A stream of stop-or-ignorable events feeding the controller.
///
/// Interactive runs use OS signals; service runs use control requests from
/// the service manager. The controller treats both identically.
#[async_trait]
pub trait StopSource: Send {
    /// Wait for the next event. `None` means the source is exhausted and
    /// will never produce another event.
    async fn next_event(&mut self) -> Option<StopEvent>;

    /// Stop listening and free the subscription.
    fn close(&mut self);
}

/// Owns a stop source for the duration of a run and closes it exactly once,
/// either explicitly or when dropped.
pub(crate) struct Subscription<S: StopSource> {
    source: S,
    closed: bool,
}

impl<S: StopSource> Subscription<S> {
    pub(crate) fn new(source: S) -> Self {
        Self {
            source,
            closed: false,
        }
    }

    pub(crate) async fn next_event(&mut self) -> Option<StopEvent> {
        if self.closed {
            return None;
        }
        self.source.next_event().await
    }

    pub(crate) fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.source.close();
        }
    }
}

impl<S: StopSource> Drop for Subscription<S> {
    fn drop(&mut self) {
        self.close();
    }
}
