//! Host wake-up signalling.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TrySendError};
use std::time::Duration;

use crate::error::PilotError;

/// The host's "request execution" primitive.
///
/// `raise` must return immediately: `Ok` when the host accepted the wake
/// request, `Err` when its event system rejected it.
pub trait HostSignal: Send + Sync {
    fn raise(&self) -> Result<(), PilotError>;
}

impl<F> HostSignal for F
where
    F: Fn() -> Result<(), PilotError> + Send + Sync,
{
    fn raise(&self) -> Result<(), PilotError> {
        self()
    }
}

/// Create a bounded (size 1) wake channel.
///
/// Raising while a wake-up is already queued coalesces into the queued one:
/// the host drains the request slot, not the wake queue.
pub fn wake_channel() -> (ChannelSignal, HostWakeup) {
    let (tx, rx) = mpsc::sync_channel(1);
    (ChannelSignal { tx }, HostWakeup { rx })
}

/// Async-side half of [`wake_channel`].
#[derive(Debug, Clone)]
pub struct ChannelSignal {
    tx: SyncSender<()>,
}

impl HostSignal for ChannelSignal {
    fn raise(&self) -> Result<(), PilotError> {
        match self.tx.try_send(()) {
            Ok(()) | Err(TrySendError::Full(())) => Ok(()),
            Err(TrySendError::Disconnected(())) => Err(PilotError::Signal(
                "host event loop is no longer running".to_string(),
            )),
        }
    }
}

/// Outcome of waiting on a [`HostWakeup`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
    Raised,
    TimedOut,
    Closed,
}

/// Host-side half of [`wake_channel`]; owned by the host's execution context.
#[derive(Debug)]
pub struct HostWakeup {
    rx: Receiver<()>,
}

impl HostWakeup {
    /// Block until raised or until every signal handle is dropped.
    pub fn wait(&self) -> Wake {
        match self.rx.recv() {
            Ok(()) => Wake::Raised,
            Err(_) => Wake::Closed,
        }
    }

    pub fn wait_timeout(&self, timeout: Duration) -> Wake {
        match self.rx.recv_timeout(timeout) {
            Ok(()) => Wake::Raised,
            Err(RecvTimeoutError::Timeout) => Wake::TimedOut,
            Err(RecvTimeoutError::Disconnected) => Wake::Closed,
        }
    }

    /// Non-blocking check, for hosts that poll from their own idle loop.
    pub fn poll(&self) -> bool {
        self.rx.try_recv().is_ok()
    }
}
