//! Session-end signal.

use parking_lot::Mutex;

use crate::error::{ClientError, Result};
use crate::waiter::Waiter;

/// Resolves once per session, when the connection closes or the handler stops.
#[derive(Debug, Default)]
pub struct DisconnectGate {
    signal: Mutex<Option<Waiter<()>>>,
}

impl DisconnectGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the signal for a new session.
    ///
    /// A signal that is still pending is kept as is. Returns true if a new
    /// signal was created.
    pub fn arm(&self) -> bool {
        let mut signal = self.signal.lock();
        match &*signal {
            Some(waiter) if !waiter.is_terminal() => false,
            _ => {
                *signal = Some(Waiter::new());
                true
            }
        }
    }

    /// Resolve the signal. Returns false if it was already resolved or never armed.
    pub fn resolve(&self) -> bool {
        let signal = self.signal.lock().clone();
        signal.is_some_and(|waiter| waiter.resolve(()))
    }

    /// Whether the current session has ended.
    pub fn is_resolved(&self) -> bool {
        self.signal
            .lock()
            .as_ref()
            .is_some_and(|waiter| waiter.is_terminal())
    }

    /// Suspend until the session ends.
    pub async fn wait(&self) -> Result<()> {
        let waiter = self
            .signal
            .lock()
            .clone()
            .ok_or(ClientError::NotStarted)?;
        waiter.wait().await.into_result()
    }
}
