//! One-shot result cell shared between a requester and the dispatch path.
//!
//! A [`Waiter`] starts out pending and settles exactly once: resolved with a
//! value, failed with a protocol error, or cancelled. Later attempts to settle
//! it are ignored. Any number of tasks may await the same waiter and all of
//! them observe the same outcome.

use std::sync::Arc;

use mqlink_core::ProtocolError;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::error::{ClientError, Result};

/// Terminal state of a [`Waiter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    /// The matching response arrived.
    Resolved(T),
    /// The response arrived but could not be accepted.
    Failed(ProtocolError),
    /// The session went away before a response arrived.
    Cancelled,
}

impl<T> Outcome<T> {
    /// Map the outcome onto the client error model.
    pub fn into_result(self) -> Result<T> {
        match self {
            Outcome::Resolved(value) => Ok(value),
            Outcome::Failed(e) => Err(ClientError::Protocol(e)),
            Outcome::Cancelled => Err(ClientError::ConnectionClosed),
        }
    }
}

enum State<T> {
    Pending,
    Settled(Outcome<T>),
}

struct Inner<T> {
    state: Mutex<State<T>>,
    notify: Notify,
}

/// Shared handle to a one-shot result cell.
pub struct Waiter<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Waiter<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for Waiter<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for Waiter<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match &*self.inner.state.lock() {
            State::Pending => "pending",
            State::Settled(Outcome::Resolved(_)) => "resolved",
            State::Settled(Outcome::Failed(_)) => "failed",
            State::Settled(Outcome::Cancelled) => "cancelled",
        };
        f.debug_struct("Waiter").field("state", &state).finish()
    }
}

impl<T> Waiter<T> {
    /// Create a pending waiter.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::Pending),
                notify: Notify::new(),
            }),
        }
    }

    /// Resolve with a value. Returns false if already settled.
    pub fn resolve(&self, value: T) -> bool {
        self.settle(Outcome::Resolved(value))
    }

    /// Fail with a protocol error. Returns false if already settled.
    pub fn fail(&self, error: ProtocolError) -> bool {
        self.settle(Outcome::Failed(error))
    }

    /// Cancel. Returns false if already settled.
    pub fn cancel(&self) -> bool {
        self.settle(Outcome::Cancelled)
    }

    /// Whether the waiter has left the pending state.
    pub fn is_terminal(&self) -> bool {
        matches!(*self.inner.state.lock(), State::Settled(_))
    }

    /// Whether both handles refer to the same cell.
    pub fn same_as(&self, other: &Waiter<T>) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn settle(&self, outcome: Outcome<T>) -> bool {
        {
            let mut state = self.inner.state.lock();
            if let State::Settled(_) = *state {
                return false;
            }
            *state = State::Settled(outcome);
        }
        self.inner.notify.notify_waiters();
        true
    }
}

impl<T: Clone> Waiter<T> {
    /// The outcome, if settled.
    pub fn outcome(&self) -> Option<Outcome<T>> {
        match &*self.inner.state.lock() {
            State::Pending => None,
            State::Settled(outcome) => Some(outcome.clone()),
        }
    }

    /// Suspend until the waiter settles.
    pub async fn wait(&self) -> Outcome<T> {
        loop {
            // Register interest before checking the state so a settle that
            // lands in between is not missed.
            let mut notified = std::pin::pin!(self.inner.notify.notified());
            notified.as_mut().enable();

            if let Some(outcome) = self.outcome() {
                return outcome;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_transition_wins() {
        let waiter = Waiter::new();
        assert!(!waiter.is_terminal());
        assert!(waiter.resolve(vec![1u8]));
        assert!(!waiter.cancel());
        assert!(!waiter.resolve(vec![2]));
        assert!(!waiter.fail(ProtocolError::MalformedPacket("late".into())));
        assert_eq!(waiter.outcome(), Some(Outcome::Resolved(vec![1])));
    }

    #[test]
    fn test_terminal_states_are_distinct() {
        let failed: Waiter<()> = Waiter::new();
        failed.fail(ProtocolError::MalformedPacket("bad".into()));
        assert!(matches!(
            failed.outcome().unwrap().into_result(),
            Err(ClientError::Protocol(_))
        ));

        let cancelled: Waiter<()> = Waiter::new();
        cancelled.cancel();
        assert!(matches!(
            cancelled.outcome().unwrap().into_result(),
            Err(ClientError::ConnectionClosed)
        ));

        let resolved: Waiter<()> = Waiter::new();
        resolved.resolve(());
        assert!(resolved.outcome().unwrap().into_result().is_ok());
    }

    #[test]
    fn test_same_as() {
        let a: Waiter<()> = Waiter::new();
        let b = a.clone();
        let c = Waiter::new();
        assert!(a.same_as(&b));
        assert!(!a.same_as(&c));
    }

    #[tokio::test]
    async fn test_wait_after_settle_returns_immediately() {
        let waiter = Waiter::new();
        waiter.resolve(5u32);
        assert_eq!(waiter.wait().await, Outcome::Resolved(5));
        assert_eq!(waiter.wait().await, Outcome::Resolved(5));
    }

    #[tokio::test]
    async fn test_all_waiters_observe_same_outcome() {
        let waiter: Waiter<u32> = Waiter::new();
        let tasks: Vec<_> = (0..4)
            .map(|_| {
                let w = waiter.clone();
                tokio::spawn(async move { w.wait().await })
            })
            .collect();

        tokio::task::yield_now().await;
        assert!(waiter.resolve(42));

        for task in tasks {
            assert_eq!(task.await.unwrap(), Outcome::Resolved(42));
        }
    }

    #[tokio::test]
    async fn test_cancel_wakes_waiter() {
        let waiter: Waiter<u32> = Waiter::new();
        let w = waiter.clone();
        let task = tokio::spawn(async move { w.wait().await });

        tokio::task::yield_now().await;
        assert!(waiter.cancel());
        assert_eq!(task.await.unwrap(), Outcome::Cancelled);
    }
}
