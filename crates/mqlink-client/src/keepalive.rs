//! Keepalive rounds: one PINGREQ/PINGRESP exchange at a time.
//!
//! A round is opened by the first `ping()` caller, who sends the PINGREQ.
//! Callers arriving while the round is in flight join it instead of sending
//! another PINGREQ, and every participant resolves with the same pong. The
//! pong itself is handed over through the round's single-slot waiter. A
//! PINGRESP is only accepted once the round's PINGREQ has left the transport;
//! with no sent round it is simply discarded.

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use crate::error::{ClientError, Result};
use crate::waiter::{Outcome, Waiter};

/// Proof that the broker answered a PINGREQ.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PongReceipt {
    /// Time between sending the PINGREQ and receiving the PINGRESP.
    pub round_trip: Duration,
}

struct Round {
    waiter: Waiter<PongReceipt>,
    /// Set once the PINGREQ was handed to the transport.
    sent_at: Option<Instant>,
}

struct RoundState {
    open: bool,
    round: Option<Round>,
}

/// A caller's place in a keepalive round.
pub struct PingTicket {
    waiter: Waiter<PongReceipt>,
    initiator: bool,
}

impl PingTicket {
    /// Whether this caller opened the round and must send the PINGREQ.
    pub fn is_initiator(&self) -> bool {
        self.initiator
    }

    pub async fn wait(&self) -> Outcome<PongReceipt> {
        self.waiter.wait().await
    }
}

/// Keepalive round state.
pub struct KeepAlive {
    state: Mutex<RoundState>,
}

impl Default for KeepAlive {
    fn default() -> Self {
        Self::new()
    }
}

impl KeepAlive {
    /// Create a closed driver; rounds are refused until [`open`](Self::open).
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RoundState {
                open: false,
                round: None,
            }),
        }
    }

    pub fn open(&self) {
        self.state.lock().open = true;
    }

    /// Open a round, or join the one in flight.
    pub fn begin(&self) -> Result<PingTicket> {
        let mut state = self.state.lock();
        if !state.open {
            return Err(ClientError::ConnectionClosed);
        }

        if let Some(round) = &state.round {
            if !round.waiter.is_terminal() {
                return Ok(PingTicket {
                    waiter: round.waiter.clone(),
                    initiator: false,
                });
            }
        }

        let waiter = Waiter::new();
        state.round = Some(Round {
            waiter: waiter.clone(),
            sent_at: None,
        });
        Ok(PingTicket {
            waiter,
            initiator: true,
        })
    }

    /// Record that the initiator's PINGREQ went out.
    ///
    /// Until then the round accepts no PINGRESP.
    pub fn mark_sent(&self, ticket: &PingTicket) {
        let mut state = self.state.lock();
        if let Some(round) = state.round.as_mut() {
            if round.waiter.same_as(&ticket.waiter) {
                round.sent_at = Some(Instant::now());
            }
        }
    }

    /// Cancel the round `ticket` belongs to, if it is still the current one.
    ///
    /// Used when the PINGREQ could not be sent, so joined callers are not
    /// left waiting on a pong that will never come.
    pub fn abandon(&self, ticket: &PingTicket) {
        let round = {
            let mut state = self.state.lock();
            match &state.round {
                Some(round) if round.waiter.same_as(&ticket.waiter) => state.round.take(),
                _ => None,
            }
        };
        if let Some(round) = round {
            round.waiter.cancel();
        }
    }

    /// Complete the in-flight round with a received PINGRESP.
    ///
    /// Returns the receipt, or `None` when no sent round was waiting. A
    /// round whose PINGREQ is still being written stays open.
    pub fn deliver(&self) -> Option<PongReceipt> {
        let (round, sent_at) = {
            let mut state = self.state.lock();
            let sent_at = state.round.as_ref()?.sent_at?;
            (state.round.take()?, sent_at)
        };
        let receipt = PongReceipt {
            round_trip: sent_at.elapsed(),
        };
        round.waiter.resolve(receipt).then_some(receipt)
    }

    /// Whether a round is open, sent or not, and still waiting.
    pub fn in_flight(&self) -> bool {
        self.state
            .lock()
            .round
            .as_ref()
            .is_some_and(|round| !round.waiter.is_terminal())
    }

    /// Refuse new rounds and cancel the one in flight.
    pub fn close(&self) -> bool {
        let round = {
            let mut state = self.state.lock();
            state.open = false;
            state.round.take()
        };
        round.is_some_and(|round| round.waiter.cancel())
    }
}

/// Instant of the last successful write, shared with the idle monitor.
#[derive(Debug)]
pub struct WriteClock {
    last_write: Mutex<Instant>,
}

impl Default for WriteClock {
    fn default() -> Self {
        Self::new()
    }
}

impl WriteClock {
    pub fn new() -> Self {
        Self {
            last_write: Mutex::new(Instant::now()),
        }
    }

    pub fn touch(&self) {
        *self.last_write.lock() = Instant::now();
    }

    pub fn last_write(&self) -> Instant {
        *self.last_write.lock()
    }
}

/// Something that reacts to the writer going idle.
pub(crate) trait WriteIdle: Send + Sync + 'static {
    fn write_clock(&self) -> &WriteClock;
    fn on_write_idle(self: Arc<Self>);
}

/// Fire `on_write_idle` whenever nothing was written for `interval`.
///
/// Runs until the target is dropped.
pub(crate) async fn watch_write_idle<H: WriteIdle>(target: Weak<H>, interval: Duration) {
    let mut deadline = Instant::now() + interval;
    loop {
        tokio::time::sleep_until(deadline).await;
        let Some(strong) = target.upgrade() else {
            return;
        };

        let idle_deadline = strong.write_clock().last_write() + interval;
        let now = Instant::now();
        if idle_deadline <= now {
            strong.on_write_idle();
            deadline = now + interval;
        } else {
            deadline = idle_deadline;
        }
    }
}
