//! Client protocol handler.
//!
//! Composes the acknowledgment tables, the keepalive driver and the
//! disconnect gate behind request/response style operations. The transport's
//! receive loop feeds inbound packets through [`ClientHandler::dispatch`] (or
//! the individual `handle_*` entry points), which may run concurrently with
//! any number of outstanding operations.
//!
//! ```ignore
//! let (sender, mut outbound) = ChannelSender::new(16);
//! let handler = Arc::new(ClientHandler::new(sender, HandlerConfig::new("sensor-1")));
//! handler.start();
//!
//! // The writer task drains `outbound`, the reader task calls `handler.dispatch(packet)`.
//! let codes = handler.subscribe(&[("sensors/#", QoS::AtLeastOnce)], 1).await?;
//! ```

use std::sync::Arc;

use mqlink_core::{
    Packet, PacketType, ProtocolError, QoS, Suback, Subscribe, Unsuback, Unsubscribe,
};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::HandlerConfig;
use crate::correlator::AckTable;
use crate::error::{ClientError, Result};
use crate::events::{EventSink, HandlerEvent};
use crate::keepalive::{self, KeepAlive, PongReceipt, WriteClock, WriteIdle};
use crate::lifecycle::DisconnectGate;
use crate::transport::PacketSender;

/// Handler lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerState {
    Created,
    Started,
    Stopping,
    Stopped,
}

/// Client side of the SUBSCRIBE, UNSUBSCRIBE, PINGREQ and DISCONNECT exchanges.
pub struct ClientHandler<S: PacketSender> {
    config: HandlerConfig,
    sender: S,
    state: Mutex<HandlerState>,
    subscriptions: AckTable<Vec<u8>>,
    unsubscriptions: AckTable<()>,
    keepalive: KeepAlive,
    disconnect: DisconnectGate,
    write_clock: WriteClock,
    /// Fire-and-forget ping spawned by a write timeout.
    ping_task: Mutex<Option<JoinHandle<()>>>,
    /// Write-idle monitor, when `keep_alive` is enabled.
    idle_task: Mutex<Option<JoinHandle<()>>>,
    events: EventSink,
}

impl<S: PacketSender> ClientHandler<S> {
    /// Create a handler that sends through `sender`.
    pub fn new(sender: S, config: HandlerConfig) -> Self {
        Self::with_sink(sender, config, EventSink::disabled())
    }

    /// Create a handler that also reports [`HandlerEvent`]s.
    ///
    /// `cap` is the event channel capacity; events beyond it are dropped.
    pub fn with_events(
        sender: S,
        config: HandlerConfig,
        cap: usize,
    ) -> (Self, mpsc::Receiver<HandlerEvent>) {
        let (events, rx) = EventSink::channel(cap);
        (Self::with_sink(sender, config, events), rx)
    }

    fn with_sink(sender: S, config: HandlerConfig, events: EventSink) -> Self {
        Self {
            config,
            sender,
            state: Mutex::new(HandlerState::Created),
            subscriptions: AckTable::new(PacketType::Suback),
            unsubscriptions: AckTable::new(PacketType::Unsuback),
            keepalive: KeepAlive::new(),
            disconnect: DisconnectGate::new(),
            write_clock: WriteClock::new(),
            ping_task: Mutex::new(None),
            idle_task: Mutex::new(None),
            events,
        }
    }

    pub fn config(&self) -> &HandlerConfig {
        &self.config
    }

    pub fn state(&self) -> HandlerState {
        *self.state.lock()
    }

    /// Begin a session.
    ///
    /// The write-idle monitor is spawned here when `keep_alive` is enabled;
    /// outside a tokio runtime it is skipped with a warning and keepalive
    /// rounds are left to explicit `handle_write_timeout` calls.
    pub fn start(self: &Arc<Self>) {
        {
            let mut state = self.state.lock();
            if *state == HandlerState::Started && !self.disconnect.is_resolved() {
                return;
            }
            *state = HandlerState::Started;
        }

        self.disconnect.arm();
        self.subscriptions.open();
        self.unsubscriptions.open();
        self.keepalive.open();
        self.write_clock.touch();

        if let Some(interval) = self.config.keep_alive_interval() {
            match tokio::runtime::Handle::try_current() {
                Ok(runtime) => {
                    let monitor =
                        runtime.spawn(keepalive::watch_write_idle(Arc::downgrade(self), interval));
                    if let Some(previous) = self.idle_task.lock().replace(monitor) {
                        previous.abort();
                    }
                }
                Err(_) => log::warn!(
                    "[{}] No tokio runtime, write-idle monitor not started",
                    self.config.client_id
                ),
            }
        }

        log::info!("[{}] Client handler started", self.config.client_id);
    }

    /// End the session.
    ///
    /// Every request still waiting for a response fails with
    /// `ConnectionClosed`, and `wait_disconnect` callers are released.
    pub fn stop(&self) {
        {
            let mut state = self.state.lock();
            match *state {
                HandlerState::Stopping | HandlerState::Stopped => return,
                HandlerState::Created | HandlerState::Started => *state = HandlerState::Stopping,
            }
        }

        let aborted_ping = abort_task(&self.ping_task);
        abort_task(&self.idle_task);
        let cancelled = self.cancel_pending();
        self.disconnect.resolve();

        *self.state.lock() = HandlerState::Stopped;
        log::info!(
            "[{}] Client handler stopped ({} pending requests cancelled{})",
            self.config.client_id,
            cancelled,
            if aborted_ping { ", keepalive aborted" } else { "" }
        );
    }

    /// Subscribe to `topics` and return the broker's return code per filter.
    pub async fn subscribe(&self, topics: &[(&str, QoS)], packet_id: u16) -> Result<Vec<u8>> {
        if topics.is_empty() {
            return Err(ClientError::InvalidArgument(
                "SUBSCRIBE requires at least one topic filter".to_string(),
            ));
        }
        self.ensure_started()?;

        let pending = self.subscriptions.register(packet_id)?;
        // stop() must release a caller still stuck in the transport.
        let outcome = tokio::select! {
            sent = self.send_packet(Packet::Subscribe(Subscribe::new(packet_id, topics))) => {
                sent?;
                pending.wait().await
            }
            outcome = pending.wait() => outcome,
        };

        let return_codes = outcome.into_result()?;
        if return_codes.len() != topics.len() {
            return Err(ClientError::Protocol(ProtocolError::MalformedPacket(format!(
                "SUBACK {} carried {} return codes for {} topic filters",
                packet_id,
                return_codes.len(),
                topics.len()
            ))));
        }
        Ok(return_codes)
    }

    /// Unsubscribe from `topics`.
    pub async fn unsubscribe(&self, topics: &[&str], packet_id: u16) -> Result<()> {
        if topics.is_empty() {
            return Err(ClientError::InvalidArgument(
                "UNSUBSCRIBE requires at least one topic filter".to_string(),
            ));
        }
        self.ensure_started()?;

        let pending = self.unsubscriptions.register(packet_id)?;
        let outcome = tokio::select! {
            sent = self.send_packet(Packet::Unsubscribe(Unsubscribe::new(packet_id, topics))) => {
                sent?;
                pending.wait().await
            }
            outcome = pending.wait() => outcome,
        };

        outcome.into_result()
    }

    /// Send DISCONNECT.
    ///
    /// The session itself ends when the transport reports the close or
    /// `stop` is called.
    pub async fn disconnect(&self) -> Result<()> {
        self.ensure_started()?;
        self.send_packet(Packet::Disconnect).await
    }

    /// Run one keepalive round.
    ///
    /// A caller arriving while a round is in flight joins it instead of
    /// sending another PINGREQ, and resolves with the same pong. No response
    /// deadline is applied here; wrap the call in `tokio::time::timeout` for one.
    pub async fn ping(&self) -> Result<PongReceipt> {
        self.ensure_started()?;

        let ticket = self.keepalive.begin()?;
        if !ticket.is_initiator() {
            return ticket.wait().await.into_result();
        }

        let outcome = tokio::select! {
            sent = self.send_packet(Packet::Pingreq) => match sent {
                Ok(()) => {
                    self.keepalive.mark_sent(&ticket);
                    ticket.wait().await
                }
                Err(e) => {
                    self.keepalive.abandon(&ticket);
                    return Err(e);
                }
            },
            outcome = ticket.wait() => outcome,
        };
        outcome.into_result()
    }

    /// Suspend until the session ends.
    pub async fn wait_disconnect(&self) -> Result<()> {
        self.disconnect.wait().await
    }

    /// Route an inbound packet to its handler.
    pub fn dispatch(&self, packet: Packet) {
        match packet {
            Packet::Suback(suback) => self.handle_suback(suback),
            Packet::Unsuback(unsuback) => self.handle_unsuback(unsuback),
            Packet::Pingresp => self.handle_pingresp(),
            other => log::debug!(
                "[{}] Ignoring unexpected inbound {} (id {:?})",
                self.config.client_id,
                other.packet_type(),
                other.packet_id()
            ),
        }
    }

    pub fn handle_suback(&self, suback: Suback) {
        let packet_id = suback.packet_id;
        if let Err(e) = suback.validate() {
            let reason = e.to_string();
            if self.subscriptions.fail(packet_id, e) {
                log::warn!(
                    "[{}] Rejecting SUBACK {}: {}",
                    self.config.client_id,
                    packet_id,
                    reason
                );
            } else {
                self.stale_response(PacketType::Suback, Some(packet_id));
            }
            return;
        }

        if self
            .subscriptions
            .resolve(packet_id, suback.return_codes.clone())
        {
            self.events.emit(HandlerEvent::SubAck {
                packet_id,
                return_codes: suback.return_codes,
            });
        } else {
            self.stale_response(PacketType::Suback, Some(packet_id));
        }
    }

    pub fn handle_unsuback(&self, unsuback: Unsuback) {
        let packet_id = unsuback.packet_id;
        if self.unsubscriptions.resolve(packet_id, ()) {
            self.events.emit(HandlerEvent::UnsubAck { packet_id });
        } else {
            self.stale_response(PacketType::Unsuback, Some(packet_id));
        }
    }

    pub fn handle_pingresp(&self) {
        match self.keepalive.deliver() {
            Some(receipt) => {
                log::debug!(
                    "[{}] PINGRESP after {:?}",
                    self.config.client_id,
                    receipt.round_trip
                );
                self.events.emit(HandlerEvent::PingResp {
                    round_trip: receipt.round_trip,
                });
            }
            None => {
                log::debug!(
                    "[{}] Discarding PINGRESP with no sent PINGREQ awaiting it",
                    self.config.client_id
                );
                self.events.emit(HandlerEvent::StaleResponse {
                    packet_type: PacketType::Pingresp,
                    packet_id: None,
                });
            }
        }
    }

    /// The transport saw the broker close the connection.
    pub fn handle_connection_closed(&self) {
        log::debug!("[{}] Broker closed connection", self.config.client_id);
        if self.disconnect.resolve() {
            let cancelled = self.cancel_pending();
            if cancelled > 0 {
                log::warn!(
                    "[{}] Connection lost with {} requests pending",
                    self.config.client_id,
                    cancelled
                );
            }
            self.events.emit(HandlerEvent::ConnectionClosed);
        }
    }

    /// The transport has not written anything for the keep-alive interval.
    ///
    /// Starts a keepalive round in the background and returns immediately.
    pub fn handle_write_timeout(self: &Arc<Self>) {
        if self.ensure_started().is_err() {
            return;
        }

        let mut slot = self.ping_task.lock();
        if slot.as_ref().is_some_and(|task| !task.is_finished()) {
            log::debug!("[{}] Keepalive round already in flight", self.config.client_id);
            return;
        }

        let handler = Arc::clone(self);
        *slot = Some(tokio::spawn(async move {
            if let Err(e) = handler.ping().await {
                log::warn!("[{}] Keepalive ping failed: {}", handler.config.client_id, e);
            }
        }));
    }

    /// Reads going idle need no keepalive round.
    pub fn handle_read_timeout(&self) {}

    pub fn pending_subscriptions(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn pending_unsubscriptions(&self) -> usize {
        self.unsubscriptions.len()
    }

    pub fn is_subscription_pending(&self, packet_id: u16) -> bool {
        self.subscriptions.contains(packet_id)
    }

    pub fn is_unsubscription_pending(&self, packet_id: u16) -> bool {
        self.unsubscriptions.contains(packet_id)
    }

    pub fn is_ping_in_flight(&self) -> bool {
        self.keepalive.in_flight()
    }

    fn ensure_started(&self) -> Result<()> {
        match self.state() {
            HandlerState::Created => Err(ClientError::NotStarted),
            HandlerState::Stopping | HandlerState::Stopped => Err(ClientError::ConnectionClosed),
            HandlerState::Started if self.disconnect.is_resolved() => {
                Err(ClientError::ConnectionClosed)
            }
            HandlerState::Started => Ok(()),
        }
    }

    async fn send_packet(&self, packet: Packet) -> Result<()> {
        let packet_type = packet.packet_type();
        self.sender.send_packet(packet).await?;
        self.write_clock.touch();
        self.events.emit(HandlerEvent::PacketSent { packet_type });
        Ok(())
    }

    /// Close both tables and the ping round, cancelling whatever waits on them.
    fn cancel_pending(&self) -> usize {
        let mut cancelled = self.subscriptions.close() + self.unsubscriptions.close();
        if self.keepalive.close() {
            cancelled += 1;
        }
        cancelled
    }

    fn stale_response(&self, packet_type: PacketType, packet_id: Option<u16>) {
        log::warn!(
            "[{}] Received {} for unknown pending request with id {:?}",
            self.config.client_id,
            packet_type,
            packet_id
        );
        self.events.emit(HandlerEvent::StaleResponse {
            packet_type,
            packet_id,
        });
    }
}

impl<S: PacketSender> WriteIdle for ClientHandler<S> {
    fn write_clock(&self) -> &WriteClock {
        &self.write_clock
    }

    fn on_write_idle(self: Arc<Self>) {
        log::debug!("[{}] Write idle, starting keepalive round", self.config.client_id);
        self.handle_write_timeout();
    }
}

/// Abort a background task unless it already ran to completion.
fn abort_task(slot: &Mutex<Option<JoinHandle<()>>>) -> bool {
    match slot.lock().take() {
        Some(task) if !task.is_finished() => {
            task.abort();
            true
        }
        _ => false,
    }
}
