//! Connection manager: owns the one live channel to the detection
//! feed and its connect / backoff / reconnect state machine.
//!
//!   Disconnected --connect--> Connecting --open--> Connected
//!   Connected --unexpected close--> Reconnecting --timer--> Connecting
//!   Connecting --open failed--> Reconnecting (attempts < max)
//!                            \-> Exhausted    (attempts == max)
//!   Exhausted --reconnect--> Connecting (attempts reset to 0)
//!   any --disconnect--> Disconnected (terminal, timer cancelled)
//!
//! RULES:
//!   - `attempts` counts consecutive failed opens since the last
//!     successful one. Backoff is a constant interval.
//!   - Time is passed in (`now`), never read here, so the machine can
//!     be driven step by step.
//!   - Inbound payloads that do not parse as an envelope are logged and
//!     dropped. They never change the connection state.

use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::{
    config::ConnectionConfig,
    envelope::NotificationEnvelope,
    error::{WatchError, WatchResult},
};

/// Upper bound on frames drained per poll, so a chatty producer
/// cannot starve the caller's loop.
const MAX_FRAMES_PER_POLL: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Exhausted,
}

// ── Transport seam ───────────────────────────────────────────────────────────

/// Result of one non-blocking read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportPoll {
    Message(String),
    Idle,
    Closed,
}

/// An open duplex channel.
pub trait Transport: Send {
    fn send_text(&mut self, payload: &str) -> WatchResult<()>;

    /// Next inbound text frame. Must return `Idle` rather than block
    /// indefinitely. An `Err` is treated as a dropped connection.
    fn poll_message(&mut self) -> WatchResult<TransportPoll>;

    fn close(&mut self);
}

/// Opens transports to an endpoint.
pub trait Connector: Send {
    fn open(&mut self, url: &str) -> WatchResult<Box<dyn Transport>>;
}

/// Output of the manager, drained with `take_events()`.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    StateChanged {
        from: ConnectionState,
        to: ConnectionState,
    },
    Message(NotificationEnvelope),
}

// ── Manager ──────────────────────────────────────────────────────────────────

pub struct ConnectionManager {
    config: ConnectionConfig,
    connector: Box<dyn Connector>,
    transport: Option<Box<dyn Transport>>,
    state: ConnectionState,
    attempts: u32,
    retry_at: Option<Instant>,
    outbox: Vec<ConnectionEvent>,
    dropped_payloads: u64,
}

impl ConnectionManager {
    pub fn new(config: ConnectionConfig, connector: Box<dyn Connector>) -> Self {
        Self {
            config,
            connector,
            transport: None,
            state: ConnectionState::Disconnected,
            attempts: 0,
            retry_at: None,
            outbox: Vec::new(),
            dropped_payloads: 0,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// When the pending retry fires, if one is scheduled.
    pub fn next_retry_at(&self) -> Option<Instant> {
        self.retry_at
    }

    /// Inbound payloads discarded because they did not parse.
    pub fn dropped_payloads(&self) -> u64 {
        self.dropped_payloads
    }

    pub fn take_events(&mut self) -> Vec<ConnectionEvent> {
        std::mem::take(&mut self.outbox)
    }

    // ── Operations ────────────────────────────────────────────────

    /// Open the channel. No-op unless Disconnected; an Exhausted
    /// manager needs an explicit reconnect().
    pub fn connect(&mut self, now: Instant) {
        match self.state {
            ConnectionState::Disconnected => {
                self.attempts = 0;
                self.try_open(now);
            }
            ConnectionState::Exhausted => {
                log::warn!("connect ignored: retries exhausted, call reconnect()");
            }
            _ => log::debug!("connect ignored in state={:?}", self.state),
        }
    }

    /// Deliberate close. Cancels any pending retry and suppresses
    /// automatic reconnection. Idempotent.
    pub fn disconnect(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            transport.close();
        }
        self.retry_at = None;
        self.attempts = 0;
        self.set_state(ConnectionState::Disconnected);
    }

    /// Manual reconnect from any state: drop the current channel, reset
    /// the attempt counter, and open again immediately.
    pub fn reconnect(&mut self, now: Instant) {
        log::info!("manual reconnect requested (state={:?})", self.state);
        if let Some(mut transport) = self.transport.take() {
            transport.close();
        }
        self.retry_at = None;
        self.attempts = 0;
        self.try_open(now);
    }

    pub fn send(&mut self, payload: &str) -> WatchResult<()> {
        match (self.state, self.transport.as_mut()) {
            (ConnectionState::Connected, Some(transport)) => {
                transport.send_text(payload)?;
                log::debug!("sent {} bytes", payload.len());
                Ok(())
            }
            _ => {
                log::warn!("send while {:?}, payload not delivered", self.state);
                Err(WatchError::NotConnected)
            }
        }
    }

    /// Advance the machine: fire a due retry, or drain inbound frames.
    pub fn poll(&mut self, now: Instant) {
        match self.state {
            ConnectionState::Reconnecting => {
                if self.retry_at.is_some_and(|at| now >= at) {
                    self.retry_at = None;
                    log::info!(
                        "reconnect attempt {}/{}",
                        self.attempts + 1,
                        self.config.max_reconnect_attempts
                    );
                    self.try_open(now);
                }
            }
            ConnectionState::Connected => self.drain_inbound(now),
            _ => {}
        }
    }

    // ── Internals ─────────────────────────────────────────────────

    fn try_open(&mut self, now: Instant) {
        self.set_state(ConnectionState::Connecting);
        let url = self.config.url();
        match self.connector.open(&url) {
            Ok(transport) => {
                self.transport = Some(transport);
                self.attempts = 0;
                self.retry_at = None;
                self.set_state(ConnectionState::Connected);
                self.send_handshake(now);
            }
            Err(err) => {
                log::warn!("open {url} failed: {err}");
                self.on_open_failed(now);
            }
        }
    }

    fn send_handshake(&mut self, now: Instant) {
        let handshake = self.config.handshake.clone();
        let result = match self.transport.as_mut() {
            Some(transport) => transport.send_text(&handshake),
            None => Err(WatchError::NotConnected),
        };
        if let Err(err) = result {
            log::warn!("handshake failed: {err}");
            self.on_connection_lost(now);
        }
    }

    fn on_open_failed(&mut self, now: Instant) {
        self.attempts += 1;
        if self.attempts >= self.config.max_reconnect_attempts {
            self.retry_at = None;
            log::error!(
                "giving up after {} consecutive failed attempts",
                self.attempts
            );
            self.set_state(ConnectionState::Exhausted);
        } else {
            self.schedule_retry(now);
        }
    }

    fn on_connection_lost(&mut self, now: Instant) {
        if let Some(mut transport) = self.transport.take() {
            transport.close();
        }
        log::warn!("connection lost");
        self.schedule_retry(now);
    }

    fn schedule_retry(&mut self, now: Instant) {
        let interval = self.config.reconnect_interval();
        self.retry_at = Some(now + interval);
        log::info!(
            "retry scheduled in {}ms (failed attempts={})",
            interval.as_millis(),
            self.attempts
        );
        self.set_state(ConnectionState::Reconnecting);
    }

    fn drain_inbound(&mut self, now: Instant) {
        for _ in 0..MAX_FRAMES_PER_POLL {
            let polled = match self.transport.as_mut() {
                Some(transport) => transport.poll_message(),
                None => Ok(TransportPoll::Closed),
            };
            match polled {
                Ok(TransportPoll::Message(raw)) => self.accept_payload(&raw),
                Ok(TransportPoll::Idle) => return,
                Ok(TransportPoll::Closed) => {
                    self.on_connection_lost(now);
                    return;
                }
                Err(err) => {
                    log::warn!("read failed: {err}");
                    self.on_connection_lost(now);
                    return;
                }
            }
        }
    }

    fn accept_payload(&mut self, raw: &str) {
        match NotificationEnvelope::parse(raw) {
            Ok(envelope) => self.outbox.push(ConnectionEvent::Message(envelope)),
            Err(err) => {
                self.dropped_payloads += 1;
                log::warn!("dropping malformed payload ({err}): {:.120}", raw);
            }
        }
    }

    fn set_state(&mut self, to: ConnectionState) {
        let from = self.state;
        if from == to {
            return;
        }
        self.state = to;
        log::info!("connection: {from:?} -> {to:?}");
        self.outbox.push(ConnectionEvent::StateChanged { from, to });
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            transport.close();
        }
    }
}
