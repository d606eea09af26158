//! The alert bus: composition root of the monitor.
//!
//! PIPELINE (fixed order, every step):
//!   1. ConnectionManager polls: due retries fire, inbound frames drain
//!   2. Connection state changes are published
//!   3. Each inbound envelope is ingested by the AlertStore
//!   4. Ingest outcomes are published (notification, cue, alerts, panel)
//!
//! RULES:
//!   - The bus is the only owner of the scorer, the connection and the
//!     store. Nothing else mutates them.
//!   - Remote and locally scored fraud take the same path: both become
//!     an envelope that is ingested.
//!   - Subscribers receive events in the order they were produced.
//!     A subscriber whose receiver was dropped is pruned on next publish.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::Instant;

use crate::{
    alert_store::{AlertStore, IngestOutcome},
    config::WatchConfig,
    connection::{ConnectionEvent, ConnectionManager, ConnectionState, Connector},
    envelope::NotificationEnvelope,
    error::WatchResult,
    event::{event_name, BusEvent},
    rng::ScoreRng,
    scoring::{ContractFinancialProfile, FraudAssessment, ScoringEngine},
    store::{CaseStore, EntityType, FraudCase},
    types::SubscriptionId,
    ws_transport::WsConnector,
};

/// A live subscription: its id (for unsubscribe) and event receiver.
pub struct Subscription {
    pub id:     SubscriptionId,
    pub events: Receiver<BusEvent>,
}

pub struct AlertBus {
    config:          WatchConfig,
    scoring:         ScoringEngine,
    connection:      ConnectionManager,
    store:           AlertStore,
    subscribers:     Vec<(SubscriptionId, Sender<BusEvent>)>,
    next_subscriber: SubscriptionId,
}

impl AlertBus {
    pub fn new(
        config: WatchConfig,
        rng: ScoreRng,
        connector: Box<dyn Connector>,
        cases: CaseStore,
    ) -> Self {
        Self {
            scoring:         ScoringEngine::new(config.scoring.clone(), rng),
            connection:      ConnectionManager::new(config.connection.clone(), connector),
            store:           AlertStore::new(config.alerts.clone(), cases),
            subscribers:     Vec::new(),
            next_subscriber: 1,
            config,
        }
    }

    /// Fully wired bus: websocket transport, entropy-seeded scorer, and
    /// the configured case store.
    /// Call this instead of new() outside of tests.
    pub fn build(config: WatchConfig) -> WatchResult<Self> {
        let cases = CaseStore::open_configured(config.alerts.case_store_path.as_deref())?;
        let connector = Box::new(WsConnector::new(
            config.connection.read_timeout(),
            config.connection.handshake_timeout(),
        ));
        Ok(Self::new(config, ScoreRng::from_entropy(), connector, cases))
    }

    // ── Subscribers ───────────────────────────────────────────────

    pub fn subscribe(&mut self) -> Subscription {
        let id = self.next_subscriber;
        self.next_subscriber += 1;
        let (tx, rx) = mpsc::channel();
        self.subscribers.push((id, tx));
        log::debug!("subscriber {id} attached ({} total)", self.subscribers.len());
        Subscription { id, events: rx }
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sid, _)| *sid != id);
        before != self.subscribers.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    // ── Lifecycle ─────────────────────────────────────────────────

    pub fn start(&mut self, now: Instant) {
        log::info!("alert bus starting: {}", self.config.connection.url());
        self.connection.connect(now);
        self.pump_connection();
    }

    /// Idempotent.
    pub fn stop(&mut self) {
        self.connection.disconnect();
        self.pump_connection();
    }

    pub fn reconnect(&mut self, now: Instant) {
        self.connection.reconnect(now);
        self.pump_connection();
    }

    /// Advance one step. Returns the number of envelopes ingested.
    pub fn step(&mut self, now: Instant) -> usize {
        self.connection.poll(now);
        self.pump_connection()
    }

    /// Drive step() every poll interval until `stop` is set, then
    /// disconnect.
    pub fn run(&mut self, stop: &AtomicBool) -> WatchResult<()> {
        self.start(Instant::now());
        let interval = self.config.connection.poll_interval();
        while !stop.load(Ordering::Relaxed) {
            self.step(Instant::now());
            thread::sleep(interval);
        }
        self.stop();
        log::info!("alert bus stopped");
        Ok(())
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn send(&mut self, payload: &str) -> WatchResult<()> {
        self.connection.send(payload)
    }

    // ── Scoring ───────────────────────────────────────────────────

    /// Score a profile. A fraud-positive result is ingested as a local
    /// FRAUD_DETECTION envelope, exactly as if a remote detector sent it.
    pub fn evaluate(
        &mut self,
        profile: &ContractFinancialProfile,
        client_name: Option<&str>,
    ) -> FraudAssessment {
        let assessment = self.scoring.evaluate(profile);
        if assessment.is_fraud() {
            let envelope = NotificationEnvelope::fraud_detection(profile, &assessment, client_name);
            self.deliver(envelope);
        }
        assessment
    }

    pub fn scoring(&self) -> &ScoringEngine {
        &self.scoring
    }

    // ── Store passthroughs ────────────────────────────────────────

    /// Feed an envelope in directly, bypassing the transport.
    pub fn deliver(&mut self, envelope: NotificationEnvelope) -> IngestOutcome {
        let notification = envelope.clone();
        let outcome = self.store.ingest(envelope);
        self.publish_outcome(&outcome, notification);
        outcome
    }

    pub fn record(
        &mut self,
        entity_type: EntityType,
        entity_id: &str,
        score: u32,
        reason: &str,
    ) -> WatchResult<FraudCase> {
        let case = self.store.record(entity_type, entity_id, score, reason)?;
        self.publish_alerts();
        Ok(case)
    }

    pub fn start_review(&mut self, alert_id: &str) -> bool {
        let changed = self.store.start_review(alert_id);
        if changed {
            self.publish_alerts();
        }
        changed
    }

    pub fn mark_reviewed(&mut self, alert_id: &str) -> bool {
        let changed = self.store.mark_reviewed(alert_id);
        if changed {
            self.publish_alerts();
        }
        changed
    }

    pub fn dismiss(&mut self, alert_id: &str) -> bool {
        let changed = self.store.dismiss(alert_id);
        if changed {
            self.publish_alerts();
        }
        changed
    }

    pub fn store(&self) -> &AlertStore {
        &self.store
    }

    /// Mutations made here are not published.
    pub fn store_mut(&mut self) -> &mut AlertStore {
        &mut self.store
    }

    // ── Internals ─────────────────────────────────────────────────

    fn pump_connection(&mut self) -> usize {
        let mut ingested = 0;
        for event in self.connection.take_events() {
            match event {
                ConnectionEvent::StateChanged { from, to } => {
                    let attempts = self.connection.attempts();
                    self.publish(BusEvent::ConnectionChanged { from, to, attempts });
                }
                ConnectionEvent::Message(envelope) => {
                    self.deliver(envelope);
                    ingested += 1;
                }
            }
        }
        ingested
    }

    fn publish_outcome(&mut self, outcome: &IngestOutcome, envelope: NotificationEnvelope) {
        let priority = envelope.priority;
        self.publish(BusEvent::Notification { seq: outcome.seq, envelope });
        self.publish(BusEvent::Cue { seq: outcome.seq, cue: outcome.cue, priority });
        if outcome.alerts_changed {
            self.publish_alerts();
        }
        if outcome.auto_open {
            self.publish(BusEvent::PanelAutoOpen { seq: outcome.seq });
        }
    }

    fn publish_alerts(&mut self) {
        let alerts = self.store.get_alerts().to_vec();
        self.publish(BusEvent::AlertsUpdated { alerts });
    }

    fn publish(&mut self, event: BusEvent) {
        log::debug!("publish {} to {} subscriber(s)", event_name(&event), self.subscribers.len());
        self.subscribers.retain(|(id, tx)| {
            let alive = tx.send(event.clone()).is_ok();
            if !alive {
                log::debug!("subscriber {id} gone, pruned");
            }
            alive
        });
    }
}
