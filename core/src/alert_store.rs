//! Alert store: capped notification history, the alert panel list,
//! and the fraud-case registry behind record().
//!
//! RULES:
//!   - Both lists are newest first. Prepending past the cap evicts the
//!     oldest entry.
//!   - Every ingested envelope lands in the history, whatever its type.
//!   - Unknown ids (status updates, reviews, dismissals) are no-ops.
//!   - Nothing here sends or renders; the bus publishes the outcome.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    config::AlertConfig,
    envelope::{
        bool_field, field, now_timestamp, number_field, string_list, text_field, EnvelopeKind,
        NotificationEnvelope, Priority,
    },
    error::WatchResult,
    scoring::RiskLevel,
    store::{CaseFilter, CaseStatus, CaseStore, EntityType, FraudCase},
    types::{AlertId, CaseId, NotificationSeq},
};

const UNKNOWN_CONTRACT: &str = "UNKNOWN";
const UNKNOWN_CLIENT: &str = "Unknown client";

// ── Alert model ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertStatus {
    #[default]
    New,
    InReview,
    Closed,
}

impl AlertStatus {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "NEW" => Some(Self::New),
            "IN_REVIEW" => Some(Self::InReview),
            "CLOSED" => Some(Self::Closed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "NEW",
            Self::InReview => "IN_REVIEW",
            Self::Closed => "CLOSED",
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::New | Self::InReview)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertRecord {
    pub id: AlertId,
    pub contract_id: String,
    pub client_name: String,
    pub fraud_probability: f64,
    pub risk_level: RiskLevel,
    pub priority: Priority,
    pub alert_status: AlertStatus,
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detailed_message: Option<String>,
    #[serde(default)]
    pub suspicious_indicators: Vec<String>,
}

impl AlertRecord {
    /// Alert whose risk level and priority both derive from `probability`.
    pub fn derived(
        id: AlertId,
        contract_id: &str,
        client_name: &str,
        probability: f64,
        detailed_message: Option<String>,
    ) -> Self {
        let probability = clamp_probability(probability);
        Self {
            id,
            contract_id: contract_id.to_string(),
            client_name: client_name.to_string(),
            fraud_probability: probability,
            risk_level: RiskLevel::from_probability(probability),
            priority: Priority::from_probability(probability),
            alert_status: AlertStatus::New,
            timestamp: now_timestamp(),
            detailed_message,
            suspicious_indicators: Vec::new(),
        }
    }
}

fn clamp_probability(p: f64) -> f64 {
    if p.is_finite() { p.clamp(0.0, 1.0) } else { 0.0 }
}

// ── Notifications ────────────────────────────────────────────────────────────

/// Sound/visual cue the UI should play for a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttentionCue {
    Critical,
    High,
    Standard,
}

impl AttentionCue {
    pub fn for_priority(priority: Priority) -> Self {
        match priority {
            Priority::Critical => Self::Critical,
            Priority::High => Self::High,
            _ => Self::Standard,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredNotification {
    pub seq: NotificationSeq,
    pub envelope: NotificationEnvelope,
    pub read: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertStatistics {
    pub total: usize,
    pub critical: usize,
    pub high: usize,
    pub new_alerts: usize,
    pub avg_probability: f64,
}

/// What one ingest() did, for the bus to publish.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestOutcome {
    pub seq: NotificationSeq,
    pub kind: EnvelopeKind,
    pub alert_created: Option<AlertId>,
    pub alerts_changed: bool,
    pub auto_open: bool,
    pub cue: AttentionCue,
}

// ── Store ────────────────────────────────────────────────────────────────────

pub struct AlertStore {
    config: AlertConfig,
    notifications: Vec<StoredNotification>,
    alerts: Vec<AlertRecord>,
    cases: CaseStore,
    next_seq: NotificationSeq,
    auto_open: bool,
}

impl AlertStore {
    pub fn new(config: AlertConfig, cases: CaseStore) -> Self {
        Self {
            config,
            notifications: Vec::new(),
            alerts: Vec::new(),
            cases,
            next_seq: 1,
            auto_open: false,
        }
    }

    /// Store with an in-memory, migrated case registry.
    pub fn in_memory(config: AlertConfig) -> WatchResult<Self> {
        Ok(Self::new(config, CaseStore::open_configured(None)?))
    }

    // ── Ingest ────────────────────────────────────────────────────

    /// Classify an envelope by type, apply it, and file it in the
    /// notification history.
    pub fn ingest(&mut self, envelope: NotificationEnvelope) -> IngestOutcome {
        let kind = envelope.kind();
        let priority = envelope.priority;
        log::debug!(
            "ingest: type={} priority={} title={:?}",
            envelope.message_type,
            priority.as_str(),
            envelope.title
        );

        let mut alert_created = None;
        let mut alerts_changed = false;

        match kind {
            EnvelopeKind::FraudAlert => {
                if let Some(alert) = alert_from_fraud_alert(&envelope) {
                    if alert.priority == Priority::Critical {
                        log::warn!(
                            "CRITICAL fraud alert: id={} contract={} p={:.3}",
                            alert.id,
                            alert.contract_id,
                            alert.fraud_probability
                        );
                    }
                    alert_created = Some(alert.id.clone());
                    self.push_alert(alert);
                    alerts_changed = true;
                }
            }
            EnvelopeKind::FraudDetection => {
                if let Some(alert) = alert_from_detection(&envelope) {
                    alert_created = Some(alert.id.clone());
                    self.push_alert(alert);
                    alerts_changed = true;
                }
            }
            EnvelopeKind::AlertStatusUpdate => {
                alerts_changed = self.apply_status_update(&envelope.data);
            }
            EnvelopeKind::StatisticsUpdate => {
                log::debug!("ingest: statistics update {}", envelope.data);
            }
            EnvelopeKind::Welcome => {
                log::info!("ingest: welcome from producer: {}", envelope.message);
            }
            EnvelopeKind::Unknown => {
                log::debug!("ingest: generic notification type={}", envelope.message_type);
            }
        }

        let seq = self.push_notification(envelope);
        let auto_open = priority == Priority::Critical;
        if auto_open {
            self.auto_open = true;
        }

        IngestOutcome {
            seq,
            kind,
            alert_created,
            alerts_changed,
            auto_open,
            cue: AttentionCue::for_priority(priority),
        }
    }

    fn push_notification(&mut self, envelope: NotificationEnvelope) -> NotificationSeq {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.notifications.insert(0, StoredNotification { seq, envelope, read: false });
        self.notifications.truncate(self.config.notification_history_cap);
        seq
    }

    fn push_alert(&mut self, alert: AlertRecord) {
        // A re-filed alert replaces its earlier entry instead of duplicating it.
        self.alerts.retain(|a| a.id != alert.id);
        self.alerts.insert(0, alert);
        self.alerts.truncate(self.config.alert_panel_cap);
    }

    fn apply_status_update(&mut self, data: &Value) -> bool {
        let Some(alert_id) = text_field(data, &["alertId", "id"]) else {
            log::debug!("status update without alert id ignored");
            return false;
        };
        let Some(raw_status) = text_field(data, &["newStatus", "alertStatus"]) else {
            log::debug!("status update for {alert_id} without status ignored");
            return false;
        };
        let Some(status) = AlertStatus::parse(&raw_status) else {
            log::warn!("status update for {alert_id}: unrecognised status {raw_status:?}");
            return false;
        };
        let updated = self.set_status(&alert_id, status);
        if updated {
            log::info!("alert {alert_id} -> {}", status.as_str());
        } else {
            log::debug!("status update for unknown alert {alert_id} ignored");
        }
        updated
    }

    fn set_status(&mut self, alert_id: &str, status: AlertStatus) -> bool {
        match self.alerts.iter_mut().find(|a| a.id == alert_id) {
            Some(alert) => {
                alert.alert_status = status;
                true
            }
            None => false,
        }
    }

    // ── Cases ─────────────────────────────────────────────────────

    /// File a fraud case for an entity and surface it on the panel.
    /// `score` is a 0..=100 percentage; larger values are capped.
    pub fn record(
        &mut self,
        entity_type: EntityType,
        entity_id: &str,
        score: u32,
        reason: &str,
    ) -> WatchResult<FraudCase> {
        let case = self
            .cases
            .upsert_case(entity_type, entity_id, score, reason, Utc::now())?;

        let mut alert = AlertRecord::derived(
            format!("case-{}", case.id),
            entity_id,
            UNKNOWN_CLIENT,
            case.score as f64 / 100.0,
            Some(format!("{} {}: {}", entity_type.as_str(), entity_id, reason)),
        );
        alert.timestamp = case.detected_at.to_rfc3339();
        self.push_alert(alert);

        log::info!(
            "case filed: id={} {}={} score={} level={}",
            case.id,
            entity_type.as_str(),
            entity_id,
            case.score,
            case.risk_level.as_str()
        );
        Ok(case)
    }

    pub fn list_cases(&self, filter: &CaseFilter) -> WatchResult<Vec<FraudCase>> {
        self.cases.list_cases(filter)
    }

    pub fn get_case(&self, id: CaseId) -> WatchResult<Option<FraudCase>> {
        self.cases.get_case(id)
    }

    /// Mark a case REVIEWED. False when the id is unknown.
    pub fn mark_case_reviewed(&mut self, id: CaseId) -> WatchResult<bool> {
        self.cases.set_case_status(id, CaseStatus::Reviewed, Utc::now())
    }

    /// Mark a case DISMISSED. False when the id is unknown.
    pub fn dismiss_case(&mut self, id: CaseId) -> WatchResult<bool> {
        self.cases.set_case_status(id, CaseStatus::Dismissed, Utc::now())
    }

    // ── Mutations ─────────────────────────────────────────────────

    pub fn mark_as_read(&mut self, seq: NotificationSeq) -> bool {
        match self.notifications.iter_mut().find(|n| n.seq == seq) {
            Some(n) => {
                n.read = true;
                true
            }
            None => false,
        }
    }

    pub fn mark_all_as_read(&mut self) {
        for n in &mut self.notifications {
            n.read = true;
        }
    }

    /// Put an alert IN_REVIEW.
    pub fn start_review(&mut self, alert_id: &str) -> bool {
        self.set_status(alert_id, AlertStatus::InReview)
    }

    /// Close an alert after review.
    pub fn mark_reviewed(&mut self, alert_id: &str) -> bool {
        self.set_status(alert_id, AlertStatus::Closed)
    }

    /// Drop an alert from the panel list.
    pub fn dismiss(&mut self, alert_id: &str) -> bool {
        let before = self.alerts.len();
        self.alerts.retain(|a| a.id != alert_id);
        self.alerts.len() != before
    }

    /// Remove one notification from the history.
    pub fn remove(&mut self, seq: NotificationSeq) -> bool {
        let before = self.notifications.len();
        self.notifications.retain(|n| n.seq != seq);
        self.notifications.len() != before
    }

    pub fn clear_all(&mut self) {
        self.notifications.clear();
        self.auto_open = false;
    }

    /// The UI opened the panel; clear the auto-open signal.
    pub fn acknowledge_panel(&mut self) {
        self.auto_open = false;
    }

    // ── Queries ───────────────────────────────────────────────────

    pub fn get_alerts(&self) -> &[AlertRecord] {
        &self.alerts
    }

    pub fn get_alert(&self, alert_id: &str) -> Option<&AlertRecord> {
        self.alerts.iter().find(|a| a.id == alert_id)
    }

    pub fn get_notifications(&self) -> &[StoredNotification] {
        &self.notifications
    }

    /// CRITICAL and HIGH notifications not yet marked read.
    pub fn get_unread_count(&self) -> usize {
        self.notifications
            .iter()
            .filter(|n| !n.read && n.envelope.priority.is_urgent())
            .count()
    }

    /// CRITICAL alerts still waiting for a decision.
    pub fn get_critical_alerts(&self) -> Vec<&AlertRecord> {
        self.alerts
            .iter()
            .filter(|a| a.priority == Priority::Critical && a.alert_status.is_pending())
            .collect()
    }

    pub fn should_auto_open(&self) -> bool {
        self.auto_open
    }

    pub fn alert_statistics(&self) -> AlertStatistics {
        let total = self.alerts.len();
        let sum: f64 = self.alerts.iter().map(|a| a.fraud_probability).sum();
        AlertStatistics {
            total,
            critical: self.alerts.iter().filter(|a| a.priority == Priority::Critical).count(),
            high: self.alerts.iter().filter(|a| a.priority == Priority::High).count(),
            new_alerts: self
                .alerts
                .iter()
                .filter(|a| a.alert_status == AlertStatus::New)
                .count(),
            avg_probability: if total > 0 { sum / total as f64 } else { 0.0 },
        }
    }
}

// ── Envelope → alert ─────────────────────────────────────────────────────────

fn alert_from_fraud_alert(envelope: &NotificationEnvelope) -> Option<AlertRecord> {
    let data = &envelope.data;
    if !data.is_object() {
        log::warn!("FRAUD_ALERT without data object dropped");
        return None;
    }

    Some(AlertRecord {
        id: text_field(data, &["id", "alertId"]).unwrap_or_else(new_alert_id),
        contract_id: text_field(data, &["contractId"]).unwrap_or_else(|| UNKNOWN_CONTRACT.into()),
        client_name: text_field(data, &["clientName"]).unwrap_or_else(|| UNKNOWN_CLIENT.into()),
        fraud_probability: clamp_probability(
            number_field(data, &["fraudProbability"]).unwrap_or(0.0),
        ),
        risk_level: text_field(data, &["riskLevel"])
            .and_then(|r| serde_json::from_value(Value::String(r.to_ascii_uppercase())).ok())
            .unwrap_or(RiskLevel::Unknown),
        priority: text_field(data, &["priority"])
            .and_then(|p| Priority::parse(&p))
            .unwrap_or(Priority::Medium),
        alert_status: text_field(data, &["alertStatus", "status"])
            .and_then(|s| AlertStatus::parse(&s))
            .unwrap_or_default(),
        timestamp: text_field(data, &["timestamp"]).unwrap_or_else(|| envelope.timestamp.clone()),
        detailed_message: text_field(data, &["detailedMessage"]),
        suspicious_indicators: string_list(data, &["suspiciousIndicators", "detectedAnomalies"]),
    })
}

fn alert_from_detection(envelope: &NotificationEnvelope) -> Option<AlertRecord> {
    let data = &envelope.data;
    let prediction = field(data, &["prediction"])?;
    if !bool_field(prediction, &["isFraud"]).unwrap_or(false) {
        log::debug!("FRAUD_DETECTION below fraud threshold, no alert");
        return None;
    }

    let probability = clamp_probability(number_field(prediction, &["fraudProbability"]).unwrap_or(0.0));
    let contract_id = field(data, &["contractData"])
        .and_then(|c| text_field(c, &["contractId"]))
        .unwrap_or_else(|| UNKNOWN_CONTRACT.into());
    let client_name = field(data, &["clientData"])
        .map(|c| {
            let first = text_field(c, &["firstName"]).unwrap_or_default();
            let last = text_field(c, &["lastName"]).unwrap_or_default();
            format!("{first} {last}").trim().to_string()
        })
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| UNKNOWN_CLIENT.into());

    let mut alert = AlertRecord::derived(
        new_alert_id(),
        &contract_id,
        &client_name,
        probability,
        Some(format!(
            "Fraud detected with probability {:.1}%",
            probability * 100.0
        )),
    );
    alert.suspicious_indicators = string_list(data, &["riskFactors"]);
    if !envelope.timestamp.is_empty() {
        alert.timestamp = envelope.timestamp.clone();
    }
    Some(alert)
}

fn new_alert_id() -> AlertId {
    uuid::Uuid::new_v4().to_string()
}
