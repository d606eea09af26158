//! Wire envelope for the live notification channel.
//!
//! Inbound payloads are UTF-8 JSON objects:
//!   {type, title, message, data?, timestamp, priority, actionUrl?}
//! Only `type` is required; everything else defaults so that a sparse
//! producer still gets through. Payloads that are not JSON objects
//! with a string `type` are rejected by parse().

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::{
    alert_store::{AlertRecord, AlertStatus},
    error::WatchResult,
    scoring::{ContractFinancialProfile, FraudAssessment},
};

// ── Priority ─────────────────────────────────────────────────────────────────

/// Display priority. Unknown wire values (e.g. "INFO") read as LOW.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    Critical,
    High,
    Medium,
    #[default]
    #[serde(other)]
    Low,
}

impl Priority {
    /// Alert priority band: CRITICAL >= 0.9, HIGH >= 0.75, MEDIUM >= 0.5.
    pub fn from_probability(p: f64) -> Self {
        if p >= 0.9 {
            Self::Critical
        } else if p >= 0.75 {
            Self::High
        } else if p >= 0.5 {
            Self::Medium
        } else {
            Self::Low
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "CRITICAL" => Some(Self::Critical),
            "HIGH" => Some(Self::High),
            "MEDIUM" => Some(Self::Medium),
            "LOW" => Some(Self::Low),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "CRITICAL",
            Self::High => "HIGH",
            Self::Medium => "MEDIUM",
            Self::Low => "LOW",
        }
    }

    /// CRITICAL and HIGH notifications count towards the unread badge.
    pub fn is_urgent(&self) -> bool {
        matches!(self, Self::Critical | Self::High)
    }
}

// ── Kind ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EnvelopeKind {
    FraudAlert,
    FraudDetection,
    AlertStatusUpdate,
    StatisticsUpdate,
    Welcome,
    Unknown,
}

impl EnvelopeKind {
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "FRAUD_ALERT" => Self::FraudAlert,
            "FRAUD_DETECTION" => Self::FraudDetection,
            "ALERT_STATUS_UPDATE" => Self::AlertStatusUpdate,
            "STATISTICS_UPDATE" => Self::StatisticsUpdate,
            "WELCOME" => Self::Welcome,
            _ => Self::Unknown,
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            Self::FraudAlert => "FRAUD_ALERT",
            Self::FraudDetection => "FRAUD_DETECTION",
            Self::AlertStatusUpdate => "ALERT_STATUS_UPDATE",
            Self::StatisticsUpdate => "STATISTICS_UPDATE",
            Self::Welcome => "WELCOME",
            Self::Unknown => "UNKNOWN",
        }
    }
}

// ── Envelope ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationEnvelope {
    #[serde(rename = "type")]
    pub message_type: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub data: Value,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default, deserialize_with = "lenient_priority")]
    pub priority: Priority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_url: Option<String>,
}

impl NotificationEnvelope {
    pub fn parse(raw: &str) -> WatchResult<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn kind(&self) -> EnvelopeKind {
        EnvelopeKind::from_tag(&self.message_type)
    }

    pub fn new(kind: EnvelopeKind, title: &str, message: &str, priority: Priority) -> Self {
        Self {
            message_type: kind.tag().to_string(),
            title: title.to_string(),
            message: message.to_string(),
            data: Value::Null,
            timestamp: now_timestamp(),
            priority,
            action_url: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    pub fn with_action_url(mut self, url: impl Into<String>) -> Self {
        self.action_url = Some(url.into());
        self
    }

    /// FRAUD_DETECTION envelope carrying a local assessment, in the same
    /// shape a remote detector publishes.
    pub fn fraud_detection(
        profile: &ContractFinancialProfile,
        assessment: &FraudAssessment,
        client_name: Option<&str>,
    ) -> Self {
        let probability = assessment.fraud_probability();
        let (first_name, last_name) = split_name(client_name.unwrap_or_default());
        let message = format!(
            "Contract {} scored {:.1}% fraud probability",
            display_contract(&profile.contract_id),
            probability * 100.0
        );
        Self::new(
            EnvelopeKind::FraudDetection,
            "Fraud detection",
            &message,
            Priority::from_probability(probability),
        )
        .with_data(json!({
            "prediction": assessment.prediction,
            "reason": assessment.reason,
            "confidence": assessment.confidence,
            "riskFactors": assessment.risk_factors,
            "recommendation": assessment.recommendation,
            "contractData": { "contractId": profile.contract_id },
            "clientData": { "firstName": first_name, "lastName": last_name },
        }))
    }

    /// FRAUD_ALERT envelope announcing an alert record.
    pub fn fraud_alert(alert: &AlertRecord) -> Self {
        let message = format!(
            "Fraud detected - contract {}, probability {:.1}%",
            alert.contract_id,
            alert.fraud_probability * 100.0
        );
        Self::new(
            EnvelopeKind::FraudAlert,
            &format!("Fraud alert [{}]", alert.priority.as_str()),
            &message,
            alert.priority,
        )
        .with_action_url(format!("/fraud/alerts/{}", alert.id))
        .with_data(json!({
            "alertId": alert.id,
            "contractId": alert.contract_id,
            "clientName": alert.client_name,
            "fraudProbability": alert.fraud_probability,
            "riskLevel": alert.risk_level,
            "priority": alert.priority,
            "alertStatus": alert.alert_status,
            "timestamp": alert.timestamp,
            "detailedMessage": alert.detailed_message,
            "suspiciousIndicators": alert.suspicious_indicators,
        }))
    }

    /// ALERT_STATUS_UPDATE envelope for an alert id.
    pub fn status_update(alert_id: &str, status: AlertStatus) -> Self {
        Self::new(
            EnvelopeKind::AlertStatusUpdate,
            "Alert updated",
            &format!("Alert {alert_id} updated - new status: {}", status.as_str()),
            Priority::Low,
        )
        .with_action_url(format!("/fraud/alerts/{alert_id}"))
        .with_data(json!({ "alertId": alert_id, "newStatus": status }))
    }
}

fn lenient_priority<'de, D>(deserializer: D) -> Result<Priority, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value
        .as_str()
        .and_then(Priority::parse)
        .unwrap_or_default())
}

pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn display_contract(contract_id: &str) -> &str {
    if contract_id.is_empty() { "UNKNOWN" } else { contract_id }
}

fn split_name(full: &str) -> (&str, &str) {
    let full = full.trim();
    match full.split_once(' ') {
        Some((first, last)) => (first, last.trim()),
        None => (full, ""),
    }
}

// ── Payload field access ─────────────────────────────────────────────────────
//
// Producers disagree on key names (`id` vs `alertId`, `newStatus` vs
// `alertStatus`), so payload reads take a list of candidate keys and
// use the first one that is present and non-null.

pub(crate) fn field<'a>(data: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|k| data.get(*k))
        .find(|v| !v.is_null())
}

pub(crate) fn text_field(data: &Value, keys: &[&str]) -> Option<String> {
    match field(data, keys)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub(crate) fn number_field(data: &Value, keys: &[&str]) -> Option<f64> {
    match field(data, keys)? {
        Value::Number(n) => n.as_f64().filter(|f| f.is_finite()),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    }
}

pub(crate) fn bool_field(data: &Value, keys: &[&str]) -> Option<bool> {
    match field(data, keys)? {
        Value::Bool(b) => Some(*b),
        Value::String(s) => s.trim().parse::<bool>().ok(),
        _ => None,
    }
}

pub(crate) fn string_list(data: &Value, keys: &[&str]) -> Vec<String> {
    match field(data, keys) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| match v {
                Value::String(s) => Some(s.clone()),
                Value::Null => None,
                other => Some(other.to_string()),
            })
            .collect(),
        _ => Vec::new(),
    }
}
