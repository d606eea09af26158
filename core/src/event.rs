//! Events the alert bus publishes to its subscribers.
//!
//! RULE: Subscribers observe the bus ONLY through these events.
//! Variants are appended, never removed or reordered.

use serde::{Deserialize, Serialize};

use crate::{
    alert_store::{AlertRecord, AttentionCue},
    connection::ConnectionState,
    envelope::{NotificationEnvelope, Priority},
    types::NotificationSeq,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BusEvent {
    // ── Connection ─────────────────────────────────
    ConnectionChanged {
        from:     ConnectionState,
        to:       ConnectionState,
        attempts: u32,
    },

    // ── Notifications ──────────────────────────────
    Notification {
        seq:      NotificationSeq,
        envelope: NotificationEnvelope,
    },
    Cue {
        seq:      NotificationSeq,
        cue:      AttentionCue,
        priority: Priority,
    },
    PanelAutoOpen {
        seq: NotificationSeq,
    },

    // ── Alerts ─────────────────────────────────────
    /// Full panel list after a change, newest first.
    AlertsUpdated {
        alerts: Vec<AlertRecord>,
    },
}

/// Stable name of a BusEvent variant, for log lines and filters.
pub fn event_name(event: &BusEvent) -> &'static str {
    match event {
        BusEvent::ConnectionChanged { .. } => "connection_changed",
        BusEvent::Notification { .. } => "notification",
        BusEvent::Cue { .. } => "cue",
        BusEvent::PanelAutoOpen { .. } => "panel_auto_open",
        BusEvent::AlertsUpdated { .. } => "alerts_updated",
    }
}
