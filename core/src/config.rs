use chrono::Datelike;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{WatchError, WatchResult};

// ── Scoring ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// `is_fraud` is true strictly above this probability.
    pub fraud_threshold: f64,
    /// Half-width of the uniform noise added to the clamped score.
    pub jitter_amplitude: f64,
    /// Lower bound of the reported confidence; the upper bound is 1.0.
    pub confidence_floor: f64,
    pub reference_year: i32,
    pub assumed_model_year: i32,
    pub suspicious_id_patterns: Vec<String>,
    pub periodic_heuristic: bool,
    pub pattern_heuristic: bool,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            fraud_threshold: 0.45,
            jitter_amplitude: 0.05,
            confidence_floor: 0.82,
            reference_year: chrono::Utc::now().year(),
            assumed_model_year: 2010,
            suspicious_id_patterns: ["000001", "000003", "000005", "000007", "000009"]
                .iter()
                .map(|p| p.to_string())
                .collect(),
            periodic_heuristic: true,
            pattern_heuristic: true,
        }
    }
}

impl ScoringConfig {
    pub fn vehicle_age(&self) -> i32 {
        self.reference_year - self.assumed_model_year
    }
}

// ── Connection ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    pub endpoint: String,
    pub user_id: Option<String>,
    pub reconnect_interval_ms: u64,
    pub max_reconnect_attempts: u32,
    pub handshake: String,
    pub read_timeout_ms: u64,
    /// Bound on the TCP connect plus the websocket upgrade.
    pub handshake_timeout_ms: u64,
    pub poll_interval_ms: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            endpoint: "ws://localhost:9099/ws/notifications".into(),
            user_id: None,
            reconnect_interval_ms: 3_000,
            max_reconnect_attempts: 5,
            handshake: "subscribe".into(),
            read_timeout_ms: 50,
            handshake_timeout_ms: 5_000,
            poll_interval_ms: 100,
        }
    }
}

impl ConnectionConfig {
    /// Endpoint with the optional `userId` query parameter appended.
    pub fn url(&self) -> String {
        match &self.user_id {
            Some(user) if self.endpoint.contains('?') => {
                format!("{}&userId={user}", self.endpoint)
            }
            Some(user) => format!("{}?userId={user}", self.endpoint),
            None => self.endpoint.clone(),
        }
    }

    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms.max(1))
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms.max(1))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

// ── Alerts ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    pub notification_history_cap: usize,
    pub alert_panel_cap: usize,
    /// SQLite file for fraud cases. `None` keeps them in memory.
    pub case_store_path: Option<String>,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            notification_history_cap: 100,
            alert_panel_cap: 10,
            case_store_path: None,
        }
    }
}

// ── Root ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    pub scoring: ScoringConfig,
    pub connection: ConnectionConfig,
    pub alerts: AlertConfig,
}

impl WatchConfig {
    /// Load a JSON config file. Omitted sections and fields keep
    /// their defaults.
    pub fn load(path: &str) -> WatchResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: WatchConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        log::info!("config loaded from {path}");
        Ok(config)
    }

    pub fn validate(&self) -> WatchResult<()> {
        let s = &self.scoring;
        if !(0.0..=1.0).contains(&s.fraud_threshold) {
            return Err(WatchError::Config(format!(
                "fraud_threshold must lie in [0, 1], got {}",
                s.fraud_threshold
            )));
        }
        if !(0.0..=1.0).contains(&s.confidence_floor) {
            return Err(WatchError::Config(format!(
                "confidence_floor must lie in [0, 1], got {}",
                s.confidence_floor
            )));
        }
        if s.jitter_amplitude < 0.0 {
            return Err(WatchError::Config("jitter_amplitude must be >= 0".into()));
        }
        if self.connection.max_reconnect_attempts == 0 {
            return Err(WatchError::Config(
                "max_reconnect_attempts must be at least 1".into(),
            ));
        }
        if self.connection.handshake_timeout_ms == 0 {
            return Err(WatchError::Config("handshake_timeout_ms must be non-zero".into()));
        }
        if self.alerts.notification_history_cap == 0 || self.alerts.alert_panel_cap == 0 {
            return Err(WatchError::Config("history caps must be non-zero".into()));
        }
        Ok(())
    }

    /// Deterministic config for tests: no jitter, fixed reference
    /// year, fast reconnects.
    pub fn default_test() -> Self {
        Self {
            scoring: ScoringConfig {
                jitter_amplitude: 0.0,
                reference_year: 2025,
                ..ScoringConfig::default()
            },
            connection: ConnectionConfig {
                endpoint: "ws://127.0.0.1:9/ws/notifications".into(),
                reconnect_interval_ms: 10,
                read_timeout_ms: 5,
                handshake_timeout_ms: 500,
                poll_interval_ms: 5,
                ..ConnectionConfig::default()
            },
            alerts: AlertConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config: WatchConfig =
            serde_json::from_str(r#"{"connection":{"max_reconnect_attempts":3}}"#).unwrap();
        assert_eq!(config.connection.max_reconnect_attempts, 3);
        assert_eq!(config.connection.handshake, "subscribe");
        assert_eq!(config.alerts.notification_history_cap, 100);
        assert_eq!(config.scoring.fraud_threshold, 0.45);
    }

    #[test]
    fn url_appends_user_id() {
        let mut conn = ConnectionConfig::default();
        conn.user_id = Some("u-7".into());
        assert_eq!(conn.url(), "ws://localhost:9099/ws/notifications?userId=u-7");
    }

    #[test]
    fn zero_handshake_timeout_rejected() {
        let mut config = WatchConfig::default_test();
        config.connection.handshake_timeout_ms = 0;
        assert!(config.validate().is_err());
        assert_eq!(ConnectionConfig::default().handshake_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn zero_attempts_rejected() {
        let mut config = WatchConfig::default_test();
        config.connection.max_reconnect_attempts = 0;
        assert!(config.validate().is_err());
    }
}
