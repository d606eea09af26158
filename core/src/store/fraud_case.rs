//! Store methods for fraud cases: the persisted alert-case entity
//! `{id, entity_type, entity_id, score, risk_level, reason, status,
//! detected_at, updated_at}`.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use crate::{error::WatchResult, types::CaseId};

use super::CaseStore;

// ── Value types ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityType {
    /// An insured party.
    #[serde(rename = "ASSURE")]
    Insured,
    /// A claim.
    #[serde(rename = "SINISTRE")]
    Claim,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Insured => "ASSURE",
            Self::Claim => "SINISTRE",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "ASSURE" => Some(Self::Insured),
            "SINISTRE" => Some(Self::Claim),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CaseRiskLevel {
    Critical,
    High,
    Medium,
    Low,
    Normal,
}

impl CaseRiskLevel {
    /// Bands on a 0..=100 score: 80 / 60 / 40 / 20.
    pub fn from_score(score: u32) -> Self {
        match score {
            s if s >= 80 => Self::Critical,
            s if s >= 60 => Self::High,
            s if s >= 40 => Self::Medium,
            s if s >= 20 => Self::Low,
            _ => Self::Normal,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "CRITICAL",
            Self::High => "HIGH",
            Self::Medium => "MEDIUM",
            Self::Low => "LOW",
            Self::Normal => "NORMAL",
        }
    }

    fn parse(raw: &str) -> Self {
        match raw {
            "CRITICAL" => Self::Critical,
            "HIGH" => Self::High,
            "MEDIUM" => Self::Medium,
            "LOW" => Self::Low,
            _ => Self::Normal,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CaseStatus {
    Open,
    Reviewed,
    Dismissed,
    Confirmed,
    Resolved,
}

impl CaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::Reviewed => "REVIEWED",
            Self::Dismissed => "DISMISSED",
            Self::Confirmed => "CONFIRMED",
            Self::Resolved => "RESOLVED",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "OPEN" => Some(Self::Open),
            "REVIEWED" => Some(Self::Reviewed),
            "DISMISSED" => Some(Self::Dismissed),
            "CONFIRMED" => Some(Self::Confirmed),
            "RESOLVED" => Some(Self::Resolved),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FraudCase {
    pub id: CaseId,
    pub entity_type: EntityType,
    pub entity_id: String,
    pub score: u32,
    pub risk_level: CaseRiskLevel,
    pub reason: String,
    pub status: CaseStatus,
    pub detected_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Case listing filter. Defaults match the review queue: open cases
/// scoring at least 50, any entity type.
#[derive(Debug, Clone, PartialEq)]
pub struct CaseFilter {
    pub min_score: u32,
    /// `None` lists every status.
    pub status: Option<CaseStatus>,
    pub entity_type: Option<EntityType>,
}

impl Default for CaseFilter {
    fn default() -> Self {
        Self {
            min_score: 50,
            status: Some(CaseStatus::Open),
            entity_type: None,
        }
    }
}

// ── Row mapping ──────────────────────────────────────────────────────────────

const CASE_COLUMNS: &str =
    "id, entity_type, entity_id, score, risk_level, reason, status, detected_at, updated_at";

fn ts(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn case_from_row(row: &Row<'_>) -> rusqlite::Result<FraudCase> {
    let entity_raw: String = row.get(1)?;
    let status_raw: String = row.get(6)?;
    let risk_raw: String = row.get(4)?;
    Ok(FraudCase {
        id:          row.get(0)?,
        // The CHECK constraint keeps entity_type to the two known tags.
        entity_type: EntityType::parse(&entity_raw).unwrap_or(EntityType::Insured),
        entity_id:   row.get(2)?,
        score:       row.get::<_, i64>(3)?.clamp(0, 100) as u32,
        risk_level:  CaseRiskLevel::parse(&risk_raw),
        reason:      row.get(5)?,
        status:      CaseStatus::parse(&status_raw).unwrap_or(CaseStatus::Open),
        detected_at: parse_ts(row, 7)?,
        updated_at:  parse_ts(row, 8)?,
    })
}

// ── Store methods ────────────────────────────────────────────────────────────

impl CaseStore {
    /// File a case. A second record for the same entity re-opens and
    /// overwrites the existing row instead of adding a new one.
    pub fn upsert_case(
        &self,
        entity_type: EntityType,
        entity_id:   &str,
        score:       u32,
        reason:      &str,
        now:         DateTime<Utc>,
    ) -> WatchResult<FraudCase> {
        let score = score.min(100);
        let level = CaseRiskLevel::from_score(score);
        let stamp = ts(now);
        self.conn.execute(
            "INSERT INTO fraud_case
             (entity_type, entity_id, score, risk_level, reason, status, detected_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 'OPEN', ?6, ?6)
             ON CONFLICT (entity_type, entity_id) DO UPDATE SET
                score       = excluded.score,
                risk_level  = excluded.risk_level,
                reason      = excluded.reason,
                status      = 'OPEN',
                detected_at = excluded.detected_at,
                updated_at  = excluded.updated_at",
            params![entity_type.as_str(), entity_id, score, level.as_str(), reason, stamp],
        )?;

        let case = self.conn.query_row(
            &format!(
                "SELECT {CASE_COLUMNS} FROM fraud_case
                 WHERE entity_type = ?1 AND entity_id = ?2"
            ),
            params![entity_type.as_str(), entity_id],
            case_from_row,
        )?;
        Ok(case)
    }

    pub fn get_case(&self, id: CaseId) -> WatchResult<Option<FraudCase>> {
        let case = self
            .conn
            .query_row(
                &format!("SELECT {CASE_COLUMNS} FROM fraud_case WHERE id = ?1"),
                params![id],
                case_from_row,
            )
            .optional()?;
        Ok(case)
    }

    /// Cases matching `filter`, newest detection first.
    pub fn list_cases(&self, filter: &CaseFilter) -> WatchResult<Vec<FraudCase>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {CASE_COLUMNS} FROM fraud_case
             WHERE score >= ?1
               AND (?2 IS NULL OR status = ?2)
               AND (?3 IS NULL OR entity_type = ?3)
             ORDER BY detected_at DESC, id DESC"
        ))?;
        let cases = stmt
            .query_map(
                params![
                    filter.min_score,
                    filter.status.map(|s| s.as_str()),
                    filter.entity_type.map(|e| e.as_str()),
                ],
                case_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(cases)
    }

    /// Move a case to `status`. Returns false when the id is unknown.
    pub fn set_case_status(
        &self,
        id:     CaseId,
        status: CaseStatus,
        now:    DateTime<Utc>,
    ) -> WatchResult<bool> {
        let changed = self.conn.execute(
            "UPDATE fraud_case SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![status.as_str(), ts(now), id],
        )?;
        Ok(changed > 0)
    }

    pub fn case_count(&self) -> WatchResult<i64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM fraud_case", [], |row| row.get(0))?;
        Ok(count)
    }
}
