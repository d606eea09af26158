//! Shared primitive types used across the crate.

/// Identifier of an alert shown on the panel. Remote producers send
/// numbers or strings; both are normalised to text.
pub type AlertId = String;

/// Store-assigned sequence number of a notification in the history.
pub type NotificationSeq = u64;

/// Primary key of a persisted fraud case.
pub type CaseId = i64;

/// Identifier handed out by the bus for each subscriber.
pub type SubscriptionId = u64;
