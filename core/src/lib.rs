//! fraudwatch-core: contract fraud scoring and the live alert feed.
//!
//! The bus owns everything else:
//!   scoring      → rule-based fraud assessment of a contract profile
//!   connection   → reconnecting channel to the detection feed
//!   alert_store  → capped notification history, alert panel, cases
//!   store        → SQLite fraud-case registry

pub mod alert_store;
pub mod bus;
pub mod config;
pub mod connection;
pub mod envelope;
pub mod error;
pub mod event;
pub mod rng;
pub mod scoring;
pub mod store;
pub mod types;
pub mod ws_transport;
