//! Escalation engine: detects missed obligations, weight spikes and red-zone
//! symptoms, de-duplicates them into care-team alerts and manages the alert
//! lifecycle (open, acknowledged, resolved).

pub mod detection;
pub mod engine;
pub mod store;
pub mod types;

pub use engine::EscalationEngine;
pub use types::{EventOutcome, RaiseOutcome, SweepCounts, Trigger};
