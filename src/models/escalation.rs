use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{EscalationStatus, TriggerType};

/// Resolution type recorded when the patient's own action clears an alert.
pub const RESOLUTION_PATIENT_ACTION: &str = "patient_action";
/// Resolution type for a missed_weight folded into consecutive_missed_weight.
pub const RESOLUTION_SUPERSEDED: &str = "superseded";

/// A care-team alert. Moves forward only: open, acknowledged, resolved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Escalation {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub trigger_type: TriggerType,
    pub level: u8,
    pub status: EscalationStatus,
    pub detail: String,
    pub created_at: NaiveDateTime,
    pub last_observed_at: NaiveDateTime,
    pub observation_count: u32,
    pub acknowledged_at: Option<NaiveDateTime>,
    pub resolution_type: Option<String>,
    pub action_taken: Option<String>,
    pub resolution_note: Option<String>,
    pub resolved_at: Option<NaiveDateTime>,
}

impl Escalation {
    pub fn is_active(&self) -> bool {
        !self.status.is_terminal()
    }
}

/// One trigger firing, either the one that opened an escalation or one it absorbed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationObservation {
    pub id: Uuid,
    pub escalation_id: Uuid,
    pub patient_id: Uuid,
    pub trigger_type: TriggerType,
    pub observed_on: NaiveDate,
    pub observation_key: String,
    pub detail: String,
    pub observed_at: NaiveDateTime,
}

/// Care-team input when closing an alert. `action_taken` may be left out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resolution {
    pub resolution_type: String,
    #[serde(default)]
    pub action_taken: String,
    #[serde(default)]
    pub note: Option<String>,
}

impl Resolution {
    pub fn patient_action(action_taken: impl Into<String>) -> Self {
        Self {
            resolution_type: RESOLUTION_PATIENT_ACTION.into(),
            action_taken: action_taken.into(),
            note: None,
        }
    }
}
