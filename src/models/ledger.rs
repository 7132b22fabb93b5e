use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{AckStatus, ObligationKind, VitalKind};

/// A patient-reported vital reading. Serialized in its wire shape:
/// `70.5`, `{"systolic":120,"diastolic":80}` or `{"symptoms":[...]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VitalValue {
    Weight(f64),
    BloodPressure { systolic: f64, diastolic: f64 },
    SymptomCheck { symptoms: Vec<String> },
}

impl VitalValue {
    pub fn kind(&self) -> VitalKind {
        match self {
            VitalValue::Weight(_) => VitalKind::Weight,
            VitalValue::BloodPressure { .. } => VitalKind::BloodPressure,
            VitalValue::SymptomCheck { .. } => VitalKind::SymptomCheck,
        }
    }

    pub fn weight_kg(&self) -> Option<f64> {
        match self {
            VitalValue::Weight(kg) => Some(*kg),
            _ => None,
        }
    }

    pub fn symptoms(&self) -> &[String] {
        match self {
            VitalValue::SymptomCheck { symptoms } => symptoms,
            _ => &[],
        }
    }
}

/// What a ledger entry fulfils: one vital per day, or one medication dose.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ObligationKey {
    Vital(VitalKind),
    Dose {
        medication_name: String,
        scheduled_time: NaiveTime,
    },
}

impl ObligationKey {
    pub fn kind(&self) -> ObligationKind {
        match self {
            ObligationKey::Vital(v) => v.obligation_kind(),
            ObligationKey::Dose { .. } => ObligationKind::Medication,
        }
    }

    /// Stable text form, used as the observation key for missed doses.
    pub fn storage_key(&self) -> String {
        match self {
            ObligationKey::Vital(v) => v.as_str().to_string(),
            ObligationKey::Dose {
                medication_name,
                scheduled_time,
            } => format!(
                "{}@{}",
                medication_name.to_lowercase(),
                scheduled_time.format(super::TIME_FORMAT)
            ),
        }
    }
}

impl std::fmt::Display for ObligationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ObligationKey::Vital(v) => f.write_str(v.as_str()),
            ObligationKey::Dose {
                medication_name,
                scheduled_time,
            } => write!(
                f,
                "{} at {}",
                medication_name,
                scheduled_time.format(super::TIME_FORMAT)
            ),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VitalLog {
    pub seq: i64,
    pub id: Uuid,
    pub patient_id: Uuid,
    pub date: NaiveDate,
    pub kind: VitalKind,
    pub value: VitalValue,
    pub recorded_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MedicationAck {
    pub seq: i64,
    pub id: Uuid,
    pub patient_id: Uuid,
    pub date: NaiveDate,
    pub medication_name: String,
    #[serde(with = "super::hhmm")]
    pub scheduled_time: NaiveTime,
    pub status: AckStatus,
    pub skip_reason: Option<String>,
    pub recorded_at: NaiveDateTime,
}

impl MedicationAck {
    pub fn obligation_key(&self) -> ObligationKey {
        ObligationKey::Dose {
            medication_name: self.medication_name.clone(),
            scheduled_time: self.scheduled_time,
        }
    }
}

/// The authoritative ledger row for one obligation on one day.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "entry_type", rename_all = "snake_case")]
pub enum LedgerEntry {
    Vital(VitalLog),
    Medication(MedicationAck),
}

impl LedgerEntry {
    pub fn seq(&self) -> i64 {
        match self {
            LedgerEntry::Vital(v) => v.seq,
            LedgerEntry::Medication(m) => m.seq,
        }
    }
}
