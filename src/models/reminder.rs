use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{ObligationKind, VitalKind};
use super::ledger::ObligationKey;

/// A compiled, not-yet-persisted rule. Ordering is by time of day first so a
/// sorted set reads like the patient's day.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RuleSpec {
    #[serde(with = "super::hhmm")]
    pub scheduled_time: NaiveTime,
    pub kind: ObligationKind,
    pub medication_name: Option<String>,
}

impl RuleSpec {
    pub fn obligation_key(&self) -> ObligationKey {
        match (self.kind.vital_kind(), &self.medication_name) {
            (Some(vital), _) => ObligationKey::Vital(vital),
            (None, name) => ObligationKey::Dose {
                medication_name: name.clone().unwrap_or_default(),
                scheduled_time: self.scheduled_time,
            },
        }
    }

    pub fn is_vital(&self, vital: VitalKind) -> bool {
        self.kind.vital_kind() == Some(vital)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReminderRule {
    pub id: Uuid,
    pub rule_set_id: Uuid,
    pub patient_id: Uuid,
    pub kind: ObligationKind,
    #[serde(with = "super::hhmm")]
    pub scheduled_time: NaiveTime,
    pub medication_name: Option<String>,
}

impl ReminderRule {
    pub fn spec(&self) -> RuleSpec {
        RuleSpec {
            scheduled_time: self.scheduled_time,
            kind: self.kind,
            medication_name: self.medication_name.clone(),
        }
    }

    pub fn obligation_key(&self) -> ObligationKey {
        self.spec().obligation_key()
    }
}

/// An immutable, versioned group of rules. The set in force on a date is the
/// one with the latest `effective_from` not after it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReminderRuleSet {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub version: i64,
    pub effective_from: NaiveDate,
    pub created_at: NaiveDateTime,
    pub rules: Vec<ReminderRule>,
}

impl ReminderRuleSet {
    /// Rule specs in canonical order, for comparison with a fresh compilation.
    pub fn specs(&self) -> Vec<RuleSpec> {
        let mut specs: Vec<RuleSpec> = self.rules.iter().map(ReminderRule::spec).collect();
        specs.sort();
        specs
    }

    pub fn medication_rules(&self) -> impl Iterator<Item = &ReminderRule> {
        self.rules
            .iter()
            .filter(|r| r.kind == ObligationKind::Medication)
    }

    pub fn requires(&self, vital: VitalKind) -> bool {
        self.rules.iter().any(|r| r.kind.vital_kind() == Some(vital))
    }
}

/// A reminder the external notifier should send now.
#[derive(Debug, Clone, Serialize)]
pub struct DueReminder {
    pub patient_id: Uuid,
    pub patient_name: String,
    pub phone: String,
    pub kind: ObligationKind,
    #[serde(with = "super::hhmm")]
    pub scheduled_time: NaiveTime,
    pub medication_name: Option<String>,
    /// Negative when the scheduled time has already passed.
    pub minutes_until_due: i64,
}
