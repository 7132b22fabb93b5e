use chrono::NaiveDate;
use serde::Serialize;
use uuid::Uuid;

use crate::models::{Escalation, TriggerType};

// ---------------------------------------------------------------------------
// Trigger
// ---------------------------------------------------------------------------

/// One detected firing of a trigger, before de-duplication.
///
/// `(patient_id, trigger_type, observed_on, observation_key)` identifies the
/// firing: the same tuple seen twice is the same observation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trigger {
    pub patient_id: Uuid,
    pub trigger_type: TriggerType,
    pub observed_on: NaiveDate,
    pub observation_key: String,
    pub detail: String,
    pub level: u8,
}

impl Trigger {
    pub fn new(
        patient_id: Uuid,
        trigger_type: TriggerType,
        observed_on: NaiveDate,
        observation_key: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            patient_id,
            trigger_type,
            observed_on,
            observation_key: observation_key.into(),
            detail: detail.into(),
            level: trigger_type.level(),
        }
    }
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// What happened to a trigger handed to the store.
#[derive(Debug, Clone)]
pub enum RaiseOutcome {
    /// No escalation was open for the trigger; a new one was created.
    Opened(Escalation),
    /// An open escalation absorbed the observation.
    Absorbed(Escalation),
    /// This exact observation was recorded before; nothing changed.
    AlreadyObserved,
}

impl RaiseOutcome {
    pub fn escalation(&self) -> Option<&Escalation> {
        match self {
            RaiseOutcome::Opened(esc) | RaiseOutcome::Absorbed(esc) => Some(esc),
            RaiseOutcome::AlreadyObserved => None,
        }
    }
}

/// Effect of one ledger write on the patient's escalations.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EventOutcome {
    /// Escalations opened or absorbed into by this event.
    pub raised: Vec<Escalation>,
    /// Missed-obligation escalations the event closed.
    pub auto_resolved: Vec<Escalation>,
}

impl EventOutcome {
    pub(crate) fn record(&mut self, outcome: RaiseOutcome) {
        if let RaiseOutcome::Opened(esc) | RaiseOutcome::Absorbed(esc) = outcome {
            self.raised.push(esc);
        }
    }
}

/// Totals from one sweep run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepCounts {
    /// Active patients examined.
    pub checked: usize,
    pub opened: usize,
    pub absorbed: usize,
    /// Open missed_weight alerts folded into consecutive_missed_weight.
    pub superseded: usize,
    /// Patients whose check failed; the sweep carries on past them.
    pub failed: usize,
}

impl SweepCounts {
    pub(crate) fn record(&mut self, outcome: &RaiseOutcome) {
        match outcome {
            RaiseOutcome::Opened(_) => self.opened += 1,
            RaiseOutcome::Absorbed(_) => self.absorbed += 1,
            RaiseOutcome::AlreadyObserved => {}
        }
    }
}
