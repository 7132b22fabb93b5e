use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use super::enums::{CarePhase, MilestoneKind};

/// Default 24-hour weight-gain trigger (kg).
pub const DEFAULT_WEIGHT_GAIN_24H_KG: f64 = 1.0;
/// Default 7-day weight-gain trigger (kg).
pub const DEFAULT_WEIGHT_GAIN_7D_KG: f64 = 2.0;

/// Free-text tasks per care-plan phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhasePlan {
    pub days_0_7: Vec<String>,
    pub days_8_30: Vec<String>,
    pub days_31_90: Vec<String>,
}

impl PhasePlan {
    pub fn tasks(&self, phase: CarePhase) -> &[String] {
        match phase {
            CarePhase::Days0To7 => &self.days_0_7,
            CarePhase::Days8To30 => &self.days_8_30,
            CarePhase::Days31To90 => &self.days_31_90,
        }
    }
}

/// Which vitals the patient must report every day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitoringRequirements {
    pub weight: bool,
    pub bp: bool,
    pub symptom_check: bool,
}

impl Default for MonitoringRequirements {
    /// Daily weight and symptom check; under-monitoring a CHF patient is the riskier failure.
    fn default() -> Self {
        Self {
            weight: true,
            bp: false,
            symptom_check: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedFlags {
    /// Warning symptoms: shown to the patient, no alert.
    pub yellow_zone: Vec<String>,
    /// Emergency symptoms: any match raises a `red_flag` escalation.
    pub red_zone: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeightThresholds {
    pub gain_24h_kg: f64,
    pub gain_7d_kg: f64,
}

impl Default for WeightThresholds {
    fn default() -> Self {
        Self {
            gain_24h_kg: DEFAULT_WEIGHT_GAIN_24H_KG,
            gain_7d_kg: DEFAULT_WEIGHT_GAIN_7D_KG,
        }
    }
}

/// A dated check-in or follow-up visit inside the 90-day window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Milestone {
    pub kind: MilestoneKind,
    pub date: NaiveDate,
    pub time: Option<NaiveTime>,
    pub description: String,
    pub provider: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CarePlan {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub phases: PhasePlan,
    pub monitoring: MonitoringRequirements,
    pub red_flags: RedFlags,
    pub thresholds: WeightThresholds,
    pub trigger_action_rules: Vec<String>,
    pub discharge_advice: Vec<String>,
    pub milestones: Vec<Milestone>,
}

impl CarePlan {
    pub fn milestones_on(&self, date: NaiveDate) -> impl Iterator<Item = &Milestone> {
        self.milestones.iter().filter(move |m| m.date == date)
    }

    /// First appointment on or after `date`.
    pub fn next_appointment(&self, date: NaiveDate) -> Option<&Milestone> {
        self.milestones
            .iter()
            .filter(|m| m.kind == MilestoneKind::Appointment && m.date >= date)
            .min_by_key(|m| (m.date, m.time))
    }
}
