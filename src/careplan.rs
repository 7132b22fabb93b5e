//! Care plan deriver.
//!
//! Builds a patient's 90-day care plan and medication plan from an extraction
//! record. Derivation never fails: every missing or unreadable section falls
//! back to the CHF defaults and is logged.

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::Serialize;

use crate::models::extraction::{ExtractedAppointment, ExtractionRecord};
use crate::models::{
    CarePlan, Medication, MedicationPlan, Milestone, MilestoneKind, MonitoringRequirements,
    PhasePlan, RedFlags, WeightThresholds, DEFAULT_WEIGHT_GAIN_24H_KG, DEFAULT_WEIGHT_GAIN_7D_KG,
};
use crate::reminders::parse_frequency;

/// Length of the post-discharge programme in days.
pub const PROGRAM_DAYS: i64 = 90;

/// Nurse check-ins: days 0, 2, 6, then weekly from day 13.
pub fn nurse_checkin_days() -> Vec<i64> {
    let mut days = vec![0, 2, 6];
    days.extend((13..=PROGRAM_DAYS).step_by(7));
    days
}

pub const DEFAULT_PHASE_0_7: &[&str] = &[
    "Daily symptom check and weight logging",
    "Medication reconciliation and adherence call",
    "Schedule/confirm cardiology follow-up within 7 days",
    "Follow discharge advice for diet/fluid/activity restrictions",
];

pub const DEFAULT_PHASE_8_30: &[&str] = &[
    "Continue daily weights and BP",
    "Titrate CHF medications per clinician plan",
    "Weekly nurse check-in",
];

pub const DEFAULT_PHASE_31_90: &[&str] = &[
    "Self-management reinforcement",
    "Monitor decompensation red flags",
    "Chronic disease optimization follow-up",
];

pub const DEFAULT_YELLOW_ZONE: &[&str] = &[
    "increasing leg swelling",
    "weight gain over threshold",
    "worsening exertional breathlessness",
];

pub const DEFAULT_RED_ZONE: &[&str] = &["resting breathlessness", "chest pain", "syncope"];

pub const DEFAULT_TRIGGER_ACTION_RULES: &[&str] = &[
    "Weight gain > 1 kg in 24h or > 2 kg in 7d triggers nurse call",
    "Severe dyspnea/chest pain/syncope triggers ED/911 escalation",
];

/// Patient details carried on the extraction record.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PatientDetails {
    pub full_name: Option<String>,
    pub dob: Option<NaiveDate>,
    pub sex: Option<String>,
    pub mrn: Option<String>,
    pub primary_diagnosis: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DerivedPlan {
    pub enrolled_on: NaiveDate,
    pub patient: PatientDetails,
    pub care_plan: CarePlan,
    pub medication_plan: MedicationPlan,
}

fn owned(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

/// Accepts `YYYY-MM-DD` or anything with a leading ISO date (`2025-03-01T10:00`).
pub fn parse_loose_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .or_else(|| trimmed.get(..10).and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok()))
}

/// Appointment timestamps arrive in several ISO-like shapes; a bare date has no time.
pub fn parse_appointment_datetime(raw: &str) -> Option<(NaiveDate, Option<NaiveTime>)> {
    let trimmed = raw.trim();
    const FORMATS: &[&str] = &[
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
    ];
    for format in FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some((dt.date(), Some(dt.time())));
        }
    }
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(trimmed) {
        let naive = dt.naive_local();
        return Some((naive.date(), Some(naive.time())));
    }
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .map(|d| (d, None))
}

/// Day 0: the care plan start date when readable, else the registration date.
pub fn enrollment_date(record: &ExtractionRecord, registration_date: NaiveDate) -> NaiveDate {
    record
        .care_plan_90d
        .as_ref()
        .and_then(|cp| cp.start_date.as_deref())
        .and_then(parse_loose_date)
        .unwrap_or(registration_date)
}

fn phase_or_default(tasks: Option<&Vec<String>>, default: &[&str], phase: &str) -> Vec<String> {
    match tasks {
        Some(tasks) if !tasks.is_empty() => tasks.clone(),
        _ => {
            tracing::warn!(phase, "Care plan phase missing, using default tasks");
            owned(default)
        }
    }
}

fn derive_phases(record: &ExtractionRecord) -> PhasePlan {
    let section = record.care_plan_90d.as_ref();
    PhasePlan {
        days_0_7: phase_or_default(section.map(|s| &s.phase_0_7), DEFAULT_PHASE_0_7, "days_0_7"),
        days_8_30: phase_or_default(section.map(|s| &s.phase_8_30), DEFAULT_PHASE_8_30, "days_8_30"),
        days_31_90: phase_or_default(section.map(|s| &s.phase_31_90), DEFAULT_PHASE_31_90, "days_31_90"),
    }
}

fn derive_monitoring(record: &ExtractionRecord) -> MonitoringRequirements {
    let defaults = MonitoringRequirements::default();
    match &record.chf().monitoring {
        None => {
            tracing::warn!("Monitoring requirements missing, requiring weight and symptom check");
            defaults
        }
        Some(m) => MonitoringRequirements {
            weight: m.daily_weight_required.unwrap_or(defaults.weight),
            bp: m.bp_required.unwrap_or(defaults.bp),
            symptom_check: m.symptom_check_required.unwrap_or(defaults.symptom_check),
        },
    }
}

fn positive_or(value: Option<f64>, default: f64, field: &str) -> f64 {
    match value {
        Some(v) if v.is_finite() && v > 0.0 => v,
        Some(v) => {
            tracing::warn!(field, value = v, default, "Non-positive weight threshold, using default");
            default
        }
        None => {
            tracing::warn!(field, default, "Weight threshold missing, using default");
            default
        }
    }
}

fn derive_red_flags(record: &ExtractionRecord) -> (RedFlags, WeightThresholds) {
    let section = record.chf().red_flags.as_ref();
    let yellow_zone = match section.map(|s| &s.yellow_zone) {
        Some(list) if !list.is_empty() => list.clone(),
        _ => {
            tracing::warn!("Yellow-zone list missing, using CHF defaults");
            owned(DEFAULT_YELLOW_ZONE)
        }
    };
    let red_zone = match section.map(|s| &s.red_zone) {
        Some(list) if !list.is_empty() => list.clone(),
        _ => {
            tracing::warn!("Red-zone list missing, using CHF defaults");
            owned(DEFAULT_RED_ZONE)
        }
    };
    let thresholds = WeightThresholds {
        gain_24h_kg: positive_or(
            section.and_then(|s| s.weight_gain_trigger_24h_kg),
            DEFAULT_WEIGHT_GAIN_24H_KG,
            "weight_gain_trigger_24h_kg",
        ),
        gain_7d_kg: positive_or(
            section.and_then(|s| s.weight_gain_trigger_7d_kg),
            DEFAULT_WEIGHT_GAIN_7D_KG,
            "weight_gain_trigger_7d_kg",
        ),
    };
    (RedFlags { yellow_zone, red_zone }, thresholds)
}

fn derive_medications(record: &ExtractionRecord) -> MedicationPlan {
    let mut medications = Vec::new();
    for extracted in &record.medications.discharge_medications {
        let Some(name) = extracted.medication_name.clone() else {
            tracing::warn!("Skipping discharge medication without a name");
            continue;
        };
        let frequency = extracted.frequency.clone().unwrap_or_default();
        medications.push(Medication {
            times: parse_frequency(&frequency),
            name,
            dose: extracted.dose.clone(),
            route: extracted.route.clone(),
            frequency,
            indication: extracted.indication.clone(),
        });
    }
    MedicationPlan { medications }
}

fn appointment_milestone(appt: &ExtractedAppointment) -> Option<Milestone> {
    let raw = appt.scheduled_datetime.as_deref()?;
    let Some((date, time)) = parse_appointment_datetime(raw) else {
        tracing::warn!(scheduled_datetime = raw, "Skipping appointment with unreadable date");
        return None;
    };
    let appointment_type = appt.appointment_type.as_deref().unwrap_or("follow-up");
    let description = match appt.provider_name.as_deref() {
        Some(provider) => format!("{appointment_type} appointment with {provider}"),
        None => format!("{appointment_type} appointment"),
    };
    Some(Milestone {
        kind: MilestoneKind::Appointment,
        date,
        time,
        description,
        provider: appt.provider_name.clone(),
    })
}

fn derive_milestones(record: &ExtractionRecord, start: NaiveDate) -> Vec<Milestone> {
    let mut milestones: Vec<Milestone> = nurse_checkin_days()
        .into_iter()
        .map(|day| Milestone {
            kind: MilestoneKind::NurseCheckin,
            date: start + Duration::days(day),
            time: None,
            description: "Nurse check-in and symptom review".into(),
            provider: None,
        })
        .collect();
    milestones.extend(record.follow_up.appointments.iter().filter_map(appointment_milestone));
    milestones.sort_by(|a, b| (a.date, a.time).cmp(&(b.date, b.time)));
    milestones
}

/// Derive the full plan. `registration_date` is day 0 unless the record
/// carries its own care plan start date.
pub fn derive_plan(record: &ExtractionRecord, registration_date: NaiveDate) -> DerivedPlan {
    let start = enrollment_date(record, registration_date);
    let end = record
        .care_plan_90d
        .as_ref()
        .and_then(|cp| cp.end_date.as_deref())
        .and_then(parse_loose_date)
        .filter(|end| *end > start)
        .unwrap_or(start + Duration::days(PROGRAM_DAYS));

    let trigger_action_rules = match record.care_plan_90d.as_ref().map(|cp| &cp.trigger_action_rules) {
        Some(rules) if !rules.is_empty() => rules.clone(),
        _ => owned(DEFAULT_TRIGGER_ACTION_RULES),
    };
    let (red_flags, thresholds) = derive_red_flags(record);

    let care_plan = CarePlan {
        start_date: start,
        end_date: end,
        phases: derive_phases(record),
        monitoring: derive_monitoring(record),
        red_flags,
        thresholds,
        trigger_action_rules,
        discharge_advice: record.extracted_details.discharge_advice.clone(),
        milestones: derive_milestones(record, start),
    };
    let medication_plan = derive_medications(record);

    let patient = PatientDetails {
        full_name: record.patient.full_name.clone(),
        dob: record.patient.dob.as_deref().and_then(parse_loose_date),
        sex: record.patient.sex_at_birth.clone(),
        mrn: record.patient.mrn.clone(),
        primary_diagnosis: record.clinical_episode.primary_diagnosis.clone(),
    };

    tracing::debug!(
        start = %start,
        medications = medication_plan.medications.len(),
        milestones = care_plan.milestones.len(),
        "Care plan derived"
    );

    DerivedPlan {
        enrolled_on: start,
        patient,
        care_plan,
        medication_plan,
    }
}
