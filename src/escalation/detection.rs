//! Trigger detection. Everything here is a pure function of ledger rows and
//! plan settings already loaded by the engine.

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use uuid::Uuid;

use super::types::Trigger;
use crate::config::RedZoneMatch;
use crate::models::{
    AckStatus, MedicationAck, ReminderRule, ReminderRuleSet, TriggerType, VitalLog,
    WeightThresholds, TIME_FORMAT,
};

// ---------------------------------------------------------------------------
// [1] WEIGHT SPIKES
// ---------------------------------------------------------------------------

/// Observation key tying a per-event trigger to the ledger row that fired it.
pub fn ledger_observation_key(seq: i64) -> String {
    format!("seq:{seq}")
}

/// Gain in kg, rounded to 2 decimals so that float noise never decides a threshold.
pub fn weight_gain(latest_kg: f64, earlier_kg: f64) -> f64 {
    ((latest_kg - earlier_kg) * 100.0).round() / 100.0
}

/// Compare a new weight with the latest reading one day and seven days before.
/// The two checks are independent: either, both or neither may fire.
pub fn detect_weight_spikes(
    log: &VitalLog,
    previous_day: Option<&VitalLog>,
    week_ago: Option<&VitalLog>,
    thresholds: &WeightThresholds,
) -> Vec<Trigger> {
    let Some(latest) = log.value.weight_kg() else {
        return Vec::new();
    };

    let checks = [
        (previous_day, thresholds.gain_24h_kg, TriggerType::WeightSpike24h, "24 hours"),
        (week_ago, thresholds.gain_7d_kg, TriggerType::WeightSpike7d, "7 days"),
    ];

    checks
        .into_iter()
        .filter_map(|(earlier, threshold, trigger_type, span)| {
            let earlier_kg = earlier?.value.weight_kg()?;
            let gain = weight_gain(latest, earlier_kg);
            (gain >= threshold).then(|| {
                Trigger::new(
                    log.patient_id,
                    trigger_type,
                    log.date,
                    ledger_observation_key(log.seq),
                    format!(
                        "Weight gain of {gain:.1}kg in {span} ({earlier_kg:.1}kg to {latest:.1}kg, threshold: {threshold}kg)"
                    ),
                )
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// [2] RED FLAGS
// ---------------------------------------------------------------------------

fn normalize(s: &str) -> String {
    s.trim().to_lowercase()
}

/// Whether one reported symptom matches one red-zone entry. Empty strings never match.
pub fn symptom_matches(symptom: &str, red_zone_entry: &str, mode: RedZoneMatch) -> bool {
    let symptom = normalize(symptom);
    let entry = normalize(red_zone_entry);
    if symptom.is_empty() || entry.is_empty() {
        return false;
    }
    match mode {
        RedZoneMatch::Exact => symptom == entry,
        RedZoneMatch::Contains => symptom.contains(&entry) || entry.contains(&symptom),
    }
}

/// Reported symptoms that match any red-zone entry, in reported order.
pub fn match_red_flags<'a>(
    symptoms: &'a [String],
    red_zone: &[String],
    mode: RedZoneMatch,
) -> Vec<&'a str> {
    symptoms
        .iter()
        .filter(|s| red_zone.iter().any(|entry| symptom_matches(s, entry, mode)))
        .map(String::as_str)
        .collect()
}

pub fn detect_red_flag(log: &VitalLog, red_zone: &[String], mode: RedZoneMatch) -> Option<Trigger> {
    let matched = match_red_flags(log.value.symptoms(), red_zone, mode);
    if matched.is_empty() {
        return None;
    }
    Some(Trigger::new(
        log.patient_id,
        TriggerType::RedFlag,
        log.date,
        ledger_observation_key(log.seq),
        format!("Red-zone symptoms reported: {}", matched.join(", ")),
    ))
}

// ---------------------------------------------------------------------------
// [3] MISSED WEIGHT
// ---------------------------------------------------------------------------

pub const WEIGHT_OBSERVATION_KEY: &str = "weight";

/// Most recent day whose weight deadline has passed at `as_of`, or `None`
/// when that day falls before enrollment.
pub fn closed_day(
    as_of: NaiveDateTime,
    weight_deadline: NaiveTime,
    enrolled_on: NaiveDate,
) -> Option<NaiveDate> {
    let day = if as_of.time() >= weight_deadline {
        as_of.date()
    } else {
        as_of.date().pred_opt()?
    };
    (day >= enrolled_on).then_some(day)
}

/// Trigger for a missing weight on `day`. When the day before was missed too,
/// the trigger is the level-2 consecutive form.
pub fn missed_weight_trigger(patient_id: Uuid, day: NaiveDate, previous_day_missed: bool) -> Trigger {
    if previous_day_missed {
        let previous = day - Duration::days(1);
        Trigger::new(
            patient_id,
            TriggerType::ConsecutiveMissedWeight,
            day,
            WEIGHT_OBSERVATION_KEY,
            format!("No weight logged on {previous} or {day}"),
        )
    } else {
        Trigger::new(
            patient_id,
            TriggerType::MissedWeight,
            day,
            WEIGHT_OBSERVATION_KEY,
            format!("No weight logged on {day}"),
        )
    }
}

// ---------------------------------------------------------------------------
// [4] MISSED MEDICATION
// ---------------------------------------------------------------------------

/// Days whose doses a sweep at `as_of` checks: the previous day, for doses
/// whose grace window ran past midnight or past the last sweep, and today.
pub fn dose_days(as_of: NaiveDateTime, enrolled_on: NaiveDate) -> Vec<NaiveDate> {
    let today = as_of.date();
    [today.pred_opt(), Some(today)]
        .into_iter()
        .flatten()
        .filter(|day| *day >= enrolled_on)
        .collect()
}

/// Doses of `day` past their grace window at `as_of` with no taken or skipped
/// ack. `acks` must be the latest ack per dose for that day.
pub fn overdue_doses<'a>(
    rule_set: &'a ReminderRuleSet,
    acks: &[MedicationAck],
    day: NaiveDate,
    as_of: NaiveDateTime,
    grace: Duration,
) -> Vec<&'a ReminderRule> {
    rule_set
        .medication_rules()
        .filter(|rule| day.and_time(rule.scheduled_time) + grace <= as_of)
        .filter(|rule| {
            let key = rule.obligation_key().storage_key();
            !acks.iter().any(|ack| {
                matches!(ack.status, AckStatus::Taken | AckStatus::Skipped)
                    && ack.obligation_key().storage_key() == key
            })
        })
        .collect()
}

pub fn missed_dose_trigger(
    patient_id: Uuid,
    date: NaiveDate,
    rule: &ReminderRule,
    grace: Duration,
) -> Trigger {
    let name = rule.medication_name.as_deref().unwrap_or("medication");
    Trigger::new(
        patient_id,
        TriggerType::MissedMedication,
        date,
        rule.obligation_key().storage_key(),
        format!(
            "{name} due at {} not acknowledged within {} minutes",
            rule.scheduled_time.format(TIME_FORMAT),
            grace.num_minutes()
        ),
    )
}
