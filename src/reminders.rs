//! Reminder rule compiler.
//!
//! Turns a medication plan and monitoring requirements into concrete
//! time-of-day obligations, persists them as immutable versioned rule sets,
//! and answers which reminders are due for the external notifier.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use regex::Regex;
use rusqlite::Connection;
use serde::Serialize;
use uuid::Uuid;

use crate::db::{self, DatabaseError};
use crate::error::EngineError;
use crate::models::{
    DueReminder, MedicationPlan, MonitoringRequirements, ObligationKey, ObligationKind,
    ReminderRuleSet, RuleSpec,
};

// ═══════════════════════════════════════════
// Frequency parsing
// ═══════════════════════════════════════════

/// Canonical time for the daily weight (before breakfast).
pub const WEIGHT_TIME: (u32, u32) = (7, 30);
pub const BP_TIME: (u32, u32) = (8, 30);
/// Evening symptom check-in.
pub const SYMPTOM_CHECK_TIME: (u32, u32) = (19, 0);
/// Used when a frequency cannot be read at all.
pub const FALLBACK_TIME: (u32, u32) = (8, 0);

/// Known frequency notations. "1-0-1" reads morning-afternoon-night.
const FREQUENCY_TABLE: &[(&str, &[&str])] = &[
    ("1-0-0", &["08:00"]),
    ("0-1-0", &["14:00"]),
    ("0-0-1", &["21:00"]),
    ("1-1-0", &["08:00", "14:00"]),
    ("1-0-1", &["08:00", "21:00"]),
    ("0-1-1", &["14:00", "21:00"]),
    ("1-1-1", &["08:00", "14:00", "21:00"]),
    ("1-1-1-1", &["06:00", "12:00", "18:00", "22:00"]),
    ("once daily", &["08:00"]),
    ("od", &["08:00"]),
    ("once a day", &["08:00"]),
    ("qd", &["08:00"]),
    ("daily", &["08:00"]),
    ("bd", &["08:00", "21:00"]),
    ("bid", &["08:00", "21:00"]),
    ("twice daily", &["08:00", "21:00"]),
    ("twice a day", &["08:00", "21:00"]),
    ("tds", &["08:00", "14:00", "21:00"]),
    ("tid", &["08:00", "14:00", "21:00"]),
    ("thrice daily", &["08:00", "14:00", "21:00"]),
    ("three times a day", &["08:00", "14:00", "21:00"]),
    ("qid", &["06:00", "12:00", "18:00", "22:00"]),
    ("four times a day", &["06:00", "12:00", "18:00", "22:00"]),
    ("at night", &["21:00"]),
    ("hs", &["21:00"]),
    ("at bedtime", &["21:00"]),
    ("morning", &["08:00"]),
    ("evening", &["18:00"]),
    ("night", &["21:00"]),
    ("weekly", &["08:00"]),
    ("sos", &[]),
    ("prn", &[]),
    ("stat", &[]),
];

static DOSE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([01]-[01]-[01](?:-[01])?)\b").unwrap());

static CLOCK_TIME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d{1,2})(?::(\d{2}))?\s*(am|pm)\b|\b(\d{1,2}):(\d{2})\b").unwrap()
});

static AS_NEEDED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(sos|prn|stat|as needed|as required|when required|if needed)\b").unwrap()
});

static CLAUSE_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[,;]|\b(?:and|plus|then)\b").unwrap());

/// Keywords for the fallback search, longest first so "twice daily" beats "daily".
static KEYWORDS: LazyLock<Vec<(Regex, &'static [&'static str])>> = LazyLock::new(|| {
    let mut entries: Vec<_> = FREQUENCY_TABLE
        .iter()
        .filter(|(_, times)| !times.is_empty())
        .collect();
    entries.sort_by_key(|(key, _)| std::cmp::Reverse(key.len()));
    entries
        .into_iter()
        .map(|(key, times)| {
            let pattern = format!(r"\b{}\b", regex::escape(key));
            (Regex::new(&pattern).unwrap(), *times)
        })
        .collect()
});

fn to_times(raw: &[&str]) -> Vec<NaiveTime> {
    raw.iter().filter_map(|t| crate::models::parse_clock_time(t)).collect()
}

fn hm(t: (u32, u32)) -> NaiveTime {
    NaiveTime::from_hms_opt(t.0, t.1, 0).unwrap_or(NaiveTime::MIN)
}

/// The clauses of a frequency that do not describe an as-needed dose, so that
/// "twice daily, sos if breathless" still reads as twice daily.
fn scheduled_clauses(text: &str) -> String {
    CLAUSE_BREAK
        .split(text)
        .map(str::trim)
        .filter(|clause| !clause.is_empty() && !AS_NEEDED.is_match(clause))
        .collect::<Vec<_>>()
        .join(", ")
}

fn table_lookup(key: &str) -> Option<Vec<NaiveTime>> {
    FREQUENCY_TABLE
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, times)| to_times(times))
}

fn explicit_clock_times(text: &str) -> Vec<NaiveTime> {
    let mut times = BTreeSet::new();
    for caps in CLOCK_TIME.captures_iter(text) {
        let parsed = if let Some(hour) = caps.get(1) {
            let mut h: u32 = hour.as_str().parse().unwrap_or(99);
            let m: u32 = caps.get(2).map_or(Some(0), |m| m.as_str().parse().ok()).unwrap_or(99);
            let pm = caps.get(3).is_some_and(|s| s.as_str() == "pm");
            if (1..=12).contains(&h) {
                h = match (h, pm) {
                    (12, false) => 0,
                    (12, true) => 12,
                    (h, true) => h + 12,
                    (h, false) => h,
                };
            } else {
                h = 99;
            }
            NaiveTime::from_hms_opt(h, m, 0)
        } else {
            let h: u32 = caps.get(4).map_or(99, |h| h.as_str().parse().unwrap_or(99));
            let m: u32 = caps.get(5).map_or(99, |m| m.as_str().parse().unwrap_or(99));
            NaiveTime::from_hms_opt(h, m, 0)
        };
        if let Some(t) = parsed {
            times.insert(t);
        }
    }
    times.into_iter().collect()
}

/// Daily dose times for a free-text frequency. A frequency that is only
/// as-needed yields no times; an as-needed clause next to a scheduled one is
/// ignored. Unreadable frequencies fall back to a single morning dose.
pub fn parse_frequency(frequency: &str) -> Vec<NaiveTime> {
    let normalized = frequency
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();

    if let Some(times) = table_lookup(&normalized) {
        return times;
    }

    if let Some(caps) = DOSE_PATTERN.captures(&normalized) {
        if let Some(times) = table_lookup(&caps[1]) {
            return times;
        }
    }

    let explicit = explicit_clock_times(&normalized);
    if !explicit.is_empty() {
        return explicit;
    }

    let scheduled = scheduled_clauses(&normalized);
    for (pattern, times) in KEYWORDS.iter() {
        if pattern.is_match(&scheduled) {
            return to_times(times);
        }
    }

    if AS_NEEDED.is_match(&normalized) {
        return Vec::new();
    }

    tracing::warn!(frequency, "Could not parse medication frequency, defaulting to once daily");
    vec![hm(FALLBACK_TIME)]
}

// ═══════════════════════════════════════════
// Compilation
// ═══════════════════════════════════════════

/// Compile the rule specs for a plan. Output is sorted and de-duplicated, so
/// two compilations of the same inputs compare equal element by element.
pub fn compile_rules(plan: &MedicationPlan, monitoring: &MonitoringRequirements) -> Vec<RuleSpec> {
    let mut specs = BTreeSet::new();

    for med in &plan.medications {
        for time in &med.times {
            specs.insert(RuleSpec {
                scheduled_time: *time,
                kind: ObligationKind::Medication,
                medication_name: Some(med.name.clone()),
            });
        }
    }

    let vitals = [
        (monitoring.weight, ObligationKind::Weight, WEIGHT_TIME),
        (monitoring.bp, ObligationKind::BloodPressure, BP_TIME),
        (monitoring.symptom_check, ObligationKind::SymptomCheck, SYMPTOM_CHECK_TIME),
    ];
    for (required, kind, time) in vitals {
        if required {
            specs.insert(RuleSpec {
                scheduled_time: hm(time),
                kind,
                medication_name: None,
            });
        }
    }

    specs.into_iter().collect()
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RecompileOutcome {
    /// The compiled rules match the set already in force.
    Unchanged { rule_set: ReminderRuleSet },
    /// A new version was written, effective from the given date.
    Created { rule_set: ReminderRuleSet },
}

impl RecompileOutcome {
    pub fn rule_set(&self) -> &ReminderRuleSet {
        match self {
            RecompileOutcome::Unchanged { rule_set } | RecompileOutcome::Created { rule_set } => rule_set,
        }
    }
}

/// Recompile a patient's rules from the stored plan. A new rule set is written
/// only when the compiled rules differ from the set in force on `effective_from`.
pub fn recompile(
    conn: &Connection,
    patient_id: &Uuid,
    effective_from: NaiveDate,
    now: NaiveDateTime,
) -> Result<RecompileOutcome, EngineError> {
    let tx = db::immediate_transaction(conn)?;
    db::require_patient(&tx, patient_id)?;
    let care_plan = db::require_care_plan(&tx, patient_id)?;
    let medication_plan = db::get_medication_plan(&tx, patient_id)?;
    let compiled = compile_rules(&medication_plan, &care_plan.monitoring);

    if let Some(current) = db::rule_set_in_force(&tx, patient_id, effective_from)? {
        if current.specs() == compiled {
            tracing::debug!(%patient_id, version = current.version, "Reminder rules unchanged");
            return Ok(RecompileOutcome::Unchanged { rule_set: current });
        }
    }

    let rule_set = db::insert_rule_set(&tx, patient_id, effective_from, &now, &compiled)?;
    tx.commit().map_err(DatabaseError::from)?;
    tracing::info!(
        %patient_id,
        version = rule_set.version,
        rules = rule_set.rules.len(),
        %effective_from,
        "Reminder rule set created"
    );
    Ok(RecompileOutcome::Created { rule_set })
}

// ═══════════════════════════════════════════
// Due reminders
// ═══════════════════════════════════════════

fn obligation_fulfilled(
    conn: &Connection,
    patient_id: &Uuid,
    date: NaiveDate,
    key: &ObligationKey,
) -> Result<bool, DatabaseError> {
    Ok(match key {
        ObligationKey::Vital(kind) => db::latest_vital(conn, patient_id, date, *kind)?.is_some(),
        ObligationKey::Dose {
            medication_name,
            scheduled_time,
        } => db::latest_ack(conn, patient_id, date, medication_name, *scheduled_time)?.is_some(),
    })
}

/// Rules of active patients scheduled within `window` of `as_of` (same local
/// day) whose obligation has no ledger entry yet. Sorted by scheduled time.
pub fn due_reminders(
    conn: &Connection,
    as_of: NaiveDateTime,
    window: Duration,
) -> Result<Vec<DueReminder>, EngineError> {
    if window < Duration::zero() {
        return Err(EngineError::validation("window_minutes", "must not be negative"));
    }
    let date = as_of.date();
    let mut due = Vec::new();

    for patient in db::list_active_patients(conn)? {
        if date < patient.enrolled_on {
            continue;
        }
        let Some(rule_set) = db::rule_set_in_force(conn, &patient.id, date)? else {
            continue;
        };
        for rule in &rule_set.rules {
            let scheduled = date.and_time(rule.scheduled_time);
            let offset = scheduled - as_of;
            if offset.abs() > window {
                continue;
            }
            if obligation_fulfilled(conn, &patient.id, date, &rule.obligation_key())? {
                continue;
            }
            due.push(DueReminder {
                patient_id: patient.id,
                patient_name: patient.full_name.clone(),
                phone: patient.phone.clone(),
                kind: rule.kind,
                scheduled_time: rule.scheduled_time,
                medication_name: rule.medication_name.clone(),
                minutes_until_due: offset.num_minutes(),
            });
        }
    }

    due.sort_by(|a, b| {
        a.scheduled_time
            .cmp(&b.scheduled_time)
            .then_with(|| a.patient_name.cmp(&b.patient_name))
    });
    Ok(due)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::test_support::*;
    use crate::db::sqlite::open_memory_database;
    use crate::models::{CarePlan, Medication, PhasePlan, RedFlags, VitalValue, WeightThresholds};

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn med(name: &str, frequency: &str) -> Medication {
        Medication {
            name: name.into(),
            dose: None,
            route: None,
            frequency: frequency.into(),
            times: parse_frequency(frequency),
            indication: None,
        }
    }

    #[test]
    fn table_frequencies() {
        assert_eq!(parse_frequency("1-0-1"), vec![t(8, 0), t(21, 0)]);
        assert_eq!(parse_frequency("BD"), vec![t(8, 0), t(21, 0)]);
        assert_eq!(parse_frequency("  Twice   daily "), vec![t(8, 0), t(21, 0)]);
        assert_eq!(parse_frequency("tds"), vec![t(8, 0), t(14, 0), t(21, 0)]);
        assert_eq!(parse_frequency("qid"), vec![t(6, 0), t(12, 0), t(18, 0), t(22, 0)]);
        assert_eq!(parse_frequency("at night"), vec![t(21, 0)]);
        assert_eq!(parse_frequency("evening"), vec![t(18, 0)]);
    }

    #[test]
    fn as_needed_has_no_times() {
        assert!(parse_frequency("sos").is_empty());
        assert!(parse_frequency("PRN").is_empty());
        assert!(parse_frequency("1 tab sos for chest pain").is_empty());
        assert!(parse_frequency("as needed").is_empty());
        assert!(parse_frequency("sos if breathless at night").is_empty());
    }

    #[test]
    fn scheduled_dose_survives_as_needed_clause() {
        assert_eq!(parse_frequency("1 tab twice daily, sos if breathless"), vec![t(8, 0), t(21, 0)]);
        assert_eq!(parse_frequency("once daily, extra dose as needed"), vec![t(8, 0)]);
        assert_eq!(parse_frequency("at night and prn for pain"), vec![t(21, 0)]);
        assert_eq!(parse_frequency("sos; otherwise bd"), vec![t(8, 0), t(21, 0)]);
    }

    #[test]
    fn embedded_pattern_and_keywords() {
        assert_eq!(parse_frequency("1-1-1 after food"), vec![t(8, 0), t(14, 0), t(21, 0)]);
        assert_eq!(parse_frequency("twice daily after meals"), vec![t(8, 0), t(21, 0)]);
        assert_eq!(parse_frequency("one tablet at bedtime"), vec![t(21, 0)]);
    }

    #[test]
    fn explicit_clock_times_are_used() {
        assert_eq!(parse_frequency("at 07:15 and 19:45"), vec![t(7, 15), t(19, 45)]);
        assert_eq!(parse_frequency("8 pm"), vec![t(20, 0)]);
        assert_eq!(parse_frequency("12 am"), vec![t(0, 0)]);
    }

    #[test]
    fn unparseable_defaults_to_morning() {
        assert_eq!(parse_frequency("as advised by physician"), vec![t(8, 0)]);
        assert_eq!(parse_frequency(""), vec![t(8, 0)]);
    }

    #[test]
    fn compile_adds_canonical_vital_times() {
        let plan = MedicationPlan {
            medications: vec![med("Furosemide", "1-0-0"), med("GTN", "sos")],
        };
        let monitoring = MonitoringRequirements {
            weight: true,
            bp: true,
            symptom_check: true,
        };
        let specs = compile_rules(&plan, &monitoring);
        let summary: Vec<_> = specs
            .iter()
            .map(|s| (s.scheduled_time, s.kind, s.medication_name.clone()))
            .collect();
        assert_eq!(
            summary,
            vec![
                (t(7, 30), ObligationKind::Weight, None),
                (t(8, 0), ObligationKind::Medication, Some("Furosemide".into())),
                (t(8, 30), ObligationKind::BloodPressure, None),
                (t(19, 0), ObligationKind::SymptomCheck, None),
            ]
        );
    }

    #[test]
    fn compile_is_order_independent_and_deduplicated() {
        let monitoring = MonitoringRequirements::default();
        let a = MedicationPlan {
            medications: vec![med("A", "bd"), med("B", "od"), med("A", "1-0-1")],
        };
        let b = MedicationPlan {
            medications: vec![med("B", "od"), med("A", "1-0-1")],
        };
        assert_eq!(compile_rules(&a, &monitoring), compile_rules(&b, &monitoring));
        assert_eq!(compile_rules(&a, &monitoring).len(), 5);
    }

    fn seed_plan(conn: &Connection, patient_id: &Uuid, start: NaiveDate, plan: &MedicationPlan) {
        let care_plan = CarePlan {
            start_date: start,
            end_date: start + Duration::days(90),
            phases: PhasePlan {
                days_0_7: vec![],
                days_8_30: vec![],
                days_31_90: vec![],
            },
            monitoring: MonitoringRequirements::default(),
            red_flags: RedFlags {
                yellow_zone: vec![],
                red_zone: vec![],
            },
            thresholds: WeightThresholds::default(),
            trigger_action_rules: vec![],
            discharge_advice: vec![],
            milestones: vec![],
        };
        db::insert_care_plan(conn, patient_id, &care_plan, &at(start, 9, 0)).unwrap();
        db::insert_medication_plan(conn, patient_id, plan).unwrap();
    }

    #[test]
    fn recompile_twice_writes_one_set() {
        let conn = open_memory_database().unwrap();
        let start = date(2025, 3, 1);
        let p = make_patient(&conn, "+919800000001", start);
        seed_plan(&conn, &p.id, start, &MedicationPlan { medications: vec![med("Furosemide", "bd")] });

        let first = recompile(&conn, &p.id, start, at(start, 9, 0)).unwrap();
        assert!(matches!(first, RecompileOutcome::Created { .. }));
        let second = recompile(&conn, &p.id, start, at(start, 9, 5)).unwrap();
        assert!(matches!(second, RecompileOutcome::Unchanged { .. }));
        assert_eq!(first.rule_set().specs(), second.rule_set().specs());
        assert_eq!(db::list_rule_sets(&conn, &p.id).unwrap().len(), 1);
    }

    #[test]
    fn recompile_unknown_patient_is_not_found() {
        let conn = open_memory_database().unwrap();
        let err = recompile(&conn, &Uuid::new_v4(), date(2025, 3, 1), at(date(2025, 3, 1), 9, 0)).unwrap_err();
        assert!(matches!(err, EngineError::NotFound { .. }));
    }

    #[test]
    fn due_reminders_skip_fulfilled_obligations() {
        let conn = open_memory_database().unwrap();
        let start = date(2025, 3, 1);
        let p = make_patient(&conn, "+919800000001", start);
        seed_plan(&conn, &p.id, start, &MedicationPlan { medications: vec![med("Furosemide", "1-0-0")] });
        recompile(&conn, &p.id, start, at(start, 9, 0)).unwrap();

        let day = date(2025, 3, 2);
        let due = due_reminders(&conn, at(day, 7, 45), Duration::minutes(30)).unwrap();
        let kinds: Vec<_> = due.iter().map(|d| d.kind).collect();
        assert_eq!(kinds, vec![ObligationKind::Weight, ObligationKind::Medication]);
        assert_eq!(due[0].minutes_until_due, -15);
        assert_eq!(due[1].minutes_until_due, 15);

        db::append_vital_log(&conn, &p.id, day, &VitalValue::Weight(70.0), &at(day, 7, 40)).unwrap();
        let due = due_reminders(&conn, at(day, 7, 45), Duration::minutes(30)).unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].medication_name.as_deref(), Some("Furosemide"));
    }
}
