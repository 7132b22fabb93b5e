//! Compliance scorer: per patient per day, derived from the ledger and the
//! rule set in force. Nothing here is stored; recomputation is deterministic.

use chrono::{Duration, NaiveDate};
use rusqlite::Connection;
use serde::Serialize;
use uuid::Uuid;

use crate::db;
use crate::error::EngineError;
use crate::models::{AckStatus, CarePhase, MedicationAck, ReminderRuleSet, RosterStatus, VitalKind};

/// Score at or above which a patient is "good".
pub const GOOD_THRESHOLD: f64 = 0.70;
/// Score at or above which a patient is "at_risk" rather than "critical".
pub const AT_RISK_THRESHOLD: f64 = 0.40;
/// Longest window `compliance_range` will compute in one call.
pub const MAX_RANGE_DAYS: i64 = 120;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComplianceRecord {
    pub date: NaiveDate,
    pub care_plan_day: i64,
    pub phase: CarePhase,
    pub medications_expected: u32,
    pub medications_taken: u32,
    pub medications_skipped: u32,
    pub weight_logged: bool,
    pub bp_logged: bool,
    pub symptom_check_done: bool,
    pub expected: u32,
    pub fulfilled: u32,
    pub compliance_score: f64,
    pub status: RosterStatus,
}

/// Which daily vitals have at least one ledger entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VitalsLogged {
    pub weight: bool,
    pub bp: bool,
    pub symptom_check: bool,
}

/// Counts for one day before they are turned into a score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DayTally {
    pub medications_expected: u32,
    pub medications_taken: u32,
    pub medications_skipped: u32,
    pub expected: u32,
    pub fulfilled: u32,
}

/// `fulfilled / max(expected, 1)`, bounded to [0, 1] and rounded to 2 decimals.
pub fn compute_score(fulfilled: u32, expected: u32) -> f64 {
    let raw = f64::from(fulfilled) / f64::from(expected.max(1));
    (raw.clamp(0.0, 1.0) * 100.0).round() / 100.0
}

pub fn status_for(score: f64) -> RosterStatus {
    if score >= GOOD_THRESHOLD {
        RosterStatus::Good
    } else if score >= AT_RISK_THRESHOLD {
        RosterStatus::AtRisk
    } else {
        RosterStatus::Critical
    }
}

/// Count expected and fulfilled obligations for one day. `acks` must already be
/// the latest ack per dose.
pub fn tally_day(
    rule_set: Option<&ReminderRuleSet>,
    acks: &[MedicationAck],
    logged: VitalsLogged,
) -> DayTally {
    let Some(rule_set) = rule_set else {
        return DayTally::default();
    };
    let mut tally = DayTally {
        expected: rule_set.rules.len() as u32,
        ..DayTally::default()
    };

    for rule in rule_set.medication_rules() {
        tally.medications_expected += 1;
        let ack = acks.iter().find(|a| {
            a.scheduled_time == rule.scheduled_time
                && rule
                    .medication_name
                    .as_deref()
                    .is_some_and(|n| n.eq_ignore_ascii_case(&a.medication_name))
        });
        match ack.map(|a| a.status) {
            Some(AckStatus::Taken) => {
                tally.medications_taken += 1;
                tally.fulfilled += 1;
            }
            Some(AckStatus::Skipped) => tally.medications_skipped += 1,
            None => {}
        }
    }

    for (kind, done) in [
        (VitalKind::Weight, logged.weight),
        (VitalKind::BloodPressure, logged.bp),
        (VitalKind::SymptomCheck, logged.symptom_check),
    ] {
        if done && rule_set.requires(kind) {
            tally.fulfilled += 1;
        }
    }

    tally
}

/// Compliance for one patient on one day.
pub fn compliance_for(
    conn: &Connection,
    patient_id: &Uuid,
    date: NaiveDate,
) -> Result<ComplianceRecord, EngineError> {
    let patient = db::require_patient(conn, patient_id)?;
    let rule_set = db::rule_set_in_force(conn, patient_id, date)?;
    let acks = db::latest_acks_for_day(conn, patient_id, date)?;
    let logged = VitalsLogged {
        weight: db::latest_vital(conn, patient_id, date, VitalKind::Weight)?.is_some(),
        bp: db::latest_vital(conn, patient_id, date, VitalKind::BloodPressure)?.is_some(),
        symptom_check: db::latest_vital(conn, patient_id, date, VitalKind::SymptomCheck)?.is_some(),
    };

    let tally = tally_day(rule_set.as_ref(), &acks, logged);
    let score = compute_score(tally.fulfilled, tally.expected);

    Ok(ComplianceRecord {
        date,
        care_plan_day: patient.care_plan_day(date),
        phase: patient.phase_on(date),
        medications_expected: tally.medications_expected,
        medications_taken: tally.medications_taken,
        medications_skipped: tally.medications_skipped,
        weight_logged: logged.weight,
        bp_logged: logged.bp,
        symptom_check_done: logged.symptom_check,
        expected: tally.expected,
        fulfilled: tally.fulfilled,
        compliance_score: score,
        status: status_for(score),
    })
}

/// One record per day over `[from, to]`, oldest first.
pub fn compliance_range(
    conn: &Connection,
    patient_id: &Uuid,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<Vec<ComplianceRecord>, EngineError> {
    if from > to {
        return Err(EngineError::validation("from", "range start is after its end"));
    }
    if (to - from).num_days() >= MAX_RANGE_DAYS {
        return Err(EngineError::validation(
            "days",
            format!("at most {MAX_RANGE_DAYS} days per request"),
        ));
    }
    let mut records = Vec::new();
    let mut day = from;
    while day <= to {
        records.push(compliance_for(conn, patient_id, day)?);
        day += Duration::days(1);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::test_support::*;
    use crate::db::sqlite::open_memory_database;
    use crate::models::{ObligationKind, RuleSpec, VitalValue};
    use chrono::NaiveTime;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn dose(name: &str, time: NaiveTime) -> RuleSpec {
        RuleSpec {
            scheduled_time: time,
            kind: ObligationKind::Medication,
            medication_name: Some(name.into()),
        }
    }

    fn vital(kind: ObligationKind, time: NaiveTime) -> RuleSpec {
        RuleSpec {
            scheduled_time: time,
            kind,
            medication_name: None,
        }
    }

    #[test]
    fn score_rounding_and_bounds() {
        assert_eq!(compute_score(3, 4), 0.75);
        assert_eq!(compute_score(1, 3), 0.33);
        assert_eq!(compute_score(2, 3), 0.67);
        assert_eq!(compute_score(0, 0), 0.0);
        assert_eq!(compute_score(5, 4), 1.0);
    }

    #[test]
    fn status_thresholds() {
        assert_eq!(status_for(0.75), RosterStatus::Good);
        assert_eq!(status_for(0.70), RosterStatus::Good);
        assert_eq!(status_for(0.69), RosterStatus::AtRisk);
        assert_eq!(status_for(0.40), RosterStatus::AtRisk);
        assert_eq!(status_for(0.39), RosterStatus::Critical);
    }

    #[test]
    fn three_of_four_is_good() {
        let conn = open_memory_database().unwrap();
        let start = date(2025, 3, 1);
        let p = make_patient(&conn, "+919800000001", start);
        let specs = vec![
            vital(ObligationKind::Weight, t(7, 30)),
            dose("Furosemide", t(8, 0)),
            dose("Furosemide", t(21, 0)),
            vital(ObligationKind::SymptomCheck, t(19, 0)),
        ];
        db::insert_rule_set(&conn, &p.id, start, &at(start, 9, 0), &specs).unwrap();

        let d = date(2025, 3, 3);
        db::append_vital_log(&conn, &p.id, d, &VitalValue::Weight(70.0), &at(d, 7, 35)).unwrap();
        db::append_medication_ack(&conn, &p.id, d, "Furosemide", t(8, 0), AckStatus::Taken, None, &at(d, 8, 5)).unwrap();
        db::append_medication_ack(&conn, &p.id, d, "Furosemide", t(21, 0), AckStatus::Skipped, None, &at(d, 21, 5)).unwrap();
        db::append_medication_ack(&conn, &p.id, d, "Furosemide", t(21, 0), AckStatus::Taken, None, &at(d, 21, 30)).unwrap();
        // BP is not a rule for this patient, so it earns nothing.
        db::append_vital_log(&conn, &p.id, d, &VitalValue::BloodPressure { systolic: 120.0, diastolic: 80.0 }, &at(d, 9, 0)).unwrap();

        let record = compliance_for(&conn, &p.id, d).unwrap();
        assert_eq!(record.expected, 4);
        assert_eq!(record.fulfilled, 3);
        assert_eq!(record.medications_taken, 2);
        assert_eq!(record.medications_skipped, 0);
        assert!(record.bp_logged);
        assert!(!record.symptom_check_done);
        assert_eq!(record.compliance_score, 0.75);
        assert_eq!(record.status, RosterStatus::Good);
        assert_eq!(record.care_plan_day, 2);
        assert_eq!(record.phase, CarePhase::Days0To7);

        // Recomputation is deterministic.
        assert_eq!(compliance_for(&conn, &p.id, d).unwrap(), record);
    }

    #[test]
    fn skipped_dose_is_not_fulfilled() {
        let conn = open_memory_database().unwrap();
        let start = date(2025, 3, 1);
        let p = make_patient(&conn, "+919800000001", start);
        db::insert_rule_set(&conn, &p.id, start, &at(start, 9, 0), &[dose("Bisoprolol", t(8, 0))]).unwrap();
        db::append_medication_ack(&conn, &p.id, start, "Bisoprolol", t(8, 0), AckStatus::Skipped, Some("nausea"), &at(start, 8, 30)).unwrap();
        let record = compliance_for(&conn, &p.id, start).unwrap();
        assert_eq!(record.medications_skipped, 1);
        assert_eq!(record.compliance_score, 0.0);
        assert_eq!(record.status, RosterStatus::Critical);
    }

    #[test]
    fn no_rules_scores_zero() {
        let tally = tally_day(None, &[], VitalsLogged { weight: true, bp: true, symptom_check: true });
        assert_eq!(tally, DayTally::default());
        assert_eq!(compute_score(tally.fulfilled, tally.expected), 0.0);
    }

    #[test]
    fn range_returns_one_record_per_day() {
        let conn = open_memory_database().unwrap();
        let start = date(2025, 3, 1);
        let p = make_patient(&conn, "+919800000001", start);
        db::insert_rule_set(&conn, &p.id, start, &at(start, 9, 0), &[vital(ObligationKind::Weight, t(7, 30))]).unwrap();
        let records = compliance_range(&conn, &p.id, start, date(2025, 3, 7)).unwrap();
        assert_eq!(records.len(), 7);
        assert!(records.iter().all(|r| (0.0..=1.0).contains(&r.compliance_score)));
        assert!(compliance_range(&conn, &p.id, date(2025, 3, 7), start).is_err());
    }
}
