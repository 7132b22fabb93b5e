//! Care-team and patient views assembled from the ledger, the scorer and the
//! escalation store. Read-only.

use std::collections::HashMap;

use chrono::{Duration, NaiveDate, NaiveTime};
use rusqlite::Connection;
use serde::Serialize;
use uuid::Uuid;

use crate::compliance::{compliance_for, compliance_range, ComplianceRecord};
use crate::db;
use crate::error::EngineError;
use crate::ledger::latest_for;
use crate::models::{
    AckStatus, CarePhase, CarePlan, ClinicalNote, Escalation, LedgerEntry, MedicationPlan,
    Milestone, ObligationKind, Patient, RosterStatus, VitalKind, VitalLog, VitalValue,
};

/// Default and maximum window for history views, in days.
pub const DEFAULT_HISTORY_DAYS: i64 = 7;
pub const MAX_HISTORY_DAYS: i64 = 90;

// ═══════════════════════════════════════════
// Today snapshot
// ═══════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ObligationState {
    Pending,
    Done,
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
pub struct ObligationStatus {
    pub kind: ObligationKind,
    #[serde(with = "crate::models::hhmm")]
    pub scheduled_time: NaiveTime,
    pub medication_name: Option<String>,
    pub dose: Option<String>,
    pub indication: Option<String>,
    pub status: ObligationState,
}

#[derive(Debug, Clone, Serialize)]
pub struct TodaySnapshot {
    pub patient: Patient,
    pub date: NaiveDate,
    pub care_plan_day: i64,
    pub phase: CarePhase,
    pub phase_tasks: Vec<String>,
    pub obligations: Vec<ObligationStatus>,
    pub latest_weight: Option<VitalValue>,
    pub latest_bp: Option<VitalValue>,
    pub milestones_today: Vec<Milestone>,
    pub next_appointment: Option<Milestone>,
    pub compliance: ComplianceRecord,
}

fn obligation_state(entry: Option<&LedgerEntry>) -> ObligationState {
    match entry {
        None => ObligationState::Pending,
        Some(LedgerEntry::Vital(_)) => ObligationState::Done,
        Some(LedgerEntry::Medication(ack)) => match ack.status {
            AckStatus::Taken => ObligationState::Done,
            AckStatus::Skipped => ObligationState::Skipped,
        },
    }
}

pub fn today_snapshot(
    conn: &Connection,
    patient_id: &Uuid,
    today: NaiveDate,
) -> Result<TodaySnapshot, EngineError> {
    let patient = db::require_patient(conn, patient_id)?;
    let care_plan = db::get_care_plan(conn, patient_id)?;
    let medication_plan = db::get_medication_plan(conn, patient_id)?;
    let phase = patient.phase_on(today);

    let mut obligations = Vec::new();
    if let Some(rule_set) = db::rule_set_in_force(conn, patient_id, today)? {
        for rule in &rule_set.rules {
            let entry = latest_for(conn, patient_id, today, &rule.obligation_key())?;
            let medication = rule
                .medication_name
                .as_deref()
                .and_then(|name| medication_plan.find(name));
            obligations.push(ObligationStatus {
                kind: rule.kind,
                scheduled_time: rule.scheduled_time,
                medication_name: rule.medication_name.clone(),
                dose: medication.and_then(|m| m.dose.clone()),
                indication: medication.and_then(|m| m.indication.clone()),
                status: obligation_state(entry.as_ref()),
            });
        }
    }
    obligations.sort_by(|a, b| {
        (a.scheduled_time, &a.medication_name).cmp(&(b.scheduled_time, &b.medication_name))
    });

    let latest_value = |kind: VitalKind| -> Result<Option<VitalValue>, EngineError> {
        Ok(db::latest_vital(conn, patient_id, today, kind)?.map(|log| log.value))
    };

    Ok(TodaySnapshot {
        date: today,
        care_plan_day: patient.care_plan_day(today),
        phase,
        phase_tasks: care_plan
            .as_ref()
            .map(|plan| plan.phases.tasks(phase).to_vec())
            .unwrap_or_default(),
        obligations,
        latest_weight: latest_value(VitalKind::Weight)?,
        latest_bp: latest_value(VitalKind::BloodPressure)?,
        milestones_today: care_plan
            .as_ref()
            .map(|plan| plan.milestones_on(today).cloned().collect())
            .unwrap_or_default(),
        next_appointment: care_plan
            .as_ref()
            .and_then(|plan| plan.next_appointment(today).cloned()),
        compliance: compliance_for(conn, patient_id, today)?,
        patient,
    })
}

// ═══════════════════════════════════════════
// Roster
// ═══════════════════════════════════════════

#[derive(Debug, Clone, Serialize)]
pub struct RosterEntry {
    pub patient_id: Uuid,
    pub full_name: String,
    pub phone: String,
    pub primary_diagnosis: Option<String>,
    pub care_plan_day: i64,
    pub phase: CarePhase,
    pub compliance_score: f64,
    pub status: RosterStatus,
    /// Open and acknowledged escalations.
    pub open_alert_count: i64,
}

fn urgency(status: RosterStatus) -> u8 {
    match status {
        RosterStatus::Critical => 0,
        RosterStatus::AtRisk => 1,
        RosterStatus::Good => 2,
    }
}

/// Active patients, most in need of attention first: critical, at_risk, good;
/// lower score first within a status.
pub fn roster(conn: &Connection, today: NaiveDate) -> Result<Vec<RosterEntry>, EngineError> {
    let mut entries = Vec::new();
    for patient in db::list_active_patients(conn)? {
        let compliance = compliance_for(conn, &patient.id, today)?;
        entries.push(RosterEntry {
            open_alert_count: db::count_active_escalations(conn, &patient.id)?,
            care_plan_day: compliance.care_plan_day,
            phase: compliance.phase,
            compliance_score: compliance.compliance_score,
            status: compliance.status,
            patient_id: patient.id,
            full_name: patient.full_name,
            phone: patient.phone,
            primary_diagnosis: patient.primary_diagnosis,
        });
    }
    entries.sort_by(|a, b| {
        urgency(a.status)
            .cmp(&urgency(b.status))
            .then(a.compliance_score.total_cmp(&b.compliance_score))
            .then_with(|| a.full_name.cmp(&b.full_name))
    });
    Ok(entries)
}

// ═══════════════════════════════════════════
// Alert queue
// ═══════════════════════════════════════════

#[derive(Debug, Clone, Serialize)]
pub struct AlertQueueEntry {
    #[serde(flatten)]
    pub escalation: Escalation,
    pub patient_name: String,
    pub patient_phone: Option<String>,
}

/// Open and acknowledged escalations, level descending then most recent first.
pub fn alert_queue(conn: &Connection) -> Result<Vec<AlertQueueEntry>, EngineError> {
    let mut patients: HashMap<Uuid, Option<Patient>> = HashMap::new();
    let mut queue = Vec::new();
    for escalation in db::list_active_escalations(conn)? {
        if !patients.contains_key(&escalation.patient_id) {
            let patient = db::get_patient(conn, &escalation.patient_id)?;
            patients.insert(escalation.patient_id, patient);
        }
        let patient = patients.get(&escalation.patient_id).and_then(Option::as_ref);
        queue.push(AlertQueueEntry {
            patient_name: patient
                .map(|p| p.full_name.clone())
                .unwrap_or_else(|| crate::registration::UNKNOWN_NAME.to_string()),
            patient_phone: patient.map(|p| p.phone.clone()),
            escalation,
        });
    }
    Ok(queue)
}

// ═══════════════════════════════════════════
// Drill-down and history
// ═══════════════════════════════════════════

#[derive(Debug, Clone, Serialize)]
pub struct PatientDetail {
    pub patient: Patient,
    pub care_plan: Option<CarePlan>,
    pub medication_plan: MedicationPlan,
    pub compliance_history: Vec<ComplianceRecord>,
    pub active_alerts: Vec<Escalation>,
    pub notes: Vec<ClinicalNote>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VitalsHistory {
    pub from: NaiveDate,
    pub to: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight: Option<Vec<VitalLog>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bp: Option<Vec<VitalLog>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symptom_check: Option<Vec<VitalLog>>,
}

pub fn validate_days(days: i64) -> Result<i64, EngineError> {
    if !(1..=MAX_HISTORY_DAYS).contains(&days) {
        return Err(EngineError::validation(
            "days",
            format!("must be between 1 and {MAX_HISTORY_DAYS}"),
        ));
    }
    Ok(days)
}

/// The `days`-long window ending on `today`, starting no earlier than enrollment.
/// `None` before enrollment.
pub fn history_window(patient: &Patient, today: NaiveDate, days: i64) -> Option<(NaiveDate, NaiveDate)> {
    let from = (today - Duration::days(days - 1)).max(patient.enrolled_on);
    (from <= today).then_some((from, today))
}

pub fn patient_detail(
    conn: &Connection,
    patient_id: &Uuid,
    today: NaiveDate,
    days: i64,
) -> Result<PatientDetail, EngineError> {
    let days = validate_days(days)?;
    let patient = db::require_patient(conn, patient_id)?;
    let compliance_history = match history_window(&patient, today, days) {
        Some((from, to)) => compliance_range(conn, patient_id, from, to)?,
        None => Vec::new(),
    };
    Ok(PatientDetail {
        care_plan: db::get_care_plan(conn, patient_id)?,
        medication_plan: db::get_medication_plan(conn, patient_id)?,
        compliance_history,
        active_alerts: db::list_patient_escalations(conn, patient_id, true)?,
        notes: db::list_clinical_notes(conn, patient_id)?,
        patient,
    })
}

/// Latest reading per day for each vital (or only `kind`) over the window.
pub fn vitals_history(
    conn: &Connection,
    patient_id: &Uuid,
    kind: Option<VitalKind>,
    today: NaiveDate,
    days: i64,
) -> Result<VitalsHistory, EngineError> {
    let days = validate_days(days)?;
    db::require_patient(conn, patient_id)?;
    let from = today - Duration::days(days - 1);
    let wanted = |k: VitalKind| kind.is_none() || kind == Some(k);
    let series = |k: VitalKind| -> Result<Option<Vec<VitalLog>>, EngineError> {
        if wanted(k) {
            Ok(Some(db::latest_vitals_in_range(conn, patient_id, k, from, today)?))
        } else {
            Ok(None)
        }
    };
    Ok(VitalsHistory {
        from,
        to: today,
        weight: series(VitalKind::Weight)?,
        bp: series(VitalKind::BloodPressure)?,
        symptom_check: series(VitalKind::SymptomCheck)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::test_support::*;
    use crate::db::sqlite::open_memory_database;
    use crate::escalation::store::raise;
    use crate::escalation::Trigger;
    use crate::models::{RuleSpec, TriggerType};

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn with_rules(conn: &Connection, phone: &str, start: NaiveDate) -> Patient {
        let p = make_patient(conn, phone, start);
        let specs = vec![
            RuleSpec { scheduled_time: t(7, 30), kind: ObligationKind::Weight, medication_name: None },
            RuleSpec {
                scheduled_time: t(8, 0),
                kind: ObligationKind::Medication,
                medication_name: Some("Furosemide".into()),
            },
        ];
        db::insert_rule_set(conn, &p.id, start, &at(start, 9, 0), &specs).unwrap();
        p
    }

    #[test]
    fn snapshot_marks_obligation_states() {
        let conn = open_memory_database().unwrap();
        let start = date(2025, 3, 1);
        let p = with_rules(&conn, "+919800000001", start);
        let today = date(2025, 3, 3);
        db::append_vital_log(&conn, &p.id, today, &VitalValue::Weight(70.4), &at(today, 7, 40)).unwrap();
        db::append_medication_ack(&conn, &p.id, today, "Furosemide", t(8, 0), AckStatus::Skipped, Some("nausea"), &at(today, 8, 10)).unwrap();

        let snap = today_snapshot(&conn, &p.id, today).unwrap();
        assert_eq!(snap.care_plan_day, 2);
        assert_eq!(snap.obligations.len(), 2);
        assert_eq!(snap.obligations[0].kind, ObligationKind::Weight);
        assert_eq!(snap.obligations[0].status, ObligationState::Done);
        assert_eq!(snap.obligations[1].status, ObligationState::Skipped);
        assert_eq!(snap.latest_weight, Some(VitalValue::Weight(70.4)));
        assert!(snap.latest_bp.is_none());
        assert_eq!(snap.compliance.fulfilled, 1);
    }

    #[test]
    fn roster_sorts_critical_first() {
        let conn = open_memory_database().unwrap();
        let start = date(2025, 3, 1);
        let good = with_rules(&conn, "+919800000001", start);
        let critical = with_rules(&conn, "+919800000002", start);
        let today = date(2025, 3, 2);
        db::append_vital_log(&conn, &good.id, today, &VitalValue::Weight(70.0), &at(today, 7, 30)).unwrap();
        db::append_medication_ack(&conn, &good.id, today, "Furosemide", t(8, 0), AckStatus::Taken, None, &at(today, 8, 5)).unwrap();

        raise(
            &conn,
            &Trigger::new(critical.id, TriggerType::MissedWeight, start, "weight", "No weight logged"),
            at(today, 0, 0),
        )
        .unwrap();

        let roster = roster(&conn, today).unwrap();
        assert_eq!(roster.len(), 2);
        assert_eq!(roster[0].patient_id, critical.id);
        assert_eq!(roster[0].status, RosterStatus::Critical);
        assert_eq!(roster[0].open_alert_count, 1);
        assert_eq!(roster[1].status, RosterStatus::Good);
        assert_eq!(roster[1].compliance_score, 1.0);
    }

    #[test]
    fn alert_queue_orders_by_level_and_names_patient() {
        let conn = open_memory_database().unwrap();
        let start = date(2025, 3, 1);
        let p = with_rules(&conn, "+919800000001", start);
        raise(&conn, &Trigger::new(p.id, TriggerType::MissedWeight, start, "weight", "missed"), at(start, 23, 59)).unwrap();
        raise(&conn, &Trigger::new(p.id, TriggerType::RedFlag, start, "seq:1", "chest pain"), at(start, 19, 0)).unwrap();

        let queue = alert_queue(&conn).unwrap();
        assert_eq!(queue.len(), 2);
        assert_eq!(queue[0].escalation.trigger_type, TriggerType::RedFlag);
        assert_eq!(queue[0].patient_name, p.full_name);
        let json = serde_json::to_value(&queue[0]).unwrap();
        assert_eq!(json["trigger_type"], "red_flag");
        assert_eq!(json["patient_name"], p.full_name.as_str());
    }

    #[test]
    fn drill_down_window_starts_at_enrollment() {
        let conn = open_memory_database().unwrap();
        let start = date(2025, 3, 1);
        let p = with_rules(&conn, "+919800000001", start);
        let detail = patient_detail(&conn, &p.id, date(2025, 3, 3), 7).unwrap();
        assert_eq!(detail.compliance_history.len(), 3);
        assert_eq!(detail.compliance_history[0].date, start);
        assert!(detail.active_alerts.is_empty());
        assert!(patient_detail(&conn, &p.id, date(2025, 3, 3), 0).is_err());
        assert!(patient_detail(&conn, &p.id, date(2025, 2, 20), 7).unwrap().compliance_history.is_empty());
    }

    #[test]
    fn vitals_history_filters_by_kind() {
        let conn = open_memory_database().unwrap();
        let start = date(2025, 3, 1);
        let p = with_rules(&conn, "+919800000001", start);
        for (offset, kg) in [(0, 70.0), (1, 70.5), (1, 70.8), (2, 71.0)] {
            let day = start + Duration::days(offset);
            db::append_vital_log(&conn, &p.id, day, &VitalValue::Weight(kg), &at(day, 7, 30)).unwrap();
        }
        let history = vitals_history(&conn, &p.id, Some(VitalKind::Weight), date(2025, 3, 3), 7).unwrap();
        let weights: Vec<_> = history.weight.unwrap().iter().filter_map(|l| l.value.weight_kg()).collect();
        assert_eq!(weights, vec![70.0, 70.8, 71.0]);
        assert!(history.bp.is_none());

        let all = vitals_history(&conn, &p.id, None, date(2025, 3, 3), 7).unwrap();
        assert_eq!(all.bp.map(|v| v.len()), Some(0));
    }
}
