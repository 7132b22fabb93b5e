use chrono::{Duration, NaiveDate, NaiveDateTime};
use rusqlite::Connection;
use uuid::Uuid;

use super::detection::{
    closed_day, detect_red_flag, detect_weight_spikes, dose_days, missed_dose_trigger,
    missed_weight_trigger, overdue_doses,
};
use super::store;
use super::types::{EventOutcome, SweepCounts};
use crate::careplan::DEFAULT_RED_ZONE;
use crate::config::EscalationConfig;
use crate::db;
use crate::error::EngineError;
use crate::models::{
    AckStatus, Escalation, MedicationAck, Patient, Resolution, TriggerType, VitalKind, VitalLog,
    WeightThresholds, RESOLUTION_SUPERSEDED,
};

/// Longest free-text field accepted on a resolution.
const MAX_RESOLUTION_LEN: usize = 2000;

/// Escalation engine over one connection. Never reads the wall clock: every
/// entry point takes the instant it should act at.
pub struct EscalationEngine<'a> {
    conn: &'a Connection,
    config: EscalationConfig,
}

impl<'a> EscalationEngine<'a> {
    pub fn new(conn: &'a Connection, config: EscalationConfig) -> Self {
        Self { conn, config }
    }

    pub fn config(&self) -> &EscalationConfig {
        &self.config
    }

    // ═══════════════════════════════════════════
    // Per-event path
    // ═══════════════════════════════════════════

    /// Run the checks a new vital reading can fire, then close missed-weight
    /// alerts the reading satisfies.
    pub fn on_vital_logged(
        &self,
        log: &VitalLog,
        at: NaiveDateTime,
    ) -> Result<EventOutcome, EngineError> {
        let mut outcome = EventOutcome::default();
        match log.kind {
            VitalKind::Weight => {
                let thresholds = db::get_care_plan(self.conn, &log.patient_id)?
                    .map(|plan| plan.thresholds)
                    .unwrap_or_default();
                self.check_weight_spikes(log, &thresholds, at, &mut outcome)?;

                outcome.auto_resolved = store::resolve_matching(
                    self.conn,
                    &log.patient_id,
                    &[TriggerType::MissedWeight, TriggerType::ConsecutiveMissedWeight],
                    false,
                    &Resolution::patient_action(format!("Weight logged for {}", log.date)),
                    at,
                )?;
            }
            VitalKind::SymptomCheck => {
                let red_zone = db::get_care_plan(self.conn, &log.patient_id)?
                    .map(|plan| plan.red_flags.red_zone)
                    .filter(|zone| !zone.is_empty())
                    .unwrap_or_else(|| DEFAULT_RED_ZONE.iter().map(|s| s.to_string()).collect());
                if let Some(trigger) = detect_red_flag(log, &red_zone, self.config.red_zone_match) {
                    outcome.record(store::raise(self.conn, &trigger, at)?);
                }
            }
            VitalKind::BloodPressure => {}
        }
        Ok(outcome)
    }

    fn check_weight_spikes(
        &self,
        log: &VitalLog,
        thresholds: &WeightThresholds,
        at: NaiveDateTime,
        outcome: &mut EventOutcome,
    ) -> Result<(), EngineError> {
        let previous_day =
            db::latest_vital(self.conn, &log.patient_id, log.date - Duration::days(1), VitalKind::Weight)?;
        let week_ago =
            db::latest_vital(self.conn, &log.patient_id, log.date - Duration::days(7), VitalKind::Weight)?;
        for trigger in detect_weight_spikes(log, previous_day.as_ref(), week_ago.as_ref(), thresholds) {
            outcome.record(store::raise(self.conn, &trigger, at)?);
        }
        Ok(())
    }

    /// A taken dose closes each missed_medication alert whose every observed
    /// dose now has a taken ack.
    pub fn on_medication_acked(
        &self,
        ack: &MedicationAck,
        at: NaiveDateTime,
    ) -> Result<EventOutcome, EngineError> {
        let mut outcome = EventOutcome::default();
        if ack.status != AckStatus::Taken {
            return Ok(outcome);
        }

        for esc in db::list_patient_escalations(self.conn, &ack.patient_id, true)? {
            if esc.trigger_type != TriggerType::MissedMedication {
                continue;
            }
            if !self.all_observed_doses_taken(&esc)? {
                continue;
            }
            let resolution = Resolution::patient_action(format!(
                "{} taken",
                ack.obligation_key()
            ));
            match store::resolve(self.conn, &esc.id, &resolution, at) {
                Ok(resolved) => outcome.auto_resolved.push(resolved),
                // Closed by someone else in the meantime.
                Err(EngineError::Conflict(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(outcome)
    }

    fn all_observed_doses_taken(&self, esc: &Escalation) -> Result<bool, EngineError> {
        let observations = db::list_observations(self.conn, &esc.id)?;
        for obs in &observations {
            let acks = db::latest_acks_for_day(self.conn, &esc.patient_id, obs.observed_on)?;
            let taken = acks.iter().any(|a| {
                a.status == AckStatus::Taken && a.obligation_key().storage_key() == obs.observation_key
            });
            if !taken {
                return Ok(false);
            }
        }
        Ok(!observations.is_empty())
    }

    // ═══════════════════════════════════════════
    // Sweep path
    // ═══════════════════════════════════════════

    /// Check every active patient for missed weights and overdue doses as of
    /// `as_of` (patient-local). Safe to re-run: observations already recorded
    /// are no-ops.
    pub fn sweep(&self, as_of: NaiveDateTime) -> Result<SweepCounts, EngineError> {
        let patients = db::list_active_patients(self.conn)?;
        let mut counts = SweepCounts::default();
        for patient in &patients {
            counts.checked += 1;
            if let Err(e) = self.sweep_patient(patient, as_of, &mut counts) {
                counts.failed += 1;
                tracing::error!(patient_id = %patient.id, error = %e, "Escalation sweep failed for patient");
            }
        }
        tracing::info!(
            %as_of,
            checked = counts.checked,
            opened = counts.opened,
            absorbed = counts.absorbed,
            superseded = counts.superseded,
            failed = counts.failed,
            "Escalation sweep complete"
        );
        Ok(counts)
    }

    pub fn sweep_patient(
        &self,
        patient: &Patient,
        as_of: NaiveDateTime,
        counts: &mut SweepCounts,
    ) -> Result<(), EngineError> {
        self.check_missed_weight(patient, as_of, counts)?;
        self.check_missed_doses(patient, as_of, counts)
    }

    fn weight_missed(&self, patient_id: &Uuid, day: NaiveDate) -> Result<bool, EngineError> {
        let required = db::rule_set_in_force(self.conn, patient_id, day)?
            .is_some_and(|set| set.requires(VitalKind::Weight));
        if !required {
            return Ok(false);
        }
        Ok(db::latest_vital(self.conn, patient_id, day, VitalKind::Weight)?.is_none())
    }

    fn check_missed_weight(
        &self,
        patient: &Patient,
        as_of: NaiveDateTime,
        counts: &mut SweepCounts,
    ) -> Result<(), EngineError> {
        let Some(day) = closed_day(as_of, self.config.weight_deadline, patient.enrolled_on) else {
            return Ok(());
        };
        if !self.weight_missed(&patient.id, day)? {
            return Ok(());
        }

        let previous = day - Duration::days(1);
        let previous_missed = previous >= patient.enrolled_on && self.weight_missed(&patient.id, previous)?;
        let trigger = missed_weight_trigger(patient.id, day, previous_missed);
        counts.record(&store::raise(self.conn, &trigger, as_of)?);

        if previous_missed {
            let superseded = store::resolve_matching(
                self.conn,
                &patient.id,
                &[TriggerType::MissedWeight],
                true,
                &Resolution {
                    resolution_type: RESOLUTION_SUPERSEDED.into(),
                    action_taken: format!("Folded into {}", TriggerType::ConsecutiveMissedWeight),
                    note: None,
                },
                as_of,
            )?;
            counts.superseded += superseded.len();
        }
        Ok(())
    }

    fn check_missed_doses(
        &self,
        patient: &Patient,
        as_of: NaiveDateTime,
        counts: &mut SweepCounts,
    ) -> Result<(), EngineError> {
        let grace = self.config.medication_grace;
        for day in dose_days(as_of, patient.enrolled_on) {
            let Some(rule_set) = db::rule_set_in_force(self.conn, &patient.id, day)? else {
                continue;
            };
            let acks = db::latest_acks_for_day(self.conn, &patient.id, day)?;
            for rule in overdue_doses(&rule_set, &acks, day, as_of, grace) {
                let trigger = missed_dose_trigger(patient.id, day, rule, grace);
                counts.record(&store::raise(self.conn, &trigger, as_of)?);
            }
        }
        Ok(())
    }

    // ═══════════════════════════════════════════
    // Lifecycle
    // ═══════════════════════════════════════════

    pub fn acknowledge(&self, id: &Uuid, at: NaiveDateTime) -> Result<Escalation, EngineError> {
        store::acknowledge(self.conn, id, at)
    }

    pub fn resolve(
        &self,
        id: &Uuid,
        resolution: Resolution,
        at: NaiveDateTime,
    ) -> Result<Escalation, EngineError> {
        let resolution = validate_resolution(resolution)?;
        store::resolve(self.conn, id, &resolution, at)
    }
}

fn validate_resolution(resolution: Resolution) -> Result<Resolution, EngineError> {
    let resolution_type = resolution.resolution_type.trim().to_string();
    let action_taken = resolution.action_taken.trim().to_string();
    if resolution_type.is_empty() {
        return Err(EngineError::validation("resolution_type", "must not be empty"));
    }
    let note = resolution
        .note
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty());
    for (field, value) in [
        ("resolution_type", Some(&resolution_type)),
        ("action_taken", Some(&action_taken)),
        ("note", note.as_ref()),
    ] {
        if value.is_some_and(|v| v.len() > MAX_RESOLUTION_LEN) {
            return Err(EngineError::validation(field, "too long"));
        }
    }
    Ok(Resolution {
        resolution_type,
        action_taken,
        note,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::test_support::*;
    use crate::db::sqlite::open_memory_database;
    use crate::ledger::{ack_medication, log_vital, AckRequest};
    use crate::models::{EscalationStatus, ObligationKind, RuleSpec, VitalValue, RESOLUTION_PATIENT_ACTION};
    use chrono::NaiveTime;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn setup(conn: &Connection) -> Patient {
        let start = date(2025, 3, 1);
        let p = make_patient(conn, "+919800000001", start);
        let specs = vec![
            RuleSpec { scheduled_time: t(7, 30), kind: ObligationKind::Weight, medication_name: None },
            RuleSpec {
                scheduled_time: t(8, 0),
                kind: ObligationKind::Medication,
                medication_name: Some("Furosemide".into()),
            },
            RuleSpec { scheduled_time: t(19, 0), kind: ObligationKind::SymptomCheck, medication_name: None },
        ];
        db::insert_rule_set(conn, &p.id, start, &at(start, 9, 0), &specs).unwrap();
        p
    }

    fn engine(conn: &Connection) -> EscalationEngine<'_> {
        EscalationEngine::new(conn, EscalationConfig::default())
    }

    fn weigh(conn: &Connection, p: &Patient, day: NaiveDate, kg: f64) -> EventOutcome {
        let log = log_vital(conn, &p.id, day, VitalValue::Weight(kg), at(day, 7, 30)).unwrap();
        engine(conn).on_vital_logged(&log, at(day, 7, 30)).unwrap()
    }

    fn open_of(conn: &Connection, p: &Patient, trigger: TriggerType) -> Option<Escalation> {
        db::get_open_escalation(conn, &p.id, trigger).unwrap()
    }

    #[test]
    fn day_over_day_gain_opens_one_critical_spike() {
        let conn = open_memory_database().unwrap();
        let p = setup(&conn);
        assert!(weigh(&conn, &p, date(2025, 3, 1), 70.0).raised.is_empty());
        let outcome = weigh(&conn, &p, date(2025, 3, 2), 71.2);
        assert_eq!(outcome.raised.len(), 1);

        let esc = open_of(&conn, &p, TriggerType::WeightSpike24h).unwrap();
        assert_eq!(esc.level, 2);
        assert!(open_of(&conn, &p, TriggerType::WeightSpike7d).is_none());
        assert_eq!(db::count_active_escalations(&conn, &p.id).unwrap(), 1);
    }

    #[test]
    fn red_zone_symptom_opens_red_flag() {
        let conn = open_memory_database().unwrap();
        let p = setup(&conn);
        let day = date(2025, 3, 2);
        let value = VitalValue::SymptomCheck { symptoms: vec!["Chest pain".into()] };
        let log = log_vital(&conn, &p.id, day, value, at(day, 19, 0)).unwrap();
        let outcome = engine(&conn).on_vital_logged(&log, at(day, 19, 0)).unwrap();
        assert_eq!(outcome.raised.len(), 1);
        assert_eq!(outcome.raised[0].trigger_type, TriggerType::RedFlag);
    }

    #[test]
    fn two_missed_days_become_one_consecutive_alert() {
        let conn = open_memory_database().unwrap();
        let p = setup(&conn);
        let engine = engine(&conn);

        let day1 = engine.sweep(at(date(2025, 3, 1), 23, 59)).unwrap();
        assert_eq!(day1.opened, 2); // missed_weight + missed Furosemide
        assert!(open_of(&conn, &p, TriggerType::MissedWeight).is_some());

        let day2 = engine.sweep(at(date(2025, 3, 2), 23, 59)).unwrap();
        assert_eq!(day2.superseded, 1);
        assert!(open_of(&conn, &p, TriggerType::MissedWeight).is_none());
        let consecutive = open_of(&conn, &p, TriggerType::ConsecutiveMissedWeight).unwrap();
        assert_eq!(consecutive.level, 2);
        assert_eq!(consecutive.observation_count, 1);

        let superseded = db::list_patient_escalations(&conn, &p.id, false)
            .unwrap()
            .into_iter()
            .find(|e| e.trigger_type == TriggerType::MissedWeight)
            .unwrap();
        assert_eq!(superseded.status, EscalationStatus::Resolved);
        assert_eq!(superseded.resolution_type.as_deref(), Some(RESOLUTION_SUPERSEDED));
    }

    #[test]
    fn rerunning_a_sweep_changes_nothing() {
        let conn = open_memory_database().unwrap();
        let p = setup(&conn);
        let engine = engine(&conn);
        let as_of = at(date(2025, 3, 2), 10, 0);

        let first = engine.sweep(as_of).unwrap();
        assert_eq!(first.checked, 1);
        assert_eq!(first.opened, 2);
        let second = engine.sweep(as_of).unwrap();
        assert_eq!((second.opened, second.absorbed, second.superseded), (0, 0, 0));

        let open = open_of(&conn, &p, TriggerType::MissedWeight).unwrap();
        engine
            .resolve(
                &open.id,
                Resolution {
                    resolution_type: "called_patient".into(),
                    action_taken: "Reminded patient".into(),
                    note: None,
                },
                as_of,
            )
            .unwrap();
        let third = engine.sweep(as_of).unwrap();
        assert_eq!(third.opened, 0);
        assert!(open_of(&conn, &p, TriggerType::MissedWeight).is_none());
    }

    #[test]
    fn sweep_before_deadline_checks_yesterday_only() {
        let conn = open_memory_database().unwrap();
        let p = setup(&conn);
        // Day 0 is still open before its deadline; the dose is not yet past grace.
        let counts = engine(&conn).sweep(at(date(2025, 3, 1), 8, 30)).unwrap();
        assert_eq!(counts.opened, 0);
        assert_eq!(db::count_active_escalations(&conn, &p.id).unwrap(), 0);
    }

    #[test]
    fn logging_weight_resolves_missed_weight() {
        let conn = open_memory_database().unwrap();
        let p = setup(&conn);
        engine(&conn).sweep(at(date(2025, 3, 2), 6, 0)).unwrap();
        let missed = open_of(&conn, &p, TriggerType::MissedWeight).unwrap();
        engine(&conn).acknowledge(&missed.id, at(date(2025, 3, 2), 6, 30)).unwrap();

        let outcome = weigh(&conn, &p, date(2025, 3, 2), 70.0);
        assert_eq!(outcome.auto_resolved.len(), 1);
        assert_eq!(outcome.auto_resolved[0].resolution_type.as_deref(), Some(RESOLUTION_PATIENT_ACTION));
        assert!(open_of(&conn, &p, TriggerType::MissedWeight).is_none());
        // Yesterday's Furosemide is still unaccounted for.
        assert!(open_of(&conn, &p, TriggerType::MissedMedication).is_some());
        assert_eq!(db::count_active_escalations(&conn, &p.id).unwrap(), 1);
    }

    #[test]
    fn late_dose_is_caught_by_the_next_days_sweeps() {
        let conn = open_memory_database().unwrap();
        let start = date(2025, 3, 1);
        let p = make_patient(&conn, "+919800000001", start);
        let specs = vec![RuleSpec {
            scheduled_time: t(23, 30),
            kind: ObligationKind::Medication,
            medication_name: Some("Metoprolol".into()),
        }];
        db::insert_rule_set(&conn, &p.id, start, &at(start, 9, 0), &specs).unwrap();
        let engine = engine(&conn);

        assert_eq!(engine.sweep(at(start, 23, 59)).unwrap().opened, 0);
        let next = date(2025, 3, 2);
        assert_eq!(engine.sweep(at(next, 0, 45)).unwrap().opened, 1);
        let esc = open_of(&conn, &p, TriggerType::MissedMedication).unwrap();
        assert_eq!(esc.detail, "Metoprolol due at 23:30 not acknowledged within 60 minutes");

        // Later sweeps see the same observation again and change nothing.
        for as_of in [at(next, 6, 0), at(next, 12, 0)] {
            let counts = engine.sweep(as_of).unwrap();
            assert_eq!((counts.opened, counts.absorbed), (0, 0));
        }
        let observations = db::list_observations(&conn, &esc.id).unwrap();
        assert_eq!(observations.len(), 1);
        assert_eq!(observations[0].observed_on, start);
        assert_eq!(observations[0].observation_key, "metoprolol@23:30");
    }

    #[test]
    fn dose_overdue_after_the_last_sweep_is_not_lost() {
        let conn = open_memory_database().unwrap();
        let p = setup(&conn);
        let engine = engine(&conn);
        let start = date(2025, 3, 1);

        // Only sweep of day 0 ran before the 08:00 dose went overdue.
        assert_eq!(engine.sweep(at(start, 8, 30)).unwrap().opened, 0);
        engine.sweep(at(date(2025, 3, 2), 6, 0)).unwrap();
        let esc = open_of(&conn, &p, TriggerType::MissedMedication).unwrap();
        let observations = db::list_observations(&conn, &esc.id).unwrap();
        assert_eq!(observations.len(), 1);
        assert_eq!(observations[0].observed_on, start);
    }

    #[test]
    fn taking_the_missed_dose_resolves_missed_medication() {
        let conn = open_memory_database().unwrap();
        let p = setup(&conn);
        let day = date(2025, 3, 1);
        let counts = engine(&conn).sweep(at(day, 9, 15)).unwrap();
        assert_eq!(counts.opened, 1);
        assert!(open_of(&conn, &p, TriggerType::MissedMedication).is_some());

        let request = AckRequest {
            medication_name: "furosemide".into(),
            scheduled_time: "08:00".into(),
            status: AckStatus::Taken,
            skip_reason: None,
        };
        let ack = ack_medication(&conn, &p.id, day, &request, at(day, 9, 20)).unwrap();
        let outcome = engine(&conn).on_medication_acked(&ack, at(day, 9, 20)).unwrap();
        assert_eq!(outcome.auto_resolved.len(), 1);
        assert!(open_of(&conn, &p, TriggerType::MissedMedication).is_none());
    }

    #[test]
    fn skipped_dose_leaves_missed_medication_open() {
        let conn = open_memory_database().unwrap();
        let p = setup(&conn);
        let day = date(2025, 3, 1);
        engine(&conn).sweep(at(day, 9, 15)).unwrap();
        let request = AckRequest {
            medication_name: "Furosemide".into(),
            scheduled_time: "08:00".into(),
            status: AckStatus::Skipped,
            skip_reason: Some("dizzy".into()),
        };
        let ack = ack_medication(&conn, &p.id, day, &request, at(day, 9, 20)).unwrap();
        let outcome = engine(&conn).on_medication_acked(&ack, at(day, 9, 20)).unwrap();
        assert!(outcome.auto_resolved.is_empty());
        assert!(open_of(&conn, &p, TriggerType::MissedMedication).is_some());
    }

    #[test]
    fn resolution_requires_type() {
        let conn = open_memory_database().unwrap();
        let p = setup(&conn);
        engine(&conn).sweep(at(date(2025, 3, 2), 6, 0)).unwrap();
        let esc = open_of(&conn, &p, TriggerType::MissedWeight).unwrap();
        let blank = Resolution {
            resolution_type: "  ".into(),
            action_taken: "Called".into(),
            note: None,
        };
        let err = engine(&conn).resolve(&esc.id, blank, at(date(2025, 3, 2), 7, 0)).unwrap_err();
        assert!(matches!(err, EngineError::Validation { ref field, .. } if field == "resolution_type"));

        let type_only = Resolution {
            resolution_type: "called_patient".into(),
            action_taken: " ".into(),
            note: None,
        };
        let resolved = engine(&conn).resolve(&esc.id, type_only, at(date(2025, 3, 2), 7, 0)).unwrap();
        assert_eq!(resolved.status, EscalationStatus::Resolved);
        assert_eq!(resolved.resolution_type.as_deref(), Some("called_patient"));
        assert_eq!(resolved.action_taken, None);
    }

    #[test]
    fn inactive_patients_are_not_swept() {
        let conn = open_memory_database().unwrap();
        let p = setup(&conn);
        db::update_patient_status(&conn, &p.id, crate::models::PatientStatus::Discharged).unwrap();
        let counts = engine(&conn).sweep(at(date(2025, 3, 3), 10, 0)).unwrap();
        assert_eq!(counts.checked, 0);
    }
}
