//! Adherence ledger: validated, append-only patient submissions.
//!
//! Vitals and medication acks are never edited or deleted. The latest entry
//! by sequence number is authoritative for a (patient, day, obligation).

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rusqlite::Connection;
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use crate::db;
use crate::error::EngineError;
use crate::models::{
    AckStatus, LedgerEntry, MedicationAck, ObligationKey, VitalKind, VitalLog, VitalValue,
};

pub const WEIGHT_RANGE_KG: (f64, f64) = (20.0, 200.0);
pub const SYSTOLIC_RANGE: (f64, f64) = (60.0, 250.0);
pub const DIASTOLIC_RANGE: (f64, f64) = (30.0, 150.0);
const MAX_SYMPTOMS: usize = 20;
const MAX_TEXT_LEN: usize = 200;

/// A medication acknowledgment as submitted by the patient app.
#[derive(Debug, Clone, Deserialize)]
pub struct AckRequest {
    pub medication_name: String,
    /// `HH:MM`, matching the reminder rule.
    pub scheduled_time: String,
    pub status: AckStatus,
    #[serde(default)]
    pub skip_reason: Option<String>,
}

fn in_range(field: &str, value: f64, (min, max): (f64, f64)) -> Result<(), EngineError> {
    if !value.is_finite() || value < min || value > max {
        return Err(EngineError::validation(
            field,
            format!("{value} is outside {min}-{max}"),
        ));
    }
    Ok(())
}

fn number(value: &Value, field: &str) -> Result<f64, EngineError> {
    value
        .as_f64()
        .ok_or_else(|| EngineError::validation(field, "must be a number"))
}

/// Read a submitted vital value in the shape its kind expects.
pub fn parse_vital_value(kind: VitalKind, raw: &Value) -> Result<VitalValue, EngineError> {
    match kind {
        VitalKind::Weight => {
            let kg = match raw {
                Value::Object(map) => map
                    .get("kg")
                    .or_else(|| map.get("weight"))
                    .ok_or_else(|| EngineError::validation("value", "weight must be a number of kg"))?,
                other => other,
            };
            Ok(VitalValue::Weight(number(kg, "value")?))
        }
        VitalKind::BloodPressure => {
            let map = raw.as_object().ok_or_else(|| {
                EngineError::validation("value", "blood pressure must be {systolic, diastolic}")
            })?;
            let systolic = map
                .get("systolic")
                .ok_or_else(|| EngineError::validation("systolic", "is required"))?;
            let diastolic = map
                .get("diastolic")
                .ok_or_else(|| EngineError::validation("diastolic", "is required"))?;
            Ok(VitalValue::BloodPressure {
                systolic: number(systolic, "systolic")?,
                diastolic: number(diastolic, "diastolic")?,
            })
        }
        VitalKind::SymptomCheck => {
            let list = match raw {
                Value::Object(map) => map.get("symptoms").unwrap_or(&Value::Null),
                other => other,
            };
            let items = list
                .as_array()
                .ok_or_else(|| EngineError::validation("symptoms", "must be a list of symptom names"))?;
            let symptoms = items
                .iter()
                .map(|item| {
                    item.as_str()
                        .map(str::to_string)
                        .ok_or_else(|| EngineError::validation("symptoms", "must be strings"))
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok(VitalValue::SymptomCheck { symptoms })
        }
    }
}

/// Check a value against its plausibility limits. Out-of-range values are
/// rejected, never clamped.
pub fn validate_vital(value: &VitalValue) -> Result<(), EngineError> {
    match value {
        VitalValue::Weight(kg) => in_range("weight", *kg, WEIGHT_RANGE_KG),
        VitalValue::BloodPressure { systolic, diastolic } => {
            in_range("systolic", *systolic, SYSTOLIC_RANGE)?;
            in_range("diastolic", *diastolic, DIASTOLIC_RANGE)?;
            if diastolic >= systolic {
                return Err(EngineError::validation(
                    "diastolic",
                    "must be lower than systolic",
                ));
            }
            Ok(())
        }
        VitalValue::SymptomCheck { symptoms } => {
            if symptoms.len() > MAX_SYMPTOMS {
                return Err(EngineError::validation(
                    "symptoms",
                    format!("at most {MAX_SYMPTOMS} symptoms per check-in"),
                ));
            }
            for symptom in symptoms {
                if symptom.trim().is_empty() {
                    return Err(EngineError::validation("symptoms", "symptom names must not be empty"));
                }
                if symptom.len() > MAX_TEXT_LEN {
                    return Err(EngineError::validation("symptoms", "symptom name too long"));
                }
            }
            Ok(())
        }
    }
}

fn normalize(value: VitalValue) -> VitalValue {
    match value {
        VitalValue::SymptomCheck { symptoms } => VitalValue::SymptomCheck {
            symptoms: symptoms.iter().map(|s| s.trim().to_string()).collect(),
        },
        other => other,
    }
}

/// Append a vital reading for `date`.
pub fn log_vital(
    conn: &Connection,
    patient_id: &Uuid,
    date: NaiveDate,
    value: VitalValue,
    recorded_at: NaiveDateTime,
) -> Result<VitalLog, EngineError> {
    db::require_patient(conn, patient_id)?;
    validate_vital(&value)?;
    let log = db::append_vital_log(conn, patient_id, date, &normalize(value), &recorded_at)?;
    tracing::info!(%patient_id, %date, kind = %log.kind, seq = log.seq, "Vital logged");
    Ok(log)
}

pub fn parse_scheduled_time(raw: &str) -> Result<NaiveTime, EngineError> {
    crate::models::parse_clock_time(raw)
        .ok_or_else(|| EngineError::validation("scheduled_time", format!("'{raw}' is not HH:MM")))
}

/// Append a taken/skipped acknowledgment. The dose must be one of the
/// medication rules in force on `date`.
pub fn ack_medication(
    conn: &Connection,
    patient_id: &Uuid,
    date: NaiveDate,
    request: &AckRequest,
    recorded_at: NaiveDateTime,
) -> Result<MedicationAck, EngineError> {
    let name = request.medication_name.trim();
    if name.is_empty() {
        return Err(EngineError::validation("medication_name", "must not be empty"));
    }
    let scheduled_time = parse_scheduled_time(&request.scheduled_time)?;
    db::require_patient(conn, patient_id)?;

    let rule_set = db::rule_set_in_force(conn, patient_id, date)?;
    let rule = rule_set.as_ref().and_then(|set| {
        set.medication_rules().find(|r| {
            r.scheduled_time == scheduled_time
                && r.medication_name
                    .as_deref()
                    .is_some_and(|n| n.eq_ignore_ascii_case(name))
        })
    });
    let Some(rule) = rule else {
        return Err(EngineError::not_found(
            "MedicationDose",
            format!("{name} at {}", request.scheduled_time.trim()),
        ));
    };
    let canonical_name = rule.medication_name.clone().unwrap_or_else(|| name.to_string());

    let skip_reason = match request.status {
        AckStatus::Skipped => request
            .skip_reason
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty()),
        AckStatus::Taken => None,
    };
    if skip_reason.is_some_and(|r| r.len() > MAX_TEXT_LEN) {
        return Err(EngineError::validation("skip_reason", "too long"));
    }

    let ack = db::append_medication_ack(
        conn,
        patient_id,
        date,
        &canonical_name,
        scheduled_time,
        request.status,
        skip_reason,
        &recorded_at,
    )?;
    tracing::info!(
        %patient_id,
        %date,
        medication = %ack.medication_name,
        status = %ack.status,
        seq = ack.seq,
        "Medication acknowledged"
    );
    Ok(ack)
}

/// Authoritative entry for one obligation on one day, if any.
pub fn latest_for(
    conn: &Connection,
    patient_id: &Uuid,
    date: NaiveDate,
    key: &ObligationKey,
) -> Result<Option<LedgerEntry>, EngineError> {
    Ok(match key {
        ObligationKey::Vital(kind) => {
            db::latest_vital(conn, patient_id, date, *kind)?.map(LedgerEntry::Vital)
        }
        ObligationKey::Dose {
            medication_name,
            scheduled_time,
        } => db::latest_ack(conn, patient_id, date, medication_name, *scheduled_time)?
            .map(LedgerEntry::Medication),
    })
}

/// Latest reading per day of `kind` over `[from, to]`, for charting.
pub fn vital_history(
    conn: &Connection,
    patient_id: &Uuid,
    kind: VitalKind,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<Vec<VitalLog>, EngineError> {
    if from > to {
        return Err(EngineError::validation("days", "range start is after its end"));
    }
    db::require_patient(conn, patient_id)?;
    Ok(db::latest_vitals_in_range(conn, patient_id, kind, from, to)?)
}
