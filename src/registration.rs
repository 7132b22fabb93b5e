//! Patient registration: derive the plan from an extraction record and persist
//! patient, care plan, medications and the first rule set in one transaction.

use chrono::NaiveDateTime;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::careplan::derive_plan;
use crate::db::{self, DatabaseError};
use crate::error::EngineError;
use crate::models::{
    CarePlan, ExtractionRecord, MedicationPlan, Patient, PatientStatus, ReminderRuleSet,
};
use crate::reminders::compile_rules;

pub const MIN_PHONE_DIGITS: usize = 7;
pub const MAX_PHONE_DIGITS: usize = 15;
/// Name stored when the extraction record carries none.
pub const UNKNOWN_NAME: &str = "Unknown";

#[derive(Debug, Clone, Deserialize)]
pub struct RegistrationRequest {
    /// Extraction record as produced by the document pipeline. Any shape is accepted.
    #[serde(default)]
    pub extraction: Value,
    pub phone: String,
    #[serde(default)]
    pub caregiver_phone: Option<String>,
    #[serde(default)]
    pub nurse_phone: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Registration {
    pub patient: Patient,
    pub care_plan: CarePlan,
    pub medication_plan: MedicationPlan,
    pub rule_set: ReminderRuleSet,
}

/// Digits with an optional leading `+`, 7 to 15 digits. Returns the trimmed number.
pub fn validate_phone(field: &str, raw: &str) -> Result<String, EngineError> {
    let phone = raw.trim();
    if phone.is_empty() {
        return Err(EngineError::validation(field, "must not be empty"));
    }
    let digits = phone.strip_prefix('+').unwrap_or(phone);
    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(EngineError::validation(field, "digits only, with an optional leading '+'"));
    }
    if !(MIN_PHONE_DIGITS..=MAX_PHONE_DIGITS).contains(&digits.len()) {
        return Err(EngineError::validation(
            field,
            format!("must have {MIN_PHONE_DIGITS} to {MAX_PHONE_DIGITS} digits"),
        ));
    }
    Ok(phone.to_string())
}

fn optional_phone(field: &str, raw: Option<&str>) -> Result<Option<String>, EngineError> {
    match raw.map(str::trim).filter(|p| !p.is_empty()) {
        Some(phone) => validate_phone(field, phone).map(Some),
        None => Ok(None),
    }
}

/// Register a patient. `now` is the patient-local registration instant; its
/// date is day 0 unless the record carries a care plan start date.
pub fn register_patient(
    conn: &Connection,
    request: &RegistrationRequest,
    now: NaiveDateTime,
) -> Result<Registration, EngineError> {
    let phone = validate_phone("phone", &request.phone)?;
    let caregiver_phone = optional_phone("caregiver_phone", request.caregiver_phone.as_deref())?;
    let nurse_phone = optional_phone("nurse_phone", request.nurse_phone.as_deref())?;

    let record = ExtractionRecord::from_value(request.extraction.clone());
    let derived = derive_plan(&record, now.date());

    let patient = Patient {
        id: Uuid::new_v4(),
        full_name: derived
            .patient
            .full_name
            .clone()
            .unwrap_or_else(|| UNKNOWN_NAME.to_string()),
        phone,
        enrolled_on: derived.enrolled_on,
        caregiver_phone,
        nurse_phone,
        primary_diagnosis: derived.patient.primary_diagnosis.clone(),
        mrn: derived.patient.mrn.clone(),
        dob: derived.patient.dob,
        sex: derived.patient.sex.clone(),
        status: PatientStatus::Active,
        registered_at: now,
    };
    let specs = compile_rules(&derived.medication_plan, &derived.care_plan.monitoring);

    let tx = db::immediate_transaction(conn)?;
    if db::find_patient_by_phone(&tx, &patient.phone)?.is_some() {
        return Err(EngineError::Conflict(format!(
            "a patient with phone {} is already registered",
            patient.phone
        )));
    }
    db::insert_patient(&tx, &patient)?;
    db::insert_care_plan(&tx, &patient.id, &derived.care_plan, &now)?;
    db::insert_medication_plan(&tx, &patient.id, &derived.medication_plan)?;
    let rule_set = db::insert_rule_set(&tx, &patient.id, patient.enrolled_on, &now, &specs)?;
    tx.commit().map_err(DatabaseError::from)?;

    tracing::info!(
        patient_id = %patient.id,
        enrolled_on = %patient.enrolled_on,
        medications = derived.medication_plan.medications.len(),
        rules = rule_set.rules.len(),
        "Patient registered"
    );

    Ok(Registration {
        patient,
        care_plan: derived.care_plan,
        medication_plan: derived.medication_plan,
        rule_set,
    })
}
