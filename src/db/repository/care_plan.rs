use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::*;
use crate::db::DatabaseError;
use crate::models::{
    CarePlan, Medication, MedicationPlan, MonitoringRequirements, RedFlags, WeightThresholds,
};

pub fn insert_care_plan(
    conn: &Connection,
    patient_id: &Uuid,
    plan: &CarePlan,
    created_at: &NaiveDateTime,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO care_plans (patient_id, start_date, end_date, phases_json, monitor_weight,
         monitor_bp, monitor_symptom_check, yellow_zone_json, red_zone_json, weight_gain_24h_kg,
         weight_gain_7d_kg, trigger_action_rules_json, milestones_json, discharge_advice_json,
         created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
        params![
            patient_id.to_string(),
            fmt_date(&plan.start_date),
            fmt_date(&plan.end_date),
            to_json(&plan.phases)?,
            plan.monitoring.weight,
            plan.monitoring.bp,
            plan.monitoring.symptom_check,
            to_json(&plan.red_flags.yellow_zone)?,
            to_json(&plan.red_flags.red_zone)?,
            plan.thresholds.gain_24h_kg,
            plan.thresholds.gain_7d_kg,
            to_json(&plan.trigger_action_rules)?,
            to_json(&plan.milestones)?,
            to_json(&plan.discharge_advice)?,
            fmt_datetime(created_at),
        ],
    )?;
    Ok(())
}

pub fn get_care_plan(conn: &Connection, patient_id: &Uuid) -> Result<Option<CarePlan>, DatabaseError> {
    let plan = conn
        .query_row(
            "SELECT start_date, end_date, phases_json, monitor_weight, monitor_bp,
                    monitor_symptom_check, yellow_zone_json, red_zone_json, weight_gain_24h_kg,
                    weight_gain_7d_kg, trigger_action_rules_json, milestones_json,
                    discharge_advice_json
             FROM care_plans WHERE patient_id = ?1",
            params![patient_id.to_string()],
            row_to_care_plan,
        )
        .optional()?;
    Ok(plan)
}

pub fn require_care_plan(conn: &Connection, patient_id: &Uuid) -> Result<CarePlan, DatabaseError> {
    get_care_plan(conn, patient_id)?.ok_or_else(|| DatabaseError::NotFound {
        entity_type: "CarePlan".into(),
        id: patient_id.to_string(),
    })
}

fn row_to_care_plan(row: &rusqlite::Row) -> Result<CarePlan, rusqlite::Error> {
    Ok(CarePlan {
        start_date: date_column(row, 0)?,
        end_date: date_column(row, 1)?,
        phases: json_column(row, 2)?,
        monitoring: MonitoringRequirements {
            weight: row.get(3)?,
            bp: row.get(4)?,
            symptom_check: row.get(5)?,
        },
        red_flags: RedFlags {
            yellow_zone: json_column(row, 6)?,
            red_zone: json_column(row, 7)?,
        },
        thresholds: WeightThresholds {
            gain_24h_kg: row.get(8)?,
            gain_7d_kg: row.get(9)?,
        },
        trigger_action_rules: json_column(row, 10)?,
        milestones: json_column(row, 11)?,
        discharge_advice: json_column(row, 12)?,
    })
}

/// Persist the medication plan, keeping list order in `position`.
pub fn insert_medication_plan(
    conn: &Connection,
    patient_id: &Uuid,
    plan: &MedicationPlan,
) -> Result<(), DatabaseError> {
    let mut stmt = conn.prepare(
        "INSERT INTO medications (id, patient_id, position, name, dose, route, frequency,
         times_json, indication)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
    )?;
    for (position, med) in plan.medications.iter().enumerate() {
        let times: Vec<String> = med.times.iter().map(fmt_time).collect();
        stmt.execute(params![
            Uuid::new_v4().to_string(),
            patient_id.to_string(),
            position as i64,
            med.name,
            med.dose,
            med.route,
            med.frequency,
            to_json(&times)?,
            med.indication,
        ])?;
    }
    Ok(())
}

pub fn get_medication_plan(conn: &Connection, patient_id: &Uuid) -> Result<MedicationPlan, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT name, dose, route, frequency, times_json, indication
         FROM medications WHERE patient_id = ?1 ORDER BY position ASC",
    )?;
    let rows = stmt.query_map(params![patient_id.to_string()], row_to_medication)?;
    let medications = rows.collect::<Result<Vec<_>, _>>()?;
    Ok(MedicationPlan { medications })
}

fn row_to_medication(row: &rusqlite::Row) -> Result<Medication, rusqlite::Error> {
    let times: Vec<String> = json_column(row, 4)?;
    let times = times
        .iter()
        .map(|t| {
            crate::models::parse_clock_time(t).ok_or_else(|| {
                rusqlite::Error::FromSqlConversionFailure(
                    4,
                    rusqlite::types::Type::Text,
                    format!("invalid clock time '{t}'").into(),
                )
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Medication {
        name: row.get(0)?,
        dose: row.get(1)?,
        route: row.get(2)?,
        frequency: row.get(3)?,
        times,
        indication: row.get(5)?,
    })
}
