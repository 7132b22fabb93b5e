use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::*;
use crate::db::DatabaseError;
use crate::models::{ReminderRule, ReminderRuleSet, RuleSpec};

/// Insert a new immutable rule set with the next version number for the patient.
pub fn insert_rule_set(
    conn: &Connection,
    patient_id: &Uuid,
    effective_from: NaiveDate,
    created_at: &NaiveDateTime,
    specs: &[RuleSpec],
) -> Result<ReminderRuleSet, DatabaseError> {
    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) + 1 FROM reminder_rule_sets WHERE patient_id = ?1",
        params![patient_id.to_string()],
        |row| row.get(0),
    )?;
    let set_id = Uuid::new_v4();
    conn.execute(
        "INSERT INTO reminder_rule_sets (id, patient_id, version, effective_from, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            set_id.to_string(),
            patient_id.to_string(),
            version,
            fmt_date(&effective_from),
            fmt_datetime(created_at),
        ],
    )?;

    let mut stmt = conn.prepare(
        "INSERT INTO reminder_rules (id, rule_set_id, patient_id, kind, scheduled_time, medication_name)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )?;
    let mut rules = Vec::with_capacity(specs.len());
    for spec in specs {
        let rule = ReminderRule {
            id: Uuid::new_v4(),
            rule_set_id: set_id,
            patient_id: *patient_id,
            kind: spec.kind,
            scheduled_time: spec.scheduled_time,
            medication_name: spec.medication_name.clone(),
        };
        stmt.execute(params![
            rule.id.to_string(),
            set_id.to_string(),
            patient_id.to_string(),
            rule.kind.as_str(),
            fmt_time(&rule.scheduled_time),
            rule.medication_name,
        ])?;
        rules.push(rule);
    }

    Ok(ReminderRuleSet {
        id: set_id,
        patient_id: *patient_id,
        version,
        effective_from,
        created_at: *created_at,
        rules,
    })
}

/// The rule set in force on `date`: greatest `effective_from <= date`, highest version on ties.
pub fn rule_set_in_force(
    conn: &Connection,
    patient_id: &Uuid,
    date: NaiveDate,
) -> Result<Option<ReminderRuleSet>, DatabaseError> {
    let header = conn
        .query_row(
            "SELECT id, patient_id, version, effective_from, created_at
             FROM reminder_rule_sets
             WHERE patient_id = ?1 AND effective_from <= ?2
             ORDER BY effective_from DESC, version DESC
             LIMIT 1",
            params![patient_id.to_string(), fmt_date(&date)],
            row_to_rule_set,
        )
        .optional()?;
    header.map(|set| with_rules(conn, set)).transpose()
}

/// The most recently created set, regardless of its effective date.
pub fn latest_rule_set(
    conn: &Connection,
    patient_id: &Uuid,
) -> Result<Option<ReminderRuleSet>, DatabaseError> {
    let header = conn
        .query_row(
            "SELECT id, patient_id, version, effective_from, created_at
             FROM reminder_rule_sets
             WHERE patient_id = ?1
             ORDER BY version DESC
             LIMIT 1",
            params![patient_id.to_string()],
            row_to_rule_set,
        )
        .optional()?;
    header.map(|set| with_rules(conn, set)).transpose()
}

/// Every version for the patient, oldest first.
pub fn list_rule_sets(conn: &Connection, patient_id: &Uuid) -> Result<Vec<ReminderRuleSet>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, patient_id, version, effective_from, created_at
         FROM reminder_rule_sets WHERE patient_id = ?1 ORDER BY version ASC",
    )?;
    let headers = stmt
        .query_map(params![patient_id.to_string()], row_to_rule_set)?
        .collect::<Result<Vec<_>, _>>()?;
    headers.into_iter().map(|set| with_rules(conn, set)).collect()
}

fn with_rules(conn: &Connection, mut set: ReminderRuleSet) -> Result<ReminderRuleSet, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, rule_set_id, patient_id, kind, scheduled_time, medication_name
         FROM reminder_rules WHERE rule_set_id = ?1
         ORDER BY scheduled_time ASC, kind ASC, medication_name ASC",
    )?;
    let rows = stmt.query_map(params![set.id.to_string()], row_to_rule)?;
    set.rules = rows.collect::<Result<Vec<_>, _>>()?;
    Ok(set)
}

fn row_to_rule_set(row: &rusqlite::Row) -> Result<ReminderRuleSet, rusqlite::Error> {
    Ok(ReminderRuleSet {
        id: uuid_column(row, 0)?,
        patient_id: uuid_column(row, 1)?,
        version: row.get(2)?,
        effective_from: date_column(row, 3)?,
        created_at: datetime_column(row, 4)?,
        rules: Vec::new(),
    })
}

fn row_to_rule(row: &rusqlite::Row) -> Result<ReminderRule, rusqlite::Error> {
    Ok(ReminderRule {
        id: uuid_column(row, 0)?,
        rule_set_id: uuid_column(row, 1)?,
        patient_id: uuid_column(row, 2)?,
        kind: enum_column(row, 3)?,
        scheduled_time: time_column(row, 4)?,
        medication_name: row.get(5)?,
    })
}
