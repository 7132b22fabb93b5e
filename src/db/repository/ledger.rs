use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::*;
use crate::db::DatabaseError;
use crate::models::{AckStatus, MedicationAck, VitalKind, VitalLog, VitalValue};

const VITAL_COLUMNS: &str =
    "seq, id, patient_id, date, kind, value_primary, value_secondary, symptoms_json, recorded_at";
const ACK_COLUMNS: &str =
    "seq, id, patient_id, date, medication_name, scheduled_time, status, skip_reason, recorded_at";

/// Append a vital reading. The returned row carries its ledger sequence number.
pub fn append_vital_log(
    conn: &Connection,
    patient_id: &Uuid,
    date: NaiveDate,
    value: &VitalValue,
    recorded_at: &NaiveDateTime,
) -> Result<VitalLog, DatabaseError> {
    let (primary, secondary, symptoms) = match value {
        VitalValue::Weight(kg) => (Some(*kg), None, None),
        VitalValue::BloodPressure {
            systolic,
            diastolic,
        } => (Some(*systolic), Some(*diastolic), None),
        VitalValue::SymptomCheck { symptoms } => (None, None, Some(to_json(symptoms)?)),
    };
    let id = Uuid::new_v4();
    conn.execute(
        "INSERT INTO vital_logs (id, patient_id, date, kind, value_primary, value_secondary,
         symptoms_json, recorded_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            id.to_string(),
            patient_id.to_string(),
            fmt_date(&date),
            value.kind().as_str(),
            primary,
            secondary,
            symptoms,
            fmt_datetime(recorded_at),
        ],
    )?;
    Ok(VitalLog {
        seq: conn.last_insert_rowid(),
        id,
        patient_id: *patient_id,
        date,
        kind: value.kind(),
        value: value.clone(),
        recorded_at: *recorded_at,
    })
}

/// Latest reading of `kind` for the day, by sequence.
pub fn latest_vital(
    conn: &Connection,
    patient_id: &Uuid,
    date: NaiveDate,
    kind: VitalKind,
) -> Result<Option<VitalLog>, DatabaseError> {
    let log = conn
        .query_row(
            &format!(
                "SELECT {VITAL_COLUMNS} FROM vital_logs
                 WHERE patient_id = ?1 AND date = ?2 AND kind = ?3
                 ORDER BY seq DESC LIMIT 1"
            ),
            params![patient_id.to_string(), fmt_date(&date), kind.as_str()],
            row_to_vital_log,
        )
        .optional()?;
    Ok(log)
}

/// Latest reading per day for `kind` over `[from, to]`, oldest day first.
pub fn latest_vitals_in_range(
    conn: &Connection,
    patient_id: &Uuid,
    kind: VitalKind,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<Vec<VitalLog>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {VITAL_COLUMNS} FROM vital_logs
         WHERE seq IN (
             SELECT MAX(seq) FROM vital_logs
             WHERE patient_id = ?1 AND kind = ?2 AND date >= ?3 AND date <= ?4
             GROUP BY date
         )
         ORDER BY date ASC"
    ))?;
    let rows = stmt.query_map(
        params![patient_id.to_string(), kind.as_str(), fmt_date(&from), fmt_date(&to)],
        row_to_vital_log,
    )?;
    rows.collect::<Result<Vec<_>, _>>().map_err(DatabaseError::from)
}

/// Days in `[from, to]` with at least one reading of `kind`.
pub fn days_with_vital(
    conn: &Connection,
    patient_id: &Uuid,
    kind: VitalKind,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<Vec<NaiveDate>, DatabaseError> {
    Ok(latest_vitals_in_range(conn, patient_id, kind, from, to)?
        .into_iter()
        .map(|log| log.date)
        .collect())
}

#[allow(clippy::too_many_arguments)]
pub fn append_medication_ack(
    conn: &Connection,
    patient_id: &Uuid,
    date: NaiveDate,
    medication_name: &str,
    scheduled_time: NaiveTime,
    status: AckStatus,
    skip_reason: Option<&str>,
    recorded_at: &NaiveDateTime,
) -> Result<MedicationAck, DatabaseError> {
    let id = Uuid::new_v4();
    conn.execute(
        "INSERT INTO medication_acks (id, patient_id, date, medication_name, scheduled_time,
         status, skip_reason, recorded_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            id.to_string(),
            patient_id.to_string(),
            fmt_date(&date),
            medication_name,
            fmt_time(&scheduled_time),
            status.as_str(),
            skip_reason,
            fmt_datetime(recorded_at),
        ],
    )?;
    Ok(MedicationAck {
        seq: conn.last_insert_rowid(),
        id,
        patient_id: *patient_id,
        date,
        medication_name: medication_name.to_string(),
        scheduled_time,
        status,
        skip_reason: skip_reason.map(str::to_string),
        recorded_at: *recorded_at,
    })
}

/// Latest ack for one dose. Medication names compare case-insensitively.
pub fn latest_ack(
    conn: &Connection,
    patient_id: &Uuid,
    date: NaiveDate,
    medication_name: &str,
    scheduled_time: NaiveTime,
) -> Result<Option<MedicationAck>, DatabaseError> {
    let ack = conn
        .query_row(
            &format!(
                "SELECT {ACK_COLUMNS} FROM medication_acks
                 WHERE patient_id = ?1 AND date = ?2
                   AND lower(medication_name) = lower(?3) AND scheduled_time = ?4
                 ORDER BY seq DESC LIMIT 1"
            ),
            params![
                patient_id.to_string(),
                fmt_date(&date),
                medication_name,
                fmt_time(&scheduled_time)
            ],
            row_to_ack,
        )
        .optional()?;
    Ok(ack)
}

/// Latest ack per dose for the day.
pub fn latest_acks_for_day(
    conn: &Connection,
    patient_id: &Uuid,
    date: NaiveDate,
) -> Result<Vec<MedicationAck>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ACK_COLUMNS} FROM medication_acks
         WHERE seq IN (
             SELECT MAX(seq) FROM medication_acks
             WHERE patient_id = ?1 AND date = ?2
             GROUP BY lower(medication_name), scheduled_time
         )
         ORDER BY scheduled_time ASC, seq ASC"
    ))?;
    let rows = stmt.query_map(params![patient_id.to_string(), fmt_date(&date)], row_to_ack)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(DatabaseError::from)
}

fn row_to_vital_log(row: &rusqlite::Row) -> Result<VitalLog, rusqlite::Error> {
    let kind: VitalKind = enum_column(row, 4)?;
    let primary: Option<f64> = row.get(5)?;
    let secondary: Option<f64> = row.get(6)?;
    let value = match kind {
        VitalKind::Weight => VitalValue::Weight(primary.unwrap_or_default()),
        VitalKind::BloodPressure => VitalValue::BloodPressure {
            systolic: primary.unwrap_or_default(),
            diastolic: secondary.unwrap_or_default(),
        },
        VitalKind::SymptomCheck => {
            let raw: Option<String> = row.get(7)?;
            let symptoms = match raw {
                Some(json) => serde_json::from_str(&json).map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(7, rusqlite::types::Type::Text, Box::new(e))
                })?,
                None => Vec::new(),
            };
            VitalValue::SymptomCheck { symptoms }
        }
    };
    Ok(VitalLog {
        seq: row.get(0)?,
        id: uuid_column(row, 1)?,
        patient_id: uuid_column(row, 2)?,
        date: date_column(row, 3)?,
        kind,
        value,
        recorded_at: datetime_column(row, 8)?,
    })
}

fn row_to_ack(row: &rusqlite::Row) -> Result<MedicationAck, rusqlite::Error> {
    Ok(MedicationAck {
        seq: row.get(0)?,
        id: uuid_column(row, 1)?,
        patient_id: uuid_column(row, 2)?,
        date: date_column(row, 3)?,
        medication_name: row.get(4)?,
        scheduled_time: time_column(row, 5)?,
        status: enum_column(row, 6)?,
        skip_reason: row.get(7)?,
        recorded_at: datetime_column(row, 8)?,
    })
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::db::sqlite::open_memory_database;

    fn eight() -> NaiveTime {
        NaiveTime::from_hms_opt(8, 0, 0).unwrap()
    }

    #[test]
    fn latest_vital_wins_by_sequence() {
        let conn = open_memory_database().unwrap();
        let d = date(2025, 3, 2);
        let p = make_patient(&conn, "+919800000001", date(2025, 3, 1));
        append_vital_log(&conn, &p.id, d, &VitalValue::Weight(70.0), &at(d, 8, 0)).unwrap();
        // Same recorded_at: only seq decides.
        let second = append_vital_log(&conn, &p.id, d, &VitalValue::Weight(70.4), &at(d, 8, 0)).unwrap();
        let latest = latest_vital(&conn, &p.id, d, VitalKind::Weight).unwrap().unwrap();
        assert_eq!(latest.seq, second.seq);
        assert_eq!(latest.value, VitalValue::Weight(70.4));
        assert!(latest_vital(&conn, &p.id, d, VitalKind::BloodPressure).unwrap().is_none());
    }

    #[test]
    fn symptom_check_round_trips() {
        let conn = open_memory_database().unwrap();
        let d = date(2025, 3, 2);
        let p = make_patient(&conn, "+919800000001", date(2025, 3, 1));
        let value = VitalValue::SymptomCheck {
            symptoms: vec!["ankle swelling".into()],
        };
        append_vital_log(&conn, &p.id, d, &value, &at(d, 19, 5)).unwrap();
        let latest = latest_vital(&conn, &p.id, d, VitalKind::SymptomCheck).unwrap().unwrap();
        assert_eq!(latest.value, value);
    }

    #[test]
    fn range_returns_one_reading_per_day() {
        let conn = open_memory_database().unwrap();
        let p = make_patient(&conn, "+919800000001", date(2025, 3, 1));
        for (day, kg) in [(1, 70.0), (1, 70.2), (2, 71.0), (4, 71.5)] {
            let d = date(2025, 3, day);
            append_vital_log(&conn, &p.id, d, &VitalValue::Weight(kg), &at(d, 8, 0)).unwrap();
        }
        let logs = latest_vitals_in_range(&conn, &p.id, VitalKind::Weight, date(2025, 3, 1), date(2025, 3, 3)).unwrap();
        let values: Vec<_> = logs.iter().map(|l| l.value.weight_kg().unwrap()).collect();
        assert_eq!(values, vec![70.2, 71.0]);
        let days = days_with_vital(&conn, &p.id, VitalKind::Weight, date(2025, 3, 1), date(2025, 3, 10)).unwrap();
        assert_eq!(days, vec![date(2025, 3, 1), date(2025, 3, 2), date(2025, 3, 4)]);
    }

    #[test]
    fn latest_ack_per_dose() {
        let conn = open_memory_database().unwrap();
        let d = date(2025, 3, 2);
        let p = make_patient(&conn, "+919800000001", date(2025, 3, 1));
        append_medication_ack(&conn, &p.id, d, "Furosemide", eight(), AckStatus::Skipped, Some("nausea"), &at(d, 8, 5)).unwrap();
        append_medication_ack(&conn, &p.id, d, "Furosemide", eight(), AckStatus::Taken, None, &at(d, 9, 0)).unwrap();
        append_medication_ack(&conn, &p.id, d, "Bisoprolol", eight(), AckStatus::Taken, None, &at(d, 8, 1)).unwrap();

        let acks = latest_acks_for_day(&conn, &p.id, d).unwrap();
        assert_eq!(acks.len(), 2);
        assert!(acks.iter().all(|a| a.status == AckStatus::Taken));

        let furo = latest_ack(&conn, &p.id, d, "FUROSEMIDE", eight()).unwrap().unwrap();
        assert_eq!(furo.status, AckStatus::Taken);
        assert!(latest_ack(&conn, &p.id, date(2025, 3, 3), "Furosemide", eight()).unwrap().is_none());
    }
}
