use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::*;
use crate::db::DatabaseError;
use crate::models::{Patient, PatientStatus};

const PATIENT_COLUMNS: &str = "id, full_name, phone, enrolled_on, caregiver_phone, nurse_phone,
     primary_diagnosis, mrn, dob, sex, status, registered_at";

pub fn insert_patient(conn: &Connection, patient: &Patient) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO patients (id, full_name, phone, enrolled_on, caregiver_phone, nurse_phone,
         primary_diagnosis, mrn, dob, sex, status, registered_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            patient.id.to_string(),
            patient.full_name,
            patient.phone,
            fmt_date(&patient.enrolled_on),
            patient.caregiver_phone,
            patient.nurse_phone,
            patient.primary_diagnosis,
            patient.mrn,
            patient.dob.as_ref().map(fmt_date),
            patient.sex,
            patient.status.as_str(),
            fmt_datetime(&patient.registered_at),
        ],
    )?;
    Ok(())
}

pub fn get_patient(conn: &Connection, id: &Uuid) -> Result<Option<Patient>, DatabaseError> {
    let patient = conn
        .query_row(
            &format!("SELECT {PATIENT_COLUMNS} FROM patients WHERE id = ?1"),
            params![id.to_string()],
            row_to_patient,
        )
        .optional()?;
    Ok(patient)
}

/// Like `get_patient`, but a missing row is `NotFound`.
pub fn require_patient(conn: &Connection, id: &Uuid) -> Result<Patient, DatabaseError> {
    get_patient(conn, id)?.ok_or_else(|| DatabaseError::NotFound {
        entity_type: "Patient".into(),
        id: id.to_string(),
    })
}

pub fn find_patient_by_phone(conn: &Connection, phone: &str) -> Result<Option<Patient>, DatabaseError> {
    let patient = conn
        .query_row(
            &format!("SELECT {PATIENT_COLUMNS} FROM patients WHERE phone = ?1"),
            params![phone],
            row_to_patient,
        )
        .optional()?;
    Ok(patient)
}

/// Active patients in enrollment order.
pub fn list_active_patients(conn: &Connection) -> Result<Vec<Patient>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {PATIENT_COLUMNS} FROM patients WHERE status = ?1
         ORDER BY enrolled_on ASC, registered_at ASC"
    ))?;
    let rows = stmt.query_map(params![PatientStatus::Active.as_str()], row_to_patient)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(DatabaseError::from)
}

pub fn update_patient_status(
    conn: &Connection,
    id: &Uuid,
    status: PatientStatus,
) -> Result<(), DatabaseError> {
    let affected = conn.execute(
        "UPDATE patients SET status = ?1 WHERE id = ?2",
        params![status.as_str(), id.to_string()],
    )?;
    if affected == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "Patient".into(),
            id: id.to_string(),
        });
    }
    Ok(())
}

fn row_to_patient(row: &rusqlite::Row) -> Result<Patient, rusqlite::Error> {
    Ok(Patient {
        id: uuid_column(row, 0)?,
        full_name: row.get(1)?,
        phone: row.get(2)?,
        enrolled_on: date_column(row, 3)?,
        caregiver_phone: row.get(4)?,
        nurse_phone: row.get(5)?,
        primary_diagnosis: row.get(6)?,
        mrn: row.get(7)?,
        dob: opt_date_column(row, 8)?,
        sex: row.get(9)?,
        status: enum_column(row, 10)?,
        registered_at: datetime_column(row, 11)?,
    })
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::db::sqlite::open_memory_database;

    #[test]
    fn insert_and_get_patient() {
        let conn = open_memory_database().unwrap();
        let p = make_patient(&conn, "+919800000001", date(2025, 3, 1));
        let loaded = get_patient(&conn, &p.id).unwrap().unwrap();
        assert_eq!(loaded.phone, "+919800000001");
        assert_eq!(loaded.enrolled_on, date(2025, 3, 1));
        assert_eq!(loaded.status, PatientStatus::Active);
    }

    #[test]
    fn duplicate_phone_is_unique_violation() {
        let conn = open_memory_database().unwrap();
        let p = make_patient(&conn, "+919800000001", date(2025, 3, 1));
        let mut dup = p.clone();
        dup.id = Uuid::new_v4();
        let err = insert_patient(&conn, &dup).unwrap_err();
        assert!(err.is_unique_violation());
    }

    #[test]
    fn require_missing_patient_is_not_found() {
        let conn = open_memory_database().unwrap();
        let err = require_patient(&conn, &Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, DatabaseError::NotFound { .. }));
    }

    #[test]
    fn discharged_patients_leave_active_list() {
        let conn = open_memory_database().unwrap();
        let a = make_patient(&conn, "+919800000001", date(2025, 3, 1));
        let b = make_patient(&conn, "+919800000002", date(2025, 3, 2));
        update_patient_status(&conn, &a.id, PatientStatus::Discharged).unwrap();
        let active = list_active_patients(&conn).unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, b.id);
        assert!(find_patient_by_phone(&conn, "+919800000001").unwrap().is_some());
    }
}
