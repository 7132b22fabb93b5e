//! Repository layer: entity-scoped database operations.
//!
//! Free functions over a borrowed `Connection`, so callers decide the
//! transaction boundary. All public functions are re-exported here.

mod care_plan;
mod clinical_note;
mod escalation;
mod ledger;
mod patient;
mod reminder_rule;

use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rusqlite::types::Type;
use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::models::{DATETIME_FORMAT, DATE_FORMAT, TIME_FORMAT};

pub use care_plan::*;
pub use clinical_note::*;
pub use escalation::*;
pub use ledger::*;
pub use patient::*;
pub use reminder_rule::*;

fn conversion_error<E>(idx: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

pub(crate) fn fmt_datetime(dt: &NaiveDateTime) -> String {
    dt.format(DATETIME_FORMAT).to_string()
}

pub(crate) fn fmt_date(d: &NaiveDate) -> String {
    d.format(DATE_FORMAT).to_string()
}

pub(crate) fn fmt_time(t: &NaiveTime) -> String {
    t.format(TIME_FORMAT).to_string()
}

pub(crate) fn uuid_column(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    Uuid::parse_str(&raw).map_err(|e| conversion_error(idx, e))
}

pub(crate) fn enum_column<T>(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = crate::db::DatabaseError>,
{
    let raw: String = row.get(idx)?;
    T::from_str(&raw).map_err(|e| conversion_error(idx, e))
}

pub(crate) fn date_column(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<NaiveDate> {
    let raw: String = row.get(idx)?;
    NaiveDate::parse_from_str(&raw, DATE_FORMAT).map_err(|e| conversion_error(idx, e))
}

pub(crate) fn opt_date_column(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<Option<NaiveDate>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|r| NaiveDate::parse_from_str(&r, DATE_FORMAT).map_err(|e| conversion_error(idx, e)))
        .transpose()
}

pub(crate) fn datetime_column(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<NaiveDateTime> {
    let raw: String = row.get(idx)?;
    NaiveDateTime::parse_from_str(&raw, DATETIME_FORMAT).map_err(|e| conversion_error(idx, e))
}

pub(crate) fn opt_datetime_column(
    row: &rusqlite::Row,
    idx: usize,
) -> rusqlite::Result<Option<NaiveDateTime>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|r| NaiveDateTime::parse_from_str(&r, DATETIME_FORMAT).map_err(|e| conversion_error(idx, e)))
        .transpose()
}

pub(crate) fn time_column(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<NaiveTime> {
    let raw: String = row.get(idx)?;
    NaiveTime::parse_from_str(&raw, TIME_FORMAT).map_err(|e| conversion_error(idx, e))
}

pub(crate) fn json_column<T: DeserializeOwned>(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw).map_err(|e| conversion_error(idx, e))
}

pub(crate) fn to_json<T: serde::Serialize>(value: &T) -> Result<String, crate::db::DatabaseError> {
    serde_json::to_string(value).map_err(|e| crate::db::DatabaseError::ConstraintViolation(e.to_string()))
}

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::{NaiveDate, NaiveDateTime};
    use rusqlite::Connection;
    use uuid::Uuid;

    use crate::models::*;

    pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    pub fn at(d: NaiveDate, h: u32, min: u32) -> NaiveDateTime {
        d.and_hms_opt(h, min, 0).unwrap()
    }

    pub fn make_patient(conn: &Connection, phone: &str, enrolled_on: NaiveDate) -> Patient {
        let patient = Patient {
            id: Uuid::new_v4(),
            full_name: format!("Patient {phone}"),
            phone: phone.into(),
            enrolled_on,
            caregiver_phone: None,
            nurse_phone: None,
            primary_diagnosis: Some("Heart failure".into()),
            mrn: None,
            dob: None,
            sex: None,
            status: PatientStatus::Active,
            registered_at: at(enrolled_on, 9, 0),
        };
        super::insert_patient(conn, &patient).unwrap();
        patient
    }
}
