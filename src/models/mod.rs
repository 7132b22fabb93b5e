pub mod care_plan;
pub mod clinical_note;
pub mod enums;
pub mod escalation;
pub mod extraction;
pub mod ledger;
pub mod medication;
pub mod patient;
pub mod reminder;

pub use care_plan::*;
pub use clinical_note::*;
pub use enums::*;
pub use escalation::*;
pub use extraction::ExtractionRecord;
pub use ledger::*;
pub use medication::*;
pub use patient::*;
pub use reminder::*;

/// Storage and wire format for clock times ("08:00").
pub const TIME_FORMAT: &str = "%H:%M";
/// Storage format for timestamps, as in every other table.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
/// Storage format for calendar dates.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Parse a clock time written as `HH:MM` (or `H:MM`).
pub fn parse_clock_time(s: &str) -> Option<chrono::NaiveTime> {
    chrono::NaiveTime::parse_from_str(s.trim(), TIME_FORMAT).ok()
}

/// Serde adapter that writes `NaiveTime` as `HH:MM`.
pub mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(t: &NaiveTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&t.format(super::TIME_FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(d)?;
        super::parse_clock_time(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid clock time '{raw}', expected HH:MM")))
    }
}

/// `hhmm` for a list of times.
pub mod hhmm_vec {
    use chrono::NaiveTime;
    use serde::ser::SerializeSeq;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(times: &[NaiveTime], s: S) -> Result<S::Ok, S::Error> {
        let mut seq = s.serialize_seq(Some(times.len()))?;
        for t in times {
            seq.serialize_element(&t.format(super::TIME_FORMAT).to_string())?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<NaiveTime>, D::Error> {
        let raw = Vec::<String>::deserialize(d)?;
        raw.iter()
            .map(|r| {
                super::parse_clock_time(r).ok_or_else(|| {
                    serde::de::Error::custom(format!("invalid clock time '{r}', expected HH:MM"))
                })
            })
            .collect()
    }
}
