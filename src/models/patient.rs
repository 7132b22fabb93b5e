use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{CarePhase, PatientStatus};

/// A registered post-discharge patient. Day 0 of the care plan is `enrolled_on`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Patient {
    pub id: Uuid,
    pub full_name: String,
    pub phone: String,
    pub enrolled_on: NaiveDate,
    pub caregiver_phone: Option<String>,
    pub nurse_phone: Option<String>,
    pub primary_diagnosis: Option<String>,
    pub mrn: Option<String>,
    pub dob: Option<NaiveDate>,
    pub sex: Option<String>,
    pub status: PatientStatus,
    pub registered_at: NaiveDateTime,
}

impl Patient {
    /// Days since enrollment; negative before day 0.
    pub fn care_plan_day(&self, date: NaiveDate) -> i64 {
        (date - self.enrolled_on).num_days()
    }

    pub fn phase_on(&self, date: NaiveDate) -> CarePhase {
        CarePhase::for_day(self.care_plan_day(date).max(0))
    }
}
