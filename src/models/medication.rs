use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

/// One discharge medication with its parsed daily schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Medication {
    pub name: String,
    pub dose: Option<String>,
    pub route: Option<String>,
    /// Frequency as written on the discharge summary ("1-0-1", "twice daily").
    pub frequency: String,
    /// Empty for as-needed medications.
    #[serde(with = "super::hhmm_vec")]
    pub times: Vec<NaiveTime>,
    pub indication: Option<String>,
}

impl Medication {
    pub fn is_as_needed(&self) -> bool {
        self.times.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MedicationPlan {
    pub medications: Vec<Medication>,
}

impl MedicationPlan {
    pub fn find(&self, name: &str) -> Option<&Medication> {
        self.medications
            .iter()
            .find(|m| m.name.eq_ignore_ascii_case(name.trim()))
    }
}
