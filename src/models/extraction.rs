//! Extraction record: the structured discharge summary produced upstream.
//!
//! Every field is optional and deserialized leniently. A field with the wrong
//! shape reads as absent instead of failing the whole record, and placeholder
//! strings ("unknown", "n/a", "none", "") read as absent too.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

const ABSENT_MARKERS: &[&str] = &["unknown", "n/a", "na", "none", "null", "-"];

/// True when an extracted string carries no information.
pub fn is_absent(s: &str) -> bool {
    let t = s.trim();
    t.is_empty() || ABSENT_MARKERS.iter().any(|m| t.eq_ignore_ascii_case(m))
}

fn text_from_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !is_absent(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn lenient<'de, D, T>(d: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = Value::deserialize(d)?;
    Ok(serde_json::from_value(value).unwrap_or_default())
}

fn lenient_text<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    let value = Value::deserialize(d)?;
    Ok(text_from_value(&value))
}

fn lenient_number<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
    let value = Value::deserialize(d)?;
    Ok(match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    })
}

fn lenient_flag<'de, D: Deserializer<'de>>(d: D) -> Result<Option<bool>, D::Error> {
    let value = Value::deserialize(d)?;
    Ok(match value {
        Value::Bool(b) => Some(b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "y" | "required" => Some(true),
            "false" | "no" | "n" | "not required" => Some(false),
            _ => None,
        },
        _ => None,
    })
}

fn lenient_texts<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
    let value = Value::deserialize(d)?;
    Ok(match value {
        Value::Array(items) => items.iter().filter_map(text_from_value).collect(),
        other => text_from_value(&other).into_iter().collect(),
    })
}

fn lenient_list<'de, D, T>(d: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(d)?;
    Ok(match value {
        Value::Array(items) => items
            .into_iter()
            .filter(Value::is_object)
            .filter_map(|item| serde_json::from_value(item).ok())
            .collect(),
        _ => Vec::new(),
    })
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionRecord {
    #[serde(deserialize_with = "lenient")]
    pub patient: PatientSection,
    #[serde(deserialize_with = "lenient")]
    pub clinical_episode: ClinicalEpisode,
    #[serde(deserialize_with = "lenient")]
    pub medications: MedicationsSection,
    #[serde(deserialize_with = "lenient")]
    pub follow_up: FollowUpSection,
    #[serde(deserialize_with = "lenient")]
    pub care_plan_90d: Option<CarePlanSection>,
    #[serde(deserialize_with = "lenient")]
    pub clinical_modules: ClinicalModules,
    #[serde(deserialize_with = "lenient")]
    pub extracted_details: ExtractedDetails,
}

impl ExtractionRecord {
    /// Never fails: anything that is not a JSON object yields the empty record.
    pub fn from_value(value: Value) -> Self {
        if value.is_object() {
            serde_json::from_value(value).unwrap_or_default()
        } else {
            Self::default()
        }
    }

    pub fn chf(&self) -> &ChfModule {
        &self.clinical_modules.chf
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PatientSection {
    #[serde(deserialize_with = "lenient_text")]
    pub full_name: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub dob: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub sex_at_birth: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub mrn: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClinicalEpisode {
    #[serde(deserialize_with = "lenient_text")]
    pub primary_diagnosis: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MedicationsSection {
    #[serde(deserialize_with = "lenient_list")]
    pub discharge_medications: Vec<ExtractedMedication>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractedMedication {
    #[serde(deserialize_with = "lenient_text")]
    pub medication_name: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub dose: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub route: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub frequency: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub indication: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FollowUpSection {
    #[serde(deserialize_with = "lenient_list")]
    pub appointments: Vec<ExtractedAppointment>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractedAppointment {
    #[serde(deserialize_with = "lenient_text")]
    pub scheduled_datetime: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub provider_name: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub appointment_type: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CarePlanSection {
    #[serde(deserialize_with = "lenient_text")]
    pub start_date: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub end_date: Option<String>,
    #[serde(deserialize_with = "lenient_texts")]
    pub phase_0_7: Vec<String>,
    #[serde(deserialize_with = "lenient_texts")]
    pub phase_8_30: Vec<String>,
    #[serde(deserialize_with = "lenient_texts")]
    pub phase_31_90: Vec<String>,
    #[serde(deserialize_with = "lenient_texts")]
    pub trigger_action_rules: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClinicalModules {
    #[serde(deserialize_with = "lenient")]
    pub chf: ChfModule,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChfModule {
    #[serde(deserialize_with = "lenient")]
    pub monitoring: Option<MonitoringSection>,
    #[serde(deserialize_with = "lenient")]
    pub red_flags: Option<RedFlagSection>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringSection {
    #[serde(deserialize_with = "lenient_flag")]
    pub daily_weight_required: Option<bool>,
    #[serde(deserialize_with = "lenient_flag")]
    pub bp_required: Option<bool>,
    #[serde(deserialize_with = "lenient_flag")]
    pub symptom_check_required: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RedFlagSection {
    #[serde(deserialize_with = "lenient_texts")]
    pub yellow_zone: Vec<String>,
    #[serde(deserialize_with = "lenient_texts")]
    pub red_zone: Vec<String>,
    #[serde(deserialize_with = "lenient_number")]
    pub weight_gain_trigger_24h_kg: Option<f64>,
    #[serde(deserialize_with = "lenient_number")]
    pub weight_gain_trigger_7d_kg: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractedDetails {
    #[serde(deserialize_with = "lenient_texts")]
    pub discharge_advice: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_object_yields_empty_record() {
        let record = ExtractionRecord::from_value(json!({}));
        assert!(record.patient.full_name.is_none());
        assert!(record.medications.discharge_medications.is_empty());
        assert!(record.care_plan_90d.is_none());
        assert!(record.chf().monitoring.is_none());
    }

    #[test]
    fn non_object_yields_empty_record() {
        let record = ExtractionRecord::from_value(json!("not a record"));
        assert!(record.clinical_episode.primary_diagnosis.is_none());
    }

    #[test]
    fn placeholder_strings_read_as_absent() {
        let record = ExtractionRecord::from_value(json!({
            "patient": {"full_name": "Unknown", "mrn": "N/A", "dob": ""},
            "clinical_episode": {"primary_diagnosis": "HFrEF"}
        }));
        assert!(record.patient.full_name.is_none());
        assert!(record.patient.mrn.is_none());
        assert!(record.patient.dob.is_none());
        assert_eq!(record.clinical_episode.primary_diagnosis.as_deref(), Some("HFrEF"));
    }

    #[test]
    fn malformed_sections_do_not_poison_the_record() {
        let record = ExtractionRecord::from_value(json!({
            "patient": "Ravi",
            "medications": {"discharge_medications": [
                "free text",
                {"medication_name": "Furosemide", "frequency": "1-0-0", "dose": 40},
                42
            ]},
            "clinical_modules": {"chf": {
                "monitoring": {"daily_weight_required": "yes", "bp_required": 1},
                "red_flags": {"weight_gain_trigger_24h_kg": "1.5", "red_zone": "chest pain"}
            }}
        }));
        assert!(record.patient.full_name.is_none());
        let meds = &record.medications.discharge_medications;
        assert_eq!(meds.len(), 1);
        assert_eq!(meds[0].dose.as_deref(), Some("40"));
        let monitoring = record.chf().monitoring.as_ref().unwrap();
        assert_eq!(monitoring.daily_weight_required, Some(true));
        assert_eq!(monitoring.bp_required, None);
        let flags = record.chf().red_flags.as_ref().unwrap();
        assert_eq!(flags.weight_gain_trigger_24h_kg, Some(1.5));
        assert_eq!(flags.red_zone, vec!["chest pain".to_string()]);
    }
}
