use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $s)] $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }
    };
}

str_enum!(ObligationKind {
    Medication => "medication",
    Weight => "weight",
    BloodPressure => "bp",
    SymptomCheck => "symptom_check",
});

str_enum!(VitalKind {
    Weight => "weight",
    BloodPressure => "bp",
    SymptomCheck => "symptom_check",
});

str_enum!(AckStatus {
    Taken => "taken",
    Skipped => "skipped",
});

str_enum!(PatientStatus {
    Active => "active",
    Discharged => "discharged",
});

str_enum!(RosterStatus {
    Good => "good",
    AtRisk => "at_risk",
    Critical => "critical",
});

str_enum!(CarePhase {
    Days0To7 => "days_0_7",
    Days8To30 => "days_8_30",
    Days31To90 => "days_31_90",
});

str_enum!(TriggerType {
    MissedWeight => "missed_weight",
    ConsecutiveMissedWeight => "consecutive_missed_weight",
    MissedMedication => "missed_medication",
    WeightSpike24h => "weight_spike_24h",
    WeightSpike7d => "weight_spike_7d",
    RedFlag => "red_flag",
});

str_enum!(EscalationStatus {
    Open => "open",
    Acknowledged => "acknowledged",
    Resolved => "resolved",
});

str_enum!(NoteType {
    General => "general",
    Call => "call",
    MedicationChange => "medication_change",
    EscalationFollowup => "escalation_followup",
});

str_enum!(MilestoneKind {
    NurseCheckin => "nurse_checkin",
    Appointment => "appointment",
});

impl VitalKind {
    pub fn obligation_kind(self) -> ObligationKind {
        match self {
            VitalKind::Weight => ObligationKind::Weight,
            VitalKind::BloodPressure => ObligationKind::BloodPressure,
            VitalKind::SymptomCheck => ObligationKind::SymptomCheck,
        }
    }
}

impl ObligationKind {
    /// The vital this obligation is fulfilled by, `None` for medication doses.
    pub fn vital_kind(self) -> Option<VitalKind> {
        match self {
            ObligationKind::Medication => None,
            ObligationKind::Weight => Some(VitalKind::Weight),
            ObligationKind::BloodPressure => Some(VitalKind::BloodPressure),
            ObligationKind::SymptomCheck => Some(VitalKind::SymptomCheck),
        }
    }
}

impl TriggerType {
    /// Alert level each trigger opens at: 1 warning, 2 critical.
    pub fn level(self) -> u8 {
        match self {
            TriggerType::MissedWeight | TriggerType::MissedMedication => 1,
            TriggerType::ConsecutiveMissedWeight
            | TriggerType::WeightSpike24h
            | TriggerType::WeightSpike7d
            | TriggerType::RedFlag => 2,
        }
    }

    /// Triggers raised by the periodic sweep rather than by a ledger write.
    pub fn is_missed_obligation(self) -> bool {
        matches!(
            self,
            TriggerType::MissedWeight
                | TriggerType::ConsecutiveMissedWeight
                | TriggerType::MissedMedication
        )
    }
}

impl CarePhase {
    pub fn for_day(care_plan_day: i64) -> Self {
        if care_plan_day <= 7 {
            CarePhase::Days0To7
        } else if care_plan_day <= 30 {
            CarePhase::Days8To30
        } else {
            CarePhase::Days31To90
        }
    }
}

impl EscalationStatus {
    pub fn is_terminal(self) -> bool {
        self == EscalationStatus::Resolved
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn obligation_kind_round_trip() {
        for (variant, s) in [
            (ObligationKind::Medication, "medication"),
            (ObligationKind::Weight, "weight"),
            (ObligationKind::BloodPressure, "bp"),
            (ObligationKind::SymptomCheck, "symptom_check"),
        ] {
            assert_eq!(variant.as_str(), s);
            assert_eq!(ObligationKind::from_str(s).unwrap(), variant);
        }
    }

    #[test]
    fn trigger_levels_match_catalogue() {
        assert_eq!(TriggerType::MissedWeight.level(), 1);
        assert_eq!(TriggerType::MissedMedication.level(), 1);
        assert_eq!(TriggerType::ConsecutiveMissedWeight.level(), 2);
        assert_eq!(TriggerType::WeightSpike24h.level(), 2);
        assert_eq!(TriggerType::WeightSpike7d.level(), 2);
        assert_eq!(TriggerType::RedFlag.level(), 2);
    }

    #[test]
    fn phase_boundaries() {
        assert_eq!(CarePhase::for_day(0), CarePhase::Days0To7);
        assert_eq!(CarePhase::for_day(7), CarePhase::Days0To7);
        assert_eq!(CarePhase::for_day(8), CarePhase::Days8To30);
        assert_eq!(CarePhase::for_day(30), CarePhase::Days8To30);
        assert_eq!(CarePhase::for_day(31), CarePhase::Days31To90);
        assert_eq!(CarePhase::for_day(120), CarePhase::Days31To90);
    }

    #[test]
    fn serde_uses_wire_names() {
        let json = serde_json::to_string(&TriggerType::WeightSpike24h).unwrap();
        assert_eq!(json, "\"weight_spike_24h\"");
        let kind: VitalKind = serde_json::from_str("\"bp\"").unwrap();
        assert_eq!(kind, VitalKind::BloodPressure);
    }

    #[test]
    fn invalid_enum_returns_error() {
        assert!(TriggerType::from_str("missed_lunch").is_err());
        assert!(EscalationStatus::from_str("").is_err());
    }
}
