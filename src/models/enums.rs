use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
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

str_enum!(PrescriptionStatus {
    Active => "active",
    Completed => "completed",
    Cancelled => "cancelled",
});

str_enum!(IntakeStatus {
    Taken => "taken",
    Missed => "missed",
    Skipped => "skipped",
});

str_enum!(DoseStatus {
    Pending => "pending",
    Taken => "taken",
    Missed => "missed",
    Skipped => "skipped",
});

str_enum!(AlertType {
    MissedDose => "missed_dose",
    LowAdherence => "low_adherence",
    Other => "other",
});

str_enum!(TrendGroup {
    Day => "day",
    Week => "week",
    Month => "month",
});

impl From<IntakeStatus> for DoseStatus {
    fn from(s: IntakeStatus) -> Self {
        match s {
            IntakeStatus::Taken => DoseStatus::Taken,
            IntakeStatus::Missed => DoseStatus::Missed,
            IntakeStatus::Skipped => DoseStatus::Skipped,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn prescription_status_round_trip() {
        for (variant, s) in [
            (PrescriptionStatus::Active, "active"),
            (PrescriptionStatus::Completed, "completed"),
            (PrescriptionStatus::Cancelled, "cancelled"),
        ] {
            assert_eq!(variant.as_str(), s);
            assert_eq!(PrescriptionStatus::from_str(s).unwrap(), variant);
        }
    }

    #[test]
    fn intake_status_round_trip() {
        for (variant, s) in [
            (IntakeStatus::Taken, "taken"),
            (IntakeStatus::Missed, "missed"),
            (IntakeStatus::Skipped, "skipped"),
        ] {
            assert_eq!(variant.as_str(), s);
            assert_eq!(IntakeStatus::from_str(s).unwrap(), variant);
        }
    }

    #[test]
    fn alert_type_round_trip() {
        for (variant, s) in [
            (AlertType::MissedDose, "missed_dose"),
            (AlertType::LowAdherence, "low_adherence"),
            (AlertType::Other, "other"),
        ] {
            assert_eq!(variant.as_str(), s);
            assert_eq!(AlertType::from_str(s).unwrap(), variant);
        }
    }

    #[test]
    fn intake_maps_to_dose_status() {
        assert_eq!(DoseStatus::from(IntakeStatus::Taken), DoseStatus::Taken);
        assert_eq!(DoseStatus::from(IntakeStatus::Missed), DoseStatus::Missed);
        assert_eq!(DoseStatus::from(IntakeStatus::Skipped), DoseStatus::Skipped);
    }

    #[test]
    fn invalid_enum_returns_error() {
        assert!(PrescriptionStatus::from_str("paused").is_err());
        assert!(IntakeStatus::from_str("pending").is_err());
        assert!(AlertType::from_str("").is_err());
    }
}
