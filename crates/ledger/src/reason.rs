//! Closed vocabulary of manual adjustment reasons.

use serde::{Deserialize, Serialize};

/// Why a manual stock correction was made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdjustmentReason {
    Breakage,
    Theft,
    Spillage,
    Damage,
    Expired,
    Lost,
    Found,
    Recount,
    SupplierError,
    ReturnToSupplier,
    QualityControl,
    SampleUsed,
    WriteOff,
}

impl AdjustmentReason {
    /// Every allowed reason.
    pub const ALL: [AdjustmentReason; 13] = [
        AdjustmentReason::Breakage,
        AdjustmentReason::Theft,
        AdjustmentReason::Spillage,
        AdjustmentReason::Damage,
        AdjustmentReason::Expired,
        AdjustmentReason::Lost,
        AdjustmentReason::Found,
        AdjustmentReason::Recount,
        AdjustmentReason::SupplierError,
        AdjustmentReason::ReturnToSupplier,
        AdjustmentReason::QualityControl,
        AdjustmentReason::SampleUsed,
        AdjustmentReason::WriteOff,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AdjustmentReason::Breakage => "BREAKAGE",
            AdjustmentReason::Theft => "THEFT",
            AdjustmentReason::Spillage => "SPILLAGE",
            AdjustmentReason::Damage => "DAMAGE",
            AdjustmentReason::Expired => "EXPIRED",
            AdjustmentReason::Lost => "LOST",
            AdjustmentReason::Found => "FOUND",
            AdjustmentReason::Recount => "RECOUNT",
            AdjustmentReason::SupplierError => "SUPPLIER_ERROR",
            AdjustmentReason::ReturnToSupplier => "RETURN_TO_SUPPLIER",
            AdjustmentReason::QualityControl => "QUALITY_CONTROL",
            AdjustmentReason::SampleUsed => "SAMPLE_USED",
            AdjustmentReason::WriteOff => "WRITE_OFF",
        }
    }
}

impl std::fmt::Display for AdjustmentReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string is not an allowed adjustment reason.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown adjustment reason: {0}")]
pub struct ParseAdjustmentReasonError(pub String);

impl std::str::FromStr for AdjustmentReason {
    type Err = ParseAdjustmentReasonError;

    /// Matches the exact upper-case form; anything else is rejected.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AdjustmentReason::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| ParseAdjustmentReasonError(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_reason_round_trips_through_its_text_form() {
        for reason in AdjustmentReason::ALL {
            assert_eq!(reason.as_str().parse::<AdjustmentReason>().unwrap(), reason);
        }
    }

    #[test]
    fn unknown_and_lowercase_reasons_are_rejected() {
        assert!("NOT_A_REASON".parse::<AdjustmentReason>().is_err());
        assert!("breakage".parse::<AdjustmentReason>().is_err());
        assert!("".parse::<AdjustmentReason>().is_err());
    }

    #[test]
    fn serde_uses_the_same_text_form() {
        let json = serde_json::to_string(&AdjustmentReason::ReturnToSupplier).unwrap();
        assert_eq!(json, "\"RETURN_TO_SUPPLIER\"");
        let parsed: AdjustmentReason = serde_json::from_str("\"SAMPLE_USED\"").unwrap();
        assert_eq!(parsed, AdjustmentReason::SampleUsed);
    }
}
