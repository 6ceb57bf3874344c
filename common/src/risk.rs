use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Risk tier with total order `Low < Medium < High`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub enum RiskLevel {
    #[default]
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub const ALL: [RiskLevel; 3] = [RiskLevel::Low, RiskLevel::Medium, RiskLevel::High];

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "Low",
            RiskLevel::Medium => "Medium",
            RiskLevel::High => "High",
        }
    }

    /// Case-insensitive parse. Returns `None` for anything that is not
    /// low/medium/high so callers can pick their own fallback.
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "low" => Some(RiskLevel::Low),
            "medium" => Some(RiskLevel::Medium),
            "high" => Some(RiskLevel::High),
            _ => None,
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RiskLevel::parse(s).ok_or_else(|| {
            let known: Vec<&str> = RiskLevel::ALL.iter().map(RiskLevel::as_str).collect();
            format!("unknown risk level '{}', expected one of: {}", s, known.join(", "))
        })
    }
}

/// Normalizes an upstream risk label to `Low`, `Medium` or `High`.
///
/// Unrecognized and missing labels fall back to `Low` so that a bad label
/// never escalates an application.
pub fn transform_risk_level(input: Option<&str>) -> RiskLevel {
    input.and_then(RiskLevel::parse).unwrap_or(RiskLevel::Low)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn ordering_is_low_medium_high() {
        assert!(RiskLevel::Low < RiskLevel::Medium);
        assert!(RiskLevel::Medium < RiskLevel::High);
        assert_eq!(RiskLevel::ALL.iter().max(), Some(&RiskLevel::High));
    }

    #[test]
    fn transform_is_case_insensitive() {
        for label in ["HIGH", "high", "High", " hIgH "] {
            assert_eq!(transform_risk_level(Some(label)), RiskLevel::High);
        }
        assert_eq!(transform_risk_level(Some("MEDIUM")), RiskLevel::Medium);
        assert_eq!(transform_risk_level(Some("low")), RiskLevel::Low);
    }

    #[test]
    fn from_str_lists_known_levels() {
        assert_eq!("medium".parse::<RiskLevel>(), Ok(RiskLevel::Medium));
        assert_eq!(
            "critical".parse::<RiskLevel>(),
            Err("unknown risk level 'critical', expected one of: Low, Medium, High".to_string())
        );
    }

    #[test]
    fn transform_falls_back_to_low() {
        assert_eq!(transform_risk_level(None), RiskLevel::Low);
        assert_eq!(transform_risk_level(Some("")), RiskLevel::Low);
        assert_eq!(transform_risk_level(Some("critical")), RiskLevel::Low);
        assert_eq!(transform_risk_level(Some("n/a")), RiskLevel::Low);
    }

    #[test]
    fn display_matches_canonical_form() {
        assert_eq!(RiskLevel::Medium.to_string(), "Medium");
        assert_eq!("medium".parse::<RiskLevel>(), Ok(RiskLevel::Medium));
        assert!("severe".parse::<RiskLevel>().is_err());
    }

    proptest! {
        #[test]
        fn transform_is_idempotent(input in ".*") {
            let once = transform_risk_level(Some(&input));
            let twice = transform_risk_level(Some(once.as_str()));
            prop_assert_eq!(once, twice);
        }
    }
}
