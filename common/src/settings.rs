use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::category::{Category, CategoryValues};

pub const WEIGHT_TOTAL: f64 = 100.0;
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;
pub const MIN_MULTIPLIER: f64 = 1.0;
pub const MAX_MULTIPLIER: f64 = 3.0;

/// Reasons a settings object is refused at save time.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SettingsError {
    #[error("Bucket weights must sum to {expected}, got {actual}")]
    WeightSum { expected: f64, actual: f64 },

    #[error("Weight for {category} must be a finite, non-negative number, got {value}")]
    InvalidWeight { category: Category, value: f64 },

    #[error("{table} multiplier '{tier}' for {category} must be within [{min}, {max}], got {value}")]
    MultiplierOutOfRange {
        table: &'static str,
        tier: &'static str,
        category: Category,
        value: f64,
        min: f64,
        max: f64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AiMultipliers {
    pub native: CategoryValues<f64>,
    pub partial: CategoryValues<f64>,
    pub none: CategoryValues<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScopeMultipliers {
    pub high: CategoryValues<f64>,
    pub medium: CategoryValues<f64>,
    pub low: CategoryValues<f64>,
}

/// Organization-wide scoring configuration. Replaced as a whole on save and
/// passed by reference into every scoring call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrgSettings {
    pub bucket_weights: CategoryValues<f64>,
    pub ai_multipliers: AiMultipliers,
    pub scope_multipliers: ScopeMultipliers,
}

impl Default for OrgSettings {
    fn default() -> Self {
        Self {
            bucket_weights: values([25.0, 25.0, 20.0, 15.0, 15.0]),
            ai_multipliers: AiMultipliers {
                native: values([1.5, 1.6, 1.3, 2.0, 1.2]),
                partial: values([1.2, 1.3, 1.1, 1.5, 1.1]),
                none: CategoryValues::splat(1.0),
            },
            scope_multipliers: ScopeMultipliers {
                high: values([1.8, 2.0, 1.4, 1.2, 1.3]),
                medium: values([1.3, 1.4, 1.2, 1.1, 1.1]),
                low: CategoryValues::splat(1.0),
            },
        }
    }
}

fn values(v: [f64; 5]) -> CategoryValues<f64> {
    CategoryValues {
        data_privacy: v[0],
        security_access: v[1],
        business_impact: v[2],
        ai_governance: v[3],
        vendor_profile: v[4],
    }
}

impl OrgSettings {
    pub fn weight_sum(&self) -> f64 {
        self.bucket_weights.sum()
    }

    /// Checks the save-time invariants: weights are non-negative and sum to
    /// 100, every multiplier lies within the allowed range.
    pub fn validate(&self) -> Result<(), SettingsError> {
        for (category, value) in self.bucket_weights.iter() {
            if !value.is_finite() || *value < 0.0 {
                return Err(SettingsError::InvalidWeight { category, value: *value });
            }
        }

        let actual = self.weight_sum();
        if (actual - WEIGHT_TOTAL).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(SettingsError::WeightSum { expected: WEIGHT_TOTAL, actual });
        }

        let tables = [
            ("AI", "native", &self.ai_multipliers.native),
            ("AI", "partial", &self.ai_multipliers.partial),
            ("AI", "none", &self.ai_multipliers.none),
            ("Scope", "high", &self.scope_multipliers.high),
            ("Scope", "medium", &self.scope_multipliers.medium),
            ("Scope", "low", &self.scope_multipliers.low),
        ];
        for (table, tier, row) in tables {
            for (category, value) in row.iter() {
                if !(MIN_MULTIPLIER..=MAX_MULTIPLIER).contains(value) {
                    return Err(SettingsError::MultiplierOutOfRange {
                        table,
                        tier,
                        category,
                        value: *value,
                        min: MIN_MULTIPLIER,
                        max: MAX_MULTIPLIER,
                    });
                }
            }
        }
        Ok(())
    }
}
