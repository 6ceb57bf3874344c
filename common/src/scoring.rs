//! Weighted, multi-factor Total App Risk Score.
//!
//! ```text
//! base_k  = avg_k * weight_k / 100 * 2
//! ai_k    = base_k * ai_multiplier[tier]_k
//! scope_k = ai_k * scope_multiplier[tier]_k
//! total   = Base * (AI / Base) * (Scope / AI)
//! ```
//!
//! The two ratios are kept as separate figures so the chain can be shown
//! to an auditor; a zero denominator yields a ratio of 1.0.

use serde::{Deserialize, Serialize};

use crate::aggregate::application_risk_level;
use crate::category::CategoryValues;
use crate::risk::RiskLevel;
use crate::settings::OrgSettings;
use crate::types::Application;

/// Applications whose access does not come from identity-provider OAuth
/// grants. Their displayed total leaves out scope amplification.
pub const NO_SCOPE_RISK_APPS: &[&str] = &[
    "ChatGPT",
    "Claude",
    "Gemini",
    "Perplexity",
    "Midjourney",
    "DeepL",
    "Grammarly",
    "Otter.ai",
];

const BASE_SCALE: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AiTier {
    Native,
    Partial,
    None,
}

impl AiTier {
    /// Classifies the free-text Gen-AI status. Anything that is not clearly
    /// native or partial counts as `None`.
    pub fn from_status(status: &str) -> Self {
        let lowered = status.trim().to_ascii_lowercase();
        let compact: String = lowered.chars().filter(|c| c.is_ascii_alphanumeric()).collect();
        if compact.contains("genai") || lowered.contains("native") || lowered.contains("yes") {
            AiTier::Native
        } else if lowered.contains("partial") {
            AiTier::Partial
        } else {
            AiTier::None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AiTier::Native => "native",
            AiTier::Partial => "partial",
            AiTier::None => "none",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScopeTier {
    High,
    Medium,
    Low,
}

impl ScopeTier {
    /// Parses a loosely-cased tier label; unknown labels map to `Medium`.
    pub fn from_label(label: &str) -> Self {
        RiskLevel::parse(label).map_or(ScopeTier::Medium, ScopeTier::from)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ScopeTier::High => "high",
            ScopeTier::Medium => "medium",
            ScopeTier::Low => "low",
        }
    }
}

impl From<RiskLevel> for ScopeTier {
    fn from(level: RiskLevel) -> Self {
        match level {
            RiskLevel::High => ScopeTier::High,
            RiskLevel::Medium => ScopeTier::Medium,
            RiskLevel::Low => ScopeTier::Low,
        }
    }
}

impl OrgSettings {
    pub fn ai_multipliers_for(&self, tier: AiTier) -> &CategoryValues<f64> {
        match tier {
            AiTier::Native => &self.ai_multipliers.native,
            AiTier::Partial => &self.ai_multipliers.partial,
            AiTier::None => &self.ai_multipliers.none,
        }
    }

    pub fn scope_multipliers_for(&self, tier: ScopeTier) -> &CategoryValues<f64> {
        match tier {
            ScopeTier::High => &self.scope_multipliers.high,
            ScopeTier::Medium => &self.scope_multipliers.medium,
            ScopeTier::Low => &self.scope_multipliers.low,
        }
    }
}

/// Intermediate figures for one category.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CategoryScore {
    pub average: f64,
    pub weight: f64,
    pub base: f64,
    pub ai_multiplier: f64,
    pub ai: f64,
    pub scope_multiplier: f64,
    pub scope: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskScore {
    pub ai_tier: AiTier,
    pub scope_tier: ScopeTier,
    pub categories: CategoryValues<CategoryScore>,
    pub base_score: f64,
    pub ai_score: f64,
    pub scope_score: f64,
    pub ai_amplification: f64,
    pub scope_amplification: f64,
    /// `base * ai_amplification * scope_amplification`.
    pub total_score: f64,
    /// False for apps on [`NO_SCOPE_RISK_APPS`].
    pub scope_risk_applicable: bool,
    /// The figure shown to users; drops the scope term for exempt apps.
    pub displayed_total: f64,
}

impl RiskScore {
    pub fn formula(&self) -> String {
        if self.scope_risk_applicable {
            format!(
                "{:.2} × {:.2} × {:.2} = {:.2}",
                self.base_score, self.ai_amplification, self.scope_amplification, self.displayed_total
            )
        } else {
            format!(
                "{:.2} × {:.2} = {:.2}",
                self.base_score, self.ai_amplification, self.displayed_total
            )
        }
    }
}

pub fn amplification(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else {
        1.0
    }
}

/// Scores rubric averages against the given tiers and settings.
pub fn compute_risk_score(
    averages: &CategoryValues<f64>,
    ai_tier: AiTier,
    scope_tier: ScopeTier,
    settings: &OrgSettings,
) -> RiskScore {
    let ai_row = settings.ai_multipliers_for(ai_tier);
    let scope_row = settings.scope_multipliers_for(scope_tier);

    let categories = averages.map(|category, average| {
        let weight = *settings.bucket_weights.get(category);
        let base = average * (weight / 100.0) * BASE_SCALE;
        let ai_multiplier = *ai_row.get(category);
        let ai = base * ai_multiplier;
        let scope_multiplier = *scope_row.get(category);
        CategoryScore {
            average: *average,
            weight,
            base,
            ai_multiplier,
            ai,
            scope_multiplier,
            scope: ai * scope_multiplier,
        }
    });

    let base_score: f64 = categories.iter().map(|(_, c)| c.base).sum();
    let ai_score: f64 = categories.iter().map(|(_, c)| c.ai).sum();
    let scope_score: f64 = categories.iter().map(|(_, c)| c.scope).sum();

    let ai_amplification = amplification(ai_score, base_score);
    let scope_amplification = amplification(scope_score, ai_score);
    let total_score = base_score * ai_amplification * scope_amplification;

    RiskScore {
        ai_tier,
        scope_tier,
        categories,
        base_score,
        ai_score,
        scope_score,
        ai_amplification,
        scope_amplification,
        total_score,
        scope_risk_applicable: true,
        displayed_total: total_score,
    }
}

pub fn has_scope_risk(app_name: &str) -> bool {
    let name = app_name.trim();
    !NO_SCOPE_RISK_APPS.iter().any(|exempt| exempt.eq_ignore_ascii_case(name))
}

/// Full pipeline for one application: AI tier from its Gen-AI status, scope
/// tier from its aggregated user risk, and the allow-list exemption.
pub fn score_application(app: &Application, settings: &OrgSettings) -> RiskScore {
    let ai_tier = AiTier::from_status(&app.gen_ai_status);
    let scope_tier = ScopeTier::from(application_risk_level(&app.users));
    let mut score = compute_risk_score(&app.rubric, ai_tier, scope_tier, settings);
    if !has_scope_risk(&app.name) {
        score.scope_risk_applicable = false;
        score.displayed_total = score.base_score * score.ai_amplification;
    }
    score
}
