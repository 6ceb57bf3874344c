use serde::{Deserialize, Serialize};
use std::fmt;

/// The five rubric dimensions an application is scored on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Category {
    DataPrivacy,
    SecurityAccess,
    BusinessImpact,
    AiGovernance,
    VendorProfile,
}

impl Category {
    /// Rubric order. `Average 1` is data privacy, `Average 5` vendor profile.
    pub const ALL: [Category; 5] = [
        Category::DataPrivacy,
        Category::SecurityAccess,
        Category::BusinessImpact,
        Category::AiGovernance,
        Category::VendorProfile,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Category::DataPrivacy => "Data Privacy",
            Category::SecurityAccess => "Security & Access",
            Category::BusinessImpact => "Business Impact",
            Category::AiGovernance => "AI Governance",
            Category::VendorProfile => "Vendor Profile",
        }
    }

    pub fn key(&self) -> &'static str {
        match self {
            Category::DataPrivacy => "dataPrivacy",
            Category::SecurityAccess => "securityAccess",
            Category::BusinessImpact => "businessImpact",
            Category::AiGovernance => "aiGovernance",
            Category::VendorProfile => "vendorProfile",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One value per category. Every field is required, so a table missing a
/// category fails to deserialize instead of yielding a silent gap.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryValues<T> {
    pub data_privacy: T,
    pub security_access: T,
    pub business_impact: T,
    pub ai_governance: T,
    pub vendor_profile: T,
}

impl<T> CategoryValues<T> {
    pub fn from_fn(mut f: impl FnMut(Category) -> T) -> Self {
        Self {
            data_privacy: f(Category::DataPrivacy),
            security_access: f(Category::SecurityAccess),
            business_impact: f(Category::BusinessImpact),
            ai_governance: f(Category::AiGovernance),
            vendor_profile: f(Category::VendorProfile),
        }
    }

    pub fn get(&self, category: Category) -> &T {
        match category {
            Category::DataPrivacy => &self.data_privacy,
            Category::SecurityAccess => &self.security_access,
            Category::BusinessImpact => &self.business_impact,
            Category::AiGovernance => &self.ai_governance,
            Category::VendorProfile => &self.vendor_profile,
        }
    }

    pub fn get_mut(&mut self, category: Category) -> &mut T {
        match category {
            Category::DataPrivacy => &mut self.data_privacy,
            Category::SecurityAccess => &mut self.security_access,
            Category::BusinessImpact => &mut self.business_impact,
            Category::AiGovernance => &mut self.ai_governance,
            Category::VendorProfile => &mut self.vendor_profile,
        }
    }

    pub fn map<U>(&self, mut f: impl FnMut(Category, &T) -> U) -> CategoryValues<U> {
        CategoryValues::from_fn(|c| f(c, self.get(c)))
    }

    pub fn iter(&self) -> impl Iterator<Item = (Category, &T)> {
        Category::ALL.into_iter().map(move |c| (c, self.get(c)))
    }
}

impl<T: Copy> CategoryValues<T> {
    pub fn splat(value: T) -> Self {
        Self::from_fn(|_| value)
    }
}

impl CategoryValues<f64> {
    pub fn sum(&self) -> f64 {
        self.iter().map(|(_, v)| *v).sum()
    }
}
