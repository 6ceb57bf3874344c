//! Risk classification, aggregation and scoring for third-party apps
//! connected to an organization's identity provider.

pub mod aggregate;
pub mod category;
pub mod config;
pub mod ingest;
pub mod inventory;
pub mod ipc;
pub mod matching;
pub mod risk;
pub mod scopes;
pub mod scoring;
pub mod settings;
pub mod types;

pub use aggregate::{
    application_risk_level, assess_application, assess_user, determine_risk_level, RiskAssessment,
};
pub use category::{Category, CategoryValues};
pub use config::{Config, IngestConfig, IpcConfig, StorageConfig};
pub use ipc::{IpcRequest, IpcResponse};
pub use risk::{transform_risk_level, RiskLevel};
pub use scopes::{classify_scope, evaluate_single_scope_risk};
pub use scoring::{compute_risk_score, score_application, AiTier, RiskScore, ScopeTier};
pub use settings::{OrgSettings, SettingsError};
pub use types::{AppUser, Application, ManagementStatus, Scope};
