use anyhow::{Context, Result};
use async_trait::async_trait;
use common::OrgSettings;
use log::{info, warn};

use crate::storage::Storage;

/// Persistence for the organization's scoring settings. The whole object is
/// read and replaced; there is no partial update.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Saved settings, or the defaults when nothing was saved yet.
    async fn load_settings(&self) -> Result<OrgSettings>;

    /// Unconditional replace. Callers go through [`save_settings`].
    async fn replace_settings(&self, settings: &OrgSettings) -> Result<()>;
}

/// Validates, then replaces the stored settings. Invalid settings leave the
/// store untouched.
pub async fn save_settings(store: &dyn SettingsStore, settings: &OrgSettings) -> Result<()> {
    if let Err(e) = settings.validate() {
        warn!("Rejected settings update: {}", e);
        return Err(e.into());
    }
    store.replace_settings(settings).await?;
    info!("Organization settings updated (weights sum {})", settings.weight_sum());
    Ok(())
}

#[async_trait]
impl SettingsStore for Storage {
    async fn load_settings(&self) -> Result<OrgSettings> {
        match self.read_settings_body().await? {
            Some(body) => serde_json::from_str(&body).context("Stored settings are corrupt"),
            None => Ok(OrgSettings::default()),
        }
    }

    async fn replace_settings(&self, settings: &OrgSettings) -> Result<()> {
        let body = serde_json::to_string(settings)?;
        self.write_settings_body(&body).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::SettingsError;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct MemoryStore {
        saved: Mutex<Option<OrgSettings>>,
    }

    #[async_trait]
    impl SettingsStore for MemoryStore {
        async fn load_settings(&self) -> Result<OrgSettings> {
            Ok(self.saved.lock().await.unwrap_or_default())
        }

        async fn replace_settings(&self, settings: &OrgSettings) -> Result<()> {
            *self.saved.lock().await = Some(*settings);
            Ok(())
        }
    }

    fn reweighted() -> OrgSettings {
        let mut settings = OrgSettings::default();
        settings.bucket_weights.data_privacy = 40.0;
        settings.bucket_weights.security_access = 10.0;
        settings
    }

    #[tokio::test]
    async fn invalid_settings_never_reach_the_store() {
        let store = MemoryStore::default();
        let mut bad = OrgSettings::default();
        bad.bucket_weights.data_privacy = 90.0;

        let err = save_settings(&store, &bad).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<SettingsError>(), Some(SettingsError::WeightSum { .. })));
        assert!(store.saved.lock().await.is_none());
    }

    #[tokio::test]
    async fn valid_settings_replace_the_whole_object() {
        let store = MemoryStore::default();
        save_settings(&store, &reweighted()).await.unwrap();
        assert_eq!(store.load_settings().await.unwrap(), reweighted());
    }

    #[tokio::test]
    async fn sqlite_store_defaults_then_persists() {
        let storage = Storage::in_memory().await.unwrap();
        assert_eq!(storage.load_settings().await.unwrap(), OrgSettings::default());

        save_settings(&storage, &reweighted()).await.unwrap();
        assert_eq!(storage.load_settings().await.unwrap(), reweighted());

        let mut bad = reweighted();
        bad.ai_multipliers.native.ai_governance = 9.0;
        assert!(save_settings(&storage, &bad).await.is_err());
        assert_eq!(storage.load_settings().await.unwrap(), reweighted());
    }
}
