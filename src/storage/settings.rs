use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use crate::privacy::{parse_flag, SettingsSource, PRIVACY_MODE_SETTING};
use crate::storage::Storage;

/// Reads the privacy mode flag from the `settings` table
pub struct StorageSettings {
    storage: Arc<dyn Storage>,
}

impl StorageSettings {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl SettingsSource for StorageSettings {
    async fn privacy_mode(&self) -> Result<Option<bool>> {
        let value = self.storage.get_setting(PRIVACY_MODE_SETTING).await?;
        Ok(value.as_deref().map(parse_flag))
    }
}
