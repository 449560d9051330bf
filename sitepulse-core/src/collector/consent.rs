//! Durable storage for the tracking consent flag

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::{Error, Result};

/// Persists whether the user agreed to tracking
pub trait ConsentStore: Send + Sync {
    /// Stored consent, or `None` if the user never decided
    fn load(&self) -> Result<Option<bool>>;

    fn save(&self, enabled: bool) -> Result<()>;
}

#[derive(Debug, Serialize, Deserialize)]
struct ConsentRecord {
    enabled: bool,
    updated_at: chrono::DateTime<chrono::Utc>,
}

/// Consent kept as a small JSON file
#[derive(Debug, Clone)]
pub struct FileConsentStore {
    path: PathBuf,
}

impl FileConsentStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at `$XDG_STATE_HOME/sitepulse/consent.json`
    pub fn default_location() -> Self {
        Self::new(Config::consent_path())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConsentStore for FileConsentStore {
    fn load(&self) -> Result<Option<bool>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&self.path)?;
        let record: ConsentRecord = serde_json::from_str(&content)?;
        Ok(Some(record.enabled))
    }

    fn save(&self, enabled: bool) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let record = ConsentRecord {
            enabled,
            updated_at: chrono::Utc::now(),
        };
        let data = serde_json::to_vec_pretty(&record)?;

        // Write to a temp file and rename so a crash never leaves half a record
        let temp_path = self.path.with_extension("tmp");
        std::fs::write(&temp_path, data)?;
        std::fs::rename(temp_path, &self.path)?;
        Ok(())
    }
}

/// In-memory consent, for tests and embedders without durable storage
#[derive(Debug, Default)]
pub struct MemoryConsentStore {
    value: Mutex<Option<bool>>,
}

impl MemoryConsentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that already holds a granted consent
    pub fn granted() -> Self {
        Self {
            value: Mutex::new(Some(true)),
        }
    }
}

impl ConsentStore for MemoryConsentStore {
    fn load(&self) -> Result<Option<bool>> {
        self.value
            .lock()
            .map(|value| *value)
            .map_err(|_| Error::Storage("consent lock poisoned".to_string()))
    }

    fn save(&self, enabled: bool) -> Result<()> {
        let mut value = self
            .value
            .lock()
            .map_err(|_| Error::Storage("consent lock poisoned".to_string()))?;
        *value = Some(enabled);
        Ok(())
    }
}
