use super::RegistryStore;
use crate::{RegistryState, Result};
use async_trait::async_trait;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

/// Stores the registry as one pretty-printed JSON document.
///
/// Writes go to a temporary file in the same directory which is then renamed
/// over the target, so a failed save never leaves a truncated document.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn parent_dir(&self) -> PathBuf {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }
}

#[async_trait]
impl RegistryStore for JsonFileStore {
    async fn load(&self) -> Result<RegistryState> {
        if !self.path.exists() {
            debug!("No registry file at {}, starting empty", self.path.display());
            return Ok(RegistryState::default());
        }

        let text = tokio::fs::read_to_string(&self.path).await?;
        if text.trim().is_empty() {
            return Ok(RegistryState::default());
        }
        Ok(serde_json::from_str(&text)?)
    }

    async fn save(&self, state: &RegistryState) -> Result<()> {
        let dir = self.parent_dir();
        std::fs::create_dir_all(&dir)?;

        let json = serde_json::to_vec_pretty(state)?;
        let mut file = NamedTempFile::new_in(&dir)?;
        file.write_all(&json)?;
        file.flush()?;
        file.persist(&self.path).map_err(|e| e.error)?;

        debug!("Saved {} queries to {}", state.query_count(), self.path.display());
        Ok(())
    }
}
