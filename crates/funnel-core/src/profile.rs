use std::fs;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::column::Column;
use crate::suggest::SuggestionKey;

/// Everything persisted locally instead of at the remote store: the manual
/// column order, user-defined columns, and handled suggestion identities.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BoardProfile {
    #[serde(default)]
    pub column_order: Vec<String>,

    #[serde(default)]
    pub custom_columns: Vec<Column>,

    #[serde(default)]
    pub dismissed: Vec<SuggestionKey>,
}

impl BoardProfile {
    /// A missing file is a fresh profile, not an error.
    #[tracing::instrument(skip(path))]
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            debug!(file = %path.display(), "no profile yet; using defaults");
            return Ok(Self::default());
        }

        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed reading {}", path.display()))?;
        let profile: Self = serde_json::from_str(&raw)
            .with_context(|| format!("failed parsing {}", path.display()))?;
        debug!(
            columns = profile.column_order.len(),
            custom = profile.custom_columns.len(),
            dismissed = profile.dismissed.len(),
            "loaded profile"
        );
        Ok(profile)
    }

    #[tracing::instrument(skip(self, path))]
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let mut temp = NamedTempFile::new_in(dir)?;
        let serialized = serde_json::to_string_pretty(self)?;
        temp.write_all(serialized.as_bytes())?;
        temp.flush()?;
        temp.persist(path)
            .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;

        info!(file = %path.display(), "saved profile");
        Ok(())
    }
}
