//! Repair run configuration

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::error::Error;
use crate::core::types::Result;
use crate::storage::chunk::{DEFAULT_WORLD_HEIGHT, MAX_WORLD_HEIGHT, SECTION_HEIGHT};
use super::fixer::{RemapRule, RemapTable};

/// Settings for a repair run, stored as JSON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepairConfig {
    /// Block layers per chunk column; blocks above it are left untouched
    pub world_height: u32,
    /// Log an info line every N chunks (0 = only at the end)
    pub progress_log_interval: usize,
    /// Remap rules for [`RemapTable`]
    pub rules: Vec<RemapRule>,
}

impl Default for RepairConfig {
    fn default() -> Self {
        Self {
            world_height: DEFAULT_WORLD_HEIGHT,
            progress_log_interval: 64,
            rules: Vec::new(),
        }
    }
}

impl RepairConfig {
    /// Check values that serde can't
    pub fn validate(&self) -> Result<()> {
        if self.world_height == 0
            || self.world_height > MAX_WORLD_HEIGHT
            || self.world_height as usize % SECTION_HEIGHT != 0
        {
            return Err(Error::Config(format!(
                "world_height must be a multiple of {} in 1..={}, got {}",
                SECTION_HEIGHT, MAX_WORLD_HEIGHT, self.world_height
            )));
        }
        Ok(())
    }

    /// Build the remap table described by `rules`
    pub fn remap_table(&self) -> RemapTable {
        RemapTable::from_rules(&self.rules)
    }

    /// Save to file (sync)
    pub fn save_sync(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| Error::Config(e.to_string()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load and validate from file (sync)
    pub fn load_sync(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;
        let config: Self = serde_json::from_str(&json)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repair::fixer::BlockFixer;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_from_empty_json() {
        let config: RepairConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, RepairConfig::default());
        assert_eq!(config.world_height, 256);
    }

    #[test]
    fn test_save_load() {
        let dir = TempDir::new().expect("failed to create temp dir");
        let path = dir.path().join("nested").join("repair.json");

        let config = RepairConfig {
            world_height: 128,
            progress_log_interval: 10,
            rules: vec![RemapRule::id(1, 2), RemapRule::exact((3, 1), (4, 0))],
        };
        config.save_sync(&path).unwrap();

        let loaded = RepairConfig::load_sync(&path).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.remap_table().fix(1, 5), (2, 5));
    }

    #[test]
    fn test_invalid_height() {
        let dir = TempDir::new().expect("failed to create temp dir");
        let path = dir.path().join("repair.json");
        std::fs::write(&path, r#"{"world_height": 100}"#).unwrap();

        assert!(matches!(RepairConfig::load_sync(&path), Err(Error::Config(_))));

        let too_tall = RepairConfig { world_height: MAX_WORLD_HEIGHT + 16, ..Default::default() };
        assert!(matches!(too_tall.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_malformed_json() {
        let dir = TempDir::new().expect("failed to create temp dir");
        let path = dir.path().join("repair.json");
        std::fs::write(&path, "{ not json").unwrap();

        assert!(matches!(RepairConfig::load_sync(&path), Err(Error::Config(_))));
        assert!(matches!(
            RepairConfig::load_sync(&dir.path().join("missing.json")),
            Err(Error::Config(_))
        ));
    }
}
