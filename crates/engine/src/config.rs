//! Configuration via `datasync.toml`
//!
//! On first open, a default `datasync.toml` is written to the data
//! directory. Edit the file and call [`DataSync::reload`] to apply the
//! serializer list, retention and auto interval without a restart. The
//! backend is only read at open.
//!
//! [`DataSync::reload`]: crate::DataSync::reload

use crate::retention::RetentionPolicy;
use crate::serializer::modules;
use datasync_core::{Error, Result};
use datasync_storage::BackendKind;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Config file name placed in the data directory.
pub const CONFIG_FILE_NAME: &str = "datasync.toml";

/// Longest accepted automatic sweep interval (one year).
pub const MAX_AUTO_INTERVAL_MINUTES: u64 = 366 * 24 * 60;

/// Convert a minutes setting, rejecting values that overflow as seconds
fn minutes(value: u64, field: &str) -> Result<Duration> {
    value
        .checked_mul(60)
        .map(Duration::from_secs)
        .ok_or_else(|| Error::InvalidConfig(format!("{} is too large in datasync.toml", field)))
}

/// Which serializer modules run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SerializeConfig {
    /// Module names, built-in or registered by the host
    #[serde(default = "default_enabled")]
    pub enabled: Vec<String>,
}

fn default_enabled() -> Vec<String> {
    modules::BUILTIN_NAMES.iter().map(|n| n.to_string()).collect()
}

impl Default for SerializeConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
        }
    }
}

/// Sweep and retention settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OptimizationConfig {
    /// `"keep_all"`, `"keep_last"` or `"keep_for"`
    #[serde(default = "default_retention")]
    pub retention: String,
    /// Snapshots kept per user under `keep_last`
    #[serde(default = "default_keep_last")]
    pub keep_last: usize,
    /// Age limit under `keep_for`
    #[serde(default = "default_keep_for_minutes")]
    pub keep_for_minutes: u64,
    /// Minutes between automatic sweeps; 0 disables them
    #[serde(default)]
    pub auto_interval_minutes: u64,
}

fn default_retention() -> String {
    "keep_all".to_string()
}

fn default_keep_last() -> usize {
    10
}

fn default_keep_for_minutes() -> u64 {
    7 * 24 * 60
}

impl Default for OptimizationConfig {
    fn default() -> Self {
        Self {
            retention: default_retention(),
            keep_last: default_keep_last(),
            keep_for_minutes: default_keep_for_minutes(),
            auto_interval_minutes: 0,
        }
    }
}

/// Configuration loaded from `datasync.toml`.
///
/// # Example
///
/// ```toml
/// backend = "document"
///
/// [serialize]
/// enabled = ["datasync:experience", "datasync:health"]
///
/// [optimization]
/// retention = "keep_last"
/// keep_last = 5
/// auto_interval_minutes = 15
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DataSyncConfig {
    /// Storage backend
    #[serde(default)]
    pub backend: BackendKind,
    /// Serializer modules
    #[serde(default)]
    pub serialize: SerializeConfig,
    /// Sweeps and retention
    #[serde(default)]
    pub optimization: OptimizationConfig,
}

impl DataSyncConfig {
    /// Storage backend selected by this config.
    pub fn backend_kind(&self) -> BackendKind {
        self.backend
    }

    /// Parse the retention settings into a policy.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown policy name or a zero limit.
    pub fn retention_policy(&self) -> Result<RetentionPolicy> {
        let opt = &self.optimization;
        match opt.retention.as_str() {
            "keep_all" => Ok(RetentionPolicy::KeepAll),
            "keep_last" if opt.keep_last == 0 => Err(Error::InvalidConfig(
                "keep_last must be at least 1 in datasync.toml".to_string(),
            )),
            "keep_last" => Ok(RetentionPolicy::keep_last(opt.keep_last)),
            "keep_for" if opt.keep_for_minutes == 0 => Err(Error::InvalidConfig(
                "keep_for_minutes must be at least 1 in datasync.toml".to_string(),
            )),
            "keep_for" => Ok(RetentionPolicy::keep_for(minutes(
                opt.keep_for_minutes,
                "keep_for_minutes",
            )?)),
            other => Err(Error::InvalidConfig(format!(
                "Invalid retention '{}' in datasync.toml. Expected \"keep_all\", \"keep_last\" or \"keep_for\".",
                other
            ))),
        }
    }

    /// Period of the automatic sweep, `None` when disabled.
    ///
    /// Values above [`MAX_AUTO_INTERVAL_MINUTES`] are clamped; validated
    /// configs never carry one.
    pub fn auto_interval(&self) -> Option<Duration> {
        match self.optimization.auto_interval_minutes {
            0 => None,
            m => Some(Duration::from_secs(m.min(MAX_AUTO_INTERVAL_MINUTES) * 60)),
        }
    }

    /// Check every setting that can be wrong after parsing.
    pub fn validate(&self) -> Result<()> {
        self.retention_policy()?;
        if self.optimization.auto_interval_minutes > MAX_AUTO_INTERVAL_MINUTES {
            return Err(Error::InvalidConfig(format!(
                "auto_interval_minutes must be at most {} in datasync.toml",
                MAX_AUTO_INTERVAL_MINUTES
            )));
        }
        Ok(())
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# DataSync configuration
#
# Storage backend: "document" (default) or "embedded"
#   "document" = SQLite file with JSON documents
#   "embedded" = transactional key-value store
# Changing the backend requires a restart; data is not migrated.
backend = "document"

[serialize]
# Modules captured in every snapshot. Host modules use "namespace:feature".
enabled = [
    "datasync:experience",
    "datasync:gameMode",
    "datasync:health",
    "datasync:hunger",
    "datasync:inventory",
]

[optimization]
# History kept per user after a sweep: "keep_all" (default), "keep_last" or "keep_for"
retention = "keep_all"
keep_last = 10
keep_for_minutes = 10080

# Minutes between automatic sweeps of online users, 0 disables
auto_interval_minutes = 0
"#
    }

    /// Parse and validate a config document.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: DataSyncConfig = toml::from_str(content)
            .map_err(|e| Error::InvalidConfig(format!("Failed to parse datasync.toml: {}", e)))?;
        // Validate eagerly
        config.validate()?;
        Ok(config)
    }

    /// Read and parse config from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::InvalidConfig(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml(&content).map_err(|e| match e {
            Error::InvalidConfig(msg) => {
                Error::InvalidConfig(format!("{} ({})", msg, path.display()))
            }
            other => other,
        })
    }

    /// Write the default config file if it does not already exist.
    pub fn write_default_if_missing(path: &Path) -> Result<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml())?;
            tracing::info!(target: "datasync::config", path = %path.display(), "Wrote default config");
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Internal(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config_keeps_everything() {
        let config = DataSyncConfig::default();
        assert_eq!(config.backend_kind(), BackendKind::Document);
        assert_eq!(config.retention_policy().unwrap(), RetentionPolicy::KeepAll);
        assert_eq!(config.auto_interval(), None);
        assert_eq!(config.serialize.enabled.len(), modules::BUILTIN_NAMES.len());
    }

    #[test]
    fn default_toml_matches_default() {
        let config = DataSyncConfig::from_toml(DataSyncConfig::default_toml()).unwrap();
        assert_eq!(config, DataSyncConfig::default());
    }

    #[test]
    fn parse_embedded_keep_last() {
        let config = DataSyncConfig::from_toml(
            r#"
backend = "embedded"

[optimization]
retention = "keep_last"
keep_last = 3
auto_interval_minutes = 5
"#,
        )
        .unwrap();
        assert_eq!(config.backend_kind(), BackendKind::Embedded);
        assert_eq!(config.retention_policy().unwrap(), RetentionPolicy::KeepLast(3));
        assert_eq!(config.auto_interval(), Some(Duration::from_secs(300)));
    }

    #[test]
    fn parse_keep_for() {
        let config = DataSyncConfig::from_toml(
            "[optimization]\nretention = \"keep_for\"\nkeep_for_minutes = 2\n",
        )
        .unwrap();
        assert_eq!(
            config.retention_policy().unwrap(),
            RetentionPolicy::KeepFor(Duration::from_secs(120))
        );
    }

    #[test]
    fn invalid_values_rejected_eagerly() {
        for bad in [
            "[optimization]\nretention = \"forever\"\n",
            "[optimization]\nretention = \"keep_last\"\nkeep_last = 0\n",
            "[optimization]\nretention = \"keep_for\"\nkeep_for_minutes = 0\n",
            "backend = \"postgres\"\n",
            "[optimization]\nretention = \"keep_for\"\nkeep_for_minutes = 9223372036854775807\n",
            "[optimization]\nauto_interval_minutes = 9223372036854775807\n",
        ] {
            assert!(
                matches!(DataSyncConfig::from_toml(bad), Err(Error::InvalidConfig(_))),
                "accepted: {}",
                bad
            );
        }
    }

    #[test]
    fn largest_auto_interval_accepted() {
        let config = DataSyncConfig::from_toml(&format!(
            "[optimization]\nauto_interval_minutes = {}\n",
            MAX_AUTO_INTERVAL_MINUTES
        ))
        .unwrap();
        assert_eq!(
            config.auto_interval(),
            Some(Duration::from_secs(MAX_AUTO_INTERVAL_MINUTES * 60))
        );
    }

    #[test]
    fn write_default_does_not_overwrite() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);

        DataSyncConfig::write_default_if_missing(&path).unwrap();
        assert!(path.exists());

        std::fs::write(&path, "backend = \"embedded\"\n").unwrap();
        DataSyncConfig::write_default_if_missing(&path).unwrap();

        let config = DataSyncConfig::from_file(&path).unwrap();
        assert_eq!(config.backend_kind(), BackendKind::Embedded);
        // Missing sections fall back to defaults
        assert_eq!(config.serialize, SerializeConfig::default());
    }

    #[test]
    fn write_to_file_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);

        let mut config = DataSyncConfig::default();
        config.serialize.enabled = vec![modules::HEALTH.to_string(), "pets:list".to_string()];
        config.optimization.retention = "keep_last".to_string();
        config.optimization.keep_last = 4;

        config.write_to_file(&path).unwrap();
        assert_eq!(DataSyncConfig::from_file(&path).unwrap(), config);
    }

    #[test]
    fn missing_file_is_config_error() {
        let dir = TempDir::new().unwrap();
        let err = DataSyncConfig::from_file(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }
}
