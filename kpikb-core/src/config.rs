// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Configuration for the knowledge base
//!
//! Loaded from TOML with priority file > environment > defaults:
//!
//! ```toml
//! data_dir = "./kpikb-data"
//! similarity = "weighted"
//!
//! [retention]
//! coarse_grain = 8
//! max_fine = 3
//! max_coarse = 2
//! ```

use crate::error::{KbError, KbResult};
use crate::similarity::SimilarityMethod;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable overriding the data directory
pub const ENV_DATA_DIR: &str = "KPIKB_DATA_DIR";
/// Environment variable overriding the default similarity method
pub const ENV_SIMILARITY: &str = "KPIKB_SIMILARITY";

/// Snapshot directory name under the data directory
const BACKUPS_DIR: &str = "backups";
/// Revision counter file name under the data directory
const COUNTER_FILE: &str = "revision.cfg";

/// Knowledge base configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KbConfig {
    /// Root directory for snapshots and the revision counter
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Similarity used by closest-match lookups when the caller names none
    #[serde(default)]
    pub similarity: SimilarityMethod,

    /// Snapshot retention
    #[serde(default)]
    pub retention: RetentionConfig,
}

/// Two-tier snapshot retention parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Spacing of coarse checkpoints, in revisions
    #[serde(default = "default_coarse_grain")]
    pub coarse_grain: u64,

    /// Most recent revisions always kept
    #[serde(default = "default_max_fine")]
    pub max_fine: u64,

    /// Coarse checkpoints kept behind the fine window
    #[serde(default = "default_max_coarse")]
    pub max_coarse: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            coarse_grain: default_coarse_grain(),
            max_fine: default_max_fine(),
            max_coarse: default_max_coarse(),
        }
    }
}

impl RetentionConfig {
    pub fn new(coarse_grain: u64, max_fine: u64, max_coarse: u64) -> Self {
        Self {
            coarse_grain,
            max_fine,
            max_coarse,
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./kpikb-data")
}

fn default_coarse_grain() -> u64 {
    8
}

fn default_max_fine() -> u64 {
    3
}

fn default_max_coarse() -> u64 {
    2
}

impl Default for KbConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            similarity: SimilarityMethod::default(),
            retention: RetentionConfig::default(),
        }
    }
}

impl KbConfig {
    /// Configuration rooted at `data_dir` with default settings
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> KbResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration with priority: file > env > defaults
    pub fn load(config_file: Option<PathBuf>) -> KbResult<Self> {
        let config = if let Some(path) = config_file {
            if path.exists() {
                tracing::info!("Loading configuration from file: {:?}", path);
                Self::from_file(&path)?
            } else {
                tracing::warn!("Config file not found: {:?}, using defaults", path);
                Self::default()
            }
        } else {
            Self::default()
        };

        Self::merge_with_env(config)
    }

    /// Apply environment overrides (env takes priority)
    fn merge_with_env(mut config: Self) -> KbResult<Self> {
        if let Ok(data_dir) = std::env::var(ENV_DATA_DIR) {
            config.data_dir = PathBuf::from(data_dir);
        }
        if let Ok(method) = std::env::var(ENV_SIMILARITY) {
            config.similarity = method.parse()?;
        }
        Ok(config)
    }

    /// Directory holding one snapshot file per retained revision
    pub fn backups_dir(&self) -> PathBuf {
        self.data_dir.join(BACKUPS_DIR)
    }

    /// File holding the next revision number
    pub fn counter_path(&self) -> PathBuf {
        self.data_dir.join(COUNTER_FILE)
    }

    /// Validate configuration
    pub fn validate(&self) -> KbResult<()> {
        if self.retention.coarse_grain == 0 {
            return Err(KbError::Config("retention.coarse_grain must be > 0".into()));
        }
        if self.retention.max_fine == 0 {
            return Err(KbError::Config("retention.max_fine must be > 0".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = KbConfig::default();
        assert_eq!(config.retention, RetentionConfig::new(8, 3, 2));
        assert_eq!(config.similarity, SimilarityMethod::Weighted);
        assert_eq!(config.counter_path(), PathBuf::from("./kpikb-data/revision.cfg"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_file_partial() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("kpikb.toml");
        std::fs::write(
            &path,
            "data_dir = \"/tmp/kb\"\nsimilarity = \"edit_distance\"\n\n[retention]\ncoarse_grain = 20\n",
        )
        .unwrap();

        let config = KbConfig::from_file(&path).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/tmp/kb"));
        assert_eq!(config.similarity, SimilarityMethod::EditDistance);
        assert_eq!(config.retention, RetentionConfig::new(20, 3, 2));
    }

    #[test]
    fn test_unknown_method_in_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("kpikb.toml");
        std::fs::write(&path, "similarity = \"cosine\"\n").unwrap();

        assert!(matches!(KbConfig::from_file(&path), Err(KbError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_zero_grain() {
        let mut config = KbConfig::default();
        config.retention.coarse_grain = 0;
        assert!(matches!(config.validate(), Err(KbError::Config(_))));
    }
}
