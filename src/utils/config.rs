use std::fs::{self, File};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use anyhow::{Result, Context, anyhow};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub db_path: PathBuf,
    pub flatten: FlattenSettings,
    pub similarity: SimilaritySettings,
    pub pool: PoolSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("metavault.db"),
            flatten: FlattenSettings::default(),
            similarity: SimilaritySettings::default(),
            pool: PoolSettings::default(),
        }
    }
}

/// Sentinels and bounds applied when a metadata document is flattened.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FlattenSettings {
    /// Keys starting with this prefix are internal to the extractor and never stored.
    pub reserved_prefix: String,
    /// A category map carrying this key with a truthy value is skipped wholesale.
    pub locked_marker: String,
    /// Stored values are cut to this many characters.
    pub max_value_len: usize,
    pub normalized_category: String,
}

impl Default for FlattenSettings {
    fn default() -> Self {
        Self {
            reserved_prefix: "_".to_string(),
            locked_marker: "_locked".to_string(),
            max_value_len: 1000,
            normalized_category: "normalized".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum IndexKind {
    #[default]
    Linear,
    BkTree,
}

impl std::str::FromStr for IndexKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "linear" => Ok(IndexKind::Linear),
            "bktree" | "bk-tree" => Ok(IndexKind::BkTree),
            other => Err(anyhow!("Unknown similarity index '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SimilaritySettings {
    pub algorithm: String,
    pub index: IndexKind,
    pub default_threshold: u32,
}

impl Default for SimilaritySettings {
    fn default() -> Self {
        Self {
            algorithm: "phash".to_string(),
            index: IndexKind::Linear,
            default_threshold: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PoolSettings {
    pub max_size: u32,
    pub busy_timeout_ms: u64,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_size: 8,
            busy_timeout_ms: 5000,
        }
    }
}

impl Settings {
    /// Loads settings from a JSON file. Missing keys fall back to defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let settings = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;
        Ok(settings)
    }

    /// Defaults, overridden by a `.env` file in the working directory if one exists.
    pub fn discover() -> Result<Self> {
        let mut settings = Settings::default();
        let env_path = Path::new(".env");

        if env_path.exists() {
            settings.apply_env_file(env_path)?;
            info!("Loaded overrides from .env");
        }

        Ok(settings)
    }

    pub fn apply_env_file(&mut self, path: &Path) -> Result<()> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);

        for line in reader.lines() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                self.apply_override(key.trim(), value.trim())?;
            }
        }

        Ok(())
    }

    fn apply_override(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "METAVAULT_DB_PATH" => self.db_path = PathBuf::from(value),
            "METAVAULT_RESERVED_PREFIX" => self.flatten.reserved_prefix = value.to_string(),
            "METAVAULT_LOCKED_MARKER" => self.flatten.locked_marker = value.to_string(),
            "METAVAULT_MAX_VALUE_LEN" => {
                self.flatten.max_value_len = value
                    .parse()
                    .with_context(|| format!("Invalid METAVAULT_MAX_VALUE_LEN: {}", value))?;
            }
            "METAVAULT_SIMILARITY_INDEX" => self.similarity.index = value.parse()?,
            "METAVAULT_SIMILARITY_ALGORITHM" => self.similarity.algorithm = value.to_string(),
            _ => {}
        }
        Ok(())
    }

    pub fn save_to_env(&self, path: &Path) -> Result<()> {
        let mut file = File::create(path).context("Failed to create .env file")?;
        writeln!(file, "METAVAULT_DB_PATH={}", self.db_path.display())?;
        writeln!(file, "METAVAULT_RESERVED_PREFIX={}", self.flatten.reserved_prefix)?;
        writeln!(file, "METAVAULT_LOCKED_MARKER={}", self.flatten.locked_marker)?;
        writeln!(file, "METAVAULT_MAX_VALUE_LEN={}", self.flatten.max_value_len)?;
        let index = match self.similarity.index {
            IndexKind::Linear => "linear",
            IndexKind::BkTree => "bktree",
        };
        writeln!(file, "METAVAULT_SIMILARITY_INDEX={}", index)?;
        writeln!(file, "METAVAULT_SIMILARITY_ALGORITHM={}", self.similarity.algorithm)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_and_load_env() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join(".env");

        let mut settings = Settings::default();
        settings.db_path = PathBuf::from("/tmp/library.db");
        settings.flatten.locked_marker = "__lock".to_string();
        settings.flatten.max_value_len = 64;
        settings.similarity.index = IndexKind::BkTree;

        settings.save_to_env(&path)?;

        let content = fs::read_to_string(&path)?;
        assert!(content.contains("METAVAULT_DB_PATH=/tmp/library.db"));
        assert!(content.contains("METAVAULT_SIMILARITY_INDEX=bktree"));

        let mut loaded = Settings::default();
        loaded.apply_env_file(&path)?;
        assert_eq!(loaded.db_path, settings.db_path);
        assert_eq!(loaded.flatten, settings.flatten);
        assert_eq!(loaded.similarity, settings.similarity);

        Ok(())
    }

    #[test]
    fn test_partial_json_uses_defaults() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"flatten": {"reserved_prefix": "$"}, "similarity": {"index": "bktree"}}"#)?;

        let settings = Settings::load(&path)?;
        assert_eq!(settings.flatten.reserved_prefix, "$");
        assert_eq!(settings.flatten.locked_marker, "_locked");
        assert_eq!(settings.similarity.index, IndexKind::BkTree);
        assert_eq!(settings.similarity.algorithm, "phash");
        assert_eq!(settings.pool.max_size, 8);
        Ok(())
    }

    #[test]
    fn test_bad_override_is_rejected() {
        let mut settings = Settings::default();
        assert!(settings.apply_override("METAVAULT_MAX_VALUE_LEN", "lots").is_err());
        assert!(settings.apply_override("METAVAULT_SIMILARITY_INDEX", "kdtree").is_err());
        assert!(settings.apply_override("UNRELATED", "x").is_ok());
    }
}
