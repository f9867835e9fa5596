use crate::errors::{Error, Result};
use crate::model::BloomLevel;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const SUPPORTED_CONFIG_VERSION: u32 = 1;

/// Percentage of the total item count assigned to each Bloom level.
/// The canonical default is 15/15/20/20/15/15, which collapses to the
/// 30/40/30 easy/average/difficult split.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelSplit {
    pub remember: u32,
    pub understand: u32,
    pub apply: u32,
    pub analyze: u32,
    pub evaluate: u32,
    pub create: u32,
}

impl Default for LevelSplit {
    fn default() -> Self {
        Self {
            remember: 15,
            understand: 15,
            apply: 20,
            analyze: 20,
            evaluate: 15,
            create: 15,
        }
    }
}

impl LevelSplit {
    pub fn get(&self, level: BloomLevel) -> u32 {
        match level {
            BloomLevel::Remember => self.remember,
            BloomLevel::Understand => self.understand,
            BloomLevel::Apply => self.apply,
            BloomLevel::Analyze => self.analyze,
            BloomLevel::Evaluate => self.evaluate,
            BloomLevel::Create => self.create,
        }
    }

    pub fn sum(&self) -> u32 {
        BloomLevel::ALL.iter().map(|l| self.get(*l)).sum()
    }

    /// Collapse into [easy, average, difficult] band percentages.
    pub fn bands(&self) -> [u32; 3] {
        [
            self.remember + self.understand,
            self.apply + self.analyze,
            self.evaluate + self.create,
        ]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicWeight {
    pub name: String,
    /// Percent of the total item count for this topic.
    pub weight: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TosConfig {
    pub version: u32,
    pub course: String,
    pub period: String,
    pub school_year: String,
    pub total_items: u32,
    pub topics: Vec<TopicWeight>,
    #[serde(default)]
    pub level_split: LevelSplit,
    /// Expected easy/average/difficult band percentages.
    #[serde(default = "default_difficulty_split")]
    pub difficulty_split: [u32; 3],
}

fn default_difficulty_split() -> [u32; 3] {
    [30, 40, 30]
}

pub fn load_tos_config(path: &Path) -> Result<TosConfig> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("failed to read config {}: {}", path.display(), e)))?;
    let cfg: TosConfig = serde_yaml::from_str(&raw)
        .map_err(|e| Error::Config(format!("failed to parse YAML: {}", e)))?;
    if cfg.version != SUPPORTED_CONFIG_VERSION {
        return Err(Error::Config(format!(
            "unsupported config version {} (supported: {})",
            cfg.version, SUPPORTED_CONFIG_VERSION
        )));
    }
    // validation failures on a loaded file are config errors to callers
    crate::tos::validate_config(&cfg).map_err(|e| match e {
        Error::Validation(msg) => Error::Config(msg),
        other => other,
    })?;
    Ok(cfg)
}

pub fn write_sample_config(path: &Path) -> Result<()> {
    std::fs::write(path, include_str!("../../../tos.yaml"))
        .map_err(|e| Error::Config(format!("failed to write sample config: {}", e)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_split_is_canonical() {
        let s = LevelSplit::default();
        assert_eq!(s.sum(), 100);
        assert_eq!(s.bands(), [30, 40, 30]);
    }
}
