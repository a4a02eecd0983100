//! Evolution configuration.
//!
//! Loaded from a YAML document shaped like:
//!
//! ```yaml
//! evolution:
//!   enabled: true
//!   learning:
//!     min_executions_for_learning: 10
//!     analysis_window: 100
//!     queue_capacity: 1
//!   optimization:
//!     auto_optimize: false
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use skilltune_reflection::{LearnerConfig, ReflectionConfig};
use tracing::{debug, warn};

/// Root of the evolution configuration document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvolutionConfig {
    /// Evolution settings
    pub evolution: EvolutionSettings,
}

/// `evolution:` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvolutionSettings {
    /// When off, the performer only invokes the work
    pub enabled: bool,
    /// Learning triggers
    pub learning: LearningSettings,
    /// Rule application
    pub optimization: OptimizationSettings,
}

impl Default for EvolutionSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            learning: LearningSettings::default(),
            optimization: OptimizationSettings::default(),
        }
    }
}

/// `evolution.learning:` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LearningSettings {
    /// History length that triggers background learning
    pub min_executions_for_learning: usize,
    /// Most recent records analyzed per pass
    pub analysis_window: usize,
    /// Pending learning requests per skill
    pub queue_capacity: usize,
    /// Learner thresholds
    pub thresholds: LearnerConfig,
}

impl Default for LearningSettings {
    fn default() -> Self {
        Self {
            min_executions_for_learning: 10,
            analysis_window: 100,
            queue_capacity: 1,
            thresholds: LearnerConfig::default(),
        }
    }
}

/// `evolution.optimization:` section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizationSettings {
    /// Apply generated rules without approval
    pub auto_optimize: bool,
}

impl EvolutionConfig {
    /// Parse a YAML document. Missing keys take their defaults.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, serde_yaml::Error> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(yaml)
    }

    /// Load from a YAML file, falling back to defaults when the file is
    /// missing or invalid.
    pub fn load(path: &Path) -> Self {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No evolution config at {}, using defaults", path.display());
                return Self::default();
            }
            Err(e) => {
                warn!("Failed to read evolution config {}: {}, using defaults", path.display(), e);
                return Self::default();
            }
        };

        match Self::from_yaml_str(&text) {
            Ok(config) => config,
            Err(e) => {
                warn!("Failed to parse evolution config {}: {}, using defaults", path.display(), e);
                Self::default()
            }
        }
    }

    /// Whether evolution is enabled.
    pub fn enabled(&self) -> bool {
        self.evolution.enabled
    }

    /// Reflection settings derived from the learning section.
    pub fn reflection(&self) -> ReflectionConfig {
        ReflectionConfig {
            analysis_window: Some(self.evolution.learning.analysis_window),
            learner: self.evolution.learning.thresholds.clone(),
        }
    }
}
