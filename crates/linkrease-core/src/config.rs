//! Game configuration: travel speeds, level generation parameters, and
//! command defaults.
//!
//! Every field has a default, so a TOML file only needs the values it wants
//! to override:
//!
//! ```
//! use linkrease_core::config::GameConfig;
//!
//! let config = GameConfig::from_toml_str("[speeds]\ncrease = 0.3\n").unwrap();
//! assert_eq!(config.speeds.crease, 0.3);
//! assert_eq!(config.speeds.link, 0.06);
//! ```

use crate::graph::EdgeKind;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur while loading or validating a configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {file}: {source}")]
    Io {
        file: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid value for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

// ---------------------------------------------------------------------------
// Speeds
// ---------------------------------------------------------------------------

/// Fleet travel speed per edge class, in map units per second.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeedTable {
    pub link: f64,
    pub crease: f64,
}

impl Default for SpeedTable {
    fn default() -> Self {
        Self {
            link: 0.06,
            crease: 0.2,
        }
    }
}

impl SpeedTable {
    /// Travel speed on an edge of the given class.
    pub fn speed(&self, kind: EdgeKind) -> f64 {
        match kind {
            EdgeKind::Link => self.link,
            EdgeKind::Crease => self.crease,
        }
    }

    /// Weight multiplier applied to creased edges: `link / crease`.
    /// Below 1 whenever creases are faster than links.
    pub fn crease_ratio(&self) -> f64 {
        self.link / self.crease
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [("speeds.link", self.link), ("speeds.crease", self.crease)] {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::Invalid {
                    field,
                    reason: format!("speed must be positive and finite, got {value}"),
                });
            }
        }
        if self.crease <= self.link {
            return Err(ConfigError::Invalid {
                field: "speeds.crease",
                reason: format!(
                    "creases must be faster than links ({} <= {})",
                    self.crease, self.link
                ),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Level generation
// ---------------------------------------------------------------------------

/// Parameters for [`generate_level`](crate::level::generate_level).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LevelConfig {
    /// Number of nodes to place.
    pub nodes: usize,
    /// Nodes closer than this are connected.
    pub radius: f64,
    /// Minimum spacing between placed nodes.
    pub repel: f64,
    /// Number of non-neutral players; each starts with one factory.
    pub players: u32,
    /// Garrison of each starting factory.
    pub starting_garrison: u32,
    /// Crease every edge whose endpoints both have an index divisible by 3.
    pub random_creases: bool,
    /// Full regenerations tried before giving up on a connected layout.
    pub max_attempts: u32,
}

impl Default for LevelConfig {
    fn default() -> Self {
        Self {
            nodes: 180,
            radius: 0.1,
            repel: 0.05,
            players: 2,
            starting_garrison: 10,
            random_creases: true,
            max_attempts: 1000,
        }
    }
}

impl LevelConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.nodes == 0 {
            return Err(ConfigError::Invalid {
                field: "level.nodes",
                reason: "a level needs at least one node".into(),
            });
        }
        if self.players == 0 || self.players as usize > self.nodes {
            return Err(ConfigError::Invalid {
                field: "level.players",
                reason: format!(
                    "need between 1 and {} players, got {}",
                    self.nodes, self.players
                ),
            });
        }
        if !(self.radius.is_finite() && self.radius > 0.0) {
            return Err(ConfigError::Invalid {
                field: "level.radius",
                reason: format!("radius must be positive, got {}", self.radius),
            });
        }
        if !(self.repel.is_finite() && self.repel >= 0.0) {
            return Err(ConfigError::Invalid {
                field: "level.repel",
                reason: format!("repel must be non-negative, got {}", self.repel),
            });
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                field: "level.max_attempts",
                reason: "at least one attempt is required".into(),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// GameConfig
// ---------------------------------------------------------------------------

/// Top-level configuration for a game session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    pub speeds: SpeedTable,
    pub level: LevelConfig,
    /// Units carried by a fleet when the move command does not specify.
    pub default_units: u32,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            speeds: SpeedTable::default(),
            level: LevelConfig::default(),
            default_units: 1,
        }
    }
}

impl GameConfig {
    /// Parse and validate a configuration from TOML text.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: GameConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            file: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.speeds.validate()?;
        self.level.validate()?;
        if self.default_units == 0 {
            return Err(ConfigError::Invalid {
                field: "default_units",
                reason: "a fleet must carry at least one unit".into(),
            });
        }
        Ok(())
    }
}
