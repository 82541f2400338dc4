//! Scene files: solver parameters, execution context and run limits.

use std::fs;
use std::path::Path;

use kernel::{ContextConfig, SolverConfig};
use serde::{Deserialize, Serialize};

use crate::error::{OrchestratorError, Result};

/// Main simulation configuration, as stored in a scene file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Human-readable simulation name
    #[serde(default = "default_name")]
    pub name: String,
    /// Solver parameters
    #[serde(default)]
    pub solver: SolverConfig,
    /// Executor and workgroup settings
    #[serde(default)]
    pub context: ContextConfig,
    /// Stop after this many frames
    #[serde(default)]
    pub max_frames: Option<u64>,
    /// Cap on frames per second; unlimited when absent
    #[serde(default)]
    pub frame_rate: Option<f32>,
}

// Default values
fn default_name() -> String {
    "untitled".to_string()
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            solver: SolverConfig::default(),
            context: ContextConfig::default(),
            max_frames: None,
            frame_rate: None,
        }
    }
}

impl SimulationConfig {
    /// Load configuration from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| OrchestratorError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: SimulationConfig =
            serde_json::from_str(&contents).map_err(|source| OrchestratorError::Json {
                path: path.to_path_buf(),
                source,
            })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(OrchestratorError::InvalidScene {
                field: "name",
                reason: "must not be empty".to_string(),
            });
        }

        if self.max_frames == Some(0) {
            return Err(OrchestratorError::InvalidScene {
                field: "max_frames",
                reason: "must be at least 1".to_string(),
            });
        }

        if let Some(rate) = self.frame_rate {
            if !(rate.is_finite() && rate > 0.0) {
                return Err(OrchestratorError::InvalidScene {
                    field: "frame_rate",
                    reason: format!("must be positive, got {rate}"),
                });
            }
        }

        self.solver.validate()?;
        Ok(())
    }
}
