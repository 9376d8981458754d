//! Driver configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use ct_optimizer::{BayesianConfig, Nsga2Config};
use ct_types::{config_error, CtResult, ParameterSchema};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::client::RemoteConfig;
use crate::contract::{router_cost_objective, router_schema, travel_objectives};
use crate::objective::{ScalarObjective, VectorObjective};

pub const CONFIG_ENV: &str = "CROWDTUNE_CONFIG";
pub const BASE_URL_ENV: &str = "CROWDTUNE_BASE_URL";

/// Which optimizer the driver runs, with its settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StrategyConfig {
    Bayesian {
        #[serde(default = "default_iterations")]
        iterations: usize,
        #[serde(default)]
        config: BayesianConfig,
    },
    Nsga2 {
        #[serde(default)]
        config: Nsga2Config,
    },
}

fn default_iterations() -> usize {
    50
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self::Bayesian {
            iterations: default_iterations(),
            config: BayesianConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TunerConfig {
    pub remote: RemoteConfig,
    pub schema: ParameterSchema,
    pub strategy: StrategyConfig,
    /// Objective for the Bayesian strategy.
    pub scalar_objective: ScalarObjective,
    /// Objectives for the NSGA-II strategy.
    pub vector_objective: VectorObjective,
    /// Where CSV and JSON results go; nothing is written when unset.
    pub output_dir: Option<PathBuf>,
    pub ready_attempts: usize,
    pub ready_interval_ms: u64,
}

impl Default for TunerConfig {
    fn default() -> Self {
        Self {
            remote: RemoteConfig::default(),
            schema: router_schema(),
            strategy: StrategyConfig::default(),
            scalar_objective: router_cost_objective(),
            vector_objective: travel_objectives(),
            output_dir: None,
            ready_attempts: 30,
            ready_interval_ms: 1_000,
        }
    }
}

impl TunerConfig {
    pub fn load(path: &Path) -> CtResult<Self> {
        let text = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&text)?;
        info!(path = %path.display(), "loaded tuner configuration");
        Ok(config)
    }

    /// Load from `path`, else from `CROWDTUNE_CONFIG`, else use defaults; then
    /// apply environment overrides.
    pub fn resolve(path: Option<PathBuf>) -> CtResult<Self> {
        let path = path.or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from));
        let config = match path {
            Some(path) => Self::load(&path)?,
            None => Self::default(),
        };
        Ok(config.override_base_url(std::env::var(BASE_URL_ENV).ok()))
    }

    pub fn override_base_url(mut self, base_url: Option<String>) -> Self {
        if let Some(url) = base_url.filter(|u| !u.trim().is_empty()) {
            self.remote.base_url = url;
        }
        self
    }

    pub fn ready_interval(&self) -> Duration {
        Duration::from_millis(self.ready_interval_ms)
    }

    pub fn validate(&self) -> CtResult<()> {
        self.schema.validate()?;
        if self.remote.base_url.is_empty() {
            return Err(config_error!("remote.base_url must not be empty"));
        }
        match &self.strategy {
            StrategyConfig::Bayesian { .. } if self.scalar_objective.terms.is_empty() => {
                Err(config_error!("scalar_objective needs at least one term"))
            }
            StrategyConfig::Nsga2 { config }
                if config.objectives != self.vector_objective.len() =>
            {
                Err(config_error!(
                    "nsga2 expects {} objectives but vector_objective names {}",
                    config.objectives,
                    self.vector_objective.len()
                ))
            }
            _ => Ok(()),
        }
    }
}
