//! Engine configuration
//!
//! Settings are layered: built-in defaults, then an optional TOML file, then
//! `PHOTONDB_D2R__*` environment variables (`PHOTONDB_D2R__GENERATION__TIMEOUT_SECS=5`).

use crate::backend::constraints::{
    DefaultIdentifierConstraints, IdentifierConstraints, DERBY_RESERVED_SCHEMAS, POSTGRESQL_RESERVED_SCHEMAS,
};
use crate::error::{Error, Result};
use crate::identifier::GenerationBudget;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

const ENV_PREFIX: &str = "PHOTONDB_D2R";

/// Relational dialect whose naming rules identifiers must satisfy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Postgresql,
    Derby,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Wall-clock limit of the counter search, in seconds.
    pub timeout_secs: u64,
    /// Optional cap on counter attempts.
    pub max_attempts: Option<u32>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            max_attempts: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub backend: BackendKind,
    /// Overrides the dialect's maximum identifier length.
    pub identifier_max_size: Option<usize>,
    pub generation: GenerationConfig,
    pub logging: LoggingConfig,
}

impl EngineConfig {
    /// Load configuration from `path` (if given) and the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(::config::File::from(path).required(true));
        }
        builder = builder.add_source(
            ::config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

        let config: EngineConfig = builder.build()?.try_deserialize()?;
        info!(backend = ?config.backend, path = ?path, "Loaded configuration");
        Ok(config)
    }

    /// Render the configuration as TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::InvalidArgument(e.to_string()))
    }

    pub fn identifier_constraints(&self) -> Result<Arc<dyn IdentifierConstraints>> {
        let reserved: &[&str] = match self.backend {
            BackendKind::Postgresql => &POSTGRESQL_RESERVED_SCHEMAS,
            BackendKind::Derby => &DERBY_RESERVED_SCHEMAS,
        };
        let max_size = self.identifier_max_size.unwrap_or(match self.backend {
            BackendKind::Postgresql => 63,
            BackendKind::Derby => 128,
        });
        let constraints =
            DefaultIdentifierConstraints::new(max_size, reserved.iter().copied(), Vec::<String>::new())?;
        Ok(Arc::new(constraints))
    }

    pub fn generation_budget(&self) -> GenerationBudget {
        let budget = GenerationBudget::with_timeout(Duration::from_secs(self.generation.timeout_secs));
        match self.generation.max_attempts {
            Some(attempts) => budget.with_max_attempts(attempts),
            None => budget,
        }
    }
}
