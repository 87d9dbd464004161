//! Configuration management for cyclebar
//!
//! Centralized configuration handling with support for:
//! - Default values
//! - Configuration files (TOML)
//! - Environment variables (`CYCLEBAR__SECTION__KEY`)
//! - Command-line arguments
//!
//! Configuration precedence (highest to lowest):
//! 1. Command-line arguments
//! 2. Environment variables
//! 3. Configuration file
//! 4. Default values

mod app;
mod data;
mod model;
mod pipeline;

// Re-export main types
pub use app::{AppConfig, LogLevel};
pub use data::DataConfig;
pub use model::ModelConfig;
pub use pipeline::PipelineConfig;

use cyclebar_core::{Orchestrator, PipelineError, PipelineParams};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Environment variable prefix; sections and keys are separated by `__`
pub const ENV_PREFIX: &str = "CYCLEBAR";

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid pipeline settings: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Unknown model(s): {}", .0.join(", "))]
    UnknownModels(Vec<String>),
}

/// Root configuration structure containing all configuration categories
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    /// Application-wide settings
    pub app: AppConfig,

    /// Data location and symbols
    pub data: DataConfig,

    /// Signal, statistics and normalization parameters
    pub pipeline: PipelineConfig,

    /// Feature-matrix shape and models
    pub model: ModelConfig,
}

impl Settings {
    /// Load configuration from multiple sources with proper precedence
    pub fn load() -> Result<Self, SettingsError> {
        let builder = config::Config::builder()
            // Start with defaults
            .add_source(config::Config::try_from(&Settings::default())?)
            // Add configuration file if it exists
            .add_source(
                config::File::with_name("cyclebar")
                    .format(config::FileFormat::Toml)
                    .required(false),
            )
            .add_source(environment());

        let config = builder.build()?;
        Ok(config.try_deserialize()?)
    }

    /// Load configuration from a specific file path, environment still applied on top
    pub fn load_from_file(path: &Path) -> Result<Self, SettingsError> {
        let builder = config::Config::builder()
            .add_source(config::Config::try_from(&Settings::default())?)
            .add_source(config::File::from(path).format(config::FileFormat::Toml))
            .add_source(environment());

        let config = builder.build()?;
        Ok(config.try_deserialize()?)
    }

    /// Merge command-line arguments into the loaded configuration
    pub fn merge_cli_args(mut self, cli_args: &dyn CliConfigMerge) -> Self {
        cli_args.merge_into_config(&mut self);
        self
    }

    /// Restrict emitted models to `names`
    pub fn select_models(&mut self, names: &[String]) -> Result<(), SettingsError> {
        self.model
            .select(names)
            .map_err(SettingsError::UnknownModels)
    }

    /// Validated core parameters for the orchestrator
    pub fn pipeline_params(&self) -> Result<PipelineParams, SettingsError> {
        let params = PipelineParams {
            period: self.pipeline.period()?,
            signal: self.pipeline.signal_params(),
            statistics: self.pipeline.statistics_params(),
            normalizer: self.pipeline.normalizer_params(),
            shape: self.model.shape(),
            models: self.model.models.clone(),
            warmup_days: self.data.warmup_days,
            checkpoint_cycles: self.pipeline.checkpoint_cycles,
            max_provisional_bars: self.pipeline.max_provisional_bars,
            initial_since: self.data.initial_start,
        };
        // Every stage validates its own parameters on construction
        Orchestrator::new(params.clone())?;
        Ok(params)
    }
}

fn environment() -> config::Environment {
    config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("data.symbols")
}

/// Trait for merging CLI arguments into configuration
pub trait CliConfigMerge {
    fn merge_into_config(&self, config: &mut Settings);
}
