pub mod config;
pub mod constants;

pub use config::{
    load_run_config, CompanionSubstitution, ConfigError, KnotConfig, RunConfig, SourceConfig,
    SourceConfigFile, SourceKind,
};
