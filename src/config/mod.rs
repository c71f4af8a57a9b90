//! Pipeline Configuration Module
//!
//! Every stage threshold and lookup table (static perception bands, unit
//! conversions, valid ranges, regulatory limits, recommendation templates)
//! is loaded from TOML, with built-in defaults for anything omitted.
//!
//! ## Loading Order
//!
//! 1. `SST_CONFIG` environment variable (path to TOML file)
//! 2. `sst_pipeline.toml` in the current working directory
//! 3. Built-in defaults
//!
//! ## Usage
//!
//! Load once at startup and hand the sections to the stages that need them:
//!
//! ```ignore
//! let config = PipelineConfig::load();
//! let orchestrator = Orchestrator::new(&config);
//! ```

mod pipeline_config;
pub mod defaults;
pub mod tables;
pub mod validation;

pub use pipeline_config::*;
