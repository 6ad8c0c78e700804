//! Configuration system for invoke-local.
//!
//! Provides TOML-based configuration with:
//! - A `[handler]` section naming the artifact, handler type and method selection
//! - A `[runtime]` section with host limits
//! - Config file layering (user config + project-local overrides)
//!
//! Environment variables and CLI flags are layered on top by the binary.

pub mod discovery;
pub mod error;
pub mod types;

pub use discovery::{
    LoadedConfig, load_config, load_config_file, load_config_with_options, user_config_dir,
    user_config_path,
};
pub use error::{ConfigError, Result};
pub use types::*;
