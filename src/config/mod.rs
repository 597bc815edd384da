// src/config/mod.rs

//! Configuration loading and validation for devwatch.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file (`loader.rs`).
//! - Validate globs, regexes and the build command (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path};
pub use model::{BuildSection, ConfigFile, RawConfigFile, WatchSection};
pub use validate::{compile_discover_regex, compile_globs};
