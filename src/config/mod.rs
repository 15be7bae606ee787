// src/config/mod.rs

//! Guard file loading and validation.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a guard file from disk (`loader.rs`).
//! - Validate basic invariants like non-empty commands (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{config_base_dir, default_config_path, load_and_validate, load_from_path};
pub use model::{GuardFile, GuardSpec, RawGuardFile};
pub use validate::validate_guard;
