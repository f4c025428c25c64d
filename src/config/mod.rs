//! Control Plane Configuration
//!
//! Loaded from TOML, with every value defaulted so an empty file (or none at
//! all) yields a working setup.
//!
//! ## Loading Order
//!
//! 1. `AUTOHEAL_CONFIG` environment variable (path to TOML file)
//! 2. `autoheal.toml` in the current working directory
//! 3. Built-in defaults (see [`defaults`])
//!
//! ## Usage
//!
//! ```ignore
//! let config = AutohealConfig::load();
//! let plane = ControlPlane::open(config)?;
//! ```
//!
//! The `[control]` section is the only part that can change at runtime; the
//! control plane keeps it in an `ArcSwap` and replaces it wholesale on
//! `update_configuration`.

mod autoheal_config;
pub mod defaults;
pub mod validation;

pub use autoheal_config::*;
