//! Configuration loading and validation for the gateway core.
//!
//! - [`settings`] — JSON config file loading into the [`crate::models::settings::Settings`] shape.
//! - [`validation`] — comprehensive validation with security/operational warnings.
//!
//! The gateway's algorithmic core never reads from disk directly: everything
//! downstream of `main` operates on an in-memory `Settings` value, however it
//! was obtained.

pub mod settings;
pub mod validation;
