//! # webbridge-settings
//!
//! Layered configuration for the bridge and its transport.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults** — [`BridgeSettings::default()`]
//! 2. **User file** — `~/.webbridge/settings.json` or an explicit path
//!    (deep-merged over defaults)
//! 3. **Environment variables** — `WEBBRIDGE_*` overrides (highest priority)
//!
//! There is no global instance: the host loads settings once and passes
//! them to the bridge it constructs.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;
