//! # barrage-settings
//!
//! Configuration for the barrage room client.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`BarrageSettings::default()`]
//! 2. **User file**: `~/.barrage/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `BARRAGE_*` overrides (highest priority)

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, apply_env_overrides_with, deep_merge, load_settings,
    load_settings_from_path, settings_path,
};
pub use types::*;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
