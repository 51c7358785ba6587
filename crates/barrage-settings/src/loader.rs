//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`BarrageSettings::default()`]
//! 2. If `~/.barrage/settings.json` exists, deep-merge user values over defaults
//! 3. Apply `BARRAGE_*` overrides
//! 4. Validate
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use barrage_core::ReconnectScope;
use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::BarrageSettings;

/// Path of the user settings file (`~/.barrage/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".barrage").join("settings.json")
}

/// Load settings from the default path with env overrides.
pub fn load_settings() -> Result<BarrageSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from `path` with env overrides.
///
/// A missing file yields defaults. Invalid JSON or an invalid value is an
/// error.
pub fn load_settings_from_path(path: &Path) -> Result<BarrageSettings> {
    let defaults = serde_json::to_value(BarrageSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: BarrageSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `BARRAGE_*` overrides from the process environment.
pub fn apply_env_overrides(settings: &mut BarrageSettings) {
    apply_env_overrides_with(settings, |name| std::env::var(name).ok());
}

/// Apply `BARRAGE_*` overrides read through `lookup`.
///
/// Empty values are ignored. Values that fail to parse or fall outside
/// their range are ignored with a warning.
pub fn apply_env_overrides_with<F>(settings: &mut BarrageSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let env = EnvReader { lookup };

    // ── Resolver ────────────────────────────────────────────────────
    if let Some(v) = env.string("BARRAGE_API_URL") {
        settings.resolver.base_url = v;
    }
    if let Some(v) = env.string("BARRAGE_REGION") {
        settings.resolver.region = Some(v);
    }

    // ── Channel ─────────────────────────────────────────────────────
    if let Some(v) = env.u64("BARRAGE_HEARTBEAT_INTERVAL_MS", 1000, 600_000) {
        settings.channel.heartbeat_interval_ms = v;
    }
    if let Some(v) = env.u64("BARRAGE_CONNECT_TIMEOUT_MS", 100, 300_000) {
        settings.channel.connect_timeout_ms = v;
    }

    // ── Reconnect ───────────────────────────────────────────────────
    if let Some(v) = env.u64("BARRAGE_RECONNECT_BASE_DELAY_MS", 1, 600_000) {
        settings.reconnect.base_delay_ms = v;
    }
    if let Some(v) = env.u32("BARRAGE_RECONNECT_MAX_ATTEMPTS", 0, 1000) {
        settings.reconnect.max_attempts = v;
    }
    if let Some(v) = env.string("BARRAGE_RECONNECT_SCOPE") {
        match v.parse::<ReconnectScope>() {
            Ok(scope) => settings.reconnect.scope = scope,
            Err(_) => warn!(key = "BARRAGE_RECONNECT_SCOPE", value = %v, "invalid scope env var, ignoring"),
        }
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = env.string("BARRAGE_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env.bool("BARRAGE_LOG_JSON") {
        settings.logging.json = v;
    }
}

// ── Pure parsing functions ──────────────────────────────────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u32` within a range.
pub fn parse_u32_range(val: &str, min: u32, max: u32) -> Option<u32> {
    let n: u32 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ── Env readers ─────────────────────────────────────────────────────────────

struct EnvReader<F> {
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn bool(&self, name: &str) -> Option<bool> {
        let val = self.string(name)?;
        let result = parse_bool(&val);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid boolean env var, ignoring");
        }
        result
    }

    fn u32(&self, name: &str, min: u32, max: u32) -> Option<u32> {
        let val = self.string(name)?;
        let result = parse_u32_range(&val, min, max);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid u32 env var, ignoring");
        }
        result
    }

    fn u64(&self, name: &str, min: u64, max: u64) -> Option<u64> {
        let val = self.string(name)?;
        let result = parse_u64_range(&val, min, max);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid u64 env var, ignoring");
        }
        result
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::SettingsError;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    // ── deep_merge ──────────────────────────────────────────────────

    #[test]
    fn merge_nested_override() {
        let target = serde_json::json!({"channel": {"heartbeatIntervalMs": 20000, "connectTimeoutMs": 10000}});
        let source = serde_json::json!({"channel": {"heartbeatIntervalMs": 5000}});
        let merged = deep_merge(target, source);
        assert_eq!(merged["channel"]["heartbeatIntervalMs"], 5000);
        assert_eq!(merged["channel"]["connectTimeoutMs"], 10000);
    }

    #[test]
    fn merge_null_preserves_target() {
        let merged = deep_merge(serde_json::json!({"a": 1}), serde_json::json!({"a": null}));
        assert_eq!(merged["a"], 1);
    }

    #[test]
    fn merge_array_replace() {
        let merged = deep_merge(
            serde_json::json!({"items": [1, 2, 3]}),
            serde_json::json!({"items": [4]}),
        );
        assert_eq!(merged["items"], serde_json::json!([4]));
    }

    #[test]
    fn merge_fills_null_default() {
        let merged = deep_merge(
            serde_json::json!({"region": null}),
            serde_json::json!({"region": "cn-east"}),
        );
        assert_eq!(merged["region"], "cn-east");
    }

    // ── load_settings_from_path ─────────────────────────────────────

    #[test]
    fn load_missing_file_returns_defaults() {
        let settings = load_settings_from_path(Path::new("/nonexistent/settings.json")).unwrap();
        assert_eq!(settings.channel, BarrageSettings::default().channel);
    }

    #[test]
    fn load_partial_json_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"resolver": {"region": "cn-east"}, "reconnect": {"scope": "channel", "maxAttempts": 3}}"#,
        )
        .unwrap();

        let settings = load_settings_from_path(&path).unwrap();
        assert_eq!(settings.resolver.region.as_deref(), Some("cn-east"));
        assert_eq!(settings.reconnect.scope, ReconnectScope::Channel);
        assert_eq!(settings.reconnect.max_attempts, 3);
        assert_eq!(settings.reconnect.base_delay_ms, 2000);
        assert_eq!(settings.resolver.base_url, "http://localhost:8080");
    }

    #[test]
    fn load_invalid_json_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "not valid json").unwrap();
        assert!(matches!(
            load_settings_from_path(&path),
            Err(SettingsError::Json(_))
        ));
    }

    #[test]
    fn load_invalid_value_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"reconnect": {"growthFactor": 0.2}}"#).unwrap();
        assert!(matches!(
            load_settings_from_path(&path),
            Err(SettingsError::InvalidValue(_))
        ));
    }

    // ── env overrides ───────────────────────────────────────────────

    #[test]
    fn env_overrides_apply() {
        let mut settings = BarrageSettings::default();
        apply_env_overrides_with(
            &mut settings,
            env(&[
                ("BARRAGE_API_URL", "https://api.example.com"),
                ("BARRAGE_REGION", "us-west"),
                ("BARRAGE_HEARTBEAT_INTERVAL_MS", "5000"),
                ("BARRAGE_RECONNECT_MAX_ATTEMPTS", "9"),
                ("BARRAGE_RECONNECT_SCOPE", "channel"),
                ("BARRAGE_LOG_LEVEL", "debug"),
                ("BARRAGE_LOG_JSON", "yes"),
            ]),
        );
        assert_eq!(settings.resolver.base_url, "https://api.example.com");
        assert_eq!(settings.resolver.region.as_deref(), Some("us-west"));
        assert_eq!(settings.channel.heartbeat_interval_ms, 5000);
        assert_eq!(settings.reconnect.max_attempts, 9);
        assert_eq!(settings.reconnect.scope, ReconnectScope::Channel);
        assert_eq!(settings.logging.level, "debug");
        assert!(settings.logging.json);
    }

    #[test]
    fn invalid_env_values_are_ignored() {
        let mut settings = BarrageSettings::default();
        apply_env_overrides_with(
            &mut settings,
            env(&[
                ("BARRAGE_HEARTBEAT_INTERVAL_MS", "10"),
                ("BARRAGE_CONNECT_TIMEOUT_MS", "soon"),
                ("BARRAGE_RECONNECT_SCOPE", "room"),
                ("BARRAGE_LOG_JSON", "maybe"),
                ("BARRAGE_API_URL", ""),
            ]),
        );
        assert_eq!(settings, BarrageSettings::default());
    }

    #[test]
    fn parse_helpers() {
        assert_eq!(parse_bool("ON"), Some(true));
        assert_eq!(parse_bool("off"), Some(false));
        assert_eq!(parse_bool("2"), None);
        assert_eq!(parse_u32_range("5", 0, 10), Some(5));
        assert_eq!(parse_u32_range("11", 0, 10), None);
        assert_eq!(parse_u64_range(" 1000 ", 1000, 2000), Some(1000));
        assert_eq!(parse_u64_range("-1", 0, 10), None);
    }
}
