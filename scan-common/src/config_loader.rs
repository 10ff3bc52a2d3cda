//! Layered configuration loader.
//!
//! Supports loading configuration from multiple files in the config directory:
//! - `config.json` - Core configuration
//! - `secrets.json` - Credentials (API keys, webhook URL, SMTP password)
//!
//! `secrets.json` is deep-merged over `config.json`, so it may carry any
//! subset of the config tree (e.g. `{"provider": {"appkey": "..."}}`).

use anyhow::{Context, Result};
use serde_json::Value;
use std::fs;
use std::path::Path;

/// Configuration file names, lowest priority first.
pub const CONFIG_FILES: &[&str] = &["config.json", "secrets.json"];

/// Load a JSON file and return its contents as a Value.
/// Returns None if file doesn't exist.
pub fn load_json_file(path: &Path) -> Result<Option<Value>> {
    if !path.exists() {
        return Ok(None);
    }

    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let value: Value = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;

    Ok(Some(value))
}

/// Deep merge two JSON values.
/// Source values override target values, with object merging at each level.
pub fn merge_json(target: &mut Value, source: Value) {
    match (target, source) {
        (Value::Object(target_map), Value::Object(source_map)) => {
            for (key, source_value) in source_map {
                match target_map.get_mut(&key) {
                    Some(target_value) => {
                        merge_json(target_value, source_value);
                    }
                    None => {
                        target_map.insert(key, source_value);
                    }
                }
            }
        }
        (target, source) => {
            *target = source;
        }
    }
}

/// Load and merge every config file found in `dir`.
///
/// Missing files are skipped; an empty object is returned when none exist.
/// Keys starting with `$` or `_` (schema hints, comments) are dropped.
pub fn load_layered_config(dir: &Path) -> Result<Value> {
    let mut config = Value::Object(Default::default());

    tracing::debug!("Loading layered config from {}", dir.display());

    for name in CONFIG_FILES {
        if let Some(layer) = load_json_file(&dir.join(name))? {
            merge_json(&mut config, strip_meta_keys(layer));
            tracing::debug!(file = %name, "Loaded config layer");
        }
    }

    Ok(config)
}

/// List which config files exist in `dir`.
pub fn existing_config_files(dir: &Path) -> Vec<&'static str> {
    CONFIG_FILES
        .iter()
        .copied()
        .filter(|name| dir.join(name).exists())
        .collect()
}

fn strip_meta_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(key, _)| !key.starts_with('$') && !key.starts_with('_'))
                .collect(),
        ),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_merge_json_deep() {
        let mut target = json!({
            "provider": {"batch_size": 40, "timeout_secs": 10},
            "observability": {"log_level": "info"}
        });
        let source = json!({
            "provider": {"appkey": "k", "batch_size": 30}
        });

        merge_json(&mut target, source);

        assert_eq!(target["provider"]["batch_size"], 30);
        assert_eq!(target["provider"]["timeout_secs"], 10);
        assert_eq!(target["provider"]["appkey"], "k");
        assert_eq!(target["observability"]["log_level"], "info");
    }

    #[test]
    fn test_merge_json_replaces_arrays() {
        let mut target = json!({"symbols": ["a", "b"]});
        merge_json(&mut target, json!({"symbols": ["c"]}));
        assert_eq!(target["symbols"], json!(["c"]));
    }

    #[test]
    fn test_load_json_file_missing() {
        let dir = TempDir::new().unwrap();
        let loaded = load_json_file(&dir.path().join("nope.json")).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn test_load_json_file_invalid() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{not json").unwrap();
        assert!(load_json_file(&path).is_err());
    }

    #[test]
    fn test_load_layered_config() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("config.json"),
            r#"{"$schema": "x", "provider": {"batch_size": 25}}"#,
        )
        .unwrap();
        fs::write(
            dir.path().join("secrets.json"),
            r#"{"provider": {"appkey": "secret"}}"#,
        )
        .unwrap();

        let merged = load_layered_config(dir.path()).unwrap();
        assert_eq!(merged["provider"]["batch_size"], 25);
        assert_eq!(merged["provider"]["appkey"], "secret");
        assert!(merged.get("$schema").is_none());
        assert_eq!(existing_config_files(dir.path()).len(), 2);
    }

    #[test]
    fn test_load_layered_config_empty_dir() {
        let dir = TempDir::new().unwrap();
        let merged = load_layered_config(dir.path()).unwrap();
        assert_eq!(merged, json!({}));
        assert!(existing_config_files(dir.path()).is_empty());
    }
}
