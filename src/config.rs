use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;
use std::time::Duration;

/// User policy, as persisted by the options page.
///
/// Every key is optional in storage; missing or malformed values fall back to
/// the defaults below.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FilterConfig {
    pub enabled: bool,
    pub hide_blue_badge_replies: bool,
    /// Keep posts from accounts the viewer follows.
    pub show_if_following: bool,
    pub show_if_follower_count_at_least_enabled: bool,
    pub show_if_follower_count_at_least: u64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        FilterConfig {
            enabled: true,
            hide_blue_badge_replies: true,
            show_if_following: true,
            show_if_follower_count_at_least_enabled: false,
            show_if_follower_count_at_least: 1000,
        }
    }
}

/// One key change as delivered by the store's change notification.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigChange {
    pub key: String,
    pub old_value: Option<Value>,
    /// `None` when the key was removed from storage.
    pub new_value: Option<Value>,
}

impl ConfigChange {
    pub fn set(key: &str, value: Value) -> Self {
        Self {
            key: key.to_string(),
            old_value: None,
            new_value: Some(value),
        }
    }
}

impl FilterConfig {
    /// Whether hiding is switched on at all.
    pub fn is_active(&self) -> bool {
        self.enabled && self.hide_blue_badge_replies
    }

    /// Builds a config from a raw key-value map, one key at a time.
    pub fn from_store_map(map: &Map<String, Value>) -> Self {
        let mut config = FilterConfig::default();
        for (key, value) in map {
            config.apply_value(key, Some(value));
        }
        config
    }

    pub fn from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let value: Value = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse YAML config: {path}"))?;
        match value {
            Value::Object(map) => Ok(Self::from_store_map(&map)),
            Value::Null => Ok(FilterConfig::default()),
            _ => anyhow::bail!("Config file {path} is not a key-value mapping"),
        }
    }

    /// Loads `path`, falling back to defaults when it is missing or unreadable.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            log::warn!(
                "Configuration file '{}' not found, using default configuration",
                path.display()
            );
            return FilterConfig::default();
        }
        match Self::from_file(&path.to_string_lossy()) {
            Ok(config) => {
                log::info!("Loaded configuration from: {}", path.display());
                config
            }
            Err(e) => {
                log::warn!("Failed to load config ({e}), using defaults");
                FilterConfig::default()
            }
        }
    }

    pub fn to_file(&self, path: &str) -> Result<()> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {path}"))?;
        Ok(())
    }

    /// Merges store notifications into the live config. Unknown keys are ignored.
    pub fn apply_changes(&mut self, changes: &[ConfigChange]) {
        for change in changes {
            self.apply_value(&change.key, change.new_value.as_ref());
        }
    }

    fn apply_value(&mut self, key: &str, value: Option<&Value>) {
        let defaults = FilterConfig::default();
        match key {
            "enabled" => self.enabled = bool_or(value, defaults.enabled),
            "hideBlueBadgeReplies" => {
                self.hide_blue_badge_replies = bool_or(value, defaults.hide_blue_badge_replies)
            }
            "showIfFollowing" => {
                self.show_if_following = bool_or(value, defaults.show_if_following)
            }
            "showIfFollowerCountAtLeastEnabled" => {
                self.show_if_follower_count_at_least_enabled =
                    bool_or(value, defaults.show_if_follower_count_at_least_enabled)
            }
            "showIfFollowerCountAtLeast" => {
                self.show_if_follower_count_at_least =
                    count_or(value, defaults.show_if_follower_count_at_least)
            }
            other => log::debug!("Ignoring unknown config key: {other}"),
        }
    }
}

fn bool_or(value: Option<&Value>, default: bool) -> bool {
    match value.and_then(Value::as_bool) {
        Some(b) => b,
        None => {
            if value.is_some() {
                log::debug!("Malformed boolean config value {value:?}, using default");
            }
            default
        }
    }
}

// The options form stores whatever `Number(input)` produced, so accept
// floats and numeric strings as well.
fn count_or(value: Option<&Value>, default: u64) -> u64 {
    let parsed = value.and_then(|v| match v {
        Value::Number(n) => n.as_u64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && *f >= 0.0)
                .map(|f| f.floor() as u64)
        }),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    });
    match parsed {
        Some(n) => n,
        None => {
            if value.is_some() {
                log::debug!("Malformed count config value {value:?}, using default");
            }
            default
        }
    }
}

/// Engine tunables. Defaults are the production values.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub min_scan_spacing: Duration,
    pub fetch_cooldown: Duration,
    pub cooldown_capacity: usize,
    pub lookup_timeout: Duration,
    pub lookup_batch_cap: usize,
    pub retry_limit: u32,
    pub retry_base: Duration,
    pub retry_factor: f64,
    pub retry_cap: Duration,
    pub navigation_settle: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        EngineSettings {
            min_scan_spacing: Duration::from_millis(200),
            fetch_cooldown: Duration::from_secs(15),
            cooldown_capacity: 4096,
            lookup_timeout: Duration::from_secs(2),
            lookup_batch_cap: 200,
            retry_limit: 8,
            retry_base: Duration::from_millis(600),
            retry_factor: 1.4,
            retry_cap: Duration::from_millis(6000),
            navigation_settle: Duration::from_millis(50),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_partial_store_uses_defaults() {
        let map = json!({"showIfFollowing": false}).as_object().unwrap().clone();
        let config = FilterConfig::from_store_map(&map);

        assert!(!config.show_if_following);
        assert!(config.enabled);
        assert!(config.hide_blue_badge_replies);
        assert_eq!(config.show_if_follower_count_at_least, 1000);
    }

    #[test]
    fn test_malformed_values_fall_back_per_key() {
        let map = json!({
            "enabled": "yes",
            "showIfFollowerCountAtLeastEnabled": true,
            "showIfFollowerCountAtLeast": -5,
            "someFutureKey": 1
        })
        .as_object()
        .unwrap()
        .clone();
        let config = FilterConfig::from_store_map(&map);

        assert!(config.enabled);
        assert!(config.show_if_follower_count_at_least_enabled);
        assert_eq!(config.show_if_follower_count_at_least, 1000);
    }

    #[test]
    fn test_count_accepts_floats_and_strings() {
        let mut config = FilterConfig::default();
        config.apply_changes(&[ConfigChange::set("showIfFollowerCountAtLeast", json!(2500.7))]);
        assert_eq!(config.show_if_follower_count_at_least, 2500);

        config.apply_changes(&[ConfigChange::set("showIfFollowerCountAtLeast", json!(" 42 "))]);
        assert_eq!(config.show_if_follower_count_at_least, 42);
    }

    #[test]
    fn test_apply_changes_in_place() {
        let mut config = FilterConfig::default();
        config.apply_changes(&[
            ConfigChange::set("enabled", json!(false)),
            ConfigChange {
                key: "showIfFollowing".to_string(),
                old_value: Some(json!(true)),
                new_value: Some(json!(false)),
            },
        ]);
        assert!(!config.enabled);
        assert!(!config.show_if_following);
        assert!(!config.is_active());

        // Removing a key restores its default.
        config.apply_changes(&[ConfigChange {
            key: "enabled".to_string(),
            old_value: Some(json!(false)),
            new_value: None,
        }]);
        assert!(config.enabled);
    }

    #[test]
    fn test_yaml_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("anti-imp.yaml");
        let path = path.to_str().unwrap();

        let config = FilterConfig {
            show_if_follower_count_at_least_enabled: true,
            show_if_follower_count_at_least: 5000,
            ..Default::default()
        };
        config.to_file(path).unwrap();

        let content = std::fs::read_to_string(path).unwrap();
        assert!(content.contains("showIfFollowerCountAtLeast: 5000"));
        assert_eq!(FilterConfig::from_file(path).unwrap(), config);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = FilterConfig::load_or_default("/nonexistent/anti-imp.yaml");
        assert_eq!(config, FilterConfig::default());
    }
}
