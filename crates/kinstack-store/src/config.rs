//! Object store configuration.
//!
//! Provides [`StoreConfig`], the knobs of the key-value object layer.
//! Values are loaded from environment variables prefixed with `KV_`.

use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

/// 5 MiB, the smallest part allowed anywhere but last.
const DEFAULT_MIN_PART_SIZE: u64 = 5 * 1024 * 1024;

/// 16 MiB, matching the default device value limit.
const DEFAULT_MAX_OBJECT_SIZE: u64 = 16 * 1024 * 1024;

/// Object store configuration.
///
/// # Examples
///
/// ```
/// use kinstack_store::config::StoreConfig;
///
/// let config = StoreConfig::default();
/// assert_eq!(config.key_range_max, 800);
/// assert!(config.strict_bucket_names);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[serde(rename_all = "camelCase")]
pub struct StoreConfig {
    /// Keys requested per range scan.
    #[builder(default = 800)]
    pub key_range_max: u32,

    /// Minimum size of every part except the last.
    #[builder(default = DEFAULT_MIN_PART_SIZE)]
    pub min_part_size: u64,

    /// Highest accepted part number.
    #[builder(default = 10_000)]
    pub max_part_number: u32,

    /// Largest single object or part, bounded by one device value.
    #[builder(default = DEFAULT_MAX_OBJECT_SIZE)]
    pub max_object_size: u64,

    /// Apply DNS-compatible bucket naming rules.
    #[builder(default = true)]
    pub strict_bucket_names: bool,

    /// Log level filter string (e.g. `"info"`, `"debug"`).
    #[builder(default = String::from("info"))]
    pub log_level: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            key_range_max: 800,
            min_part_size: DEFAULT_MIN_PART_SIZE,
            max_part_number: 10_000,
            max_object_size: DEFAULT_MAX_OBJECT_SIZE,
            strict_bucket_names: true,
            log_level: String::from("info"),
        }
    }
}

impl StoreConfig {
    /// Load configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `KV_KEY_RANGE_MAX` | `800` |
    /// | `KV_MIN_PART_SIZE` | `5242880` |
    /// | `KV_MAX_PART_NUMBER` | `10000` |
    /// | `KV_MAX_OBJECT_SIZE` | `16777216` |
    /// | `KV_STRICT_BUCKET_NAMES` | `true` |
    /// | `LOG_LEVEL` | `info` |
    ///
    /// # Examples
    ///
    /// ```
    /// use kinstack_store::config::StoreConfig;
    ///
    /// let config = StoreConfig::from_env();
    /// assert!(config.key_range_max > 0);
    /// ```
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(n) = env_parse::<u32>("KV_KEY_RANGE_MAX") {
            if n > 0 {
                config.key_range_max = n;
            }
        }
        if let Some(n) = env_parse("KV_MIN_PART_SIZE") {
            config.min_part_size = n;
        }
        if let Some(n) = env_parse("KV_MAX_PART_NUMBER") {
            config.max_part_number = n;
        }
        if let Some(n) = env_parse("KV_MAX_OBJECT_SIZE") {
            config.max_object_size = n;
        }
        if let Ok(v) = std::env::var("KV_STRICT_BUCKET_NAMES") {
            config.strict_bucket_names = parse_bool(&v);
        }
        if let Ok(v) = std::env::var("LOG_LEVEL") {
            config.log_level = v;
        }

        config
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

/// Parse a string as a boolean, accepting `"1"` and `"true"` (case-insensitive).
fn parse_bool(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_create_default_config() {
        let config = StoreConfig::default();
        assert_eq!(config.key_range_max, 800);
        assert_eq!(config.min_part_size, 5 * 1024 * 1024);
        assert_eq!(config.max_part_number, 10_000);
        assert_eq!(config.max_object_size, 16 * 1024 * 1024);
        assert!(config.strict_bucket_names);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_should_load_from_env() {
        let config = StoreConfig::from_env();
        assert!(config.key_range_max > 0);
    }

    #[test]
    fn test_should_build_with_typed_builder() {
        let config = StoreConfig::builder()
            .key_range_max(2)
            .min_part_size(10)
            .max_part_number(5)
            .max_object_size(1024)
            .strict_bucket_names(false)
            .log_level("debug".into())
            .build();

        assert_eq!(config.key_range_max, 2);
        assert_eq!(config.min_part_size, 10);
        assert_eq!(config.max_part_number, 5);
        assert_eq!(config.max_object_size, 1024);
        assert!(!config.strict_bucket_names);
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn test_should_serialize_to_camel_case_json() {
        let json = serde_json::to_string(&StoreConfig::default()).expect("test serialization");
        assert!(json.contains("keyRangeMax"));
        assert!(json.contains("strictBucketNames"));
        assert!(!json.contains("key_range_max"));
    }

    #[test]
    fn test_should_parse_bool_values() {
        assert!(parse_bool("1"));
        assert!(parse_bool("TRUE"));
        assert!(!parse_bool("0"));
        assert!(!parse_bool("yes"));
    }
}
