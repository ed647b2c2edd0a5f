//! Device connection configuration.
//!
//! Provides [`DeviceConfig`], loaded from `KINETIC_*` environment variables.

use std::path::PathBuf;
use std::time::Duration;

use kinstack_proto::FrameLimits;
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

/// Largest encoded message accepted from a device.
const MAX_MESSAGE_SIZE: u32 = 1024 * 1024;

/// How to reach and authenticate against a device.
///
/// # Examples
///
/// ```
/// use kinstack_client::DeviceConfig;
///
/// let config = DeviceConfig::default();
/// assert_eq!(config.address(), "127.0.0.1:8123");
/// assert_eq!(config.connections, 10);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[serde(rename_all = "camelCase")]
pub struct DeviceConfig {
    /// Device host name or address.
    #[builder(default = String::from("127.0.0.1"))]
    pub host: String,

    /// Plain TCP port.
    #[builder(default = 8123)]
    pub port: u16,

    /// TLS port.
    #[builder(default = 8443)]
    pub tls_port: u16,

    /// Connect over TLS instead of plain TCP.
    #[builder(default = false)]
    pub use_tls: bool,

    /// PEM file with the CA certificates trusted for the device.
    #[builder(default, setter(strip_option))]
    pub tls_ca_file: Option<PathBuf>,

    /// Accept any server certificate. Only for self-signed lab devices.
    #[builder(default = false)]
    pub tls_skip_verify: bool,

    /// Identity used for HMAC authentication.
    #[builder(default = 1)]
    pub identity: i64,

    /// HMAC key of `identity`.
    #[builder(default = String::from("asdfasdf"))]
    pub hmac_key: String,

    /// Number of pooled connections.
    #[builder(default = 10)]
    pub connections: usize,

    /// Per-request timeout in milliseconds, also sent in the request header.
    #[builder(default = 60_000)]
    pub timeout_ms: u64,

    /// Largest value accepted or returned by the device.
    #[builder(default = 16 * 1024 * 1024)]
    pub max_value_size: usize,

    /// TCP/TLS connect timeout in milliseconds.
    #[builder(default = 5_000)]
    pub connect_timeout_ms: u64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            host: String::from("127.0.0.1"),
            port: 8123,
            tls_port: 8443,
            use_tls: false,
            tls_ca_file: None,
            tls_skip_verify: false,
            identity: 1,
            hmac_key: String::from("asdfasdf"),
            connections: 10,
            timeout_ms: 60_000,
            max_value_size: 16 * 1024 * 1024,
            connect_timeout_ms: 5_000,
        }
    }
}

impl DeviceConfig {
    /// Load configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `KINETIC_HOST` | `127.0.0.1` |
    /// | `KINETIC_PORT` | `8123` |
    /// | `KINETIC_TLS_PORT` | `8443` |
    /// | `KINETIC_USE_TLS` | `false` |
    /// | `KINETIC_TLS_CA_FILE` | unset |
    /// | `KINETIC_TLS_SKIP_VERIFY` | `false` |
    /// | `KINETIC_IDENTITY` | `1` |
    /// | `KINETIC_HMAC_KEY` | `asdfasdf` |
    /// | `KINETIC_CONNECTIONS` | `10` |
    /// | `KINETIC_TIMEOUT_MS` | `60000` |
    /// | `KINETIC_MAX_VALUE_SIZE` | `16777216` |
    /// | `KINETIC_CONNECT_TIMEOUT_MS` | `5000` |
    ///
    /// Unparseable numbers keep their defaults.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(v) = std::env::var("KINETIC_HOST") {
            config.host = v;
        }
        if let Some(n) = env_parse("KINETIC_PORT") {
            config.port = n;
        }
        if let Some(n) = env_parse("KINETIC_TLS_PORT") {
            config.tls_port = n;
        }
        if let Ok(v) = std::env::var("KINETIC_USE_TLS") {
            config.use_tls = parse_bool(&v);
        }
        if let Ok(v) = std::env::var("KINETIC_TLS_CA_FILE") {
            config.tls_ca_file = Some(PathBuf::from(v));
        }
        if let Ok(v) = std::env::var("KINETIC_TLS_SKIP_VERIFY") {
            config.tls_skip_verify = parse_bool(&v);
        }
        if let Some(n) = env_parse("KINETIC_IDENTITY") {
            config.identity = n;
        }
        if let Ok(v) = std::env::var("KINETIC_HMAC_KEY") {
            config.hmac_key = v;
        }
        if let Some(n) = env_parse("KINETIC_CONNECTIONS") {
            config.connections = n;
        }
        if let Some(n) = env_parse("KINETIC_TIMEOUT_MS") {
            config.timeout_ms = n;
        }
        if let Some(n) = env_parse("KINETIC_MAX_VALUE_SIZE") {
            config.max_value_size = n;
        }
        if let Some(n) = env_parse("KINETIC_CONNECT_TIMEOUT_MS") {
            config.connect_timeout_ms = n;
        }

        config
    }

    /// `host:port`, using the TLS port when TLS is enabled.
    #[must_use]
    pub fn address(&self) -> String {
        let port = if self.use_tls { self.tls_port } else { self.port };
        format!("{}:{port}", self.host)
    }

    /// Per-request timeout.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Connect timeout.
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Frame limits derived from `max_value_size`.
    #[must_use]
    pub fn frame_limits(&self) -> FrameLimits {
        FrameLimits {
            max_message_len: MAX_MESSAGE_SIZE,
            max_value_len: u32::try_from(self.max_value_size).unwrap_or(u32::MAX),
        }
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
        let config = DeviceConfig::default();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 8123);
        assert_eq!(config.tls_port, 8443);
        assert!(!config.use_tls);
        assert!(config.tls_ca_file.is_none());
        assert_eq!(config.identity, 1);
        assert_eq!(config.hmac_key, "asdfasdf");
        assert_eq!(config.connections, 10);
        assert_eq!(config.request_timeout(), Duration::from_secs(60));
        assert_eq!(config.max_value_size, 16 * 1024 * 1024);
    }

    #[test]
    fn test_should_pick_port_by_transport() {
        let config = DeviceConfig::builder()
            .host("drive-7".into())
            .use_tls(true)
            .build();
        assert_eq!(config.address(), "drive-7:8443");
    }

    #[test]
    fn test_should_derive_frame_limits() {
        let config = DeviceConfig::builder().max_value_size(2048).build();
        let limits = config.frame_limits();
        assert_eq!(limits.max_value_len, 2048);
        assert_eq!(limits.max_message_len, MAX_MESSAGE_SIZE);
    }

    #[test]
    fn test_should_load_from_env() {
        let config = DeviceConfig::from_env();
        assert!(!config.host.is_empty());
    }

    #[test]
    fn test_should_parse_bool_values() {
        assert!(parse_bool("1"));
        assert!(parse_bool("TRUE"));
        assert!(!parse_bool("yes"));
        assert!(!parse_bool("0"));
    }

    #[test]
    fn test_should_serialize_to_camel_case_json() {
        let json = serde_json::to_string(&DeviceConfig::default()).unwrap();
        assert!(json.contains("\"hmacKey\""));
        assert!(json.contains("\"maxValueSize\""));
    }
}
