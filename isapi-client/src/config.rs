//! Connection settings for the access-control terminal
//!
//! Settings are read from the environment once at process start and then
//! handed around explicitly as a [`SharedConfig`]. Every request takes a fresh
//! [`SharedConfig::snapshot`], so an operator changing the device address in
//! the settings screen only needs [`SharedConfig::replace`] (or
//! [`SharedConfig::reload_from_env`]) for the next call to pick it up.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tracing::warn;

use crate::error::ConfigError;

pub const ENV_HOST: &str = "DEVICE_HOST";
pub const ENV_PORT: &str = "DEVICE_PORT";
pub const ENV_USER: &str = "DEVICE_USER";
pub const ENV_PASS: &str = "DEVICE_PASS";
pub const ENV_DOOR_NO: &str = "DEVICE_DOOR_NO";
pub const ENV_TIMEOUT_MS: &str = "DEVICE_TIMEOUT_MS";
pub const ENV_WIRE_FORMAT: &str = "DEVICE_WIRE_FORMAT";
pub const ENV_RETRY_MAX: &str = "DEVICE_RETRY_MAX";
pub const ENV_RETRY_DELAY_MS: &str = "DEVICE_RETRY_DELAY_MS";
pub const ENV_DISABLE_SYNC: &str = "DISABLE_DEVICE_SYNC";
pub const ENV_RUNTIME: &str = "GYMSYNC_ENV";

/// Encoding used for request and response bodies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WireFormat {
    /// `application/xml` bodies (the terminal's native format)
    #[default]
    Xml,
    /// `application/json` bodies, requested with `?format=json`
    Json,
}

impl WireFormat {
    pub fn content_type(&self) -> &'static str {
        match self {
            WireFormat::Xml => "application/xml",
            WireFormat::Json => "application/json",
        }
    }
}

impl FromStr for WireFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "xml" => Ok(WireFormat::Xml),
            "json" => Ok(WireFormat::Json),
            other => Err(format!("expected \"xml\" or \"json\", got {other:?}")),
        }
    }
}

/// Retry policy for transient device failures
///
/// The default performs no retries: a failed sync is reported straight back to
/// the caller, who can re-run it by hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts after the first call
    pub max_retries: u32,
    /// Base delay between retries
    pub base_delay: Duration,
    /// Whether to double the delay on every attempt
    pub exponential_backoff: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

impl RetryPolicy {
    /// Create a retry policy with no retries
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
            exponential_backoff: false,
        }
    }

    /// Create a retry policy with fixed delays
    pub fn fixed(max_retries: u32, delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay: delay,
            exponential_backoff: false,
        }
    }

    /// Create a retry policy with exponential backoff
    pub fn exponential(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            exponential_backoff: true,
        }
    }

    /// Calculate the delay before a given retry attempt (1-based)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 || attempt > self.max_retries {
            return Duration::ZERO;
        }

        if self.exponential_backoff {
            let factor = 2_u32.saturating_pow(attempt - 1);
            self.base_delay.saturating_mul(factor)
        } else {
            self.base_delay
        }
    }
}

/// Device connection settings
#[derive(Clone, PartialEq, Eq)]
pub struct DeviceConfig {
    /// LAN address of the terminal
    pub host: Option<String>,
    /// HTTP port
    /// Default: 80
    pub port: u16,
    /// HTTP Basic Auth user
    pub username: Option<String>,
    /// HTTP Basic Auth password
    pub password: Option<String>,
    /// Door used by remote-open commands when none is given
    /// Default: 1
    pub door_no: u32,
    /// Per-request timeout
    /// Default: 8 seconds
    pub timeout: Duration,
    /// Body encoding
    /// Default: XML
    pub wire_format: WireFormat,
    /// Skip every device call (tests, offline development)
    /// Default: false
    pub sync_disabled: bool,
    /// Retries for transient failures
    /// Default: none
    pub retry: RetryPolicy,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: 80,
            username: None,
            password: None,
            door_no: 1,
            timeout: Duration::from_millis(8000),
            wire_format: WireFormat::Xml,
            sync_disabled: false,
            retry: RetryPolicy::none(),
        }
    }
}

impl fmt::Debug for DeviceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("door_no", &self.door_no)
            .field("timeout", &self.timeout)
            .field("wire_format", &self.wire_format)
            .field("sync_disabled", &self.sync_disabled)
            .field("retry", &self.retry)
            .finish()
    }
}

impl DeviceConfig {
    /// Create a DeviceConfig with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let text = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let timeout_ms: u64 = parse_or(&text, ENV_TIMEOUT_MS, defaults.timeout.as_millis() as u64)?;
        let retry_max: u32 = parse_or(&text, ENV_RETRY_MAX, 0)?;
        let retry_delay_ms: u64 = parse_or(&text, ENV_RETRY_DELAY_MS, 500)?;

        let wire_format = match text(ENV_WIRE_FORMAT) {
            Some(value) => value.parse::<WireFormat>().map_err(|reason| ConfigError::InvalidValue {
                key: ENV_WIRE_FORMAT,
                value,
                reason,
            })?,
            None => defaults.wire_format,
        };

        let sync_disabled = text(ENV_DISABLE_SYNC).is_some_and(|v| is_truthy(&v))
            || text(ENV_RUNTIME).is_some_and(|v| v.eq_ignore_ascii_case("test"));

        let config = Self {
            host: text(ENV_HOST),
            port: parse_or(&text, ENV_PORT, defaults.port)?,
            username: text(ENV_USER),
            password: text(ENV_PASS),
            door_no: parse_or(&text, ENV_DOOR_NO, defaults.door_no)?,
            timeout: Duration::from_millis(timeout_ms),
            wire_format,
            sync_disabled,
            retry: if retry_max == 0 {
                RetryPolicy::none()
            } else {
                RetryPolicy::exponential(retry_max, Duration::from_millis(retry_delay_ms))
            },
        };

        config.validate()?;

        if !config.sync_disabled
            && (config.host.is_none() || config.username.is_none() || config.password.is_none())
        {
            warn!(
                "{ENV_HOST} / {ENV_USER} / {ENV_PASS} are not all set; device sync will fail until they are"
            );
        }

        Ok(config)
    }

    /// Validate the configuration and return any issues
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::Invalid("device port must be greater than 0".to_string()));
        }

        if self.door_no == 0 {
            return Err(ConfigError::Invalid("door numbers start at 1".to_string()));
        }

        if self.timeout == Duration::ZERO {
            return Err(ConfigError::Invalid(
                "request timeout must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// ISAPI root, e.g. `http://192.168.8.150:80/ISAPI`
    pub fn base_url(&self) -> Option<String> {
        self.host
            .as_deref()
            .map(|host| format!("http://{}:{}/ISAPI", host, self.port))
    }

    pub fn with_device(mut self, host: impl Into<String>, port: u16) -> Self {
        self.host = Some(host.into());
        self.port = port;
        self
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn with_door(mut self, door_no: u32) -> Self {
        self.door_no = door_no;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_wire_format(mut self, format: WireFormat) -> Self {
        self.wire_format = format;
        self
    }

    pub fn with_sync_disabled(mut self, disabled: bool) -> Self {
        self.sync_disabled = disabled;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

fn parse_or<T, F>(text: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match text(key) {
        Some(value) => value.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key,
            reason: e.to_string(),
            value,
        }),
        None => Ok(default),
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

/// Configuration handle shared by the client and the adapter
#[derive(Debug, Clone, Default)]
pub struct SharedConfig(Arc<RwLock<DeviceConfig>>);

impl SharedConfig {
    pub fn new(config: DeviceConfig) -> Self {
        Self(Arc::new(RwLock::new(config)))
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        DeviceConfig::from_env().map(Self::new)
    }

    /// Copy of the settings as they are right now
    pub fn snapshot(&self) -> DeviceConfig {
        self.0.read().clone()
    }

    pub fn sync_disabled(&self) -> bool {
        self.0.read().sync_disabled
    }

    /// Swap in new settings; the next request uses them
    pub fn replace(&self, config: DeviceConfig) {
        *self.0.write() = config;
    }

    /// Edit the settings in place
    pub fn update(&self, edit: impl FnOnce(&mut DeviceConfig)) {
        edit(&mut self.0.write());
    }

    /// Re-read the environment and swap in the result
    pub fn reload_from_env(&self) -> Result<(), ConfigError> {
        let config = DeviceConfig::from_env()?;
        self.replace(config);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = DeviceConfig::default();
        assert_eq!(config.port, 80);
        assert_eq!(config.door_no, 1);
        assert_eq!(config.timeout, Duration::from_millis(8000));
        assert_eq!(config.wire_format, WireFormat::Xml);
        assert!(!config.sync_disabled);
        assert_eq!(config.retry, RetryPolicy::none());
        assert!(config.validate().is_ok());
        assert_eq!(config.base_url(), None);
    }

    #[test]
    fn test_from_lookup_reads_every_key() {
        let config = DeviceConfig::from_lookup(lookup(&[
            (ENV_HOST, "192.168.8.150"),
            (ENV_PORT, "8080"),
            (ENV_USER, "admin"),
            (ENV_PASS, "secret"),
            (ENV_DOOR_NO, "2"),
            (ENV_TIMEOUT_MS, "2500"),
            (ENV_WIRE_FORMAT, "JSON"),
            (ENV_RETRY_MAX, "2"),
            (ENV_RETRY_DELAY_MS, "100"),
        ]))
        .unwrap();

        assert_eq!(config.host.as_deref(), Some("192.168.8.150"));
        assert_eq!(config.port, 8080);
        assert_eq!(config.username.as_deref(), Some("admin"));
        assert_eq!(config.password.as_deref(), Some("secret"));
        assert_eq!(config.door_no, 2);
        assert_eq!(config.timeout, Duration::from_millis(2500));
        assert_eq!(config.wire_format, WireFormat::Json);
        assert_eq!(
            config.retry,
            RetryPolicy::exponential(2, Duration::from_millis(100))
        );
        assert_eq!(
            config.base_url().as_deref(),
            Some("http://192.168.8.150:8080/ISAPI")
        );
        assert!(!config.sync_disabled);
    }

    #[test]
    fn test_sync_disable_switches() {
        let disabled = DeviceConfig::from_lookup(lookup(&[(ENV_DISABLE_SYNC, "1")])).unwrap();
        assert!(disabled.sync_disabled);

        let test_runtime = DeviceConfig::from_lookup(lookup(&[(ENV_RUNTIME, "test")])).unwrap();
        assert!(test_runtime.sync_disabled);

        let enabled = DeviceConfig::from_lookup(lookup(&[(ENV_DISABLE_SYNC, "0")])).unwrap();
        assert!(!enabled.sync_disabled);
    }

    #[test]
    fn test_invalid_number_is_reported() {
        let err = DeviceConfig::from_lookup(lookup(&[(ENV_TIMEOUT_MS, "soon")])).unwrap_err();
        match err {
            ConfigError::InvalidValue { key, value, .. } => {
                assert_eq!(key, ENV_TIMEOUT_MS);
                assert_eq!(value, "soon");
            }
            other => panic!("Expected InvalidValue, got {other:?}"),
        }
    }

    #[test]
    fn test_invalid_wire_format_is_reported() {
        let err = DeviceConfig::from_lookup(lookup(&[(ENV_WIRE_FORMAT, "soap")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: ENV_WIRE_FORMAT, .. }));
    }

    #[test]
    fn test_config_validation() {
        assert!(DeviceConfig::default().with_timeout(Duration::ZERO).validate().is_err());
        assert!(DeviceConfig::default().with_door(0).validate().is_err());
        assert!(DeviceConfig::default().with_device("10.0.0.2", 0).validate().is_err());
    }

    #[test]
    fn test_debug_redacts_password() {
        let config = DeviceConfig::default().with_credentials("admin", "hunter2");
        let debug = format!("{config:?}");
        assert!(debug.contains("admin"));
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_shared_config_replace_is_visible_to_clones() {
        let shared = SharedConfig::new(DeviceConfig::default());
        let other = shared.clone();

        shared.replace(DeviceConfig::default().with_device("10.0.0.9", 81));
        assert_eq!(other.snapshot().host.as_deref(), Some("10.0.0.9"));

        other.update(|cfg| cfg.sync_disabled = true);
        assert!(shared.sync_disabled());
    }

    #[test]
    fn test_retry_delays() {
        let fixed = RetryPolicy::fixed(2, Duration::from_millis(50));
        assert_eq!(fixed.delay_for_attempt(1), Duration::from_millis(50));
        assert_eq!(fixed.delay_for_attempt(2), Duration::from_millis(50));
        assert_eq!(fixed.delay_for_attempt(3), Duration::ZERO);

        let exp = RetryPolicy::exponential(3, Duration::from_millis(100));
        assert_eq!(exp.delay_for_attempt(0), Duration::ZERO);
        assert_eq!(exp.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(exp.delay_for_attempt(2), Duration::from_millis(200));
        assert_eq!(exp.delay_for_attempt(3), Duration::from_millis(400));

        assert_eq!(RetryPolicy::none().delay_for_attempt(1), Duration::ZERO);
    }
}
