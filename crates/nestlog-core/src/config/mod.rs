//! Engine and remote backend configuration.
//!
//! `EngineConfig` tunes the sync engine; `RemoteConfig` locates the Supabase
//! project the gateway talks to. Both are plain serde structs so clients can
//! load them from their own config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::util::{is_http_url, normalize_text_option};

/// Attempts before a queue item is evicted as a permanent failure
pub const DEFAULT_MAX_RETRIES: u32 = 5;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Tuning knobs for the sync engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Retry ceiling; an item is evicted once its retry count reaches it
    pub max_retries: u32,
    /// Upper bound on each remote call
    #[serde(with = "duration_secs")]
    pub request_timeout: Duration,
    /// Push each write right after it commits locally
    pub immediate_push: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            immediate_push: true,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_retries == 0 {
            return Err(Error::InvalidInput(
                "max_retries must be at least 1".to_string(),
            ));
        }
        if self.request_timeout.is_zero() {
            return Err(Error::InvalidInput(
                "request_timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Public Supabase project coordinates.
///
/// The anon key is safe to ship; user credentials travel separately in a
/// `SessionContext`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RemoteConfig {
    #[serde(default)]
    pub supabase_url: Option<String>,
    #[serde(default)]
    pub supabase_anon_key: Option<String>,
}

impl RemoteConfig {
    /// Resolve to a `(url, anon_key)` pair.
    ///
    /// Returns `None` when neither value is set; one without the other is an
    /// error.
    pub fn resolve(&self) -> Result<Option<(String, String)>> {
        let url = normalize_text_option(self.supabase_url.clone());
        let anon_key = normalize_text_option(self.supabase_anon_key.clone());

        match (url, anon_key) {
            (None, None) => Ok(None),
            (Some(url), Some(anon_key)) => {
                if !is_http_url(&url) {
                    return Err(Error::InvalidInput(
                        "supabase_url must include http:// or https://".to_string(),
                    ));
                }
                Ok(Some((url.trim_end_matches('/').to_string(), anon_key)))
            }
            (Some(_), None) => Err(Error::InvalidInput(
                "supabase_anon_key is required when supabase_url is set".to_string(),
            )),
            (None, Some(_)) => Err(Error::InvalidInput(
                "supabase_url is required when supabase_anon_key is set".to_string(),
            )),
        }
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn engine_config_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.max_retries, 5);
        assert!(config.immediate_push);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn engine_config_parses_partial_json() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"max_retries": 3, "request_timeout": 1.5}"#).unwrap();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.request_timeout, Duration::from_millis(1500));
        assert!(config.immediate_push);
    }

    #[test]
    fn engine_config_rejects_zero_retries() {
        let config = EngineConfig {
            max_retries: 0,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn remote_config_requires_both_values() {
        let config = RemoteConfig {
            supabase_url: Some("https://demo.supabase.co".to_string()),
            supabase_anon_key: None,
        };
        assert!(config.resolve().is_err());
        assert_eq!(RemoteConfig::default().resolve().unwrap(), None);
    }

    #[test]
    fn remote_config_normalizes_url() {
        let config = RemoteConfig {
            supabase_url: Some(" https://demo.supabase.co/ ".to_string()),
            supabase_anon_key: Some("anon".to_string()),
        };
        assert_eq!(
            config.resolve().unwrap(),
            Some(("https://demo.supabase.co".to_string(), "anon".to_string()))
        );
    }

    #[test]
    fn remote_config_rejects_non_http_url() {
        let config = RemoteConfig {
            supabase_url: Some("demo.supabase.co".to_string()),
            supabase_anon_key: Some("anon".to_string()),
        };
        assert!(config.resolve().is_err());
    }
}
