//! Provider configuration
//!
//! Settings shared by the unified provider and its sources. Values come from
//! [`ProviderConfig::default`], the environment ([`ProviderConfig::from_env`]) or
//! command-line flags layered on top by the binary.

use crate::weather_provider::WeatherProviderType;
use crate::weather_source::SecondaryFeature;
use std::time::Duration;
use thiserror::Error;

pub const QWEATHER_API_KEY_ENV: &str = "QWEATHER_API_KEY";
pub const PROVIDER_ENV: &str = "WEATHER_PROVIDER";
pub const LANGUAGE_ENV: &str = "WEATHER_LANGUAGE";

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("Unknown weather provider: {0}")]
    UnknownProvider(String),

    #[error("Unknown secondary feature: {0}")]
    UnknownFeature(String),

    #[error("Cache duration must not be negative, got {0}s")]
    InvalidCacheDuration(i64),

    #[error("HTTP timeout must be positive")]
    InvalidTimeout,

    #[error("Provider {0} requires an API key")]
    MissingApiKey(String),
}

/// Configuration of the unified provider
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Which source serves main weather requests
    pub provider: WeatherProviderType,

    /// QWeather API key, QWeather is unavailable without one
    pub qweather_api_key: Option<String>,

    /// Preferred locale for provider texts
    pub language: String,

    /// How long main weather results stay cached
    pub cache_duration_secs: i64,

    /// Timeout of each HTTP request
    pub http_timeout: Duration,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            provider: WeatherProviderType::Auto,
            qweather_api_key: None,
            language: "en".to_string(),
            cache_duration_secs: 600, // 10 minutes
            http_timeout: Duration::from_secs(30),
        }
    }
}

impl ProviderConfig {
    /// Defaults overridden by `WEATHER_PROVIDER`, `WEATHER_LANGUAGE` and `QWEATHER_API_KEY`
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let non_empty = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        if let Some(provider) = non_empty(PROVIDER_ENV) {
            config.provider = WeatherProviderType::from_str(&provider)
                .ok_or(ConfigError::UnknownProvider(provider))?;
        }
        if let Some(language) = non_empty(LANGUAGE_ENV) {
            config.language = language;
        }
        config.qweather_api_key = non_empty(QWEATHER_API_KEY_ENV);

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache_duration_secs < 0 {
            return Err(ConfigError::InvalidCacheDuration(self.cache_duration_secs));
        }
        if self.http_timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout);
        }
        if self.provider == WeatherProviderType::QWeather && self.qweather_api_key.is_none() {
            return Err(ConfigError::MissingApiKey("QWeather".to_string()));
        }
        Ok(())
    }
}

/// Parse a comma-separated feature list such as `air_quality,alert`
pub fn parse_features(list: &str) -> Result<Vec<SecondaryFeature>, ConfigError> {
    let mut features = Vec::new();
    for name in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let feature = SecondaryFeature::from_str(name)
            .ok_or_else(|| ConfigError::UnknownFeature(name.to_string()))?;
        if !features.contains(&feature) {
            features.push(feature);
        }
    }
    Ok(features)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ProviderConfig::default();
        assert_eq!(config.provider, WeatherProviderType::Auto);
        assert_eq!(config.cache_duration_secs, 600);
        assert_eq!(config.http_timeout, Duration::from_secs(30));
        assert_eq!(config.language, "en");
        assert!(config.qweather_api_key.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_lookup() {
        let config = ProviderConfig::from_lookup(lookup(&[
            (PROVIDER_ENV, "qweather"),
            (LANGUAGE_ENV, "zh"),
            (QWEATHER_API_KEY_ENV, "secret"),
        ]))
        .unwrap();
        assert_eq!(config.provider, WeatherProviderType::QWeather);
        assert_eq!(config.language, "zh");
        assert_eq!(config.qweather_api_key.as_deref(), Some("secret"));
        assert!(config.validate().is_ok());

        // Empty values are ignored
        let config =
            ProviderConfig::from_lookup(lookup(&[(QWEATHER_API_KEY_ENV, ""), (PROVIDER_ENV, " ")]))
                .unwrap();
        assert!(config.qweather_api_key.is_none());
        assert_eq!(config.provider, WeatherProviderType::Auto);

        let result = ProviderConfig::from_lookup(lookup(&[(PROVIDER_ENV, "bom")]));
        assert_eq!(
            result.unwrap_err(),
            ConfigError::UnknownProvider("bom".to_string())
        );
    }

    #[test]
    fn test_validate() {
        let config = ProviderConfig {
            cache_duration_secs: -1,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::InvalidCacheDuration(-1)));

        let config = ProviderConfig {
            http_timeout: Duration::ZERO,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::InvalidTimeout));

        let config = ProviderConfig {
            provider: WeatherProviderType::QWeather,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingApiKey(_))
        ));
    }

    #[test]
    fn test_parse_features() {
        assert_eq!(
            parse_features("air_quality, alert,air_quality").unwrap(),
            vec![SecondaryFeature::AirQuality, SecondaryFeature::Alert]
        );
        assert!(parse_features("").unwrap().is_empty());
        assert_eq!(
            parse_features("minutely,pollen"),
            Err(ConfigError::UnknownFeature("pollen".to_string()))
        );
    }
}
