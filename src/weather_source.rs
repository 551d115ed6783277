//! Weather Source capability
//!
//! Every provider adapter implements [`WeatherSource`]: it fetches the provider's
//! payloads, decodes them with serde and normalizes them into the shared weather
//! model. A source can act as the main source of a location (full forecast) or as a
//! secondary source supplying only some features.

use crate::weather_model::{Location, SecondaryWeatherWrapper, WeatherWrapper};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::de::DeserializeOwned;
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WeatherSourceError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("JSON parsing failed: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("API key not configured")]
    ApiKeyMissing,

    #[error("Location is not supported by this source: {0}")]
    InvalidLocation(String),

    #[error("Invalid or incomplete data received from the source")]
    InvalidOrIncompleteData,

    #[error("Secondary weather data could not be retrieved: {0}")]
    SecondaryWeather(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Unknown time zone: {0}")]
    UnknownTimeZone(String),
}

pub type Result<T> = std::result::Result<T, WeatherSourceError>;

/// Features a source can provide on top of another main source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SecondaryFeature {
    AirQuality,
    Minutely,
    Alert,
}

impl SecondaryFeature {
    pub const ALL: [SecondaryFeature; 3] = [
        SecondaryFeature::AirQuality,
        SecondaryFeature::Minutely,
        SecondaryFeature::Alert,
    ];

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "air_quality" | "airquality" | "aqi" => Some(SecondaryFeature::AirQuality),
            "minutely" | "nowcast" => Some(SecondaryFeature::Minutely),
            "alert" | "alerts" | "warning" => Some(SecondaryFeature::Alert),
            _ => None,
        }
    }
}

impl fmt::Display for SecondaryFeature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SecondaryFeature::AirQuality => write!(f, "air_quality"),
            SecondaryFeature::Minutely => write!(f, "minutely"),
            SecondaryFeature::Alert => write!(f, "alert"),
        }
    }
}

/// A provider of weather data
#[async_trait::async_trait]
pub trait WeatherSource: Send + Sync {
    /// Stable identifier, stored in [`Location::weather_source`]
    fn id(&self) -> &'static str;

    /// Display name
    fn name(&self) -> &'static str;

    /// Secondary features also returned by a main request
    fn supported_features_in_main(&self) -> &'static [SecondaryFeature];

    /// Features this source can supply as a secondary source
    fn supported_features_in_secondary(&self) -> &'static [SecondaryFeature];

    /// Whether the source has everything it needs (API key, ...)
    fn is_configured(&self) -> bool {
        true
    }

    /// Fetch the full forecast of a location
    ///
    /// # Arguments
    /// * `location` - Location previously returned by this source
    /// * `ignore_features` - Secondary features another source will supply
    async fn request_weather(
        &self,
        location: &Location,
        ignore_features: &[SecondaryFeature],
    ) -> Result<WeatherWrapper>;

    /// Fetch only the requested secondary features
    async fn request_secondary_weather(
        &self,
        location: &Location,
        requested_features: &[SecondaryFeature],
    ) -> Result<SecondaryWeatherWrapper>;

    async fn request_location_search(&self, query: &str) -> Result<Vec<Location>>;

    /// Resolve the source's own location for given coordinates
    async fn request_reverse_geocoding(&self, location: &Location) -> Result<Vec<Location>>;
}

/// GET a JSON document, mapping non-success statuses to [`WeatherSourceError::ApiError`]
pub(crate) async fn get_json<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
    query: &[(&str, String)],
) -> Result<T> {
    log::debug!("Requesting {}", url);

    let response = client.get(url).query(query).send().await?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(WeatherSourceError::ApiError(format!(
            "API returned status {}: {}",
            status, body
        )));
    }

    let bytes = response.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Parse a numeric field delivered as a string, empty or garbage meaning absent
pub(crate) fn parse_f64(value: Option<&str>) -> Option<f64> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|v| v.is_finite())
}

pub(crate) fn parse_i32(value: Option<&str>) -> Option<i32> {
    value.map(str::trim).and_then(|s| s.parse::<i32>().ok())
}

/// Parse provider timestamps
///
/// Accepts RFC 3339 (`2024-05-01T08:00:00+08:00`) and the minute-precision form
/// used by QWeather (`2024-05-01T08:00+08:00`).
pub(crate) fn parse_time(value: Option<&str>) -> Option<DateTime<Utc>> {
    let s = value?.trim();
    if s.is_empty() {
        return None;
    }
    DateTime::parse_from_rfc3339(s)
        .or_else(|_| DateTime::parse_from_str(s, "%Y-%m-%dT%H:%M%:z"))
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
                .ok()
                .map(|naive| naive.and_utc())
        })
}

/// Resolve a wall-clock time of a zone to an instant, the earlier one on DST overlaps
pub(crate) fn local_to_utc(zone: Tz, local: NaiveDateTime) -> Option<DateTime<Utc>> {
    zone.from_local_datetime(&local)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Deserialize a field some payloads send as a number and others as a string
pub(crate) fn deserialize_text<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::{self, Visitor};

    struct TextVisitor;

    impl<'de> Visitor<'de> for TextVisitor {
        type Value = Option<String>;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a number or a string")
        }

        fn visit_i64<E>(self, value: i64) -> std::result::Result<Option<String>, E>
        where
            E: de::Error,
        {
            Ok(Some(value.to_string()))
        }

        fn visit_u64<E>(self, value: u64) -> std::result::Result<Option<String>, E>
        where
            E: de::Error,
        {
            Ok(Some(value.to_string()))
        }

        fn visit_f64<E>(self, value: f64) -> std::result::Result<Option<String>, E>
        where
            E: de::Error,
        {
            Ok(Some(value.to_string()))
        }

        fn visit_str<E>(self, value: &str) -> std::result::Result<Option<String>, E>
        where
            E: de::Error,
        {
            Ok(Some(value.to_string()))
        }

        fn visit_none<E>(self) -> std::result::Result<Option<String>, E>
        where
            E: de::Error,
        {
            Ok(None)
        }

        fn visit_unit<E>(self) -> std::result::Result<Option<String>, E>
        where
            E: de::Error,
        {
            Ok(None)
        }
    }

    deserializer.deserialize_any(TextVisitor)
}
