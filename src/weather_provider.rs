//! Unified Weather Provider
//!
//! This module provides a unified interface over the weather sources.
//! Supports:
//! - China (mainland China coverage, no API key)
//! - QWeather (global coverage, requires API key)
//!
//! The source can be selected at runtime based on location or configuration. A
//! main result can be enriched with air quality, minutely precipitation and alerts
//! from a second source.

use crate::config::ProviderConfig;
use crate::weather_china::ChinaWeatherService;
use crate::weather_model::{sort_alerts, Location, SecondaryWeatherWrapper, WeatherWrapper};
use crate::weather_qweather::QWeatherService;
use crate::weather_source::{SecondaryFeature, WeatherSource, WeatherSourceError};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Error, Debug)]
pub enum WeatherProviderError {
    #[error("Weather source error: {0}")]
    Source(#[from] WeatherSourceError),

    #[error("No suitable weather provider available")]
    NoProvider,

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Unknown weather source: {0}")]
    UnknownSource(String),
}

/// Weather provider type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeatherProviderType {
    /// China Meteorological Administration data through Xiaomi
    China,
    /// QWeather
    QWeather,
    /// Automatically select based on location
    Auto,
}

impl WeatherProviderType {
    /// Parse provider type from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "china" | "cn" | "xiaomi" => Some(WeatherProviderType::China),
            "qweather" | "hefeng" => Some(WeatherProviderType::QWeather),
            "auto" | "automatic" => Some(WeatherProviderType::Auto),
            _ => None,
        }
    }
}

/// Cached main weather result
#[derive(Debug, Clone)]
struct CachedWeather {
    data: WeatherWrapper,
    fetched_at: DateTime<Utc>,
}

/// Source id and coordinates in 1e-4 degrees
type CacheKey = (&'static str, i64, i64);

fn cache_key(source: &dyn WeatherSource, location: &Location) -> CacheKey {
    (
        source.id(),
        (location.latitude * 10_000.0).round() as i64,
        (location.longitude * 10_000.0).round() as i64,
    )
}

/// Enrich a main result with the requested features of a secondary result
pub fn merge_secondary(
    mut main: WeatherWrapper,
    secondary: SecondaryWeatherWrapper,
    features: &[SecondaryFeature],
) -> WeatherWrapper {
    if features.contains(&SecondaryFeature::AirQuality) {
        let air_quality = secondary
            .air_quality
            .or_else(|| secondary.current.as_ref().and_then(|c| c.air_quality));
        if let Some(current) = main.current.as_mut() {
            current.air_quality = air_quality;
        }
    }

    if features.contains(&SecondaryFeature::Minutely) {
        main.minutely_forecast = secondary.minutely_forecast;
        if let (Some(current), Some(precipitation)) = (main.current.as_mut(), secondary.precipitation) {
            current.hourly_forecast = Some(precipitation);
        }
    }

    if features.contains(&SecondaryFeature::Alert) {
        main.alert_list = secondary.alert_list;
        sort_alerts(&mut main.alert_list);
    }

    main
}

/// Unified weather provider
pub struct UnifiedWeatherProvider {
    provider_type: WeatherProviderType,
    china_service: Option<Arc<dyn WeatherSource>>,
    qweather_service: Option<Arc<dyn WeatherSource>>,
    cache: Arc<RwLock<HashMap<CacheKey, CachedWeather>>>,
    cache_duration_secs: i64,
}

impl UnifiedWeatherProvider {
    /// Create a new unified weather provider
    ///
    /// The China source is always available. QWeather is only used when an API
    /// key is configured.
    pub fn new(config: &ProviderConfig) -> Self {
        let china: Arc<dyn WeatherSource> = Arc::new(ChinaWeatherService::new(config.http_timeout));
        let qweather: Arc<dyn WeatherSource> = Arc::new(QWeatherService::new(
            config.qweather_api_key.clone(),
            &config.language,
            config.http_timeout,
        ));

        Self::with_sources(
            config.provider,
            Some(china),
            Some(qweather),
            Some(config.cache_duration_secs),
        )
    }

    /// Create a provider over explicit sources
    ///
    /// # Arguments
    /// * `provider_type` - Type of provider (China, QWeather or Auto)
    /// * `china_service` - Source for mainland China
    /// * `qweather_service` - Global source
    /// * `cache_duration_secs` - Cache duration in seconds (default: 600)
    pub fn with_sources(
        provider_type: WeatherProviderType,
        china_service: Option<Arc<dyn WeatherSource>>,
        qweather_service: Option<Arc<dyn WeatherSource>>,
        cache_duration_secs: Option<i64>,
    ) -> Self {
        Self {
            provider_type,
            china_service,
            qweather_service,
            cache: Arc::new(RwLock::new(HashMap::new())),
            cache_duration_secs: cache_duration_secs.unwrap_or(600),
        }
    }

    /// Get provider type
    pub fn provider_type(&self) -> WeatherProviderType {
        self.provider_type
    }

    /// Check if coordinates are in mainland China
    fn is_in_china(&self, lat: f64, lon: f64) -> bool {
        // Mainland China bounding box (approximate)
        // Lat: 18 to 54
        // Lon: 73 to 135
        (18.0..=54.0).contains(&lat) && (73.0..=135.0).contains(&lon)
    }

    fn configured(service: &Option<Arc<dyn WeatherSource>>) -> Option<Arc<dyn WeatherSource>> {
        service.as_ref().filter(|s| s.is_configured()).cloned()
    }

    /// Look up a configured source by id
    pub fn source(&self, id: &str) -> Result<Arc<dyn WeatherSource>, WeatherProviderError> {
        [&self.china_service, &self.qweather_service]
            .into_iter()
            .flatten()
            .find(|s| s.id() == id)
            .ok_or_else(|| WeatherProviderError::UnknownSource(id.to_string()))
            .and_then(|s| {
                if s.is_configured() {
                    Ok(s.clone())
                } else {
                    Err(WeatherProviderError::NotConfigured(s.name().to_string()))
                }
            })
    }

    /// Pick the main source of a location
    pub fn select_source(&self, location: &Location) -> Result<Arc<dyn WeatherSource>, WeatherProviderError> {
        match self.provider_type {
            WeatherProviderType::China => Self::configured(&self.china_service)
                .ok_or(WeatherProviderError::NotConfigured("China".to_string())),
            WeatherProviderType::QWeather => Self::configured(&self.qweather_service)
                .ok_or(WeatherProviderError::NotConfigured("QWeather".to_string())),
            WeatherProviderType::Auto => {
                // A location resolved by a source keeps that source
                if let Some(id) = location.weather_source.as_deref() {
                    if let Ok(source) = self.source(id) {
                        return Ok(source);
                    }
                }

                if self.is_in_china(location.latitude, location.longitude) {
                    if let Some(china) = Self::configured(&self.china_service) {
                        log::info!("Auto-selected China source for Chinese location");
                        return Ok(china);
                    }
                }
                match Self::configured(&self.qweather_service) {
                    Some(qweather) => {
                        log::info!("Auto-selected QWeather");
                        Ok(qweather)
                    }
                    None => {
                        log::error!(
                            "No provider for location ({}, {})",
                            location.latitude,
                            location.longitude
                        );
                        Err(WeatherProviderError::NoProvider)
                    }
                }
            }
        }
    }

    /// Fetch weather data using the appropriate source
    ///
    /// # Returns
    /// Weather data (cached if available and fresh)
    pub async fn fetch_weather(&self, location: &Location) -> Result<WeatherWrapper, WeatherProviderError> {
        self.fetch_main(location, &[]).await
    }

    async fn fetch_main(
        &self,
        location: &Location,
        ignore_features: &[SecondaryFeature],
    ) -> Result<WeatherWrapper, WeatherProviderError> {
        let source = self.select_source(location)?;
        let key = cache_key(source.as_ref(), location);

        // Results fetched without some features are never cached
        let cacheable = ignore_features.is_empty();
        if cacheable {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.get(&key) {
                let age = Utc::now()
                    .signed_duration_since(cached.fetched_at)
                    .num_seconds();
                if age < self.cache_duration_secs {
                    log::debug!(
                        "Using cached {} weather data (age: {}s, max: {}s)",
                        source.name(),
                        age,
                        self.cache_duration_secs
                    );
                    return Ok(cached.data.clone());
                }
            }
        }

        let data = source.request_weather(location, ignore_features).await?;

        if cacheable {
            let now = Utc::now();
            let mut cache = self.cache.write().await;
            // Expired entries are dropped so the cache only holds fresh locations
            let before = cache.len();
            cache.retain(|_, cached| {
                now.signed_duration_since(cached.fetched_at).num_seconds() < self.cache_duration_secs
            });
            if cache.len() < before {
                log::debug!("Evicted {} expired weather cache entries", before - cache.len());
            }
            cache.insert(
                key,
                CachedWeather {
                    data: data.clone(),
                    fetched_at: now,
                },
            );
            log::info!("{} weather data fetched and cached successfully", source.name());
        }

        Ok(data)
    }

    /// Fetch weather data enriched by a secondary source
    ///
    /// The main source skips the requested features. When the secondary source
    /// fails, the main result is returned without them.
    ///
    /// # Arguments
    /// * `location` - Location to fetch
    /// * `secondary_id` - Id of the source supplying `features`
    /// * `features` - Features taken from the secondary source
    pub async fn fetch_weather_with_secondary(
        &self,
        location: &Location,
        secondary_id: &str,
        features: &[SecondaryFeature],
    ) -> Result<WeatherWrapper, WeatherProviderError> {
        let secondary = self.source(secondary_id)?;
        let features: Vec<SecondaryFeature> = features
            .iter()
            .copied()
            .filter(|f| secondary.supported_features_in_secondary().contains(f))
            .collect();
        if features.is_empty() {
            return self.fetch_weather(location).await;
        }

        let weather = self.fetch_main(location, &features).await?;

        match secondary.request_secondary_weather(location, &features).await {
            Ok(data) => {
                log::info!(
                    "Enriched weather data with {:?} from {}",
                    features,
                    secondary.name()
                );
                Ok(merge_secondary(weather, data, &features))
            }
            Err(e) => {
                log::warn!("{} secondary weather failed: {}", secondary.name(), e);
                Ok(weather)
            }
        }
    }

    fn search_source(&self) -> Result<Arc<dyn WeatherSource>, WeatherProviderError> {
        match self.provider_type {
            WeatherProviderType::China => Self::configured(&self.china_service),
            WeatherProviderType::QWeather => Self::configured(&self.qweather_service),
            WeatherProviderType::Auto => Self::configured(&self.qweather_service)
                .or_else(|| Self::configured(&self.china_service)),
        }
        .ok_or(WeatherProviderError::NoProvider)
    }

    /// Search locations by name
    pub async fn search_locations(&self, query: &str) -> Result<Vec<Location>, WeatherProviderError> {
        let source = self.search_source()?;
        log::info!("Searching '{}' with {}", query, source.name());
        Ok(source.request_location_search(query).await?)
    }

    /// Resolve the locations of a source at given coordinates
    pub async fn reverse_geocode(
        &self,
        latitude: f64,
        longitude: f64,
    ) -> Result<Vec<Location>, WeatherProviderError> {
        let location = Location {
            latitude,
            longitude,
            ..Default::default()
        };
        let source = self.select_source(&location)?;
        Ok(source.request_reverse_geocoding(&location).await?)
    }

    /// Clear the weather cache
    pub async fn clear_cache(&self) {
        let mut cache = self.cache.write().await;
        cache.clear();
        log::debug!("Weather cache cleared");
    }

    /// Get cache statistics: size and (source, age in seconds) per entry
    pub async fn cache_stats(&self) -> (usize, Vec<(String, i64)>) {
        let cache = self.cache.read().await;
        let size = cache.len();
        let mut entries = Vec::new();

        for ((source, _, _), cached) in cache.iter() {
            let age = Utc::now()
                .signed_duration_since(cached.fetched_at)
                .num_seconds();
            entries.push((source.to_string(), age));
        }

        (size, entries)
    }
}
