//! Unified weather data with air quality normalization
//!
//! This library normalizes weather data from heterogeneous providers into one
//! model, with an air quality index engine that makes pollutant concentrations
//! comparable across providers.
//!
//! # Modules
//!
//! - `breakpoints`: Piecewise-linear breakpoint scales and level lookup
//! - `pollutant_index`: Per-pollutant index tables, reverse conversion, level palette
//! - `weather_model`: Provider-agnostic weather records
//! - `weather_source`: The `WeatherSource` trait implemented by every provider
//! - `weather_qweather`: QWeather adapter
//! - `weather_china`: China (Xiaomi / CMA) adapter
//! - `weather_provider`: Source selection, caching and secondary enrichment
//! - `config`: Provider configuration

pub mod breakpoints;
pub mod config;
pub mod pollutant_index;
pub mod weather_china;
pub mod weather_model;
pub mod weather_provider;
pub mod weather_qweather;
pub mod weather_source;

pub use breakpoints::{level_of, BreakpointScale};
pub use config::{ConfigError, ProviderConfig};
pub use pollutant_index::{
    aqi_to_color, aqi_to_description, aqi_to_level, aqi_to_name, reverse_index, LevelPalette,
    PollutantKind, AQI_THRESHOLDS, CHINA_PM25_SCALE, DEFAULT_PALETTE,
};
pub use weather_china::ChinaWeatherService;
pub use weather_model::{
    AirQuality, Alert, AlertSeverity, Color, Current, Daily, HalfDay, Hourly, Location, Minutely,
    SecondaryWeatherWrapper, WeatherCode, WeatherWrapper,
};
pub use weather_provider::{
    merge_secondary, UnifiedWeatherProvider, WeatherProviderError, WeatherProviderType,
};
pub use weather_qweather::QWeatherService;
pub use weather_source::{SecondaryFeature, WeatherSource, WeatherSourceError};
