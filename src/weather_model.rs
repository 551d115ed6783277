//! Shared Weather Model
//!
//! Provider-agnostic records every source adapter converts into. Anything a
//! provider may omit is an `Option`. Units are fixed: temperatures in °C, wind
//! speed in m/s, visibility in meters, pressure in hPa, precipitation in mm and
//! pollutant concentrations in µg/m³ (CO in mg/m³).

use crate::pollutant_index::{self, PollutantKind, DEFAULT_PALETTE};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;

/// Packed ARGB color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color(pub u32);

impl Color {
    pub const TRANSPARENT: Color = Color(0);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Color(0xFF00_0000 | (r as u32) << 16 | (g as u32) << 8 | b as u32)
    }

    pub fn alpha(self) -> u8 {
        (self.0 >> 24) as u8
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:08X}", self.0)
    }
}

impl Serialize for Color {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Canonical weather condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WeatherCode {
    Clear,
    PartlyCloudy,
    Cloudy,
    Rain,
    ShoweryRain,
    LightRain,
    ModerateRain,
    HeavyRain,
    Rainstorm,
    Snow,
    ShowerySnow,
    LightSnow,
    ModerateSnow,
    HeavySnow,
    Snowstorm,
    Wind,
    Fog,
    Haze,
    Sleet,
    Hail,
    Thunder,
    Thunderstorm,
}

impl WeatherCode {
    pub const ALL: [WeatherCode; 22] = [
        WeatherCode::Clear,
        WeatherCode::PartlyCloudy,
        WeatherCode::Cloudy,
        WeatherCode::Rain,
        WeatherCode::ShoweryRain,
        WeatherCode::LightRain,
        WeatherCode::ModerateRain,
        WeatherCode::HeavyRain,
        WeatherCode::Rainstorm,
        WeatherCode::Snow,
        WeatherCode::ShowerySnow,
        WeatherCode::LightSnow,
        WeatherCode::ModerateSnow,
        WeatherCode::HeavySnow,
        WeatherCode::Snowstorm,
        WeatherCode::Wind,
        WeatherCode::Fog,
        WeatherCode::Haze,
        WeatherCode::Sleet,
        WeatherCode::Hail,
        WeatherCode::Thunder,
        WeatherCode::Thunderstorm,
    ];

    pub fn id(self) -> &'static str {
        match self {
            WeatherCode::Clear => "clear",
            WeatherCode::PartlyCloudy => "partly_cloudy",
            WeatherCode::Cloudy => "cloudy",
            WeatherCode::Rain => "rain",
            WeatherCode::ShoweryRain => "showery_rain",
            WeatherCode::LightRain => "light_rain",
            WeatherCode::ModerateRain => "moderate_rain",
            WeatherCode::HeavyRain => "heavy_rain",
            WeatherCode::Rainstorm => "rainstorm",
            WeatherCode::Snow => "snow",
            WeatherCode::ShowerySnow => "showery_snow",
            WeatherCode::LightSnow => "light_snow",
            WeatherCode::ModerateSnow => "moderate_snow",
            WeatherCode::HeavySnow => "heavy_snow",
            WeatherCode::Snowstorm => "snowstorm",
            WeatherCode::Wind => "wind",
            WeatherCode::Fog => "fog",
            WeatherCode::Haze => "haze",
            WeatherCode::Sleet => "sleet",
            WeatherCode::Hail => "hail",
            WeatherCode::Thunder => "thunder",
            WeatherCode::Thunderstorm => "thunderstorm",
        }
    }

    /// Case-insensitive lookup by id
    pub fn from_id(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|code| code.id().eq_ignore_ascii_case(value))
    }
}

impl fmt::Display for WeatherCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Unknown = 0,
    Minor = 1,
    Moderate = 2,
    Severe = 3,
    Extreme = 4,
}

impl AlertSeverity {
    pub fn id(self) -> u8 {
        self as u8
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Temperature {
    pub temperature: Option<f64>,
    pub real_feel_temperature: Option<f64>,
    pub apparent_temperature: Option<f64>,
}

impl Temperature {
    pub fn new(temperature: Option<f64>) -> Self {
        Self {
            temperature,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Wind {
    /// Direction the wind comes from, degrees
    pub degree: Option<f64>,
    /// m/s
    pub speed: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Uv {
    pub index: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PrecipitationProbability {
    /// Percent
    pub total: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Precipitation {
    /// mm
    pub total: Option<f64>,
}

/// Pollutant concentrations
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct AirQuality {
    pub pm25: Option<f64>,
    pub pm10: Option<f64>,
    pub so2: Option<f64>,
    pub no2: Option<f64>,
    pub o3: Option<f64>,
    pub co: Option<f64>,
}

impl AirQuality {
    /// Air quality only known through a PM2.5 equivalent
    pub fn from_pm25(pm25: Option<f64>) -> Self {
        Self {
            pm25,
            ..Default::default()
        }
    }

    pub fn concentration(&self, pollutant: PollutantKind) -> Option<f64> {
        match pollutant {
            PollutantKind::PM25 => self.pm25,
            PollutantKind::PM10 => self.pm10,
            PollutantKind::SO2 => self.so2,
            PollutantKind::NO2 => self.no2,
            PollutantKind::O3 => self.o3,
            PollutantKind::CO => self.co,
        }
    }

    /// Index of one pollutant, or the worst pollutant when none is given
    pub fn index(&self, pollutant: Option<PollutantKind>) -> Option<u32> {
        match pollutant {
            Some(pollutant) => pollutant.index(self.concentration(pollutant)),
            None => PollutantKind::ALL
                .iter()
                .filter_map(|p| p.index(self.concentration(*p)))
                .max(),
        }
    }

    /// Level of one pollutant, or of the overall index when none is given
    ///
    /// An overall index of zero sits on level 0, like a zero concentration.
    pub fn level(&self, pollutant: Option<PollutantKind>) -> Option<usize> {
        match pollutant {
            Some(pollutant) => pollutant.level(self.concentration(pollutant)),
            None => match self.index(None)? {
                0 => Some(0),
                index => pollutant_index::aqi_to_level(Some(f64::from(index)), None),
            },
        }
    }

    pub fn name(&self, pollutant: Option<PollutantKind>) -> Option<&'static str> {
        DEFAULT_PALETTE.name(self.level(pollutant))
    }

    pub fn color(&self, pollutant: Option<PollutantKind>) -> Color {
        DEFAULT_PALETTE.color(self.level(pollutant))
    }

    /// At least one pollutant has a usable index
    pub fn is_valid(&self) -> bool {
        self.index(None).is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Current {
    pub weather_text: Option<String>,
    pub weather_code: Option<WeatherCode>,
    pub temperature: Temperature,
    pub wind: Option<Wind>,
    pub uv: Option<Uv>,
    pub air_quality: Option<AirQuality>,
    /// Percent
    pub relative_humidity: Option<f64>,
    pub pressure: Option<f64>,
    /// Meters
    pub visibility: Option<f64>,
    pub dew_point: Option<f64>,
    /// Percent
    pub cloud_cover: Option<i32>,
    /// Short-term precipitation summary
    pub hourly_forecast: Option<String>,
}

/// Daytime or nighttime half of a day
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HalfDay {
    pub weather_text: Option<String>,
    pub weather_phase: Option<String>,
    pub weather_code: Option<WeatherCode>,
    pub temperature: Temperature,
    pub precipitation_probability: PrecipitationProbability,
    pub wind: Option<Wind>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Daily {
    pub date: DateTime<Utc>,
    pub day: HalfDay,
    pub night: HalfDay,
    pub air_quality: Option<AirQuality>,
    pub uv: Option<Uv>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Hourly {
    pub date: DateTime<Utc>,
    pub weather_text: Option<String>,
    pub weather_code: Option<WeatherCode>,
    pub temperature: Temperature,
    pub wind: Option<Wind>,
    pub relative_humidity: Option<f64>,
    pub precipitation_probability: PrecipitationProbability,
    pub precipitation: Precipitation,
    pub pressure: Option<f64>,
    pub cloud_cover: Option<i32>,
    pub dew_point: Option<f64>,
    pub air_quality: Option<AirQuality>,
}

impl Hourly {
    pub fn new(date: DateTime<Utc>) -> Self {
        Self {
            date,
            weather_text: None,
            weather_code: None,
            temperature: Temperature::default(),
            wind: None,
            relative_humidity: None,
            precipitation_probability: PrecipitationProbability::default(),
            precipitation: Precipitation::default(),
            pressure: None,
            cloud_cover: None,
            dew_point: None,
            air_quality: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Minutely {
    pub date: DateTime<Utc>,
    pub minute_interval: u32,
    /// mm/h
    pub precipitation_intensity: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    pub alert_id: String,
    pub start_date: Option<DateTime<Utc>>,
    pub headline: Option<String>,
    pub description: Option<String>,
    pub severity: AlertSeverity,
    pub color: Color,
}

impl Alert {
    /// Default color for alerts without a provider color
    pub fn color_from_severity(severity: AlertSeverity) -> Color {
        match severity {
            AlertSeverity::Extreme => Color::rgb(212, 45, 65),
            AlertSeverity::Severe => Color::rgb(240, 140, 17),
            AlertSeverity::Moderate => Color::rgb(244, 207, 0),
            AlertSeverity::Minor | AlertSeverity::Unknown => Color::rgb(130, 168, 223),
        }
    }
}

/// Sort alerts most severe first, then most recent first
pub fn sort_alerts(alerts: &mut [Alert]) {
    alerts.sort_by(|a, b| match b.severity.cmp(&a.severity) {
        Ordering::Equal => b.start_date.cmp(&a.start_date),
        other => other,
    });
}

/// Result of a main weather source
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WeatherWrapper {
    pub current: Option<Current>,
    pub daily_forecast: Vec<Daily>,
    pub hourly_forecast: Vec<Hourly>,
    pub minutely_forecast: Vec<Minutely>,
    pub alert_list: Vec<Alert>,
}

/// Result of a secondary weather source
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SecondaryWeatherWrapper {
    pub current: Option<Current>,
    pub air_quality: Option<AirQuality>,
    pub precipitation: Option<String>,
    pub minutely_forecast: Vec<Minutely>,
    pub alert_list: Vec<Alert>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Location {
    pub city_id: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    /// IANA time zone name
    pub time_zone: String,
    pub country: String,
    pub country_code: Option<String>,
    pub admin1: Option<String>,
    pub admin2: Option<String>,
    pub city: String,
    pub weather_source: Option<String>,
}

impl Default for Location {
    fn default() -> Self {
        Self {
            city_id: None,
            latitude: 0.0,
            longitude: 0.0,
            time_zone: "UTC".to_string(),
            country: String::new(),
            country_code: None,
            admin1: None,
            admin2: None,
            city: String::new(),
            weather_source: None,
        }
    }
}

impl Location {
    /// Parsed time zone, `None` for an unknown zone name
    pub fn zone(&self) -> Option<Tz> {
        self.time_zone.parse::<Tz>().ok()
    }
}
