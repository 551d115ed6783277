//! QWeather Provider
//!
//! This module provides weather data from QWeather (devapi.qweather.com).
//!
//! # Features
//! - Requires an API key
//! - Current conditions, 24 hour and 7 day forecasts
//! - Air quality (current concentrations, 5 day national AQI)
//! - Weather warnings
//! - Minutely precipitation (5 minute steps)
//!
//! # Data Format
//! Every numeric field is delivered as a string. Each payload carries a `code`
//! which is `"200"` on success.
//!
//! # Location Mapping
//! QWeather identifies locations by city ID. Search and reverse geocoding go
//! through the separate geo API.

use crate::pollutant_index::reverse_index;
use crate::weather_model::{
    sort_alerts, AirQuality, Alert, AlertSeverity, Color, Current, Daily, HalfDay, Hourly,
    Location, Minutely, Precipitation, PrecipitationProbability, SecondaryWeatherWrapper,
    Temperature, Uv, WeatherCode, WeatherWrapper, Wind,
};
use crate::weather_source::{
    get_json, local_to_utc, parse_f64, parse_i32, parse_time, Result, SecondaryFeature,
    WeatherSource, WeatherSourceError,
};
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QWeatherNow {
    pub obs_time: Option<String>,
    pub temp: Option<String>,
    pub feels_like: Option<String>,
    pub icon: Option<String>,
    pub text: Option<String>,
    pub wind360: Option<String>,
    pub wind_dir: Option<String>,
    pub wind_scale: Option<String>,
    pub wind_speed: Option<String>,
    pub humidity: Option<String>,
    pub precip: Option<String>,
    pub pressure: Option<String>,
    pub vis: Option<String>,
    pub cloud: Option<String>,
    pub dew: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QWeatherNowResult {
    pub code: Option<String>,
    pub update_time: Option<String>,
    pub now: Option<QWeatherNow>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QWeatherDaily {
    pub fx_date: Option<String>,
    pub sunrise: Option<String>,
    pub sunset: Option<String>,
    pub moonrise: Option<String>,
    pub moonset: Option<String>,
    pub moon_phase: Option<String>,
    pub moon_phase_icon: Option<String>,
    pub temp_max: Option<String>,
    pub temp_min: Option<String>,
    pub icon_day: Option<String>,
    pub text_day: Option<String>,
    pub icon_night: Option<String>,
    pub text_night: Option<String>,
    pub wind360_day: Option<String>,
    pub wind_dir_day: Option<String>,
    pub wind_scale_day: Option<String>,
    pub wind_speed_day: Option<String>,
    pub wind360_night: Option<String>,
    pub wind_dir_night: Option<String>,
    pub wind_scale_night: Option<String>,
    pub wind_speed_night: Option<String>,
    pub humidity: Option<String>,
    pub precip: Option<String>,
    pub pressure: Option<String>,
    pub vis: Option<String>,
    pub cloud: Option<String>,
    pub uv_index: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct QWeatherDailyResult {
    pub code: Option<String>,
    pub daily: Option<Vec<QWeatherDaily>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QWeatherHourly {
    pub fx_time: Option<String>,
    pub temp: Option<String>,
    pub icon: Option<String>,
    pub text: Option<String>,
    pub wind360: Option<String>,
    pub wind_dir: Option<String>,
    pub wind_scale: Option<String>,
    pub wind_speed: Option<String>,
    pub humidity: Option<String>,
    pub pop: Option<String>,
    pub precip: Option<String>,
    pub pressure: Option<String>,
    pub cloud: Option<String>,
    pub dew: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct QWeatherHourlyResult {
    pub code: Option<String>,
    pub hourly: Option<Vec<QWeatherHourly>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QWeatherAirNow {
    pub pub_time: Option<String>,
    pub aqi: Option<String>,
    pub level: Option<String>,
    pub category: Option<String>,
    pub primary: Option<String>,
    pub pm10: Option<String>,
    pub pm2p5: Option<String>,
    pub no2: Option<String>,
    pub so2: Option<String>,
    pub co: Option<String>,
    pub o3: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct QWeatherAirResult {
    pub code: Option<String>,
    pub now: Option<QWeatherAirNow>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QWeatherAirDaily {
    pub fx_date: Option<String>,
    pub aqi: Option<String>,
    pub level: Option<String>,
    pub category: Option<String>,
    pub primary: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct QWeatherAirDailyResult {
    pub code: Option<String>,
    pub daily: Option<Vec<QWeatherAirDaily>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QWeatherWarning {
    pub id: Option<String>,
    pub sender: Option<String>,
    pub pub_time: Option<String>,
    pub title: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub status: Option<String>,
    pub level: Option<String>,
    pub severity: Option<String>,
    pub severity_color: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub type_name: Option<String>,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct QWeatherWarningResult {
    pub code: Option<String>,
    pub warning: Option<Vec<QWeatherWarning>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QWeatherMinutely {
    pub fx_time: Option<String>,
    pub precip: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct QWeatherMinuteResult {
    pub code: Option<String>,
    pub summary: Option<String>,
    pub minutely: Option<Vec<QWeatherMinutely>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QWeatherLocation {
    pub name: Option<String>,
    pub id: Option<String>,
    pub lat: Option<String>,
    pub lon: Option<String>,
    pub adm2: Option<String>,
    pub adm1: Option<String>,
    pub country: Option<String>,
    pub tz: Option<String>,
    pub utc_offset: Option<String>,
    pub is_dst: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub rank: Option<String>,
    pub fx_link: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct QWeatherLocationResult {
    pub code: Option<String>,
    pub location: Option<Vec<QWeatherLocation>>,
}

/// Every payload of a main request, as saved side by side
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct QWeatherBundle {
    pub now: QWeatherNowResult,
    pub daily: QWeatherDailyResult,
    pub hourly: QWeatherHourlyResult,
    pub air: QWeatherAirResult,
    pub air_daily: QWeatherAirDailyResult,
    pub warning: QWeatherWarningResult,
    pub minutely: QWeatherMinuteResult,
}

fn is_error_code(code: &Option<String>) -> bool {
    code.as_deref().is_some_and(|code| code != "200")
}

/// Convert a QWeather location
///
/// # Arguments
/// * `location` - Current location when reverse geocoding, `None` for a search
/// * `result` - Location returned by the geo API
pub fn convert_location(location: Option<&Location>, result: &QWeatherLocation) -> Result<Location> {
    let required = |value: &Option<String>| {
        value
            .clone()
            .ok_or(WeatherSourceError::InvalidOrIncompleteData)
    };

    let (latitude, longitude) = match location {
        Some(location) => (location.latitude, location.longitude),
        None => (
            parse_f64(result.lat.as_deref()).ok_or(WeatherSourceError::InvalidOrIncompleteData)?,
            parse_f64(result.lon.as_deref()).ok_or(WeatherSourceError::InvalidOrIncompleteData)?,
        ),
    };

    Ok(Location {
        city_id: result.id.clone(),
        latitude,
        longitude,
        time_zone: required(&result.tz)?,
        country: required(&result.country)?,
        country_code: Some("CN".to_string()),
        admin1: result.adm1.clone(),
        admin2: result.adm2.clone(),
        city: required(&result.name)?,
        weather_source: Some(QWeatherService::ID.to_string()),
    })
}

/// Convert the payloads of a main request
pub fn convert(location: &Location, bundle: &QWeatherBundle, lang: &str) -> Result<WeatherWrapper> {
    if is_error_code(&bundle.daily.code)
        || is_error_code(&bundle.hourly.code)
        || is_error_code(&bundle.now.code)
    {
        return Err(WeatherSourceError::InvalidOrIncompleteData);
    }

    let mut current = current_from(bundle.now.now.as_ref(), &bundle.minutely, lang);
    current.air_quality = bundle.air.now.as_ref().map(air_quality_from);

    Ok(WeatherWrapper {
        current: Some(current),
        daily_forecast: daily_list(
            location,
            &bundle.daily,
            &bundle.hourly,
            &bundle.air_daily,
            lang,
        )?,
        hourly_forecast: hourly_list(&bundle.hourly, lang),
        minutely_forecast: minutely_list(&bundle.minutely),
        alert_list: warning_list(&bundle.warning),
    })
}

/// Convert the payloads of a secondary request
pub fn convert_secondary(
    air_result: &QWeatherAirResult,
    warning_result: &QWeatherWarningResult,
    minutely_result: &QWeatherMinuteResult,
) -> Result<SecondaryWeatherWrapper> {
    for (name, code) in [
        ("air", &air_result.code),
        ("warning", &warning_result.code),
        ("minutely", &minutely_result.code),
    ] {
        if is_error_code(code) {
            return Err(WeatherSourceError::SecondaryWeather(format!(
                "QWeather {} returned code {}",
                name,
                code.as_deref().unwrap_or_default()
            )));
        }
    }

    Ok(SecondaryWeatherWrapper {
        current: None,
        air_quality: air_result.now.as_ref().map(air_quality_from),
        precipitation: rectify_summary(minutely_result.summary.as_deref()),
        minutely_forecast: minutely_list(minutely_result),
        alert_list: warning_list(warning_result),
    })
}

fn air_quality_from(now: &QWeatherAirNow) -> AirQuality {
    AirQuality {
        pm25: parse_f64(now.pm2p5.as_deref()),
        pm10: parse_f64(now.pm10.as_deref()),
        so2: parse_f64(now.so2.as_deref()),
        no2: parse_f64(now.no2.as_deref()),
        o3: parse_f64(now.o3.as_deref()),
        co: parse_f64(now.co.as_deref()),
    }
}

fn wind_from(degree: Option<&str>, speed_kmh: Option<&str>) -> Wind {
    Wind {
        degree: parse_f64(degree),
        speed: parse_f64(speed_kmh).map(|kmh| kmh / 3.6),
    }
}

fn current_from(now: Option<&QWeatherNow>, minutely: &QWeatherMinuteResult, lang: &str) -> Current {
    let hourly_forecast = rectify_summary(minutely.summary.as_deref());
    let Some(now) = now else {
        return Current {
            hourly_forecast,
            ..Default::default()
        };
    };

    Current {
        weather_text: weather_text(now.icon.as_deref(), now.text.as_deref(), lang),
        weather_code: weather_code(now.icon.as_deref()),
        temperature: Temperature {
            temperature: parse_f64(now.temp.as_deref()),
            real_feel_temperature: parse_f64(now.feels_like.as_deref()),
            apparent_temperature: None,
        },
        wind: Some(wind_from(now.wind360.as_deref(), now.wind_speed.as_deref())),
        uv: None,
        air_quality: None,
        relative_humidity: parse_f64(now.humidity.as_deref()),
        pressure: parse_f64(now.pressure.as_deref()),
        visibility: parse_f64(now.vis.as_deref()).map(|km| km * 1000.0),
        dew_point: parse_f64(now.dew.as_deref()),
        cloud_cover: parse_i32(now.cloud.as_deref()),
        hourly_forecast,
    }
}

/// Highest precipitation probability (0..1) among hourly forecasts in `[start, end)`
fn max_probability(
    hourly: &[(DateTime<Utc>, Option<f64>)],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Option<f64> {
    hourly
        .iter()
        .filter(|(time, _)| *time >= start && *time < end)
        .map(|(_, pop)| pop.map(|p| p / 100.0).unwrap_or(0.0))
        .filter(|p| !p.is_nan())
        .reduce(f64::max)
}

fn daily_list(
    location: &Location,
    daily_result: &QWeatherDailyResult,
    hourly_result: &QWeatherHourlyResult,
    air_daily_result: &QWeatherAirDailyResult,
    lang: &str,
) -> Result<Vec<Daily>> {
    let Some(dailies) = daily_result.daily.as_ref().filter(|d| !d.is_empty()) else {
        return Ok(Vec::new());
    };
    let zone = location
        .zone()
        .ok_or_else(|| WeatherSourceError::UnknownTimeZone(location.time_zone.clone()))?;

    let daily_air: HashMap<&str, i32> = air_daily_result
        .daily
        .iter()
        .flatten()
        .filter_map(|air| Some((air.fx_date.as_deref()?, parse_i32(air.aqi.as_deref())?)))
        .collect();

    let hourly_pop: Vec<(DateTime<Utc>, Option<f64>)> = hourly_result
        .hourly
        .iter()
        .flatten()
        .filter_map(|h| Some((parse_time(h.fx_time.as_deref())?, parse_f64(h.pop.as_deref()))))
        .collect();

    let mut daily_list = Vec::with_capacity(dailies.len());
    for daily in dailies {
        let fx_date = daily
            .fx_date
            .as_deref()
            .ok_or(WeatherSourceError::InvalidOrIncompleteData)?;
        let midnight = NaiveDate::parse_from_str(fx_date, "%Y-%m-%d")
            .map_err(|_| WeatherSourceError::InvalidOrIncompleteData)?
            .and_time(NaiveTime::MIN);

        let at = |hours: i64| {
            local_to_utc(zone, midnight + Duration::hours(hours))
                .ok_or(WeatherSourceError::InvalidOrIncompleteData)
        };
        let date = at(0)?;
        let start_of_day = at(8)?;
        let middle_of_day = at(20)?;
        let end_of_day = at(32)?;

        let probability_day = max_probability(&hourly_pop, start_of_day, middle_of_day);
        let probability_night = max_probability(&hourly_pop, middle_of_day, end_of_day);

        daily_list.push(Daily {
            date,
            day: HalfDay {
                weather_text: weather_text(daily.icon_day.as_deref(), daily.text_day.as_deref(), lang),
                weather_phase: weather_text(daily.icon_day.as_deref(), daily.text_day.as_deref(), lang),
                weather_code: weather_code(daily.icon_day.as_deref()),
                temperature: Temperature::new(parse_f64(daily.temp_max.as_deref())),
                precipitation_probability: PrecipitationProbability {
                    total: Some(probability_day.map(|p| p * 100.0).unwrap_or(0.0)),
                },
                wind: Some(wind_from(
                    daily.wind360_day.as_deref(),
                    daily.wind_speed_day.as_deref(),
                )),
            },
            night: HalfDay {
                weather_text: weather_text(
                    daily.icon_night.as_deref(),
                    daily.text_night.as_deref(),
                    lang,
                ),
                weather_phase: weather_text(
                    daily.icon_night.as_deref(),
                    daily.text_night.as_deref(),
                    lang,
                ),
                weather_code: weather_code(daily.icon_night.as_deref()),
                temperature: Temperature::new(parse_f64(daily.temp_min.as_deref())),
                precipitation_probability: PrecipitationProbability {
                    total: Some(probability_night.map(|p| p * 100.0).unwrap_or(0.0)),
                },
                wind: Some(wind_from(
                    daily.wind360_night.as_deref(),
                    daily.wind_speed_night.as_deref(),
                )),
            },
            air_quality: daily_air
                .get(fx_date)
                .map(|aqi| AirQuality::from_pm25(reverse_index(Some(f64::from(*aqi))))),
            uv: Some(Uv {
                index: parse_f64(daily.uv_index.as_deref()),
            }),
        });
    }

    Ok(daily_list)
}

fn hourly_list(hourly_result: &QWeatherHourlyResult, lang: &str) -> Vec<Hourly> {
    let Some(hourly) = hourly_result.hourly.as_ref() else {
        return Vec::new();
    };

    hourly
        .iter()
        .filter_map(|h| {
            let date = parse_time(h.fx_time.as_deref())?;
            Some(Hourly {
                weather_text: weather_text(h.icon.as_deref(), h.text.as_deref(), lang),
                weather_code: weather_code(h.icon.as_deref()),
                temperature: Temperature::new(parse_f64(h.temp.as_deref())),
                wind: Some(wind_from(h.wind360.as_deref(), h.wind_speed.as_deref())),
                relative_humidity: parse_f64(h.humidity.as_deref()),
                precipitation_probability: PrecipitationProbability {
                    total: parse_f64(h.pop.as_deref()),
                },
                precipitation: Precipitation {
                    total: parse_f64(h.precip.as_deref()),
                },
                pressure: parse_f64(h.pressure.as_deref()),
                cloud_cover: parse_i32(h.cloud.as_deref()),
                dew_point: parse_f64(h.dew.as_deref()),
                ..Hourly::new(date)
            })
        })
        .collect()
}

fn minutely_list(minutely_result: &QWeatherMinuteResult) -> Vec<Minutely> {
    minutely_result
        .minutely
        .iter()
        .flatten()
        .filter_map(|m| {
            Some(Minutely {
                date: parse_time(m.fx_time.as_deref())?,
                minute_interval: 5,
                // mm per 5 minutes -> mm/h
                precipitation_intensity: parse_f64(m.precip.as_deref()).map(|p| p * 12.0),
            })
        })
        .collect()
}

fn warning_list(result: &QWeatherWarningResult) -> Vec<Alert> {
    let Some(warnings) = result.warning.as_ref() else {
        return Vec::new();
    };

    let mut alerts: Vec<Alert> = warnings
        .iter()
        .map(|warning| {
            let severity = warning_severity(warning.severity.as_deref());
            Alert {
                alert_id: warning
                    .id
                    .clone()
                    .unwrap_or_else(|| Utc::now().timestamp_millis().to_string()),
                start_date: parse_time(warning.pub_time.as_deref()),
                headline: warning.title.clone(),
                description: warning.text.clone(),
                severity,
                color: warning_color(warning.severity_color.as_deref())
                    .unwrap_or_else(|| Alert::color_from_severity(AlertSeverity::Unknown)),
            }
        })
        .collect();

    sort_alerts(&mut alerts);
    alerts
}

fn warning_severity(severity: Option<&str>) -> AlertSeverity {
    match severity.unwrap_or_default() {
        "Cancel" | "None" | "Unknown" | "Standard" | "Minor" => AlertSeverity::Minor,
        "Moderate" => AlertSeverity::Moderate,
        "Major" | "Severe" => AlertSeverity::Severe,
        "Extreme" => AlertSeverity::Extreme,
        _ => AlertSeverity::Unknown,
    }
}

fn warning_color(severity_color: Option<&str>) -> Option<Color> {
    match severity_color? {
        "White" => Some(Color::rgb(200, 200, 200)),
        "Blue" => Some(Color::rgb(66, 151, 231)),
        "Yellow" => Some(Color::rgb(255, 242, 184)),
        "Orange" => Some(Color::rgb(255, 145, 0)),
        "Red" => Some(Color::rgb(255, 86, 86)),
        "Black" => Some(Color::rgb(0, 0, 0)),
        _ => None,
    }
}

pub fn rectify_summary(summary: Option<&str>) -> Option<String> {
    summary.map(|s| {
        s.replace("precip", "precipitation")
            .replace("Rain/Snow", "Precipitation")
    })
}

/// Weather description for an icon code
///
/// The provider text is used unless the language is English or the text is
/// empty, in which case the English table applies.
pub fn weather_text(icon: Option<&str>, text: Option<&str>, lang: &str) -> Option<String> {
    let icon = icon.filter(|i| !i.is_empty())?;
    if let Some(text) = text.filter(|t| !t.is_empty() && lang != "en") {
        return Some(text.to_string());
    }

    let english = match icon {
        "100" => "Sunny",
        "101" => "Cloudy",
        "102" => "Few Clouds",
        "103" => "Partly Cloudy",
        "104" => "Overcast",
        "150" => "Clear",
        "151" => "Cloudy",
        "152" => "Few Clouds",
        "153" => "Partly Cloudy",
        "300" => "Shower",
        "301" => "Heavy Shower",
        "302" => "Thundershower",
        "303" => "Heavy Thunderstorm",
        "304" => "Hail",
        "305" => "Light Rain",
        "306" => "Moderate Rain",
        "307" => "Heavy Rain",
        "308" => "Extreme Rain",
        "309" => "Drizzle Rain",
        "310" => "Rainstorm",
        "311" => "Heavy Rainstorm",
        "312" => "Severe Rainstorm",
        "313" => "Freezing Rain",
        "314" => "Light to Moderate Rain",
        "315" => "Moderate to Heavy Rain",
        "316" => "Heavy Rain to Rainstorm",
        "317" => "Rainstorm to Heavy Rainstorm",
        "318" => "Heavy to Severe Rainstorm",
        "350" => "Shower",
        "351" => "Heavy Shower",
        "399" => "Rain",
        "400" => "Light Snow",
        "401" => "Moderate Snow",
        "402" => "Heavy Snow",
        "403" => "Snowstorm",
        "404" => "Sleet",
        "405" => "Rain and Snow",
        "406" => "Shower Rain and Snow",
        "407" => "Snow Flurry",
        "408" => "Light to Moderate Snow",
        "409" => "Moderate to Heavy Snow",
        "410" => "Heavy Snow to Snowstorm",
        "456" => "Shower Rain and Snow",
        "457" => "Snow Flurry",
        "499" => "Snow",
        "500" => "Mist",
        "501" => "Fog",
        "502" => "Haze",
        "503" => "Sand",
        "504" => "Dust",
        "507" => "Sandstorm",
        "508" => "Severe Sandstorm",
        "509" => "Dense Fog",
        "510" => "Strong Fog",
        "511" => "Moderate Haze",
        "512" => "Heavy Haze",
        "513" => "Severe Haze",
        "514" => "Heavy Fog",
        "515" => "Extra Heavy Fog",
        "900" => "Hot",
        "901" => "Cold",
        _ => "Unknown",
    };
    Some(english.to_string())
}

/// Canonical weather code for an icon code, cloudy when unknown
pub fn weather_code(icon: Option<&str>) -> Option<WeatherCode> {
    let icon = icon.filter(|i| !i.is_empty())?;
    let code = match icon {
        "100" | "150" | "900" => WeatherCode::Clear,
        "101" | "102" | "103" | "151" | "152" | "153" => WeatherCode::PartlyCloudy,
        "104" | "901" | "999" => WeatherCode::Cloudy,
        "300" | "301" | "350" | "351" => WeatherCode::ShoweryRain,
        "302" | "303" => WeatherCode::Thunderstorm,
        "304" => WeatherCode::Hail,
        "305" | "309" => WeatherCode::LightRain,
        "306" | "314" | "399" => WeatherCode::ModerateRain,
        "307" | "315" => WeatherCode::HeavyRain,
        "308" | "310" | "311" | "312" | "316" | "317" | "318" => WeatherCode::Rainstorm,
        "313" | "404" | "405" | "406" | "456" => WeatherCode::Sleet,
        "400" => WeatherCode::LightSnow,
        "401" | "408" | "499" => WeatherCode::ModerateSnow,
        "402" | "409" => WeatherCode::HeavySnow,
        "403" | "410" => WeatherCode::Snowstorm,
        "407" | "457" => WeatherCode::ShowerySnow,
        "500" | "501" | "509" | "510" | "514" | "515" => WeatherCode::Fog,
        "502" | "511" | "512" | "513" => WeatherCode::Haze,
        "503" | "504" | "507" | "508" => WeatherCode::Wind,
        _ => WeatherCode::Cloudy,
    };
    Some(code)
}

const SUPPORTED_LANGUAGES: &[&str] = &[
    "zh-hans", "zh", "zh-hant", "en", "de", "es", "fr", "it", "ja", "ko", "ru", "hi", "th",
    "ar", "pt", "bn", "ms", "nl", "el", "la", "sv", "id", "pl", "tr", "cs", "et", "vi", "fil",
    "fi", "he", "is", "nb",
];

/// Pick the request language for a locale such as `fr`, `zh-tw` or `pt-BR`
pub fn language_for(locale: &str) -> String {
    let locale = locale.to_lowercase().replace('_', "-");
    if locale == "zh-tw" || locale == "zh-hk" {
        return "zh-hant".to_string();
    }
    if SUPPORTED_LANGUAGES.contains(&locale.as_str()) {
        return locale;
    }
    let code = locale.split('-').next().unwrap_or_default();
    if SUPPORTED_LANGUAGES.contains(&code) {
        code.to_string()
    } else {
        "en".to_string()
    }
}

/// QWeather service
pub struct QWeatherService {
    api_key: Option<String>,
    lang: String,
    client: reqwest::Client,
}

impl QWeatherService {
    pub const ID: &'static str = "qweather";
    const BASE_URL: &'static str = "https://devapi.qweather.com/v7/";
    const GEO_URL: &'static str = "https://geoapi.qweather.com/v2/";

    /// Create a new QWeather service
    ///
    /// # Arguments
    /// * `api_key` - QWeather API key, requests fail with `ApiKeyMissing` without one
    /// * `locale` - Preferred locale, mapped to a supported language
    /// * `timeout` - HTTP request timeout
    pub fn new(api_key: Option<String>, locale: &str, timeout: std::time::Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            api_key: api_key.filter(|k| !k.is_empty()),
            lang: language_for(locale),
            client,
        }
    }

    pub fn lang(&self) -> &str {
        &self.lang
    }

    fn api_key(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .ok_or(WeatherSourceError::ApiKeyMissing)
    }

    fn city_id<'a>(&self, location: &'a Location) -> Result<&'a str> {
        location
            .city_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| WeatherSourceError::InvalidLocation("missing QWeather city ID".into()))
    }

    async fn get<T: DeserializeOwned>(&self, base: &str, endpoint: &str, location: &str) -> Result<T> {
        let url = format!("{}{}", base, endpoint);
        let query = [
            ("location", location.to_string()),
            ("key", self.api_key()?.to_string()),
            ("lang", self.lang.clone()),
        ];
        get_json(&self.client, &url, &query).await
    }

    /// Fetch a payload unless its feature is excluded
    async fn get_feature<T: DeserializeOwned + Default>(
        &self,
        include: bool,
        endpoint: &str,
        location: &str,
    ) -> Result<T> {
        if include {
            self.get(Self::BASE_URL, endpoint, location).await
        } else {
            Ok(T::default())
        }
    }
}

#[async_trait::async_trait]
impl WeatherSource for QWeatherService {
    fn id(&self) -> &'static str {
        Self::ID
    }

    fn name(&self) -> &'static str {
        "QWeather"
    }

    fn supported_features_in_main(&self) -> &'static [SecondaryFeature] {
        &SecondaryFeature::ALL
    }

    fn supported_features_in_secondary(&self) -> &'static [SecondaryFeature] {
        &SecondaryFeature::ALL
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn request_weather(
        &self,
        location: &Location,
        ignore_features: &[SecondaryFeature],
    ) -> Result<WeatherWrapper> {
        self.api_key()?;
        let city_id = self.city_id(location)?;
        let coordinates = format!("{},{}", location.longitude, location.latitude);

        log::info!("QWeather: Fetching weather for city {}", city_id);

        let (daily, hourly, air_daily, now, air, warning, minutely) = tokio::try_join!(
            self.get::<QWeatherDailyResult>(Self::BASE_URL, "weather/7d", city_id),
            self.get::<QWeatherHourlyResult>(Self::BASE_URL, "weather/24h", city_id),
            self.get::<QWeatherAirDailyResult>(Self::BASE_URL, "air/5d", city_id),
            self.get::<QWeatherNowResult>(Self::BASE_URL, "weather/now", city_id),
            self.get_feature::<QWeatherAirResult>(
                !ignore_features.contains(&SecondaryFeature::AirQuality),
                "air/now",
                city_id
            ),
            self.get_feature::<QWeatherWarningResult>(
                !ignore_features.contains(&SecondaryFeature::Alert),
                "warning/now",
                city_id
            ),
            self.get_feature::<QWeatherMinuteResult>(
                !ignore_features.contains(&SecondaryFeature::Minutely),
                "minutely/5m",
                &coordinates
            ),
        )?;

        let bundle = QWeatherBundle {
            now,
            daily,
            hourly,
            air,
            air_daily,
            warning,
            minutely,
        };
        convert(location, &bundle, &self.lang)
    }

    async fn request_secondary_weather(
        &self,
        location: &Location,
        requested_features: &[SecondaryFeature],
    ) -> Result<SecondaryWeatherWrapper> {
        self.api_key()?;
        let city_id = self.city_id(location)?;
        let coordinates = format!("{},{}", location.longitude, location.latitude);

        log::info!(
            "QWeather: Fetching secondary weather ({:?}) for city {}",
            requested_features,
            city_id
        );

        let (air, warning, minutely) = tokio::try_join!(
            self.get_feature::<QWeatherAirResult>(
                requested_features.contains(&SecondaryFeature::AirQuality),
                "air/now",
                city_id
            ),
            self.get_feature::<QWeatherWarningResult>(
                requested_features.contains(&SecondaryFeature::Alert),
                "warning/now",
                city_id
            ),
            self.get_feature::<QWeatherMinuteResult>(
                requested_features.contains(&SecondaryFeature::Minutely),
                "minutely/5m",
                &coordinates
            ),
        )?;

        convert_secondary(&air, &warning, &minutely)
    }

    async fn request_location_search(&self, query: &str) -> Result<Vec<Location>> {
        let result: QWeatherLocationResult = self.get(Self::GEO_URL, "city/lookup", query).await?;
        let mut found = result.location.unwrap_or_default();
        found.sort_by_key(|l| parse_i32(l.rank.as_deref()).unwrap_or(i32::MAX));

        Ok(found
            .iter()
            .filter_map(|l| match convert_location(None, l) {
                Ok(location) => Some(location),
                Err(e) => {
                    log::warn!("QWeather: Skipping location {:?}: {}", l.name, e);
                    None
                }
            })
            .collect())
    }

    async fn request_reverse_geocoding(&self, location: &Location) -> Result<Vec<Location>> {
        let coordinates = format!("{},{}", location.longitude, location.latitude);
        let result: QWeatherLocationResult =
            self.get(Self::GEO_URL, "city/lookup", &coordinates).await?;

        Ok(result
            .location
            .unwrap_or_default()
            .iter()
            .filter_map(|l| convert_location(Some(location), l).ok())
            .collect())
    }
}
