//! China Weather Provider
//!
//! This module provides weather data for mainland China from the Xiaomi weather
//! API (weatherapi.market.xiaomi.com), which redistributes China Meteorological
//! Administration forecasts.
//!
//! # Features
//! - No API key required
//! - Current conditions, hourly and 15 day forecasts in a single request
//! - Air quality (current concentrations, daily and hourly national AQI)
//! - Weather alerts, in Chinese
//! - Minutely precipitation (1 minute steps, separate request)
//!
//! # Data Format
//! Forecast series are published as a `pubTime` plus a list of values, one per
//! hour or day counted from that time. Every time is interpreted in Asia/Shanghai.

use crate::pollutant_index::reverse_index;
use crate::weather_model::{
    sort_alerts, AirQuality, Alert, AlertSeverity, Color, Current, Daily, HalfDay, Hourly,
    Location, Minutely, PrecipitationProbability, SecondaryWeatherWrapper, Temperature, Uv,
    WeatherCode, WeatherWrapper, Wind,
};
use crate::weather_source::{
    deserialize_text, get_json, local_to_utc, parse_f64, parse_time, Result, SecondaryFeature,
    WeatherSource, WeatherSourceError,
};
use chrono::{DateTime, Duration, NaiveDateTime, NaiveTime, Timelike, Utc};
use chrono_tz::Tz;
use regex::{Captures, Regex};
use serde::Deserialize;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::LazyLock;

const ZONE: Tz = chrono_tz::Asia::Shanghai;
const LOCATION_KEY_PREFIX: &str = "weathercn:";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChinaUnitValue {
    #[serde(default, deserialize_with = "deserialize_text")]
    pub value: Option<String>,
    pub unit: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChinaCurrentWind {
    pub direction: Option<ChinaUnitValue>,
    pub speed: Option<ChinaUnitValue>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChinaCurrent {
    pub pub_time: Option<String>,
    #[serde(default, deserialize_with = "deserialize_text")]
    pub weather: Option<String>,
    pub temperature: Option<ChinaUnitValue>,
    pub feels_like: Option<ChinaUnitValue>,
    pub humidity: Option<ChinaUnitValue>,
    pub pressure: Option<ChinaUnitValue>,
    pub visibility: Option<ChinaUnitValue>,
    pub wind: Option<ChinaCurrentWind>,
    #[serde(default, deserialize_with = "deserialize_text")]
    pub uv_index: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChinaAqi {
    pub pub_time: Option<String>,
    #[serde(default, deserialize_with = "deserialize_text")]
    pub aqi: Option<String>,
    #[serde(default, deserialize_with = "deserialize_text")]
    pub pm25: Option<String>,
    #[serde(default, deserialize_with = "deserialize_text")]
    pub pm10: Option<String>,
    #[serde(default, deserialize_with = "deserialize_text")]
    pub so2: Option<String>,
    #[serde(default, deserialize_with = "deserialize_text")]
    pub no2: Option<String>,
    #[serde(default, deserialize_with = "deserialize_text")]
    pub o3: Option<String>,
    #[serde(default, deserialize_with = "deserialize_text")]
    pub co: Option<String>,
}

/// Series of integers counted from `pub_time`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChinaValueListInt {
    pub pub_time: Option<String>,
    pub value: Option<Vec<i32>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChinaValueListString {
    pub pub_time: Option<String>,
    pub value: Option<Vec<Option<String>>>,
}

/// Day value in `from`, night value in `to`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChinaFromTo {
    #[serde(default, deserialize_with = "deserialize_text")]
    pub from: Option<String>,
    #[serde(default, deserialize_with = "deserialize_text")]
    pub to: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChinaValueListFromTo {
    pub pub_time: Option<String>,
    pub value: Option<Vec<ChinaFromTo>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChinaDailyWind {
    pub direction: Option<ChinaValueListFromTo>,
    pub speed: Option<ChinaValueListFromTo>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChinaForecastDaily {
    pub pub_time: Option<String>,
    pub aqi: Option<ChinaValueListInt>,
    pub precipitation_probability: Option<ChinaValueListString>,
    pub temperature: Option<ChinaValueListFromTo>,
    pub weather: Option<ChinaValueListFromTo>,
    pub wind: Option<ChinaDailyWind>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChinaHourlyWindValue {
    pub datetime: Option<String>,
    #[serde(default, deserialize_with = "deserialize_text")]
    pub direction: Option<String>,
    #[serde(default, deserialize_with = "deserialize_text")]
    pub speed: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChinaHourlyWind {
    pub value: Option<Vec<ChinaHourlyWindValue>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChinaForecastHourly {
    pub aqi: Option<ChinaValueListInt>,
    pub temperature: Option<ChinaValueListInt>,
    pub weather: Option<ChinaValueListInt>,
    pub wind: Option<ChinaHourlyWind>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChinaPrecipitation {
    pub pub_time: Option<String>,
    pub description: Option<String>,
    /// mm per minute
    pub value: Option<Vec<f64>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChinaForecastMinutely {
    pub precipitation: Option<ChinaPrecipitation>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChinaAlert {
    pub alert_id: Option<String>,
    pub pub_time: Option<String>,
    pub title: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub level: Option<String>,
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChinaForecastResult {
    pub current: Option<ChinaCurrent>,
    pub forecast_daily: Option<ChinaForecastDaily>,
    pub forecast_hourly: Option<ChinaForecastHourly>,
    pub aqi: Option<ChinaAqi>,
    pub alerts: Option<Vec<ChinaAlert>>,
    /// Filled from the separate minutely request
    pub minutely: Option<ChinaForecastMinutely>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChinaLocationResult {
    pub affiliation: Option<String>,
    pub key: Option<String>,
    #[serde(default, deserialize_with = "deserialize_text")]
    pub latitude: Option<String>,
    #[serde(default, deserialize_with = "deserialize_text")]
    pub longitude: Option<String>,
    pub location_key: Option<String>,
    pub name: Option<String>,
    pub status: Option<i32>,
    pub time_zone_shift: Option<i64>,
}

/// Convert a China location
///
/// # Arguments
/// * `location` - Current location when reverse geocoding, `None` for a search
/// * `result` - Location returned by the API
pub fn convert_location(location: Option<&Location>, result: &ChinaLocationResult) -> Result<Location> {
    let location_key = result
        .location_key
        .as_deref()
        .ok_or(WeatherSourceError::InvalidOrIncompleteData)?;

    let (latitude, longitude) = match location {
        Some(location) => (location.latitude, location.longitude),
        None => (
            parse_f64(result.latitude.as_deref()).ok_or(WeatherSourceError::InvalidOrIncompleteData)?,
            parse_f64(result.longitude.as_deref()).ok_or(WeatherSourceError::InvalidOrIncompleteData)?,
        ),
    };

    Ok(Location {
        city_id: Some(location_key.replace(LOCATION_KEY_PREFIX, "")),
        latitude,
        longitude,
        time_zone: ZONE.name().to_string(),
        country: String::new(),
        country_code: Some("CN".to_string()),
        admin1: None,
        admin2: result.affiliation.clone(),
        city: result.name.clone().unwrap_or_default(),
        weather_source: Some(ChinaWeatherService::ID.to_string()),
    })
}

/// Convert a forecast bundle into a main weather result
pub fn convert(result: &ChinaForecastResult) -> Result<WeatherWrapper> {
    let (Some(current), Some(daily), Some(hourly)) = (
        result.current.as_ref(),
        result.forecast_daily.as_ref(),
        result.forecast_hourly.as_ref(),
    ) else {
        return Err(WeatherSourceError::InvalidOrIncompleteData);
    };

    let published = parse_time(current.pub_time.as_deref())
        .ok_or(WeatherSourceError::InvalidOrIncompleteData)?;

    Ok(WeatherWrapper {
        current: Some(current_from(current, result.aqi.as_ref(), result.minutely.as_ref())),
        daily_forecast: daily_list(published, daily),
        hourly_forecast: hourly_list(hourly),
        minutely_forecast: minutely_list(result.minutely.as_ref()),
        alert_list: alert_list(result.alerts.as_deref()),
    })
}

/// Convert a forecast bundle into a secondary weather result
pub fn convert_secondary(result: &ChinaForecastResult) -> Result<SecondaryWeatherWrapper> {
    let (Some(current), Some(_), Some(_)) = (
        result.current.as_ref(),
        result.forecast_daily.as_ref(),
        result.forecast_hourly.as_ref(),
    ) else {
        return Err(WeatherSourceError::InvalidOrIncompleteData);
    };

    Ok(SecondaryWeatherWrapper {
        current: Some(current_from(current, result.aqi.as_ref(), result.minutely.as_ref())),
        air_quality: result.aqi.as_ref().map(air_quality_from),
        precipitation: minutely_description(result.minutely.as_ref()),
        minutely_forecast: minutely_list(result.minutely.as_ref()),
        alert_list: alert_list(result.alerts.as_deref()),
    })
}

fn air_quality_from(aqi: &ChinaAqi) -> AirQuality {
    AirQuality {
        pm25: parse_f64(aqi.pm25.as_deref()),
        pm10: parse_f64(aqi.pm10.as_deref()),
        so2: parse_f64(aqi.so2.as_deref()),
        no2: parse_f64(aqi.no2.as_deref()),
        o3: parse_f64(aqi.o3.as_deref()),
        co: parse_f64(aqi.co.as_deref()),
    }
}

/// PM2.5 equivalent of a national AQI value
fn air_quality_from_aqi(aqi: i32) -> AirQuality {
    AirQuality::from_pm25(reverse_index(Some(f64::from(aqi))))
}

fn unit_value(value: Option<&ChinaUnitValue>) -> Option<f64> {
    parse_f64(value.and_then(|v| v.value.as_deref()))
}

fn minutely_description(minutely: Option<&ChinaForecastMinutely>) -> Option<String> {
    minutely
        .and_then(|m| m.precipitation.as_ref())
        .and_then(|p| p.description.clone())
}

fn current_from(
    current: &ChinaCurrent,
    aqi: Option<&ChinaAqi>,
    minutely: Option<&ChinaForecastMinutely>,
) -> Current {
    Current {
        weather_text: Some(weather_text(current.weather.as_deref()).to_string()),
        weather_code: weather_code(current.weather.as_deref()),
        temperature: Temperature {
            temperature: unit_value(current.temperature.as_ref()),
            real_feel_temperature: None,
            apparent_temperature: unit_value(current.feels_like.as_ref()),
        },
        wind: current.wind.as_ref().map(|wind| Wind {
            degree: unit_value(wind.direction.as_ref()),
            speed: unit_value(wind.speed.as_ref()).map(|kmh| kmh / 3.6),
        }),
        uv: current.uv_index.as_deref().map(|uv| Uv {
            index: parse_f64(Some(uv)),
        }),
        air_quality: aqi.map(air_quality_from),
        relative_humidity: unit_value(current.humidity.as_ref()),
        pressure: unit_value(current.pressure.as_ref()),
        visibility: unit_value(current.visibility.as_ref()).map(|km| km * 1000.0),
        dew_point: None,
        cloud_cover: None,
        hourly_forecast: minutely_description(minutely),
    }
}

/// Wall-clock time in Shanghai
fn local(time: DateTime<Utc>) -> NaiveDateTime {
    time.with_timezone(&ZONE).naive_local()
}

fn truncate_to_hour(time: NaiveDateTime) -> NaiveDateTime {
    time.date().and_time(NaiveTime::MIN) + Duration::hours(i64::from(time.hour()))
}

fn truncate_to_minute(time: NaiveDateTime) -> NaiveDateTime {
    truncate_to_hour(time) + Duration::minutes(i64::from(time.minute()))
}

fn nth<T>(values: Option<&Vec<T>>, index: usize) -> Option<&T> {
    values.and_then(|v| v.get(index))
}

fn from_to(list: Option<&ChinaValueListFromTo>, index: usize) -> Option<&ChinaFromTo> {
    nth(list.and_then(|l| l.value.as_ref()), index)
}

fn daily_list(published: DateTime<Utc>, daily: &ChinaForecastDaily) -> Vec<Daily> {
    let Some(weathers) = daily
        .weather
        .as_ref()
        .and_then(|w| w.value.as_ref())
        .filter(|v| !v.is_empty())
    else {
        return Vec::new();
    };
    let start_of_first_day = local(published).date().and_time(NaiveTime::MIN);

    weathers
        .iter()
        .enumerate()
        .filter_map(|(index, weather)| {
            let date = local_to_utc(ZONE, start_of_first_day + Duration::days(index as i64))?;
            let temperature = from_to(daily.temperature.as_ref(), index);
            let probability = PrecipitationProbability {
                total: daily
                    .precipitation_probability
                    .as_ref()
                    .and_then(|p| nth(p.value.as_ref(), index))
                    .and_then(|p| parse_f64(p.as_deref())),
            };
            let direction = from_to(daily.wind.as_ref().and_then(|w| w.direction.as_ref()), index);
            let speed = from_to(daily.wind.as_ref().and_then(|w| w.speed.as_ref()), index);

            let half_day = |code: Option<&str>, pick: fn(&ChinaFromTo) -> Option<&str>| HalfDay {
                weather_text: Some(weather_text(code).to_string()),
                weather_phase: Some(weather_text(code).to_string()),
                weather_code: weather_code(code),
                temperature: Temperature::new(parse_f64(temperature.and_then(pick))),
                precipitation_probability: probability,
                wind: daily.wind.as_ref().map(|_| Wind {
                    degree: parse_f64(direction.and_then(pick)),
                    speed: parse_f64(speed.and_then(pick)).map(|kmh| kmh / 3.6),
                }),
            };

            Some(Daily {
                date,
                day: half_day(weather.from.as_deref(), |v| v.from.as_deref()),
                night: half_day(weather.to.as_deref(), |v| v.to.as_deref()),
                air_quality: daily
                    .aqi
                    .as_ref()
                    .and_then(|aqi| nth(aqi.value.as_ref(), index))
                    .map(|aqi| air_quality_from_aqi(*aqi)),
                uv: None,
            })
        })
        .collect()
}

/// Map each value of an hourly series to its hour
fn hourly_value_map(list: Option<&ChinaValueListInt>) -> HashMap<DateTime<Utc>, i32> {
    let Some((published, values)) = list.and_then(|l| {
        Some((parse_time(l.pub_time.as_deref())?, l.value.as_ref()?))
    }) else {
        return HashMap::new();
    };
    let first_hour = truncate_to_hour(local(published));

    let mut map = HashMap::with_capacity(values.len());
    for (index, value) in values.iter().enumerate() {
        if let Some(date) = local_to_utc(ZONE, first_hour + Duration::hours(index as i64)) {
            map.entry(date).or_insert(*value);
        }
    }
    map
}

fn hourly_wind_map(wind: Option<&ChinaHourlyWind>) -> HashMap<DateTime<Utc>, &ChinaHourlyWindValue> {
    let mut map = HashMap::new();
    for value in wind.and_then(|w| w.value.as_ref()).into_iter().flatten() {
        if let Some(date) = parse_time(value.datetime.as_deref()) {
            map.entry(date).or_insert(value);
        }
    }
    map
}

fn hourly_list(hourly: &ChinaForecastHourly) -> Vec<Hourly> {
    let Some((published, weathers)) = hourly.weather.as_ref().and_then(|w| {
        Some((
            parse_time(w.pub_time.as_deref())?,
            w.value.as_ref().filter(|v| !v.is_empty())?,
        ))
    }) else {
        return Vec::new();
    };

    let temperatures = hourly_value_map(hourly.temperature.as_ref());
    let aqis = hourly_value_map(hourly.aqi.as_ref());
    let winds = hourly_wind_map(hourly.wind.as_ref());
    let first_hour = truncate_to_hour(local(published));

    weathers
        .iter()
        .enumerate()
        .filter_map(|(index, weather)| {
            let date = local_to_utc(ZONE, first_hour + Duration::hours(index as i64))?;
            let code = weather.to_string();
            let wind = winds.get(&date);

            Some(Hourly {
                weather_text: Some(weather_text(Some(&code)).to_string()),
                weather_code: weather_code(Some(&code)),
                temperature: Temperature::new(temperatures.get(&date).map(|t| f64::from(*t))),
                wind: hourly.wind.as_ref().map(|_| Wind {
                    degree: parse_f64(wind.and_then(|w| w.direction.as_deref())),
                    speed: parse_f64(wind.and_then(|w| w.speed.as_deref())).map(|kmh| kmh / 3.6),
                }),
                air_quality: aqis.get(&date).map(|aqi| air_quality_from_aqi(*aqi)),
                ..Hourly::new(date)
            })
        })
        .collect()
}

fn minutely_list(minutely: Option<&ChinaForecastMinutely>) -> Vec<Minutely> {
    let Some(precipitation) = minutely.and_then(|m| m.precipitation.as_ref()) else {
        return Vec::new();
    };
    let (Some(values), Some(published)) = (
        precipitation.value.as_ref(),
        parse_time(precipitation.pub_time.as_deref()),
    ) else {
        return Vec::new();
    };
    let first_minute = truncate_to_minute(local(published));

    values
        .iter()
        .enumerate()
        .filter_map(|(minute, value)| {
            Some(Minutely {
                date: local_to_utc(ZONE, first_minute + Duration::minutes(minute as i64))?,
                minute_interval: 1,
                // mm/min -> mm/h
                precipitation_intensity: Some(value * 60.0),
            })
        })
        .collect()
}

/// Stable alert id from title, detail, level and publication time
fn alert_id(alert: &ChinaAlert) -> String {
    let mut hasher = DefaultHasher::new();
    alert.title.hash(&mut hasher);
    alert.detail.hash(&mut hasher);
    alert.level.hash(&mut hasher);
    parse_time(alert.pub_time.as_deref())
        .unwrap_or_else(Utc::now)
        .timestamp_millis()
        .hash(&mut hasher);
    hasher.finish().to_string()
}

fn alert_list(alerts: Option<&[ChinaAlert]>) -> Vec<Alert> {
    let Some(alerts) = alerts.filter(|a| !a.is_empty()) else {
        return Vec::new();
    };

    let mut list: Vec<Alert> = alerts
        .iter()
        .map(|alert| Alert {
            alert_id: alert_id(alert),
            start_date: parse_time(alert.pub_time.as_deref()),
            headline: headline(alert.title.as_deref(), alert.detail.as_deref()),
            description: alert.detail.clone(),
            severity: alert_severity(alert.level.as_deref()),
            color: alert_color(alert.level.as_deref())
                .unwrap_or_else(|| Alert::color_from_severity(AlertSeverity::Unknown)),
        })
        .collect();

    sort_alerts(&mut list);
    list
}

type HeadlineFormat = fn(&Captures) -> String;

static HEADLINE_PATTERNS: LazyLock<Vec<(Regex, HeadlineFormat)>> = LazyLock::new(|| {
    let patterns: [(&str, HeadlineFormat); 5] = [
        (r"^(.+?)气象台.+?发布“?(.+?)预警", |c| {
            format!("{}发布{}预警", &c[1], &c[2])
        }),
        (r"^(.+?)气象台.+?更新“?(.+?)预警(信号)*为“?(.+?)预警", |c| {
            format!("{}更新{}预警为{}预警", &c[1], &c[2], &c[4])
        }),
        (r"^(.+?)联合发布“?(.+?)预警", |c| {
            format!("{}联合发布{}预警", &c[1], &c[2])
        }),
        (
            r"^(.+?)(\d+年)*(\d+月)*(\d+日)*(\d+时)*(\d+分)*发布“?(.+?)预警",
            |c| format!("{}发布{}预警", &c[1], &c[7]),
        ),
        (
            r"^(.+?)(\d+年)*(\d+月)*(\d+日)*(\d+时)*(\d+分)*更新“?(.+?)预警(信号)*为“?(.+?)预警",
            |c| format!("{}更新{}预警为{}预警", &c[1], &c[7], &c[9]),
        ),
    ];
    patterns
        .into_iter()
        .map(|(pattern, format)| (Regex::new(pattern).expect("valid headline pattern"), format))
        .collect()
});

/// Short headline extracted from the alert detail, the title when nothing matches
pub fn headline(title: Option<&str>, detail: Option<&str>) -> Option<String> {
    let Some(detail) = detail else {
        return title.map(str::to_string);
    };

    HEADLINE_PATTERNS
        .iter()
        .find_map(|(pattern, format)| pattern.captures(detail).map(|c| format(&c)))
        .or_else(|| title.map(str::to_string))
}

fn alert_severity(level: Option<&str>) -> AlertSeverity {
    match level.unwrap_or_default() {
        "蓝" | "蓝色" => AlertSeverity::Minor,
        "黄" | "黄色" => AlertSeverity::Moderate,
        "橙" | "橙色" | "橘" | "橘色" | "橘黄" | "橘黄色" => AlertSeverity::Severe,
        "红" | "红色" => AlertSeverity::Extreme,
        _ => AlertSeverity::Unknown,
    }
}

fn alert_color(level: Option<&str>) -> Option<Color> {
    match level? {
        "蓝" | "蓝色" => Some(Color::rgb(66, 151, 231)),
        "黄" | "黄色" => Some(Color::rgb(255, 242, 184)),
        "橙" | "橙色" | "橘" | "橘色" | "橘黄" | "橘黄色" => Some(Color::rgb(255, 145, 0)),
        "红" | "红色" => Some(Color::rgb(255, 86, 86)),
        _ => None,
    }
}

/// English weather description, `"Unknown"` when missing
pub fn weather_text(code: Option<&str>) -> &'static str {
    match code.unwrap_or_default() {
        "0" | "00" => "Clear",
        "1" | "01" => "Cloudy",
        "2" | "02" => "Overcast",
        "3" | "03" => "Shower",
        "4" | "04" => "Thundershower",
        "5" | "05" => "Hail",
        "6" | "06" => "Sleet",
        "7" | "07" => "Light Rain",
        "8" | "08" => "Moderate Rain",
        "9" | "09" => "Heavy Rain",
        "10" => "Rainstorm",
        "11" => "Heavy Rainstorm",
        "12" => "Severe Rainstorm",
        "13" => "Snow Flurry",
        "14" => "Light Snow",
        "15" => "Moderate Snow",
        "16" => "Heavy Snow",
        "17" => "Snowstorm",
        "18" => "Fog",
        "19" => "Freezing Rain",
        "20" => "Sandstorm",
        "21" => "Light to Moderate Rain",
        "22" => "Moderate to Heavy Rain",
        "23" => "Heavy Rain to Rainstorm",
        "24" => "Rainstorm to Heavy Rainstorm",
        "25" => "Heavy to Severe Rainstorm",
        "26" => "Light to Moderate Snow",
        "27" => "Moderate to Heavy Snow",
        "28" => "Heavy Snow to Snowstorm",
        "29" => "Dust",
        "30" => "Sand",
        "31" => "Severe Sandstorm",
        "53" | "54" | "55" | "56" => "Haze",
        _ => "Unknown",
    }
}

/// Canonical weather code, cloudy for unknown non-empty codes
pub fn weather_code(code: Option<&str>) -> Option<WeatherCode> {
    let code = code.filter(|c| !c.is_empty())?;
    Some(match code {
        "0" | "00" => WeatherCode::Clear,
        "1" | "01" => WeatherCode::PartlyCloudy,
        "3" | "03" => WeatherCode::ShoweryRain,
        "7" | "07" => WeatherCode::LightRain,
        "8" | "08" | "21" => WeatherCode::ModerateRain,
        "9" | "09" | "22" => WeatherCode::HeavyRain,
        "10" | "11" | "12" | "23" | "24" | "25" => WeatherCode::Rainstorm,
        "4" | "04" => WeatherCode::Thunderstorm,
        "5" | "05" => WeatherCode::Hail,
        "6" | "06" | "19" => WeatherCode::Sleet,
        "13" => WeatherCode::ShowerySnow,
        "14" => WeatherCode::LightSnow,
        "15" | "26" => WeatherCode::ModerateSnow,
        "16" | "27" => WeatherCode::HeavySnow,
        "17" | "28" => WeatherCode::Snowstorm,
        "18" | "32" | "49" | "57" => WeatherCode::Fog,
        "20" | "29" | "30" => WeatherCode::Wind,
        "53" | "54" | "55" | "56" => WeatherCode::Haze,
        _ => WeatherCode::Cloudy,
    })
}

/// China weather service
pub struct ChinaWeatherService {
    client: reqwest::Client,
}

impl ChinaWeatherService {
    pub const ID: &'static str = "china";
    const BASE_URL: &'static str = "https://weatherapi.market.xiaomi.com/wtr-v3/";
    const APP_KEY: &'static str = "weather20151024";
    const SIGN: &'static str = "zUFJoAR2ZVrDy1vF3D07";
    const LOCALE: &'static str = "zh_cn";

    /// Create a new China weather service
    pub fn new(timeout: std::time::Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self { client }
    }

    fn location_key(location: &Location) -> Result<String> {
        location
            .city_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .map(|id| format!("{}{}", LOCATION_KEY_PREFIX, id))
            .ok_or_else(|| WeatherSourceError::InvalidLocation("missing China city ID".into()))
    }

    async fn forecast(&self, location: &Location) -> Result<ChinaForecastResult> {
        let query = [
            ("latitude", location.latitude.to_string()),
            ("longitude", location.longitude.to_string()),
            ("isLocated", "true".to_string()),
            ("locationKey", Self::location_key(location)?),
            ("days", "15".to_string()),
            ("appKey", Self::APP_KEY.to_string()),
            ("sign", Self::SIGN.to_string()),
            ("isGlobal", "false".to_string()),
            ("locale", Self::LOCALE.to_string()),
        ];
        get_json(&self.client, &format!("{}weather/all", Self::BASE_URL), &query).await
    }

    async fn minutely(&self, location: &Location, include: bool) -> Result<Option<ChinaForecastMinutely>> {
        if !include {
            return Ok(None);
        }
        let query = [
            ("latitude", location.latitude.to_string()),
            ("longitude", location.longitude.to_string()),
            ("locale", Self::LOCALE.to_string()),
            ("isGlobal", "false".to_string()),
            ("appKey", Self::APP_KEY.to_string()),
            ("locationKey", Self::location_key(location)?),
            ("sign", Self::SIGN.to_string()),
        ];
        let url = format!("{}weather/xm/forecast/minutely", Self::BASE_URL);

        // Minutely data is optional, a failure keeps the rest of the forecast
        match get_json(&self.client, &url, &query).await {
            Ok(minutely) => Ok(Some(minutely)),
            Err(e) => {
                log::warn!("China: Minutely request failed: {}", e);
                Ok(None)
            }
        }
    }

    async fn locations(&self, endpoint: &str, query: &[(&str, String)]) -> Result<Vec<ChinaLocationResult>> {
        let url = format!("{}{}", Self::BASE_URL, endpoint);
        let results: Option<Vec<ChinaLocationResult>> = get_json(&self.client, &url, query).await?;
        Ok(results.unwrap_or_default())
    }
}

#[async_trait::async_trait]
impl WeatherSource for ChinaWeatherService {
    fn id(&self) -> &'static str {
        Self::ID
    }

    fn name(&self) -> &'static str {
        "China"
    }

    fn supported_features_in_main(&self) -> &'static [SecondaryFeature] {
        &SecondaryFeature::ALL
    }

    fn supported_features_in_secondary(&self) -> &'static [SecondaryFeature] {
        &SecondaryFeature::ALL
    }

    async fn request_weather(
        &self,
        location: &Location,
        ignore_features: &[SecondaryFeature],
    ) -> Result<WeatherWrapper> {
        log::info!(
            "China: Fetching weather for {} ({}, {})",
            location.city,
            location.latitude,
            location.longitude
        );

        let (mut forecast, minutely) = tokio::try_join!(
            self.forecast(location),
            self.minutely(
                location,
                !ignore_features.contains(&SecondaryFeature::Minutely)
            ),
        )?;
        forecast.minutely = minutely;

        let mut weather = convert(&forecast)?;
        if ignore_features.contains(&SecondaryFeature::AirQuality) {
            if let Some(current) = weather.current.as_mut() {
                current.air_quality = None;
            }
        }
        if ignore_features.contains(&SecondaryFeature::Alert) {
            weather.alert_list.clear();
        }

        log::debug!(
            "China: {} daily, {} hourly, {} minutely, {} alerts",
            weather.daily_forecast.len(),
            weather.hourly_forecast.len(),
            weather.minutely_forecast.len(),
            weather.alert_list.len()
        );
        Ok(weather)
    }

    async fn request_secondary_weather(
        &self,
        location: &Location,
        requested_features: &[SecondaryFeature],
    ) -> Result<SecondaryWeatherWrapper> {
        log::info!(
            "China: Fetching secondary weather ({:?}) for {}",
            requested_features,
            location.city
        );

        let (mut forecast, minutely) = tokio::try_join!(
            self.forecast(location),
            self.minutely(
                location,
                requested_features.contains(&SecondaryFeature::Minutely)
            ),
        )?;
        forecast.minutely = minutely;

        convert_secondary(&forecast)
    }

    async fn request_location_search(&self, query: &str) -> Result<Vec<Location>> {
        let results = self
            .locations(
                "location/city/search",
                &[("name", query.to_string()), ("locale", Self::LOCALE.to_string())],
            )
            .await?;

        Ok(results
            .iter()
            .filter_map(|result| match convert_location(None, result) {
                Ok(location) => Some(location),
                Err(e) => {
                    log::warn!("China: Skipping location {:?}: {}", result.name, e);
                    None
                }
            })
            .collect())
    }

    async fn request_reverse_geocoding(&self, location: &Location) -> Result<Vec<Location>> {
        let results = self
            .locations(
                "location/city/geo",
                &[
                    ("latitude", location.latitude.to_string()),
                    ("longitude", location.longitude.to_string()),
                    ("locale", Self::LOCALE.to_string()),
                ],
            )
            .await?;

        Ok(results
            .iter()
            .filter_map(|result| convert_location(Some(location), result).ok())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn forecast() -> ChinaForecastResult {
        serde_json::from_str(
            r#"{
            "current": {
                "pubTime": "2024-05-01T10:35:00+08:00",
                "weather": "1",
                "temperature": {"unit": "℃", "value": "22"},
                "feelsLike": {"unit": "℃", "value": "21"},
                "humidity": {"unit": "%", "value": "45"},
                "pressure": {"unit": "hPa", "value": "1008"},
                "visibility": {"unit": "km", "value": "12"},
                "wind": {
                    "direction": {"unit": "°", "value": "135"},
                    "speed": {"unit": "km/h", "value": "7.2"}
                },
                "uvIndex": "5"
            },
            "aqi": {"aqi": "68", "pm25": "49", "pm10": "80", "so2": "4", "no2": "25", "o3": "90", "co": "0.5"},
            "forecastDaily": {
                "pubTime": "2024-05-01T08:00:00+08:00",
                "aqi": {"value": [68, 120]},
                "precipitationProbability": {"value": ["10", "80"]},
                "temperature": {"value": [{"from": "26", "to": "14"}, {"from": "20", "to": "12"}]},
                "weather": {"value": [{"from": "0", "to": "1"}, {"from": "8", "to": "14"}]},
                "wind": {
                    "direction": {"value": [{"from": "90", "to": "180"}, {"from": "270", "to": "0"}]},
                    "speed": {"value": [{"from": "3.6", "to": "7.2"}, {"from": "36", "to": "18"}]}
                }
            },
            "forecastHourly": {
                "weather": {"pubTime": "2024-05-01T10:35:00+08:00", "value": [1, 7, 53]},
                "temperature": {"pubTime": "2024-05-01T10:00:00+08:00", "value": [22, 23, 24]},
                "aqi": {"pubTime": "2024-05-01T11:00:00+08:00", "value": [50, 150]},
                "wind": {"value": [
                    {"datetime": "2024-05-01T11:00:00+08:00", "direction": "45", "speed": 18}
                ]}
            },
            "alerts": [
                {
                    "pubTime": "2024-05-01T09:00:00+08:00",
                    "title": "北京市气象台发布大风蓝色预警",
                    "level": "蓝色",
                    "detail": "北京市气象台5月1日9时发布大风蓝色预警信号：预计..."
                },
                {
                    "pubTime": "2024-05-01T08:00:00+08:00",
                    "title": "暴雨橙色预警",
                    "level": "橙",
                    "detail": "暴雨持续"
                }
            ]
        }"#,
        )
        .unwrap()
    }

    fn minutely() -> ChinaForecastMinutely {
        serde_json::from_str(
            r#"{"precipitation": {
                "pubTime": "2024-05-01T10:35:42+08:00",
                "description": "未来两小时不会下雨",
                "value": [0.0, 0.05, 0.1]
            }}"#,
        )
        .unwrap()
    }

    #[test]
    fn test_convert_current() {
        let mut result = forecast();
        result.minutely = Some(minutely());
        let current = convert(&result).unwrap().current.unwrap();

        assert_eq!(current.weather_text.as_deref(), Some("Cloudy"));
        assert_eq!(current.weather_code, Some(WeatherCode::PartlyCloudy));
        assert_eq!(current.temperature.temperature, Some(22.0));
        assert_eq!(current.temperature.apparent_temperature, Some(21.0));
        assert_eq!(current.temperature.real_feel_temperature, None);
        assert_eq!(current.wind.unwrap().speed, Some(2.0));
        assert_eq!(current.uv.unwrap().index, Some(5.0));
        assert_eq!(current.visibility, Some(12000.0));
        assert_eq!(current.air_quality.unwrap().pm25, Some(49.0));
        assert_eq!(current.hourly_forecast.as_deref(), Some("未来两小时不会下雨"));
    }

    #[test]
    fn test_convert_daily() {
        let weather = convert(&forecast()).unwrap();
        assert_eq!(weather.daily_forecast.len(), 2);

        let first = &weather.daily_forecast[0];
        assert_eq!(first.date, Utc.with_ymd_and_hms(2024, 4, 30, 16, 0, 0).unwrap());
        assert_eq!(first.day.weather_code, Some(WeatherCode::Clear));
        assert_eq!(first.night.weather_text.as_deref(), Some("Cloudy"));
        assert_eq!(first.day.temperature.temperature, Some(26.0));
        assert_eq!(first.night.temperature.temperature, Some(14.0));
        assert_eq!(first.day.precipitation_probability.total, Some(10.0));
        assert_eq!(first.night.precipitation_probability.total, Some(10.0));
        assert_eq!(first.day.wind.unwrap().speed, Some(1.0));
        assert_eq!(first.night.wind.unwrap().degree, Some(180.0));

        let second = &weather.daily_forecast[1];
        assert_eq!(second.date, Utc.with_ymd_and_hms(2024, 5, 1, 16, 0, 0).unwrap());
        assert_eq!(second.night.weather_code, Some(WeatherCode::LightSnow));
        assert_eq!(second.day.wind.unwrap().speed, Some(10.0));
        // AQI 120 on the national scale is 91 µg/m³ of PM2.5
        let pm25 = second.air_quality.unwrap().pm25.unwrap();
        assert!((pm25 - 91.0).abs() < 1e-9);
    }

    #[test]
    fn test_convert_hourly() {
        let weather = convert(&forecast()).unwrap();
        let hourly = &weather.hourly_forecast;
        assert_eq!(hourly.len(), 3);

        // Hour-truncated publication time
        assert_eq!(hourly[0].date, Utc.with_ymd_and_hms(2024, 5, 1, 2, 0, 0).unwrap());
        assert_eq!(hourly[0].temperature.temperature, Some(22.0));
        assert_eq!(hourly[0].air_quality, None);
        assert_eq!(hourly[0].wind.unwrap().speed, None);

        assert_eq!(hourly[1].weather_code, Some(WeatherCode::LightRain));
        assert_eq!(hourly[1].temperature.temperature, Some(23.0));
        assert_eq!(hourly[1].wind.unwrap().degree, Some(45.0));
        assert_eq!(hourly[1].wind.unwrap().speed, Some(5.0));
        let pm25 = hourly[1].air_quality.unwrap().pm25.unwrap();
        assert!((pm25 - 35.0).abs() < 1e-9);

        assert_eq!(hourly[2].weather_text.as_deref(), Some("Haze"));
        let pm25 = hourly[2].air_quality.unwrap().pm25.unwrap();
        assert!((pm25 - 115.0).abs() < 1e-9);
    }

    #[test]
    fn test_convert_minutely() {
        let mut result = forecast();
        result.minutely = Some(minutely());
        let weather = convert(&result).unwrap();
        let minutely = &weather.minutely_forecast;

        assert_eq!(minutely.len(), 3);
        assert_eq!(minutely[0].date, Utc.with_ymd_and_hms(2024, 5, 1, 2, 35, 0).unwrap());
        assert_eq!(minutely[2].date, Utc.with_ymd_and_hms(2024, 5, 1, 2, 37, 0).unwrap());
        assert_eq!(minutely[0].minute_interval, 1);
        assert!((minutely[2].precipitation_intensity.unwrap() - 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_convert_alerts() {
        let weather = convert(&forecast()).unwrap();
        let alerts = &weather.alert_list;

        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[0].severity, AlertSeverity::Severe);
        assert_eq!(alerts[0].color, Color::rgb(255, 145, 0));
        // No pattern matches, the title is kept
        assert_eq!(alerts[0].headline.as_deref(), Some("暴雨橙色预警"));

        assert_eq!(alerts[1].severity, AlertSeverity::Minor);
        assert_eq!(alerts[1].color, Color::rgb(66, 151, 231));
        assert_eq!(alerts[1].headline.as_deref(), Some("北京市发布大风蓝色预警"));

        // Ids are stable for identical alerts
        let again = convert(&forecast()).unwrap();
        assert_eq!(alerts[0].alert_id, again.alert_list[0].alert_id);
        assert_ne!(alerts[0].alert_id, alerts[1].alert_id);
    }

    #[test]
    fn test_convert_incomplete() {
        let mut result = forecast();
        result.forecast_hourly = None;
        assert!(matches!(
            convert(&result),
            Err(WeatherSourceError::InvalidOrIncompleteData)
        ));
        assert!(matches!(
            convert_secondary(&result),
            Err(WeatherSourceError::InvalidOrIncompleteData)
        ));

        let mut result = forecast();
        if let Some(current) = result.current.as_mut() {
            current.pub_time = None;
        }
        assert!(convert(&result).is_err());
    }

    #[test]
    fn test_convert_secondary() {
        let mut result = forecast();
        result.minutely = Some(minutely());
        let secondary = convert_secondary(&result).unwrap();

        assert_eq!(secondary.air_quality.unwrap().no2, Some(25.0));
        assert_eq!(secondary.precipitation.as_deref(), Some("未来两小时不会下雨"));
        assert_eq!(secondary.minutely_forecast.len(), 3);
        assert_eq!(secondary.alert_list.len(), 2);
    }

    #[test]
    fn test_headline_patterns() {
        assert_eq!(
            headline(
                Some("title"),
                Some("上海中心气象台2024年5月1日更新暴雨黄色预警信号为暴雨橙色预警信号")
            )
            .as_deref(),
            Some("上海中心更新暴雨黄色预警为暴雨橙色预警")
        );
        assert_eq!(
            headline(Some("title"), Some("市应急局和市气象局联合发布“地质灾害预警"))
                .as_deref(),
            Some("市应急局和市气象局联合发布地质灾害预警")
        );
        assert_eq!(
            headline(Some("title"), Some("深圳市2024年5月1日10时发布暴雨预警")).as_deref(),
            Some("深圳市发布暴雨预警")
        );
        assert_eq!(headline(Some("title"), None).as_deref(), Some("title"));
        assert_eq!(headline(None, Some("无匹配")), None);
    }

    #[test]
    fn test_alert_levels() {
        for level in ["橘", "橘色", "橘黄", "橘黄色", "橙色"] {
            assert_eq!(alert_severity(Some(level)), AlertSeverity::Severe);
            assert_eq!(alert_color(Some(level)), Some(Color::rgb(255, 145, 0)));
        }
        assert_eq!(alert_severity(Some("红")), AlertSeverity::Extreme);
        assert_eq!(alert_severity(Some("黄色")), AlertSeverity::Moderate);
        assert_eq!(alert_severity(Some("紫")), AlertSeverity::Unknown);
        assert_eq!(alert_severity(None), AlertSeverity::Unknown);
        assert_eq!(alert_color(Some("紫")), None);
    }

    #[test]
    fn test_weather_tables() {
        assert_eq!(weather_text(Some("00")), "Clear");
        assert_eq!(weather_text(Some("31")), "Severe Sandstorm");
        assert_eq!(weather_text(Some("99")), "Unknown");
        assert_eq!(weather_text(None), "Unknown");
        assert_eq!(weather_code(Some("2")), Some(WeatherCode::Cloudy));
        assert_eq!(weather_code(Some("19")), Some(WeatherCode::Sleet));
        assert_eq!(weather_code(Some("57")), Some(WeatherCode::Fog));
        assert_eq!(weather_code(Some("")), None);
    }

    #[test]
    fn test_convert_location() {
        let result: ChinaLocationResult = serde_json::from_str(
            r#"{
                "affiliation": "北京市",
                "key": "101010100",
                "latitude": "39.904",
                "longitude": 116.407,
                "locationKey": "weathercn:101010100",
                "name": "北京",
                "status": 0,
                "timeZoneShift": 28800
            }"#,
        )
        .unwrap();

        let location = convert_location(None, &result).unwrap();
        assert_eq!(location.city_id.as_deref(), Some("101010100"));
        assert_eq!(location.time_zone, "Asia/Shanghai");
        assert_eq!(location.country_code.as_deref(), Some("CN"));
        assert_eq!(location.admin2.as_deref(), Some("北京市"));
        assert_eq!(location.city, "北京");
        assert!((location.longitude - 116.407).abs() < 1e-9);
        assert_eq!(location.weather_source.as_deref(), Some("china"));

        let incomplete = ChinaLocationResult {
            location_key: None,
            ..result
        };
        assert!(convert_location(None, &incomplete).is_err());
    }

    #[test]
    fn test_location_key() {
        let location = Location {
            city_id: Some("101020100".to_string()),
            ..Default::default()
        };
        assert_eq!(
            ChinaWeatherService::location_key(&location).unwrap(),
            "weathercn:101020100"
        );
        assert!(ChinaWeatherService::location_key(&Location::default()).is_err());
    }
}
