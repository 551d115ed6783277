//! weather-unify command line
//!
//! Query the air quality index engine, convert saved provider payloads offline,
//! or fetch live weather through the unified provider. Results are printed as
//! JSON.

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use weather_unify::config::{parse_features, ProviderConfig};
use weather_unify::weather_china::{self, ChinaForecastMinutely, ChinaForecastResult};
use weather_unify::weather_qweather::{self, QWeatherBundle};
use weather_unify::{
    aqi_to_color, aqi_to_description, aqi_to_level, aqi_to_name, reverse_index, Color, Location,
    PollutantKind, UnifiedWeatherProvider, WeatherProviderType,
};

#[derive(Parser, Debug)]
#[command(name = "weather-unify")]
#[command(about = "Normalize weather and air quality data across providers")]
struct Args {
    /// Weather provider: china, qweather or auto [env: WEATHER_PROVIDER]
    #[arg(long, value_parser = parse_provider)]
    provider: Option<WeatherProviderType>,

    /// QWeather API key [env: QWEATHER_API_KEY]
    #[arg(long)]
    qweather_api_key: Option<String>,

    /// Locale for provider texts [env: WEATHER_LANGUAGE]
    #[arg(long)]
    lang: Option<String>,

    /// Cache duration in seconds
    #[arg(long)]
    cache_duration: Option<i64>,

    /// HTTP timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert a pollutant concentration (µg/m³, CO in mg/m³) into an index
    Index {
        /// Pollutant: pm25, pm10, o3, no2, so2 or co
        #[arg(long, value_parser = parse_pollutant)]
        pollutant: PollutantKind,

        concentration: f64,
    },

    /// Convert a Chinese national AQI into a PM2.5 concentration
    Reverse { aqi: f64 },

    /// Classify an index value
    Level { aqi: f64 },

    /// Convert a saved provider payload into the unified model
    Convert {
        #[arg(long, value_enum)]
        source: PayloadSource,

        /// JSON payload: a QWeather bundle or a China forecast
        input: PathBuf,

        /// China minutely payload
        #[arg(long)]
        minutely: Option<PathBuf>,

        /// IANA time zone of the location
        #[arg(long, default_value = "Asia/Shanghai")]
        time_zone: String,
    },

    /// Fetch live weather
    Fetch {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,

        #[arg(long, allow_hyphen_values = true)]
        lon: f64,

        /// Provider city ID, resolved by reverse geocoding when omitted
        #[arg(long)]
        city_id: Option<String>,

        /// Source supplying secondary features
        #[arg(long)]
        secondary: Option<String>,

        /// Secondary features, comma separated (air_quality, minutely, alert)
        #[arg(long, default_value = "air_quality,minutely,alert")]
        features: String,
    },

    /// Search locations by name
    Search { query: String },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum PayloadSource {
    Qweather,
    China,
}

fn parse_provider(s: &str) -> Result<WeatherProviderType, String> {
    WeatherProviderType::from_str(s).ok_or_else(|| format!("unknown provider '{}'", s))
}

fn parse_pollutant(s: &str) -> Result<PollutantKind, String> {
    PollutantKind::from_id(s).ok_or_else(|| format!("unknown pollutant '{}'", s))
}

#[derive(Serialize)]
struct IndexReport {
    pollutant: PollutantKind,
    concentration: f64,
    index: Option<u32>,
    level: Option<usize>,
    name: Option<&'static str>,
    description: Option<&'static str>,
    color: Color,
}

#[derive(Serialize)]
struct ReverseReport {
    aqi: f64,
    pm25: Option<f64>,
}

#[derive(Serialize)]
struct LevelReport {
    aqi: f64,
    level: Option<usize>,
    name: Option<&'static str>,
    description: Option<&'static str>,
    color: Color,
}

fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn convert_payload(
    source: PayloadSource,
    input: &Path,
    minutely: Option<&Path>,
    time_zone: &str,
    lang: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let payload = std::fs::read(input)?;
    log::info!("Converting {:?} payload from {}", source, input.display());

    let weather = match source {
        PayloadSource::Qweather => {
            let bundle: QWeatherBundle = serde_json::from_slice(&payload)?;
            let location = Location {
                time_zone: time_zone.to_string(),
                ..Default::default()
            };
            weather_qweather::convert(&location, &bundle, &weather_qweather::language_for(lang))?
        }
        PayloadSource::China => {
            let mut forecast: ChinaForecastResult = serde_json::from_slice(&payload)?;
            if let Some(path) = minutely {
                let minutely: ChinaForecastMinutely = serde_json::from_slice(&std::fs::read(path)?)?;
                forecast.minutely = Some(minutely);
            }
            weather_china::convert(&forecast)?
        }
    };

    print_json(&weather)
}

async fn fetch(
    provider: &UnifiedWeatherProvider,
    lat: f64,
    lon: f64,
    city_id: Option<String>,
    secondary: Option<&str>,
    features: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let location = match city_id {
        Some(city_id) => {
            let probe = Location {
                latitude: lat,
                longitude: lon,
                ..Default::default()
            };
            let source = provider.select_source(&probe)?;
            Location {
                city_id: Some(city_id),
                weather_source: Some(source.id().to_string()),
                ..probe
            }
        }
        None => provider
            .reverse_geocode(lat, lon)
            .await?
            .into_iter()
            .next()
            .ok_or("no location found at these coordinates")?,
    };
    log::info!(
        "Fetching weather for {} ({:?})",
        location.city,
        location.weather_source
    );

    let weather = match secondary {
        Some(secondary) => {
            let features = parse_features(features)?;
            provider
                .fetch_weather_with_secondary(&location, secondary, &features)
                .await?
        }
        None => provider.fetch_weather(&location).await?,
    };

    print_json(&weather)
}

/// Command-line flags take precedence over the environment
fn apply_flags(config: &mut ProviderConfig, args: &Args) {
    if let Some(provider) = args.provider {
        config.provider = provider;
    }
    if let Some(key) = args.qweather_api_key.as_ref().filter(|k| !k.is_empty()) {
        config.qweather_api_key = Some(key.clone());
    }
    if let Some(lang) = &args.lang {
        config.language = lang.clone();
    }
    if let Some(secs) = args.cache_duration {
        config.cache_duration_secs = secs;
    }
    if let Some(secs) = args.timeout {
        config.http_timeout = Duration::from_secs(secs);
    }
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .filter_module("reqwest", log::LevelFilter::Warn)
        .init();

    let args = Args::parse();

    let mut config = ProviderConfig::from_env()?;
    apply_flags(&mut config, &args);

    match args.command {
        Command::Index {
            pollutant,
            concentration,
        } => {
            let value = Some(concentration);
            print_json(&IndexReport {
                pollutant,
                concentration,
                index: pollutant.index(value),
                level: pollutant.level(value),
                name: pollutant.name(value),
                description: pollutant.description(value),
                color: pollutant.color(value),
            })
        }
        Command::Reverse { aqi } => print_json(&ReverseReport {
            aqi,
            pm25: reverse_index(Some(aqi)),
        }),
        Command::Level { aqi } => print_json(&LevelReport {
            aqi,
            level: aqi_to_level(Some(aqi), None),
            name: aqi_to_name(Some(aqi), None),
            description: aqi_to_description(Some(aqi), None),
            color: aqi_to_color(Some(aqi), None),
        }),
        Command::Convert {
            source,
            input,
            minutely,
            time_zone,
        } => convert_payload(source, &input, minutely.as_deref(), &time_zone, &config.language),
        Command::Fetch {
            lat,
            lon,
            city_id,
            secondary,
            features,
        } => {
            config.validate()?;
            let provider = UnifiedWeatherProvider::new(&config);
            fetch(&provider, lat, lon, city_id, secondary.as_deref(), &features).await
        }
        Command::Search { query } => {
            config.validate()?;
            let provider = UnifiedWeatherProvider::new(&config);
            print_json(&provider.search_locations(&query).await?)
        }
    }
}
