//! Pollutant Index
//!
//! Normalizes raw pollutant concentrations (µg/m³, CO in mg/m³) into a single
//! comparable air quality index, and recovers approximate PM2.5 concentrations from
//! the categorical AQI published by Chinese providers.
//!
//! # Scales
//! - Forward: one concentration breakpoint table per pollutant, all sharing the
//!   reference index thresholds `[0, 50, 100, 150, 200, 300]` (Plume 2023).
//! - Reverse: the Chinese national AQI `[0, 50, ..., 500]` against its own PM2.5
//!   breakpoints `[0, 35, 75, 115, 150, 250, 350, 500]`.
//!
//! The two PM2.5 tables differ, so a provider AQI reverse-converted and then
//! indexed again lands on a different value. That is expected: the reverse
//! conversion only produces a concentration for display and cross-provider
//! comparison.

use crate::breakpoints::{level_of, BreakpointScale};
use crate::weather_model::Color;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Reference index thresholds shared by every pollutant
pub const AQI_THRESHOLDS: [f64; 6] = [0.0, 50.0, 100.0, 150.0, 200.0, 300.0];

pub const INDEX_FRESH_AIR: f64 = AQI_THRESHOLDS[1];
pub const INDEX_HIGH_POLLUTION: f64 = AQI_THRESHOLDS[3];
pub const INDEX_EXCESSIVE_POLLUTION: f64 = AQI_THRESHOLDS[5];

const O3_THRESHOLDS: [f64; 6] = [0.0, 106.01227, 137.42331, 166.87117, 206.13496, 392.63803];
const NO2_THRESHOLDS: [f64; 6] = [0.0, 99.73538, 188.17996, 677.4479, 1221.288, 2350.3677];
const PM10_THRESHOLDS: [f64; 6] = [0.0, 54.0, 154.0, 254.0, 354.0, 424.0];
const PM25_THRESHOLDS: [f64; 6] = [0.0, 12.0, 35.4, 55.4, 150.4, 250.4];
const SO2_THRESHOLDS: [f64; 6] = [0.0, 91.71575, 196.53374, 484.78323, 796.61676, 1582.7517];
const CO_THRESHOLDS: [f64; 6] = [0.0, 5.040654, 10.768671, 14.205481, 17.64229, 34.82634];

const CHINA_PM25_THRESHOLDS: [f64; 8] = [0.0, 35.0, 75.0, 115.0, 150.0, 250.0, 350.0, 500.0];
const CHINA_AQI_THRESHOLDS: [f64; 8] = [0.0, 50.0, 100.0, 150.0, 200.0, 300.0, 400.0, 500.0];

/// Chinese national AQI against PM2.5, used for reverse conversion
pub const CHINA_PM25_SCALE: BreakpointScale =
    BreakpointScale::new(&CHINA_PM25_THRESHOLDS, &CHINA_AQI_THRESHOLDS);

/// Pollutants with an index table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PollutantKind {
    O3,
    NO2,
    PM10,
    PM25,
    SO2,
    CO,
}

impl PollutantKind {
    pub const ALL: [PollutantKind; 6] = [
        PollutantKind::O3,
        PollutantKind::NO2,
        PollutantKind::PM10,
        PollutantKind::PM25,
        PollutantKind::SO2,
        PollutantKind::CO,
    ];

    pub fn id(self) -> &'static str {
        match self {
            PollutantKind::O3 => "o3",
            PollutantKind::NO2 => "no2",
            PollutantKind::PM10 => "pm10",
            PollutantKind::PM25 => "pm25",
            PollutantKind::SO2 => "so2",
            PollutantKind::CO => "co",
        }
    }

    /// Parse pollutant from its id or a common spelling
    pub fn from_id(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "o3" | "ozone" => Some(PollutantKind::O3),
            "no2" => Some(PollutantKind::NO2),
            "pm10" => Some(PollutantKind::PM10),
            "pm25" | "pm2.5" | "pm2p5" => Some(PollutantKind::PM25),
            "so2" => Some(PollutantKind::SO2),
            "co" => Some(PollutantKind::CO),
            _ => None,
        }
    }

    /// Concentration breakpoints
    pub fn thresholds(self) -> &'static [f64] {
        match self {
            PollutantKind::O3 => &O3_THRESHOLDS,
            PollutantKind::NO2 => &NO2_THRESHOLDS,
            PollutantKind::PM10 => &PM10_THRESHOLDS,
            PollutantKind::PM25 => &PM25_THRESHOLDS,
            PollutantKind::SO2 => &SO2_THRESHOLDS,
            PollutantKind::CO => &CO_THRESHOLDS,
        }
    }

    /// Concentration and index breakpoints of this pollutant
    pub fn breakpoints(self) -> (&'static [f64], &'static [f64]) {
        (self.thresholds(), &AQI_THRESHOLDS)
    }

    pub fn scale(self) -> BreakpointScale {
        BreakpointScale::new(self.thresholds(), &AQI_THRESHOLDS)
    }

    /// Concentration from which pollution is considered excessive
    pub fn excessive_pollution(self) -> f64 {
        self.thresholds()[self.thresholds().len() - 1]
    }

    /// Normalized index of a concentration
    pub fn index(self, concentration: Option<f64>) -> Option<u32> {
        self.scale().index(concentration)
    }

    /// Level of a concentration, zero meaning the first band
    pub fn level(self, concentration: Option<f64>) -> Option<usize> {
        self.scale().concentration_level(concentration)
    }

    pub fn name(self, concentration: Option<f64>) -> Option<&'static str> {
        aqi_to_name(concentration, Some(self.thresholds()))
    }

    pub fn description(self, concentration: Option<f64>) -> Option<&'static str> {
        aqi_to_description(concentration, Some(self.thresholds()))
    }

    pub fn color(self, concentration: Option<f64>) -> Color {
        aqi_to_color(concentration, Some(self.thresholds()))
    }
}

impl fmt::Display for PollutantKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PollutantKind::O3 => write!(f, "O₃"),
            PollutantKind::NO2 => write!(f, "NO₂"),
            PollutantKind::PM10 => write!(f, "PM10"),
            PollutantKind::PM25 => write!(f, "PM2.5"),
            PollutantKind::SO2 => write!(f, "SO₂"),
            PollutantKind::CO => write!(f, "CO"),
        }
    }
}

/// Approximate PM2.5 concentration (µg/m³) behind a Chinese national AQI value
pub fn reverse_index(aqi: Option<f64>) -> Option<f64> {
    CHINA_PM25_SCALE.concentration(aqi)
}

/// Display strings and colors per level, sized like the index thresholds
#[derive(Debug, Clone, Copy)]
pub struct LevelPalette {
    pub names: &'static [&'static str],
    pub descriptions: &'static [&'static str],
    pub colors: &'static [Color],
}

impl LevelPalette {
    pub fn name(&self, level: Option<usize>) -> Option<&'static str> {
        self.names.get(level?).copied()
    }

    pub fn description(&self, level: Option<usize>) -> Option<&'static str> {
        self.descriptions.get(level?).copied()
    }

    /// Transparent when the level is missing or out of range
    pub fn color(&self, level: Option<usize>) -> Color {
        level
            .and_then(|level| self.colors.get(level).copied())
            .unwrap_or(Color::TRANSPARENT)
    }
}

pub const DEFAULT_PALETTE: LevelPalette = LevelPalette {
    names: &[
        "Excellent",
        "Fair",
        "Poor",
        "Unhealthy",
        "Very unhealthy",
        "Dangerous",
    ],
    descriptions: &[
        "Ideal air quality for outdoor activities",
        "Air quality is acceptable, sensitive people should limit prolonged exertion",
        "Sensitive groups may experience health effects",
        "Everyone may begin to experience health effects",
        "Health alert, everyone may experience serious health effects",
        "Health warning of emergency conditions",
    ],
    colors: &[
        Color::rgb(0, 229, 155),
        Color::rgb(255, 195, 2),
        Color::rgb(255, 113, 43),
        Color::rgb(246, 42, 85),
        Color::rgb(199, 46, 170),
        Color::rgb(153, 48, 255),
    ],
};

/// Level of an index, or of a concentration when its thresholds are given
pub fn aqi_to_level(aqi: Option<f64>, thresholds: Option<&[f64]>) -> Option<usize> {
    level_of(aqi, thresholds.unwrap_or(&AQI_THRESHOLDS))
}

pub fn aqi_to_name(aqi: Option<f64>, thresholds: Option<&[f64]>) -> Option<&'static str> {
    DEFAULT_PALETTE.name(aqi_to_level(aqi, thresholds))
}

pub fn aqi_to_description(aqi: Option<f64>, thresholds: Option<&[f64]>) -> Option<&'static str> {
    DEFAULT_PALETTE.description(aqi_to_level(aqi, thresholds))
}

pub fn aqi_to_color(aqi: Option<f64>, thresholds: Option<&[f64]>) -> Color {
    DEFAULT_PALETTE.color(aqi_to_level(aqi, thresholds))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tables_well_formed() {
        for pollutant in PollutantKind::ALL {
            let (concentrations, indexes) = pollutant.breakpoints();
            assert_eq!(concentrations.len(), 6, "{}", pollutant.id());
            assert_eq!(concentrations.len(), indexes.len());
            assert!(pollutant.scale().is_well_formed(), "{}", pollutant.id());
        }
        assert!(CHINA_PM25_SCALE.is_well_formed());
        assert_eq!(DEFAULT_PALETTE.names.len(), AQI_THRESHOLDS.len());
        assert_eq!(DEFAULT_PALETTE.descriptions.len(), AQI_THRESHOLDS.len());
        assert_eq!(DEFAULT_PALETTE.colors.len(), AQI_THRESHOLDS.len());
    }

    #[test]
    fn test_zero_concentration() {
        for pollutant in PollutantKind::ALL {
            assert_eq!(pollutant.index(Some(0.0)), Some(0), "{}", pollutant.id());
            assert_eq!(pollutant.level(Some(0.0)), Some(0));
        }
    }

    #[test]
    fn test_pm25_index() {
        assert_eq!(PollutantKind::PM25.index(Some(12.0)), Some(50));
        assert_eq!(PollutantKind::PM25.index(Some(35.4)), Some(100));
        assert_eq!(PollutantKind::PM25.index(Some(55.4)), Some(150));
        assert_eq!(PollutantKind::PM25.index(Some(150.4)), Some(200));
        assert_eq!(PollutantKind::PM25.index(Some(250.4)), Some(300));
        // 500 * 300 / 250.4 = 599.04
        assert_eq!(PollutantKind::PM25.index(Some(500.0)), Some(599));
    }

    #[test]
    fn test_co_index() {
        assert_eq!(PollutantKind::CO.index(Some(0.0)), Some(0));
        assert_eq!(PollutantKind::CO.index(None), None);
        assert_eq!(PollutantKind::CO.index(Some(-1.0)), None);
        assert_eq!(PollutantKind::CO.index(Some(5.040654)), Some(50));
        assert_eq!(PollutantKind::CO.index(Some(34.82634)), Some(300));
    }

    #[test]
    fn test_index_monotonic() {
        for pollutant in PollutantKind::ALL {
            let max = pollutant.excessive_pollution() * 2.0;
            let mut previous = 0;
            let steps = 2000;
            for step in 0..=steps {
                let cp = max * step as f64 / steps as f64;
                let index = pollutant.index(Some(cp)).unwrap();
                assert!(
                    index >= previous,
                    "{} not monotonic at {}: {} < {}",
                    pollutant.id(),
                    cp,
                    index,
                    previous
                );
                previous = index;
            }
        }
    }

    #[test]
    fn test_extrapolation_is_linear() {
        for pollutant in PollutantKind::ALL {
            let far = pollutant.excessive_pollution() * 4.0;
            let single = pollutant.index(Some(far)).unwrap() as i64;
            let double = pollutant.index(Some(far * 2.0)).unwrap() as i64;
            assert!((double - single * 2).abs() <= 1, "{}", pollutant.id());
        }
    }

    #[test]
    fn test_level() {
        assert_eq!(PollutantKind::PM25.level(Some(12.0)), Some(0));
        assert_eq!(PollutantKind::PM25.level(Some(12.1)), Some(1));
        assert_eq!(PollutantKind::PM25.level(Some(300.0)), Some(5));
        assert_eq!(PollutantKind::PM25.level(None), None);
        assert_eq!(PollutantKind::PM25.level(Some(-5.0)), None);
    }

    #[test]
    fn test_reverse_index() {
        assert_eq!(reverse_index(None), None);
        assert_eq!(reverse_index(Some(0.0)), None);
        assert_eq!(reverse_index(Some(-10.0)), None);
        assert_eq!(reverse_index(Some(f64::INFINITY)), None);
        assert!((reverse_index(Some(50.0)).unwrap() - 35.0).abs() < 1e-9);
        assert!((reverse_index(Some(75.0)).unwrap() - 55.0).abs() < 1e-9);
        assert!((reverse_index(Some(500.0)).unwrap() - 500.0).abs() < 1e-9);
        assert!((reverse_index(Some(600.0)).unwrap() - 600.0).abs() < 1e-9);
    }

    #[test]
    fn test_round_trip_on_same_scale() {
        for aqi in 1..=300 {
            let cp = PollutantKind::PM25.scale().concentration(Some(aqi as f64));
            let back = PollutantKind::PM25.index(cp).unwrap() as i64;
            assert!((back - aqi).abs() <= 1, "PM2.5 scale: {} -> {}", aqi, back);
        }
        for aqi in 1..=500 {
            let cp = reverse_index(Some(aqi as f64));
            let back = CHINA_PM25_SCALE.index(cp).unwrap() as i64;
            assert!((back - aqi).abs() <= 1, "China scale: {} -> {}", aqi, back);
        }
    }

    #[test]
    fn test_cross_scale_asymmetry() {
        // A Chinese AQI of 50 is 35 µg/m³ of PM2.5, which the reference PM2.5
        // table indexes at 99 rather than 50.
        let cp = reverse_index(Some(50.0));
        assert_eq!(PollutantKind::PM25.index(cp), Some(99));
    }

    #[test]
    fn test_aqi_to_level() {
        assert_eq!(aqi_to_level(None, None), None);
        assert_eq!(aqi_to_level(Some(-5.0), None), None);
        assert_eq!(aqi_to_level(Some(25.0), None), Some(0));
        assert_eq!(aqi_to_level(Some(75.0), None), Some(1));
        assert_eq!(aqi_to_level(Some(400.0), None), Some(5));
        assert_eq!(
            aqi_to_level(Some(40.0), Some(PollutantKind::PM25.thresholds())),
            Some(2)
        );
    }

    #[test]
    fn test_names_and_colors() {
        assert_eq!(aqi_to_name(Some(25.0), None), Some("Excellent"));
        assert_eq!(aqi_to_name(Some(175.0), None), Some("Unhealthy"));
        assert_eq!(aqi_to_name(None, None), None);
        assert_eq!(aqi_to_color(Some(25.0), None), Color::rgb(0, 229, 155));
        assert_eq!(aqi_to_color(None, None), Color::TRANSPARENT);
        assert_eq!(aqi_to_color(Some(-1.0), None), Color::TRANSPARENT);
        assert_eq!(PollutantKind::PM10.name(Some(200.0)), Some("Poor"));
        assert!(aqi_to_description(Some(350.0), None).is_some());
    }

    #[test]
    fn test_palette_out_of_range() {
        let thresholds = [0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0];
        let level = aqi_to_level(Some(100.0), Some(&thresholds));
        assert_eq!(level, Some(7));
        assert_eq!(DEFAULT_PALETTE.name(level), None);
        assert_eq!(DEFAULT_PALETTE.color(level), Color::TRANSPARENT);
    }

    #[test]
    fn test_pollutant_ids() {
        for pollutant in PollutantKind::ALL {
            assert_eq!(PollutantKind::from_id(pollutant.id()), Some(pollutant));
        }
        assert_eq!(PollutantKind::from_id("PM2.5"), Some(PollutantKind::PM25));
        assert_eq!(PollutantKind::from_id("pm2p5"), Some(PollutantKind::PM25));
        assert_eq!(PollutantKind::from_id("nox"), None);
    }
}
