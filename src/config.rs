//! Configuration file handling for laser-graffiti.
//!
//! Loads configuration from `<config_dir>/laser-graffiti/config.toml` or a custom path.
//! Every field has a default, so an absent file or a partial file is fine.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::ConfigError;
use crate::vision::{ColorFilter, HueBand};

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub marker: MarkerConfig,
    #[serde(default)]
    pub calibration: CalibrationConfig,
    #[serde(default)]
    pub game: GameConfig,
    #[serde(default)]
    pub display: DisplayConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub device: u32,
    /// MJPEG stream URL (http or https); takes precedence over `device` when set.
    pub url: Option<String>,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device: 0,
            url: None,
            width: 640,
            height: 480,
            fps: 30,
        }
    }
}

/// Marker tracking. Hues are on the 0..=179 scale.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MarkerConfig {
    pub hue_lower: u8,
    pub hue_upper: u8,
    pub min_saturation: u8,
    pub min_value: u8,
    pub blur_sigma: f32,
    pub threshold: u8,
    /// How many distinct recent frames one tick may search for the marker.
    pub detection_frames: usize,
}

impl Default for MarkerConfig {
    fn default() -> Self {
        Self {
            hue_lower: 170,
            hue_upper: 10,
            min_saturation: 100,
            min_value: 150,
            blur_sigma: 2.0,
            threshold: 60,
            detection_frames: 1,
        }
    }
}

impl MarkerConfig {
    pub fn filter(&self) -> ColorFilter {
        ColorFilter {
            band: HueBand::new(
                self.hue_lower,
                self.hue_upper,
                self.min_saturation,
                self.min_value,
            ),
            blur_sigma: self.blur_sigma,
            threshold: self.threshold,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    pub hue_lower: u8,
    pub hue_upper: u8,
    pub min_saturation: u8,
    pub min_value: u8,
    pub blur_sigma: f32,
    pub threshold: u8,
    /// Contours smaller than this (square camera pixels) are noise.
    pub min_area: f64,
    pub attempts: u32,
    pub settle_ms: u64,
    /// Color of the full-screen pattern, 0x00RRGGBB.
    pub pattern_color: u32,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            hue_lower: 50,
            hue_upper: 70,
            min_saturation: 80,
            min_value: 80,
            blur_sigma: 2.0,
            threshold: 60,
            min_area: 2000.0,
            attempts: 5,
            settle_ms: 500,
            pattern_color: 0x00_00_FF_00,
        }
    }
}

impl CalibrationConfig {
    pub fn filter(&self) -> ColorFilter {
        ColorFilter {
            band: HueBand::new(
                self.hue_lower,
                self.hue_upper,
                self.min_saturation,
                self.min_value,
            ),
            blur_sigma: self.blur_sigma,
            threshold: self.threshold,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    pub tick_ms: u64,
    /// Longest jump (canvas units) still joined into one stroke.
    pub max_gap: u32,
    /// Consecutive missed ticks tolerated before the stroke is broken.
    pub grace_ticks: u32,
    pub canvas_width: usize,
    pub canvas_height: usize,
    pub radius: i32,
    pub icon_dir: Option<PathBuf>,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            tick_ms: 33,
            max_gap: 50,
            grace_ticks: 3,
            canvas_width: 1280,
            canvas_height: 720,
            radius: 5,
            icon_dir: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub width: usize,
    pub height: usize,
    pub mirror: bool,
    pub title: String,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            mirror: false,
            title: "Laser Graffiti".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a file path.
    /// Returns default config if the file doesn't exist.
    /// Returns an error if the file exists but cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path.map(PathBuf::from).unwrap_or_else(default_path);

        if !path.exists() {
            log::debug!("no config at {}, using defaults", path.display());
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        let config = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.clone(),
            source,
        })?;
        log::info!("loaded config from {}", path.display());
        Ok(config)
    }
}

/// Get the default config file path.
pub fn default_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("laser-graffiti")
        .join("config.toml")
}
