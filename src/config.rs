// =============================================================================
// CONFIGURATION - Load settings from config.toml
// =============================================================================
//
// Every section falls back to defaults, so a missing or partial config.toml
// still produces the stock 1000x1000 window rendering shaders/comp.spv.

use anyhow::{Context, Result};
use log::LevelFilter;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub window: WindowConfig,
    pub shader: ShaderConfig,
    pub debug: DebugConfig,
}

/// Window settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Vulkan Ray Tracer".to_string(),
            width: 1000,
            height: 1000,
        }
    }
}

/// Location of the pre-compiled compute shader
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ShaderConfig {
    pub path: PathBuf,
}

impl Default for ShaderConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("shaders/comp.spv"),
        }
    }
}

/// Debug settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    pub validation_layers: bool,
    pub log_level: String,
    pub log_to_file: bool,
    pub log_file: String,
    pub show_frame_time: bool,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            validation_layers: true,
            log_level: "info".to_string(),
            log_to_file: false,
            log_file: "raytracer.log".to_string(),
            show_frame_time: true,
        }
    }
}

impl Config {
    /// Load configuration from file, falling back to defaults if not found
    pub fn load() -> Self {
        Self::load_from_path("config.toml").unwrap_or_else(|e| {
            log::warn!("Failed to load config.toml: {:#}. Using defaults.", e);
            Config::default()
        })
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config = Self::parse(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        log::info!("Loaded configuration from {:?}", path);
        log::debug!("Config: {:?}", config);

        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Validation layers are a debug-build feature only
    pub fn validation_enabled(&self) -> bool {
        cfg!(debug_assertions) && self.debug.validation_layers
    }

    /// Get the configured log level, defaulting to Info
    pub fn log_level(&self) -> LevelFilter {
        self.debug.log_level.parse().unwrap_or(LevelFilter::Info)
    }
}
