//! Configuration management for crabscan
//!
//! Loads and saves the scanner's tunables (snapshot size and encoding, zoom
//! stepping, recognition languages, scanning cadence) as TOML.

use crate::constraints::ZoomPolicy;
use crate::controller::ScanPolicy;
use crate::errors::ScanError;
use crate::recognition::RecognitionOptions;
use crate::types::{ImageEncoding, Viewport};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrabScanConfig {
    pub capture: CaptureConfig,
    pub zoom: ZoomConfig,
    pub recognition: RecognitionConfig,
    pub scanning: ScanningConfig,
}

/// Snapshot configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Snapshot size [width, height]; 0 falls back to 620x480
    pub viewport: [u32; 2],
    /// Snapshot encoding (png, jpeg)
    pub image_format: String,
    /// JPEG quality (1-100)
    pub jpeg_quality: u8,
}

/// Zoom cycling configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoomConfig {
    pub step: f64,
    pub default_level: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognitionConfig {
    /// Tesseract language codes
    pub languages: Vec<String>,
    /// Detect page orientation before recognition
    pub auto_rotate: bool,
}

/// Scan cadence configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanningConfig {
    /// Re-trigger automatically instead of once per manual trigger
    pub continuous: bool,
    /// Re-trigger interval in milliseconds
    pub interval_ms: u64,
    /// Stop scanning once text is recognized
    pub stop_on_first_match: bool,
}

impl Default for CrabScanConfig {
    fn default() -> Self {
        Self {
            capture: CaptureConfig {
                viewport: [Viewport::FALLBACK.width, Viewport::FALLBACK.height],
                image_format: "png".to_string(),
                jpeg_quality: 90,
            },
            zoom: ZoomConfig {
                step: 1.0,
                default_level: 1.0,
            },
            recognition: RecognitionConfig {
                languages: vec!["eng".to_string()],
                auto_rotate: true,
            },
            scanning: ScanningConfig {
                continuous: false,
                interval_ms: 1000,
                stop_on_first_match: false,
            },
        }
    }
}

impl CrabScanConfig {
    /// Load configuration from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ScanError> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .map_err(|e| ScanError::Config(format!("Failed to read config file: {}", e)))?;

        let config: CrabScanConfig = toml::from_str(&contents)
            .map_err(|e| ScanError::Config(format!("Failed to parse config file: {}", e)))?;

        config.validate().map_err(ScanError::Config)?;
        log::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ScanError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                ScanError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let toml_string = toml::to_string_pretty(self)
            .map_err(|e| ScanError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| ScanError::Config(format!("Failed to write config file: {}", e)))?;

        log::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Get default config file path
    pub fn default_path() -> PathBuf {
        PathBuf::from("crabscan.toml")
    }

    /// Load from default location or fall back to defaults
    pub fn load_or_default() -> Self {
        Self::load_from_file(Self::default_path()).unwrap_or_else(|e| {
            log::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), String> {
        match self.capture.image_format.as_str() {
            "png" | "jpeg" | "jpg" => {}
            other => return Err(format!("Unsupported image format: {}", other)),
        }
        if self.capture.jpeg_quality == 0 || self.capture.jpeg_quality > 100 {
            return Err("JPEG quality must be between 1 and 100".to_string());
        }

        if !self.zoom.step.is_finite() || self.zoom.step <= 0.0 {
            return Err("Zoom step must be a positive number".to_string());
        }
        if !self.zoom.default_level.is_finite() || self.zoom.default_level <= 0.0 {
            return Err("Default zoom level must be a positive number".to_string());
        }

        if self.recognition.languages.iter().any(|lang| lang.trim().is_empty()) {
            return Err("Recognition languages must not be blank".to_string());
        }

        if self.scanning.continuous && self.scanning.interval_ms == 0 {
            return Err("Continuous scanning needs an interval above 0 ms".to_string());
        }

        Ok(())
    }

    pub fn viewport(&self) -> Viewport {
        Viewport::new(self.capture.viewport[0], self.capture.viewport[1])
    }

    pub fn encoding(&self) -> ImageEncoding {
        match self.capture.image_format.as_str() {
            "jpeg" | "jpg" => ImageEncoding::Jpeg {
                quality: self.capture.jpeg_quality.clamp(1, 100),
            },
            _ => ImageEncoding::Png,
        }
    }

    pub fn zoom_policy(&self) -> ZoomPolicy {
        ZoomPolicy {
            step: self.zoom.step,
            default_level: self.zoom.default_level,
        }
    }

    pub fn recognition_options(&self) -> RecognitionOptions {
        let mut options = RecognitionOptions {
            languages: self
                .recognition
                .languages
                .iter()
                .map(|lang| lang.trim().to_string())
                .collect(),
            auto_rotate: self.recognition.auto_rotate,
        };
        if options.languages.is_empty() {
            options.languages = RecognitionOptions::default().languages;
        }
        options
    }

    pub fn scan_policy(&self) -> ScanPolicy {
        ScanPolicy {
            continuous: self
                .scanning
                .continuous
                .then(|| Duration::from_millis(self.scanning.interval_ms.max(1))),
            stop_on_first_match: self.scanning.stop_on_first_match,
        }
    }
}
