//! Presentation configuration.
//!
//! [`SlideshowConfig`] gathers every tunable of the scheduler and its
//! collaborators. It can be built in code with the `with_*` setters or read
//! from an INI file. Keys missing from the file keep their defaults and
//! unknown keys are ignored.
//!
//! # Example Configuration (INI)
//!
//! ```ini
//! [slideshow]
//! slide_delay_secs = 17
//! opening_rotation_ms = 2000
//! opening_rotation_degrees = 60
//!
//! [camera]
//! fly_zoom = 5
//! fly_speed = 2
//! fly_curve = 1
//! frame_interval_ms = 16
//!
//! [rotation]
//! duration_ms = 500
//! degrees = 180
//! target = south
//! restore_camera = false
//!
//! [markers]
//! zoom_threshold = 5
//!
//! [popups]
//! trailing_capacity = 25
//! primary_offset = 25
//! trailing_offset = 45
//! ```

use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use ini::Ini;
use thiserror::Error;

use crate::camera::FlightProfile;
use crate::marker::DEFAULT_MARKER_ZOOM_THRESHOLD;
use crate::popup::{PopupStyle, DEFAULT_TRAILING_CAPACITY};
use crate::rotation::{RecenterTarget, DEFAULT_FRAME_INTERVAL};

/// Default time each POI stays on screen.
pub const DEFAULT_SLIDE_DELAY: Duration = Duration::from_secs(17);

/// Errors from loading or validating configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {reason}")]
    Read { path: PathBuf, reason: String },

    #[error("Failed to parse config: {0}")]
    Parse(String),

    /// A key was present but its value could not be parsed.
    #[error("Invalid value '{value}' for [{section}] {key}: {reason}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
        reason: String,
    },

    /// Values parsed but do not make a usable configuration.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Tunables for the slideshow.
#[derive(Debug, Clone, PartialEq)]
pub struct SlideshowConfig {
    /// How long each POI's primary popup stays up.
    ///
    /// Can be changed while running via `set_slide_delay`, which also
    /// redirects the wait already in progress.
    pub slide_delay: Duration,

    /// Duration of the in-place rotation played once before the first step.
    ///
    /// Zero skips the opening rotation.
    pub opening_rotation: Duration,

    /// Degrees swept by the opening rotation.
    pub opening_rotation_degrees: f64,

    /// Zoom level the camera flies to for each POI.
    pub fly_zoom: f64,

    /// Speed and curve of fly-to animations.
    pub flight: FlightProfile,

    /// Interval between rotation frames.
    pub frame_interval: Duration,

    /// Duration of the recentered rotation between POIs.
    pub rotation_duration: Duration,

    /// Degrees swept by the recentered rotation between POIs.
    pub rotation_degrees: f64,

    /// Neutral view the camera snaps to before rotating between POIs.
    pub recenter_target: RecenterTarget,

    /// Put center, zoom and pitch back after the recentered rotation.
    pub restore_camera: bool,

    /// Zoom level at or above which markers are shown.
    pub marker_zoom_threshold: f64,

    /// Maximum number of trailing popups kept for the current region.
    pub trailing_capacity: usize,

    /// Pixel offsets for popups.
    pub popup_style: PopupStyle,
}

impl Default for SlideshowConfig {
    fn default() -> Self {
        Self {
            slide_delay: DEFAULT_SLIDE_DELAY,
            opening_rotation: Duration::from_millis(2000),
            opening_rotation_degrees: 60.0,
            fly_zoom: 5.0,
            flight: FlightProfile::default(),
            frame_interval: DEFAULT_FRAME_INTERVAL,
            rotation_duration: Duration::from_millis(500),
            rotation_degrees: 180.0,
            recenter_target: RecenterTarget::South,
            restore_camera: false,
            marker_zoom_threshold: DEFAULT_MARKER_ZOOM_THRESHOLD,
            trailing_capacity: DEFAULT_TRAILING_CAPACITY,
            popup_style: PopupStyle::default(),
        }
    }
}

impl SlideshowConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_slide_delay(mut self, delay: Duration) -> Self {
        self.slide_delay = delay;
        self
    }

    pub fn with_opening_rotation(mut self, duration: Duration, degrees: f64) -> Self {
        self.opening_rotation = duration;
        self.opening_rotation_degrees = degrees;
        self
    }

    pub fn with_fly_zoom(mut self, zoom: f64) -> Self {
        self.fly_zoom = zoom;
        self
    }

    pub fn with_flight(mut self, flight: FlightProfile) -> Self {
        self.flight = flight;
        self
    }

    pub fn with_frame_interval(mut self, interval: Duration) -> Self {
        self.frame_interval = interval;
        self
    }

    pub fn with_rotation(mut self, duration: Duration, degrees: f64) -> Self {
        self.rotation_duration = duration;
        self.rotation_degrees = degrees;
        self
    }

    pub fn with_recenter_target(mut self, target: RecenterTarget) -> Self {
        self.recenter_target = target;
        self
    }

    pub fn with_restore_camera(mut self, restore: bool) -> Self {
        self.restore_camera = restore;
        self
    }

    pub fn with_marker_zoom_threshold(mut self, threshold: f64) -> Self {
        self.marker_zoom_threshold = threshold;
        self
    }

    pub fn with_trailing_capacity(mut self, capacity: usize) -> Self {
        self.trailing_capacity = capacity;
        self
    }

    pub fn with_popup_style(mut self, style: PopupStyle) -> Self {
        self.popup_style = style;
        self
    }

    // =========================================================================
    // Loading
    // =========================================================================

    /// Load and validate configuration from an INI file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_ini_str(&text)
    }

    /// Parse and validate configuration from INI text.
    pub fn from_ini_str(text: &str) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        let config = Self::from_ini(&ini)?;
        config.validate()?;
        Ok(config)
    }

    fn from_ini(ini: &Ini) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(secs) = read::<f64>(ini, "slideshow", "slide_delay_secs")? {
            config.slide_delay = secs_to_duration("slideshow", "slide_delay_secs", secs)?;
        }
        if let Some(ms) = read::<u64>(ini, "slideshow", "opening_rotation_ms")? {
            config.opening_rotation = Duration::from_millis(ms);
        }
        if let Some(deg) = read(ini, "slideshow", "opening_rotation_degrees")? {
            config.opening_rotation_degrees = deg;
        }

        if let Some(zoom) = read(ini, "camera", "fly_zoom")? {
            config.fly_zoom = zoom;
        }
        if let Some(speed) = read(ini, "camera", "fly_speed")? {
            config.flight.speed = speed;
        }
        if let Some(curve) = read(ini, "camera", "fly_curve")? {
            config.flight.curve = curve;
        }
        if let Some(ms) = read::<u64>(ini, "camera", "frame_interval_ms")? {
            config.frame_interval = Duration::from_millis(ms);
        }

        if let Some(ms) = read::<u64>(ini, "rotation", "duration_ms")? {
            config.rotation_duration = Duration::from_millis(ms);
        }
        if let Some(deg) = read(ini, "rotation", "degrees")? {
            config.rotation_degrees = deg;
        }
        if let Some(target) = read(ini, "rotation", "target")? {
            config.recenter_target = target;
        }
        if let Some(restore) = read_bool(ini, "rotation", "restore_camera")? {
            config.restore_camera = restore;
        }

        if let Some(threshold) = read(ini, "markers", "zoom_threshold")? {
            config.marker_zoom_threshold = threshold;
        }

        if let Some(capacity) = read(ini, "popups", "trailing_capacity")? {
            config.trailing_capacity = capacity;
        }
        if let Some(offset) = read(ini, "popups", "primary_offset")? {
            config.popup_style.primary_offset = offset;
        }
        if let Some(offset) = read(ini, "popups", "trailing_offset")? {
            config.popup_style.trailing_offset = offset;
        }

        Ok(config)
    }

    /// Check that the values make a usable configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.slide_delay.is_zero() {
            return Err(ConfigError::Invalid(
                "slide delay must be greater than zero".to_string(),
            ));
        }
        if self.frame_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "frame interval must be greater than zero".to_string(),
            ));
        }
        if self.trailing_capacity == 0 {
            return Err(ConfigError::Invalid(
                "trailing capacity must be greater than zero".to_string(),
            ));
        }

        let numbers = [
            ("opening_rotation_degrees", self.opening_rotation_degrees),
            ("fly_zoom", self.fly_zoom),
            ("fly_speed", self.flight.speed),
            ("fly_curve", self.flight.curve),
            ("rotation_degrees", self.rotation_degrees),
            ("marker_zoom_threshold", self.marker_zoom_threshold),
            ("primary_offset", self.popup_style.primary_offset),
            ("trailing_offset", self.popup_style.trailing_offset),
        ];
        if let Some((name, _)) = numbers.iter().find(|(_, v)| !v.is_finite()) {
            return Err(ConfigError::Invalid(format!("{} must be a finite number", name)));
        }
        if self.flight.speed <= 0.0 {
            return Err(ConfigError::Invalid(
                "fly_speed must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Render the configuration as INI text, in the same layout `load` reads.
    pub fn to_ini_string(&self) -> String {
        let mut ini = Ini::new();
        ini.with_section(Some("slideshow"))
            .set("slide_delay_secs", self.slide_delay.as_secs_f64().to_string())
            .set(
                "opening_rotation_ms",
                self.opening_rotation.as_millis().to_string(),
            )
            .set(
                "opening_rotation_degrees",
                self.opening_rotation_degrees.to_string(),
            );
        ini.with_section(Some("camera"))
            .set("fly_zoom", self.fly_zoom.to_string())
            .set("fly_speed", self.flight.speed.to_string())
            .set("fly_curve", self.flight.curve.to_string())
            .set(
                "frame_interval_ms",
                self.frame_interval.as_millis().to_string(),
            );
        ini.with_section(Some("rotation"))
            .set("duration_ms", self.rotation_duration.as_millis().to_string())
            .set("degrees", self.rotation_degrees.to_string())
            .set("target", self.recenter_target.as_str())
            .set("restore_camera", self.restore_camera.to_string());
        ini.with_section(Some("markers"))
            .set("zoom_threshold", self.marker_zoom_threshold.to_string());
        ini.with_section(Some("popups"))
            .set("trailing_capacity", self.trailing_capacity.to_string())
            .set("primary_offset", self.popup_style.primary_offset.to_string())
            .set(
                "trailing_offset",
                self.popup_style.trailing_offset.to_string(),
            );

        let mut out = Vec::new();
        // Writing into a Vec cannot fail
        let _ = ini.write_to(&mut out);
        String::from_utf8_lossy(&out).into_owned()
    }
}

// =============================================================================
// Value parsing
// =============================================================================

fn raw<'a>(ini: &'a Ini, section: &str, key: &str) -> Option<&'a str> {
    ini.section(Some(section))
        .and_then(|props| props.get(key))
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn invalid(section: &str, key: &str, value: &str, reason: impl Display) -> ConfigError {
    ConfigError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn read<T>(ini: &Ini, section: &str, key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    raw(ini, section, key)
        .map(|value| {
            value
                .parse::<T>()
                .map_err(|e| invalid(section, key, value, e))
        })
        .transpose()
}

fn read_bool(ini: &Ini, section: &str, key: &str) -> Result<Option<bool>, ConfigError> {
    raw(ini, section, key)
        .map(|value| match value.to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Ok(true),
            "false" | "no" | "off" | "0" => Ok(false),
            _ => Err(invalid(section, key, value, "expected true or false")),
        })
        .transpose()
}

fn secs_to_duration(section: &str, key: &str, secs: f64) -> Result<Duration, ConfigError> {
    Duration::try_from_secs_f64(secs).map_err(|e| invalid(section, key, &secs.to_string(), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = SlideshowConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.slide_delay, Duration::from_secs(17));
        assert_eq!(config.rotation_duration, Duration::from_millis(500));
        assert_eq!(config.rotation_degrees, 180.0);
        assert_eq!(config.recenter_target, RecenterTarget::South);
        assert_eq!(config.trailing_capacity, 25);
    }

    #[test]
    fn test_partial_ini_keeps_defaults() {
        let config = SlideshowConfig::from_ini_str(
            "[slideshow]\nslide_delay_secs = 4.5\n\n[rotation]\ntarget = north\nrestore_camera = yes\n",
        )
        .unwrap();

        assert_eq!(config.slide_delay, Duration::from_millis(4500));
        assert_eq!(config.recenter_target, RecenterTarget::North);
        assert!(config.restore_camera);
        assert_eq!(config.fly_zoom, 5.0);
        assert_eq!(config.trailing_capacity, 25);
    }

    #[test]
    fn test_unknown_keys_ignored() {
        let config =
            SlideshowConfig::from_ini_str("[slideshow]\ntheme = dark\n[extras]\nfoo = bar\n")
                .unwrap();
        assert_eq!(config, SlideshowConfig::default());
    }

    #[test]
    fn test_invalid_value_names_section_and_key() {
        let err = SlideshowConfig::from_ini_str("[camera]\nfly_zoom = close\n").unwrap_err();
        match err {
            ConfigError::InvalidValue {
                section, key, value, ..
            } => {
                assert_eq!(section, "camera");
                assert_eq!(key, "fly_zoom");
                assert_eq!(value, "close");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_invalid_target_rejected() {
        let err = SlideshowConfig::from_ini_str("[rotation]\ntarget = west\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "target"));
    }

    #[test]
    fn test_negative_delay_rejected() {
        let err =
            SlideshowConfig::from_ini_str("[slideshow]\nslide_delay_secs = -3\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        assert!(SlideshowConfig::default()
            .with_slide_delay(Duration::ZERO)
            .validate()
            .is_err());
        assert!(SlideshowConfig::default()
            .with_frame_interval(Duration::ZERO)
            .validate()
            .is_err());
        assert!(SlideshowConfig::default()
            .with_trailing_capacity(0)
            .validate()
            .is_err());
        assert!(SlideshowConfig::default()
            .with_fly_zoom(f64::NAN)
            .validate()
            .is_err());
    }

    #[test]
    fn test_zero_delay_in_file_rejected() {
        let err = SlideshowConfig::from_ini_str("[slideshow]\nslide_delay_secs = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_ini_output_reloads_to_same_config() {
        let config = SlideshowConfig::default()
            .with_slide_delay(Duration::from_secs(9))
            .with_recenter_target(RecenterTarget::Equatorial)
            .with_trailing_capacity(7);
        let reloaded = SlideshowConfig::from_ini_str(&config.to_ini_string()).unwrap();
        assert_eq!(reloaded, config);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[markers]\nzoom_threshold = 7.5").unwrap();

        let config = SlideshowConfig::load(file.path()).unwrap();
        assert_eq!(config.marker_zoom_threshold, 7.5);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.ini");
        assert!(matches!(
            SlideshowConfig::load(&path),
            Err(ConfigError::Read { .. })
        ));
    }
}
