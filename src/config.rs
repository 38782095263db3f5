//! Station configuration
//!
//! A default `config.toml` is compiled into the binary. A user copy at
//! `$INSPECTION_STATION_CONFIG` or `<config_dir>/InspectionStation/config.toml`
//! replaces it wholesale when present.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::error::ConfigError;
use crate::preferences;
use crate::session::{Category, Layout};
use crate::storage::CaptureFormat;

/// Environment variable naming an explicit config file
pub(crate) const CONFIG_ENV_VAR: &str = "INSPECTION_STATION_CONFIG";

const DEFAULT_CONFIG_TOML: &str = include_str!("../config.toml");

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct Config {
    pub active_profile: String,
    pub profiles: Vec<Profile>,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub video: VideoConfig,
    #[serde(default)]
    pub hotkeys: HotkeyConfig,
    #[serde(default)]
    pub touch: TouchConfig,
    #[serde(default)]
    pub report: ReportConfig,
    #[serde(default)]
    pub smtp: SmtpConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub(crate) struct CaptureConfig {
    pub cooldown_ms: u64,
    pub recognize_interval_ms: u64,
    pub recognition_enabled: bool,
    pub frame_interval_ms: u64,
    pub retry_delay_ms: u64,
    /// Capacity of the trigger hand-off queue
    pub trigger_queue: usize,
    pub format: CaptureFormat,
    pub jpeg_quality: u8,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            cooldown_ms: 1000,
            recognize_interval_ms: 500,
            recognition_enabled: true,
            frame_interval_ms: 33,
            retry_delay_ms: 1000,
            trigger_queue: 32,
            format: CaptureFormat::Jpeg,
            jpeg_quality: 90,
        }
    }
}

impl CaptureConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    pub fn recognize_interval(&self) -> Duration {
        Duration::from_millis(self.recognize_interval_ms)
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms.max(1))
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// Which device feeds the live view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum VideoSourceKind {
    #[default]
    Camera,
    /// Directory of still images, for bench runs without a microscope
    Stills,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub(crate) struct VideoConfig {
    pub source: VideoSourceKind,
    /// Case-insensitive substring of the camera's device name
    pub camera_name: String,
    pub source_dir: Option<PathBuf>,
    pub dwell_ms: u64,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            source: VideoSourceKind::Camera,
            camera_name: "Dino".to_string(),
            source_dir: None,
            dwell_ms: 2000,
        }
    }
}

impl VideoConfig {
    pub fn dwell(&self) -> Duration {
        Duration::from_millis(self.dwell_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub(crate) struct HotkeyConfig {
    pub enabled: bool,
    /// Key names understood by `global-hotkey`, e.g. `F12` or `Shift+Space`
    pub capture: Vec<String>,
}

impl Default for HotkeyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capture: vec!["F12".to_string(), "F11".to_string()],
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(crate) struct TouchConfig {
    pub enabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub(crate) struct ReportConfig {
    pub title: String,
    pub result_text: String,
    pub open_after_export: bool,
    pub font_dir: Option<PathBuf>,
    pub font_name: String,
    /// Directory holding `{category}.png` example images
    pub reference_dir: Option<PathBuf>,
    pub inspection_points: Option<String>,
    pub footer: Vec<String>,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            title: "Inspection Report".to_string(),
            result_text: "PASS".to_string(),
            open_after_export: false,
            font_dir: None,
            font_name: "LiberationSans".to_string(),
            reference_dir: None,
            inspection_points: None,
            footer: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub(crate) struct SmtpConfig {
    pub server: String,
    pub port: u16,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            server: "smtp.gmail.com".to_string(),
            port: 587,
        }
    }
}

/// A named capture grid
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct Profile {
    pub name: String,
    #[serde(default = "default_images_per_row")]
    pub images_per_row: u32,
    pub categories: Vec<Category>,
}

fn default_images_per_row() -> u32 {
    4
}

impl Profile {
    /// Validated slot layout for this profile
    pub fn layout(&self) -> Result<Layout, ConfigError> {
        if self.images_per_row == 0 {
            return Err(ConfigError::InvalidLayout(format!(
                "profile '{}' must show at least one image per row",
                self.name
            )));
        }
        Layout::new(self.categories.clone())
    }
}

impl Config {
    /// Look up `name`, or the configured `active_profile` when `None`
    pub fn profile(&self, name: Option<&str>) -> Result<&Profile, ConfigError> {
        let wanted = name.unwrap_or(&self.active_profile);
        self.profiles
            .iter()
            .find(|p| p.name == wanted)
            .ok_or_else(|| ConfigError::UnknownProfile(wanted.to_string()))
    }

    pub fn profile_names(&self) -> Vec<&str> {
        self.profiles.iter().map(|p| p.name.as_str()).collect()
    }
}

/// Parse a configuration document
pub(crate) fn parse_config(text: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(text)?;
    // Fail at start-up rather than on the first scan
    for profile in &config.profiles {
        profile.layout()?;
    }
    config.profile(None)?;
    Ok(config)
}

/// Where a user config file is looked for
fn override_path() -> Option<PathBuf> {
    if let Some(path) = std::env::var_os(CONFIG_ENV_VAR) {
        return Some(PathBuf::from(path));
    }
    preferences::app_config_dir().map(|d| d.join("config.toml"))
}

/// Load configuration, preferring a user copy over the embedded default
pub(crate) fn load_config() -> Result<Config, ConfigError> {
    load_from(override_path().as_deref())
}

fn load_from(path: Option<&Path>) -> Result<Config, ConfigError> {
    match path {
        Some(path) if path.exists() => {
            let text = fs::read_to_string(path).map_err(|e| ConfigError::Read {
                path: path.to_path_buf(),
                source: e,
            })?;
            info!("Loading configuration from {:?}", path);
            parse_config(&text)
        }
        _ => parse_config(DEFAULT_CONFIG_TOML),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_config_is_valid() {
        let config = parse_config(DEFAULT_CONFIG_TOML).unwrap();
        assert_eq!(config.active_profile, "socket");
        assert_eq!(config.profile_names(), vec!["socket", "top-bottom", "board"]);
        assert_eq!(config.capture.cooldown(), Duration::from_secs(1));
        assert_eq!(config.capture.recognize_interval(), Duration::from_millis(500));
        assert_eq!(config.hotkeys.capture, vec!["F12", "F11"]);
    }

    #[test]
    fn test_embedded_profiles_layouts() {
        let config = parse_config(DEFAULT_CONFIG_TOML).unwrap();
        let totals: Vec<usize> = config
            .profiles
            .iter()
            .map(|p| p.layout().unwrap().total_slots())
            .collect();
        assert_eq!(totals, vec![32, 16, 28]);

        let socket = config.profile(None).unwrap();
        assert_eq!(
            socket.categories[0].criteria.as_deref(),
            Some("Not broken, not bridged")
        );
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = parse_config(
            r#"
            active_profile = "one"

            [[profiles]]
            name = "one"
            categories = [{ name = "Surface", points = 2 }]
            "#,
        )
        .unwrap();

        assert_eq!(config.capture.frame_interval(), Duration::from_millis(33));
        assert_eq!(config.capture.format, CaptureFormat::Jpeg);
        assert_eq!(config.profile(None).unwrap().images_per_row, 4);
        assert!(!config.touch.enabled);
        assert_eq!(config.smtp.port, 587);
        assert!(config.video.source_dir.is_none());
        assert_eq!(config.video.source, VideoSourceKind::Camera);
        assert_eq!(config.video.camera_name, "Dino");
    }

    #[test]
    fn test_still_feed_can_replace_camera() {
        let config = parse_config(
            r#"
            active_profile = "one"

            [video]
            source = "stills"
            source_dir = "bench"

            [[profiles]]
            name = "one"
            categories = [{ name = "Surface", points = 2 }]
            "#,
        )
        .unwrap();

        assert_eq!(config.video.source, VideoSourceKind::Stills);
        assert_eq!(config.video.source_dir, Some(PathBuf::from("bench")));
    }

    #[test]
    fn test_unknown_active_profile() {
        let err = parse_config(
            r#"
            active_profile = "missing"

            [[profiles]]
            name = "one"
            categories = [{ name = "Surface", points = 2 }]
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownProfile(name) if name == "missing"));
    }

    #[test]
    fn test_zero_points_rejected() {
        let err = parse_config(
            r#"
            active_profile = "one"

            [[profiles]]
            name = "one"
            categories = [{ name = "Surface", points = 0 }]
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidLayout(_)));
    }

    #[test]
    fn test_malformed_toml() {
        assert!(matches!(
            parse_config("active_profile = "),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_override_file_replaces_default() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
            active_profile = "bench"

            [capture]
            format = "png"

            [[profiles]]
            name = "bench"
            images_per_row = 2
            categories = [{ name = "Top", points = 1 }]
            "#,
        )
        .unwrap();

        let config = load_from(Some(&path)).unwrap();
        assert_eq!(config.active_profile, "bench");
        assert_eq!(config.capture.format, CaptureFormat::Png);

        let fallback = load_from(Some(&dir.path().join("absent.toml"))).unwrap();
        assert_eq!(fallback.active_profile, "socket");
    }
}
