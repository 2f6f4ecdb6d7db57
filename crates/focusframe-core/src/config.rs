use crate::capture::PixelLayout;
use crate::session::SessionConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Read(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_storage_dir")]
    pub storage_dir: PathBuf,
    #[serde(default = "default_format")]
    pub format: ImageFormat,
    #[serde(default = "default_period_ms")]
    pub period_ms: u64,
    #[serde(default)]
    pub layout: PixelLayout,
    #[serde(default = "default_stop_timeout_ms")]
    pub stop_timeout_ms: u64,
    #[serde(default)]
    pub copy_to_clipboard: bool,
}

/// Lossless containers a snapshot can be written as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Png,
    Webp,
}

impl std::fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImageFormat::Png => write!(f, "png"),
            ImageFormat::Webp => write!(f, "webp"),
        }
    }
}

impl std::str::FromStr for ImageFormat {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "png" => Ok(ImageFormat::Png),
            "webp" => Ok(ImageFormat::Webp),
            _ => Err(format!("unknown format: {s}. use: png, webp")),
        }
    }
}

impl ImageFormat {
    pub fn extension(&self) -> &str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Webp => "webp",
        }
    }

    pub fn to_image_format(self) -> image::ImageFormat {
        match self {
            ImageFormat::Png => image::ImageFormat::Png,
            ImageFormat::Webp => image::ImageFormat::WebP,
        }
    }
}

fn default_storage_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("Screenshots")
}

fn default_format() -> ImageFormat {
    ImageFormat::Png
}

fn default_period_ms() -> u64 {
    200
}

fn default_stop_timeout_ms() -> u64 {
    1000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage_dir: default_storage_dir(),
            format: default_format(),
            period_ms: default_period_ms(),
            layout: PixelLayout::default(),
            stop_timeout_ms: default_stop_timeout_ms(),
            copy_to_clipboard: false,
        }
    }
}

impl Config {
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join("focusframe")
            .join("config.toml")
    }

    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::config_path();
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(&path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        let path = Self::config_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;
        Ok(())
    }

    pub fn load_or_create() -> Result<Self, ConfigError> {
        let path = Self::config_path();
        if path.exists() {
            Self::load()
        } else {
            let config = Self::default();
            config.save()?;
            Ok(config)
        }
    }

    /// Session parameters. A zero period or stop timeout from a hand-edited
    /// file falls back to the default.
    pub fn session_config(&self) -> SessionConfig {
        let period = match self.period_ms {
            0 => default_period_ms(),
            ms => ms,
        };
        let stop_timeout = match self.stop_timeout_ms {
            0 => default_stop_timeout_ms(),
            ms => ms,
        };
        SessionConfig {
            period: Duration::from_millis(period),
            layout: self.layout,
            stop_timeout: Duration::from_millis(stop_timeout),
        }
    }

    pub fn set_value(&mut self, key: &str, value: &str) -> Result<(), String> {
        match key {
            "storage_dir" => self.storage_dir = PathBuf::from(value),
            "format" => self.format = value.parse()?,
            "layout" => self.layout = value.parse()?,
            "period_ms" => {
                let period: u64 = value
                    .parse()
                    .map_err(|_| format!("invalid period: {value}. use: milliseconds"))?;
                if period == 0 {
                    return Err("period_ms must be greater than 0".to_string());
                }
                self.period_ms = period;
            }
            "stop_timeout_ms" => {
                let timeout: u64 = value
                    .parse()
                    .map_err(|_| format!("invalid timeout: {value}. use: milliseconds"))?;
                if timeout == 0 {
                    return Err("stop_timeout_ms must be greater than 0".to_string());
                }
                self.stop_timeout_ms = timeout;
            }
            "copy_to_clipboard" => {
                self.copy_to_clipboard = value
                    .parse()
                    .map_err(|_| format!("invalid bool: {value}. use: true/false"))?;
            }
            _ => return Err(format!("unknown config key: {key}")),
        }
        Ok(())
    }

    pub fn display(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_else(|_| format!("{self:#?}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_keys_take_defaults() {
        let config: Config = toml::from_str("format = \"webp\"\n").unwrap();
        assert_eq!(config.format, ImageFormat::Webp);
        assert_eq!(config.period_ms, 200);
        assert_eq!(config.layout, PixelLayout::Rgb);
        assert_eq!(config.stop_timeout_ms, 1000);
        assert!(!config.copy_to_clipboard);
    }

    #[test]
    fn default_session_ticks_every_200ms() {
        let session = Config::default().session_config();
        assert_eq!(session.period, Duration::from_millis(200));
        assert_eq!(session, SessionConfig::default());
    }

    #[test]
    fn zero_period_in_file_falls_back() {
        let config: Config = toml::from_str("period_ms = 0\n").unwrap();
        assert_eq!(config.session_config().period, Duration::from_millis(200));
    }

    #[test]
    fn zero_stop_timeout_is_refused() {
        let mut config = Config::default();
        assert!(config.set_value("stop_timeout_ms", "0").is_err());
        assert_eq!(config.stop_timeout_ms, 1000);
        config.set_value("stop_timeout_ms", "250").unwrap();
        assert_eq!(config.session_config().stop_timeout, Duration::from_millis(250));

        let config: Config = toml::from_str("stop_timeout_ms = 0\n").unwrap();
        assert_eq!(config.session_config().stop_timeout, Duration::from_secs(1));
    }

    #[test]
    fn set_value_validates() {
        let mut config = Config::default();
        config.set_value("period_ms", "50").unwrap();
        config.set_value("layout", "rgba").unwrap();
        config.set_value("format", "WEBP").unwrap();
        config.set_value("copy_to_clipboard", "true").unwrap();
        assert_eq!(config.period_ms, 50);
        assert_eq!(config.layout, PixelLayout::Rgba);
        assert_eq!(config.format, ImageFormat::Webp);
        assert!(config.copy_to_clipboard);

        assert!(config.set_value("period_ms", "0").is_err());
        assert!(config.set_value("format", "jpeg").is_err());
        assert!(config.set_value("quality", "90").is_err());
        assert_eq!(config.period_ms, 50);
    }

    #[test]
    fn serializes_back_to_toml() {
        let mut config = Config::default();
        config.layout = PixelLayout::Rgba;
        let text = config.display();
        assert!(text.contains("layout = \"rgba\""));
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }
}
