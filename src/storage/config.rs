use chrono::NaiveTime;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

use crate::app::ViewType;
use crate::calendar::{RecurringBlock, TimeSlots};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),
    #[error("Invalid time slots: {0}")]
    InvalidTimeSlots(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub api: ApiConfig,
    pub slots: SlotsConfig,
    pub blocking: BlockingConfig,
    pub ui: UiConfig,
    #[serde(default)]
    pub recurring: Vec<RecurringBlock>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiConfig {
    pub base_url: String,
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SlotsConfig {
    pub times: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BlockingConfig {
    pub default_reason: Option<String>,
    pub recurrence_horizon_months: u32,
    pub offline_mode: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UiConfig {
    pub default_view: ViewType,
}

impl Config {
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_or_create() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            Self::from_toml(&content)
        } else {
            let config = Self::default();
            config.save_to(&config_path)?;
            Ok(config)
        }
    }

    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("slot-blocker")
    }

    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    pub fn save_to(&self, config_path: &std::path::Path) -> Result<(), ConfigError> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(config_path, content)?;

        Ok(())
    }

    /// Slot times must be `HH:MM` clock times in strictly ascending order.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let times = &self.slots.times;
        if times.is_empty() {
            return Err(ConfigError::InvalidTimeSlots("no time slots configured".to_string()));
        }

        let pattern = Regex::new(r"^\d{2}:\d{2}$")
            .map_err(|e| ConfigError::InvalidTimeSlots(e.to_string()))?;

        let mut previous: Option<NaiveTime> = None;
        for time in times {
            if !pattern.is_match(time) {
                return Err(ConfigError::InvalidTimeSlots(format!("'{}' is not HH:MM", time)));
            }
            let parsed = NaiveTime::parse_from_str(time, "%H:%M")
                .map_err(|_| ConfigError::InvalidTimeSlots(format!("'{}' is not a clock time", time)))?;
            if previous.is_some_and(|p| p >= parsed) {
                return Err(ConfigError::InvalidTimeSlots(format!("'{}' is out of order", time)));
            }
            previous = Some(parsed);
        }
        Ok(())
    }

    pub fn time_slots(&self) -> TimeSlots {
        TimeSlots::new(self.slots.times.clone())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiConfig {
                base_url: "http://localhost:3000/api/admin".to_string(),
                token: None,
            },
            slots: SlotsConfig {
                times: TimeSlots::default().as_slice().to_vec(),
            },
            blocking: BlockingConfig {
                default_reason: Some("Indisponible".to_string()),
                recurrence_horizon_months: 3,
                offline_mode: false,
            },
            ui: UiConfig {
                default_view: ViewType::Week,
            },
            recurring: Vec::new(),
        }
    }
}
