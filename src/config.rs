//! Startup configuration loaded once from a JSON file.
//!
//! Every field carries a default, so a partial file only overrides the
//! sections it names and a missing file yields a fully-defaulted config.

use crate::input::PadButton;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Deserialize, Serialize, Clone, Debug, Default)]
#[serde(default)]
pub struct Config {
    pub serial: SerialCfg,
    pub gamepad: GamepadCfg,
    pub tx: TxCfg,
    pub protocol: ProtocolCfg,
    pub modes: ModeCfg,
    pub ws: WsCfg,
    pub video: VideoCfg,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(default)]
pub struct SerialCfg {
    pub port: String,
    pub baud: u32,
}

impl Default for SerialCfg {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            baud: 9600,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(default)]
pub struct GamepadCfg {
    pub dead_zone: f32,
    pub invert_v: bool,
    pub invert_w: bool,
}

impl Default for GamepadCfg {
    fn default() -> Self {
        Self {
            dead_zone: 0.05,
            invert_v: false,
            invert_w: false,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(default)]
pub struct TxCfg {
    pub max_rate_hz: f64,
    pub hb_timeout_sec: f64,
}

impl Default for TxCfg {
    fn default() -> Self {
        Self {
            max_rate_hz: 10.0,
            hb_timeout_sec: 15.0,
        }
    }
}

/// Literal lines the remote peer sends on the serial link.
#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(default)]
pub struct ProtocolCfg {
    pub hb_msg: String,
    pub timeout_msg: String,
    pub timeout_clear_msg: String,
}

impl Default for ProtocolCfg {
    fn default() -> Self {
        Self {
            hb_msg: "READY".to_string(),
            timeout_msg: "TIMEOUT".to_string(),
            timeout_clear_msg: "TIMEOUT_CLEAR".to_string(),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(default)]
pub struct ModeCfg {
    pub start_sleep: bool,
    pub combo_hold_sec: f64,
    /// Velocity scale while Speed+ is off.
    pub speed_default_scale: f32,
    /// Velocity scale while Speed+ is on.
    pub speed_plus_scale: f32,
    pub sleep_combo: [PadButton; 2],
    pub speed_combo: [PadButton; 2],
}

impl Default for ModeCfg {
    fn default() -> Self {
        Self {
            start_sleep: true,
            combo_hold_sec: 3.0,
            speed_default_scale: 0.70,
            speed_plus_scale: 1.00,
            sleep_combo: [PadButton::Select, PadButton::Start],
            speed_combo: [PadButton::LeftBumper, PadButton::RightBumper],
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(default)]
pub struct WsCfg {
    pub host: String,
    pub port: u16,
    pub publish_hz: f64,
}

impl Default for WsCfg {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            publish_hz: 2.0,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(default)]
pub struct VideoCfg {
    pub camera_index: u32,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl Default for VideoCfg {
    fn default() -> Self {
        Self {
            camera_index: 0,
            width: 640,
            height: 480,
            fps: 30,
        }
    }
}

impl Config {
    /// Load configuration from `path`, falling back to defaults when the
    /// file does not exist. A present-but-malformed file is a hard error.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            warn!("Config file {} not found, using defaults", path.display());
            return Ok(Self::default());
        }

        let raw = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&raw)?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }
}
