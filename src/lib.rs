pub mod capture;
pub mod error;
pub mod utils;

use std::path::Path;

use capture::{FieldOrder, FormatSpec, PixelFormat};
use serde::{Deserialize, Serialize};

pub use error::{CaptureError, Stage};

/// Environment variables starting with this override the configuration,
/// e.g. `QUICKCAP__CAPTURE__WIDTH=640`.
pub const ENV_PREFIX: &str = "QUICKCAP";

/// Optional configuration file, looked up in the working directory.
pub const CONFIG_FILE: &str = "quickcap.toml";

/// System configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    pub capture: CaptureConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Device node; empty means auto-detect.
    pub device: String,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub field: FieldOrder,
    pub buffer_count: u32,
}

impl CaptureConfig {
    /// The format to request from the driver.
    pub fn format_spec(&self) -> FormatSpec {
        FormatSpec {
            width: self.width,
            height: self.height,
            pixel_format: self.format,
            field_order: self.field,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            capture: CaptureConfig {
                device: "/dev/video0".into(),
                width: 320,
                height: 240,
                format: PixelFormat::Mjpeg,
                field: FieldOrder::Progressive,
                buffer_count: 1,
            },
        }
    }
}

impl Config {
    /// Defaults, overlaid with `quickcap.toml` if present and then the
    /// environment.
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_from(CONFIG_FILE)
    }

    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::Config::try_from(&Self::default())?)
            .add_source(config::File::from(path.as_ref()).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}
