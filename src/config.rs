use crate::mute_manager::capabilities::{CapabilityParseError, VersionConstraint};
use crate::mute_manager::event_hub::DEFAULT_EVENT_BUS_CAPACITY;
use config::{Config, Environment, File, FileFormat};
use dotenv::dotenv;
use serde::Deserialize;
use std::error::Error;
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "tagmute";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_FILTERS_MIN_VERSION: &str = ">=1.0.0";
pub const DEFAULT_SERVER_API: &str = "v2";
pub const DEFAULT_HASHTAG: &str = "rust";

#[derive(Clone, Debug, Deserialize)]
pub struct CapabilityEntry {
    pub operation: String,
    pub version: String,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct SimulatorConfig {
    // Filter API the in-memory server implements ("v2", "v1" or "both")
    pub server_api: Option<String>,
    // Hashtag shown by the simulated timeline, without the leading `#`
    pub hashtag: Option<String>,
    // Capabilities the server advertises
    #[serde(default)]
    pub capabilities: Vec<CapabilityEntry>,
}

impl SimulatorConfig {
    pub fn server_api(&self) -> String {
        self.server_api
            .as_ref()
            .map(|c| c.to_owned())
            .unwrap_or(DEFAULT_SERVER_API.to_owned())
    }

    pub fn hashtag(&self) -> String {
        self.hashtag
            .as_ref()
            .map(|c| c.to_owned())
            .unwrap_or(DEFAULT_HASHTAG.to_owned())
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct TagMuteConfig {
    /// Seconds to wait for each filter API request
    pub request_timeout_secs: Option<u64>,
    /// Buffered events per subscriber on the event hub
    pub event_bus_capacity: Option<usize>,
    /// Delete the keywordless filter left behind by a half-applied mute
    #[serde(default)]
    pub cleanup_partial_mute: bool,
    /// Version constraint the filter capabilities must satisfy
    pub filters_min_version: Option<String>,

    #[serde(default)]
    pub simulator: SimulatorConfig,
}

impl TagMuteConfig {
    /// Reads `tagmute.toml` (optional) and `TAGMUTE__*` environment variables, after loading `.env`
    pub fn load_env() -> Result<TagMuteConfig, Box<dyn Error>> {
        dotenv().ok();
        let config = Config::builder()
            .add_source(File::with_name(DEFAULT_CONFIG_FILE).required(false))
            .add_source(Environment::with_prefix("TAGMUTE").separator("__"))
            .build()?;

        Ok(config.try_deserialize()?)
    }

    pub fn from_toml_str(contents: &str) -> Result<TagMuteConfig, Box<dyn Error>> {
        let config = Config::builder()
            .add_source(File::from_str(contents, FileFormat::Toml))
            .build()?;

        Ok(config.try_deserialize()?)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(
            self.request_timeout_secs
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
        )
    }

    pub fn event_bus_capacity(&self) -> usize {
        self.event_bus_capacity
            .unwrap_or(DEFAULT_EVENT_BUS_CAPACITY)
    }

    pub fn filters_constraint(&self) -> Result<VersionConstraint, CapabilityParseError> {
        self.filters_min_version
            .as_deref()
            .unwrap_or(DEFAULT_FILTERS_MIN_VERSION)
            .parse()
    }
}
