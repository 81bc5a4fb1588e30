// Application settings loaded from config/dashboard.toml and the environment
use crate::application::entry_fetcher::DEFAULT_MAX_PAGES;
use crate::domain::classifier::{MonitorClassifier, VisibilityConfig, DEFAULT_DISPLAY_FIELD};
use crate::domain::color::{BlendMode, ColorBand, ColorScale};
use anyhow::Context;
use serde::Deserialize;
use std::net::SocketAddr;
use std::time::Duration;

const ENV_PREFIX: &str = "SJVAIR";

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Settings {
    pub api: ApiSettings,
    pub display: DisplaySettings,
    pub visibility: VisibilityConfig,
    pub server: ServerSettings,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ApiSettings {
    pub base_url: String,
    pub request_timeout_secs: u64,
    pub max_pages: u32,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: "https://www.sjvair.com/api/1.0/".to_string(),
            request_timeout_secs: 30,
            max_pages: DEFAULT_MAX_PAGES,
        }
    }
}

impl ApiSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DisplaySettings {
    pub field: String,
    pub blend: BlendMode,
    /// Replaces the PM2.5 bands when set.
    pub bands: Option<Vec<ColorBand>>,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            field: DEFAULT_DISPLAY_FIELD.to_string(),
            blend: BlendMode::default(),
            bands: None,
        }
    }
}

impl DisplaySettings {
    pub fn classifier(&self) -> anyhow::Result<MonitorClassifier> {
        let scale = match &self.bands {
            Some(bands) => ColorScale::new(bands.clone()).context("Invalid [display] bands")?,
            None => ColorScale::pm25(),
        };
        Ok(MonitorClassifier::new(scale, self.blend, self.field.clone()))
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerSettings {
    pub bind: SocketAddr,
    pub refresh_interval_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 8080)),
            refresh_interval_secs: 120,
        }
    }
}

impl ServerSettings {
    /// `None` disables the periodic monitor refresh.
    pub fn refresh_interval(&self) -> Option<Duration> {
        (self.refresh_interval_secs > 0).then(|| Duration::from_secs(self.refresh_interval_secs))
    }
}

pub fn load_settings() -> anyhow::Result<Settings> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("config/dashboard").required(false))
        .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
        .build()
        .context("Failed to read settings")?;

    settings.try_deserialize().context("Failed to parse settings")
}
