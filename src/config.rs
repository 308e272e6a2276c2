use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::OverlayError;
use crate::standings::SESSION_THROTTLE;
use crate::telemetry::collector::REFRESH_RATE_MS;

const CONFIG_DIR_NAME: &str = "overlay-telemetry";
const CONFIG_FILE_NAME: &str = "config.json";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// Throttle window for the session lap count view
    pub session_throttle_ms: u64,
    /// Delay between replayed records
    pub replay_rate_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            session_throttle_ms: SESSION_THROTTLE.as_millis() as u64,
            replay_rate_ms: REFRESH_RATE_MS,
        }
    }
}

impl AppConfig {
    pub fn default_path() -> Result<PathBuf, OverlayError> {
        Ok(dirs::config_dir()
            .ok_or(OverlayError::NoConfigDir)?
            .join(CONFIG_DIR_NAME)
            .join(CONFIG_FILE_NAME))
    }

    /// Loads the config from the user's config directory, `None` if it was never saved.
    pub fn from_local_file() -> Result<Option<Self>, OverlayError> {
        Self::from_file(&Self::default_path()?)
    }

    pub fn from_file(config_path: &Path) -> Result<Option<Self>, OverlayError> {
        if !config_path.exists() {
            return Ok(None);
        }
        let file = std::fs::File::open(config_path)
            .map_err(|e| OverlayError::ConfigIOError { source: e })?;
        let config = serde_json::from_reader(file)
            .map_err(|e| OverlayError::ConfigSerializeError { source: e })?;
        Ok(Some(config))
    }

    pub fn save(&self) -> Result<(), OverlayError> {
        self.save_to(&Self::default_path()?)
    }

    pub fn save_to(&self, config_path: &Path) -> Result<(), OverlayError> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| OverlayError::ConfigIOError { source: e })?;
        }

        let file = std::fs::File::create(config_path)
            .map_err(|e| OverlayError::ConfigIOError { source: e })?;
        serde_json::to_writer_pretty(file, self)
            .map_err(|e| OverlayError::ConfigSerializeError { source: e })
    }

    /// Command line values win over the ones loaded from file.
    pub fn with_overrides(
        mut self,
        replay_rate_ms: Option<u64>,
        session_throttle_ms: Option<u64>,
    ) -> Self {
        if let Some(replay_rate_ms) = replay_rate_ms {
            self.replay_rate_ms = replay_rate_ms;
        }
        if let Some(session_throttle_ms) = session_throttle_ms {
            self.session_throttle_ms = session_throttle_ms;
        }
        self
    }

    pub fn session_throttle(&self) -> Duration {
        Duration::from_millis(self.session_throttle_ms)
    }

    pub fn replay_rate(&self) -> Duration {
        Duration::from_millis(self.replay_rate_ms)
    }
}
