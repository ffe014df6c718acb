use std::fs;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tokio::time::Duration;

use crate::coordinator::DeviceIdentity;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub device: DeviceSettings,
    #[serde(default)]
    pub poll: PollSettings,
    #[serde(default)]
    pub log: LogSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceSettings {
    pub address: String,
    #[serde(default)]
    pub channel_id: u32,
    #[serde(default)]
    pub model: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollSettings {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_scan_timeout_secs")]
    pub scan_timeout_secs: u64,
    /// Quiet period that ends a multi-notification response.
    #[serde(default = "default_notification_timeout_secs")]
    pub notification_timeout_secs: u64,
    /// Consecutive failed cycles before the device is reported unavailable.
    #[serde(default = "default_unavailable_after")]
    pub unavailable_after: u32,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            scan_timeout_secs: default_scan_timeout_secs(),
            notification_timeout_secs: default_notification_timeout_secs(),
            unavailable_after: default_unavailable_after(),
        }
    }
}

impl PollSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn scan_timeout(&self) -> Duration {
        Duration::from_secs(self.scan_timeout_secs)
    }

    pub fn notification_timeout(&self) -> Duration {
        Duration::from_secs(self.notification_timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogSettings {
    #[serde(default = "default_level")]
    pub level: String, // "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_true")]
    pub ansi: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_level(),
            ansi: default_true(),
        }
    }
}

fn default_interval_secs() -> u64 {
    60
}
fn default_scan_timeout_secs() -> u64 {
    10
}
fn default_notification_timeout_secs() -> u64 {
    5
}
fn default_unavailable_after() -> u32 {
    1
}
fn default_level() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}

impl Settings {
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read settings from {}", path.display()))?;
        Self::from_toml(&content).with_context(|| format!("invalid settings in {}", path.display()))
    }

    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        let settings: Settings = toml::from_str(content)?;
        if settings.device.address.trim().is_empty() {
            anyhow::bail!("device.address must not be empty");
        }
        if settings.poll.interval_secs == 0 {
            anyhow::bail!("poll.interval_secs must be at least 1");
        }
        Ok(settings)
    }

    pub fn identity(&self) -> DeviceIdentity {
        DeviceIdentity {
            address: self.device.address.clone(),
            channel_id: self.device.channel_id,
            model: self.device.model.clone(),
        }
    }
}
