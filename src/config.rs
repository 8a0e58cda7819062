use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub device: DeviceConfig,
    #[serde(default)]
    pub poll: PollConfig,
    pub mqtt: MqttConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Host or host:port of the meter on the local network.
    #[serde(default = "default_device_addr")]
    pub addr: String,
}

fn default_device_addr() -> String {
    "192.168.33.1".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    /// Minutes between update cycles.
    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: u64,
}

fn default_interval_minutes() -> u64 {
    5
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_minutes: default_interval_minutes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttConfig {
    pub host: String,
    #[serde(default = "default_mqtt_port")]
    pub port: u16,
    #[serde(default = "default_client_id")]
    pub client_id: String,
    pub topic: String,
    #[serde(default = "default_qos")]
    pub qos: u8,
    pub username: Option<String>,
    pub password: Option<String>,
    pub keep_alive_secs: Option<u64>,
}

fn default_mqtt_port() -> u16 {
    1883
}

fn default_client_id() -> String {
    "shelly-em-rollup".into()
}

fn default_qos() -> u8 {
    1
}

impl Config {
    /// Load YAML from disk, then apply env overrides: SHELLY_DEVICE_ADDR
    /// replaces `device.addr` and MQTT_HOST replaces `mqtt.host`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, anyhow::Error> {
        let raw = fs::read_to_string(path)?;
        let mut cfg: Self = serde_yaml::from_str(&raw)?;

        if let Ok(addr) = std::env::var("SHELLY_DEVICE_ADDR") {
            cfg.device.addr = addr;
        }
        if let Ok(host) = std::env::var("MQTT_HOST") {
            cfg.mqtt.host = host;
        }

        anyhow::ensure!(
            !cfg.device.addr.trim().is_empty(),
            "config must set a device address"
        );
        anyhow::ensure!(
            !cfg.mqtt.topic.trim().is_empty(),
            "config must set an mqtt topic"
        );
        anyhow::ensure!(
            cfg.poll.interval_minutes > 0,
            "poll interval must be at least one minute"
        );
        Ok(cfg)
    }
}
