use crate::prelude::*;

use serde::Deserialize;

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    pub mqtt: Mqtt,

    #[serde(default)]
    pub magnum: Magnum,

    #[serde(default)]
    pub midnite: Midnite,

    /// Seconds between polling cycles.
    #[serde(default = "Config::default_interval")]
    pub interval: u64,

    /// Publish a reading even when its payload is identical to the previous
    /// cycle's.
    #[serde(default)]
    pub allow_duplicates: bool,

    #[serde(default = "Config::default_loglevel")]
    pub loglevel: String,
}

// Mqtt {{{
#[derive(Clone, Debug, Deserialize)]
pub struct Mqtt {
    #[serde(default = "Config::default_enabled")]
    pub enabled: bool,

    pub host: String,
    #[serde(default = "Config::default_mqtt_port")]
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,

    #[serde(default = "Config::default_mqtt_namespace")]
    pub namespace: String,

    #[serde(default = "Config::default_mqtt_client_id")]
    pub client_id: String,
}
impl Mqtt {
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }
} // }}}

// Magnum {{{
#[derive(Clone, Debug, Deserialize)]
pub struct Magnum {
    #[serde(default = "Config::default_enabled")]
    pub enabled: bool,

    /// Serial device the Magnum network hangs off.
    #[serde(default = "Config::default_magnum_device")]
    pub device: String,

    /// Packets to accumulate per polling cycle.
    #[serde(default = "Config::default_magnum_packets")]
    pub packets: usize,

    /// Per-read silence gap in milliseconds; an expired read flushes the
    /// current packet. The wire has no delimiters, so this is the only
    /// boundary signal and is deliberately tunable.
    #[serde(default = "Config::default_magnum_timeout_ms")]
    pub timeout_ms: u64,

    /// Attempt to re-join packets that were split across a silence gap.
    #[serde(default = "Config::default_true")]
    pub clean_packets: bool,

    /// Store raw packet hex in each device record, keyed by packet type.
    #[serde(default)]
    pub trace: bool,
}

impl Default for Magnum {
    fn default() -> Self {
        Self {
            enabled: true,
            device: Config::default_magnum_device(),
            packets: Config::default_magnum_packets(),
            timeout_ms: Config::default_magnum_timeout_ms(),
            clean_packets: true,
            trace: false,
        }
    }
} // }}}

// Midnite {{{
#[derive(Clone, Debug, Deserialize)]
pub struct Midnite {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "Config::default_midnite_host")]
    pub host: String,

    #[serde(default = "Config::default_midnite_port")]
    pub port: u16,

    /// Modbus unit id of the Classic.
    #[serde(default = "Config::default_midnite_unit")]
    pub unit: u8,
}

impl Default for Midnite {
    fn default() -> Self {
        Self {
            enabled: false,
            host: Config::default_midnite_host(),
            port: Config::default_midnite_port(),
            unit: Config::default_midnite_unit(),
        }
    }
} // }}}

impl Config {
    pub fn new(file: String) -> Result<Self> {
        let content = std::fs::read_to_string(&file)
            .map_err(|err| anyhow!("error reading {}: {}", file, err))?;

        let config: Self = serde_yaml::from_str(&content)?;

        Ok(config)
    }

    pub fn loglevel(&self) -> String {
        self.loglevel.clone()
    }

    fn default_enabled() -> bool {
        true
    }
    fn default_true() -> bool {
        true
    }
    fn default_interval() -> u64 {
        60
    }
    fn default_loglevel() -> String {
        "info".to_string()
    }
    fn default_mqtt_port() -> u16 {
        1883
    }
    fn default_mqtt_namespace() -> String {
        "powerpi".to_string()
    }
    fn default_mqtt_client_id() -> String {
        "powerpi-client".to_string()
    }
    fn default_magnum_device() -> String {
        "/dev/ttyUSB0".to_string()
    }
    fn default_magnum_packets() -> usize {
        50
    }
    fn default_magnum_timeout_ms() -> u64 {
        1
    }
    fn default_midnite_host() -> String {
        "localhost".to_string()
    }
    fn default_midnite_port() -> u16 {
        502
    }
    fn default_midnite_unit() -> u8 {
        10
    }
}
