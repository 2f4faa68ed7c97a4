use std::io::Write;

use powerpi_bridge::prelude::*;

fn write_config(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

fn load(content: &str) -> Result<Config> {
    let file = write_config(content);
    Config::new(file.path().to_string_lossy().to_string())
}

#[test]
fn minimal_config_gets_defaults() {
    let config = load(
        r#"
mqtt:
  host: broker.local
"#,
    )
    .unwrap();

    assert!(config.mqtt.enabled());
    assert_eq!(config.mqtt.host(), "broker.local");
    assert_eq!(config.mqtt.port(), 1883);
    assert_eq!(config.mqtt.namespace(), "powerpi");
    assert_eq!(config.interval, 60);
    assert!(!config.allow_duplicates);
    assert_eq!(config.loglevel(), "info");

    assert!(config.magnum.enabled);
    assert_eq!(config.magnum.device, "/dev/ttyUSB0");
    assert_eq!(config.magnum.packets, 50);
    assert_eq!(config.magnum.timeout_ms, 1);
    assert!(config.magnum.clean_packets);
    assert!(!config.magnum.trace);

    assert!(!config.midnite.enabled);
    assert_eq!(config.midnite.host, "localhost");
    assert_eq!(config.midnite.port, 502);
    assert_eq!(config.midnite.unit, 10);
}

#[test]
fn full_config_overrides_defaults() {
    let config = load(
        r#"
mqtt:
  enabled: true
  host: 192.168.1.10
  port: 8883
  username: power
  password: secret
  namespace: energy
  client_id: bridge-1

magnum:
  enabled: false
  device: /dev/ttyUSB1
  packets: 100
  timeout_ms: 5
  clean_packets: false
  trace: true

midnite:
  enabled: true
  host: classic.local
  port: 1502
  unit: 5

interval: 30
allow_duplicates: true
loglevel: debug
"#,
    )
    .unwrap();

    assert_eq!(config.mqtt.port(), 8883);
    assert_eq!(config.mqtt.username.as_deref(), Some("power"));
    assert_eq!(config.mqtt.namespace(), "energy");

    assert!(!config.magnum.enabled);
    assert_eq!(config.magnum.device, "/dev/ttyUSB1");
    assert_eq!(config.magnum.packets, 100);
    assert_eq!(config.magnum.timeout_ms, 5);
    assert!(!config.magnum.clean_packets);
    assert!(config.magnum.trace);

    assert!(config.midnite.enabled);
    assert_eq!(config.midnite.host, "classic.local");
    assert_eq!(config.midnite.unit, 5);

    assert_eq!(config.interval, 30);
    assert!(config.allow_duplicates);
    assert_eq!(config.loglevel(), "debug");
}

#[test]
fn missing_mqtt_section_is_an_error() {
    assert!(load("interval: 10\n").is_err());
}

#[test]
fn missing_file_is_an_error() {
    assert!(Config::new("/nonexistent/config.yaml".to_string()).is_err());
}
