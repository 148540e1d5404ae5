//! Configuration for the Modbus light bridge.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use modbus_light_engine::transport::{ModbusTransport, SerialSettings, TransportEndpoint};
use modbus_light_engine::{
    ActuatorDescriptor, DEFAULT_COMMAND_OFF, DEFAULT_COMMAND_ON, Link, LinkOptions,
};
use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, Result};
use crate::payload::Format;

/// Complete bridge configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LightBridgeConfig {
    /// Zenoh connection settings
    #[serde(default)]
    pub zenoh: ZenohConfig,

    /// Payload format for published light states
    #[serde(default)]
    pub serialization: Format,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Modbus-specific settings
    pub modbus: ModbusLightConfig,
}

/// Zenoh connection configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZenohConfig {
    /// Zenoh mode: "client", "peer", or "router".
    #[serde(default = "default_mode")]
    pub mode: String,

    /// Endpoints to connect to (for client mode).
    #[serde(default)]
    pub connect: Vec<String>,

    /// Endpoints to listen on (for peer/router mode).
    #[serde(default)]
    pub listen: Vec<String>,
}

fn default_mode() -> String {
    "peer".to_string()
}

impl Default for ZenohConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            connect: Vec::new(),
            listen: Vec::new(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text format (default).
    #[default]
    Text,
    /// Structured JSON format.
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log output format: "text" or "json"
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Modbus hubs and the lights attached to them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModbusLightConfig {
    /// Key expression prefix (default: "zensight/modbus_light")
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// JSON file remembering the last state of every light
    #[serde(default)]
    pub state_file: Option<PathBuf>,

    /// Modbus connections
    pub hubs: Vec<HubConfig>,

    /// Lights to expose
    pub lights: Vec<LightConfig>,
}

fn default_key_prefix() -> String {
    "zensight/modbus_light".to_string()
}

/// One Modbus connection shared by several lights.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubConfig {
    /// Hub name (referenced by lights)
    pub name: String,

    /// Connection type and address
    pub connection: ConnectionConfig,

    /// Per-request timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Consecutive failures before the hub is marked degraded
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Seconds between reconnect attempts while degraded
    #[serde(default = "default_reconnect_interval")]
    pub reconnect_interval_secs: u64,
}

fn default_timeout_ms() -> u64 {
    1000
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_reconnect_interval() -> u64 {
    30
}

/// Connection configuration (TCP or RTU).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ConnectionConfig {
    /// Modbus TCP connection
    Tcp {
        /// Host IP address
        host: String,
        /// TCP port (default: 502)
        #[serde(default = "default_modbus_port")]
        port: u16,
    },
    /// Modbus RTU (serial) connection
    Rtu {
        /// Serial port path (e.g., "/dev/ttyUSB0" or "COM1")
        port: String,
        /// Baud rate (default: 9600)
        #[serde(default = "default_baud_rate")]
        baud_rate: u32,
        /// Data bits (default: 8)
        #[serde(default = "default_data_bits")]
        data_bits: u8,
        /// Parity: "none", "even", or "odd" (default: "none")
        #[serde(default = "default_parity")]
        parity: String,
        /// Stop bits: 1 or 2 (default: 1)
        #[serde(default = "default_stop_bits")]
        stop_bits: u8,
    },
}

fn default_modbus_port() -> u16 {
    502
}

fn default_baud_rate() -> u32 {
    9600
}

fn default_data_bits() -> u8 {
    8
}

fn default_parity() -> String {
    "none".to_string()
}

fn default_stop_bits() -> u8 {
    1
}

/// A light backed by a coil or a holding register.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LightConfig {
    /// Light name (used in key expressions)
    pub name: String,

    /// Hub name; may be omitted when exactly one hub is configured
    #[serde(default)]
    pub hub: Option<String>,

    /// Modbus unit/slave ID (1-247)
    #[serde(default = "default_slave")]
    pub slave: u8,

    /// Coil address
    #[serde(default)]
    pub coil: Option<u16>,

    /// Holding register address
    #[serde(default)]
    pub register: Option<u16>,

    /// Poll interval in seconds
    #[serde(default = "default_scan_interval")]
    pub scan_interval: u64,

    /// Value written to turn a register light on
    #[serde(default)]
    pub command_on: Option<u16>,

    /// Value written to turn a register light off
    #[serde(default)]
    pub command_off: Option<u16>,

    /// Register to read state from instead of `register`
    #[serde(default)]
    pub verify_register: Option<u16>,
}

fn default_slave() -> u8 {
    1
}

fn default_scan_interval() -> u64 {
    10
}

impl LightBridgeConfig {
    /// Load configuration from a JSON5 file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            BridgeError::config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::parse(&content)
    }

    /// Parse and validate configuration from a JSON5 string.
    pub fn parse(content: &str) -> Result<Self> {
        let config: LightBridgeConfig = json5::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        let modbus = &self.modbus;

        if modbus.hubs.is_empty() {
            return Err(BridgeError::validation("At least one hub must be configured"));
        }
        if modbus.lights.is_empty() {
            return Err(BridgeError::validation("At least one light must be configured"));
        }

        let mut hub_names = HashSet::new();
        for hub in &modbus.hubs {
            if hub.name.is_empty() {
                return Err(BridgeError::validation("Hub name cannot be empty"));
            }
            if !hub_names.insert(hub.name.as_str()) {
                return Err(BridgeError::validation(format!(
                    "Duplicate hub name '{}'",
                    hub.name
                )));
            }
            if hub.timeout_ms == 0 {
                return Err(BridgeError::validation(format!(
                    "Hub '{}': timeout_ms must be greater than 0",
                    hub.name
                )));
            }
            if hub.failure_threshold == 0 {
                return Err(BridgeError::validation(format!(
                    "Hub '{}': failure_threshold must be greater than 0",
                    hub.name
                )));
            }
            if hub.reconnect_interval_secs == 0 {
                return Err(BridgeError::validation(format!(
                    "Hub '{}': reconnect_interval_secs must be greater than 0",
                    hub.name
                )));
            }
            hub.endpoint()?;
        }

        let mut light_names = HashSet::new();
        for light in &modbus.lights {
            if light.name.is_empty() {
                return Err(BridgeError::validation("Light name cannot be empty"));
            }
            if light.name.contains(['/', '*', '$', '?', '#', '@']) {
                return Err(BridgeError::validation(format!(
                    "Light '{}': name cannot contain key expression characters",
                    light.name
                )));
            }
            if !light_names.insert(light.name.as_str()) {
                return Err(BridgeError::validation(format!(
                    "Duplicate light name '{}'",
                    light.name
                )));
            }

            match (light.coil, light.register) {
                (Some(_), Some(_)) => {
                    return Err(BridgeError::validation(format!(
                        "Light '{}': specify either coil or register, not both",
                        light.name
                    )));
                }
                (None, None) => {
                    return Err(BridgeError::validation(format!(
                        "Light '{}': must specify either coil or register",
                        light.name
                    )));
                }
                (Some(_), None) => {
                    if light.command_on.is_some()
                        || light.command_off.is_some()
                        || light.verify_register.is_some()
                    {
                        return Err(BridgeError::validation(format!(
                            "Light '{}': command_on, command_off and verify_register require a register",
                            light.name
                        )));
                    }
                }
                (None, Some(_)) => {}
            }

            if light.slave == 0 || light.slave > 247 {
                return Err(BridgeError::validation(format!(
                    "Light '{}': slave must be 1-247",
                    light.name
                )));
            }
            if light.scan_interval == 0 {
                return Err(BridgeError::validation(format!(
                    "Light '{}': scan_interval must be greater than 0",
                    light.name
                )));
            }

            self.hub_for(light)?;
        }

        Ok(())
    }

    /// Resolve the hub a light is attached to.
    pub fn hub_for(&self, light: &LightConfig) -> Result<&HubConfig> {
        let hubs = &self.modbus.hubs;
        match &light.hub {
            Some(name) => hubs.iter().find(|h| &h.name == name).ok_or_else(|| {
                BridgeError::validation(format!(
                    "Light '{}': unknown hub '{}'",
                    light.name, name
                ))
            }),
            None if hubs.len() == 1 => Ok(&hubs[0]),
            None => Err(BridgeError::validation(format!(
                "Light '{}': hub is required when several hubs are configured",
                light.name
            ))),
        }
    }

    /// Build one engine descriptor per configured light.
    pub fn to_descriptors(&self) -> Result<Vec<ActuatorDescriptor>> {
        self.modbus
            .lights
            .iter()
            .map(|light| {
                let hub = self.hub_for(light)?;
                let interval = Duration::from_secs(light.scan_interval);

                let descriptor = match (light.coil, light.register) {
                    (Some(address), None) => ActuatorDescriptor::coil(
                        &light.name,
                        &hub.name,
                        light.slave,
                        address,
                        interval,
                    ),
                    (None, Some(address)) => {
                        let descriptor = ActuatorDescriptor::holding_register(
                            &light.name,
                            &hub.name,
                            light.slave,
                            address,
                            light.command_on.unwrap_or(DEFAULT_COMMAND_ON),
                            light.command_off.unwrap_or(DEFAULT_COMMAND_OFF),
                            interval,
                        );
                        match light.verify_register {
                            Some(verify) => descriptor.with_verify_address(verify),
                            None => descriptor,
                        }
                    }
                    _ => {
                        return Err(BridgeError::validation(format!(
                            "Light '{}': must specify exactly one of coil or register",
                            light.name
                        )));
                    }
                };
                Ok(descriptor)
            })
            .collect()
    }

    /// Open one Modbus link per hub. Connections are established lazily.
    pub fn build_links(&self) -> Result<Vec<Arc<Link>>> {
        self.modbus
            .hubs
            .iter()
            .map(|hub| {
                let transport = ModbusTransport::new(hub.endpoint()?);
                Ok(Arc::new(Link::new(&hub.name, transport, hub.link_options())))
            })
            .collect()
    }
}

impl HubConfig {
    /// Link tunables for this hub.
    pub fn link_options(&self) -> LinkOptions {
        LinkOptions {
            timeout: Duration::from_millis(self.timeout_ms),
            failure_threshold: self.failure_threshold,
        }
    }

    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_secs(self.reconnect_interval_secs)
    }

    /// Resolve the connection settings into a transport endpoint.
    pub fn endpoint(&self) -> Result<TransportEndpoint> {
        match &self.connection {
            ConnectionConfig::Tcp { host, port } => {
                let addr: SocketAddr = format!("{}:{}", host, port).parse().map_err(|e| {
                    BridgeError::validation(format!(
                        "Hub '{}': invalid address '{}:{}': {}",
                        self.name, host, port, e
                    ))
                })?;
                Ok(TransportEndpoint::Tcp(addr))
            }
            ConnectionConfig::Rtu {
                port,
                baud_rate,
                data_bits,
                parity,
                stop_bits,
            } => {
                let mut serial = SerialSettings::new(port, *baud_rate);

                serial.parity = match parity.to_lowercase().as_str() {
                    "none" => tokio_serial::Parity::None,
                    "even" => tokio_serial::Parity::Even,
                    "odd" => tokio_serial::Parity::Odd,
                    _ => {
                        return Err(BridgeError::validation(format!(
                            "Hub '{}': invalid parity '{}' (use none, even, or odd)",
                            self.name, parity
                        )));
                    }
                };

                serial.stop_bits = match stop_bits {
                    1 => tokio_serial::StopBits::One,
                    2 => tokio_serial::StopBits::Two,
                    other => {
                        return Err(BridgeError::validation(format!(
                            "Hub '{}': invalid stop_bits {} (use 1 or 2)",
                            self.name, other
                        )));
                    }
                };

                serial.data_bits = match data_bits {
                    5 => tokio_serial::DataBits::Five,
                    6 => tokio_serial::DataBits::Six,
                    7 => tokio_serial::DataBits::Seven,
                    8 => tokio_serial::DataBits::Eight,
                    other => {
                        return Err(BridgeError::validation(format!(
                            "Hub '{}': invalid data_bits {} (use 5-8)",
                            self.name, other
                        )));
                    }
                };

                Ok(TransportEndpoint::Rtu(serial))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use modbus_light_engine::ActuatorKind;

    const FULL: &str = r#"{
        zenoh: { mode: "client", connect: ["tcp/localhost:7447"] },
        serialization: "cbor",
        logging: { level: "debug", format: "json" },
        modbus: {
            state_file: "/var/lib/lights.json",
            hubs: [
                {
                    name: "hub1",
                    connection: { type: "tcp", host: "192.168.1.10" },
                    timeout_ms: 500,
                    failure_threshold: 3,
                },
                {
                    name: "bus",
                    connection: { type: "rtu", port: "/dev/ttyUSB0", baud_rate: 19200, parity: "even" },
                },
            ],
            lights: [
                { name: "hall", hub: "hub1", coil: 1234, scan_interval: 5 },
                { name: "porch", hub: "bus", slave: 7, register: 10, command_on: 255, verify_register: 11 },
            ],
        },
    }"#;

    fn minimal(lights: &str) -> String {
        format!(
            r#"{{
                modbus: {{
                    hubs: [ {{ name: "hub1", connection: {{ type: "tcp", host: "10.0.0.1" }} }} ],
                    lights: [ {} ],
                }}
            }}"#,
            lights
        )
    }

    #[test]
    fn test_parse_full_config() {
        let config = LightBridgeConfig::parse(FULL).unwrap();

        assert_eq!(config.zenoh.mode, "client");
        assert_eq!(config.serialization, Format::Cbor);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.modbus.key_prefix, "zensight/modbus_light");
        assert_eq!(
            config.modbus.state_file.as_deref(),
            Some(Path::new("/var/lib/lights.json"))
        );

        let hub = &config.modbus.hubs[0];
        assert_eq!(hub.link_options().timeout, Duration::from_millis(500));
        assert_eq!(hub.link_options().failure_threshold, 3);
        assert_eq!(hub.reconnect_interval(), Duration::from_secs(30));
        if let ConnectionConfig::Tcp { host, port } = &hub.connection {
            assert_eq!(host, "192.168.1.10");
            assert_eq!(*port, 502); // default
        } else {
            panic!("Expected TCP connection");
        }
    }

    #[test]
    fn test_defaults() {
        let config = LightBridgeConfig::parse(&minimal(r#"{ name: "hall", coil: 3 }"#)).unwrap();

        assert_eq!(config.zenoh.mode, "peer");
        assert_eq!(config.serialization, Format::Json);
        assert_eq!(config.logging.level, "info");
        assert!(config.modbus.state_file.is_none());

        let light = &config.modbus.lights[0];
        assert_eq!(light.slave, 1);
        assert_eq!(light.scan_interval, 10);
        assert_eq!(config.hub_for(light).unwrap().name, "hub1");
    }

    #[test]
    fn test_to_descriptors() {
        let config = LightBridgeConfig::parse(FULL).unwrap();
        let descriptors = config.to_descriptors().unwrap();

        assert_eq!(
            descriptors[0],
            ActuatorDescriptor::coil("hall", "hub1", 1, 1234, Duration::from_secs(5))
        );
        assert_eq!(descriptors[1].link, "bus");
        assert_eq!(descriptors[1].slave, 7);
        assert_eq!(descriptors[1].read_address(), 11);
        assert_eq!(
            descriptors[1].kind,
            ActuatorKind::HoldingRegister {
                command_on: 255,
                command_off: DEFAULT_COMMAND_OFF,
                verify_address: Some(11),
            }
        );
    }

    #[test]
    fn test_rtu_endpoint() {
        let config = LightBridgeConfig::parse(FULL).unwrap();
        match config.modbus.hubs[1].endpoint().unwrap() {
            TransportEndpoint::Rtu(serial) => {
                assert_eq!(serial.port, "/dev/ttyUSB0");
                assert_eq!(serial.baud_rate, 19200);
                assert_eq!(serial.parity, tokio_serial::Parity::Even);
                assert_eq!(serial.stop_bits, tokio_serial::StopBits::One);
            }
            other => panic!("Expected RTU endpoint, got {}", other),
        }
    }

    #[test]
    fn test_build_links() {
        let config = LightBridgeConfig::parse(FULL).unwrap();
        let links = config.build_links().unwrap();
        let names: Vec<_> = links.iter().map(|l| l.name().to_string()).collect();
        assert_eq!(names, vec!["hub1", "bus"]);
        assert_eq!(links[0].options().failure_threshold, 3);
    }

    #[test]
    fn test_validate_coil_and_register() {
        let err = LightBridgeConfig::parse(&minimal(r#"{ name: "hall", coil: 3, register: 4 }"#));
        assert!(matches!(err, Err(BridgeError::ConfigValidation(_))));

        let err = LightBridgeConfig::parse(&minimal(r#"{ name: "hall" }"#));
        assert!(matches!(err, Err(BridgeError::ConfigValidation(_))));
    }

    #[test]
    fn test_validate_register_options_on_coil() {
        let err = LightBridgeConfig::parse(&minimal(r#"{ name: "hall", coil: 3, command_on: 1 }"#));
        assert!(matches!(err, Err(BridgeError::ConfigValidation(_))));
    }

    #[test]
    fn test_validate_duplicate_names() {
        let err = LightBridgeConfig::parse(&minimal(
            r#"{ name: "hall", coil: 3 }, { name: "hall", coil: 4 }"#,
        ));
        assert!(
            matches!(err, Err(BridgeError::ConfigValidation(msg)) if msg.contains("Duplicate"))
        );
    }

    #[test]
    fn test_validate_slave_and_interval() {
        let err = LightBridgeConfig::parse(&minimal(r#"{ name: "hall", coil: 3, slave: 0 }"#));
        assert!(matches!(err, Err(BridgeError::ConfigValidation(_))));

        let err = LightBridgeConfig::parse(&minimal(r#"{ name: "hall", coil: 3, slave: 248 }"#));
        assert!(matches!(err, Err(BridgeError::ConfigValidation(_))));

        let err =
            LightBridgeConfig::parse(&minimal(r#"{ name: "hall", coil: 3, scan_interval: 0 }"#));
        assert!(matches!(err, Err(BridgeError::ConfigValidation(_))));
    }

    #[test]
    fn test_validate_unknown_hub() {
        let err = LightBridgeConfig::parse(&minimal(r#"{ name: "hall", hub: "nope", coil: 3 }"#));
        assert!(
            matches!(err, Err(BridgeError::ConfigValidation(msg)) if msg.contains("unknown hub"))
        );
    }

    #[test]
    fn test_hub_required_with_several_hubs() {
        let json = r#"{
            modbus: {
                hubs: [
                    { name: "a", connection: { type: "tcp", host: "10.0.0.1" } },
                    { name: "b", connection: { type: "tcp", host: "10.0.0.2" } },
                ],
                lights: [ { name: "hall", coil: 1 } ],
            }
        }"#;
        assert!(matches!(
            LightBridgeConfig::parse(json),
            Err(BridgeError::ConfigValidation(_))
        ));
    }

    #[test]
    fn test_validate_parity() {
        let json = r#"{
            modbus: {
                hubs: [ { name: "bus", connection: { type: "rtu", port: "/dev/ttyS0", parity: "mark" } } ],
                lights: [ { name: "hall", coil: 1 } ],
            }
        }"#;
        let err = LightBridgeConfig::parse(json);
        assert!(matches!(err, Err(BridgeError::ConfigValidation(msg)) if msg.contains("parity")));
    }

    #[test]
    fn test_validate_bad_tcp_host() {
        let json = r#"{
            modbus: {
                hubs: [ { name: "hub1", connection: { type: "tcp", host: "not an ip" } } ],
                lights: [ { name: "hall", coil: 1 } ],
            }
        }"#;
        assert!(LightBridgeConfig::parse(json).is_err());
    }

    #[test]
    fn test_validate_light_name_characters() {
        let err = LightBridgeConfig::parse(&minimal(r#"{ name: "hall/left", coil: 3 }"#));
        assert!(matches!(err, Err(BridgeError::ConfigValidation(_))));
    }

    #[test]
    fn test_parse_error() {
        assert!(matches!(
            LightBridgeConfig::parse("{ modbus: "),
            Err(BridgeError::Config(_))
        ));
    }
}
