//! Logging configuration file handling for me7log
//!
//! ```toml
//! [connection]
//! ecu_file = "8D0907551M"
//! sample_rate = 20
//! connect_mode = "SLOW-0x11"
//! baud = 38400
//! hw_number = "8D0907551M"
//!
//! [[channels]]
//! name = "nmot"
//! unit = "rpm"
//! address = "0x380AE7"
//! size = 1
//! a = 40.0
//! ```

use std::path::Path;

use anyhow::{bail, Context, Result};
use me7_conv::ChannelDescriptor;
use me7_kline::logrecord::MAX_LOCATIONS;
use me7_kline::{
    ConnectMode, ExpectedIdentity, IdentityPolicy, MemoryLocation, SamplePacer, SecurityLevel,
    WakeConfig,
};
use serde::{Deserialize, Deserializer};

/// Largest channel the decoder can reassemble
const MAX_CHANNEL_SIZE: usize = me7_conv::types::MAX_WIDTH;
const MAX_ADDRESS: u64 = 0xFF_FFFF;

/// Parsed `me7log` configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub channels: Vec<ChannelConfig>,
}

/// `[connection]` table
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionConfig {
    /// ECU definition the channel list was built from
    #[serde(default)]
    pub ecu_file: String,
    /// Target records per second
    pub sample_rate: f64,
    #[serde(default)]
    pub protocol_version: Option<String>,
    #[serde(default)]
    pub connect_mode: ConnectMode,
    /// Baud rate requested with the diagnostic session
    pub baud: u32,
    #[serde(default = "default_security_level")]
    pub security_level: u8,
    pub hw_number: Option<String>,
    pub sw_number: Option<String>,
    pub part_number: Option<String>,
    pub sw_version: Option<String>,
    pub engine_id: Option<String>,
    #[serde(default)]
    pub identity_policy: IdentityPolicy,
}

fn default_security_level() -> u8 {
    3
}

/// One `[[channels]]` entry
#[derive(Debug, Clone, Deserialize)]
pub struct ChannelConfig {
    pub name: String,
    pub unit: Option<String>,
    #[serde(deserialize_with = "hex_value")]
    pub address: u64,
    pub size: usize,
    #[serde(default, deserialize_with = "hex_value")]
    pub bitmask: u64,
    #[serde(default)]
    pub signed: bool,
    #[serde(default)]
    pub inverse: bool,
    #[serde(default = "default_scale")]
    pub a: f64,
    #[serde(default)]
    pub b: f64,
}

fn default_scale() -> f64 {
    1.0
}

#[derive(Deserialize)]
#[serde(untagged)]
enum HexOrInt {
    Int(u64),
    Text(String),
}

/// Parse `"0x380AE7"`, `"380AE7"` or `"0X380ae7"`
pub fn parse_hex(text: &str) -> Result<u64, String> {
    let trimmed = text.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    u64::from_str_radix(digits, 16).map_err(|e| format!("invalid hex value '{}': {}", text, e))
}

fn hex_value<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    match HexOrInt::deserialize(deserializer)? {
        HexOrInt::Int(value) => Ok(value),
        HexOrInt::Text(text) => parse_hex(&text).map_err(serde::de::Error::custom),
    }
}

impl ChannelConfig {
    pub fn descriptor(&self) -> ChannelDescriptor {
        ChannelDescriptor {
            name: self.name.clone(),
            unit: self.unit.clone(),
            size: self.size,
            bitmask: self.bitmask,
            signed: self.signed,
            inverse: self.inverse,
            a: self.a,
            b: self.b,
        }
    }

    pub fn location(&self) -> Result<MemoryLocation> {
        let address = u32::try_from(self.address)
            .with_context(|| format!("Channel {}: address out of range", self.name))?;
        let size = u8::try_from(self.size)
            .with_context(|| format!("Channel {}: size out of range", self.name))?;
        MemoryLocation::new(address, size)
            .with_context(|| format!("Channel {}: invalid memory location", self.name))
    }
}

impl LogConfig {
    /// Load and validate a configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Parse and validate configuration text
    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let rate = self.connection.sample_rate;
        if !rate.is_finite() || rate <= 0.0 {
            bail!("sample_rate must be greater than zero, got {}", rate);
        }
        SecurityLevel::try_from(self.connection.security_level)?;

        if self.channels.is_empty() {
            bail!("at least one [[channels]] entry is required");
        }
        if self.channels.len() > MAX_LOCATIONS {
            bail!(
                "{} channels configured, at most {} fit in one log record",
                self.channels.len(),
                MAX_LOCATIONS
            );
        }
        for channel in &self.channels {
            if channel.size == 0 || channel.size > MAX_CHANNEL_SIZE {
                bail!(
                    "Channel {}: size must be 1..={}, got {}",
                    channel.name,
                    MAX_CHANNEL_SIZE,
                    channel.size
                );
            }
            if channel.address > MAX_ADDRESS {
                bail!(
                    "Channel {}: address 0x{:X} does not fit in 24 bits",
                    channel.name,
                    channel.address
                );
            }
            channel.descriptor().validate()?;
        }
        Ok(())
    }

    pub fn descriptors(&self) -> Vec<ChannelDescriptor> {
        self.channels.iter().map(ChannelConfig::descriptor).collect()
    }

    pub fn locations(&self) -> Result<Vec<MemoryLocation>> {
        self.channels.iter().map(ChannelConfig::location).collect()
    }

    pub fn security_level(&self) -> Result<SecurityLevel> {
        Ok(SecurityLevel::try_from(self.connection.security_level)?)
    }

    pub fn pacer(&self) -> Result<SamplePacer> {
        SamplePacer::from_rate(self.connection.sample_rate)
            .with_context(|| format!("invalid sample rate {}", self.connection.sample_rate))
    }

    pub fn expected_identity(&self) -> ExpectedIdentity {
        let c = &self.connection;
        ExpectedIdentity {
            hw_number: c.hw_number.clone(),
            sw_number: c.sw_number.clone(),
            part_number: c.part_number.clone(),
            sw_version: c.sw_version.clone(),
            engine_id: c.engine_id.clone(),
        }
    }

    /// Wake-up parameters for the configured connect mode
    pub fn wake_config(&self) -> WakeConfig {
        match self.connection.connect_mode {
            ConnectMode::Slow0x11 => WakeConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;
    use std::time::Duration;

    const SAMPLE: &str = r#"
[connection]
ecu_file = "8D0907551M"
sample_rate = 20
protocol_version = "1.1"
connect_mode = "SLOW-0x11"
baud = 38400
hw_number = "8D0907551M"
identity_policy = "abort"

[[channels]]
name = "nmot"
unit = "rpm"
address = "0x380AE7"
size = 1
a = 40.0

[[channels]]
name = "b_kuppl"
address = "38106C"
size = 1
bitmask = "0x04"

[[channels]]
name = "zwout"
address = 0x381B2C
size = 1
signed = true
a = 0.75
"#;

    #[test]
    fn test_parse_sample() {
        let config = LogConfig::parse(SAMPLE).unwrap();

        assert_eq!(config.connection.baud, 38400);
        assert_eq!(config.connection.security_level, 3);
        assert_eq!(config.connection.identity_policy, IdentityPolicy::Abort);
        assert_eq!(config.connection.connect_mode, ConnectMode::Slow0x11);
        assert_eq!(config.channels.len(), 3);
        assert_eq!(config.channels[0].address, 0x380AE7);
        assert_eq!(config.channels[1].bitmask, 0x04);
        assert_eq!(config.channels[2].address, 0x381B2C);

        let descriptors = config.descriptors();
        assert_eq!(
            descriptors[0],
            ChannelDescriptor::new("nmot", 1).with_unit("rpm").with_scale(40.0, 0.0)
        );
        assert!(descriptors[2].signed);

        let locations = config.locations().unwrap();
        assert_eq!(locations[0].encode(), [0x01, 0x38, 0x0A, 0xE7]);

        assert_eq!(config.security_level().unwrap(), SecurityLevel::Level3);
        assert_eq!(config.pacer().unwrap().interval(), Duration::from_millis(50));
        assert_eq!(config.expected_identity().hw_number.as_deref(), Some("8D0907551M"));
        assert_eq!(config.expected_identity().sw_number, None);
    }

    #[test]
    fn test_parse_hex() {
        assert_eq!(parse_hex("0x380AE7"), Ok(0x380AE7));
        assert_eq!(parse_hex("0X380ae7"), Ok(0x380AE7));
        assert_eq!(parse_hex(" ff "), Ok(0xFF));
        assert!(parse_hex("0xZZ").is_err());
    }

    #[test]
    fn test_rejects_zero_sample_rate() {
        let text = SAMPLE.replace("sample_rate = 20", "sample_rate = 0");
        let err = LogConfig::parse(&text).unwrap_err();
        assert!(err.to_string().contains("sample_rate"));
    }

    #[test]
    fn test_rejects_wide_channel() {
        let text = SAMPLE.replace("size = 1\na = 40.0", "size = 9\na = 40.0");
        let err = LogConfig::parse(&text).unwrap_err();
        assert!(err.to_string().contains("nmot"));
    }

    #[test]
    fn test_rejects_address_beyond_24_bits() {
        let text = SAMPLE.replace("\"0x380AE7\"", "\"0x1380AE7\"");
        let err = LogConfig::parse(&text).unwrap_err();
        assert!(err.to_string().contains("24 bits"));
    }

    #[test]
    fn test_rejects_missing_channels() {
        let text = "[connection]\nsample_rate = 10\nbaud = 38400\n";
        let err = LogConfig::parse(text).unwrap_err();
        assert!(err.to_string().contains("channels"));
    }

    #[test]
    fn test_rejects_unknown_security_level() {
        let text = SAMPLE.replace("baud = 38400", "baud = 38400\nsecurity_level = 2");
        assert!(LogConfig::parse(&text).is_err());
    }

    #[test]
    fn test_rejects_unknown_connect_mode() {
        let text = SAMPLE.replace("SLOW-0x11", "FAST");
        assert!(LogConfig::parse(&text).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = LogConfig::load(file.path()).unwrap();
        assert_eq!(config.connection.ecu_file, "8D0907551M");
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.toml");
        let err = LogConfig::load(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
