//! Configuration.
//!
//! The configuration is read from a TOML file. Every value has a default,
//! so an empty file or no file at all is a valid configuration:
//!
//! ```toml
//! mode = "ber"
//! max_depth = 64
//!
//! [kerberos]
//! max_message_size = 1048576
//! alternate_ports = [8888]
//!
//! [rlc]
//! sequence_number_width = 5
//! ```

use std::{fs, io};
use std::path::{Path, PathBuf};
use serde::Deserialize;
use crate::decode::DecodeContext;
use crate::directory::DirectoryDecoder;
use crate::mode::Mode;
use crate::proto::Protocol;
use crate::sequence::SequenceTracker;


//------------ Config --------------------------------------------------------

#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// The encoding rules decoded data is checked against.
    pub mode: Mode,

    /// The maximum nesting depth of decoded values.
    pub max_depth: usize,

    pub cmp: ProtocolConfig,
    pub kerberos: ProtocolConfig,
    pub c1222: ProtocolConfig,
    pub z3950: ProtocolConfig,
    pub rlc: ProtocolConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            mode: Mode::Ber,
            max_depth: DecodeContext::DEFAULT_MAX_DEPTH,
            cmp: ProtocolConfig::default(),
            kerberos: ProtocolConfig::default(),
            c1222: ProtocolConfig::default(),
            z3950: ProtocolConfig::default(),
            rlc: ProtocolConfig::default(),
        }
    }
}

pub const DEFAULT_MAX_MESSAGE_SIZE: u32 = 1 << 20;

impl Config {
    /// Parses and validates a configuration.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let res: Self = toml::from_str(text)?;
        res.validate()?;
        Ok(res)
    }

    /// Reads and validates a configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|err| {
            ConfigError::Read { path: path.into(), source: err }
        })?;
        Self::from_toml(&text)
    }

    /// Checks that all values are within their permitted ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_depth == 0 {
            return Err(ConfigError::Invalid("max_depth must not be zero".into()))
        }
        for protocol in Protocol::ALL.iter().copied() {
            self.protocol(protocol).validate(protocol.name())?;
        }
        self.rlc.validate("rlc")
    }

    /// Returns the settings for a protocol.
    pub fn protocol(&self, protocol: Protocol) -> &ProtocolConfig {
        match protocol {
            Protocol::Cmp => &self.cmp,
            Protocol::Kerberos => &self.kerberos,
            Protocol::C1222 => &self.c1222,
            Protocol::Z3950 => &self.z3950,
        }
    }

    /// Returns the protocol to use for a transport port.
    ///
    /// Alternate ports are checked before the well-known ones, so they can
    /// move a well-known port to another protocol.
    pub fn protocol_for_port(&self, port: u16) -> Option<Protocol> {
        Protocol::ALL.iter().copied().find(|protocol| {
            self.protocol(*protocol).alternate_ports.contains(&port)
        }).or_else(|| {
            Protocol::ALL.iter().copied().find(|protocol| {
                protocol.default_ports().contains(&port)
            })
        })
    }

    /// Creates a sequence tracker for RLC channels.
    pub fn sequence_tracker(&self) -> SequenceTracker {
        let res = SequenceTracker::new(self.rlc.sequence_number_width);
        match self.rlc.ack_window {
            Some(window) => res.with_ack_window(window),
            None => res,
        }
    }
}


//------------ ProtocolConfig ------------------------------------------------

/// The settings of a single protocol.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ProtocolConfig {
    /// Whether messages may span several transport deliveries.
    pub reassembly_enabled: bool,

    /// The largest declared message size accepted by the reassembler.
    pub max_message_size: u32,

    /// Transport ports in addition to the well-known ones.
    pub alternate_ports: Vec<u16>,

    /// Whether encrypted content is handed to the verifier.
    pub decrypt_enabled: bool,

    /// The width of sequence numbers in bits.
    pub sequence_number_width: u8,

    /// The acknowledgement window. Defaults to half the sequence space.
    pub ack_window: Option<u32>,

    /// The largest declared directory record length accepted.
    pub max_record_size: usize,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        ProtocolConfig {
            reassembly_enabled: true,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            alternate_ports: Vec::new(),
            decrypt_enabled: false,
            sequence_number_width: 10,
            ack_window: None,
            max_record_size: DirectoryDecoder::DEFAULT_MAX_RECORD_SIZE,
        }
    }
}

impl ProtocolConfig {
    fn validate(&self, name: &str) -> Result<(), ConfigError> {
        if !(1..=16).contains(&self.sequence_number_width) {
            return Err(ConfigError::Invalid(format!(
                "{}: sequence_number_width {} not in 1..=16",
                name, self.sequence_number_width
            )))
        }
        if self.max_message_size == 0 {
            return Err(ConfigError::Invalid(format!(
                "{name}: max_message_size must not be zero"
            )))
        }
        if self.max_record_size == 0 {
            return Err(ConfigError::Invalid(format!(
                "{name}: max_record_size must not be zero"
            )))
        }
        if let Some(window) = self.ack_window {
            let modulus = 1u32 << self.sequence_number_width;
            if window == 0 || window >= modulus {
                return Err(ConfigError::Invalid(format!(
                    "{name}: ack_window {window} not in 1..{modulus}"
                )))
            }
        }
        Ok(())
    }
}


//------------ ConfigError ---------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {}: {}", .path.display(), .source)]
    Read {
        path: PathBuf,
        source: io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}


//============ Tests =========================================================

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn empty_is_default() {
        assert_eq!(Config::from_toml("").unwrap(), Config::default());
    }

    #[test]
    fn protocol_tables() {
        let config = Config::from_toml(
            "mode = \"der\"\n\
             [kerberos]\n\
             max_message_size = 1000\n\
             alternate_ports = [8888, 210]\n\
             [rlc]\n\
             sequence_number_width = 5\n\
             ack_window = 10\n"
        ).unwrap();
        assert_eq!(config.mode, Mode::Der);
        assert_eq!(config.kerberos.max_message_size, 1000);
        assert!(config.cmp.reassembly_enabled);
        assert_eq!(config.protocol_for_port(8888), Some(Protocol::Kerberos));
        assert_eq!(config.protocol_for_port(210), Some(Protocol::Kerberos));
        assert_eq!(config.protocol_for_port(88), Some(Protocol::Kerberos));
        assert_eq!(config.protocol_for_port(1153), Some(Protocol::C1222));
        assert_eq!(config.protocol_for_port(1), None);
        let tracker = config.sequence_tracker();
        assert_eq!(tracker.modulus(), 32);
        assert_eq!(tracker.ack_window(), 10);
    }

    #[test]
    fn rejected() {
        assert!(matches!(
            Config::from_toml("[rlc]\nsequence_number_width = 17"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            Config::from_toml("[cmp]\nmax_message_size = 0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            Config::from_toml("max_depth = 0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            Config::from_toml("[rlc]\nsequence_number_width = 5\nack_window = 32"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            Config::from_toml("unknown = 1"), Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            Config::from_toml("max_depth = \"deep\""), Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            Config::from_file("/nonexistent/berdissect.toml"),
            Err(ConfigError::Read { .. })
        ));
    }
}
