//! Process-wide configuration.
use std::fs::File;
use std::path::Path;
use serde::{Serialize, Deserialize};
use log::debug;
use crate::{CodecKind, Error, Result};

/// Homogeneity declared by the build. Enable the `heterogeneous` feature when
/// the cluster mixes binary layouts.
pub const HOMOGENEOUS_DEFAULT: bool = !cfg!(feature = "heterogeneous");

/// Environment variable holding the path to a YAML configuration file.
pub const CONFIG_ENV: &str = "TYPED_MPI_CONFIG";

/// Environment variable overriding the homogeneity declaration.
pub const HOMOGENEOUS_ENV: &str = "TYPED_MPI_HOMOGENEOUS";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// All processes share one binary layout (endianness, padding, widths).
    pub homogeneous: bool,
    /// Codec used by the portable path.
    pub codec: CodecKind,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            homogeneous: HOMOGENEOUS_DEFAULT,
            codec: CodecKind::default(),
        }
    }
}

impl Config {
    /// Declare the deployment heterogeneous.
    pub fn heterogeneous(mut self) -> Config {
        self.homogeneous = false;
        self
    }

    /// Choose the portable codec.
    pub fn with_codec(mut self, codec: CodecKind) -> Config {
        self.codec = codec;
        self
    }

    /// Parse a YAML document.
    pub fn from_yaml_str(text: &str) -> Result<Config> {
        serde_yaml::from_str(text).map_err(|err| Error::Config(err.to_string()))
    }

    /// Load a YAML configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Config> {
        let path = path.as_ref();
        debug!("Loading configuration from {}", path.display());
        let file = File::open(path)
            .map_err(|err| Error::Config(format!("{}: {}", path.display(), err)))?;
        serde_yaml::from_reader(file).map_err(|err| Error::Config(err.to_string()))
    }

    /// Build the configuration from the environment: the file named by
    /// `TYPED_MPI_CONFIG` if set, then `TYPED_MPI_HOMOGENEOUS` on top.
    pub fn from_env() -> Result<Config> {
        let mut config = match std::env::var(CONFIG_ENV) {
            Ok(path) => Config::load(path)?,
            Err(_) => Config::default(),
        };
        if let Ok(value) = std::env::var(HOMOGENEOUS_ENV) {
            config.homogeneous = parse_flag(&value)
                .ok_or_else(|| Error::Config(format!("{}={} is not a boolean", HOMOGENEOUS_ENV, value)))?;
        }
        Ok(config)
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_follows_build_switch() {
        assert_eq!(Config::default().homogeneous, HOMOGENEOUS_DEFAULT);
        assert_eq!(Config::default().codec, CodecKind::MessagePack);
    }

    #[test]
    fn yaml_fields_are_optional() {
        let config = Config::from_yaml_str("codec: postcard\n").unwrap();
        assert_eq!(config.codec, CodecKind::Postcard);
        assert_eq!(config.homogeneous, HOMOGENEOUS_DEFAULT);

        let config = Config::from_yaml_str("homogeneous: false\ncodec: bincode\n").unwrap();
        assert!(!config.homogeneous);
        assert_eq!(config.codec, CodecKind::Bincode);
    }

    #[test]
    fn bad_yaml_is_a_config_error() {
        let err = Config::from_yaml_str("codec: morse\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn flags() {
        assert_eq!(parse_flag(" Yes "), Some(true));
        assert_eq!(parse_flag("0"), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }
}
