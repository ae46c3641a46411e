use std::fs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};

use clap::Parser;
use serde::Deserialize;

use crate::error_handling::types::ConfigError;

/// Application configuration covering both servers and the export
/// destination. Every setting can come from the command line or, when a
/// TOML file is given, entirely from that file.
///
/// # Fields Overview
///
/// - `ingest_port`: where telemetry senders push packets
/// - `control_port`: where the control surface is served
/// - `bind_address`: address both servers bind to
/// - `export_dir`: default destination for timestamped CSV exports
#[derive(Parser, Debug, Clone, Deserialize)]
#[command(name = "capteur")]
#[command(version)]
#[command(about = "A telemetry capture receiver with CSV export")]
pub struct Config {
    /// Optional TOML configuration file.
    ///
    /// When present, it supplies every setting and the remaining
    /// command-line flags are ignored.
    #[arg(value_name = "CONFIG_FILE")]
    #[serde(skip)]
    pub config_file: Option<PathBuf>,

    /// Port for the telemetry ingestion endpoint.
    ///
    /// Senders push packets to `http://<bind-address>:<port>/commit/`.
    ///
    /// # Command Line
    /// Use `--ingest-port <PORT>` to set this value from the CLI
    #[arg(long, default_value_t = 13224)]
    #[serde(default = "default_ingest_port")]
    pub ingest_port: u16,

    /// Port for the HTTP control surface.
    ///
    /// # Command Line
    /// Use `--control-port <PORT>` to set this value from the CLI
    #[arg(long, default_value_t = 13225)]
    #[serde(default = "default_control_port")]
    pub control_port: u16,

    /// Network address both servers bind to.
    ///
    /// # Command Line
    /// Use `--bind-address <ADDRESS>` to set this value from the CLI
    #[arg(long, default_value = "0.0.0.0")]
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Directory receiving timestamped export files when an export
    /// request names no explicit destination.
    ///
    /// # Command Line
    /// Use `--export-dir <PATH>` to set this value from the CLI
    #[arg(long, default_value = "captures")]
    #[serde(default = "default_export_dir")]
    pub export_dir: PathBuf,
}

fn default_ingest_port() -> u16 {
    13224
}

fn default_control_port() -> u16 {
    13225
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_export_dir() -> PathBuf {
    PathBuf::from("captures")
}

impl Config {
    /// Builds the effective configuration: command-line flags, replaced
    /// wholesale by the TOML file when one is named, then validated.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Config::parse();
        if let Some(path) = config.config_file.take() {
            config = Config::from_file(&path)?;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(ConfigError::IoError)?;
        let config: Config =
            toml::from_str(&text).map_err(|e| ConfigError::TomlError(e.to_string()))?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.bind_addr()?;
        if self.ingest_port == 0 || self.control_port == 0 {
            return Err(ConfigError::BadPortsRange(
                "ports must be non-zero".to_string(),
            ));
        }
        if self.ingest_port == self.control_port {
            return Err(ConfigError::BadPortsRange(format!(
                "ingest and control ports must differ (both {})",
                self.ingest_port
            )));
        }
        Ok(())
    }

    /// The bind address as an [`IpAddr`].
    pub fn bind_addr(&self) -> Result<IpAddr, ConfigError> {
        self.bind_address
            .parse()
            .map_err(|_| ConfigError::BadAddress(self.bind_address.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn parse(args: &[&str]) -> Config {
        Config::try_parse_from(args).unwrap_or_else(|e| panic!("{}", e))
    }

    #[test]
    fn defaults_pass_validation() {
        let config = parse(&["capteur"]);

        assert_eq!(config.ingest_port, 13224);
        assert_eq!(config.control_port, 13225);
        assert_eq!(config.bind_address, "0.0.0.0");
        assert_eq!(config.export_dir, PathBuf::from("captures"));
        config.validate().unwrap();
    }

    #[test]
    fn flags_override_defaults() {
        let config = parse(&[
            "capteur",
            "--ingest-port",
            "9000",
            "--control-port",
            "9001",
            "--bind-address",
            "127.0.0.1",
            "--export-dir",
            "/tmp/out",
        ]);

        assert_eq!(config.ingest_port, 9000);
        assert_eq!(config.control_port, 9001);
        assert_eq!(config.bind_addr().unwrap().to_string(), "127.0.0.1");
        assert_eq!(config.export_dir, PathBuf::from("/tmp/out"));
    }

    #[test]
    fn toml_file_supplies_missing_fields_from_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "ingest_port = 4000").unwrap();

        let config = Config::from_file(file.path()).unwrap();

        assert_eq!(config.ingest_port, 4000);
        assert_eq!(config.control_port, 13225);
        assert_eq!(config.bind_address, "0.0.0.0");
    }

    #[test]
    fn unparseable_toml_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "ingest_port = \"not a port\"").unwrap();

        assert!(matches!(
            Config::from_file(file.path()),
            Err(ConfigError::TomlError(_))
        ));
    }

    #[test]
    fn colliding_ports_fail_validation() {
        let mut config = parse(&["capteur"]);
        config.control_port = config.ingest_port;

        assert!(matches!(
            config.validate(),
            Err(ConfigError::BadPortsRange(_))
        ));
    }

    #[test]
    fn bad_bind_address_fails_validation() {
        let mut config = parse(&["capteur"]);
        config.bind_address = "not-an-address".to_string();

        assert!(matches!(config.validate(), Err(ConfigError::BadAddress(_))));
    }
}
