use std::path::PathBuf;

use thiserror::Error;

use crate::host::{
    settings::{SettingError, Settings},
    RemoteValue,
};

pub const DEFAULT_PORT_RANGE: [u16; 2] = [6023, 6073];
pub const DEFAULT_HOST: &str = "127.0.0.1";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebServiceConfig {
    pub log_file: Option<PathBuf>,
    pub port_range: Vec<u16>,
    pub host: String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("JSONRPC_ENABLED is not set, web service is not configured")]
    NotConfigured,
    #[error(transparent)]
    InvalidSetting(#[from] SettingError),
    #[error("JSONRPC_PORT entries must be valid u16 ports, got {0}")]
    InvalidPort(String),
    #[error("JSONRPC_PORT accepts at most two entries, got {0}")]
    TooManyPorts(usize),
}

impl ConfigError {
    pub fn is_not_configured(&self) -> bool {
        matches!(self, Self::NotConfigured)
    }
}

impl WebServiceConfig {
    pub fn from_settings(settings: &Settings) -> Result<Self, ConfigError> {
        if !settings.getbool("JSONRPC_ENABLED", false)? {
            return Err(ConfigError::NotConfigured);
        }

        let log_file = settings
            .get_str("JSONRPC_LOGFILE")
            .map(str::trim)
            .filter(|path| !path.is_empty())
            .map(PathBuf::from);

        let port_range = match settings.getlist("JSONRPC_PORT")? {
            Some(entries) => entries.iter().map(parse_port).collect::<Result<Vec<_>, _>>()?,
            None => DEFAULT_PORT_RANGE.to_vec(),
        };
        if port_range.len() > 2 {
            return Err(ConfigError::TooManyPorts(port_range.len()));
        }

        let host = settings
            .get_str("JSONRPC_HOST")
            .map(str::trim)
            .filter(|host| !host.is_empty())
            .unwrap_or(DEFAULT_HOST)
            .to_string();

        Ok(Self {
            log_file,
            port_range,
            host,
        })
    }
}

fn parse_port(entry: &RemoteValue) -> Result<u16, ConfigError> {
    let port = match entry {
        RemoteValue::Int(number) => u16::try_from(*number).ok(),
        RemoteValue::Str(text) => text.trim().parse::<u16>().ok(),
        _ => None,
    };
    port.ok_or_else(|| ConfigError::InvalidPort(format!("{entry:?}")))
}
