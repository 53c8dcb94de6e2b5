use std::env;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;
use std::time::Duration;

use crate::error::{CoordinatorError, Result};

pub const DEFAULT_JUDGE_API_URL: &str = "https://api.jdoodle.com/v1/execute";

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub judge: JudgeConfig,
    pub log_format: LogFormat,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Base used when building join URLs; the request Host header is used when unset
    pub public_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct JudgeConfig {
    pub api_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub version_index: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl JudgeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_JUDGE_API_URL.to_string(),
            client_id: String::new(),
            client_secret: String::new(),
            version_index: "3".to_string(),
            timeout_secs: 15,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let defaults = JudgeConfig::default();

        Ok(Self {
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: parse_var("SERVER_PORT", 3001)?,
                public_url: env::var("PUBLIC_URL")
                    .ok()
                    .filter(|url| !url.trim().is_empty())
                    .map(|url| url.trim_end_matches('/').to_string()),
            },
            judge: JudgeConfig {
                api_url: env::var("JUDGE_API_URL").unwrap_or(defaults.api_url),
                client_id: env::var("JUDGE_CLIENT_ID").unwrap_or_default(),
                client_secret: env::var("JUDGE_CLIENT_SECRET").unwrap_or_default(),
                version_index: env::var("JUDGE_VERSION_INDEX").unwrap_or(defaults.version_index),
                timeout_secs: parse_positive_var("JUDGE_TIMEOUT_SECS", defaults.timeout_secs)?,
            },
            log_format: match env::var("LOG_FORMAT").as_deref() {
                Ok("json") => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        })
    }

    pub fn bind_address(&self) -> ([u8; 4], u16) {
        let ip_addr = self.parse_host_to_ipv4();
        (ip_addr.octets(), self.server.port)
    }

    fn parse_host_to_ipv4(&self) -> Ipv4Addr {
        if let Ok(addr) = self.server.host.parse::<IpAddr>() {
            match addr {
                IpAddr::V4(ipv4) => return ipv4,
                IpAddr::V6(_) => {
                    tracing::warn!(
                        host = %self.server.host,
                        "IPv6 address provided but only IPv4 supported, using 0.0.0.0"
                    );
                    return Ipv4Addr::UNSPECIFIED;
                }
            }
        }

        match self.server.host.as_str() {
            "localhost" => Ipv4Addr::LOCALHOST,
            "" | "0.0.0.0" => Ipv4Addr::UNSPECIFIED,
            _ => {
                tracing::warn!(
                    host = %self.server.host,
                    "Unable to parse host as IPv4, using 0.0.0.0"
                );
                Ipv4Addr::UNSPECIFIED
            }
        }
    }
}

fn parse_var<T: FromStr>(name: &str, default: T) -> Result<T> {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|_| {
            CoordinatorError::InvalidConfiguration(format!("{} has invalid value {:?}", name, raw))
        }),
        Err(_) => Ok(default),
    }
}

/// Like `parse_var`, but zero is rejected.
fn parse_positive_var(name: &str, default: u64) -> Result<u64> {
    match parse_var(name, default)? {
        0 => Err(CoordinatorError::InvalidConfiguration(format!(
            "{} must be greater than zero",
            name
        ))),
        value => Ok(value),
    }
}
