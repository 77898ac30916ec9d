//! Service configuration.
//!
//! Everything the store, aggregator, logger and HTTP server need is read once
//! at startup into a [`Config`] and handed to each component when it is built.

use dotenv::dotenv;
use std::env;
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::str::FromStr;

pub const DEFAULT_DATABASE_URL: &str = "/data/tickets.db";
pub const DEFAULT_LOG_FILE: &str = "/var/log/helpdesk/app.log";
pub const DEFAULT_SERVICE_NAME: &str = "Campus IT Helpdesk";

/// How update calls treat the `status` and `priority` fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusPolicy {
    /// Any string is stored as given.
    #[default]
    Freeform,
    /// Only known statuses and priorities are accepted.
    Strict,
}

impl FromStr for StatusPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "freeform" => Ok(StatusPolicy::Freeform),
            "strict" => Ok(StatusPolicy::Strict),
            other => Err(format!("unknown status policy '{}'", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite database path.
    pub database_url: String,
    /// Maximum number of pooled connections.
    pub pool_size: u32,
    /// Preferred log file; see [`crate::logging`] for the fallback.
    pub log_file: PathBuf,
    pub address: IpAddr,
    pub port: u16,
    /// Reported by `GET /health`.
    pub service_name: String,
    pub status_policy: StatusPolicy,
    /// Append a row to the `metrics` table for every snapshot.
    pub record_snapshots: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            pool_size: 8,
            log_file: PathBuf::from(DEFAULT_LOG_FILE),
            address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 5000,
            service_name: DEFAULT_SERVICE_NAME.to_string(),
            status_policy: StatusPolicy::Freeform,
            record_snapshots: false,
        }
    }
}

impl Config {
    /// Loads `.env` (if present) and reads the environment, falling back to
    /// defaults for anything unset or unparseable.
    pub fn from_env() -> Config {
        dotenv().ok();
        Config::from_lookup(|name| env::var(name).ok())
    }

    /// Builds a config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Config
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();

        Config {
            database_url: lookup("DATABASE_URL")
                .filter(|url| !url.trim().is_empty())
                .unwrap_or(defaults.database_url),
            pool_size: parse_var(&lookup, "HELPDESK_POOL_SIZE")
                .filter(|size: &u32| *size > 0)
                .unwrap_or(defaults.pool_size),
            log_file: lookup("HELPDESK_LOG_FILE")
                .filter(|path| !path.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or(defaults.log_file),
            address: parse_var(&lookup, "HELPDESK_ADDRESS").unwrap_or(defaults.address),
            port: parse_var(&lookup, "HELPDESK_PORT").unwrap_or(defaults.port),
            service_name: lookup("HELPDESK_SERVICE_NAME").unwrap_or(defaults.service_name),
            status_policy: parse_var(&lookup, "HELPDESK_STATUS_POLICY")
                .unwrap_or(defaults.status_policy),
            record_snapshots: parse_var(&lookup, "HELPDESK_RECORD_METRICS")
                .unwrap_or(defaults.record_snapshots),
        }
    }

    /// A default config pointing at the given database; used by tests and tools.
    pub fn with_database_url<S: Into<String>>(url: S) -> Config {
        Config {
            database_url: url.into(),
            ..Config::default()
        }
    }
}

fn parse_var<T, F>(lookup: &F, name: &str) -> Option<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(name).and_then(|value| value.trim().parse().ok())
}
