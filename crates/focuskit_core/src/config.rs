//! Host configuration resolved from environment variables.
//!
//! # Invariants
//! - Unset variables fall back to documented defaults.
//! - Set-but-invalid variables fail loudly, naming the variable.

use crate::broker::actor::{BrokerOptions, DbLocation};
use crate::broker::handler::WriteConsistency;
use crate::logging::{default_log_level, normalize_level};
use crate::store::{StoreOptions, QUOTA_BYTES_PER_ITEM};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

pub const ENV_DB_PATH: &str = "FOCUSKIT_DB_PATH";
pub const ENV_DOWNLOAD_DIR: &str = "FOCUSKIT_DOWNLOAD_DIR";
pub const ENV_LOG_LEVEL: &str = "FOCUSKIT_LOG_LEVEL";
pub const ENV_LOG_DIR: &str = "FOCUSKIT_LOG_DIR";
pub const ENV_WRITE_MODE: &str = "FOCUSKIT_WRITE_MODE";
pub const ENV_QUOTA_BYTES_PER_ITEM: &str = "FOCUSKIT_QUOTA_BYTES_PER_ITEM";

const DEFAULT_DB_FILE_NAME: &str = "focuskit.sqlite3";
const DEFAULT_DOWNLOAD_DIR_NAME: &str = "focuskit-downloads";

/// Invalid configuration value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError {
    pub variable: &'static str,
    pub reason: String,
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid `{}`: {}", self.variable, self.reason)
    }
}

impl Error for ConfigError {}

/// Settings for the native-messaging host process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostConfig {
    pub db_path: PathBuf,
    pub download_dir: PathBuf,
    pub log_level: &'static str,
    /// Logging stays off when `None`.
    pub log_dir: Option<String>,
    pub consistency: WriteConsistency,
    pub quota_bytes_per_item: Option<usize>,
}

impl HostConfig {
    /// Reads configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads configuration through `lookup`; blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let read = |name: &str| {
            lookup(name)
                .map(|raw| raw.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let db_path = read(ENV_DB_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|| std::env::temp_dir().join(DEFAULT_DB_FILE_NAME));
        let download_dir = read(ENV_DOWNLOAD_DIR)
            .map(PathBuf::from)
            .unwrap_or_else(|| std::env::temp_dir().join(DEFAULT_DOWNLOAD_DIR_NAME));

        let log_level = match read(ENV_LOG_LEVEL) {
            Some(value) => normalize_level(&value).map_err(|reason| ConfigError {
                variable: ENV_LOG_LEVEL,
                reason,
            })?,
            None => default_log_level(),
        };

        let consistency = match read(ENV_WRITE_MODE) {
            Some(value) => WriteConsistency::parse(&value).ok_or_else(|| ConfigError {
                variable: ENV_WRITE_MODE,
                reason: format!("expected `cas` or `lww`, got `{value}`"),
            })?,
            None => WriteConsistency::default(),
        };

        let quota_bytes_per_item = match read(ENV_QUOTA_BYTES_PER_ITEM) {
            Some(value) if value.eq_ignore_ascii_case("off") => None,
            Some(value) => Some(
                value
                    .parse::<usize>()
                    .ok()
                    .filter(|bytes| *bytes > 0)
                    .ok_or_else(|| ConfigError {
                        variable: ENV_QUOTA_BYTES_PER_ITEM,
                        reason: format!("expected a positive byte count or `off`, got `{value}`"),
                    })?,
            ),
            None => Some(QUOTA_BYTES_PER_ITEM),
        };

        Ok(Self {
            db_path,
            download_dir,
            log_level,
            log_dir: read(ENV_LOG_DIR),
            consistency,
            quota_bytes_per_item,
        })
    }

    /// Actor options derived from this configuration.
    pub fn broker_options(&self) -> BrokerOptions {
        BrokerOptions {
            db: DbLocation::File(self.db_path.clone()),
            store: StoreOptions {
                max_item_bytes: self.quota_bytes_per_item,
            },
            consistency: self.consistency,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{
        HostConfig, ENV_DB_PATH, ENV_LOG_DIR, ENV_LOG_LEVEL, ENV_QUOTA_BYTES_PER_ITEM,
        ENV_WRITE_MODE,
    };
    use crate::broker::actor::DbLocation;
    use crate::broker::handler::WriteConsistency;
    use crate::store::QUOTA_BYTES_PER_ITEM;
    use std::collections::HashMap;
    use std::path::PathBuf;

    fn config_from(pairs: &[(&str, &str)]) -> Result<HostConfig, super::ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        HostConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let config = config_from(&[]).expect("defaults");
        assert!(config.db_path.ends_with("focuskit.sqlite3"));
        assert_eq!(config.consistency, WriteConsistency::CompareAndSwap);
        assert_eq!(config.quota_bytes_per_item, Some(QUOTA_BYTES_PER_ITEM));
        assert_eq!(config.log_dir, None);
    }

    #[test]
    fn explicit_values_flow_into_broker_options() {
        let config = config_from(&[
            (ENV_DB_PATH, "/var/lib/focuskit/state.sqlite3"),
            (ENV_WRITE_MODE, "LWW"),
            (ENV_QUOTA_BYTES_PER_ITEM, "off"),
            (ENV_LOG_LEVEL, "warning"),
            (ENV_LOG_DIR, "  "),
        ])
        .expect("explicit config");
        assert_eq!(config.log_level, "warn");
        assert_eq!(config.log_dir, None);

        let options = config.broker_options();
        assert_eq!(
            options.db,
            DbLocation::File(PathBuf::from("/var/lib/focuskit/state.sqlite3"))
        );
        assert_eq!(options.consistency, WriteConsistency::LastWriteWins);
        assert_eq!(options.store.max_item_bytes, None);
    }

    #[test]
    fn invalid_values_name_the_variable() {
        let err = config_from(&[(ENV_WRITE_MODE, "eventual")]).expect_err("bad mode");
        assert_eq!(err.variable, ENV_WRITE_MODE);

        let err = config_from(&[(ENV_QUOTA_BYTES_PER_ITEM, "0")]).expect_err("zero quota");
        assert_eq!(err.variable, ENV_QUOTA_BYTES_PER_ITEM);
        assert!(err.to_string().contains(ENV_QUOTA_BYTES_PER_ITEM));
    }
}
