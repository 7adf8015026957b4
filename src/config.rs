use std::net::SocketAddr;
use std::path::PathBuf;

use crate::archive::CascadeMode;

/// Application-level constants
pub const APP_NAME: &str = "clinic-records";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const ENV_DB_PATH: &str = "CLINIC_RECORDS_DB";
pub const ENV_BIND_ADDR: &str = "CLINIC_RECORDS_BIND";
pub const ENV_DOCUMENTS_DIR: &str = "CLINIC_RECORDS_DOCUMENTS_DIR";
pub const ENV_CASCADE_MODE: &str = "CLINIC_RECORDS_CASCADE_MODE";

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8080";

/// Get the application data directory: ~/.clinic-records/
/// Falls back to the working directory when no home is known.
pub fn app_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(format!(".{APP_NAME}"))
}

/// Default database location under the data directory.
pub fn default_db_path() -> PathBuf {
    app_data_dir().join("records.db")
}

/// Filter used when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "info,clinic_records=debug"
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Runtime configuration, read once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub db_path: PathBuf,
    pub bind_addr: SocketAddr,
    /// Root for stored document files; `None` disables file removal on purge.
    pub documents_dir: Option<PathBuf>,
    pub cascade_mode: CascadeMode,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let db_path = get(ENV_DB_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(default_db_path);

        let bind_addr = get(ENV_BIND_ADDR)
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string())
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::Invalid {
                key: ENV_BIND_ADDR,
                reason: e.to_string(),
            })?;

        let cascade_mode = match get(ENV_CASCADE_MODE) {
            Some(raw) => raw.parse::<CascadeMode>().map_err(|reason| ConfigError::Invalid {
                key: ENV_CASCADE_MODE,
                reason,
            })?,
            None => CascadeMode::default(),
        };

        Ok(Self {
            db_path,
            bind_addr,
            documents_dir: get(ENV_DOCUMENTS_DIR).map(PathBuf::from),
            cascade_mode,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn app_data_dir_is_named_after_app() {
        assert!(app_data_dir().ends_with(".clinic-records"));
        assert!(default_db_path().starts_with(app_data_dir()));
    }

    #[test]
    fn app_version_matches_cargo() {
        assert_eq!(APP_VERSION, "0.1.0");
    }

    #[test]
    fn defaults_when_unset() {
        let config = AppConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.db_path, default_db_path());
        assert_eq!(config.bind_addr.to_string(), DEFAULT_BIND_ADDR);
        assert_eq!(config.documents_dir, None);
        assert_eq!(config.cascade_mode, CascadeMode::Auto);
    }

    #[test]
    fn reads_overrides() {
        let config = AppConfig::from_lookup(lookup(&[
            (ENV_DB_PATH, "/tmp/records.db"),
            (ENV_BIND_ADDR, "0.0.0.0:9000"),
            (ENV_DOCUMENTS_DIR, "/srv/documents"),
            (ENV_CASCADE_MODE, "Compensating"),
        ]))
        .unwrap();
        assert_eq!(config.db_path, PathBuf::from("/tmp/records.db"));
        assert_eq!(config.bind_addr.port(), 9000);
        assert_eq!(config.documents_dir, Some(PathBuf::from("/srv/documents")));
        assert_eq!(config.cascade_mode, CascadeMode::Compensating);
    }

    #[test]
    fn blank_values_count_as_unset() {
        let config = AppConfig::from_lookup(lookup(&[(ENV_DOCUMENTS_DIR, "   ")])).unwrap();
        assert_eq!(config.documents_dir, None);
    }

    #[test]
    fn rejects_bad_values() {
        let err = AppConfig::from_lookup(lookup(&[(ENV_BIND_ADDR, "not an address")])).unwrap_err();
        assert!(err.to_string().contains(ENV_BIND_ADDR));

        let err = AppConfig::from_lookup(lookup(&[(ENV_CASCADE_MODE, "sometimes")])).unwrap_err();
        assert!(err.to_string().contains(ENV_CASCADE_MODE));
    }
}
