use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use arbor_core::{ArborError, ArborResult};

use crate::dialect::Dialect;

const DEFAULT_CONFIG_NAME: &str = "arbor.json";
const DEFAULT_SQLITE_FILE: &str = "arbor.sqlite";

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum DatabaseConfig {
    Sqlite { path: Option<String> },
    Postgres { url: String },
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PoolConfig {
    pub max_connections: Option<u32>,
    pub min_connections: Option<u32>,
    pub connect_timeout_ms: Option<u64>,
    pub acquire_timeout_ms: Option<u64>,
    pub idle_timeout_ms: Option<u64>,
    /// Mirror every statement into the log output. Off by default.
    pub echo: Option<bool>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ArborConfig {
    pub database: DatabaseConfig,
    pub pool: Option<PoolConfig>,
}

impl ArborConfig {
    pub fn default_sqlite(path: impl Into<String>) -> Self {
        Self {
            database: DatabaseConfig::Sqlite {
                path: Some(path.into()),
            },
            pool: None,
        }
    }

    /// An in-memory sqlite target, used by tests and ephemeral runs. Each
    /// engine built from this url gets its own private database.
    pub fn sqlite_memory() -> Self {
        Self {
            database: DatabaseConfig::Sqlite { path: None },
            pool: None,
        }
    }

    pub fn postgres(url: impl Into<String>) -> Self {
        Self {
            database: DatabaseConfig::Postgres { url: url.into() },
            pool: None,
        }
    }

    pub fn with_pool(mut self, pool: PoolConfig) -> Self {
        self.pool = Some(pool);
        self
    }

    pub fn load_or_init(base_dir: &Path) -> ArborResult<Self> {
        fs::create_dir_all(base_dir)
            .map_err(|err| ArborError::storage(format!("create config dir: {err}")))?;
        let config_path = base_dir.join(DEFAULT_CONFIG_NAME);
        if config_path.exists() {
            let raw = fs::read_to_string(&config_path)
                .map_err(|err| ArborError::storage(format!("read config: {err}")))?;
            let config: ArborConfig = serde_json::from_str(&raw)
                .map_err(|err| ArborError::config(err.to_string()))?;
            return Ok(config);
        }
        let default = ArborConfig::default_sqlite(DEFAULT_SQLITE_FILE);
        let payload = serde_json::to_string_pretty(&default)
            .map_err(|err| ArborError::storage(format!("serialize config: {err}")))?;
        fs::write(&config_path, payload)
            .map_err(|err| ArborError::storage(format!("write config: {err}")))?;
        Ok(default)
    }

    fn sqlite_path(&self, base_dir: &Path) -> Option<PathBuf> {
        match &self.database {
            DatabaseConfig::Sqlite { path: Some(path) } => {
                let candidate = PathBuf::from(path);
                if candidate.is_absolute() {
                    Some(candidate)
                } else {
                    Some(base_dir.join(candidate))
                }
            }
            _ => None,
        }
    }

    /// Builds the connection url the engine registry keys on. Sqlite file
    /// targets get `mode=rwc` so the first connection creates the file.
    pub fn connection_url(&self, base_dir: &Path) -> String {
        match &self.database {
            DatabaseConfig::Sqlite { path: Some(_) } => {
                let path = self
                    .sqlite_path(base_dir)
                    .unwrap_or_else(|| base_dir.join(DEFAULT_SQLITE_FILE));
                format!("sqlite://{}?mode=rwc", path.display())
            }
            DatabaseConfig::Sqlite { path: None } => "sqlite::memory:".to_string(),
            DatabaseConfig::Postgres { url } => url.clone(),
        }
    }

    pub fn dialect(&self) -> Dialect {
        match self.database {
            DatabaseConfig::Sqlite { .. } => Dialect::Sqlite,
            DatabaseConfig::Postgres { .. } => Dialect::Postgres,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::{ArborConfig, DatabaseConfig, PoolConfig};
    use crate::dialect::Dialect;

    #[test]
    fn sqlite_file_url_is_read_write_create() {
        let config = ArborConfig::default_sqlite("data/arbor.sqlite");
        let url = config.connection_url(Path::new("/srv/app"));
        assert_eq!(url, "sqlite:///srv/app/data/arbor.sqlite?mode=rwc");
        assert_eq!(config.dialect(), Dialect::Sqlite);
    }

    #[test]
    fn absolute_sqlite_path_ignores_base_dir() {
        let config = ArborConfig::default_sqlite("/var/lib/arbor.sqlite");
        let url = config.connection_url(Path::new("/srv/app"));
        assert_eq!(url, "sqlite:///var/lib/arbor.sqlite?mode=rwc");
    }

    #[test]
    fn memory_config_builds_memory_url() {
        let config = ArborConfig::sqlite_memory();
        assert_eq!(config.connection_url(Path::new("/tmp")), "sqlite::memory:");
    }

    #[test]
    fn postgres_url_passes_through() {
        let config = ArborConfig::postgres("postgres://app@db/arbor");
        assert_eq!(
            config.connection_url(Path::new("/tmp")),
            "postgres://app@db/arbor"
        );
        assert_eq!(config.dialect(), Dialect::Postgres);
    }

    #[test]
    fn config_round_trips_through_json() {
        let config = ArborConfig::postgres("postgres://app@db/arbor").with_pool(PoolConfig {
            max_connections: Some(8),
            echo: Some(true),
            ..PoolConfig::default()
        });
        let raw = serde_json::to_string(&config).expect("serialize");
        assert!(raw.contains("\"backend\":\"postgres\""), "raw: {raw}");
        let parsed: ArborConfig = serde_json::from_str(&raw).expect("parse");
        match parsed.database {
            DatabaseConfig::Postgres { url } => assert_eq!(url, "postgres://app@db/arbor"),
            other => panic!("unexpected database config: {other:?}"),
        }
        assert_eq!(parsed.pool.and_then(|pool| pool.max_connections), Some(8));
    }

    #[test]
    fn load_or_init_writes_then_reads_back() {
        let dir = tempfile::tempdir().expect("tempdir");
        let first = ArborConfig::load_or_init(dir.path()).expect("init");
        assert!(dir.path().join("arbor.json").exists());
        let second = ArborConfig::load_or_init(dir.path()).expect("reload");
        assert_eq!(
            serde_json::to_string(&first).expect("json"),
            serde_json::to_string(&second).expect("json")
        );
    }
}
