//! Backing-database configuration.

use std::env;

use crate::error::{ErrorCode, StorageError, StorageResult};

/// Environment variable holding the database user name.
pub const ENV_DB_USERNAME: &str = "AZURITE_DB_USERNAME";
/// Environment variable holding the database password.
pub const ENV_DB_PASSWORD: &str = "AZURITE_DB_PASSWORD";
/// Environment variable holding the database name (or SQLite file path).
pub const ENV_DB_NAME: &str = "AZURITE_DB_NAME";
/// Environment variable holding the database host name.
pub const ENV_DB_HOSTNAME: &str = "AZURITE_DB_HOSTNAME";
/// Environment variable selecting the database dialect.
pub const ENV_DB_DIALECT: &str = "AZURITE_DB_DIALECT";

/// SQL dialect of the backing store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DbDialect {
    #[default]
    Sqlite,
    Mysql,
}

impl DbDialect {
    pub fn as_str(&self) -> &'static str {
        match self {
            DbDialect::Sqlite => "sqlite",
            DbDialect::Mysql => "mysql",
        }
    }

    pub fn parse(s: &str) -> StorageResult<Self> {
        match s.to_lowercase().as_str() {
            "sqlite" | "sqlite3" => Ok(DbDialect::Sqlite),
            "mysql" | "mariadb" => Ok(DbDialect::Mysql),
            other => Err(StorageError::with_message(
                ErrorCode::InvalidInput,
                format!("unsupported database dialect `{other}`; expected sqlite or mysql"),
            )),
        }
    }
}

/// Connection configuration for the metadata database.
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub dialect: DbDialect,
    pub uri: String,
}

impl DbConfig {
    /// Builds a configuration from an explicit connection URI.
    pub fn from_uri(uri: impl Into<String>) -> StorageResult<Self> {
        let uri = uri.into();
        let scheme = uri.split(':').next().unwrap_or_default();
        let dialect = DbDialect::parse(scheme)?;
        Ok(Self { dialect, uri })
    }

    /// Builds a configuration from `AZURITE_DB_*` environment variables.
    ///
    /// Falls back to an in-process SQLite file named `azurite_blob.db` when
    /// nothing is configured.
    pub fn from_env() -> StorageResult<Self> {
        let dialect = match env::var(ENV_DB_DIALECT) {
            Ok(value) => DbDialect::parse(&value)?,
            Err(_) => DbDialect::default(),
        };

        let name = env::var(ENV_DB_NAME).unwrap_or_else(|_| "azurite_blob.db".to_string());

        let uri = match dialect {
            DbDialect::Sqlite => format!("sqlite://{name}?mode=rwc"),
            DbDialect::Mysql => {
                let username = env::var(ENV_DB_USERNAME).unwrap_or_else(|_| "root".to_string());
                let password = env::var(ENV_DB_PASSWORD).unwrap_or_default();
                let hostname =
                    env::var(ENV_DB_HOSTNAME).unwrap_or_else(|_| "127.0.0.1".to_string());
                if password.is_empty() {
                    format!("mysql://{username}@{hostname}/{name}")
                } else {
                    format!("mysql://{username}:{password}@{hostname}/{name}")
                }
            }
        };

        Ok(Self { dialect, uri })
    }

    /// Configuration for a SQLite database at the given path, created on
    /// first use.
    pub fn sqlite(path: impl AsRef<str>) -> Self {
        Self {
            dialect: DbDialect::Sqlite,
            uri: format!("sqlite://{}?mode=rwc", path.as_ref()),
        }
    }
}
