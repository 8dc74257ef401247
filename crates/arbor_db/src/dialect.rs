use sea_orm::DatabaseBackend;
use sea_orm::sea_query::{PostgresQueryBuilder, QueryStatementWriter, SqliteQueryBuilder, Values};

use arbor_core::{ArborError, ArborResult};

/// The closed set of supported backends. Everything dialect-specific in this
/// crate dispatches on this enum; adding a backend means adding match arms,
/// not scattering annotations.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Dialect {
    Postgres,
    Sqlite,
}

/// Classifies a connection URL by its scheme. Misconfiguration is a fatal
/// error raised here, before any engine is created.
pub fn resolve_dialect(connection_url: &str) -> ArborResult<Dialect> {
    if connection_url.starts_with("postgres") {
        Ok(Dialect::Postgres)
    } else if connection_url.starts_with("sqlite") {
        Ok(Dialect::Sqlite)
    } else {
        Err(ArborError::config(format!(
            "unrecognized dialect in connection url '{connection_url}'"
        )))
    }
}

impl Dialect {
    pub fn backend(self) -> DatabaseBackend {
        match self {
            Dialect::Postgres => DatabaseBackend::Postgres,
            Dialect::Sqlite => DatabaseBackend::Sqlite,
        }
    }

    pub fn from_backend(backend: DatabaseBackend) -> ArborResult<Self> {
        match backend {
            DatabaseBackend::Postgres => Ok(Dialect::Postgres),
            DatabaseBackend::Sqlite => Ok(Dialect::Sqlite),
            other => Err(ArborError::config(format!(
                "unsupported database backend {other:?}"
            ))),
        }
    }

    pub fn build_stmt<S: QueryStatementWriter>(self, stmt: &S) -> (String, Values) {
        match self {
            Dialect::Sqlite => stmt.build(SqliteQueryBuilder),
            Dialect::Postgres => stmt.build(PostgresQueryBuilder),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Dialect, resolve_dialect};
    use arbor_core::ArborError;

    #[test]
    fn resolves_known_schemes() {
        assert_eq!(
            resolve_dialect("postgresql+asyncpg://user@host/db").expect("pg"),
            Dialect::Postgres
        );
        assert_eq!(
            resolve_dialect("postgres://user@host/db").expect("pg"),
            Dialect::Postgres
        );
        assert_eq!(
            resolve_dialect("sqlite::memory:").expect("sqlite"),
            Dialect::Sqlite
        );
        assert_eq!(
            resolve_dialect("sqlite:///tmp/arbor.sqlite?mode=rwc").expect("sqlite"),
            Dialect::Sqlite
        );
    }

    #[test]
    fn unknown_scheme_is_a_config_error() {
        let err = resolve_dialect("mysql://user@host/db").expect_err("must fail");
        assert!(matches!(err, ArborError::Config { .. }));
    }
}
