//! Engine and session management. Engines are cached per context and
//! connection profile so repeated lookups share one pool, and fresh sqlite
//! targets are bootstrapped exactly once.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use once_cell::sync::Lazy;
use sea_orm::sea_query::QueryStatementWriter;
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DatabaseTransaction,
    QueryResult, Statement, TransactionTrait,
};
use tokio::sync::Mutex;

use arbor_core::ArborResult;

use crate::config::{ArborConfig, PoolConfig};
use crate::dialect::{Dialect, resolve_dialect};
use crate::schema::{self, SchemaMetadata};

static NEXT_CONTEXT: AtomicU64 = AtomicU64::new(1);
static AMBIENT_CONTEXT: Lazy<ContextId> = Lazy::new(ContextId::next);

/// Scope token for engine caching. Callers that manage several isolated
/// runtimes mint one per runtime; everything else shares the ambient one.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct ContextId(u64);

impl ContextId {
    pub fn next() -> Self {
        Self(NEXT_CONTEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn ambient() -> Self {
        *AMBIENT_CONTEXT
    }
}

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
struct EngineKey {
    context: ContextId,
    url: String,
    echo: bool,
    connect_timeout_ms: Option<u64>,
}

impl EngineKey {
    fn new(context: ContextId, url: &str, pool: Option<&PoolConfig>) -> Self {
        Self {
            context,
            url: url.to_string(),
            echo: pool.and_then(|pool| pool.echo).unwrap_or(false),
            connect_timeout_ms: pool.and_then(|pool| pool.connect_timeout_ms),
        }
    }
}

#[derive(Debug)]
struct EngineInner {
    conn: DatabaseConnection,
    dialect: Dialect,
    url: String,
}

/// A live connection pool plus the dialect it speaks.
#[derive(Clone, Debug)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl Engine {
    pub async fn connect(url: &str, pool: Option<&PoolConfig>) -> ArborResult<Self> {
        let dialect = resolve_dialect(url)?;
        let echo = pool.and_then(|pool| pool.echo).unwrap_or(false);
        let mut options = ConnectOptions::new(url.to_string());
        options.sqlx_logging(echo);
        if let Some(pool) = pool {
            if let Some(max) = pool.max_connections {
                options.max_connections(max);
            }
            if let Some(min) = pool.min_connections {
                options.min_connections(min);
            }
            if let Some(timeout_ms) = pool.connect_timeout_ms {
                options.connect_timeout(Duration::from_millis(timeout_ms));
            }
            if let Some(timeout_ms) = pool.acquire_timeout_ms {
                options.acquire_timeout(Duration::from_millis(timeout_ms));
            }
            if let Some(timeout_ms) = pool.idle_timeout_ms {
                options.idle_timeout(Duration::from_millis(timeout_ms));
            }
        }
        if dialect == Dialect::Sqlite {
            // sqlite always runs on one pooled connection, whatever the
            // pool config says: the foreign-key pragma below is
            // per-connection, and every new in-memory connection would be
            // a distinct database
            options.max_connections(1);
            options.min_connections(1);
        }
        let conn = Database::connect(options).await?;
        if dialect == Dialect::Sqlite {
            conn.execute_raw(Statement::from_string(
                dialect.backend(),
                "PRAGMA foreign_keys = ON",
            ))
            .await?;
        }
        log::debug!("connected {dialect:?} engine for {url}");
        Ok(Self {
            inner: Arc::new(EngineInner {
                conn,
                dialect,
                url: url.to_string(),
            }),
        })
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.inner.conn
    }

    pub fn dialect(&self) -> Dialect {
        self.inner.dialect
    }

    pub fn url(&self) -> &str {
        &self.inner.url
    }
}

/// Hands out sessions bound to one engine. Cached alongside the engine so
/// every caller asking for the same profile gets the same factory.
#[derive(Clone, Debug)]
pub struct SessionFactory {
    engine: Engine,
}

impl SessionFactory {
    pub fn new(engine: Engine) -> Self {
        Self { engine }
    }

    pub fn session(&self) -> Session {
        Session {
            engine: self.engine.clone(),
        }
    }
}

/// A scoped handle for running statements against one engine.
#[derive(Clone, Debug)]
pub struct Session {
    engine: Engine,
}

impl Session {
    pub fn dialect(&self) -> Dialect {
        self.engine.dialect()
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub async fn execute<S: QueryStatementWriter>(&self, stmt: &S) -> ArborResult<u64> {
        let result = self
            .engine
            .connection()
            .execute_raw(self.statement(stmt))
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn query_one<S: QueryStatementWriter>(
        &self,
        stmt: &S,
    ) -> ArborResult<Option<QueryResult>> {
        let row = self
            .engine
            .connection()
            .query_one_raw(self.statement(stmt))
            .await?;
        Ok(row)
    }

    pub async fn query_all<S: QueryStatementWriter>(
        &self,
        stmt: &S,
    ) -> ArborResult<Vec<QueryResult>> {
        let rows = self
            .engine
            .connection()
            .query_all_raw(self.statement(stmt))
            .await?;
        Ok(rows)
    }

    pub async fn begin(&self) -> ArborResult<SessionTransaction> {
        let txn = self.engine.connection().begin().await?;
        Ok(SessionTransaction {
            dialect: self.engine.dialect(),
            txn,
        })
    }

    fn statement<S: QueryStatementWriter>(&self, stmt: &S) -> Statement {
        let dialect = self.engine.dialect();
        let (sql, values) = dialect.build_stmt(stmt);
        Statement::from_sql_and_values(dialect.backend(), sql, values)
    }
}

/// An open transaction with the same statement helpers as [`Session`].
#[derive(Debug)]
pub struct SessionTransaction {
    dialect: Dialect,
    txn: DatabaseTransaction,
}

impl SessionTransaction {
    pub async fn execute<S: QueryStatementWriter>(&self, stmt: &S) -> ArborResult<u64> {
        let result = self.txn.execute_raw(self.statement(stmt)).await?;
        Ok(result.rows_affected())
    }

    pub async fn query_one<S: QueryStatementWriter>(
        &self,
        stmt: &S,
    ) -> ArborResult<Option<QueryResult>> {
        Ok(self.txn.query_one_raw(self.statement(stmt)).await?)
    }

    pub async fn query_all<S: QueryStatementWriter>(
        &self,
        stmt: &S,
    ) -> ArborResult<Vec<QueryResult>> {
        Ok(self.txn.query_all_raw(self.statement(stmt)).await?)
    }

    pub async fn commit(self) -> ArborResult<()> {
        self.txn.commit().await?;
        Ok(())
    }

    pub async fn rollback(self) -> ArborResult<()> {
        self.txn.rollback().await?;
        Ok(())
    }

    fn statement<S: QueryStatementWriter>(&self, stmt: &S) -> Statement {
        let (sql, values) = self.dialect.build_stmt(stmt);
        Statement::from_sql_and_values(self.dialect.backend(), sql, values)
    }
}

/// Caches engines and session factories per context and connection
/// profile, and bootstraps fresh sqlite targets on first contact.
#[derive(Debug)]
pub struct Registry {
    metadata: SchemaMetadata,
    engines: Mutex<HashMap<EngineKey, Engine>>,
    factories: Mutex<HashMap<EngineKey, SessionFactory>>,
    bootstrap_runs: AtomicU64,
}

impl Registry {
    pub fn new(metadata: SchemaMetadata) -> Self {
        Self {
            metadata,
            engines: Mutex::new(HashMap::new()),
            factories: Mutex::new(HashMap::new()),
            bootstrap_runs: AtomicU64::new(0),
        }
    }

    pub fn metadata(&self) -> &SchemaMetadata {
        &self.metadata
    }

    pub async fn engine(
        &self,
        context: ContextId,
        config: &ArborConfig,
        base_dir: &Path,
    ) -> ArborResult<Engine> {
        let url = config.connection_url(base_dir);
        self.engine_for_url(context, &url, config.pool.as_ref())
            .await
    }

    /// Returns the cached engine for this profile, connecting and (for
    /// fresh sqlite targets) creating the schema on first use. The cache
    /// lock is held across connect and bootstrap so concurrent callers
    /// cannot race each other into a second pool.
    pub async fn engine_for_url(
        &self,
        context: ContextId,
        url: &str,
        pool: Option<&PoolConfig>,
    ) -> ArborResult<Engine> {
        let key = EngineKey::new(context, url, pool);
        let mut engines = self.engines.lock().await;
        if let Some(engine) = engines.get(&key) {
            return Ok(engine.clone());
        }
        let fresh = resolve_dialect(url)? == Dialect::Sqlite && is_fresh_sqlite_target(url);
        let engine = Engine::connect(url, pool).await?;
        if fresh {
            schema::create_all(&engine, &self.metadata).await?;
            self.bootstrap_runs.fetch_add(1, Ordering::Relaxed);
        }
        engines.insert(key, engine.clone());
        Ok(engine)
    }

    pub async fn session_factory(
        &self,
        context: ContextId,
        url: &str,
        pool: Option<&PoolConfig>,
    ) -> ArborResult<SessionFactory> {
        let key = EngineKey::new(context, url, pool);
        {
            let factories = self.factories.lock().await;
            if let Some(factory) = factories.get(&key) {
                return Ok(factory.clone());
            }
        }
        let engine = self.engine_for_url(context, url, pool).await?;
        let mut factories = self.factories.lock().await;
        let factory = factories
            .entry(key)
            .or_insert_with(|| SessionFactory::new(engine));
        Ok(factory.clone())
    }

    pub async fn session(
        &self,
        context: ContextId,
        url: &str,
        pool: Option<&PoolConfig>,
    ) -> ArborResult<Session> {
        let factory = self.session_factory(context, url, pool).await?;
        Ok(factory.session())
    }

    /// Creates the declared tables on the engine's target. Fresh sqlite
    /// targets already ran this during [`Registry::engine_for_url`];
    /// postgres targets always call it explicitly.
    pub async fn create_db(&self, engine: &Engine) -> ArborResult<()> {
        schema::create_all(engine, &self.metadata).await?;
        self.bootstrap_runs.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    pub async fn drop_db(&self, engine: &Engine) -> ArborResult<()> {
        schema::drop_all(engine, &self.metadata).await
    }

    /// Number of schema bootstraps this registry has run. One per fresh
    /// target regardless of how many times the engine was requested.
    pub fn bootstrap_runs(&self) -> u64 {
        self.bootstrap_runs.load(Ordering::Relaxed)
    }

    /// Drops every cached engine and factory, closing pools whose last
    /// handle lives in the cache.
    pub async fn dispose(&self) -> ArborResult<()> {
        self.factories.lock().await.clear();
        let mut engines = self.engines.lock().await;
        for (key, engine) in engines.drain() {
            match Arc::try_unwrap(engine.inner) {
                Ok(inner) => inner.conn.close().await?,
                Err(_) => log::debug!("engine for {} still referenced, left open", key.url),
            }
        }
        Ok(())
    }
}

fn is_memory_url(url: &str) -> bool {
    url.contains(":memory:") || url.contains("mode=memory")
}

/// A sqlite target counts as fresh when it is in-memory or when the
/// backing file does not exist yet.
fn is_fresh_sqlite_target(url: &str) -> bool {
    if is_memory_url(url) {
        return true;
    }
    match sqlite_file_path(url) {
        Some(path) => !Path::new(&path).exists(),
        None => true,
    }
}

fn sqlite_file_path(url: &str) -> Option<String> {
    let rest = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))?;
    let rest = rest.split('?').next().unwrap_or(rest);
    if rest.is_empty() {
        None
    } else {
        Some(rest.to_string())
    }
}
