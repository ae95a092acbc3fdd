#![cfg_attr(
    not(any(feature = "pg", feature = "sqlite")),
    allow(unused_imports, unused_variables, dead_code, unreachable_code)
)]

//! Database access for the OData query engine.
//!
//! A [`DbHandle`] owns one sqlx pool, reports the product name the
//! matching SQL dialect is picked by, and runs rendered statements as the
//! engine's [`odata_query::QueryExecutor`].
//!
//! # Features
//! - `pg`, `sqlite`: enable the sqlx backends
//!
//! # Example
//! ```rust,no_run
//! # async fn run() -> odata_db::Result<()> {
//! use odata_db::{ConnectOpts, DbHandle};
//!
//! let db = DbHandle::connect("sqlite::memory:", ConnectOpts::default()).await?;
//! let processor = db.processor();
//! tracing::info!(dialect = processor.name(), "database ready");
//! db.close().await;
//! # Ok(())
//! # }
//! ```

pub mod exec;

use std::sync::Arc;
use std::time::Duration;

use odata_criteria::{create_processor, DatabaseProcessor};
#[cfg(feature = "pg")]
use sqlx::{postgres::PgPoolOptions, PgPool};
#[cfg(feature = "sqlite")]
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use thiserror::Error;

/// Library-local result type.
pub type Result<T> = std::result::Result<T, DbError>;

/// Typed error for the DB handle and the executor.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("Unknown DSN: {0}")]
    UnknownDsn(String),

    #[error("Feature not enabled: {0}")]
    FeatureDisabled(&'static str),

    #[error("cannot bind {0} parameter")]
    Bind(&'static str),

    #[error("cannot decode column {position} ({alias}): {message}")]
    Decode {
        position: usize,
        alias: String,
        message: String,
    },

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

impl From<DbError> for odata_core::Error {
    fn from(e: DbError) -> Self {
        odata_core::Error::Db(e.to_string())
    }
}

/// Supported engines.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DbEngine {
    Postgres,
    Sqlite,
}

impl DbEngine {
    /// Product name as the drivers of these engines report it.
    pub fn product_name(self) -> &'static str {
        match self {
            DbEngine::Postgres => "PostgreSQL",
            DbEngine::Sqlite => "SQLite",
        }
    }
}

/// Connection options.
/// Each driver applies the subset it supports.
#[derive(Clone, Debug)]
pub struct ConnectOpts {
    /// Maximum number of connections in the pool.
    pub max_conns: Option<u32>,
    /// Minimum number of connections in the pool.
    pub min_conns: Option<u32>,
    /// Timeout to acquire a connection from the pool.
    pub acquire_timeout: Option<Duration>,
    /// Idle timeout before a connection is closed.
    pub idle_timeout: Option<Duration>,
    /// Maximum lifetime for a connection.
    pub max_lifetime: Option<Duration>,
}

impl Default for ConnectOpts {
    fn default() -> Self {
        Self {
            max_conns: Some(10),
            min_conns: None,
            acquire_timeout: Some(Duration::from_secs(30)),
            idle_timeout: None,
            max_lifetime: None,
        }
    }
}

/// One concrete sqlx pool.
#[derive(Clone, Debug)]
pub enum DbPool {
    #[cfg(feature = "pg")]
    Postgres(PgPool),
    #[cfg(feature = "sqlite")]
    Sqlite(SqlitePool),
}

/// Main handle.
#[derive(Debug)]
pub struct DbHandle {
    engine: DbEngine,
    pool: DbPool,
    dsn: String,
}

macro_rules! pool_options {
    ($options:expr, $opts:expr) => {{
        let mut o = $options;
        if let Some(n) = $opts.max_conns {
            o = o.max_connections(n);
        }
        if let Some(n) = $opts.min_conns {
            o = o.min_connections(n);
        }
        if let Some(t) = $opts.acquire_timeout {
            o = o.acquire_timeout(t);
        }
        if let Some(t) = $opts.idle_timeout {
            o = o.idle_timeout(t);
        }
        if let Some(t) = $opts.max_lifetime {
            o = o.max_lifetime(t);
        }
        o
    }};
}

impl DbHandle {
    /// Detect engine by DSN.
    ///
    /// Only the scheme prefix is looked at.
    pub fn detect(dsn: &str) -> Result<DbEngine> {
        let s = dsn.trim_start();
        if s.starts_with("postgres://") || s.starts_with("postgresql://") {
            Ok(DbEngine::Postgres)
        } else if s.starts_with("sqlite:") {
            Ok(DbEngine::Sqlite)
        } else {
            Err(DbError::UnknownDsn(redact_credentials_in_dsn(Some(dsn))))
        }
    }

    /// Connect and build handle.
    pub async fn connect(dsn: &str, opts: ConnectOpts) -> Result<Self> {
        let engine = Self::detect(dsn)?;
        tracing::debug!(
            dsn = %redact_credentials_in_dsn(Some(dsn)),
            ?engine,
            "connecting database pool"
        );
        match engine {
            #[cfg(feature = "pg")]
            DbEngine::Postgres => {
                let pool = pool_options!(PgPoolOptions::new(), opts)
                    .connect(dsn)
                    .await?;
                Ok(Self {
                    engine,
                    pool: DbPool::Postgres(pool),
                    dsn: dsn.to_string(),
                })
            }
            #[cfg(feature = "sqlite")]
            DbEngine::Sqlite => {
                let pool = pool_options!(SqlitePoolOptions::new(), opts)
                    .connect(dsn)
                    .await?;
                Ok(Self {
                    engine,
                    pool: DbPool::Sqlite(pool),
                    dsn: dsn.to_string(),
                })
            }
            #[cfg(not(feature = "pg"))]
            DbEngine::Postgres => Err(DbError::FeatureDisabled("PostgreSQL feature not enabled")),
            #[cfg(not(feature = "sqlite"))]
            DbEngine::Sqlite => Err(DbError::FeatureDisabled("SQLite feature not enabled")),
        }
    }

    /// Graceful pool close.
    pub async fn close(self) {
        match self.pool {
            #[cfg(feature = "pg")]
            DbPool::Postgres(p) => p.close().await,
            #[cfg(feature = "sqlite")]
            DbPool::Sqlite(p) => p.close().await,
        }
    }

    pub fn engine(&self) -> DbEngine {
        self.engine
    }

    /// DSN with the password masked.
    pub fn dsn(&self) -> String {
        redact_credentials_in_dsn(Some(&self.dsn))
    }

    pub fn product_name(&self) -> &'static str {
        self.engine.product_name()
    }

    /// SQL dialect of this database.
    pub fn processor(&self) -> Arc<dyn DatabaseProcessor> {
        create_processor(self.product_name())
    }

    /// Version string reported by the server.
    pub async fn server_version(&self) -> Result<String> {
        match &self.pool {
            #[cfg(feature = "pg")]
            DbPool::Postgres(p) => Ok(sqlx::query_scalar("SHOW server_version")
                .fetch_one(p)
                .await?),
            #[cfg(feature = "sqlite")]
            DbPool::Sqlite(p) => Ok(sqlx::query_scalar("SELECT sqlite_version()")
                .fetch_one(p)
                .await?),
        }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    #[cfg(feature = "pg")]
    pub fn sqlx_postgres(&self) -> Option<&PgPool> {
        match self.pool {
            DbPool::Postgres(ref p) => Some(p),
            #[cfg(feature = "sqlite")]
            _ => None,
        }
    }

    #[cfg(feature = "sqlite")]
    pub fn sqlx_sqlite(&self) -> Option<&SqlitePool> {
        match self.pool {
            DbPool::Sqlite(ref p) => Some(p),
            #[cfg(feature = "pg")]
            _ => None,
        }
    }
}

/// Mask the password of a URL style DSN for logging.
pub fn redact_credentials_in_dsn(dsn: Option<&str>) -> String {
    match dsn {
        Some(dsn) if dsn.contains('@') => {
            if let Ok(mut parsed) = url::Url::parse(dsn) {
                if parsed.password().is_some() {
                    let _ = parsed.set_password(Some("***"));
                }
                parsed.to_string()
            } else {
                "***".to_string()
            }
        }
        Some(dsn) => dsn.to_string(),
        None => "none".to_string(),
    }
}
