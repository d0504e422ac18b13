//! Engine connectors.
//!
//! A connector turns a live database into the engine-agnostic
//! [`TableMetadata`] list. There is one implementation per engine, chosen at
//! runtime by [`EngineKind`] through a [`ConnectorFactory`].
//!
//! # Module Structure
//! - `params`: Connection parameters (credentials kept out of logs)
//! - `memory`: Fixed in-memory connector for JSON input and tests
//! - Engine modules (postgres, mysql, sqlite, mssql), each behind its feature
//!
//! # Security Guarantees
//! - Catalog access only; no user data is read
//! - Credentials never appear in logs or error messages

use crate::error::SchemaLensError;
use crate::models::{EngineKind, TableMetadata};
use crate::Result;
use async_trait::async_trait;

pub mod memory;
pub mod params;

pub use memory::{StaticConnector, StaticConnectorFactory, load_tables_file};
pub use params::ConnectionParams;

#[cfg(feature = "postgresql")]
pub mod postgres;

#[cfg(feature = "mysql")]
pub mod mysql;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "mssql")]
pub mod mssql;

/// A connected handle to one database.
///
/// # Object Safety
/// This trait is object-safe, allowing for dynamic dispatch through
/// `Box<dyn SchemaConnector>`.
#[async_trait]
pub trait SchemaConnector: Send + Sync {
    /// Engine this connector talks to.
    fn engine_kind(&self) -> EngineKind;

    /// Runs a trivial query to prove the connection works.
    ///
    /// # Errors
    /// Returns `Connection` if the server cannot be queried.
    async fn test_connection(&self) -> Result<()>;

    /// Reads every base table of the current schema, ordered by name.
    ///
    /// The fetch is all-or-nothing: if any catalog query fails, no tables are
    /// returned.
    ///
    /// # Errors
    /// Returns `MetadataFetch` naming the table being read when a query fails.
    async fn fetch_table_metadata(&self) -> Result<Vec<TableMetadata>>;
}

/// Opens connectors. The snapshot holder is given one of these at
/// construction; tests substitute their own.
#[async_trait]
pub trait ConnectorFactory: Send + Sync {
    /// Opens a connector for `params.engine`.
    ///
    /// # Errors
    /// Returns `UnsupportedEngine` without touching the network when the
    /// engine is unavailable, or `Connection` when the server cannot be
    /// reached or rejects the credentials.
    async fn connect(&self, params: &ConnectionParams) -> Result<Box<dyn SchemaConnector>>;
}

/// Factory backed by the real engine drivers compiled into this build.
#[derive(Debug, Default, Clone, Copy)]
pub struct EngineConnectorFactory;

#[async_trait]
impl ConnectorFactory for EngineConnectorFactory {
    async fn connect(&self, params: &ConnectionParams) -> Result<Box<dyn SchemaConnector>> {
        params.validate()?;
        tracing::info!("Connecting to {}", params);

        match params.engine {
            #[cfg(feature = "postgresql")]
            EngineKind::Postgres => Ok(Box::new(postgres::PostgresConnector::connect(params).await?)),
            #[cfg(not(feature = "postgresql"))]
            EngineKind::Postgres => Err(not_compiled(EngineKind::Postgres, "postgresql")),

            #[cfg(feature = "mysql")]
            EngineKind::MySql => Ok(Box::new(mysql::MySqlConnector::connect(params).await?)),
            #[cfg(not(feature = "mysql"))]
            EngineKind::MySql => Err(not_compiled(EngineKind::MySql, "mysql")),

            #[cfg(feature = "sqlite")]
            EngineKind::Sqlite => Ok(Box::new(sqlite::SqliteConnector::connect(params).await?)),
            #[cfg(not(feature = "sqlite"))]
            EngineKind::Sqlite => Err(not_compiled(EngineKind::Sqlite, "sqlite")),

            #[cfg(feature = "mssql")]
            EngineKind::SqlServer => Ok(Box::new(mssql::SqlServerConnector::connect(params).await?)),
            #[cfg(not(feature = "mssql"))]
            EngineKind::SqlServer => Err(not_compiled(EngineKind::SqlServer, "mssql")),
        }
    }
}

#[allow(dead_code)]
fn not_compiled(engine: EngineKind, feature: &str) -> SchemaLensError {
    SchemaLensError::unsupported_engine(
        engine.tag(),
        format!("compile with --features {} to enable {} support", feature, engine.display_name()),
    )
}

/// Engines whose drivers are compiled into this build.
pub fn supported_engines() -> Vec<EngineKind> {
    EngineKind::ALL
        .into_iter()
        .filter(|engine| match engine {
            EngineKind::Postgres => cfg!(feature = "postgresql"),
            EngineKind::MySql => cfg!(feature = "mysql"),
            EngineKind::Sqlite => cfg!(feature = "sqlite"),
            EngineKind::SqlServer => cfg!(feature = "mssql"),
        })
        .collect()
}
