//! SQL Server connector.
//!
//! Reads the `sys.*` catalog views for user tables in the login's default
//! schema (`SCHEMA_NAME()`), over a single tiberius client.

use super::{ConnectionParams, SchemaConnector};
use crate::error::SchemaLensError;
use crate::models::{Column, EngineKind, Index, Relationship, TableMetadata};
use crate::Result;
use async_trait::async_trait;
use tiberius::{AuthMethod, Client, Config, Row};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};

const ENGINE: EngineKind = EngineKind::SqlServer;

const TABLES_QUERY: &str = r#"
    SELECT t.name
    FROM sys.tables t
    WHERE t.is_ms_shipped = 0
      AND t.schema_id = SCHEMA_ID()
    ORDER BY t.name
"#;

const COLUMNS_QUERY: &str = r#"
    SELECT
        c.name,
        ty.name,
        CAST(CASE WHEN c.is_nullable = 0 THEN 1 ELSE 0 END AS bit),
        CAST(CASE WHEN EXISTS (
            SELECT 1
            FROM sys.index_columns ic
            JOIN sys.indexes i ON i.object_id = ic.object_id AND i.index_id = ic.index_id
            WHERE ic.object_id = c.object_id
              AND ic.column_id = c.column_id
              AND i.is_unique_constraint = 1
        ) THEN 1 ELSE 0 END AS bit)
    FROM sys.columns c
    JOIN sys.types ty ON ty.user_type_id = c.user_type_id
    WHERE c.object_id = OBJECT_ID(QUOTENAME(SCHEMA_NAME()) + '.' + QUOTENAME(@P1))
    ORDER BY c.column_id
"#;

const PRIMARY_KEY_QUERY: &str = r#"
    SELECT c.name
    FROM sys.indexes i
    JOIN sys.index_columns ic ON ic.object_id = i.object_id AND ic.index_id = i.index_id
    JOIN sys.columns c ON c.object_id = ic.object_id AND c.column_id = ic.column_id
    WHERE i.is_primary_key = 1
      AND i.object_id = OBJECT_ID(QUOTENAME(SCHEMA_NAME()) + '.' + QUOTENAME(@P1))
    ORDER BY ic.key_ordinal
"#;

const FOREIGN_KEYS_QUERY: &str = r#"
    SELECT fk.name, OBJECT_NAME(fk.referenced_object_id)
    FROM sys.foreign_keys fk
    WHERE fk.parent_object_id = OBJECT_ID(QUOTENAME(SCHEMA_NAME()) + '.' + QUOTENAME(@P1))
    ORDER BY fk.name
"#;

// one row per (index, key column); grouped client side
const INDEXES_QUERY: &str = r#"
    SELECT i.name, c.name
    FROM sys.indexes i
    JOIN sys.index_columns ic
      ON ic.object_id = i.object_id
     AND ic.index_id = i.index_id
     AND ic.is_included_column = 0
    JOIN sys.columns c ON c.object_id = ic.object_id AND c.column_id = ic.column_id
    WHERE i.object_id = OBJECT_ID(QUOTENAME(SCHEMA_NAME()) + '.' + QUOTENAME(@P1))
      AND i.name IS NOT NULL
    ORDER BY i.name, ic.key_ordinal
"#;

/// SQL Server connector. Tiberius clients are not shareable, so queries are
/// serialized through a mutex.
pub struct SqlServerConnector {
    client: Mutex<Client<Compat<TcpStream>>>,
}

impl std::fmt::Debug for SqlServerConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlServerConnector").finish_non_exhaustive()
    }
}

impl SqlServerConnector {
    /// Connects with SQL Server authentication.
    ///
    /// # Errors
    /// Returns `Connection` if the TCP connection or login fails, or does not
    /// finish within the connect timeout.
    pub async fn connect(params: &ConnectionParams) -> Result<Self> {
        let mut config = Config::new();
        config.host(&params.host);
        config.port(params.effective_port().unwrap_or(1433));
        config.database(&params.database);
        config.authentication(AuthMethod::sql_server(
            params.username.as_deref().unwrap_or_default(),
            params.password().unwrap_or_default(),
        ));
        config.trust_cert();

        let connect = async {
            let tcp = TcpStream::connect(config.get_addr()).await.map_err(|e| {
                SchemaLensError::connection_failed(ENGINE, format!("cannot reach {}", params), e)
            })?;
            tcp.set_nodelay(true).map_err(|e| {
                SchemaLensError::connection_failed(ENGINE, "failed to configure socket", e)
            })?;

            Client::connect(config.clone(), tcp.compat_write())
                .await
                .map_err(|e| SchemaLensError::connection_failed(ENGINE, "login failed", e))
        };

        let client = tokio::time::timeout(params.connect_timeout, connect)
            .await
            .map_err(|e| {
                SchemaLensError::connection_failed(ENGINE, format!("timed out reaching {}", params), e)
            })??;

        Ok(Self {
            client: Mutex::new(client),
        })
    }

    async fn rows(&self, sql: &str, table: Option<&str>, what: &str) -> Result<Vec<Row>> {
        let fail = |e: tiberius::error::Error| match table {
            Some(table) => SchemaLensError::metadata_fetch_failed_for_table(ENGINE, table, what, e),
            None => SchemaLensError::metadata_fetch_failed(ENGINE, format!("failed to read {}", what), e),
        };

        let mut client = self.client.lock().await;
        let stream = match table {
            Some(table) => client.query(sql, &[&table]).await,
            None => client.query(sql, &[]).await,
        }
        .map_err(fail)?;
        stream.into_first_result().await.map_err(fail)
    }

    async fn table(&self, name: &str) -> Result<TableMetadata> {
        let mut columns = Vec::new();
        for row in self.rows(COLUMNS_QUERY, Some(name), "columns").await? {
            columns.push(Column {
                name: text(&row, 0, name)?,
                data_type: text(&row, 1, name)?,
                not_null: flag(&row, 2, name)?,
                unique: flag(&row, 3, name)?,
            });
        }

        let primary_key = self
            .rows(PRIMARY_KEY_QUERY, Some(name), "primary key")
            .await?
            .iter()
            .map(|row| text(row, 0, name))
            .collect::<Result<Vec<_>>>()?;

        let mut relationships = Vec::new();
        for row in self.rows(FOREIGN_KEYS_QUERY, Some(name), "foreign keys").await? {
            relationships.push(Relationship::new(text(&row, 0, name)?, name, text(&row, 1, name)?));
        }

        let mut indexes: Vec<Index> = Vec::new();
        for row in self.rows(INDEXES_QUERY, Some(name), "indexes").await? {
            let index_name = text(&row, 0, name)?;
            let column = text(&row, 1, name)?;
            match indexes.last_mut() {
                Some(index) if index.name == index_name => index.columns.push(column),
                _ => indexes.push(Index::new(index_name, [column])),
            }
        }

        Ok(TableMetadata {
            name: name.to_string(),
            columns,
            primary_key,
            indexes,
            relationships,
        })
    }
}

fn text(row: &Row, idx: usize, table: &str) -> Result<String> {
    row.try_get::<&str, _>(idx)
        .map_err(|e| SchemaLensError::metadata_fetch_failed_for_table(ENGINE, table, "catalog row", e))
        .map(|value| value.unwrap_or_default().to_string())
}

fn flag(row: &Row, idx: usize, table: &str) -> Result<bool> {
    row.try_get::<bool, _>(idx)
        .map_err(|e| SchemaLensError::metadata_fetch_failed_for_table(ENGINE, table, "catalog row", e))
        .map(|value| value.unwrap_or(false))
}

#[async_trait]
impl SchemaConnector for SqlServerConnector {
    fn engine_kind(&self) -> EngineKind {
        ENGINE
    }

    async fn test_connection(&self) -> Result<()> {
        let mut client = self.client.lock().await;
        client
            .simple_query("SELECT 1")
            .await
            .map_err(|e| SchemaLensError::connection_failed(ENGINE, "connectivity probe failed", e))?
            .into_results()
            .await
            .map_err(|e| SchemaLensError::connection_failed(ENGINE, "connectivity probe failed", e))?;
        Ok(())
    }

    async fn fetch_table_metadata(&self) -> Result<Vec<TableMetadata>> {
        let started = std::time::Instant::now();
        let names = self
            .rows(TABLES_QUERY, None, "table list")
            .await?
            .iter()
            .map(|row| {
                row.try_get::<&str, _>(0)
                    .map(|name| name.unwrap_or_default().to_string())
                    .map_err(|e| {
                        SchemaLensError::metadata_fetch_failed(ENGINE, "failed to read table list", e)
                    })
            })
            .collect::<Result<Vec<_>>>()?;
        tracing::debug!("Found {} SQL Server user tables", names.len());

        let mut tables = Vec::with_capacity(names.len());
        for name in &names {
            tables.push(self.table(name).await?);
        }

        tracing::info!(
            "Collected metadata for {} SQL Server tables in {:.2}s",
            tables.len(),
            started.elapsed().as_secs_f64()
        );
        Ok(tables)
    }
}
