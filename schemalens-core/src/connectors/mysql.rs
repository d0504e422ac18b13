//! MySQL connector.
//!
//! Reads `information_schema` for the connection's default database
//! (`DATABASE()`). Catalog strings are cast to `CHAR` because some server
//! versions report them as binary.

use super::{ConnectionParams, SchemaConnector};
use crate::error::SchemaLensError;
use crate::models::{Column, EngineKind, Index, Relationship, TableMetadata};
use crate::Result;
use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions};
use sqlx::Executor;

const ENGINE: EngineKind = EngineKind::MySql;

const TABLES_QUERY: &str = r#"
    SELECT CAST(table_name AS CHAR)
    FROM information_schema.tables
    WHERE table_schema = DATABASE()
      AND table_type = 'BASE TABLE'
    ORDER BY table_name
"#;

const COLUMNS_QUERY: &str = r#"
    SELECT
        CAST(c.column_name AS CHAR),
        CAST(c.data_type AS CHAR),
        CAST(c.is_nullable = 'NO' AS SIGNED),
        CAST(EXISTS (
            SELECT 1
            FROM information_schema.statistics s
            WHERE s.table_schema = c.table_schema
              AND s.table_name = c.table_name
              AND s.column_name = c.column_name
              AND s.non_unique = 0
              AND s.index_name <> 'PRIMARY'
        ) AS SIGNED)
    FROM information_schema.columns c
    WHERE c.table_schema = DATABASE()
      AND c.table_name = ?
    ORDER BY c.ordinal_position
"#;

const PRIMARY_KEY_QUERY: &str = r#"
    SELECT CAST(column_name AS CHAR)
    FROM information_schema.key_column_usage
    WHERE table_schema = DATABASE()
      AND table_name = ?
      AND constraint_name = 'PRIMARY'
    ORDER BY ordinal_position
"#;

// referential_constraints has one row per key, unlike key_column_usage
const FOREIGN_KEYS_QUERY: &str = r#"
    SELECT CAST(constraint_name AS CHAR), CAST(referenced_table_name AS CHAR)
    FROM information_schema.referential_constraints
    WHERE constraint_schema = DATABASE()
      AND table_name = ?
    ORDER BY constraint_name
"#;

const INDEXES_QUERY: &str = r#"
    SELECT
        CAST(index_name AS CHAR),
        CAST(GROUP_CONCAT(column_name ORDER BY seq_in_index SEPARATOR ',') AS CHAR)
    FROM information_schema.statistics
    WHERE table_schema = DATABASE()
      AND table_name = ?
    GROUP BY index_name
    ORDER BY index_name
"#;

/// MySQL connector backed by a small sqlx pool.
pub struct MySqlConnector {
    pool: MySqlPool,
}

impl std::fmt::Debug for MySqlConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MySqlConnector")
            .field("pool_size", &self.pool.size())
            .field("pool_idle", &self.pool.num_idle())
            .finish()
    }
}

impl MySqlConnector {
    /// Opens a pool against the server named by `params`.
    ///
    /// # Errors
    /// Returns `Connection` if no session can be established.
    pub async fn connect(params: &ConnectionParams) -> Result<Self> {
        let mut options = MySqlConnectOptions::new()
            .host(&params.host)
            .port(params.effective_port().unwrap_or(3306))
            .database(&params.database);
        if let Some(username) = &params.username {
            options = options.username(username);
        }
        if let Some(password) = params.password() {
            options = options.password(password);
        }

        let pool = MySqlPoolOptions::new()
            .max_connections(params.max_connections)
            .acquire_timeout(params.connect_timeout)
            .after_connect(|conn, _meta| {
                Box::pin(async move {
                    conn.execute("SET SESSION TRANSACTION READ ONLY").await?;
                    Ok(())
                })
            })
            .connect_with(options)
            .await
            .map_err(|e| {
                SchemaLensError::connection_failed(ENGINE, format!("cannot reach {}", params), e)
            })?;

        Ok(Self { pool })
    }

    async fn table_names(&self) -> Result<Vec<String>> {
        sqlx::query_scalar::<_, String>(TABLES_QUERY)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| SchemaLensError::metadata_fetch_failed(ENGINE, "failed to list tables", e))
    }

    async fn table(&self, name: &str) -> Result<TableMetadata> {
        let columns = sqlx::query_as::<_, (String, String, i64, i64)>(COLUMNS_QUERY)
            .bind(name)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| SchemaLensError::metadata_fetch_failed_for_table(ENGINE, name, "columns", e))?
            .into_iter()
            .map(|(column_name, data_type, not_null, unique)| Column {
                name: column_name,
                data_type,
                not_null: not_null != 0,
                unique: unique != 0,
            })
            .collect();

        let primary_key = sqlx::query_scalar::<_, String>(PRIMARY_KEY_QUERY)
            .bind(name)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                SchemaLensError::metadata_fetch_failed_for_table(ENGINE, name, "primary key", e)
            })?;

        let relationships = sqlx::query_as::<_, (String, String)>(FOREIGN_KEYS_QUERY)
            .bind(name)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                SchemaLensError::metadata_fetch_failed_for_table(ENGINE, name, "foreign keys", e)
            })?
            .into_iter()
            .map(|(conname, related)| Relationship::new(conname, name, related))
            .collect();

        let indexes = sqlx::query_as::<_, (String, Option<String>)>(INDEXES_QUERY)
            .bind(name)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| SchemaLensError::metadata_fetch_failed_for_table(ENGINE, name, "indexes", e))?
            .into_iter()
            .map(|(index_name, columns)| {
                let columns = columns.unwrap_or_default();
                Index::new(index_name, columns.split(',').filter(|c| !c.is_empty()))
            })
            .collect();

        Ok(TableMetadata {
            name: name.to_string(),
            columns,
            primary_key,
            indexes,
            relationships,
        })
    }
}

#[async_trait]
impl SchemaConnector for MySqlConnector {
    fn engine_kind(&self) -> EngineKind {
        ENGINE
    }

    async fn test_connection(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| SchemaLensError::connection_failed(ENGINE, "connectivity probe failed", e))?;
        Ok(())
    }

    async fn fetch_table_metadata(&self) -> Result<Vec<TableMetadata>> {
        let started = std::time::Instant::now();
        let names = self.table_names().await?;
        tracing::debug!("Found {} MySQL base tables", names.len());

        let mut tables = Vec::with_capacity(names.len());
        for name in &names {
            tracing::trace!("Reading metadata for table '{}'", name);
            tables.push(self.table(name).await?);
        }

        tracing::info!(
            "Collected metadata for {} MySQL tables in {:.2}s",
            tables.len(),
            started.elapsed().as_secs_f64()
        );
        Ok(tables)
    }
}
