//! PostgreSQL connector.
//!
//! Reads the catalog of `current_schema()` through `information_schema` and
//! `pg_catalog`. Sessions are opened read-only.

use super::{ConnectionParams, SchemaConnector};
use crate::error::SchemaLensError;
use crate::models::{Column, EngineKind, Index, Relationship, TableMetadata};
use crate::Result;
use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use sqlx::Executor;

const ENGINE: EngineKind = EngineKind::Postgres;

const TABLES_QUERY: &str = r#"
    SELECT table_name::text
    FROM information_schema.tables
    WHERE table_schema = current_schema()
      AND table_type = 'BASE TABLE'
    ORDER BY table_name
"#;

const COLUMNS_QUERY: &str = r#"
    SELECT
        c.column_name::text,
        c.data_type::text,
        (c.is_nullable = 'NO') AS not_null,
        EXISTS (
            SELECT 1
            FROM information_schema.table_constraints tc
            JOIN information_schema.key_column_usage kcu
              ON kcu.constraint_name = tc.constraint_name
             AND kcu.constraint_schema = tc.constraint_schema
             AND kcu.table_name = tc.table_name
            WHERE tc.constraint_type = 'UNIQUE'
              AND tc.table_schema = c.table_schema
              AND tc.table_name = c.table_name
              AND kcu.column_name = c.column_name
        ) AS is_unique
    FROM information_schema.columns c
    WHERE c.table_schema = current_schema()
      AND c.table_name = $1
    ORDER BY c.ordinal_position
"#;

const PRIMARY_KEY_QUERY: &str = r#"
    SELECT kcu.column_name::text
    FROM information_schema.table_constraints tc
    JOIN information_schema.key_column_usage kcu
      ON kcu.constraint_name = tc.constraint_name
     AND kcu.table_schema = tc.table_schema
     AND kcu.table_name = tc.table_name
    WHERE tc.table_schema = current_schema()
      AND tc.table_name = $1
      AND tc.constraint_type = 'PRIMARY KEY'
    ORDER BY kcu.ordinal_position
"#;

const FOREIGN_KEYS_QUERY: &str = r#"
    SELECT con.conname::text, ref.relname::text
    FROM pg_constraint con
    JOIN pg_class src ON src.oid = con.conrelid
    JOIN pg_namespace ns ON ns.oid = src.relnamespace
    JOIN pg_class ref ON ref.oid = con.confrelid
    WHERE con.contype = 'f'
      AND ns.nspname = current_schema()
      AND src.relname = $1
    ORDER BY con.conname
"#;

// Expression-only indexes come back with an empty column list.
const INDEXES_QUERY: &str = r#"
    SELECT
        i.relname::text,
        COALESCE(
            array_agg(a.attname::text ORDER BY array_position(ix.indkey::int2[], a.attnum))
                FILTER (WHERE a.attname IS NOT NULL),
            ARRAY[]::text[]
        )
    FROM pg_index ix
    JOIN pg_class t ON t.oid = ix.indrelid
    JOIN pg_namespace ns ON ns.oid = t.relnamespace
    JOIN pg_class i ON i.oid = ix.indexrelid
    LEFT JOIN pg_attribute a
      ON a.attrelid = t.oid
     AND a.attnum = ANY(ix.indkey)
     AND a.attnum > 0
    WHERE ns.nspname = current_schema()
      AND t.relname = $1
    GROUP BY i.relname
    ORDER BY i.relname
"#;

/// PostgreSQL connector backed by a small sqlx pool.
pub struct PostgresConnector {
    pool: PgPool,
}

impl std::fmt::Debug for PostgresConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresConnector")
            .field("pool_size", &self.pool.size())
            .field("pool_idle", &self.pool.num_idle())
            .finish()
    }
}

impl PostgresConnector {
    /// Opens a pool against the server named by `params`.
    ///
    /// # Errors
    /// Returns `Connection` if no session can be established.
    pub async fn connect(params: &ConnectionParams) -> Result<Self> {
        let mut options = PgConnectOptions::new()
            .host(&params.host)
            .port(params.effective_port().unwrap_or(5432))
            .database(&params.database)
            .application_name("schemalens");
        if let Some(username) = &params.username {
            options = options.username(username);
        }
        if let Some(password) = params.password() {
            options = options.password(password);
        }

        let pool = PgPoolOptions::new()
            .max_connections(params.max_connections)
            .acquire_timeout(params.connect_timeout)
            .after_connect(|conn, _meta| {
                Box::pin(async move {
                    conn.execute("SET default_transaction_read_only = on").await?;
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
        let columns = sqlx::query_as::<_, (String, String, bool, bool)>(COLUMNS_QUERY)
            .bind(name)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| SchemaLensError::metadata_fetch_failed_for_table(ENGINE, name, "columns", e))?
            .into_iter()
            .map(|(column_name, data_type, not_null, unique)| Column {
                name: column_name,
                data_type,
                not_null,
                unique,
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

        let indexes = sqlx::query_as::<_, (String, Vec<String>)>(INDEXES_QUERY)
            .bind(name)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| SchemaLensError::metadata_fetch_failed_for_table(ENGINE, name, "indexes", e))?
            .into_iter()
            .map(|(index_name, columns)| Index::new(index_name, columns))
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
impl SchemaConnector for PostgresConnector {
    fn engine_kind(&self) -> EngineKind {
        ENGINE
    }

    async fn test_connection(&self) -> Result<()> {
        let result: i32 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| SchemaLensError::connection_failed(ENGINE, "connectivity probe failed", e))?;

        if result != 1 {
            return Err(SchemaLensError::configuration(
                "Basic connectivity test failed: unexpected result",
            ));
        }
        Ok(())
    }

    async fn fetch_table_metadata(&self) -> Result<Vec<TableMetadata>> {
        let started = std::time::Instant::now();
        let names = self.table_names().await?;
        tracing::debug!("Found {} PostgreSQL base tables", names.len());

        let mut tables = Vec::with_capacity(names.len());
        for name in &names {
            tracing::trace!("Reading metadata for table '{}'", name);
            tables.push(self.table(name).await?);
        }

        tracing::info!(
            "Collected metadata for {} PostgreSQL tables in {:.2}s",
            tables.len(),
            started.elapsed().as_secs_f64()
        );
        Ok(tables)
    }
}
