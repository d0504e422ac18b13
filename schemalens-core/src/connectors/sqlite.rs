//! SQLite connector.
//!
//! Uses the table-valued pragma functions (`pragma_table_info` and friends)
//! so table names are bound as parameters rather than spliced into SQL.
//!
//! SQLite foreign keys are unnamed; each relationship is named after its
//! first referencing column.

use super::{ConnectionParams, SchemaConnector};
use crate::error::SchemaLensError;
use crate::models::{Column, EngineKind, Index, Relationship, TableMetadata};
use crate::Result;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::collections::HashSet;
use std::str::FromStr;

const ENGINE: EngineKind = EngineKind::Sqlite;

const TABLES_QUERY: &str = r#"
    SELECT name
    FROM sqlite_master
    WHERE type = 'table'
      AND name NOT LIKE 'sqlite_%'
    ORDER BY name
"#;

const COLUMNS_QUERY: &str = r#"
    SELECT name, type, "notnull", pk
    FROM pragma_table_info(?)
    ORDER BY cid
"#;

const FOREIGN_KEYS_QUERY: &str = r#"
    SELECT "table", "from"
    FROM pragma_foreign_key_list(?)
    WHERE seq = 0
    ORDER BY id
"#;

const INDEX_LIST_QUERY: &str = r#"
    SELECT name, "unique", origin
    FROM pragma_index_list(?)
    ORDER BY name
"#;

const INDEX_INFO_QUERY: &str = r#"
    SELECT name
    FROM pragma_index_info(?)
    ORDER BY seqno
"#;

/// SQLite connector over a single-connection pool.
pub struct SqliteConnector {
    pool: SqlitePool,
}

impl std::fmt::Debug for SqliteConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteConnector")
            .field("pool_size", &self.pool.size())
            .finish()
    }
}

impl SqliteConnector {
    /// Opens the database file named by `params.database` read-only, or a
    /// fresh in-memory database for `:memory:`.
    ///
    /// # Errors
    /// Returns `Connection` if the file does not exist or cannot be opened.
    pub async fn connect(params: &ConnectionParams) -> Result<Self> {
        let options = if params.is_in_memory() {
            SqliteConnectOptions::from_str("sqlite::memory:")
                .map_err(|e| SchemaLensError::connection_failed(ENGINE, "invalid options", e))?
        } else {
            SqliteConnectOptions::new()
                .filename(&params.database)
                .read_only(true)
                .create_if_missing(false)
        };

        Self::with_options(options, params).await
    }

    async fn with_options(options: SqliteConnectOptions, params: &ConnectionParams) -> Result<Self> {
        // one connection: every pooled connection to :memory: would be a new database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .acquire_timeout(params.connect_timeout)
            .connect_with(options)
            .await
            .map_err(|e| {
                SchemaLensError::connection_failed(ENGINE, format!("cannot open {}", params), e)
            })?;

        Ok(Self { pool })
    }

    /// Wraps an existing pool.
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn table_names(&self) -> Result<Vec<String>> {
        sqlx::query_scalar::<_, String>(TABLES_QUERY)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| SchemaLensError::metadata_fetch_failed(ENGINE, "failed to list tables", e))
    }

    async fn table(&self, name: &str) -> Result<TableMetadata> {
        let raw_columns = sqlx::query_as::<_, (String, String, i64, i64)>(COLUMNS_QUERY)
            .bind(name)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| SchemaLensError::metadata_fetch_failed_for_table(ENGINE, name, "columns", e))?;

        let mut pk_columns: Vec<(i64, String)> = raw_columns
            .iter()
            .filter(|(_, _, _, pk)| *pk > 0)
            .map(|(column, _, _, pk)| (*pk, column.clone()))
            .collect();
        pk_columns.sort();
        let primary_key: Vec<String> = pk_columns.into_iter().map(|(_, column)| column).collect();

        let index_list = sqlx::query_as::<_, (String, i64, String)>(INDEX_LIST_QUERY)
            .bind(name)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| SchemaLensError::metadata_fetch_failed_for_table(ENGINE, name, "indexes", e))?;

        let mut indexes = Vec::with_capacity(index_list.len());
        let mut unique_columns = HashSet::new();
        for (index_name, unique, origin) in index_list {
            let columns: Vec<String> = sqlx::query_scalar::<_, Option<String>>(INDEX_INFO_QUERY)
                .bind(&index_name)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| {
                    SchemaLensError::metadata_fetch_failed_for_table(ENGINE, name, "index columns", e)
                })?
                .into_iter()
                .flatten()
                .collect();

            if unique != 0 && origin != "pk" {
                if let [column] = columns.as_slice() {
                    unique_columns.insert(column.clone());
                }
            }
            indexes.push(Index::new(index_name, columns));
        }

        // An INTEGER PRIMARY KEY aliases the rowid and can never be NULL.
        let rowid_alias = match primary_key.as_slice() {
            [only] => Some(only.as_str()),
            _ => None,
        };
        let columns = raw_columns
            .into_iter()
            .map(|(column_name, data_type, not_null, _)| {
                let is_rowid = rowid_alias == Some(column_name.as_str())
                    && data_type.eq_ignore_ascii_case("integer");
                Column {
                    unique: unique_columns.contains(&column_name),
                    not_null: not_null != 0 || is_rowid,
                    name: column_name,
                    data_type,
                }
            })
            .collect();

        let relationships = sqlx::query_as::<_, (String, String)>(FOREIGN_KEYS_QUERY)
            .bind(name)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                SchemaLensError::metadata_fetch_failed_for_table(ENGINE, name, "foreign keys", e)
            })?
            .into_iter()
            .map(|(related, from)| Relationship::new(from, name, related))
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
impl SchemaConnector for SqliteConnector {
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
        let names = self.table_names().await?;
        tracing::debug!("Found {} SQLite tables", names.len());

        let mut tables = Vec::with_capacity(names.len());
        for name in &names {
            tables.push(self.table(name).await?);
        }

        tracing::info!("Collected metadata for {} SQLite tables", tables.len());
        Ok(tables)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_connector(ddl: &str) -> SqliteConnector {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::raw_sql(ddl).execute(&pool).await.unwrap();
        SqliteConnector::from_pool(pool)
    }

    #[tokio::test]
    async fn test_reads_columns_keys_and_indexes() {
        let connector = memory_connector(
            r#"
            CREATE TABLE customers (
                id INTEGER PRIMARY KEY,
                email TEXT UNIQUE,
                name TEXT NOT NULL
            );
            CREATE TABLE orders (
                id INTEGER PRIMARY KEY,
                customer_id INTEGER REFERENCES customers(id),
                note TEXT
            );
            CREATE INDEX orders_customer_idx ON orders (customer_id, id);
            "#,
        )
        .await;

        let tables = connector.fetch_table_metadata().await.unwrap();
        let names: Vec<_> = tables.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, ["customers", "orders"]);

        let customers = &tables[0];
        assert_eq!(customers.primary_key, vec!["id".to_string()]);
        assert!(customers.column("id").is_some_and(|c| c.not_null));
        assert!(customers.column("email").is_some_and(|c| c.unique && !c.not_null));
        assert!(customers.column("name").is_some_and(|c| c.not_null));
        assert!(customers.column_has_index("email"));

        let orders = &tables[1];
        assert_eq!(orders.relationships.len(), 1);
        assert_eq!(orders.relationships[0].conname, "customer_id");
        assert_eq!(orders.relationships[0].source_table, "orders");
        assert_eq!(orders.relationships[0].related_table, "customers");

        let index = orders
            .indexes
            .iter()
            .find(|i| i.name == "orders_customer_idx")
            .unwrap();
        assert_eq!(index.columns, vec!["customer_id".to_string(), "id".to_string()]);
    }

    #[tokio::test]
    async fn test_composite_primary_key_order() {
        let connector = memory_connector(
            "CREATE TABLE memberships (group_id INTEGER, user_id INTEGER, PRIMARY KEY (user_id, group_id));",
        )
        .await;

        let tables = connector.fetch_table_metadata().await.unwrap();
        assert_eq!(
            tables[0].primary_key,
            vec!["user_id".to_string(), "group_id".to_string()]
        );
        assert!(tables[0].columns.iter().all(|c| !c.not_null));
    }

    #[tokio::test]
    async fn test_empty_database() {
        let connector = memory_connector("SELECT 1;").await;
        assert!(connector.fetch_table_metadata().await.unwrap().is_empty());
        assert!(connector.test_connection().await.is_ok());
    }
}
