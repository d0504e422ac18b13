//! In-memory connector over a fixed table list.
//!
//! Serves previously exported table metadata (the JSON list produced by
//! `schemalens tables`) and stands in for a live engine in tests.

use super::{ConnectionParams, ConnectorFactory, SchemaConnector};
use crate::error::SchemaLensError;
use crate::models::{EngineKind, TableMetadata};
use crate::Result;
use async_trait::async_trait;
use std::path::Path;

/// Reads a table-metadata JSON list from disk.
///
/// `null` is accepted wherever a list is expected.
///
/// # Errors
/// Returns `Io` if the file cannot be read and `Serialization` if it is not a
/// table-metadata list.
pub async fn load_tables_file(path: impl AsRef<Path>) -> Result<Vec<TableMetadata>> {
    let path = path.as_ref();
    let content = tokio::fs::read(path)
        .await
        .map_err(|e| SchemaLensError::Io {
            context: format!("Failed to read table metadata from {}", path.display()),
            source: e,
        })?;

    let tables: Vec<TableMetadata> =
        serde_json::from_slice(&content).map_err(|e| SchemaLensError::Serialization {
            context: format!("Invalid table metadata in {}", path.display()),
            source: e,
        })?;

    tracing::debug!("Loaded {} tables from {}", tables.len(), path.display());
    Ok(tables)
}

/// Connector that returns a fixed table list.
#[derive(Debug, Clone)]
pub struct StaticConnector {
    engine: EngineKind,
    tables: Vec<TableMetadata>,
}

impl StaticConnector {
    pub fn new(engine: EngineKind, tables: Vec<TableMetadata>) -> Self {
        Self { engine, tables }
    }

    /// Creates a connector serving the tables stored in a JSON file.
    pub async fn from_json_file(engine: EngineKind, path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(engine, load_tables_file(path).await?))
    }
}

#[async_trait]
impl SchemaConnector for StaticConnector {
    fn engine_kind(&self) -> EngineKind {
        self.engine
    }

    async fn test_connection(&self) -> Result<()> {
        Ok(())
    }

    async fn fetch_table_metadata(&self) -> Result<Vec<TableMetadata>> {
        Ok(self.tables.clone())
    }
}

/// Factory handing out [`StaticConnector`]s over one table list, whatever
/// engine the parameters name.
#[derive(Debug, Clone, Default)]
pub struct StaticConnectorFactory {
    tables: Vec<TableMetadata>,
}

impl StaticConnectorFactory {
    pub fn new(tables: Vec<TableMetadata>) -> Self {
        Self { tables }
    }
}

#[async_trait]
impl ConnectorFactory for StaticConnectorFactory {
    async fn connect(&self, params: &ConnectionParams) -> Result<Box<dyn SchemaConnector>> {
        Ok(Box::new(StaticConnector::new(
            params.engine,
            self.tables.clone(),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_load_tables_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"tableName":"users","columns":null,"primary_key":["id"],"indexes":null,"relationships":null}}]"#
        )
        .unwrap();

        let connector = StaticConnector::from_json_file(EngineKind::Postgres, file.path())
            .await
            .unwrap();
        let tables = connector.fetch_table_metadata().await.unwrap();

        assert_eq!(connector.engine_kind(), EngineKind::Postgres);
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].primary_key, vec!["id".to_string()]);
    }

    #[tokio::test]
    async fn test_load_tables_file_errors() {
        let err = load_tables_file("/nonexistent/tables.json").await.unwrap_err();
        assert!(matches!(err, SchemaLensError::Io { .. }));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"not": "a list"}}"#).unwrap();
        let err = load_tables_file(file.path()).await.unwrap_err();
        assert!(matches!(err, SchemaLensError::Serialization { .. }));
    }

    #[tokio::test]
    async fn test_factory_uses_requested_engine() {
        let factory = StaticConnectorFactory::new(vec![TableMetadata::new("t")]);
        let params = ConnectionParams::new(EngineKind::MySql, "shop");
        let connector = factory.connect(&params).await.unwrap();

        assert_eq!(connector.engine_kind(), EngineKind::MySql);
        assert_eq!(connector.fetch_table_metadata().await.unwrap().len(), 1);
    }
}
