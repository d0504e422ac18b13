//! Schema snapshot holder.
//!
//! The holder owns the one active [`Snapshot`] of a session and orchestrates
//! fetch, graph and verification against it. Snapshots are immutable and
//! shared as `Arc`s: a fetch builds a complete new snapshot and swaps it in,
//! so a verification that already holds the previous one keeps reading a
//! consistent table list and graph.

use crate::connectors::{ConnectionParams, ConnectorFactory, EngineConnectorFactory};
use crate::error::SchemaLensError;
use crate::graph::{Graph, build_graph};
use crate::integrity::{IntegrityVerifier, SchemaVerificationResults, VerifierConfig};
use crate::models::{EngineKind, TableMetadata};
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, RwLock};

/// One fetched schema and the graph derived from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Increases by one with every snapshot a holder installs.
    pub version: u64,
    /// Engine the tables came from; unknown for imported table lists.
    pub engine: Option<EngineKind>,
    pub fetched_at: DateTime<Utc>,
    pub tables: Vec<TableMetadata>,
    pub graph: Graph,
}

impl Snapshot {
    /// Builds a snapshot and its graph from a table list.
    pub fn new(version: u64, engine: Option<EngineKind>, tables: Vec<TableMetadata>) -> Self {
        let graph = build_graph(&tables);
        Self {
            version,
            engine,
            fetched_at: Utc::now(),
            tables,
            graph,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

/// Holder of the current schema snapshot.
///
/// # Example
///
/// ```rust,no_run
/// use schemalens_core::connectors::ConnectionParams;
/// use schemalens_core::models::EngineKind;
/// use schemalens_core::snapshot::SchemaSnapshotHolder;
///
/// # async fn example() -> schemalens_core::Result<()> {
/// let holder = SchemaSnapshotHolder::default();
/// let params = ConnectionParams::new(EngineKind::Sqlite, "app.db");
///
/// holder.fetch_schema(&params).await?;
/// let graph = holder.build_graph().await;
/// let report = holder.verify().await?;
/// println!("{} tables, {} issues", graph.node_count(), report.issue_count());
/// # Ok(())
/// # }
/// ```
pub struct SchemaSnapshotHolder {
    factory: Arc<dyn ConnectorFactory>,
    verifier: IntegrityVerifier,
    current: RwLock<Option<Arc<Snapshot>>>,
    // serializes fetches so versions are installed in order
    fetch_lock: Mutex<()>,
    last_version: AtomicU64,
}

impl std::fmt::Debug for SchemaSnapshotHolder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaSnapshotHolder")
            .field("verifier", &self.verifier)
            .field("last_version", &self.last_version.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl Default for SchemaSnapshotHolder {
    fn default() -> Self {
        Self::new(Arc::new(EngineConnectorFactory), VerifierConfig::default())
    }
}

impl SchemaSnapshotHolder {
    /// Creates an empty holder that opens connectors through `factory`.
    pub fn new(factory: Arc<dyn ConnectorFactory>, verifier_config: VerifierConfig) -> Self {
        Self {
            factory,
            verifier: IntegrityVerifier::new(verifier_config),
            current: RwLock::new(None),
            fetch_lock: Mutex::new(()),
            last_version: AtomicU64::new(0),
        }
    }

    /// Creates an empty holder using `factory` and the default verifier
    /// configuration.
    pub fn with_factory(factory: Arc<dyn ConnectorFactory>) -> Self {
        Self::new(factory, VerifierConfig::default())
    }

    /// Connects, reads every table and installs the result as the current
    /// snapshot.
    ///
    /// # Errors
    /// Returns `Configuration`, `UnsupportedEngine`, `Connection` or
    /// `MetadataFetch` unchanged from the connector. On any error the current
    /// snapshot is left as it was.
    pub async fn fetch_schema(&self, params: &ConnectionParams) -> Result<Vec<TableMetadata>> {
        params.validate()?;
        let _fetching = self.fetch_lock.lock().await;

        let connector = self.factory.connect(params).await?;
        let tables = connector.fetch_table_metadata().await.inspect_err(|e| {
            tracing::error!("Schema fetch from {} failed: {}", params, e);
        })?;

        let snapshot = self.install(Some(connector.engine_kind()), tables).await?;
        Ok(snapshot.tables.clone())
    }

    /// Installs an already obtained table list as the current snapshot.
    ///
    /// # Errors
    /// Returns `Configuration` if two tables share a name; the current
    /// snapshot is left as it was.
    pub async fn install_tables(
        &self,
        engine: Option<EngineKind>,
        tables: Vec<TableMetadata>,
    ) -> Result<Arc<Snapshot>> {
        let _fetching = self.fetch_lock.lock().await;
        self.install(engine, tables).await
    }

    async fn install(&self, engine: Option<EngineKind>, tables: Vec<TableMetadata>) -> Result<Arc<Snapshot>> {
        let mut seen = HashSet::with_capacity(tables.len());
        if let Some(duplicate) = tables.iter().find(|t| !seen.insert(t.name.as_str())) {
            return Err(SchemaLensError::configuration(format!(
                "duplicate table name '{}' in schema snapshot",
                duplicate.name
            )));
        }

        let version = self.last_version.fetch_add(1, Ordering::SeqCst) + 1;
        let snapshot = Arc::new(Snapshot::new(version, engine, tables));

        // readers only clone the Arc, so the write lock is held for the swap alone
        *self.current.write().await = Some(Arc::clone(&snapshot));

        tracing::info!(
            "Installed schema snapshot v{} ({} tables, {} foreign keys)",
            snapshot.version,
            snapshot.tables.len(),
            snapshot.graph.edge_count()
        );
        Ok(snapshot)
    }

    /// The current snapshot, if one has been installed.
    pub async fn snapshot(&self) -> Option<Arc<Snapshot>> {
        self.current.read().await.clone()
    }

    /// Version of the current snapshot, 0 when none is installed.
    pub async fn version(&self) -> u64 {
        self.snapshot().await.map_or(0, |s| s.version)
    }

    /// Tables of the current snapshot; empty when none is installed.
    pub async fn tables(&self) -> Vec<TableMetadata> {
        self.snapshot()
            .await
            .map(|s| s.tables.clone())
            .unwrap_or_default()
    }

    /// Dependency graph of the current snapshot; empty when none is installed.
    ///
    /// Calling this repeatedly without an intervening fetch returns identical
    /// graphs.
    pub async fn build_graph(&self) -> Graph {
        self.snapshot()
            .await
            .map(|s| s.graph.clone())
            .unwrap_or_default()
    }

    /// Verifies the current snapshot. An absent or empty snapshot yields an
    /// empty report.
    ///
    /// # Errors
    /// Returns `VerificationTimeout` if the checks miss the configured deadline.
    pub async fn verify(&self) -> Result<SchemaVerificationResults> {
        match self.snapshot().await {
            Some(snapshot) => self.verifier.verify(snapshot).await,
            None => Ok(SchemaVerificationResults::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectors::StaticConnectorFactory;
    use crate::models::Index;

    fn tables() -> Vec<TableMetadata> {
        vec![
            TableMetadata::new("customers")
                .with_primary_key(["id"])
                .with_index(Index::new("customers_pkey", ["id"])),
            TableMetadata::new("orders").with_relationship("id", "customers"),
        ]
    }

    #[tokio::test]
    async fn test_empty_holder() {
        let holder = SchemaSnapshotHolder::with_factory(Arc::new(StaticConnectorFactory::default()));

        assert!(holder.snapshot().await.is_none());
        assert_eq!(holder.version().await, 0);
        assert!(holder.tables().await.is_empty());
        assert!(holder.build_graph().await.is_empty());
        assert!(holder.verify().await.unwrap().is_clean());
    }

    #[tokio::test]
    async fn test_fetch_installs_snapshot() {
        let holder = SchemaSnapshotHolder::with_factory(Arc::new(StaticConnectorFactory::new(tables())));
        let params = ConnectionParams::new(EngineKind::Postgres, "shop");

        let fetched = holder.fetch_schema(&params).await.unwrap();
        assert_eq!(fetched.len(), 2);

        let snapshot = holder.snapshot().await.unwrap();
        assert_eq!(snapshot.version, 1);
        assert_eq!(snapshot.engine, Some(EngineKind::Postgres));
        assert_eq!(snapshot.graph.edge_count(), 1);

        let report = holder.verify().await.unwrap();
        assert_eq!(report.missing_primary_keys.len(), 1);
    }

    #[tokio::test]
    async fn test_build_graph_is_idempotent() {
        let holder = SchemaSnapshotHolder::with_factory(Arc::new(StaticConnectorFactory::new(tables())));
        holder
            .fetch_schema(&ConnectionParams::new(EngineKind::Sqlite, "app.db"))
            .await
            .unwrap();

        let first = serde_json::to_vec(&holder.build_graph().await).unwrap();
        let second = serde_json::to_vec(&holder.build_graph().await).unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_versions_increase_and_old_snapshot_survives() {
        let holder = SchemaSnapshotHolder::with_factory(Arc::new(StaticConnectorFactory::default()));

        let first = holder.install_tables(None, tables()).await.unwrap();
        let second = holder
            .install_tables(None, vec![TableMetadata::new("only")])
            .await
            .unwrap();

        assert_eq!(first.version, 1);
        assert_eq!(second.version, 2);
        // a reader holding v1 still sees v1's tables and graph
        assert_eq!(first.tables.len(), 2);
        assert_eq!(first.graph.node_count(), 2);
        assert_eq!(holder.tables().await.len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_table_names_rejected() {
        let holder = SchemaSnapshotHolder::with_factory(Arc::new(StaticConnectorFactory::default()));
        holder.install_tables(None, tables()).await.unwrap();

        let err = holder
            .install_tables(None, vec![TableMetadata::new("t"), TableMetadata::new("t")])
            .await
            .unwrap_err();
        assert!(matches!(err, SchemaLensError::Configuration { .. }));
        assert_eq!(holder.version().await, 1);
    }
}
