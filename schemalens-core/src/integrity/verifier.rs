//! Integrity verifier facade.
//!
//! Runs every check concurrently against one shared, immutable snapshot. Each
//! check is its own blocking task and hands its issues back through the join
//! handle; the caller's task merges them once every check has reported. No
//! lock is shared between checks.

use super::checks::{
    check_components, check_foreign_keys, check_nullable_columns, check_primary_keys,
    check_redundant_indexes, check_unique_indexes,
};
use super::config::VerifierConfig;
use super::models::{
    CheckKind, ForeignKeyIssue, IncompleteCheck, NullableColumnIssue, PrimaryKeyIssue,
    RedundantIndexIssue, SchemaVerificationResults, UniqueIndexIssue,
};
use crate::Result;
use crate::error::SchemaLensError;
use crate::snapshot::Snapshot;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tokio::task::JoinSet;

/// What one check hands back.
#[derive(Debug)]
enum CheckOutput {
    PrimaryKeys(Vec<PrimaryKeyIssue>),
    NullableColumns(Vec<NullableColumnIssue>),
    UniqueIndexes(Vec<UniqueIndexIssue>),
    ForeignKeys(Vec<ForeignKeyIssue>),
    RedundantIndexes(Vec<RedundantIndexIssue>),
    Components {
        sccs: Vec<Vec<String>>,
        cycles: Vec<Vec<String>>,
    },
}

type CheckOutcome = (CheckKind, std::result::Result<CheckOutput, String>);
type CheckRunner = fn(CheckKind, &Snapshot, &VerifierConfig) -> CheckOutput;

fn run_check(check: CheckKind, snapshot: &Snapshot, config: &VerifierConfig) -> CheckOutput {
    let tables = snapshot.tables.as_slice();
    match check {
        CheckKind::PrimaryKeys => CheckOutput::PrimaryKeys(check_primary_keys(tables)),
        CheckKind::NullableColumns => {
            CheckOutput::NullableColumns(check_nullable_columns(tables, config))
        }
        CheckKind::UniqueIndexes => CheckOutput::UniqueIndexes(check_unique_indexes(tables)),
        CheckKind::ForeignKeys => CheckOutput::ForeignKeys(check_foreign_keys(tables)),
        CheckKind::RedundantIndexes => {
            CheckOutput::RedundantIndexes(check_redundant_indexes(tables, config))
        }
        CheckKind::StronglyConnectedComponents => {
            let (sccs, cycles) = check_components(&snapshot.graph, config);
            CheckOutput::Components { sccs, cycles }
        }
    }
}

/// Structural integrity verifier.
///
/// # Example
///
/// ```rust,no_run
/// use schemalens_core::integrity::{IntegrityVerifier, VerifierConfig};
/// use schemalens_core::snapshot::Snapshot;
/// use std::sync::Arc;
///
/// # async fn example(snapshot: Arc<Snapshot>) -> schemalens_core::Result<()> {
/// let verifier = IntegrityVerifier::new(VerifierConfig::default());
/// let report = verifier.verify(snapshot).await?;
/// println!("{} issues", report.issue_count());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct IntegrityVerifier {
    config: VerifierConfig,
    runner: CheckRunner,
}

impl Default for IntegrityVerifier {
    fn default() -> Self {
        Self::new(VerifierConfig::default())
    }
}

impl IntegrityVerifier {
    /// Creates a new verifier with the given configuration.
    pub fn new(config: VerifierConfig) -> Self {
        Self {
            config,
            runner: run_check,
        }
    }

    /// Returns a reference to the verifier configuration.
    pub fn config(&self) -> &VerifierConfig {
        &self.config
    }

    /// Runs every check against `snapshot` and merges the results.
    ///
    /// An empty snapshot yields an empty report. A check that panics leaves its
    /// section empty and is listed in `incomplete_checks`; the other checks are
    /// unaffected.
    ///
    /// # Errors
    /// Returns `VerificationTimeout` when the configured deadline passes before
    /// every check has reported, and `Configuration` for an invalid config.
    /// Results of checks still running at that point are discarded.
    pub async fn verify(&self, snapshot: Arc<Snapshot>) -> Result<SchemaVerificationResults> {
        self.config.validate()?;

        if snapshot.tables.is_empty() {
            tracing::debug!("Snapshot has no tables; returning an empty report");
            return Ok(SchemaVerificationResults::default());
        }

        tracing::debug!(
            "Verifying snapshot v{} ({} tables, {} foreign keys)",
            snapshot.version,
            snapshot.tables.len(),
            snapshot.graph.edge_count()
        );

        let config = Arc::new(self.config.clone());
        let mut tasks = JoinSet::new();
        for check in CheckKind::ALL {
            let snapshot = Arc::clone(&snapshot);
            let config = Arc::clone(&config);
            let runner = self.runner;
            tasks.spawn_blocking(move || -> CheckOutcome {
                let started = std::time::Instant::now();
                let outcome =
                    panic::catch_unwind(AssertUnwindSafe(|| runner(check, &snapshot, &config)))
                        .map_err(panic_reason);
                tracing::debug!("Check {} finished in {:?}", check, started.elapsed());
                (check, outcome)
            });
        }

        let mut outcomes = Vec::with_capacity(CheckKind::ALL.len());
        match self.config.timeout {
            Some(limit) => {
                let gathered = gather(&mut tasks, &mut outcomes);
                if tokio::time::timeout(limit, gathered).await.is_err() {
                    // only unstarted checks are cancelled; a running blocking
                    // check holds its thread until it returns
                    tasks.abort_all();
                    let pending: Vec<String> = CheckKind::ALL
                        .into_iter()
                        .filter(|check| !outcomes.iter().any(|(done, _)| done == check))
                        .map(|check| check.field_name().to_string())
                        .collect();
                    tracing::error!(
                        "Verification timed out after {:?}; pending checks: {}",
                        limit,
                        pending.join(", ")
                    );
                    return Err(SchemaLensError::verification_timeout(limit, pending));
                }
            }
            None => gather(&mut tasks, &mut outcomes).await,
        }

        let report = merge(outcomes);
        tracing::info!(
            "Verification complete: {} issues, {} circular dependencies",
            report.issue_count(),
            report.circular_dependencies.len()
        );
        Ok(report)
    }
}

#[cfg(test)]
impl IntegrityVerifier {
    fn with_runner(config: VerifierConfig, runner: CheckRunner) -> Self {
        Self { config, runner }
    }
}

async fn gather(tasks: &mut JoinSet<CheckOutcome>, outcomes: &mut Vec<CheckOutcome>) {
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(outcome) => outcomes.push(outcome),
            Err(e) => tracing::error!("Integrity check task did not complete: {}", e),
        }
    }
}

fn merge(outcomes: Vec<CheckOutcome>) -> SchemaVerificationResults {
    let mut report = SchemaVerificationResults::default();
    let mut reported = Vec::with_capacity(outcomes.len());

    for (check, outcome) in outcomes {
        reported.push(check);
        match outcome {
            Ok(CheckOutput::PrimaryKeys(issues)) => report.missing_primary_keys = issues,
            Ok(CheckOutput::NullableColumns(issues)) => report.nullable_columns = issues,
            Ok(CheckOutput::UniqueIndexes(issues)) => report.missing_unique_indexes = issues,
            Ok(CheckOutput::ForeignKeys(issues)) => report.foreign_key_issues = issues,
            Ok(CheckOutput::RedundantIndexes(issues)) => report.redundant_indexes = issues,
            Ok(CheckOutput::Components { sccs, cycles }) => {
                report.sccs = sccs;
                report.circular_dependencies = cycles;
            }
            Err(reason) => {
                tracing::warn!("Check {} could not complete: {}", check, reason);
                report.incomplete_checks.push(IncompleteCheck { check, reason });
            }
        }
    }

    for check in CheckKind::ALL {
        if !reported.contains(&check) {
            report.incomplete_checks.push(IncompleteCheck {
                check,
                reason: "check task did not report a result".to_string(),
            });
        }
    }
    report.incomplete_checks.sort_by_key(|incomplete| incomplete.check);
    report
}

fn panic_reason(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("check panicked: {}", message)
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("check panicked: {}", message)
    } else {
        "check panicked".to_string()
    }
}
