//! Command implementations.

use crate::cli::{Command, ConnectArgs, DataArgs, Source, SourceArgs, VerifyArgs};
use crate::output::emit;
use anyhow::Context;
use schemalens_core::{
    ConnectorFactory, SchemaLensError, SchemaSnapshotHolder, SchemaVerificationResults,
    VerifierConfig,
    connectors::load_tables_file, supported_engines,
};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};

/// Exit status when `--fail-on-issues` is set and the report is not clean.
pub const ISSUES_FOUND: u8 = 2;

/// Runs one command, opening database connections through `factory`.
///
/// # Errors
/// Returns an error if the data source cannot be read, the connection fails,
/// or the output cannot be written.
pub async fn execute(
    command: &Command,
    factory: Arc<dyn ConnectorFactory>,
) -> anyhow::Result<ExitCode> {
    match command {
        Command::Tables(args) => tables(args, factory).await,
        Command::Graph(args) => graph(args, factory).await,
        Command::Verify(args) => verify(args, factory).await,
        Command::Test(args) => test_connection(args, factory.as_ref()).await,
        Command::Engines => {
            list_engines();
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Fills the holder from the requested source.
async fn load(holder: &SchemaSnapshotHolder, source: &SourceArgs) -> anyhow::Result<()> {
    match source.resolve()? {
        Source::File(path) => {
            info!("Loading table metadata from {}", path.display());
            let tables = load_tables_file(&path).await?;
            holder.install_tables(None, tables).await?;
        }
        Source::Database(params) => {
            info!("Fetching schema from {}", params);
            holder.fetch_schema(&params).await.inspect_err(|e| {
                error!("Schema fetch failed: {}", e);
            })?;
        }
    }
    Ok(())
}

async fn tables(args: &DataArgs, factory: Arc<dyn ConnectorFactory>) -> anyhow::Result<ExitCode> {
    let holder = SchemaSnapshotHolder::with_factory(factory);
    load(&holder, &args.source).await?;

    let tables = holder.tables().await;
    info!("Found {} tables", tables.len());
    emit(&tables, &args.output).await?;
    Ok(ExitCode::SUCCESS)
}

async fn graph(args: &DataArgs, factory: Arc<dyn ConnectorFactory>) -> anyhow::Result<ExitCode> {
    let holder = SchemaSnapshotHolder::with_factory(factory);
    load(&holder, &args.source).await?;

    let graph = holder.build_graph().await;
    info!(
        "Graph has {} nodes and {} edges",
        graph.node_count(),
        graph.edge_count()
    );
    emit(&graph, &args.output).await?;
    Ok(ExitCode::SUCCESS)
}

async fn verify(args: &VerifyArgs, factory: Arc<dyn ConnectorFactory>) -> anyhow::Result<ExitCode> {
    let config: VerifierConfig = args.verifier_config()?;
    let holder = SchemaSnapshotHolder::new(factory, config);
    load(&holder, &args.source).await?;

    let report = holder.verify().await.context("verification failed")?;
    emit(&report, &args.output).await?;

    if !report.is_complete() {
        for incomplete in &report.incomplete_checks {
            error!("{} did not complete: {}", incomplete.check, incomplete.reason);
        }
    }

    info!("Verification finished with {} issues", report.issue_count());
    Ok(verify_exit_code(&report, args.fail_on_issues))
}

/// Exit status for a finished verification. With `fail_on_issues`, any
/// reported issue or unfinished check yields [`ISSUES_FOUND`].
pub fn verify_exit_code(report: &SchemaVerificationResults, fail_on_issues: bool) -> ExitCode {
    if fail_on_issues && !report.is_clean() {
        ExitCode::from(ISSUES_FOUND)
    } else {
        ExitCode::SUCCESS
    }
}

/// Whether `error` is a verification that missed its deadline.
///
/// Checks still running at that point cannot be cancelled, so the binary
/// exits without waiting for the runtime to shut down.
pub fn is_verification_timeout(error: &anyhow::Error) -> bool {
    matches!(
        error.downcast_ref::<SchemaLensError>(),
        Some(SchemaLensError::VerificationTimeout { .. })
    )
}

async fn test_connection(
    args: &ConnectArgs,
    factory: &dyn ConnectorFactory,
) -> anyhow::Result<ExitCode> {
    info!("Testing database connection...");
    let params = args.connection.connection_params()?;

    let connector = factory.connect(&params).await.inspect_err(|e| {
        error!("Failed to connect: {}", e);
    })?;
    connector.test_connection().await.inspect_err(|e| {
        error!("Connection test failed: {}", e);
    })?;

    info!("Connection test successful");
    println!(
        "Connection to {} database at {} successful",
        connector.engine_kind().display_name(),
        params
    );
    Ok(ExitCode::SUCCESS)
}

/// Prints the engines compiled into this build and how to address them.
fn list_engines() {
    println!("Supported Database Engines:");
    println!();
    for engine in supported_engines() {
        println!("{} ({}):", engine.display_name(), engine.tag());
        match engine.default_port() {
            Some(port) => {
                println!("  Connection: {}://user@host:{}/database", engine.tag(), port)
            }
            None => println!("  Connection: sqlite:///path/to/database.db"),
        }
        println!();
    }
    println!("Offline input:");
    println!("  --input tables.json   (the output of `schemalens tables`)");
}
