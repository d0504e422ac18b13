//! Command-line arguments.

use anyhow::{Context, bail};
use clap::{ArgAction, Args, Parser, Subcommand};
use schemalens_core::{
    ConnectionParams, EngineKind, LogFormat, RedundancyRule, VerifierConfig,
};
use std::path::PathBuf;
use std::time::Duration;
use zeroize::Zeroizing;

#[derive(Parser, Debug)]
#[command(name = "schemalens")]
#[command(about = "Relational schema inspection and integrity verification")]
#[command(version)]
#[command(long_about = "
SchemaLens - foreign-key graph analysis and structural integrity checks

Reads the table catalog of a database (read-only), builds the foreign-key
dependency graph and reports structural problems:
- Tables without a primary key
- Nullable columns
- Columns without a unique index
- Foreign keys to missing or unindexed tables
- Redundant indexes
- Circular foreign-key dependencies

SUPPORTED DATABASES:
- PostgreSQL (--engine postgres)
- MySQL (--engine mysql)
- SQLite (--engine sqlite, --database is the file path)
- SQL Server (--engine sqlserver) [if compiled with --features mssql]

EXAMPLES:
  schemalens verify --engine postgres --database shop --user auditor --ask-password
  schemalens graph --url sqlite:///var/data/app.db --pretty
  schemalens tables --url mysql://root@localhost/shop -o tables.json
  schemalens verify --input tables.json --fail-on-issues
")]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the normalized table metadata as JSON
    Tables(DataArgs),
    /// Print the foreign-key dependency graph as JSON
    Graph(DataArgs),
    /// Run the integrity checks and print the report as JSON
    Verify(VerifyArgs),
    /// Test the database connection
    Test(ConnectArgs),
    /// List database engines compiled into this build
    Engines,
}

#[derive(Args, Debug)]
pub struct GlobalArgs {
    /// Increase verbosity
    #[arg(
        short,
        long,
        global = true,
        action = ArgAction::Count,
        help = "Increase verbosity (-v, -vv, -vvv)"
    )]
    pub verbose: u8,

    /// Suppress output
    #[arg(short, long, global = true, help = "Suppress all log output except errors")]
    pub quiet: bool,

    /// Log record format
    #[arg(long, global = true, default_value = "text", help = "Log format: text or json")]
    pub log_format: LogFormat,
}

#[derive(Args, Debug, Clone, Default)]
pub struct DataArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    #[command(flatten)]
    pub output: OutputArgs,
}

#[derive(Args, Debug, Clone, Default)]
pub struct VerifyArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    #[command(flatten)]
    pub output: OutputArgs,

    /// Verification deadline in seconds
    #[arg(long, value_name = "SECONDS", default_value_t = 30)]
    pub timeout: u64,

    /// Wait for the checks without a deadline
    #[arg(long, conflicts_with = "timeout")]
    pub no_timeout: bool,

    /// Declared type treated as auto-increment (repeatable)
    #[arg(
        long = "serial-type",
        value_name = "TYPE",
        help = "Column type exempt from the nullable check (default: serial, bigserial, smallserial)"
    )]
    pub serial_types: Vec<String>,

    /// Only flag indexes whose columns are a leading prefix of another index
    #[arg(long)]
    pub prefix_only: bool,

    /// Report one direction only for indexes with identical columns
    #[arg(long)]
    pub dedupe_redundant: bool,

    /// Leave expression indexes (no plain columns) out of the redundancy check
    #[arg(long)]
    pub skip_expression_indexes: bool,

    /// Do not count a table referencing itself as a circular dependency
    #[arg(long)]
    pub no_self_references: bool,

    /// Exit with status 2 when any issue is reported or a check did not finish
    #[arg(long)]
    pub fail_on_issues: bool,
}

impl VerifyArgs {
    /// Builds the verifier configuration from the flags.
    ///
    /// # Errors
    /// Returns an error if the resulting configuration is invalid.
    pub fn verifier_config(&self) -> anyhow::Result<VerifierConfig> {
        let mut config = VerifierConfig::new()
            .with_dedupe_redundant_indexes(self.dedupe_redundant)
            .with_skip_expression_indexes(self.skip_expression_indexes)
            .with_report_self_references(!self.no_self_references);

        config = if self.no_timeout {
            config.with_timeout(None)
        } else {
            config.with_timeout(Some(Duration::from_secs(self.timeout)))
        };
        if !self.serial_types.is_empty() {
            config = config.with_auto_increment_types(self.serial_types.iter().cloned());
        }
        if self.prefix_only {
            config = config.with_redundancy_rule(RedundancyRule::LeadingPrefix);
        }

        config.validate().context("invalid verification options")?;
        Ok(config)
    }
}

#[derive(Args, Debug, Clone, Default)]
pub struct ConnectArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,
}

/// Where the table metadata comes from: a live database or an exported file.
#[derive(Args, Debug, Clone, Default)]
pub struct SourceArgs {
    /// Previously exported table metadata
    #[arg(long, value_name = "FILE", help = "Read table metadata from a JSON file instead of a database")]
    pub input: Option<PathBuf>,

    #[command(flatten)]
    pub connection: ConnectionArgs,
}

#[derive(Args, Debug, Clone, Default)]
pub struct ConnectionArgs {
    /// Connection URL
    #[arg(
        long,
        env = "SCHEMALENS_URL",
        hide_env_values = true,
        help = "Connection URL, e.g. postgres://user@host/db (credentials are never logged)"
    )]
    pub url: Option<String>,

    /// Database engine
    #[arg(long, env = "SCHEMALENS_ENGINE", help = "postgres, mysql, sqlite or sqlserver")]
    pub engine: Option<EngineKind>,

    #[arg(long, env = "SCHEMALENS_HOST", default_value = "localhost")]
    pub host: String,

    /// Port; the engine default applies when omitted
    #[arg(long, env = "SCHEMALENS_PORT")]
    pub port: Option<u16>,

    /// Database name, or the file path for SQLite
    #[arg(long, env = "SCHEMALENS_DATABASE")]
    pub database: Option<String>,

    #[arg(long, env = "SCHEMALENS_USER")]
    pub user: Option<String>,

    /// Password (prefer --ask-password or the environment variable)
    #[arg(long, env = "SCHEMALENS_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Prompt for the password without echo
    #[arg(long)]
    pub ask_password: bool,

    /// Connection timeout in seconds
    #[arg(long, value_name = "SECONDS", default_value_t = 30)]
    pub connect_timeout: u64,
}

impl ConnectionArgs {
    /// Whether any way of reaching a database was given.
    pub fn is_specified(&self) -> bool {
        self.url.is_some() || self.engine.is_some() || self.database.is_some()
    }

    /// Resolves the flags into connection parameters, prompting for the
    /// password when asked to.
    ///
    /// # Errors
    /// Returns an error if the engine or database is missing, the URL is
    /// invalid, or the password prompt fails.
    pub fn connection_params(&self) -> anyhow::Result<ConnectionParams> {
        let mut params = match &self.url {
            Some(url) => ConnectionParams::from_url(url)?,
            None => {
                let Some(engine) = self.engine else {
                    bail!("--engine is required when no --url or --input is given");
                };
                let Some(database) = &self.database else {
                    bail!("--database is required for {}", engine.display_name());
                };
                let mut params =
                    ConnectionParams::new(engine, database.clone()).with_host(self.host.clone());
                if let Some(port) = self.port {
                    params = params.with_port(port);
                }
                if let Some(user) = &self.user {
                    params = params.with_username(user.clone());
                }
                params
            }
        };

        if let Some(password) = &self.password {
            params.password = Some(Zeroizing::new(password.clone()));
        }
        if self.ask_password {
            let prompt = format!("Password for {}: ", params);
            let password =
                rpassword::prompt_password(prompt).context("failed to read password")?;
            params.password = Some(Zeroizing::new(password));
        }

        params = params.with_connect_timeout(Duration::from_secs(self.connect_timeout));
        params.validate()?;
        Ok(params)
    }
}

/// Resolved data source.
#[derive(Debug, Clone)]
pub enum Source {
    File(PathBuf),
    Database(ConnectionParams),
}

impl SourceArgs {
    /// Picks the data source. An input file wins over connection flags.
    ///
    /// # Errors
    /// Returns an error if neither is given or the connection flags are
    /// incomplete.
    pub fn resolve(&self) -> anyhow::Result<Source> {
        if let Some(path) = &self.input {
            if self.connection.is_specified() {
                tracing::warn!(
                    "--input given; ignoring connection options for {}",
                    path.display()
                );
            }
            return Ok(Source::File(path.clone()));
        }
        if !self.connection.is_specified() {
            bail!("no data source: pass --input <FILE>, --url, or --engine and --database");
        }
        Ok(Source::Database(self.connection.connection_params()?))
    }
}

#[derive(Args, Debug, Clone, Default)]
pub struct OutputArgs {
    /// Output file path
    #[arg(short, long, help = "Write the JSON document to a file instead of stdout")]
    pub output: Option<PathBuf>,

    /// Pretty-print JSON
    #[arg(long)]
    pub pretty: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_verify_flags() {
        let cli = Cli::try_parse_from([
            "schemalens",
            "-vv",
            "verify",
            "--input",
            "tables.json",
            "--serial-type",
            "identity",
            "--dedupe-redundant",
            "--skip-expression-indexes",
            "--no-self-references",
            "--fail-on-issues",
            "--timeout",
            "5",
        ])
        .unwrap();

        assert_eq!(cli.global.verbose, 2);
        let Command::Verify(args) = cli.command else {
            panic!("expected verify");
        };
        let config = args.verifier_config().unwrap();
        assert_eq!(config.timeout, Some(Duration::from_secs(5)));
        assert!(config.is_auto_increment("IDENTITY"));
        assert!(!config.is_auto_increment("serial"));
        assert!(config.dedupe_redundant_indexes);
        assert!(config.skip_expression_indexes);
        assert!(!config.report_self_references);
        assert!(args.fail_on_issues);
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let args = VerifyArgs {
            timeout: 0,
            ..VerifyArgs::default()
        };
        assert!(args.verifier_config().is_err());

        let args = VerifyArgs {
            no_timeout: true,
            ..VerifyArgs::default()
        };
        assert_eq!(args.verifier_config().unwrap().timeout, None);
    }

    #[test]
    fn test_connection_flags_resolve() {
        let cli = Cli::try_parse_from([
            "schemalens",
            "tables",
            "--engine",
            "postgresql",
            "--host",
            "db.internal",
            "--database",
            "shop",
            "--user",
            "auditor",
            "--password",
            "s3cret",
        ])
        .unwrap();
        let Command::Tables(args) = cli.command else {
            panic!("expected tables");
        };

        let Source::Database(params) = args.source.resolve().unwrap() else {
            panic!("expected database source");
        };
        assert_eq!(params.engine, EngineKind::Postgres);
        assert_eq!(params.host, "db.internal");
        assert_eq!(params.password(), Some("s3cret"));
        assert_eq!(params.to_string(), "postgres://db.internal:5432/shop");
    }

    #[test]
    fn test_url_source() {
        let args = SourceArgs {
            connection: ConnectionArgs {
                url: Some("sqlite:///var/data/app.db".to_string()),
                connect_timeout: 30,
                ..ConnectionArgs::default()
            },
            ..SourceArgs::default()
        };
        let Source::Database(params) = args.resolve().unwrap() else {
            panic!("expected database source");
        };
        assert_eq!(params.engine, EngineKind::Sqlite);
        assert_eq!(params.database, "/var/data/app.db");
    }

    #[test]
    fn test_missing_source_and_engine() {
        assert!(SourceArgs::default().resolve().is_err());

        let args = ConnectionArgs {
            database: Some("shop".to_string()),
            connect_timeout: 30,
            ..ConnectionArgs::default()
        };
        assert!(args.connection_params().is_err());
    }

    #[test]
    fn test_unknown_engine_rejected() {
        let result = Cli::try_parse_from(["schemalens", "test", "--engine", "oracle"]);
        assert!(result.is_err());
    }
}
