//! Connection parameters for the engine connectors.

use crate::error::SchemaLensError;
use crate::models::EngineKind;
use crate::Result;
use std::time::Duration;
use url::Url;
use zeroize::Zeroizing;

/// Everything a connector needs to reach one database.
///
/// # Security
/// The password is held in a [`Zeroizing`] buffer, is never serialized, and is
/// left out of both `Display` and `Debug` output.
///
/// # Example
/// ```rust
/// use schemalens_core::connectors::ConnectionParams;
/// use schemalens_core::models::EngineKind;
///
/// let params = ConnectionParams::new(EngineKind::Postgres, "shop")
///     .with_host("db.internal")
///     .with_username("auditor")
///     .with_password("s3cret");
///
/// assert!(params.validate().is_ok());
/// assert_eq!(params.effective_port(), Some(5432));
/// assert!(!params.to_string().contains("s3cret"));
/// ```
#[derive(Clone)]
pub struct ConnectionParams {
    pub engine: EngineKind,
    /// Server host. Ignored for SQLite.
    pub host: String,
    /// Server port; the engine default applies when unset.
    pub port: Option<u16>,
    /// Database name, or the database file path for SQLite.
    pub database: String,
    pub username: Option<String>,
    pub password: Option<Zeroizing<String>>,
    pub connect_timeout: Duration,
    /// Upper bound on pooled connections.
    pub max_connections: u32,
}

impl ConnectionParams {
    /// Creates parameters with safe defaults: localhost, engine default port,
    /// 30 second connect timeout, at most 5 pooled connections.
    pub fn new(engine: EngineKind, database: impl Into<String>) -> Self {
        Self {
            engine,
            host: "localhost".to_string(),
            port: None,
            database: database.into(),
            username: None,
            password: None,
            connect_timeout: Duration::from_secs(30),
            max_connections: 5,
        }
    }

    /// Parses a connection URL such as `postgres://user:pw@host:5432/db`,
    /// `mysql://...`, `mssql://...`, `sqlite:///path/to/file.db` or
    /// `sqlite::memory:`.
    ///
    /// # Errors
    /// Returns `UnsupportedEngine` for an unknown scheme and `Configuration`
    /// for a URL that cannot be parsed. Error text never contains the URL's
    /// password.
    pub fn from_url(url: &str) -> Result<Self> {
        if let Some(path) = url.strip_prefix("sqlite:") {
            let path = path.strip_prefix("//").unwrap_or(path);
            if path.is_empty() {
                return Err(SchemaLensError::configuration(
                    "SQLite URL must name a database file or :memory:",
                ));
            }
            return Ok(Self::new(EngineKind::Sqlite, path));
        }

        let parsed = Url::parse(url).map_err(|e| {
            SchemaLensError::configuration(format!(
                "Invalid connection URL '{}': {}",
                crate::error::redact_database_url(url),
                e
            ))
        })?;
        let engine: EngineKind = parsed.scheme().parse()?;

        let mut params = Self::new(engine, parsed.path().trim_start_matches('/'));
        if let Some(host) = parsed.host_str() {
            params.host = host.to_string();
        }
        params.port = parsed.port();
        if !parsed.username().is_empty() {
            params.username = Some(percent_decode(parsed.username()));
        }
        if let Some(password) = parsed.password() {
            params.password = Some(Zeroizing::new(percent_decode(password)));
        }
        Ok(params)
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Sets the password. The caller's copy is not zeroized.
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(Zeroizing::new(password.into()));
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections;
        self
    }

    /// Port the connector will dial.
    pub fn effective_port(&self) -> Option<u16> {
        self.port.or(self.engine.default_port())
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_ref().map(|p| p.as_str())
    }

    /// Whether this names a SQLite in-memory database.
    pub fn is_in_memory(&self) -> bool {
        self.engine == EngineKind::Sqlite
            && (self.database == ":memory:" || self.database.contains("mode=memory"))
    }

    /// Renders a driver URL including credentials, percent-encoded.
    ///
    /// # Security
    /// The result contains the password; it is returned in a zeroizing buffer
    /// and must not be logged. Use `Display` for anything user-facing.
    ///
    /// # Errors
    /// Returns `Configuration` if the host cannot form a URL.
    pub fn connection_url(&self) -> Result<Zeroizing<String>> {
        if self.engine == EngineKind::Sqlite {
            return Ok(Zeroizing::new(format!("sqlite:{}", self.database)));
        }

        let invalid = || {
            SchemaLensError::configuration(format!("cannot build a connection URL for {}", self))
        };
        let mut url = Url::parse(&format!("{}://{}", self.engine.tag(), self.host))
            .map_err(|_| invalid())?;
        url.set_port(self.port).map_err(|()| invalid())?;
        url.set_path(&self.database);
        if let Some(username) = &self.username {
            url.set_username(username).map_err(|()| invalid())?;
        }
        if let Some(password) = self.password() {
            url.set_password(Some(password)).map_err(|()| invalid())?;
        }
        Ok(Zeroizing::new(url.into()))
    }

    /// Validates connection parameters.
    ///
    /// # Errors
    /// Returns `Configuration` if a value is missing or out of range.
    pub fn validate(&self) -> Result<()> {
        if self.database.trim().is_empty() {
            return Err(SchemaLensError::configuration("database cannot be empty"));
        }

        if self.engine != EngineKind::Sqlite && self.host.trim().is_empty() {
            return Err(SchemaLensError::configuration("host cannot be empty"));
        }

        if self.port == Some(0) {
            return Err(SchemaLensError::configuration("port must be greater than 0"));
        }

        if self.max_connections == 0 || self.max_connections > 100 {
            return Err(SchemaLensError::configuration(
                "max_connections must be between 1 and 100",
            ));
        }

        if self.connect_timeout.is_zero() {
            return Err(SchemaLensError::configuration(
                "connect_timeout must be greater than 0",
            ));
        }

        Ok(())
    }
}

impl std::fmt::Display for ConnectionParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.engine == EngineKind::Sqlite {
            return write!(f, "sqlite:{}", self.database);
        }
        write!(
            f,
            "{}://{}{}/{}",
            self.engine,
            self.host,
            self.effective_port()
                .map_or_else(String::new, |p| format!(":{}", p)),
            self.database
        )
        // Intentionally omit username and never include credentials
    }
}

impl std::fmt::Debug for ConnectionParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionParams")
            .field("engine", &self.engine)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "****"))
            .field("connect_timeout", &self.connect_timeout)
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

fn percent_decode(value: &str) -> String {
    url::form_urlencoded::parse(format!("v={}", value.replace('+', "%2B")).as_bytes())
        .next()
        .map_or_else(|| value.to_string(), |(_, decoded)| decoded.into_owned())
}
