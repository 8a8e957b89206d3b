//! Connection configuration.
//!
//! [`ConnectionConfig`] is the typed form of an application's database
//! connection block. Every field is optional; defaults are applied when the
//! config is turned into [`OpenParams`]. Unknown keys are rejected when
//! deserializing so a misspelled option is caught instead of ignored.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;

use myconn_core::{DEFAULT_HOST, DEFAULT_PORT, Error, IsolationLevel, OpenParams, Result};

/// Connection and session settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConnectionConfig {
    /// Username for authentication
    pub username: Option<String>,
    /// Password for authentication
    pub password: Option<String>,
    /// Hostname (default: localhost)
    pub host: Option<String>,
    /// TCP port (default: 3306)
    pub port: Option<u16>,
    /// Database to select after connecting
    pub database: Option<String>,
    /// Unix socket path; wins over host/port when non-empty
    #[serde(alias = "unixSocket")]
    pub unix_socket: Option<String>,
    /// Session character set (`set names`)
    pub charset: Option<String>,
    /// Collation paired with `charset`
    pub collation: Option<String>,
    /// Session time zone, e.g. `+00:00` or `Europe/Paris`
    pub timezone: Option<String>,
    /// Strict SQL mode; ignored when `modes` is set
    pub strict: Option<bool>,
    /// Explicit SQL modes, joined with commas
    pub modes: Option<Vec<String>>,
    /// Session transaction isolation level
    pub isolation_level: Option<IsolationLevel>,
    /// Driver options passed through to the native client
    pub options: BTreeMap<String, String>,
}

impl ConnectionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn unix_socket(mut self, path: impl Into<String>) -> Self {
        self.unix_socket = Some(path.into());
        self
    }

    pub fn charset(mut self, charset: impl Into<String>) -> Self {
        self.charset = Some(charset.into());
        self
    }

    pub fn collation(mut self, collation: impl Into<String>) -> Self {
        self.collation = Some(collation.into());
        self
    }

    pub fn timezone(mut self, timezone: impl Into<String>) -> Self {
        self.timezone = Some(timezone.into());
        self
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = Some(strict);
        self
    }

    pub fn modes<I, S>(mut self, modes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.modes = Some(modes.into_iter().map(Into::into).collect());
        self
    }

    pub fn isolation_level(mut self, level: IsolationLevel) -> Self {
        self.isolation_level = Some(level);
        self
    }

    pub fn option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// The configured socket path, if set and non-empty.
    pub fn socket_path(&self) -> Option<&str> {
        self.unix_socket.as_deref().filter(|s| !s.is_empty())
    }

    /// The configured database, if set and non-empty.
    pub fn database_name(&self) -> Option<&str> {
        self.database.as_deref().filter(|s| !s.is_empty())
    }

    /// Check every value that ends up interpolated into a statement.
    ///
    /// Charset, collation and mode names must be plain identifiers; the
    /// time zone may also contain `+ - : /`. The database name is sent
    /// through `COM_INIT_DB`, so it only has to be free of NUL bytes.
    pub fn validate(&self) -> Result<()> {
        check_identifier("charset", self.charset.as_deref())?;
        check_identifier("collation", self.collation.as_deref())?;
        for mode in self.modes.iter().flatten() {
            check_identifier("modes", Some(mode.as_str()))?;
        }
        if let Some(tz) = &self.timezone {
            if !timezone_re().is_match(tz) {
                return Err(Error::config(
                    "timezone",
                    format!("'{tz}' is not a valid time zone value"),
                ));
            }
        }
        if let Some(db) = &self.database {
            if db.contains('\0') {
                return Err(Error::config(
                    "database",
                    "database name must not contain NUL bytes",
                ));
            }
        }
        Ok(())
    }

    /// Structured parameters for the native client, with defaults applied.
    pub fn open_params(&self) -> OpenParams {
        OpenParams {
            host: self
                .host
                .clone()
                .filter(|h| !h.is_empty())
                .unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: self.port.unwrap_or(DEFAULT_PORT),
            username: self.username.clone().unwrap_or_default(),
            password: self.password.clone(),
            database: self.database_name().map(str::to_string),
            unix_socket: self.socket_path().map(str::to_string),
            options: self.options.clone(),
        }
    }
}

fn identifier_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_]+$").expect("identifier pattern compiles"))
}

fn timezone_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_+\-:/]+$").expect("timezone pattern compiles"))
}

fn check_identifier(field: &'static str, value: Option<&str>) -> Result<()> {
    match value {
        Some(v) if !identifier_re().is_match(v) => Err(Error::config(
            field,
            format!("'{v}' must contain only letters, digits and underscores"),
        )),
        _ => Ok(()),
    }
}
