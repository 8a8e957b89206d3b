//! Session bootstrap statements.
//!
//! Pure builders for the statements run right after connecting. Values are
//! interpolated as-is; [`ConnectionConfig::validate`] restricts them to safe
//! character sets before any statement is built.

use myconn_core::IsolationLevel;

use crate::config::ConnectionConfig;

/// The hardened mode set applied when `strict` is true.
pub const STRICT_SQL_MODE: &str = "ONLY_FULL_GROUP_BY,STRICT_TRANS_TABLES,NO_ZERO_IN_DATE,\
NO_ZERO_DATE,ERROR_FOR_DIVISION_BY_ZERO,NO_AUTO_CREATE_USER,NO_ENGINE_SUBSTITUTION";

/// The mode set applied when `strict` is explicitly false.
pub const NON_STRICT_SQL_MODE: &str = "NO_ENGINE_SUBSTITUTION";

/// Which `sql_mode` a session gets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlMode<'a> {
    /// Modes listed in the config, in order
    Explicit(&'a [String]),
    /// [`STRICT_SQL_MODE`]
    Strict,
    /// [`NON_STRICT_SQL_MODE`]
    NonStrict,
}

impl<'a> SqlMode<'a> {
    /// `modes` wins over `strict`; with neither set the server default stays.
    pub fn resolve(config: &'a ConnectionConfig) -> Option<Self> {
        match (&config.modes, config.strict) {
            (Some(modes), _) => Some(SqlMode::Explicit(modes)),
            (None, Some(true)) => Some(SqlMode::Strict),
            (None, Some(false)) => Some(SqlMode::NonStrict),
            (None, None) => None,
        }
    }

    pub fn statement(&self) -> String {
        let modes = match self {
            SqlMode::Explicit(modes) => modes.join(","),
            SqlMode::Strict => STRICT_SQL_MODE.to_string(),
            SqlMode::NonStrict => NON_STRICT_SQL_MODE.to_string(),
        };
        format!("set session sql_mode='{modes}'")
    }
}

/// `set names '<charset>'`, with a collate clause when a collation is given.
pub fn set_names(charset: &str, collation: Option<&str>) -> String {
    match collation {
        Some(collation) => format!("set names '{charset}' collate '{collation}'"),
        None => format!("set names '{charset}'"),
    }
}

pub fn set_time_zone(timezone: &str) -> String {
    format!("set time_zone=\"{timezone}\"")
}

pub fn set_isolation_level(level: IsolationLevel) -> String {
    format!("SET SESSION TRANSACTION ISOLATION LEVEL {}", level.as_sql())
}

/// All statements to run after database selection, in execution order:
/// charset, time zone, sql_mode, isolation level.
pub fn session_statements(config: &ConnectionConfig) -> Vec<String> {
    let mut statements = Vec::with_capacity(4);
    if let Some(charset) = &config.charset {
        statements.push(set_names(charset, config.collation.as_deref()));
    }
    if let Some(timezone) = &config.timezone {
        statements.push(set_time_zone(timezone));
    }
    if let Some(mode) = SqlMode::resolve(config) {
        statements.push(mode.statement());
    }
    if let Some(level) = config.isolation_level {
        statements.push(set_isolation_level(level));
    }
    statements
}
