//! Connection establishment.
//!
//! [`ConnectionEstablisher`] turns a [`ConnectionConfig`] into a live,
//! configured session:
//!
//! 1. Validate the config and resolve the target
//! 2. Open a session (or adopt one supplied by the caller)
//! 3. Retry the open exactly once if it failed with a lost-connection error
//! 4. Select the database, then run charset, time zone, sql_mode and
//!    isolation statements in order
//!
//! The first failing step aborts the rest; nothing is rolled back.

use myconn_core::{NativeClient, OpenParams, Result, Session};

use crate::config::ConnectionConfig;
use crate::statements;
use crate::target::ConnectionTarget;

/// Opens and configures sessions through a [`NativeClient`].
///
/// Stateless across calls: sessions are handed to the caller and never
/// retained.
#[derive(Debug, Clone, Default)]
pub struct ConnectionEstablisher<C> {
    client: C,
}

impl<C: NativeClient> ConnectionEstablisher<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }

    /// Open a new session and apply the session configuration.
    #[tracing::instrument(level = "debug", skip(self, config))]
    pub fn establish(&self, config: &ConnectionConfig) -> Result<C::Session> {
        config.validate()?;
        let target = ConnectionTarget::resolve(config);
        tracing::debug!(dsn = %target, "Establishing connection");

        let mut session = self.open_with_retry(&config.open_params())?;
        configure(&mut session, config)?;
        Ok(session)
    }

    /// Configure a session the caller already holds.
    ///
    /// No socket is opened; database selection and every session statement
    /// are still applied.
    #[tracing::instrument(level = "debug", skip(self, session, config))]
    pub fn adopt(&self, mut session: C::Session, config: &ConnectionConfig) -> Result<C::Session> {
        config.validate()?;
        tracing::debug!(
            dsn = %ConnectionTarget::resolve(config),
            "Configuring supplied connection"
        );
        configure(&mut session, config)?;
        Ok(session)
    }

    fn open_with_retry(&self, params: &OpenParams) -> Result<C::Session> {
        match self.client.open(params) {
            Ok(session) => Ok(session),
            Err(e) if e.is_transient_connection() => {
                tracing::warn!(error = %e, "Lost connection while connecting, retrying once");
                self.client.open(params)
            }
            Err(e) => Err(e),
        }
    }
}

/// Apply database selection and session statements to `session`.
pub fn configure<S: Session + ?Sized>(session: &mut S, config: &ConnectionConfig) -> Result<()> {
    if let Some(database) = config.database_name() {
        tracing::trace!(database = %database, "Selecting database");
        session.select_database(database)?;
    }
    for sql in statements::session_statements(config) {
        tracing::trace!(sql = %sql, "Configuring session");
        session.execute_statement(&sql)?;
    }
    Ok(())
}
