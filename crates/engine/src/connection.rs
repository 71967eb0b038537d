//! Shareable connection handles
//!
//! A [`DbConnection`] wraps one driver session behind a mutex so the same
//! session, and any transaction open on it, can be handed to several
//! commands. Cloning the handle shares the session.
//!
//! Commands record whether they opened a connection themselves
//! ([`Ownership::Owned`]) or were given one ([`Ownership::Borrowed`]). A
//! borrowed connection is never committed, rolled back or closed by the
//! engine.

use crate::driver::{Connection, Connector, IsolationLevel};
use parking_lot::{Mutex, MutexGuard};
use quarry_core::Result;
use std::fmt;
use std::sync::Arc;

/// Session language pinned on connections the engine opens
pub const SESSION_LANGUAGE: &str = "us_english";

/// Who is responsible for releasing a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    /// Opened by the engine; closed by the engine
    Owned,
    /// Supplied by the caller; left untouched
    Borrowed,
}

/// Cloneable handle to one database session
#[derive(Clone)]
pub struct DbConnection {
    inner: Arc<Mutex<Box<dyn Connection>>>,
}

impl fmt::Debug for DbConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbConnection")
            .field("sessions", &Arc::strong_count(&self.inner))
            .finish()
    }
}

impl DbConnection {
    /// Open a session and pin its language.
    pub fn open(connector: &dyn Connector, connection_string: &str) -> Result<Self> {
        let mut session = connector.connect(connection_string)?;
        if let Err(e) = session.set_language(SESSION_LANGUAGE) {
            let _ = session.close();
            return Err(e);
        }
        Ok(Self::from_session(session))
    }

    /// Wrap an already open driver session
    pub fn from_session(session: Box<dyn Connection>) -> Self {
        DbConnection {
            inner: Arc::new(Mutex::new(session)),
        }
    }

    /// Begin a transaction on this session.
    pub fn begin_transaction(&self) -> Result<()> {
        self.inner.lock().begin(IsolationLevel::ReadUncommitted)
    }

    /// Commit the open transaction.
    pub fn commit(&self) -> Result<()> {
        self.inner.lock().commit()
    }

    /// Roll back the open transaction.
    pub fn rollback(&self) -> Result<()> {
        self.inner.lock().rollback()
    }

    /// Whether a transaction is open on this session
    pub fn has_transaction(&self) -> bool {
        self.inner.lock().in_transaction()
    }

    /// Close the session.
    pub fn close(&self) -> Result<()> {
        self.inner.lock().close()
    }

    /// Whether two handles share one session
    pub fn same_session(&self, other: &DbConnection) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Exclusive access to the driver session
    pub fn session(&self) -> MutexGuard<'_, Box<dyn Connection>> {
        self.inner.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::scripted::ScriptedConnector;

    #[test]
    fn test_open_pins_language() {
        let connector = ScriptedConnector::silent();
        let conn = DbConnection::open(&connector, "db").unwrap();
        assert_eq!(connector.matching("SET LANGUAGE us_english").len(), 1);
        conn.close().unwrap();
        assert_eq!(connector.closed(), 1);
    }

    #[test]
    fn test_clones_share_the_transaction() {
        let connector = ScriptedConnector::silent();
        let conn = DbConnection::open(&connector, "db").unwrap();
        let other = conn.clone();
        conn.begin_transaction().unwrap();
        assert!(other.has_transaction());
        other.commit().unwrap();
        assert!(!conn.has_transaction());
        assert!(conn.same_session(&other));
        assert_eq!(connector.commits(), 1);
    }
}
