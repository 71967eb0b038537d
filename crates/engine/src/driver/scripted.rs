//! In-memory scripted driver
//!
//! Records every request and answers through a responder closure. Useful for
//! exercising the engine without a server:
//!
//! ```
//! use quarry_engine::driver::scripted::{Reply, ScriptedConnector};
//!
//! let connector = ScriptedConnector::new(|req| {
//!     if req.sql.starts_with("SELECT COUNT") {
//!         Reply::Scalar(3.into())
//!     } else {
//!         Reply::Affected(0)
//!     }
//! });
//! assert_eq!(connector.opened(), 0);
//! ```

use super::{BulkCopyRequest, Connection, Connector, IsolationLevel};
use parking_lot::Mutex;
use quarry_core::{DbError, Error, Result, Table, Value};
use quarry_sql::{Parameter, Statement};
use std::sync::Arc;
use std::time::Duration;

/// What a recorded request did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// Non-query
    Execute,
    /// Row-returning query
    Query,
    /// Scalar query
    Scalar,
    /// Bulk row transfer
    BulkCopy,
    /// Transaction begin
    Begin,
    /// Transaction commit
    Commit,
    /// Transaction rollback
    Rollback,
}

/// One recorded request
#[derive(Debug, Clone)]
pub struct Request {
    /// Connection that issued it, numbered from 1 in open order
    pub connection: usize,
    /// Kind
    pub kind: RequestKind,
    /// SQL text, or the destination table for bulk copies
    pub sql: String,
    /// Parameters
    pub params: Vec<Parameter>,
    /// Timeout passed by the engine
    pub timeout: Option<Duration>,
    /// Rows handed to a bulk copy
    pub rows: Vec<Vec<Value>>,
    /// Columns of a bulk copy
    pub columns: Vec<String>,
    /// Whether a transaction was open when issued
    pub in_transaction: bool,
}

impl Request {
    /// Parameter values in order
    pub fn values(&self) -> Vec<Value> {
        self.params.iter().map(|p| p.value.clone()).collect()
    }
}

/// Responder answer
#[derive(Debug, Clone)]
pub enum Reply {
    /// A result set
    Rows(Table),
    /// Rows affected
    Affected(u64),
    /// A single value
    Scalar(Value),
    /// A driver failure
    Error(DbError),
}

type Responder = dyn Fn(&Request) -> Reply + Send + Sync;

#[derive(Default)]
struct ScriptState {
    requests: Vec<Request>,
    opened: usize,
    closed: usize,
    connect_error: Option<DbError>,
}

/// Connector whose connections answer from a closure
#[derive(Clone)]
pub struct ScriptedConnector {
    state: Arc<Mutex<ScriptState>>,
    responder: Arc<Responder>,
}

impl std::fmt::Debug for ScriptedConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ScriptedConnector")
            .field("requests", &state.requests.len())
            .field("opened", &state.opened)
            .field("closed", &state.closed)
            .finish()
    }
}

impl ScriptedConnector {
    /// Connector answering every request through `responder`
    pub fn new(responder: impl Fn(&Request) -> Reply + Send + Sync + 'static) -> Self {
        ScriptedConnector {
            state: Arc::new(Mutex::new(ScriptState::default())),
            responder: Arc::new(responder),
        }
    }

    /// Connector where every statement affects no rows and queries are empty
    pub fn silent() -> Self {
        Self::new(|_| Reply::Affected(0))
    }

    /// Make every future `connect` fail with `error`; `None` restores it.
    pub fn set_connect_error(&self, error: Option<DbError>) {
        self.state.lock().connect_error = error;
    }

    /// Snapshot of recorded requests
    pub fn requests(&self) -> Vec<Request> {
        self.state.lock().requests.clone()
    }

    /// Recorded requests of one kind
    pub fn requests_of(&self, kind: RequestKind) -> Vec<Request> {
        self.state
            .lock()
            .requests
            .iter()
            .filter(|r| r.kind == kind)
            .cloned()
            .collect()
    }

    /// Recorded requests whose SQL contains `needle`
    pub fn matching(&self, needle: &str) -> Vec<Request> {
        self.state
            .lock()
            .requests
            .iter()
            .filter(|r| r.sql.contains(needle))
            .cloned()
            .collect()
    }

    /// Connections opened
    pub fn opened(&self) -> usize {
        self.state.lock().opened
    }

    /// Connections closed
    pub fn closed(&self) -> usize {
        self.state.lock().closed
    }

    /// Transactions begun
    pub fn begins(&self) -> usize {
        self.requests_of(RequestKind::Begin).len()
    }

    /// Transactions committed
    pub fn commits(&self) -> usize {
        self.requests_of(RequestKind::Commit).len()
    }

    /// Transactions rolled back
    pub fn rollbacks(&self) -> usize {
        self.requests_of(RequestKind::Rollback).len()
    }

    /// Forget recorded requests and counters
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.requests.clear();
        state.opened = 0;
        state.closed = 0;
    }
}

impl Connector for ScriptedConnector {
    fn connect(&self, _connection_string: &str) -> Result<Box<dyn Connection>> {
        let mut state = self.state.lock();
        if let Some(err) = &state.connect_error {
            return Err(Error::Database(err.clone()));
        }
        state.opened += 1;
        Ok(Box::new(ScriptedConnection {
            id: state.opened,
            state: Arc::clone(&self.state),
            responder: Arc::clone(&self.responder),
            in_transaction: false,
            closed: false,
        }))
    }
}

struct ScriptedConnection {
    id: usize,
    state: Arc<Mutex<ScriptState>>,
    responder: Arc<Responder>,
    in_transaction: bool,
    closed: bool,
}

impl ScriptedConnection {
    fn request(&self, kind: RequestKind, statement: &Statement, timeout: Option<Duration>) -> Request {
        Request {
            connection: self.id,
            kind,
            sql: statement.sql.clone(),
            params: statement.params.clone(),
            timeout,
            rows: Vec::new(),
            columns: Vec::new(),
            in_transaction: self.in_transaction,
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            Err(Error::Database(DbError::from_server_code(
                233,
                "connection is closed",
            )))
        } else {
            Ok(())
        }
    }

    fn answer(&self, request: Request) -> Reply {
        let reply = (self.responder)(&request);
        self.state.lock().requests.push(request);
        reply
    }

    fn record(&self, kind: RequestKind) {
        let request = self.request(kind, &Statement::default(), None);
        self.state.lock().requests.push(request);
    }
}

impl Connection for ScriptedConnection {
    fn execute(&mut self, statement: &Statement, timeout: Option<Duration>) -> Result<u64> {
        self.ensure_open()?;
        match self.answer(self.request(RequestKind::Execute, statement, timeout)) {
            Reply::Affected(n) => Ok(n),
            Reply::Rows(table) => Ok(table.len() as u64),
            Reply::Scalar(_) => Ok(0),
            Reply::Error(e) => Err(Error::Database(e)),
        }
    }

    fn query(&mut self, statement: &Statement, timeout: Option<Duration>) -> Result<Table> {
        self.ensure_open()?;
        match self.answer(self.request(RequestKind::Query, statement, timeout)) {
            Reply::Rows(table) => Ok(table),
            Reply::Affected(_) => Ok(Table::default()),
            Reply::Scalar(v) => Table::new(vec![String::new()]).with_row(vec![v]),
            Reply::Error(e) => Err(Error::Database(e)),
        }
    }

    fn scalar(&mut self, statement: &Statement, timeout: Option<Duration>) -> Result<Value> {
        self.ensure_open()?;
        match self.answer(self.request(RequestKind::Scalar, statement, timeout)) {
            Reply::Scalar(v) => Ok(v),
            Reply::Rows(table) => Ok(table.scalar().cloned().unwrap_or(Value::Null)),
            Reply::Affected(_) => Ok(Value::Null),
            Reply::Error(e) => Err(Error::Database(e)),
        }
    }

    fn begin(&mut self, _isolation: IsolationLevel) -> Result<()> {
        self.ensure_open()?;
        if self.in_transaction {
            return Err(Error::Internal("transaction already open".to_string()));
        }
        self.record(RequestKind::Begin);
        self.in_transaction = true;
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        self.ensure_open()?;
        if !self.in_transaction {
            return Err(Error::Internal("no transaction to commit".to_string()));
        }
        self.record(RequestKind::Commit);
        self.in_transaction = false;
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        self.ensure_open()?;
        if !self.in_transaction {
            return Err(Error::Internal("no transaction to roll back".to_string()));
        }
        self.record(RequestKind::Rollback);
        self.in_transaction = false;
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    fn bulk_copy(&mut self, request: BulkCopyRequest<'_>) -> Result<u64> {
        self.ensure_open()?;
        let mut recorded = self.request(
            RequestKind::BulkCopy,
            &Statement::text(request.table),
            request.timeout,
        );
        recorded.rows = request.rows.to_vec();
        recorded.columns = request.columns.to_vec();
        match self.answer(recorded) {
            Reply::Error(e) => Err(Error::Database(e)),
            _ => Ok(request.rows.len() as u64),
        }
    }

    fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.closed = true;
            self.in_transaction = false;
            self.state.lock().closed += 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_requests_and_counts_connections() {
        let connector = ScriptedConnector::new(|req| match req.kind {
            RequestKind::Scalar => Reply::Scalar(Value::Int(7)),
            _ => Reply::Affected(2),
        });
        let mut conn = connector.connect("server=test").unwrap();
        assert_eq!(conn.execute(&Statement::text("DELETE FROM [A]"), None).unwrap(), 2);
        assert_eq!(
            conn.scalar(&Statement::text("SELECT 7"), None).unwrap(),
            Value::Int(7)
        );
        conn.close().unwrap();
        conn.close().unwrap();

        assert_eq!(connector.opened(), 1);
        assert_eq!(connector.closed(), 1);
        assert_eq!(connector.requests().len(), 2);
        assert_eq!(connector.matching("DELETE").len(), 1);
    }

    #[test]
    fn test_transactions_are_tracked() {
        let connector = ScriptedConnector::silent();
        let mut conn = connector.connect("").unwrap();
        conn.begin(IsolationLevel::ReadUncommitted).unwrap();
        assert!(conn.in_transaction());
        conn.execute(&Statement::text("UPDATE [A] SET [x] = 1"), None)
            .unwrap();
        conn.rollback().unwrap();
        assert!(!conn.in_transaction());
        assert!(conn.commit().is_err());

        assert_eq!(connector.begins(), 1);
        assert_eq!(connector.rollbacks(), 1);
        assert!(connector.matching("UPDATE")[0].in_transaction);
    }

    #[test]
    fn test_errors_and_closed_connections() {
        let connector =
            ScriptedConnector::new(|_| Reply::Error(DbError::from_server_code(208, "bad object")));
        let mut conn = connector.connect("").unwrap();
        let err = conn.query(&Statement::text("SELECT 1"), None).unwrap_err();
        assert_eq!(err.kind(), quarry_core::ErrorKind::Syntax);
        conn.close().unwrap();
        assert!(conn.execute(&Statement::text("SELECT 1"), None).is_err());
    }

    #[test]
    fn test_connect_failure_can_be_scripted() {
        let connector = ScriptedConnector::silent();
        connector.set_connect_error(Some(DbError::from_server_code(53, "unreachable")));
        assert!(connector.connect("").is_err());
        connector.set_connect_error(None);
        assert!(connector.connect("").is_ok());
    }

    #[test]
    fn test_default_set_statements_go_through_execute() {
        let connector = ScriptedConnector::silent();
        let mut conn = connector.connect("").unwrap();
        conn.set_isolation(IsolationLevel::ReadUncommitted).unwrap();
        conn.set_language("us_english").unwrap();
        let sql: Vec<String> = connector.requests().into_iter().map(|r| r.sql).collect();
        assert_eq!(
            sql,
            vec![
                "SET TRANSACTION ISOLATION LEVEL READ UNCOMMITTED".to_string(),
                "SET LANGUAGE us_english".to_string()
            ]
        );
    }
}
