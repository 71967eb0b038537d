//! Blocking-session report on lock timeouts
//!
//! On the first lock timeout of a call the engine spawns a detached thread
//! that opens its own connection, lists the sessions blocking others and
//! logs them under `quarry::diag`. The thread is never joined and every
//! failure inside it is swallowed.

use crate::driver::Connector;
use quarry_core::{Result, Table};
use quarry_sql::Statement;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Sessions currently blocking others, with what they and their victims run
pub const BLOCKING_SESSIONS_SQL: &str = "\
SELECT R.BLOCKING_SESSION_ID AS BLOCKING_SESSION, \
BS.LOGIN_NAME + '_' + BS.HOST_NAME AS BLOCKING_LOGIN_HOST, \
BS.PROGRAM_NAME AS BLOCKING_APP, \
BS.LAST_REQUEST_START_TIME AS BLOCKING_LAST_REQUEST, \
(SELECT TEXT FROM SYS.DM_EXEC_SQL_TEXT(C.MOST_RECENT_SQL_HANDLE)) AS BLOCKING_COMMAND, \
R.SESSION_ID AS BLOCKED_SESSION, \
S.PROGRAM_NAME AS BLOCKED_APP, \
S.HOST_NAME AS BLOCKED_HOST, \
R.WAIT_RESOURCE AS WAIT_RESOURCE, \
DATEDIFF(SECOND, R.START_TIME, GETDATE()) AS WAIT_SECONDS, \
T.TEXT AS BLOCKED_COMMAND \
FROM SYS.DM_EXEC_REQUESTS AS R \
INNER JOIN SYS.DM_EXEC_SESSIONS AS S ON S.SESSION_ID = R.SESSION_ID \
INNER JOIN SYS.DM_EXEC_SESSIONS AS BS ON BS.SESSION_ID = R.BLOCKING_SESSION_ID \
LEFT JOIN SYS.DM_EXEC_CONNECTIONS AS C ON C.SESSION_ID = R.BLOCKING_SESSION_ID \
CROSS APPLY SYS.DM_EXEC_SQL_TEXT(R.SQL_HANDLE) AS T \
WHERE R.BLOCKING_SESSION_ID > 0";

/// Spawn the detached report thread.
pub(crate) fn spawn_lock_report(
    connector: Arc<dyn Connector>,
    connection_string: String,
    timeout: Option<Duration>,
) {
    let spawned = std::thread::Builder::new()
        .name("quarry-lock-report".to_string())
        .spawn(move || {
            match collect(connector.as_ref(), &connection_string, timeout) {
                Ok(Some(report)) => {
                    error!(target: "quarry::diag", "Lock timeout detected. {}", report)
                }
                Ok(None) => debug!(target: "quarry::diag", "Lock timeout detected, no blocker found"),
                Err(e) => debug!(target: "quarry::diag", error = %e, "Lock report unavailable"),
            }
        });
    if let Err(e) = spawned {
        warn!(target: "quarry::diag", error = %e, "Failed to spawn lock report thread");
    }
}

fn collect(
    connector: &dyn Connector,
    connection_string: &str,
    timeout: Option<Duration>,
) -> Result<Option<String>> {
    let mut session = connector.connect(connection_string)?;
    let table = session.query(&Statement::text(BLOCKING_SESSIONS_SQL), timeout);
    let _ = session.close();
    Ok(render(&table?))
}

/// Render blocking rows as `- COL: value / COL: value` lines.
pub(crate) fn render(table: &Table) -> Option<String> {
    if table.is_empty() {
        return None;
    }
    let mut report = String::from("* Locking details:\n");
    for row in table.rows() {
        for (i, (column, value)) in row.columns().iter().zip(row.values()).enumerate() {
            let text = value.to_string();
            report.push_str(if i == 0 { "-" } else { " /" });
            report.push_str(&format!(" {}: {}", column.to_uppercase(), text.trim()));
        }
        report.push('\n');
    }
    Some(report)
}
