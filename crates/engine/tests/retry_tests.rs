//! Execution and retry engine integration tests
//!
//! Attempt budgets, sleeps, the wall-clock ceiling, connection release and
//! the lock report thread. A `ManualClock` stands in for real sleeps.

mod common;

use common::*;
use quarry_core::{DbError, ErrorKind};
use quarry_engine::diagnostics::BLOCKING_SESSIONS_SQL;
use quarry_engine::driver::scripted::{Reply, Request};
use quarry_engine::{Conditional, EngineConfig};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const UPDATE_SQL: &str = "UPDATE [Clients] SET [IsActive] = 0";

/// Fail the first `failures` runs of `UPDATE_SQL` with `error`, then succeed.
fn failing_updates(
    failures: usize,
    error: DbError,
) -> (Arc<AtomicUsize>, impl Fn(&Request) -> Reply + Send + Sync + 'static) {
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&calls);
    let responder = move |req: &Request| {
        if req.sql == UPDATE_SQL {
            let n = seen.fetch_add(1, Ordering::SeqCst);
            if n < failures {
                return Reply::Error(error.clone());
            }
        }
        Reply::Affected(1)
    };
    (calls, responder)
}

// ============================================================================
// Attempt budget
// ============================================================================

#[test]
fn test_lock_timeout_then_success_sleeps_once() {
    let (calls, responder) = failing_updates(1, DbError::lock_timeout());
    let (db, connector, clock) = database_with(test_config(), responder);

    let outcome = db.raw(UPDATE_SQL).execute_default();
    assert!(outcome.is_success(), "{:?}", outcome.error());
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(clock.sleeps(), vec![Duration::from_millis(1000)]);
    // the failed connection is discarded, a fresh one serves the retry
    assert_eq!(connector.opened(), 2);
    assert_eq!(connector.closed(), 2);
}

#[test]
fn test_lock_timeout_extends_budget_by_one() {
    let (calls, responder) = failing_updates(usize::MAX, DbError::lock_timeout());
    let (db, _, clock) = database_with(test_config(), responder);

    let outcome = db.raw(UPDATE_SQL).execute_default();
    assert_eq!(outcome.error().unwrap().kind(), ErrorKind::TransientLock);
    // retry_count 2, plus one after the lock timeout
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(clock.sleeps().len(), 2);
}

#[test]
fn test_lock_timeout_extends_single_attempt() {
    let (calls, responder) = failing_updates(usize::MAX, DbError::lock_timeout());
    let (db, _, _) = database_with(test_config(), responder);

    assert!(!db.raw(UPDATE_SQL).execute(false, false).is_success());
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_non_transient_error_stays_within_base_count() {
    let (calls, responder) =
        failing_updates(usize::MAX, DbError::from_server_code(2627, "duplicate key"));
    let (db, _, clock) = database_with(test_config(), responder);

    let outcome = db.raw(UPDATE_SQL).execute_default();
    assert_eq!(outcome.error().unwrap().kind(), ErrorKind::Constraint);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(clock.sleeps().len(), 1);
}

#[test]
fn test_retry_disabled_single_attempt() {
    let (calls, responder) =
        failing_updates(usize::MAX, DbError::from_server_code(102, "Incorrect syntax"));
    let (db, _, clock) = database_with(test_config(), responder);

    assert!(!db.raw(UPDATE_SQL).execute(false, false).is_success());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(clock.sleeps().is_empty());
}

#[test]
fn test_wall_clock_ceiling_stops_retrying() {
    let config = EngineConfig {
        retry_count: 10,
        retry_ceiling_ms: 1500,
        ..test_config()
    };
    let (calls, responder) = failing_updates(usize::MAX, DbError::lock_timeout());
    let (db, _, clock) = database_with(config, responder);

    assert!(!db.raw(UPDATE_SQL).execute_default().is_success());
    // 0 ms: fail, sleep to 1000 ms; 1000 ms: fail, 2000 ms would pass the ceiling
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(clock.sleeps().len(), 1);
    assert!(clock.elapsed() <= Duration::from_millis(1500));
}

#[test]
fn test_validation_error_never_reaches_driver() {
    let (db, connector, clock) = database();
    let mut delete = db.delete_where::<Client>().unwrap();

    let outcome = delete.execute_default();
    assert_eq!(outcome.error().unwrap().kind(), ErrorKind::Validation);
    assert_eq!(connector.opened(), 0);
    assert!(clock.sleeps().is_empty());
}

#[test]
fn test_connect_failure_is_retried() {
    let (db, connector, clock) = database();
    connector.set_connect_error(Some(DbError::from_server_code(53, "server not found")));

    let outcome = db.raw(UPDATE_SQL).execute_default();
    assert_eq!(outcome.error().unwrap().kind(), ErrorKind::Connectivity);
    assert_eq!(clock.sleeps().len(), 1);
    assert_eq!(connector.opened(), 0);
}

// ============================================================================
// Connection release
// ============================================================================

#[test]
fn test_session_configured_on_every_attempt() {
    let (db, connector, _) = database();
    assert!(db.raw(UPDATE_SQL).execute_default().is_success());
    assert_eq!(connector.matching("SET LANGUAGE us_english").len(), 1);
    assert_eq!(
        connector
            .matching("SET TRANSACTION ISOLATION LEVEL READ UNCOMMITTED")
            .len(),
        1
    );
}

#[test]
fn test_keep_open_reuses_connection_until_drop() {
    let (db, connector, _) = database();
    {
        let mut select = db.select::<Client>().unwrap();
        select.equals("IsActive", true).unwrap();
        assert!(select.execute(true, true).is_success());
        assert!(select.execute(true, true).is_success());
        assert_eq!(connector.opened(), 1);
        assert_eq!(connector.closed(), 0);
    }
    assert_eq!(connector.closed(), 1);
}

#[test]
fn test_borrowed_connection_never_closed() {
    let (db, connector, _) = database();
    let conn = db.connect().unwrap();
    {
        let mut raw = db.raw(UPDATE_SQL).on(&conn);
        assert!(raw.execute_default().is_success());
    }
    assert_eq!(connector.opened(), 1);
    assert_eq!(connector.closed(), 0);
    conn.close().unwrap();
}

// ============================================================================
// Lock report
// ============================================================================

fn wait_for(deadline: Duration, check: impl Fn() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if check() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    check()
}

#[test]
fn test_lock_report_spawned_once_per_call() {
    let config = EngineConfig {
        lock_diagnostics: true,
        ..test_config()
    };
    let (calls, responder) = failing_updates(2, DbError::lock_timeout());
    let (db, connector, _) = database_with(config, responder);

    assert!(db.raw(UPDATE_SQL).execute_default().is_success());
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    let reported = wait_for(Duration::from_secs(5), || {
        !connector.matching(BLOCKING_SESSIONS_SQL).is_empty()
    });
    assert!(reported);
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(connector.matching(BLOCKING_SESSIONS_SQL).len(), 1);
}

#[test]
fn test_lock_report_failure_is_swallowed() {
    let config = EngineConfig {
        lock_diagnostics: true,
        ..test_config()
    };
    let (calls, inner) = failing_updates(1, DbError::lock_timeout());
    let responder = move |req: &Request| {
        if req.sql == BLOCKING_SESSIONS_SQL {
            Reply::Error(DbError::from_server_code(297, "permission denied"))
        } else {
            inner(req)
        }
    };
    let (db, _, _) = database_with(config, responder);

    assert!(db.raw(UPDATE_SQL).execute_default().is_success());
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}
