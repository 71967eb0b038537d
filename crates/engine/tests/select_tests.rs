//! Select, count, exists and conditional mutation tests

mod common;

use common::*;
use quarry_core::{Error, ErrorKind, Value};
use quarry_engine::driver::scripted::{Reply, Request, RequestKind};
use quarry_engine::Conditional;
use quarry_sql::OrderBy;
use std::time::Duration;

fn bound_after(sql: &str, marker: &str) -> Option<i32> {
    let start = sql.find(marker)? + marker.len();
    let digits: String = sql[start..]
        .chars()
        .skip_while(|c| c.is_whitespace())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

/// Answers paged selects over 25 clients the way the server would.
fn paging_server(req: &Request) -> Reply {
    let lower = bound_after(&req.sql, "OT1.[RowNum] >");
    let upper = bound_after(&req.sql, "OT1.[RowNum] <=");
    match (lower, upper) {
        (Some(lower), Some(upper)) => Reply::Rows(client_table((lower + 1)..=upper.min(25))),
        _ => Reply::Rows(client_table(1..=25)),
    }
}

// ============================================================================
// Conditions
// ============================================================================

#[test]
fn test_empty_in_list_selects_nothing() {
    let (db, connector, _) = database_with(test_config(), |req| {
        if req.sql.contains("(0 = 1)") {
            Reply::Rows(client_table(std::iter::empty()))
        } else {
            Reply::Rows(client_table(1..=3))
        }
    });
    let mut select = db.select::<Client>().unwrap();
    select.in_list("ID", Vec::<i32>::new()).unwrap();

    let rows = select.execute_default().into_result().unwrap();
    assert!(rows.is_empty());
    let sent = connector.requests_of(RequestKind::Query);
    assert!(sent[0].params.is_empty());
}

#[test]
fn test_later_equality_replaces_earlier() {
    let (db, _, _) = database();
    let mut select = db.select::<Client>().unwrap();
    select
        .equals("Name", "Ann")
        .unwrap()
        .equals("name", "Bob")
        .unwrap()
        .not("IsActive", false)
        .unwrap();

    let statement = select.statement().unwrap();
    assert_eq!(statement.param_count(), 2);
    assert_eq!(statement.params[0].value, Value::from("Bob"));
    assert!(statement.sql.contains("WHERE 1=1 AND ([Name] = @p_"));
    assert!(statement.sql.contains("NOT ([IsActive] = @p_"));
}

#[test]
fn test_any_condition_replaces_equality() {
    let (db, _, _) = database();
    let mut select = db.select::<Client>().unwrap();
    select
        .equals("Name", "Ann")
        .unwrap()
        .like("Name", "B%")
        .unwrap();
    let statement = select.statement().unwrap();
    assert_eq!(statement.param_count(), 1);
    assert!(!statement.sql.contains("[Name] ="));
}

#[test]
fn test_range_binds_two_parameters() {
    let (db, _, _) = database();
    let mut select = db.select::<Client>().unwrap();
    select.range("ID", 10, 20).unwrap();
    let statement = select.statement().unwrap();
    assert_eq!(statement.param_count(), 2);
    assert!(statement.sql.contains("[ID] >= @p_"));
}

#[test]
fn test_unknown_condition_field_rejected() {
    let (db, _, _) = database();
    let mut select = db.select::<Client>().unwrap();
    let err = select.equals("Email", "x").err().unwrap();
    assert!(matches!(err, Error::UnknownField { ref field, .. } if field == "Email"));
}

#[test]
fn test_remove_condition() {
    let (db, _, _) = database();
    let mut select = db.select::<Client>().unwrap();
    select
        .not("Name", "Ann")
        .unwrap()
        .in_list("ID", [1, 2, 3])
        .unwrap();
    assert_eq!(select.remove_condition("name"), 1);
    let statement = select.statement().unwrap();
    assert_eq!(statement.param_count(), 3);
    assert!(!statement.sql.contains("[Name] ="));
}

// ============================================================================
// Paging and projection
// ============================================================================

#[test]
fn test_pages_follow_row_numbers() {
    let (db, _, _) = database_with(test_config(), paging_server);
    let mut select = db.select::<Client>().unwrap();

    select.page(0, 10, vec!["Name".into()]).unwrap();
    let first = select.execute_default().into_result().unwrap();
    assert_eq!(first.iter().map(|c| c.id).collect::<Vec<_>>(), (1..=10).collect::<Vec<_>>());

    select.page(10, 10, vec!["Name".into()]).unwrap();
    let second = select.execute_default().into_result().unwrap();
    assert_eq!(second.first().map(|c| c.id), Some(11));
    assert_eq!(second.last().map(|c| c.id), Some(20));

    select.page(20, 10, vec!["Name".into()]).unwrap();
    assert_eq!(select.execute_default().into_result().unwrap().len(), 5);

    select.clear_paging();
    assert_eq!(select.execute_default().into_result().unwrap().len(), 25);
}

#[test]
fn test_page_sql_shape() {
    let (db, _, _) = database();
    let mut select = db.select::<Client>().unwrap();
    select.page(-3, 10, vec![OrderBy::desc("name")]).unwrap();
    let sql = select.statement().unwrap().sql;
    assert!(sql.starts_with("SELECT * FROM ( SELECT ROW_NUMBER() OVER (ORDER BY [Name] DESC) AS [RowNum]"));
    assert!(sql.ends_with("OT1 WHERE OT1.[RowNum] > 0 AND OT1.[RowNum] <= 10 ORDER BY OT1.[RowNum]"));
}

#[test]
fn test_invalid_paging_rejected() {
    let (db, _, _) = database();
    let mut select = db.select::<Client>().unwrap();
    assert_eq!(
        select.page(0, 0, vec!["Name".into()]).err().unwrap().kind(),
        ErrorKind::Validation
    );
    assert!(select.page(0, 10, Vec::new()).is_err());
    assert!(select.page(0, 10, vec!["Missing".into()]).is_err());
}

#[test]
fn test_top_with_ordering() {
    let (db, _, _) = database();
    let mut select = db.select::<Client>().unwrap();
    select.top(5, vec![OrderBy::desc("LastBuyDate")]).unwrap();
    let sql = select.statement().unwrap().sql;
    assert!(sql.starts_with("SELECT TOP (5) [ID], [Name], [IsActive], [LastBuyDate] FROM [Clients]"));
    assert!(sql.ends_with("ORDER BY [LastBuyDate] DESC"));
}

#[test]
fn test_ignored_columns_left_out() {
    let (db, _, _) = database();
    let mut select = db.select::<Client>().unwrap();
    select.ignore_columns(&["LastBuyDate", "isactive"]).unwrap();
    assert_eq!(
        select.statement().unwrap().sql,
        "SELECT [ID], [Name] FROM [Clients] WHERE 1=1"
    );
}

#[test]
fn test_projection_with_explicit_mapping() {
    let (db, connector, _) = database_with(test_config(), |_| {
        let mut table = quarry_core::Table::new(vec!["Name".into(), "Active".into()]);
        table.push(vec![Value::from("Ann"), Value::Bool(true)]).unwrap();
        Reply::Rows(table)
    });
    let mut select = db.select::<Client>().unwrap();
    select.map_column("Active", "IsActive").unwrap();

    let names = select.project::<ClientName>(false, true).into_result().unwrap();
    assert_eq!(
        names,
        vec![ClientName {
            name: "Ann".into(),
            active: true
        }]
    );
    let sql = &connector.requests_of(RequestKind::Query)[0].sql;
    assert!(sql.starts_with("SELECT [Name], [IsActive] AS [Active] FROM [Clients]"));
}

#[test]
fn test_select_into_temp_table() {
    let (db, connector, _) = database();
    let conn = db.connect().unwrap();
    let mut select = db.select::<Client>().unwrap().on(&conn);
    select.equals("IsActive", true).unwrap();

    let table = select.into_temp_table("active", false, true).into_result().unwrap();
    assert_eq!(table, "#active");
    let sent = connector.matching("INTO #active FROM [Clients]");
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].kind, RequestKind::Execute);
}

// ============================================================================
// Count and exists
// ============================================================================

#[test]
fn test_count_uses_quick_timeout() {
    let (db, connector, _) = database_with(test_config(), |req| {
        if req.sql.starts_with("SELECT COUNT(*)") {
            Reply::Scalar(Value::Int(42))
        } else {
            Reply::Affected(0)
        }
    });
    let mut count = db.count::<Client>().unwrap();
    count.equals("IsActive", true).unwrap();
    assert_eq!(count.execute_default().into_result().unwrap(), 42);

    let sent = connector.matching("SELECT COUNT(*) FROM [Clients] WHERE 1=1 AND ([IsActive] = @p_");
    assert_eq!(sent[0].timeout, Some(Duration::from_secs(10)));
}

#[test]
fn test_select_to_count_keeps_conditions() {
    let (db, connector, _) = database_with(test_config(), |_| Reply::Scalar(Value::Long(7)));
    let mut select = db.select::<Client>().unwrap();
    select.like("Name", "A%").unwrap();
    let mut count = select.to_count();
    assert_eq!(count.execute_default().into_result().unwrap(), 7);
    assert_eq!(connector.matching("([Name] LIKE @p_").len(), 1);
}

#[test]
fn test_exists() {
    let (db, _, _) = database_with(test_config(), |req| {
        if req.sql.contains("THEN 1 ELSE 0") {
            Reply::Scalar(Value::Int(1))
        } else {
            Reply::Affected(0)
        }
    });
    let mut exists = db.exists::<Client>().unwrap();
    exists.equals("Name", "Ann").unwrap();
    assert!(exists.execute_default().into_result().unwrap());
}

// ============================================================================
// Conditional delete and update
// ============================================================================

#[test]
fn test_delete_where_through_key_subselect() {
    let (db, connector, _) = database_with(test_config(), |req| {
        if req.sql.starts_with("DELETE") {
            Reply::Affected(4)
        } else {
            Reply::Affected(0)
        }
    });
    let mut delete = db.delete_where::<Client>().unwrap();
    delete.equals("IsActive", false).unwrap();
    assert_eq!(delete.execute_default().into_result().unwrap(), 4);
    assert_eq!(
        connector
            .matching("DELETE FROM [Clients] WHERE [ID] IN (SELECT [ID] FROM [Clients] WHERE 1=1 AND")
            .len(),
        1
    );
}

#[test]
fn test_update_where_reports_rows_affected() {
    let (db, connector, _) = database_with(test_config(), |req| {
        if req.sql.starts_with("UPDATE") {
            Reply::Affected(7)
        } else {
            Reply::Affected(0)
        }
    });
    let mut update = db.update_where::<Client>().unwrap();
    update
        .set("LastBuyDate", buy_date())
        .unwrap()
        .set("IsActive", true)
        .unwrap();
    update.range("ID", 1, 100).unwrap();

    assert_eq!(update.execute_default().into_result().unwrap(), 7);
    let sent = connector.matching("UPDATE [Clients] SET [LastBuyDate] = @p_");
    assert_eq!(sent.len(), 1);
    // two assignments, then two range bounds
    assert_eq!(sent[0].params.len(), 4);
    assert_eq!(sent[0].params[0].value, Value::DateTime(buy_date()));
}

#[test]
fn test_update_where_requires_assignments_and_conditions() {
    let (db, connector, _) = database();
    let mut update = db.update_where::<Client>().unwrap();
    update.equals("ID", 1).unwrap();
    assert_eq!(
        update.execute_default().error().unwrap().kind(),
        ErrorKind::Validation
    );

    update.set("Name", "Zed").unwrap();
    update.reset();
    assert!(update.assignments().is_empty());
    assert!(update.conditions().is_empty());
    assert!(!update.execute_default().is_success());
    assert!(update.set("ID", 3).is_err());
    assert_eq!(connector.opened(), 0);
}
