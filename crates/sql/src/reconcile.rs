//! Set-based reconciliation of staged bulk changes
//!
//! The script applies staged inserts, then updates, then deletes. The order
//! is fixed.

use crate::literal::quote_ident;
use crate::temp::{CHANGE_KEY_COLUMN, CHANGE_TYPE_COLUMN};
use quarry_core::ModelDescriptor;

/// Build the reconciliation script for staged changes of `desc`'s table.
///
/// `changes` holds `(PK, ChangeType)` rows, `models` holds full rows.
pub fn reconcile_script(desc: &ModelDescriptor, changes: &str, models: &str) -> String {
    let table = quote_ident(desc.table());
    let key = quote_ident(&desc.primary_key().name);
    let change_key = quote_ident(CHANGE_KEY_COLUMN);
    let change_type = quote_ident(CHANGE_TYPE_COLUMN);

    let insert_columns: Vec<String> = desc.insert_fields().map(|f| quote_ident(&f.name)).collect();
    let mut script = Vec::with_capacity(3);

    if !insert_columns.is_empty() {
        let selected: Vec<String> = insert_columns.iter().map(|c| format!("M.{}", c)).collect();
        script.push(format!(
            "INSERT INTO {table} ({cols}) SELECT {sel} FROM {models} AS M \
             INNER JOIN {changes} AS C ON C.{ck} = M.{key} WHERE C.{ct} = 'I'",
            table = table,
            cols = insert_columns.join(", "),
            sel = selected.join(", "),
            models = models,
            changes = changes,
            ck = change_key,
            key = key,
            ct = change_type,
        ));
    }

    let assignments: Vec<String> = desc
        .mapped_fields()
        .filter(|f| !f.is_primary_key && !f.is_identity)
        .map(|f| {
            let c = quote_ident(&f.name);
            format!("T.{c} = M.{c}", c = c)
        })
        .collect();
    if !assignments.is_empty() {
        script.push(format!(
            "UPDATE T SET {sets} FROM {table} AS T \
             INNER JOIN {models} AS M ON M.{key} = T.{key} \
             INNER JOIN {changes} AS C ON C.{ck} = M.{key} WHERE C.{ct} = 'U'",
            sets = assignments.join(", "),
            table = table,
            models = models,
            changes = changes,
            key = key,
            ck = change_key,
            ct = change_type,
        ));
    }

    script.push(format!(
        "DELETE FROM {table} WHERE {key} IN (SELECT C.{ck} FROM {changes} AS C WHERE C.{ct} = 'D')",
        table = table,
        key = key,
        ck = change_key,
        changes = changes,
        ct = change_type,
    ));

    script.join(";\n")
}
