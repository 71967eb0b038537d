//! Temporary tables: naming, DDL, drop, and `SELECT ... INTO` rewriting

use crate::literal::quote_ident;
use quarry_core::{Error, FieldDescriptor, FieldType, Result};
use uuid::Uuid;

/// Column of a change-type staging table holding the key
pub const CHANGE_KEY_COLUMN: &str = "PK";

/// Column of a change-type staging table holding the op code
pub const CHANGE_TYPE_COLUMN: &str = "ChangeType";

/// Normalize a temporary table name.
///
/// An empty name becomes a fresh global name `##temp_<uuid>`; a name without
/// a leading `#` gets one.
pub fn temp_table_name(name: &str) -> String {
    let name = name.trim();
    if name.is_empty() {
        format!("##temp_{}", Uuid::new_v4().simple())
    } else if name.starts_with('#') {
        name.to_string()
    } else {
        format!("#{}", name)
    }
}

/// Fresh global names for a bulk operation: `(change types, models)`.
pub fn staging_names() -> (String, String) {
    let id = Uuid::new_v4().simple().to_string();
    (
        format!("##tbChangesType_{}", id),
        format!("##tbChangesModel_{}", id),
    )
}

fn column_type(field_type: FieldType) -> &'static str {
    match field_type {
        FieldType::Int => "[int] default 0",
        FieldType::Long => "[bigint] default 0",
        FieldType::Decimal => "[numeric](20, 3) default 0",
        FieldType::DateTime => "[datetime]",
        FieldType::Bool => "[bit] default 0",
        FieldType::Bytes => "[varbinary](max)",
        FieldType::String | FieldType::Other => {
            "[varchar](max) COLLATE SQL_Latin1_General_CP1_CI_AS default ''"
        }
    }
}

/// `CREATE TABLE` for a temporary table shaped like `fields`.
///
/// Every column is nullable; identity is not carried over.
pub fn create_table_sql<'f>(
    name: &str,
    fields: impl IntoIterator<Item = &'f FieldDescriptor>,
) -> String {
    let columns: Vec<String> = fields
        .into_iter()
        .map(|f| format!("{} {} NULL", quote_ident(&f.name), column_type(f.field_type)))
        .collect();
    format!("CREATE TABLE {} ({})", name, columns.join(", "))
}

/// `CREATE TABLE` for the change-type staging table.
pub fn change_type_table_sql(name: &str, key: &FieldDescriptor) -> String {
    format!(
        "CREATE TABLE {} ({} {} NULL, {} [char](1) NULL)",
        name,
        quote_ident(CHANGE_KEY_COLUMN),
        column_type(key.field_type),
        quote_ident(CHANGE_TYPE_COLUMN)
    )
}

/// Idempotent drop of a temporary table.
pub fn drop_table_sql(name: &str) -> String {
    format!(
        "IF OBJECT_ID('tempdb..{name}') IS NOT NULL DROP TABLE {name}",
        name = name
    )
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'@' || b == b'#'
}

/// Byte offset of `keyword` as a whole word in `upper`, at or after `from`.
fn find_keyword(upper: &str, keyword: &str, from: usize) -> Option<usize> {
    let bytes = upper.as_bytes();
    let mut start = from;
    while let Some(rel) = upper.get(start..).and_then(|s| s.find(keyword)) {
        let at = start + rel;
        let end = at + keyword.len();
        let before_ok = at == 0 || !is_word_byte(bytes[at - 1]);
        let after_ok = end >= bytes.len() || !is_word_byte(bytes[end]);
        if before_ok && after_ok {
            return Some(at);
        }
        start = at + 1;
    }
    None
}

/// Rewrite `SELECT ... FROM` into `SELECT ... INTO table FROM`.
///
/// # Errors
///
/// Returns `Error::Validation` when the SQL already selects `INTO`, or has no
/// `SELECT` followed by a `FROM`.
pub fn rewrite_select_into(sql: &str, table: &str) -> Result<String> {
    let upper = sql.to_ascii_uppercase();
    if find_keyword(&upper, "INTO", 0).is_some() {
        return Err(Error::validation(
            "query already contains INTO; cannot redirect it into a temporary table",
        ));
    }
    let select = find_keyword(&upper, "SELECT", 0)
        .ok_or_else(|| Error::validation("query has no SELECT to redirect"))?;
    let from = find_keyword(&upper, "FROM", select + "SELECT".len())
        .ok_or_else(|| Error::validation("query has no FROM after SELECT"))?;
    let (head, tail) = sql.split_at(from);
    Ok(format!("{} INTO {} {}", head.trim_end(), table, tail))
}
