//! Serializable view of pending changes.
//!
//! Attached to change-command failures and exposed through
//! `ChangeCommand::list_changes`.

use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt;

/// State of a pending change as shown in a change list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeState {
    /// Row will be inserted
    Insert,
    /// Row will be updated
    Update,
    /// Row will be deleted
    Delete,
    /// Existence not yet probed
    InsertOrUpdate,
}

impl fmt::Display for ChangeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChangeState::Insert => "Insert",
            ChangeState::Update => "Update",
            ChangeState::Delete => "Delete",
            ChangeState::InsertOrUpdate => "InsertOrUpdate",
        };
        f.write_str(name)
    }
}

/// One entry of a change list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeLogItem {
    /// Pending operation
    pub state: ChangeState,
    /// Target table
    pub table: String,
    /// Primary key column
    pub key_name: String,
    /// Primary key value
    pub key_value: Value,
    /// Column/value pairs carried by the change (empty for key-only deletes)
    pub fields: Vec<(String, Value)>,
}

impl fmt::Display for ChangeLogItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} [{}]={}",
            self.state, self.table, self.key_name, self.key_value
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_names_key() {
        let item = ChangeLogItem {
            state: ChangeState::Delete,
            table: "Clients".into(),
            key_name: "ID".into(),
            key_value: Value::Int(4),
            fields: Vec::new(),
        };
        assert_eq!(item.to_string(), "Delete Clients [ID]=4");
    }

    #[test]
    fn test_serializes_to_json() {
        let item = ChangeLogItem {
            state: ChangeState::Insert,
            table: "Clients".into(),
            key_name: "ID".into(),
            key_value: Value::Int(1),
            fields: vec![("Name".into(), Value::from("Ana"))],
        };
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["state"], "Insert");
        assert_eq!(json["table"], "Clients");
    }
}
