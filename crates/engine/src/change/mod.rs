//! Pending change sets and the change planner
//!
//! A [`ChangeSet`] maps each primary key to one pending [`Change`]; the last
//! registration under a key replaces the earlier one wholesale. The
//! [`ChangeCommand`] resolves, plans and applies a change set.

mod command;
mod plan;

pub use command::ChangeCommand;

use quarry_core::{ChangeLogItem, ChangeState, FieldValue, Model, ModelDescriptor, Value};
use std::collections::BTreeMap;

/// Registered operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    /// Insert a new row
    Insert,
    /// Update an existing row
    Update,
    /// Delete a row
    Delete,
    /// Insert or update, decided by an existence probe
    InsertOrUpdate,
}

impl From<ChangeKind> for ChangeState {
    fn from(kind: ChangeKind) -> Self {
        match kind {
            ChangeKind::Insert => ChangeState::Insert,
            ChangeKind::Update => ChangeState::Update,
            ChangeKind::Delete => ChangeState::Delete,
            ChangeKind::InsertOrUpdate => ChangeState::InsertOrUpdate,
        }
    }
}

/// Data carried by a change
#[derive(Debug, Clone)]
pub enum Payload<M> {
    /// Full row
    Model(M),
    /// Specific fields only
    Fields(Vec<FieldValue>),
    /// Key only (deletes)
    KeyOnly,
}

impl<M> Payload<M> {
    /// Whether the change carries a full row
    pub fn is_model(&self) -> bool {
        matches!(self, Payload::Model(_))
    }
}

/// One pending row-level mutation
#[derive(Debug, Clone)]
pub struct Change<M: Model> {
    key: M::Key,
    kind: ChangeKind,
    payload: Payload<M>,
}

impl<M: Model> Change<M> {
    /// Primary key
    pub fn key(&self) -> &M::Key {
        &self.key
    }

    /// Registered operation
    pub fn kind(&self) -> ChangeKind {
        self.kind
    }

    /// Carried data
    pub fn payload(&self) -> &Payload<M> {
        &self.payload
    }

    /// Change-list entry for this change
    pub fn log_item(&self, desc: &ModelDescriptor) -> ChangeLogItem {
        let fields = match &self.payload {
            Payload::Model(model) => desc
                .bind(model.values())
                .map(|bound| {
                    bound
                        .into_iter()
                        .map(|(f, v)| (f.name.clone(), v))
                        .collect()
                })
                .unwrap_or_default(),
            Payload::Fields(fields) => fields
                .iter()
                .map(|fv| (fv.field.clone(), fv.value.clone()))
                .collect(),
            Payload::KeyOnly => Vec::new(),
        };
        ChangeLogItem {
            state: self.kind.into(),
            table: desc.table().to_string(),
            key_name: desc.primary_key().name.clone(),
            key_value: self.key.clone().into(),
            fields,
        }
    }
}

/// Pending changes keyed by primary key
#[derive(Debug)]
pub struct ChangeSet<M: Model> {
    changes: BTreeMap<M::Key, Change<M>>,
}

impl<M: Model> Default for ChangeSet<M> {
    fn default() -> Self {
        ChangeSet {
            changes: BTreeMap::new(),
        }
    }
}

impl<M: Model> ChangeSet<M> {
    /// Empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a change, replacing any change under the same key.
    pub fn register(&mut self, key: M::Key, kind: ChangeKind, payload: Payload<M>) {
        self.changes.insert(
            key.clone(),
            Change {
                key,
                kind,
                payload,
            },
        );
    }

    /// Pending change under `key`
    pub fn get(&self, key: &M::Key) -> Option<&Change<M>> {
        self.changes.get(key)
    }

    /// Number of pending changes
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// True when nothing is pending
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Drop every pending change
    pub fn clear(&mut self) {
        self.changes.clear();
    }

    /// Pending changes in key order
    pub fn iter(&self) -> impl Iterator<Item = &Change<M>> {
        self.changes.values()
    }

    /// Change list in key order
    pub fn log_items(&self, desc: &ModelDescriptor) -> Vec<ChangeLogItem> {
        self.iter().map(|c| c.log_item(desc)).collect()
    }
}

/// Value of the field a change is logged by: the model's log field when it
/// is present in the change, otherwise the key.
pub(crate) fn log_value(item: &ChangeLogItem, log_field: Option<&str>) -> Value {
    log_field
        .and_then(|name| {
            item.fields
                .iter()
                .find(|(f, _)| f.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.clone())
        })
        .unwrap_or_else(|| item.key_value.clone())
}
