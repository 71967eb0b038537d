//! Pure change planning
//!
//! Turns resolved changes (no `InsertOrUpdate` left) into the bulk staging
//! set and an ordered statement list: inserts, then updates, then deletes,
//! each in key order.

use super::{ChangeKind, Payload};
use crate::bulk::StagedChange;
use crate::outcome::ChangeCounts;
use quarry_core::{Error, Limits, Model, ModelDescriptor, Result, Value};
use quarry_sql::{Statement, StatementBuilder};
use tracing::debug;

/// A change after existence probing
pub(crate) struct Resolved<'a, M> {
    pub(crate) key: Value,
    pub(crate) kind: ChangeKind,
    pub(crate) payload: &'a Payload<M>,
}

/// What to execute
#[derive(Debug, Default)]
pub(crate) struct Plan {
    pub(crate) staged: Vec<StagedChange>,
    pub(crate) statements: Vec<Statement>,
    pub(crate) counts: ChangeCounts,
}

fn goes_bulk<M>(change: &Resolved<'_, M>, bulk: bool) -> bool {
    bulk && match change.payload {
        Payload::Model(_) => true,
        Payload::KeyOnly => change.kind == ChangeKind::Delete,
        Payload::Fields(_) => false,
    }
}

/// Build the plan.
///
/// `changes` must be in key order. When their number reaches
/// `bulk_threshold`, full-row changes and key-only deletes are staged for
/// the bulk path; everything else becomes statements.
pub(crate) fn plan<M: Model>(
    desc: &ModelDescriptor,
    changes: &[Resolved<'_, M>],
    bulk_threshold: usize,
    limits: Limits,
) -> Result<Plan> {
    let builder = StatementBuilder::new(desc, limits);
    let bulk = changes.len() >= bulk_threshold;
    let mut plan = Plan::default();

    for change in changes.iter().filter(|c| goes_bulk(c, bulk)) {
        let values = match change.payload {
            Payload::Model(model) if change.kind != ChangeKind::Delete => Some(model.values()),
            _ => None,
        };
        plan.staged.push(StagedChange {
            key: change.key.clone(),
            kind: change.kind,
            values,
        });
        count(&mut plan.counts, change.kind);
    }
    plan.counts.bulk_staged = plan.staged.len();

    let direct: Vec<&Resolved<'_, M>> = changes.iter().filter(|c| !goes_bulk(c, bulk)).collect();

    // Inserts: consecutive full rows share a multi-row INSERT.
    let rows_per_batch = limits.rows_per_insert(desc.insert_fields().count());
    let mut pending_rows: Vec<Vec<Value>> = Vec::new();
    for change in direct.iter().filter(|c| c.kind == ChangeKind::Insert) {
        match change.payload {
            Payload::Model(model) => {
                pending_rows.push(model.values());
                if pending_rows.len() >= rows_per_batch {
                    plan.statements
                        .push(builder.insert_rows(std::mem::take(&mut pending_rows))?);
                }
            }
            Payload::Fields(fields) => {
                if !pending_rows.is_empty() {
                    plan.statements
                        .push(builder.insert_rows(std::mem::take(&mut pending_rows))?);
                }
                plan.statements.push(builder.insert_fields(&change.key, fields)?);
            }
            Payload::KeyOnly => {
                return Err(Error::Internal("insert without row data".to_string()));
            }
        }
        plan.counts.inserted += 1;
    }
    if !pending_rows.is_empty() {
        plan.statements.push(builder.insert_rows(pending_rows)?);
    }

    // A full row with nothing but its key has no UPDATE to run.
    let settable = builder.has_settable_fields();
    for change in direct.iter().filter(|c| c.kind == ChangeKind::Update) {
        let statement = match change.payload {
            Payload::Model(_) if !settable => {
                debug!(
                    target: "quarry::change",
                    table = desc.table(),
                    key = %change.key,
                    "Nothing to update, skipping"
                );
                plan.counts.updated += 1;
                continue;
            }
            Payload::Model(model) => builder.update_row(model.values())?,
            Payload::Fields(fields) => builder.update_fields(&change.key, fields)?,
            Payload::KeyOnly => {
                return Err(Error::Internal("update without row data".to_string()));
            }
        };
        plan.statements.push(statement);
        plan.counts.updated += 1;
    }

    for change in direct.iter().filter(|c| c.kind == ChangeKind::Delete) {
        plan.statements.push(builder.delete_by_key(&change.key));
        plan.counts.deleted += 1;
    }

    Ok(plan)
}

fn count(counts: &mut ChangeCounts, kind: ChangeKind) {
    match kind {
        ChangeKind::Insert => counts.inserted += 1,
        ChangeKind::Update => counts.updated += 1,
        ChangeKind::Delete => counts.deleted += 1,
        ChangeKind::InsertOrUpdate => {}
    }
}
