//! Predicate-driven and raw SQL commands
//!
//! - select: rows, projections, paging, `SELECT INTO`
//! - aggregate: COUNT and EXISTS
//! - mutate: conditional DELETE and UPDATE
//! - raw: hand-written SQL with named parameters

// Implements `Conditional` for a command with `desc` and `conditions` fields.
macro_rules! impl_conditional {
    ($command:ident) => {
        impl<M: quarry_core::Model> $crate::commands::Conditional for $command<M> {
            fn descriptor(&self) -> &quarry_core::ModelDescriptor {
                &self.desc
            }

            fn conditions(&self) -> &quarry_sql::Conditions {
                &self.conditions
            }

            fn conditions_mut(&mut self) -> &mut quarry_sql::Conditions {
                &mut self.conditions
            }
        }
    };
}

mod aggregate;
mod mutate;
mod raw;
mod select;

pub use aggregate::{CountCommand, ExistsCommand};
pub use mutate::{DeleteWhere, UpdateWhere};
pub use raw::RawCommand;
pub use select::SelectCommand;

use quarry_core::{ModelDescriptor, Result, Value};
use quarry_sql::{Conditions, Predicate, PredicateKind};

/// Commands filtered by a [`Conditions`] set.
///
/// Field names are checked against the model when a condition is added, so
/// an unknown field fails before any I/O. Adding any condition removes an
/// earlier equality on the same field.
pub trait Conditional {
    /// Model the conditions apply to
    fn descriptor(&self) -> &ModelDescriptor;

    /// Current conditions
    fn conditions(&self) -> &Conditions;

    /// Mutable conditions
    fn conditions_mut(&mut self) -> &mut Conditions;

    /// Add a condition of any kind on `field`.
    fn add_condition(&mut self, field: &str, kind: PredicateKind) -> Result<&mut Self>
    where
        Self: Sized,
    {
        let declared = self.descriptor().require_field(field)?;
        let predicate = Predicate::new(declared.name.clone(), declared.field_type, kind);
        self.conditions_mut().push(predicate);
        Ok(self)
    }

    /// `field = value`
    fn equals(&mut self, field: &str, value: impl Into<Value>) -> Result<&mut Self>
    where
        Self: Sized,
    {
        self.add_condition(field, PredicateKind::Equals(value.into()))
    }

    /// `min <= field <= max`
    fn range(
        &mut self,
        field: &str,
        min: impl Into<Value>,
        max: impl Into<Value>,
    ) -> Result<&mut Self>
    where
        Self: Sized,
    {
        self.add_condition(
            field,
            PredicateKind::Range {
                min: min.into(),
                max: max.into(),
            },
        )
    }

    /// `field LIKE pattern`
    fn like(&mut self, field: &str, pattern: impl Into<Value>) -> Result<&mut Self>
    where
        Self: Sized,
    {
        self.add_condition(field, PredicateKind::Like(pattern.into()))
    }

    /// `NOT (field = value)`
    fn not(&mut self, field: &str, value: impl Into<Value>) -> Result<&mut Self>
    where
        Self: Sized,
    {
        self.add_condition(field, PredicateKind::Not(value.into()))
    }

    /// `field` equals one of `values`; an empty list matches nothing.
    fn in_list<V: Into<Value>>(
        &mut self,
        field: &str,
        values: impl IntoIterator<Item = V>,
    ) -> Result<&mut Self>
    where
        Self: Sized,
    {
        let values = values.into_iter().map(Into::into).collect();
        self.add_condition(field, PredicateKind::In(values))
    }

    /// Drop every condition on `field`; returns how many were removed.
    fn remove_condition(&mut self, field: &str) -> usize {
        self.conditions_mut().remove(field)
    }

    /// Drop every condition
    fn clear_conditions(&mut self) {
        self.conditions_mut().clear();
    }
}
