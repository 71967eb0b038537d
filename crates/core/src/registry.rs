//! Per-type descriptor cache
//!
//! Descriptors are built on first use and shared afterwards. A failed
//! description is not cached, so the error surfaces on every attempt.

use crate::error::Result;
use crate::model::{Model, ModelDescriptor};
use dashmap::DashMap;
use once_cell::sync::Lazy;
use std::any::TypeId;
use std::sync::Arc;

static DESCRIPTORS: Lazy<DashMap<TypeId, Arc<ModelDescriptor>>> = Lazy::new(DashMap::new);

/// Cached descriptor for `M`.
///
/// # Errors
///
/// Propagates the validation error from [`Model::describe`].
pub fn descriptor<M: Model>() -> Result<Arc<ModelDescriptor>> {
    let id = TypeId::of::<M>();
    if let Some(found) = DESCRIPTORS.get(&id) {
        return Ok(Arc::clone(found.value()));
    }
    let built = Arc::new(M::describe()?);
    let entry = DESCRIPTORS.entry(id).or_insert(built);
    Ok(Arc::clone(entry.value()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FieldDescriptor, FieldType, FromRow};
    use crate::row::Row;
    use crate::value::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static DESCRIBE_CALLS: AtomicUsize = AtomicUsize::new(0);

    struct Counted;

    impl FromRow for Counted {
        fn from_row(_row: &Row) -> Result<Self> {
            Ok(Counted)
        }
    }

    impl Model for Counted {
        type Key = i32;

        fn describe() -> Result<ModelDescriptor> {
            DESCRIBE_CALLS.fetch_add(1, Ordering::SeqCst);
            ModelDescriptor::new(
                "Counted",
                vec![FieldDescriptor::new("Id", FieldType::Int).primary_key()],
            )
        }

        fn key(&self) -> i32 {
            0
        }

        fn values(&self) -> Vec<Value> {
            vec![Value::Int(0)]
        }
    }

    struct Keyless;

    impl FromRow for Keyless {
        fn from_row(_row: &Row) -> Result<Self> {
            Ok(Keyless)
        }
    }

    impl Model for Keyless {
        type Key = i32;

        fn describe() -> Result<ModelDescriptor> {
            ModelDescriptor::new(
                "Keyless",
                vec![FieldDescriptor::new("Name", FieldType::String)],
            )
        }

        fn key(&self) -> i32 {
            0
        }

        fn values(&self) -> Vec<Value> {
            vec![Value::Null]
        }
    }

    #[test]
    fn test_descriptor_built_once() {
        let first = descriptor::<Counted>().unwrap();
        let second = descriptor::<Counted>().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(DESCRIBE_CALLS.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_invalid_descriptor_is_an_error() {
        assert!(descriptor::<Keyless>().is_err());
        assert!(descriptor::<Keyless>().is_err());
    }
}
