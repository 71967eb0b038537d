//! Predicate model
//!
//! A [`Conditions`] set holds typed filters and compiles them into a WHERE
//! clause plus its parameters.
//!
//! ## Rules
//!
//! - Adding any predicate removes earlier `Equals` predicates on the same
//!   field (case-insensitive). Other kinds accumulate.
//! - Predicates are ANDed; the clause always starts from `1=1`.
//! - An empty `In` compiles to `(0 = 1)`, never to malformed SQL.
//! - A range whose bounds are equal collapses to equality.
//! - `Null` compares with `IS NULL` and binds no parameter.

use crate::literal::quote_ident;
use crate::statement::{Parameter, Statement};
use quarry_core::{FieldType, Limits, Value};

/// What a predicate tests
#[derive(Debug, Clone, PartialEq)]
pub enum PredicateKind {
    /// `field = value`
    Equals(Value),
    /// `min <= field <= max`; a `Null` bound leaves that side open
    Range {
        /// Lower bound, inclusive
        min: Value,
        /// Upper bound, inclusive
        max: Value,
    },
    /// `field LIKE pattern`
    Like(Value),
    /// `NOT (field = value)`
    Not(Value),
    /// `field` equals one of the values
    In(Vec<Value>),
}

/// A single typed filter on one field
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    /// Column name
    pub field: String,
    /// Declared column type
    pub field_type: FieldType,
    /// Test
    pub kind: PredicateKind,
}

impl Predicate {
    /// Create a predicate
    pub fn new(field: impl Into<String>, field_type: FieldType, kind: PredicateKind) -> Self {
        Predicate {
            field: field.into(),
            field_type,
            kind,
        }
    }

    fn is_equals(&self) -> bool {
        matches!(self.kind, PredicateKind::Equals(_))
    }

    fn compile(&self, limits: &Limits, params: &mut Vec<Parameter>) -> String {
        let column = quote_ident(&self.field);
        match &self.kind {
            PredicateKind::Equals(value) => format!(
                "({})",
                self.compare(&column, "=", value, value.text_len(), limits, params)
            ),
            PredicateKind::Not(value) => format!(
                "NOT ({})",
                self.compare(&column, "=", value, value.text_len(), limits, params)
            ),
            PredicateKind::Like(value) => format!(
                "({})",
                self.compare(&column, "LIKE", value, value.text_len(), limits, params)
            ),
            PredicateKind::Range { min, max } => {
                if min == max || (min.is_null() && max.is_null()) {
                    return format!(
                        "({})",
                        self.compare(&column, "=", min, min.text_len(), limits, params)
                    );
                }
                let len = min.text_len().max(max.text_len());
                let mut sides = Vec::with_capacity(2);
                if !min.is_null() {
                    sides.push(self.bind(&column, ">=", min, len, limits, params));
                }
                if !max.is_null() {
                    sides.push(self.bind(&column, "<=", max, len, limits, params));
                }
                format!("({})", sides.join(" AND "))
            }
            PredicateKind::In(values) => {
                if values.is_empty() {
                    return "(0 = 1)".to_string();
                }
                let len = values.iter().map(Value::text_len).max().unwrap_or(1);
                let alternatives: Vec<String> = values
                    .iter()
                    .map(|v| format!("({})", self.compare(&column, "=", v, len, limits, params)))
                    .collect();
                format!("( {} )", alternatives.join(" OR "))
            }
        }
    }

    fn compare(
        &self,
        column: &str,
        op: &str,
        value: &Value,
        len: usize,
        limits: &Limits,
        params: &mut Vec<Parameter>,
    ) -> String {
        if value.is_null() {
            format!("{} IS NULL", column)
        } else {
            self.bind(column, op, value, len, limits, params)
        }
    }

    fn bind(
        &self,
        column: &str,
        op: &str,
        value: &Value,
        len: usize,
        limits: &Limits,
        params: &mut Vec<Parameter>,
    ) -> String {
        let param = Parameter::with_len(self.field_type, value.clone(), len, limits);
        let text = format!("{} {} {}", column, op, param.name);
        params.push(param);
        text
    }
}

/// An ordered set of predicates
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Conditions {
    predicates: Vec<Predicate>,
}

impl Conditions {
    /// Empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a predicate, dropping earlier equalities on the same field.
    pub fn push(&mut self, predicate: Predicate) {
        self.predicates
            .retain(|p| !(p.is_equals() && p.field.eq_ignore_ascii_case(&predicate.field)));
        self.predicates.push(predicate);
    }

    /// Remove every predicate on `field`. Returns how many were removed.
    pub fn remove(&mut self, field: &str) -> usize {
        let before = self.predicates.len();
        self.predicates
            .retain(|p| !p.field.eq_ignore_ascii_case(field));
        before - self.predicates.len()
    }

    /// Remove everything
    pub fn clear(&mut self) {
        self.predicates.clear();
    }

    /// Number of predicates
    pub fn len(&self) -> usize {
        self.predicates.len()
    }

    /// True when no predicate is set
    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    /// Predicates in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &Predicate> {
        self.predicates.iter()
    }

    /// Compile to ` WHERE 1=1 AND ...` and its parameters.
    pub fn compile(&self, limits: &Limits) -> Statement {
        let mut params = Vec::new();
        let mut sql = String::from(" WHERE 1=1");
        for predicate in &self.predicates {
            sql.push_str(" AND ");
            sql.push_str(&predicate.compile(limits, &mut params));
        }
        Statement::new(sql, params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statement::SqlType;
    use proptest::prelude::*;

    fn eq(field: &str, v: impl Into<Value>) -> Predicate {
        Predicate::new(field, FieldType::String, PredicateKind::Equals(v.into()))
    }

    #[test]
    fn test_empty_conditions_are_tautology() {
        let compiled = Conditions::new().compile(&Limits::default());
        assert_eq!(compiled.sql, " WHERE 1=1");
        assert!(compiled.params.is_empty());
    }

    #[test]
    fn test_last_equality_wins() {
        let mut c = Conditions::new();
        c.push(eq("Name", "a"));
        c.push(eq("name", "b"));
        assert_eq!(c.len(), 1);
        let compiled = c.compile(&Limits::default());
        assert_eq!(compiled.params[0].value, Value::from("b"));
    }

    #[test]
    fn test_non_equality_accumulates_but_clears_equality() {
        let mut c = Conditions::new();
        c.push(eq("Name", "a"));
        c.push(Predicate::new("Name", FieldType::String, PredicateKind::Like("a%".into())));
        c.push(Predicate::new("Name", FieldType::String, PredicateKind::Not("x".into())));
        assert_eq!(c.len(), 2);
        let sql = c.compile(&Limits::default()).sql;
        assert!(sql.contains("[Name] LIKE @p_"));
        assert!(sql.contains("NOT ([Name] = @p_"));
    }

    #[test]
    fn test_empty_in_is_false() {
        let mut c = Conditions::new();
        c.push(Predicate::new("ID", FieldType::Int, PredicateKind::In(Vec::new())));
        let compiled = c.compile(&Limits::default());
        assert_eq!(compiled.sql, " WHERE 1=1 AND (0 = 1)");
        assert!(compiled.params.is_empty());
    }

    #[test]
    fn test_in_shares_longest_size() {
        let mut c = Conditions::new();
        c.push(Predicate::new(
            "Name",
            FieldType::String,
            PredicateKind::In(vec!["ab".into(), "abcd".into()]),
        ));
        let compiled = c.compile(&Limits::default());
        assert_eq!(compiled.params.len(), 2);
        assert!(compiled.params.iter().all(|p| p.size == Some(4)));
        assert!(compiled.sql.contains(" OR "));
    }

    #[test]
    fn test_equal_range_collapses() {
        let mut c = Conditions::new();
        c.push(Predicate::new(
            "Age",
            FieldType::Int,
            PredicateKind::Range {
                min: Value::Int(3),
                max: Value::Int(3),
            },
        ));
        let compiled = c.compile(&Limits::default());
        assert_eq!(compiled.params.len(), 1);
        assert!(compiled.sql.contains("([Age] = @p_"));
        assert_eq!(compiled.params[0].sql_type, SqlType::Int);
    }

    #[test]
    fn test_range_binds_both_sides() {
        let mut c = Conditions::new();
        c.push(Predicate::new(
            "Age",
            FieldType::Int,
            PredicateKind::Range {
                min: Value::Int(1),
                max: Value::Int(9),
            },
        ));
        let compiled = c.compile(&Limits::default());
        assert_eq!(compiled.params.len(), 2);
        assert!(compiled.sql.contains(">="));
        assert!(compiled.sql.contains("<="));
    }

    #[test]
    fn test_null_equality_uses_is_null() {
        let mut c = Conditions::new();
        c.push(Predicate::new("LastBuyDate", FieldType::DateTime, PredicateKind::Equals(Value::Null)));
        let compiled = c.compile(&Limits::default());
        assert_eq!(compiled.sql, " WHERE 1=1 AND ([LastBuyDate] IS NULL)");
        assert!(compiled.params.is_empty());
    }

    #[test]
    fn test_remove_drops_all_kinds() {
        let mut c = Conditions::new();
        c.push(eq("Name", "a"));
        c.push(Predicate::new("Name", FieldType::String, PredicateKind::Like("%".into())));
        c.push(eq("City", "x"));
        assert_eq!(c.remove("NAME"), 2);
        assert_eq!(c.len(), 1);
    }

    fn non_null_int() -> impl Strategy<Value = Value> {
        any::<i32>().prop_map(Value::Int)
    }

    proptest! {
        #[test]
        fn test_in_binds_one_parameter_per_value(values in proptest::collection::vec(non_null_int(), 0..40)) {
            let mut c = Conditions::new();
            c.push(Predicate::new("ID", FieldType::Int, PredicateKind::In(values.clone())));
            prop_assert_eq!(c.compile(&Limits::default()).params.len(), values.len());
        }

        #[test]
        fn test_range_binds_two_unless_collapsed(a in any::<i32>(), b in any::<i32>()) {
            let mut c = Conditions::new();
            c.push(Predicate::new("ID", FieldType::Int, PredicateKind::Range { min: Value::Int(a), max: Value::Int(b) }));
            let expected = if a == b { 1 } else { 2 };
            prop_assert_eq!(c.compile(&Limits::default()).params.len(), expected);
        }
    }
}
