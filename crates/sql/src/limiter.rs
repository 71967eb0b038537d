//! Parameter ceiling enforcement and round-trip grouping

use crate::statement::Statement;
use quarry_core::{Error, Limits, Result};

/// Fail when any single statement needs more parameters than allowed.
pub fn check_ceiling(statements: &[Statement], limits: &Limits) -> Result<()> {
    match statements
        .iter()
        .find(|s| s.param_count() > limits.max_parameters)
    {
        Some(s) => Err(Error::ParameterLimit {
            max: limits.max_parameters,
            actual: s.param_count(),
        }),
        None => Ok(()),
    }
}

/// Group statements into round trips.
///
/// Each round holds at most `statements_per_round` statements and at most
/// `max_parameters` parameters. Statement order is preserved. The whole list
/// is checked against the ceiling before anything is grouped.
pub fn group_rounds(statements: Vec<Statement>, limits: &Limits) -> Result<Vec<Statement>> {
    check_ceiling(&statements, limits)?;

    let per_round = limits.statements_per_round.max(1);
    let mut rounds = Vec::new();
    let mut current = Statement::default();
    let mut in_current = 0usize;

    for statement in statements {
        let fits = in_current < per_round
            && current.param_count() + statement.param_count() <= limits.max_parameters;
        if in_current > 0 && !fits {
            rounds.push(std::mem::take(&mut current));
            in_current = 0;
        }
        current.append(statement);
        in_current += 1;
    }
    if in_current > 0 {
        rounds.push(current);
    }
    Ok(rounds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statement::Parameter;
    use proptest::prelude::*;

    fn stmt(params: usize) -> Statement {
        Statement::new(
            format!("EXEC x /* {} */", params),
            (0..params).map(|i| Parameter::named(format!("a{}", i), 1)).collect(),
        )
    }

    #[test]
    fn test_single_oversized_statement_fails_fast() {
        let limits = Limits::with_small_limits();
        let err = group_rounds(vec![stmt(1), stmt(13)], &limits).unwrap_err();
        assert!(matches!(err, Error::ParameterLimit { max: 12, actual: 13 }));
    }

    #[test]
    fn test_rounds_respect_statement_cap() {
        let limits = Limits::with_small_limits();
        let rounds = group_rounds(vec![stmt(0), stmt(0), stmt(0), stmt(0), stmt(0)], &limits).unwrap();
        assert_eq!(rounds.len(), 3);
    }

    #[test]
    fn test_rounds_respect_parameter_cap() {
        let limits = Limits::with_small_limits();
        let rounds = group_rounds(vec![stmt(7), stmt(7)], &limits).unwrap();
        assert_eq!(rounds.len(), 2);
    }

    #[test]
    fn test_empty_input_has_no_rounds() {
        assert!(group_rounds(Vec::new(), &Limits::default()).unwrap().is_empty());
    }

    proptest! {
        #[test]
        fn test_rounds_stay_within_limits(sizes in proptest::collection::vec(0usize..=12, 0..30)) {
            let limits = Limits::with_small_limits();
            let total: usize = sizes.iter().sum();
            let statements: Vec<Statement> = sizes.iter().map(|n| stmt(*n)).collect();
            let rounds = group_rounds(statements, &limits).unwrap();
            let mut seen = 0;
            for round in &rounds {
                prop_assert!(round.param_count() <= limits.max_parameters);
                prop_assert!(round.sql.matches("EXEC").count() <= limits.statements_per_round);
                seen += round.param_count();
            }
            prop_assert_eq!(seen, total);
        }
    }
}
