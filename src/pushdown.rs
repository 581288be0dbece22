//! Job descriptor assembler (C8): pure data and normalization rules for
//! what gets pushed down to the producer job runner (spec.md §4.5's
//! "Pushdown normalization" paragraph). Contract-only: nothing here talks
//! to the network or the registry.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggregateFunction {
    Count,
    Sum,
    Min,
    Max,
    Avg,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateDescriptor {
    pub function: AggregateFunction,
    pub input_column: String,
    pub output_column: String,
    pub group_by: Vec<String>,
}

/// Top-N preserves ordering; LIMIT is an unordered sample (spec.md §4.5).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RowLimit {
    TopN { order_by: Vec<OrderKey>, n: u64 },
    Limit { n: u64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderKey {
    pub column: String,
    pub descending: bool,
}

/// A conjunctive predicate expressed against a catalog base column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Predicate {
    pub column: String,
    pub op: PredicateOp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PredicateOp {
    Eq(String),
    In(Vec<String>),
    Range { low: Option<String>, high: Option<String> },
}

/// What ships to the producer job runner alongside the connection
/// parameters in spec.md §4.5 step 3.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDescriptor {
    pub projection: Vec<String>,
    pub predicates: Vec<Predicate>,
    pub limit: Option<RowLimit>,
    pub aggregation: Option<AggregateDescriptor>,
}

/// Assembles a descriptor from planner inputs, applying the normalization
/// rules: deterministic input order is preserved; aggregation is dropped
/// when a limit is already present (spec.md §4.5). `enable_aggregation_pushdown`
/// and `enable_topn_pushdown` gate the two pushdown kinds independently of
/// that normalization: disabling aggregation pushdown always strips
/// `aggregation`, and disabling Top-N pushdown demotes a `TopN` limit to a
/// plain unordered `Limit` of the same size, leaving ordering to the engine.
pub fn assemble(
    projection: Vec<String>,
    static_predicates: Vec<Predicate>,
    dynamic_predicates: Vec<Predicate>,
    limit: Option<RowLimit>,
    aggregation: Option<AggregateDescriptor>,
    enable_aggregation_pushdown: bool,
    enable_topn_pushdown: bool,
) -> JobDescriptor {
    let mut predicates = static_predicates;
    predicates.extend(dynamic_predicates);

    let limit = match limit {
        Some(RowLimit::TopN { n, .. }) if !enable_topn_pushdown => Some(RowLimit::Limit { n }),
        other => other,
    };

    let aggregation = if !enable_aggregation_pushdown || limit.is_some() {
        None
    } else {
        aggregation
    };

    JobDescriptor {
        projection,
        predicates,
        limit,
        aggregation,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assembling_is_idempotent_on_identical_inputs() {
        let a = assemble(
            vec!["a".into(), "b".into()],
            vec![Predicate {
                column: "a".into(),
                op: PredicateOp::Eq("1".into()),
            }],
            vec![],
            None,
            Some(AggregateDescriptor {
                function: AggregateFunction::Sum,
                input_column: "b".into(),
                output_column: "sum_b".into(),
                group_by: vec!["a".into()],
            }),
            true,
            true,
        );
        let b = assemble(
            vec!["a".into(), "b".into()],
            vec![Predicate {
                column: "a".into(),
                op: PredicateOp::Eq("1".into()),
            }],
            vec![],
            None,
            Some(AggregateDescriptor {
                function: AggregateFunction::Sum,
                input_column: "b".into(),
                output_column: "sum_b".into(),
                group_by: vec!["a".into()],
            }),
            true,
            true,
        );
        assert_eq!(a, b);
    }

    #[test]
    fn aggregation_is_dropped_when_a_limit_is_present() {
        let d = assemble(
            vec!["a".into()],
            vec![],
            vec![],
            Some(RowLimit::Limit { n: 10 }),
            Some(AggregateDescriptor {
                function: AggregateFunction::Count,
                input_column: "a".into(),
                output_column: "c".into(),
                group_by: vec![],
            }),
            true,
            true,
        );
        assert!(d.aggregation.is_none());
    }

    #[test]
    fn static_predicates_precede_dynamic_ones_in_input_order() {
        let d = assemble(
            vec!["a".into()],
            vec![Predicate {
                column: "a".into(),
                op: PredicateOp::Eq("1".into()),
            }],
            vec![Predicate {
                column: "b".into(),
                op: PredicateOp::Eq("2".into()),
            }],
            None,
            None,
            true,
            true,
        );
        assert_eq!(d.predicates[0].column, "a");
        assert_eq!(d.predicates[1].column, "b");
    }

    #[test]
    fn disabling_aggregation_pushdown_always_strips_aggregation() {
        let d = assemble(
            vec!["a".into()],
            vec![],
            vec![],
            None,
            Some(AggregateDescriptor {
                function: AggregateFunction::Count,
                input_column: "a".into(),
                output_column: "c".into(),
                group_by: vec![],
            }),
            false,
            true,
        );
        assert!(d.aggregation.is_none());
    }

    #[test]
    fn disabling_topn_pushdown_demotes_topn_to_a_plain_limit() {
        let d = assemble(
            vec!["a".into()],
            vec![],
            vec![],
            Some(RowLimit::TopN {
                order_by: vec![OrderKey {
                    column: "a".into(),
                    descending: true,
                }],
                n: 10,
            }),
            None,
            true,
            false,
        );
        assert_eq!(d.limit, Some(RowLimit::Limit { n: 10 }));
    }
}
