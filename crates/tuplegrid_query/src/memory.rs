//! Evaluable filters for in-memory stores.
//!
//! Leaves follow SQL three-valued logic: a comparison against a missing or
//! null column is unknown, and unknown never matches. This holds for the
//! negated forms too, so `<>`, `NOT BETWEEN`, `NOT IN` and `NOT LIKE` reject
//! such rows just like their positive counterparts. Only `IS NULL` and
//! `IS NOT NULL` inspect the missing value itself.

use crate::error::QueryResult;
use crate::like::LikePattern;
use crate::predicate::{
    ComparisonType, PredicateFactory, PredicateValue, QueryParameters, RootContext, SortColumn,
    SortOrder,
};
use crate::property::Column;
use std::cmp::Ordering;
use tuplegrid_model::{Tuple, Value};

/// A predicate over one tuple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TupleFilter {
    /// Accepts every tuple.
    All,
    /// `column <op> value`
    Compare {
        /// Column name.
        column: String,
        /// Operator.
        op: ComparisonType,
        /// Right-hand side.
        value: PredicateValue,
    },
    /// Inclusive range, or its complement when negated.
    Range {
        /// Column name.
        column: String,
        /// Lower bound.
        lower: PredicateValue,
        /// Upper bound.
        upper: PredicateValue,
        /// Whether the range is negated.
        negated: bool,
    },
    /// Membership.
    In {
        /// Column name.
        column: String,
        /// Candidates.
        values: Vec<PredicateValue>,
        /// Whether membership is negated.
        negated: bool,
    },
    /// Pattern match on text columns.
    Like {
        /// Column name.
        column: String,
        /// Parsed pattern.
        pattern: LikePattern,
        /// Whether the match is negated.
        negated: bool,
    },
    /// Null check.
    IsNull {
        /// Column name.
        column: String,
        /// `IS NOT NULL` when true.
        negated: bool,
    },
    /// All children hold.
    And(Vec<TupleFilter>),
    /// Any child holds.
    Or(Vec<TupleFilter>),
}

fn present(tuple: &Tuple, column: &str) -> Option<Value> {
    tuple.get(column).filter(|v| !v.is_null())
}

impl TupleFilter {
    /// Evaluates the filter against `tuple`.
    ///
    /// # Errors
    ///
    /// Returns an error if a referenced parameter is not bound.
    pub fn matches(&self, tuple: &Tuple, params: &QueryParameters) -> QueryResult<bool> {
        match self {
            TupleFilter::All => Ok(true),
            TupleFilter::Compare { column, op, value } => {
                let expected = value.resolve(params)?;
                let Some(actual) = present(tuple, column) else {
                    return Ok(false);
                };
                if expected.is_null() {
                    return Ok(false);
                }
                let ordering = actual.compare(expected);
                Ok(match op {
                    ComparisonType::Equals => ordering == Some(Ordering::Equal),
                    ComparisonType::NotEquals => ordering != Some(Ordering::Equal),
                    ComparisonType::Less => ordering == Some(Ordering::Less),
                    ComparisonType::LessOrEqual => {
                        matches!(ordering, Some(Ordering::Less | Ordering::Equal))
                    }
                    ComparisonType::Greater => ordering == Some(Ordering::Greater),
                    ComparisonType::GreaterOrEqual => {
                        matches!(ordering, Some(Ordering::Greater | Ordering::Equal))
                    }
                })
            }
            TupleFilter::Range {
                column,
                lower,
                upper,
                negated,
            } => {
                let (lower, upper) = (lower.resolve(params)?, upper.resolve(params)?);
                let Some(actual) = present(tuple, column) else {
                    return Ok(false);
                };
                let (lo, hi) = (actual.compare(lower), actual.compare(upper));
                Ok(if *negated {
                    lo == Some(Ordering::Less) || hi == Some(Ordering::Greater)
                } else {
                    matches!(lo, Some(Ordering::Greater | Ordering::Equal))
                        && matches!(hi, Some(Ordering::Less | Ordering::Equal))
                })
            }
            TupleFilter::In {
                column,
                values,
                negated,
            } => {
                let candidates = values
                    .iter()
                    .map(|v| v.resolve(params))
                    .collect::<QueryResult<Vec<_>>>()?;
                Ok(match present(tuple, column) {
                    Some(actual) => candidates.contains(&&actual) != *negated,
                    None => false,
                })
            }
            TupleFilter::Like {
                column,
                pattern,
                negated,
            } => Ok(match present(tuple, column) {
                Some(Value::Text(text)) => pattern.matches(&text) != *negated,
                Some(_) => *negated,
                None => false,
            }),
            TupleFilter::IsNull { column, negated } => {
                Ok(present(tuple, column).is_none() != *negated)
            }
            TupleFilter::And(children) => {
                for child in children {
                    if !child.matches(tuple, params)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            TupleFilter::Or(children) => {
                for child in children {
                    if child.matches(tuple, params)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
        }
    }
}

/// A translated in-memory query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryQuery {
    /// Table to scan.
    pub table: String,
    /// Row filter.
    pub filter: TupleFilter,
    /// Projected columns; empty keeps whole tuples.
    pub projections: Vec<String>,
    /// Sort columns.
    pub order_by: Vec<SortColumn>,
}

impl MemoryQuery {
    /// Sorts `tuples` by the query's sort columns. Stable; missing values
    /// sort first.
    pub fn sort(&self, tuples: &mut [Tuple]) {
        if self.order_by.is_empty() {
            return;
        }
        tuples.sort_by(|a, b| {
            for key in &self.order_by {
                let ordering = a.get(&key.column.name).cmp(&b.get(&key.column.name));
                let ordering = match key.order {
                    SortOrder::Ascending => ordering,
                    SortOrder::Descending => ordering.reverse(),
                };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            Ordering::Equal
        });
    }

    /// Applies the projection to `tuple`.
    pub fn project(&self, tuple: Tuple) -> Tuple {
        if self.projections.is_empty() {
            return tuple;
        }
        let mut projected = Tuple::new();
        for column in &self.projections {
            if let Some(value) = tuple.get(column) {
                projected.put(column.as_str(), value);
            }
        }
        projected.into_applied()
    }
}

/// Builds [`TupleFilter`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryPredicateFactory;

impl PredicateFactory for MemoryPredicateFactory {
    type Fragment = TupleFilter;
    type Query = MemoryQuery;

    fn conjunction(&self, children: Vec<TupleFilter>) -> QueryResult<TupleFilter> {
        Ok(TupleFilter::And(children))
    }

    fn disjunction(&self, children: Vec<TupleFilter>) -> QueryResult<TupleFilter> {
        Ok(TupleFilter::Or(children))
    }

    fn comparison(
        &self,
        column: &Column,
        op: ComparisonType,
        value: &PredicateValue,
    ) -> QueryResult<TupleFilter> {
        Ok(TupleFilter::Compare {
            column: column.name.clone(),
            op,
            value: value.clone(),
        })
    }

    fn range(
        &self,
        column: &Column,
        lower: &PredicateValue,
        upper: &PredicateValue,
        negated: bool,
    ) -> QueryResult<TupleFilter> {
        Ok(TupleFilter::Range {
            column: column.name.clone(),
            lower: lower.clone(),
            upper: upper.clone(),
            negated,
        })
    }

    fn in_list(
        &self,
        column: &Column,
        values: &[PredicateValue],
        negated: bool,
    ) -> QueryResult<TupleFilter> {
        Ok(TupleFilter::In {
            column: column.name.clone(),
            values: values.to_vec(),
            negated,
        })
    }

    fn like(
        &self,
        column: &Column,
        pattern: &LikePattern,
        negated: bool,
    ) -> QueryResult<TupleFilter> {
        Ok(TupleFilter::Like {
            column: column.name.clone(),
            pattern: pattern.clone(),
            negated,
        })
    }

    fn is_null(&self, column: &Column, negated: bool) -> QueryResult<TupleFilter> {
        Ok(TupleFilter::IsNull {
            column: column.name.clone(),
            negated,
        })
    }

    fn root(&self, root: &RootContext, filter: Option<TupleFilter>) -> QueryResult<MemoryQuery> {
        let restriction = root.discriminator.as_ref().map(|d| TupleFilter::In {
            column: d.column.clone(),
            values: d.values.iter().cloned().map(PredicateValue::Literal).collect(),
            negated: false,
        });
        let filter = match (filter, restriction) {
            (None, None) => TupleFilter::All,
            (Some(f), None) | (None, Some(f)) => f,
            (Some(f), Some(r)) => TupleFilter::And(vec![f, r]),
        };
        Ok(MemoryQuery {
            table: root.table.clone(),
            filter,
            projections: root.projections.iter().map(|c| c.name.clone()).collect(),
            order_by: root.order_by.clone(),
        })
    }
}
