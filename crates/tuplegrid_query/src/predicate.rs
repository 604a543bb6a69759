//! Backend-neutral predicate trees and their translation.
//!
//! The host hands over a [`QueryTree`]. [`QueryTranslator`] resolves property
//! paths through a [`PropertyHelper`], pushes negations down to the leaves and
//! drives a [`PredicateFactory`] that builds the store's native fragments.
//! Factories never see a negation node: they get either a positive leaf, a
//! comparison whose operator was already inverted, or a leaf with an explicit
//! `negated` flag.

use crate::error::{QueryError, QueryResult};
use crate::like::LikePattern;
use crate::property::{Column, Discriminator, PropertyHelper, PropertyPath};
use std::collections::BTreeMap;
use std::ops::Not;
use tuplegrid_model::Value;

/// Named parameter values supplied at execution time.
pub type QueryParameters = BTreeMap<String, Value>;

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComparisonType {
    /// `=`
    Equals,
    /// `<>`
    NotEquals,
    /// `<`
    Less,
    /// `<=`
    LessOrEqual,
    /// `>`
    Greater,
    /// `>=`
    GreaterOrEqual,
}

impl ComparisonType {
    /// Returns the operator matching exactly the rows this one rejects.
    pub fn negate(self) -> Self {
        match self {
            ComparisonType::Equals => ComparisonType::NotEquals,
            ComparisonType::NotEquals => ComparisonType::Equals,
            ComparisonType::Less => ComparisonType::GreaterOrEqual,
            ComparisonType::LessOrEqual => ComparisonType::Greater,
            ComparisonType::Greater => ComparisonType::LessOrEqual,
            ComparisonType::GreaterOrEqual => ComparisonType::Less,
        }
    }

    /// Returns the SQL-style symbol.
    pub fn symbol(self) -> &'static str {
        match self {
            ComparisonType::Equals => "=",
            ComparisonType::NotEquals => "<>",
            ComparisonType::Less => "<",
            ComparisonType::LessOrEqual => "<=",
            ComparisonType::Greater => ">",
            ComparisonType::GreaterOrEqual => ">=",
        }
    }
}

/// Right-hand side of a leaf: a literal or a named parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PredicateValue {
    /// Inline literal.
    Literal(Value),
    /// Named parameter (`:name`).
    Param(String),
}

impl PredicateValue {
    /// A named parameter reference.
    pub fn param(name: impl Into<String>) -> Self {
        PredicateValue::Param(name.into())
    }

    /// Resolves the value against `params`.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::MissingParameter`] for an unbound parameter.
    pub fn resolve<'a>(&'a self, params: &'a QueryParameters) -> QueryResult<&'a Value> {
        match self {
            PredicateValue::Literal(value) => Ok(value),
            PredicateValue::Param(name) => params
                .get(name)
                .ok_or_else(|| QueryError::missing_parameter(name.as_str())),
        }
    }
}

impl From<Value> for PredicateValue {
    fn from(value: Value) -> Self {
        PredicateValue::Literal(value)
    }
}

macro_rules! literal_from {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for PredicateValue {
                fn from(value: $ty) -> Self {
                    PredicateValue::Literal(Value::from(value))
                }
            }
        )*
    };
}

literal_from!(bool, i32, i64, u32, String, &str);

/// A node of the predicate tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    /// All children hold.
    Conjunction(Vec<Predicate>),
    /// At least one child holds.
    Disjunction(Vec<Predicate>),
    /// The child does not hold.
    Negation(Box<Predicate>),
    /// `property <op> value`
    Comparison {
        /// Property path.
        property: PropertyPath,
        /// Operator.
        op: ComparisonType,
        /// Right-hand side.
        value: PredicateValue,
    },
    /// `property BETWEEN lower AND upper`, inclusive.
    Range {
        /// Property path.
        property: PropertyPath,
        /// Lower bound.
        lower: PredicateValue,
        /// Upper bound.
        upper: PredicateValue,
    },
    /// `property IN (values)`
    In {
        /// Property path.
        property: PropertyPath,
        /// Candidate values.
        values: Vec<PredicateValue>,
    },
    /// `property LIKE pattern [ESCAPE escape]`
    Like {
        /// Property path.
        property: PropertyPath,
        /// Pattern text.
        pattern: String,
        /// Optional escape character.
        escape: Option<char>,
    },
    /// `property IS NULL`
    IsNull {
        /// Property path.
        property: PropertyPath,
    },
}

impl Predicate {
    /// `property <op> value`
    pub fn compare(
        property: impl Into<PropertyPath>,
        op: ComparisonType,
        value: impl Into<PredicateValue>,
    ) -> Self {
        Predicate::Comparison {
            property: property.into(),
            op,
            value: value.into(),
        }
    }

    /// `property = value`
    pub fn equal(property: impl Into<PropertyPath>, value: impl Into<PredicateValue>) -> Self {
        Self::compare(property, ComparisonType::Equals, value)
    }

    /// `property <> value`
    pub fn not_equal(property: impl Into<PropertyPath>, value: impl Into<PredicateValue>) -> Self {
        Self::compare(property, ComparisonType::NotEquals, value)
    }

    /// `property BETWEEN lower AND upper`
    pub fn between(
        property: impl Into<PropertyPath>,
        lower: impl Into<PredicateValue>,
        upper: impl Into<PredicateValue>,
    ) -> Self {
        Predicate::Range {
            property: property.into(),
            lower: lower.into(),
            upper: upper.into(),
        }
    }

    /// `property IN (values)`
    pub fn in_list<I, V>(property: impl Into<PropertyPath>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<PredicateValue>,
    {
        Predicate::In {
            property: property.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// `property LIKE pattern`
    pub fn like(property: impl Into<PropertyPath>, pattern: impl Into<String>) -> Self {
        Predicate::Like {
            property: property.into(),
            pattern: pattern.into(),
            escape: None,
        }
    }

    /// `property IS NULL`
    pub fn is_null(property: impl Into<PropertyPath>) -> Self {
        Predicate::IsNull {
            property: property.into(),
        }
    }

    /// Conjunction of `children`.
    pub fn and(children: impl IntoIterator<Item = Predicate>) -> Self {
        Predicate::Conjunction(children.into_iter().collect())
    }

    /// Disjunction of `children`.
    pub fn or(children: impl IntoIterator<Item = Predicate>) -> Self {
        Predicate::Disjunction(children.into_iter().collect())
    }
}

impl Not for Predicate {
    type Output = Predicate;

    fn not(self) -> Predicate {
        Predicate::Negation(Box::new(self))
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    /// Smallest first.
    #[default]
    Ascending,
    /// Largest first.
    Descending,
}

/// A resolved sort column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortColumn {
    /// Physical column.
    pub column: Column,
    /// Direction.
    pub order: SortOrder,
}

/// Root of a host query: target entity plus optional restriction,
/// projection and ordering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryTree {
    entity: String,
    filter: Option<Predicate>,
    projections: Vec<PropertyPath>,
    order_by: Vec<(PropertyPath, SortOrder)>,
}

impl QueryTree {
    /// Selects every instance of `entity`.
    pub fn from_entity(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            filter: None,
            projections: Vec::new(),
            order_by: Vec::new(),
        }
    }

    /// Sets the restriction.
    #[must_use]
    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.filter = Some(predicate);
        self
    }

    /// Projects the given properties instead of whole entities.
    #[must_use]
    pub fn select<I, P>(mut self, properties: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PropertyPath>,
    {
        self.projections = properties.into_iter().map(Into::into).collect();
        self
    }

    /// Appends a sort key.
    #[must_use]
    pub fn order_by(mut self, property: impl Into<PropertyPath>, order: SortOrder) -> Self {
        self.order_by.push((property.into(), order));
        self
    }

    /// Returns the entity name.
    pub fn entity(&self) -> &str {
        &self.entity
    }
}

/// Everything a factory needs to assemble the final query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootContext {
    /// Entity name.
    pub entity: String,
    /// Table (collection, label, cache) name.
    pub table: String,
    /// Projected columns; empty selects whole entities.
    pub projections: Vec<Column>,
    /// Sort columns.
    pub order_by: Vec<SortColumn>,
    /// Subtype restriction, if any.
    pub discriminator: Option<Discriminator>,
}

/// Builds the native query form of one backend.
pub trait PredicateFactory {
    /// A native predicate fragment.
    type Fragment;
    /// The finished native query.
    type Query;

    /// All children hold. Receives at least two children.
    fn conjunction(&self, children: Vec<Self::Fragment>) -> QueryResult<Self::Fragment>;

    /// At least one child holds. Receives at least two children.
    fn disjunction(&self, children: Vec<Self::Fragment>) -> QueryResult<Self::Fragment>;

    /// `column <op> value`
    fn comparison(
        &self,
        column: &Column,
        op: ComparisonType,
        value: &PredicateValue,
    ) -> QueryResult<Self::Fragment>;

    /// Inclusive range; negated means `< lower OR > upper`.
    fn range(
        &self,
        column: &Column,
        lower: &PredicateValue,
        upper: &PredicateValue,
        negated: bool,
    ) -> QueryResult<Self::Fragment>;

    /// Membership test.
    fn in_list(
        &self,
        column: &Column,
        values: &[PredicateValue],
        negated: bool,
    ) -> QueryResult<Self::Fragment>;

    /// Pattern match.
    fn like(&self, column: &Column, pattern: &LikePattern, negated: bool)
        -> QueryResult<Self::Fragment>;

    /// Null check; negated means `IS NOT NULL`.
    fn is_null(&self, column: &Column, negated: bool) -> QueryResult<Self::Fragment>;

    /// Assembles the final query from the root context and the restriction.
    fn root(&self, root: &RootContext, filter: Option<Self::Fragment>) -> QueryResult<Self::Query>;
}

/// A translated query plus the metadata the executor needs.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryDescriptor<Q> {
    /// Table the query runs against.
    pub table: String,
    /// Native query.
    pub query: Q,
    /// Projected column names; empty selects whole entities.
    pub projections: Vec<String>,
    /// Sort columns.
    pub order_by: Vec<SortColumn>,
}

/// Drives a [`PredicateFactory`] over a [`QueryTree`].
pub struct QueryTranslator<'h> {
    helper: &'h dyn PropertyHelper,
}

impl<'h> QueryTranslator<'h> {
    /// Creates a translator resolving properties through `helper`.
    pub fn new(helper: &'h dyn PropertyHelper) -> Self {
        Self { helper }
    }

    /// Translates `tree` with `factory`.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown entities, malformed predicates, or
    /// whatever the factory rejects.
    pub fn translate<F: PredicateFactory>(
        &self,
        tree: &QueryTree,
        factory: &F,
    ) -> QueryResult<QueryDescriptor<F::Query>> {
        let entity = tree.entity.as_str();
        let table = self.helper.table(entity)?;
        let projections = tree
            .projections
            .iter()
            .map(|p| self.helper.column(entity, p))
            .collect::<QueryResult<Vec<_>>>()?;
        let order_by = tree
            .order_by
            .iter()
            .map(|(p, order)| {
                Ok(SortColumn {
                    column: self.helper.column(entity, p)?,
                    order: *order,
                })
            })
            .collect::<QueryResult<Vec<_>>>()?;
        let filter = tree
            .filter
            .as_ref()
            .map(|p| self.build(entity, p, false, factory))
            .transpose()?;

        let root = RootContext {
            entity: entity.to_string(),
            table: table.clone(),
            projections,
            order_by,
            discriminator: self.helper.discriminator(entity),
        };
        tracing::trace!(
            target: "tuplegrid::query",
            entity,
            table = %table,
            "translating query"
        );
        let query = factory.root(&root, filter)?;

        Ok(QueryDescriptor {
            table,
            query,
            projections: root.projections.into_iter().map(|c| c.name).collect(),
            order_by: root.order_by,
        })
    }

    fn build<F: PredicateFactory>(
        &self,
        entity: &str,
        predicate: &Predicate,
        negated: bool,
        factory: &F,
    ) -> QueryResult<F::Fragment> {
        match predicate {
            Predicate::Negation(inner) => self.build(entity, inner, !negated, factory),
            Predicate::Conjunction(children) | Predicate::Disjunction(children) => {
                let is_and = matches!(predicate, Predicate::Conjunction(_)) != negated;
                let mut built = children
                    .iter()
                    .map(|c| self.build(entity, c, negated, factory))
                    .collect::<QueryResult<Vec<_>>>()?;
                match built.len() {
                    0 => Err(QueryError::invalid_predicate(
                        "conjunction or disjunction without children",
                    )),
                    1 => Ok(built.remove(0)),
                    _ if is_and => factory.conjunction(built),
                    _ => factory.disjunction(built),
                }
            }
            Predicate::Comparison {
                property,
                op,
                value,
            } => {
                let op = if negated { op.negate() } else { *op };
                factory.comparison(&self.helper.column(entity, property)?, op, value)
            }
            Predicate::Range {
                property,
                lower,
                upper,
            } => factory.range(&self.helper.column(entity, property)?, lower, upper, negated),
            Predicate::In { property, values } => {
                if values.is_empty() {
                    return Err(QueryError::invalid_predicate(format!(
                        "IN list on {property} is empty"
                    )));
                }
                factory.in_list(&self.helper.column(entity, property)?, values, negated)
            }
            Predicate::Like {
                property,
                pattern,
                escape,
            } => {
                let pattern = LikePattern::with_escape(pattern, *escape);
                factory.like(&self.helper.column(entity, property)?, &pattern, negated)
            }
            Predicate::IsNull { property } => {
                factory.is_null(&self.helper.column(entity, property)?, negated)
            }
        }
    }
}
