//! Filters for document stores, in the Mongo query dialect.

use crate::error::QueryResult;
use crate::like::LikePattern;
use crate::predicate::{
    ComparisonType, PredicateFactory, PredicateValue, QueryParameters, RootContext, SortOrder,
};
use crate::property::{Column, Discriminator};
use serde_json::{json, Map, Value as Json};
use tuplegrid_model::Value;

/// A translated document query.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentQuery {
    /// Collection name.
    pub collection: String,
    /// Filter document; `{}` selects everything.
    pub filter: Json,
    /// Projection document, when only some fields are selected.
    pub projection: Option<Json>,
    /// Sort keys in priority order (`1` ascending, `-1` descending).
    pub sort: Vec<(String, i32)>,
}

/// Converts a column value to its JSON form.
pub fn to_json(value: &Value) -> Json {
    match value {
        Value::Null => Json::Null,
        Value::Bool(b) => Json::Bool(*b),
        Value::Integer(n) => Json::from(*n),
        Value::Text(s) => Json::String(s.clone()),
        Value::Bytes(b) => Json::Array(b.iter().map(|x| Json::from(*x)).collect()),
        Value::Array(items) => Json::Array(items.iter().map(to_json).collect()),
    }
}

/// Builds Mongo-style filter documents.
///
/// Documents have no parameter placeholders, so named parameters are bound
/// when the filter is built.
#[derive(Debug, Clone, Default)]
pub struct DocumentPredicateFactory {
    params: QueryParameters,
}

impl DocumentPredicateFactory {
    /// Creates a factory with no parameters bound.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a factory binding `params`.
    pub fn with_parameters(params: QueryParameters) -> Self {
        Self { params }
    }

    fn field(column: &Column) -> String {
        match (column.is_id, column.composite_id) {
            (true, false) => "_id".to_string(),
            (true, true) => format!("_id.{}", column.name),
            _ => column.name.clone(),
        }
    }

    fn value(&self, value: &PredicateValue) -> QueryResult<Json> {
        Ok(to_json(value.resolve(&self.params)?))
    }

    fn with_operator(field: String, operator: &str, operand: Json) -> Json {
        let mut inner = Map::new();
        inner.insert(operator.to_string(), operand);
        let mut outer = Map::new();
        outer.insert(field, Json::Object(inner));
        Json::Object(outer)
    }

    fn discriminator(discriminator: &Discriminator) -> Json {
        let field = discriminator.column.clone();
        match discriminator.values.as_slice() {
            [single] => json!({ field: to_json(single) }),
            values => Self::with_operator(
                field,
                "$in",
                Json::Array(values.iter().map(to_json).collect()),
            ),
        }
    }
}

impl PredicateFactory for DocumentPredicateFactory {
    type Fragment = Json;
    type Query = DocumentQuery;

    fn conjunction(&self, children: Vec<Json>) -> QueryResult<Json> {
        Ok(json!({ "$and": children }))
    }

    fn disjunction(&self, children: Vec<Json>) -> QueryResult<Json> {
        Ok(json!({ "$or": children }))
    }

    fn comparison(
        &self,
        column: &Column,
        op: ComparisonType,
        value: &PredicateValue,
    ) -> QueryResult<Json> {
        let field = Self::field(column);
        let value = self.value(value)?;
        let operator = match op {
            ComparisonType::Equals => return Ok(json!({ field: value })),
            ComparisonType::NotEquals => "$ne",
            ComparisonType::Less => "$lt",
            ComparisonType::LessOrEqual => "$lte",
            ComparisonType::Greater => "$gt",
            ComparisonType::GreaterOrEqual => "$gte",
        };
        Ok(Self::with_operator(field, operator, value))
    }

    fn range(
        &self,
        column: &Column,
        lower: &PredicateValue,
        upper: &PredicateValue,
        negated: bool,
    ) -> QueryResult<Json> {
        let field = Self::field(column);
        let (lower, upper) = (self.value(lower)?, self.value(upper)?);
        if negated {
            Ok(json!({ "$or": [
                Self::with_operator(field.clone(), "$lt", lower),
                Self::with_operator(field, "$gt", upper),
            ]}))
        } else {
            Ok(json!({ "$and": [
                Self::with_operator(field.clone(), "$gte", lower),
                Self::with_operator(field, "$lte", upper),
            ]}))
        }
    }

    fn in_list(&self, column: &Column, values: &[PredicateValue], negated: bool) -> QueryResult<Json> {
        let values = values
            .iter()
            .map(|v| self.value(v))
            .collect::<QueryResult<Vec<_>>>()?;
        let operator = if negated { "$nin" } else { "$in" };
        Ok(Self::with_operator(
            Self::field(column),
            operator,
            Json::Array(values),
        ))
    }

    fn like(&self, column: &Column, pattern: &LikePattern, negated: bool) -> QueryResult<Json> {
        let regex = json!({ "$regex": pattern.to_regex(), "$options": "s" });
        let field = Self::field(column);
        if negated {
            Ok(Self::with_operator(field, "$not", regex))
        } else {
            Ok(json!({ field: regex }))
        }
    }

    fn is_null(&self, column: &Column, negated: bool) -> QueryResult<Json> {
        Ok(Self::with_operator(
            Self::field(column),
            "$exists",
            Json::Bool(negated),
        ))
    }

    fn root(&self, root: &RootContext, filter: Option<Json>) -> QueryResult<DocumentQuery> {
        let restriction = root.discriminator.as_ref().map(Self::discriminator);
        let filter = match (filter, restriction) {
            (None, None) => json!({}),
            (Some(f), None) | (None, Some(f)) => f,
            (Some(f), Some(r)) => json!({ "$and": [f, r] }),
        };
        let projection = if root.projections.is_empty() {
            None
        } else {
            let fields = root
                .projections
                .iter()
                .map(|c| (Self::field(c), Json::from(1)))
                .collect::<Map<_, _>>();
            Some(Json::Object(fields))
        };
        let sort = root
            .order_by
            .iter()
            .map(|s| {
                let direction = match s.order {
                    SortOrder::Ascending => 1,
                    SortOrder::Descending => -1,
                };
                (Self::field(&s.column), direction)
            })
            .collect();
        Ok(DocumentQuery {
            collection: root.table.clone(),
            filter,
            projection,
            sort,
        })
    }
}
