//! Ickle query strings for remote clustered caches.

use crate::error::QueryResult;
use crate::like::LikePattern;
use crate::predicate::{ComparisonType, PredicateFactory, PredicateValue, RootContext, SortOrder};
use crate::property::Column;
use tuplegrid_model::Value;

/// Package remote caches register generated entity schemas under.
pub const DEFAULT_PACKAGE: &str = "HibernateOGMGenerated";

fn literal(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Integer(n) => n.to_string(),
        Value::Text(s) => format!("'{}'", s.replace('\'', "''")),
        Value::Bytes(bytes) => format!("'{}'", bytes.iter().map(|b| format!("{b:02x}")).collect::<String>()),
        Value::Array(items) => {
            let items: Vec<String> = items.iter().map(literal).collect();
            format!("({})", items.join(", "))
        }
    }
}

/// Builds `from Package.Table where ...` strings.
#[derive(Debug, Clone)]
pub struct IcklePredicateFactory {
    package: String,
}

impl Default for IcklePredicateFactory {
    fn default() -> Self {
        Self::new(DEFAULT_PACKAGE)
    }
}

impl IcklePredicateFactory {
    /// Creates a factory for schemas registered under `package`.
    pub fn new(package: impl Into<String>) -> Self {
        Self {
            package: package.into(),
        }
    }

    fn value(value: &PredicateValue) -> String {
        match value {
            PredicateValue::Literal(v) => literal(v),
            PredicateValue::Param(name) => format!(":{name}"),
        }
    }

    fn junction(children: Vec<String>, operator: &str) -> String {
        children
            .iter()
            .map(|c| format!("({c})"))
            .collect::<Vec<_>>()
            .join(operator)
    }
}

impl PredicateFactory for IcklePredicateFactory {
    type Fragment = String;
    type Query = String;

    fn conjunction(&self, children: Vec<String>) -> QueryResult<String> {
        Ok(Self::junction(children, " and "))
    }

    fn disjunction(&self, children: Vec<String>) -> QueryResult<String> {
        Ok(Self::junction(children, " or "))
    }

    fn comparison(
        &self,
        column: &Column,
        op: ComparisonType,
        value: &PredicateValue,
    ) -> QueryResult<String> {
        Ok(format!("{} {} {}", column.name, op.symbol(), Self::value(value)))
    }

    fn range(
        &self,
        column: &Column,
        lower: &PredicateValue,
        upper: &PredicateValue,
        negated: bool,
    ) -> QueryResult<String> {
        let name = &column.name;
        let (lower, upper) = (Self::value(lower), Self::value(upper));
        Ok(if negated {
            format!("( {name} < {lower} || {name} > {upper} )")
        } else {
            format!("( {name} >= {lower} && {name} <= {upper} )")
        })
    }

    fn in_list(
        &self,
        column: &Column,
        values: &[PredicateValue],
        negated: bool,
    ) -> QueryResult<String> {
        let items: Vec<String> = values.iter().map(Self::value).collect();
        let clause = format!("{} in ({})", column.name, items.join(", "));
        Ok(if negated {
            format!("not {clause}")
        } else {
            clause
        })
    }

    fn like(&self, column: &Column, pattern: &LikePattern, negated: bool) -> QueryResult<String> {
        let mut clause = format!("{} LIKE {}", column.name, literal(&Value::from(pattern.source())));
        if let Some(escape) = pattern.escape() {
            clause.push_str(&format!(" ESCAPE '{escape}'"));
        }
        Ok(if negated {
            format!("not {clause}")
        } else {
            clause
        })
    }

    fn is_null(&self, column: &Column, negated: bool) -> QueryResult<String> {
        Ok(if negated {
            format!("{} is not null", column.name)
        } else {
            format!("{} is null", column.name)
        })
    }

    fn root(&self, root: &RootContext, filter: Option<String>) -> QueryResult<String> {
        let mut query = String::new();
        if !root.projections.is_empty() {
            let columns: Vec<&str> = root.projections.iter().map(|c| c.name.as_str()).collect();
            query.push_str("select ");
            query.push_str(&columns.join(", "));
            query.push(' ');
        }
        query.push_str(&format!("from {}.{}", self.package, root.table));

        let restriction = root
            .discriminator
            .as_ref()
            .map(|d| match d.values.as_slice() {
                [single] => format!("{} = {}", d.column, literal(single)),
                values => {
                    let items: Vec<String> = values.iter().map(literal).collect();
                    format!("{} in ({})", d.column, items.join(", "))
                }
            });
        match (filter, restriction) {
            (None, None) => {}
            (Some(c), None) | (None, Some(c)) => query.push_str(&format!(" where {c}")),
            (Some(f), Some(r)) => query.push_str(&format!(" where {f} and {r}")),
        }

        if !root.order_by.is_empty() {
            let keys: Vec<String> = root
                .order_by
                .iter()
                .map(|s| match s.order {
                    SortOrder::Ascending => s.column.name.clone(),
                    SortOrder::Descending => format!("{} desc", s.column.name),
                })
                .collect();
            query.push_str(&format!(" order by {}", keys.join(", ")));
        }
        Ok(query)
    }
}
