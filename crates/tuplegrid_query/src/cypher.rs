//! Cypher queries for graph stores.

use crate::error::QueryResult;
use crate::like::LikePattern;
use crate::predicate::{ComparisonType, PredicateFactory, PredicateValue, RootContext, SortOrder};
use crate::property::Column;
use std::fmt::Write;
use tuplegrid_model::Value;

/// Quotes an identifier with backticks unless it is a plain name.
pub fn escape_identifier(name: &str) -> String {
    let plain = name
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if plain {
        name.to_string()
    } else {
        format!("`{}`", name.replace('`', "``"))
    }
}

/// Renders a string literal with `"` and `\` escaped.
pub fn escape_string(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for c in text.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

/// Renders a literal value.
pub fn literal(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Integer(n) => n.to_string(),
        Value::Text(s) => escape_string(s),
        Value::Bytes(bytes) => {
            let items: Vec<String> = bytes.iter().map(u8::to_string).collect();
            format!("[{}]", items.join(", "))
        }
        Value::Array(items) => {
            let items: Vec<String> = items.iter().map(literal).collect();
            format!("[{}]", items.join(", "))
        }
    }
}

/// Builds `MATCH ... WHERE ... RETURN ...` queries.
///
/// Named parameters are left to the server as `{name}`.
#[derive(Debug, Clone)]
pub struct CypherPredicateFactory {
    alias: String,
}

impl Default for CypherPredicateFactory {
    fn default() -> Self {
        Self::new("n")
    }
}

impl CypherPredicateFactory {
    /// Creates a factory binding matched nodes to `alias`.
    pub fn new(alias: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
        }
    }

    fn property(&self, column: &Column) -> String {
        format!(
            "{}.{}",
            escape_identifier(&self.alias),
            escape_identifier(&column.name)
        )
    }

    fn value(value: &PredicateValue) -> String {
        match value {
            PredicateValue::Literal(v) => literal(v),
            PredicateValue::Param(name) => format!("{{{name}}}"),
        }
    }

    fn list(values: &[PredicateValue]) -> String {
        let items: Vec<String> = values.iter().map(Self::value).collect();
        format!("[{}]", items.join(", "))
    }

    fn junction(children: Vec<String>, operator: &str) -> String {
        children
            .iter()
            .map(|c| format!("({c})"))
            .collect::<Vec<_>>()
            .join(operator)
    }
}

impl PredicateFactory for CypherPredicateFactory {
    type Fragment = String;
    type Query = String;

    fn conjunction(&self, children: Vec<String>) -> QueryResult<String> {
        Ok(Self::junction(children, " AND "))
    }

    fn disjunction(&self, children: Vec<String>) -> QueryResult<String> {
        Ok(Self::junction(children, " OR "))
    }

    fn comparison(
        &self,
        column: &Column,
        op: ComparisonType,
        value: &PredicateValue,
    ) -> QueryResult<String> {
        Ok(format!(
            "{} {} {}",
            self.property(column),
            op.symbol(),
            Self::value(value)
        ))
    }

    fn range(
        &self,
        column: &Column,
        lower: &PredicateValue,
        upper: &PredicateValue,
        negated: bool,
    ) -> QueryResult<String> {
        let property = self.property(column);
        let (lower, upper) = (Self::value(lower), Self::value(upper));
        Ok(if negated {
            format!("{property} < {lower} OR {property} > {upper}")
        } else {
            format!("{property} >= {lower} AND {property} <= {upper}")
        })
    }

    fn in_list(
        &self,
        column: &Column,
        values: &[PredicateValue],
        negated: bool,
    ) -> QueryResult<String> {
        let property = self.property(column);
        let list = Self::list(values);
        Ok(if negated {
            format!("NOT EXISTS({property}) OR  NONE( _x_ IN {list} WHERE {property} = _x_)")
        } else {
            format!("ANY( _x_ IN {list} WHERE {property} = _x_)")
        })
    }

    fn like(&self, column: &Column, pattern: &LikePattern, negated: bool) -> QueryResult<String> {
        let property = self.property(column);
        let matcher = format!("{property}=~{}", escape_string(&pattern.to_regex()));
        Ok(if negated {
            format!("NOT EXISTS({property}) OR NOT({matcher})")
        } else {
            matcher
        })
    }

    fn is_null(&self, column: &Column, negated: bool) -> QueryResult<String> {
        let property = self.property(column);
        Ok(if negated {
            format!("EXISTS({property})")
        } else {
            format!("NOT EXISTS({property})")
        })
    }

    fn root(&self, root: &RootContext, filter: Option<String>) -> QueryResult<String> {
        let alias = escape_identifier(&self.alias);
        let mut query = format!("MATCH ({alias}:{})", escape_identifier(&root.table));

        let restriction = root.discriminator.as_ref().map(|d| {
            let property = self.property(&Column::plain(d.column.as_str()));
            match d.values.as_slice() {
                [single] => format!("{property} = {}", literal(single)),
                values => {
                    let items: Vec<String> = values.iter().map(literal).collect();
                    format!("{property} IN [{}]", items.join(", "))
                }
            }
        });
        let condition = match (filter, restriction) {
            (None, None) => None,
            (Some(c), None) | (None, Some(c)) => Some(c),
            (Some(f), Some(r)) => Some(format!("{f} AND {r}")),
        };
        if let Some(condition) = condition {
            let _ = write!(query, " WHERE {condition}");
        }

        if root.projections.is_empty() {
            let _ = write!(query, " RETURN {alias}");
        } else {
            let columns: Vec<String> = root.projections.iter().map(|c| self.property(c)).collect();
            let _ = write!(query, " RETURN {}", columns.join(", "));
        }

        if !root.order_by.is_empty() {
            let keys: Vec<String> = root
                .order_by
                .iter()
                .map(|s| match s.order {
                    SortOrder::Ascending => self.property(&s.column),
                    SortOrder::Descending => format!("{} DESC", self.property(&s.column)),
                })
                .collect();
            let _ = write!(query, " ORDER BY {}", keys.join(", "));
        }
        Ok(query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers_are_quoted_when_needed() {
        assert_eq!(escape_identifier("title"), "title");
        assert_eq!(escape_identifier("author.name"), "`author.name`");
        assert_eq!(escape_identifier("<gen:0>"), "`<gen:0>`");
        assert_eq!(escape_identifier("1st"), "`1st`");
    }

    #[test]
    fn strings_are_escaped() {
        assert_eq!(escape_string("say \"hi\""), "\"say \\\"hi\\\"\"");
        assert_eq!(literal(&Value::from(vec![Value::Integer(1), Value::from("a")])), "[1, \"a\"]");
    }
}
