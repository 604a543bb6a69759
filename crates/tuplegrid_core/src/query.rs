//! Native queries handed to queryable dialects.

use crate::error::{GridError, GridResult};
use tuplegrid_query::{
    CypherPredicateFactory, DocumentPredicateFactory, DocumentQuery, IcklePredicateFactory,
    MemoryPredicateFactory, MemoryQuery, PropertyHelper, QueryDescriptor, QueryParameters,
    QueryTranslator, QueryTree,
};

/// Window of rows a query returns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RowSelection {
    /// Rows to skip; `None` starts at the first row.
    pub first_result: Option<i64>,
    /// Maximum rows to return; `None` returns all remaining rows.
    pub max_rows: Option<usize>,
    /// Rows per round trip, for dialects that page through results.
    pub fetch_size: Option<usize>,
}

impl RowSelection {
    /// Selects every row.
    pub fn all() -> Self {
        Self::default()
    }

    /// Selects `max_rows` rows starting at `first_result`.
    pub fn window(first_result: i64, max_rows: usize) -> Self {
        Self {
            first_result: Some(first_result),
            max_rows: Some(max_rows),
            fetch_size: None,
        }
    }

    /// Sets the fetch size.
    #[must_use]
    pub fn fetch_size(mut self, fetch_size: usize) -> Self {
        self.fetch_size = Some(fetch_size);
        self
    }

    /// Rows to skip.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` when `first_result` is negative.
    pub fn offset(&self) -> GridResult<usize> {
        match self.first_result {
            None => Ok(0),
            Some(first) if first < 0 => Err(GridError::invalid_argument(format!(
                "first result must not be negative, got {first}"
            ))),
            Some(first) => Ok(usize::try_from(first).unwrap_or(usize::MAX)),
        }
    }

    /// Applies the window to an ordered list of rows.
    ///
    /// An offset past the end gives an empty list.
    pub fn apply<T>(&self, rows: Vec<T>) -> GridResult<Vec<T>> {
        let offset = self.offset()?;
        let limit = self.max_rows.unwrap_or(usize::MAX);
        Ok(rows.into_iter().skip(offset).take(limit).collect())
    }
}

/// A translated query in one of the shipped native forms.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendQuery {
    /// Evaluable filter for in-memory stores.
    Memory(QueryDescriptor<MemoryQuery>),
    /// Mongo-style filter document.
    Document(QueryDescriptor<DocumentQuery>),
    /// Cypher query string.
    Cypher(QueryDescriptor<String>),
    /// Ickle query string.
    Ickle(QueryDescriptor<String>),
}

impl BackendQuery {
    /// Translates `tree` into an evaluable in-memory query.
    pub fn memory(tree: &QueryTree, helper: &dyn PropertyHelper) -> GridResult<Self> {
        let descriptor = QueryTranslator::new(helper).translate(tree, &MemoryPredicateFactory)?;
        Ok(Self::Memory(descriptor))
    }

    /// Translates `tree` into a document filter, binding `params`.
    pub fn document(
        tree: &QueryTree,
        helper: &dyn PropertyHelper,
        params: &QueryParameters,
    ) -> GridResult<Self> {
        let factory = DocumentPredicateFactory::with_parameters(params.clone());
        Ok(Self::Document(QueryTranslator::new(helper).translate(tree, &factory)?))
    }

    /// Translates `tree` into Cypher with nodes bound to `alias`.
    pub fn cypher(tree: &QueryTree, helper: &dyn PropertyHelper, alias: &str) -> GridResult<Self> {
        let factory = CypherPredicateFactory::new(alias);
        Ok(Self::Cypher(QueryTranslator::new(helper).translate(tree, &factory)?))
    }

    /// Translates `tree` into Ickle for schemas registered under `package`.
    pub fn ickle(tree: &QueryTree, helper: &dyn PropertyHelper, package: &str) -> GridResult<Self> {
        let factory = IcklePredicateFactory::new(package);
        Ok(Self::Ickle(QueryTranslator::new(helper).translate(tree, &factory)?))
    }

    /// Table the query runs against.
    pub fn table(&self) -> &str {
        match self {
            Self::Memory(d) => &d.table,
            Self::Document(d) => &d.table,
            Self::Cypher(d) | Self::Ickle(d) => &d.table,
        }
    }

    /// Short name of the query language.
    pub fn language(&self) -> &'static str {
        match self {
            Self::Memory(_) => "memory",
            Self::Document(_) => "document",
            Self::Cypher(_) => "cypher",
            Self::Ickle(_) => "ickle",
        }
    }

    /// Renders the native query for logs.
    pub fn render(&self) -> String {
        match self {
            Self::Memory(d) => format!("{:?}", d.query.filter),
            Self::Document(d) => d.query.filter.to_string(),
            Self::Cypher(d) | Self::Ickle(d) => d.query.clone(),
        }
    }
}
