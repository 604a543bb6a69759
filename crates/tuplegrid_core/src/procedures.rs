//! Stored procedures for dialects that emulate them in process.

use crate::error::{GridError, GridResult};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use tuplegrid_model::{Tuple, Value};

/// Arguments of a stored procedure call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcedureParameters {
    /// Arguments by position.
    Positional(Vec<Value>),
    /// Arguments by name.
    Named(BTreeMap<String, Value>),
}

impl Default for ProcedureParameters {
    fn default() -> Self {
        Self::Positional(Vec::new())
    }
}

impl ProcedureParameters {
    /// Returns the positional argument at `index`.
    pub fn positional(&self, index: usize) -> Option<&Value> {
        match self {
            Self::Positional(values) => values.get(index),
            Self::Named(_) => None,
        }
    }

    /// Returns the named argument `name`.
    pub fn named(&self, name: &str) -> Option<&Value> {
        match self {
            Self::Named(values) => values.get(name),
            Self::Positional(_) => None,
        }
    }

    /// Number of arguments.
    pub fn len(&self) -> usize {
        match self {
            Self::Positional(values) => values.len(),
            Self::Named(values) => values.len(),
        }
    }

    /// Whether there are no arguments.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A procedure body.
pub type StoredProcedure = Arc<dyn Fn(&ProcedureParameters) -> GridResult<Vec<Tuple>> + Send + Sync>;

/// Named procedures, built by the caller and injected into a dialect.
#[derive(Clone, Default)]
pub struct StoredProcedureRegistry {
    procedures: HashMap<String, StoredProcedure>,
}

impl StoredProcedureRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a procedure and returns the registry.
    #[must_use]
    pub fn with<F>(mut self, name: impl Into<String>, procedure: F) -> Self
    where
        F: Fn(&ProcedureParameters) -> GridResult<Vec<Tuple>> + Send + Sync + 'static,
    {
        self.register(name, procedure);
        self
    }

    /// Adds or replaces a procedure.
    pub fn register<F>(&mut self, name: impl Into<String>, procedure: F)
    where
        F: Fn(&ProcedureParameters) -> GridResult<Vec<Tuple>> + Send + Sync + 'static,
    {
        self.procedures.insert(name.into(), Arc::new(procedure));
    }

    /// Whether `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.procedures.contains_key(name)
    }

    /// Runs procedure `name`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for an unknown name, or the procedure's own
    /// error.
    pub fn call(&self, name: &str, params: &ProcedureParameters) -> GridResult<Vec<Tuple>> {
        let procedure = self
            .procedures
            .get(name)
            .ok_or_else(|| GridError::invalid_argument(format!("unknown stored procedure '{name}'")))?;
        procedure(params)
    }
}

impl fmt::Debug for StoredProcedureRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.procedures.keys().collect();
        names.sort();
        f.debug_struct("StoredProcedureRegistry")
            .field("procedures", &names)
            .finish()
    }
}
