//! Custom query string parameters.
//!
//! A definition can claim query string parameters the upstream parser does not
//! know about (e.g. `?isHighRisk=true`). Each handler turns the raw parameter
//! value into a filter that is AND-ed onto the composed filter of the primary
//! resource type.

use crate::error::EngineResult;
use crate::query::FilterExpression;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Turns a raw parameter value into an extra filter.
pub type QueryParameterHandler = Arc<dyn Fn(&str) -> EngineResult<FilterExpression> + Send + Sync>;

/// Named parameter handlers for one resource type.
#[derive(Clone, Default)]
pub struct QueryParameterHandlers {
    handlers: HashMap<String, QueryParameterHandler>,
}

impl QueryParameterHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for `name`. A later registration for the same name wins.
    pub fn with<F>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&str) -> EngineResult<FilterExpression> + Send + Sync + 'static,
    {
        self.handlers.insert(name.into(), Arc::new(handler));
        self
    }

    pub fn get(&self, name: &str) -> Option<&QueryParameterHandler> {
        self.handlers.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }
}

impl fmt::Debug for QueryParameterHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.names().collect();
        names.sort_unstable();
        f.debug_struct("QueryParameterHandlers")
            .field("names", &names)
            .finish()
    }
}
