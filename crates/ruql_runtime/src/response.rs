//! Responses and the per-request error reporter.

use crate::coercion::{ArgumentCoercionError, VariableCoercionError};
use crate::executor::OperationError;
use crate::merge::MergeError;
use ruql_core::Location;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use tokio::sync::Mutex;

/// A response.
///
/// `data` is absent when the request could not start; it is present, possibly
/// holding nulls, once execution began.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Response {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<GraphQLError>>,
}

impl Response {
    /// Creates a successful response with data.
    pub fn data(data: Value) -> Self {
        Self {
            data: Some(data),
            errors: None,
        }
    }

    /// Creates a response without data.
    pub fn error(error: impl Into<GraphQLError>) -> Self {
        Self::errors(vec![error.into()])
    }

    /// Creates a response without data carrying several errors.
    pub fn errors(errors: Vec<GraphQLError>) -> Self {
        Self {
            data: None,
            errors: Some(errors),
        }
    }

    /// Attaches field errors; an empty list leaves `errors` absent.
    #[must_use]
    pub fn with_errors(mut self, errors: Vec<GraphQLError>) -> Self {
        self.errors = (!errors.is_empty()).then_some(errors);
        self
    }

    pub fn has_errors(&self) -> bool {
        self.errors.as_ref().is_some_and(|e| !e.is_empty())
    }

    pub fn has_data(&self) -> bool {
        self.data.is_some()
    }

    /// Serializes the response to a JSON value.
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// A single error entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphQLError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub locations: Vec<Location>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub path: Vec<PathSegment>,
}

impl GraphQLError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            locations: Vec::new(),
            path: Vec::new(),
        }
    }

    #[must_use]
    pub fn at(mut self, location: Location) -> Self {
        self.locations.push(location);
        self
    }

    #[must_use]
    pub fn with_path(mut self, path: Vec<PathSegment>) -> Self {
        self.path = path;
        self
    }
}

impl fmt::Display for GraphQLError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)?;
        if let Some(location) = self.locations.first() {
            write!(f, " ({location})")?;
        }
        Ok(())
    }
}

impl From<ruql_syntax::ParseError> for GraphQLError {
    fn from(error: ruql_syntax::ParseError) -> Self {
        let location = error.location();
        Self::new(error.message).at(location)
    }
}

impl From<MergeError> for GraphQLError {
    fn from(error: MergeError) -> Self {
        let location = error.location();
        Self::new(error.to_string()).at(location)
    }
}

impl From<VariableCoercionError> for GraphQLError {
    fn from(error: VariableCoercionError) -> Self {
        Self::new(error.message).at(error.location)
    }
}

impl From<ArgumentCoercionError> for GraphQLError {
    fn from(error: ArgumentCoercionError) -> Self {
        Self::new(error.message).at(error.location)
    }
}

impl From<OperationError> for GraphQLError {
    fn from(error: OperationError) -> Self {
        Self::new(error.to_string())
    }
}

/// Path segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    Field(String),
    Index(usize),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Field(key) => f.write_str(key),
            Self::Index(index) => write!(f, "{index}"),
        }
    }
}

/// Collects field errors from concurrently running resolvers.
#[derive(Debug, Default)]
pub struct ErrorReporter {
    errors: Mutex<Vec<GraphQLError>>,
}

impl ErrorReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn report(&self, error: GraphQLError) {
        self.errors.lock().await.push(error);
    }

    pub async fn len(&self) -> usize {
        self.errors.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.errors.lock().await.is_empty()
    }

    /// Takes the recorded errors in report order.
    pub fn into_errors(self) -> Vec<GraphQLError> {
        self.errors.into_inner()
    }
}
