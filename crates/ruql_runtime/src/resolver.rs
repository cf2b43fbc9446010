//! Resolver system.
//!
//! This module provides the resolver trait and infrastructure for field resolution.

use crate::response::PathSegment;
use crate::types::TypeRef;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

/// Request-scoped data shared by every resolver of one execution.
#[derive(Debug, Clone, Default)]
pub struct Context {
    pub data: HashMap<String, Value>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a value in the context.
    pub fn set<T: Serialize>(&mut self, key: impl Into<String>, value: T) {
        if let Ok(v) = serde_json::to_value(value) {
            self.data.insert(key.into(), v);
        }
    }

    /// Sets a value and returns the context.
    #[must_use]
    pub fn with<T: Serialize>(mut self, key: impl Into<String>, value: T) -> Self {
        self.set(key, value);
        self
    }

    /// Gets a value from the context.
    pub fn get<T: for<'de> Deserialize<'de>>(&self, key: &str) -> Option<T> {
        self.data
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}

/// Coerced arguments passed to a resolver, in declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolverArgs {
    args: IndexMap<String, Value>,
}

impl ResolverArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Gets an argument by name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.args.get(name)
    }

    /// Gets an argument as a specific type.
    pub fn get_as<T: serde::de::DeserializeOwned>(&self, name: &str) -> Option<T> {
        self.args
            .get(name)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Gets a required argument. A null value counts as missing.
    pub fn require<T: serde::de::DeserializeOwned>(&self, name: &str) -> Result<T, ResolverError> {
        match self.args.get(name) {
            None | Some(Value::Null) => Err(ResolverError::MissingArgument(name.to_string())),
            Some(v) => serde_json::from_value(v.clone())
                .map_err(|e| ResolverError::ArgumentParseError(name.to_string(), e.to_string())),
        }
    }

    pub fn all(&self) -> &IndexMap<String, Value> {
        &self.args
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.args.insert(name.into(), value);
    }
}

impl From<IndexMap<String, Value>> for ResolverArgs {
    fn from(args: IndexMap<String, Value>) -> Self {
        Self { args }
    }
}

/// Info about the field being resolved.
#[derive(Debug, Clone)]
pub struct ResolverInfo {
    pub field_name: String,
    pub parent_type: String,
    pub return_type: TypeRef,
    /// Response path of the field, ending with its response key.
    pub path: Vec<PathSegment>,
}

impl ResolverInfo {
    pub fn new(
        field_name: impl Into<String>,
        parent_type: impl Into<String>,
        return_type: TypeRef,
    ) -> Self {
        Self {
            field_name: field_name.into(),
            parent_type: parent_type.into(),
            return_type,
            path: Vec::new(),
        }
    }

    /// Sets the path.
    #[must_use]
    pub fn with_path(mut self, path: Vec<PathSegment>) -> Self {
        self.path = path;
        self
    }
}

/// Result type for resolvers.
pub type ResolverResult = Result<Value, ResolverError>;

/// Future type for async resolvers.
pub type ResolverFuture<'a> = Pin<Box<dyn Future<Output = ResolverResult> + Send + 'a>>;

/// Error from a resolver.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ResolverError {
    #[error("Missing required argument: {0}")]
    MissingArgument(String),

    #[error("Failed to parse argument '{0}': {1}")]
    ArgumentParseError(String, String),

    #[error("Field resolution timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// Application error, reported with its message unchanged.
    #[error("{0}")]
    Custom(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ResolverError {
    pub fn new(message: impl Into<String>) -> Self {
        Self::Custom(message.into())
    }
}

/// Trait for field resolvers.
pub trait Resolver: Send + Sync {
    /// Resolves a field value.
    fn resolve<'a>(
        &'a self,
        parent: &'a Value,
        args: &'a ResolverArgs,
        ctx: &'a Context,
        info: &'a ResolverInfo,
    ) -> ResolverFuture<'a>;
}

/// A resolver attached to a field definition.
#[derive(Clone)]
pub struct FieldResolver(Arc<dyn Resolver>);

impl FieldResolver {
    pub fn new<R: Resolver + 'static>(resolver: R) -> Self {
        Self(Arc::new(resolver))
    }

    pub fn as_resolver(&self) -> &dyn Resolver {
        self.0.as_ref()
    }
}

impl fmt::Debug for FieldResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FieldResolver")
    }
}

/// A sync resolver function.
pub type SyncResolverFn =
    Arc<dyn Fn(&Value, &ResolverArgs, &Context, &ResolverInfo) -> ResolverResult + Send + Sync>;

/// A wrapper for sync resolver functions.
pub struct FnResolver {
    func: SyncResolverFn,
}

impl FnResolver {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Value, &ResolverArgs, &Context, &ResolverInfo) -> ResolverResult
            + Send
            + Sync
            + 'static,
    {
        Self { func: Arc::new(f) }
    }
}

impl Resolver for FnResolver {
    fn resolve<'a>(
        &'a self,
        parent: &'a Value,
        args: &'a ResolverArgs,
        ctx: &'a Context,
        info: &'a ResolverInfo,
    ) -> ResolverFuture<'a> {
        let result = (self.func)(parent, args, ctx, info);
        Box::pin(async move { result })
    }
}

/// An async resolver function type.
pub type AsyncResolverFn = Arc<
    dyn Fn(Value, ResolverArgs, Context, ResolverInfo) -> ResolverFuture<'static> + Send + Sync,
>;

/// A wrapper for async resolver functions. Inputs are cloned so the returned
/// future owns everything it touches.
pub struct AsyncFnResolver {
    func: AsyncResolverFn,
}

impl AsyncFnResolver {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(Value, ResolverArgs, Context, ResolverInfo) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ResolverResult> + Send + 'static,
    {
        Self {
            func: Arc::new(move |parent, args, ctx, info| Box::pin(f(parent, args, ctx, info))),
        }
    }
}

impl Resolver for AsyncFnResolver {
    fn resolve<'a>(
        &'a self,
        parent: &'a Value,
        args: &'a ResolverArgs,
        ctx: &'a Context,
        info: &'a ResolverInfo,
    ) -> ResolverFuture<'a> {
        (self.func)(parent.clone(), args.clone(), ctx.clone(), info.clone())
    }
}

/// Reads the field's name from the parent object.
pub struct DefaultResolver;

impl Resolver for DefaultResolver {
    fn resolve<'a>(
        &'a self,
        parent: &'a Value,
        _args: &'a ResolverArgs,
        _ctx: &'a Context,
        info: &'a ResolverInfo,
    ) -> ResolverFuture<'a> {
        let value = parent.get(&info.field_name).cloned().unwrap_or(Value::Null);
        Box::pin(async move { Ok(value) })
    }
}
