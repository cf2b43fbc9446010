//! Query executor.
//!
//! Execution walks the merged selection tree top-down. Every field yields a
//! [`FieldResult`]; a null in a non-null position turns into `Bubble`, which
//! travels up until a nullable position turns it back into `Null`.

use crate::coercion::{coerce_argument_values, coerce_variables, Variables};
use crate::merge::{
    merge_selections, selection_depth, validate_fragments, FieldMap, FragmentTable, MergedField,
};
use crate::resolver::{Context, DefaultResolver, Resolver, ResolverError, ResolverInfo};
use crate::response::{ErrorReporter, GraphQLError, PathSegment, Response};
use crate::scalar::CoercionResult;
use crate::schema::Schema;
use crate::types::{FieldDef, ObjectDef, TypeDef, TypeRef};
use futures::future::{join_all, BoxFuture, FutureExt};
use ruql_syntax::ast::{Document, OperationDefinition, OperationType};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Executor configuration.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Deepest field nesting an operation may request. `None` disables the check.
    pub max_depth: Option<usize>,
    /// Upper bound for a single resolver call.
    pub field_timeout: Option<Duration>,
    /// Run top-level mutation fields one after another in document order.
    pub sequential_mutations: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_depth: None,
            field_timeout: None,
            sequential_mutations: true,
        }
    }
}

impl ExecutorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    #[must_use]
    pub fn with_field_timeout(mut self, timeout: Duration) -> Self {
        self.field_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn with_sequential_mutations(mut self, sequential: bool) -> Self {
        self.sequential_mutations = sequential;
        self
    }
}

/// Cooperative cancellation for one request.
///
/// Once cancelled, no new field resolution starts and the response carries a
/// single cancellation error.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A request to execute.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    pub query: String,
    #[serde(default)]
    pub operation_name: Option<String>,
    #[serde(default)]
    pub variables: Map<String, Value>,
    /// Parent value handed to root field resolvers.
    #[serde(skip)]
    pub root_value: Value,
    #[serde(skip)]
    pub cancellation: CancellationToken,
}

impl Request {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn operation_name(mut self, name: impl Into<String>) -> Self {
        self.operation_name = Some(name.into());
        self
    }

    #[must_use]
    pub fn variables(mut self, variables: Map<String, Value>) -> Self {
        self.variables = variables;
        self
    }

    #[must_use]
    pub fn variable(mut self, name: impl Into<String>, value: Value) -> Self {
        self.variables.insert(name.into(), value);
        self
    }

    #[must_use]
    pub fn root_value(mut self, value: Value) -> Self {
        self.root_value = value;
        self
    }

    #[must_use]
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }
}

/// The operation could not be started.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OperationError {
    #[error("Unknown operation named \"{0}\"")]
    UnknownOperation(String),

    #[error("Must provide operation name if query contains multiple operations")]
    AmbiguousOperation,

    #[error("Schema is not configured for {0}s")]
    UnsupportedOperation(OperationType),

    #[error("Query has depth of {depth}, which exceeds max depth of {max}")]
    TooDeep { depth: usize, max: usize },

    #[error("Request was cancelled")]
    Cancelled,
}

/// The query executor.
#[derive(Debug, Default)]
pub struct Executor {
    config: ExecutorConfig,
}

impl Executor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ExecutorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Parses and executes a request.
    pub async fn execute(&self, schema: &Schema, request: Request, ctx: &Context) -> Response {
        let document = match ruql_syntax::parse(&request.query) {
            Ok(document) => document,
            Err(error) => {
                tracing::debug!(%error, line = error.line, col = error.col, "query failed to parse");
                return Response::error(error);
            }
        };
        self.execute_document(schema, &document, &request, ctx).await
    }

    /// Executes an already parsed document. The request's query text is not
    /// looked at.
    pub async fn execute_document(
        &self,
        schema: &Schema,
        document: &Document,
        request: &Request,
        ctx: &Context,
    ) -> Response {
        if document.operations().next().is_none() {
            return Response::default();
        }
        if let Err(error) = validate_fragments(document) {
            return Response::error(error);
        }

        let operation = match select_operation(document, request.operation_name.as_deref()) {
            Ok(operation) => operation,
            Err(error) => return Response::error(error),
        };
        let Some(root) = schema.root_type(operation.operation) else {
            return Response::error(OperationError::UnsupportedOperation(operation.operation));
        };
        let variables = match coerce_variables(schema, &operation.variables, &request.variables) {
            Ok(variables) => variables,
            Err(error) => return Response::error(error),
        };

        let fragments = document.fragments();
        if let Some(max) = self.config.max_depth {
            let depth = selection_depth(&operation.selection_set, &fragments);
            if depth > max {
                return Response::error(OperationError::TooDeep { depth, max });
            }
        }

        tracing::debug!(
            operation = operation.name.as_ref().map_or("<anonymous>", |name| name.as_str()),
            kind = %operation.operation,
            "executing operation"
        );

        let execution = Execution {
            schema,
            fragments,
            variables,
            ctx,
            config: &self.config,
            cancellation: &request.cancellation,
            errors: ErrorReporter::new(),
        };
        let fields = match merge_selections(
            schema,
            [&operation.selection_set],
            root,
            &execution.fragments,
            &execution.variables,
        ) {
            Ok(fields) => fields,
            Err(error) => return Response::error(error),
        };

        let serial =
            operation.operation == OperationType::Mutation && self.config.sequential_mutations;
        let data = execution
            .execute_fields(root, &request.root_value, &fields, &[], serial)
            .await;

        if request.cancellation.is_cancelled() {
            tracing::debug!("operation cancelled");
            return Response::error(OperationError::Cancelled);
        }

        let errors = execution.errors.into_errors();
        tracing::debug!(
            fields = fields.len(),
            errors = errors.len(),
            "operation finished"
        );
        Response::data(data.map_or(Value::Null, Value::Object)).with_errors(errors)
    }
}

/// Parses and executes a query with default configuration.
pub async fn execute(
    schema: &Schema,
    query: &str,
    operation_name: Option<&str>,
    variables: Option<Map<String, Value>>,
    context: Option<&Context>,
) -> Response {
    let mut request = Request::new(query);
    if let Some(name) = operation_name {
        request = request.operation_name(name);
    }
    if let Some(variables) = variables {
        request = request.variables(variables);
    }
    let default_context = Context::new();
    Executor::new()
        .execute(schema, request, context.unwrap_or(&default_context))
        .await
}

/// Picks the named operation, or the only one when no name is given.
fn select_operation<'d>(
    document: &'d Document,
    name: Option<&str>,
) -> Result<&'d OperationDefinition, OperationError> {
    if let Some(name) = name {
        return document
            .operation(name)
            .ok_or_else(|| OperationError::UnknownOperation(name.to_string()));
    }
    let mut operations = document.operations();
    match (operations.next(), operations.next()) {
        (Some(operation), None) => Ok(operation),
        _ => Err(OperationError::AmbiguousOperation),
    }
}

/// Outcome of completing one field or list item.
#[derive(Debug, Clone, PartialEq)]
enum FieldResult {
    Value(Value),
    Null,
    /// A null reached a non-null position and must propagate to the parent.
    Bubble,
}

/// Null outcome for a field whose value could not be produced.
fn absorb(ty: &TypeRef) -> FieldResult {
    if ty.is_non_null() {
        FieldResult::Bubble
    } else {
        FieldResult::Null
    }
}

/// The field being completed, for error messages.
#[derive(Clone, Copy)]
struct FieldTarget<'b, 'a> {
    parent: &'a ObjectDef,
    def: &'a FieldDef,
    field: &'b MergedField<'a>,
}

impl FieldTarget<'_, '_> {
    fn error(&self, message: impl Into<String>, path: &[PathSegment]) -> GraphQLError {
        GraphQLError::new(message)
            .at(self.field.location())
            .with_path(path.to_vec())
    }

    fn qualified_name(&self) -> String {
        format!("{}.{}", self.parent.name, self.def.name)
    }
}

/// State owned by one operation execution.
struct Execution<'a> {
    schema: &'a Schema,
    fragments: FragmentTable<'a>,
    variables: Variables,
    ctx: &'a Context,
    config: &'a ExecutorConfig,
    cancellation: &'a CancellationToken,
    errors: ErrorReporter,
}

impl<'a> Execution<'a> {
    /// Runs a merged selection set against one object. Returns `None` when a
    /// non-null child bubbled, making the whole object null.
    async fn execute_fields(
        &self,
        object: &'a ObjectDef,
        parent: &Value,
        fields: &FieldMap<'a>,
        path: &[PathSegment],
        serial: bool,
    ) -> Option<Map<String, Value>> {
        let results = if serial {
            let mut results = Vec::with_capacity(fields.len());
            for field in fields.values() {
                results.push(self.execute_field(object, parent, field, path).await);
            }
            results
        } else {
            join_all(
                fields
                    .values()
                    .map(|field| self.execute_field(object, parent, field, path)),
            )
            .await
        };

        let mut map = Map::with_capacity(fields.len());
        let mut bubbled = false;
        for (key, result) in fields.keys().zip(results) {
            match result {
                FieldResult::Value(value) => {
                    map.insert((*key).to_string(), value);
                }
                FieldResult::Null => {
                    map.insert((*key).to_string(), Value::Null);
                }
                FieldResult::Bubble => bubbled = true,
            }
        }
        (!bubbled).then_some(map)
    }

    async fn execute_field(
        &self,
        object: &'a ObjectDef,
        parent: &Value,
        field: &MergedField<'a>,
        path: &[PathSegment],
    ) -> FieldResult {
        if self.cancellation.is_cancelled() {
            return FieldResult::Null;
        }

        let mut path = path.to_vec();
        path.push(PathSegment::Field(field.response_key.to_string()));

        let name = field.name();
        if name == "__typename" {
            return FieldResult::Value(Value::String(object.name.clone()));
        }
        let Some(def) = object.fields.get(name) else {
            let message = format!("Field '{name}' doesn't exist on type '{}'", object.name);
            self.report(GraphQLError::new(message).at(field.location()).with_path(path))
                .await;
            return FieldResult::Null;
        };
        let target = FieldTarget {
            parent: object,
            def,
            field,
        };

        tracing::trace!(parent = %object.name, field = name, "resolving field");

        let args = match coerce_argument_values(
            self.schema,
            def,
            &field.field().arguments,
            &self.variables,
        ) {
            Ok(args) => args,
            Err(error) => {
                self.report(GraphQLError::from(error).with_path(path)).await;
                return absorb(&def.ty);
            }
        };

        let info = ResolverInfo::new(name, &object.name, def.ty.clone()).with_path(path.clone());
        let resolver: &dyn Resolver = match &def.resolver {
            Some(resolver) => resolver.as_resolver(),
            None => &DefaultResolver,
        };
        let resolved = match self.config.field_timeout {
            Some(limit) => tokio::time::timeout(limit, resolver.resolve(parent, &args, self.ctx, &info))
                .await
                .unwrap_or(Err(ResolverError::Timeout(limit))),
            None => resolver.resolve(parent, &args, self.ctx, &info).await,
        };

        match resolved {
            Ok(value) => self.complete_value(target, &def.ty, value, path).await,
            Err(error) => {
                tracing::warn!(field = %target.qualified_name(), %error, "resolver failed");
                self.report(target.error(error.to_string(), &path)).await;
                absorb(&def.ty)
            }
        }
    }

    /// Completes a raw value against a type, reporting a null in a non-null
    /// position once, at the field that produced it.
    fn complete_value<'b>(
        &'b self,
        target: FieldTarget<'b, 'a>,
        ty: &'b TypeRef,
        value: Value,
        path: Vec<PathSegment>,
    ) -> BoxFuture<'b, FieldResult> {
        async move {
            match ty {
                TypeRef::NonNull(inner) => {
                    match self.complete_nullable(target, inner, value, &path).await {
                        FieldResult::Null => {
                            let message = format!(
                                "Cannot return null for non-nullable field {}",
                                target.qualified_name()
                            );
                            self.report(target.error(message, &path)).await;
                            FieldResult::Bubble
                        }
                        other => other,
                    }
                }
                _ => match self.complete_nullable(target, ty, value, &path).await {
                    FieldResult::Bubble => FieldResult::Null,
                    other => other,
                },
            }
        }
        .boxed()
    }

    async fn complete_nullable(
        &self,
        target: FieldTarget<'_, 'a>,
        ty: &TypeRef,
        value: Value,
        path: &[PathSegment],
    ) -> FieldResult {
        if value.is_null() {
            return FieldResult::Null;
        }
        match ty {
            TypeRef::NonNull(_) => self.complete_value(target, ty, value, path.to_vec()).await,
            TypeRef::List(item_ty) => {
                let Value::Array(items) = value else {
                    let message = format!(
                        "Expected a list for field {}, found {value}",
                        target.qualified_name()
                    );
                    self.report(target.error(message, path)).await;
                    return FieldResult::Bubble;
                };
                let items = join_all(items.into_iter().enumerate().map(|(index, item)| {
                    let mut item_path = path.to_vec();
                    item_path.push(PathSegment::Index(index));
                    self.complete_value(target, item_ty, item, item_path)
                }))
                .await;

                let mut list = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        FieldResult::Value(value) => list.push(value),
                        FieldResult::Null => list.push(Value::Null),
                        FieldResult::Bubble => return FieldResult::Bubble,
                    }
                }
                FieldResult::Value(Value::Array(list))
            }
            TypeRef::Named(name) => match self.schema.get_type(name) {
                Some(TypeDef::Scalar(scalar)) => {
                    self.complete_leaf(target, scalar.result(&value), path).await
                }
                Some(TypeDef::Enum(enum_def)) => {
                    self.complete_leaf(target, enum_def.coerce_result(&value), path)
                        .await
                }
                Some(TypeDef::Object(object)) => {
                    self.complete_object(target, object, &value, path).await
                }
                Some(abstract_type @ (TypeDef::Interface(_) | TypeDef::Union(_))) => {
                    match self
                        .schema
                        .resolve_runtime_type(abstract_type, &value, self.ctx)
                    {
                        Some(object) => self.complete_object(target, object, &value, path).await,
                        None => {
                            let message = format!(
                                "Could not resolve the runtime type of {name} for field {}",
                                target.qualified_name()
                            );
                            self.report(target.error(message, path)).await;
                            FieldResult::Bubble
                        }
                    }
                }
                _ => {
                    let message = format!(
                        "Field {} has non-output type {name}",
                        target.qualified_name()
                    );
                    self.report(target.error(message, path)).await;
                    FieldResult::Bubble
                }
            },
        }
    }

    async fn complete_leaf(
        &self,
        target: FieldTarget<'_, 'a>,
        result: CoercionResult,
        path: &[PathSegment],
    ) -> FieldResult {
        match result {
            Ok(Value::Null) => FieldResult::Null,
            Ok(value) => FieldResult::Value(value),
            Err(error) => {
                self.report(target.error(error.message, path)).await;
                FieldResult::Bubble
            }
        }
    }

    /// Merges the field's sub-selections for the concrete object type and
    /// executes them.
    async fn complete_object(
        &self,
        target: FieldTarget<'_, 'a>,
        object: &'a ObjectDef,
        value: &Value,
        path: &[PathSegment],
    ) -> FieldResult {
        let fields = match merge_selections(
            self.schema,
            target.field.sub_selections(),
            object,
            &self.fragments,
            &self.variables,
        ) {
            Ok(fields) => fields,
            Err(error) => {
                self.report(GraphQLError::from(error).with_path(path.to_vec()))
                    .await;
                return FieldResult::Bubble;
            }
        };
        match self.execute_fields(object, value, &fields, path, false).await {
            Some(map) => FieldResult::Value(Value::Object(map)),
            None => FieldResult::Bubble,
        }
    }

    async fn report(&self, error: GraphQLError) {
        self.errors.report(error).await;
    }
}
