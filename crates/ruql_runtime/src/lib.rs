//! Runtime for ruql.
//!
//! This crate provides the query execution runtime:
//! - `types`: Type definitions and type references
//! - `scalar`: Built-in scalars and their coercion rules
//! - `schema`: Schema building and validation
//! - `resolver`: Resolver trait, context, and arguments
//! - `coercion`: Variable and argument coercion
//! - `merge`: Selection merging and fragment checks
//! - `executor`: Query execution with null propagation
//! - `response`: Responses and error reporting

pub mod coercion;
pub mod executor;
pub mod merge;
pub mod resolver;
pub mod response;
pub mod scalar;
pub mod schema;
pub mod types;

pub use coercion::{
    coerce_argument_values, coerce_input_value, coerce_variables, ArgumentCoercionError,
    BoundVariable, Variables, VariableCoercionError,
};
pub use executor::{
    execute, CancellationToken, Executor, ExecutorConfig, OperationError, Request,
};
pub use merge::{merge_selections, FieldMap, MergeError, MergedField};
pub use resolver::{
    Context, FieldResolver, Resolver, ResolverArgs, ResolverError, ResolverFuture, ResolverInfo,
    ResolverResult,
};
pub use response::{ErrorReporter, GraphQLError, PathSegment, Response};
pub use scalar::CoercionError;
pub use schema::{Schema, SchemaBuilder, SchemaError};
pub use types::{
    EnumDef, EnumValueDef, FieldDef, InputFieldDef, InputObjectDef, InterfaceDef, ObjectDef,
    ScalarDef, TypeDef, TypeKind, TypeRef, UnionDef,
};
