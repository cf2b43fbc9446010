//! Variable and argument coercion.

use crate::resolver::ResolverArgs;
use crate::scalar::CoercionError;
use crate::schema::Schema;
use crate::types::{FieldDef, InputFieldDef, InputObjectDef, TypeDef, TypeRef};
use indexmap::IndexMap;
use ruql_core::Location;
use ruql_syntax::ast;
use serde_json::{Map, Number, Value};

/// A declared operation variable after binding.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundVariable {
    pub ty: TypeRef,
    /// The declaration carries a non-null default.
    pub has_default: bool,
    /// `None` when the caller supplied nothing and there is no default.
    pub value: Option<Value>,
}

/// Coerced variables of one operation execution, in declaration order.
///
/// Each entry keeps its declared type so a usage can be checked against the
/// position it appears in.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Variables {
    declared: IndexMap<String, BoundVariable>,
}

impl Variables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a variable bound to `value`.
    pub fn insert(&mut self, name: impl Into<String>, ty: TypeRef, value: Value) {
        self.declare(name, ty, Some(value));
    }

    /// Declares a variable. A `None` value leaves it unbound.
    pub fn declare(&mut self, name: impl Into<String>, ty: TypeRef, value: Option<Value>) {
        self.declared.insert(
            name.into(),
            BoundVariable {
                ty,
                has_default: false,
                value,
            },
        );
    }

    /// The bound value of a variable.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.declared.get(name)?.value.as_ref()
    }

    pub fn declaration(&self, name: &str) -> Option<&BoundVariable> {
        self.declared.get(name)
    }

    /// Declared, but neither supplied nor defaulted.
    pub fn is_unbound(&self, name: &str) -> bool {
        self.declared
            .get(name)
            .is_some_and(|variable| variable.value.is_none())
    }

    pub fn len(&self) -> usize {
        self.declared.len()
    }

    pub fn is_empty(&self) -> bool {
        self.declared.is_empty()
    }
}

/// A variable could not be bound. Fatal to the request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct VariableCoercionError {
    pub message: String,
    pub location: Location,
}

/// A field argument could not be coerced. Fatal to the field only.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ArgumentCoercionError {
    pub message: String,
    pub location: Location,
}

/// Binds the operation's declared variables against caller-supplied values.
///
/// Defaults are coerced here, once per execution.
pub fn coerce_variables(
    schema: &Schema,
    definitions: &[ast::VariableDefinition],
    raw: &Map<String, Value>,
) -> Result<Variables, VariableCoercionError> {
    let no_variables = Variables::new();
    let mut variables = Variables::new();

    for def in definitions {
        let name = def.name.as_str();
        let ty = TypeRef::from(&def.ty);
        let error = |message: String| VariableCoercionError {
            message,
            location: def.location,
        };

        match schema.get_type(ty.named_type()) {
            Some(type_def) if type_def.is_input() => {}
            Some(_) => {
                return Err(error(format!(
                    "Variable {name} of type {ty} must be an input type"
                )))
            }
            None => {
                return Err(error(format!(
                    "Variable {name} of type {ty} references an unknown type"
                )))
            }
        }

        let has_default = def
            .default_value
            .as_ref()
            .is_some_and(|default| !default.is_null());
        let value = match (raw.get(name), &def.default_value) {
            (Some(Value::Null), _) | (None, None) if ty.is_non_null() => {
                return Err(error(format!("Variable {name} of type {ty} can't be null")));
            }
            (Some(value), _) => Some(coerce_input_value(schema, &ty, value).map_err(|_| {
                error(format!(
                    "Variable {name} of type {ty} was provided invalid value {}",
                    serde_json::to_string(value).unwrap_or_default()
                ))
            })?),
            (None, Some(default)) => Some(
                coerce_literal(schema, &ty, default, &no_variables).map_err(|e| {
                    error(format!(
                        "Variable {name} of type {ty} has an invalid default value {default}: {e}"
                    ))
                })?,
            ),
            // Left unbound so arguments fall back to their own defaults.
            (None, None) => None,
        };
        variables.declared.insert(
            name.to_string(),
            BoundVariable {
                ty,
                has_default,
                value,
            },
        );
    }

    Ok(variables)
}

/// Coerces an external value, such as a variable supplied by the caller,
/// into its internal form.
///
/// A single value given for a list type is treated as a one-element list.
pub fn coerce_input_value(
    schema: &Schema,
    ty: &TypeRef,
    value: &Value,
) -> Result<Value, CoercionError> {
    match ty {
        TypeRef::NonNull(inner) => {
            if value.is_null() {
                return Err(CoercionError::new(format!("Expected non-null value of type {ty}")));
            }
            coerce_input_value(schema, inner, value)
        }
        _ if value.is_null() => Ok(Value::Null),
        TypeRef::List(inner) => match value {
            Value::Array(items) => items
                .iter()
                .map(|item| coerce_input_value(schema, inner, item))
                .collect::<Result<_, _>>()
                .map(Value::Array),
            single => Ok(Value::Array(vec![coerce_input_value(schema, inner, single)?])),
        },
        TypeRef::Named(name) => match schema.get_type(name) {
            Some(TypeDef::Scalar(scalar)) => scalar.input(value),
            Some(TypeDef::Enum(enum_def)) => enum_def.coerce_input(value),
            Some(TypeDef::InputObject(input)) => {
                let Value::Object(fields) = value else {
                    return Err(CoercionError::new(format!(
                        "Expected an object of type {name}, found {value}"
                    )));
                };
                let provided = fields.iter().map(|(key, value)| (key.as_str(), value)).collect();
                coerce_object_fields(input, provided, |def, value| {
                    coerce_input_value(schema, &def.ty, value)
                })
            }
            other => Err(not_an_input_type(name, other)),
        },
    }
}

/// Coerces a query literal against a type. Variable references take the
/// already-coerced value from `variables`.
pub fn coerce_literal(
    schema: &Schema,
    ty: &TypeRef,
    value: &ast::Value,
    variables: &Variables,
) -> Result<Value, CoercionError> {
    if let ast::Value::Variable(name) = value {
        return coerce_variable(ty, name.as_str(), variables);
    }

    match ty {
        TypeRef::NonNull(inner) => {
            if value.is_null() {
                return Err(CoercionError::new(format!("Expected non-null value of type {ty}")));
            }
            coerce_literal(schema, inner, value, variables)
        }
        _ if value.is_null() => Ok(Value::Null),
        TypeRef::List(inner) => match value {
            ast::Value::List(items) => items
                .iter()
                .map(|item| coerce_literal(schema, inner, item, variables))
                .collect::<Result<_, _>>()
                .map(Value::Array),
            single => Ok(Value::Array(vec![coerce_literal(schema, inner, single, variables)?])),
        },
        TypeRef::Named(name) => match schema.get_type(name) {
            Some(TypeDef::Scalar(scalar)) => scalar.input(&literal_to_json(value, variables)),
            Some(TypeDef::Enum(enum_def)) => match value {
                ast::Value::Enum(symbol) => enum_def.coerce_input(&Value::String(symbol.clone())),
                other => Err(CoercionError::new(format!(
                    "Enum {name} cannot represent non-enum value: {other}"
                ))),
            },
            Some(TypeDef::InputObject(input)) => {
                let ast::Value::Object(fields) = value else {
                    return Err(CoercionError::new(format!(
                        "Expected an object of type {name}, found {value}"
                    )));
                };
                let provided = fields
                    .iter()
                    .map(|(key, value)| (key.as_str(), value))
                    .collect();
                coerce_object_fields(input, provided, |def, value| {
                    coerce_literal(schema, &def.ty, value, variables)
                })
            }
            other => Err(not_an_input_type(name, other)),
        },
    }
}

/// Takes a variable's bound value for a position of type `ty`. The declared
/// type must fit the position; a nullable variable with a default may fill a
/// non-null position.
fn coerce_variable(
    ty: &TypeRef,
    name: &str,
    variables: &Variables,
) -> Result<Value, CoercionError> {
    let Some(declared) = variables.declaration(name) else {
        return Err(CoercionError::new(format!("Variable ${name} is not defined")));
    };
    let position = if declared.has_default && !declared.ty.is_non_null() {
        ty.nullable()
    } else {
        ty
    };
    if !variable_fits(&declared.ty, position) {
        return Err(CoercionError::new(format!(
            "Variable ${name} of type {} used in position expecting type {ty}",
            declared.ty
        )));
    }
    match &declared.value {
        None if ty.is_non_null() => Err(CoercionError::new(format!(
            "Variable ${name} of required type {ty} was not provided"
        ))),
        Some(Value::Null) if ty.is_non_null() => Err(CoercionError::new(format!(
            "Expected non-null value of type {ty}, variable ${name} is null"
        ))),
        None => Ok(Value::Null),
        Some(value) => Ok(promote_to_position(&declared.ty, ty, value)),
    }
}

/// Whether a variable declared as `declared` may be used where `position` is
/// expected. A single item may stand in for a list of that item.
fn variable_fits(declared: &TypeRef, position: &TypeRef) -> bool {
    match (declared, position) {
        (TypeRef::NonNull(declared), TypeRef::NonNull(position)) => {
            variable_fits(declared, position)
        }
        (_, TypeRef::NonNull(_)) => false,
        (TypeRef::NonNull(declared), position) => variable_fits(declared, position),
        (TypeRef::List(declared), TypeRef::List(position)) => variable_fits(declared, position),
        (TypeRef::Named(_), TypeRef::List(position)) => variable_fits(declared, position),
        (TypeRef::List(_), TypeRef::Named(_)) => false,
        (TypeRef::Named(declared), TypeRef::Named(position)) => declared == position,
    }
}

/// Wraps an item-typed variable value into the list the position expects.
fn promote_to_position(declared: &TypeRef, position: &TypeRef, value: &Value) -> Value {
    match (declared.nullable(), position.nullable()) {
        _ if value.is_null() => Value::Null,
        (TypeRef::List(declared), TypeRef::List(position)) => match value {
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|item| promote_to_position(declared, position, item))
                    .collect(),
            ),
            other => other.clone(),
        },
        (declared, TypeRef::List(position)) => {
            Value::Array(vec![promote_to_position(declared, position, value)])
        }
        _ => value.clone(),
    }
}

fn not_an_input_type(name: &str, found: Option<&TypeDef>) -> CoercionError {
    match found {
        Some(type_def) => CoercionError::new(format!(
            "{name} is an {} type and cannot be used as input",
            type_def.kind()
        )),
        None => CoercionError::new(format!("Unknown type {name}")),
    }
}

/// Builds an input object in declared field order.
fn coerce_object_fields<V: Copy>(
    input: &InputObjectDef,
    provided: Vec<(&str, V)>,
    mut coerce_field: impl FnMut(&InputFieldDef, V) -> Result<Value, CoercionError>,
) -> Result<Value, CoercionError> {
    if let Some((unknown, _)) = provided
        .iter()
        .find(|(key, _)| !input.fields.contains_key(*key))
    {
        return Err(CoercionError::new(format!(
            "Field '{unknown}' is not defined by type {}",
            input.name
        )));
    }

    let mut object = Map::new();
    for def in input.fields.values() {
        let value = match provided.iter().find(|(key, _)| *key == def.name) {
            Some((_, value)) => coerce_field(def, *value)?,
            None => match &def.default_value {
                Some(default) => default.clone(),
                None if def.ty.is_non_null() => {
                    return Err(CoercionError::new(format!(
                        "Field {}.{} of required type {} was not provided",
                        input.name, def.name, def.ty
                    )));
                }
                None => continue,
            },
        };
        object.insert(def.name.clone(), value);
    }
    Ok(Value::Object(object))
}

/// Coerces one declared argument of a field.
///
/// A missing argument, or one given as a variable the caller did not supply,
/// takes its default, or null. Whether a null is acceptable is left to the
/// resolver.
pub fn coerce_argument_value(
    schema: &Schema,
    field: &FieldDef,
    argument: Option<&ast::Argument>,
    def: &InputFieldDef,
    variables: &Variables,
) -> Result<Value, ArgumentCoercionError> {
    let unbound = |argument: &ast::Argument| {
        matches!(&argument.value, ast::Value::Variable(name) if variables.is_unbound(name.as_str()))
    };
    let Some(argument) = argument.filter(|argument| !unbound(argument)) else {
        return Ok(def.default_value.clone().unwrap_or(Value::Null));
    };
    coerce_literal(schema, &def.ty, &argument.value, variables).map_err(|e| {
        tracing::debug!(argument = %def.name, field = %field.name, reason = %e, "argument coercion failed");
        ArgumentCoercionError {
            message: format!(
                "Argument '{}' on Field '{}' has an invalid value ({}). Expected type '{}'.",
                def.name, field.name, argument.value, def.ty
            ),
            location: argument.location,
        }
    })
}

/// Coerces every argument of a field selection, in declared order.
pub fn coerce_argument_values(
    schema: &Schema,
    field: &FieldDef,
    arguments: &[ast::Argument],
    variables: &Variables,
) -> Result<ResolverArgs, ArgumentCoercionError> {
    if let Some(unknown) = arguments
        .iter()
        .find(|arg| !field.arguments.contains_key(arg.name.as_str()))
    {
        return Err(ArgumentCoercionError {
            message: format!(
                "Field '{}' doesn't accept argument '{}'",
                field.name, unknown.name
            ),
            location: unknown.location,
        });
    }

    let mut coerced = IndexMap::with_capacity(field.arguments.len());
    for def in field.arguments.values() {
        let argument = arguments.iter().find(|arg| arg.name.as_str() == def.name);
        let value = coerce_argument_value(schema, field, argument, def, variables)?;
        coerced.insert(def.name.clone(), value);
    }
    Ok(ResolverArgs::from(coerced))
}

/// Converts a literal to JSON without type information. Variables are
/// substituted, unbound or undeclared ones become null.
pub fn literal_to_json(value: &ast::Value, variables: &Variables) -> Value {
    match value {
        ast::Value::Variable(name) => variables.get(name.as_str()).cloned().unwrap_or(Value::Null),
        ast::Value::Int(i) => Value::from(*i),
        ast::Value::Float(f) => Number::from_f64(*f).map_or(Value::Null, Value::Number),
        ast::Value::String(s) | ast::Value::Enum(s) => Value::String(s.clone()),
        ast::Value::Boolean(b) => Value::Bool(*b),
        ast::Value::Null => Value::Null,
        ast::Value::List(items) => Value::Array(
            items
                .iter()
                .map(|item| literal_to_json(item, variables))
                .collect(),
        ),
        ast::Value::Object(fields) => Value::Object(
            fields
                .iter()
                .map(|(key, value)| (key.value.clone(), literal_to_json(value, variables)))
                .collect(),
        ),
    }
}
