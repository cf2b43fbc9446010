//! Schema construction and lookup.

use crate::resolver::Context;
use crate::scalar::built_in_scalars;
use crate::types::{ObjectDef, TypeDef, TypeRef};
use indexmap::IndexMap;
use ruql_syntax::OperationType;
use rustc_hash::FxHashMap;
use serde_json::Value;
use std::sync::Arc;

/// Error raised while building a schema.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    #[error("Unknown type '{name}' referenced by {referenced_by}")]
    UnknownType { name: String, referenced_by: String },

    #[error("Type '{0}' is defined more than once")]
    DuplicateType(String),

    #[error("Schema has no query type")]
    MissingQueryType,

    #[error("{role} type '{name}' must be an object type")]
    InvalidRootType { role: &'static str, name: String },

    #[error("{referenced_by} uses '{name}', which is not an {expected} type")]
    WrongKind {
        name: String,
        referenced_by: String,
        expected: &'static str,
    },

    #[error("{object} does not conform to interface {interface}: {reason}")]
    TypeConformance {
        object: String,
        interface: String,
        reason: String,
    },
}

/// Schema builder.
///
/// Types may be added in any order; references between them are checked in
/// [`SchemaBuilder::build`].
#[derive(Debug)]
pub struct SchemaBuilder {
    types: IndexMap<String, TypeDef>,
    duplicates: Vec<String>,
    overridden: Vec<String>,
    query_type: Option<String>,
    mutation_type: Option<String>,
    subscription_type: Option<String>,
}

impl Default for SchemaBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaBuilder {
    /// Creates a builder holding the built-in scalars.
    pub fn new() -> Self {
        let types = built_in_scalars()
            .into_iter()
            .map(|scalar| (scalar.name.clone(), TypeDef::Scalar(scalar)))
            .collect();
        Self {
            types,
            duplicates: Vec::new(),
            overridden: Vec::new(),
            query_type: None,
            mutation_type: None,
            subscription_type: None,
        }
    }

    pub fn query_type(mut self, name: impl Into<String>) -> Self {
        self.query_type = Some(name.into());
        self
    }

    pub fn mutation_type(mut self, name: impl Into<String>) -> Self {
        self.mutation_type = Some(name.into());
        self
    }

    pub fn subscription_type(mut self, name: impl Into<String>) -> Self {
        self.subscription_type = Some(name.into());
        self
    }

    /// Adds a type. Each built-in scalar may be replaced once.
    pub fn add_type(mut self, type_def: impl Into<TypeDef>) -> Self {
        let type_def = type_def.into();
        let name = type_def.name().to_string();
        if is_built_in_scalar(&name) && !self.overridden.contains(&name) {
            self.overridden.push(name.clone());
        } else if self.types.contains_key(&name) {
            self.duplicates.push(name);
            return self;
        }
        self.types.insert(name, type_def);
        self
    }

    /// Checks every reference and computes possible types.
    pub fn build(self) -> Result<Schema, SchemaError> {
        if let Some(name) = self.duplicates.first() {
            return Err(SchemaError::DuplicateType(name.clone()));
        }

        let query_type = self.query_type.clone().ok_or(SchemaError::MissingQueryType)?;
        self.check_root("Query", &query_type)?;
        if let Some(name) = &self.mutation_type {
            self.check_root("Mutation", name)?;
        }
        if let Some(name) = &self.subscription_type {
            self.check_root("Subscription", name)?;
        }

        for type_def in self.types.values() {
            self.check_type(type_def)?;
        }

        let possible_types = self.possible_types();
        tracing::debug!(
            types = self.types.len(),
            abstract_types = possible_types.len(),
            "schema built"
        );

        Ok(Schema {
            inner: Arc::new(SchemaInner {
                types: self.types,
                possible_types,
                query_type,
                mutation_type: self.mutation_type,
                subscription_type: self.subscription_type,
            }),
        })
    }

    fn check_root(&self, role: &'static str, name: &str) -> Result<(), SchemaError> {
        match self.types.get(name) {
            Some(TypeDef::Object(_)) => Ok(()),
            Some(_) => Err(SchemaError::InvalidRootType {
                role,
                name: name.to_string(),
            }),
            None => Err(SchemaError::UnknownType {
                name: name.to_string(),
                referenced_by: format!("the {} root", role.to_lowercase()),
            }),
        }
    }

    fn lookup(
        &self,
        name: &str,
        referenced_by: impl FnOnce() -> String,
    ) -> Result<&TypeDef, SchemaError> {
        self.types.get(name).ok_or_else(|| SchemaError::UnknownType {
            name: name.to_string(),
            referenced_by: referenced_by(),
        })
    }

    fn check_type(&self, type_def: &TypeDef) -> Result<(), SchemaError> {
        let owner = type_def.name();
        if let Some(fields) = type_def.fields() {
            for field in fields.values() {
                let at = || format!("{owner}.{}", field.name);
                let target = self.lookup(field.ty.named_type(), at)?;
                if !target.is_output() {
                    return Err(wrong_kind(target, at(), "output"));
                }
                for arg in field.arguments.values() {
                    let at = || format!("{owner}.{}({}:)", field.name, arg.name);
                    self.check_input(&arg.ty, at)?;
                }
            }
        }

        match type_def {
            TypeDef::Object(object) => {
                for interface in &object.implements {
                    self.check_conformance(object, interface)?;
                }
            }
            TypeDef::Union(union) => {
                for member in &union.members {
                    let target = self.lookup(member, || union.name.clone())?;
                    if !matches!(target, TypeDef::Object(_)) {
                        return Err(wrong_kind(target, union.name.clone(), "object"));
                    }
                }
            }
            TypeDef::InputObject(input) => {
                for field in input.fields.values() {
                    self.check_input(&field.ty, || format!("{}.{}", input.name, field.name))?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn check_input(&self, ty: &TypeRef, at: impl Fn() -> String) -> Result<(), SchemaError> {
        let target = self.lookup(ty.named_type(), &at)?;
        if target.is_input() {
            Ok(())
        } else {
            Err(wrong_kind(target, at(), "input"))
        }
    }

    /// Objects must carry every interface field with the same type and arguments.
    fn check_conformance(&self, object: &ObjectDef, interface: &str) -> Result<(), SchemaError> {
        let interface_def = match self.lookup(interface, || object.name.clone())? {
            TypeDef::Interface(def) => def,
            other => return Err(wrong_kind(other, object.name.clone(), "interface")),
        };
        let conformance = |reason: String| SchemaError::TypeConformance {
            object: object.name.clone(),
            interface: interface.to_string(),
            reason,
        };
        for (name, expected) in &interface_def.fields {
            let Some(actual) = object.fields.get(name) else {
                return Err(conformance(format!("missing field '{name}'")));
            };
            if actual.ty != expected.ty {
                return Err(conformance(format!(
                    "field '{name}' is declared as {} but the interface expects {}",
                    actual.ty, expected.ty
                )));
            }
            if !expected.arguments_satisfied_by(actual) {
                return Err(conformance(format!(
                    "field '{name}' does not accept the interface's arguments"
                )));
            }
        }
        Ok(())
    }

    /// Scans all object types once to record interface implementers and
    /// union members.
    fn possible_types(&self) -> FxHashMap<String, Vec<String>> {
        let mut table: FxHashMap<String, Vec<String>> = FxHashMap::default();
        for type_def in self.types.values() {
            match type_def {
                TypeDef::Object(object) => {
                    for interface in &object.implements {
                        table
                            .entry(interface.clone())
                            .or_default()
                            .push(object.name.clone());
                    }
                }
                TypeDef::Interface(interface) => {
                    table.entry(interface.name.clone()).or_default();
                }
                TypeDef::Union(union) => {
                    table
                        .entry(union.name.clone())
                        .or_default()
                        .extend(union.members.iter().cloned());
                }
                _ => {}
            }
        }
        table
    }
}

fn is_built_in_scalar(name: &str) -> bool {
    matches!(name, "Int" | "Float" | "String" | "Boolean" | "ID")
}

fn wrong_kind(target: &TypeDef, referenced_by: String, expected: &'static str) -> SchemaError {
    SchemaError::WrongKind {
        name: target.name().to_string(),
        referenced_by,
        expected,
    }
}

#[derive(Debug)]
struct SchemaInner {
    types: IndexMap<String, TypeDef>,
    possible_types: FxHashMap<String, Vec<String>>,
    query_type: String,
    mutation_type: Option<String>,
    subscription_type: Option<String>,
}

/// An immutable schema, cheap to clone and safe to share across executions.
#[derive(Debug, Clone)]
pub struct Schema {
    inner: Arc<SchemaInner>,
}

impl Schema {
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::new()
    }

    /// Gets a type by name.
    pub fn get_type(&self, name: &str) -> Option<&TypeDef> {
        self.inner.types.get(name)
    }

    /// Returns all types in registration order.
    pub fn types(&self) -> impl Iterator<Item = &TypeDef> {
        self.inner.types.values()
    }

    pub fn object(&self, name: &str) -> Option<&ObjectDef> {
        match self.get_type(name)? {
            TypeDef::Object(object) => Some(object),
            _ => None,
        }
    }

    /// The query root. Always present in a built schema.
    pub fn query_type(&self) -> Option<&ObjectDef> {
        self.object(&self.inner.query_type)
    }

    pub fn mutation_type(&self) -> Option<&ObjectDef> {
        self.object(self.inner.mutation_type.as_deref()?)
    }

    pub fn subscription_type(&self) -> Option<&ObjectDef> {
        self.object(self.inner.subscription_type.as_deref()?)
    }

    /// The root object for an operation kind, if the schema declares one.
    pub fn root_type(&self, operation: OperationType) -> Option<&ObjectDef> {
        match operation {
            OperationType::Query => self.query_type(),
            OperationType::Mutation => self.mutation_type(),
            OperationType::Subscription => self.subscription_type(),
        }
    }

    /// Objects implementing an interface or belonging to a union. Empty for
    /// any other name.
    pub fn possible_types(&self, abstract_type: &str) -> &[String] {
        self.inner
            .possible_types
            .get(abstract_type)
            .map_or(&[], Vec::as_slice)
    }

    pub fn is_possible_type(&self, abstract_type: &str, object: &str) -> bool {
        self.possible_types(abstract_type)
            .iter()
            .any(|name| name == object)
    }

    /// Whether an object declares conformance to an interface.
    pub fn implements(&self, object: &str, interface: &str) -> bool {
        self.object(object)
            .is_some_and(|def| def.implements_interface(interface))
    }

    /// Finds the concrete object type of a value whose static type is an
    /// interface or union.
    pub fn resolve_runtime_type(
        &self,
        abstract_type: &TypeDef,
        value: &Value,
        ctx: &Context,
    ) -> Option<&ObjectDef> {
        let resolve_type = match abstract_type {
            TypeDef::Interface(def) => def.resolve_type.as_ref(),
            TypeDef::Union(def) => def.resolve_type.as_ref(),
            TypeDef::Object(object) => return self.object(&object.name),
            _ => return None,
        };
        let name = match resolve_type {
            Some(f) => f(value, ctx)?,
            None => value.get("__typename")?.as_str()?.to_string(),
        };
        if self.is_possible_type(abstract_type.name(), &name) {
            self.object(&name)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FieldDef, ScalarDef, InputFieldDef, InterfaceDef, UnionDef};
    use serde_json::json;

    fn edible() -> InterfaceDef {
        InterfaceDef::new("Edible").field(FieldDef::new(
            "fatContent",
            TypeRef::named("Float").non_null(),
        ))
    }

    fn cheese() -> ObjectDef {
        ObjectDef::new("Cheese")
            .implements("Edible")
            .field(FieldDef::new("flavor", TypeRef::named("String").non_null()))
            .field(FieldDef::new("fatContent", TypeRef::named("Float").non_null()))
    }

    fn milk() -> ObjectDef {
        ObjectDef::new("Milk")
            .implements("Edible")
            .field(FieldDef::new("fatContent", TypeRef::named("Float").non_null()))
    }

    fn query() -> ObjectDef {
        ObjectDef::new("Query").field(
            FieldDef::new("cheese", TypeRef::named("Cheese"))
                .argument(InputFieldDef::new("id", TypeRef::named("Int").non_null())),
        )
    }

    fn base() -> SchemaBuilder {
        SchemaBuilder::new()
            .query_type("Query")
            .add_type(query())
            .add_type(edible())
            .add_type(cheese())
            .add_type(milk())
    }

    #[test]
    fn test_possible_types_computed_once() {
        let schema = base()
            .add_type(UnionDef::new("DairyProduct").member("Milk").member("Cheese"))
            .build()
            .unwrap();

        assert_eq!(schema.possible_types("Edible"), ["Cheese", "Milk"]);
        assert_eq!(schema.possible_types("DairyProduct"), ["Milk", "Cheese"]);
        assert!(schema.possible_types("Cheese").is_empty());
        assert!(schema.is_possible_type("Edible", "Milk"));
        assert!(schema.implements("Cheese", "Edible"));
        assert!(!schema.implements("Query", "Edible"));
    }

    #[test]
    fn test_types_declared_after_use() {
        let schema = SchemaBuilder::new()
            .add_type(cheese())
            .add_type(milk())
            .add_type(query())
            .add_type(edible())
            .query_type("Query")
            .build()
            .unwrap();
        assert_eq!(schema.possible_types("Edible").len(), 2);
        assert_eq!(schema.query_type().unwrap().name, "Query");
        assert!(schema.mutation_type().is_none());
    }

    #[test]
    fn test_unknown_type() {
        let err = SchemaBuilder::new()
            .query_type("Query")
            .add_type(ObjectDef::new("Query").field(FieldDef::new("goat", TypeRef::named("Goat"))))
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            SchemaError::UnknownType {
                name: "Goat".into(),
                referenced_by: "Query.goat".into()
            }
        );
    }

    #[test]
    fn test_missing_query_type() {
        assert_eq!(
            SchemaBuilder::new().build().unwrap_err(),
            SchemaError::MissingQueryType
        );
    }

    #[test]
    fn test_conformance_missing_field() {
        let err = base()
            .add_type(ObjectDef::new("Butter").implements("Edible"))
            .build()
            .unwrap_err();
        assert!(matches!(err, SchemaError::TypeConformance { ref object, .. } if object == "Butter"));
    }

    #[test]
    fn test_conformance_wrong_type() {
        let err = base()
            .add_type(
                ObjectDef::new("Butter")
                    .implements("Edible")
                    .field(FieldDef::new("fatContent", TypeRef::named("String"))),
            )
            .build()
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Butter does not conform to interface Edible: field 'fatContent' is declared as String but the interface expects Float!"
        );
    }

    #[test]
    fn test_conformance_allows_extra_optional_argument() {
        let fat_content = || FieldDef::new("fatContent", TypeRef::named("Float").non_null());
        let butter = |extra: InputFieldDef| {
            base()
                .add_type(
                    ObjectDef::new("Butter")
                        .implements("Edible")
                        .field(fat_content().argument(extra)),
                )
                .build()
        };

        assert!(butter(InputFieldDef::new("unit", TypeRef::named("String"))).is_ok());
        let err = butter(InputFieldDef::new("unit", TypeRef::named("String").non_null()))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Butter does not conform to interface Edible: field 'fatContent' does not accept the interface's arguments"
        );
    }

    #[test]
    fn test_input_position_rejects_objects() {
        let err = SchemaBuilder::new()
            .query_type("Query")
            .add_type(cheese())
            .add_type(edible())
            .add_type(
                ObjectDef::new("Query").field(
                    FieldDef::new("similar", TypeRef::named("Cheese"))
                        .argument(InputFieldDef::new("to", TypeRef::named("Cheese"))),
                ),
            )
            .build()
            .unwrap_err();
        assert!(matches!(err, SchemaError::WrongKind { expected: "input", .. }));
    }

    #[test]
    fn test_built_in_scalar_can_be_replaced_once() {
        let schema = base()
            .add_type(ScalarDef::new("ID").description("Opaque identifier"))
            .build()
            .unwrap();
        let id = schema.get_type("ID").unwrap();
        assert!(matches!(id, TypeDef::Scalar(s) if s.description.as_deref() == Some("Opaque identifier")));

        let err = base()
            .add_type(ScalarDef::new("ID"))
            .add_type(ScalarDef::new("ID"))
            .build()
            .unwrap_err();
        assert_eq!(err, SchemaError::DuplicateType("ID".into()));
    }

    #[test]
    fn test_duplicate_type() {
        let err = base().add_type(milk()).build().unwrap_err();
        assert_eq!(err, SchemaError::DuplicateType("Milk".into()));
    }

    #[test]
    fn test_resolve_runtime_type() {
        let schema = base().build().unwrap();
        let edible = schema.get_type("Edible").unwrap();
        let ctx = Context::new();

        let milk = schema.resolve_runtime_type(edible, &json!({"__typename": "Milk"}), &ctx);
        assert_eq!(milk.map(|o| o.name.as_str()), Some("Milk"));
        assert!(schema
            .resolve_runtime_type(edible, &json!({"__typename": "Query"}), &ctx)
            .is_none());
        assert!(schema.resolve_runtime_type(edible, &json!({}), &ctx).is_none());
    }

    #[test]
    fn test_resolve_runtime_type_of_object() {
        let schema = base().build().unwrap();
        let ctx = Context::new();

        let resolved = {
            let detached = TypeDef::Object(ObjectDef::new("Milk"));
            schema.resolve_runtime_type(&detached, &json!({}), &ctx)
        };
        assert!(resolved.is_some_and(|object| std::ptr::eq(object, schema.object("Milk").unwrap())));

        let unknown = TypeDef::Object(ObjectDef::new("Yogurt"));
        assert!(schema.resolve_runtime_type(&unknown, &json!({}), &ctx).is_none());
    }
}
