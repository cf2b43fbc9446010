//! Type system definitions.
//!
//! Every definition is plain data plus shared closures, so a built schema can
//! be cloned cheaply and read from many executions at once.

use crate::resolver::{
    AsyncFnResolver, Context, FieldResolver, FnResolver, Resolver, ResolverArgs, ResolverInfo,
    ResolverResult,
};
use crate::scalar::{CoercionError, CoercionResult};
use indexmap::IndexMap;
use ruql_syntax::ast;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;

/// Type reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeRef {
    Named(String),
    List(Box<TypeRef>),
    NonNull(Box<TypeRef>),
}

impl TypeRef {
    pub fn named(name: impl Into<String>) -> Self {
        Self::Named(name.into())
    }

    pub fn list(inner: TypeRef) -> Self {
        Self::List(Box::new(inner))
    }

    /// Wraps the reference in a non-null marker. Already non-null references
    /// are returned unchanged.
    #[must_use]
    pub fn non_null(self) -> Self {
        match self {
            Self::NonNull(_) => self,
            other => Self::NonNull(Box::new(other)),
        }
    }

    pub fn is_non_null(&self) -> bool {
        matches!(self, Self::NonNull(_))
    }

    /// The reference with an outer non-null marker removed.
    pub fn nullable(&self) -> &TypeRef {
        match self {
            Self::NonNull(inner) => inner,
            other => other,
        }
    }

    /// The innermost type name.
    pub fn named_type(&self) -> &str {
        match self {
            Self::Named(name) => name,
            Self::List(inner) | Self::NonNull(inner) => inner.named_type(),
        }
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(name) => f.write_str(name),
            Self::List(inner) => write!(f, "[{inner}]"),
            Self::NonNull(inner) => write!(f, "{inner}!"),
        }
    }
}

impl From<&ast::Type> for TypeRef {
    fn from(ty: &ast::Type) -> Self {
        match ty {
            ast::Type::Named(name) => Self::named(name.as_str()),
            ast::Type::List(inner) => Self::list(inner.as_ref().into()),
            ast::Type::NonNull(inner) => Self::from(inner.as_ref()).non_null(),
        }
    }
}

impl FromStr for TypeRef {
    type Err = ruql_syntax::ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ruql_syntax::parse_type(s).map(|ty| Self::from(&ty))
    }
}

/// Kind of a named type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Scalar,
    Enum,
    Object,
    Interface,
    Union,
    InputObject,
}

impl fmt::Display for TypeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Scalar => "scalar",
            Self::Enum => "enum",
            Self::Object => "object",
            Self::Interface => "interface",
            Self::Union => "union",
            Self::InputObject => "input object",
        })
    }
}

/// A type definition.
#[derive(Debug, Clone)]
pub enum TypeDef {
    Scalar(ScalarDef),
    Enum(EnumDef),
    Object(ObjectDef),
    Interface(InterfaceDef),
    Union(UnionDef),
    InputObject(InputObjectDef),
}

impl TypeDef {
    pub fn name(&self) -> &str {
        match self {
            Self::Scalar(def) => &def.name,
            Self::Enum(def) => &def.name,
            Self::Object(def) => &def.name,
            Self::Interface(def) => &def.name,
            Self::Union(def) => &def.name,
            Self::InputObject(def) => &def.name,
        }
    }

    pub fn kind(&self) -> TypeKind {
        match self {
            Self::Scalar(_) => TypeKind::Scalar,
            Self::Enum(_) => TypeKind::Enum,
            Self::Object(_) => TypeKind::Object,
            Self::Interface(_) => TypeKind::Interface,
            Self::Union(_) => TypeKind::Union,
            Self::InputObject(_) => TypeKind::InputObject,
        }
    }

    /// Scalars and enums.
    pub fn is_leaf(&self) -> bool {
        matches!(self, Self::Scalar(_) | Self::Enum(_))
    }

    /// Interfaces and unions.
    pub fn is_abstract(&self) -> bool {
        matches!(self, Self::Interface(_) | Self::Union(_))
    }

    /// Types allowed in argument and variable positions.
    pub fn is_input(&self) -> bool {
        matches!(self, Self::Scalar(_) | Self::Enum(_) | Self::InputObject(_))
    }

    /// Types allowed as field results.
    pub fn is_output(&self) -> bool {
        !matches!(self, Self::InputObject(_))
    }

    /// Fields of an object or interface.
    pub fn fields(&self) -> Option<&IndexMap<String, FieldDef>> {
        match self {
            Self::Object(def) => Some(&def.fields),
            Self::Interface(def) => Some(&def.fields),
            _ => None,
        }
    }
}

macro_rules! impl_from_def {
    ($($def:ident => $variant:ident),* $(,)?) => {
        $(
            impl From<$def> for TypeDef {
                fn from(def: $def) -> Self {
                    Self::$variant(def)
                }
            }
        )*
    };
}

impl_from_def! {
    ScalarDef => Scalar,
    EnumDef => Enum,
    ObjectDef => Object,
    InterfaceDef => Interface,
    UnionDef => Union,
    InputObjectDef => InputObject,
}

/// Scalar coercion function.
pub type ScalarFn = Arc<dyn Fn(&Value) -> CoercionResult + Send + Sync>;

/// Maps a raw value of an abstract type to the name of its concrete object type.
pub type ResolveTypeFn = Arc<dyn Fn(&Value, &Context) -> Option<String> + Send + Sync>;

/// Scalar type definition.
#[derive(Clone)]
pub struct ScalarDef {
    pub name: String,
    pub description: Option<String>,
    input: ScalarFn,
    result: ScalarFn,
}

impl ScalarDef {
    /// Creates a scalar that passes values through unchanged in both directions.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            input: Arc::new(|value| Ok(value.clone())),
            result: Arc::new(|value| Ok(value.clone())),
        }
    }

    pub fn description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    /// Sets the external to internal conversion.
    pub fn coerce_input<F>(mut self, f: F) -> Self
    where
        F: Fn(&Value) -> CoercionResult + Send + Sync + 'static,
    {
        self.input = Arc::new(f);
        self
    }

    /// Sets the internal to external conversion.
    pub fn coerce_result<F>(mut self, f: F) -> Self
    where
        F: Fn(&Value) -> CoercionResult + Send + Sync + 'static,
    {
        self.result = Arc::new(f);
        self
    }

    pub fn input(&self, value: &Value) -> CoercionResult {
        (self.input)(value)
    }

    pub fn result(&self, value: &Value) -> CoercionResult {
        (self.result)(value)
    }
}

impl fmt::Debug for ScalarDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScalarDef")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

/// Enum type definition.
#[derive(Debug, Clone)]
pub struct EnumDef {
    pub name: String,
    pub description: Option<String>,
    pub values: IndexMap<String, EnumValueDef>,
}

/// Enum value definition: external name, internal value, description.
#[derive(Debug, Clone, PartialEq)]
pub struct EnumValueDef {
    pub name: String,
    pub value: Value,
    pub description: Option<String>,
}

impl EnumValueDef {
    /// Creates a value whose internal form is its own name.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            value: Value::String(name.clone()),
            name,
            description: None,
        }
    }

    /// Sets the internal value.
    pub fn value(mut self, value: impl Into<Value>) -> Self {
        self.value = value.into();
        self
    }

    pub fn description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }
}

impl EnumDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            values: IndexMap::new(),
        }
    }

    pub fn description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    /// Adds a value. Declaration order is kept.
    pub fn value(mut self, value: EnumValueDef) -> Self {
        self.values.insert(value.name.clone(), value);
        self
    }

    /// Maps an external enum name to its internal value.
    pub fn coerce_input(&self, value: &Value) -> CoercionResult {
        value
            .as_str()
            .and_then(|name| self.values.get(name))
            .map(|def| def.value.clone())
            .ok_or_else(|| {
                CoercionError::new(format!("Enum {} cannot represent value: {value}", self.name))
            })
    }

    /// Maps an internal value back to the first declared name carrying it.
    pub fn coerce_result(&self, value: &Value) -> CoercionResult {
        self.values
            .values()
            .find(|def| def.value == *value)
            .map(|def| Value::String(def.name.clone()))
            .ok_or_else(|| {
                CoercionError::new(format!("Enum {} cannot represent value: {value}", self.name))
            })
    }
}

/// Object type definition.
#[derive(Debug, Clone)]
pub struct ObjectDef {
    pub name: String,
    pub description: Option<String>,
    pub fields: IndexMap<String, FieldDef>,
    pub implements: Vec<String>,
}

impl ObjectDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            fields: IndexMap::new(),
            implements: Vec::new(),
        }
    }

    pub fn description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    pub fn field(mut self, field: FieldDef) -> Self {
        self.fields.insert(field.name.clone(), field);
        self
    }

    /// Declares conformance to an interface.
    pub fn implements(mut self, interface: impl Into<String>) -> Self {
        self.implements.push(interface.into());
        self
    }

    pub fn implements_interface(&self, interface: &str) -> bool {
        self.implements.iter().any(|name| name == interface)
    }
}

/// Interface type definition.
#[derive(Clone)]
pub struct InterfaceDef {
    pub name: String,
    pub description: Option<String>,
    pub fields: IndexMap<String, FieldDef>,
    pub resolve_type: Option<ResolveTypeFn>,
}

impl InterfaceDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            fields: IndexMap::new(),
            resolve_type: None,
        }
    }

    pub fn description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    pub fn field(mut self, field: FieldDef) -> Self {
        self.fields.insert(field.name.clone(), field);
        self
    }

    /// Sets the runtime type resolution. Without one, the value's
    /// `__typename` key is used.
    pub fn resolve_type<F>(mut self, f: F) -> Self
    where
        F: Fn(&Value, &Context) -> Option<String> + Send + Sync + 'static,
    {
        self.resolve_type = Some(Arc::new(f));
        self
    }
}

impl fmt::Debug for InterfaceDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterfaceDef")
            .field("name", &self.name)
            .field("fields", &self.fields)
            .field("resolve_type", &self.resolve_type.is_some())
            .finish_non_exhaustive()
    }
}

/// Union type definition.
#[derive(Clone)]
pub struct UnionDef {
    pub name: String,
    pub description: Option<String>,
    pub members: Vec<String>,
    pub resolve_type: Option<ResolveTypeFn>,
}

impl UnionDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            members: Vec::new(),
            resolve_type: None,
        }
    }

    pub fn description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    pub fn member(mut self, object: impl Into<String>) -> Self {
        self.members.push(object.into());
        self
    }

    /// Sets the runtime type resolution. Without one, the value's
    /// `__typename` key is used.
    pub fn resolve_type<F>(mut self, f: F) -> Self
    where
        F: Fn(&Value, &Context) -> Option<String> + Send + Sync + 'static,
    {
        self.resolve_type = Some(Arc::new(f));
        self
    }
}

impl fmt::Debug for UnionDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnionDef")
            .field("name", &self.name)
            .field("members", &self.members)
            .field("resolve_type", &self.resolve_type.is_some())
            .finish_non_exhaustive()
    }
}

/// Input object type definition.
#[derive(Debug, Clone)]
pub struct InputObjectDef {
    pub name: String,
    pub description: Option<String>,
    pub fields: IndexMap<String, InputFieldDef>,
}

impl InputObjectDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            fields: IndexMap::new(),
        }
    }

    pub fn description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    pub fn field(mut self, field: InputFieldDef) -> Self {
        self.fields.insert(field.name.clone(), field);
        self
    }
}

/// Field definition.
#[derive(Debug, Clone)]
pub struct FieldDef {
    pub name: String,
    pub description: Option<String>,
    pub ty: TypeRef,
    pub arguments: IndexMap<String, InputFieldDef>,
    pub resolver: Option<FieldResolver>,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, ty: TypeRef) -> Self {
        Self {
            name: name.into(),
            description: None,
            ty,
            arguments: IndexMap::new(),
            resolver: None,
        }
    }

    pub fn description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    pub fn argument(mut self, argument: InputFieldDef) -> Self {
        self.arguments.insert(argument.name.clone(), argument);
        self
    }

    /// Sets the resolver.
    pub fn resolver<R: Resolver + 'static>(mut self, resolver: R) -> Self {
        self.resolver = Some(FieldResolver::new(resolver));
        self
    }

    /// Sets a synchronous resolver function.
    pub fn resolve_fn<F>(self, f: F) -> Self
    where
        F: Fn(&Value, &ResolverArgs, &Context, &ResolverInfo) -> ResolverResult
            + Send
            + Sync
            + 'static,
    {
        self.resolver(FnResolver::new(f))
    }

    /// Sets an asynchronous resolver function.
    pub fn resolve_async<F, Fut>(self, f: F) -> Self
    where
        F: Fn(Value, ResolverArgs, Context, ResolverInfo) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ResolverResult> + Send + 'static,
    {
        self.resolver(AsyncFnResolver::new(f))
    }

    /// Whether an implementing field accepts this interface field's
    /// arguments: each one with the same type, and any extra argument
    /// nullable or defaulted.
    pub fn arguments_satisfied_by(&self, implementation: &FieldDef) -> bool {
        let declared = self.arguments.iter().all(|(name, arg)| {
            implementation
                .arguments
                .get(name)
                .is_some_and(|theirs| theirs.ty == arg.ty)
        });
        declared
            && implementation.arguments.values().all(|arg| {
                self.arguments.contains_key(&arg.name)
                    || !arg.ty.is_non_null()
                    || arg.default_value.is_some()
            })
    }
}

/// Argument or input object field definition.
///
/// The default value is stored in internal form and used as-is.
#[derive(Debug, Clone, PartialEq)]
pub struct InputFieldDef {
    pub name: String,
    pub description: Option<String>,
    pub ty: TypeRef,
    pub default_value: Option<Value>,
}

impl InputFieldDef {
    pub fn new(name: impl Into<String>, ty: TypeRef) -> Self {
        Self {
            name: name.into(),
            description: None,
            ty,
            default_value: None,
        }
    }

    pub fn description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default_value = Some(value.into());
        self
    }
}
