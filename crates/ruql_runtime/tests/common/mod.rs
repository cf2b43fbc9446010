//! Dairy schema shared by the integration tests.

#![allow(dead_code)]

use ruql_runtime::{
    Context, EnumDef, EnumValueDef, FieldDef, InputFieldDef, InputObjectDef, InterfaceDef,
    ObjectDef, Response, ResolverError, Schema, TypeRef, UnionDef,
};
use serde_json::{json, Map, Value};

pub fn cheeses() -> Vec<Value> {
    vec![
        json!({"__typename": "Cheese", "id": 1, "flavor": "Brie", "fatContent": 0.19, "source": 1}),
        json!({"__typename": "Cheese", "id": 2, "flavor": "Gouda", "fatContent": 0.3, "source": 1}),
        json!({"__typename": "Cheese", "id": 3, "flavor": "Manchego", "fatContent": 0.065, "source": "SHEEP"}),
    ]
}

pub fn milk() -> Value {
    json!({"__typename": "Milk", "id": 1, "fatContent": 0.04, "source": 1, "flavors": ["Natural", "Chocolate"]})
}

/// A cheese missing its non-null `flavor`.
pub fn broken_cheese() -> Value {
    json!({"__typename": "Cheese", "id": 99, "fatContent": 0.5, "source": 1})
}

fn cheese_by_id(id: i64) -> Value {
    cheeses()
        .into_iter()
        .find(|cheese| cheese["id"] == json!(id))
        .unwrap_or(Value::Null)
}

fn dairy_animal() -> EnumDef {
    EnumDef::new("DairyAnimal")
        .description("An animal which can yield milk")
        .value(EnumValueDef::new("COW").value(1).description("Animal with black and white spots"))
        .value(EnumValueDef::new("GOAT").value(2).description("Animal with horns"))
        .value(EnumValueDef::new("SHEEP").description("Animal with wool"))
        .value(EnumValueDef::new("YAK").description("Animal with long hair"))
}

fn cheese_type() -> ObjectDef {
    ObjectDef::new("Cheese")
        .description("Cultured dairy product")
        .implements("Edible")
        .implements("AnimalProduct")
        .field(FieldDef::new("id", TypeRef::named("Int").non_null()))
        .field(FieldDef::new("flavor", TypeRef::named("String").non_null()))
        .field(FieldDef::new("fatContent", TypeRef::named("Float").non_null()))
        .field(FieldDef::new("source", TypeRef::named("DairyAnimal").non_null()))
        .field(
            FieldDef::new("similarCheese", TypeRef::named("Cheese"))
                .argument(InputFieldDef::new(
                    "source",
                    TypeRef::list(TypeRef::named("DairyAnimal")).non_null(),
                ))
                .resolve_fn(|parent, args, _, _| {
                    let sources = args.get("source").cloned().unwrap_or(json!([]));
                    let sources = sources.as_array().cloned().unwrap_or_default();
                    Ok(cheeses()
                        .into_iter()
                        .find(|cheese| cheese["id"] != parent["id"] && sources.contains(&cheese["source"]))
                        .unwrap_or(Value::Null))
                }),
        )
}

fn milk_type() -> ObjectDef {
    ObjectDef::new("Milk")
        .description("Dairy beverage")
        .implements("Edible")
        .implements("AnimalProduct")
        .field(FieldDef::new("id", TypeRef::named("ID").non_null()))
        .field(FieldDef::new("fatContent", TypeRef::named("Float").non_null()))
        .field(FieldDef::new("source", TypeRef::named("DairyAnimal").non_null()))
        .field(FieldDef::new("flavors", TypeRef::list(TypeRef::named("String"))))
}

fn query_type() -> ObjectDef {
    ObjectDef::new("Query")
        .field(
            FieldDef::new("cheese", TypeRef::named("Cheese"))
                .argument(InputFieldDef::new("id", TypeRef::named("Int").non_null()))
                .resolve_fn(|_, args, _, _| {
                    let id = args.require::<i64>("id")?;
                    Ok(cheese_by_id(id))
                }),
        )
        .field(
            FieldDef::new("fromSource", TypeRef::list(TypeRef::named("Cheese")))
                .argument(
                    InputFieldDef::new("source", TypeRef::named("DairyAnimal")).default_value(1),
                )
                .resolve_fn(|_, args, _, _| {
                    let source = args.get("source").cloned().unwrap_or(Value::Null);
                    Ok(Value::Array(
                        cheeses()
                            .into_iter()
                            .filter(|cheese| cheese["source"] == source)
                            .collect(),
                    ))
                }),
        )
        .field(
            FieldDef::new("searchDairy", TypeRef::named("DairyProduct"))
                .argument(
                    InputFieldDef::new(
                        "product",
                        TypeRef::list(TypeRef::named("DairyProductInput")),
                    )
                    .default_value(json!([{"source": "SHEEP"}])),
                )
                .resolve_fn(|_, args, _, _| {
                    let source = args
                        .get("product")
                        .and_then(|products| products.get(0))
                        .and_then(|product| product.get("source"))
                        .cloned()
                        .unwrap_or(Value::Null);
                    let found = cheeses()
                        .into_iter()
                        .chain([milk()])
                        .find(|product| product["source"] == source);
                    Ok(found.unwrap_or(Value::Null))
                }),
        )
        .field(
            FieldDef::new("favoriteEdible", TypeRef::named("Edible"))
                .resolve_fn(|_, _, _, _| Ok(milk())),
        )
        .field(
            FieldDef::new("dairy", TypeRef::named("Dairy")).resolve_fn(|_, _, _, _| {
                Ok(json!({"id": 1, "cheese": cheese_by_id(1), "milks": [milk()]}))
            }),
        )
        .field(
            FieldDef::new("maybeNull", TypeRef::named("MaybeNull"))
                .resolve_fn(|_, _, _, _| Ok(json!({"cheese": null}))),
        )
        .field(
            FieldDef::new("brokenCheese", TypeRef::named("Cheese"))
                .resolve_fn(|_, _, _, _| Ok(broken_cheese())),
        )
        .field(
            FieldDef::new("requiredCheese", TypeRef::named("Cheese").non_null())
                .resolve_fn(|_, _, _, _| Ok(broken_cheese())),
        )
        .field(
            FieldDef::new(
                "strictCheeses",
                TypeRef::list(TypeRef::named("Cheese").non_null()),
            )
            .resolve_fn(|_, _, _, _| Ok(json!([cheese_by_id(1), broken_cheese()]))),
        )
        .field(
            FieldDef::new("looseCheeses", TypeRef::list(TypeRef::named("Cheese")))
                .resolve_fn(|_, _, _, _| Ok(json!([cheese_by_id(1), broken_cheese()]))),
        )
        .field(
            FieldDef::new("error", TypeRef::named("String"))
                .resolve_fn(|_, _, _, _| Err(ResolverError::new("This error was raised on purpose"))),
        )
        .field(
            FieldDef::new("executionError", TypeRef::named("String").non_null())
                .resolve_fn(|_, _, _, _| Err(ResolverError::new("There was an execution error"))),
        )
        .field(
            FieldDef::new("mysteryProduct", TypeRef::named("AnimalProduct"))
                .resolve_fn(|_, _, _, _| Ok(json!({"__typename": "Butter", "source": 1}))),
        )
        .field(
            FieldDef::new("viewer", TypeRef::named("String"))
                .resolve_fn(|_, _, ctx, _| Ok(ctx.get::<Value>("viewer").unwrap_or(Value::Null))),
        )
}

/// Builds the dairy schema.
pub fn dairy_schema() -> Schema {
    dairy_schema_with(Vec::new())
}

/// Builds the dairy schema with extra query fields.
pub fn dairy_schema_with(extra_fields: Vec<FieldDef>) -> Schema {
    let query = extra_fields
        .into_iter()
        .fold(query_type(), |query, field| query.field(field));

    Schema::builder()
        .query_type("Query")
        .add_type(dairy_animal())
        .add_type(
            InterfaceDef::new("Edible")
                .description("Something you can eat, yum")
                .field(FieldDef::new("fatContent", TypeRef::named("Float").non_null())),
        )
        .add_type(
            InterfaceDef::new("AnimalProduct")
                .field(FieldDef::new("source", TypeRef::named("DairyAnimal").non_null())),
        )
        .add_type(cheese_type())
        .add_type(milk_type())
        .add_type(
            UnionDef::new("DairyProduct")
                .description("Kinds of food made from milk")
                .member("Milk")
                .member("Cheese"),
        )
        .add_type(
            ObjectDef::new("Dairy")
                .field(FieldDef::new("id", TypeRef::named("ID")))
                .field(FieldDef::new("cheese", TypeRef::named("Cheese")))
                .field(FieldDef::new("milks", TypeRef::list(TypeRef::named("Milk")))),
        )
        .add_type(ObjectDef::new("MaybeNull").field(FieldDef::new("cheese", TypeRef::named("Cheese"))))
        .add_type(
            InputObjectDef::new("DairyProductInput")
                .field(InputFieldDef::new("source", TypeRef::named("DairyAnimal").non_null()))
                .field(InputFieldDef::new("fatContent", TypeRef::named("Float"))),
        )
        .add_type(query)
        .build()
        .expect("dairy schema is valid")
}

pub fn variables(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

pub async fn run(schema: &Schema, query: &str, vars: Value) -> Response {
    ruql_runtime::execute(schema, query, None, Some(variables(vars)), None).await
}

pub async fn run_with_context(schema: &Schema, query: &str, ctx: &Context) -> Response {
    ruql_runtime::execute(schema, query, None, None, Some(ctx)).await
}

/// Messages of every reported error.
pub fn messages(response: &Response) -> Vec<String> {
    response
        .errors
        .iter()
        .flatten()
        .map(|error| error.message.clone())
        .collect()
}
