//! Integration tests for query execution against the dairy schema.

mod common;

use common::{dairy_schema, messages, run, run_with_context};
use ruql_core::Location;
use ruql_runtime::{Context, Executor, PathSegment, Request};
use serde_json::json;

const FLAVOR_QUERY: &str = r#"
    query getFlavor($cheeseId: Int!) {
      brie: cheese(id: 1)   { ...cheeseFields, taste: flavor },
      cheese(id: $cheeseId)  {
        __typename,
        id,
        ...cheeseFields,
        ... edibleFields,
        ... on Cheese { cheeseKind: flavor },
      }
      fromSource(source: COW) { id }
      fromSheep: fromSource(source: SHEEP) { id }
      firstSheep: searchDairy(product: [{source: SHEEP}]) {
        __typename,
        ... dairyFields,
        ... milkFields
      }
      favoriteEdible { __typename, fatContent }
    }
    fragment cheeseFields on Cheese { flavor }
    fragment edibleFields on Edible { fatContent }
    fragment milkFields on Milk { source }
    fragment dairyFields on AnimalProduct {
       ... on Cheese { flavor }
       ... on Milk   { source }
    }
"#;

/// Test the end-to-end path for a single argument.
#[tokio::test]
async fn test_cheese_by_id() {
    let response = run(&dairy_schema(), "{ cheese(id: 2) { flavor } }", json!({})).await;

    insta::assert_json_snapshot!(response, @r###"
    {
      "data": {
        "cheese": {
          "flavor": "Gouda"
        }
      }
    }
    "###);
}

/// Test fields, aliases, fragments and abstract types together.
#[tokio::test]
async fn test_returns_fields_on_objects() {
    let response = run(&dairy_schema(), FLAVOR_QUERY, json!({"cheeseId": 2})).await;

    assert!(response.errors.is_none(), "{:?}", response.errors);
    assert_eq!(
        response.data,
        Some(json!({
            "brie": {"flavor": "Brie", "taste": "Brie"},
            "cheese": {
                "__typename": "Cheese",
                "id": 2,
                "flavor": "Gouda",
                "fatContent": 0.3,
                "cheeseKind": "Gouda",
            },
            "fromSource": [{"id": 1}, {"id": 2}],
            "fromSheep": [{"id": 3}],
            "firstSheep": {"__typename": "Cheese", "flavor": "Manchego"},
            "favoriteEdible": {"__typename": "Milk", "fatContent": 0.04},
        }))
    );
}

/// Test response keys keep selection order.
#[tokio::test]
async fn test_response_key_order() {
    let response = run(&dairy_schema(), FLAVOR_QUERY, json!({"cheeseId": 2})).await;
    let data = response.data.unwrap();

    let keys: Vec<&String> = data.as_object().unwrap().keys().collect();
    assert_eq!(
        keys,
        ["brie", "cheese", "fromSource", "fromSheep", "firstSheep", "favoriteEdible"]
    );
    let cheese_keys: Vec<&String> = data["cheese"].as_object().unwrap().keys().collect();
    assert_eq!(
        cheese_keys,
        ["__typename", "id", "flavor", "fatContent", "cheeseKind"]
    );
}

/// Test sub-selections contributed by several fragments are unioned.
#[tokio::test]
async fn test_merging_fragments_with_different_keys() {
    let query = r#"
      query getCheeseFieldsThroughDairy {
        ... cheeseFrag3
        dairy {
          ...flavorFragment
          ...fatContentFragment
        }
      }
      fragment flavorFragment on Dairy {
        cheese {
          flavor
        }
        milks {
          id
        }
      }
      fragment fatContentFragment on Dairy {
        cheese {
          fatContent
        }
        milks {
          fatContent
        }
      }

      fragment cheeseFrag1 on Query {
        cheese(id: 1) {
          id
        }
      }
      fragment cheeseFrag2 on Query {
        cheese(id: 1) {
          flavor
        }
      }
      fragment cheeseFrag3 on Query {
        ... cheeseFrag2
        ... cheeseFrag1
      }
    "#;
    let response = run(&dairy_schema(), query, json!({})).await;

    assert!(response.errors.is_none());
    assert_eq!(
        response.data,
        Some(json!({
            "dairy": {
                "cheese": {"flavor": "Brie", "fatContent": 0.19},
                "milks": [{"id": "1", "fatContent": 0.04}],
            },
            "cheese": {"id": 1, "flavor": "Brie"},
        }))
    );
}

/// Test whitespace-only and empty queries produce an empty response.
#[tokio::test]
async fn test_malformed_queries_do_not_blow_up() {
    let schema = dairy_schema();
    for query in ["", " ", "\n\t  # just a comment\n"] {
        let response = run(&schema, query, json!({})).await;
        assert_eq!(response.to_json(), json!({}), "query {query:?}");
    }
}

/// Test parse errors are located at the start of the failing definition.
#[tokio::test]
async fn test_parse_error_location() {
    let query = "
        query getCoupons {
          allCoupons: {data{id}}
        }
      ";
    let response = run(&dairy_schema(), query, json!({})).await;

    assert!(response.data.is_none());
    let errors = response.errors.unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].locations, vec![Location::new(2, 9)]);
    assert_eq!(errors[0].message, r#"Expected Name, found "{" at line 3 char 23"#);
}

mod argument_defaults {
    use super::*;

    const QUERY: &str = r#"
      query getCheeses(
        $search: [DairyProductInput]
        $searchWithDefault: [DairyProductInput] = [{source: COW}]
      ){
        noVariable: searchDairy(product: $search) {
          ... cheeseFields
        }
        noArgument: searchDairy {
          ... cheeseFields
        }
        variableDefault: searchDairy(product: $searchWithDefault) {
          ... cheeseFields
        }
      }
      fragment cheeseFields on Cheese { flavor }
    "#;

    #[test]
    fn test_has_a_default_value() {
        let schema = dairy_schema();
        let field = &schema.query_type().unwrap().fields["searchDairy"];
        let default = field.arguments["product"].default_value.as_ref().unwrap();
        assert_eq!(default[0]["source"], json!("SHEEP"));
    }

    #[tokio::test]
    async fn test_unsupplied_variable_uses_argument_default() {
        let response = run(&dairy_schema(), QUERY, json!({})).await;
        assert_eq!(response.data.unwrap()["noVariable"]["flavor"], "Manchego");
    }

    #[tokio::test]
    async fn test_missing_argument_uses_default() {
        let response = run(&dairy_schema(), QUERY, json!({})).await;
        assert_eq!(response.data.unwrap()["noArgument"]["flavor"], "Manchego");
    }

    #[tokio::test]
    async fn test_variable_default_is_used() {
        let response = run(&dairy_schema(), QUERY, json!({})).await;
        assert_eq!(response.data.unwrap()["variableDefault"]["flavor"], "Brie");
    }
}

mod query_variables {
    use super::*;

    const QUERY: &str = r#"
      query getCheese($cheeseId: Int!){
        cheese(id: $cheeseId) { flavor }
      }
    "#;

    #[tokio::test]
    async fn test_whole_float_is_coerced_to_int() {
        let response = run(&dairy_schema(), QUERY, json!({"cheeseId": 2.0})).await;
        assert_eq!(response.data, Some(json!({"cheese": {"flavor": "Gouda"}})));
    }

    #[tokio::test]
    async fn test_uncoercible_value_is_an_error() {
        let response = run(&dairy_schema(), QUERY, json!({"cheeseId": "2"})).await;

        assert!(response.data.is_none());
        assert_eq!(
            messages(&response),
            [r#"Variable cheeseId of type Int! was provided invalid value "2""#]
        );
    }

    #[tokio::test]
    async fn test_missing_required_variable_is_an_error() {
        let response = run(&dairy_schema(), QUERY, json!({})).await;

        assert!(response.data.is_none());
        assert_eq!(messages(&response), ["Variable cheeseId of type Int! can't be null"]);
        assert_eq!(
            response.errors.unwrap()[0].locations,
            vec![Location::new(2, 23)]
        );
    }

    #[tokio::test]
    async fn test_default_used_when_no_value_is_provided() {
        let query = "query getCheese($cheeseId: Int = 3){ cheese(id: $cheeseId) { id, flavor } }";
        let schema = dairy_schema();

        let response = run(&schema, query, json!({})).await;
        assert_eq!(
            response.data,
            Some(json!({"cheese": {"id": 3, "flavor": "Manchego"}}))
        );

        let response = run(&schema, query, json!({"cheeseId": 2})).await;
        assert_eq!(
            response.data,
            Some(json!({"cheese": {"id": 2, "flavor": "Gouda"}}))
        );
    }

    #[tokio::test]
    async fn test_complex_values_are_coerced_recursively() {
        let query = r#"
          query getCheeses($search: [DairyProductInput]!){
            cow: searchDairy(product: $search) {
              ... on Cheese {
                flavor
              }
            }
          }
        "#;
        let response = run(&dairy_schema(), query, json!({"search": [{"source": "COW"}]})).await;
        assert_eq!(response.data, Some(json!({"cow": {"flavor": "Brie"}})));
    }

    #[tokio::test]
    async fn test_enum_variable_in_int_position() {
        let query = "query ($s: DairyAnimal!) { cheese(id: $s) { flavor } }";
        let response = run(&dairy_schema(), query, json!({"s": "COW"})).await;

        assert_eq!(response.data, Some(json!({"cheese": null})));
        assert_eq!(
            messages(&response),
            ["Argument 'id' on Field 'cheese' has an invalid value ($s). Expected type 'Int!'."]
        );
    }

    #[tokio::test]
    async fn test_string_variable_in_enum_position() {
        let query = "query ($s: String) { fromSource(source: $s) { id } }";
        let response = run(&dairy_schema(), query, json!({"s": "COW"})).await;

        assert_eq!(response.data, Some(json!({"fromSource": null})));
        assert_eq!(response.errors.map(|errors| errors.len()), Some(1));
    }

    #[tokio::test]
    async fn test_undeclared_variable() {
        let response = run(&dairy_schema(), "{ cheese(id: $id) { flavor } }", json!({"id": 1})).await;

        assert_eq!(response.data, Some(json!({"cheese": null})));
        assert_eq!(
            messages(&response),
            ["Argument 'id' on Field 'cheese' has an invalid value ($id). Expected type 'Int!'."]
        );
    }
}

/// Test enum results map internal values back to names.
#[tokio::test]
async fn test_enum_results() {
    let query = "{ brie: cheese(id: 1) { source } manchego: cheese(id: 3) { source } favoriteEdible { ... on Milk { source flavors } } }";
    let response = run(&dairy_schema(), query, json!({})).await;

    assert_eq!(
        response.data,
        Some(json!({
            "brie": {"source": "COW"},
            "manchego": {"source": "SHEEP"},
            "favoriteEdible": {"source": "COW", "flavors": ["Natural", "Chocolate"]},
        }))
    );
}

/// Test similar cheese lookup through an enum list argument.
#[tokio::test]
async fn test_enum_list_argument() {
    let query = "{ cheese(id: 1) { similarCheese(source: [SHEEP, COW]) { flavor } } }";
    let response = run(&dairy_schema(), query, json!({})).await;
    assert_eq!(
        response.data,
        Some(json!({"cheese": {"similarCheese": {"flavor": "Gouda"}}}))
    );
}

/// Test the same field under different aliases resolves independently.
#[tokio::test]
async fn test_aliases_with_different_arguments() {
    let query = "{ a: cheese(id: 1) { flavor } b: cheese(id: 3) { flavor } }";
    let response = run(&dairy_schema(), query, json!({})).await;
    assert_eq!(
        response.data,
        Some(json!({"a": {"flavor": "Brie"}, "b": {"flavor": "Manchego"}}))
    );
}

/// Test `__typename` on the root type.
#[tokio::test]
async fn test_root_typename() {
    let response = run(&dairy_schema(), "{ __typename }", json!({})).await;
    assert_eq!(response.data, Some(json!({"__typename": "Query"})));
}

/// Test resolvers see the request context.
#[tokio::test]
async fn test_context_is_visible_to_resolvers() {
    let ctx = Context::new().with("viewer", "alice");
    let response = run_with_context(&dairy_schema(), "{ viewer }", &ctx).await;
    assert_eq!(response.data, Some(json!({"viewer": "alice"})));
}

/// Test a request deserialized from JSON.
#[tokio::test]
async fn test_json_request() {
    let request: Request = serde_json::from_value(json!({
        "query": "query A { cheese(id: 1) { flavor } } query B($id: Int!) { cheese(id: $id) { flavor } }",
        "operationName": "B",
        "variables": {"id": 3},
    }))
    .unwrap();
    let response = Executor::new()
        .execute(&dairy_schema(), request, &Context::new())
        .await;
    assert_eq!(response.data, Some(json!({"cheese": {"flavor": "Manchego"}})));
}

/// Test an invalid argument literal nulls only its own field.
#[tokio::test]
async fn test_invalid_argument_is_a_field_error() {
    let query = r#"{ cheese(id: "two") { flavor } brie: cheese(id: 1) { flavor } }"#;
    let response = run(&dairy_schema(), query, json!({})).await;

    assert_eq!(
        response.data,
        Some(json!({"cheese": null, "brie": {"flavor": "Brie"}}))
    );
    let errors = response.errors.unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(
        errors[0].message,
        r#"Argument 'id' on Field 'cheese' has an invalid value ("two"). Expected type 'Int!'."#
    );
    assert_eq!(errors[0].locations, vec![Location::new(1, 10)]);
    assert_eq!(errors[0].path, vec![PathSegment::Field("cheese".into())]);
}

/// Test selecting a field the type does not define.
#[tokio::test]
async fn test_unknown_field() {
    let response = run(&dairy_schema(), "{ cheese(id: 1) { smell } }", json!({})).await;

    assert_eq!(response.data, Some(json!({"cheese": {"smell": null}})));
    assert_eq!(messages(&response), ["Field 'smell' doesn't exist on type 'Cheese'"]);
}

/// Test spreading an undefined fragment fails the whole request.
#[tokio::test]
async fn test_unknown_fragment() {
    let response = run(&dairy_schema(), "{ cheese(id: 1) { ...missing } }", json!({})).await;

    assert!(response.data.is_none());
    assert_eq!(messages(&response), ["Fragment missing was used, but not defined"]);
    assert_eq!(
        response.errors.unwrap()[0].locations,
        vec![Location::new(1, 19)]
    );
}

/// Test operation selection errors.
#[tokio::test]
async fn test_operation_selection() {
    let schema = dairy_schema();
    let query = "query A { cheese(id: 1) { flavor } } query B { cheese(id: 2) { flavor } }";

    let response = run(&schema, query, json!({})).await;
    assert_eq!(
        messages(&response),
        ["Must provide operation name if query contains multiple operations"]
    );

    let response = ruql_runtime::execute(&schema, query, Some("B"), None, None).await;
    assert_eq!(response.data, Some(json!({"cheese": {"flavor": "Gouda"}})));

    let response = ruql_runtime::execute(&schema, query, Some("C"), None, None).await;
    assert_eq!(messages(&response), [r#"Unknown operation named "C""#]);

    let response = run(&schema, "mutation { doSomething }", json!({})).await;
    assert_eq!(messages(&response), ["Schema is not configured for mutations"]);
}
