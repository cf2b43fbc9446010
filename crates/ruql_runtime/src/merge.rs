//! Selection merging.
//!
//! Fields are grouped by response key for one concrete object type, with
//! fragment spreads and inline fragments expanded in document order. The
//! executor calls [`merge_selections`] again at every object boundary, since
//! an abstract field may expand differently per concrete type.

use crate::coercion::{literal_to_json, Variables};
use crate::schema::Schema;
use crate::types::ObjectDef;
use indexmap::IndexMap;
use ruql_core::Location;
use ruql_syntax::ast::{Directive, Document, Field, FragmentDefinition, Selection, SelectionSet};
use rustc_hash::{FxHashMap, FxHashSet};
use serde_json::Value;

/// Fragment definitions keyed by name.
pub type FragmentTable<'a> = FxHashMap<&'a str, &'a FragmentDefinition>;

/// All field nodes sharing a response key.
#[derive(Debug, Clone)]
pub struct MergedField<'a> {
    pub response_key: &'a str,
    /// Every field node contributing to this key, in document order.
    pub nodes: Vec<&'a Field>,
}

impl<'a> MergedField<'a> {
    /// The first field node; its name and arguments define the field.
    pub fn field(&self) -> &'a Field {
        self.nodes[0]
    }

    pub fn name(&self) -> &'a str {
        self.field().name.as_str()
    }

    pub fn location(&self) -> Location {
        self.field().location
    }

    /// Concatenated sub-selection sets of every contributing node.
    pub fn sub_selections(&self) -> impl Iterator<Item = &'a SelectionSet> + '_ {
        self.nodes.iter().filter_map(|field| field.selection_set.as_ref())
    }
}

/// Merged fields keyed by response key, in first-appearance order.
pub type FieldMap<'a> = IndexMap<&'a str, MergedField<'a>>;

/// Structural error found while expanding fragments.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MergeError {
    #[error("Fragment {name} was used, but not defined")]
    UnknownFragment { name: String, location: Location },

    #[error("Fragment {name} contains an infinite loop")]
    FragmentCycle { name: String, location: Location },

    #[error("Directive @{name} {message}")]
    InvalidDirective {
        name: String,
        message: String,
        location: Location,
    },
}

impl MergeError {
    pub fn location(&self) -> Location {
        match self {
            Self::UnknownFragment { location, .. }
            | Self::FragmentCycle { location, .. }
            | Self::InvalidDirective { location, .. } => *location,
        }
    }
}

/// Merges selection sets for one concrete object type.
pub fn merge_selections<'a>(
    schema: &Schema,
    selection_sets: impl IntoIterator<Item = &'a SelectionSet>,
    object_type: &ObjectDef,
    fragments: &FragmentTable<'a>,
    variables: &Variables,
) -> Result<FieldMap<'a>, MergeError> {
    let mut merger = Merger {
        schema,
        object_type,
        fragments,
        variables,
        expanding: FxHashSet::default(),
        merged: FxHashSet::default(),
        fields: FieldMap::default(),
    };
    for selection_set in selection_sets {
        merger.collect(selection_set)?;
    }
    Ok(merger.fields)
}

struct Merger<'m, 'a> {
    schema: &'m Schema,
    object_type: &'m ObjectDef,
    fragments: &'m FragmentTable<'a>,
    variables: &'m Variables,
    /// Fragments currently being expanded on the stack.
    expanding: FxHashSet<&'a str>,
    /// Fragments already expanded in this merge. A second spread adds nothing.
    merged: FxHashSet<&'a str>,
    fields: FieldMap<'a>,
}

impl<'a> Merger<'_, 'a> {
    fn collect(&mut self, selection_set: &'a SelectionSet) -> Result<(), MergeError> {
        for selection in &selection_set.selections {
            if !should_include(selection.directives(), self.variables)? {
                continue;
            }
            match selection {
                Selection::Field(field) => {
                    let key = field.response_key();
                    self.fields
                        .entry(key)
                        .or_insert_with(|| MergedField {
                            response_key: key,
                            nodes: Vec::new(),
                        })
                        .nodes
                        .push(field);
                }
                Selection::FragmentSpread(spread) => {
                    let name = spread.name.as_str();
                    let Some(fragment) = self.fragments.get(name).copied() else {
                        return Err(MergeError::UnknownFragment {
                            name: name.to_string(),
                            location: spread.location,
                        });
                    };
                    if !self.applies(Some(fragment.type_condition.as_str())) {
                        continue;
                    }
                    if self.expanding.contains(name) {
                        return Err(MergeError::FragmentCycle {
                            name: name.to_string(),
                            location: spread.location,
                        });
                    }
                    if !self.merged.insert(name) {
                        continue;
                    }
                    self.expanding.insert(name);
                    self.collect(&fragment.selection_set)?;
                    self.expanding.remove(name);
                }
                Selection::InlineFragment(inline) => {
                    let condition = inline.type_condition.as_ref().map(|n| n.as_str());
                    if self.applies(condition) {
                        self.collect(&inline.selection_set)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// A type condition applies when absent, equal to the object type, or
    /// naming an interface or union the object belongs to.
    fn applies(&self, type_condition: Option<&str>) -> bool {
        match type_condition {
            None => true,
            Some(condition) => {
                condition == self.object_type.name
                    || self.schema.is_possible_type(condition, &self.object_type.name)
            }
        }
    }
}

/// Evaluates `@skip(if:)` and `@include(if:)`.
pub fn should_include(
    directives: &[Directive],
    variables: &Variables,
) -> Result<bool, MergeError> {
    for directive in directives {
        let name = directive.name.as_str();
        let expected = match name {
            "skip" => false,
            "include" => true,
            _ => continue,
        };
        let condition = directive
            .argument("if")
            .map(|arg| literal_to_json(&arg.value, variables));
        match condition {
            Some(Value::Bool(value)) if value != expected => return Ok(false),
            Some(Value::Bool(_)) => {}
            _ => {
                return Err(MergeError::InvalidDirective {
                    name: name.to_string(),
                    message: "requires a Boolean argument 'if'".to_string(),
                    location: directive.location,
                })
            }
        }
    }
    Ok(true)
}

/// Checks every fragment spread in the document before execution: each must
/// name a defined fragment and no fragment may spread itself, directly or
/// through others.
pub fn validate_fragments(document: &Document) -> Result<(), MergeError> {
    let fragments = document.fragments();
    let mut checked = FxHashSet::default();
    let mut stack = Vec::new();

    for operation in document.operations() {
        visit(&operation.selection_set, &fragments, &mut stack, &mut checked)?;
    }
    for fragment in document.fragment_definitions() {
        let name = fragment.name.as_str();
        if checked.contains(name) {
            continue;
        }
        stack.push(name);
        visit(&fragment.selection_set, &fragments, &mut stack, &mut checked)?;
        stack.pop();
        checked.insert(name);
    }
    Ok(())
}

fn visit<'a>(
    selection_set: &'a SelectionSet,
    fragments: &FragmentTable<'a>,
    stack: &mut Vec<&'a str>,
    checked: &mut FxHashSet<&'a str>,
) -> Result<(), MergeError> {
    for selection in &selection_set.selections {
        match selection {
            Selection::Field(field) => {
                if let Some(sub) = &field.selection_set {
                    visit(sub, fragments, stack, checked)?;
                }
            }
            Selection::InlineFragment(inline) => {
                visit(&inline.selection_set, fragments, stack, checked)?;
            }
            Selection::FragmentSpread(spread) => {
                let name = spread.name.as_str();
                let Some(fragment) = fragments.get(name).copied() else {
                    return Err(MergeError::UnknownFragment {
                        name: name.to_string(),
                        location: spread.location,
                    });
                };
                if stack.contains(&name) {
                    return Err(MergeError::FragmentCycle {
                        name: name.to_string(),
                        location: spread.location,
                    });
                }
                if checked.contains(name) {
                    continue;
                }
                stack.push(name);
                visit(&fragment.selection_set, fragments, stack, checked)?;
                stack.pop();
                checked.insert(name);
            }
        }
    }
    Ok(())
}

/// Deepest field nesting of a selection set, following fragment spreads.
/// Each fragment's depth is computed once; a spread back into a fragment
/// still being measured counts as zero.
pub fn selection_depth<'a>(selection_set: &SelectionSet, fragments: &FragmentTable<'a>) -> usize {
    depth_with(selection_set, fragments, &mut FxHashMap::default())
}

fn depth_with<'a>(
    selection_set: &SelectionSet,
    fragments: &FragmentTable<'a>,
    memo: &mut FxHashMap<&'a str, usize>,
) -> usize {
    let mut deepest = 0;
    for selection in &selection_set.selections {
        let depth = match selection {
            Selection::Field(field) => {
                1 + field
                    .selection_set
                    .as_ref()
                    .map_or(0, |sub| depth_with(sub, fragments, memo))
            }
            Selection::InlineFragment(inline) => depth_with(&inline.selection_set, fragments, memo),
            Selection::FragmentSpread(spread) => {
                match fragments.get(spread.name.as_str()).copied() {
                    Some(fragment) => fragment_depth(fragment, fragments, memo),
                    None => 0,
                }
            }
        };
        deepest = deepest.max(depth);
    }
    deepest
}

fn fragment_depth<'a>(
    fragment: &'a FragmentDefinition,
    fragments: &FragmentTable<'a>,
    memo: &mut FxHashMap<&'a str, usize>,
) -> usize {
    let name = fragment.name.as_str();
    if let Some(depth) = memo.get(name) {
        return *depth;
    }
    memo.insert(name, 0);
    let depth = depth_with(&fragment.selection_set, fragments, memo);
    memo.insert(name, depth);
    depth
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FieldDef, InterfaceDef, TypeRef, UnionDef};
    use serde_json::json;

    fn schema() -> Schema {
        let edible = FieldDef::new("fatContent", TypeRef::named("Float").non_null());
        Schema::builder()
            .query_type("Query")
            .add_type(ObjectDef::new("Query").field(FieldDef::new("cheese", TypeRef::named("Cheese"))))
            .add_type(InterfaceDef::new("Edible").field(edible.clone()))
            .add_type(
                ObjectDef::new("Cheese")
                    .implements("Edible")
                    .field(edible.clone())
                    .field(FieldDef::new("flavor", TypeRef::named("String")))
                    .field(FieldDef::new("origin", TypeRef::named("String"))),
            )
            .add_type(
                ObjectDef::new("Milk")
                    .implements("Edible")
                    .field(edible)
                    .field(FieldDef::new("source", TypeRef::named("String"))),
            )
            .add_type(UnionDef::new("DairyProduct").member("Cheese").member("Milk"))
            .build()
            .unwrap()
    }

    fn merge_keys(
        query: &str,
        type_name: &str,
        variables: &Variables,
    ) -> Result<Vec<String>, MergeError> {
        let schema = schema();
        let doc = ruql_syntax::parse(query).unwrap();
        let fragments = doc.fragments();
        let op = doc.operations().next().unwrap();
        let object = schema.object(type_name).unwrap();
        let fields = merge_selections(&schema, [&op.selection_set], object, &fragments, variables)?;
        Ok(fields.keys().map(|k| k.to_string()).collect())
    }

    #[test]
    fn test_groups_by_response_key() {
        let schema = schema();
        let doc = ruql_syntax::parse(
            "{ flavor taste: flavor ...F ...G } fragment F on Cheese { origin { a } } fragment G on Cheese { origin { b } }",
        )
        .unwrap();
        let fragments = doc.fragments();
        let op = doc.operations().next().unwrap();
        let cheese = schema.object("Cheese").unwrap();
        let variables = Variables::new();
        let fields =
            merge_selections(&schema, [&op.selection_set], cheese, &fragments, &variables).unwrap();

        let keys: Vec<&str> = fields.keys().copied().collect();
        assert_eq!(keys, ["flavor", "taste", "origin"]);
        assert_eq!(fields["taste"].name(), "flavor");
        assert_eq!(fields["origin"].nodes.len(), 2);
        assert_eq!(fields["origin"].sub_selections().count(), 2);
    }

    #[test]
    fn test_type_applicability() {
        let query = r#"
            {
                ... on Cheese { flavor }
                ... on Milk { source }
                ... on Edible { fatContent }
                ... on DairyProduct { __typename }
                ... { always: __typename }
            }
        "#;
        assert_eq!(
            merge_keys(query, "Cheese", &Variables::new()).unwrap(),
            ["flavor", "fatContent", "__typename", "always"]
        );
        assert_eq!(
            merge_keys(query, "Milk", &Variables::new()).unwrap(),
            ["source", "fatContent", "__typename", "always"]
        );
    }

    #[test]
    fn test_unrelated_fragment_contributes_nothing() {
        let query = "{ ...milkFields flavor } fragment milkFields on Milk { source }";
        assert_eq!(merge_keys(query, "Cheese", &Variables::new()).unwrap(), ["flavor"]);
    }

    #[test]
    fn test_unknown_fragment() {
        let err = merge_keys("{ ...nope }", "Cheese", &Variables::new()).unwrap_err();
        assert_eq!(err.to_string(), "Fragment nope was used, but not defined");
        assert_eq!(err.location(), Location::new(1, 3));
    }

    #[test]
    fn test_fragment_cycle() {
        let query = "{ ...A } fragment A on Cheese { flavor ...B } fragment B on Cheese { ...A }";
        let err = merge_keys(query, "Cheese", &Variables::new()).unwrap_err();
        assert!(matches!(err, MergeError::FragmentCycle { ref name, .. } if name == "A"));
    }

    #[test]
    fn test_same_fragment_twice_is_not_a_cycle() {
        let query = "{ ...A ... on Cheese { ...A } } fragment A on Cheese { flavor }";
        assert_eq!(merge_keys(query, "Cheese", &Variables::new()).unwrap(), ["flavor"]);
    }

    #[test]
    fn test_skip_and_include() {
        let mut variables = Variables::new();
        variables.insert("hide", TypeRef::named("Boolean").non_null(), json!(true));
        let query = r#"
            {
                flavor @skip(if: $hide)
                origin @include(if: true)
                fatContent @include(if: false)
                ... on Cheese @skip(if: false) { taste: flavor }
            }
        "#;
        assert_eq!(merge_keys(query, "Cheese", &variables).unwrap(), ["origin", "taste"]);
    }

    #[test]
    fn test_directive_without_boolean() {
        let err = merge_keys("{ flavor @skip(if: 1) }", "Cheese", &Variables::new()).unwrap_err();
        assert!(matches!(err, MergeError::InvalidDirective { .. }));
    }

    #[test]
    fn test_validate_fragments() {
        let ok = ruql_syntax::parse(
            "{ ...A } fragment A on Cheese { ...B } fragment B on Cheese { flavor }",
        )
        .unwrap();
        assert!(validate_fragments(&ok).is_ok());

        let unused_cycle =
            ruql_syntax::parse("{ flavor } fragment A on Cheese { ...A }").unwrap();
        assert!(matches!(
            validate_fragments(&unused_cycle),
            Err(MergeError::FragmentCycle { .. })
        ));

        let missing = ruql_syntax::parse("{ cheese { ...Gone } }").unwrap();
        assert!(matches!(
            validate_fragments(&missing),
            Err(MergeError::UnknownFragment { .. })
        ));
    }

    #[test]
    fn test_selection_depth() {
        let doc = ruql_syntax::parse(
            "{ a b { c ...F } } fragment F on Cheese { d { e { f } } }",
        )
        .unwrap();
        let fragments = doc.fragments();
        let op = doc.operations().next().unwrap();
        assert_eq!(selection_depth(&op.selection_set, &fragments), 4);
    }

    /// Each fragment spreads the next one twice.
    fn doubling_chain(links: usize) -> String {
        let mut query = String::from("{ ...F0 }");
        for i in 0..links {
            query.push_str(&format!(" fragment F{i} on Cheese {{ ...F{n} ...F{n} }}", n = i + 1));
        }
        query.push_str(&format!(" fragment F{links} on Cheese {{ flavor origin {{ a }} }}"));
        query
    }

    #[test]
    fn test_doubling_fragment_chain_expands_once() {
        let query = doubling_chain(64);
        assert_eq!(
            merge_keys(&query, "Cheese", &Variables::new()).unwrap(),
            ["flavor", "origin"]
        );

        let doc = ruql_syntax::parse(&query).unwrap();
        let fragments = doc.fragments();
        let op = doc.operations().next().unwrap();
        assert!(validate_fragments(&doc).is_ok());
        assert_eq!(selection_depth(&op.selection_set, &fragments), 2);
    }
}
