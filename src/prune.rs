use std::collections::HashMap;

use serde_json::Value;

use crate::compile::is_excluded;
use crate::types::{Schema, Selection, SelectionSet, Variables};

#[derive(Default)]
struct KeyUse<'a> {
    requested: bool,
    children: Vec<&'a SelectionSet>,
}

/// Remove from `data` every key that is present only because the augmentor
/// injected it, walking `selection` (the augmented selection) in step with
/// the data.
///
/// A key is kept when at least one included occurrence of it in the
/// selection was requested by the client. A type-conditioned inline fragment
/// only counts for objects whose `__typename` it applies to; objects without
/// `__typename` count every fragment. Keys the selection does not mention at
/// all are left alone, as are key order, nulls and empty lists. Pruning twice
/// gives the same result as pruning once.
pub fn prune_result(
    data: &mut Value,
    selection: &SelectionSet,
    schema: &Schema,
    variables: &Variables,
) {
    let mut stack: Vec<(&mut Value, Vec<&SelectionSet>)> = vec![(data, vec![selection])];

    while let Some((value, sets)) = stack.pop() {
        match value {
            Value::Array(items) => {
                for item in items.iter_mut() {
                    stack.push((item, sets.clone()));
                }
            }
            Value::Object(map) => {
                let typename = map
                    .get("__typename")
                    .and_then(Value::as_str)
                    .map(str::to_owned);
                let uses = key_uses(&sets, typename.as_deref(), schema, variables);
                map.retain(|key, _| uses.get(key.as_str()).map_or(true, |u| u.requested));
                for (key, child) in map.iter_mut() {
                    if let Some(key_use) = uses.get(key.as_str()) {
                        if !key_use.children.is_empty() {
                            stack.push((child, key_use.children.clone()));
                        }
                    }
                }
            }
            _ => {}
        }
    }
}

/// Merge the fields of several selection sets by response key, looking
/// through the inline fragments that apply to an object of type `typename`.
fn key_uses<'a>(
    sets: &[&'a SelectionSet],
    typename: Option<&str>,
    schema: &Schema,
    variables: &Variables,
) -> HashMap<&'a str, KeyUse<'a>> {
    let mut uses: HashMap<&str, KeyUse<'_>> = HashMap::new();
    let mut pending: Vec<&SelectionSet> = sets.to_vec();

    while let Some(set) = pending.pop() {
        for item in &set.items {
            match item {
                Selection::Field(field) => {
                    if is_excluded(&field.directives, variables) {
                        continue;
                    }
                    let entry = uses.entry(field.response_key()).or_default();
                    entry.requested |= !field.injected;
                    if !field.selection_set.is_empty() {
                        entry.children.push(&field.selection_set);
                    }
                }
                Selection::InlineFragment(fragment) => {
                    if is_excluded(&fragment.directives, variables) {
                        continue;
                    }
                    let applies = match (fragment.type_condition.as_deref(), typename) {
                        (Some(condition), Some(concrete)) => {
                            schema.condition_applies(condition, concrete)
                        }
                        _ => true,
                    };
                    if applies {
                        pending.push(&fragment.selection_set);
                    }
                }
                Selection::FragmentSpread(_) => {}
            }
        }
    }
    uses
}
