use crate::compile::is_excluded;
use crate::types::{
    CompileError, CompiledRulePlan, Field, InlineFragment, InputValue, OperationDefinition,
    Schema, Selection, SelectionPath, SelectionSet, Variables,
};

const TYPENAME: &str = "__typename";

/// The operation actually sent to the engine: the client's selection with
/// every rule requirement merged in. Fields the client did not ask for carry
/// [`Field::injected`].
#[derive(Debug, Clone)]
pub struct AugmentedOperation {
    pub operation: OperationDefinition,
    /// Number of fields added, at any depth.
    pub injected: usize,
}

impl AugmentedOperation {
    /// Whether the operation is exactly what the client sent.
    #[must_use]
    pub fn is_unchanged(&self) -> bool {
        self.injected == 0
    }
}

/// Merge the extra selection of every post instance into `operation` at the
/// instance's path, in every selection of that path.
///
/// Wherever fields are added to a selection on an interface or union,
/// `__typename` is added too, so the pruner can tell which type-conditioned
/// fragments applied to each object.
///
/// `operation` must be the expanded operation the plan was compiled from.
pub(crate) fn augment(
    operation: &OperationDefinition,
    plan: &CompiledRulePlan,
    schema: &Schema,
    variables: &Variables,
) -> Result<AugmentedOperation, CompileError> {
    let root_type = schema
        .root_type(operation.kind)
        .ok_or_else(|| CompileError::UnknownRootType {
            kind: operation.kind.to_string(),
        })?;
    let mut augmented = operation.clone();
    let mut injected = 0;

    for (path, rule, requires) in plan.requirements() {
        let keys: Vec<&str> = path.keys().collect();
        let mut targets = Vec::new();
        locate(
            &mut augmented.selection_set,
            root_type,
            &keys,
            schema,
            variables,
            &mut targets,
        );
        if targets.is_empty() {
            tracing::debug!(%path, rule, "requirement target not selected");
            continue;
        }
        for (target, ty) in targets {
            injected += merge(target, ty, &requires, path, schema, variables)?;
        }
    }

    Ok(AugmentedOperation {
        operation: augmented,
        injected,
    })
}

/// Every included sub-selection reached by following `keys` from `set`,
/// through inline fragments, with the type it is selected on.
fn locate<'a, 's>(
    set: &'a mut SelectionSet,
    ty: &'s str,
    keys: &[&str],
    schema: &'s Schema,
    variables: &Variables,
    out: &mut Vec<(&'a mut SelectionSet, &'s str)>,
) {
    let Some((key, rest)) = keys.split_first() else {
        out.push((set, ty));
        return;
    };
    for item in &mut set.items {
        match item {
            Selection::Field(field)
                if field.response_key() == *key && !is_excluded(&field.directives, variables) =>
            {
                let Some(definition) = schema.field(ty, &field.name) else {
                    continue;
                };
                locate(
                    &mut field.selection_set,
                    definition.ty.named_type(),
                    rest,
                    schema,
                    variables,
                    out,
                );
            }
            Selection::InlineFragment(fragment) if !is_excluded(&fragment.directives, variables) => {
                let condition = match fragment.type_condition.as_deref() {
                    Some(name) => schema
                        .type_definition(name)
                        .map_or(ty, |definition| definition.name.as_str()),
                    None => ty,
                };
                locate(
                    &mut fragment.selection_set,
                    condition,
                    keys,
                    schema,
                    variables,
                    out,
                );
            }
            _ => {}
        }
    }
}

enum Existing {
    Same,
    Conflict,
    Absent,
}

fn same_arguments(a: &[(String, InputValue)], b: &[(String, InputValue)]) -> bool {
    a.len() == b.len() && a.iter().all(|entry| b.contains(entry))
}

fn same_field(client: &Field, required: &Field) -> bool {
    client.name == required.name && same_arguments(&client.arguments, &required.arguments)
}

fn same_fragment(client: &InlineFragment, required: &InlineFragment) -> bool {
    client.type_condition == required.type_condition && client.directives.is_empty()
}

/// How `required` relates to the included fields already in `items`. Only
/// fields directly in `items` satisfy it; a field of the same response key
/// inside any included inline fragment must still agree with it.
fn existing_field(items: &[Selection], required: &Field, variables: &Variables) -> Existing {
    let key = required.response_key();
    let mut found = Existing::Absent;
    for item in items {
        match item {
            Selection::Field(field) => {
                if field.response_key() != key || is_excluded(&field.directives, variables) {
                    continue;
                }
                if !same_field(field, required) {
                    return Existing::Conflict;
                }
                found = Existing::Same;
            }
            Selection::InlineFragment(fragment) => {
                if is_excluded(&fragment.directives, variables) {
                    continue;
                }
                if let Existing::Conflict =
                    existing_field(&fragment.selection_set.items, required, variables)
                {
                    return Existing::Conflict;
                }
            }
            Selection::FragmentSpread(_) => {}
        }
    }
    found
}

/// Merge `requires` into `target`, selected on type `ty`, returning how many
/// fields were added.
fn merge(
    target: &mut SelectionSet,
    ty: &str,
    requires: &SelectionSet,
    path: &SelectionPath,
    schema: &Schema,
    variables: &Variables,
) -> Result<usize, CompileError> {
    let mut injected = 0;
    let mut stack: Vec<(&mut SelectionSet, &SelectionSet, &str, String)> =
        vec![(target, requires, ty, path.to_string())];

    while let Some((target, source, ty, at)) = stack.pop() {
        let existing = target.items.len();
        let mut additions: Vec<Selection> = Vec::new();

        for item in &source.items {
            match item {
                Selection::Field(required) => {
                    match existing_field(&target.items[..existing], required, variables) {
                        Existing::Same => {}
                        Existing::Conflict => {
                            return Err(CompileError::ConflictingSelection {
                                path: at,
                                key: required.response_key().to_owned(),
                            });
                        }
                        Existing::Absent => {
                            if !matches!(
                                existing_field(&additions, required, variables),
                                Existing::Absent
                            ) {
                                continue;
                            }
                            let mut field = required.clone();
                            field.injected = true;
                            field.selection_set.mark_injected();
                            injected += 1 + field.selection_set.injected_count();
                            additions.push(Selection::Field(field));
                        }
                    }
                }
                Selection::InlineFragment(required) => {
                    let present = target.items[..existing].iter().any(|item| {
                        matches!(item, Selection::InlineFragment(f) if same_fragment(f, required))
                    });
                    if !present {
                        let mut fragment = required.clone();
                        fragment.selection_set.mark_injected();
                        injected += fragment.selection_set.injected_count();
                        additions.push(Selection::InlineFragment(fragment));
                    }
                }
                // Rejected when the registry is bound.
                Selection::FragmentSpread(_) => {}
            }
        }

        if !additions.is_empty() && schema.is_abstract(ty) {
            let typename = Field::new(TYPENAME);
            let present = !matches!(
                existing_field(&target.items[..existing], &typename, variables),
                Existing::Absent
            ) || !matches!(existing_field(&additions, &typename, variables), Existing::Absent);
            if !present {
                let mut typename = typename;
                typename.injected = true;
                injected += 1;
                additions.push(Selection::Field(typename));
            }
        }
        target.items.extend(additions);

        for item in &mut target.items[..existing] {
            match item {
                Selection::Field(field) => {
                    if is_excluded(&field.directives, variables) {
                        continue;
                    }
                    let sub = source.items.iter().find_map(|required| match required {
                        Selection::Field(required)
                            if same_field(field, required) && !required.selection_set.is_empty() =>
                        {
                            Some(&required.selection_set)
                        }
                        _ => None,
                    });
                    if let Some(sub) = sub {
                        let child_ty = schema
                            .field(ty, &field.name)
                            .map_or(ty, |definition| definition.ty.named_type());
                        let at = format!("{at}.{}", field.response_key());
                        stack.push((&mut field.selection_set, sub, child_ty, at));
                    }
                }
                Selection::InlineFragment(fragment) => {
                    let sub = source.items.iter().find_map(|required| match required {
                        Selection::InlineFragment(required) if same_fragment(fragment, required) => {
                            Some(&required.selection_set)
                        }
                        _ => None,
                    });
                    if let Some(sub) = sub {
                        let condition = match fragment.type_condition.as_deref() {
                            Some(name) => schema
                                .type_definition(name)
                                .map_or(ty, |definition| definition.name.as_str()),
                            None => ty,
                        };
                        stack.push((&mut fragment.selection_set, sub, condition, at.clone()));
                    }
                }
                Selection::FragmentSpread(_) => {}
            }
        }
    }

    Ok(injected)
}
