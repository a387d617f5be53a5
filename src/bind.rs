use crate::types::{
    BindError, BindingTarget, DeclarationTable, Directive, InputValue, RuleBindings, RuleRegistry,
    Schema, Selection, SelectionSet,
};

/// Merge schema annotations and the declaration table into rule bindings,
/// then validate them against the registry.
pub(crate) fn bind(
    schema: &Schema,
    registry: &RuleRegistry,
    declarations: &DeclarationTable,
    directive: &str,
) -> Result<RuleBindings, BindError> {
    check_declared_targets(schema, declarations)?;

    let mut bindings = RuleBindings::default();
    for ty in schema.types() {
        let annotated = annotated_rules(&ty.directives, directive, &ty.name)?;
        let rules = merge(annotated, declarations.type_rules(&ty.name));
        if !rules.is_empty() {
            bindings.types.insert(ty.name.clone(), rules);
        }

        for field in &ty.fields {
            let location = format!("{}.{}", ty.name, field.name);
            let annotated = annotated_rules(&field.directives, directive, &location)?;
            let rules = merge(annotated, declarations.field_rules(&ty.name, &field.name));
            if !rules.is_empty() {
                bindings
                    .fields
                    .entry(ty.name.clone())
                    .or_default()
                    .insert(field.name.clone(), rules);
            }
        }
    }

    validate(&bindings, schema, registry)?;
    tracing::debug!(
        types = bindings.bound_type_count(),
        fields = bindings.bound_field_count(),
        "bound authorization rules"
    );
    Ok(bindings)
}

/// Check that every bound location exists, every rule is registered and every
/// extra selection fits the type it will be merged into.
pub(crate) fn validate(
    bindings: &RuleBindings,
    schema: &Schema,
    registry: &RuleRegistry,
) -> Result<(), BindError> {
    for (target, rules) in bindings.entries() {
        let bound_type = match target {
            BindingTarget::Type(ty) => {
                schema
                    .type_definition(ty)
                    .ok_or_else(|| BindError::UnknownType {
                        name: ty.to_owned(),
                    })?;
                ty
            }
            BindingTarget::Field(parent, field) => schema
                .field(parent, field)
                .ok_or_else(|| BindError::UnknownField {
                    parent: parent.to_owned(),
                    field: field.to_owned(),
                })?
                .ty
                .named_type(),
        };

        for rule in rules {
            let definition = registry.get(rule).ok_or_else(|| BindError::UnknownRule {
                rule: rule.clone(),
                location: target.to_string(),
            })?;
            if let Some(requires) = definition.requires() {
                let composite = schema
                    .type_definition(bound_type)
                    .is_some_and(|ty| ty.is_composite());
                if !composite {
                    return Err(BindError::RequirementOnLeaf {
                        rule: rule.clone(),
                        location: target.to_string(),
                        type_name: bound_type.to_owned(),
                    });
                }
                check_requirement(schema, rule, bound_type, requires)?;
            }
        }
    }
    Ok(())
}

fn check_declared_targets(schema: &Schema, declarations: &DeclarationTable) -> Result<(), BindError> {
    for (ty, _) in declarations.types() {
        if schema.type_definition(ty).is_none() {
            return Err(BindError::UnknownType { name: ty.to_owned() });
        }
    }
    for (parent, field, _) in declarations.fields() {
        let Some(ty) = schema.type_definition(parent) else {
            return Err(BindError::UnknownType {
                name: parent.to_owned(),
            });
        };
        if ty.field(field).is_none() {
            return Err(BindError::UnknownField {
                parent: parent.to_owned(),
                field: field.to_owned(),
            });
        }
    }
    Ok(())
}

/// Rule names from every `@<directive>(rules: [...])` on one node.
fn annotated_rules(
    directives: &[Directive],
    directive: &str,
    location: &str,
) -> Result<Vec<String>, BindError> {
    let mut rules = Vec::new();
    for annotation in directives.iter().filter(|d| d.name == directive) {
        let names = annotation
            .argument("rules")
            .and_then(InputValue::as_name_list)
            .ok_or_else(|| BindError::MalformedDirective {
                directive: directive.to_owned(),
                location: location.to_owned(),
            })?;
        rules.extend(names);
    }
    Ok(rules)
}

/// Annotation rules first, then table rules; first occurrence wins.
fn merge(annotated: Vec<String>, declared: &[String]) -> Vec<String> {
    let mut merged: Vec<String> = Vec::with_capacity(annotated.len() + declared.len());
    for rule in annotated.into_iter().chain(declared.iter().cloned()) {
        if !merged.contains(&rule) {
            merged.push(rule);
        }
    }
    merged
}

/// Every field of an extra selection must exist on the type it lands on.
fn check_requirement(
    schema: &Schema,
    rule: &str,
    root_type: &str,
    requires: &SelectionSet,
) -> Result<(), BindError> {
    let mut stack: Vec<(&str, &SelectionSet)> = vec![(root_type, requires)];
    while let Some((parent, set)) = stack.pop() {
        for item in &set.items {
            match item {
                Selection::Field(field) => {
                    if field.name.starts_with("__") {
                        continue;
                    }
                    let definition = schema.field(parent, &field.name).ok_or_else(|| {
                        BindError::InvalidRequirement {
                            rule: rule.to_owned(),
                            parent: parent.to_owned(),
                            field: field.name.clone(),
                        }
                    })?;
                    if !field.selection_set.is_empty() {
                        stack.push((definition.ty.named_type(), &field.selection_set));
                    }
                }
                Selection::InlineFragment(fragment) => {
                    let condition = fragment.type_condition.as_deref().unwrap_or(parent);
                    if schema.type_definition(condition).is_none() {
                        return Err(BindError::UnknownType {
                            name: condition.to_owned(),
                        });
                    }
                    stack.push((condition, &fragment.selection_set));
                }
                Selection::FragmentSpread(spread) => {
                    return Err(BindError::MalformedRequirement {
                        rule: rule.to_owned(),
                        message: format!(
                            "named fragment '{}' cannot be used in an extra selection",
                            spread.name
                        ),
                    });
                }
            }
        }
    }
    Ok(())
}
