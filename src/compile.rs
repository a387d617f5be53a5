use std::collections::HashSet;
use std::sync::Arc;

use serde_json::Value;

use crate::types::{
    Arguments, CompileError, CompiledRulePlan, Directive, Field, FieldDefinition,
    OperationDefinition, PostInstance, PreInstance, RuleBindings, RuleRegistry, Schema, Selection,
    SelectionPath, Variables,
};

/// Walk one expanded operation and emit a rule instance for every bound rule
/// at every selected field, in document order.
///
/// `operation` must have its fragment spreads expanded and `variables` must
/// already include operation defaults.
pub(crate) fn compile(
    operation: &OperationDefinition,
    schema: &Schema,
    bindings: &RuleBindings,
    registry: &RuleRegistry,
    variables: &Variables,
) -> Result<CompiledRulePlan, CompileError> {
    let root_type = schema
        .root_type(operation.kind)
        .filter(|name| schema.type_definition(name).is_some())
        .ok_or_else(|| CompileError::UnknownRootType {
            kind: operation.kind.to_string(),
        })?;

    let mut builder = PlanBuilder {
        registry,
        plan: CompiledRulePlan::default(),
        seen: HashSet::new(),
    };

    let root = SelectionPath::root();
    let no_arguments = Arc::new(Arguments::new());
    for rule in bindings.rules_at(None, root_type) {
        builder.emit(rule, &root, &no_arguments, None)?;
    }

    // Children are pushed in reverse so instances come out in document order.
    let mut stack: Vec<Step<'_>> = operation
        .selection_set
        .items
        .iter()
        .rev()
        .map(|item| Step {
            parent: root_type,
            selection: item,
            path: root.clone(),
            enclosing: None,
        })
        .collect();

    while let Some(Step {
        parent,
        selection,
        path,
        enclosing,
    }) = stack.pop()
    {
        match selection {
            Selection::Field(field) => {
                if is_excluded(&field.directives, variables) || field.name.starts_with("__") {
                    continue;
                }
                let definition =
                    schema
                        .field(parent, &field.name)
                        .ok_or_else(|| CompileError::UnknownField {
                            parent: parent.to_owned(),
                            field: field.name.clone(),
                        })?;
                let return_type = definition.ty.named_type();
                let field_path = path.child(field.response_key(), definition.ty.list_depth());

                let rules = bindings.rules_at(Some((parent, &field.name)), return_type);
                let members = member_post_rules(schema, bindings, registry, return_type)?;
                if !rules.is_empty() || !members.is_empty() {
                    let arguments = Arc::new(resolve_arguments(field, definition, variables));
                    for rule in &rules {
                        builder.emit(rule, &field_path, &arguments, None)?;
                    }
                    for (member, rule) in members {
                        // Already checked on every value at this path.
                        if rules.contains(&rule) {
                            continue;
                        }
                        builder.emit(rule, &field_path, &arguments, Some(member))?;
                    }
                }

                for child in field.selection_set.items.iter().rev() {
                    stack.push(Step {
                        parent: return_type,
                        selection: child,
                        path: field_path.clone(),
                        enclosing: Some((field, definition)),
                    });
                }
            }
            Selection::InlineFragment(fragment) => {
                if is_excluded(&fragment.directives, variables) {
                    continue;
                }
                let condition = fragment.type_condition.as_deref().unwrap_or(parent);
                if condition != parent && schema.is_abstract(parent) {
                    // Pre rules cannot see the runtime type; a fragment that
                    // names a member is the client asking for that member.
                    let mut arguments = None;
                    for rule in bindings.type_rules(condition) {
                        if !builder.is_pre(rule)? {
                            continue;
                        }
                        let arguments = arguments.get_or_insert_with(|| match enclosing {
                            Some((field, definition)) => {
                                Arc::new(resolve_arguments(field, definition, variables))
                            }
                            None => Arc::clone(&no_arguments),
                        });
                        builder.emit(rule, &path, arguments, None)?;
                    }
                }
                for child in fragment.selection_set.items.iter().rev() {
                    stack.push(Step {
                        parent: condition,
                        selection: child,
                        path: path.clone(),
                        enclosing,
                    });
                }
            }
            Selection::FragmentSpread(spread) => {
                return Err(CompileError::UnknownFragment {
                    name: spread.name.clone(),
                });
            }
        }
    }

    Ok(builder.plan)
}

/// One selection waiting to be walked, with the type it is selected on and
/// the field it sits in.
struct Step<'a> {
    parent: &'a str,
    selection: &'a Selection,
    path: SelectionPath,
    enclosing: Option<(&'a Field, &'a FieldDefinition)>,
}

/// Post rules bound to the concrete members of an abstract `return_type`.
/// Rules already bound to `return_type` itself are left to the caller.
fn member_post_rules<'a>(
    schema: &'a Schema,
    bindings: &'a RuleBindings,
    registry: &RuleRegistry,
    return_type: &str,
) -> Result<Vec<(&'a str, &'a str)>, CompileError> {
    if !schema.is_abstract(return_type) {
        return Ok(Vec::new());
    }
    let mut out = Vec::new();
    for member in schema.possible_types(return_type) {
        for rule in bindings.type_rules(member) {
            let definition = registry
                .get(rule)
                .ok_or_else(|| CompileError::MissingRule { rule: rule.clone() })?;
            if !definition.is_pre() {
                out.push((member, rule.as_str()));
            }
        }
    }
    Ok(out)
}

struct PlanBuilder<'a> {
    registry: &'a RuleRegistry,
    plan: CompiledRulePlan,
    /// One instance per rule, response path and runtime type, however often
    /// the path is selected.
    seen: HashSet<(String, SelectionPath, Option<String>)>,
}

impl PlanBuilder<'_> {
    fn is_pre(&self, rule: &str) -> Result<bool, CompileError> {
        self.registry
            .get(rule)
            .map(|definition| definition.is_pre())
            .ok_or_else(|| CompileError::MissingRule {
                rule: rule.to_owned(),
            })
    }

    fn emit(
        &mut self,
        rule: &str,
        path: &SelectionPath,
        arguments: &Arc<Arguments>,
        on_type: Option<&str>,
    ) -> Result<(), CompileError> {
        let definition = self
            .registry
            .get(rule)
            .ok_or_else(|| CompileError::MissingRule {
                rule: rule.to_owned(),
            })?;
        let on_type = on_type.map(str::to_owned);
        if !self
            .seen
            .insert((rule.to_owned(), path.clone(), on_type.clone()))
        {
            return Ok(());
        }
        if definition.is_pre() {
            self.plan.pre.push(PreInstance {
                rule: Arc::clone(definition),
                path: path.clone(),
                arguments: Arc::clone(arguments),
            });
        } else {
            self.plan.post.push(PostInstance {
                rule: Arc::clone(definition),
                path: path.clone(),
                arguments: Arc::clone(arguments),
                on_type,
            });
        }
        Ok(())
    }
}

/// Written arguments resolved against the variables, in written order,
/// followed by schema defaults for arguments left out. An argument bound to
/// a missing variable falls back to its default or is omitted.
pub(crate) fn resolve_arguments(
    field: &Field,
    definition: &FieldDefinition,
    variables: &Variables,
) -> Arguments {
    let mut resolved = Arguments::new();
    for (name, value) in &field.arguments {
        if let Some(value) = value.resolve(variables) {
            resolved.insert(name.clone(), value);
        }
    }
    for argument in &definition.arguments {
        if resolved.contains_key(&argument.name) {
            continue;
        }
        if let Some(default) = argument
            .default_value
            .as_ref()
            .and_then(|default| default.resolve(variables))
        {
            resolved.insert(argument.name.clone(), default);
        }
    }
    resolved
}

/// Request variables with operation defaults filled in for any left out.
pub(crate) fn coerce_variables(operation: &OperationDefinition, provided: &Variables) -> Variables {
    let mut variables = provided.clone();
    let empty = Variables::new();
    for definition in &operation.variables {
        if variables.contains_key(&definition.name) {
            continue;
        }
        if let Some(default) = definition
            .default_value
            .as_ref()
            .and_then(|default| default.resolve(&empty))
        {
            variables.insert(definition.name.clone(), default);
        }
    }
    variables
}

/// `@skip(if: true)` or `@include(if: false)`.
pub(crate) fn is_excluded(directives: &[Directive], variables: &Variables) -> bool {
    directives.iter().any(|directive| {
        let condition = directive
            .argument("if")
            .and_then(|value| value.resolve(variables))
            .and_then(|value| Value::as_bool(&value));
        match directive.name.as_str() {
            "skip" => condition == Some(true),
            "include" => condition == Some(false),
            _ => false,
        }
    })
}
