use winnow::combinator::{alt, cut_err, eof, opt, preceded, repeat};
use winnow::error::{ModalResult, StrContext, StrContextValue};
use winnow::prelude::*;

use crate::types::{
    Document, Field, FragmentDefinition, FragmentSpread, InlineFragment, OperationDefinition,
    OperationKind, Selection, SelectionSet, VariableDefinition,
};

use super::grammar::{
    arguments, const_directives, const_value, directives, keyword, name, spaced_name, type_ref, ws,
};

// -- Selections -------------------------------------------------------------

fn field(input: &mut &str) -> ModalResult<Selection> {
    let first = name(input)?;
    let aliased = opt(preceded((ws, ':'), cut_err(spaced_name))).parse_next(input)?;
    let (alias, field_name) = match aliased {
        Some(target) => (Some(first.to_owned()), target),
        None => (None, first),
    };
    let arguments = arguments(input)?;
    let directives = directives(input)?;
    let selection_set = opt(selection_set).parse_next(input)?.unwrap_or_default();
    Ok(Selection::Field(Field {
        alias,
        name: field_name.to_owned(),
        arguments,
        directives,
        selection_set,
        injected: false,
    }))
}

fn fragment_selection(input: &mut &str) -> ModalResult<Selection> {
    "...".parse_next(input)?;

    if opt(|i: &mut &str| keyword(i, "on")).parse_next(input)?.is_some() {
        let type_condition = cut_err(spaced_name).parse_next(input)?;
        let directives = directives(input)?;
        let selection_set = cut_err(selection_set).parse_next(input)?;
        return Ok(Selection::InlineFragment(InlineFragment {
            type_condition: Some(type_condition.to_owned()),
            directives,
            selection_set,
        }));
    }

    if let Some(fragment) = opt(spaced_name).parse_next(input)? {
        let directives = directives(input)?;
        return Ok(Selection::FragmentSpread(FragmentSpread {
            name: fragment.to_owned(),
            directives,
        }));
    }

    let directives = directives(input)?;
    let selection_set = cut_err(selection_set).parse_next(input)?;
    Ok(Selection::InlineFragment(InlineFragment {
        type_condition: None,
        directives,
        selection_set,
    }))
}

fn selection(input: &mut &str) -> ModalResult<Selection> {
    ws.parse_next(input)?;
    alt((fragment_selection, field)).parse_next(input)
}

fn selections(input: &mut &str) -> ModalResult<SelectionSet> {
    let items: Vec<Selection> = repeat(1.., selection)
        .context(StrContext::Expected(StrContextValue::Description(
            "selection",
        )))
        .parse_next(input)?;
    Ok(SelectionSet { items })
}

/// `{ selection ... }`
pub(super) fn selection_set(input: &mut &str) -> ModalResult<SelectionSet> {
    preceded(ws, '{').parse_next(input)?;
    let set = cut_err(selections).parse_next(input)?;
    ws.parse_next(input)?;
    cut_err('}')
        .context(StrContext::Expected(StrContextValue::CharLiteral('}')))
        .parse_next(input)?;
    Ok(set)
}

/// A standalone selection, with or without the surrounding braces.
pub(super) fn bare_selection_set(input: &mut &str) -> ModalResult<SelectionSet> {
    ws.parse_next(input)?;
    let set = if input.starts_with('{') {
        selection_set(input)?
    } else {
        selections(input)?
    };
    ws.parse_next(input)?;
    eof.parse_next(input)?;
    Ok(set)
}

// -- Definitions ------------------------------------------------------------

fn operation_kind(input: &mut &str) -> ModalResult<OperationKind> {
    alt((
        (|i: &mut &str| keyword(i, "query")).value(OperationKind::Query),
        (|i: &mut &str| keyword(i, "mutation")).value(OperationKind::Mutation),
        (|i: &mut &str| keyword(i, "subscription")).value(OperationKind::Subscription),
    ))
    .parse_next(input)
}

fn variable_definition(input: &mut &str) -> ModalResult<VariableDefinition> {
    preceded(ws, '$').parse_next(input)?;
    let var = cut_err(name).parse_next(input)?;
    ws.parse_next(input)?;
    cut_err(':').parse_next(input)?;
    let ty = cut_err(type_ref).parse_next(input)?;
    let default_value = opt(preceded((ws, '='), cut_err(const_value))).parse_next(input)?;
    // Variable directives carry nothing the pipeline uses.
    let _ = const_directives(input)?;
    Ok(VariableDefinition {
        name: var.to_owned(),
        ty,
        default_value,
    })
}

fn variable_definitions(input: &mut &str) -> ModalResult<Vec<VariableDefinition>> {
    preceded(ws, '(').parse_next(input)?;
    let vars: Vec<VariableDefinition> =
        cut_err(repeat(1.., variable_definition)).parse_next(input)?;
    ws.parse_next(input)?;
    cut_err(')').parse_next(input)?;
    Ok(vars)
}

fn operation(input: &mut &str) -> ModalResult<OperationDefinition> {
    let kind = operation_kind(input)?;
    let op_name = opt(spaced_name).parse_next(input)?;
    let variables = opt(variable_definitions)
        .parse_next(input)?
        .unwrap_or_default();
    let directives = directives(input)?;
    let selection_set = cut_err(selection_set).parse_next(input)?;
    Ok(OperationDefinition {
        kind,
        name: op_name.map(str::to_owned),
        variables,
        directives,
        selection_set,
    })
}

fn shorthand_query(input: &mut &str) -> ModalResult<OperationDefinition> {
    let selection_set = selection_set(input)?;
    Ok(OperationDefinition {
        kind: OperationKind::Query,
        name: None,
        variables: Vec::new(),
        directives: Vec::new(),
        selection_set,
    })
}

fn fragment_definition(input: &mut &str) -> ModalResult<FragmentDefinition> {
    keyword(input, "fragment")?;
    let fragment = cut_err(spaced_name).parse_next(input)?;
    cut_err(|i: &mut &str| keyword(i, "on"))
        .context(StrContext::Expected(StrContextValue::StringLiteral("on")))
        .parse_next(input)?;
    let type_condition = cut_err(spaced_name).parse_next(input)?;
    let directives = directives(input)?;
    let selection_set = cut_err(selection_set).parse_next(input)?;
    Ok(FragmentDefinition {
        name: fragment.to_owned(),
        type_condition: type_condition.to_owned(),
        directives,
        selection_set,
    })
}

enum Definition {
    Operation(OperationDefinition),
    Fragment(FragmentDefinition),
}

fn definition(input: &mut &str) -> ModalResult<Definition> {
    ws.parse_next(input)?;
    alt((
        operation.map(Definition::Operation),
        fragment_definition.map(Definition::Fragment),
        shorthand_query.map(Definition::Operation),
    ))
    .parse_next(input)
}

pub(super) fn document(input: &mut &str) -> ModalResult<Document> {
    let definitions: Vec<Definition> = repeat(1.., definition)
        .context(StrContext::Expected(StrContextValue::Description(
            "operation or fragment",
        )))
        .parse_next(input)?;
    ws.parse_next(input)?;
    eof.parse_next(input)?;

    let mut doc = Document::default();
    for definition in definitions {
        match definition {
            Definition::Operation(op) => doc.operations.push(op),
            Definition::Fragment(fragment) => doc.fragments.push(fragment),
        }
    }
    Ok(doc)
}
