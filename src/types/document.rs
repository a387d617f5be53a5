//! Neutral representation of executable documents.
//!
//! A [`SelectionSet`] is the selection tree the compiler, augmentor and pruner
//! walk. It carries no query-language specific state beyond what those stages
//! need: response keys, arguments, directives and nested selections.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;

use super::error::CompileError;
use super::schema::TypeRef;
use super::value::InputValue;

/// A parsed executable document: operations plus named fragments.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    pub operations: Vec<OperationDefinition>,
    pub fragments: Vec<FragmentDefinition>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Query,
    Mutation,
    Subscription,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OperationDefinition {
    pub kind: OperationKind,
    pub name: Option<String>,
    pub variables: Vec<VariableDefinition>,
    pub directives: Vec<Directive>,
    pub selection_set: SelectionSet,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariableDefinition {
    pub name: String,
    pub ty: TypeRef,
    pub default_value: Option<InputValue>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FragmentDefinition {
    pub name: String,
    pub type_condition: String,
    pub directives: Vec<Directive>,
    pub selection_set: SelectionSet,
}

/// A `@name(arg: value)` annotation on a schema or document node.
#[derive(Debug, Clone, PartialEq)]
pub struct Directive {
    pub name: String,
    pub arguments: Vec<(String, InputValue)>,
}

impl Directive {
    #[must_use]
    pub fn argument(&self, name: &str) -> Option<&InputValue> {
        self.arguments
            .iter()
            .find(|(arg, _)| arg == name)
            .map(|(_, value)| value)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectionSet {
    pub items: Vec<Selection>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    Field(Field),
    FragmentSpread(FragmentSpread),
    InlineFragment(InlineFragment),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub alias: Option<String>,
    pub name: String,
    pub arguments: Vec<(String, InputValue)>,
    pub directives: Vec<Directive>,
    pub selection_set: SelectionSet,
    /// Set by the augmentor on fields the client never asked for.
    pub injected: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FragmentSpread {
    pub name: String,
    pub directives: Vec<Directive>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InlineFragment {
    pub type_condition: Option<String>,
    pub directives: Vec<Directive>,
    pub selection_set: SelectionSet,
}

impl Field {
    /// A plain field with no alias, arguments or sub-selection.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            alias: None,
            name: name.into(),
            arguments: Vec::new(),
            directives: Vec::new(),
            selection_set: SelectionSet::default(),
            injected: false,
        }
    }

    /// The key this field's value is stored under in the result.
    #[must_use]
    pub fn response_key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

impl SelectionSet {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Number of fields marked as injected, at any depth.
    #[must_use]
    pub fn injected_count(&self) -> usize {
        let mut count = 0;
        let mut stack: Vec<&SelectionSet> = vec![self];
        while let Some(set) = stack.pop() {
            for item in &set.items {
                match item {
                    Selection::Field(field) => {
                        if field.injected {
                            count += 1;
                        }
                        stack.push(&field.selection_set);
                    }
                    Selection::InlineFragment(fragment) => stack.push(&fragment.selection_set),
                    Selection::FragmentSpread(_) => {}
                }
            }
        }
        count
    }

    /// Mark every field in this set, at any depth, as injected.
    pub(crate) fn mark_injected(&mut self) {
        let mut stack: Vec<&mut SelectionSet> = vec![self];
        while let Some(set) = stack.pop() {
            for item in &mut set.items {
                match item {
                    Selection::Field(field) => {
                        field.injected = true;
                        stack.push(&mut field.selection_set);
                    }
                    Selection::InlineFragment(fragment) => stack.push(&mut fragment.selection_set),
                    Selection::FragmentSpread(_) => {}
                }
            }
        }
    }
}

impl Document {
    /// Pick the operation to run.
    ///
    /// # Errors
    ///
    /// Returns [`CompileError`] when the document has no operations, the named
    /// operation does not exist, or no name was given for a multi-operation
    /// document.
    pub fn operation(&self, name: Option<&str>) -> Result<&OperationDefinition, CompileError> {
        match name {
            Some(name) => self
                .operations
                .iter()
                .find(|op| op.name.as_deref() == Some(name))
                .ok_or_else(|| CompileError::UnknownOperation {
                    name: name.to_owned(),
                }),
            None => match self.operations.as_slice() {
                [] => Err(CompileError::NoOperation),
                [only] => Ok(only),
                _ => Err(CompileError::AmbiguousOperation {
                    count: self.operations.len(),
                }),
            },
        }
    }

    #[must_use]
    pub fn fragment(&self, name: &str) -> Option<&FragmentDefinition> {
        self.fragments.iter().find(|f| f.name == name)
    }

    /// Return the selected operation with every fragment spread replaced by an
    /// inline fragment carrying the referenced selection set.
    ///
    /// # Errors
    ///
    /// Returns [`CompileError`] for unknown operations or fragments and for
    /// fragment spreads that form a cycle.
    pub fn expand_operation(
        &self,
        name: Option<&str>,
    ) -> Result<OperationDefinition, CompileError> {
        let operation = self.operation(name)?;
        self.check_fragments()?;

        let mut expanded = operation.clone();
        let mut stack: Vec<&mut SelectionSet> = vec![&mut expanded.selection_set];
        while let Some(set) = stack.pop() {
            for item in &mut set.items {
                if let Selection::FragmentSpread(spread) = item {
                    let fragment =
                        self.fragment(&spread.name)
                            .ok_or_else(|| CompileError::UnknownFragment {
                                name: spread.name.clone(),
                            })?;
                    let mut directives = spread.directives.clone();
                    directives.extend(fragment.directives.iter().cloned());
                    *item = Selection::InlineFragment(InlineFragment {
                        type_condition: Some(fragment.type_condition.clone()),
                        directives,
                        selection_set: fragment.selection_set.clone(),
                    });
                }
            }
            for item in &mut set.items {
                match item {
                    Selection::Field(field) => stack.push(&mut field.selection_set),
                    Selection::InlineFragment(fragment) => stack.push(&mut fragment.selection_set),
                    Selection::FragmentSpread(_) => {}
                }
            }
        }
        Ok(expanded)
    }

    /// Kahn's algorithm over the fragment spread graph: every fragment must be
    /// defined and no fragment may reach itself.
    fn check_fragments(&self) -> Result<(), CompileError> {
        let defined: HashSet<&str> = self.fragments.iter().map(|f| f.name.as_str()).collect();

        let mut in_degree: HashMap<&str, usize> = HashMap::new();
        let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
        for fragment in &self.fragments {
            in_degree.entry(fragment.name.as_str()).or_insert(0);
            for spread in spreads_in(&fragment.selection_set) {
                if !defined.contains(spread) {
                    return Err(CompileError::UnknownFragment {
                        name: spread.to_owned(),
                    });
                }
                // `fragment` can only be expanded after `spread` is
                dependents
                    .entry(spread)
                    .or_default()
                    .push(fragment.name.as_str());
                *in_degree.entry(fragment.name.as_str()).or_insert(0) += 1;
            }
        }

        let mut queue: VecDeque<&str> = in_degree
            .iter()
            .filter(|(_, deg)| **deg == 0)
            .map(|(name, _)| *name)
            .collect();
        let mut sorted = 0;
        while let Some(name) = queue.pop_front() {
            if let Some(deps) = dependents.get(name) {
                for dependent in deps {
                    if let Some(deg) = in_degree.get_mut(dependent) {
                        *deg -= 1;
                        if *deg == 0 {
                            queue.push_back(*dependent);
                        }
                    }
                }
            }
            sorted += 1;
        }

        if sorted != in_degree.len() {
            let mut cyclic: Vec<String> = in_degree
                .into_iter()
                .filter(|(_, deg)| *deg > 0)
                .map(|(name, _)| name.to_owned())
                .collect();
            cyclic.sort();
            return Err(CompileError::FragmentCycle { fragments: cyclic });
        }
        Ok(())
    }
}

fn spreads_in(set: &SelectionSet) -> Vec<&str> {
    let mut out = Vec::new();
    let mut stack = vec![set];
    while let Some(set) = stack.pop() {
        for item in &set.items {
            match item {
                Selection::Field(field) => stack.push(&field.selection_set),
                Selection::InlineFragment(fragment) => stack.push(&fragment.selection_set),
                Selection::FragmentSpread(spread) => out.push(spread.name.as_str()),
            }
        }
    }
    out
}

// -- Printing ---------------------------------------------------------------

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::Query => write!(f, "query"),
            OperationKind::Mutation => write!(f, "mutation"),
            OperationKind::Subscription => write!(f, "subscription"),
        }
    }
}

fn write_arguments(f: &mut fmt::Formatter<'_>, arguments: &[(String, InputValue)]) -> fmt::Result {
    if arguments.is_empty() {
        return Ok(());
    }
    write!(f, "(")?;
    for (i, (name, value)) in arguments.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{name}: {value}")?;
    }
    write!(f, ")")
}

fn write_directives(f: &mut fmt::Formatter<'_>, directives: &[Directive]) -> fmt::Result {
    for directive in directives {
        write!(f, " {directive}")?;
    }
    Ok(())
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.name)?;
        write_arguments(f, &self.arguments)
    }
}

impl fmt::Display for SelectionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for item in &self.items {
            write!(f, " {item}")?;
        }
        write!(f, " }}")
    }
}

impl fmt::Display for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selection::Field(field) => {
                if let Some(alias) = &field.alias {
                    write!(f, "{alias}: ")?;
                }
                write!(f, "{}", field.name)?;
                write_arguments(f, &field.arguments)?;
                write_directives(f, &field.directives)?;
                if !field.selection_set.is_empty() {
                    write!(f, " {}", field.selection_set)?;
                }
                Ok(())
            }
            Selection::FragmentSpread(spread) => {
                write!(f, "...{}", spread.name)?;
                write_directives(f, &spread.directives)
            }
            Selection::InlineFragment(fragment) => {
                write!(f, "...")?;
                if let Some(ty) = &fragment.type_condition {
                    write!(f, " on {ty}")?;
                }
                write_directives(f, &fragment.directives)?;
                write!(f, " {}", fragment.selection_set)
            }
        }
    }
}

impl fmt::Display for OperationDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(name) = &self.name {
            write!(f, " {name}")?;
        }
        if !self.variables.is_empty() {
            write!(f, "(")?;
            for (i, var) in self.variables.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "${}: {}", var.name, var.ty)?;
                if let Some(default) = &var.default_value {
                    write!(f, " = {default}")?;
                }
            }
            write!(f, ")")?;
        }
        write_directives(f, &self.directives)?;
        write!(f, " {}", self.selection_set)
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for operation in &self.operations {
            if !first {
                writeln!(f)?;
            }
            first = false;
            write!(f, "{operation}")?;
        }
        for fragment in &self.fragments {
            if !first {
                writeln!(f)?;
            }
            first = false;
            write!(
                f,
                "fragment {} on {}",
                fragment.name, fragment.type_condition
            )?;
            write_directives(f, &fragment.directives)?;
            write!(f, " {}", fragment.selection_set)?;
        }
        Ok(())
    }
}
