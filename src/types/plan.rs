use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use super::document::{Field, InlineFragment, Selection, SelectionSet};
use super::rule::{Arguments, RuleDefinition};

/// One step from the operation root towards a field: the response key the
/// field is stored under, and how many list levels its declared type wraps.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PathStep {
    pub key: String,
    pub list_depth: usize,
}

/// Location of a field in the selection tree, by response key.
///
/// An empty path is the operation root. A path that crosses list-typed
/// fields fans out to many concrete locations in the result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct SelectionPath {
    steps: Vec<PathStep>,
}

impl SelectionPath {
    #[must_use]
    pub fn root() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn child(&self, key: &str, list_depth: usize) -> Self {
        let mut steps = Vec::with_capacity(self.steps.len() + 1);
        steps.extend(self.steps.iter().cloned());
        steps.push(PathStep {
            key: key.to_owned(),
            list_depth,
        });
        Self { steps }
    }

    #[must_use]
    pub fn steps(&self) -> &[PathStep] {
        &self.steps
    }

    #[must_use]
    pub fn is_root(&self) -> bool {
        self.steps.is_empty()
    }

    /// Response keys only, root first.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.steps.iter().map(|step| step.key.as_str())
    }
}

impl fmt::Display for SelectionPath {
    /// `user.comments[]`: one `[]` per list level of each step.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.steps.is_empty() {
            return write!(f, "<root>");
        }
        for (i, step) in self.steps.iter().enumerate() {
            if i > 0 {
                write!(f, ".")?;
            }
            write!(f, "{}", step.key)?;
            for _ in 0..step.list_depth {
                write!(f, "[]")?;
            }
        }
        Ok(())
    }
}

/// A pre-execution rule at one field location.
#[derive(Debug, Clone)]
pub struct PreInstance {
    pub rule: Arc<RuleDefinition>,
    pub path: SelectionPath,
    pub arguments: Arc<Arguments>,
}

/// A post-execution rule at one field location; evaluated once per non-null
/// value found at `path` in the result.
///
/// With `on_type` set, only values whose `__typename` is that object type
/// are checked. Such instances come from rules bound to a concrete member
/// of an interface or union the field returns.
#[derive(Debug, Clone)]
pub struct PostInstance {
    pub rule: Arc<RuleDefinition>,
    pub path: SelectionPath,
    pub arguments: Arc<Arguments>,
    pub on_type: Option<String>,
}

impl PostInstance {
    /// Fields the rule declares it needs, relative to the bound type.
    #[must_use]
    pub fn requires(&self) -> Option<&SelectionSet> {
        self.rule.requires()
    }

    /// What has to be merged below `path` before the engine runs. A
    /// type-restricted instance needs `__typename` and gets its requirement
    /// wrapped in `... on <type>`.
    #[must_use]
    pub fn extra_selection(&self) -> Option<Cow<'_, SelectionSet>> {
        let Some(on_type) = &self.on_type else {
            return self.requires().map(Cow::Borrowed);
        };
        let mut items = vec![Selection::Field(Field::new("__typename"))];
        if let Some(requires) = self.requires() {
            items.push(Selection::InlineFragment(InlineFragment {
                type_condition: Some(on_type.clone()),
                directives: Vec::new(),
                selection_set: requires.clone(),
            }));
        }
        Some(Cow::Owned(SelectionSet { items }))
    }

    /// Whether `object` is a value this instance checks. An object without
    /// `__typename` is checked.
    #[must_use]
    pub fn matches(&self, object: &serde_json::Value) -> bool {
        match (&self.on_type, object.get("__typename").and_then(|t| t.as_str())) {
            (Some(on_type), Some(typename)) => on_type == typename,
            _ => true,
        }
    }
}

/// Rule instances for one operation. Depends only on bindings, query shape
/// and variables, never on result data.
#[derive(Debug, Clone, Default)]
pub struct CompiledRulePlan {
    pub pre: Vec<PreInstance>,
    pub post: Vec<PostInstance>,
}

impl CompiledRulePlan {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pre.is_empty() && self.post.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pre.len() + self.post.len()
    }

    /// Post instances that need fields merged into the operation, with the
    /// selection to merge.
    pub fn requirements(
        &self,
    ) -> impl Iterator<Item = (&SelectionPath, &str, Cow<'_, SelectionSet>)> {
        self.post.iter().filter_map(|instance| {
            instance
                .extra_selection()
                .map(|extra| (&instance.path, instance.rule.name(), extra))
        })
    }
}
