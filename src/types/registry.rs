use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use super::error::BindError;
use super::rule::{
    AsyncFnRule, PostInvocation, PostRule, PreInvocation, PreRule, RuleDefinition, RuleKind,
    SyncFnRule,
};
use super::verdict::RuleResult;

/// Builder for constructing a [`RuleRegistry`].
///
/// Rules are registered under unique names. Extra selections are given as
/// query text and parsed when the registry is built.
///
/// # Example
///
/// ```
/// use fieldgate::{RuleRegistryBuilder, Verdict};
///
/// let registry = RuleRegistryBuilder::new()
///     .pre_sync("IsAuthenticated", |inv| {
///         Ok(Verdict::from(inv.context.get("user.id").is_some()))
///     })
///     .post_sync_requiring("IsOwner", "{ ownerId }", |inv| {
///         let owner = inv.object.get("ownerId").and_then(|v| v.as_str());
///         Ok(Verdict::from(owner.is_some() && owner == inv.context.get_str("user.id")))
///     })
///     .build()
///     .unwrap();
///
/// assert!(registry.contains("IsOwner"));
/// ```
#[derive(Default)]
pub struct RuleRegistryBuilder {
    pending: Vec<PendingRule>,
}

enum PendingRule {
    Ready(RuleDefinition),
    Requiring {
        name: String,
        requires: String,
        rule: Arc<dyn PostRule>,
    },
}

impl PendingRule {
    fn name(&self) -> &str {
        match self {
            PendingRule::Ready(def) => def.name(),
            PendingRule::Requiring { name, .. } => name,
        }
    }
}

impl RuleRegistryBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pre-execution rule backed by an async closure.
    #[must_use]
    pub fn pre<F, Fut>(self, name: &str, f: F) -> Self
    where
        F: Fn(PreInvocation) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = RuleResult> + Send + 'static,
    {
        self.pre_rule(name, AsyncFnRule(f))
    }

    /// Register a pre-execution rule backed by a plain closure.
    #[must_use]
    pub fn pre_sync<F>(self, name: &str, f: F) -> Self
    where
        F: Fn(&PreInvocation) -> RuleResult + Send + Sync + 'static,
    {
        self.pre_rule(name, SyncFnRule(f))
    }

    /// Register a post-execution rule backed by an async closure.
    #[must_use]
    pub fn post<F, Fut>(self, name: &str, f: F) -> Self
    where
        F: Fn(PostInvocation) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = RuleResult> + Send + 'static,
    {
        self.post_rule(name, AsyncFnRule(f), None)
    }

    /// Register a post-execution rule backed by a plain closure.
    #[must_use]
    pub fn post_sync<F>(self, name: &str, f: F) -> Self
    where
        F: Fn(&PostInvocation) -> RuleResult + Send + Sync + 'static,
    {
        self.post_rule(name, SyncFnRule(f), None)
    }

    /// Register an async post-execution rule that needs `requires` fetched,
    /// e.g. `"{ ownerId team { id } }"`.
    #[must_use]
    pub fn post_requiring<F, Fut>(self, name: &str, requires: &str, f: F) -> Self
    where
        F: Fn(PostInvocation) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = RuleResult> + Send + 'static,
    {
        self.post_rule(name, AsyncFnRule(f), Some(requires))
    }

    /// Plain-closure variant of [`post_requiring`](Self::post_requiring).
    #[must_use]
    pub fn post_sync_requiring<F>(self, name: &str, requires: &str, f: F) -> Self
    where
        F: Fn(&PostInvocation) -> RuleResult + Send + Sync + 'static,
    {
        self.post_rule(name, SyncFnRule(f), Some(requires))
    }

    /// Register a custom [`PreRule`] implementation.
    #[must_use]
    pub fn pre_rule(mut self, name: &str, rule: impl PreRule + 'static) -> Self {
        self.pending.push(PendingRule::Ready(RuleDefinition::new(
            name,
            RuleKind::Pre(Arc::new(rule)),
        )));
        self
    }

    /// Register a custom [`PostRule`] implementation with an optional extra
    /// selection.
    #[must_use]
    pub fn post_rule(
        mut self,
        name: &str,
        rule: impl PostRule + 'static,
        requires: Option<&str>,
    ) -> Self {
        let rule: Arc<dyn PostRule> = Arc::new(rule);
        let pending = match requires {
            Some(text) => PendingRule::Requiring {
                name: name.to_owned(),
                requires: text.to_owned(),
                rule,
            },
            None => PendingRule::Ready(RuleDefinition::new(
                name,
                RuleKind::Post {
                    rule,
                    requires: None,
                },
            )),
        };
        self.pending.push(pending);
        self
    }

    /// Register a fully constructed definition.
    #[must_use]
    pub fn rule(mut self, definition: RuleDefinition) -> Self {
        self.pending.push(PendingRule::Ready(definition));
        self
    }

    /// Validate names, parse extra selections and freeze the registry.
    ///
    /// # Errors
    ///
    /// Returns [`BindError::DuplicateRule`] when a name is registered twice
    /// and [`BindError::MalformedRequirement`] when an extra selection does
    /// not parse or is empty.
    pub fn build(self) -> Result<RuleRegistry, BindError> {
        let mut rules = Vec::with_capacity(self.pending.len());
        let mut index: HashMap<String, usize> = HashMap::with_capacity(self.pending.len());

        for pending in self.pending {
            if index.contains_key(pending.name()) {
                return Err(BindError::DuplicateRule {
                    name: pending.name().to_owned(),
                });
            }
            let definition = match pending {
                PendingRule::Ready(def) => def,
                PendingRule::Requiring {
                    name,
                    requires,
                    rule,
                } => {
                    let selection = crate::parse::parse_selection_set(&requires).map_err(|e| {
                        BindError::MalformedRequirement {
                            rule: name.clone(),
                            message: e.to_string(),
                        }
                    })?;
                    if selection.is_empty() {
                        return Err(BindError::MalformedRequirement {
                            rule: name,
                            message: "extra selection is empty".to_owned(),
                        });
                    }
                    RuleDefinition::new(
                        name,
                        RuleKind::Post {
                            rule,
                            requires: Some(selection),
                        },
                    )
                }
            };
            index.insert(definition.name().to_owned(), rules.len());
            rules.push(Arc::new(definition));
        }

        Ok(RuleRegistry { rules, index })
    }
}

/// Immutable, name-indexed set of rule definitions. Built once, shared
/// behind `Arc` by every request.
#[derive(Debug, Default)]
pub struct RuleRegistry {
    rules: Vec<Arc<RuleDefinition>>,
    index: HashMap<String, usize>,
}

impl RuleRegistry {
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<RuleDefinition>> {
        self.index.get(name).map(|&idx| &self.rules[idx])
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Rules in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<RuleDefinition>> {
        self.rules.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
