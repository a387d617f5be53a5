use thiserror::Error;

/// Configuration errors found while registering rules or binding them to a
/// schema. Fatal: surface at startup, never retried.
#[derive(Debug, Error)]
pub enum BindError {
    #[error("duplicate rule name '{name}'")]
    DuplicateRule { name: String },

    #[error("unknown rule '{rule}' bound to '{location}'")]
    UnknownRule { rule: String, location: String },

    #[error("rule declarations reference unknown type '{name}'")]
    UnknownType { name: String },

    #[error("rule declarations reference unknown field '{field}' on type '{parent}'")]
    UnknownField { parent: String, field: String },

    #[error("malformed @{directive} on '{location}': expected a list of rule names in `rules`")]
    MalformedDirective { directive: String, location: String },

    #[error("malformed extra selection for rule '{rule}': {message}")]
    MalformedRequirement { rule: String, message: String },

    #[error("extra selection of rule '{rule}' selects unknown field '{field}' on type '{parent}'")]
    InvalidRequirement {
        rule: String,
        parent: String,
        field: String,
    },

    #[error("rule '{rule}' requires extra fields but '{location}' returns leaf type '{type_name}'")]
    RequirementOnLeaf {
        rule: String,
        location: String,
        type_name: String,
    },

    #[error("malformed rule declarations: {0}")]
    MalformedDeclarations(String),
}

/// Errors raised while turning one request into a rule plan.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("document contains no operation")]
    NoOperation,

    #[error("unknown operation '{name}'")]
    UnknownOperation { name: String },

    #[error("document contains {count} operations; an operation name is required")]
    AmbiguousOperation { count: usize },

    #[error("unknown fragment '{name}'")]
    UnknownFragment { name: String },

    #[error("fragment cycle detected among: {}", fragments.join(", "))]
    FragmentCycle { fragments: Vec<String> },

    #[error("schema has no root type for {kind} operations")]
    UnknownRootType { kind: String },

    #[error("unknown field '{field}' on type '{parent}'")]
    UnknownField { parent: String, field: String },

    #[error("extra selection '{key}' conflicts with the client selection at '{path}'")]
    ConflictingSelection { path: String, key: String },

    #[error("rule '{rule}' is bound but not registered")]
    MissingRule { rule: String },
}
