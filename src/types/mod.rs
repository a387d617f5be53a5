mod binding;
mod context;
mod document;
mod error;
mod failure;
mod plan;
mod registry;
mod report;
mod rule;
mod schema;
mod value;
mod verdict;

pub use binding::{BindingTarget, DeclarationTable, RuleBindings, DECLARATION_KEY};
pub use context::Context;
pub use document::{
    Directive, Document, Field, FragmentDefinition, FragmentSpread, InlineFragment,
    OperationDefinition, OperationKind, Selection, SelectionSet, VariableDefinition,
};
pub use error::{BindError, CompileError};
pub use failure::{AuthorizationFailure, FailureKind, Phase, RuleFailure};
pub use plan::{CompiledRulePlan, PathStep, PostInstance, PreInstance, SelectionPath};
pub use registry::{RuleRegistry, RuleRegistryBuilder};
pub use report::{ExecutionReport, Stage};
pub use rule::{
    Arguments, PostInvocation, PostRule, PreInvocation, PreRule, RuleDefinition, RuleKind,
};
pub use schema::{FieldDefinition, InputValueDefinition, Schema, TypeDefinition, TypeKind, TypeRef};
pub use value::{InputValue, Variables};
pub use verdict::{RuleFault, RuleResult, Verdict};
