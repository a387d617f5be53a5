#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use fieldgate::{
    Directive, Engine, EngineError, EngineRequest, PostInvocation, PreInvocation, Response,
    RuleResult, Schema, Selection, SelectionSet, Variables, Verdict,
};
use serde_json::{Map, Value};

pub const SCHEMA: &str = r#"
    type Query {
        user(id: ID): User
        users: [User]
        comments: [Comment]
        emptyComments: [Comment]
        likesListOfLists: [[[Like]]]
    }

    type Mutation {
        deleteComment(id: ID!): Comment
    }

    type User {
        id: ID!
        name: String
        email: String
        comments(first: Int = 10): [Comment]
        posts: [Post]
    }

    type Post {
        id: ID!
        title: String
        comments: [Comment]
    }

    type Comment {
        id: ID!
        body: String
        ownerId: ID
        author: User
    }

    type Like {
        id: ID!
        ownerId: ID
    }
"#;

/// Serves a fixed data tree, returning only what the operation selects,
/// like a real engine resolving fields one by one.
pub struct FixtureEngine {
    data: Value,
    errors: Vec<EngineError>,
    calls: AtomicUsize,
    queries: Mutex<Vec<String>>,
}

impl FixtureEngine {
    pub fn new(data: Value) -> Self {
        Self {
            data,
            errors: Vec::new(),
            calls: AtomicUsize::new(0),
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn with_errors(mut self, errors: Vec<EngineError>) -> Self {
        self.errors = errors;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Query text of every operation received, oldest first.
    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl Engine for FixtureEngine {
    async fn execute(&self, request: EngineRequest<'_>) -> Response {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let operation = match request.document.expand_operation(request.operation_name) {
            Ok(operation) => operation,
            Err(err) => {
                return Response {
                    data: None,
                    errors: vec![EngineError::new(err.to_string())],
                }
            }
        };
        self.queries.lock().unwrap().push(operation.to_string());
        Response {
            data: Some(
                Projection {
                    variables: request.variables,
                    schema: Some(request.schema),
                }
                .value(&self.data, &operation.selection_set),
            ),
            errors: self.errors.clone(),
        }
    }
}

/// Copy the parts of `source` that `selection` asks for, keyed by response
/// key. Arguments are ignored; `@skip` and `@include` are honoured.
pub fn project(source: &Value, selection: &SelectionSet, variables: &Variables) -> Value {
    Projection {
        variables,
        schema: None,
    }
    .value(source, selection)
}

/// With a schema, inline fragments only apply to objects whose `__typename`
/// matches their type condition.
struct Projection<'a> {
    variables: &'a Variables,
    schema: Option<&'a Schema>,
}

impl Projection<'_> {
    fn value(&self, source: &Value, selection: &SelectionSet) -> Value {
        match source {
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|item| self.value(item, selection))
                    .collect(),
            ),
            Value::Object(fields) => {
                let mut out = Map::new();
                self.object(fields, selection, &mut out);
                Value::Object(out)
            }
            other => other.clone(),
        }
    }

    fn object(&self, fields: &Map<String, Value>, selection: &SelectionSet, out: &mut Map<String, Value>) {
        for item in &selection.items {
            match item {
                Selection::Field(field) if excluded(&field.directives, self.variables) => {}
                Selection::Field(field) => {
                    let value = match fields.get(&field.name) {
                        Some(value) if field.selection_set.is_empty() => value.clone(),
                        Some(value) => self.value(value, &field.selection_set),
                        None => Value::Null,
                    };
                    let key = field.response_key().to_owned();
                    match (out.get_mut(&key), value) {
                        (Some(Value::Object(existing)), Value::Object(more)) => existing.extend(more),
                        (_, value) => {
                            out.insert(key, value);
                        }
                    }
                }
                Selection::InlineFragment(fragment)
                    if excluded(&fragment.directives, self.variables)
                        || !self.applies(fragment.type_condition.as_deref(), fields) => {}
                Selection::InlineFragment(fragment) => {
                    self.object(fields, &fragment.selection_set, out);
                }
                // Operations are expanded before projection.
                Selection::FragmentSpread(_) => {}
            }
        }
    }

    fn applies(&self, condition: Option<&str>, fields: &Map<String, Value>) -> bool {
        let typename = fields.get("__typename").and_then(Value::as_str);
        match (condition, typename, self.schema) {
            (Some(condition), Some(typename), Some(schema)) => {
                condition == typename
                    || schema
                        .type_definition(typename)
                        .is_some_and(|ty| ty.interfaces.iter().any(|i| i == condition))
                    || schema
                        .type_definition(condition)
                        .is_some_and(|ty| ty.members.iter().any(|m| m == typename))
            }
            _ => true,
        }
    }
}

fn excluded(directives: &[Directive], variables: &Variables) -> bool {
    directives.iter().any(|directive| {
        let condition = directive
            .argument("if")
            .and_then(|value| value.resolve(variables))
            .and_then(|value| value.as_bool());
        match directive.name.as_str() {
            "skip" => condition == Some(true),
            "include" => condition == Some(false),
            _ => false,
        }
    })
}

/// A post rule that counts its calls and always returns `allow`.
pub fn counting_post(
    allow: bool,
) -> (
    Arc<AtomicUsize>,
    impl Fn(&PostInvocation) -> RuleResult + Send + Sync + 'static,
) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let rule = move |_: &PostInvocation| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(Verdict::from(allow))
    };
    (calls, rule)
}

/// A pre rule that counts its calls and always returns `allow`.
pub fn counting_pre(
    allow: bool,
) -> (
    Arc<AtomicUsize>,
    impl Fn(&PreInvocation) -> RuleResult + Send + Sync + 'static,
) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let rule = move |_: &PreInvocation| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(Verdict::from(allow))
    };
    (calls, rule)
}

pub fn count(calls: &Arc<AtomicUsize>) -> usize {
    calls.load(Ordering::SeqCst)
}
