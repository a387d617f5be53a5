use std::collections::HashMap;
use std::fmt;

use super::document::{Directive, OperationKind};
use super::value::InputValue;

const BUILTIN_SCALARS: [&str; 5] = ["Int", "Float", "String", "Boolean", "ID"];

/// A type reference with its list and non-null wrappers, e.g. `[[Like!]]!`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeRef {
    Named(String),
    List(Box<TypeRef>),
    NonNull(Box<TypeRef>),
}

impl TypeRef {
    pub fn named(name: impl Into<String>) -> Self {
        TypeRef::Named(name.into())
    }

    /// The innermost named type, with every list and non-null wrapper removed.
    #[must_use]
    pub fn named_type(&self) -> &str {
        let mut current = self;
        loop {
            match current {
                TypeRef::Named(name) => return name.as_str(),
                TypeRef::List(inner) | TypeRef::NonNull(inner) => current = inner.as_ref(),
            }
        }
    }

    /// Number of list wrappers between this reference and its named type.
    #[must_use]
    pub fn list_depth(&self) -> usize {
        let mut depth = 0;
        let mut current = self;
        loop {
            match current {
                TypeRef::Named(_) => return depth,
                TypeRef::List(inner) => {
                    depth += 1;
                    current = inner.as_ref();
                }
                TypeRef::NonNull(inner) => current = inner.as_ref(),
            }
        }
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeRef::Named(name) => write!(f, "{name}"),
            TypeRef::List(inner) => write!(f, "[{inner}]"),
            TypeRef::NonNull(inner) => write!(f, "{inner}!"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    Object,
    Interface,
    Union,
    Enum,
    Scalar,
    InputObject,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeDefinition {
    pub name: String,
    pub kind: TypeKind,
    pub directives: Vec<Directive>,
    pub fields: Vec<FieldDefinition>,
    pub interfaces: Vec<String>,
    /// Union members.
    pub members: Vec<String>,
    pub enum_values: Vec<String>,
}

impl TypeDefinition {
    pub fn new(name: impl Into<String>, kind: TypeKind) -> Self {
        Self {
            name: name.into(),
            kind,
            directives: Vec::new(),
            fields: Vec::new(),
            interfaces: Vec::new(),
            members: Vec::new(),
            enum_values: Vec::new(),
        }
    }

    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Whether values of this type carry a sub-selection.
    #[must_use]
    pub fn is_composite(&self) -> bool {
        matches!(
            self.kind,
            TypeKind::Object | TypeKind::Interface | TypeKind::Union
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldDefinition {
    pub name: String,
    pub arguments: Vec<InputValueDefinition>,
    pub ty: TypeRef,
    pub directives: Vec<Directive>,
}

/// A field argument or input object field declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct InputValueDefinition {
    pub name: String,
    pub ty: TypeRef,
    pub default_value: Option<InputValue>,
    pub directives: Vec<Directive>,
}

/// Type information the compiler resolves field return types against.
///
/// Types keep their definition order so that binding, and everything derived
/// from it, is deterministic.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    types: Vec<TypeDefinition>,
    index: HashMap<String, usize>,
    query_type: String,
    mutation_type: Option<String>,
    subscription_type: Option<String>,
}

impl Schema {
    /// Build a schema from type definitions. Built-in scalars are added when
    /// missing; root types default to `Query`, `Mutation` and `Subscription`
    /// when those types exist.
    #[must_use]
    pub fn new(types: Vec<TypeDefinition>) -> Self {
        let mut schema = Self {
            types: Vec::new(),
            index: HashMap::new(),
            query_type: "Query".to_owned(),
            mutation_type: None,
            subscription_type: None,
        };
        for ty in types {
            schema.add_type(ty);
        }
        for scalar in BUILTIN_SCALARS {
            if !schema.index.contains_key(scalar) {
                schema.add_type(TypeDefinition::new(scalar, TypeKind::Scalar));
            }
        }
        if schema.index.contains_key("Mutation") {
            schema.mutation_type = Some("Mutation".to_owned());
        }
        if schema.index.contains_key("Subscription") {
            schema.subscription_type = Some("Subscription".to_owned());
        }
        schema
    }

    /// Parse schema definition language text.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError`](crate::parse::ParseError) on invalid syntax.
    pub fn parse(sdl: &str) -> Result<Self, crate::parse::ParseError> {
        crate::parse::parse_schema(sdl)
    }

    /// Merge a type definition in. A second definition with the same name
    /// extends the first (fields, directives, interfaces, members and values
    /// are appended).
    pub fn add_type(&mut self, ty: TypeDefinition) {
        if let Some(&idx) = self.index.get(&ty.name) {
            let existing = &mut self.types[idx];
            existing.directives.extend(ty.directives);
            existing.fields.extend(ty.fields);
            existing.interfaces.extend(ty.interfaces);
            existing.members.extend(ty.members);
            existing.enum_values.extend(ty.enum_values);
        } else {
            self.index.insert(ty.name.clone(), self.types.len());
            self.types.push(ty);
        }
    }

    pub fn set_root_type(&mut self, kind: OperationKind, name: impl Into<String>) {
        let name = name.into();
        match kind {
            OperationKind::Query => self.query_type = name,
            OperationKind::Mutation => self.mutation_type = Some(name),
            OperationKind::Subscription => self.subscription_type = Some(name),
        }
    }

    #[must_use]
    pub fn root_type(&self, kind: OperationKind) -> Option<&str> {
        match kind {
            OperationKind::Query => Some(self.query_type.as_str()),
            OperationKind::Mutation => self.mutation_type.as_deref(),
            OperationKind::Subscription => self.subscription_type.as_deref(),
        }
    }

    #[must_use]
    pub fn type_definition(&self, name: &str) -> Option<&TypeDefinition> {
        self.index.get(name).map(|&idx| &self.types[idx])
    }

    /// Look up `parent.field`.
    #[must_use]
    pub fn field(&self, parent: &str, field: &str) -> Option<&FieldDefinition> {
        self.type_definition(parent)?.field(field)
    }

    /// All types in definition order.
    pub fn types(&self) -> impl Iterator<Item = &TypeDefinition> {
        self.types.iter()
    }

    /// Interfaces and unions.
    #[must_use]
    pub fn is_abstract(&self, name: &str) -> bool {
        self.type_definition(name)
            .is_some_and(|ty| matches!(ty.kind, TypeKind::Interface | TypeKind::Union))
    }

    /// Object types a value of type `name` can have at runtime: the type
    /// itself for objects, the members of a union, and every implementor of
    /// an interface, in definition order.
    #[must_use]
    pub fn possible_types(&self, name: &str) -> Vec<&str> {
        let Some(ty) = self.type_definition(name) else {
            return Vec::new();
        };
        match ty.kind {
            TypeKind::Object => vec![ty.name.as_str()],
            TypeKind::Union => ty
                .members
                .iter()
                .filter(|member| {
                    self.type_definition(member)
                        .is_some_and(|m| m.kind == TypeKind::Object)
                })
                .map(String::as_str)
                .collect(),
            TypeKind::Interface => self
                .types
                .iter()
                .filter(|t| t.kind == TypeKind::Object && t.interfaces.iter().any(|i| i == name))
                .map(|t| t.name.as_str())
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Whether a fragment on `condition` applies to an object whose
    /// `__typename` is `concrete`.
    #[must_use]
    pub fn condition_applies(&self, condition: &str, concrete: &str) -> bool {
        condition == concrete || self.possible_types(condition).contains(&concrete)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list_of(inner: TypeRef) -> TypeRef {
        TypeRef::List(Box::new(inner))
    }

    fn non_null(inner: TypeRef) -> TypeRef {
        TypeRef::NonNull(Box::new(inner))
    }

    #[test]
    fn named_type_unwraps_all_wrappers() {
        let ty = non_null(list_of(list_of(non_null(TypeRef::named("Like")))));
        assert_eq!(ty.named_type(), "Like");
        assert_eq!(ty.list_depth(), 2);
        assert_eq!(ty.to_string(), "[[Like!]]!");
    }

    #[test]
    fn builtin_scalars_are_present() {
        let schema = Schema::new(vec![]);
        for scalar in BUILTIN_SCALARS {
            assert_eq!(
                schema.type_definition(scalar).map(|t| t.kind),
                Some(TypeKind::Scalar)
            );
        }
    }

    #[test]
    fn root_types_default_by_name() {
        let schema = Schema::new(vec![
            TypeDefinition::new("Query", TypeKind::Object),
            TypeDefinition::new("Mutation", TypeKind::Object),
        ]);
        assert_eq!(schema.root_type(OperationKind::Query), Some("Query"));
        assert_eq!(schema.root_type(OperationKind::Mutation), Some("Mutation"));
        assert_eq!(schema.root_type(OperationKind::Subscription), None);
    }

    #[test]
    fn repeated_definition_extends() {
        let mut first = TypeDefinition::new("User", TypeKind::Object);
        first.fields.push(FieldDefinition {
            name: "id".into(),
            arguments: vec![],
            ty: TypeRef::named("ID"),
            directives: vec![],
        });
        let mut second = TypeDefinition::new("User", TypeKind::Object);
        second.fields.push(FieldDefinition {
            name: "name".into(),
            arguments: vec![],
            ty: TypeRef::named("String"),
            directives: vec![],
        });
        let schema = Schema::new(vec![first, second]);
        assert!(schema.field("User", "id").is_some());
        assert!(schema.field("User", "name").is_some());
        assert_eq!(schema.types().filter(|t| t.name == "User").count(), 1);
    }

    #[test]
    fn possible_types_of_abstract_types() {
        let mut node = TypeDefinition::new("Node", TypeKind::Interface);
        node.fields.push(FieldDefinition {
            name: "id".into(),
            arguments: vec![],
            ty: TypeRef::named("ID"),
            directives: vec![],
        });
        let mut doc = TypeDefinition::new("Doc", TypeKind::Object);
        doc.interfaces.push("Node".into());
        let mut photo = TypeDefinition::new("Photo", TypeKind::Object);
        photo.interfaces.push("Node".into());
        let tag = TypeDefinition::new("Tag", TypeKind::Object);
        let mut result = TypeDefinition::new("SearchResult", TypeKind::Union);
        result.members = vec!["Doc".into(), "Tag".into()];
        let schema = Schema::new(vec![node, doc, photo, tag, result]);

        assert!(schema.is_abstract("Node"));
        assert!(schema.is_abstract("SearchResult"));
        assert!(!schema.is_abstract("Doc"));
        assert_eq!(schema.possible_types("Node"), vec!["Doc", "Photo"]);
        assert_eq!(schema.possible_types("SearchResult"), vec!["Doc", "Tag"]);
        assert_eq!(schema.possible_types("Tag"), vec!["Tag"]);
        assert!(schema.possible_types("String").is_empty());

        assert!(schema.condition_applies("Node", "Photo"));
        assert!(schema.condition_applies("SearchResult", "Tag"));
        assert!(!schema.condition_applies("SearchResult", "Photo"));
        assert!(!schema.condition_applies("Doc", "Photo"));
    }
}
