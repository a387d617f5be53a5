use winnow::combinator::{alt, cut_err, eof, opt, preceded, repeat, separated};
use winnow::error::{ModalResult, StrContext, StrContextValue};
use winnow::prelude::*;

use crate::types::{
    FieldDefinition, InputValueDefinition, OperationKind, Schema, TypeDefinition, TypeKind,
};

use super::grammar::{
    const_directives, const_value, keyword, name, spaced_name, string_value, type_ref, ws,
};

// -- Members ----------------------------------------------------------------

/// Descriptions document the schema; they carry no meaning for binding.
fn description(input: &mut &str) -> ModalResult<()> {
    let _ = opt(string_value).parse_next(input)?;
    Ok(())
}

fn input_value_definition(input: &mut &str) -> ModalResult<InputValueDefinition> {
    description(input)?;
    let arg = spaced_name(input)?;
    ws.parse_next(input)?;
    cut_err(':').parse_next(input)?;
    let ty = cut_err(type_ref).parse_next(input)?;
    let default_value = opt(preceded((ws, '='), cut_err(const_value))).parse_next(input)?;
    let directives = const_directives(input)?;
    Ok(InputValueDefinition {
        name: arg.to_owned(),
        ty,
        default_value,
        directives,
    })
}

fn argument_definitions(input: &mut &str) -> ModalResult<Vec<InputValueDefinition>> {
    preceded(ws, '(').parse_next(input)?;
    let args: Vec<InputValueDefinition> =
        cut_err(repeat(1.., input_value_definition)).parse_next(input)?;
    ws.parse_next(input)?;
    cut_err(')').parse_next(input)?;
    Ok(args)
}

fn field_definition(input: &mut &str) -> ModalResult<FieldDefinition> {
    description(input)?;
    let field = spaced_name(input)?;
    let arguments = opt(argument_definitions)
        .parse_next(input)?
        .unwrap_or_default();
    ws.parse_next(input)?;
    cut_err(':')
        .context(StrContext::Expected(StrContextValue::CharLiteral(':')))
        .parse_next(input)?;
    let ty = cut_err(type_ref).parse_next(input)?;
    let directives = const_directives(input)?;
    Ok(FieldDefinition {
        name: field.to_owned(),
        arguments,
        ty,
        directives,
    })
}

/// `{ ... }` around zero or more members, or nothing at all.
fn braced<T>(
    input: &mut &str,
    member: fn(&mut &str) -> ModalResult<T>,
) -> ModalResult<Vec<T>> {
    if opt(preceded(ws, '{')).parse_next(input)?.is_none() {
        return Ok(Vec::new());
    }
    let members: Vec<T> = repeat(0.., member).parse_next(input)?;
    ws.parse_next(input)?;
    cut_err('}')
        .context(StrContext::Expected(StrContextValue::CharLiteral('}')))
        .parse_next(input)?;
    Ok(members)
}

fn implements(input: &mut &str) -> ModalResult<Vec<String>> {
    if opt(|i: &mut &str| keyword(i, "implements"))
        .parse_next(input)?
        .is_none()
    {
        return Ok(Vec::new());
    }
    let _ = opt(preceded(ws, '&')).parse_next(input)?;
    let names: Vec<&str> =
        cut_err(separated(1.., spaced_name, (ws, '&'))).parse_next(input)?;
    Ok(names.into_iter().map(str::to_owned).collect())
}

// -- Type definitions -------------------------------------------------------

fn object_like(input: &mut &str, kind: TypeKind) -> ModalResult<TypeDefinition> {
    let type_name = cut_err(spaced_name).parse_next(input)?;
    let mut ty = TypeDefinition::new(type_name, kind);
    ty.interfaces = implements(input)?;
    ty.directives = const_directives(input)?;
    ty.fields = braced(input, field_definition)?;
    Ok(ty)
}

fn object_type(input: &mut &str) -> ModalResult<TypeDefinition> {
    keyword(input, "type")?;
    object_like(input, TypeKind::Object)
}

fn interface_type(input: &mut &str) -> ModalResult<TypeDefinition> {
    keyword(input, "interface")?;
    object_like(input, TypeKind::Interface)
}

fn union_type(input: &mut &str) -> ModalResult<TypeDefinition> {
    keyword(input, "union")?;
    let type_name = cut_err(spaced_name).parse_next(input)?;
    let mut ty = TypeDefinition::new(type_name, TypeKind::Union);
    ty.directives = const_directives(input)?;
    if opt(preceded(ws, '=')).parse_next(input)?.is_some() {
        let _ = opt(preceded(ws, '|')).parse_next(input)?;
        let members: Vec<&str> =
            cut_err(separated(1.., spaced_name, (ws, '|'))).parse_next(input)?;
        ty.members = members.into_iter().map(str::to_owned).collect();
    }
    Ok(ty)
}

fn enum_value(input: &mut &str) -> ModalResult<String> {
    description(input)?;
    let value = spaced_name(input)?;
    let _ = const_directives(input)?;
    Ok(value.to_owned())
}

fn enum_type(input: &mut &str) -> ModalResult<TypeDefinition> {
    keyword(input, "enum")?;
    let type_name = cut_err(spaced_name).parse_next(input)?;
    let mut ty = TypeDefinition::new(type_name, TypeKind::Enum);
    ty.directives = const_directives(input)?;
    ty.enum_values = braced(input, enum_value)?;
    Ok(ty)
}

fn scalar_type(input: &mut &str) -> ModalResult<TypeDefinition> {
    keyword(input, "scalar")?;
    let type_name = cut_err(spaced_name).parse_next(input)?;
    let mut ty = TypeDefinition::new(type_name, TypeKind::Scalar);
    ty.directives = const_directives(input)?;
    Ok(ty)
}

fn input_type(input: &mut &str) -> ModalResult<TypeDefinition> {
    keyword(input, "input")?;
    let type_name = cut_err(spaced_name).parse_next(input)?;
    let mut ty = TypeDefinition::new(type_name, TypeKind::InputObject);
    ty.directives = const_directives(input)?;
    ty.fields = braced(input, input_value_definition)?
        .into_iter()
        .map(|value| FieldDefinition {
            name: value.name,
            arguments: Vec::new(),
            ty: value.ty,
            directives: value.directives,
        })
        .collect();
    Ok(ty)
}

fn type_definition(input: &mut &str) -> ModalResult<TypeDefinition> {
    alt((
        object_type,
        interface_type,
        union_type,
        enum_type,
        scalar_type,
        input_type,
    ))
    .parse_next(input)
}

// -- Schema-level definitions -----------------------------------------------

fn root_operation(input: &mut &str) -> ModalResult<(OperationKind, String)> {
    let kind = alt((
        (|i: &mut &str| keyword(i, "query")).value(OperationKind::Query),
        (|i: &mut &str| keyword(i, "mutation")).value(OperationKind::Mutation),
        (|i: &mut &str| keyword(i, "subscription")).value(OperationKind::Subscription),
    ))
    .parse_next(input)?;
    ws.parse_next(input)?;
    cut_err(':').parse_next(input)?;
    let type_name = cut_err(spaced_name).parse_next(input)?;
    Ok((kind, type_name.to_owned()))
}

fn schema_definition(input: &mut &str) -> ModalResult<Vec<(OperationKind, String)>> {
    keyword(input, "schema")?;
    let _ = const_directives(input)?;
    braced(input, root_operation)
}

/// Directive definitions only declare what may be written; they are not
/// needed to read annotations.
fn directive_definition(input: &mut &str) -> ModalResult<()> {
    keyword(input, "directive")?;
    preceded(ws, cut_err('@')).parse_next(input)?;
    cut_err(name).parse_next(input)?;
    let _ = opt(argument_definitions).parse_next(input)?;
    let _ = opt(|i: &mut &str| keyword(i, "repeatable")).parse_next(input)?;
    cut_err(|i: &mut &str| keyword(i, "on"))
        .context(StrContext::Expected(StrContextValue::StringLiteral("on")))
        .parse_next(input)?;
    let _ = opt(preceded(ws, '|')).parse_next(input)?;
    let _: Vec<&str> = cut_err(separated(1.., spaced_name, (ws, '|'))).parse_next(input)?;
    Ok(())
}

enum Definition {
    Type(TypeDefinition),
    Roots(Vec<(OperationKind, String)>),
    Ignored,
}

fn definition(input: &mut &str) -> ModalResult<Definition> {
    description(input)?;
    let extend = opt(|i: &mut &str| keyword(i, "extend"))
        .parse_next(input)?
        .is_some();
    let mut parsed = alt((
        schema_definition.map(Definition::Roots),
        type_definition.map(Definition::Type),
        directive_definition.map(|()| Definition::Ignored),
    ));
    if extend {
        cut_err(parsed).parse_next(input)
    } else {
        parsed.parse_next(input)
    }
}

pub(super) fn schema(input: &mut &str) -> ModalResult<Schema> {
    let definitions: Vec<Definition> = repeat(0.., definition).parse_next(input)?;
    ws.parse_next(input)?;
    eof.context(StrContext::Expected(StrContextValue::Description(
        "type definition",
    )))
    .parse_next(input)?;

    let mut types = Vec::new();
    let mut roots = Vec::new();
    for definition in definitions {
        match definition {
            Definition::Type(ty) => types.push(ty),
            Definition::Roots(r) => roots.extend(r),
            Definition::Ignored => {}
        }
    }
    let mut schema = Schema::new(types);
    for (kind, type_name) in roots {
        schema.set_root_type(kind, type_name);
    }
    Ok(schema)
}

#[cfg(test)]
mod tests {
    use crate::parse::parse_schema;
    use crate::types::{InputValue, TypeRef};

    use super::*;

    const SDL: &str = r#"
        directive @authz(rules: [String!]) repeatable on OBJECT | FIELD_DEFINITION

        """
        Entry point.
        """
        type Query {
            "Look up a user."
            user(id: ID!, first: Int = 10): User
            search(term: String): [SearchResult!]!
        }

        type User implements Node & Owned @authz(rules: [IsAuthenticated]) {
            id: ID!
            email: String @authz(rules: ["IsOwner"])
        }

        interface Node { id: ID! }
        interface Owned { ownerId: ID }
        union SearchResult = | User | Post
        enum Role { ADMIN "plain user" USER }
        scalar DateTime
        input UserFilter { role: Role = USER, since: DateTime }

        extend type User { role: Role }
        type Post { id: ID! }
    "#;

    #[test]
    fn parses_type_system() {
        let schema = parse_schema(SDL).unwrap();

        let user_field = schema.field("Query", "user").unwrap();
        assert_eq!(user_field.ty, TypeRef::named("User"));
        assert_eq!(user_field.arguments.len(), 2);
        assert_eq!(
            user_field.arguments[1].default_value,
            Some(InputValue::Int(10))
        );
        assert_eq!(
            schema.field("Query", "search").unwrap().ty.to_string(),
            "[SearchResult!]!"
        );

        let user = schema.type_definition("User").unwrap();
        assert_eq!(user.interfaces, vec!["Node", "Owned"]);
        assert_eq!(user.directives[0].name, "authz");
        assert!(user.field("role").is_some(), "extension merged");
        assert_eq!(
            user.field("email").unwrap().directives[0].argument("rules"),
            Some(&InputValue::List(vec![InputValue::String("IsOwner".into())]))
        );

        let union = schema.type_definition("SearchResult").unwrap();
        assert_eq!(union.kind, TypeKind::Union);
        assert_eq!(union.members, vec!["User", "Post"]);
        assert_eq!(
            schema.type_definition("Role").unwrap().enum_values,
            vec!["ADMIN", "USER"]
        );
        assert_eq!(
            schema.type_definition("UserFilter").unwrap().kind,
            TypeKind::InputObject
        );
        assert_eq!(
            schema.type_definition("DateTime").unwrap().kind,
            TypeKind::Scalar
        );
    }

    #[test]
    fn schema_block_sets_roots() {
        let schema = parse_schema(
            "schema { query: Root mutation: Changes } type Root { a: Int } type Changes { b: Int }",
        )
        .unwrap();
        assert_eq!(schema.root_type(OperationKind::Query), Some("Root"));
        assert_eq!(schema.root_type(OperationKind::Mutation), Some("Changes"));
    }

    #[test]
    fn type_without_fields() {
        let schema = parse_schema("type Empty type Query { a: Int }").unwrap();
        assert!(schema.type_definition("Empty").unwrap().fields.is_empty());
    }

    #[test]
    fn rejects_malformed_sdl() {
        for text in [
            "type { a: Int }",
            "type Query { a Int }",
            "type Query { a: }",
            "extend banana",
            "type Query { a: Int",
            "union U = ",
        ] {
            assert!(parse_schema(text).is_err(), "accepted {text:?}");
        }
    }
}
