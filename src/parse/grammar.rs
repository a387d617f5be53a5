//! Lexical pieces shared by the document and schema grammars: ignored
//! tokens, names, keywords, input values, arguments, directives and type
//! references.

use winnow::ascii::till_line_ending;
use winnow::combinator::{alt, cut_err, not, opt, preceded, repeat};
use winnow::error::{ErrMode, ModalResult, StrContext, StrContextValue};
use winnow::prelude::*;
use winnow::token::{any, one_of, take_until, take_while};

use crate::types::{Directive, InputValue, TypeRef};

// -- Ignored tokens ---------------------------------------------------------

/// Whitespace, commas and `#` comments are insignificant everywhere.
pub(super) fn ws(input: &mut &str) -> ModalResult<()> {
    let _: () = repeat(
        0..,
        alt((
            take_while(1.., |c: char| c.is_whitespace() || c == ',' || c == '\u{feff}').void(),
            ('#', till_line_ending).void(),
        )),
    )
    .parse_next(input)?;
    Ok(())
}

// -- Names & keywords -------------------------------------------------------

fn is_name_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

pub(super) fn name<'i>(input: &mut &'i str) -> ModalResult<&'i str> {
    (one_of(is_name_start), take_while(0.., is_name_char))
        .take()
        .context(StrContext::Expected(StrContextValue::Description("name")))
        .parse_next(input)
}

/// Leading ignored tokens, then a name-like keyword not followed by another
/// name character.
pub(super) fn keyword(input: &mut &str, kw: &'static str) -> ModalResult<()> {
    ws.parse_next(input)?;
    (kw, not(one_of(is_name_char))).void().parse_next(input)
}

/// A name after optional ignored tokens.
pub(super) fn spaced_name<'i>(input: &mut &'i str) -> ModalResult<&'i str> {
    preceded(ws, name).parse_next(input)
}

// -- Values -----------------------------------------------------------------

fn block_string(input: &mut &str) -> ModalResult<String> {
    "\"\"\"".parse_next(input)?;
    let body = cut_err(take_until(0.., "\"\"\"")).parse_next(input)?;
    "\"\"\"".parse_next(input)?;
    let lines: Vec<&str> = body.lines().map(str::trim).collect();
    Ok(lines.join("\n").trim().to_owned())
}

fn unicode_escape(input: &mut &str) -> ModalResult<char> {
    let hex = take_while(4..=4, |c: char| c.is_ascii_hexdigit()).parse_next(input)?;
    u32::from_str_radix(hex, 16)
        .ok()
        .and_then(char::from_u32)
        .ok_or_else(|| ErrMode::from_input(input).cut())
}

fn quoted_string(input: &mut &str) -> ModalResult<String> {
    '"'.parse_next(input)?;
    let mut s = String::new();
    loop {
        let ch = cut_err(any).parse_next(input)?;
        match ch {
            '"' => return Ok(s),
            '\n' => return Err(ErrMode::from_input(input).cut()),
            '\\' => {
                let esc = cut_err(any).parse_next(input)?;
                match esc {
                    '"' => s.push('"'),
                    '\\' => s.push('\\'),
                    '/' => s.push('/'),
                    'b' => s.push('\u{8}'),
                    'f' => s.push('\u{c}'),
                    'n' => s.push('\n'),
                    'r' => s.push('\r'),
                    't' => s.push('\t'),
                    'u' => s.push(cut_err(unicode_escape).parse_next(input)?),
                    _ => return Err(ErrMode::from_input(input).cut()),
                }
            }
            c => s.push(c),
        }
    }
}

/// A quoted or block string.
pub(super) fn string_value(input: &mut &str) -> ModalResult<String> {
    ws.parse_next(input)?;
    alt((block_string, quoted_string)).parse_next(input)
}

fn number(input: &mut &str) -> ModalResult<InputValue> {
    let digits = |c: char| c.is_ascii_digit();
    let text = (
        opt('-'),
        take_while(1.., digits),
        opt(('.', take_while(1.., digits))),
        opt((one_of(['e', 'E']), opt(one_of(['+', '-'])), take_while(1.., digits))),
    )
        .take()
        .parse_next(input)?;
    if text.contains(|c: char| matches!(c, '.' | 'e' | 'E')) {
        text.parse::<f64>()
            .map(InputValue::Float)
            .map_err(|_| ErrMode::from_input(input).cut())
    } else {
        text.parse::<i64>()
            .map(InputValue::Int)
            .map_err(|_| ErrMode::from_input(input).cut())
    }
}

fn value_with(input: &mut &str, variables: bool) -> ModalResult<InputValue> {
    ws.parse_next(input)?;
    match input.chars().next() {
        Some('$') if variables => {
            '$'.parse_next(input)?;
            let var = cut_err(name).parse_next(input)?;
            Ok(InputValue::Variable(var.to_owned()))
        }
        Some('"') => string_value.map(InputValue::String).parse_next(input),
        Some('[') => {
            '['.parse_next(input)?;
            let items: Vec<InputValue> =
                repeat(0.., |i: &mut &str| value_with(i, variables)).parse_next(input)?;
            ws.parse_next(input)?;
            cut_err(']').parse_next(input)?;
            Ok(InputValue::List(items))
        }
        Some('{') => {
            '{'.parse_next(input)?;
            let entries: Vec<(String, InputValue)> = repeat(
                0..,
                |i: &mut &str| -> ModalResult<(String, InputValue)> {
                    let key = spaced_name(i)?;
                    ws.parse_next(i)?;
                    cut_err(':').parse_next(i)?;
                    let value = cut_err(|i: &mut &str| value_with(i, variables)).parse_next(i)?;
                    Ok((key.to_owned(), value))
                },
            )
            .parse_next(input)?;
            ws.parse_next(input)?;
            cut_err('}').parse_next(input)?;
            Ok(InputValue::Object(entries))
        }
        Some(c) if c == '-' || c.is_ascii_digit() => number(input),
        Some(c) if is_name_start(c) => {
            let word = name(input)?;
            Ok(match word {
                "true" => InputValue::Bool(true),
                "false" => InputValue::Bool(false),
                "null" => InputValue::Null,
                other => InputValue::Enum(other.to_owned()),
            })
        }
        _ => Err(ErrMode::from_input(input)),
    }
}

/// A value that may reference variables.
pub(super) fn value(input: &mut &str) -> ModalResult<InputValue> {
    value_with(input, true)
}

/// A constant value, as used in schema defaults and annotations.
pub(super) fn const_value(input: &mut &str) -> ModalResult<InputValue> {
    value_with(input, false)
}

// -- Arguments & directives -------------------------------------------------

fn arguments_with(input: &mut &str, variables: bool) -> ModalResult<Vec<(String, InputValue)>> {
    preceded(ws, '(').parse_next(input)?;
    let args: Vec<(String, InputValue)> = repeat(0.., |i: &mut &str| -> ModalResult<_> {
        let arg = spaced_name(i)?;
        ws.parse_next(i)?;
        cut_err(':').parse_next(i)?;
        let value = cut_err(|i: &mut &str| value_with(i, variables))
            .context(StrContext::Expected(StrContextValue::Description("value")))
            .parse_next(i)?;
        Ok((arg.to_owned(), value))
    })
    .parse_next(input)?;
    ws.parse_next(input)?;
    cut_err(')').parse_next(input)?;
    Ok(args)
}

/// `(name: value, ...)`, or nothing.
pub(super) fn arguments(input: &mut &str) -> ModalResult<Vec<(String, InputValue)>> {
    opt(|i: &mut &str| arguments_with(i, true))
        .map(Option::unwrap_or_default)
        .parse_next(input)
}

fn directives_with(input: &mut &str, variables: bool) -> ModalResult<Vec<Directive>> {
    repeat(0.., |i: &mut &str| -> ModalResult<Directive> {
        preceded(ws, '@').parse_next(i)?;
        let directive = cut_err(name).parse_next(i)?;
        let arguments = opt(|i: &mut &str| arguments_with(i, variables))
            .parse_next(i)?
            .unwrap_or_default();
        Ok(Directive {
            name: directive.to_owned(),
            arguments,
        })
    })
    .parse_next(input)
}

/// Zero or more directives on an executable node.
pub(super) fn directives(input: &mut &str) -> ModalResult<Vec<Directive>> {
    directives_with(input, true)
}

/// Zero or more directives on a schema node.
pub(super) fn const_directives(input: &mut &str) -> ModalResult<Vec<Directive>> {
    directives_with(input, false)
}

// -- Types ------------------------------------------------------------------

/// `Name`, `[Type]`, either followed by `!`.
pub(super) fn type_ref(input: &mut &str) -> ModalResult<TypeRef> {
    ws.parse_next(input)?;
    let base = if opt('[').parse_next(input)?.is_some() {
        let inner = cut_err(type_ref).parse_next(input)?;
        ws.parse_next(input)?;
        cut_err(']').parse_next(input)?;
        TypeRef::List(Box::new(inner))
    } else {
        name.map(TypeRef::named)
            .context(StrContext::Expected(StrContextValue::Description("type")))
            .parse_next(input)?
    };
    if opt(preceded(ws, '!')).parse_next(input)?.is_some() {
        Ok(TypeRef::NonNull(Box::new(base)))
    } else {
        Ok(base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_value(text: &str) -> InputValue {
        value.parse(text).unwrap()
    }

    #[test]
    fn scalar_values() {
        assert_eq!(parse_value("42"), InputValue::Int(42));
        assert_eq!(parse_value("-7"), InputValue::Int(-7));
        assert_eq!(parse_value("3.5"), InputValue::Float(3.5));
        assert_eq!(parse_value("1e3"), InputValue::Float(1000.0));
        assert_eq!(parse_value("true"), InputValue::Bool(true));
        assert_eq!(parse_value("null"), InputValue::Null);
        assert_eq!(parse_value("ADMIN"), InputValue::Enum("ADMIN".into()));
        assert_eq!(parse_value("$id"), InputValue::Variable("id".into()));
    }

    #[test]
    fn string_escapes() {
        assert_eq!(
            parse_value(r#""a\"b\\cA""#),
            InputValue::String("a\"b\\cA".into())
        );
        assert_eq!(parse_value(r#""\u00e9t\u00e9""#), InputValue::String("été".into()));
        assert_eq!(
            parse_value("\"\"\"\n  block\n  text\n\"\"\""),
            InputValue::String("block\ntext".into())
        );
    }

    #[test]
    fn compound_values() {
        assert_eq!(
            parse_value("[1, [2 3], {a: $x, b: RED}]"),
            InputValue::List(vec![
                InputValue::Int(1),
                InputValue::List(vec![InputValue::Int(2), InputValue::Int(3)]),
                InputValue::Object(vec![
                    ("a".into(), InputValue::Variable("x".into())),
                    ("b".into(), InputValue::Enum("RED".into())),
                ]),
            ])
        );
    }

    #[test]
    fn const_value_rejects_variables() {
        assert!(const_value.parse("$id").is_err());
    }

    #[test]
    fn unterminated_list_is_an_error() {
        assert!(value.parse("[1, 2").is_err());
    }

    #[test]
    fn type_refs() {
        assert_eq!(type_ref.parse("ID").unwrap(), TypeRef::named("ID"));
        assert_eq!(type_ref.parse("[[Like!]]!").unwrap().to_string(), "[[Like!]]!");
        assert!(type_ref.parse("[Like").is_err());
    }

    #[test]
    fn keyword_needs_boundary() {
        let mut input = "onion";
        assert!(keyword(&mut input, "on").is_err());
        let mut input = " on User";
        assert!(keyword(&mut input, "on").is_ok());
        assert_eq!(input, " User");
    }

    #[test]
    fn directives_with_arguments() {
        let parsed = directives.parse(" @skip(if: $hide) @deprecated").unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].name, "skip");
        assert_eq!(
            parsed[0].argument("if"),
            Some(&InputValue::Variable("hide".into()))
        );
        assert!(parsed[1].arguments.is_empty());
    }

    #[test]
    fn comments_and_commas_are_ignored() {
        let parsed = arguments.parse("( # leading\n a: 1,, b: 2 , )").unwrap();
        assert_eq!(parsed.len(), 2);
    }
}
