mod document;
mod error;
mod grammar;
mod sdl;

pub use error::ParseError;

use winnow::Parser;

use crate::types::{Document, Schema, SelectionSet};

/// Parse an executable document: operations and fragment definitions.
///
/// # Errors
///
/// Returns [`ParseError`] if the input is not a valid document.
pub fn parse_document(input: &str) -> Result<Document, ParseError> {
    document::document
        .parse(input)
        .map_err(|e| ParseError::new(e.to_string()))
}

/// Parse schema definition language into a [`Schema`].
///
/// # Errors
///
/// Returns [`ParseError`] if the input is not valid SDL.
pub fn parse_schema(input: &str) -> Result<Schema, ParseError> {
    sdl::schema
        .parse(input)
        .map_err(|e| ParseError::new(e.to_string()))
}

/// Parse a selection such as a rule's extra fields. The outer braces are
/// optional: `"{ ownerId }"` and `"ownerId"` are equivalent.
///
/// # Errors
///
/// Returns [`ParseError`] if the input is not a valid selection.
pub fn parse_selection_set(input: &str) -> Result<SelectionSet, ParseError> {
    document::bare_selection_set
        .parse(input)
        .map_err(|e| ParseError::new(e.to_string()))
}
