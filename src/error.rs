use thiserror::Error;

use crate::parse::ParseError;
use crate::{BindError, CompileError};

/// Unified error type covering parsing, binding, compilation, and I/O.
///
/// Handy for setup code that loads a schema, a declaration file and a
/// binding cache in one go and wants a single `?`-able error.
#[derive(Debug, Error)]
pub enum FieldgateError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Bind(#[from] BindError),

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[cfg(feature = "binary-cache")]
    #[error(transparent)]
    Serialize(#[from] crate::serial::SerializeError),

    #[cfg(feature = "binary-cache")]
    #[error(transparent)]
    Deserialize(#[from] crate::serial::DeserializeError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DeclarationTable, Schema};

    fn load(sdl: &str, declarations: &str) -> Result<(Schema, DeclarationTable), FieldgateError> {
        let schema = Schema::parse(sdl)?;
        let table = DeclarationTable::from_json(declarations)?;
        Ok((schema, table))
    }

    #[test]
    fn converts_from_each_stage() {
        assert!(matches!(
            load("type Query {", "{}"),
            Err(FieldgateError::Parse(_))
        ));
        assert!(matches!(
            load("type Query { a: Int }", "[]"),
            Err(FieldgateError::Bind(BindError::MalformedDeclarations(_)))
        ));
        assert!(load("type Query { a: Int }", "{}").is_ok());
    }

    #[test]
    fn messages_pass_through() {
        let err = FieldgateError::from(CompileError::NoOperation);
        assert_eq!(err.to_string(), CompileError::NoOperation.to_string());
    }
}
