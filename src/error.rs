use thiserror::Error;

/// Raised while building or manipulating a [`Value`](crate::values::Value).
#[derive(Clone, Debug, Eq, PartialEq, Error)]
#[error("{0}")]
pub struct ValueTypeError(pub String);

/// Raised while classifying or translating an [`Operand`](crate::operands::Operand).
#[derive(Clone, Debug, Eq, PartialEq, Error)]
#[error("{0}")]
pub struct OperandTypeError(pub String);

impl From<ValueTypeError> for OperandTypeError {
    fn from(err: ValueTypeError) -> OperandTypeError {
        OperandTypeError(err.0)
    }
}

/// A line of source did not match any recognised statement form.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
#[error("{message}")]
pub struct ParseError {
    pub message: String,
    pub line: String,
}

impl ParseError {
    pub fn new(message: impl Into<String>, line: impl Into<String>) -> ParseError {
        ParseError {
            message: message.into(),
            line: line.into(),
        }
    }
}

/// A statement parsed but could not be turned into machine code. Carries the
/// listing form of the offending statement.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
#[error("{message}")]
pub struct TranslationError {
    pub message: String,
    pub statement: String,
}

impl TranslationError {
    pub fn new(message: impl Into<String>, statement: impl Into<String>) -> TranslationError {
        TranslationError {
            message: message.into(),
            statement: statement.into(),
        }
    }
}

/// Raised while extracting or expanding macro definitions.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
#[error("{0}")]
pub struct MacroError(pub String);

#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum AssemblerError {
    #[error("{0}")]
    Parse(#[from] ParseError),

    #[error("{0}")]
    Translation(#[from] TranslationError),

    #[error("{0}")]
    Macro(#[from] MacroError),

    #[error("{0}")]
    Io(String),
}

impl AssemblerError {
    /// The offending source context, suitable for printing under the error
    /// message itself.
    pub fn context(&self) -> Option<&str> {
        match self {
            AssemblerError::Parse(err) => Some(&err.line),
            AssemblerError::Translation(err) => Some(&err.statement),
            _ => None,
        }
    }
}
