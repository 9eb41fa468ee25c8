/// A lexing or parsing failure, located by source unit name and line.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{unit}:{line}: {message}")]
pub struct ParseError {
    pub unit: String,
    pub line: u32,
    pub message: String,
}

impl ParseError {
    pub fn new(unit: &str, line: u32, message: impl Into<String>) -> Self {
        ParseError {
            unit: unit.to_owned(),
            line,
            message: message.into(),
        }
    }
}
