use sqexport_core::ParseError;

/// Evaluation failure reported by an engine for a source unit.
///
/// `Display` is always a single line: the CLI prints it verbatim as the
/// diagnostic for a failed run.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvalError {
    #[error("syntax error at {0}")]
    Parse(#[from] ParseError),

    #[error("{name} is not defined")]
    UnboundName { name: String },

    #[error("type error: {message}")]
    TypeError { message: String },

    #[error("{function} expects {expected} argument(s), got {got}")]
    Arity {
        function: String,
        expected: usize,
        got: usize,
    },

    #[error("invalid distribution: {message}")]
    InvalidDistribution { message: String },

    #[error("index {index} out of bounds for array of length {len}")]
    IndexOutOfBounds { index: f64, len: usize },

    #[error("record has no field {field:?}")]
    MissingField { field: String },

    #[error("maximum call depth of {0} exceeded")]
    DepthExceeded(usize),

    #[error("expression nested too deeply (evaluation depth limit {0})")]
    NestingExceeded(usize),

    #[error("unknown source unit '{name}'")]
    UnknownUnit { name: String },

    #[error("dependency cycle through source unit '{unit}'")]
    DependencyCycle { unit: String },

    #[error("in dependency '{unit}': {source}")]
    DependencyFailed {
        unit: String,
        source: Box<EvalError>,
    },
}

impl EvalError {
    pub(crate) fn type_error(message: impl Into<String>) -> Self {
        EvalError::TypeError {
            message: message.into(),
        }
    }

    pub(crate) fn invalid_dist(message: impl Into<String>) -> Self {
        EvalError::InvalidDistribution {
            message: message.into(),
        }
    }
}
