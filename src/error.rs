//! Error types for pipeline construction and execution.
//!
//! Two error types cover the whole lifecycle:
//!
//! - [`PrimitiveError`]: raised by a primitive adapter itself when its data or
//!   parameters are unusable. The engine never creates these for its own
//!   bookkeeping.
//! - [`PipelineError`]: everything the engine reports to the caller. When a
//!   primitive fails, the [`PrimitiveError`] is kept as the `source` of a
//!   [`PipelineError::PrimitiveExecution`] annotated with the block name and
//!   the [`Phase`] that failed.

use std::fmt;

use thiserror::Error;

use crate::value::ValueKind;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// The phase of a block in which a failure occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Constructing the underlying primitive object.
    Build,
    /// Calling the primitive's fit operation.
    Fit,
    /// Calling the primitive's produce operation.
    Produce,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Build => write!(f, "build"),
            Phase::Fit => write!(f, "fit"),
            Phase::Produce => write!(f, "produce"),
        }
    }
}

/// Error raised by a primitive adapter.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PrimitiveError {
    /// Empty data provided where non-empty was required.
    #[error("Empty data: {0}")]
    EmptyData(String),

    /// Shape mismatch between expected and actual dimensions.
    #[error("Invalid shape: expected {expected}, got {got}")]
    InvalidShape { expected: String, got: String },

    /// Feature dimension mismatch between fit and produce.
    #[error("Feature mismatch: expected {expected_features} features, got {got_features}")]
    FeatureMismatch {
        expected_features: usize,
        got_features: usize,
    },

    /// Invalid construction or call parameter.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// A keyword argument the adapter needs was not passed.
    #[error("Missing argument '{0}'")]
    MissingArgument(String),

    /// A keyword argument carried a value of the wrong kind.
    #[error("Argument '{name}' is {got}, expected {expected}")]
    TypeMismatch {
        name: String,
        expected: ValueKind,
        got: ValueKind,
    },

    /// Produce was called before fit.
    #[error("Primitive has not been fitted")]
    NotFitted,

    /// Any other failure reported by the component.
    #[error("{0}")]
    Other(String),
}

/// Error type for every engine operation.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Malformed descriptor or configuration, unknown primitive, or a
    /// `start`/`output` selector referencing an unknown block.
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// A declared argument could not be resolved from the context.
    #[error("Argument binding error in block '{block}': {message}")]
    ArgumentBinding { block: String, message: String },

    /// The wrapped primitive failed; the original error is the `source`.
    #[error("Block '{block}' failed during {phase}: {source}")]
    PrimitiveExecution {
        block: String,
        phase: Phase,
        #[source]
        source: PrimitiveError,
    },

    /// A hyperparameter value violates its declared schema.
    #[error("Hyperparameter error in block '{block}': {message}")]
    Hyperparameter { block: String, message: String },

    /// A block with a fit phase was asked to produce while unfitted.
    #[error("Block '{block}' is not fitted; call fit before produce")]
    NotFitted { block: String },

    /// JSON (de)serialization failure.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O failure while saving or loading a configuration.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an argument binding error for a block.
    pub fn binding(block: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ArgumentBinding {
            block: block.into(),
            message: message.into(),
        }
    }

    /// Create a hyperparameter error for a block.
    pub fn hyperparameter(block: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Hyperparameter {
            block: block.into(),
            message: message.into(),
        }
    }

    /// Wrap a primitive failure with the block and phase it happened in.
    pub fn execution(block: impl Into<String>, phase: Phase, source: PrimitiveError) -> Self {
        Self::PrimitiveExecution {
            block: block.into(),
            phase,
            source,
        }
    }

    /// Name of the block this error is attributed to, if any.
    pub fn block(&self) -> Option<&str> {
        match self {
            Self::ArgumentBinding { block, .. }
            | Self::PrimitiveExecution { block, .. }
            | Self::Hyperparameter { block, .. }
            | Self::NotFitted { block } => Some(block),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_phase_display() {
        assert_eq!(Phase::Build.to_string(), "build");
        assert_eq!(Phase::Fit.to_string(), "fit");
        assert_eq!(Phase::Produce.to_string(), "produce");
    }

    #[test]
    fn test_primitive_error_display() {
        let err = PrimitiveError::FeatureMismatch {
            expected_features: 4,
            got_features: 3,
        };
        assert_eq!(
            err.to_string(),
            "Feature mismatch: expected 4 features, got 3"
        );

        let err = PrimitiveError::TypeMismatch {
            name: "X".to_string(),
            expected: ValueKind::Matrix,
            got: ValueKind::Str,
        };
        assert!(err.to_string().contains("'X' is str, expected matrix"));
    }

    #[test]
    fn test_execution_error_keeps_source() {
        let err = PipelineError::execution(
            "scaler#1",
            Phase::Fit,
            PrimitiveError::EmptyData("no rows".to_string()),
        );
        assert!(err.to_string().contains("scaler#1"));
        assert!(err.to_string().contains("during fit"));

        let source = err.source().expect("source should be kept");
        assert_eq!(source.to_string(), "Empty data: no rows");
    }

    #[test]
    fn test_block_attribution() {
        let err = PipelineError::binding("a#1", "missing 'y'");
        assert_eq!(err.block(), Some("a#1"));

        let err = PipelineError::NotFitted {
            block: "b#2".to_string(),
        };
        assert_eq!(err.block(), Some("b#2"));

        let err = PipelineError::configuration("unknown block");
        assert_eq!(err.block(), None);
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: PipelineError = json_err.into();
        assert!(matches!(err, PipelineError::Serialization(_)));
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: PipelineError = io_err.into();
        assert!(matches!(err, PipelineError::Io(_)));
    }
}
