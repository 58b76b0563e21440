// This module defines the error type for the term lowering pass using the thiserror crate.
// LowerError separates three classes of failure: internal-consistency problems (a type the
// converter has no rule for, an operation form that is explicitly unsupported, a value used
// before its definition was lowered), the expected "no pattern applied" outcome, and an
// abstract construct surviving the pass. Configuration and textual-IR parse failures share
// the same enum so that the binary can report every failure through one chain. Each
// function-level failure is wrapped in InFunction so the report names the enclosing function.

//! Error types for the lowering pass.

use thiserror::Error;

use crate::ir::Location;

/// Main error type for term lowering.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LowerError {
    #[error("no lowering for type `{ty}`")]
    UnsupportedType { ty: String },

    #[error("unsupported `{op}` at {loc}: {reason}")]
    Unsupported {
        op: &'static str,
        reason: String,
        loc: Location,
    },

    #[error("no legal lowering for `{op}` at {loc}")]
    NoLegalLowering { op: &'static str, loc: Location },

    #[error("`{op}` at {loc} survived conversion")]
    IllegalOperation { op: &'static str, loc: Location },

    #[error("value %{value} is used before its definition was lowered")]
    UnmappedValue { value: u32 },

    #[error("malformed IR: {reason}")]
    MalformedIr { reason: String },

    #[error("invalid target configuration: {reason}")]
    InvalidTarget { reason: String },

    #[error("parse error at {line}:{column}: {message}")]
    Parse {
        line: u32,
        column: u32,
        message: String,
    },

    #[error("in function `{function}`: {source}")]
    InFunction {
        function: String,
        #[source]
        source: Box<LowerError>,
    },
}

impl LowerError {
    /// True for failures that indicate a bug in an earlier stage or in this
    /// pass, as opposed to "no pattern applied".
    pub fn is_internal(&self) -> bool {
        match self {
            LowerError::UnsupportedType { .. }
            | LowerError::Unsupported { .. }
            | LowerError::UnmappedValue { .. }
            | LowerError::MalformedIr { .. } => true,
            LowerError::InFunction { source, .. } => source.is_internal(),
            _ => false,
        }
    }

    /// Strip any `InFunction` wrappers.
    pub fn root(&self) -> &LowerError {
        match self {
            LowerError::InFunction { source, .. } => source.root(),
            other => other,
        }
    }

    pub(crate) fn in_function(self, function: &str) -> Self {
        LowerError::InFunction {
            function: function.to_string(),
            source: Box::new(self),
        }
    }
}

/// Result type alias for lowering operations.
pub type LowerResult<T> = Result<T, LowerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_classification_sees_through_wrappers() {
        let err = LowerError::UnsupportedType { ty: "map".into() }.in_function("f");
        assert!(err.is_internal());
        assert_eq!(err.root(), &LowerError::UnsupportedType { ty: "map".into() });

        let err = LowerError::NoLegalLowering {
            op: "cast",
            loc: Location::unknown(),
        }
        .in_function("g");
        assert!(!err.is_internal());
        assert!(err.to_string().starts_with("in function `g`"));
    }
}
