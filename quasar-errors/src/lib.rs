//! Error handling for the QScript compilation pipeline.
//!
//! Every pass in the pipeline returns [`PlannerResult`]; the first error
//! aborts compilation and is reported to the caller unchanged. No pass
//! catches errors raised by another pass, and there is no partial result.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// General error type for the planner.
///
/// All variants are non-recoverable at the scope of the compilation core:
/// they indicate either malformed input or a violated internal invariant,
/// and propagate to the caller.
#[derive(Clone, Serialize, Deserialize, Error, Debug, PartialEq, Eq)]
pub enum PlannerError {
    /// The incoming logical plan violates an expected shape.
    #[error("Malformed logical plan: {0}")]
    MalformedInput(String),

    /// A pattern in the graph references a symbol that is absent from it.
    #[error("Symbol '{symbol}' is referenced but not present in the graph")]
    UnresolvedReference {
        /// The dangling symbol, rendered.
        symbol: String,
    },

    /// A variable reference survived to a point where it should have been
    /// bound.
    #[error("Unbound variable '{symbol}'")]
    UnboundVariable {
        /// The unbound symbol, rendered.
        symbol: String,
    },

    /// The provenance map is missing an entry for a reachable symbol after
    /// a pass declared it complete.
    #[error("No provenance recorded for symbol '{symbol}'")]
    ProvenanceInvariantViolated {
        /// The symbol with no provenance entry, rendered.
        symbol: String,
    },

    /// Graduate encountered a construct that an earlier pass was supposed
    /// to eliminate. This is a bug detector, not a recovery path.
    #[error("Unexpected {construct} at symbol '{symbol}' after normalization")]
    UnexpectedConstruct {
        /// A short description of the offending construct.
        construct: String,
        /// The symbol of the offending node, rendered.
        symbol: String,
    },

    /// A scalar expression cannot be represented in the target expression
    /// algebra.
    #[error("Not representable in the target expression algebra: {0}")]
    NonRepresentableInExpr(String),

    /// A read was attempted with no collection path to read from.
    #[error("No file path found for read")]
    NoFilePathFound,

    /// An internal invariant has been violated.
    ///
    /// This is produced by the [`internal!`] and [`invariant!`] macros. It
    /// should **not** be used for errors we expect to be able to handle;
    /// this is a worst-case scenario.
    #[error("Internal invariant violated: {0}")]
    Internal(String),

    /// An operation isn't supported by the planner yet, but might be in the
    /// future.
    ///
    /// This is produced by the [`unsupported!`] macro.
    #[error("Operation unsupported: {0}")]
    Unsupported(String),
}

impl PlannerError {
    /// Returns `true` if the error is an [`Internal`] invariant violation.
    ///
    /// [`Internal`]: PlannerError::Internal
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::Internal(..))
    }

    /// Returns `true` if the error is [`Unsupported`].
    ///
    /// [`Unsupported`]: PlannerError::Unsupported
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::Unsupported(..))
    }
}

/// The result type used across the compilation core.
pub type PlannerResult<T> = Result<T, PlannerError>;

/// Make a new [`PlannerError::Internal`] with the provided string-able
/// argument.
pub fn internal_err<T: Into<String>>(err: T) -> PlannerError {
    PlannerError::Internal(err.into())
}

/// Make a new [`PlannerError::Unsupported`] with the provided string-able
/// argument.
pub fn unsupported_err<T: Into<String>>(err: T) -> PlannerError {
    PlannerError::Unsupported(err.into())
}

/// Make a new [`PlannerError::MalformedInput`] with the provided
/// string-able argument.
pub fn malformed_err<T: Into<String>>(err: T) -> PlannerError {
    PlannerError::MalformedInput(err.into())
}

/// Renders information about the current source location *if* building in
/// debug mode, for use in error-generating macros
#[doc(hidden)]
#[macro_export]
macro_rules! __location_info {
    () => {
        $crate::__location_info!(" (in {})")
    };
    ($fstr: literal) => {
        if cfg!(debug_assertions) {
            format!(
                $fstr,
                format!("{}:{}:{}", std::file!(), std::line!(), std::column!(),)
            )
        } else {
            "".to_owned()
        }
    };
}

/// Return a [`PlannerError::Internal`] from the current function.
///
/// Usage is like [`panic!`], in that you can pass a format string and
/// arguments. When building in debug mode, the returned error also captures
/// file, line, and column information for further debugging purposes.
///
/// When called with no arguments, generates an internal error with the text
/// "entered unreachable code".
#[macro_export]
macro_rules! internal {
    () => {
        $crate::internal!("entered unreachable code")
    };
    ($($tt:tt)*) => {
        return Err($crate::internal_err(format!(
            "{}{}",
            $crate::__location_info!("in {}: "),
            format_args!($($tt)*)
        )).into())
    };
}

/// Return a [`PlannerError::Unsupported`] from the current function.
///
/// Usage is like [`panic!`], in that you can pass a format string and
/// arguments. When building in debug mode, the returned error also captures
/// file, line, and column information for further debugging purposes.
///
/// When called with no arguments, generates an unsupported error with the
/// text "operation not implemented yet".
#[macro_export]
macro_rules! unsupported {
    () => {
        $crate::unsupported!("operation not implemented yet")
    };
    ($($tt:tt)*) => {
        return Err($crate::unsupported_err(format!(
            "{}{}",
            format_args!($($tt)*),
            $crate::__location_info!()
        )).into())
    };
}

/// Return a [`PlannerError::Internal`] from the current function, if and
/// only if the argument evaluates to false.
///
/// This is intended to be used wherever [`assert!`] would be used in code
/// that can't afford to panic.
#[macro_export]
macro_rules! invariant {
    ($expr:expr, $($tt:tt)*) => {
        if !$expr {
            $crate::internal!($($tt)*);
        }
    };
    ($expr:expr) => {
        if !$expr {
            $crate::internal!("assertion failed: {}", std::stringify!($expr));
        }
    };
}

/// Return a [`PlannerError::Internal`] from the current function, if and
/// only if the two arguments aren't equal.
///
/// This is intended to be used wherever [`assert_eq!`] would be used in
/// code that can't afford to panic.
#[macro_export]
macro_rules! invariant_eq {
    ($expr1:expr, $expr2:expr) => {
        if $expr1 != $expr2 {
            $crate::internal!(
                "assertion failed: {} == {} ({:?} == {:?})",
                std::stringify!($expr1),
                std::stringify!($expr2),
                $expr1,
                $expr2
            );
        }
    };
    ($expr1:expr, $expr2:expr, $($tt:tt)*) => {
        if $expr1 != $expr2 {
            $crate::internal!($($tt)*);
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fails_invariant() -> PlannerResult<()> {
        invariant!(1 == 2, "one is not two");
        Ok(())
    }

    fn passes_invariant() -> PlannerResult<u32> {
        invariant_eq!(2 + 2, 4);
        Ok(42)
    }

    #[test]
    fn invariant_failure_is_internal() {
        let err = fails_invariant().unwrap_err();
        assert!(err.is_internal());
        assert!(err.to_string().contains("one is not two"));
    }

    #[test]
    fn invariant_success_is_transparent() {
        assert_eq!(passes_invariant().unwrap(), 42);
    }

    #[test]
    fn unsupported_formats_message() {
        fn check() -> PlannerResult<()> {
            unsupported!("no {} yet", "frobnication");
        }
        let err = check().unwrap_err();
        assert!(err.is_unsupported());
        assert!(err.to_string().contains("no frobnication yet"));
    }
}
