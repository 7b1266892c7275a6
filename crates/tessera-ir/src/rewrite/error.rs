//! Error types for dialect conversion.

use derive_more::{Display, From};

use crate::symbol::OpName;

pub type ConversionResult<T> = Result<T, ConversionError>;

/// A failed conversion. The graph has already been rolled back when a
/// caller observes this error.
#[derive(Clone, Display, Debug, From, PartialEq)]
#[display("{kind}")]
pub struct ConversionError {
    #[from]
    kind: Box<ConversionErrorKind>,
}

impl<E> From<E> for ConversionError
where
    ConversionErrorKind: From<E>,
{
    fn from(error: E) -> Self {
        ConversionError {
            kind: Box::new(ConversionErrorKind::from(error)),
        }
    }
}

impl ConversionError {
    pub fn kind(&self) -> &ConversionErrorKind {
        &self.kind
    }

    pub fn unconvertible_type(op: OpName, ty: impl Into<String>, rendered: String) -> Self {
        ConversionErrorKind::UnconvertibleType {
            op,
            ty: ty.into(),
            rendered,
        }
        .into()
    }

    pub fn stalled(op: OpName, pending: usize, rendered: String) -> Self {
        ConversionErrorKind::StalledLegalization {
            op,
            pending,
            rendered,
        }
        .into()
    }

    pub fn pattern_failure(
        pattern: &'static str,
        op: OpName,
        reason: impl std::fmt::Display,
        rendered: String,
    ) -> Self {
        ConversionErrorKind::PatternFailure {
            pattern,
            op,
            reason: reason.to_string(),
            rendered,
        }
        .into()
    }

    pub fn iteration_limit(passes: usize, pending: usize) -> Self {
        ConversionErrorKind::IterationLimit { passes, pending }.into()
    }

    pub fn invalid_root(reason: impl std::fmt::Display) -> Self {
        ConversionErrorKind::InvalidRoot {
            reason: reason.to_string(),
        }
        .into()
    }
}

#[derive(Clone, Display, Debug, PartialEq)]
pub enum ConversionErrorKind {
    #[display("type `{ty}` used by `{op}` has no conversion\n{rendered}")]
    UnconvertibleType {
        op: OpName,
        ty: String,
        rendered: String,
    },

    #[display("failed to legalize `{op}` ({pending} operation(s) still pending)\n{rendered}")]
    StalledLegalization {
        op: OpName,
        pending: usize,
        rendered: String,
    },

    #[display("pattern `{pattern}` failed on `{op}`: {reason}\n{rendered}")]
    PatternFailure {
        pattern: &'static str,
        op: OpName,
        reason: String,
        rendered: String,
    },

    #[display("conversion did not converge within {passes} passes ({pending} operation(s) pending)")]
    IterationLimit { passes: usize, pending: usize },

    #[display("invalid conversion root: {reason}")]
    InvalidRoot { reason: String },
}

impl std::error::Error for ConversionError {}
