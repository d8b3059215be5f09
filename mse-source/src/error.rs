//! Script facing errors of media source operations.

use thiserror::Error;

/// DOM style exception returned by a failed media source operation.
///
/// A failed operation never changes any state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomError {
    #[error("InvalidStateError: {0}")]
    InvalidState(String),

    #[error("NotSupportedError: {0}")]
    NotSupported(String),

    #[error("TypeError: {0}")]
    Type(String),

    /// The member exists on the script surface but has no implementation.
    #[error("MediaSource.{0} is not implemented")]
    NotImplemented(&'static str),
}

/// A `Result` alias where the `Err` case is `mse_source::DomError`.
pub type Result<T> = std::result::Result<T, DomError>;
