//! Error types for subsample decryption.

use thiserror::Error;

/// Errors that can occur while decrypting a packet.
///
/// Every variant aborts only the packet being decrypted.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// Encryption metadata is malformed or self-inconsistent.
    #[error("invalid container data: {0}")]
    InvalidContainerData(&'static str),

    /// The scheme or the requested operation cannot be serviced.
    #[error("not supported: {0}")]
    NotSupported(String),

    /// The CDM has no key for the packet's key id.
    #[error("key not found for KID: {0}")]
    KeyNotFound(String),

    /// The CDM failed for a reason it did not classify.
    #[error("unknown decryption error")]
    UnknownError,

    /// Encryption side data is present but could not be materialised.
    #[error("could not allocate encryption info from packet side data")]
    OutOfMemory,

    /// Invalid hex string.
    #[error("invalid hex string: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    /// Key or key id is not 16 bytes long.
    #[error("invalid key size: expected 16 bytes, got {0} bytes")]
    InvalidKeySize(usize),

    /// No decryption keys provided.
    #[error("no decryption keys provided - use .key(kid, key) to add keys")]
    NoKeys,

    /// Key pair was not given as `KID:KEY`.
    #[error("invalid key format '{0}' (expected KID:KEY)")]
    InvalidKeyFormat(String),

    /// An mp4 box could not be read.
    #[error("cannot read mp4 box: {0}")]
    Mp4(String),
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Mp4(value.to_string())
    }
}

/// A `Result` alias where the `Err` case is `cenc_decrypt::Error`.
pub type Result<T> = std::result::Result<T, Error>;
