//! Cipher error types

use std::borrow::Cow;

use crate::UserFacingError;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DecryptError {
    #[error("stream ended after {received} bytes, cipher header needs {required}")]
    TruncatedHeader { received: usize, required: usize },

    #[error("input length {len} is not aligned to cipher block size {block}")]
    Misaligned { len: usize, block: usize },

    #[error("padding rejected: {0}")]
    Padding(String),

    #[error("invalid key length: expected {expected} bytes, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("block size {0} must be a non-zero multiple of the cipher block size")]
    InvalidBlockSize(usize),

    #[error("cipher failure: {0}")]
    Cipher(String),
}

impl UserFacingError for DecryptError {
    fn user_message(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_string())
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::Padding(_) | Self::TruncatedHeader { .. } => {
                Some("The bundle is truncated or was encrypted with a different key.")
            }
            Self::InvalidKeyLength { .. } => Some("Provide a 16-byte (32 hex digit) key."),
            _ => None,
        }
    }

    fn user_code(&self) -> Option<&'static str> {
        let code = match self {
            Self::TruncatedHeader { .. } => "decrypt.truncated_header",
            Self::Misaligned { .. } => "decrypt.misaligned",
            Self::Padding(_) => "decrypt.padding",
            Self::InvalidKeyLength { .. } => "decrypt.invalid_key_length",
            Self::InvalidBlockSize(_) => "decrypt.invalid_block_size",
            Self::Cipher(_) => "decrypt.cipher",
        };
        Some(code)
    }
}
