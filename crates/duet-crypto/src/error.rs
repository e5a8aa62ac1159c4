//! Error types for cryptographic operations

use thiserror::Error;

/// Errors from key decoding, agreement, and payload encryption.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    /// Input was not valid standard Base64
    #[error("invalid base64: {reason}")]
    InvalidBase64 {
        /// Decoder error description
        reason: String,
    },

    /// Decoded key material has the wrong length
    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength {
        /// Expected key length in bytes
        expected: usize,
        /// Actual decoded length in bytes
        actual: usize,
    },

    /// Public and private halves do not belong to the same key pair
    #[error("public key does not match private key")]
    KeyPairMismatch,

    /// Peer key produced an all-zero shared secret (low-order point)
    #[error("peer public key is not contributory")]
    NonContributory,

    /// Payload is shorter than nonce plus authentication tag
    #[error("payload too short: {len} bytes")]
    PayloadTooShort {
        /// Decoded payload length in bytes
        len: usize,
    },

    /// AEAD encryption failed
    #[error("encryption failed")]
    EncryptionFailed,

    /// AEAD authentication failed (wrong key or tampered payload)
    #[error("decryption failed: authentication tag mismatch")]
    DecryptionFailed,

    /// Decrypted bytes are not valid UTF-8
    #[error("decrypted payload is not valid utf-8")]
    InvalidUtf8,
}

impl CryptoError {
    /// Returns true if the error was caused by malformed input rather than by
    /// an authentication failure.
    pub fn is_malformed_input(&self) -> bool {
        match self {
            Self::InvalidBase64 { .. }
            | Self::InvalidKeyLength { .. }
            | Self::PayloadTooShort { .. }
            | Self::InvalidUtf8 => true,

            Self::KeyPairMismatch
            | Self::NonContributory
            | Self::EncryptionFailed
            | Self::DecryptionFailed => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_payload_is_malformed() {
        assert!(CryptoError::PayloadTooShort { len: 3 }.is_malformed_input());
    }

    #[test]
    fn tag_mismatch_is_not_malformed() {
        assert!(!CryptoError::DecryptionFailed.is_malformed_input());
    }

    #[test]
    fn error_display() {
        let err = CryptoError::InvalidKeyLength { expected: 32, actual: 31 };
        assert_eq!(err.to_string(), "invalid key length: expected 32, got 31");
    }
}
