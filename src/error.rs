//! The error type returned by every fallible operation in the crate.

use thiserror::Error;

/// Represents errors that can occur in the certfactory library.
///
/// All of them are fatal to the operation that produced them; nothing is
/// retried and no fallback format or tool is chosen on the caller's behalf.
#[derive(Debug, Error)]
pub enum CertFactoryError {
    /// The distinguished name is missing its common name or has a malformed field.
    #[error("Invalid distinguished name: {0}")]
    InvalidDistinguishedName(String),

    /// The destination file extension does not map to a known container format.
    #[error("Unsupported certificate format `{0}`")]
    UnsupportedFormat(String),

    /// A required external tool or crypto provider is not available.
    #[error("Missing capability: {0}")]
    MissingCapability(String),

    /// An external tool exited with a non-zero status.
    #[error("Command failed: {command}\n{output}")]
    ExternalToolFailure {
        /// The rendered command line.
        command: String,
        /// Captured diagnostic output of the tool.
        output: String,
    },

    /// The backend does not provide this operation.
    #[error("Not implemented: {0}")]
    NotImplemented(String),

    /// The certificate was replaced or its factory torn down.
    #[error("Certificate `{0}` was replaced or destroyed")]
    Replaced(String),

    /// Error during data encoding.
    #[error("Failed to encode data: {0}")]
    EncodingError(String),

    /// Error during data decoding.
    #[error("Failed to decode data: {0}")]
    DecodingError(String),

    /// Error due to invalid input.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Error during key generation.
    #[error("Key generation error: {0}")]
    KeyGenerationError(String),

    /// Filesystem or process I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized Result type for certfactory operations.
pub type Result<T> = std::result::Result<T, CertFactoryError>;

impl From<der::Error> for CertFactoryError {
    /// Converts a `der::Error` into a `CertFactoryError`.
    fn from(err: der::Error) -> Self {
        CertFactoryError::DecodingError(err.to_string())
    }
}

impl From<rsa::Error> for CertFactoryError {
    fn from(err: rsa::Error) -> Self {
        CertFactoryError::KeyGenerationError(err.to_string())
    }
}

impl From<pkcs8::Error> for CertFactoryError {
    fn from(err: pkcs8::Error) -> Self {
        CertFactoryError::DecodingError(err.to_string())
    }
}

impl From<pkcs8::spki::Error> for CertFactoryError {
    fn from(err: pkcs8::spki::Error) -> Self {
        CertFactoryError::EncodingError(err.to_string())
    }
}

impl From<pem::PemError> for CertFactoryError {
    fn from(err: pem::PemError) -> Self {
        CertFactoryError::DecodingError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn external_tool_failure_embeds_command_and_output() {
        let err = CertFactoryError::ExternalToolFailure {
            command: "keytool -importcert".to_string(),
            output: "keystore password was incorrect".to_string(),
        };
        let message = err.to_string();
        assert!(message.contains("keytool -importcert"));
        assert!(message.contains("keystore password was incorrect"));
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<CertFactoryError>();
    }
}
