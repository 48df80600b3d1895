use thiserror::Error;

/// Represents errors that can occur in the certfactory library.
///
/// Input validation and cryptographic failures are recoverable: the caller
/// fixes the input and tries again. [`CertFactoryError::Corrupt`] is the odd
/// one out, see [`CertFactoryError::is_fatal`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CertFactoryError {
    /// A request field failed validation.
    ///
    /// `context` is the path of the offending field, e.g.
    /// `requests[1].alternate_names[0]`.
    #[error("Invalid input at {context}: {message}")]
    InvalidInput { context: String, message: String },

    /// The requested export or conversion format is not supported.
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Error during key generation.
    #[error("Key generation error: {0}")]
    KeyGenerationError(String),

    /// Error while producing a signature.
    #[error("Signing error: {0}")]
    SigningError(String),

    /// Error during data encoding.
    #[error("Failed to encode data: {0}")]
    EncodingError(String),

    /// Error during data decoding.
    #[error("Failed to decode data: {0}")]
    DecodingError(String),

    /// Error building or opening a PKCS#12 bundle.
    #[error("PKCS#12 error: {0}")]
    Pkcs12Error(String),

    /// The supplied password does not open the encrypted data.
    #[error("Incorrect password")]
    InvalidPassword,

    /// Stored certificate or key data is damaged, or describes a key this
    /// engine never produces.
    #[error("Corrupt certificate data: {0}")]
    Corrupt(String),
}

impl CertFactoryError {
    /// Builds an [`CertFactoryError::InvalidInput`] for the given field path.
    pub fn invalid(context: impl Into<String>, message: impl Into<String>) -> Self {
        CertFactoryError::InvalidInput {
            context: context.into(),
            message: message.into(),
        }
    }

    /// Prefixes the field path of a validation error.
    ///
    /// Errors that carry a message get `prefix: ` in front of it instead;
    /// `InvalidPassword` is returned unchanged.
    pub fn with_context(self, prefix: &str) -> Self {
        let tag = |message: String| format!("{prefix}: {message}");
        match self {
            CertFactoryError::InvalidInput { context, message } => {
                let context = if context.is_empty() {
                    prefix.to_string()
                } else {
                    format!("{prefix}.{context}")
                };
                CertFactoryError::InvalidInput { context, message }
            }
            CertFactoryError::UnsupportedFormat(m) => CertFactoryError::UnsupportedFormat(tag(m)),
            CertFactoryError::KeyGenerationError(m) => CertFactoryError::KeyGenerationError(tag(m)),
            CertFactoryError::SigningError(m) => CertFactoryError::SigningError(tag(m)),
            CertFactoryError::EncodingError(m) => CertFactoryError::EncodingError(tag(m)),
            CertFactoryError::DecodingError(m) => CertFactoryError::DecodingError(tag(m)),
            CertFactoryError::Pkcs12Error(m) => CertFactoryError::Pkcs12Error(tag(m)),
            CertFactoryError::Corrupt(m) => CertFactoryError::Corrupt(tag(m)),
            CertFactoryError::InvalidPassword => CertFactoryError::InvalidPassword,
        }
    }

    /// Whether the error signals corrupted stored data rather than bad input.
    ///
    /// Fatal errors must not be retried with the same data.
    pub fn is_fatal(&self) -> bool {
        matches!(self, CertFactoryError::Corrupt(_))
    }
}

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

impl From<rsa::pkcs1::Error> for CertFactoryError {
    fn from(err: rsa::pkcs1::Error) -> Self {
        CertFactoryError::DecodingError(err.to_string())
    }
}

impl From<pkcs8::Error> for CertFactoryError {
    fn from(err: pkcs8::Error) -> Self {
        CertFactoryError::DecodingError(err.to_string())
    }
}

impl From<pkcs8::spki::Error> for CertFactoryError {
    fn from(err: pkcs8::spki::Error) -> Self {
        CertFactoryError::DecodingError(err.to_string())
    }
}

impl From<pem::PemError> for CertFactoryError {
    fn from(err: pem::PemError) -> Self {
        CertFactoryError::DecodingError(err.to_string())
    }
}

impl From<p12_keystore::error::Error> for CertFactoryError {
    fn from(err: p12_keystore::error::Error) -> Self {
        match err {
            p12_keystore::error::Error::MacError(_) => CertFactoryError::InvalidPassword,
            other => CertFactoryError::Pkcs12Error(other.to_string()),
        }
    }
}
