/*!
 * Error types for the yaetwai application.
 *
 * This module contains custom error types for different parts of the application,
 * using the thiserror crate for ergonomic error definitions.
 */

use thiserror::Error;

/// Errors that can occur when working with provider APIs
#[derive(Error, Debug)]
pub enum ProviderError {
    /// Error when making an API request fails
    #[error("API request failed: {0}")]
    RequestFailed(String),

    /// Error when parsing an API response fails
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    /// Error returned by the API itself
    #[error("API responded with error: {status_code} - {message}")]
    ApiError {
        /// HTTP status code
        status_code: u16,
        /// Error message from the API
        message: String,
    },

    /// Error establishing or maintaining a connection
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Error related to rate limiting
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    /// Error with authentication
    #[error("Authentication error: {0}")]
    AuthenticationError(String),
}

impl ProviderError {
    /// Whether another attempt at the same call may succeed.
    ///
    /// Network failures, rate limiting and server-side errors are transient;
    /// malformed requests and bad credentials are not.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::RequestFailed(_) | Self::ConnectionError(_) | Self::RateLimitExceeded(_) => true,
            Self::ApiError { status_code, .. } => *status_code == 429 || *status_code >= 500,
            Self::ParseError(_) | Self::AuthenticationError(_) => false,
        }
    }
}

/// Errors raised by the EPUB container and markup layer
#[derive(Error, Debug)]
pub enum EpubError {
    /// The archive itself could not be read or written
    #[error("Zip archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// META-INF/container.xml is absent or names no rootfile
    #[error("Missing container: {0}")]
    MissingContainer(String),

    /// The package document named by the container is absent
    #[error("Missing package document: {0}")]
    MissingPackage(String),

    /// XML that must be well formed (container, package, NCX) is not
    #[error("Malformed XML in {path}: {message}")]
    MalformedXml {
        /// Archive path of the offending document
        path: String,
        /// Parser message
        message: String,
    },

    /// An I/O failure while reading or writing the book
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur during translation
#[derive(Error, Debug)]
pub enum TranslationError {
    /// Error from the provider API
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Error from the book container
    #[error("EPUB error: {0}")]
    Epub(#[from] EpubError),

    /// A batch or item could not be completed
    #[error("Translation of {item_id} failed: {message}")]
    Item {
        /// Document item id
        item_id: String,
        /// What went wrong
        message: String,
    },
}

/// Main application error type that wraps all other errors
#[derive(Error, Debug)]
pub enum AppError {
    /// Error from a file operation
    #[error("File error: {0}")]
    File(String),

    /// Error from a provider
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Error from the book container
    #[error("EPUB error: {0}")]
    Epub(#[from] EpubError),

    /// Error from translation
    #[error("Translation error: {0}")]
    Translation(#[from] TranslationError),

    /// Any other error
    #[error("Unknown error: {0}")]
    Unknown(String),
}

// Utility functions for error conversion
impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        Self::Unknown(error.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(error: std::io::Error) -> Self {
        Self::File(error.to_string())
    }
}
