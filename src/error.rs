//! Error types for the capture pipeline

use thiserror::Error;

/// Result type alias for capture operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while capturing or delivering an element image
#[derive(Error, Debug)]
pub enum Error {
    /// The capture target could not be resolved. Fatal, raised before any route runs.
    #[error("Element not found: {0}")]
    ElementNotFound(String),

    /// The vector document did not finish loading in time
    #[error("Image load timed out after {0}ms")]
    LoadTimeout(u64),

    /// The host refused the draw (tainted by cross-origin content)
    #[error("Security restricted: {0}")]
    SecurityRestricted(String),

    /// The image loader rejected the resource
    #[error("Failed to load image: {0}")]
    ImageLoad(String),

    /// The pixel buffer could not be turned into encoded bytes
    #[error("Encoding failed: {0}")]
    EncodingFailed(String),

    /// The clipboard cannot accept the image
    #[error("Clipboard unavailable: {0}")]
    ClipboardUnavailable(String),

    /// A rendering step failed
    #[error("Rendering failed: {0}")]
    Render(String),

    /// Download or clipboard hand-off failed
    #[error("Delivery failed: {0}")]
    Delivery(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Network error while fetching a page or stylesheet
    #[cfg(feature = "fetch")]
    #[error("Network error: {0}")]
    Network(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Route-local failures are recovered by advancing to the next route.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Error::ElementNotFound(_))
    }
}

#[cfg(feature = "fetch")]
impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Network(err.to_string())
    }
}
