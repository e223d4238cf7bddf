//! Error types for capture sessions and export jobs

use thiserror::Error;

/// Result type alias for capture and export operations
pub type Result<T> = std::result::Result<T, Error>;

/// Message returned when discovery finds nothing to export.
pub const NO_PAGES_MESSAGE: &str =
    "No document pages found. Please scroll through the document first, or try refreshing the page.";

/// Errors that can occur while capturing or exporting a document
#[derive(Error, Debug)]
pub enum Error {
    /// Failed to start the browser or open the document view
    #[error("Initialization failed: {0}")]
    InitializationError(String),

    /// Failed to load a URL
    #[error("Failed to load URL: {0}")]
    LoadError(String),

    /// A script evaluated in the document failed or returned garbage
    #[error("Script execution failed: {0}")]
    ScriptError(String),

    /// Failed to turn a page element into a bitmap
    #[error("Rendering failed: {0}")]
    RenderError(String),

    /// Discovery returned no capturable page elements
    #[error("{}", NO_PAGES_MESSAGE)]
    NoPagesFound,

    /// The PDF or archive encoder could not be acquired from any source
    #[error("Failed to load encoder: {0}")]
    DependencyLoad(String),

    /// The encoder rejected a page or failed to finalize
    #[error("Encoding failed: {0}")]
    EncodeError(String),

    /// Operation timed out
    #[error("Operation timed out after {0}ms")]
    Timeout(u64),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    /// Writing an artifact failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CDP-specific error
    #[cfg(feature = "cdp")]
    #[error("CDP error: {0}")]
    CdpError(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

#[cfg(feature = "cdp")]
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::CdpError(err.to_string())
    }
}

impl From<image::ImageError> for Error {
    fn from(err: image::ImageError) -> Self {
        Error::RenderError(err.to_string())
    }
}

impl From<lopdf::Error> for Error {
    fn from(err: lopdf::Error) -> Self {
        Error::EncodeError(format!("pdf: {}", err))
    }
}

impl From<zip::result::ZipError> for Error {
    fn from(err: zip::result::ZipError) -> Self {
        Error::EncodeError(format!("zip: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_pages_message_is_user_facing() {
        let msg = Error::NoPagesFound.to_string();
        assert!(msg.starts_with("No document pages found"));
    }

    #[test]
    fn timeout_reports_millis() {
        assert_eq!(Error::Timeout(1500).to_string(), "Operation timed out after 1500ms");
    }

    #[cfg(feature = "cdp")]
    #[test]
    fn browser_errors_become_cdp_errors() {
        fn enable() -> Result<()> {
            let reply: anyhow::Result<()> = Err(anyhow::anyhow!("Fetch.enable rejected"));
            reply?;
            Ok(())
        }
        let err = enable().unwrap_err();
        assert!(matches!(err, Error::CdpError(ref m) if m == "Fetch.enable rejected"));
        assert_eq!(err.to_string(), "CDP error: Fetch.enable rejected");
    }
}
