//! Error types for the export pipeline

use thiserror::Error;

/// Result type alias for export operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that abort an export call.
///
/// Partial failures (a missing font, an unreachable stylesheet, an invalid
/// selector inside a stylesheet) never show up here: they are logged and the
/// resource is treated as absent.
#[derive(Error, Debug)]
pub enum Error {
    /// The input is not a drawable SVG element
    #[error("Attempted to render non-SVG element: {0}")]
    NotGraphic(String),

    /// No element matched the selector used to locate the graphic
    #[error("No element matches {0}")]
    NotFound(String),

    /// A caller supplied selector could not be parsed
    #[error("Invalid selector: {0}")]
    InvalidSelector(String),

    /// A documented option that has no implementation
    #[error("Not implemented: {0}")]
    NotImplemented(String),

    /// An `<image>` reference could not be loaded or decoded
    #[error("Could not load {0}")]
    ImageLoad(String),

    /// The inlined markup failed to decode as an image
    #[error("Error loading data uri as image:\n{markup}\nOpen the following link to see the diagnosis\n{uri}")]
    RasterDecode { markup: String, uri: String },

    /// Raster encoding failed
    #[error("Encoding failed: {0}")]
    Encode(String),

    /// Network error on a path that cannot degrade gracefully
    #[error("Network error: {0}")]
    Network(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Filesystem error while saving an artifact
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
