use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::export::{ExportFormat, ExportWindow};

/// Failure reported by a remote collaborator (metadata or chapter fetch).
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Failed to make HTTP request: {0}")]
    RequestFailed(#[from] reqwest::Error),
    #[error("HTTP error {status} for URL {url}")]
    HttpStatus { status: u16, url: String },
    #[error("Invalid CSS selector: {0}")]
    SelectorError(String),
    #[error("Element not found: {0}")]
    ElementNotFound(String),
    #[error("Gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: Box<FetchError> },
}

impl FetchError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::RequestFailed(e) => !e.is_builder() && !e.is_decode(),
            FetchError::HttpStatus { status, .. } => {
                matches!(status, 408 | 413 | 429 | 500 | 502 | 503 | 504 | 521 | 522 | 524)
            }
            _ => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Cannot extract novel information: {0}")]
    MetadataFetch(#[source] FetchError),
    #[error("Failed to fetch chapter {order} ({link}): {source}")]
    ChapterFetch {
        order: u32,
        link: String,
        #[source]
        source: FetchError,
    },
    #[error("No cache record for chapter {0}")]
    NotFound(u32),
    #[error("Failed to write cache for chapter {order}: {source}")]
    CacheWrite {
        order: u32,
        #[source]
        source: io::Error,
    },
    #[error("Unreadable cache record for chapter {order}: {reason}")]
    CorruptRecord { order: u32, reason: String },
    #[error("Unsupported {kind} schema version {found} (supported up to {supported})")]
    UnsupportedVersion {
        kind: &'static str,
        found: u32,
        supported: u32,
    },
    #[error("Project file {}: {reason}", path.display())]
    Project { path: PathBuf, reason: String },
    #[error("Failed to render {format} for chapters {window}: {source}")]
    Render {
        format: ExportFormat,
        window: ExportWindow,
        #[source]
        source: RenderError,
    },
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("IO operation failed: {0}")]
    IoError(#[from] io::Error),
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Failure inside a concrete book renderer.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("IO operation failed: {0}")]
    IoError(#[from] io::Error),
    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("PDF generation error: {0}")]
    PdfGenerationError(String),
    #[error("Image processing error: {0}")]
    ImageProcessingError(String),
}

impl From<genpdf::error::Error> for RenderError {
    fn from(err: genpdf::error::Error) -> Self {
        RenderError::PdfGenerationError(err.to_string())
    }
}
