//! Resumable harvesting of web novels into cached chapters, a merged project
//! file and windowed book exports.

pub mod cache;
pub mod config;
pub mod error;
pub mod export;
pub mod fetch;
pub mod layout;
pub mod model;
pub mod pipeline;
pub mod project;
pub mod scheduler;

// Re-export important types for easier use in tests
pub use cache::ChapterCache;
pub use config::HarvestConfig;
pub use error::{FetchError, HarvestError, RenderError};
pub use export::{ExportFormat, ExportPaginator, ExportRenderer, ExportWindow};
pub use fetch::{ChapterContentFetcher, NovelMetadataFetcher, ReadLightNovelClient};
pub use layout::WorkLayout;
pub use model::{ChapterContent, ChapterReference, ContentBlock, FetchedChapter, NovelMetadata};
pub use pipeline::{Harvester, RunSummary};
pub use project::{Project, ProjectStore};
pub use scheduler::{HarvestReport, HarvestScheduler};
