use std::path::{Path, PathBuf};
use std::sync::Arc;

use indicatif::ProgressBar;
use tracing::Span;

use crate::cache::{ChapterCache, write_atomic};
use crate::config::HarvestConfig;
use crate::error::HarvestError;
use crate::export::{ExportFormat, ExportPaginator, ExportRenderer, PdfRenderer, renderer_for};
use crate::fetch::{ChapterContentFetcher, NovelMetadataFetcher};
use crate::layout::WorkLayout;
use crate::model::NovelMetadata;
use crate::project::ProjectStore;
use crate::scheduler::HarvestScheduler;

const DONE_DETAIL: &str = "The epub/docx has been downloaded and generated";

/// Outcome of one harvest run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub success: bool,
    pub detail: String,
    pub title: String,
    pub work_dir: PathBuf,
    pub project_path: PathBuf,
    /// Chapters listed by the metadata
    pub chapters_listed: usize,
    /// Chapters held by the persisted project after merging
    pub chapters_in_project: usize,
    pub cache_hits: usize,
    pub fetched: usize,
    /// Orders dropped from this run, ascending
    pub failed_chapters: Vec<u32>,
    pub cache_write_failures: usize,
    pub project_persisted: bool,
    pub exports_rendered: Vec<PathBuf>,
    pub exports_skipped: Vec<PathBuf>,
    pub export_failures: usize,
}

/// Runs metadata fetch, chapter harvest, project merge and export for a work
pub struct Harvester {
    config: HarvestConfig,
    metadata: Arc<dyn NovelMetadataFetcher>,
    chapters: Arc<dyn ChapterContentFetcher>,
    renderers: Vec<Box<dyn ExportRenderer>>,
    progress: ProgressBar,
}

impl Harvester {
    pub fn new(
        config: HarvestConfig,
        metadata: Arc<dyn NovelMetadataFetcher>,
        chapters: Arc<dyn ChapterContentFetcher>,
    ) -> Self {
        let renderers = build_renderers(&config.formats, config.pdf_font.as_deref());
        Self {
            config,
            metadata,
            chapters,
            renderers,
            progress: ProgressBar::hidden(),
        }
    }

    /// Replaces the renderers derived from `config.formats`
    pub fn with_renderers(mut self, renderers: Vec<Box<dyn ExportRenderer>>) -> Self {
        self.renderers = renderers;
        self
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    pub fn config(&self) -> &HarvestConfig {
        &self.config
    }

    pub async fn run(&self, work_link: &str) -> Result<RunSummary, HarvestError> {
        self.config.validate()?;

        let span = tracing::info_span!("harvest", work = %work_link);
        tracing::info!(parent: &span, "extracting novel information");
        let metadata = self.metadata.fetch_metadata(work_link).await.map_err(|e| {
            tracing::error!(parent: &span, error = %e, "cannot extract novel information");
            HarvestError::MetadataFetch(e)
        })?;
        tracing::info!(
            parent: &span,
            title = %metadata.title,
            chapters = metadata.chapters.len(),
            "novel information extracted"
        );

        let layout = WorkLayout::new(&self.config.output_root, &metadata.title);
        layout.ensure_dirs()?;
        let cover = self.ensure_cover(&layout, &metadata, &span).await;

        let cache = ChapterCache::new(layout.clone());
        let report = HarvestScheduler::new(&cache, self.chapters.as_ref())
            .with_batch_size(self.config.batch_size)
            .with_progress(self.progress.clone())
            .with_span(span.clone())
            .harvest(&metadata.chapters)
            .await;

        let mut failed_chapters = report.failures.iter().map(|f| f.order).collect::<Vec<_>>();
        failed_chapters.sort_unstable();
        if !failed_chapters.is_empty() {
            tracing::warn!(parent: &span, failed = ?failed_chapters, "some chapters were not harvested");
        }

        let store = ProjectStore::new(layout.project_path());
        let existing = self.load_project(&store, &span);
        if existing.is_some() {
            tracing::info!(parent: &span, "merging existing project file");
        }
        let project = store.merge(&metadata, report.chapters, existing);

        let project_persisted = match store.persist(&project) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(parent: &span, path = %store.path().display(), error = %e, "project file not written");
                false
            }
        };

        let exports = ExportPaginator::new(layout.clone(), &self.renderers)
            .with_window_size(self.config.window_size)
            .with_span(span.clone())
            .export(&project, cover.as_deref());

        tracing::info!(
            parent: &span,
            rendered = exports.rendered.len(),
            skipped = exports.skipped.len(),
            failed = exports.failures.len(),
            "export finished"
        );

        Ok(RunSummary {
            success: true,
            detail: DONE_DETAIL.to_string(),
            title: layout.title().to_string(),
            work_dir: layout.root().to_path_buf(),
            project_path: store.path().to_path_buf(),
            chapters_listed: metadata.chapters.len(),
            chapters_in_project: project.chapters.len(),
            cache_hits: report.cache_hits,
            fetched: report.fetched,
            failed_chapters,
            cache_write_failures: report.cache_write_failures,
            project_persisted,
            exports_rendered: exports.rendered,
            exports_skipped: exports.skipped,
            export_failures: exports.failures.len(),
        })
    }

    /// Previously persisted project; an unreadable file is moved aside so it is not overwritten
    fn load_project(&self, store: &ProjectStore, span: &Span) -> Option<crate::project::Project> {
        match store.load_existing() {
            Ok(existing) => existing,
            Err(err @ (HarvestError::Project { .. } | HarvestError::UnsupportedVersion { .. })) => {
                match store.set_aside() {
                    Ok(backup) => tracing::warn!(
                        parent: span,
                        error = %err,
                        backup = %backup.display(),
                        "existing project unusable, starting a new one"
                    ),
                    Err(e) => tracing::error!(parent: span, error = %e, "cannot move unusable project aside"),
                }
                None
            }
            Err(err) => {
                tracing::error!(parent: span, error = %err, "cannot read existing project");
                None
            }
        }
    }

    /// Cover on disk, downloading it first when the work folder has none
    async fn ensure_cover(&self, layout: &WorkLayout, metadata: &NovelMetadata, span: &Span) -> Option<PathBuf> {
        if let Some(existing) = layout.find_cover() {
            return Some(existing);
        }
        if metadata.cover_reference.is_empty() {
            return None;
        }

        let bytes = match self.metadata.fetch_cover(&metadata.cover_reference).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(parent: span, error = %e, "cover not downloaded");
                return None;
            }
        };
        let extension = match image::guess_format(&bytes) {
            Ok(format) => format.extensions_str().first().copied().unwrap_or("img"),
            Err(e) => {
                tracing::warn!(parent: span, error = %e, "cover is not a recognised image");
                return None;
            }
        };

        let path = layout.cover_path(extension);
        match write_atomic(&path, &bytes) {
            Ok(()) => {
                tracing::debug!(parent: span, path = %path.display(), "cover saved");
                Some(path)
            }
            Err(e) => {
                tracing::warn!(parent: span, path = %path.display(), error = %e, "cover not saved");
                None
            }
        }
    }
}

fn build_renderers(formats: &[ExportFormat], pdf_font: Option<&Path>) -> Vec<Box<dyn ExportRenderer>> {
    formats
        .iter()
        .map(|format| match (format, pdf_font) {
            (ExportFormat::Pdf, Some(font)) => Box::new(PdfRenderer::with_font(font)) as Box<dyn ExportRenderer>,
            _ => renderer_for(*format),
        })
        .collect()
}
