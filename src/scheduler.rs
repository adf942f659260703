use futures::future::join_all;
use indicatif::ProgressBar;
use tracing::{Instrument, Span};

use crate::cache::ChapterCache;
use crate::error::HarvestError;
use crate::fetch::ChapterContentFetcher;
use crate::model::{ChapterContent, ChapterReference};

/// Default number of chapters requested concurrently
pub const DEFAULT_BATCH_SIZE: usize = 25;

/// Where a chapter obtained during a run came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChapterSource {
    Cache,
    Network,
}

#[derive(Debug)]
pub struct ObtainedChapter {
    pub content: ChapterContent,
    pub source: ChapterSource,
    /// Set when the chapter was fetched but could not be persisted
    pub cache_error: Option<HarvestError>,
}

#[derive(Debug)]
pub struct ChapterFailure {
    pub order: u32,
    pub link: String,
    pub error: HarvestError,
}

/// Everything a harvest produced, successes and failures alike
#[derive(Debug, Default)]
pub struct HarvestReport {
    /// Unordered; consumers sort by `order`
    pub chapters: Vec<ChapterContent>,
    pub failures: Vec<ChapterFailure>,
    pub cache_hits: usize,
    pub fetched: usize,
    pub cache_write_failures: usize,
    pub batches: usize,
}

/// Drives chapter fetches in fixed-size batches against the cache
///
/// Every task of a batch settles before the next batch is dispatched, which
/// caps the number of requests outstanding against the remote source.
pub struct HarvestScheduler<'a> {
    cache: &'a ChapterCache,
    fetcher: &'a dyn ChapterContentFetcher,
    batch_size: usize,
    progress: ProgressBar,
    span: Span,
}

impl<'a> HarvestScheduler<'a> {
    pub fn new(cache: &'a ChapterCache, fetcher: &'a dyn ChapterContentFetcher) -> Self {
        Self {
            cache,
            fetcher,
            batch_size: DEFAULT_BATCH_SIZE,
            progress: ProgressBar::hidden(),
            span: Span::current(),
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    /// Parent span for the per-batch spans
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub async fn harvest(&self, references: &[ChapterReference]) -> HarvestReport {
        let mut report = HarvestReport::default();
        self.progress.set_length(references.len() as u64);

        tracing::info!(parent: &self.span, chapters = references.len(), batch_size = self.batch_size, "downloading novel chapters");

        for (index, batch) in references.chunks(self.batch_size).enumerate() {
            let batch_span = tracing::info_span!(parent: &self.span, "batch", index, size = batch.len());
            let outcomes = join_all(batch.iter().map(|reference| {
                self.obtain(reference).instrument(batch_span.clone())
            }))
            .await;
            report.batches += 1;

            for outcome in outcomes {
                match outcome {
                    Ok(obtained) => {
                        match obtained.source {
                            ChapterSource::Cache => report.cache_hits += 1,
                            ChapterSource::Network => report.fetched += 1,
                        }
                        if obtained.cache_error.is_some() {
                            report.cache_write_failures += 1;
                        }
                        report.chapters.push(obtained.content);
                    }
                    Err(failure) => report.failures.push(failure),
                }
            }
        }

        self.progress.finish_with_message(format!(
            "{} chapters ready, {} failed",
            report.chapters.len(),
            report.failures.len()
        ));
        report
    }

    async fn obtain(&self, reference: &ChapterReference) -> Result<ObtainedChapter, ChapterFailure> {
        let result = self.obtain_inner(reference).await;
        self.progress.inc(1);
        result
    }

    async fn obtain_inner(&self, reference: &ChapterReference) -> Result<ObtainedChapter, ChapterFailure> {
        let order = reference.order;
        let fail = |error: HarvestError| ChapterFailure {
            order,
            link: reference.link.clone(),
            error,
        };

        if self.cache.exists(order) {
            match self.cache.load(order) {
                Ok(content) => {
                    return Ok(ObtainedChapter {
                        content,
                        source: ChapterSource::Cache,
                        cache_error: None,
                    });
                }
                Err(err @ HarvestError::CorruptRecord { .. }) => {
                    tracing::warn!(order, error = %err, "refetching unreadable cache record");
                }
                Err(err) => {
                    tracing::error!(order, error = %err, "cannot use cached chapter");
                    return Err(fail(err));
                }
            }
        }

        let fetched = match self.fetcher.fetch_chapter(&reference.link).await {
            Ok(fetched) => fetched,
            Err(source) => {
                let err = HarvestError::ChapterFetch {
                    order,
                    link: reference.link.clone(),
                    source,
                };
                tracing::error!(order, error = %err, "dropping chapter from this run");
                return Err(fail(err));
            }
        };

        let content = ChapterContent::from_fetched(reference, fetched);
        let cache_error = match self.cache.store(&content) {
            Ok(()) => None,
            Err(err) => {
                tracing::error!(order, error = %err, "chapter fetched but not cached");
                Some(err)
            }
        };

        Ok(ObtainedChapter {
            content,
            source: ChapterSource::Network,
            cache_error,
        })
    }
}
