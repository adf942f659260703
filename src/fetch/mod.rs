//! Remote collaborators: novel metadata and chapter content.

mod readlightnovel;

use std::future::Future;
use std::time::Duration;

use crate::error::FetchError;
use crate::model::{FetchedChapter, NovelMetadata};

pub use readlightnovel::{ReadLightNovelClient, parse_chapter_page, parse_novel_page};

/// Retrieves work metadata and the ordered chapter list.
#[async_trait::async_trait]
pub trait NovelMetadataFetcher: Send + Sync {
    async fn fetch_metadata(&self, work_link: &str) -> Result<NovelMetadata, FetchError>;

    /// Downloads the cover image referenced by the metadata.
    async fn fetch_cover(&self, cover_reference: &str) -> Result<Vec<u8>, FetchError>;
}

/// Retrieves the content of a single chapter.
#[async_trait::async_trait]
pub trait ChapterContentFetcher: Send + Sync {
    async fn fetch_chapter(&self, link: &str) -> Result<FetchedChapter, FetchError>;
}

#[derive(Debug, Clone)]
pub struct FetchSettings {
    /// Total attempts per request, the first one included
    pub attempts: u32,
    /// Delay before retry `n` is `backoff * n`
    pub backoff: Duration,
    pub request_timeout: Duration,
    pub user_agent: String,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: Duration::from_millis(500),
            request_timeout: Duration::from_secs(60),
            user_agent: concat!("novel-harvest/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Runs `operation` until it succeeds, fails with a non-transient error, or
/// `settings.attempts` is used up.
pub async fn with_retry<T, F, Fut>(
    settings: &FetchSettings,
    what: &str,
    mut operation: F,
) -> Result<T, FetchError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    let attempts = settings.attempts.max(1);
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if !err.is_transient() => return Err(err),
            Err(err) if attempt >= attempts => {
                if attempts == 1 {
                    return Err(err);
                }
                return Err(FetchError::Exhausted {
                    attempts,
                    last: Box::new(err),
                });
            }
            Err(err) => {
                tracing::debug!(target: "novel_harvest::fetch", %what, attempt, error = %err, "retrying");
                tokio::time::sleep(settings.backoff * attempt).await;
                attempt += 1;
            }
        }
    }
}
