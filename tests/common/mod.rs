#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Mutex;

use novel_harvest::{
    ChapterContentFetcher, ChapterReference, ContentBlock, ExportFormat, FetchError, FetchedChapter,
    HarvestConfig, NovelMetadata, NovelMetadataFetcher,
};

pub const WORK_LINK: &str = "https://novels.test/novel/the-long-road";
pub const TITLE: &str = "The Long Road: Part 1?";

// 1x1 transparent PNG
pub const PNG: [u8; 67] = [
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44,
    0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F,
    0x15, 0xC4, 0x89, 0x00, 0x00, 0x00, 0x0A, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9C, 0x63, 0x00,
    0x01, 0x00, 0x00, 0x05, 0x00, 0x01, 0x0D, 0x0A, 0x2D, 0xB4, 0x00, 0x00, 0x00, 0x00, 0x49,
    0x45, 0x4E, 0x44, 0xAE, 0x42, 0x60, 0x82,
];

pub fn chapter_link(order: u32) -> String {
    format!("https://novels.test/the-long-road/chapter-{}", order)
}

/// In-memory novel site serving metadata, a cover and chapters
pub struct FakeSite {
    chapter_count: u32,
    metadata_down: bool,
    failing: Mutex<HashSet<String>>,
    fetches: Mutex<HashMap<String, usize>>,
    cover_fetches: Mutex<usize>,
}

impl FakeSite {
    pub fn new(chapter_count: u32) -> Self {
        Self {
            chapter_count,
            metadata_down: false,
            failing: Mutex::new(HashSet::new()),
            fetches: Mutex::new(HashMap::new()),
            cover_fetches: Mutex::new(0),
        }
    }

    pub fn unreachable() -> Self {
        Self {
            metadata_down: true,
            ..Self::new(0)
        }
    }

    pub fn fail_chapter(&self, order: u32) {
        self.failing.lock().unwrap().insert(chapter_link(order));
    }

    pub fn recover_all(&self) {
        self.failing.lock().unwrap().clear();
    }

    pub fn fetches_of(&self, order: u32) -> usize {
        self.fetches.lock().unwrap().get(&chapter_link(order)).copied().unwrap_or(0)
    }

    pub fn total_fetches(&self) -> usize {
        self.fetches.lock().unwrap().values().sum()
    }

    pub fn cover_fetches(&self) -> usize {
        *self.cover_fetches.lock().unwrap()
    }
}

#[async_trait::async_trait]
impl NovelMetadataFetcher for FakeSite {
    async fn fetch_metadata(&self, work_link: &str) -> Result<NovelMetadata, FetchError> {
        if self.metadata_down {
            return Err(FetchError::HttpStatus {
                status: 503,
                url: work_link.to_string(),
            });
        }
        Ok(NovelMetadata {
            title: TITLE.to_string(),
            cover_reference: "https://novels.test/covers/the-long-road.png".to_string(),
            author: "A. Writer".to_string(),
            description: "<p>A long road.</p>".to_string(),
            chapters: (1..=self.chapter_count)
                .map(|order| ChapterReference {
                    order,
                    link: chapter_link(order),
                    title: format!("Chapter {}", order),
                })
                .collect(),
        })
    }

    async fn fetch_cover(&self, _cover_reference: &str) -> Result<Vec<u8>, FetchError> {
        *self.cover_fetches.lock().unwrap() += 1;
        Ok(PNG.to_vec())
    }
}

#[async_trait::async_trait]
impl ChapterContentFetcher for FakeSite {
    async fn fetch_chapter(&self, link: &str) -> Result<FetchedChapter, FetchError> {
        *self.fetches.lock().unwrap().entry(link.to_string()).or_insert(0) += 1;
        tokio::task::yield_now().await;

        if self.failing.lock().unwrap().contains(link) {
            return Err(FetchError::HttpStatus {
                status: 404,
                url: link.to_string(),
            });
        }
        let name = link.rsplit('/').next().unwrap_or(link);
        Ok(FetchedChapter {
            title: format!("Fetched {}", name),
            blocks: vec![
                ContentBlock::new(format!("First paragraph of {}.", name)),
                ContentBlock::new("<table><tr><td>Level</td><td>3</td></tr></table>"),
            ],
        })
    }
}

pub fn config(root: &Path) -> HarvestConfig {
    HarvestConfig {
        output_root: root.to_path_buf(),
        batch_size: 4,
        window_size: 100,
        formats: vec![ExportFormat::Epub, ExportFormat::Word],
        ..HarvestConfig::default()
    }
}
