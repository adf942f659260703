use std::fs;
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;

use crate::error::HarvestError;
use crate::layout::WorkLayout;
use crate::model::{ChapterContent, ContentBlock, flatten_blocks};

/// Schema version written into every new record
pub const RECORD_VERSION: u32 = 1;

/// Durable, reloadable form of a fetched chapter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedChapterRecord {
    /// Missing in records written before versioning was introduced
    #[serde(default)]
    pub version: u32,
    pub order: u32,
    pub title: String,
    pub link: String,
    /// Flattened `<p>..</p>` text of the blocks
    pub data: String,
    pub blocks: Vec<ContentBlock>,
    /// SHA-256 of `data`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

impl CachedChapterRecord {
    pub fn from_content(content: &ChapterContent) -> Self {
        let data = flatten_blocks(&content.blocks);
        Self {
            version: RECORD_VERSION,
            order: content.order,
            title: content.title.clone(),
            link: content.link.clone(),
            checksum: Some(compute_hash(&data)),
            data,
            blocks: content.blocks.clone(),
        }
    }

    pub fn into_content(self) -> ChapterContent {
        ChapterContent {
            order: self.order,
            title: self.title,
            link: self.link,
            blocks: self.blocks,
        }
    }
}

/// Per-chapter store keyed by order
///
/// A record, once written, is never updated or removed by this crate. Callers
/// use [`ChapterCache::exists`] to skip the network for chapters fetched by an
/// earlier run.
#[derive(Debug, Clone)]
pub struct ChapterCache {
    layout: WorkLayout,
}

impl ChapterCache {
    pub fn new(layout: WorkLayout) -> Self {
        Self { layout }
    }

    pub fn exists(&self, order: u32) -> bool {
        self.layout.record_path(order).is_file()
    }

    pub fn load(&self, order: u32) -> Result<ChapterContent, HarvestError> {
        let path = self.layout.record_path(order);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(HarvestError::NotFound(order));
            }
            Err(e) => return Err(HarvestError::IoError(e)),
        };

        let record: CachedChapterRecord =
            serde_json::from_slice(&bytes).map_err(|e| HarvestError::CorruptRecord {
                order,
                reason: e.to_string(),
            })?;

        if record.version > RECORD_VERSION {
            return Err(HarvestError::UnsupportedVersion {
                kind: "chapter record",
                found: record.version,
                supported: RECORD_VERSION,
            });
        }

        if record.order != order {
            return Err(HarvestError::CorruptRecord {
                order,
                reason: format!("record holds chapter {}", record.order),
            });
        }

        if let Some(expected) = &record.checksum {
            let actual = compute_hash(&flatten_blocks(&record.blocks));
            if &actual != expected {
                return Err(HarvestError::CorruptRecord {
                    order,
                    reason: "checksum mismatch".to_string(),
                });
            }
        }

        Ok(record.into_content())
    }

    /// Writes the structured record, then the flattened text form.
    pub fn store(&self, content: &ChapterContent) -> Result<(), HarvestError> {
        let order = content.order;
        let record = CachedChapterRecord::from_content(content);
        let json = serde_json::to_vec(&record)?;

        write_atomic(&self.layout.record_path(order), &json)
            .map_err(|source| HarvestError::CacheWrite { order, source })?;

        fs::write(self.layout.chapter_text_path(order), record.data.as_bytes())
            .map_err(|source| HarvestError::CacheWrite { order, source })?;

        Ok(())
    }
}

/// Writes through a temp file in the same directory and renames it into place
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Compute a hash of the given string
fn compute_hash(input: &str) -> String {
    format!("{:x}", Sha256::digest(input.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup_cache() -> (TempDir, WorkLayout, ChapterCache) {
        let temp = TempDir::new().unwrap();
        let layout = WorkLayout::new(temp.path(), "Test Novel");
        layout.ensure_dirs().unwrap();
        let cache = ChapterCache::new(layout.clone());
        (temp, layout, cache)
    }

    fn sample_chapter(order: u32) -> ChapterContent {
        ChapterContent {
            order,
            title: format!("Chapter {}", order),
            link: format!("https://example.com/novel/chapter-{}", order),
            blocks: vec![
                ContentBlock::new("The first line."),
                ContentBlock::new("<table><tr><td>HP</td></tr></table>"),
            ],
        }
    }

    #[test]
    fn test_store_then_load() {
        let (_temp, layout, cache) = setup_cache();
        let chapter = sample_chapter(3);

        assert!(!cache.exists(3));
        cache.store(&chapter).unwrap();
        assert!(cache.exists(3));

        assert_eq!(cache.load(3).unwrap(), chapter);
        assert_eq!(
            fs::read_to_string(layout.chapter_text_path(3)).unwrap(),
            "<p>The first line.</p><p><table><tr><td>HP</td></tr></table></p>"
        );
    }

    #[test]
    fn test_load_missing_is_not_found() {
        let (_temp, _layout, cache) = setup_cache();
        assert!(matches!(cache.load(9), Err(HarvestError::NotFound(9))));
    }

    #[test]
    fn test_store_is_byte_identical_across_writes() {
        let (_temp, layout, cache) = setup_cache();
        let chapter = sample_chapter(1);

        cache.store(&chapter).unwrap();
        let first = fs::read(layout.record_path(1)).unwrap();
        cache.store(&chapter).unwrap();
        let second = fs::read(layout.record_path(1)).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn test_loads_unversioned_record() {
        let (_temp, layout, cache) = setup_cache();
        let legacy = r#"{"order":2,"title":"Chapter 2","data":"<p>Hi</p>","blocks":[{"text":"Hi"}],"link":"https://example.com/c2"}"#;
        fs::write(layout.record_path(2), legacy).unwrap();

        let chapter = cache.load(2).unwrap();
        assert_eq!(chapter.title, "Chapter 2");
        assert_eq!(chapter.blocks, vec![ContentBlock::new("Hi")]);
    }

    #[test]
    fn test_rejects_newer_record_version() {
        let (_temp, layout, cache) = setup_cache();
        let future = r#"{"version":99,"order":4,"title":"t","link":"l","data":"","blocks":[]}"#;
        fs::write(layout.record_path(4), future).unwrap();

        assert!(matches!(
            cache.load(4),
            Err(HarvestError::UnsupportedVersion { found: 99, .. })
        ));
    }

    #[test]
    fn test_detects_corrupt_records() {
        let (_temp, layout, cache) = setup_cache();
        fs::write(layout.record_path(5), "{not json").unwrap();
        assert!(matches!(cache.load(5), Err(HarvestError::CorruptRecord { order: 5, .. })));

        let mut record = CachedChapterRecord::from_content(&sample_chapter(6));
        record.blocks.push(ContentBlock::new("tampered"));
        fs::write(layout.record_path(6), serde_json::to_vec(&record).unwrap()).unwrap();
        assert!(matches!(cache.load(6), Err(HarvestError::CorruptRecord { order: 6, .. })));
    }

    #[test]
    fn test_write_failure_is_reported() {
        let temp = TempDir::new().unwrap();
        // raw/ is never created, so the record write must fail
        let cache = ChapterCache::new(WorkLayout::new(temp.path(), "Missing"));

        let result = cache.store(&sample_chapter(1));
        assert!(matches!(result, Err(HarvestError::CacheWrite { order: 1, .. })));
        assert!(!cache.exists(1));
    }
}
