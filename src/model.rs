use serde::{Deserialize, Serialize};

/// A chapter as listed on the novel page, before its content is fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterReference {
    /// 1-based position in the source listing
    pub order: u32,
    pub link: String,
    pub title: String,
}

/// One unit of chapter content: a prose paragraph or a serialized table fragment.
///
/// Blocks are passed through the pipeline untouched; only renderers look inside.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentBlock {
    pub text: String,
}

impl ContentBlock {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn is_table(&self) -> bool {
        self.text.contains("<table")
    }
}

/// What a chapter fetcher hands back for a single link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedChapter {
    pub title: String,
    pub blocks: Vec<ContentBlock>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterContent {
    pub order: u32,
    pub title: String,
    pub link: String,
    pub blocks: Vec<ContentBlock>,
}

impl ChapterContent {
    pub fn from_fetched(reference: &ChapterReference, fetched: FetchedChapter) -> Self {
        Self {
            order: reference.order,
            title: fetched.title,
            link: reference.link.clone(),
            blocks: fetched.blocks,
        }
    }

    /// Flattened `<p>..</p>` text form of the chapter.
    pub fn flattened(&self) -> String {
        flatten_blocks(&self.blocks)
    }
}

pub fn flatten_blocks(blocks: &[ContentBlock]) -> String {
    blocks
        .iter()
        .map(|block| format!("<p>{}</p>", block.text.trim()))
        .collect()
}

/// Work-level information extracted from the novel landing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NovelMetadata {
    pub title: String,
    pub cover_reference: String,
    pub author: String,
    pub description: String,
    pub chapters: Vec<ChapterReference>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flattened_trims_each_block() {
        let chapter = ChapterContent {
            order: 1,
            title: "Chapter 1".to_string(),
            link: "https://example.com/c1".to_string(),
            blocks: vec![ContentBlock::new("  first "), ContentBlock::new("second\n")],
        };

        assert_eq!(chapter.flattened(), "<p>first</p><p>second</p>");
    }

    #[test]
    fn table_blocks_are_detected() {
        assert!(ContentBlock::new("<table><tr><td>x</td></tr></table>").is_table());
        assert!(!ContentBlock::new("plain text").is_table());
    }
}
