use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::cache::write_atomic;
use crate::error::HarvestError;
use crate::model::{ChapterContent, NovelMetadata};

/// Schema version written into every new project file
pub const PROJECT_VERSION: u32 = 1;

/// Full known state of a work across runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    #[serde(default)]
    pub version: u32,
    pub title: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, alias = "coverImage")]
    pub cover_reference: String,
    /// Unique by link, sorted by order
    pub chapters: Vec<ChapterContent>,
}

impl Project {
    pub fn from_metadata(metadata: &NovelMetadata, chapters: Vec<ChapterContent>) -> Self {
        Self {
            version: PROJECT_VERSION,
            title: metadata.title.clone(),
            author: metadata.author.clone(),
            description: metadata.description.clone(),
            cover_reference: metadata.cover_reference.clone(),
            chapters,
        }
    }
}

/// Unions two chapter sets by link and sorts the result by order.
///
/// When both sets hold the same link the fresh chapter wins. Duplicate links
/// within one set collapse to their first occurrence.
pub fn merge_chapters(
    fresh: Vec<ChapterContent>,
    existing: Vec<ChapterContent>,
) -> Vec<ChapterContent> {
    let mut seen = HashSet::new();
    let mut merged = fresh
        .into_iter()
        .chain(existing)
        .filter(|chapter| seen.insert(chapter.link.clone()))
        .collect::<Vec<_>>();
    merged.sort_by_key(|chapter| chapter.order);
    merged
}

/// Loads, merges and rewrites the project file of one work
#[derive(Debug, Clone)]
pub struct ProjectStore {
    path: PathBuf,
}

impl ProjectStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load_existing(&self) -> Result<Option<Project>, HarvestError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(HarvestError::IoError(e)),
        };

        let project: Project = serde_json::from_slice(&bytes).map_err(|e| HarvestError::Project {
            path: self.path.clone(),
            reason: e.to_string(),
        })?;

        if project.version > PROJECT_VERSION {
            return Err(HarvestError::UnsupportedVersion {
                kind: "project",
                found: project.version,
                supported: PROJECT_VERSION,
            });
        }
        Ok(Some(project))
    }

    /// Builds the project for this run from fresh chapters and whatever was persisted before
    pub fn merge(
        &self,
        metadata: &NovelMetadata,
        fresh: Vec<ChapterContent>,
        existing: Option<Project>,
    ) -> Project {
        let existing_chapters = existing.map(|p| p.chapters).unwrap_or_default();
        Project::from_metadata(metadata, merge_chapters(fresh, existing_chapters))
    }

    /// Overwrites the project file with `project`
    pub fn persist(&self, project: &Project) -> Result<(), HarvestError> {
        let json = serde_json::to_vec_pretty(project)?;
        write_atomic(&self.path, &json)?;
        Ok(())
    }

    /// Moves an unreadable project file out of the way and returns its new location
    pub fn set_aside(&self) -> Result<PathBuf, HarvestError> {
        let mut backup = self.path.clone().into_os_string();
        backup.push(".bak");
        let backup = PathBuf::from(backup);
        fs::rename(&self.path, &backup)?;
        Ok(backup)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ContentBlock;
    use tempfile::TempDir;

    fn chapter(order: u32, link: &str, body: &str) -> ChapterContent {
        ChapterContent {
            order,
            title: format!("Chapter {}", order),
            link: link.to_string(),
            blocks: vec![ContentBlock::new(body)],
        }
    }

    fn metadata() -> NovelMetadata {
        NovelMetadata {
            title: "Novel".to_string(),
            cover_reference: "https://example.com/cover.jpg".to_string(),
            author: "Author".to_string(),
            description: "<p>About</p>".to_string(),
            chapters: Vec::new(),
        }
    }

    #[test]
    fn test_fresh_chapters_take_precedence() {
        let fresh = vec![chapter(2, "l2", "new")];
        let existing = vec![chapter(1, "l1", "old"), chapter(2, "l2", "old")];

        let merged = merge_chapters(fresh, existing);

        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].link, "l1");
        assert_eq!(merged[1].blocks[0].text, "new");
    }

    #[test]
    fn test_duplicate_links_collapse() {
        let fresh = vec![chapter(3, "same", "a"), chapter(4, "same", "b")];
        let merged = merge_chapters(fresh, Vec::new());

        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].order, 3);
    }

    #[test]
    fn test_merge_sorts_and_keeps_gaps() {
        let fresh = vec![chapter(7, "l7", "x"), chapter(1, "l1", "x")];
        let existing = vec![chapter(3, "l3", "x")];

        let orders = merge_chapters(fresh, existing)
            .iter()
            .map(|c| c.order)
            .collect::<Vec<_>>();
        assert_eq!(orders, vec![1, 3, 7]);
    }

    #[test]
    fn test_persist_then_load() {
        let temp = TempDir::new().unwrap();
        let store = ProjectStore::new(temp.path().join("Novel.novel"));
        assert!(store.load_existing().unwrap().is_none());

        let project = store.merge(&metadata(), vec![chapter(1, "l1", "x")], None);
        store.persist(&project).unwrap();

        assert_eq!(store.load_existing().unwrap(), Some(project));
    }

    #[test]
    fn test_loads_legacy_project_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("Old.novel");
        let legacy = r#"{"title":"Old","coverImage":"https://example.com/c.jpg","description":"d","author":"a",
            "chapters":[{"order":1,"title":"One","data":"<p>x</p>","blocks":[{"text":"x"}],"link":"l1"}],
            "bookPathEpub":"/tmp/Old.epub","bookPathWord":"/tmp/Old.docx"}"#;
        fs::write(&path, legacy).unwrap();

        let project = ProjectStore::new(&path).load_existing().unwrap().unwrap();
        assert_eq!(project.version, 0);
        assert_eq!(project.cover_reference, "https://example.com/c.jpg");
        assert_eq!(project.chapters[0].link, "l1");
    }

    #[test]
    fn test_unreadable_project_can_be_set_aside() {
        let temp = TempDir::new().unwrap();
        let store = ProjectStore::new(temp.path().join("Bad.novel"));
        fs::write(store.path(), "{").unwrap();

        assert!(matches!(store.load_existing(), Err(HarvestError::Project { .. })));
        let backup = store.set_aside().unwrap();
        assert!(backup.ends_with("Bad.novel.bak"));
        assert!(store.load_existing().unwrap().is_none());
    }
}
