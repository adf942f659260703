use std::fs;
use std::path::{Path, PathBuf};

use crate::export::{ExportFormat, ExportWindow};

/// Width of the zero-padded order number used in chapter file names
pub const ORDER_WIDTH: usize = 5;

const PROJECT_EXTENSION: &str = "novel";
const COVER_STEM: &str = "cover";

/// Cleans a novel title so it can be used as a path segment
pub fn clean_title(title: &str) -> String {
    let replaced = title
        .replace(':', "-")
        .replace("  ", " ")
        .replace(['/', '\\'], "-")
        .replace('?', "");

    replaced
        .chars()
        .filter(|c| is_allowed_title_char(*c))
        .collect::<String>()
        .trim()
        .to_string()
}

fn is_allowed_title_char(c: char) -> bool {
    c.is_ascii_alphanumeric()
        || matches!(c, ' ' | '(' | ')' | '[' | ']' | '!' | '+' | '-')
        // Thai block
        || ('\u{0E00}'..='\u{0E7F}').contains(&c)
}

pub fn zero_pad(order: u32) -> String {
    format!("{:0width$}", order, width = ORDER_WIDTH)
}

/// Ensures a directory exists, creating it if necessary
pub fn ensure_dir_exists(path: &Path) -> std::io::Result<()> {
    if !path.exists() {
        fs::create_dir_all(path)?;
    }
    Ok(())
}

/// Deterministic on-disk layout of a single work
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkLayout {
    title: String,
    root: PathBuf,
}

impl WorkLayout {
    pub fn new(output_root: impl AsRef<Path>, title: &str) -> Self {
        let title = clean_title(title);
        let root = output_root.as_ref().join(&title);
        Self { title, root }
    }

    /// Sanitized title used for every path segment of this work
    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn raw_dir(&self) -> PathBuf {
        self.root.join("raw")
    }

    pub fn project_dir(&self) -> PathBuf {
        self.root.join("project")
    }

    pub fn exports_dir(&self) -> PathBuf {
        self.root.join("exports")
    }

    /// Flattened chapter text, never read back
    pub fn chapter_text_path(&self, order: u32) -> PathBuf {
        self.root.join(format!("{}.txt", zero_pad(order)))
    }

    /// Structured cache record
    pub fn record_path(&self, order: u32) -> PathBuf {
        self.raw_dir().join(format!("{}.txt", zero_pad(order)))
    }

    pub fn project_path(&self) -> PathBuf {
        self.project_dir()
            .join(format!("{}.{}", self.title, PROJECT_EXTENSION))
    }

    pub fn export_path(&self, window: ExportWindow, format: ExportFormat) -> PathBuf {
        self.exports_dir().join(format!(
            "{} {}-{}.{}",
            self.title,
            window.from,
            window.to,
            format.extension()
        ))
    }

    pub fn cover_path(&self, extension: &str) -> PathBuf {
        self.root.join(format!("{}.{}", COVER_STEM, extension))
    }

    /// Returns the previously downloaded cover image, whatever its extension
    pub fn find_cover(&self) -> Option<PathBuf> {
        let entries = fs::read_dir(&self.root).ok()?;
        entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .find(|path| {
                path.is_file()
                    && path.file_stem().is_some_and(|stem| stem == COVER_STEM)
                    && path.extension().is_some()
            })
    }

    /// Creates the work root and its `raw/`, `project/` and `exports/` directories
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        ensure_dir_exists(&self.root)?;
        ensure_dir_exists(&self.raw_dir())?;
        ensure_dir_exists(&self.project_dir())?;
        ensure_dir_exists(&self.exports_dir())?;
        Ok(())
    }
}
