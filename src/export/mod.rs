//! Windowed export of a project into book files.

mod docx;
mod epub;
mod pdf;

use std::fmt;
use std::path::{Path, PathBuf};

use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::Span;

use crate::error::{HarvestError, RenderError};
use crate::layout::WorkLayout;
use crate::model::ChapterContent;
use crate::project::Project;

pub use docx::WordRenderer;
pub use epub::EpubRenderer;
pub use pdf::PdfRenderer;

/// Default number of chapters per exported book
pub const DEFAULT_WINDOW_SIZE: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Epub,
    #[value(name = "docx")]
    Word,
    Pdf,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Epub => "epub",
            ExportFormat::Word => "docx",
            ExportFormat::Pdf => "pdf",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Inclusive range of chapter orders exported into one artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExportWindow {
    pub from: u32,
    pub to: u32,
}

impl ExportWindow {
    pub fn contains(&self, order: u32) -> bool {
        (self.from..=self.to).contains(&order)
    }

    /// Number of chapter orders the window spans
    pub fn size(&self) -> u32 {
        self.to - self.from + 1
    }
}

impl fmt::Display for ExportWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.from, self.to)
    }
}

/// Splits `[1, total]` into consecutive windows of `window_size`, the last one truncated
pub fn paginate(total: u32, window_size: u32) -> Vec<ExportWindow> {
    if total == 0 || window_size == 0 {
        return Vec::new();
    }
    (1..=total)
        .step_by(window_size as usize)
        .map(|from| ExportWindow {
            from,
            to: from.saturating_add(window_size - 1).min(total),
        })
        .collect()
}

/// What a renderer gets to see: project metadata restricted to one window
#[derive(Debug, Clone, Copy)]
pub struct BookView<'a> {
    pub project: &'a Project,
    pub chapters: &'a [ChapterContent],
    pub window: ExportWindow,
    pub cover: Option<&'a Path>,
}

impl BookView<'_> {
    pub fn heading(&self) -> String {
        format!("{} {}", self.project.title, self.window)
    }
}

/// Renders a chapter window into one concrete book format
pub trait ExportRenderer: Send + Sync {
    fn format(&self) -> ExportFormat;

    fn render(&self, book: &BookView<'_>, output: &Path) -> Result<(), RenderError>;
}

/// Builds the renderer for `format`
pub fn renderer_for(format: ExportFormat) -> Box<dyn ExportRenderer> {
    match format {
        ExportFormat::Epub => Box::new(EpubRenderer),
        ExportFormat::Word => Box::new(WordRenderer),
        ExportFormat::Pdf => Box::new(PdfRenderer::default()),
    }
}

#[derive(Debug, Default)]
pub struct ExportReport {
    pub rendered: Vec<PathBuf>,
    pub skipped: Vec<PathBuf>,
    pub failures: Vec<HarvestError>,
}

/// Drives idempotent, per-window artifact generation
///
/// Artifacts that already exist are never rendered again, even when the
/// chapters inside their window changed since.
pub struct ExportPaginator<'a> {
    layout: WorkLayout,
    window_size: u32,
    renderers: &'a [Box<dyn ExportRenderer>],
    span: Span,
}

impl<'a> ExportPaginator<'a> {
    pub fn new(layout: WorkLayout, renderers: &'a [Box<dyn ExportRenderer>]) -> Self {
        Self {
            layout,
            window_size: DEFAULT_WINDOW_SIZE,
            renderers,
            span: Span::current(),
        }
    }

    pub fn with_window_size(mut self, window_size: u32) -> Self {
        self.window_size = window_size;
        self
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn windows(&self, project: &Project) -> Vec<ExportWindow> {
        paginate(project.chapters.len() as u32, self.window_size)
    }

    pub fn export(&self, project: &Project, cover: Option<&Path>) -> ExportReport {
        let mut report = ExportReport::default();

        for window in self.windows(project) {
            let chapters = project
                .chapters
                .iter()
                .filter(|c| window.contains(c.order))
                .cloned()
                .collect::<Vec<_>>();
            let book = BookView {
                project,
                chapters: &chapters,
                window,
                cover,
            };

            for renderer in self.renderers {
                let format = renderer.format();
                let output = self.layout.export_path(window, format);
                if output.exists() {
                    tracing::debug!(parent: &self.span, path = %output.display(), "artifact exists, skipping");
                    report.skipped.push(output);
                    continue;
                }

                tracing::info!(parent: &self.span, %format, %window, chapters = chapters.len(), "generating");
                match render_to(renderer.as_ref(), &book, &output) {
                    Ok(()) => report.rendered.push(output),
                    Err(source) => {
                        let err = HarvestError::Render { format, window, source };
                        tracing::error!(parent: &self.span, error = %err, "render failed");
                        report.failures.push(err);
                    }
                }
            }
        }

        report
    }
}

/// Renders into a temp file beside `output` and moves it into place on success
fn render_to(renderer: &dyn ExportRenderer, book: &BookView<'_>, output: &Path) -> Result<(), RenderError> {
    let dir = output.parent().unwrap_or_else(|| Path::new("."));
    let tmp = NamedTempFile::new_in(dir)?;
    renderer.render(book, tmp.path())?;
    tmp.persist(output).map_err(|e| RenderError::IoError(e.error))?;
    Ok(())
}

/// Cell texts of every row of an HTML table fragment
pub(crate) fn table_rows(fragment: &str) -> Vec<Vec<String>> {
    let document = Html::parse_fragment(fragment);
    let (Ok(row_selector), Ok(cell_selector)) = (Selector::parse("tr"), Selector::parse("td, th")) else {
        return Vec::new();
    };

    document
        .select(&row_selector)
        .map(|row| {
            row.select(&cell_selector)
                .map(|cell| {
                    let text = cell.text().collect::<Vec<_>>().join(" ");
                    text.split_whitespace().collect::<Vec<_>>().join(" ")
                })
                .collect::<Vec<_>>()
        })
        .filter(|cells| !cells.is_empty())
        .collect()
}

/// Plain text of an HTML fragment such as the `<p>`-wrapped novel description
pub(crate) fn fragment_text(fragment: &str) -> String {
    Html::parse_fragment(fragment)
        .root_element()
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Cover image bytes ready to embed in a book
pub(crate) struct CoverImage {
    pub bytes: Vec<u8>,
    pub mime_type: &'static str,
    pub extension: &'static str,
}

/// Reads the cover of `book`, if any; an unusable cover is logged and left out
pub(crate) fn load_cover(book: &BookView<'_>) -> Option<CoverImage> {
    let path = book.cover?;
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "cover not readable");
            return None;
        }
    };
    match image::guess_format(&bytes) {
        Ok(format) => Some(CoverImage {
            bytes,
            mime_type: format.to_mime_type(),
            extension: format.extensions_str().first().copied().unwrap_or("img"),
        }),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "cover is not a recognised image");
            None
        }
    }
}

/// Prose text with the HTML entities the source leaves behind decoded
pub(crate) fn plain_text(text: &str) -> String {
    html_escape::decode_html_entities(text).trim().to_string()
}

/// Whether `c` may appear in an XML 1.0 document
fn is_xml_char(c: char) -> bool {
    matches!(c, '\t' | '\n' | '\r') || (c >= '\u{20}' && !matches!(c, '\u{fffe}' | '\u{ffff}'))
}

/// Escapes character data for XML, dropping characters XML 1.0 does not allow
pub(crate) fn xml_text(text: &str) -> String {
    let allowed = text.chars().filter(|c| is_xml_char(*c)).collect::<String>();
    html_escape::encode_text(&allowed).into_owned()
}

/// Like [`xml_text`], for double-quoted attribute values
pub(crate) fn xml_attr(text: &str) -> String {
    let allowed = text.chars().filter(|c| is_xml_char(*c)).collect::<String>();
    html_escape::encode_double_quoted_attribute(&allowed).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ContentBlock;
    use std::fs;
    use std::sync::Mutex;
    use tempfile::TempDir;

    fn project(count: u32) -> Project {
        Project {
            version: 1,
            title: "Novel".to_string(),
            author: "Author".to_string(),
            description: String::new(),
            cover_reference: String::new(),
            chapters: (1..=count)
                .map(|order| ChapterContent {
                    order,
                    title: format!("Chapter {}", order),
                    link: format!("l{}", order),
                    blocks: vec![ContentBlock::new("text")],
                })
                .collect(),
        }
    }

    struct RecordingRenderer {
        format: ExportFormat,
        calls: Mutex<Vec<(ExportWindow, usize)>>,
        fail_on: Option<ExportWindow>,
    }

    impl RecordingRenderer {
        fn new(format: ExportFormat) -> Self {
            Self { format, calls: Mutex::new(Vec::new()), fail_on: None }
        }
    }

    impl ExportRenderer for RecordingRenderer {
        fn format(&self) -> ExportFormat {
            self.format
        }

        fn render(&self, book: &BookView<'_>, output: &Path) -> Result<(), RenderError> {
            self.calls.lock().unwrap().push((book.window, book.chapters.len()));
            if self.fail_on == Some(book.window) {
                return Err(RenderError::PdfGenerationError("boom".to_string()));
            }
            fs::write(output, book.heading())?;
            Ok(())
        }
    }

    impl ExportRenderer for std::sync::Arc<RecordingRenderer> {
        fn format(&self) -> ExportFormat {
            self.as_ref().format()
        }

        fn render(&self, book: &BookView<'_>, output: &Path) -> Result<(), RenderError> {
            self.as_ref().render(book, output)
        }
    }

    fn setup_layout() -> (TempDir, WorkLayout) {
        let temp = TempDir::new().unwrap();
        let layout = WorkLayout::new(temp.path(), "Novel");
        layout.ensure_dirs().unwrap();
        (temp, layout)
    }

    #[test]
    fn test_paginate_250_by_100() {
        assert_eq!(
            paginate(250, 100),
            vec![
                ExportWindow { from: 1, to: 100 },
                ExportWindow { from: 101, to: 200 },
                ExportWindow { from: 201, to: 250 },
            ]
        );
    }

    #[test]
    fn test_paginate_covers_range_without_gaps() {
        for total in 0..=57u32 {
            for size in 1..=12u32 {
                let windows = paginate(total, size);
                assert_eq!(windows.len() as u32, total.div_ceil(size));

                let mut next = 1;
                for (i, window) in windows.iter().enumerate() {
                    assert_eq!(window.from, next);
                    assert!(window.from <= window.to);
                    if i + 1 < windows.len() {
                        assert_eq!(window.size(), size);
                    }
                    next = window.to + 1;
                }
                assert_eq!(next, total + 1);
            }
        }
    }

    #[test]
    fn test_paginate_degenerate_inputs() {
        assert!(paginate(0, 100).is_empty());
        assert!(paginate(10, 0).is_empty());
        assert_eq!(paginate(5, 100), vec![ExportWindow { from: 1, to: 5 }]);
    }

    #[test]
    fn test_export_renders_each_window_once() {
        let (_temp, layout) = setup_layout();
        let renderer = std::sync::Arc::new(RecordingRenderer::new(ExportFormat::Epub));
        let renderers: Vec<Box<dyn ExportRenderer>> = vec![Box::new(renderer.clone())];
        let paginator = ExportPaginator::new(layout.clone(), &renderers).with_window_size(10);
        let project = project(25);

        let first = paginator.export(&project, None);
        assert_eq!(first.rendered.len(), 3);
        assert_eq!(
            *renderer.calls.lock().unwrap(),
            vec![
                (ExportWindow { from: 1, to: 10 }, 10),
                (ExportWindow { from: 11, to: 20 }, 10),
                (ExportWindow { from: 21, to: 25 }, 5),
            ]
        );
        assert!(layout.export_path(ExportWindow { from: 21, to: 25 }, ExportFormat::Epub).is_file());

        let second = paginator.export(&project, None);
        assert!(second.rendered.is_empty());
        assert_eq!(second.skipped.len(), 3);
        assert_eq!(renderer.calls.lock().unwrap().len(), 3);
    }

    #[test]
    fn test_render_failure_is_isolated() {
        let (_temp, layout) = setup_layout();
        let failing_window = ExportWindow { from: 1, to: 10 };
        let epub = std::sync::Arc::new(RecordingRenderer {
            fail_on: Some(failing_window),
            ..RecordingRenderer::new(ExportFormat::Epub)
        });
        let word = std::sync::Arc::new(RecordingRenderer::new(ExportFormat::Word));
        let renderers: Vec<Box<dyn ExportRenderer>> = vec![Box::new(epub.clone()), Box::new(word.clone())];
        let paginator = ExportPaginator::new(layout.clone(), &renderers).with_window_size(10);

        let report = paginator.export(&project(20), None);

        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.rendered.len(), 3);
        assert!(!layout.export_path(failing_window, ExportFormat::Epub).exists());
        assert!(layout.export_path(failing_window, ExportFormat::Word).exists());
        assert_eq!(epub.calls.lock().unwrap().len(), 2);
        // no temp files are left behind
        let leftovers = fs::read_dir(layout.exports_dir()).unwrap().count();
        assert_eq!(leftovers, 3);
    }

    #[test]
    fn test_table_rows() {
        let rows = table_rows("<table><tbody><tr><td>Name</td><td> Sword\n of Light </td></tr><tr><th>HP</th></tr></tbody></table>");
        assert_eq!(rows, vec![vec!["Name".to_string(), "Sword of Light".to_string()], vec!["HP".to_string()]]);
    }

    #[test]
    fn test_fragment_text() {
        assert_eq!(fragment_text("<p>First line.</p><p> Second </p>"), "First line.\nSecond");
    }

    #[test]
    fn test_xml_text_drops_forbidden_characters() {
        assert_eq!(xml_text("Tab\u{b}bed\u{0} & <more>"), "Tabbed &amp; &lt;more&gt;");
        assert_eq!(xml_text("line\tone\nline two\r"), "line\tone\nline two\r");
        assert_eq!(xml_attr("say \"hi\"\u{1f}"), "say &quot;hi&quot;");
    }

    #[test]
    fn test_plain_text_decodes_entities() {
        assert_eq!(plain_text(" &ldquo;Hi&rdquo; &hellip; "), "\u{201c}Hi\u{201d} \u{2026}");
    }
}
