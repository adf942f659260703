use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use genpdf::Element as _;
use genpdf::elements::{Break, Image, PageBreak, Paragraph};
use genpdf::fonts::{FontData, FontFamily};
use genpdf::style::Style;
use genpdf::{Alignment, Document, PaperSize, SimplePageDecorator};

use super::{BookView, ExportFormat, ExportRenderer, plain_text, table_rows};
use crate::error::RenderError;

/// PDF book rendered with genpdf
///
/// Uses `font` when one is configured, otherwise the first usable system font.
#[derive(Debug, Clone, Default)]
pub struct PdfRenderer {
    font: Option<PathBuf>,
}

impl PdfRenderer {
    pub fn with_font(font: impl Into<PathBuf>) -> Self {
        Self {
            font: Some(font.into()),
        }
    }

    fn font_family(&self) -> Result<FontFamily<FontData>, RenderError> {
        let family = match &self.font {
            Some(path) => load_font_file(path),
            None => find_system_font(),
        };
        family.map_err(RenderError::PdfGenerationError)
    }
}

impl ExportRenderer for PdfRenderer {
    fn format(&self) -> ExportFormat {
        ExportFormat::Pdf
    }

    fn render(&self, book: &BookView<'_>, output: &Path) -> Result<(), RenderError> {
        let mut doc = Document::new(self.font_family()?);
        doc.set_title(book.heading());
        doc.set_paper_size(PaperSize::A4);
        let mut decorator = SimplePageDecorator::new();
        decorator.set_margins(15);
        doc.set_page_decorator(decorator);

        if let Some(cover) = book.cover {
            match Image::from_path(cover) {
                Ok(image) => {
                    doc.push(image.with_alignment(Alignment::Center));
                    doc.push(PageBreak::new());
                }
                Err(e) => tracing::warn!(path = %cover.display(), error = %e, "cover left out of PDF"),
            }
        }

        doc.push(
            Paragraph::new(book.heading())
                .aligned(Alignment::Center)
                .styled(Style::new().bold().with_font_size(24)),
        );
        if !book.project.author.is_empty() {
            doc.push(Paragraph::new(book.project.author.clone()).aligned(Alignment::Center));
        }

        for chapter in book.chapters {
            doc.push(PageBreak::new());
            doc.push(
                Paragraph::new(chapter.title.clone())
                    .aligned(Alignment::Center)
                    .styled(Style::new().bold().with_font_size(18)),
            );
            doc.push(Break::new(1));

            for block in &chapter.blocks {
                if block.is_table() {
                    for row in table_rows(&block.text) {
                        let line = row.iter().map(|cell| plain_text(cell)).collect::<Vec<_>>().join(" | ");
                        doc.push(Paragraph::new(line));
                    }
                } else {
                    doc.push(Paragraph::new(plain_text(&block.text)));
                }
                doc.push(Break::new(0.5));
            }
        }

        tracing::debug!(path = %output.display(), chapters = book.chapters.len(), "rendering PDF");
        doc.render_to_file(output)?;
        Ok(())
    }
}

fn family_from_bytes(bytes: Vec<u8>) -> Result<FontFamily<FontData>, String> {
    let font_data = FontData::new(bytes, None).map_err(|e| format!("Could not create font data: {}", e))?;
    Ok(FontFamily {
        regular: font_data.clone(),
        bold: font_data.clone(),
        italic: font_data.clone(),
        bold_italic: font_data,
    })
}

fn load_font_file(path: &Path) -> Result<FontFamily<FontData>, String> {
    let bytes = fs::read(path).map_err(|e| format!("Could not read font file {}: {}", path.display(), e))?;
    family_from_bytes(bytes)
}

/// Finds a suitable system font with cross-platform support
fn find_system_font() -> Result<FontFamily<FontData>, String> {
    for (dir, file) in platform_font_candidates() {
        let path = dir.join(file);
        if !path.exists() {
            continue;
        }
        // TTC collections often fail with rusttype
        if file.ends_with(".ttc") {
            tracing::trace!(path = %path.display(), "skipping font collection");
            continue;
        }
        match load_font_file(&path) {
            Ok(family) => {
                tracing::debug!(path = %path.display(), "using system font");
                return Ok(family);
            }
            Err(e) => tracing::trace!(path = %path.display(), error = %e, "font not usable"),
        }
    }

    Err("Could not load any suitable font".to_string())
}

/// Returns a list of platform-specific font locations to try
fn platform_font_candidates() -> Vec<(PathBuf, &'static str)> {
    let mut paths: Vec<(PathBuf, &'static str)> = Vec::new();
    let mut push = |dir: &str, file: &'static str| paths.push((PathBuf::from(dir), file));

    match env::consts::OS {
        "macos" => {
            push("/System/Library/Fonts", "Geneva.ttf");
            push("/System/Library/Fonts", "Monaco.ttf");
            push("/Library/Fonts", "Arial.ttf");
            push("/System/Library/Fonts/Supplemental", "Thonburi.ttf");
        }
        "windows" => {
            push("C:\\Windows\\Fonts", "THSarabunNew.ttf");
            push("C:\\Windows\\Fonts", "arial.ttf");
            push("C:\\Windows\\Fonts", "tahoma.ttf");
            push("C:\\Windows\\Fonts", "verdana.ttf");
            push("C:\\Windows\\Fonts", "calibri.ttf");
        }
        "linux" => {
            push("/usr/share/fonts/truetype/tlwg", "Garuda.ttf");
            push("/usr/share/fonts/truetype/dejavu", "DejaVuSans.ttf");
            push("/usr/share/fonts/TTF", "DejaVuSans.ttf");
            push("/usr/share/fonts/truetype/liberation", "LiberationSans-Regular.ttf");
            push("/usr/share/fonts/liberation", "LiberationSans-Regular.ttf");
            push("/usr/share/fonts/truetype/noto", "NotoSans-Regular.ttf");
            push("/usr/share/fonts/noto", "NotoSans-Regular.ttf");
            push("/usr/share/fonts/truetype/ubuntu", "Ubuntu-R.ttf");
        }
        _ => push("/usr/local/share/fonts", "Arial.ttf"),
    }

    if let Some(home) = dirs::font_dir() {
        paths.push((home.clone(), "THSarabunNew.ttf"));
        paths.push((home.clone(), "DejaVuSans.ttf"));
        paths.push((home, "LiberationSans-Regular.ttf"));
    }

    paths
}
