use std::fs::File;
use std::io::Write;
use std::path::Path;

use zip::CompressionMethod;
use zip::write::{SimpleFileOptions, ZipWriter};

use super::{
    BookView, CoverImage, ExportFormat, ExportRenderer, fragment_text, load_cover, plain_text, table_rows,
    xml_text as text,
};
use crate::error::RenderError;
use crate::model::{ChapterContent, ContentBlock};

const FONT: &str = "TH Sarabun New";
// A5 in twentieths of a point, with half-inch margins
const PAGE_WIDTH: u32 = 8391;
const PAGE_HEIGHT: u32 = 11906;
const PAGE_MARGIN: u32 = 720;
// EMU; the cover keeps a 559x794 aspect ratio across the text width
const COVER_WIDTH: u64 = 4_413_885;
const COVER_HEIGHT: u64 = COVER_WIDTH * 794 / 559;

const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#;
const NS_MAIN: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";
const NS_REL: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

/// Word (`.docx`) book: cover page, table of contents field, one page per chapter
#[derive(Debug, Clone, Copy, Default)]
pub struct WordRenderer;

impl ExportRenderer for WordRenderer {
    fn format(&self) -> ExportFormat {
        ExportFormat::Word
    }

    fn render(&self, book: &BookView<'_>, output: &Path) -> Result<(), RenderError> {
        let cover = load_cover(book);
        let mut zip = ZipWriter::new(File::create(output)?);
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        zip.start_file("[Content_Types].xml", options)?;
        zip.write_all(content_types(cover.as_ref()).as_bytes())?;

        zip.start_file("_rels/.rels", options)?;
        zip.write_all(package_relationships().as_bytes())?;

        zip.start_file("docProps/core.xml", options)?;
        zip.write_all(core_properties(book).as_bytes())?;

        zip.start_file("word/_rels/document.xml.rels", options)?;
        zip.write_all(document_relationships(cover.as_ref()).as_bytes())?;

        zip.start_file("word/styles.xml", options)?;
        zip.write_all(styles().as_bytes())?;

        zip.start_file("word/settings.xml", options)?;
        zip.write_all(settings().as_bytes())?;

        if let Some(cover) = &cover {
            zip.start_file(format!("word/media/cover.{}", cover.extension), options)?;
            zip.write_all(&cover.bytes)?;
        }

        zip.start_file("word/document.xml", options)?;
        zip.write_all(document(book, cover.is_some()).as_bytes())?;

        zip.finish()?;
        Ok(())
    }
}

fn content_types(cover: Option<&CoverImage>) -> String {
    let image_default = cover
        .map(|c| format!(r#"<Default Extension="{}" ContentType="{}"/>"#, c.extension, c.mime_type))
        .unwrap_or_default();
    format!(
        r#"{XML_DECLARATION}
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/>{image_default}<Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/><Override PartName="/word/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.styles+xml"/><Override PartName="/word/settings.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.settings+xml"/><Override PartName="/docProps/core.xml" ContentType="application/vnd.openxmlformats-package.core-properties+xml"/></Types>"#
    )
}

fn package_relationships() -> String {
    format!(
        r#"{XML_DECLARATION}
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="{NS_REL}/officeDocument" Target="word/document.xml"/><Relationship Id="rId2" Type="http://schemas.openxmlformats.org/package/2006/relationships/metadata/core-properties" Target="docProps/core.xml"/></Relationships>"#
    )
}

fn document_relationships(cover: Option<&CoverImage>) -> String {
    let cover_rel = cover
        .map(|c| {
            format!(
                r#"<Relationship Id="rIdCover" Type="{NS_REL}/image" Target="media/cover.{}"/>"#,
                c.extension
            )
        })
        .unwrap_or_default();
    format!(
        r#"{XML_DECLARATION}
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rIdStyles" Type="{NS_REL}/styles" Target="styles.xml"/><Relationship Id="rIdSettings" Type="{NS_REL}/settings" Target="settings.xml"/>{cover_rel}</Relationships>"#
    )
}

fn core_properties(book: &BookView<'_>) -> String {
    format!(
        r#"{XML_DECLARATION}
<cp:coreProperties xmlns:cp="http://schemas.openxmlformats.org/package/2006/metadata/core-properties" xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:dcterms="http://purl.org/dc/terms/" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"><dc:title>{}</dc:title><dc:creator>{}</dc:creator><dc:description>{}</dc:description><cp:lastModifiedBy>novel-harvest</cp:lastModifiedBy></cp:coreProperties>"#,
        text(&book.heading()),
        text(&book.project.author),
        text(&fragment_text(&book.project.description))
    )
}

fn styles() -> String {
    format!(
        r#"{XML_DECLARATION}
<w:styles xmlns:w="{NS_MAIN}"><w:docDefaults><w:rPrDefault><w:rPr><w:rFonts w:ascii="{FONT}" w:hAnsi="{FONT}" w:cs="{FONT}"/><w:sz w:val="40"/><w:szCs w:val="40"/></w:rPr></w:rPrDefault></w:docDefaults><w:style w:type="paragraph" w:default="1" w:styleId="Normal"><w:name w:val="Normal"/><w:qFormat/></w:style><w:style w:type="paragraph" w:styleId="Heading1"><w:name w:val="heading 1"/><w:basedOn w:val="Normal"/><w:next w:val="Normal"/><w:qFormat/><w:pPr><w:spacing w:after="120"/><w:jc w:val="center"/><w:outlineLvl w:val="0"/></w:pPr><w:rPr><w:b/><w:color w:val="50A8F2"/><w:sz w:val="70"/><w:szCs w:val="70"/></w:rPr></w:style><w:style w:type="paragraph" w:styleId="TOC1"><w:name w:val="toc 1"/><w:basedOn w:val="Normal"/><w:next w:val="Normal"/><w:rPr><w:color w:val="000000"/></w:rPr></w:style></w:styles>"#
    )
}

fn settings() -> String {
    format!(
        r#"{XML_DECLARATION}
<w:settings xmlns:w="{NS_MAIN}"><w:updateFields w:val="true"/></w:settings>"#
    )
}

fn run(content: &str) -> String {
    format!(r#"<w:r><w:t xml:space="preserve">{}</w:t></w:r>"#, text(content))
}

fn heading(title: &str) -> String {
    format!(
        r#"<w:p><w:pPr><w:pStyle w:val="Heading1"/><w:pBdr><w:bottom w:val="single" w:sz="6" w:space="1" w:color="auto"/></w:pBdr></w:pPr>{}</w:p>"#,
        run(title)
    )
}

fn page_break() -> &'static str {
    r#"<w:p><w:r><w:br w:type="page"/></w:r></w:p>"#
}

fn prose(content: &str) -> String {
    format!(
        r#"<w:p><w:pPr><w:jc w:val="both"/></w:pPr><w:r><w:tab/><w:t xml:space="preserve">{}</w:t></w:r></w:p>"#,
        text(content)
    )
}

fn table(rows: &[Vec<String>]) -> String {
    let columns = rows.iter().map(Vec::len).max().unwrap_or(0);
    let border = |side: &str| format!(r#"<w:{side} w:val="single" w:sz="4" w:space="0" w:color="000000"/>"#);
    let borders = ["top", "left", "bottom", "right", "insideH", "insideV"]
        .iter()
        .map(|side| border(side))
        .collect::<String>();

    let mut xml = format!(
        r#"<w:tbl><w:tblPr><w:tblW w:w="0" w:type="auto"/><w:tblBorders>{}</w:tblBorders></w:tblPr><w:tblGrid>{}</w:tblGrid>"#,
        borders,
        r#"<w:gridCol/>"#.repeat(columns)
    );
    for row in rows {
        xml.push_str("<w:tr>");
        for cell in row {
            xml.push_str(&format!(
                r#"<w:tc><w:tcPr><w:tcW w:w="0" w:type="auto"/></w:tcPr><w:p><w:pPr><w:jc w:val="both"/></w:pPr>{}</w:p></w:tc>"#,
                run(&plain_text(cell))
            ));
        }
        xml.push_str("</w:tr>");
    }
    xml.push_str("</w:tbl>");
    xml
}

fn block(block: &ContentBlock) -> String {
    if !block.is_table() {
        return prose(&plain_text(&block.text));
    }
    let rows = table_rows(&block.text);
    if rows.is_empty() {
        tracing::debug!(fragment = %block.text, "table without rows left out");
        return String::new();
    }
    // a paragraph must separate consecutive tables
    table(&rows) + "<w:p/>"
}

fn chapter(chapter: &ChapterContent) -> String {
    let mut xml = heading(&chapter.title);
    for b in &chapter.blocks {
        xml.push_str(&block(b));
    }
    xml
}

fn cover_drawing() -> String {
    format!(
        r#"<w:p><w:pPr><w:jc w:val="center"/></w:pPr><w:r><w:drawing><wp:inline distT="0" distB="0" distL="0" distR="0"><wp:extent cx="{COVER_WIDTH}" cy="{COVER_HEIGHT}"/><wp:docPr id="1" name="Cover"/><a:graphic xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main"><a:graphicData uri="http://schemas.openxmlformats.org/drawingml/2006/picture"><pic:pic xmlns:pic="http://schemas.openxmlformats.org/drawingml/2006/picture"><pic:nvPicPr><pic:cNvPr id="0" name="cover"/><pic:cNvPicPr/></pic:nvPicPr><pic:blipFill><a:blip r:embed="rIdCover"/><a:stretch><a:fillRect/></a:stretch></pic:blipFill><pic:spPr><a:xfrm><a:off x="0" y="0"/><a:ext cx="{COVER_WIDTH}" cy="{COVER_HEIGHT}"/></a:xfrm><a:prstGeom prst="rect"><a:avLst/></a:prstGeom></pic:spPr></pic:pic></a:graphicData></a:graphic></wp:inline></w:drawing></w:r></w:p>"#
    )
}

fn table_of_contents() -> String {
    format!(
        r#"{}<w:p><w:r><w:fldChar w:fldCharType="begin"/></w:r><w:r><w:instrText xml:space="preserve"> TOC \o "1-1" \h </w:instrText></w:r><w:r><w:fldChar w:fldCharType="separate"/></w:r>{}<w:r><w:fldChar w:fldCharType="end"/></w:r></w:p>"#,
        heading("Table of Contents"),
        run("Update this field to build the table of contents.")
    )
}

fn document(book: &BookView<'_>, with_cover: bool) -> String {
    let mut body = String::new();
    if with_cover {
        body.push_str(&cover_drawing());
        body.push_str(page_break());
    }
    body.push_str(&table_of_contents());

    for c in book.chapters {
        body.push_str(page_break());
        body.push_str(&chapter(c));
    }

    format!(
        r#"{XML_DECLARATION}
<w:document xmlns:w="{NS_MAIN}" xmlns:r="{NS_REL}" xmlns:wp="http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing"><w:body>{body}<w:sectPr><w:pgSz w:w="{PAGE_WIDTH}" w:h="{PAGE_HEIGHT}"/><w:pgMar w:top="{PAGE_MARGIN}" w:right="{PAGE_MARGIN}" w:bottom="{PAGE_MARGIN}" w:left="{PAGE_MARGIN}" w:header="0" w:footer="0" w:gutter="0"/></w:sectPr></w:body></w:document>"#
    )
}
