use std::fs::File;
use std::io::Write;
use std::path::Path;

use zip::CompressionMethod;
use zip::write::{SimpleFileOptions, ZipWriter};

use super::{
    BookView, ExportFormat, ExportRenderer, fragment_text, load_cover, plain_text, table_rows, xml_attr as attr,
    xml_text as text,
};
use crate::error::RenderError;
use crate::layout::{clean_title, zero_pad};
use crate::model::{ChapterContent, ContentBlock};

// Fixed so that identical input renders identical files
const MODIFIED: &str = "2000-01-01T00:00:00Z";

const CONTAINER_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>
"#;

const STYLESHEET: &str = "body { font-family: serif; }\n\
h1 { text-align: center; }\n\
p { text-indent: 1.5em; text-align: justify; }\n\
table { border-collapse: collapse; margin: 1em auto; }\n\
td, th { border: 1px solid #000; padding: 0.2em 0.5em; }\n";

/// EPUB 3 book with a navigation document and an NCX for older readers
#[derive(Debug, Clone, Copy, Default)]
pub struct EpubRenderer;

impl ExportRenderer for EpubRenderer {
    fn format(&self) -> ExportFormat {
        ExportFormat::Epub
    }

    fn render(&self, book: &BookView<'_>, output: &Path) -> Result<(), RenderError> {
        let mut zip = ZipWriter::new(File::create(output)?);
        let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        let deflated = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        // must be the first entry, uncompressed
        zip.start_file("mimetype", stored)?;
        zip.write_all(b"application/epub+zip")?;

        zip.start_file("META-INF/container.xml", deflated)?;
        zip.write_all(CONTAINER_XML.as_bytes())?;

        zip.start_file("OEBPS/style.css", deflated)?;
        zip.write_all(STYLESHEET.as_bytes())?;

        let cover = load_cover(book);
        if let Some(cover) = &cover {
            zip.start_file(format!("OEBPS/images/cover.{}", cover.extension), stored)?;
            zip.write_all(&cover.bytes)?;
            zip.start_file("OEBPS/text/cover.xhtml", deflated)?;
            zip.write_all(cover_page(book, cover.extension).as_bytes())?;
        }

        for (position, chapter) in book.chapters.iter().enumerate() {
            zip.start_file(format!("OEBPS/{}", chapter_href(position)), deflated)?;
            zip.write_all(chapter_page(chapter).as_bytes())?;
        }

        zip.start_file("OEBPS/nav.xhtml", deflated)?;
        zip.write_all(nav_document(book).as_bytes())?;

        zip.start_file("OEBPS/toc.ncx", deflated)?;
        zip.write_all(ncx_document(book).as_bytes())?;

        let cover_media = cover.as_ref().map(|c| (c.extension, c.mime_type));
        zip.start_file("OEBPS/content.opf", deflated)?;
        zip.write_all(package_document(book, cover_media).as_bytes())?;

        zip.finish()?;
        Ok(())
    }
}

fn book_identifier(book: &BookView<'_>) -> String {
    format!(
        "urn:novel-harvest:{}:{}",
        clean_title(&book.project.title).replace(' ', "-").to_lowercase(),
        book.window
    )
}

/// Id of the chapter at `position` within the window; orders are not unique across links
fn chapter_id(position: usize) -> String {
    format!("chapter-{}", zero_pad(position as u32 + 1))
}

fn chapter_href(position: usize) -> String {
    format!("text/{}.xhtml", chapter_id(position))
}

fn xhtml_page(title: &str, stylesheet: &str, body: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops" lang="en" xml:lang="en">
<head>
  <meta charset="UTF-8"/>
  <title>{}</title>
  <link rel="stylesheet" type="text/css" href="{}"/>
</head>
<body>
{}
</body>
</html>
"#,
        text(title),
        stylesheet,
        body
    )
}

fn block_markup(block: &ContentBlock) -> String {
    if !block.is_table() {
        return format!("<p>{}</p>\n", text(&plain_text(&block.text)));
    }

    let mut markup = String::from("<table>\n");
    for row in table_rows(&block.text) {
        markup.push_str("  <tr>");
        for cell in row {
            markup.push_str(&format!("<td>{}</td>", text(&plain_text(&cell))));
        }
        markup.push_str("</tr>\n");
    }
    markup.push_str("</table>\n");
    markup
}

fn chapter_page(chapter: &ChapterContent) -> String {
    let mut body = format!("<h1>{}</h1>\n", text(&chapter.title));
    for block in &chapter.blocks {
        body.push_str(&block_markup(block));
    }
    xhtml_page(&chapter.title, "../style.css", &body)
}

fn cover_page(book: &BookView<'_>, extension: &str) -> String {
    let body = format!(
        r#"<div style="text-align: center;"><img src="../images/cover.{}" alt="{}" style="max-width: 100%; max-height: 100%;"/></div>"#,
        extension,
        attr(&book.project.title)
    );
    xhtml_page("Cover", "../style.css", &body)
}

fn nav_document(book: &BookView<'_>) -> String {
    let mut body = String::from("<nav epub:type=\"toc\" id=\"toc\">\n<h1>Table of Contents</h1>\n<ol>\n");
    for (position, chapter) in book.chapters.iter().enumerate() {
        body.push_str(&format!(
            "  <li><a href=\"{}\">{}</a></li>\n",
            chapter_href(position),
            text(&chapter.title)
        ));
    }
    body.push_str("</ol>\n</nav>");
    xhtml_page("Table of Contents", "style.css", &body)
}

fn ncx_document(book: &BookView<'_>) -> String {
    let mut points = String::new();
    for (position, chapter) in book.chapters.iter().enumerate() {
        points.push_str(&format!(
            r#"    <navPoint id="nav-{id}" playOrder="{play}">
      <navLabel><text>{label}</text></navLabel>
      <content src="{href}"/>
    </navPoint>
"#,
            id = chapter_id(position),
            play = position + 1,
            label = text(&chapter.title),
            href = chapter_href(position)
        ));
    }

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<ncx xmlns="http://www.daisy.org/z3986/2005/ncx/" version="2005-1">
  <head>
    <meta name="dtb:uid" content="{}"/>
  </head>
  <docTitle><text>{}</text></docTitle>
  <navMap>
{}  </navMap>
</ncx>
"#,
        attr(&book_identifier(book)),
        text(&book.heading()),
        points
    )
}

fn package_document(book: &BookView<'_>, cover: Option<(&str, &str)>) -> String {
    let project = book.project;
    let mut metadata = format!(
        r#"    <dc:identifier id="book-id">{}</dc:identifier>
    <dc:title>{}</dc:title>
    <dc:creator>{}</dc:creator>
    <dc:publisher>{}</dc:publisher>
    <dc:language>en</dc:language>
    <meta property="dcterms:modified">{}</meta>
"#,
        text(&book_identifier(book)),
        text(&book.heading()),
        text(&project.author),
        text(&project.author),
        MODIFIED
    );
    let description = fragment_text(&project.description);
    if !description.is_empty() {
        metadata.push_str(&format!("    <dc:description>{}</dc:description>\n", text(&description)));
    }

    let mut manifest = String::from(
        r#"    <item id="nav" href="nav.xhtml" media-type="application/xhtml+xml" properties="nav"/>
    <item id="ncx" href="toc.ncx" media-type="application/x-dtbncx+xml"/>
    <item id="css" href="style.css" media-type="text/css"/>
"#,
    );
    let mut spine = String::new();

    if let Some((extension, mime_type)) = cover {
        metadata.push_str("    <meta name=\"cover\" content=\"cover-image\"/>\n");
        manifest.push_str(&format!(
            "    <item id=\"cover-image\" href=\"images/cover.{}\" media-type=\"{}\" properties=\"cover-image\"/>\n",
            extension, mime_type
        ));
        manifest.push_str("    <item id=\"cover\" href=\"text/cover.xhtml\" media-type=\"application/xhtml+xml\"/>\n");
        spine.push_str("    <itemref idref=\"cover\"/>\n");
    }
    spine.push_str("    <itemref idref=\"nav\"/>\n");

    for position in 0..book.chapters.len() {
        manifest.push_str(&format!(
            "    <item id=\"{}\" href=\"{}\" media-type=\"application/xhtml+xml\"/>\n",
            chapter_id(position),
            chapter_href(position)
        ));
        spine.push_str(&format!("    <itemref idref=\"{}\"/>\n", chapter_id(position)));
    }

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="3.0" unique-identifier="book-id">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
{}  </metadata>
  <manifest>
{}  </manifest>
  <spine toc="ncx">
{}  </spine>
</package>
"#,
        metadata, manifest, spine
    )
}
