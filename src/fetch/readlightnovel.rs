use reqwest::Url;
use scraper::{ElementRef, Html, Selector};

use super::{ChapterContentFetcher, FetchSettings, NovelMetadataFetcher, with_retry};
use crate::error::FetchError;
use crate::model::{ChapterReference, ContentBlock, FetchedChapter, NovelMetadata};

const TITLE_SELECTOR: &str = "div.col-lg-8.content h1";
const COVER_SELECTOR: &str = "div.novel-cover img";
const AUTHOR_SELECTOR: &str =
    "div.novel-details > div:nth-child(5) > div.novel-detail-body > ul > li > a";
const DESCRIPTION_SELECTOR: &str =
    "div.novel-right > div > div:nth-child(1) > div.novel-detail-body";
const CHAPTER_LIST_SELECTOR: &str = "#collapse-1 div[id^='chapters_1-'] > ul > li";
const CHAPTER_HEADING_SELECTOR: &str = "div.col-lg-8.content2 h1";
const CHAPTER_BLOCK_SELECTOR: &str =
    "div.chapter-content3 > div.desc > p, div.chapter-content3 > div.desc > table";

const WATERMARKS: [&str; 3] = [
    r#"<p class="hid">This chapter is scrapped from readlightnovel.org</p>"#,
    "<p>This chapter is scrapped from readlightnovel.org</p>",
    "This chapter is scrapped from readlightnovel.org",
];
const AD_MARKER: &str = "(vitag.Init";

/// HTTP client for readlightnovel-style novel pages
#[derive(Debug, Clone)]
pub struct ReadLightNovelClient {
    client: reqwest::Client,
    settings: FetchSettings,
}

impl ReadLightNovelClient {
    pub fn new(settings: FetchSettings) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .user_agent(settings.user_agent.clone())
            .build()?;
        Ok(Self { client, settings })
    }

    async fn get_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let client = &self.client;
        with_retry(&self.settings, url, move || async move {
            let response = client.get(url).send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(FetchError::HttpStatus {
                    status: status.as_u16(),
                    url: url.to_string(),
                });
            }
            Ok(response.bytes().await?.to_vec())
        })
        .await
    }

    async fn get_text(&self, url: &str) -> Result<String, FetchError> {
        let bytes = self.get_bytes(url).await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

#[async_trait::async_trait]
impl NovelMetadataFetcher for ReadLightNovelClient {
    async fn fetch_metadata(&self, work_link: &str) -> Result<NovelMetadata, FetchError> {
        let body = self.get_text(work_link).await?;
        parse_novel_page(&body, work_link)
    }

    async fn fetch_cover(&self, cover_reference: &str) -> Result<Vec<u8>, FetchError> {
        self.get_bytes(cover_reference).await
    }
}

#[async_trait::async_trait]
impl ChapterContentFetcher for ReadLightNovelClient {
    async fn fetch_chapter(&self, link: &str) -> Result<FetchedChapter, FetchError> {
        let body = self.get_text(link).await?;
        parse_chapter_page(&body)
    }
}

fn selector(css: &str) -> Result<Selector, FetchError> {
    Selector::parse(css)
        .map_err(|_| FetchError::SelectorError(format!("Failed to parse {} selector", css)))
}

fn collect_text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>()
}

/// Resolves `href` against the page it appeared on
fn resolve_link(base: Option<&Url>, href: &str) -> String {
    base.and_then(|base| base.join(href).ok())
        .map(|url| url.to_string())
        .unwrap_or_else(|| href.to_string())
}

/// Extracts metadata and the chapter listing from a novel landing page
pub fn parse_novel_page(body: &str, page_url: &str) -> Result<NovelMetadata, FetchError> {
    let document = Html::parse_document(body.trim());
    let base = Url::parse(page_url).ok();

    let title = document
        .select(&selector(TITLE_SELECTOR)?)
        .next()
        .and_then(|h1| h1.text().next().map(|t| t.trim().to_string()))
        .filter(|t| !t.is_empty())
        .ok_or_else(|| FetchError::ElementNotFound(String::from("Novel title element not found")))?;

    let cover_reference = document
        .select(&selector(COVER_SELECTOR)?)
        .next()
        .and_then(|img| img.value().attr("src"))
        .map(|src| resolve_link(base.as_ref(), src.trim()))
        .unwrap_or_default();

    let author = document
        .select(&selector(AUTHOR_SELECTOR)?)
        .next()
        .map(|a| collect_text(a).trim().to_string())
        .unwrap_or_default();

    let mut description = String::new();
    if let Some(body) = document.select(&selector(DESCRIPTION_SELECTOR)?).next() {
        for child in body.children() {
            let text = if let Some(text) = child.value().as_text() {
                (**text).to_string()
            } else if let Some(element) = ElementRef::wrap(child) {
                collect_text(element)
            } else {
                continue;
            };
            let text = text.trim();
            if !text.is_empty() {
                description.push_str(&format!("<p>{}</p>", text));
            }
        }
    }

    let link_selector = selector("a")?;
    let chapters = document
        .select(&selector(CHAPTER_LIST_SELECTOR)?)
        .filter_map(|li| {
            let href = li.select(&link_selector).next()?.value().attr("href")?;
            Some((resolve_link(base.as_ref(), href.trim()), collect_text(li).trim().to_string()))
        })
        .enumerate()
        .map(|(i, (link, title))| ChapterReference {
            order: i as u32 + 1,
            link,
            title,
        })
        .collect::<Vec<_>>();

    if chapters.is_empty() {
        tracing::warn!(%title, "novel page lists no chapters");
    }

    Ok(NovelMetadata {
        title,
        cover_reference,
        author,
        description,
        chapters,
    })
}

/// Scraped text keeps no control characters besides line breaks and tabs
fn is_kept_char(c: char) -> bool {
    !c.is_control() || matches!(c, '\t' | '\n' | '\r')
}

fn scrub_watermarks(text: &str) -> String {
    WATERMARKS
        .iter()
        .fold(text.to_string(), |acc, mark| acc.replace(mark, ""))
}

/// Extracts the heading and content blocks of a chapter page
pub fn parse_chapter_page(body: &str) -> Result<FetchedChapter, FetchError> {
    let document = Html::parse_document(body.trim());

    let title = document
        .select(&selector(CHAPTER_HEADING_SELECTOR)?)
        .next()
        .map(|h1| collect_text(h1).replace(|c: char| !is_kept_char(c), "").trim().to_string())
        .ok_or_else(|| FetchError::ElementNotFound(String::from("Chapter heading element not found")))?;

    let mut blocks = Vec::new();
    for element in document.select(&selector(CHAPTER_BLOCK_SELECTOR)?) {
        match element.value().name() {
            "p" => {
                let mut text = scrub_watermarks(&collect_text(element))
                    .replace("&nbsp;", "")
                    .replace('\u{a0}', "");
                if let Some(cut) = text.find(AD_MARKER) {
                    text.truncate(cut);
                }
                text.retain(is_kept_char);
                if !text.trim().is_empty() {
                    blocks.push(ContentBlock::new(text));
                }
            }
            "table" => blocks.push(ContentBlock::new(scrub_watermarks(&element.html()))),
            _ => {}
        }
    }

    Ok(FetchedChapter { title, blocks })
}
