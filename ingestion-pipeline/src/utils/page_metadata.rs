use std::{collections::HashMap, time::Duration};

use chrono::Utc;
use common::{error::AppError, storage::types::document::Document, utils::config::AppConfig};
use scraper::{Html, Selector};
use tracing::{debug, instrument, warn};

use super::BROWSER_USER_AGENT;

const UNTITLED: &str = "Untitled Document";
const PLACEHOLDER_TITLE: &str = "Web Page Snapshot";
const PLACEHOLDER_DESCRIPTION: &str = "PDF snapshot of web page";

/// Descriptive fields scraped from a page's `<head>`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PageMetadata {
    pub title: String,
    pub description: String,
    pub canonical_url: String,
    pub meta_tags: HashMap<String, String>,
}

impl PageMetadata {
    /// Values used when the page cannot be fetched or parsed.
    pub fn placeholder(url: &str) -> Self {
        Self {
            title: PLACEHOLDER_TITLE.to_string(),
            description: PLACEHOLDER_DESCRIPTION.to_string(),
            canonical_url: url.to_string(),
            meta_tags: HashMap::new(),
        }
    }

    /// Copies the metadata onto `document` and stamps the fetch time.
    pub fn apply_to(self, document: &mut Document) {
        document.title = self.title;
        document.description = self.description;
        document.canonical_url = self.canonical_url;
        document.meta_tags = self.meta_tags;
        document.fetched_at = Utc::now();
    }
}

fn selector(css: &str) -> Result<Selector, AppError> {
    Selector::parse(css)
        .map_err(|err| AppError::Extraction(format!("invalid selector '{css}': {err}")))
}

fn first_attr(html: &Html, css: &str, attr: &str) -> Result<Option<String>, AppError> {
    let selector = selector(css)?;
    Ok(html
        .select(&selector)
        .filter_map(|element| element.value().attr(attr))
        .map(str::trim)
        .find(|value| !value.is_empty())
        .map(str::to_string))
}

/// Parses title, description, canonical URL and every named `<meta>` value out of `html`.
pub fn parse_page_metadata(html: &str, url: &str) -> Result<PageMetadata, AppError> {
    let document = Html::parse_document(html);

    let title_selector = selector("title")?;
    let title = document
        .select(&title_selector)
        .next()
        .map(|element| element.text().collect::<String>().trim().to_string())
        .filter(|title| !title.is_empty())
        .unwrap_or_else(|| UNTITLED.to_string());

    let description = match first_attr(&document, r#"meta[name="description"]"#, "content")? {
        Some(value) => value,
        None => first_attr(&document, r#"meta[property="og:description"]"#, "content")?
            .unwrap_or_else(|| format!("PDF snapshot of {url}")),
    };

    let canonical_url = match first_attr(&document, r#"link[rel="canonical"]"#, "href")? {
        Some(value) => value,
        None => first_attr(&document, r#"meta[property="og:url"]"#, "content")?
            .unwrap_or_else(|| url.to_string()),
    };

    let meta_selector = selector("meta")?;
    let meta_tags = document
        .select(&meta_selector)
        .filter_map(|element| {
            let attrs = element.value();
            let key = attrs.attr("name").or_else(|| attrs.attr("property"))?;
            let content = attrs.attr("content")?.trim();
            (!key.is_empty() && !content.is_empty())
                .then(|| (key.to_string(), content.to_string()))
        })
        .collect();

    Ok(PageMetadata {
        title,
        description,
        canonical_url,
        meta_tags,
    })
}

/// Fetches page HTML and extracts [`PageMetadata`], never failing the caller.
#[derive(Debug, Clone)]
pub struct MetadataFetcher {
    http: reqwest::Client,
}

impl MetadataFetcher {
    pub fn new(timeout: Duration) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(BROWSER_USER_AGENT)
            .build()?;
        Ok(Self { http })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, AppError> {
        Self::new(Duration::from_secs(config.metadata_timeout_secs))
    }

    #[instrument(skip(self))]
    pub async fn fetch(&self, url: &str) -> PageMetadata {
        match self.try_fetch(url).await {
            Ok(metadata) => {
                debug!(title = %metadata.title, tags = metadata.meta_tags.len(), "Page metadata extracted");
                metadata
            }
            Err(err) => {
                warn!(error = %err, "Metadata extraction failed, using placeholders");
                PageMetadata::placeholder(url)
            }
        }
    }

    async fn try_fetch(&self, url: &str) -> Result<PageMetadata, AppError> {
        let body = self
            .http
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        parse_page_metadata(&body, url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::{matchers::method, Mock, MockServer, ResponseTemplate};

    const PAGE: &str = r#"<!doctype html>
<html><head>
  <title>  Rust Release Notes </title>
  <meta name="description" content="What changed in Rust">
  <meta property="og:description" content="ignored">
  <meta name="keywords" content="rust, compiler">
  <meta name="data-note" content="read later">
  <meta property="og:type" content="article">
  <meta name="empty" content="  ">
  <link rel="canonical" href="https://blog.example.com/rust">
</head><body><p>Hello</p></body></html>"#;

    #[test]
    fn parses_head_fields() {
        let metadata = parse_page_metadata(PAGE, "https://example.com/r").expect("parse");
        assert_eq!(metadata.title, "Rust Release Notes");
        assert_eq!(metadata.description, "What changed in Rust");
        assert_eq!(metadata.canonical_url, "https://blog.example.com/rust");
        assert_eq!(
            metadata.meta_tags.get("data-note").map(String::as_str),
            Some("read later")
        );
        assert_eq!(
            metadata.meta_tags.get("og:type").map(String::as_str),
            Some("article")
        );
        assert!(!metadata.meta_tags.contains_key("empty"));
    }

    #[test]
    fn falls_back_when_head_is_sparse() {
        let html = r#"<html><head><meta property="og:url" content="https://c.example.com"></head></html>"#;
        let metadata = parse_page_metadata(html, "https://example.com/x").expect("parse");
        assert_eq!(metadata.title, "Untitled Document");
        assert_eq!(metadata.description, "PDF snapshot of https://example.com/x");
        assert_eq!(metadata.canonical_url, "https://c.example.com");

        let bare = parse_page_metadata("<p>no head</p>", "https://example.com/y").expect("parse");
        assert_eq!(bare.canonical_url, "https://example.com/y");
    }

    #[tokio::test]
    async fn fetcher_parses_remote_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(PAGE))
            .mount(&server)
            .await;

        let fetcher = MetadataFetcher::new(Duration::from_secs(5)).expect("client");
        let metadata = fetcher.fetch(&server.uri()).await;
        assert_eq!(metadata.title, "Rust Release Notes");
    }

    #[tokio::test]
    async fn fetch_failure_yields_placeholder() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let fetcher = MetadataFetcher::new(Duration::from_secs(5)).expect("client");
        let url = server.uri();
        assert_eq!(fetcher.fetch(&url).await, PageMetadata::placeholder(&url));
    }

    #[test]
    fn apply_copies_fields_onto_document() {
        let mut document = Document::new("https://example.com");
        let mut metadata = PageMetadata::placeholder("https://example.com");
        metadata.title = "Fresh".into();
        metadata.apply_to(&mut document);
        assert_eq!(document.title, "Fresh");
        assert_eq!(document.description, "PDF snapshot of web page");
    }
}
