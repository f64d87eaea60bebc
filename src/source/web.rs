// src/source/web.rs
//
// Web source: fetches a URL with exponential-backoff retry on transient
// statuses, strips non-content elements, and extracts page text (spec §4.1).

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use scraper::{Html, Selector};
use serde_json::json;
use tracing::warn;

use crate::data::{PageContent, RawContent, SourceData};
use crate::error::CadenceError;
use crate::source::{is_cancelled, CancelFlag, Source};

const RETRY_DELAYS_MS: [u64; 3] = [500, 1000, 2000];
const TRANSIENT_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];
const STRIP_SELECTORS: &[&str] = &[
    "script", "style", "nav", "header", "footer", "aside", "[class*=\"advertising\"]", "[class*=\"ad-\"]",
];

pub struct WebSource {
    pub url: String,
    client: reqwest::Client,
}

impl WebSource {
    pub fn new(url: impl Into<String>) -> Self {
        let raw = url.into();
        let url = if raw.contains("://") {
            raw
        } else {
            format!("https://{raw}")
        };
        Self {
            url,
            client: reqwest::Client::new(),
        }
    }

    async fn fetch_with_retry(&self, cancel: &CancelFlag) -> Result<(u16, String), CadenceError> {
        let mut attempt = 0usize;
        loop {
            if is_cancelled(cancel) {
                return Err(CadenceError::Cancelled("fetch cancelled".to_string()));
            }
            let result = self.client.get(&self.url).send().await;
            match result {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if TRANSIENT_STATUSES.contains(&status) && attempt < RETRY_DELAYS_MS.len() {
                        warn!("transient status {status} fetching {}, retrying", self.url);
                        tokio::time::sleep(Duration::from_millis(RETRY_DELAYS_MS[attempt])).await;
                        attempt += 1;
                        continue;
                    }
                    if !(200..300).contains(&status) {
                        return Err(CadenceError::io(format!(
                            "fetch {} returned status {status} after {attempt} attempt(s)",
                            self.url
                        )));
                    }
                    let body = resp
                        .text()
                        .await
                        .map_err(|e| CadenceError::io(format!("reading body failed: {e}")))?;
                    return Ok((status, body));
                }
                Err(e) if attempt < RETRY_DELAYS_MS.len() && (e.is_timeout() || e.is_connect()) => {
                    warn!("network error fetching {}: {e}, retrying", self.url);
                    tokio::time::sleep(Duration::from_millis(RETRY_DELAYS_MS[attempt])).await;
                    attempt += 1;
                }
                Err(e) => {
                    return Err(CadenceError::io(format!(
                        "fetch {} failed after {attempt} attempt(s): {e}",
                        self.url
                    )))
                }
            }
        }
    }
}

#[async_trait]
impl Source for WebSource {
    fn source_type(&self) -> &'static str {
        "web"
    }

    async fn validate(&self, cancel: &CancelFlag) -> Result<(), CadenceError> {
        if is_cancelled(cancel) {
            return Err(CadenceError::Cancelled("validation cancelled".to_string()));
        }
        url::Url::parse(&self.url).map_err(|e| CadenceError::validation(format!("invalid URL {}: {e}", self.url)))?;
        Ok(())
    }

    async fn fetch(&self, cancel: &CancelFlag) -> Result<SourceData, CadenceError> {
        if is_cancelled(cancel) {
            return Err(CadenceError::Cancelled("fetch cancelled".to_string()));
        }
        let (status, html) = self.fetch_with_retry(cancel).await?;
        let page = parse_page(&html, status);

        let mut metadata = HashMap::new();
        metadata.insert("word_count".to_string(), json!(page.word_count));
        metadata.insert("character_count".to_string(), json!(page.all_text.chars().count()));
        metadata.insert("heading_count".to_string(), json!(page.headings.len()));

        Ok(SourceData {
            id: self.url.clone(),
            source_type: self.source_type().to_string(),
            raw_content: RawContent::Page(page),
            metadata,
        })
    }
}

fn parse_page(html: &str, status_code: u16) -> PageContent {
    let document = Html::parse_document(html);

    let strip_selector_str = STRIP_SELECTORS.join(", ");
    let strip_selector = Selector::parse(&strip_selector_str).ok();

    let stripped_text = |root_selector: &str| -> String {
        let Ok(sel) = Selector::parse(root_selector) else {
            return String::new();
        };
        document
            .select(&sel)
            .flat_map(|el| {
                el.text().collect::<Vec<_>>()
            })
            .collect::<Vec<_>>()
            .join(" ")
    };

    let title = document
        .select(&Selector::parse("title").unwrap())
        .next()
        .map(|e| e.text().collect::<String>())
        .unwrap_or_default();

    let description = document
        .select(&Selector::parse("meta[name=\"description\"]").unwrap())
        .next()
        .and_then(|e| e.value().attr("content"))
        .unwrap_or_default()
        .to_string();

    let mut meta_tags = HashMap::new();
    if let Ok(sel) = Selector::parse("meta[name]") {
        for el in document.select(&sel) {
            if let (Some(name), Some(content)) = (el.value().attr("name"), el.value().attr("content")) {
                meta_tags.insert(name.to_string(), content.to_string());
            }
        }
    }

    let headings: Vec<String> = Selector::parse("h1, h2, h3")
        .ok()
        .map(|sel| {
            document
                .select(&sel)
                .map(|e| e.text().collect::<String>().trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default();

    // Strip non-content elements for the "all text" extraction. A text
    // node is excluded if ANY ancestor (not just itself) matches a strip
    // selector, so whole subtrees (script/style/nav/... bodies) drop out.
    let excluded: std::collections::HashSet<_> = strip_selector
        .map(|sel| document.select(&sel).flat_map(|e| e.descendants().map(|n| n.id())).collect())
        .unwrap_or_default();

    let body_sel = Selector::parse("body").ok();
    let all_text = body_sel
        .map(|sel| {
            document
                .select(&sel)
                .flat_map(|body| {
                    body.descendants().filter_map(|node| {
                        if excluded.contains(&node.id()) {
                            return None;
                        }
                        node.value().as_text().map(|t| t.to_string())
                    })
                })
                .collect::<Vec<_>>()
                .join(" ")
        })
        .unwrap_or_default();
    let all_text = normalize_whitespace(&all_text);

    // mainContent: semantic containers first, falling back to h1-h3 + long paragraphs.
    let main_content = {
        let from_semantic = stripped_text("main, article");
        if !from_semantic.trim().is_empty() {
            normalize_whitespace(&from_semantic)
        } else {
            let mut parts: Vec<String> = headings.clone();
            if let Ok(sel) = Selector::parse("p") {
                parts.extend(
                    document
                        .select(&sel)
                        .map(|e| e.text().collect::<String>())
                        .filter(|t| t.trim().len() > 80),
                );
            }
            normalize_whitespace(&parts.join(" "))
        }
    };

    let word_count = all_text.split_whitespace().count();

    PageContent {
        title,
        description,
        body: all_text.clone(),
        all_text,
        main_content,
        headings,
        meta_tags,
        word_count,
        status_code,
        fetched_at: Utc::now(),
    }
}

fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_selectors_remove_their_whole_subtree_from_all_text() {
        let html = r#"
            <html>
              <body>
                <nav><a href="/">home</a> <a href="/about">about</a></nav>
                <header><h1>Site Title</h1></header>
                <main><p>Real article content goes here.</p></main>
                <script>var hidden = "should not appear";</script>
                <div class="ad-banner">Buy now!</div>
                <footer>copyright 2024</footer>
              </body>
            </html>
        "#;
        let page = parse_page(html, 200);

        assert!(page.all_text.contains("Real article content"));
        assert!(!page.all_text.contains("home"));
        assert!(!page.all_text.contains("Site Title"));
        assert!(!page.all_text.contains("hidden"));
        assert!(!page.all_text.contains("Buy now"));
        assert!(!page.all_text.contains("copyright"));
    }
}
