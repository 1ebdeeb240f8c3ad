use std::collections::HashSet;
use std::time::{Duration, Instant};

use chrono::Local;
use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, USER_AGENT};
use scraper::{Html, Selector};
use tracing::{info, warn};
use url::Url;

use crate::client::HotSearchSource;
use crate::error::CrawlError;
use crate::models::{HotSearchEntry, Snapshot};

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
const HOT_ITEM_SELECTOR: &str = r#"[class*="hot-search"], [class*="trending"], [class*="hot"]"#;
const SEARCH_URL: &str = "https://www.xiaohongshu.com/search_result";

/// Secondary source that reads the hot list straight off a web page.
pub struct PageScraper {
    http: Client,
    page_url: Url,
    limit: usize,
    timeout: Duration,
}

impl PageScraper {
    pub fn new(page_url: &str, limit: usize, timeout: Duration) -> Result<Self, CrawlError> {
        let page_url = Url::parse(page_url)
            .map_err(|e| CrawlError::Configuration(format!("invalid fallback url '{}': {}", page_url, e)))?;

        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CrawlError::Configuration(format!("cannot build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            page_url,
            limit,
            timeout,
        })
    }
}

impl HotSearchSource for PageScraper {
    fn name(&self) -> &str {
        "page"
    }

    fn fetch(&self) -> Result<Snapshot, CrawlError> {
        let start_time = Instant::now();
        info!(action = "start", component = "page_scraper", url = %self.page_url, "Scraping hot search page");
        let response = self
            .http
            .get(self.page_url.clone())
            .header(USER_AGENT, BROWSER_USER_AGENT)
            .header(ACCEPT, "text/html,application/xhtml+xml")
            .header(ACCEPT_LANGUAGE, "zh-CN,zh;q=0.9,en;q=0.8")
            .send()
            .map_err(|e| CrawlError::from_transport(e, self.timeout))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CrawlError::upstream(
                Some(status.as_u16()),
                format!("page answered {}", status),
            ));
        }

        let html = response
            .text()
            .map_err(|e| CrawlError::from_transport(e, self.timeout))?;

        let snapshot = parse_page(&html, self.limit)?;
        info!(
            action = "complete",
            component = "page_scraper",
            entry_count = snapshot.len(),
            duration_ms = start_time.elapsed().as_millis(),
            "Page scraped"
        );
        Ok(snapshot)
    }
}

/// Extracts hot terms from elements whose class mentions hot or trending.
pub fn parse_page(html: &str, limit: usize) -> Result<Snapshot, CrawlError> {
    let document = Html::parse_document(html);
    let selector = Selector::parse(HOT_ITEM_SELECTOR)
        .map_err(|e| CrawlError::upstream(None, format!("bad selector: {:?}", e)))?;

    let fetched_at = Local::now();
    let mut seen = HashSet::new();
    let mut entries = Vec::new();

    for element in document.select(&selector) {
        if entries.len() >= limit {
            break;
        }

        let text = element.text().collect::<Vec<_>>().join(" ");
        let term = text.split_whitespace().collect::<Vec<_>>().join(" ");
        if term.is_empty() || !seen.insert(term.clone()) {
            continue;
        }

        let rank = entries.len() as u32 + 1;
        match HotSearchEntry::new(rank, term.as_str(), 0, None, search_url(&term), fetched_at) {
            Ok(entry) => entries.push(entry),
            Err(e) => warn!(action = "parse", component = "page_scraper", error = %e, "Skipping element"),
        }
    }

    if entries.is_empty() {
        return Err(CrawlError::upstream(None, "no hot search entries found on page"));
    }

    Snapshot::new("page", fetched_at, entries)
        .map_err(|e| CrawlError::upstream(None, format!("inconsistent ranking: {}", e)))
}

/// Search link for a term on the source site.
pub fn search_url(term: &str) -> String {
    Url::parse_with_params(SEARCH_URL, &[("keyword", term)])
        .map(|u| u.to_string())
        .unwrap_or_default()
}
