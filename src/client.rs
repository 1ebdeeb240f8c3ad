use std::time::{Duration, Instant};

use chrono::Local;
use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, USER_AGENT};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::CrawlError;
use crate::models::{parse_heat, HotSearchEntry, Snapshot};

pub const DEFAULT_API_URL: &str = "https://api.itapi.cn/api/hotnews/xiaohongshu";
pub const API_USER_AGENT: &str = concat!("hotsearch-digest/", env!("CARGO_PKG_VERSION"));

/// Anything that can produce one snapshot per call.
///
/// Closures returning `Result<Snapshot, CrawlError>` are sources too, so the
/// API client and the page scraper are interchangeable values.
pub trait HotSearchSource {
    fn name(&self) -> &str {
        "custom"
    }

    fn fetch(&self) -> Result<Snapshot, CrawlError>;
}

impl<F> HotSearchSource for F
where
    F: Fn() -> Result<Snapshot, CrawlError>,
{
    fn fetch(&self) -> Result<Snapshot, CrawlError> {
        self()
    }
}

/// Response envelope of the hot list endpoint.
#[derive(Debug, Deserialize)]
struct ApiEnvelope {
    code: Option<i64>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    data: Option<Vec<ApiItem>>,
}

#[derive(Debug, Deserialize)]
struct ApiItem {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    rank: Option<Value>,
    #[serde(default)]
    viewnum: Option<Value>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    word_type: Option<String>,
}

pub struct ApiClient {
    http: Client,
    endpoint: Url,
    api_key: String,
    limit: usize,
    timeout: Duration,
}

impl ApiClient {
    pub fn new(endpoint: &str, api_key: &str, limit: usize, timeout: Duration) -> Result<Self, CrawlError> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| CrawlError::Configuration(format!("invalid API url '{}': {}", endpoint, e)))?;

        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CrawlError::Configuration(format!("cannot build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            endpoint,
            api_key: api_key.to_string(),
            limit,
            timeout,
        })
    }

    fn request_url(&self) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("key", &self.api_key)
            .append_pair("limit", &self.limit.to_string());
        url
    }
}

impl HotSearchSource for ApiClient {
    fn name(&self) -> &str {
        "api"
    }

    fn fetch(&self) -> Result<Snapshot, CrawlError> {
        let start_time = Instant::now();
        info!(action = "start", component = "api_client", endpoint = %self.endpoint, limit = self.limit, "Requesting hot search list");
        let response = self
            .http
            .get(self.request_url())
            .header(USER_AGENT, API_USER_AGENT)
            .header(ACCEPT, "application/json")
            .send()
            .map_err(|e| CrawlError::from_transport(e, self.timeout))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            warn!(action = "response", component = "api_client", status = status.as_u16(), "Non-success HTTP status");
            return Err(CrawlError::upstream(
                Some(status.as_u16()),
                format!("endpoint answered {}: {}", status, truncate(&body, 200)),
            ));
        }

        let body = response
            .text()
            .map_err(|e| CrawlError::from_transport(e, self.timeout))?;

        let snapshot = parse_payload(&body, self.limit)?;
        info!(
            action = "complete",
            component = "api_client",
            entry_count = snapshot.len(),
            duration_ms = start_time.elapsed().as_millis(),
            "Hot search list received"
        );
        Ok(snapshot)
    }
}

/// Maps the raw response body onto a snapshot, keeping at most `limit` items.
pub fn parse_payload(body: &str, limit: usize) -> Result<Snapshot, CrawlError> {
    let envelope: ApiEnvelope = serde_json::from_str(body)
        .map_err(|e| CrawlError::upstream(None, format!("malformed JSON: {}", e)))?;

    if let Some(code) = envelope.code {
        if code != 200 {
            return Err(CrawlError::upstream(
                None,
                format!(
                    "API returned code {}: {}",
                    code,
                    envelope.msg.as_deref().unwrap_or("unknown error")
                ),
            ));
        }
    }

    let fetched_at = Local::now();
    let items = envelope.data.unwrap_or_default();
    if items.is_empty() {
        warn!(action = "parse", component = "api_payload", "API returned no hot search entries");
        return Ok(Snapshot::empty("api", fetched_at));
    }

    let mut parsed: Vec<(Option<u32>, ApiItem)> = Vec::new();
    for (idx, item) in items.into_iter().enumerate() {
        if parsed.len() >= limit {
            break;
        }
        if item.name.as_deref().map_or(true, |n| n.trim().is_empty()) {
            warn!(action = "parse", component = "api_payload", position = idx + 1, "Skipping item without a name");
            continue;
        }
        parsed.push((item.rank.as_ref().and_then(value_as_rank), item));
    }

    let upstream_ranks: Option<Vec<u32>> = parsed.iter().map(|(rank, _)| *rank).collect();
    let ranks = match upstream_ranks {
        Some(ranks) if ranks.windows(2).all(|w| w[0] < w[1]) => ranks,
        _ => {
            if !parsed.is_empty() {
                debug!(action = "rank", component = "api_payload", "Upstream ranks unusable, assigning positional ranks");
            }
            (1..=parsed.len() as u32).collect()
        }
    };

    let mut entries = Vec::with_capacity(parsed.len());
    for (rank, (_, item)) in ranks.into_iter().zip(parsed) {
        let heat = item.viewnum.as_ref().map(value_as_heat).unwrap_or(0);
        let entry = HotSearchEntry::new(
            rank,
            item.name.unwrap_or_default(),
            heat,
            item.word_type,
            item.url.unwrap_or_default(),
            fetched_at,
        )
        .map_err(|e| CrawlError::upstream(None, format!("invalid entry at rank {}: {}", rank, e)))?;
        entries.push(entry);
    }

    Snapshot::new("api", fetched_at, entries)
        .map_err(|e| CrawlError::upstream(None, format!("inconsistent ranking: {}", e)))
}

fn value_as_rank(value: &Value) -> Option<u32> {
    let rank = match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    }?;
    u32::try_from(rank).ok().filter(|r| *r >= 1)
}

fn value_as_heat(value: &Value) -> u64 {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f.round() as u64))
            .unwrap_or(0),
        Value::String(s) => parse_heat(s),
        _ => 0,
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;

    const PAYLOAD: &str = r#"{
        "code": 200,
        "msg": "ok",
        "extra": {"ignored": true},
        "data": [
            {"name": "spring outfits", "rank": "1", "viewnum": "1100.9w", "url": "https://example.com/1", "word_type": "hot", "icon": "x"},
            {"name": "", "rank": 2, "viewnum": "10w"},
            {"name": "city walk", "rank": 3, "viewnum": 52000, "word_type": "new"},
            {"name": "matcha latte", "rank": 4, "viewnum": "3.5k"}
        ]
    }"#;

    #[test]
    fn test_parse_payload_maps_fields_and_skips_nameless_items() {
        let snapshot = parse_payload(PAYLOAD, 50).unwrap();
        assert_eq!(snapshot.len(), 3);

        let first = &snapshot.entries()[0];
        assert_eq!(first.rank(), 1);
        assert_eq!(first.term(), "spring outfits");
        assert_eq!(first.heat(), 11_009_000);
        assert_eq!(first.category(), Some("hot"));
        assert_eq!(first.url(), "https://example.com/1");

        assert_eq!(snapshot.entries()[1].heat(), 52_000);
        assert_eq!(snapshot.entries()[2].heat(), 3_500);
        assert_eq!(snapshot.entries()[2].category(), None);
    }

    #[test]
    fn test_parse_payload_ranks_are_positive_and_unique() {
        let body = r#"{"code":200,"data":[
            {"name":"a","rank":0},{"name":"b","rank":0},{"name":"c"}
        ]}"#;
        let snapshot = parse_payload(body, 50).unwrap();
        let ranks: Vec<u32> = snapshot.entries().iter().map(|e| e.rank()).collect();
        assert_eq!(ranks, vec![1, 2, 3]);
    }

    #[test]
    fn test_parse_payload_respects_limit() {
        let snapshot = parse_payload(PAYLOAD, 2).unwrap();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.entries()[1].term(), "city walk");
    }

    #[test]
    fn test_parse_payload_error_code_is_upstream_error() {
        let err = parse_payload(r#"{"code":401,"msg":"bad key"}"#, 50).unwrap_err();
        assert_eq!(err.kind(), "UpstreamError");
        assert!(err.to_string().contains("bad key"));
    }

    #[test]
    fn test_parse_payload_malformed_json_is_upstream_error() {
        let err = parse_payload("<html>", 50).unwrap_err();
        assert_eq!(err.kind(), "UpstreamError");
    }

    #[test]
    fn test_parse_payload_empty_data_is_empty_snapshot() {
        let snapshot = parse_payload(r#"{"code":200,"data":[]}"#, 50).unwrap();
        assert!(snapshot.is_empty());
    }

    fn serve_once(response: &'static str, delay: Duration) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        thread::spawn(move || {
            if let Ok((mut stream, _)) = listener.accept() {
                let mut buf = [0u8; 2048];
                let _ = stream.read(&mut buf);
                thread::sleep(delay);
                let _ = stream.write_all(response.as_bytes());
            }
        });
        format!("http://{}/hot", addr)
    }

    #[test]
    fn test_fetch_maps_http_status_to_upstream_error() {
        let url = serve_once(
            "HTTP/1.1 503 Service Unavailable\r\nContent-Length: 4\r\nConnection: close\r\n\r\nbusy",
            Duration::ZERO,
        );
        let client = ApiClient::new(&url, "key", 10, Duration::from_secs(5)).unwrap();
        match client.fetch() {
            Err(CrawlError::Upstream { status, .. }) => assert_eq!(status, Some(503)),
            other => panic!("expected upstream error, got {:?}", other),
        }
    }

    #[test]
    fn test_fetch_maps_slow_response_to_timeout_error() {
        let url = serve_once(
            "HTTP/1.1 200 OK\r\nContent-Length: 2\r\nConnection: close\r\n\r\n{}",
            Duration::from_secs(3),
        );
        let client = ApiClient::new(&url, "key", 10, Duration::from_millis(300)).unwrap();
        let err = client.fetch().unwrap_err();
        assert_eq!(err.kind(), "TimeoutError");
        assert!(err.to_string().contains("after 300ms"), "{}", err);
    }

    #[test]
    fn test_fetch_parses_successful_response() {
        let url = serve_once(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 51\r\nConnection: close\r\n\r\n{\"code\":200,\"data\":[{\"name\":\"tea\",\"viewnum\":\"1w\"}]}",
            Duration::ZERO,
        );
        let client = ApiClient::new(&url, "key", 10, Duration::from_secs(5)).unwrap();
        let snapshot = client.fetch().unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.entries()[0].heat(), 10_000);
    }

    #[test]
    fn test_request_url_carries_key_and_limit() {
        let client = ApiClient::new(DEFAULT_API_URL, "secret", 25, Duration::from_secs(1)).unwrap();
        let url = client.request_url();
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("key".to_string(), "secret".to_string())));
        assert!(pairs.contains(&("limit".to_string(), "25".to_string())));
    }
}
