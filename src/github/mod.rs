use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::{HeaderMap, ACCEPT, LINK};
use serde::de::DeserializeOwned;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::config::Config;

const USER_AGENT: &str = concat!("repo-digest/", env!("CARGO_PKG_VERSION"));
const GITHUB_JSON: &str = "application/vnd.github+json";

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("GET {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("GET {url} returned HTTP {status}: {body}")]
    Http {
        url: String,
        status: u16,
        body: String,
    },

    #[error("Failed to decode response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

/// One page of a list resource.
#[derive(Debug)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// URL of the following page, taken from the `Link` header
    pub next: Option<String>,
}

/// Thin GitHub REST client. Requests are issued one at a time and are
/// never retried or cached.
#[derive(Debug, Clone)]
pub struct GitHubClient {
    http: reqwest::Client,
    token: Option<String>,
}

impl GitHubClient {
    pub fn new(token: Option<String>, timeout: Duration) -> Result<Self, FetchError> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(FetchError::Client)?;
        Ok(Self { http, token })
    }

    pub fn from_config(config: &Config) -> Result<Self, FetchError> {
        if config.token.is_none() {
            debug!("no access token configured; requests are anonymous and heavily rate limited");
        }
        Self::new(config.token.clone(), config.timeout)
    }

    /// Fetch one page of a list resource.
    pub async fn fetch_list<T: DeserializeOwned>(&self, url: &str) -> Result<Page<T>, FetchError> {
        let (items, next) = self.get::<Vec<T>>(url).await?;
        debug!(url, records = items.len(), has_next = next.is_some(), "fetched page");
        Ok(Page { items, next })
    }

    /// Fetch a single record.
    pub async fn fetch_one<T: DeserializeOwned>(&self, url: &str) -> Result<T, FetchError> {
        let (record, _) = self.get::<T>(url).await?;
        Ok(record)
    }

    /// Fetch every page of a list resource, following `next` links.
    pub async fn fetch_all<T: DeserializeOwned>(&self, url: &str) -> Result<Vec<T>, FetchError> {
        let mut all = Vec::new();
        let mut next = Some(url.to_string());
        while let Some(url) = next.take() {
            let page = self.fetch_list::<T>(&url).await?;
            all.extend(page.items);
            next = page.next;
        }
        Ok(all)
    }

    #[instrument(level = "trace", skip(self))]
    async fn get<T: DeserializeOwned>(&self, url: &str) -> Result<(T, Option<String>), FetchError> {
        let mut request = self.http.get(url).header(ACCEPT, GITHUB_JSON);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|source| FetchError::Transport {
            url: url.to_string(),
            source,
        })?;

        let status = response.status();
        let next = next_page_url(response.headers());
        if let Some(remaining) = response
            .headers()
            .get("x-ratelimit-remaining")
            .and_then(|v| v.to_str().ok())
        {
            debug!(remaining, "rate limit");
        }

        let body = response.text().await.map_err(|source| FetchError::Transport {
            url: url.to_string(),
            source,
        })?;

        if !status.is_success() {
            return Err(FetchError::Http {
                url: url.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        let value = serde_json::from_str(&body).map_err(|source| FetchError::Decode {
            url: url.to_string(),
            source,
        })?;
        Ok((value, next))
    }
}

/// Extract the `rel="next"` target from a response's `Link` header.
pub fn next_page_url(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(LINK)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find_map(parse_next_link)
}

/// One `<target>` of a `Link` header value and the parameter text after it.
/// Matching on the angle brackets keeps commas inside the target intact.
static LINK_VALUE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<([^>]*)>([^<]*)").expect("valid regex"));
static REL_PARAM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)(?:^|;)\s*rel\s*=\s*(?:"([^"]*)"|([^\s;,]+))"#).expect("valid regex")
});

/// Parse an RFC 8288 `Link` header value, e.g.
/// `<https://api.github.com/...&page=2>; rel="next", <...>; rel="last"`.
fn parse_next_link(header: &str) -> Option<String> {
    LINK_VALUE.captures_iter(header).find_map(|link| {
        let target = link.get(1)?.as_str().trim();
        let params = link.get(2)?.as_str();
        let is_next = REL_PARAM.captures_iter(params).any(|rel| {
            rel.get(1)
                .or_else(|| rel.get(2))
                .is_some_and(|value| {
                    value
                        .as_str()
                        .split_whitespace()
                        .any(|rel| rel.eq_ignore_ascii_case("next"))
                })
        });
        (is_next && !target.is_empty()).then(|| target.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Debug, Deserialize)]
    struct Record {
        id: u64,
    }

    fn client() -> GitHubClient {
        GitHubClient::new(None, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_parse_next_link() {
        let header = r#"<https://api.github.com/repositories/1/pulls?page=2>; rel="next", <https://api.github.com/repositories/1/pulls?page=9>; rel="last""#;
        assert_eq!(
            parse_next_link(header).as_deref(),
            Some("https://api.github.com/repositories/1/pulls?page=2")
        );
    }

    #[test]
    fn test_parse_next_link_not_first() {
        let header = r#"<https://x/?page=1>; rel="prev", <https://x/?page=3>; rel="next""#;
        assert_eq!(parse_next_link(header).as_deref(), Some("https://x/?page=3"));
    }

    #[test]
    fn test_parse_next_link_absent() {
        assert!(parse_next_link(r#"<https://x/?page=1>; rel="prev""#).is_none());
        assert!(parse_next_link("").is_none());
        assert!(parse_next_link("garbage").is_none());
        assert!(parse_next_link("<>; rel=\"next\"").is_none());
    }

    #[test]
    fn test_parse_next_link_with_comma_in_target() {
        let header = r#"<https://api.github.com/repos/o/r/pulls?labels=a,b&page=2>; rel="next", <https://api.github.com/repos/o/r/pulls?labels=a,b&page=5>; rel="last""#;
        assert_eq!(
            parse_next_link(header).as_deref(),
            Some("https://api.github.com/repos/o/r/pulls?labels=a,b&page=2")
        );
    }

    #[test]
    fn test_parse_next_link_param_forms() {
        assert_eq!(
            parse_next_link("<https://x/?page=2>; rel=next").as_deref(),
            Some("https://x/?page=2")
        );
        assert_eq!(
            parse_next_link(r#"<https://x/?page=2>; title="a"; REL="prev next""#).as_deref(),
            Some("https://x/?page=2")
        );
        assert!(parse_next_link(r#"<https://x/?page=2>; rel="nextish""#).is_none());
    }

    #[tokio::test]
    async fn test_fetch_all_follows_next_link_with_comma() {
        let server = MockServer::start().await;
        let next = format!("{}/items?labels=a,b&page=2", server.uri());
        Mock::given(method("GET"))
            .and(path("/items"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([{ "id": 2 }])))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/items"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!([{ "id": 1 }]))
                    .insert_header("Link", format!("<{next}>; rel=\"next\"").as_str()),
            )
            .expect(1)
            .mount(&server)
            .await;

        let all = client()
            .fetch_all::<Record>(&format!("{}/items?labels=a,b", server.uri()))
            .await
            .unwrap();
        let ids: Vec<u64> = all.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_fetch_list_returns_next_page() {
        let server = MockServer::start().await;
        let next = format!("{}/items?page=2", server.uri());
        Mock::given(method("GET"))
            .and(path("/items"))
            .and(header("accept", GITHUB_JSON))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!([{ "id": 1, "extra": "ignored" }, { "id": 2 }]))
                    .insert_header("Link", format!("<{next}>; rel=\"next\"").as_str()),
            )
            .expect(1)
            .mount(&server)
            .await;

        let page = client()
            .fetch_list::<Record>(&format!("{}/items", server.uri()))
            .await
            .unwrap();
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[1].id, 2);
        assert_eq!(page.next.as_deref(), Some(next.as_str()));
    }

    #[tokio::test]
    async fn test_fetch_all_follows_pages() {
        let server = MockServer::start().await;
        let next = format!("{}/items?page=2", server.uri());
        Mock::given(method("GET"))
            .and(path("/items"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([{ "id": 3 }])))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/items"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!([{ "id": 1 }, { "id": 2 }]))
                    .insert_header("Link", format!("<{next}>; rel=\"next\"").as_str()),
            )
            .expect(1)
            .mount(&server)
            .await;

        let all = client()
            .fetch_all::<Record>(&format!("{}/items", server.uri()))
            .await
            .unwrap();
        let ids: Vec<u64> = all.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_sends_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/one"))
            .and(header("authorization", "Bearer secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "id": 7 })))
            .expect(1)
            .mount(&server)
            .await;

        let client = GitHubClient::new(Some("secret".to_string()), Duration::from_secs(5)).unwrap();
        let record = client
            .fetch_one::<Record>(&format!("{}/one", server.uri()))
            .await
            .unwrap();
        assert_eq!(record.id, 7);
    }

    #[tokio::test]
    async fn test_http_error_carries_status_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403).set_body_string("API rate limit exceeded"))
            .mount(&server)
            .await;

        let err = client()
            .fetch_one::<Record>(&format!("{}/one", server.uri()))
            .await
            .unwrap_err();
        match err {
            FetchError::Http { status, body, .. } => {
                assert_eq!(status, 403);
                assert!(body.contains("rate limit"));
            }
            other => panic!("expected HTTP error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_malformed_json_is_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{not json"))
            .mount(&server)
            .await;

        let err = client()
            .fetch_list::<Record>(&format!("{}/items", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Decode { .. }));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_transport_error() {
        let err = client()
            .fetch_one::<Record>("http://127.0.0.1:1/unreachable")
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Transport { .. }));
    }
}
