//! Feed source trait and the HTTP implementation.

use crate::error::{ErrorKind, Result};
use crate::record::{Record, format_timestamp};
use async_trait::async_trait;
use exn::ResultExt;
use reqwest::Url;
use std::time::Duration;
use time::OffsetDateTime;
use tracing::instrument;

/// Anything that can answer "give me up to `limit` records starting at
/// `since`".
///
/// # Overlap Contract
/// `since` is inclusive: when a record exists with exactly that timestamp it
/// is the first element of the response. Polling with [`ZERO`](crate::ZERO)
/// starts from the earliest record the feed has. Implementations must not
/// retry internally; the caller decides what a failure means for the run.
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Human-readable identifier, used for logging only.
    fn name(&self) -> &str;

    async fn fetch(&self, since: OffsetDateTime, limit: u32) -> Result<Vec<Record>>;
}

/// Decode a response body made of concatenated JSON objects (the index
/// separates them with newlines, but any whitespace will do).
///
/// The whole body fails to decode if any single element fails to decode.
pub fn decode_records(body: &[u8]) -> Result<Vec<Record>> {
    serde_json::Deserializer::from_slice(body)
        .into_iter::<Record>()
        .map(|record| record.map(Record::normalized).or_raise(|| ErrorKind::Decode))
        .collect()
}

/// HTTP client for the module index (`https://index.golang.org/index`).
#[derive(Debug, Clone)]
pub struct FeedClient {
    url: Url,
    http: reqwest::Client,
}
impl FeedClient {
    /// Build a client for the index at `url`.
    ///
    /// The URL must be absolute and use `https`. Every request is bounded by
    /// `timeout`, after which it fails as [`ErrorKind::Transport`].
    pub fn new(url: impl AsRef<str>, timeout: Duration, user_agent: impl AsRef<str>) -> Result<Self> {
        let raw = url.as_ref().trim_end_matches('/');
        let url = Url::parse(raw).or_raise(|| ErrorKind::InvalidUrl(raw.to_string()))?;
        if url.scheme() != "https" {
            exn::bail!(ErrorKind::InvalidUrl(format!("scheme must be https (got {})", url.scheme())));
        }
        Self::build(url, timeout, user_agent.as_ref())
    }

    /// Construct without the scheme check, so tests can point the client at a
    /// plain-HTTP server on loopback.
    pub(crate) fn build(url: Url, timeout: Duration, user_agent: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .or_raise(|| ErrorKind::Transport)?;
        Ok(Self { url, http })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// The URL polled for a given cursor. A zero `limit` leaves the page size
    /// up to the server.
    pub fn poll_url(&self, since: &OffsetDateTime, limit: u32) -> Result<Url> {
        let mut url = self.url.clone();
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("since", &format_timestamp(since)?);
            if limit > 0 {
                query.append_pair("limit", &limit.to_string());
            }
        }
        Ok(url)
    }
}

#[async_trait]
impl FeedSource for FeedClient {
    fn name(&self) -> &str {
        self.url.as_str()
    }

    #[instrument(skip(self), fields(url = %self.url))]
    async fn fetch(&self, since: OffsetDateTime, limit: u32) -> Result<Vec<Record>> {
        let url = self.poll_url(&since, limit)?;
        let response = self
            .http
            .get(url)
            .send()
            .await
            .or_raise(|| ErrorKind::Transport)?
            .error_for_status()
            .or_raise(|| ErrorKind::Transport)?;
        let body = response.bytes().await.or_raise(|| ErrorKind::Transport)?;
        let records = decode_records(&body)?;
        tracing::debug!(count = records.len(), bytes = body.len(), "fetched records from feed");
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ZERO;
    use rstest::rstest;
    use time::macros::datetime;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const BODY: &str = concat!(
        r#"{"Path":"golang.org/x/text","Version":"v0.3.0","Timestamp":"2019-04-10T19:08:52.997264Z"}"#,
        "\n",
        r#"{"Path":"golang.org/x/net","Version":"v0.0.0-20190311183353-d8887717615a","Timestamp":"2019-04-10T19:08:53.111Z"}"#,
        "\n",
    );

    fn client() -> FeedClient {
        FeedClient::new("https://index.golang.org/index/", Duration::from_secs(5), "modindex-test").unwrap()
    }

    #[test]
    fn test_decode_stream() {
        let records = decode_records(BODY.as_bytes()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].path, "golang.org/x/text");
        assert_eq!(records[0].version, "v0.3.0");
        assert_eq!(records[0].timestamp, datetime!(2019-04-10 19:08:52.997264 UTC));
        assert_eq!(records[1].version, "v0.0.0-20190311183353-d8887717615a");
    }

    #[rstest]
    #[case("")]
    #[case("\n")]
    #[case("  \n\n ")]
    fn test_decode_empty_body(#[case] body: &str) {
        assert!(decode_records(body.as_bytes()).unwrap().is_empty());
    }

    #[test]
    fn test_decode_without_newlines() {
        let body = BODY.replace('\n', "");
        assert_eq!(decode_records(body.as_bytes()).unwrap().len(), 2);
    }

    #[rstest]
    #[case(r#"{"Path":"a","Version":"v1.0.0","Timestamp":"not a time"}"#)]
    #[case(r#"{"Path":"a","Version":"v1.0.0"}"#)]
    #[case(r#"[{"Path":"a","Version":"v1.0.0","Timestamp":"2019-04-10T19:08:52Z"}]"#)]
    #[case("<html>rate limited</html>")]
    fn test_decode_failure(#[case] body: &str) {
        let err = decode_records(body.as_bytes()).unwrap_err();
        assert_eq!(*err, ErrorKind::Decode);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_decode_failure_after_valid_records() {
        let body = format!("{BODY}{{\"Path\":");
        assert!(decode_records(body.as_bytes()).is_err());
    }

    #[test]
    fn test_url_trailing_slash_is_trimmed() {
        assert_eq!(client().url().as_str(), "https://index.golang.org/index");
    }

    #[rstest]
    #[case("http://index.golang.org/index")]
    #[case("ftp://index.golang.org/index")]
    #[case("not a url")]
    fn test_invalid_url(#[case] url: &str) {
        let err = FeedClient::new(url, Duration::from_secs(5), "modindex-test").unwrap_err();
        assert!(matches!(*err, ErrorKind::InvalidUrl(_)));
    }

    #[test]
    fn test_poll_url() {
        let url = client().poll_url(&datetime!(2019-04-10 19:08:52.997264 UTC), 2000).unwrap();
        assert_eq!(
            url.as_str(),
            "https://index.golang.org/index?since=2019-04-10T19%3A08%3A52.997264000Z&limit=2000"
        );
    }

    #[test]
    fn test_poll_url_without_limit() {
        let url = client().poll_url(&ZERO, 0).unwrap();
        assert_eq!(url.query(), Some("since=0001-01-01T00%3A00%3A00.000000000Z"));
    }

    fn local(server: &MockServer, timeout: Duration) -> FeedClient {
        let url = Url::parse(&format!("{}/index", server.uri())).unwrap();
        FeedClient::build(url, timeout, "modindex-test").unwrap()
    }

    #[tokio::test]
    async fn test_fetch_sends_cursor_and_decodes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/index"))
            .and(query_param("since", "2019-04-10T19:08:52.997264000Z"))
            .and(query_param("limit", "2000"))
            .and(header("user-agent", "modindex-test"))
            .respond_with(ResponseTemplate::new(200).set_body_string(BODY))
            .expect(1)
            .mount(&server)
            .await;

        let client = local(&server, Duration::from_secs(5));
        let records = client.fetch(datetime!(2019-04-10 19:08:52.997264 UTC), 2000).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].path, "golang.org/x/text");
        assert_eq!(records[1].path, "golang.org/x/net");
    }

    #[tokio::test]
    async fn test_fetch_empty_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        let records = local(&server, Duration::from_secs(5)).fetch(ZERO, 10).await.unwrap();
        assert!(records.is_empty());
    }

    #[rstest]
    #[case(500)]
    #[case(429)]
    #[case(404)]
    #[tokio::test]
    async fn test_fetch_error_status_is_transport(#[case] status: u16) {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(status).set_body_string(BODY))
            .mount(&server)
            .await;
        let err = local(&server, Duration::from_secs(5)).fetch(ZERO, 10).await.unwrap_err();
        assert_eq!(*err, ErrorKind::Transport);
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_fetch_malformed_body_is_decode() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>rate limited</html>"))
            .mount(&server)
            .await;
        let err = local(&server, Duration::from_secs(5)).fetch(ZERO, 10).await.unwrap_err();
        assert_eq!(*err, ErrorKind::Decode);
    }

    #[tokio::test]
    async fn test_fetch_timeout_is_transport() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(BODY).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;
        let err = local(&server, Duration::from_millis(100)).fetch(ZERO, 10).await.unwrap_err();
        assert_eq!(*err, ErrorKind::Transport);
    }

    #[tokio::test]
    async fn test_fetch_unreachable_is_transport() {
        let server = MockServer::start().await;
        let client = local(&server, Duration::from_secs(5));
        drop(server);
        let err = client.fetch(ZERO, 10).await.unwrap_err();
        assert_eq!(*err, ErrorKind::Transport);
    }
}
