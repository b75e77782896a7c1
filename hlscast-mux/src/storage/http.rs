// HTTP origin sink
//
// Each resource is sent as an idempotent PUT. Two URL layouts are supported:
// - `https://origin/live/` + name
// - `https://origin/upload.php?file=` + url-encoded name (query-style upload endpoints)

use super::{content_type, validate_name, HlsSink};
use async_trait::async_trait;
use bytes::Bytes;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use std::io::{Error, ErrorKind, Result};
use std::time::Duration;

/// Characters left alone when a name goes into a query value.
const QUERY_VALUE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'.')
    .remove(b'-')
    .remove(b'_')
    .remove(b'*');

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

pub struct HttpSink {
    client: reqwest::Client,
    base_url: String,
}

impl HttpSink {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let base_url = base_url.into();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                format!("output url must be http or https: {base_url}"),
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(Error::other)?;
        Ok(Self { client, base_url })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Full URL for a resource name.
    #[must_use]
    pub fn url_for(&self, name: &str) -> String {
        if self.base_url.ends_with("file=") {
            format!("{}{}", self.base_url, utf8_percent_encode(name, QUERY_VALUE))
        } else if self.base_url.ends_with('/') {
            format!("{}{name}", self.base_url)
        } else {
            format!("{}/{name}", self.base_url)
        }
    }
}

/// Map a transport failure onto an io kind the retry policy understands.
fn map_reqwest_error(err: reqwest::Error) -> Error {
    let kind = if err.is_timeout() {
        ErrorKind::TimedOut
    } else if err.is_connect() {
        ErrorKind::ConnectionRefused
    } else {
        ErrorKind::Other
    };
    Error::new(kind, err)
}

#[async_trait]
impl HlsSink for HttpSink {
    fn label(&self) -> &str {
        &self.base_url
    }

    async fn put(&self, name: &str, data: Bytes) -> Result<()> {
        validate_name(name)?;
        let url = self.url_for(name);
        let size = data.len();

        let response = self
            .client
            .put(&url)
            .header(reqwest::header::CONTENT_TYPE, content_type(name))
            .body(data)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        tracing::debug!(name, size, status = status.as_u16(), "PUT");
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::other(format!(
                "PUT {name} rejected with {status}: {}",
                body.trim()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_bytes, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_url_for_path_layout() {
        let sink = HttpSink::new("https://origin.example/live").unwrap();
        assert_eq!(sink.url_for("seg_00001.ts"), "https://origin.example/live/seg_00001.ts");

        let sink = HttpSink::new("https://origin.example/live/").unwrap();
        assert_eq!(sink.url_for("live.m3u8"), "https://origin.example/live/live.m3u8");
    }

    #[test]
    fn test_url_for_query_layout() {
        let sink = HttpSink::new("http://origin.example/upload.php?file=").unwrap();
        assert_eq!(
            sink.url_for("seg_00001.ts"),
            "http://origin.example/upload.php?file=seg_00001.ts"
        );
        assert_eq!(
            sink.url_for("a b+c.ts"),
            "http://origin.example/upload.php?file=a%20b%2Bc.ts"
        );
    }

    #[test]
    fn test_rejects_non_http_url() {
        let err = HttpSink::new("ftp://origin.example/").err().unwrap();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn test_put_segment() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/live/seg_00000.ts"))
            .and(header("content-type", "application/octet-stream"))
            .and(body_bytes(b"tsdata".to_vec()))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let sink = HttpSink::new(format!("{}/live", server.uri())).unwrap();
        sink.put("seg_00000.ts", Bytes::from_static(b"tsdata"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_put_playlist_query_style() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/upload.php"))
            .and(query_param("file", "live.m3u8"))
            .and(header("content-type", "application/vnd.apple.mpegurl"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let sink = HttpSink::new(format!("{}/upload.php?file=", server.uri())).unwrap();
        sink.put("live.m3u8", Bytes::from_static(b"#EXTM3U\n"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_put_rejected_status() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
            .mount(&server)
            .await;

        let sink = HttpSink::new(server.uri()).unwrap();
        let err = sink
            .put("seg_00000.ts", Bytes::from_static(b"x"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Other);
        assert!(err.to_string().contains("403"));
    }

    #[tokio::test]
    async fn test_put_timeout_is_timed_out() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;

        let sink = HttpSink::with_timeout(server.uri(), Duration::from_millis(50)).unwrap();
        let err = sink
            .put("seg_00000.ts", Bytes::from_static(b"x"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TimedOut);
    }
}
