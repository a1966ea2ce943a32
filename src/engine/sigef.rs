//! SIGEF 상세 페이지 조회기
//!
//! `GET {base_url}{code}/`에 저장된 쿠키를 실어 보내고, 응답 HTML을
//! `ParcelDetailParser`로 레코드로 변환합니다.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use tracing::{debug, warn};
use url::Url;

use super::{FetchError, ParcelFetcher};
use crate::domain::ParcelRecord;
use crate::infrastructure::config::ConsultConfig;
use crate::infrastructure::cookies::CookieStore;
use crate::infrastructure::http_client::{HttpClient, HttpClientConfig, HttpError};
use crate::infrastructure::parsing::ParcelDetailParser;

/// The site answers expired sessions with a 200 page carrying this marker
const REJECTED_MARKER: &str = "Request Rejected";

pub struct SigefFetcher {
    base_url: Url,
    http: HttpClient,
    cookies: CookieStore,
    parser: ParcelDetailParser,
}

impl SigefFetcher {
    pub fn new(config: &ConsultConfig, cookies: CookieStore) -> Result<Self> {
        Self::with_http_config(config, HttpClientConfig::from_consult_config(config), cookies)
    }

    pub fn with_http_config(config: &ConsultConfig, http_config: HttpClientConfig, cookies: CookieStore) -> Result<Self> {
        let base_url =
            Url::parse(&config.base_url).with_context(|| format!("Invalid base_url: {}", config.base_url))?;
        if base_url.cannot_be_a_base() {
            return Err(anyhow!("base_url cannot carry a path: {}", config.base_url));
        }
        let parser = ParcelDetailParser::new(config.max_text_field_chars)?;

        Ok(Self {
            base_url,
            http: HttpClient::with_config(http_config)?,
            cookies,
            parser,
        })
    }

    /// `{base_url}{code}/` with the code percent-encoded as one path segment
    pub fn detail_url(&self, parcel_code: &str) -> Result<Url, FetchError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| FetchError::Http(format!("base url cannot carry a path: {}", self.base_url)))?
            .pop_if_empty()
            .push(parcel_code)
            .push("");
        Ok(url)
    }
}

#[async_trait]
impl ParcelFetcher for SigefFetcher {
    async fn fetch(&self, parcel_code: &str) -> Result<ParcelRecord, FetchError> {
        let cookie_header = self
            .cookies
            .cookie_header()
            .await
            .map_err(|e| FetchError::CredentialsMissing(e.to_string()))?;

        let url = self.detail_url(parcel_code)?;
        let page = self
            .http
            .get_html(url.as_str(), Some(&cookie_header))
            .await
            .map_err(|e| match e {
                HttpError::Send(e) => FetchError::Http(e.to_string()),
                HttpError::Body(e) => FetchError::Body(e.to_string()),
            })?;

        if !page.is_success() {
            warn!("❌ {} answered {} for {}", url, page.status, parcel_code);
            return Err(FetchError::NotFound { status: page.status });
        }
        if page.body.contains(REJECTED_MARKER) {
            warn!("🍪 session rejected while fetching {}", parcel_code);
            return Err(FetchError::CredentialsExpired);
        }

        let record = self
            .parser
            .parse(parcel_code, &page.body)
            .map_err(|e| FetchError::Parse(e.to_string()))?;
        debug!("✅ parsed parcel {}", parcel_code);
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{tempdir, TempDir};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;

    const COOKIES: &str = r#"{"cookies":[{"name":"sessionid","value":"abc"}]}"#;
    const PAGE: &str = "<table><tr><th>Natureza</th><td>Particular</td></tr>\
                        <tr><th>Nome</th><td>Ana</td><td>111.222.333-44</td></tr></table>";

    /// Serve one canned HTTP response and hand back the raw request
    async fn serve_once(status_line: &'static str, body: &'static str) -> (String, oneshot::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
                if request.windows(4).any(|w| w == b"\r\n\r\n") {
                    break;
                }
            }
            let response = format!(
                "HTTP/1.1 {status_line}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;
            let _ = tx.send(String::from_utf8_lossy(&request).into_owned());
        });

        (format!("http://{addr}/geo/parcela/detalhe/"), rx)
    }

    async fn fetcher(base_url: &str, with_cookies: bool) -> (SigefFetcher, TempDir) {
        let dir = tempdir().unwrap();
        let store = CookieStore::in_dir(dir.path());
        if with_cookies {
            store.save_text(COOKIES).await.unwrap();
        }
        let config = ConsultConfig {
            base_url: base_url.to_string(),
            ..ConsultConfig::default()
        };
        let http_config = HttpClientConfig {
            use_system_proxy: false,
            ..HttpClientConfig::from_consult_config(&config)
        };
        (SigefFetcher::with_http_config(&config, http_config, store).unwrap(), dir)
    }

    #[tokio::test]
    async fn fetch_sends_cookies_and_parses_page() {
        let (base, request_rx) = serve_once("200 OK", PAGE).await;
        let (fetcher, _dir) = fetcher(&base, true).await;

        let record = fetcher.fetch("abc-1").await.unwrap();

        assert_eq!(record.parcel_code, "abc-1");
        assert_eq!(record.property_type, "Particular");
        assert_eq!(record.owner_cpf_or_cnpj, "111.222.333-44");
        let request = request_rx.await.unwrap().to_lowercase();
        assert!(request.starts_with("get /geo/parcela/detalhe/abc-1/ http/1.1"));
        assert!(request.contains("cookie: sessionid=abc"));
    }

    #[tokio::test]
    async fn non_success_status_is_not_found() {
        let (base, _rx) = serve_once("404 Not Found", "missing").await;
        let (fetcher, _dir) = fetcher(&base, true).await;

        let err = fetcher.fetch("zzz").await.unwrap_err();
        assert!(matches!(err, FetchError::NotFound { status: 404 }));
        assert_eq!(err.to_string(), "Parcel code not found!: 404");
    }

    #[tokio::test]
    async fn rejected_page_means_expired_cookies() {
        let (base, _rx) = serve_once("200 OK", "<html><title>Request Rejected</title></html>").await;
        let (fetcher, _dir) = fetcher(&base, true).await;

        assert!(matches!(fetcher.fetch("abc").await, Err(FetchError::CredentialsExpired)));
    }

    #[tokio::test]
    async fn missing_cookie_file_fails_before_any_request() {
        let (fetcher, _dir) = fetcher("http://127.0.0.1:9/detalhe/", false).await;
        assert!(matches!(fetcher.fetch("abc").await, Err(FetchError::CredentialsMissing(_))));
    }

    #[tokio::test]
    async fn detail_url_appends_code_and_trailing_slash() {
        let (fetcher, _dir) = fetcher("https://sigef.incra.gov.br/geo/parcela/detalhe/", false).await;
        assert_eq!(
            fetcher.detail_url("a b").unwrap().as_str(),
            "https://sigef.incra.gov.br/geo/parcela/detalhe/a%20b/"
        );
    }
}
