use nbpipe_core::{Error, FetchBackend, FetchRequest, FetchResponse, Result};
use std::collections::BTreeMap;
use std::time::Duration;

pub mod chunk;
pub mod deliver;
pub mod dom;
pub mod extractor;
pub mod filename;
pub mod render;
pub mod resolve;
pub mod rewrite;
pub mod template;
pub mod tokens;

pub use extractor::Extractor;
pub use resolve::{FileFetchConfig, PageContext, Resolver};

#[derive(Debug, Clone)]
pub struct LocalFetcher {
    client: reqwest::Client,
}

impl LocalFetcher {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("nbpipe-local/0.1")
            .redirect(reqwest::redirect::Policy::limited(10))
            // Avoid hanging on DNS/TLS/body stalls; FetchRequest.timeout_ms can still override.
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::Fetch(e.to_string()))?;
        Ok(Self { client })
    }

    fn allow_unsafe_request_headers() -> bool {
        matches!(
            std::env::var("NBPIPE_ALLOW_UNSAFE_HEADERS")
                .unwrap_or_default()
                .trim()
                .to_ascii_lowercase()
                .as_str(),
            "1" | "true" | "yes" | "on"
        )
    }

    fn is_sensitive_request_header(name: &reqwest::header::HeaderName) -> bool {
        // HeaderName::as_str() is canonical lower-case.
        matches!(
            name.as_str(),
            "authorization" | "cookie" | "proxy-authorization"
        )
    }

    fn apply_headers(
        &self,
        mut rb: reqwest::RequestBuilder,
        headers: &BTreeMap<String, String>,
    ) -> reqwest::RequestBuilder {
        let allow_unsafe = Self::allow_unsafe_request_headers();
        for (k, v) in headers {
            if let (Ok(name), Ok(value)) = (
                reqwest::header::HeaderName::from_bytes(k.as_bytes()),
                reqwest::header::HeaderValue::from_str(v),
            ) {
                if !allow_unsafe && Self::is_sensitive_request_header(&name) {
                    tracing::debug!(header = name.as_str(), "dropping sensitive request header");
                    continue;
                }
                rb = rb.header(name, value);
            }
        }
        rb
    }
}

#[async_trait::async_trait]
impl FetchBackend for LocalFetcher {
    async fn fetch(&self, req: &FetchRequest) -> Result<FetchResponse> {
        let url = url::Url::parse(&req.url).map_err(|e| Error::InvalidUrl(e.to_string()))?;

        let mut rb = self.client.get(url);
        if let Some(to) = req.timeout() {
            rb = rb.timeout(to);
        }
        rb = self.apply_headers(rb, &req.headers);
        let resp = rb.send().await.map_err(|e| Error::Fetch(e.to_string()))?;
        let final_url = resp.url().to_string();
        let status = resp.status().as_u16();
        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let max_bytes = req.max_bytes.unwrap_or(u64::MAX) as usize;
        let mut truncated = false;
        let mut bytes = Vec::new();
        let mut stream = resp.bytes_stream();
        use futures_util::StreamExt;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| Error::Fetch(e.to_string()))?;
            if bytes.len().saturating_add(chunk.len()) > max_bytes {
                let can_take = max_bytes.saturating_sub(bytes.len());
                bytes.extend_from_slice(&chunk[..can_take]);
                truncated = true;
                break;
            }
            bytes.extend_from_slice(&chunk);
        }
        tracing::debug!(url = %req.url, status, bytes = bytes.len(), truncated, "fetched");

        Ok(FetchResponse {
            url: req.url.clone(),
            final_url,
            status,
            content_type,
            bytes,
            truncated,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::header, http::StatusCode, routing::get, Router};
    use std::net::SocketAddr;
    use std::sync::Mutex;

    // Env vars are process-global; serialize tests that mutate them.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    async fn serve(app: Router) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr: SocketAddr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    #[tokio::test]
    async fn local_fetcher_caps_body_at_max_bytes() {
        let app = Router::new().route(
            "/big",
            get(|| async { ([(header::CONTENT_TYPE, "text/plain")], "x".repeat(10_000)) }),
        );
        let addr = serve(app).await;
        let fetcher = LocalFetcher::new().unwrap();
        let req = FetchRequest {
            max_bytes: Some(100),
            timeout_ms: Some(2_000),
            ..FetchRequest::get(format!("http://{addr}/big"))
        };
        let resp = fetcher.fetch(&req).await.unwrap();
        assert!(resp.is_success());
        assert_eq!(resp.bytes.len(), 100);
        assert!(resp.truncated);
        assert_eq!(resp.content_type.as_deref(), Some("text/plain"));
    }

    #[tokio::test]
    async fn local_fetcher_reports_non_success_status() {
        let app = Router::new().route("/gone", get(|| async { (StatusCode::NOT_FOUND, "nope") }));
        let addr = serve(app).await;
        let fetcher = LocalFetcher::new().unwrap();
        let resp = fetcher
            .fetch(&FetchRequest::get(format!("http://{addr}/gone")))
            .await
            .unwrap();
        assert_eq!(resp.status, 404);
        assert!(!resp.is_success());
    }

    #[tokio::test]
    async fn local_fetcher_rejects_invalid_url() {
        let fetcher = LocalFetcher::new().unwrap();
        let err = fetcher
            .fetch(&FetchRequest::get("not a url"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidUrl(_)));
    }

    #[tokio::test]
    #[allow(clippy::await_holding_lock)]
    async fn local_fetcher_drops_sensitive_request_headers_by_default() {
        let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        std::env::remove_var("NBPIPE_ALLOW_UNSAFE_HEADERS");

        let app = Router::new().route(
            "/",
            get(|headers: axum::http::HeaderMap| async move {
                if headers.contains_key(header::AUTHORIZATION) || headers.contains_key(header::COOKIE)
                {
                    return (StatusCode::BAD_REQUEST, "sensitive header forwarded".to_string());
                }
                let accept_lang = headers
                    .get(header::ACCEPT_LANGUAGE)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("");
                (StatusCode::OK, format!("ok accept-language={accept_lang}"))
            }),
        );
        let addr = serve(app).await;
        let fetcher = LocalFetcher::new().unwrap();

        let mut req = FetchRequest::get(format!("http://{addr}/"));
        req.headers
            .insert("Authorization".to_string(), "token secret".to_string());
        req.headers
            .insert("Cookie".to_string(), "_xsrf=secret".to_string());
        req.headers
            .insert("Accept-Language".to_string(), "en-US".to_string());

        let resp = fetcher.fetch(&req).await.unwrap();
        assert_eq!(resp.status, 200, "body={}", resp.text_lossy());
        assert!(resp.text_lossy().contains("ok accept-language=en-US"));
    }

    #[tokio::test]
    #[allow(clippy::await_holding_lock)]
    async fn local_fetcher_forwards_sensitive_headers_when_explicitly_allowed() {
        let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        std::env::set_var("NBPIPE_ALLOW_UNSAFE_HEADERS", "true");

        let app = Router::new().route(
            "/",
            get(|headers: axum::http::HeaderMap| async move {
                let auth = headers
                    .get(header::AUTHORIZATION)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("")
                    .to_string();
                if auth.is_empty() {
                    return (StatusCode::BAD_REQUEST, "missing authorization".to_string());
                }
                (StatusCode::OK, format!("auth={auth}"))
            }),
        );
        let addr = serve(app).await;
        let fetcher = LocalFetcher::new().unwrap();
        let mut req = FetchRequest::get(format!("http://{addr}/"));
        req.headers
            .insert("authorization".to_string(), "token ok".to_string());

        let resp = fetcher.fetch(&req).await.unwrap();
        assert_eq!(resp.status, 200);
        assert!(resp.text_lossy().contains("auth=token ok"));

        std::env::remove_var("NBPIPE_ALLOW_UNSAFE_HEADERS");
    }
}
