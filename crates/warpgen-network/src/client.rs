//! HTTP Client for JSON APIs
//!
//! Uses hyper's HTTP/1.1 connection API on top of tokio.
//! Features:
//! - HTTPS with rustls and the webpki root store (memory-safe TLS)
//! - Plain HTTP for loopback and test endpoints
//! - JSON request headers, bearer credentials, exact `Content-Length`
//! - Connect timeout, whole-request timeout and a response size cap
//!
//! Every call opens a fresh connection; the registration flow makes two
//! requests per provisioning and pooling buys nothing there.

use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Bytes;
use hyper::header::{HeaderValue, AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE, HOST, USER_AGENT};
use hyper::{Method, Request, StatusCode};
use hyper_util::rt::TokioIo;
use rustls::ClientConfig;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::{debug, info, warn};
use url::{Host, Url};

/// HTTP client errors
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Request timeout")]
    Timeout,

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Body read error: {0}")]
    Body(String),

    #[error("Response body exceeds {0} bytes")]
    BodyTooLarge(usize),
}

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Whole-request timeout (connect, send, read body)
    pub timeout: Duration,
    /// TCP connect timeout
    pub connect_timeout: Duration,
    /// User-Agent string
    pub user_agent: String,
    /// Maximum response body size
    pub max_body_size: usize,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(5),
            user_agent: format!("warpgen/{}", env!("CARGO_PKG_VERSION")),
            max_body_size: 1024 * 1024, // 1 MB
        }
    }
}

/// Status and collected body of a response
#[derive(Debug)]
pub struct Response {
    pub status: StatusCode,
    pub body: Vec<u8>,
}

/// HTTP client speaking JSON to a single remote API
pub struct HttpClient {
    config: HttpClientConfig,
    tls: TlsConnector,
}

impl HttpClient {
    /// Create a new HTTP client
    pub fn new(config: HttpClientConfig) -> Self {
        let mut root_store = rustls::RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

        let tls_config = ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth();

        info!(
            "HTTP client initialized (timeout: {:?}, connect timeout: {:?})",
            config.timeout,
            config.connect_timeout
        );

        Self {
            config,
            tls: TlsConnector::from(Arc::new(tls_config)),
        }
    }

    /// Create with default configuration
    pub fn with_defaults() -> Self {
        Self::new(HttpClientConfig::default())
    }

    /// Perform an HTTP request
    ///
    /// `body` is sent verbatim with `Content-Type: application/json`;
    /// `bearer`, when present, becomes `Authorization: Bearer <token>`.
    pub async fn request(
        &self,
        method: Method,
        url: &str,
        body: Option<Vec<u8>>,
        bearer: Option<&str>,
    ) -> Result<Response, HttpError> {
        tokio::time::timeout(self.config.timeout, self.send(method, url, body, bearer))
            .await
            .map_err(|_| HttpError::Timeout)?
    }

    async fn send(
        &self,
        method: Method,
        url: &str,
        body: Option<Vec<u8>>,
        bearer: Option<&str>,
    ) -> Result<Response, HttpError> {
        let start = Instant::now();

        // 1. Parse URL
        let url = Url::parse(url).map_err(|e| HttpError::InvalidUrl(e.to_string()))?;
        let is_https = match url.scheme() {
            "https" => true,
            "http" => false,
            other => return Err(HttpError::InvalidUrl(format!("unsupported scheme: {}", other))),
        };
        let host = match url.host() {
            Some(Host::Domain(d)) => d.to_string(),
            Some(Host::Ipv4(ip)) => ip.to_string(),
            Some(Host::Ipv6(ip)) => ip.to_string(),
            None => return Err(HttpError::InvalidUrl("No host in URL".to_string())),
        };
        let port = url.port_or_known_default().unwrap_or(if is_https { 443 } else { 80 });

        // 2. Build request
        let host_header = match (url.host_str(), url.port()) {
            (Some(h), Some(p)) => format!("{}:{}", h, p),
            (Some(h), None) => h.to_string(),
            (None, _) => host.clone(),
        };
        let path = match url.query() {
            Some(q) => format!("{}?{}", url.path(), q),
            None => url.path().to_string(),
        };
        let body = body.unwrap_or_default();

        let mut builder = Request::builder()
            .method(method.clone())
            .uri(path.as_str())
            .header(HOST, host_header)
            .header(USER_AGENT, &self.config.user_agent)
            .header(CONTENT_TYPE, "application/json")
            .header(CONTENT_LENGTH, body.len());

        if let Some(token) = bearer {
            let value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| HttpError::Http(e.to_string()))?;
            builder = builder.header(AUTHORIZATION, value);
        }

        let request = builder
            .body(Full::new(Bytes::from(body)))
            .map_err(|e| HttpError::Http(e.to_string()))?;

        // 3. Connect
        let stream = tokio::time::timeout(
            self.config.connect_timeout,
            TcpStream::connect((host.as_str(), port)),
        )
        .await
        .map_err(|_| HttpError::ConnectionFailed(format!("connect to {}:{} timed out", host, port)))?
        .map_err(|e| HttpError::ConnectionFailed(e.to_string()))?;

        // 4. Send, wrapping in TLS for https
        let response = if is_https {
            let server_name = rustls::pki_types::ServerName::try_from(host.clone())
                .map_err(|_| HttpError::Tls("Invalid server name".to_string()))?;

            let tls_stream = self.tls.connect(server_name, stream).await
                .map_err(|e| HttpError::Tls(e.to_string()))?;

            exchange(tls_stream, request).await?
        } else {
            exchange(stream, request).await?
        };

        // 5. Read response
        let status = response.status();

        let collected = Limited::new(response.into_body(), self.config.max_body_size)
            .collect()
            .await
            .map_err(|e| {
                if e.downcast_ref::<LengthLimitError>().is_some() {
                    HttpError::BodyTooLarge(self.config.max_body_size)
                } else {
                    HttpError::Body(e.to_string())
                }
            })?;
        let body = collected.to_bytes().to_vec();

        debug!(
            "HTTP {} {} -> {} ({} bytes, {:?})",
            method, url, status, body.len(), start.elapsed()
        );

        Ok(Response { status, body })
    }
}

/// Run one HTTP/1.1 exchange over an established stream
async fn exchange<S>(
    io: S,
    request: Request<Full<Bytes>>,
) -> Result<hyper::Response<hyper::body::Incoming>, HttpError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(io)).await
        .map_err(|e| HttpError::Http(e.to_string()))?;

    tokio::spawn(async move {
        if let Err(e) = conn.await {
            warn!("Connection error: {}", e);
        }
    });

    sender.send_request(request).await
        .map_err(|e| HttpError::Http(e.to_string()))
}
