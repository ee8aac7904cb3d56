//! Registration API client
//!
//! Wire types for the device registration service and the `WarpApi`
//! seam the provisioner talks through. `WarpClient` is the HTTP
//! implementation; tests substitute their own.
//!
//! Response types mirror the upstream JSON with every field optional so
//! that absence is reported by the validator rather than by serde.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;
use warpgen_network::{HttpClient, HttpClientConfig, HttpError, Method, StatusCode};
use warpgen_tunnel::PublicKey;

/// Registration service base URL, including the versioned path prefix
pub const DEFAULT_API_BASE: &str = "https://api.cloudflareclient.com/v0i1909051800";

/// Registration API errors
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Transport(#[from] HttpError),

    #[error("{message}")]
    Rejected { status: u16, message: String },

    #[error("unreadable response body: {0}")]
    Parse(String),

    #[error("failed to encode request: {0}")]
    Encode(String),
}

/// Client platform reported at registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    #[default]
    Ios,
    Windows,
}

impl DeviceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceType::Ios => "ios",
            DeviceType::Windows => "windows",
        }
    }
}

/// Upstream API settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL including the versioned prefix
    pub base_url: String,
    /// Per-call timeout (seconds)
    pub timeout_secs: u64,
    /// Per-call connect timeout (seconds)
    pub connect_timeout_secs: u64,
    pub user_agent: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE.to_string(),
            timeout_secs: 10,
            connect_timeout_secs: 5,
            user_agent: None,
        }
    }
}

impl ApiConfig {
    /// HTTP client settings derived from this config
    pub fn http_config(&self) -> HttpClientConfig {
        let defaults = HttpClientConfig::default();
        HttpClientConfig {
            timeout: Duration::from_secs(self.timeout_secs),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            user_agent: self.user_agent.clone().unwrap_or(defaults.user_agent),
            max_body_size: defaults.max_body_size,
        }
    }
}

/// Body of `POST <prefix>/reg`
///
/// Field order is the order the service documents.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegistrationRequest {
    pub install_id: String,
    /// Terms-of-service acceptance time (RFC 3339, milliseconds, `Z`)
    pub tos: String,
    /// Client public key (base64)
    pub key: String,
    pub fcm_token: String,
    #[serde(rename = "type")]
    pub device_type: DeviceType,
    pub locale: String,
}

impl RegistrationRequest {
    /// Request with a fresh install id, accepted now
    pub fn new(public_key: &PublicKey, device_type: DeviceType, locale: &str) -> Self {
        Self::with_identity(public_key, Uuid::new_v4(), Utc::now(), device_type, locale)
    }

    pub fn with_identity(
        public_key: &PublicKey,
        install_id: Uuid,
        accepted_at: DateTime<Utc>,
        device_type: DeviceType,
        locale: &str,
    ) -> Self {
        Self {
            install_id: install_id.to_string(),
            tos: accepted_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            key: public_key.to_base64(),
            fcm_token: String::new(),
            device_type,
            locale: locale.to_string(),
        }
    }
}

/// Body of `PATCH <prefix>/reg/<id>`
#[derive(Debug, Clone, Copy, Serialize)]
struct ActivationRequest {
    warp_enabled: bool,
}

/// `{result: {id, token}}`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegistrationResponse {
    pub result: Option<RegisteredDevice>,
}

#[derive(Clone, Default, Deserialize)]
pub struct RegisteredDevice {
    pub id: Option<String>,
    pub token: Option<String>,
}

impl std::fmt::Debug for RegisteredDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredDevice")
            .field("id", &self.id)
            .field("token", &self.token.as_ref().map(|_| "[redacted]"))
            .finish()
    }
}

/// `{result: {config: {peers, interface}}}`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ActivationResponse {
    pub result: Option<ActivatedDevice>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ActivatedDevice {
    pub config: Option<DeviceConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeviceConfig {
    pub peers: Option<Vec<RawPeer>>,
    pub interface: Option<RawInterface>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawInterface {
    pub addresses: Option<RawAddresses>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawAddresses {
    pub v4: Option<String>,
    pub v6: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawPeer {
    pub public_key: Option<String>,
    pub endpoint: Option<RawEndpoint>,
    pub allowed_ips: Option<RawAllowedIps>,
}

/// Peer endpoint as sent upstream: `"host:port"` or `{host, port}`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum RawEndpoint {
    Address(String),
    Structured {
        host: Option<String>,
        port: Option<RawPort>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum RawPort {
    Number(u64),
    Text(String),
}

/// Peer AllowedIPs as sent upstream: a list, or one range per family
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum RawAllowedIps {
    List(Vec<String>),
    Families {
        v4: Option<String>,
        v6: Option<String>,
    },
}

/// The two calls of the registration service
#[async_trait]
pub trait WarpApi: Send + Sync {
    /// Create a device record
    async fn register(&self, request: &RegistrationRequest) -> Result<RegistrationResponse, ApiError>;

    /// Enable WARP on a registered device, returning its network config
    async fn activate(&self, device_id: &str, token: &str) -> Result<ActivationResponse, ApiError>;
}

/// `WarpApi` over HTTPS
pub struct WarpClient {
    http: HttpClient,
    base_url: String,
}

impl WarpClient {
    pub fn new(http: HttpClient, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(config: &ApiConfig) -> Self {
        Self::new(HttpClient::new(config.http_config()), &config.base_url)
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Vec<u8>,
        token: Option<&str>,
    ) -> Result<T, ApiError> {
        let url = format!("{}/{}", self.base_url, path);
        let response = self.http.request(method.clone(), &url, Some(body), token).await?;

        // Bodies carry device tokens; log only their size
        debug!(
            "Response from API ({} {}): {} ({} bytes)",
            method, path, response.status, response.body.len()
        );

        if response.status != StatusCode::OK {
            return Err(ApiError::Rejected {
                status: response.status.as_u16(),
                message: rejection_message(response.status, &response.body),
            });
        }

        serde_json::from_slice(&response.body).map_err(|e| ApiError::Parse(e.to_string()))
    }
}

#[async_trait]
impl WarpApi for WarpClient {
    async fn register(&self, request: &RegistrationRequest) -> Result<RegistrationResponse, ApiError> {
        let body = serde_json::to_vec(request).map_err(|e| ApiError::Encode(e.to_string()))?;
        self.call(Method::POST, "reg", body, None).await
    }

    async fn activate(&self, device_id: &str, token: &str) -> Result<ActivationResponse, ApiError> {
        let body = serde_json::to_vec(&ActivationRequest { warp_enabled: true })
            .map_err(|e| ApiError::Encode(e.to_string()))?;
        self.call(Method::PATCH, &format!("reg/{}", device_id), body, Some(token)).await
    }
}

/// Error text from an upstream rejection body, else the status code
fn rejection_message(status: StatusCode, body: &[u8]) -> String {
    #[derive(Deserialize)]
    struct ErrorBody {
        message: Option<String>,
        errors: Option<Vec<ErrorItem>>,
    }

    #[derive(Deserialize)]
    struct ErrorItem {
        message: Option<String>,
    }

    serde_json::from_slice::<ErrorBody>(body)
        .ok()
        .and_then(|b| {
            b.message
                .filter(|m| !m.is_empty())
                .or_else(|| b.errors?.into_iter().find_map(|e| e.message))
        })
        .unwrap_or_else(|| format!("HTTP {}", status.as_u16()))
}
