//! Server settings
//!
//! Read from an optional TOML file named by `WARPGEN_CONFIG`. Every
//! table is optional and falls back to the built-in defaults;
//! `WARPGEN_BIND` overrides the listen address.
//!
//! ```toml
//! bind_address = "127.0.0.1:8080"
//!
//! [provision]
//! device_type = "windows"
//!
//! [endpoint]
//! mode = "discover"
//!
//! [endpoint.discovery]
//! cache_ttl_secs = 900
//!
//! [allowed_ips]
//! mode = "from_response"
//! ```

use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use warpgen_network::{DnsConfig, DnsError, DnsResolver};
use warpgen_registration::{
    AllowedIpsPolicy, ApiConfig, DiscoveryConfig, EndpointDiscovery, EndpointMode, EndpointSource,
    ProvisionConfig, Provisioner, WarpClient,
};

pub const CONFIG_ENV: &str = "WARPGEN_CONFIG";
pub const BIND_ENV: &str = "WARPGEN_BIND";

/// Settings errors
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Failed to read {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("Invalid settings: {0}")]
    Parse(String),

    #[error("DNS resolver setup failed: {0}")]
    Resolver(#[from] DnsError),
}

/// Endpoint strategy and discovery parameters
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EndpointSettings {
    pub mode: EndpointMode,
    pub discovery: DiscoveryConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub bind_address: String,
    pub api: ApiConfig,
    pub provision: ProvisionConfig,
    pub endpoint: EndpointSettings,
    pub allowed_ips: AllowedIpsPolicy,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3000".to_string(),
            api: ApiConfig::default(),
            provision: ProvisionConfig::default(),
            endpoint: EndpointSettings::default(),
            allowed_ips: AllowedIpsPolicy::default(),
        }
    }
}

impl Settings {
    /// Settings from the environment
    pub fn load() -> Result<Self, SettingsError> {
        let path = std::env::var(CONFIG_ENV).ok();
        let bind = std::env::var(BIND_ENV).ok();
        Self::load_from(path.as_deref().map(Path::new), bind)
    }

    /// Settings from an optional file, then the bind override
    pub fn load_from(path: Option<&Path>, bind: Option<String>) -> Result<Self, SettingsError> {
        let mut settings = match path {
            Some(path) => Self::from_toml_file(path)?,
            None => Self::default(),
        };

        if let Some(bind) = bind.filter(|b| !b.is_empty()) {
            settings.bind_address = bind;
        }

        Ok(settings)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self, SettingsError> {
        let content = std::fs::read_to_string(path).map_err(|e| SettingsError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, SettingsError> {
        toml::from_str(content).map_err(|e| SettingsError::Parse(e.to_string()))
    }

    /// Wire up the provisioner these settings describe
    pub fn provisioner(&self) -> Result<Provisioner, SettingsError> {
        let api = Arc::new(WarpClient::from_config(&self.api));

        let endpoints = match self.endpoint.mode {
            EndpointMode::Peer => EndpointSource::FromPeer,
            EndpointMode::Discover => {
                let resolver = Arc::new(DnsResolver::new(DnsConfig::default())?);
                EndpointSource::Discover(EndpointDiscovery::new(self.endpoint.discovery.clone(), resolver))
            }
        };

        Ok(Provisioner::new(
            api,
            endpoints,
            self.allowed_ips.clone(),
            self.provision.clone(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use warpgen_registration::DeviceType;

    #[test]
    fn test_empty_file_is_default() {
        assert_eq!(Settings::from_toml("").unwrap(), Settings::default());
    }

    #[test]
    fn test_partial_tables() {
        let settings = Settings::from_toml(
            r#"
            bind_address = "127.0.0.1:8080"

            [provision]
            device_type = "windows"

            [endpoint]
            mode = "discover"

            [endpoint.discovery]
            cache_ttl_secs = 900
            fallback = "162.159.193.10"

            [allowed_ips]
            mode = "from_response"
            "#,
        )
        .unwrap();

        assert_eq!(settings.bind_address, "127.0.0.1:8080");
        assert_eq!(settings.provision.device_type, DeviceType::Windows);
        assert_eq!(settings.provision.locale, "en_US");
        assert_eq!(settings.endpoint.mode, EndpointMode::Discover);
        assert_eq!(settings.endpoint.discovery.cache_ttl_secs, 900);
        assert_eq!(settings.endpoint.discovery.fallback, Ipv4Addr::new(162, 159, 193, 10));
        assert_eq!(settings.endpoint.discovery.port, 2408);
        assert_eq!(settings.allowed_ips, AllowedIpsPolicy::FromResponse);
        assert_eq!(settings.api, ApiConfig::default());
    }

    #[test]
    fn test_fixed_ranges() {
        let settings = Settings::from_toml(
            r#"
            [allowed_ips]
            mode = "fixed"
            ranges = ["0.0.0.0/0", "::/0"]
            "#,
        )
        .unwrap();

        match settings.allowed_ips {
            AllowedIpsPolicy::Fixed { ranges } => assert_eq!(ranges.len(), 2),
            other => panic!("unexpected policy {:?}", other),
        }
    }

    #[test]
    fn test_rejects_bad_values() {
        let err = Settings::from_toml("[provision]\ndevice_type = \"android\"").unwrap_err();
        assert!(matches!(err, SettingsError::Parse(_)));

        let err = Settings::from_toml("[allowed_ips]\nmode = \"fixed\"\nranges = [\"10.0.0.0/40\"]").unwrap_err();
        assert!(matches!(err, SettingsError::Parse(_)));
    }

    #[test]
    fn test_bind_override() {
        let settings = Settings::load_from(None, Some("127.0.0.1:9000".into())).unwrap();
        assert_eq!(settings.bind_address, "127.0.0.1:9000");

        let settings = Settings::load_from(None, Some(String::new())).unwrap();
        assert_eq!(settings.bind_address, "0.0.0.0:3000");
    }

    #[test]
    fn test_missing_file() {
        let err = Settings::load_from(Some(Path::new("/nonexistent/warpgen.toml")), None).unwrap_err();
        assert!(matches!(err, SettingsError::Io { .. }));
    }

    #[tokio::test]
    async fn test_builds_provisioner() {
        let settings = Settings::default();
        let provisioner = settings.provisioner().unwrap();
        assert_eq!(provisioner.config().deadline_secs, 15);
    }
}
