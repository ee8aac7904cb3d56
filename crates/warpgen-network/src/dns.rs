//! Async DNS Resolver with Caching
//!
//! Provides DNS resolution with:
//! - System or Cloudflare upstreams
//! - A-record only lookups for endpoint discovery
//! - Caching to reduce latency

use async_trait::async_trait;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::TokioAsyncResolver;
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info};

/// DNS resolution errors
#[derive(Debug, Error)]
pub enum DnsError {
    #[error("Resolution failed: {0}")]
    ResolutionFailed(String),

    #[error("No addresses found for domain")]
    NoAddresses,

    #[error("Resolver error: {0}")]
    ResolverError(String),

    #[error("Lookup timed out")]
    Timeout,
}

/// Anything that can turn a hostname into IPv4 addresses
#[async_trait]
pub trait HostResolver: Send + Sync {
    async fn resolve_ipv4(&self, hostname: &str) -> Result<Vec<Ipv4Addr>, DnsError>;
}

/// DNS resolver configuration
#[derive(Debug, Clone)]
pub struct DnsConfig {
    /// Cache TTL for successful lookups
    pub cache_ttl: Duration,
    /// Maximum cache size
    pub max_cache_entries: usize,
    /// Whether to use system DNS or Cloudflare
    pub use_system_dns: bool,
    /// Timeout for DNS queries
    pub timeout: Duration,
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(60),
            max_cache_entries: 256,
            use_system_dns: true,
            timeout: Duration::from_secs(3),
        }
    }
}

/// Cached DNS entry
#[derive(Clone)]
struct CacheEntry {
    addresses: Vec<IpAddr>,
    expires_at: Instant,
}

/// Async DNS resolver with caching
pub struct DnsResolver {
    resolver: TokioAsyncResolver,
    cache: Arc<RwLock<HashMap<String, CacheEntry>>>,
    config: DnsConfig,
}

impl DnsResolver {
    /// Create a new DNS resolver
    pub fn new(config: DnsConfig) -> Result<Self, DnsError> {
        let resolver = if config.use_system_dns {
            TokioAsyncResolver::tokio_from_system_conf()
                .map_err(|e| DnsError::ResolverError(e.to_string()))?
        } else {
            let mut opts = ResolverOpts::default();
            opts.timeout = config.timeout;
            TokioAsyncResolver::tokio(ResolverConfig::cloudflare(), opts)
        };

        info!("DNS resolver initialized (system: {})", config.use_system_dns);

        Ok(Self {
            resolver,
            cache: Arc::new(RwLock::new(HashMap::new())),
            config,
        })
    }

    /// Create with default configuration
    pub fn with_defaults() -> Result<Self, DnsError> {
        Self::new(DnsConfig::default())
    }

    /// Resolve a domain to IP addresses
    pub async fn resolve(&self, domain: &str) -> Result<Vec<IpAddr>, DnsError> {
        let normalized = domain.trim_end_matches('.').to_lowercase();

        if let Some(cached) = self.get_cached(&normalized) {
            debug!("DNS cache hit for: {}", domain);
            return Ok(cached);
        }

        debug!("DNS lookup for: {}", domain);
        let lookup = tokio::time::timeout(self.config.timeout, self.resolver.lookup_ip(normalized.as_str()))
            .await
            .map_err(|_| DnsError::Timeout)?
            .map_err(|e| DnsError::ResolutionFailed(e.to_string()))?;

        let addresses: Vec<IpAddr> = lookup.iter().collect();

        if addresses.is_empty() {
            return Err(DnsError::NoAddresses);
        }

        self.cache_addresses(&normalized, &addresses);

        Ok(addresses)
    }

    /// Get cache statistics: (total, still valid)
    pub fn cache_stats(&self) -> (usize, usize) {
        let Ok(cache) = self.cache.read() else {
            return (0, 0);
        };
        let now = Instant::now();
        let valid = cache.values().filter(|e| e.expires_at > now).count();
        (cache.len(), valid)
    }

    fn get_cached(&self, domain: &str) -> Option<Vec<IpAddr>> {
        let cache = self.cache.read().ok()?;

        cache.get(domain)
            .filter(|entry| entry.expires_at > Instant::now())
            .map(|entry| entry.addresses.clone())
    }

    fn cache_addresses(&self, domain: &str, addresses: &[IpAddr]) {
        let Ok(mut cache) = self.cache.write() else {
            return;
        };

        // Evict expired entries if cache is full
        if cache.len() >= self.config.max_cache_entries {
            let now = Instant::now();
            cache.retain(|_, v| v.expires_at > now);

            if cache.len() >= self.config.max_cache_entries {
                cache.clear();
            }
        }

        cache.insert(domain.to_string(), CacheEntry {
            addresses: addresses.to_vec(),
            expires_at: Instant::now() + self.config.cache_ttl,
        });
    }
}

#[async_trait]
impl HostResolver for DnsResolver {
    async fn resolve_ipv4(&self, hostname: &str) -> Result<Vec<Ipv4Addr>, DnsError> {
        let v4: Vec<Ipv4Addr> = self.resolve(hostname).await?
            .into_iter()
            .filter_map(|ip| match ip {
                IpAddr::V4(v4) => Some(v4),
                IpAddr::V6(_) => None,
            })
            .collect();

        if v4.is_empty() {
            return Err(DnsError::NoAddresses);
        }
        Ok(v4)
    }
}
