//! Endpoint resolution
//!
//! The peer endpoint either comes verbatim from the activation response
//! or is discovered independently: resolve a fixed hostname, optionally
//! probe the candidates, remember the winner for a while, and fall back
//! to a fixed address when nothing works. Discovery never fails.

use crate::validate::{parse_endpoint, PeerInfo, ValidationError};
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use warpgen_network::{HostResolver, ReachabilityProbe, TcpProbe};
use warpgen_tunnel::Endpoint;

/// Time source, injectable for tests
pub type Clock = Arc<dyn Fn() -> Instant + Send + Sync>;

/// Which endpoint strategy a deployment uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointMode {
    /// Trust the first peer's endpoint
    #[default]
    Peer,
    /// DNS discovery with probe, cache and fallback
    Discover,
}

/// Discovery settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Hostname resolved for candidates
    pub hostname: String,
    /// Tunnel port paired with the chosen address
    pub port: u16,
    /// Address used when discovery yields nothing
    pub fallback: Ipv4Addr,
    /// How long a discovered address is reused (seconds)
    pub cache_ttl_secs: u64,
    /// Probe candidates before picking one
    pub probe: bool,
    /// TCP port used for the reachability probe
    pub probe_port: u16,
    pub probe_timeout_ms: u64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            hostname: "engage.cloudflareclient.com".to_string(),
            port: 2408,
            fallback: Ipv4Addr::new(162, 159, 192, 1),
            cache_ttl_secs: 300,
            probe: true,
            probe_port: 443,
            probe_timeout_ms: 2000,
        }
    }
}

impl DiscoveryConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    fn fallback_endpoint(&self) -> Endpoint {
        Endpoint::from_ip(self.fallback.into(), self.port)
    }
}

#[derive(Debug, Clone, Copy)]
struct CachedAddress {
    addr: Ipv4Addr,
    expires_at: Instant,
}

/// Single-slot, time-boxed memo of the last discovered address
///
/// The slot is replaced whole; concurrent readers see either the old or
/// the new value.
#[derive(Debug, Default)]
pub struct EndpointCache {
    slot: RwLock<Option<CachedAddress>>,
}

impl EndpointCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached address, if still valid at `now`
    pub fn get(&self, now: Instant) -> Option<Ipv4Addr> {
        let slot = self.slot.read().ok()?;
        (*slot).filter(|c| c.expires_at > now).map(|c| c.addr)
    }

    pub fn store(&self, addr: Ipv4Addr, expires_at: Instant) {
        if let Ok(mut slot) = self.slot.write() {
            *slot = Some(CachedAddress { addr, expires_at });
        }
    }
}

/// Independent endpoint discovery
pub struct EndpointDiscovery {
    config: DiscoveryConfig,
    resolver: Arc<dyn HostResolver>,
    probe: Option<Arc<dyn ReachabilityProbe>>,
    cache: Arc<EndpointCache>,
    clock: Clock,
}

impl EndpointDiscovery {
    /// Discovery with a TCP probe (when enabled), a private cache and the
    /// system clock
    pub fn new(config: DiscoveryConfig, resolver: Arc<dyn HostResolver>) -> Self {
        let probe: Option<Arc<dyn ReachabilityProbe>> = if config.probe {
            Some(Arc::new(TcpProbe::new(config.probe_timeout())))
        } else {
            None
        };

        Self {
            config,
            resolver,
            probe,
            cache: Arc::new(EndpointCache::new()),
            clock: Arc::new(Instant::now),
        }
    }

    pub fn with_probe(mut self, probe: Option<Arc<dyn ReachabilityProbe>>) -> Self {
        self.probe = probe;
        self
    }

    pub fn with_cache(mut self, cache: Arc<EndpointCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_clock<F>(mut self, clock: F) -> Self
    where
        F: Fn() -> Instant + Send + Sync + 'static,
    {
        self.clock = Arc::new(clock);
        self
    }

    pub fn cache(&self) -> &Arc<EndpointCache> {
        &self.cache
    }

    /// Best-effort endpoint; falls back instead of failing
    pub async fn resolve(&self) -> Endpoint {
        let now = (self.clock)();

        if let Some(addr) = self.cache.get(now) {
            debug!("Endpoint cache hit: {}", addr);
            return Endpoint::from_ip(addr.into(), self.config.port);
        }

        match self.discover().await {
            Some(addr) => {
                info!("Discovered endpoint {}:{}", addr, self.config.port);
                match now.checked_add(self.config.cache_ttl()) {
                    Some(expires_at) => self.cache.store(addr, expires_at),
                    None => warn!("Cache TTL {}s out of range, not caching", self.config.cache_ttl_secs),
                }
                Endpoint::from_ip(addr.into(), self.config.port)
            }
            None => {
                warn!(
                    "Endpoint discovery for {} failed, using fallback {}",
                    self.config.hostname, self.config.fallback
                );
                self.config.fallback_endpoint()
            }
        }
    }

    async fn discover(&self) -> Option<Ipv4Addr> {
        let candidates = match self.resolver.resolve_ipv4(&self.config.hostname).await {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!("DNS resolution of {} failed: {}", self.config.hostname, e);
                return None;
            }
        };

        let Some(probe) = &self.probe else {
            return candidates.first().copied();
        };

        for addr in candidates {
            if probe.is_reachable(SocketAddr::new(addr.into(), self.config.probe_port)).await {
                return Some(addr);
            }
            debug!("Candidate {} unreachable", addr);
        }

        None
    }
}

/// Endpoint strategy used by the provisioner
pub enum EndpointSource {
    FromPeer,
    Discover(EndpointDiscovery),
}

impl EndpointSource {
    pub async fn resolve(&self, peer: &PeerInfo) -> Result<Endpoint, ValidationError> {
        match self {
            EndpointSource::FromPeer => {
                let raw = peer.endpoint
                    .as_ref()
                    .ok_or(ValidationError::Missing("result.config.peers[0].endpoint"))?;
                parse_endpoint(raw)
            }
            EndpointSource::Discover(discovery) => Ok(discovery.resolve().await),
        }
    }
}
