//! Tunnel Configuration
//!
//! The `[Interface]` / `[Peer]` document consumed by AmneziaWG clients.
//! Key order inside each section is fixed.

use crate::allowed_ips::AllowedIp;
use crate::keys::{PrivateKey, PublicKey};
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Write as _};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Tunnel MTU
pub const DEFAULT_MTU: u16 = 1280;

/// Resolvers configured inside the tunnel (Cloudflare, v4 and v6)
pub const DEFAULT_DNS: [IpAddr; 4] = [
    IpAddr::V4(Ipv4Addr::new(1, 1, 1, 1)),
    IpAddr::V6(Ipv6Addr::new(0x2606, 0x4700, 0x4700, 0, 0, 0, 0, 0x1111)),
    IpAddr::V4(Ipv4Addr::new(1, 0, 0, 1)),
    IpAddr::V6(Ipv6Addr::new(0x2606, 0x4700, 0x4700, 0, 0, 0, 0, 0x1001)),
];

/// Peer endpoint (host + UDP port)
///
/// The host is usually an IP literal but may be a hostname.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn from_ip(addr: IpAddr, port: u16) -> Self {
        Self::new(addr.to_string(), port)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.parse::<Ipv6Addr>().is_ok() {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// AmneziaWG junk-packet and header obfuscation parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Obfuscation {
    /// Junk packet count
    pub jc: u16,
    /// Junk packet minimum size
    pub jmin: u16,
    /// Junk packet maximum size
    pub jmax: u16,
    /// Message type headers H1..H4
    pub headers: [u32; 4],
}

impl Default for Obfuscation {
    fn default() -> Self {
        Self {
            jc: 120,
            jmin: 23,
            jmax: 911,
            headers: [1, 2, 3, 4],
        }
    }
}

/// `[Interface]` section
#[derive(Debug, Clone)]
pub struct InterfaceSection {
    pub private_key: PrivateKey,
    pub obfuscation: Obfuscation,
    pub mtu: u16,
    pub address_v4: Ipv4Addr,
    pub address_v6: Ipv6Addr,
    pub dns: Vec<IpAddr>,
}

impl InterfaceSection {
    /// Interface with the stock obfuscation, MTU and DNS list
    pub fn new(private_key: PrivateKey, address_v4: Ipv4Addr, address_v6: Ipv6Addr) -> Self {
        Self {
            private_key,
            obfuscation: Obfuscation::default(),
            mtu: DEFAULT_MTU,
            address_v4,
            address_v6,
            dns: DEFAULT_DNS.to_vec(),
        }
    }
}

/// `[Peer]` section
#[derive(Debug, Clone)]
pub struct PeerSection {
    pub public_key: PublicKey,
    pub allowed_ips: Vec<AllowedIp>,
    pub endpoint: Endpoint,
}

/// Complete tunnel configuration
#[derive(Debug, Clone)]
pub struct TunnelConfig {
    pub interface: InterfaceSection,
    pub peer: PeerSection,
}

impl TunnelConfig {
    pub fn new(interface: InterfaceSection, peer: PeerSection) -> Self {
        Self { interface, peer }
    }

    /// Render the configuration document (no trailing newline)
    pub fn render(&self) -> String {
        let iface = &self.interface;
        let ob = &iface.obfuscation;
        let mut out = String::with_capacity(1024);

        // Writing into a String cannot fail
        let _ = writeln!(out, "[Interface]");
        let _ = writeln!(out, "PrivateKey = {}", iface.private_key.to_base64());
        let _ = writeln!(out, "Jc = {}", ob.jc);
        let _ = writeln!(out, "Jmin = {}", ob.jmin);
        let _ = writeln!(out, "Jmax = {}", ob.jmax);
        for (i, h) in ob.headers.iter().enumerate() {
            let _ = writeln!(out, "H{} = {}", i + 1, h);
        }
        let _ = writeln!(out, "MTU = {}", iface.mtu);
        let _ = writeln!(out, "Address = {}/32, {}/128", iface.address_v4, iface.address_v6);
        let _ = writeln!(out, "DNS = {}", join(&iface.dns));
        let _ = writeln!(out);
        let _ = writeln!(out, "[Peer]");
        let _ = writeln!(out, "PublicKey = {}", self.peer.public_key.to_base64());
        let _ = writeln!(out, "AllowedIPs = {}", join(&self.peer.allowed_ips));
        let _ = write!(out, "Endpoint = {}", self.peer.endpoint);

        out
    }

    /// Base64 of the rendered document, as returned to HTTP clients
    pub fn to_base64(&self) -> String {
        BASE64.encode(self.render())
    }
}

impl fmt::Display for TunnelConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

fn join<T: fmt::Display>(items: &[T]) -> String {
    items.iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
