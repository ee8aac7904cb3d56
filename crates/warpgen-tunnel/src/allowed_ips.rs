//! AllowedIPs ranges
//!
//! CIDR ranges routed through the peer. Ranges render in canonical form,
//! which for the default list is the text it is written in.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

/// Ranges routed through the tunnel by default.
pub const DEFAULT_ALLOWED_IPS: &[&str] = &[
    "138.128.136.0/21", "162.158.0.0/15", "172.64.0.0/13", "34.0.0.0/15",
    "34.2.0.0/16", "34.3.0.0/23", "34.3.2.0/24", "35.192.0.0/12",
    "35.208.0.0/12", "35.224.0.0/12", "35.240.0.0/13", "5.200.14.128/25",
    "66.22.192.0/18", "13.32.0.0/32", "13.35.0.0/32", "13.48.0.0/32",
    "13.64.0.0/32", "13.128.0.0/32", "13.192.0.0/32", "13.224.0.0/32",
    "13.240.0.0/32", "13.248.0.0/32", "13.252.0.0/32", "13.254.0.0/32",
    "13.255.0.0/32", "18.67.0.0/32", "23.20.0.0/32", "23.40.0.0/32",
    "23.64.0.0/32", "23.128.0.0/32", "23.192.0.0/32", "23.224.0.0/32",
    "23.240.0.0/32", "23.248.0.0/32", "23.252.0.0/32", "23.254.0.0/32",
    "23.255.0.0/32", "34.200.0.0/32", "34.224.0.0/32", "34.240.0.0/32",
    "35.255.255.0/32",
];

/// Parsed default range list
pub fn default_allowed_ips() -> Vec<AllowedIp> {
    DEFAULT_ALLOWED_IPS
        .iter()
        .filter_map(|s| s.parse().ok())
        .collect()
}

/// A single CIDR range (e.g. "162.158.0.0/15")
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AllowedIp {
    pub addr: IpAddr,
    pub prefix: u8,
}

impl AllowedIp {
    pub fn new(addr: IpAddr, prefix: u8) -> Result<Self, AllowedIpError> {
        let max = if addr.is_ipv4() { 32 } else { 128 };
        if prefix > max {
            return Err(AllowedIpError::PrefixTooLong { prefix, max });
        }
        Ok(Self { addr, prefix })
    }
}

impl FromStr for AllowedIp {
    type Err = AllowedIpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (ip, prefix) = s.trim()
            .split_once('/')
            .ok_or_else(|| AllowedIpError::Malformed(s.to_string()))?;

        let addr: IpAddr = ip.parse()
            .map_err(|_| AllowedIpError::Malformed(s.to_string()))?;
        let prefix: u8 = prefix.parse()
            .map_err(|_| AllowedIpError::Malformed(s.to_string()))?;

        Self::new(addr, prefix)
    }
}

impl TryFrom<String> for AllowedIp {
    type Error = AllowedIpError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AllowedIp> for String {
    fn from(value: AllowedIp) -> Self {
        value.to_string()
    }
}

impl fmt::Display for AllowedIp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AllowedIpError {
    #[error("Malformed CIDR range: {0}")]
    Malformed(String),

    #[error("Prefix /{prefix} exceeds /{max}")]
    PrefixTooLong { prefix: u8, max: u8 },
}
