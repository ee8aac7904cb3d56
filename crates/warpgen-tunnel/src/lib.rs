//! warpgen tunnel model
//!
//! Key material and the AmneziaWG configuration document handed to
//! external tunnel software.
//!
//! ```text
//! [Interface]            <- PrivateKey, obfuscation knobs, MTU, Address, DNS
//! [Peer]                 <- PublicKey, AllowedIPs, Endpoint
//! ```
//!
//! Nothing here performs I/O: keys come from the OS RNG and the document
//! is rendered from plain values.

mod allowed_ips;
mod config;
mod keys;

pub use allowed_ips::{default_allowed_ips, AllowedIp, AllowedIpError, DEFAULT_ALLOWED_IPS};
pub use config::{
    Endpoint, InterfaceSection, Obfuscation, PeerSection, TunnelConfig, DEFAULT_DNS, DEFAULT_MTU,
};
pub use keys::{KeyError, KeyPair, PrivateKey, PublicKey};
