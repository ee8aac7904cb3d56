//! Config assembly

use crate::validate::ActivationResult;
use warpgen_tunnel::{AllowedIp, Endpoint, InterfaceSection, KeyPair, PeerSection, TunnelConfig};

/// Build the tunnel document from validated inputs. Pure and infallible.
pub fn assemble(
    keys: &KeyPair,
    activation: &ActivationResult,
    endpoint: Endpoint,
    allowed_ips: Vec<AllowedIp>,
) -> TunnelConfig {
    TunnelConfig::new(
        InterfaceSection::new(
            keys.private.clone(),
            activation.addresses.v4,
            activation.addresses.v6,
        ),
        PeerSection {
            public_key: activation.peer.public_key.clone(),
            allowed_ips,
            endpoint,
        },
    )
}
