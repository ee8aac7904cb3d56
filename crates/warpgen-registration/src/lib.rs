//! warpgen Registration
//!
//! Provisions an ephemeral WARP client identity and turns it into an
//! AmneziaWG configuration.
//!
//! # Sequence
//!
//! ```text
//! KeyPair::generate
//!   -> WarpApi::register   (POST <prefix>/reg)        -> validate_registration
//!   -> WarpApi::activate   (PATCH <prefix>/reg/<id>)  -> validate_activation
//!   -> EndpointSource::resolve  (peer endpoint or DNS discovery)
//!   -> AllowedIpsPolicy::select
//!   -> assemble            -> TunnelConfig
//! ```
//!
//! Each request runs the sequence exactly once. Any failure aborts the
//! remaining steps; only endpoint discovery degrades to a fallback.

mod allowed;
mod api;
mod assemble;
mod endpoint;
mod error;
mod provision;
mod validate;

pub use allowed::AllowedIpsPolicy;
pub use api::{
    ActivatedDevice, ActivationResponse, ApiConfig, ApiError, DeviceConfig, DeviceType,
    RawAddresses, RawAllowedIps, RawEndpoint, RawInterface, RawPeer, RawPort, RegisteredDevice,
    RegistrationRequest, RegistrationResponse, WarpApi, WarpClient, DEFAULT_API_BASE,
};
pub use assemble::assemble;
pub use endpoint::{
    Clock, DiscoveryConfig, EndpointCache, EndpointDiscovery, EndpointMode, EndpointSource,
};
pub use error::ProvisionError;
pub use provision::{ProvisionConfig, Provisioner, Stage};
pub use validate::{
    parse_allowed_ips, parse_endpoint, validate_activation, validate_registration,
    ActivationResult, InterfaceAddresses, PeerInfo, RegistrationResult, ValidationError,
};
