//! Provisioning sequence
//!
//! One call to [`Provisioner::provision`] runs the whole sequence once:
//! keys, register, activate, endpoint, assemble. The first failure ends
//! it; there are no retries since re-registering creates another device.

use crate::allowed::AllowedIpsPolicy;
use crate::api::{DeviceType, RegistrationRequest, WarpApi};
use crate::assemble::assemble;
use crate::endpoint::EndpointSource;
use crate::error::ProvisionError;
use crate::validate::{validate_activation, validate_registration};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use warpgen_tunnel::{KeyPair, TunnelConfig};

/// Progress of a single provisioning run
///
/// `Assembled` and `Failed` are terminal here; the HTTP layer turns them
/// into the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    KeyGenerated,
    Registered,
    Activated,
    EndpointResolved,
    Assembled,
    /// Aborted with the named error kind
    Failed(&'static str),
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Idle => "idle",
            Stage::KeyGenerated => "key_generated",
            Stage::Registered => "registered",
            Stage::Activated => "activated",
            Stage::EndpointResolved => "endpoint_resolved",
            Stage::Assembled => "assembled",
            Stage::Failed(kind) => return write!(f, "failed({})", kind),
        };
        f.write_str(name)
    }
}

/// Per-deployment registration parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisionConfig {
    pub device_type: DeviceType,
    pub locale: String,
    /// Overall deadline for one run (seconds)
    pub deadline_secs: u64,
}

impl Default for ProvisionConfig {
    fn default() -> Self {
        Self {
            device_type: DeviceType::default(),
            locale: "en_US".to_string(),
            deadline_secs: 15,
        }
    }
}

impl ProvisionConfig {
    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_secs)
    }
}

/// Runs the provisioning sequence against a registration API
pub struct Provisioner {
    api: Arc<dyn WarpApi>,
    endpoints: EndpointSource,
    allowed_ips: AllowedIpsPolicy,
    config: ProvisionConfig,
}

impl Provisioner {
    pub fn new(
        api: Arc<dyn WarpApi>,
        endpoints: EndpointSource,
        allowed_ips: AllowedIpsPolicy,
        config: ProvisionConfig,
    ) -> Self {
        Self { api, endpoints, allowed_ips, config }
    }

    pub fn config(&self) -> &ProvisionConfig {
        &self.config
    }

    /// Produce a fresh tunnel config, or the first error encountered
    pub async fn provision(&self) -> Result<TunnelConfig, ProvisionError> {
        self.attempt().await.0
    }

    /// One run plus the stage it ended in
    async fn attempt(&self) -> (Result<TunnelConfig, ProvisionError>, Stage) {
        let deadline = self.config.deadline();
        let started = Instant::now();
        let mut stage = Stage::Idle;

        let result = match tokio::time::timeout(deadline, self.run(&mut stage)).await {
            Ok(result) => result,
            Err(_) => Err(ProvisionError::Timeout(deadline)),
        };

        match &result {
            Ok(_) => info!("Provisioned tunnel config in {:?}", started.elapsed()),
            Err(e) => {
                warn!("Provisioning failed after stage {} ({}): {}", stage, e.kind(), e);
                advance(&mut stage, Stage::Failed(e.kind()));
            }
        }

        (result, stage)
    }

    async fn run(&self, stage: &mut Stage) -> Result<TunnelConfig, ProvisionError> {
        let keys = KeyPair::generate();
        advance(stage, Stage::KeyGenerated);

        let request = RegistrationRequest::new(&keys.public, self.config.device_type, &self.config.locale);
        let response = self.api.register(&request).await.map_err(ProvisionError::registration)?;
        let device = validate_registration(response)?;
        debug!("Registered device {}", device.device_id);
        advance(stage, Stage::Registered);

        let response = self.api
            .activate(&device.device_id, &device.auth_token)
            .await
            .map_err(ProvisionError::activation)?;
        let activation = validate_activation(response)?;
        if activation.peer_count > 1 {
            debug!("Activation returned {} peers, using the first", activation.peer_count);
        }
        advance(stage, Stage::Activated);

        let endpoint = self.endpoints.resolve(&activation.peer).await?;
        let allowed_ips = self.allowed_ips.select(&activation.peer)?;
        debug!("Using endpoint {}", endpoint);
        advance(stage, Stage::EndpointResolved);

        let config = assemble(&keys, &activation, endpoint, allowed_ips);
        advance(stage, Stage::Assembled);

        Ok(config)
    }
}

fn advance(stage: &mut Stage, next: Stage) {
    debug!("Provisioning stage {} -> {}", stage, next);
    *stage = next;
}
