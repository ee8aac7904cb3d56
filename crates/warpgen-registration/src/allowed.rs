//! AllowedIPs policy

use crate::validate::{parse_allowed_ips, PeerInfo, ValidationError};
use serde::{Deserialize, Serialize};
use warpgen_tunnel::{default_allowed_ips, AllowedIp};

/// Where the `[Peer] AllowedIPs` list comes from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum AllowedIpsPolicy {
    /// A configured list, independent of the upstream response
    Fixed {
        #[serde(default = "default_allowed_ips")]
        ranges: Vec<AllowedIp>,
    },
    /// Echo the ranges the first peer carries
    FromResponse,
}

impl Default for AllowedIpsPolicy {
    fn default() -> Self {
        AllowedIpsPolicy::Fixed {
            ranges: default_allowed_ips(),
        }
    }
}

impl AllowedIpsPolicy {
    pub fn select(&self, peer: &PeerInfo) -> Result<Vec<AllowedIp>, ValidationError> {
        match self {
            AllowedIpsPolicy::Fixed { ranges } if ranges.is_empty() => {
                Err(ValidationError::Missing("allowed_ips.ranges"))
            }
            AllowedIpsPolicy::Fixed { ranges } => Ok(ranges.clone()),
            AllowedIpsPolicy::FromResponse => {
                let raw = peer.allowed_ips
                    .as_ref()
                    .ok_or(ValidationError::Missing("result.config.peers[0].allowed_ips"))?;
                parse_allowed_ips(raw)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::RawAllowedIps;
    use warpgen_tunnel::{KeyPair, DEFAULT_ALLOWED_IPS};

    fn peer(allowed_ips: Option<RawAllowedIps>) -> PeerInfo {
        PeerInfo {
            public_key: KeyPair::generate().public,
            endpoint: None,
            allowed_ips,
        }
    }

    #[test]
    fn test_default_is_fixed_list() {
        let ranges = AllowedIpsPolicy::default().select(&peer(None)).unwrap();
        assert_eq!(ranges.len(), DEFAULT_ALLOWED_IPS.len());
    }

    #[test]
    fn test_fixed_ignores_response() {
        let policy = AllowedIpsPolicy::Fixed {
            ranges: vec!["10.0.0.0/8".parse().unwrap()],
        };
        let upstream = RawAllowedIps::List(vec!["0.0.0.0/0".into()]);

        let ranges = policy.select(&peer(Some(upstream))).unwrap();
        assert_eq!(ranges, vec!["10.0.0.0/8".parse::<AllowedIp>().unwrap()]);
    }

    #[test]
    fn test_from_response() {
        let upstream = RawAllowedIps::List(vec!["0.0.0.0/0".into(), "::/0".into()]);
        let ranges = AllowedIpsPolicy::FromResponse.select(&peer(Some(upstream))).unwrap();
        assert_eq!(ranges.len(), 2);

        let err = AllowedIpsPolicy::FromResponse.select(&peer(None)).unwrap_err();
        assert_eq!(err, ValidationError::Missing("result.config.peers[0].allowed_ips"));
    }

    #[test]
    fn test_policy_from_settings() {
        let policy: AllowedIpsPolicy = serde_json::from_str(r#"{"mode":"from_response"}"#).unwrap();
        assert_eq!(policy, AllowedIpsPolicy::FromResponse);

        let policy: AllowedIpsPolicy = serde_json::from_str(r#"{"mode":"fixed"}"#).unwrap();
        assert_eq!(policy, AllowedIpsPolicy::default());

        let policy: AllowedIpsPolicy =
            serde_json::from_str(r#"{"mode":"fixed","ranges":["0.0.0.0/0"]}"#).unwrap();
        assert_eq!(policy, AllowedIpsPolicy::Fixed { ranges: vec!["0.0.0.0/0".parse().unwrap()] });
    }
}
