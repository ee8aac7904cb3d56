//! Response validation
//!
//! Turns the loosely-typed upstream responses into the values the next
//! step needs, failing on the first missing or unusable field. Nothing
//! is interpolated into a request or the output document before it has
//! passed through here.

use crate::api::{
    ActivationResponse, RawAllowedIps, RawEndpoint, RawPort, RegistrationResponse,
};
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};
use thiserror::Error;
use warpgen_tunnel::{AllowedIp, Endpoint, PublicKey};

/// A required field is absent or unusable
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("missing {0}")]
    Missing(&'static str),

    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Identity of a freshly registered device
#[derive(Clone, PartialEq, Eq)]
pub struct RegistrationResult {
    pub device_id: String,
    pub auth_token: String,
}

impl fmt::Debug for RegistrationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistrationResult")
            .field("device_id", &self.device_id)
            .field("auth_token", &"[redacted]")
            .finish()
    }
}

/// Client addresses inside the tunnel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterfaceAddresses {
    pub v4: Ipv4Addr,
    pub v6: Ipv6Addr,
}

/// The peer the configuration points at
///
/// Endpoint and AllowedIPs stay raw: whether they are needed depends on
/// the configured policies.
#[derive(Debug, Clone)]
pub struct PeerInfo {
    pub public_key: PublicKey,
    pub endpoint: Option<RawEndpoint>,
    pub allowed_ips: Option<RawAllowedIps>,
}

/// Network parameters returned by activation
#[derive(Debug, Clone)]
pub struct ActivationResult {
    pub addresses: InterfaceAddresses,
    /// First peer of the response; the others are ignored
    pub peer: PeerInfo,
    pub peer_count: usize,
}

/// Require `result.id` and `result.token`
pub fn validate_registration(resp: RegistrationResponse) -> Result<RegistrationResult, ValidationError> {
    let device = resp.result.ok_or(ValidationError::Missing("result"))?;

    let device_id = non_empty(device.id, "result.id")?;
    let auth_token = non_empty(device.token, "result.token")?;

    Ok(RegistrationResult { device_id, auth_token })
}

/// Require a non-empty peer list with a usable first key and both
/// interface addresses
pub fn validate_activation(resp: ActivationResponse) -> Result<ActivationResult, ValidationError> {
    let config = resp.result
        .and_then(|r| r.config)
        .ok_or(ValidationError::Missing("result.config"))?;

    let peers = config.peers.unwrap_or_default();
    let peer_count = peers.len();
    let first = peers.into_iter()
        .next()
        .ok_or(ValidationError::Missing("result.config.peers"))?;

    let key_text = non_empty(first.public_key, "result.config.peers[0].public_key")?;
    let public_key = PublicKey::from_base64(&key_text).map_err(|e| ValidationError::Invalid {
        field: "result.config.peers[0].public_key",
        reason: e.to_string(),
    })?;

    let addresses = config.interface
        .and_then(|i| i.addresses)
        .ok_or(ValidationError::Missing("result.config.interface.addresses"))?;

    let v4 = non_empty(addresses.v4, "result.config.interface.addresses.v4")?;
    let v6 = non_empty(addresses.v6, "result.config.interface.addresses.v6")?;

    let addresses = InterfaceAddresses {
        v4: parse_field(&v4, "result.config.interface.addresses.v4")?,
        v6: parse_field(&v6, "result.config.interface.addresses.v6")?,
    };

    Ok(ActivationResult {
        addresses,
        peer: PeerInfo {
            public_key,
            endpoint: first.endpoint,
            allowed_ips: first.allowed_ips,
        },
        peer_count,
    })
}

/// Accept `"host:port"`, `"[v6]:port"`, `{host, port}`, or `{host:"host:port"}`
pub fn parse_endpoint(raw: &RawEndpoint) -> Result<Endpoint, ValidationError> {
    match raw {
        RawEndpoint::Address(text) => parse_endpoint_text(text),
        RawEndpoint::Structured { host, port } => {
            let host = host.as_deref()
                .map(str::trim)
                .filter(|h| !h.is_empty())
                .ok_or(ValidationError::Missing("endpoint.host"))?;

            let port = match port {
                Some(RawPort::Number(n)) => Some(check_port(*n)?),
                Some(RawPort::Text(t)) => Some(parse_port(t)?),
                None => None,
            };

            // Some responses put the port inside `host`
            if has_port(host) {
                let embedded = parse_endpoint_text(host)?;
                return match port {
                    Some(p) if p != embedded.port => Err(ValidationError::Invalid {
                        field: "endpoint",
                        reason: format!("host {:?} disagrees with port {}", host, p),
                    }),
                    _ => Ok(embedded),
                };
            }

            let port = port.ok_or(ValidationError::Missing("endpoint.port"))?;
            Ok(Endpoint::new(strip_brackets(host), port))
        }
    }
}

/// Ranges from a peer's `allowed_ips`; an empty set counts as missing
pub fn parse_allowed_ips(raw: &RawAllowedIps) -> Result<Vec<AllowedIp>, ValidationError> {
    let texts: Vec<&str> = match raw {
        RawAllowedIps::List(list) => list.iter().map(String::as_str).collect(),
        RawAllowedIps::Families { v4, v6 } => [v4, v6]
            .into_iter()
            .filter_map(|s| s.as_deref())
            .collect(),
    };

    let ranges = texts.into_iter()
        .filter(|t| !t.trim().is_empty())
        .map(|t| parse_field(t, "result.config.peers[0].allowed_ips"))
        .collect::<Result<Vec<AllowedIp>, _>>()?;

    if ranges.is_empty() {
        return Err(ValidationError::Missing("result.config.peers[0].allowed_ips"));
    }
    Ok(ranges)
}

fn parse_endpoint_text(text: &str) -> Result<Endpoint, ValidationError> {
    let text = text.trim();

    let (host, port) = if let Some(rest) = text.strip_prefix('[') {
        // [v6]:port
        match rest.split_once(']') {
            Some((host, tail)) => (host, tail.strip_prefix(':')),
            None => return Err(ValidationError::Invalid {
                field: "endpoint",
                reason: format!("unterminated bracket in {:?}", text),
            }),
        }
    } else if text.parse::<Ipv6Addr>().is_ok() {
        (text, None)
    } else {
        match text.rsplit_once(':') {
            Some((host, port)) => (host, Some(port)),
            None => (text, None),
        }
    };

    if host.is_empty() {
        return Err(ValidationError::Missing("endpoint.host"));
    }
    let port = port
        .filter(|p| !p.is_empty())
        .ok_or(ValidationError::Missing("endpoint.port"))?;

    Ok(Endpoint::new(host, parse_port(port)?))
}

fn has_port(host: &str) -> bool {
    if host.starts_with('[') {
        return host.contains("]:");
    }
    host.contains(':') && host.parse::<Ipv6Addr>().is_err()
}

fn strip_brackets(host: &str) -> &str {
    host.strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host)
}

fn parse_port(text: &str) -> Result<u16, ValidationError> {
    let n: u64 = text.trim().parse().map_err(|_| ValidationError::Invalid {
        field: "endpoint.port",
        reason: format!("{:?} is not a number", text),
    })?;
    check_port(n)
}

fn check_port(n: u64) -> Result<u16, ValidationError> {
    match u16::try_from(n) {
        Ok(port) if port != 0 => Ok(port),
        _ => Err(ValidationError::Invalid {
            field: "endpoint.port",
            reason: format!("{} is out of range", n),
        }),
    }
}

fn non_empty(value: Option<String>, field: &'static str) -> Result<String, ValidationError> {
    value.filter(|v| !v.trim().is_empty())
        .ok_or(ValidationError::Missing(field))
}

fn parse_field<T>(text: &str, field: &'static str) -> Result<T, ValidationError>
where
    T: std::str::FromStr,
    T::Err: fmt::Display,
{
    text.trim().parse().map_err(|e: T::Err| ValidationError::Invalid {
        field,
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use warpgen_tunnel::KeyPair;

    fn registration(value: Value) -> RegistrationResponse {
        serde_json::from_value(value).unwrap()
    }

    fn activation(value: Value) -> ActivationResponse {
        serde_json::from_value(value).unwrap()
    }

    fn activation_body(peer_key: &str) -> Value {
        json!({
            "result": {
                "config": {
                    "peers": [{
                        "public_key": peer_key,
                        "endpoint": {"host": "engage.cloudflareclient.com:2408", "v4": "162.159.192.1:0"}
                    }],
                    "interface": {"addresses": {"v4": "172.16.0.2", "v6": "2606:4700:110:8a36::1"}}
                }
            }
        })
    }

    #[test]
    fn test_registration_valid() {
        let result = validate_registration(registration(json!({
            "result": {"id": "dev-1", "token": "tok-1", "account": {}}
        })))
        .unwrap();

        assert_eq!(result.device_id, "dev-1");
        assert_eq!(result.auth_token, "tok-1");
        assert!(!format!("{:?}", result).contains("tok-1"));
    }

    #[test]
    fn test_registration_missing_fields() {
        let cases = [
            (json!({}), "result"),
            (json!({"result": {"token": "t"}}), "result.id"),
            (json!({"result": {"id": "", "token": "t"}}), "result.id"),
            (json!({"result": {"id": "d"}}), "result.token"),
            (json!({"result": {"id": "d", "token": "  "}}), "result.token"),
        ];

        for (body, field) in cases {
            assert_eq!(
                validate_registration(registration(body)),
                Err(ValidationError::Missing(field))
            );
        }
    }

    #[test]
    fn test_activation_valid() {
        let peer = KeyPair::generate().public;
        let result = validate_activation(activation(activation_body(&peer.to_base64()))).unwrap();

        assert_eq!(result.peer.public_key, peer);
        assert_eq!(result.peer_count, 1);
        assert_eq!(result.addresses.v4, Ipv4Addr::new(172, 16, 0, 2));
        assert_eq!(result.addresses.v6, "2606:4700:110:8a36::1".parse::<Ipv6Addr>().unwrap());
        assert!(result.peer.endpoint.is_some());
    }

    #[test]
    fn test_activation_empty_peers() {
        let mut body = activation_body("unused");
        body["result"]["config"]["peers"] = json!([]);

        let err = validate_activation(activation(body)).unwrap_err();
        assert_eq!(err, ValidationError::Missing("result.config.peers"));
    }

    #[test]
    fn test_activation_missing_peers_and_config() {
        let err = validate_activation(activation(json!({"result": {}}))).unwrap_err();
        assert_eq!(err, ValidationError::Missing("result.config"));

        let err = validate_activation(activation(json!({"result": {"config": {"interface": {}}}}))).unwrap_err();
        assert_eq!(err, ValidationError::Missing("result.config.peers"));
    }

    #[test]
    fn test_activation_peer_key_checks() {
        let mut body = activation_body("");
        let err = validate_activation(activation(body.clone())).unwrap_err();
        assert_eq!(err, ValidationError::Missing("result.config.peers[0].public_key"));

        body["result"]["config"]["peers"][0]["public_key"] = json!("AAAA");
        let err = validate_activation(activation(body)).unwrap_err();
        assert!(matches!(err, ValidationError::Invalid { field: "result.config.peers[0].public_key", .. }));
    }

    #[test]
    fn test_activation_address_checks() {
        let key = KeyPair::generate().public.to_base64();

        let mut body = activation_body(&key);
        body["result"]["config"]["interface"]["addresses"]
            .as_object_mut()
            .unwrap()
            .remove("v6");
        let err = validate_activation(activation(body)).unwrap_err();
        assert_eq!(err, ValidationError::Missing("result.config.interface.addresses.v6"));

        let mut body = activation_body(&key);
        body["result"]["config"]["interface"]["addresses"]["v4"] = json!("2606::1");
        let err = validate_activation(activation(body)).unwrap_err();
        assert!(matches!(err, ValidationError::Invalid { field: "result.config.interface.addresses.v4", .. }));

        let mut body = activation_body(&key);
        body["result"]["config"]["interface"] = json!({});
        let err = validate_activation(activation(body)).unwrap_err();
        assert_eq!(err, ValidationError::Missing("result.config.interface.addresses"));
    }

    #[test]
    fn test_only_first_peer_is_used() {
        let first = KeyPair::generate().public;
        let mut body = activation_body(&first.to_base64());
        body["result"]["config"]["peers"]
            .as_array_mut()
            .unwrap()
            .push(json!({"public_key": "not even base64!"}));

        let result = validate_activation(activation(body)).unwrap();
        assert_eq!(result.peer.public_key, first);
        assert_eq!(result.peer_count, 2);
    }

    #[test]
    fn test_endpoint_string_and_structured_agree() {
        let text = parse_endpoint(&RawEndpoint::Address("1.2.3.4:51820".into())).unwrap();
        let structured = parse_endpoint(&RawEndpoint::Structured {
            host: Some("1.2.3.4".into()),
            port: Some(RawPort::Number(51820)),
        })
        .unwrap();

        assert_eq!(text, structured);
        assert_eq!(text, Endpoint::new("1.2.3.4", 51820));
        assert_eq!(format!("Endpoint = {}", text), format!("Endpoint = {}", structured));
    }

    #[test]
    fn test_endpoint_variants() {
        let ep = parse_endpoint(&RawEndpoint::Structured {
            host: Some("162.159.192.1".into()),
            port: Some(RawPort::Text("2408".into())),
        })
        .unwrap();
        assert_eq!(ep, Endpoint::new("162.159.192.1", 2408));

        let ep = parse_endpoint(&RawEndpoint::Structured {
            host: Some("engage.cloudflareclient.com:2408".into()),
            port: None,
        })
        .unwrap();
        assert_eq!(ep, Endpoint::new("engage.cloudflareclient.com", 2408));

        let ep = parse_endpoint(&RawEndpoint::Address("[2606:4700:d0::a29f:c001]:2408".into())).unwrap();
        assert_eq!(ep, Endpoint::new("2606:4700:d0::a29f:c001", 2408));
        assert_eq!(ep.to_string(), "[2606:4700:d0::a29f:c001]:2408");

        let ep = parse_endpoint(&RawEndpoint::Structured {
            host: Some("[2606:4700:d0::a29f:c001]".into()),
            port: Some(RawPort::Number(2408)),
        })
        .unwrap();
        assert_eq!(ep.to_string(), "[2606:4700:d0::a29f:c001]:2408");

        // Port in both places is fine while they agree
        let ep = parse_endpoint(&RawEndpoint::Structured {
            host: Some("1.2.3.4:2408".into()),
            port: Some(RawPort::Text("2408".into())),
        })
        .unwrap();
        assert_eq!(ep.to_string(), "1.2.3.4:2408");
    }

    #[test]
    fn test_endpoint_conflicting_ports() {
        let err = parse_endpoint(&RawEndpoint::Structured {
            host: Some("1.2.3.4:2408".into()),
            port: Some(RawPort::Number(51820)),
        })
        .unwrap_err();
        assert!(matches!(err, ValidationError::Invalid { field: "endpoint", .. }));

        let err = parse_endpoint(&RawEndpoint::Structured {
            host: Some("[2606::1]:2408".into()),
            port: Some(RawPort::Number(51820)),
        })
        .unwrap_err();
        assert!(matches!(err, ValidationError::Invalid { field: "endpoint", .. }));
    }

    #[test]
    fn test_endpoint_missing_parts() {
        let missing = |raw: RawEndpoint| parse_endpoint(&raw).unwrap_err();

        assert_eq!(missing(RawEndpoint::Address("1.2.3.4".into())), ValidationError::Missing("endpoint.port"));
        assert_eq!(missing(RawEndpoint::Address("1.2.3.4:".into())), ValidationError::Missing("endpoint.port"));
        assert_eq!(missing(RawEndpoint::Address(":2408".into())), ValidationError::Missing("endpoint.host"));
        assert_eq!(missing(RawEndpoint::Address("2606::1".into())), ValidationError::Missing("endpoint.port"));
        assert_eq!(
            missing(RawEndpoint::Structured { host: None, port: Some(RawPort::Number(1)) }),
            ValidationError::Missing("endpoint.host")
        );
        assert_eq!(
            missing(RawEndpoint::Structured { host: Some("1.2.3.4".into()), port: None }),
            ValidationError::Missing("endpoint.port")
        );
    }

    #[test]
    fn test_endpoint_bad_ports() {
        let bad = |raw: RawEndpoint| matches!(
            parse_endpoint(&raw),
            Err(ValidationError::Invalid { field: "endpoint.port", .. })
        );

        assert!(bad(RawEndpoint::Address("1.2.3.4:abc".into())));
        assert!(bad(RawEndpoint::Address("162.159.192.1:0".into())));
        assert!(bad(RawEndpoint::Structured {
            host: Some("1.2.3.4".into()),
            port: Some(RawPort::Number(70000)),
        }));
    }

    #[test]
    fn test_allowed_ips_shapes() {
        let list = RawAllowedIps::List(vec!["0.0.0.0/0".into(), "::/0".into()]);
        assert_eq!(parse_allowed_ips(&list).unwrap().len(), 2);

        let families = RawAllowedIps::Families { v4: Some("0.0.0.0/0".into()), v6: None };
        assert_eq!(parse_allowed_ips(&families).unwrap()[0].to_string(), "0.0.0.0/0");

        let empty = RawAllowedIps::List(vec![]);
        assert_eq!(
            parse_allowed_ips(&empty),
            Err(ValidationError::Missing("result.config.peers[0].allowed_ips"))
        );

        let bad = RawAllowedIps::List(vec!["0.0.0.0".into()]);
        assert!(matches!(parse_allowed_ips(&bad), Err(ValidationError::Invalid { .. })));
    }
}
