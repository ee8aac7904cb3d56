//! warpgen Network Layer
//!
//! Transport primitives used to talk to the registration service and to
//! discover a reachable tunnel endpoint:
//! 1. `HttpClient`: one-shot JSON requests over rustls (or plain HTTP)
//! 2. `DnsResolver`: hickory lookups with a small positive cache
//! 3. `TcpProbe`: short-timeout TCP connect used as a reachability check

mod client;
mod dns;
mod probe;

pub use client::{HttpClient, HttpClientConfig, HttpError, Response};
pub use dns::{DnsConfig, DnsError, DnsResolver, HostResolver};
pub use probe::{ReachabilityProbe, TcpProbe};

pub use hyper::{Method, StatusCode};
