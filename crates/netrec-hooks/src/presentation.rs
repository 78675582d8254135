//! Read-side port presentation and router sync payloads

use std::net::IpAddr;

use netrec_addressing::AddressPolicy;
use netrec_core::{FixedIp, Port, Router, ZERO_SUBNET_ID};
use serde::Serialize;
use tracing::debug;

/// A router with its interface ports, as handed to L3 agents
#[derive(Debug, Clone, Serialize)]
pub struct RouterSyncData {
    pub router: Router,
    pub interfaces: Vec<Port>,
}

/// Present a port the way agents expect to see it.
///
/// A port with no fixed IPs is shown with its link-local address on the
/// all-zero subnet id. Only the returned value changes; nothing is written.
pub fn present_port(policy: &dyn AddressPolicy, mut port: Port) -> Port {
    if !port.fixed_ips.is_empty() {
        return port;
    }
    let Some(mac) = port.mac_address.as_deref() else {
        return port;
    };

    match policy.link_local(mac) {
        Ok(addr) => port
            .fixed_ips
            .push(FixedIp::new(ZERO_SUBNET_ID, IpAddr::V6(addr))),
        Err(e) => debug!("No link-local address for port {}: {}", port.id, e),
    }
    port
}
