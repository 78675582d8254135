//! Address policy: which extra IPv6 addresses a port must be allowed to use

use std::collections::BTreeSet;
use std::fmt;
use std::net::{IpAddr, Ipv6Addr};

use ipnetwork::{IpNetwork, Ipv6Network};
use netrec_core::Result;

use crate::eui64::{derive_eui64, derive_link_local};

/// Prefix length covering SLAAC temporary addresses
const TEMPORARY_ADDRESS_PREFIX: u8 = 64;

/// Pluggable address derivation, chosen when the reconciler is built
pub trait AddressPolicy: Send + Sync + fmt::Debug {
    /// Link-local address for `mac`
    fn link_local(&self, mac: &str) -> Result<Ipv6Addr>;

    /// Stateless address for `mac` inside `prefix`
    fn interface_address(&self, prefix: &Ipv6Network, mac: &str) -> Result<Ipv6Addr>;

    /// Addresses missing from `existing` that a port with `mac` must be
    /// allowed to source traffic from
    fn special_addresses(&self, existing: &[IpNetwork], mac: &str)
        -> Result<BTreeSet<Ipv6Network>>;
}

/// EUI-64 derivation with temporary-address ranges inside the tenant range
#[derive(Debug, Clone)]
pub struct Eui64Policy {
    tenant_range: Ipv6Network,
}

impl Eui64Policy {
    pub fn new(tenant_range: Ipv6Network) -> Self {
        Self { tenant_range }
    }

    pub fn tenant_range(&self) -> &Ipv6Network {
        &self.tenant_range
    }
}

impl AddressPolicy for Eui64Policy {
    fn link_local(&self, mac: &str) -> Result<Ipv6Addr> {
        derive_link_local(mac)
    }

    fn interface_address(&self, prefix: &Ipv6Network, mac: &str) -> Result<Ipv6Addr> {
        derive_eui64(prefix, mac)
    }

    fn special_addresses(
        &self,
        existing: &[IpNetwork],
        mac: &str,
    ) -> Result<BTreeSet<Ipv6Network>> {
        derive_special_addresses(existing.iter().copied(), mac, &self.tenant_range)
    }
}

/// Link-local host address for `mac`, plus the enclosing /64 of every
/// existing IPv6 entry inside `tenant_range`, minus whatever `existing`
/// already holds. IPv4 entries are ignored.
///
/// Folding the result back into `existing` yields an empty set.
pub fn derive_special_addresses<I>(
    existing: I,
    mac: &str,
    tenant_range: &Ipv6Network,
) -> Result<BTreeSet<Ipv6Network>>
where
    I: IntoIterator<Item = IpNetwork>,
{
    let current: BTreeSet<Ipv6Network> = existing
        .into_iter()
        .filter_map(|net| match net {
            IpNetwork::V6(v6) => Some(v6),
            IpNetwork::V4(_) => None,
        })
        .collect();

    let mut special = BTreeSet::new();
    special.insert(host_network(derive_link_local(mac)?));

    for net in &current {
        if tenant_range.contains(net.ip()) {
            special.insert(enclosing_network(net.ip(), TEMPORARY_ADDRESS_PREFIX));
        }
    }

    Ok(special.difference(&current).copied().collect())
}

/// `addr/128`
pub fn host_network(addr: Ipv6Addr) -> Ipv6Network {
    Ipv6Network::from(addr)
}

/// `IpAddr` as a host network (`/32` or `/128`)
pub fn host_ip_network(addr: IpAddr) -> IpNetwork {
    IpNetwork::from(addr)
}

fn enclosing_network(addr: Ipv6Addr, prefix: u8) -> Ipv6Network {
    let mask = u128::MAX.checked_shl(u32::from(128 - prefix)).unwrap_or(0);
    let network = Ipv6Addr::from(u128::from(addr) & mask);
    // prefix is a constant <= 128
    Ipv6Network::new(network, prefix).expect("valid IPv6 prefix length")
}
