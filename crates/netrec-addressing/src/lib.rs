//! netrec-addressing: IPv6 address derivation and subnet policy
//!
//! Pure functions, no I/O:
//! - EUI-64 link-local and stateless addresses from a MAC
//! - Special addresses a port must be allowed to use
//! - Random tenant IPv6 subnet candidates
//! - Tenant subnet sizing policy

pub mod eui64;
pub mod policy;
pub mod subnet;

pub use eui64::{derive_eui64, derive_link_local, parse_mac};
pub use policy::{derive_special_addresses, host_ip_network, AddressPolicy, Eui64Policy};
pub use subnet::{check_subnet_cidr, default_gateway, Ipv6SubnetGenerator};
