//! EUI-64 interface identifiers
//!
//! Modified EUI-64 (RFC 4291, appendix A): the MAC is split in half, `ff:fe`
//! is inserted in the middle and the universal/local bit is inverted.

use std::net::Ipv6Addr;

use ipnetwork::Ipv6Network;
use macaddr::MacAddr6;
use netrec_core::{Error, Result};

/// Universal/local bit of the first MAC octet
const UNIVERSAL_LOCAL_BIT: u8 = 0x02;

const INTERFACE_ID_MASK: u128 = (1 << 64) - 1;

/// Parse a MAC in colon, hyphen or dotted notation
pub fn parse_mac(mac: &str) -> Result<MacAddr6> {
    mac.trim()
        .parse::<MacAddr6>()
        .map_err(|e| Error::invalid_address(format!("invalid MAC address {mac:?}: {e}")))
}

/// 64-bit interface identifier derived from `mac`
pub fn interface_id(mac: &MacAddr6) -> u64 {
    let m = mac.as_bytes();
    u64::from_be_bytes([
        m[0] ^ UNIVERSAL_LOCAL_BIT,
        m[1],
        m[2],
        0xff,
        0xfe,
        m[3],
        m[4],
        m[5],
    ])
}

/// Address for `mac` under an IPv6 prefix of at most 64 bits
pub fn derive_eui64(prefix: &Ipv6Network, mac: &str) -> Result<Ipv6Addr> {
    if prefix.prefix() > 64 {
        return Err(Error::invalid_address(format!(
            "prefix {prefix} is longer than /64, no room for an EUI-64 interface id"
        )));
    }
    let mac = parse_mac(mac)?;
    let upper = u128::from(prefix.network()) & !INTERFACE_ID_MASK;
    Ok(Ipv6Addr::from(upper | u128::from(interface_id(&mac))))
}

/// `fe80::/64` link-local address for `mac`
pub fn derive_link_local(mac: &str) -> Result<Ipv6Addr> {
    let mac = parse_mac(mac)?;
    let upper = u128::from(Ipv6Addr::new(0xfe80, 0, 0, 0, 0, 0, 0, 0));
    Ok(Ipv6Addr::from(upper | u128::from(interface_id(&mac))))
}
