//! Tenant subnet allocation and sizing policy

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use ipnetwork::{IpNetwork, Ipv6Network};
use netrec_core::{Error, Result};
use rand::Rng;

/// Smallest IPv4 prefix a tenant may request
pub const MIN_TENANT_IPV4_PREFIX: u8 = 24;

/// The only IPv6 prefix length a tenant may request
pub const TENANT_IPV6_PREFIX: u8 = 64;

/// Draws random fixed-size IPv6 subnets out of a tenant range
#[derive(Debug, Clone)]
pub struct Ipv6SubnetGenerator {
    range: Ipv6Network,
    prefix_len: u8,
}

impl Ipv6SubnetGenerator {
    /// `prefix_len` above 128 is clamped to 128
    pub fn new(range: Ipv6Network, prefix_len: u8) -> Result<Self> {
        let prefix_len = prefix_len.min(128);
        if prefix_len < range.prefix() {
            return Err(Error::invalid_address(format!(
                "prefix length /{} must be larger than the range prefix /{}",
                prefix_len,
                range.prefix()
            )));
        }
        Ok(Self { range, prefix_len })
    }

    pub fn range(&self) -> &Ipv6Network {
        &self.range
    }

    pub fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    /// Number of distinct subnets, saturating at `u128::MAX`
    pub fn capacity(&self) -> u128 {
        let bits = u32::from(self.prefix_len - self.range.prefix());
        1u128.checked_shl(bits).unwrap_or(u128::MAX)
    }

    /// One random candidate
    pub fn candidate<R: Rng + ?Sized>(&self, rng: &mut R) -> Ipv6Network {
        let bits = u32::from(self.prefix_len - self.range.prefix());
        let host_bits = 128 - u32::from(self.prefix_len);

        let index: u128 = match bits {
            0 => 0,
            128 => rng.gen(),
            _ => rng.gen_range(0..(1u128 << bits)),
        };

        let base = u128::from(self.range.network());
        let offset = index.checked_shl(host_bits).unwrap_or(0);
        Ipv6Network::new(Ipv6Addr::from(base | offset), self.prefix_len)
            .expect("prefix length bounded by construction")
    }
}

/// Reject tenant subnets that are too large (IPv4) or not a /64 (IPv6)
pub fn check_subnet_cidr(cidr: &IpNetwork) -> Result<()> {
    match cidr {
        IpNetwork::V4(net) if net.prefix() < MIN_TENANT_IPV4_PREFIX => {
            Err(Error::policy("requested subnet is too large"))
        }
        IpNetwork::V6(net) if net.prefix() != TENANT_IPV6_PREFIX => {
            Err(Error::policy("requested subnet is not a valid IPv6 /64"))
        }
        _ => Ok(()),
    }
}

/// First host address of `cidr`, if the network has room for one
pub fn default_gateway(cidr: &IpNetwork) -> Option<IpAddr> {
    match cidr {
        IpNetwork::V4(net) if net.prefix() <= 30 => {
            Some(IpAddr::V4(Ipv4Addr::from(u32::from(net.network()) + 1)))
        }
        IpNetwork::V6(net) if net.prefix() <= 126 => {
            Some(IpAddr::V6(Ipv6Addr::from(u128::from(net.network()) + 1)))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn range() -> Ipv6Network {
        "fdd6:a1fa:cfa8::/48".parse().unwrap()
    }

    #[test]
    fn test_candidates_stay_in_range() {
        let generator = Ipv6SubnetGenerator::new(range(), 64).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..256 {
            let candidate = generator.candidate(&mut rng);
            assert_eq!(candidate.prefix(), 64);
            assert!(range().contains(candidate.network()));
            // host bits are zero
            assert_eq!(u128::from(candidate.ip()) & ((1u128 << 64) - 1), 0);
        }
    }

    #[test]
    fn test_prefix_shorter_than_range_rejected() {
        assert!(matches!(
            Ipv6SubnetGenerator::new(range(), 40),
            Err(Error::InvalidAddressInput(_))
        ));
    }

    #[test]
    fn test_prefix_clamped_and_capacity() {
        let generator = Ipv6SubnetGenerator::new(range(), 200).unwrap();
        assert_eq!(generator.prefix_len(), 128);

        let generator = Ipv6SubnetGenerator::new(range(), 64).unwrap();
        assert_eq!(generator.capacity(), 1 << 16);

        let generator = Ipv6SubnetGenerator::new(range(), 48).unwrap();
        assert_eq!(generator.capacity(), 1);
        assert_eq!(generator.candidate(&mut rand::thread_rng()), range());
    }

    #[test]
    fn test_cidr_policy() {
        assert!(check_subnet_cidr(&"10.0.0.0/24".parse().unwrap()).is_ok());
        assert!(check_subnet_cidr(&"10.0.0.0/28".parse().unwrap()).is_ok());
        assert!(check_subnet_cidr(&"fdd6:a1fa:cfa8:1::/64".parse().unwrap()).is_ok());
        assert!(matches!(
            check_subnet_cidr(&"10.0.0.0/16".parse().unwrap()),
            Err(Error::PolicyViolation(_))
        ));
        assert!(matches!(
            check_subnet_cidr(&"fdd6:a1fa:cfa8::/56".parse().unwrap()),
            Err(Error::PolicyViolation(_))
        ));
    }

    #[test]
    fn test_default_gateway() {
        assert_eq!(
            default_gateway(&"10.0.0.0/24".parse().unwrap()),
            Some("10.0.0.1".parse().unwrap())
        );
        assert_eq!(
            default_gateway(&"fdd6:a1fa:cfa8:1::/64".parse().unwrap()),
            Some("fdd6:a1fa:cfa8:1::1".parse().unwrap())
        );
        assert_eq!(default_gateway(&"10.0.0.0/31".parse().unwrap()), None);
    }
}
