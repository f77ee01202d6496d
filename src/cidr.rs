//! IPv4 address-range classification and containment.
//!
//! Firewall rules and operator configuration express ranges in prefix
//! notation. "Internal" means the range lies entirely inside the reserved
//! private blocks; anything else is treated as Internet-routable for the
//! purposes of the reachability graph.

use std::net::Ipv4Addr;
use std::str::FromStr;

use ipnetwork::Ipv4Network;

use crate::errors::CidrError;

/// The reserved private blocks (RFC 1918).
fn private_blocks() -> [Ipv4Network; 3] {
    [
        Ipv4Network::new(Ipv4Addr::new(10, 0, 0, 0), 8).unwrap(),
        Ipv4Network::new(Ipv4Addr::new(172, 16, 0, 0), 12).unwrap(),
        Ipv4Network::new(Ipv4Addr::new(192, 168, 0, 0), 16).unwrap(),
    ]
}

/// Ranges a firewall rule cannot meaningfully restrict: loopback,
/// link-local, multicast and limited broadcast. Used only to suppress
/// noise in reporting, never to alter reachability.
fn unblockable_blocks() -> [Ipv4Network; 4] {
    [
        Ipv4Network::new(Ipv4Addr::new(127, 0, 0, 0), 8).unwrap(),
        Ipv4Network::new(Ipv4Addr::new(169, 254, 0, 0), 16).unwrap(),
        Ipv4Network::new(Ipv4Addr::new(224, 0, 0, 0), 4).unwrap(),
        Ipv4Network::new(Ipv4Addr::new(255, 255, 255, 255), 32).unwrap(),
    ]
}

/// Parse a prefix-notated range. Bare addresses parse as /32.
pub fn parse(cidr: &str) -> Result<Ipv4Network, CidrError> {
    Ipv4Network::from_str(cidr.trim()).map_err(|_| CidrError::Invalid(cidr.to_string()))
}

/// True when `outer` wholly contains `inner`.
pub fn contains(outer: &Ipv4Network, inner: &Ipv4Network) -> bool {
    outer.prefix() <= inner.prefix() && outer.contains(inner.network())
}

/// True when the two ranges share any address.
pub fn overlaps(a: &Ipv4Network, b: &Ipv4Network) -> bool {
    contains(a, b) || contains(b, a)
}

/// True when `addr` falls inside `range`.
pub fn contains_ip(range: &Ipv4Network, addr: &Ipv4Addr) -> bool {
    range.contains(*addr)
}

/// False only when the range lies entirely within the private blocks.
pub fn is_external(range: &Ipv4Network) -> bool {
    !private_blocks().iter().any(|block| contains(block, range))
}

pub fn is_unblockable(range: &Ipv4Network) -> bool {
    unblockable_blocks()
        .iter()
        .any(|block| contains(block, range))
}

/// The unrestricted "any address" range.
pub fn is_any(range: &Ipv4Network) -> bool {
    range.prefix() == 0
}

/// Number of addresses covered by the range.
pub fn size(range: &Ipv4Network) -> u64 {
    1u64 << (32 - range.prefix())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn net(s: &str) -> Ipv4Network {
        parse(s).unwrap()
    }

    #[test]
    fn private_ranges_are_internal() {
        assert!(!is_external(&net("10.0.0.0/16")));
        assert!(!is_external(&net("172.16.5.0/24")));
        assert!(!is_external(&net("192.168.1.1/32")));
    }

    #[test]
    fn public_ranges_are_external() {
        assert!(is_external(&net("0.0.0.0/0")));
        assert!(is_external(&net("8.8.8.8/32")));
        // Straddles the private boundary, so not entirely private
        assert!(is_external(&net("172.0.0.0/8")));
    }

    #[test]
    fn containment_is_directional() {
        let wide = net("10.0.0.0/8");
        let narrow = net("10.1.0.0/16");
        assert!(contains(&wide, &narrow));
        assert!(!contains(&narrow, &wide));
    }

    #[test]
    fn overlap_in_either_direction() {
        // A network CIDR that is a strict subset of a rule's range still counts
        assert!(overlaps(&net("10.0.0.0/8"), &net("10.0.0.0/16")));
        assert!(overlaps(&net("10.0.0.0/16"), &net("10.0.0.0/8")));
        assert!(!overlaps(&net("10.0.0.0/16"), &net("10.1.0.0/16")));
    }

    #[test]
    fn ip_containment() {
        assert!(contains_ip(&net("10.0.0.0/16"), &"10.0.0.5".parse().unwrap()));
        assert!(!contains_ip(&net("10.0.0.0/24"), &"10.0.1.5".parse().unwrap()));
    }

    #[test]
    fn unblockable_ranges() {
        assert!(is_unblockable(&net("169.254.169.254/32")));
        assert!(is_unblockable(&net("224.0.0.0/4")));
        assert!(!is_unblockable(&net("0.0.0.0/0")));
        assert!(!is_unblockable(&net("8.8.8.8/32")));
    }

    #[test]
    fn any_range() {
        assert!(is_any(&net("0.0.0.0/0")));
        assert!(!is_any(&net("10.0.0.0/8")));
    }

    #[test]
    fn range_sizes() {
        assert_eq!(size(&net("1.1.1.1/32")), 1);
        assert_eq!(size(&net("1.1.1.0/24")), 256);
        assert_eq!(size(&net("0.0.0.0/0")), 1u64 << 32);
    }

    #[test]
    fn malformed_cidr_is_an_error() {
        assert!(parse("not-a-cidr").is_err());
        assert!(parse("300.0.0.1/8").is_err());
    }
}
