use crate::core::domain::error::{IcsError, IcsResult};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

/// Address family used to order a VM's candidate IPs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IpFamily {
    Ipv4,
    Ipv6,
}

impl IpFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            IpFamily::Ipv4 => "ipv4",
            IpFamily::Ipv6 => "ipv6",
        }
    }

    /// Returns true if the address belongs to this family.
    ///
    /// IPv4-mapped IPv6 addresses count as IPv4.
    pub fn matches(&self, ip: &IpAddr) -> bool {
        match (self, ip) {
            (IpFamily::Ipv4, IpAddr::V4(_)) => true,
            (IpFamily::Ipv4, IpAddr::V6(v6)) => v6.to_ipv4_mapped().is_some(),
            (IpFamily::Ipv6, IpAddr::V6(v6)) => v6.to_ipv4_mapped().is_none(),
            (IpFamily::Ipv6, IpAddr::V4(_)) => false,
        }
    }

    /// Parses a priority list such as `ipv6, ipv4`.
    ///
    /// Blank entries are skipped and an empty list falls back to IPv4 only.
    ///
    /// # Errors
    /// Returns `InvalidConfiguration` for any unknown family token.
    pub fn parse_priority<S: AsRef<str>>(tokens: &[S]) -> IcsResult<Vec<IpFamily>> {
        let mut families = Vec::new();
        for token in tokens {
            let token = token.as_ref().trim();
            if token.is_empty() {
                continue;
            }
            let family = token.parse::<IpFamily>()?;
            if !families.contains(&family) {
                families.push(family);
            }
        }
        if families.is_empty() {
            families.push(IpFamily::Ipv4);
        }
        Ok(families)
    }
}

impl FromStr for IpFamily {
    type Err = IcsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ipv4" => Ok(IpFamily::Ipv4),
            "ipv6" => Ok(IpFamily::Ipv6),
            other => Err(IcsError::InvalidConfiguration(format!(
                "invalid IP family: '{}'",
                other
            ))),
        }
    }
}

impl std::fmt::Display for IpFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn is_local_v4(ip: &Ipv4Addr) -> bool {
    let link_local_multicast = ip.octets()[..3] == [224, 0, 0];
    ip.is_loopback() || ip.is_link_local() || link_local_multicast
}

fn is_local_v6(ip: &Ipv6Addr) -> bool {
    if let Some(v4) = ip.to_ipv4_mapped() {
        return is_local_v4(&v4);
    }
    let first = ip.segments()[0];
    let link_local_unicast = first & 0xffc0 == 0xfe80;
    let link_local_multicast = first & 0xff0f == 0xff02;
    ip.is_loopback() || link_local_unicast || link_local_multicast
}

/// Returns true when the address is only reachable from the VM itself.
///
/// Unparseable input counts as local.
pub fn is_local_only(raw: &str) -> bool {
    match raw.trim().parse::<IpAddr>() {
        Ok(IpAddr::V4(v4)) => is_local_v4(&v4),
        Ok(IpAddr::V6(v6)) => is_local_v6(&v6),
        Err(_) => true,
    }
}

/// Keeps the routable addresses of `family`, in input order.
pub fn ips_from_family<S: AsRef<str>>(family: IpFamily, ips: &[S]) -> Vec<IpAddr> {
    ips.iter()
        .map(|raw| raw.as_ref().trim())
        .filter(|raw| !is_local_only(raw))
        .filter_map(|raw| raw.parse::<IpAddr>().ok())
        .filter(|ip| family.matches(ip))
        .collect()
}
