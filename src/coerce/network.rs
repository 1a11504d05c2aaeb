//! Textual grammar checks for inet, cidr, macaddr and macaddr8.

use std::net::IpAddr;

/// `addr[/prefix]`; the prefix must fit the address family.
pub fn is_inet(s: &str) -> bool {
    parse_ip_with_prefix(s).is_some()
}

/// Like inet, but host bits past the prefix must be zero. IPv4 may be abbreviated
/// (`10/8`, `172.16/12`), missing octets being zero.
pub fn is_cidr(s: &str) -> bool {
    let Some((addr, prefix)) = parse_ip_with_prefix(s).or_else(|| parse_abbreviated_v4(s)) else {
        return false;
    };
    let Some(prefix) = prefix else {
        return true;
    };
    match addr {
        IpAddr::V4(v4) => {
            let bits = u32::from(v4);
            let mask = if prefix == 0 { 0 } else { u32::MAX << (32 - prefix) };
            bits & !mask == 0
        }
        IpAddr::V6(v6) => {
            let bits = u128::from(v6);
            let mask = if prefix == 0 { 0 } else { u128::MAX << (128 - prefix) };
            bits & !mask == 0
        }
    }
}

fn parse_ip_with_prefix(s: &str) -> Option<(IpAddr, Option<u32>)> {
    let s = s.trim();
    let (addr, prefix) = match s.split_once('/') {
        Some((a, p)) => (a, Some(p.parse::<u32>().ok()?)),
        None => (s, None),
    };
    let addr: IpAddr = addr.parse().ok()?;
    let max = if addr.is_ipv4() { 32 } else { 128 };
    if prefix.map(|p| p > max).unwrap_or(false) {
        return None;
    }
    Some((addr, prefix))
}

fn parse_abbreviated_v4(s: &str) -> Option<(IpAddr, Option<u32>)> {
    let s = s.trim();
    let (addr, prefix) = match s.split_once('/') {
        Some((a, p)) => (a, Some(p.parse::<u32>().ok()?)),
        None => (s, None),
    };
    let octets = addr.split('.').map(|o| o.parse::<u8>().ok()).collect::<Option<Vec<u8>>>()?;
    if octets.is_empty() || octets.len() > 3 || prefix.map(|p| p > 32).unwrap_or(false) {
        return None;
    }
    let mut full = [0u8; 4];
    full[..octets.len()].copy_from_slice(&octets);
    Some((IpAddr::from(full), prefix))
}

/// Hex digits of a MAC address written as `aa:bb:..`, `aa-bb-..`, `aabb.ccdd.eeff` or bare hex.
fn mac_digits(s: &str) -> Option<String> {
    let s = s.trim();
    let sep = s.chars().find(|c| matches!(c, ':' | '-' | '.'));
    let groups: Vec<&str> = match sep {
        Some(sep) => s.split(sep).collect(),
        None => vec![s],
    };
    let group_len = match sep {
        Some('.') => 4,
        Some(_) => 2,
        None => s.len(),
    };
    if groups.iter().any(|g| g.len() != group_len || !g.chars().all(|c| c.is_ascii_hexdigit())) {
        return None;
    }
    Some(groups.concat())
}

pub fn is_macaddr(s: &str) -> bool {
    mac_digits(s).map(|d| d.len() == 12).unwrap_or(false)
}

/// macaddr8 also accepts 6-byte input (PostgreSQL pads it).
pub fn is_macaddr8(s: &str) -> bool {
    mac_digits(s).map(|d| d.len() == 12 || d.len() == 16).unwrap_or(false)
}
