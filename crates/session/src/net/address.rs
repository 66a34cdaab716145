use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AddressFamily {
    #[default]
    Any,
    V4,
    V6,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NetAddress {
    Loopback,
    Broadcast { port: u16 },
    Ip(SocketAddr),
}

impl NetAddress {
    pub fn resolve(text: &str, default_port: u16, family: AddressFamily) -> Option<Self> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        if text.eq_ignore_ascii_case("loopback") {
            return Some(Self::Loopback);
        }

        let candidates: Vec<SocketAddr> = if let Ok(addr) = text.parse::<SocketAddr>() {
            vec![addr]
        } else if let Ok(ip) = text.trim_matches(['[', ']']).parse::<IpAddr>() {
            vec![SocketAddr::new(ip, default_port)]
        } else {
            let (host, port) = split_host_port(text, default_port)?;
            (host, port).to_socket_addrs().ok()?.collect()
        };

        candidates
            .into_iter()
            .find(|addr| match family {
                AddressFamily::Any => true,
                AddressFamily::V4 => addr.is_ipv4(),
                AddressFamily::V6 => addr.is_ipv6(),
            })
            .map(|mut addr| {
                if addr.port() == 0 {
                    addr.set_port(default_port);
                }
                Self::Ip(addr)
            })
    }

    pub fn from_raw(bytes: &[u8], port: u16) -> Option<Self> {
        let ip = match bytes.len() {
            4 => IpAddr::V4(Ipv4Addr::new(bytes[0], bytes[1], bytes[2], bytes[3])),
            16 => {
                let mut octets = [0u8; 16];
                octets.copy_from_slice(bytes);
                IpAddr::V6(Ipv6Addr::from(octets))
            }
            _ => return None,
        };
        Some(Self::Ip(SocketAddr::new(ip, port)))
    }

    pub fn raw_bytes(&self) -> Vec<u8> {
        match self {
            Self::Ip(SocketAddr::V4(addr)) => addr.ip().octets().to_vec(),
            Self::Ip(SocketAddr::V6(addr)) => addr.ip().octets().to_vec(),
            _ => Vec::new(),
        }
    }

    pub fn port(&self) -> u16 {
        match self {
            Self::Loopback => 0,
            Self::Broadcast { port } => *port,
            Self::Ip(addr) => addr.port(),
        }
    }

    pub fn is_ipv6(&self) -> bool {
        matches!(self, Self::Ip(SocketAddr::V6(_)))
    }

    pub fn is_loopback(&self) -> bool {
        match self {
            Self::Loopback => true,
            Self::Ip(addr) => addr.ip().is_loopback(),
            Self::Broadcast { .. } => false,
        }
    }

    pub fn is_lan(&self) -> bool {
        match self {
            Self::Loopback => true,
            Self::Broadcast { .. } => false,
            Self::Ip(SocketAddr::V4(addr)) => {
                let ip = addr.ip();
                ip.is_loopback() || ip.is_private() || ip.is_link_local()
            }
            Self::Ip(SocketAddr::V6(addr)) => {
                let ip = addr.ip();
                let first = ip.segments()[0];
                ip.is_loopback() || (first & 0xfe00) == 0xfc00 || (first & 0xffc0) == 0xfe80
            }
        }
    }

    /// Addresses that cannot hijack a connection attempt skip the challenge exchange.
    pub fn is_local(&self) -> bool {
        self.is_loopback() || self.is_lan()
    }

    pub fn socket_addr(&self) -> Option<SocketAddr> {
        match self {
            Self::Ip(addr) => Some(*addr),
            Self::Broadcast { port } => {
                Some(SocketAddr::new(IpAddr::V4(Ipv4Addr::BROADCAST), *port))
            }
            Self::Loopback => None,
        }
    }
}

impl From<SocketAddr> for NetAddress {
    fn from(addr: SocketAddr) -> Self {
        Self::Ip(addr)
    }
}

impl fmt::Display for NetAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Loopback => write!(f, "loopback"),
            Self::Broadcast { port } => write!(f, "255.255.255.255:{}", port),
            Self::Ip(addr) => write!(f, "{}", addr),
        }
    }
}

fn split_host_port(text: &str, default_port: u16) -> Option<(String, u16)> {
    match text.rsplit_once(':') {
        Some((host, port)) if !host.contains(':') => {
            let port = port.parse().ok()?;
            Some((host.to_string(), if port == 0 { default_port } else { port }))
        }
        _ => Some((text.to_string(), default_port)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_applies_default_port() {
        let addr = NetAddress::resolve("10.0.0.7", 27960, AddressFamily::Any).unwrap();
        assert_eq!(addr.port(), 27960);
        assert_eq!(addr.raw_bytes(), vec![10, 0, 0, 7]);

        let addr = NetAddress::resolve("10.0.0.7:27961", 27960, AddressFamily::Any).unwrap();
        assert_eq!(addr.port(), 27961);
    }

    #[test]
    fn resolve_respects_family() {
        assert!(NetAddress::resolve("10.0.0.7", 1, AddressFamily::V6).is_none());
        let addr = NetAddress::resolve("[::1]:5000", 1, AddressFamily::V6).unwrap();
        assert!(addr.is_ipv6());
        assert_eq!(addr.raw_bytes().len(), 16);
    }

    #[test]
    fn locality() {
        let lan = NetAddress::resolve("192.168.1.20", 1, AddressFamily::Any).unwrap();
        let remote = NetAddress::resolve("203.0.113.9", 1, AddressFamily::Any).unwrap();
        assert!(lan.is_local());
        assert!(!remote.is_local());
        assert!(NetAddress::Loopback.is_local());
    }

    #[test]
    fn equality_includes_port() {
        let a = NetAddress::from_raw(&[1, 2, 3, 4], 100).unwrap();
        let b = NetAddress::from_raw(&[1, 2, 3, 4], 101).unwrap();
        assert_ne!(a, b);
        assert_eq!(a, NetAddress::from_raw(&[1, 2, 3, 4], 100).unwrap());
    }
}
