//! IPv4 endpoint as carried on the wire.

use std::fmt;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::str::FromStr;

use crate::WireError;

/// An IPv4 address plus port.
///
/// On the wire this is 48 bits: the 32-bit network number followed by
/// the 16-bit port. `net_num` is in host order, so `10.0.0.1` is
/// `0x0A00_0001`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(try_from = "String", into = "String")
)]
pub struct IpAddress {
    pub net_num: u32,
    pub port: u16,
}

impl IpAddress {
    pub fn new(ip: Ipv4Addr, port: u16) -> Self {
        Self {
            net_num: u32::from(ip),
            port,
        }
    }

    /// `0.0.0.0:port`.
    pub fn any(port: u16) -> Self {
        Self { net_num: 0, port }
    }

    pub fn ip(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.net_num)
    }

    /// `true` for the unspecified address, whatever the port.
    pub fn is_any(&self) -> bool {
        self.net_num == 0
    }

    /// Same host, ignoring the port.
    pub fn same_ip(&self, other: &IpAddress) -> bool {
        self.net_num == other.net_num
    }

    /// A copy with a different port.
    pub fn with_port(&self, port: u16) -> Self {
        Self {
            net_num: self.net_num,
            port,
        }
    }

    pub fn to_socket_addr(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(self.ip(), self.port))
    }
}

impl fmt::Display for IpAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip(), self.port)
    }
}

impl From<SocketAddrV4> for IpAddress {
    fn from(addr: SocketAddrV4) -> Self {
        Self::new(*addr.ip(), addr.port())
    }
}

impl TryFrom<SocketAddr> for IpAddress {
    type Error = WireError;

    fn try_from(addr: SocketAddr) -> Result<Self, Self::Error> {
        match addr {
            SocketAddr::V4(v4) => Ok(v4.into()),
            SocketAddr::V6(v6) => match v6.ip().to_ipv4_mapped() {
                Some(ip) => Ok(Self::new(ip, v6.port())),
                None => Err(WireError::UnsupportedAddress(addr)),
            },
        }
    }
}

impl FromStr for IpAddress {
    type Err = WireError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<SocketAddrV4>()
            .map(Self::from)
            .map_err(|_| WireError::InvalidAddress(s.to_string()))
    }
}

impl TryFrom<String> for IpAddress {
    type Error = WireError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<IpAddress> for String {
    fn from(addr: IpAddress) -> Self {
        addr.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display_roundtrip() {
        let addr: IpAddress = "10.0.0.1:28000".parse().unwrap();
        assert_eq!(addr.net_num, 0x0A00_0001);
        assert_eq!(addr.port, 28000);
        assert_eq!(addr.to_string(), "10.0.0.1:28000");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            "not-an-address".parse::<IpAddress>(),
            Err(WireError::InvalidAddress(_))
        ));
        assert!("10.0.0.1".parse::<IpAddress>().is_err());
    }

    #[test]
    fn test_any_and_same_ip() {
        let any = IpAddress::any(5);
        assert!(any.is_any());
        let a: IpAddress = "1.2.3.4:1".parse().unwrap();
        let b = a.with_port(2);
        assert!(a.same_ip(&b));
        assert_ne!(a, b);
        assert!(!a.is_any());
    }

    #[test]
    fn test_try_from_v6_mapped_and_unmapped() {
        let mapped: SocketAddr = "[::ffff:1.2.3.4]:80".parse().unwrap();
        let addr = IpAddress::try_from(mapped).unwrap();
        assert_eq!(addr.to_string(), "1.2.3.4:80");

        let v6: SocketAddr = "[2001:db8::1]:80".parse().unwrap();
        assert!(matches!(
            IpAddress::try_from(v6),
            Err(WireError::UnsupportedAddress(_))
        ));
    }
}
