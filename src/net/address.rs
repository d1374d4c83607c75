//! Network address literals.
//!
//! Grammar: `a.b.c.d:port` for IPv4, `[hex:hex:...]:port` for IPv6
//! (brackets mandatory), with an optional `:tls` suffix. Lists split on
//! commas. Display produces the canonical form: IPv6 compressed, TLS
//! suffix preserved.

use crate::error::{Error, ErrorKind, Result};
use core::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

/// An endpoint literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NetworkAddress {
    /// Host address.
    pub ip: IpAddr,
    /// TCP/UDP port.
    pub port: u16,
    /// Whether the endpoint speaks TLS.
    pub tls: bool,
}

fn invalid() -> Error {
    Error::new(ErrorKind::ConnectionStringInvalid)
}

impl NetworkAddress {
    /// Builds an address from parts.
    #[must_use]
    pub const fn new(ip: IpAddr, port: u16, tls: bool) -> Self {
        Self { ip, port, tls }
    }

    /// Parses one literal.
    pub fn parse(text: &str) -> Result<Self> {
        if text.is_empty() {
            return Err(invalid());
        }
        let (body, tls) = match text.strip_suffix(":tls") {
            Some(body) => (body, true),
            None => (text, false),
        };

        if let Some(rest) = body.strip_prefix('[') {
            // "[ip]:port"
            let (ip_text, port_text) = rest.split_once(']').ok_or_else(invalid)?;
            let port_text = port_text.strip_prefix(':').ok_or_else(invalid)?;
            let ip = Ipv6Addr::from_str(ip_text).map_err(|_| invalid())?;
            let port = port_text.parse().map_err(|_| invalid())?;
            return Ok(Self::new(IpAddr::V6(ip), port, tls));
        }

        let (ip_text, port_text) = body.rsplit_once(':').ok_or_else(invalid)?;
        let ip = Ipv4Addr::from_str(ip_text).map_err(|_| invalid())?;
        let port = port_text.parse().map_err(|_| invalid())?;
        Ok(Self::new(IpAddr::V4(ip), port, tls))
    }

    /// Parses a comma-separated list of literals.
    pub fn parse_list(text: &str) -> Result<Vec<Self>> {
        text.split(',').map(Self::parse).collect()
    }

    /// True for an IPv6 endpoint.
    #[must_use]
    pub const fn is_v6(&self) -> bool {
        matches!(self.ip, IpAddr::V6(_))
    }

    /// True for a TLS endpoint.
    #[must_use]
    pub const fn is_tls(&self) -> bool {
        self.tls
    }
}

impl fmt::Display for NetworkAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.ip {
            IpAddr::V4(ip) => write!(f, "{ip}:{}", self.port)?,
            IpAddr::V6(ip) => write!(f, "[{ip}]:{}", self.port)?,
        }
        if self.tls {
            write!(f, ":tls")?;
        }
        Ok(())
    }
}

impl FromStr for NetworkAddress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn v4_round_trip() {
        let addr = NetworkAddress::parse("10.0.0.1:4500").unwrap();
        assert!(!addr.is_v6());
        assert!(!addr.is_tls());
        assert_eq!(addr.to_string(), "10.0.0.1:4500");
    }

    #[test]
    fn v4_tls_suffix() {
        let addr = NetworkAddress::parse("127.0.0.1:80:tls").unwrap();
        assert!(addr.is_tls());
        assert_eq!(addr.to_string(), "127.0.0.1:80:tls");
    }

    #[test]
    fn v6_is_canonicalized() {
        let addr =
            NetworkAddress::parse("[2001:0db8:85a3:0000:0000:8a2e:0370:7334]:4800").unwrap();
        assert!(addr.is_v6());
        assert!(!addr.is_tls());
        assert_eq!(addr.to_string(), "[2001:db8:85a3::8a2e:370:7334]:4800");
    }

    #[test]
    fn v6_tls_round_trip() {
        let addr =
            NetworkAddress::parse("[2001:0db8:85a3:0000:0000:8a2e:0370:7334]:4800:tls").unwrap();
        assert!(addr.is_v6());
        assert!(addr.is_tls());
        assert_eq!(addr.to_string(), "[2001:db8:85a3::8a2e:370:7334]:4800:tls");
    }

    #[test]
    fn loopback_v6() {
        assert_eq!(
            NetworkAddress::parse("[::1]:4800").unwrap().to_string(),
            "[::1]:4800"
        );
    }

    #[test]
    fn rejects_malformed_literals() {
        for bad in [
            "",
            "1.2.3.4",
            "1.2.3:80",
            "1.2.3.4.5:80",
            "1.2.3.256:80",
            "1.2.3.4:notaport",
            "2001:db8::1:80",
            "[2001:db8::1]80",
            "[not-an-ip]:80",
        ] {
            let err = NetworkAddress::parse(bad).unwrap_err();
            assert_eq!(
                err.kind(),
                ErrorKind::ConnectionStringInvalid,
                "literal {bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn parse_list_splits_on_commas() {
        let list = NetworkAddress::parse_list("10.0.0.1:1,10.0.0.2:2:tls").unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].to_string(), "10.0.0.1:1");
        assert_eq!(list[1].to_string(), "10.0.0.2:2:tls");
        assert!(NetworkAddress::parse_list("10.0.0.1:1,").is_err());
    }
}
