// src/registry/instance.rs
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;
use url::Url;

/// Logical name a caller forwards to, e.g. `microservice1`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceName(String);

impl ServiceName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for ServiceName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ServiceName {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl From<String> for ServiceName {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl fmt::Display for ServiceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One concrete backend. Host is kept without IPv6 brackets.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct InstanceAddress {
    host: String,
    port: u16,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AddressParseError {
    #[error("instance address is empty")]
    Empty,

    #[error("missing port in instance address '{0}'")]
    MissingPort(String),

    #[error("invalid port in instance address '{0}'")]
    InvalidPort(String),

    #[error("invalid instance URL '{0}': {1}")]
    InvalidUrl(String, String),
}

impl InstanceAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        let host = host.into();
        let host = host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .map(str::to_string)
            .unwrap_or(host);
        Self { host, port }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// `host:port` form usable as a URI authority.
    pub fn authority(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    fn parse_url(s: &str) -> Result<Self, AddressParseError> {
        let url = Url::parse(s)
            .map_err(|e| AddressParseError::InvalidUrl(s.to_string(), e.to_string()))?;
        let host = url
            .host_str()
            .ok_or_else(|| AddressParseError::InvalidUrl(s.to_string(), "no host".into()))?;
        let port = url
            .port_or_known_default()
            .ok_or_else(|| AddressParseError::MissingPort(s.to_string()))?;
        Ok(Self::new(host, port))
    }
}

impl FromStr for InstanceAddress {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(AddressParseError::Empty);
        }
        if s.contains("://") {
            return Self::parse_url(s);
        }

        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| AddressParseError::MissingPort(s.to_string()))?;
        // A bare IPv6 literal without brackets has no unambiguous port.
        if host.contains(':') && !host.starts_with('[') {
            return Err(AddressParseError::MissingPort(s.to_string()));
        }
        if host.is_empty() {
            return Err(AddressParseError::Empty);
        }
        let port = port
            .parse::<u16>()
            .map_err(|_| AddressParseError::InvalidPort(s.to_string()))?;
        Ok(Self::new(host, port))
    }
}

impl TryFrom<String> for InstanceAddress {
    type Error = AddressParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<InstanceAddress> for String {
    fn from(addr: InstanceAddress) -> Self {
        addr.authority()
    }
}

impl fmt::Display for InstanceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.authority())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_host_and_port() {
        let addr: InstanceAddress = "10.0.0.7:8001".parse().unwrap();
        assert_eq!(addr.host(), "10.0.0.7");
        assert_eq!(addr.port(), 8001);
        assert_eq!(addr.to_string(), "10.0.0.7:8001");
    }

    #[test]
    fn parses_bracketed_ipv6() {
        let addr: InstanceAddress = "[::1]:9000".parse().unwrap();
        assert_eq!(addr.host(), "::1");
        assert_eq!(addr.authority(), "[::1]:9000");
    }

    #[test]
    fn parses_url_with_default_port() {
        let addr: InstanceAddress = "http://backend.local".parse().unwrap();
        assert_eq!(addr, InstanceAddress::new("backend.local", 80));

        let addr: InstanceAddress = "https://backend.local:8443/ignored".parse().unwrap();
        assert_eq!(addr, InstanceAddress::new("backend.local", 8443));
    }

    #[test]
    fn rejects_bad_addresses() {
        assert_eq!("".parse::<InstanceAddress>(), Err(AddressParseError::Empty));
        assert!(matches!(
            "localhost".parse::<InstanceAddress>(),
            Err(AddressParseError::MissingPort(_))
        ));
        assert!(matches!(
            "localhost:http".parse::<InstanceAddress>(),
            Err(AddressParseError::InvalidPort(_))
        ));
        assert!(matches!(
            "::1".parse::<InstanceAddress>(),
            Err(AddressParseError::MissingPort(_))
        ));
    }

    #[test]
    fn serde_uses_string_form() {
        let addr: InstanceAddress = serde_json::from_str("\"127.0.0.1:8080\"").unwrap();
        assert_eq!(addr, InstanceAddress::new("127.0.0.1", 8080));
        assert_eq!(serde_json::to_string(&addr).unwrap(), "\"127.0.0.1:8080\"");
    }
}
