//! Endpoint addresses.
//!
//! Accepts `"<network>://<target>"` (`unix:///tmp/app.sock`,
//! `tcp://127.0.0.1:7000`) or a bare filesystem path, which means a Unix
//! domain socket.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;

/// Errors from [`Address::parse`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    /// Nothing to connect to.
    #[error("address is empty")]
    Empty,
    /// Scheme other than `unix` or `tcp`.
    #[error("unsupported network type '{0}'")]
    UnsupportedNetwork(String),
    /// Scheme present but nothing after `://`.
    #[error("address '{0}' has no target after the scheme")]
    MissingTarget(String),
}

/// A socket endpoint the client can dial and the echo server can bind.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Address {
    /// Unix domain socket at a filesystem path.
    Unix(PathBuf),
    /// TCP endpoint as `host:port`.
    Tcp(String),
}

impl Address {
    /// Parse an address string.
    pub fn parse(s: &str) -> Result<Self, AddressError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(AddressError::Empty);
        }

        let Some((network, target)) = s.split_once("://") else {
            return Ok(Self::Unix(PathBuf::from(s)));
        };
        if target.is_empty() {
            return Err(AddressError::MissingTarget(s.to_string()));
        }

        match network {
            "unix" => Ok(Self::Unix(PathBuf::from(target))),
            "tcp" | "tcp4" | "tcp6" => Ok(Self::Tcp(target.to_string())),
            other => Err(AddressError::UnsupportedNetwork(other.to_string())),
        }
    }

    /// The network type, as it appears in the scheme.
    pub fn network(&self) -> &'static str {
        match self {
            Self::Unix(_) => "unix",
            Self::Tcp(_) => "tcp",
        }
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unix(path) => write!(f, "unix://{}", path.display()),
            Self::Tcp(host) => write!(f, "tcp://{host}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_path_is_unix() {
        assert_eq!(
            Address::parse("/tmp/codesocket.tmp").unwrap(),
            Address::Unix(PathBuf::from("/tmp/codesocket.tmp"))
        );
    }

    #[test]
    fn test_unix_scheme_keeps_absolute_path() {
        let addr: Address = "unix:///tmp/codesocket.tmp".parse().unwrap();
        assert_eq!(addr, Address::Unix(PathBuf::from("/tmp/codesocket.tmp")));
        assert_eq!(addr.to_string(), "unix:///tmp/codesocket.tmp");
    }

    #[test]
    fn test_tcp_scheme() {
        let addr = Address::parse("tcp://127.0.0.1:7000").unwrap();
        assert_eq!(addr, Address::Tcp("127.0.0.1:7000".to_string()));
        assert_eq!(addr.network(), "tcp");
    }

    #[test]
    fn test_invalid_addresses() {
        assert_eq!(Address::parse("  "), Err(AddressError::Empty));
        assert_eq!(
            Address::parse("udp://127.0.0.1:9"),
            Err(AddressError::UnsupportedNetwork("udp".to_string()))
        );
        assert_eq!(
            Address::parse("unix://"),
            Err(AddressError::MissingTarget("unix://".to_string()))
        );
    }
}
