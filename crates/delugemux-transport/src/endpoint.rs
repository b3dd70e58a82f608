use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{Result, TransportError};

/// Port the Deluge daemon listens on by default.
pub const DEFAULT_PORT: u16 = 58846;

/// Host used when an endpoint string names only a port or nothing at all.
pub const DEFAULT_HOST: &str = "127.0.0.1";

const UNIX_PREFIX: &str = "unix:";

/// Where the daemon can be reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// TCP host and port.
    Tcp { host: String, port: u16 },
    /// Filesystem-path Unix domain socket.
    Unix(PathBuf),
}

impl Endpoint {
    /// Maximum socket path length.
    /// Unix `sockaddr_un.sun_path` is typically 108 bytes on Linux, 104 on macOS.
    #[cfg(target_os = "linux")]
    const MAX_PATH_LEN: usize = 108;
    #[cfg(not(target_os = "linux"))]
    const MAX_PATH_LEN: usize = 104;

    /// TCP endpoint.
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self::Tcp {
            host: host.into(),
            port,
        }
    }

    /// Unix socket endpoint.
    pub fn unix(path: impl Into<PathBuf>) -> Self {
        Self::Unix(path.into())
    }

    /// Check the endpoint can be handed to the OS as-is.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Tcp { host, .. } if host.is_empty() => Err(TransportError::InvalidEndpoint {
                input: self.to_string(),
                reason: "empty host",
            }),
            Self::Tcp { .. } => Ok(()),
            Self::Unix(path) => {
                let len = path.as_os_str().len();
                if len >= Self::MAX_PATH_LEN {
                    return Err(TransportError::PathTooLong {
                        path: path.display().to_string(),
                        len,
                        max: Self::MAX_PATH_LEN,
                    });
                }
                Ok(())
            }
        }
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        match self {
            Self::Tcp { .. } => "tcp",
            Self::Unix(_) => "unix-domain-socket",
        }
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Self::tcp(DEFAULT_HOST, DEFAULT_PORT)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp { host, port } if host.contains(':') => write!(f, "[{host}]:{port}"),
            Self::Tcp { host, port } => write!(f, "{host}:{port}"),
            Self::Unix(path) => write!(f, "{UNIX_PREFIX}{}", path.display()),
        }
    }
}

impl FromStr for Endpoint {
    type Err = TransportError;

    /// Accepts `unix:/path`, `host:port`, `[v6]:port`, `host` and `:port`.
    fn from_str(input: &str) -> Result<Self> {
        let input = input.trim();
        let invalid = |reason| TransportError::InvalidEndpoint {
            input: input.to_string(),
            reason,
        };

        if let Some(path) = input.strip_prefix(UNIX_PREFIX) {
            if path.is_empty() {
                return Err(invalid("empty socket path"));
            }
            let endpoint = Self::unix(path);
            endpoint.validate()?;
            return Ok(endpoint);
        }

        let (host, port) = if let Some(rest) = input.strip_prefix('[') {
            let (host, tail) = rest.split_once(']').ok_or_else(|| invalid("unclosed '['"))?;
            match tail.strip_prefix(':') {
                Some(port) => (host, Some(port)),
                None if tail.is_empty() => (host, None),
                None => return Err(invalid("unexpected text after ']'")),
            }
        } else if input.matches(':').count() > 1 {
            // Bare IPv6 address without a port.
            (input, None)
        } else {
            match input.rsplit_once(':') {
                Some((host, port)) => (host, Some(port)),
                None => (input, None),
            }
        };

        let port = match port {
            Some(port) => port.parse::<u16>().map_err(|_| invalid("invalid port"))?,
            None => DEFAULT_PORT,
        };
        let host = if host.is_empty() { DEFAULT_HOST } else { host };

        Ok(Self::tcp(host, port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_host_and_port() {
        let endpoint: Endpoint = "deluge.lan:1234".parse().unwrap();
        assert_eq!(endpoint, Endpoint::tcp("deluge.lan", 1234));
    }

    #[test]
    fn missing_parts_fall_back_to_defaults() {
        assert_eq!(
            "".parse::<Endpoint>().unwrap(),
            Endpoint::tcp(DEFAULT_HOST, DEFAULT_PORT)
        );
        assert_eq!(
            "seedbox".parse::<Endpoint>().unwrap(),
            Endpoint::tcp("seedbox", DEFAULT_PORT)
        );
        assert_eq!(
            ":9000".parse::<Endpoint>().unwrap(),
            Endpoint::tcp(DEFAULT_HOST, 9000)
        );
    }

    #[test]
    fn parses_ipv6_forms() {
        assert_eq!(
            "[::1]:58847".parse::<Endpoint>().unwrap(),
            Endpoint::tcp("::1", 58847)
        );
        assert_eq!(
            "::1".parse::<Endpoint>().unwrap(),
            Endpoint::tcp("::1", DEFAULT_PORT)
        );
        assert!("[::1".parse::<Endpoint>().is_err());
    }

    #[test]
    fn parses_unix_socket() {
        let endpoint: Endpoint = "unix:/run/deluged.sock".parse().unwrap();
        assert_eq!(endpoint, Endpoint::unix("/run/deluged.sock"));
        assert_eq!(endpoint.to_string(), "unix:/run/deluged.sock");
    }

    #[test]
    fn rejects_bad_port() {
        let err = "host:99999".parse::<Endpoint>().unwrap_err();
        assert!(matches!(err, TransportError::InvalidEndpoint { .. }));
    }

    #[test]
    fn rejects_long_unix_path() {
        let long_path = format!("unix:/tmp/{}.sock", "a".repeat(200));
        let err = long_path.parse::<Endpoint>().unwrap_err();
        assert!(matches!(err, TransportError::PathTooLong { .. }));
    }

    #[test]
    fn display_round_trips() {
        for input in ["10.0.0.2:58846", "[fe80::1]:58846", "unix:/tmp/d.sock"] {
            let endpoint: Endpoint = input.parse().unwrap();
            assert_eq!(endpoint.to_string(), input);
        }
    }
}
