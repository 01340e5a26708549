//! Target URL parsing.
//!
//! A target is written `<scheme>://<authority><path>[?query]`. Parsing is
//! strict: anything a probe could never succeed against is rejected here
//! as a configuration error instead of being retried until the deadline.

use std::fmt;

use http::uri::{Authority, PathAndQuery};
use percent_encoding::percent_decode_str;

use crate::error::{AwaitError, AwaitResult};

/// Supported target protocols.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    File,
    Tcp,
    Tcp4,
    Tcp6,
    Unix,
    Http,
    Https,
}

impl Scheme {
    /// Parse a scheme name, case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "file" => Some(Scheme::File),
            "tcp" => Some(Scheme::Tcp),
            "tcp4" => Some(Scheme::Tcp4),
            "tcp6" => Some(Scheme::Tcp6),
            "unix" => Some(Scheme::Unix),
            "http" => Some(Scheme::Http),
            "https" => Some(Scheme::Https),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::File => "file",
            Scheme::Tcp => "tcp",
            Scheme::Tcp4 => "tcp4",
            Scheme::Tcp6 => "tcp6",
            Scheme::Unix => "unix",
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }

    /// Whether readiness is a bare transport connect.
    pub fn is_socket(&self) -> bool {
        matches!(
            self,
            Scheme::Tcp | Scheme::Tcp4 | Scheme::Tcp6 | Scheme::Unix
        )
    }

    pub fn is_http(&self) -> bool {
        matches!(self, Scheme::Http | Scheme::Https)
    }

    fn default_port(&self) -> Option<u16> {
        match self {
            Scheme::Http => Some(80),
            Scheme::Https => Some(443),
            _ => None,
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One parsed dependency endpoint. Immutable once parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetDescriptor {
    scheme: Scheme,
    host: String,
    port: Option<u16>,
    path: String,
    query: Option<String>,
    raw: String,
}

impl TargetDescriptor {
    pub fn parse(raw: &str) -> AwaitResult<Self> {
        let raw = raw.trim();
        let (scheme_name, rest) = raw
            .split_once("://")
            .ok_or_else(|| AwaitError::invalid_url(raw, "expected <scheme>://<address>"))?;
        let scheme = Scheme::parse(scheme_name).ok_or_else(|| AwaitError::UnsupportedScheme {
            scheme: scheme_name.to_string(),
            raw: raw.to_string(),
        })?;

        let rest = rest.split_once('#').map_or(rest, |(head, _)| head);
        let (rest, query) = match rest.split_once('?') {
            Some((head, query)) => (head, Some(query.to_string())),
            None => (rest, None),
        };
        let (authority, path) = match rest.find('/') {
            Some(i) => (&rest[..i], &rest[i..]),
            None => (rest, ""),
        };
        // Userinfo is irrelevant for readiness.
        let authority = authority.rsplit_once('@').map_or(authority, |(_, host)| host);
        let (host, port) = split_host_port(raw, authority)?;

        // Filesystem paths are used verbatim; HTTP keeps the encoded form on the wire.
        let path = match scheme {
            Scheme::File | Scheme::Unix => percent_decode_str(path)
                .decode_utf8()
                .map_err(|_| AwaitError::invalid_url(raw, "path is not valid UTF-8 once decoded"))?
                .into_owned(),
            _ => path.to_string(),
        };

        let target = Self {
            scheme,
            host,
            port,
            path,
            query,
            raw: raw.to_string(),
        };
        target.check_shape()?;
        Ok(target)
    }

    fn check_shape(&self) -> AwaitResult<()> {
        match self.scheme {
            Scheme::Tcp | Scheme::Tcp4 | Scheme::Tcp6 => {
                if self.host.is_empty() {
                    return Err(AwaitError::invalid_url(&self.raw, "missing host"));
                }
                if self.port.is_none() {
                    return Err(AwaitError::invalid_url(&self.raw, "missing port"));
                }
            }
            Scheme::Unix | Scheme::File => {
                if self.path.is_empty() {
                    return Err(AwaitError::invalid_url(
                        &self.raw,
                        format!("missing path, expected {}:///absolute/path", self.scheme),
                    ));
                }
            }
            Scheme::Http | Scheme::Https => {
                if self.host.is_empty() {
                    return Err(AwaitError::invalid_url(&self.raw, "missing host"));
                }
                Authority::try_from(self.authority().as_str()).map_err(|e| {
                    AwaitError::invalid_url(&self.raw, format!("invalid host: {e}"))
                })?;
                PathAndQuery::try_from(self.request_target().as_str()).map_err(|e| {
                    AwaitError::invalid_url(&self.raw, format!("invalid path or query: {e}"))
                })?;
            }
        }
        Ok(())
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Explicit port, if the URL carried one.
    pub fn port(&self) -> Option<u16> {
        self.port
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Address to dial: `host:port` for TCP and HTTP, the socket path for `unix`.
    pub fn socket_address(&self) -> String {
        match self.scheme {
            Scheme::Unix | Scheme::File => self.path.clone(),
            _ => {
                let port = self.port.or(self.scheme.default_port()).unwrap_or_default();
                format!("{}:{port}", bracket_host(&self.host))
            }
        }
    }

    /// Value for the HTTP `Host` header.
    pub fn authority(&self) -> String {
        match self.port {
            Some(port) => format!("{}:{port}", bracket_host(&self.host)),
            None => bracket_host(&self.host),
        }
    }

    /// Origin-form request target: path plus query, `/` when empty.
    pub fn request_target(&self) -> String {
        let path = if self.path.is_empty() { "/" } else { &self.path };
        match &self.query {
            Some(query) => format!("{path}?{query}"),
            None => path.to_string(),
        }
    }

    /// Resolve a redirect `Location` against this target.
    pub fn join(&self, location: &str) -> AwaitResult<Self> {
        let location = location.trim();
        if location.contains("://") {
            return Self::parse(location);
        }
        if let Some(rest) = location.strip_prefix("//") {
            return Self::parse(&format!("{}://{rest}", self.scheme));
        }

        let base = format!("{}://{}", self.scheme, self.authority());
        if location.starts_with('/') {
            return Self::parse(&format!("{base}{location}"));
        }
        let dir = match self.path.rfind('/') {
            Some(i) => &self.path[..=i],
            None => "/",
        };
        Self::parse(&format!("{base}{dir}{location}"))
    }
}

impl fmt::Display for TargetDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

fn split_host_port(raw: &str, authority: &str) -> AwaitResult<(String, Option<u16>)> {
    if let Some(rest) = authority.strip_prefix('[') {
        let (host, tail) = rest
            .split_once(']')
            .ok_or_else(|| AwaitError::invalid_url(raw, "unterminated IPv6 literal"))?;
        let port = match tail {
            "" => None,
            tail => {
                let port = tail
                    .strip_prefix(':')
                    .ok_or_else(|| AwaitError::invalid_url(raw, "unexpected text after IPv6 literal"))?;
                Some(parse_port(raw, port)?)
            }
        };
        return Ok((host.to_string(), port));
    }

    match authority.rsplit_once(':') {
        Some((host, port)) => Ok((host.to_string(), Some(parse_port(raw, port)?))),
        None => Ok((authority.to_string(), None)),
    }
}

fn parse_port(raw: &str, port: &str) -> AwaitResult<u16> {
    port.parse::<u16>()
        .map_err(|_| AwaitError::invalid_url(raw, format!("invalid port {port:?}")))
}

fn bracket_host(host: &str) -> String {
    if host.contains(':') {
        format!("[{host}]")
    } else {
        host.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_tcp() {
        let target = TargetDescriptor::parse("tcp://db:5432").unwrap();
        assert_eq!(target.scheme(), Scheme::Tcp);
        assert_eq!(target.host(), "db");
        assert_eq!(target.port(), Some(5432));
        assert_eq!(target.socket_address(), "db:5432");
        assert_eq!(target.to_string(), "tcp://db:5432");
    }

    #[test]
    fn parse_tcp6_bracketed() {
        let target = TargetDescriptor::parse("tcp6://[::1]:8080").unwrap();
        assert_eq!(target.scheme(), Scheme::Tcp6);
        assert_eq!(target.host(), "::1");
        assert_eq!(target.socket_address(), "[::1]:8080");
    }

    #[test]
    fn parse_unix_and_file_paths() {
        let unix = TargetDescriptor::parse("unix:///var/run/docker.sock").unwrap();
        assert_eq!(unix.scheme(), Scheme::Unix);
        assert_eq!(unix.path(), "/var/run/docker.sock");
        assert_eq!(unix.socket_address(), "/var/run/docker.sock");

        let file = TargetDescriptor::parse("file:///tmp/ready").unwrap();
        assert_eq!(file.scheme(), Scheme::File);
        assert_eq!(file.path(), "/tmp/ready");
    }

    #[test]
    fn filesystem_paths_are_percent_decoded() {
        let file = TargetDescriptor::parse("file:///tmp/my%20ready").unwrap();
        assert_eq!(file.path(), "/tmp/my ready");

        let unix = TargetDescriptor::parse("unix:///run/app%2Dv2.sock").unwrap();
        assert_eq!(unix.socket_address(), "/run/app-v2.sock");

        let http = TargetDescriptor::parse("http://web/my%20page?q=a%26b").unwrap();
        assert_eq!(http.request_target(), "/my%20page?q=a%26b");

        assert!(TargetDescriptor::parse("file:///tmp/%ff").is_err());
    }

    #[test]
    fn http_targets_must_form_a_valid_request() {
        assert!(TargetDescriptor::parse("http://web/a b").is_err());
        assert!(TargetDescriptor::parse("http://web/ok?x=a b").is_err());
        assert!(TargetDescriptor::parse("https://bad host/").is_err());
        assert!(TargetDescriptor::parse("http://web/a%20b?x=1").is_ok());
    }

    #[test]
    fn parse_http_defaults() {
        let target = TargetDescriptor::parse("http://web").unwrap();
        assert_eq!(target.socket_address(), "web:80");
        assert_eq!(target.authority(), "web");
        assert_eq!(target.request_target(), "/");

        let target = TargetDescriptor::parse("HTTPS://user:pw@api.example.com/health?deep=1#x").unwrap();
        assert_eq!(target.scheme(), Scheme::Https);
        assert_eq!(target.host(), "api.example.com");
        assert_eq!(target.socket_address(), "api.example.com:443");
        assert_eq!(target.request_target(), "/health?deep=1");
    }

    #[test]
    fn unsupported_scheme_is_fatal() {
        let err = TargetDescriptor::parse("ftp://files:21").unwrap_err();
        assert!(matches!(err, AwaitError::UnsupportedScheme { ref scheme, .. } if scheme == "ftp"));
    }

    #[test]
    fn malformed_targets_rejected() {
        assert!(TargetDescriptor::parse("db:5432").is_err());
        assert!(TargetDescriptor::parse("tcp://db").is_err());
        assert!(TargetDescriptor::parse("tcp://db:notaport").is_err());
        assert!(TargetDescriptor::parse("tcp://:5432").is_err());
        assert!(TargetDescriptor::parse("file://").is_err());
        assert!(TargetDescriptor::parse("http:///path").is_err());
        assert!(TargetDescriptor::parse("tcp6://[::1:80").is_err());
    }

    #[test]
    fn join_redirect_locations() {
        let base = TargetDescriptor::parse("http://web:8000/app/status").unwrap();

        let abs = base.join("https://other/ok").unwrap();
        assert_eq!(abs.scheme(), Scheme::Https);
        assert_eq!(abs.host(), "other");

        let rooted = base.join("/ready").unwrap();
        assert_eq!(rooted.authority(), "web:8000");
        assert_eq!(rooted.request_target(), "/ready");

        let relative = base.join("health").unwrap();
        assert_eq!(relative.request_target(), "/app/health");

        let scheme_relative = base.join("//mirror:9000/x").unwrap();
        assert_eq!(scheme_relative.scheme(), Scheme::Http);
        assert_eq!(scheme_relative.socket_address(), "mirror:9000");
    }
}
