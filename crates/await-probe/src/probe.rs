//! Readiness probes.
//!
//! A [`Probe`] performs one readiness attempt and reports a
//! [`CheckOutcome`]. Retrying and pacing live in [`crate::checker`];
//! probes never sleep and never look at the global deadline.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use tokio::net::TcpStream;
use tracing::{info, warn};

use crate::target::{Scheme, TargetDescriptor};

/// Result of a single probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    /// The dependency is usable.
    Ready,
    /// Not ready yet, with the reason to log.
    Retry(String),
}

/// One readiness attempt against a dependency.
pub trait Probe: Send + 'static {
    fn probe(&mut self) -> impl Future<Output = CheckOutcome> + Send;
}

/// Ready once the path exists.
#[derive(Debug, Clone)]
pub struct FileProbe {
    path: PathBuf,
}

impl FileProbe {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Probe for FileProbe {
    async fn probe(&mut self) -> CheckOutcome {
        match tokio::fs::metadata(&self.path).await {
            Ok(_) => {
                info!(path = %self.path.display(), "file has been generated");
                CheckOutcome::Ready
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                CheckOutcome::Retry(format!("file {} does not exist yet", self.path.display()))
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "problem checking file exists");
                CheckOutcome::Retry(format!(
                    "problem checking file {} exists: {e}",
                    self.path.display()
                ))
            }
        }
    }
}

/// Ready once a transport connection can be established.
///
/// The connection is dropped as soon as it is established; no bytes are
/// exchanged.
#[derive(Debug, Clone)]
pub struct SocketProbe {
    target: TargetDescriptor,
    dial_timeout: Duration,
}

impl SocketProbe {
    pub fn new(target: TargetDescriptor, dial_timeout: Duration) -> Self {
        Self {
            target,
            dial_timeout,
        }
    }

    async fn dial(&self) -> io::Result<()> {
        let address = self.target.socket_address();
        match self.target.scheme() {
            Scheme::Unix => dial_unix(&address).await,
            Scheme::Tcp4 => dial_family(&address, SocketAddr::is_ipv4).await,
            Scheme::Tcp6 => dial_family(&address, SocketAddr::is_ipv6).await,
            _ => TcpStream::connect(&address).await.map(drop),
        }
    }
}

impl Probe for SocketProbe {
    async fn probe(&mut self) -> CheckOutcome {
        match tokio::time::timeout(self.dial_timeout, self.dial()).await {
            Ok(Ok(())) => {
                info!(url = %self.target, "connected");
                CheckOutcome::Ready
            }
            Ok(Err(e)) => CheckOutcome::Retry(format!("problem with dial: {e}")),
            Err(_) => CheckOutcome::Retry(format!(
                "problem with dial: timed out after {:?}",
                self.dial_timeout
            )),
        }
    }
}

/// Connect to the first resolved address of one IP family.
async fn dial_family(address: &str, family: fn(&SocketAddr) -> bool) -> io::Result<()> {
    let candidates: Vec<SocketAddr> = tokio::net::lookup_host(address)
        .await?
        .filter(|addr| family(addr))
        .collect();

    let mut last_err = io::Error::new(
        io::ErrorKind::AddrNotAvailable,
        format!("no address of the requested family for {address}"),
    );
    for addr in candidates {
        match TcpStream::connect(addr).await {
            Ok(_) => return Ok(()),
            Err(e) => last_err = e,
        }
    }
    Err(last_err)
}

#[cfg(unix)]
async fn dial_unix(path: &str) -> io::Result<()> {
    tokio::net::UnixStream::connect(path).await.map(drop)
}

#[cfg(not(unix))]
async fn dial_unix(_path: &str) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "unix sockets are not supported on this platform",
    ))
}
