//! HTTP(S) readiness probe.
//!
//! Issues a `GET` over a fresh hyper HTTP/1 connection per attempt,
//! follows redirects, and classifies the final response:
//!
//! - transport, TLS or timeout error → retry
//! - non-2xx status → retry
//! - 2xx with no content rules → ready
//! - 2xx with content rules → ready only if the body passes them

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail, ensure};
use bytes::Bytes;
use http::header::{
    AUTHORIZATION, COOKIE, HOST, HeaderName, HeaderValue, LOCATION, USER_AGENT, WWW_AUTHENTICATE,
};
use http::{Method, Request, Response, StatusCode};
use http_body_util::{BodyExt, Empty};
use hyper::body::Incoming;
use hyper::client::conn::http1;
use hyper_util::rt::TokioIo;
use rustls::pki_types::ServerName;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::{debug, info};

use crate::config::HttpSettings;
use crate::error::AwaitResult;
use crate::probe::{CheckOutcome, Probe};
use crate::target::{Scheme, TargetDescriptor};
use crate::tls;

/// Redirect hops followed before giving up on an attempt.
const MAX_REDIRECTS: usize = 10;

const USER_AGENT_VALUE: &str = concat!("await/", env!("CARGO_PKG_VERSION"));

/// Shared request machinery for all HTTP(S) probes of a run.
#[derive(Clone)]
pub struct HttpClient {
    settings: Arc<HttpSettings>,
    tls: TlsConnector,
    /// Bound on a whole attempt, redirects and body included.
    timeout: Duration,
}

impl HttpClient {
    pub fn new(settings: Arc<HttpSettings>, timeout: Duration) -> AwaitResult<Self> {
        let tls = tls::connector(settings.insecure)?;
        Ok(Self {
            settings,
            tls,
            timeout,
        })
    }

    /// Probe for one HTTP(S) target.
    pub fn probe(&self, target: TargetDescriptor) -> HttpProbe {
        HttpProbe {
            target,
            client: self.clone(),
        }
    }

    /// GET `target`, following redirects.
    async fn fetch(&self, target: &TargetDescriptor) -> anyhow::Result<Response<Incoming>> {
        let mut current = target.clone();
        for _ in 0..=MAX_REDIRECTS {
            let response = self.get(&current, target).await?;
            let status = response.status();
            if is_followed_redirect(status) {
                if let Some(location) = response.headers().get(LOCATION) {
                    let location = location
                        .to_str()
                        .context("redirect location is not valid text")?;
                    let next = current
                        .join(location)
                        .with_context(|| format!("bad redirect location {location:?}"))?;
                    ensure!(
                        next.scheme().is_http(),
                        "redirect to non-HTTP location {location}"
                    );
                    debug!(from = %current, to = %next, status = status.as_u16(), "following redirect");
                    current = next;
                    continue;
                }
            }
            return Ok(response);
        }
        bail!("stopped after {MAX_REDIRECTS} redirects")
    }

    /// One request to `target`, reached from `origin` through zero or more
    /// redirects.
    async fn get(
        &self,
        target: &TargetDescriptor,
        origin: &TargetDescriptor,
    ) -> anyhow::Result<Response<Incoming>> {
        let address = target.socket_address();
        let stream = TcpStream::connect(&address)
            .await
            .with_context(|| format!("problem with dial {address}"))?;

        let request = self.request(target, origin)?;
        match target.scheme() {
            Scheme::Https => {
                let server_name = ServerName::try_from(target.host().to_string())
                    .with_context(|| format!("invalid TLS server name {}", target.host()))?;
                let stream = self
                    .tls
                    .connect(server_name, stream)
                    .await
                    .context("TLS handshake failed")?;
                send(TokioIo::new(stream), request).await
            }
            _ => send(TokioIo::new(stream), request).await,
        }
    }

    /// Build the GET for one hop.
    ///
    /// Configured headers win over the defaults. Credentials only follow
    /// redirects to the origin host or its subdomains, and a configured
    /// `Host` only applies while the authority is unchanged.
    fn request(
        &self,
        target: &TargetDescriptor,
        origin: &TargetDescriptor,
    ) -> anyhow::Result<Request<Empty<Bytes>>> {
        let trusted = is_same_or_subdomain(target.host(), origin.host());
        let same_authority = target.authority() == origin.authority();

        let mut request = Request::builder()
            .method(Method::GET)
            .uri(target.request_target())
            .body(Empty::<Bytes>::new())
            .with_context(|| format!("failed to build request for {target}"))?;

        let headers = request.headers_mut();
        for header in &self.settings.headers {
            if header.name == HOST && !same_authority {
                continue;
            }
            if is_credential(&header.name) && !trusted {
                debug!(header = %header.name, to = %target, "dropping credential on cross-host redirect");
                continue;
            }
            headers.append(header.name.clone(), header.value.clone());
        }
        if !headers.contains_key(HOST) {
            let host = HeaderValue::from_str(&target.authority())
                .with_context(|| format!("invalid Host header for {target}"))?;
            headers.insert(HOST, host);
        }
        headers
            .entry(USER_AGENT)
            .or_insert(HeaderValue::from_static(USER_AGENT_VALUE));

        Ok(request)
    }
}

fn is_credential(name: &HeaderName) -> bool {
    *name == AUTHORIZATION
        || *name == WWW_AUTHENTICATE
        || *name == COOKIE
        || name.as_str() == "cookie2"
}

fn is_same_or_subdomain(host: &str, origin: &str) -> bool {
    let host = host.to_ascii_lowercase();
    let origin = origin.to_ascii_lowercase();
    host == origin
        || host
            .strip_suffix(origin.as_str())
            .is_some_and(|prefix| prefix.ends_with('.'))
}

async fn send<T>(io: T, request: Request<Empty<Bytes>>) -> anyhow::Result<Response<Incoming>>
where
    T: hyper::rt::Read + hyper::rt::Write + Unpin + Send + 'static,
{
    let (mut sender, connection) = http1::handshake(io)
        .await
        .context("HTTP handshake failed")?;

    // Drive the connection in the background.
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            debug!(error = %e, "probe connection closed with error");
        }
    });

    sender
        .send_request(request)
        .await
        .context("problem with request")
}

fn is_followed_redirect(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::MOVED_PERMANENTLY
            | StatusCode::FOUND
            | StatusCode::SEE_OTHER
            | StatusCode::TEMPORARY_REDIRECT
            | StatusCode::PERMANENT_REDIRECT
    )
}

/// Probe for one HTTP(S) target.
pub struct HttpProbe {
    target: TargetDescriptor,
    client: HttpClient,
}

impl HttpProbe {
    async fn check(&self) -> anyhow::Result<CheckOutcome> {
        let response = self.client.fetch(&self.target).await?;
        let status = response.status();

        if !status.is_success() {
            return Ok(CheckOutcome::Retry(format!(
                "received {} from {}",
                status.as_u16(),
                self.target
            )));
        }
        info!(url = %self.target, status = status.as_u16(), "received success status");

        let rule = &self.client.settings.rule;
        if rule.is_empty() {
            return Ok(CheckOutcome::Ready);
        }

        let body = response
            .into_body()
            .collect()
            .await
            .context("problem reading response body")?
            .to_bytes();
        let validation = rule.validate(&body);
        if validation.passed() {
            return Ok(CheckOutcome::Ready);
        }

        let mut reasons = Vec::new();
        if validation.required_missing() {
            reasons.push(format!(
                "not all required text was found (missing: {})",
                validation.missing.join(", ")
            ));
        }
        if validation.forbidden_present() {
            reasons.push(format!(
                "at least some forbidden text was found (found: {})",
                validation.found_forbidden.join(", ")
            ));
        }
        Ok(CheckOutcome::Retry(reasons.join("; ")))
    }
}

impl Probe for HttpProbe {
    async fn probe(&mut self) -> CheckOutcome {
        match tokio::time::timeout(self.client.timeout, self.check()).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => CheckOutcome::Retry(format!("{e:#}")),
            Err(_) => CheckOutcome::Retry(format!(
                "request to {} timed out after {:?}",
                self.target, self.client.timeout
            )),
        }
    }
}
