//! Run configuration.
//!
//! Everything here is built once at startup and is read-only afterwards.
//! Every parse error is a fatal [`AwaitError`]; nothing is retried.

use std::time::Duration;

use http::{HeaderName, HeaderValue};
use tracing::warn;

use crate::backoff::BackoffPolicy;
use crate::error::{AwaitError, AwaitResult};
use crate::target::TargetDescriptor;
use crate::validate::ValidationRule;

/// Default global deadline.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// An extra request header sent with every HTTP(S) probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpHeader {
    pub name: HeaderName,
    pub value: HeaderValue,
}

impl HttpHeader {
    /// Parse `"Name: Value"`. Exactly one colon is accepted.
    pub fn parse(raw: &str) -> AwaitResult<Self> {
        let parts: Vec<&str> = raw.split(':').collect();
        let [name, value] = parts.as_slice() else {
            return Err(AwaitError::InvalidHeader(raw.to_string()));
        };
        let name = HeaderName::from_bytes(name.trim().as_bytes())
            .map_err(|_| AwaitError::InvalidHeader(raw.to_string()))?;
        let value = HeaderValue::from_str(value.trim())
            .map_err(|_| AwaitError::InvalidHeader(raw.to_string()))?;
        Ok(Self { name, value })
    }
}

/// Settings shared by every HTTP(S) checker.
#[derive(Debug, Clone, Default)]
pub struct HttpSettings {
    pub headers: Vec<HttpHeader>,
    pub rule: ValidationRule,
    /// Skip TLS certificate verification.
    pub insecure: bool,
}

/// Full configuration of one wait run.
#[derive(Debug, Clone)]
pub struct WaitConfig {
    pub targets: Vec<TargetDescriptor>,
    /// Global deadline; also the per-attempt dial and request timeout.
    pub timeout: Duration,
    pub backoff: BackoffPolicy,
    pub http: HttpSettings,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            targets: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
            backoff: BackoffPolicy::default(),
            http: HttpSettings::default(),
        }
    }
}

impl WaitConfig {
    /// Parse and append target URLs.
    pub fn with_targets<I, S>(mut self, urls: I) -> AwaitResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for url in urls {
            self.targets.push(TargetDescriptor::parse(url.as_ref())?);
        }
        Ok(self)
    }

    /// Parse and append HTTP headers. Targets must be added first.
    pub fn with_headers<I, S>(mut self, headers: I) -> AwaitResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for raw in headers {
            let raw = raw.as_ref();
            if self.targets.is_empty() {
                return Err(AwaitError::HeaderWithoutTarget(raw.to_string()));
            }
            self.http.headers.push(HttpHeader::parse(raw)?);
        }

        if !self.http.headers.is_empty() && !self.targets.iter().any(|t| t.scheme().is_http()) {
            warn!(
                headers = self.http.headers.len(),
                "HTTP headers provided without any http(s) target, they will not be sent"
            );
        }
        Ok(self)
    }

    pub fn with_rule(mut self, rule: ValidationRule) -> Self {
        self.http.rule = rule;
        self
    }

    pub fn with_insecure(mut self, insecure: bool) -> Self {
        self.http.insecure = insecure;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }
}

/// Parse a duration such as `"10s"`, `"500ms"`, `"1m30s"` or `"1.5h"`.
///
/// Units: `ns`, `us` (or `µs`), `ms`, `s`, `m`, `h`. A bare `0` is the
/// only unitless value accepted.
pub fn parse_duration(s: &str) -> AwaitResult<Duration> {
    let input = s.trim();
    let invalid = || AwaitError::InvalidDuration(s.to_string());

    if input == "0" {
        return Ok(Duration::ZERO);
    }
    let mut rest = input.strip_prefix('+').unwrap_or(input);
    if rest.is_empty() {
        return Err(invalid());
    }

    let mut total_nanos = 0f64;
    while !rest.is_empty() {
        let number_end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(invalid)?;
        if number_end == 0 {
            return Err(invalid());
        }
        let value: f64 = rest[..number_end].parse().map_err(|_| invalid())?;
        rest = &rest[number_end..];

        let unit_end = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let scale = match &rest[..unit_end] {
            "ns" => 1e0,
            "us" | "µs" | "μs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            _ => return Err(invalid()),
        };
        rest = &rest[unit_end..];
        total_nanos += value * scale;
    }

    if !total_nanos.is_finite() || total_nanos > u64::MAX as f64 {
        return Err(invalid());
    }
    Ok(Duration::from_nanos(total_nanos.round() as u64))
}
