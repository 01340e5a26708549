//! Command-line surface of `await`.

use std::time::Duration;

use await_probe::{AwaitResult, BackoffPolicy, ValidationRule, WaitConfig, parse_duration};
use clap::{Parser, ValueEnum};

const EXAMPLES: &str = "\
Examples:
  Wait for a database to become available on port 5432 and start nginx:
    await --url tcp://db:5432 nginx

  Wait for a website to become available on port 8000 and start nginx:
    await --url http://web:8000 nginx

  Wait up to 300s for a website on port 38383, require the text \"ready\",
  reject the text \"fail\", and retry after 5, 10, 20, 40, 80, 80... seconds:
    await --url http://localhost:38383 --text-present ready --text-absent fail \\
      --timeout 300s --retry-interval 5s --retry-backoff --retry-backoff-max-interval 80s

Durations accept the units ns, us, ms, s, m and h (e.g. 1m30s).
Log verbosity follows RUST_LOG (default: info).";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "await",
    about = "Utility to wait for a socket, an http(s) response or a file before launching a command",
    version,
    after_help = EXAMPLES,
)]
pub struct Cli {
    /// Target (tcp/tcp4/tcp6/http/https/unix/file) to await, e.g. tcp://db:5432.
    /// Can be passed multiple times.
    #[arg(long = "url", value_name = "URL")]
    pub urls: Vec<String>,

    /// Global deadline for all targets; also the dial and request timeout.
    #[arg(long, value_name = "DURATION", default_value = "10s", value_parser = parse_duration)]
    pub timeout: Duration,

    /// Duration to wait before retrying a target.
    #[arg(long, value_name = "DURATION", default_value = "1s", value_parser = parse_duration)]
    pub retry_interval: Duration,

    /// Double the retry interval after each failed attempt.
    #[arg(long)]
    pub retry_backoff: bool,

    /// Maximum retry interval when backoff is enabled.
    #[arg(long, value_name = "DURATION", default_value = "300s", value_parser = parse_duration)]
    pub retry_backoff_max_interval: Duration,

    /// Allow connections to HTTPS targets without valid certificates.
    #[arg(long)]
    pub http_insecure: bool,

    /// HTTP header, colon separated, e.g. "Accept-Encoding: gzip".
    /// Can be passed multiple times.
    #[arg(long = "http-header", value_name = "HEADER")]
    pub http_headers: Vec<String>,

    /// Text required to be present in HTTP response bodies.
    /// Can be passed multiple times.
    #[arg(long = "text-present", value_name = "TEXT")]
    pub text_present: Vec<String>,

    /// Text required to be absent from HTTP response bodies.
    /// Can be passed multiple times.
    #[arg(long = "text-absent", value_name = "TEXT")]
    pub text_absent: Vec<String>,

    /// Log output format.
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Command (and its arguments) to execute once every target is ready.
    #[arg(value_name = "COMMAND", trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}

/// Invoked without a single flag or argument.
pub fn is_bare<I>(args: I) -> bool
where
    I: IntoIterator,
{
    args.into_iter().nth(1).is_none()
}

impl Cli {
    /// Validate flags into a run configuration.
    pub fn wait_config(&self) -> AwaitResult<WaitConfig> {
        let backoff = BackoffPolicy::new(
            self.retry_interval,
            self.retry_backoff_max_interval,
            self.retry_backoff,
        );
        let rule = ValidationRule::new(self.text_present.clone(), self.text_absent.clone());

        WaitConfig::default()
            .with_timeout(self.timeout)
            .with_backoff(backoff)
            .with_insecure(self.http_insecure)
            .with_rule(rule)
            .with_targets(&self.urls)?
            .with_headers(&self.http_headers)
    }
}

#[cfg(test)]
mod tests {
    use await_probe::{AwaitError, Scheme};

    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("await").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn defaults() {
        let cli = parse(&[]);
        assert!(cli.urls.is_empty() && cli.command.is_empty());
        assert_eq!(cli.timeout, Duration::from_secs(10));
        assert_eq!(cli.retry_interval, Duration::from_secs(1));
        assert_eq!(cli.retry_backoff_max_interval, Duration::from_secs(300));
        assert!(!cli.retry_backoff);
        assert!(!cli.http_insecure);
        assert_eq!(cli.log_format, LogFormat::Text);
    }

    #[test]
    fn bare_invocation_detected() {
        assert!(is_bare(["await"]));
        assert!(is_bare(Vec::<String>::new()));
        assert!(!is_bare(["await", "--timeout", "5s"]));
        assert!(!is_bare(["await", "true"]));
    }

    #[test]
    fn flags_alone_are_a_valid_run() {
        let cli = parse(&["--timeout", "5s"]);
        let config = cli.wait_config().unwrap();
        assert!(config.targets.is_empty());
        assert!(cli.command.is_empty());
    }

    #[test]
    fn repeated_flags_and_trailing_command() {
        let cli = parse(&[
            "--url",
            "tcp://db:5432",
            "--url",
            "http://web:8000/health",
            "--text-present",
            "ready",
            "--text-absent",
            "fail",
            "--timeout",
            "1m30s",
            "nginx",
            "-g",
            "daemon off;",
        ]);
        assert_eq!(cli.urls.len(), 2);
        assert_eq!(cli.timeout, Duration::from_secs(90));
        assert_eq!(cli.command, vec!["nginx", "-g", "daemon off;"]);

        let config = cli.wait_config().unwrap();
        assert_eq!(config.targets[0].scheme(), Scheme::Tcp);
        assert_eq!(config.targets[1].scheme(), Scheme::Http);
        assert_eq!(config.http.rule.required(), ["ready"]);
        assert_eq!(config.http.rule.forbidden(), ["fail"]);
    }

    #[test]
    fn command_after_double_dash() {
        let cli = parse(&["--url", "tcp://db:5432", "--", "sh", "-c", "echo ok"]);
        assert_eq!(cli.command, vec!["sh", "-c", "echo ok"]);
    }

    #[test]
    fn backoff_flags_shape_policy() {
        let cli = parse(&[
            "--retry-interval",
            "10m",
            "--retry-backoff",
            "--retry-backoff-max-interval",
            "80s",
        ]);
        let config = cli.wait_config().unwrap();
        assert!(config.backoff.enabled());
        assert_eq!(config.backoff.initial(), Duration::from_secs(80));
    }

    #[test]
    fn invalid_duration_rejected_by_parser() {
        let result = Cli::try_parse_from(["await", "--timeout", "ten"]);
        assert!(result.is_err());
    }

    #[test]
    fn header_without_url_is_fatal() {
        let cli = parse(&["--http-header", "X-Token: abc", "true"]);
        assert!(matches!(
            cli.wait_config().unwrap_err(),
            AwaitError::HeaderWithoutTarget(_)
        ));
    }

    #[test]
    fn malformed_header_is_fatal() {
        let cli = parse(&["--url", "http://web", "--http-header", "X-Token"]);
        assert!(matches!(
            cli.wait_config().unwrap_err(),
            AwaitError::InvalidHeader(_)
        ));
    }

    #[test]
    fn json_log_format() {
        let cli = parse(&["--log-format", "json", "true"]);
        assert_eq!(cli.log_format, LogFormat::Json);
        assert_eq!(cli.command, vec!["true"]);
    }
}
