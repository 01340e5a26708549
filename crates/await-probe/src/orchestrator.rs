//! Orchestrator — fans out one checker per target and races their joint
//! completion against the global deadline.
//!
//! Checkers are spawned as soon as they are added and the deadline is
//! fixed when the orchestrator is created. [`Orchestrator::wait`] ends in
//! either `AllReady` or `TimedOut`; both raise the shared shutdown signal
//! so no checker outlives the run.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::backoff::BackoffPolicy;
use crate::checker::{CheckerReport, run_checker};
use crate::config::{HttpSettings, WaitConfig};
use crate::error::{AwaitError, AwaitResult};
use crate::http::HttpClient;
use crate::probe::{FileProbe, Probe, SocketProbe};
use crate::target::{Scheme, TargetDescriptor};

/// Terminal state of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Every checker reported ready, in completion order.
    AllReady(Vec<CheckerReport>),
    /// The deadline elapsed first. Lists the targets still pending.
    TimedOut { pending: Vec<String> },
}

impl Outcome {
    pub fn is_ready(&self) -> bool {
        matches!(self, Outcome::AllReady(_))
    }

    /// Turn a timeout into [`AwaitError::DeadlineExceeded`].
    pub fn into_result(self, timeout: Duration) -> AwaitResult<Vec<CheckerReport>> {
        match self {
            Outcome::AllReady(reports) => Ok(reports),
            Outcome::TimedOut { pending } => Err(AwaitError::DeadlineExceeded { timeout, pending }),
        }
    }
}

/// Runs the checkers of one wait.
pub struct Orchestrator {
    timeout: Duration,
    deadline: Instant,
    backoff: BackoffPolicy,
    http_settings: Arc<HttpSettings>,
    /// Built on the first HTTP(S) target.
    http: Option<HttpClient>,
    /// Checker id → label, for checkers that have not reported yet.
    pending: BTreeMap<usize, String>,
    handles: Vec<JoinHandle<()>>,
    next_id: usize,
    shutdown_tx: watch::Sender<bool>,
    done_tx: mpsc::UnboundedSender<(usize, CheckerReport)>,
    done_rx: mpsc::UnboundedReceiver<(usize, CheckerReport)>,
}

impl Orchestrator {
    /// Create an orchestrator whose deadline is `timeout` from now.
    pub fn new(timeout: Duration, backoff: BackoffPolicy, http: HttpSettings) -> Self {
        let now = Instant::now();
        // Far enough to never fire for absurdly large timeouts.
        let deadline = now
            .checked_add(timeout)
            .unwrap_or_else(|| now + Duration::from_secs(60 * 60 * 24 * 365 * 30));
        let (shutdown_tx, _) = watch::channel(false);
        let (done_tx, done_rx) = mpsc::unbounded_channel();

        Self {
            timeout,
            deadline,
            backoff,
            http_settings: Arc::new(http),
            http: None,
            pending: BTreeMap::new(),
            handles: Vec::new(),
            next_id: 0,
            shutdown_tx,
            done_tx,
            done_rx,
        }
    }

    /// Create an orchestrator and spawn a checker for every configured target.
    pub fn from_config(config: &WaitConfig) -> AwaitResult<Self> {
        let mut orchestrator = Self::new(config.timeout, config.backoff, config.http.clone());
        for target in &config.targets {
            orchestrator.spawn_target(target.clone())?;
        }
        Ok(orchestrator)
    }

    /// Spawn the checker matching the target's scheme.
    pub fn spawn_target(&mut self, target: TargetDescriptor) -> AwaitResult<()> {
        info!(url = %target, "awaiting for dependency");
        let label = target.to_string();
        match target.scheme() {
            Scheme::File => {
                let probe = FileProbe::new(target.path());
                self.spawn_probe(label, probe);
            }
            Scheme::Http | Scheme::Https => {
                let probe = self.http_client()?.probe(target);
                self.spawn_probe(label, probe);
            }
            Scheme::Tcp | Scheme::Tcp4 | Scheme::Tcp6 | Scheme::Unix => {
                let probe = SocketProbe::new(target, self.timeout);
                self.spawn_probe(label, probe);
            }
        }
        Ok(())
    }

    /// Spawn a checker for an arbitrary probe.
    pub fn spawn_probe<P: Probe>(&mut self, label: impl Into<String>, probe: P) {
        let id = self.next_id;
        self.next_id += 1;

        let label = label.into();
        self.pending.insert(id, label.clone());

        let backoff = self.backoff.start();
        let shutdown = self.shutdown_tx.subscribe();
        let done = self.done_tx.clone();
        let handle = tokio::spawn(async move {
            if let Some(report) = run_checker(label, probe, backoff, shutdown).await {
                // The orchestrator may already have given up.
                let _ = done.send((id, report));
            }
        });
        self.handles.push(handle);
    }

    fn http_client(&mut self) -> AwaitResult<HttpClient> {
        if let Some(client) = &self.http {
            return Ok(client.clone());
        }
        let client = HttpClient::new(self.http_settings.clone(), self.timeout)?;
        self.http = Some(client.clone());
        Ok(client)
    }

    /// Labels of the targets that have not been confirmed ready.
    pub fn pending(&self) -> Vec<&str> {
        self.pending.values().map(String::as_str).collect()
    }

    /// Wait until every checker is ready or the deadline elapses.
    pub async fn wait(self) -> Outcome {
        let Self {
            timeout,
            deadline,
            mut pending,
            handles,
            shutdown_tx,
            done_tx,
            mut done_rx,
            ..
        } = self;
        // Only the checkers hold senders from here on.
        drop(done_tx);

        let mut reports = Vec::with_capacity(pending.len());
        let expiry = tokio::time::sleep_until(deadline);
        tokio::pin!(expiry);

        let outcome = loop {
            if pending.is_empty() {
                break Outcome::AllReady(reports);
            }

            tokio::select! {
                biased;

                message = done_rx.recv() => match message {
                    Some((id, report)) => {
                        pending.remove(&id);
                        reports.push(report);
                    }
                    None => {
                        // Every remaining checker exited without reporting.
                        (&mut expiry).await;
                        break Outcome::TimedOut { pending: pending.into_values().collect() };
                    }
                },
                _ = &mut expiry => {
                    break Outcome::TimedOut { pending: pending.into_values().collect() };
                }
            }
        };

        let _ = shutdown_tx.send(true);
        for handle in &handles {
            handle.abort();
        }

        match &outcome {
            Outcome::AllReady(reports) => {
                info!(targets = reports.len(), "all dependencies are ready");
            }
            Outcome::TimedOut { pending } => {
                // Reported to the user by the caller, through `into_result`.
                debug!(
                    timeout = ?timeout,
                    pending = %pending.join(", "),
                    "deadline elapsed with dependencies pending"
                );
            }
        }
        outcome
    }
}
