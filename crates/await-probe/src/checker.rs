//! Per-target retry loop.
//!
//! A checker probes one target until it is ready, sleeping for its own
//! backoff interval between attempts. It never enforces the global
//! deadline; the orchestrator cancels it through the shutdown channel.

use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info};

use crate::backoff::Backoff;
use crate::probe::{CheckOutcome, Probe};

/// Summary of a checker that reached `Ready`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckerReport {
    /// Target label, usually the URL as given.
    pub label: String,
    /// Probes issued, including the successful one.
    pub probes: u32,
    /// Backoff sleeps taken.
    pub sleeps: u32,
    /// Total time spent sleeping.
    pub slept: Duration,
}

/// Probe until ready or cancelled.
///
/// Returns `None` when the shutdown signal fires (or its sender goes away)
/// before the target became ready. Once a probe reports `Ready` the loop
/// ends and the probe is never called again.
pub async fn run_checker<P: Probe>(
    label: String,
    mut probe: P,
    mut backoff: Backoff,
    mut shutdown: watch::Receiver<bool>,
) -> Option<CheckerReport> {
    let mut report = CheckerReport {
        label,
        probes: 0,
        sleeps: 0,
        slept: Duration::ZERO,
    };

    loop {
        if *shutdown.borrow() {
            debug!(url = %report.label, "checker cancelled");
            return None;
        }

        report.probes += 1;
        let outcome = tokio::select! {
            outcome = probe.probe() => outcome,
            _ = shutdown.changed() => {
                debug!(url = %report.label, "checker cancelled during probe");
                return None;
            }
        };

        match outcome {
            CheckOutcome::Ready => {
                info!(url = %report.label, probes = report.probes, "dependency is ready");
                return Some(report);
            }
            CheckOutcome::Retry(reason) => {
                let wait = backoff.next_interval();
                info!(url = %report.label, %reason, sleeping = ?wait, "dependency not ready");

                tokio::select! {
                    _ = tokio::time::sleep(wait) => {}
                    _ = shutdown.changed() => {
                        debug!(url = %report.label, "checker cancelled during backoff");
                        return None;
                    }
                }
                report.sleeps += 1;
                report.slept += wait;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use tokio::time::Instant;

    use super::*;
    use crate::backoff::BackoffPolicy;
    use crate::probe::SocketProbe;
    use crate::target::TargetDescriptor;

    /// Fails a fixed number of times, then reports ready.
    struct Flaky {
        failures: u32,
        calls: Arc<AtomicU32>,
    }

    impl Probe for Flaky {
        async fn probe(&mut self) -> CheckOutcome {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                CheckOutcome::Retry("connection refused".to_string())
            } else {
                CheckOutcome::Ready
            }
        }
    }

    fn flaky(failures: u32) -> (Flaky, Arc<AtomicU32>) {
        let calls = Arc::new(AtomicU32::new(0));
        (
            Flaky {
                failures,
                calls: calls.clone(),
            },
            calls,
        )
    }

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    #[tokio::test(start_paused = true)]
    async fn ready_on_first_probe_never_sleeps() {
        let (probe, calls) = flaky(0);
        let (_tx, rx) = watch::channel(false);
        let started = Instant::now();

        let report = run_checker("x".into(), probe, BackoffPolicy::fixed(secs(1)).start(), rx)
            .await
            .unwrap();

        assert_eq!(report.probes, 1);
        assert_eq!(report.sleeps, 0);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn three_refusals_sleep_three_intervals() {
        let (probe, calls) = flaky(3);
        let (_tx, rx) = watch::channel(false);
        let started = Instant::now();

        let report = run_checker("db".into(), probe, BackoffPolicy::fixed(secs(1)).start(), rx)
            .await
            .unwrap();

        assert_eq!(report.probes, 4);
        assert_eq!(report.sleeps, 3);
        assert_eq!(report.slept, secs(3));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        let elapsed = started.elapsed();
        assert!(elapsed >= secs(3) && elapsed < secs(3) + Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_doubles_between_probes() {
        let (probe, _calls) = flaky(4);
        let (_tx, rx) = watch::channel(false);

        let policy = BackoffPolicy::new(secs(1), secs(4), true);
        let report = run_checker("db".into(), probe, policy.start(), rx).await.unwrap();

        // 1 + 2 + 4 + 4
        assert_eq!(report.slept, secs(11));
    }

    #[tokio::test(start_paused = true)]
    async fn no_probes_after_ready() {
        let (probe, calls) = flaky(2);
        let (_tx, rx) = watch::channel(false);

        run_checker("db".into(), probe, BackoffPolicy::fixed(secs(1)).start(), rx)
            .await
            .unwrap();
        tokio::time::sleep(secs(60)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_sleeping_checker() {
        let (probe, calls) = flaky(u32::MAX);
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(run_checker(
            "never".into(),
            probe,
            BackoffPolicy::fixed(secs(5)).start(),
            rx,
        ));

        tokio::time::sleep(secs(12)).await;
        tx.send(true).unwrap();
        assert_eq!(handle.await.unwrap(), None);

        let seen = calls.load(Ordering::SeqCst);
        tokio::time::sleep(secs(60)).await;
        assert_eq!(calls.load(Ordering::SeqCst), seen);
    }

    /// Real TCP dial that starts listening once it has been refused three times.
    struct ListensAfterRefusals {
        inner: SocketProbe,
        port: u16,
        refusals: u32,
        listener: Option<std::net::TcpListener>,
    }

    impl Probe for ListensAfterRefusals {
        async fn probe(&mut self) -> CheckOutcome {
            let outcome = self.inner.probe().await;
            if matches!(outcome, CheckOutcome::Retry(_)) {
                self.refusals += 1;
                if self.refusals == 3 {
                    self.listener = Some(std::net::TcpListener::bind(("127.0.0.1", self.port)).unwrap());
                }
            }
            outcome
        }
    }

    #[tokio::test(start_paused = true)]
    async fn socket_refused_three_times_then_accepted() {
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let target = TargetDescriptor::parse(&format!("tcp://127.0.0.1:{port}")).unwrap();
        let probe = ListensAfterRefusals {
            inner: SocketProbe::new(target, secs(30)),
            port,
            refusals: 0,
            listener: None,
        };
        let (_tx, rx) = watch::channel(false);

        let report = run_checker("db".into(), probe, BackoffPolicy::fixed(secs(1)).start(), rx)
            .await
            .unwrap();

        assert_eq!(report.probes, 4);
        assert_eq!(report.sleeps, 3);
        assert_eq!(report.slept, secs(3));
    }

    #[tokio::test]
    async fn already_cancelled_never_probes() {
        let (probe, calls) = flaky(0);
        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();

        let result = run_checker("x".into(), probe, BackoffPolicy::default().start(), rx).await;
        assert_eq!(result, None);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
