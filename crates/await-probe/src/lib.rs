//! await-probe — readiness engine for the `await` command.
//!
//! Blocks until a set of dependencies (files, TCP/UNIX sockets, HTTP(S)
//! endpoints) are ready, bounded by one global deadline.
//!
//! # Architecture
//!
//! ```text
//! Orchestrator
//!   ├── Per-target checker task
//!   │   ├── Probe (file / socket / http) → CheckOutcome
//!   │   └── Backoff (own state, shared policy) between retries
//!   ├── Completion channel (one report per ready checker)
//!   └── Deadline race → AllReady | TimedOut
//! ```
//!
//! # Cancellation
//!
//! Whatever the outcome, the orchestrator raises a shared `watch` signal
//! that every checker observes before each probe, during each probe and
//! during each backoff sleep, then aborts the tasks.
//!
//! Transient failures (refused connections, non-2xx responses, missing
//! files, body rule mismatches) never escape a checker; only configuration
//! errors and deadline exhaustion surface as [`AwaitError`].

pub mod backoff;
pub mod checker;
pub mod config;
pub mod error;
pub mod http;
pub mod launch;
pub mod orchestrator;
pub mod probe;
pub mod target;
pub mod tls;
pub mod validate;

pub use backoff::{Backoff, BackoffPolicy};
pub use checker::CheckerReport;
pub use config::{HttpHeader, HttpSettings, WaitConfig, parse_duration};
pub use error::{AwaitError, AwaitResult};
pub use launch::{ExecLauncher, Launcher};
pub use orchestrator::{Orchestrator, Outcome};
pub use probe::{CheckOutcome, Probe};
pub use target::{Scheme, TargetDescriptor};
pub use validate::{Validation, ValidationRule, validate};
