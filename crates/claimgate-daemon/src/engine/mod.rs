//! The policy engine loop.
//!
//! [`PolicyEngine`] discovers pending claims by polling the claim store and
//! drives each through the two-stage pipeline: validator, then enforcer.
//! There are no push notifications — a fresh snapshot of the pending set is
//! taken every pass, and claims arriving after a snapshot wait for the next
//! one.
//!
//! # Single-Processing Semantics
//!
//! The engine performs no locking and no deduplication of its own. A claim
//! disappears from the pending set exactly when the enforcer's transition
//! commits, so repeated polling re-discovers a claim only for as long as no
//! decision has durably landed — at-least-once progress toward a terminal
//! state, never two decisions for one claim.
//!
//! # Failure Isolation
//!
//! A failure in one claim's pipeline never aborts the pass: the claim stays
//! pending, the error is logged, and the rest of the snapshot is processed.
//! An enforcement failure additionally puts the claim on per-claim
//! exponential backoff so a persistently broken transition does not hot-loop
//! at poll cadence. Backoff state is engine-local and forgotten once the
//! claim leaves the pending set.
//!
//! # Concurrency Model
//!
//! One background task per engine instance; claims are processed strictly
//! sequentially to keep enforcement decisions totally ordered against the
//! shared store. The only state shared with the controller is the one-way
//! [`CancelToken`], checked between passes (non-preemptive: a started
//! pipeline step runs to completion).


use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use claimgate_core::claim::{ClaimRef, DenialReason};
use claimgate_core::enforcer::{EnforceError, Enforcer};
use claimgate_core::policy::{PolicyDecision, SchemaRef, Validator, ValidatorError};
use claimgate_core::store::{ClaimStore, StoreError};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Default polling cadence.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Default floor for per-claim enforcement backoff.
pub const DEFAULT_BACKOFF_FLOOR: Duration = Duration::from_millis(100);

/// Default ceiling for per-claim enforcement backoff.
pub const DEFAULT_BACKOFF_CEILING: Duration = Duration::from_secs(5);

/// One-way cancellation flag shared between the controller and the engine
/// task.
///
/// Set-once, monotonic, no reset: once cancelled it stays cancelled for the
/// lifetime of the run. The engine checks it only at the inter-pass
/// boundary.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Creates a token in the not-cancelled state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Signals cancellation. Idempotent.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Whether cancellation has been signalled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Configuration for the policy engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Schema reference handed to the validator for every claim.
    pub schema: SchemaRef,
    /// Sleep between passes over the pending set.
    pub poll_interval: Duration,
    /// First retry delay after an enforcement failure.
    pub backoff_floor: Duration,
    /// Upper bound on the enforcement retry delay.
    pub backoff_ceiling: Duration,
}

impl EngineConfig {
    /// Creates a configuration with default timings.
    #[must_use]
    pub fn new(schema: SchemaRef) -> Self {
        Self {
            schema,
            poll_interval: DEFAULT_POLL_INTERVAL,
            backoff_floor: DEFAULT_BACKOFF_FLOOR,
            backoff_ceiling: DEFAULT_BACKOFF_CEILING,
        }
    }

    /// Sets the polling cadence.
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets the enforcement backoff bounds.
    #[must_use]
    pub const fn with_backoff(mut self, floor: Duration, ceiling: Duration) -> Self {
        self.backoff_floor = floor;
        self.backoff_ceiling = ceiling;
        self
    }
}

/// Errors surfaced by the engine lifecycle.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EngineError {
    /// The engine task panicked or was aborted before joining.
    #[error("engine task failed to join: {0}")]
    Join(String),
}

/// Failure of one claim's pipeline within a pass.
///
/// Each variant keeps the claim pending; they differ only in how the loop
/// reacts (skip quietly, warn and retry, or back off).
#[derive(Debug, Error)]
enum PipelineError {
    /// Reading the claim or enumerating it failed; retried next pass.
    #[error("discovery: {0}")]
    Discovery(#[from] StoreError),

    /// The validator could not produce an outcome; retried next pass.
    #[error("validator: {0}")]
    Validator(#[from] ValidatorError),

    /// The enforcer malfunctioned; retried with backoff.
    #[error("enforcement: {0}")]
    Enforcement(EnforceError),

    /// The claim already transitioned; nothing to do.
    #[error("claim already transitioned")]
    AlreadyTransitioned,
}

impl From<EnforceError> for PipelineError {
    fn from(err: EnforceError) -> Self {
        match err {
            EnforceError::NotPending(_) => Self::AlreadyTransitioned,
            other => Self::Enforcement(other),
        }
    }
}

/// Per-claim enforcement retry state.
struct Backoff {
    consecutive_failures: u32,
    next_attempt: Instant,
}

/// Polling policy engine driving claims through validator and enforcer.
pub struct PolicyEngine {
    config: EngineConfig,
    store: Arc<dyn ClaimStore>,
    validator: Arc<dyn Validator>,
    enforcer: Arc<dyn Enforcer>,
    cancel: CancelToken,
    backoff: HashMap<ClaimRef, Backoff>,
}

impl PolicyEngine {
    /// Launches the engine as a background task and returns immediately.
    ///
    /// The returned handle owns the run: dropping it detaches the task,
    /// [`EngineHandle::stop`] cancels and joins it.
    #[must_use]
    pub fn spawn(
        config: EngineConfig,
        store: Arc<dyn ClaimStore>,
        validator: Arc<dyn Validator>,
        enforcer: Arc<dyn Enforcer>,
    ) -> EngineHandle {
        let cancel = CancelToken::new();
        let mut engine = Self {
            config,
            store,
            validator,
            enforcer,
            cancel: cancel.clone(),
            backoff: HashMap::new(),
        };
        let task = tokio::spawn(async move { engine.run().await });
        EngineHandle { cancel, task }
    }

    /// Runs until cancelled: pass over the pending snapshot, sleep one poll
    /// interval, re-check cancellation, repeat.
    async fn run(&mut self) {
        info!(
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            schema = %self.config.schema.path().display(),
            "policy engine starting"
        );

        while !self.cancel.is_cancelled() {
            self.pass();
            tokio::time::sleep(self.config.poll_interval).await;
        }

        info!("policy engine shutting down");
    }

    /// Processes one fresh snapshot of the pending set.
    fn pass(&mut self) {
        let snapshot = match self.store.pending() {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!(error = %err, "failed to enumerate pending claims");
                return;
            },
        };

        let now = Instant::now();
        for claim in &snapshot {
            if let Some(backoff) = self.backoff.get(claim) {
                if now < backoff.next_attempt {
                    debug!(claim = %claim, "enforcement backoff active, skipping");
                    continue;
                }
            }

            match self.process(claim) {
                Ok(decision) => {
                    self.backoff.remove(claim);
                    info!(claim = %claim, decision = %decision, "claim processed");
                },
                Err(PipelineError::AlreadyTransitioned) => {
                    self.backoff.remove(claim);
                    debug!(claim = %claim, "claim already transitioned, nothing to do");
                },
                Err(PipelineError::Enforcement(err)) => {
                    // Never a denial: the claim stays pending and the
                    // transition is retried after backoff.
                    let delay = self.note_enforcement_failure(claim);
                    warn!(
                        claim = %claim,
                        error = %err,
                        retry_in_ms = delay.as_millis() as u64,
                        "enforcement failed, claim remains pending"
                    );
                },
                Err(err) => {
                    warn!(claim = %claim, error = %err, "pipeline error, claim remains pending");
                },
            }
        }

        // Backoff state for claims that left the pending set is dead weight.
        self.backoff
            .retain(|claim, _| snapshot.iter().any(|pending| pending == claim));
    }

    /// Runs one claim through validator and enforcer.
    fn process(&self, claim: &ClaimRef) -> Result<PolicyDecision, PipelineError> {
        let bytes = self.store.read_claim(claim)?;
        let outcome = self.validator.check(&bytes, &self.config.schema)?;
        let decision = outcome.decision();

        // A fresh denial document per claim; never a shared template.
        let reason = (!outcome.passed).then(|| DenialReason::denied(outcome.diagnostic));

        self.enforcer.apply(claim, decision, reason.as_ref())?;
        Ok(decision)
    }

    /// Records an enforcement failure and returns the retry delay.
    fn note_enforcement_failure(&mut self, claim: &ClaimRef) -> Duration {
        let entry = self.backoff.entry(claim.clone()).or_insert(Backoff {
            consecutive_failures: 0,
            next_attempt: Instant::now(),
        });
        entry.consecutive_failures = entry.consecutive_failures.saturating_add(1);

        let exponent = entry.consecutive_failures.saturating_sub(1).min(16);
        let delay = self
            .config
            .backoff_floor
            .saturating_mul(1u32 << exponent)
            .min(self.config.backoff_ceiling);
        entry.next_attempt = Instant::now() + delay;
        delay
    }
}

/// Handle to a running engine.
pub struct EngineHandle {
    cancel: CancelToken,
    task: JoinHandle<()>,
}

impl EngineHandle {
    /// A clone of the engine's cancellation token.
    #[must_use]
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Signals cancellation and blocks until the in-flight pass and any
    /// started pipeline steps finish.
    ///
    /// Worst-case latency is one full pass over the currently pending
    /// claims plus one poll interval.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Join`] if the engine task panicked.
    pub async fn stop(self) -> Result<(), EngineError> {
        self.cancel.cancel();
        self.task
            .await
            .map_err(|err| EngineError::Join(err.to_string()))
    }
}
