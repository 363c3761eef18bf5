//! Enforcement stage of the admission pipeline.
//!
//! The [`Enforcer`] capability commits the durable, atomic transition for
//! exactly one claim. Its own success or failure is a separate signal from
//! the content-level decision it is asked to apply: an enforcer that
//! malfunctions while applying a denial has not denied anything, and the
//! claim must still be pending afterwards.

use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::claim::{ClaimRef, DenialReason};
use crate::policy::PolicyDecision;
use crate::store::{ClaimStore, StoreError};

/// Errors surfaced by the enforcement stage.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EnforceError {
    /// A denied decision arrived without a denial reason.
    #[error("denial reason required when decision is denied for claim {0}")]
    MissingReason(ClaimRef),

    /// The claim already left the pending set; nothing to do.
    #[error("claim {0} is not pending")]
    NotPending(ClaimRef),

    /// The underlying transition failed; the claim remains pending.
    #[error("store transition failed: {0}")]
    Store(#[from] StoreError),
}

/// Commits the durable transition for one claim.
///
/// Like the validator, this is a seam: the in-process [`StoreEnforcer`] is
/// the primary implementation, but the engine must not assume any
/// particular execution boundary.
///
/// # Contract
///
/// - `reason` is required when `decision` is [`PolicyDecision::Denied`] and
///   is surfaced to the submitter byte-for-byte.
/// - A mid-flight failure leaves the claim pending; only successful return
///   removes it from the pending set. That removal is what gives the engine
///   single-processing semantics — there is no separate locking.
pub trait Enforcer: Send + Sync {
    /// Applies the decision to the claim.
    ///
    /// # Errors
    ///
    /// Returns [`EnforceError::MissingReason`] for a reasonless denial,
    /// [`EnforceError::NotPending`] if the claim already transitioned, or a
    /// store error if the transition could not commit.
    fn apply(
        &self,
        claim: &ClaimRef,
        decision: PolicyDecision,
        reason: Option<&DenialReason>,
    ) -> Result<(), EnforceError>;
}

/// Enforcer that commits transitions directly against a claim store.
pub struct StoreEnforcer {
    store: Arc<dyn ClaimStore>,
}

impl StoreEnforcer {
    /// Creates an enforcer over the given store.
    #[must_use]
    pub fn new(store: Arc<dyn ClaimStore>) -> Self {
        Self { store }
    }
}

impl Enforcer for StoreEnforcer {
    fn apply(
        &self,
        claim: &ClaimRef,
        decision: PolicyDecision,
        reason: Option<&DenialReason>,
    ) -> Result<(), EnforceError> {
        if decision == PolicyDecision::Denied && reason.is_none() {
            return Err(EnforceError::MissingReason(claim.clone()));
        }

        self.store
            .apply(claim, decision, reason)
            .map_err(|err| match err {
                StoreError::NotPending(claim) => EnforceError::NotPending(claim),
                other => EnforceError::Store(other),
            })?;

        debug!(claim = %claim, decision = %decision, "transition enforced");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claim::OperationStatus;
    use crate::store::MemoryClaimStore;

    fn setup() -> (Arc<MemoryClaimStore>, StoreEnforcer, ClaimRef) {
        let store = Arc::new(MemoryClaimStore::new());
        let claim = store.submit(b"claim").unwrap();
        let enforcer = StoreEnforcer::new(Arc::clone(&store) as Arc<dyn ClaimStore>);
        (store, enforcer, claim)
    }

    #[test]
    fn insert_decision_commits_transition() {
        let (store, enforcer, claim) = setup();

        enforcer.apply(&claim, PolicyDecision::Insert, None).unwrap();
        assert_eq!(
            store.operation(&claim).unwrap().status,
            OperationStatus::Inserted
        );
    }

    #[test]
    fn denied_decision_without_reason_is_rejected_before_the_store() {
        let (store, enforcer, claim) = setup();

        let err = enforcer
            .apply(&claim, PolicyDecision::Denied, None)
            .unwrap_err();
        assert!(matches!(err, EnforceError::MissingReason(_)));
        // The claim is untouched.
        assert_eq!(
            store.operation(&claim).unwrap().status,
            OperationStatus::Pending
        );
    }

    #[test]
    fn denied_decision_carries_reason_verbatim() {
        let (store, enforcer, claim) = setup();
        let reason = DenialReason::denied("'x' is not one of ['y']");

        enforcer
            .apply(&claim, PolicyDecision::Denied, Some(&reason))
            .unwrap();
        assert_eq!(store.operation(&claim).unwrap().error, Some(reason));
    }

    #[test]
    fn transitioned_claim_reports_not_pending() {
        let (_store, enforcer, claim) = setup();
        enforcer.apply(&claim, PolicyDecision::Insert, None).unwrap();

        let err = enforcer
            .apply(&claim, PolicyDecision::Insert, None)
            .unwrap_err();
        assert!(matches!(err, EnforceError::NotPending(_)));
    }
}
