//! Durable claim store with state-tagged partitions.
//!
//! The store owns claim data. It keeps one entry per claim in exactly one
//! of three partitions — `pending`, `inserted`, `denied` — plus one
//! operation record per claim tracking the submitter-visible lifecycle.
//! Presence in the pending partition is the sole signal that a claim is
//! eligible for processing; the engine observes it and requests transitions,
//! it never mutates store contents directly.
//!
//! # Transition Discipline
//!
//! [`ClaimStore::apply`] is the one durable transition out of `Pending`.
//! Backends must make its commit atomic: if it fails partway, the claim is
//! still pending and a later pass reproduces the same decision. A claim
//! reference that has transitioned never re-enters `Pending`, including via
//! re-submission of the same payload.
//!
//! # Precondition
//!
//! A single engine instance per store. Two engines polling the same store
//! race on pending discovery; nothing here locks against that.

mod fs;
mod memory;
#[cfg(test)]
mod tests;

use std::path::PathBuf;

use thiserror::Error;

use crate::claim::{ClaimRef, DenialReason, Operation};
use crate::policy::PolicyDecision;

pub use fs::FsClaimStore;
pub use memory::MemoryClaimStore;

/// Errors surfaced by claim store backends.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    /// The claim is not in the pending partition; it either already
    /// transitioned or was never submitted.
    #[error("claim {0} is not pending")]
    NotPending(ClaimRef),

    /// No record of the claim exists anywhere in the store.
    #[error("unknown claim: {0}")]
    UnknownClaim(ClaimRef),

    /// A denied transition was requested without a denial reason.
    #[error("denial reason required for denied transition of claim {0}")]
    ReasonRequired(ClaimRef),

    /// Underlying storage I/O failed; the claim remains pending.
    #[error("storage io: {0}")]
    Io(#[from] std::io::Error),

    /// An operation record on disk could not be decoded.
    #[error("malformed operation record {path}: {detail}")]
    MalformedRecord {
        /// Path of the bad record.
        path: PathBuf,
        /// Decode failure description.
        detail: String,
    },

    /// The in-memory store's lock was poisoned by a panicking holder.
    #[error("store mutex poisoned")]
    Poisoned,
}

/// Persistent collection holding one entry per claim.
///
/// Object-safe so engines can hold `Arc<dyn ClaimStore>` and tests can swap
/// the filesystem backend for the in-memory one.
pub trait ClaimStore: Send + Sync {
    /// Submits a claim payload, returning its content-addressed reference.
    ///
    /// Creates a pending operation record and places the payload in the
    /// pending partition. Submitting a payload whose reference already
    /// transitioned is a no-op returning the existing reference — a
    /// transitioned claim never re-enters `Pending`.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload or record cannot be persisted.
    fn submit(&self, payload: &[u8]) -> Result<ClaimRef, StoreError>;

    /// Takes a fresh snapshot of the pending partition.
    ///
    /// No enumeration order is guaranteed. Claims submitted after the
    /// snapshot is taken do not appear in it.
    ///
    /// # Errors
    ///
    /// Returns an error if the partition cannot be enumerated.
    fn pending(&self) -> Result<Vec<ClaimRef>, StoreError>;

    /// Reads the payload bytes of a claim in any partition.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UnknownClaim`] if no partition holds the claim.
    fn read_claim(&self, claim: &ClaimRef) -> Result<Vec<u8>, StoreError>;

    /// Retrieves the submitter-visible operation record for a claim.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UnknownClaim`] if the claim was never
    /// submitted.
    fn operation(&self, claim: &ClaimRef) -> Result<Operation, StoreError>;

    /// Commits the durable transition of one claim out of `Pending`.
    ///
    /// On [`PolicyDecision::Insert`] the claim moves to the inserted
    /// partition, visible to the ledger-insertion path. On
    /// [`PolicyDecision::Denied`] it moves to the denied partition and the
    /// reason lands verbatim on the operation record. Successful return is
    /// the single authoritative removal from the pending set.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotPending`] if the claim is not pending,
    /// [`StoreError::ReasonRequired`] if a denied transition carries no
    /// reason, or an I/O error (in which case the claim is still pending).
    fn apply(
        &self,
        claim: &ClaimRef,
        decision: PolicyDecision,
        reason: Option<&DenialReason>,
    ) -> Result<(), StoreError>;
}
