//! claimgate-core - Claim Admission Model and Pipeline Stages
//!
//! This library provides the building blocks of the claimgate admission
//! pipeline: the claim data model, the durable claim store, and the two
//! pipeline stages (validation and enforcement) that the policy engine in
//! `claimgate-daemon` drives.
//!
//! # Modules
//!
//! - [`claim`]: Content-addressed claim references, the signed claim
//!   envelope, per-claim operation records, and denial documents
//! - [`store`]: The [`store::ClaimStore`] capability plus the filesystem
//!   and in-memory backends
//! - [`policy`]: The [`policy::Validator`] capability, validation outcomes,
//!   policy decisions, and the allowlist schema validator
//! - [`enforcer`]: The [`enforcer::Enforcer`] capability and the
//!   store-backed enforcer that commits admission transitions
//!
//! # Lifecycle Invariant
//!
//! A claim moves `Pending -> {Inserted, Denied}` exactly once. The store's
//! transition commit is the single authoritative point at which a claim
//! leaves the pending set; a reference that has transitioned never re-enters
//! `Pending`, even if the same payload is submitted again.

pub mod claim;
pub mod enforcer;
pub mod policy;
pub mod store;

pub use claim::{ClaimEnvelope, ClaimRef, DenialReason, Operation, OperationStatus};
pub use enforcer::{EnforceError, Enforcer, StoreEnforcer};
pub use policy::{
    AllowlistValidator, PolicyDecision, SchemaRef, ValidationOutcome, Validator, ValidatorError,
};
pub use store::{ClaimStore, FsClaimStore, MemoryClaimStore, StoreError};
