//! claimgate-daemon - Claim Admission Policy Engine
//!
//! This library provides the polling policy engine that drives pending
//! claims through the validation and enforcement stages defined in
//! `claimgate-core`, plus the cancellation and configuration plumbing the
//! `claimgate-daemon` binary wires together.
//!
//! # Runtime Requirements
//!
//! The engine runs as a tokio background task; spawn it from inside a tokio
//! runtime. Pipeline stages are blocking calls bounded by their own latency
//! and are executed sequentially within the task.
//!
//! # Modules
//!
//! - [`engine`]: The [`engine::PolicyEngine`] loop, its configuration, the
//!   one-way [`engine::CancelToken`], and the engine handle returned by
//!   [`engine::PolicyEngine::spawn`]

pub mod engine;

pub use engine::{CancelToken, EngineConfig, EngineError, EngineHandle, PolicyEngine};
