//! Multi-factor session orchestration for vehicle access.
//!
//! An [`MfaSession`] tracks the lifecycle of each required factor, drives the
//! proximity and tag channels under per-factor timeouts, and submits the
//! collected proofs to a [`RemoteVerifier`] once everything has completed.
//! [`CompletionPoller`] covers deployments where the backend decides
//! completion and the client only polls for the result.

pub mod error;
pub mod polling;
pub mod session;
pub mod verifier;

pub use error::{MfaError, Result};
pub use polling::{
    CompletionPoller, CompletionSource, HttpCompletionSource, PollResponse, PollResult,
};
pub use session::{ActivationPolicy, MfaSession, ACCESS_PAYLOAD};
pub use verifier::{HttpVerifier, RemoteVerifier, VerifyRequest, VerifyResponse};
