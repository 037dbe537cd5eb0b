//! Shared test utilities for the OIDC token client.
//!
//! This crate provides:
//! - Proptest generators for URLs, paths and tokens
//! - Mock transport, stores and notifier recording what the manager does
//! - Signed token fixtures and a test tracing subscriber

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod mocks;

pub use fixtures::*;
pub use generators::*;
pub use mocks::*;
