//! Versioned task definition registration primitives.
//!
//! This crate owns the lock coordination protocol, the BOM contract and the
//! naming rules for lock keys, task families and container images. It
//! intentionally excludes AWS SDK and Lambda runtime concerns; every external
//! call goes through the `LockTable`, `ResourceRegistrar` and `Sleeper` seams.

pub mod contract;
pub mod coordinator;
pub mod lock;
pub mod naming;
pub mod registrar;
pub mod sleep;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;
