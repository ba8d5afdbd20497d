//! In-process adapter implementations of the repository ports.
//!
//! Durable adapters live in their own crates; what is here is suitable for
//! tests and disposable deployments only.

pub mod memory_repo;
