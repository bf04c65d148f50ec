//! Deterministic, pure logic shared by the workflow engine.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod convergence;
pub mod extract;
pub mod graph;
pub mod invariants;
pub mod router;
pub mod types;
