//! Bounded plan/generate/verify/evaluate loop driven by language models.
//!
//! A run starts at Plan, returns to a routing step after every piece of work,
//! and ends at Terminate. The crate keeps a strict split:
//!
//! - **[`core`]**: Pure, deterministic logic (state, transition table, routing
//!   rules, fenced-block extraction, cycle bookkeeping). No I/O.
//! - **[`io`]**: Side effects (config files, model calls, sandboxed child
//!   processes, prompt templates, run logs).
//!
//! [`agents`] implement the individual steps on top of both, and [`engine`]
//! ties them into the state machine. [`api`] holds the JSON shapes of the HTTP
//! front door.

pub mod agents;
pub mod api;
pub mod core;
pub mod engine;
pub mod exit_codes;
pub mod io;
pub mod logging;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
