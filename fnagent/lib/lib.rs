//! `fnagent` is the execution agent baked into every function runtime image.
//!
//! One agent instance runs inside each pod of a deployed function. It exposes
//! a small HTTP surface:
//!
//! - `GET /health` — liveness/readiness probe target
//! - `POST /load` — install code, handler name and environment variables for
//!   subsequent invocations
//! - `POST /invoke` — execute the handler once against an event payload,
//!   optionally loading code inline for one-shot use
//!
//! Handler execution happens in a runtime-specific driver child process that
//! is force-killed when the invocation timeout elapses, so a runaway handler
//! never outlives its budget.

#![warn(missing_docs)]

mod error;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub mod api;
pub mod executor;
pub mod server;

pub use error::*;
