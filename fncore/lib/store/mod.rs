//! Persistence of function, invocation, trigger and depset records.
//!
//! The store keeps only what the control plane needs to drive orchestration;
//! business entities beyond that live with the outer layer. Lifecycle
//! transitions are expressed as conditional UPDATEs so concurrent jobs cannot
//! both win the same edge.

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub mod db;
pub mod depsets;
pub mod functions;
pub mod invocations;
pub mod triggers;
