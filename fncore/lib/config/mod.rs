//! Configuration types and helpers.

mod defaults;
mod fncore;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use defaults::*;
pub use fncore::*;
