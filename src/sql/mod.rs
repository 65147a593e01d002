//! Safe SQL: identifiers from resolved metadata only, values as parameters.

mod builder;
mod compile;
pub mod params;
pub mod read;

pub use builder::*;
pub use compile::{CompiledRead, StatementCompiler};
pub use params::*;
pub use read::{ReadPlan, ReadRequest};
