//! Engine configuration: typed settings, environment loading, validation.

pub mod types;
pub mod loader;
pub mod validator;

pub use types::*;
pub use validator::*;
