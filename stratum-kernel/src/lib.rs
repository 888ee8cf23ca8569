pub mod kernel;
pub mod level;
pub mod term;

pub use kernel::*;
