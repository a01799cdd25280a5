pub use serde::*;
pub use strings::*;

pub mod serde;
pub mod strings;
