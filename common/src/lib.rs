pub use logger::*;
pub use ring_buffer::*;
pub use utils::*;

pub mod logger;
pub mod macros;
pub mod ring_buffer;
pub mod utils;
