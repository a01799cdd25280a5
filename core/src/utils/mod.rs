pub use keypair::*;

pub mod keypair;
