pub mod collections;
pub mod log;

pub use bitvec::prelude::*;
