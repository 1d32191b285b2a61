pub mod mode;
pub mod packing;

pub use mode::{InputLayout, QuantMode};
pub use packing::PACK_FACTOR;
