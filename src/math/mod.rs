//! Block coordinate packing and bounds

pub mod block_key;
pub mod extent;

pub use block_key::BlockKey;
pub use extent::BlockExtent;
