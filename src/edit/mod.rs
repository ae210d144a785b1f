//! Sparse block edit buffers.
//!
//! A [`BlockEditBuffer`] accumulates `(coordinate, block)` edits in
//! insertion order and replays them through a single forward cursor,
//! so large selections can be consumed incrementally and compacted
//! with [`BlockEditBuffer::reclaim`] as they are applied.

pub mod value;
pub mod buffer;

pub use value::{BlockEdit, BlockValue};
pub use buffer::{BlockEditBuffer, BlockSink, EditStream};
