//! Worldfix - sparse block edits and legacy block repair for region-file worlds

pub mod core;
pub mod math;
pub mod edit;
pub mod storage;
pub mod repair;
