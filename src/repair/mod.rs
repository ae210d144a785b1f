//! World repair: remap legacy block ids across every chunk of a world.
//!
//! The run is split into validation, a header-only scan of the region
//! files, and a sequential load/remap/save pass that holds one chunk in
//! memory at a time. [`RepairTask`] runs it on a background thread and
//! publishes [`RepairStatus`] snapshots.

pub mod fixer;
pub mod config;
pub mod pipeline;
pub mod task;

pub use fixer::{BlockFixer, RemapRule, RemapTable};
pub use config::RepairConfig;
pub use pipeline::{
    CancelToken, RepairState, RepairStatus, WorldRepair,
    remap_chunk, scan_region_dir, FINISHED,
};
pub use task::RepairTask;
