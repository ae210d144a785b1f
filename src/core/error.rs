//! Error types for world repair and block storage

use std::path::PathBuf;

use thiserror::Error;

use crate::storage::provider::ProviderKind;

/// Main error type for the crate
#[derive(Debug, Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("File format error: {0}")]
    FileFormat(String),

    #[error("Coordinate ({x}, {y}, {z}) is outside the block key range")]
    CoordinateOutOfRange { x: i32, y: i32, z: i32 },

    #[error("File not found")]
    NotFound(PathBuf),

    #[error("Unknown provider")]
    UnknownProvider,

    #[error("Fixing chunks is not supported for the {0} provider")]
    UnsupportedProvider(ProviderKind),

    #[error("Error while loading provider: {0}")]
    ProviderInit(String),

    #[error("Config error: {0}")]
    Config(String),
}
