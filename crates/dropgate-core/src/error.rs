//! Error types for Dropgate core

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while constructing the gate
#[derive(Debug, Error)]
pub enum GateError {
    #[error("cannot access serve root {}: {source}", path.display())]
    RootUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("serve root {} is not a directory", .0.display())]
    RootNotADirectory(PathBuf),
}
