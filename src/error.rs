//! Crate error types

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DashboardError {
    #[error("could not determine config directory")]
    NoConfigDir,

    #[error("failed to read {}", path.display())]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}", path.display())]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("terminal error")]
    Terminal(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, DashboardError>;
