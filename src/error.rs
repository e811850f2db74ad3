// src/error.rs
//
// Error taxonomy for the simulator. Only bootstrap errors leave `run()`;
// everything raised at runtime is logged by the dispatcher or replay loop.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimError {
    /// Bad startup arguments or settings file
    #[error("configuration error: {0}")]
    Config(String),

    /// Port unavailable at open, or a failed read/write/baud change
    #[error("transport error on {port}: {message}")]
    Transport { port: String, message: String },

    #[error("data file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A replay task may run only once
    #[error("replay task for {0} has already been started")]
    TaskSpent(String),
}

impl SimError {
    pub fn transport(port: impl Into<String>, message: impl Into<String>) -> Self {
        SimError::Transport {
            port: port.into(),
            message: message.into(),
        }
    }
}

pub type Result<T, E = SimError> = std::result::Result<T, E>;
