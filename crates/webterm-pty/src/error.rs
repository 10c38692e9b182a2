//! Error types for pty sessions.

use std::io;
use thiserror::Error;

/// Errors from creating or driving a pty session.
#[derive(Error, Debug)]
pub enum PtyError {
    /// Rejected before anything was spawned (empty command, zero size, ...).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Allocating the pty, forking, or starting the pump failed.
    #[error("failed to create process: {0}")]
    ProcessCreation(String),

    /// I/O failure on the pty stream.
    #[error("pty stream error: {0}")]
    Stream(#[from] io::Error),

    /// A thread panicked while holding the terminal lock.
    #[error("terminal state lock poisoned")]
    Poisoned,
}

/// Result type for pty operations.
pub type Result<T> = std::result::Result<T, PtyError>;
