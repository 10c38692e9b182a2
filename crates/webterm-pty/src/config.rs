//! Session configuration.
//!
//! Deserializable so a transport can embed it in its own config file; every
//! field has a default.

use std::time::Duration;

use serde::Deserialize;

use crate::error::{PtyError, Result};

/// Settings fixed at session creation.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Terminal width in columns.
    pub width: u16,
    /// Terminal height in rows.
    pub height: u16,
    /// Value of `TERM` in the child environment.
    pub term: String,
    /// Coalescing delay between writing keystrokes and taking a snapshot.
    ///
    /// The snapshot reflects whatever the pump consumed within this window;
    /// output arriving later shows up in the next poll.
    pub poll_delay_ms: u64,
    /// Maximum bytes read from the pty per pump iteration.
    pub read_chunk_size: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            width: 80,
            height: 25,
            term: "linux".to_string(),
            poll_delay_ms: 20,
            read_chunk_size: 4096,
        }
    }
}

impl SessionConfig {
    /// Config with the given size and defaults for everything else.
    pub fn with_size(width: u16, height: u16) -> Self {
        Self {
            width,
            height,
            ..Self::default()
        }
    }

    pub fn poll_delay(&self) -> Duration {
        Duration::from_millis(self.poll_delay_ms)
    }

    /// Check the values that cannot be clamped into something sensible.
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(PtyError::InvalidArgument(format!(
                "terminal size must be non-zero, got {}x{}",
                self.width, self.height
            )));
        }
        if self.read_chunk_size == 0 {
            return Err(PtyError::InvalidArgument(
                "read_chunk_size must be non-zero".to_string(),
            ));
        }
        if self.term.is_empty() || self.term.contains(|c| c == '\0' || c == '=') {
            return Err(PtyError::InvalidArgument(format!(
                "invalid terminal type {:?}",
                self.term
            )));
        }
        Ok(())
    }
}
