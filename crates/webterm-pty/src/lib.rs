//! webterm-pty: child processes on pseudo-terminals, bridged to a terminal
//! emulator for request/response clients.
//!
//! # Architecture
//!
//! - [`UnixPty`]: forks a child onto a new pty and owns the master side.
//!   Accessed through the [`Pty`] trait.
//! - [`Session`]: pairs a pty with a [`webterm_vt::Terminal`] and runs a pump
//!   thread that feeds child output into it and writes emulator replies back.
//! - [`Session::sync_request`]: injects keystrokes and returns a
//!   [`SnapshotResponse`] of the screen.

pub mod config;
pub mod error;
pub mod pty;
pub mod pump;
pub mod session;
pub mod sync;

#[cfg(test)]
mod testing;

pub use config::SessionConfig;
pub use error::{PtyError, Result};
pub use pty::{ExitStatus, Pty, UnixPty};
pub use pump::PumpExit;
pub use session::Session;
pub use sync::SnapshotResponse;
