//! Per-session pump thread that reads pty output and feeds it into the terminal.
//!
//! Pty reads block, so each session gets its own OS thread. The pty handle is
//! shared with the session rather than kept behind the terminal mutex, so a
//! blocked read never stops sync requests from rendering the screen.

use std::io;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use tokio::sync::watch;
use webterm_vt::Terminal;

use crate::pty::Pty;

/// Why a pump stopped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PumpExit {
    /// The child closed its side of the pty, or the session was killed.
    EndOfStream,
    /// Reading, replying or locking the terminal failed.
    Error(String),
}

/// Start the read loop for a session on a dedicated OS thread named
/// `pty-pump-<pid>`.
///
/// When the loop ends, `finished` is set exactly once. The pump never kills
/// the child itself.
pub(crate) fn start_pump(
    pid: u32,
    terminal: Arc<Mutex<Terminal>>,
    pty: Arc<dyn Pty>,
    chunk_size: usize,
    finished: watch::Sender<Option<PumpExit>>,
) -> io::Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name(format!("pty-pump-{pid}"))
        .spawn(move || {
            let exit = pump_loop(&terminal, pty.as_ref(), chunk_size);
            match &exit {
                PumpExit::EndOfStream => log::debug!("pump for pid {pid} reached end of stream"),
                PumpExit::Error(reason) => log::warn!("pump for pid {pid} stopped: {reason}"),
            }
            finished.send_replace(Some(exit));
        })
}

fn pump_loop(terminal: &Mutex<Terminal>, pty: &dyn Pty, chunk_size: usize) -> PumpExit {
    let mut buf = vec![0u8; chunk_size.max(1)];

    loop {
        let n = match pty.read(&mut buf) {
            Ok(0) => return PumpExit::EndOfStream,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return PumpExit::Error(format!("read failed: {e}")),
        };

        // Lock only long enough to parse the chunk and collect any reply.
        let reply = {
            let mut terminal = match terminal.lock() {
                Ok(t) => t,
                Err(_) => return PumpExit::Error("terminal lock poisoned".to_string()),
            };
            terminal.consume(&buf[..n]);
            terminal.drain_reply()
        };

        if let Some(reply) = reply {
            if let Err(e) = pty.write_all(&reply) {
                return PumpExit::Error(format!("reply write failed: {e}"));
            }
        }
    }
}
