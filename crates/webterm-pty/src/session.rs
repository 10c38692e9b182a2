//! A running terminal session: child process, pty, emulator and pump.

use std::ffi::OsStr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::SystemTime;

use tokio::sync::watch;
use webterm_vt::Terminal;

use crate::config::SessionConfig;
use crate::error::{PtyError, Result};
use crate::pty::{ExitStatus, Pty, UnixPty};
use crate::pump::{start_pump, PumpExit};

/// A terminal session that pairs a child process on a pty with a terminal
/// emulator.
///
/// A background pump thread feeds child output into the emulator for the
/// whole life of the session; [`Session::sync_request`] injects keystrokes
/// and renders the screen against the same emulator.
///
/// Dropping a session kills it.
pub struct Session {
    pid: u32,
    created_at: SystemTime,
    pub(crate) config: SessionConfig,
    pub(crate) terminal: Arc<Mutex<Terminal>>,
    pub(crate) pty: Arc<dyn Pty>,
    finished: watch::Receiver<Option<PumpExit>>,
    _pump: JoinHandle<()>,
}

impl Session {
    /// Spawn `command` (program path followed by its arguments) on a new pty
    /// and start pumping its output.
    pub fn spawn<S: AsRef<OsStr>>(config: SessionConfig, command: &[S]) -> Result<Self> {
        config.validate()?;
        let pty = UnixPty::spawn(config.width, config.height, command, &config.term)?;
        Self::with_pty(config, Arc::new(pty))
    }

    /// Build a session around an already running pty.
    ///
    /// The pty is killed if the pump cannot be started.
    pub fn with_pty(config: SessionConfig, pty: Arc<dyn Pty>) -> Result<Self> {
        if let Err(e) = config.validate() {
            pty.kill();
            return Err(e);
        }

        let pid = pty.pid();
        let terminal = Arc::new(Mutex::new(Terminal::new(config.width, config.height)));
        let (finished_tx, finished) = watch::channel(None);

        let pump = start_pump(
            pid,
            Arc::clone(&terminal),
            Arc::clone(&pty),
            config.read_chunk_size,
            finished_tx,
        )
        .map_err(|e| {
            pty.kill();
            PtyError::ProcessCreation(format!("failed to start pump thread: {e}"))
        })?;

        log::info!(
            "session for pid {pid} started ({}x{}, TERM={})",
            config.width,
            config.height,
            config.term
        );

        Ok(Self {
            pid,
            created_at: SystemTime::now(),
            config,
            terminal,
            pty,
            finished,
            _pump: pump,
        })
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn created_at(&self) -> SystemTime {
        self.created_at
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Close the pty streams and send SIGTERM to the child. Idempotent.
    ///
    /// The pump notices within one poll interval and reports end-of-stream.
    pub fn kill(&self) {
        if !self.pty.is_closed() {
            log::info!("killing session for pid {}", self.pid);
        }
        self.pty.kill();
    }

    /// Whether the pump has stopped.
    pub fn is_finished(&self) -> bool {
        self.finished.borrow().is_some()
    }

    /// A receiver that holds `Some` once the pump has stopped.
    pub fn finished(&self) -> watch::Receiver<Option<PumpExit>> {
        self.finished.clone()
    }

    /// Wait for the pump to stop and return why it did.
    pub async fn wait_finished(&self) -> PumpExit {
        let mut finished = self.finished.clone();
        // Bound to a local so the watch `Ref` is dropped before `finished`.
        let exit = match finished.wait_for(Option::is_some).await {
            Ok(exit) => exit.clone().unwrap_or(PumpExit::EndOfStream),
            Err(_) => PumpExit::Error("pump stopped without reporting".to_string()),
        };
        exit
    }

    /// Exit status of the child, if it has been reaped.
    pub fn exit_status(&self) -> Option<ExitStatus> {
        self.pty.exit_status()
    }

    /// Window title last set by the child.
    pub fn title(&self) -> Result<Option<String>> {
        Ok(self.lock_terminal()?.title().map(str::to_owned))
    }

    /// Plain text of the whole screen, one line per row.
    pub fn screen_text(&self) -> Result<String> {
        let terminal = self.lock_terminal()?;
        let rows: Vec<String> = (0..terminal.height()).map(|y| terminal.row_text(y)).collect();
        Ok(rows.join("\n"))
    }

    pub(crate) fn lock_terminal(&self) -> Result<MutexGuard<'_, Terminal>> {
        self.terminal.lock().map_err(|_| PtyError::Poisoned)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.kill();
    }
}
