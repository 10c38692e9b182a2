//! Scripted pty double for exercising the pump and sessions without a child
//! process.

use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Mutex;
use std::time::Duration;

use crate::pty::{ExitStatus, Pty};

enum Chunk {
    Data(Vec<u8>),
    Fail,
}

pub(crate) struct ScriptedPty {
    incoming: Mutex<Receiver<Chunk>>,
    sender: Mutex<Option<Sender<Chunk>>>,
    pending: Mutex<Vec<u8>>,
    written: Mutex<Vec<u8>>,
    closed: AtomicBool,
    reject_writes: AtomicBool,
    pub(crate) kills: AtomicUsize,
}

impl ScriptedPty {
    pub(crate) fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            incoming: Mutex::new(rx),
            sender: Mutex::new(Some(tx)),
            pending: Mutex::new(Vec::new()),
            written: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
            reject_writes: AtomicBool::new(false),
            kills: AtomicUsize::new(0),
        }
    }

    /// Queue bytes as if the child had written them.
    pub(crate) fn emit(&self, bytes: &[u8]) {
        self.send(Chunk::Data(bytes.to_vec()));
    }

    /// Make the next read fail.
    pub(crate) fn fail_next_read(&self) {
        self.send(Chunk::Fail);
    }

    /// End the stream once queued output has been read.
    pub(crate) fn hang_up(&self) {
        self.sender.lock().unwrap().take();
    }

    pub(crate) fn reject_writes(&self) {
        self.reject_writes.store(true, Ordering::SeqCst);
    }

    /// Everything written to the child so far.
    pub(crate) fn written(&self) -> Vec<u8> {
        self.written.lock().unwrap().clone()
    }

    fn send(&self, chunk: Chunk) {
        if let Some(tx) = self.sender.lock().unwrap().as_ref() {
            let _ = tx.send(chunk);
        }
    }
}

impl Pty for ScriptedPty {
    fn pid(&self) -> u32 {
        4242
    }

    fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            if self.closed.load(Ordering::SeqCst) {
                return Ok(0);
            }

            let mut pending = self.pending.lock().unwrap();
            if !pending.is_empty() {
                let n = buf.len().min(pending.len());
                buf[..n].copy_from_slice(&pending[..n]);
                pending.drain(..n);
                return Ok(n);
            }

            match self.incoming.lock().unwrap().recv_timeout(Duration::from_millis(10)) {
                Ok(Chunk::Data(data)) => *pending = data,
                Ok(Chunk::Fail) => return Err(io::Error::other("scripted read failure")),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => return Ok(0),
            }
        }
    }

    fn write_all(&self, data: &[u8]) -> io::Result<()> {
        if self.closed.load(Ordering::SeqCst) || self.reject_writes.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "pty closed"));
        }
        self.written.lock().unwrap().extend_from_slice(data);
        Ok(())
    }

    fn kill(&self) {
        self.kills.fetch_add(1, Ordering::SeqCst);
        self.closed.store(true, Ordering::SeqCst);
        self.sender.lock().unwrap().take();
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn exit_status(&self) -> Option<ExitStatus> {
        if self.is_closed() {
            Some(ExitStatus::Signaled(libc::SIGTERM))
        } else {
            None
        }
    }
}
