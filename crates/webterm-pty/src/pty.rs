use std::ffi::{CString, OsStr};
use std::fs::File;
use std::io::{self, Read, Write};
use std::os::fd::{AsFd, AsRawFd, RawFd};
use std::os::unix::ffi::OsStrExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use libc::{c_char, c_int};
use nix::errno::Errno;
use nix::fcntl::{fcntl, FcntlArg, OFlag};
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use nix::pty::{openpty, Winsize};
use nix::sys::signal::{kill, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{fork, ForkResult, Pid};

use crate::error::{PtyError, Result};

/// How long a blocked `read` or `write_all` waits before re-checking whether
/// the pty was killed from another thread.
const POLL_INTERVAL_MS: u16 = 50;

/// Upper bound on the descriptor walk in the child when `close_range` is not
/// available. Containers often report limits in the millions.
const MAX_CLOSED_FD: c_int = 65_536;

/// How a child process ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExitStatus {
    /// Exited normally with this code.
    Exited(i32),
    /// Terminated by this signal number.
    Signaled(i32),
}

/// A child process attached to a pty.
///
/// This is the narrow interface the session pump and sync bridge work
/// against; tests substitute a scripted double for the real [`UnixPty`].
/// All methods take `&self` because the pump reads while request handlers
/// write and any thread may kill.
pub trait Pty: Send + Sync {
    /// Process id of the child.
    fn pid(&self) -> u32;

    /// Read child output. Blocks until data is available and returns `Ok(0)`
    /// at end-of-stream or after [`Pty::kill`].
    fn read(&self, buf: &mut [u8]) -> io::Result<usize>;

    /// Write all of `data` to the child. Concurrent calls never interleave
    /// their bytes. A write stalled by a child that stops reading fails with
    /// `BrokenPipe` once [`Pty::kill`] is called.
    fn write_all(&self, data: &[u8]) -> io::Result<()>;

    /// Close both streams and send SIGTERM to the child. Idempotent.
    fn kill(&self);

    /// Whether [`Pty::kill`] has been called.
    fn is_closed(&self) -> bool;

    /// Exit status of the child, if it has exited. Never blocks.
    fn exit_status(&self) -> Option<ExitStatus>;
}

/// Owns a forked child process and the master side of its pty.
///
/// The reader and writer are separate descriptors (the master and a
/// duplicate) so that reads and writes lock independently.
pub struct UnixPty {
    pid: Pid,
    reader: Mutex<Option<File>>,
    writer: Mutex<Option<File>>,
    closed: AtomicBool,
    status: Mutex<Option<ExitStatus>>,
}

impl UnixPty {
    /// Spawn `command` (program path followed by its arguments) on a new pty
    /// of `width × height`, with `TERM` set to `term`.
    ///
    /// The program path is used as is; there is no `PATH` lookup. A program
    /// that fails to exec makes the child exit with status 127.
    pub fn spawn<S: AsRef<OsStr>>(width: u16, height: u16, command: &[S], term: &str) -> Result<Self> {
        if command.is_empty() {
            return Err(PtyError::InvalidArgument(
                "no command line arguments".to_string(),
            ));
        }
        if width == 0 || height == 0 {
            return Err(PtyError::InvalidArgument(format!(
                "terminal size must be non-zero, got {width}x{height}"
            )));
        }

        // Everything the child needs is prepared here: after fork it may only
        // make async-signal-safe calls.
        let argv = command
            .iter()
            .map(|arg| CString::new(arg.as_ref().as_bytes()))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| PtyError::InvalidArgument(format!("command contains a NUL byte: {e}")))?;
        let envp = child_environment(term)?;
        let argv_ptrs = null_terminated(&argv);
        let envp_ptrs = null_terminated(&envp);
        let max_fd = descriptor_table_size();

        let winsize = Winsize {
            ws_row: height,
            ws_col: width,
            ws_xpixel: 0,
            ws_ypixel: 0,
        };
        let pair = openpty(&winsize, None)
            .map_err(|e| PtyError::ProcessCreation(format!("failed to open pty: {e}")))?;

        match unsafe { fork() } {
            Err(e) => Err(PtyError::ProcessCreation(format!("fork failed: {e}"))),
            Ok(ForkResult::Child) => unsafe {
                exec_child(pair.slave.as_raw_fd(), max_fd, &argv_ptrs, &envp_ptrs)
            },
            Ok(ForkResult::Parent { child }) => {
                drop(pair.slave);
                let reader = File::from(pair.master);
                let writer = match set_nonblocking(&reader).and_then(|()| reader.try_clone()) {
                    Ok(writer) => writer,
                    Err(e) => {
                        let _ = kill(child, Signal::SIGTERM);
                        return Err(PtyError::ProcessCreation(format!(
                            "failed to set up pty descriptor: {e}"
                        )));
                    }
                };
                log::debug!(
                    "spawned {:?} as pid {child} on a {width}x{height} pty",
                    command[0].as_ref()
                );
                Ok(Self {
                    pid: child,
                    reader: Mutex::new(Some(reader)),
                    writer: Mutex::new(Some(writer)),
                    closed: AtomicBool::new(false),
                    status: Mutex::new(None),
                })
            }
        }
    }
}

impl Pty for UnixPty {
    fn pid(&self) -> u32 {
        self.pid.as_raw() as u32
    }

    fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            if self.closed.load(Ordering::SeqCst) {
                return Ok(0);
            }

            let mut guard = self.reader.lock().unwrap_or_else(PoisonError::into_inner);
            let Some(file) = guard.as_mut() else {
                return Ok(0);
            };

            // The lock is held for at most one poll interval, which bounds how
            // long `kill` waits to close the descriptor.
            let ready = {
                let mut fds = [PollFd::new(file.as_fd(), PollFlags::POLLIN)];
                match poll(&mut fds, PollTimeout::from(POLL_INTERVAL_MS)) {
                    Ok(n) => n,
                    Err(Errno::EINTR) => 0,
                    Err(e) => return Err(e.into()),
                }
            };
            if ready == 0 {
                drop(guard);
                continue;
            }

            return match file.read(buf) {
                // The slave side is gone: the child and everything it forked
                // have exited.
                Err(e) if e.raw_os_error() == Some(libc::EIO) => Ok(0),
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock
                    ) =>
                {
                    continue
                }
                other => other,
            };
        }
    }

    fn write_all(&self, data: &[u8]) -> io::Result<()> {
        let closed = || io::Error::new(io::ErrorKind::BrokenPipe, "pty closed");

        // The lock is held across the whole write so concurrent callers never
        // interleave, but a child that stops reading only stalls this loop
        // until `kill` flips the closed flag.
        let mut guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let mut remaining = data;
        while !remaining.is_empty() {
            if self.closed.load(Ordering::SeqCst) {
                return Err(closed());
            }
            let file = guard.as_mut().ok_or_else(closed)?;

            let ready = {
                let mut fds = [PollFd::new(file.as_fd(), PollFlags::POLLOUT)];
                match poll(&mut fds, PollTimeout::from(POLL_INTERVAL_MS)) {
                    Ok(n) => n,
                    Err(Errno::EINTR) => 0,
                    Err(e) => return Err(e.into()),
                }
            };
            if ready == 0 {
                continue;
            }

            match file.write(remaining) {
                Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(n) => remaining = &remaining[n..],
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock
                    ) => {}
                // Killed while polling: the child may already be gone.
                Err(_) if self.closed.load(Ordering::SeqCst) => return Err(closed()),
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    fn kill(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        // Signal first: the stream locks below can be held for up to one poll
        // interval by a reader or writer that has yet to see the flag.
        match kill(self.pid, Signal::SIGTERM) {
            Ok(()) => log::debug!("sent SIGTERM to pid {}", self.pid),
            Err(Errno::ESRCH) => log::debug!("pid {} already gone", self.pid),
            Err(e) => log::warn!("failed to signal pid {}: {e}", self.pid),
        }

        self.writer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.reader
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn exit_status(&self) -> Option<ExitStatus> {
        let mut status = self.status.lock().unwrap_or_else(PoisonError::into_inner);
        if status.is_none() {
            *status = match waitpid(self.pid, Some(WaitPidFlag::WNOHANG)) {
                Ok(WaitStatus::Exited(_, code)) => Some(ExitStatus::Exited(code)),
                Ok(WaitStatus::Signaled(_, signal, _)) => Some(ExitStatus::Signaled(signal as i32)),
                _ => None,
            };
        }
        *status
    }
}

impl Drop for UnixPty {
    fn drop(&mut self) {
        self.kill();
        if self.exit_status().is_some() {
            return;
        }
        // Reap in the background so the child does not linger as a zombie.
        let pid = self.pid;
        let reaper = std::thread::Builder::new()
            .name(format!("pty-reap-{pid}"))
            .spawn(move || {
                let _ = waitpid(pid, None);
            });
        if let Err(e) = reaper {
            log::warn!("failed to start reaper for pid {pid}: {e}");
        }
    }
}

/// The parent's environment with `TERM` replaced.
fn child_environment(term: &str) -> Result<Vec<CString>> {
    let mut env: Vec<CString> = std::env::vars_os()
        .filter(|(key, _)| key != "TERM")
        .filter_map(|(key, value)| {
            let mut entry = key.as_bytes().to_vec();
            entry.push(b'=');
            entry.extend_from_slice(value.as_bytes());
            CString::new(entry).ok()
        })
        .collect();
    let term = CString::new(format!("TERM={term}"))
        .map_err(|e| PtyError::InvalidArgument(format!("terminal type contains a NUL byte: {e}")))?;
    env.push(term);
    Ok(env)
}

fn null_terminated(strings: &[CString]) -> Vec<*const c_char> {
    strings
        .iter()
        .map(|s| s.as_ptr())
        .chain(std::iter::once(std::ptr::null()))
        .collect()
}

/// Reader and writer share one open file description, so this covers both.
fn set_nonblocking(file: &File) -> io::Result<()> {
    let fd = file.as_raw_fd();
    let flags = OFlag::from_bits_truncate(fcntl(fd, FcntlArg::F_GETFL)?);
    fcntl(fd, FcntlArg::F_SETFL(flags | OFlag::O_NONBLOCK))?;
    Ok(())
}

/// Bound for the descriptor walk used when `close_range` is unavailable.
fn descriptor_table_size() -> c_int {
    let size = unsafe { libc::sysconf(libc::_SC_OPEN_MAX) };
    if size <= 0 {
        return 1024;
    }
    if size > MAX_CLOSED_FD as libc::c_long && !cfg!(target_os = "linux") {
        log::warn!(
            "descriptor limit {size} exceeds {MAX_CLOSED_FD}; higher descriptors may leak into children"
        );
    }
    size.min(MAX_CLOSED_FD as libc::c_long) as c_int
}

/// Close every descriptor above stderr.
///
/// # Safety
///
/// Only async-signal-safe calls; meant for the child side of a fork.
unsafe fn close_inherited_descriptors(max_fd: c_int) {
    #[cfg(target_os = "linux")]
    {
        let first: libc::c_uint = 3;
        if libc::syscall(libc::SYS_close_range, first, libc::c_uint::MAX, 0) == 0 {
            return;
        }
    }

    let mut fd = max_fd - 1;
    while fd > libc::STDERR_FILENO {
        libc::close(fd);
        fd -= 1;
    }
}

/// Child side of the fork. Never returns.
///
/// # Safety
///
/// Must only be called in a freshly forked child. `argv` and `envp` must be
/// null-terminated arrays of pointers into strings that outlive the call.
unsafe fn exec_child(
    slave: RawFd,
    max_fd: c_int,
    argv: &[*const c_char],
    envp: &[*const c_char],
) -> ! {
    // New session, with the pty slave as its controlling terminal and stdio.
    libc::setsid();
    libc::ioctl(slave, libc::TIOCSCTTY as _, 0);
    for target in [libc::STDIN_FILENO, libc::STDOUT_FILENO, libc::STDERR_FILENO] {
        if libc::dup2(slave, target) < 0 {
            libc::_exit(1);
        }
    }

    // Nothing the parent had open may leak into the new program, including
    // both pty descriptors.
    close_inherited_descriptors(max_fd);

    // The Rust runtime ignores SIGPIPE; programs expect the default.
    libc::signal(libc::SIGPIPE, libc::SIG_DFL);

    libc::execve(argv[0], argv.as_ptr(), envp.as_ptr());
    libc::_exit(127)
}
