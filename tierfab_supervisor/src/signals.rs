//! Signal delivery through a self-pipe.
//!
//! The handler only writes the signal number into a non-blocking socket whose
//! read end sits in the poll set. Everything else (closing channels, killing the
//! tree) happens in the event loop, outside signal context.
//!
//! SIGTERM additionally raises a process-wide flag. Blocking record reads and
//! writes check it when interrupted, so a stalled peer cannot keep the loop from
//! seeing the signal.

use std::io::{self, Read};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd};
use std::os::unix::net::UnixStream;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};

use nix::errno::Errno;
use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
use thiserror::Error;

static WAKE_FD: AtomicI32 = AtomicI32::new(-1);
static TERMINATING: AtomicBool = AtomicBool::new(false);

/// Whether SIGTERM has been delivered to this process.
pub fn termination_requested() -> bool {
    TERMINATING.load(Ordering::SeqCst)
}

#[derive(Debug, Error)]
pub enum SignalError {
    #[error("failed to create signal pipe: {0}")]
    Pipe(#[from] io::Error),

    #[error("failed to install handler for {signal}: {source}")]
    Install { signal: Signal, source: Errno },
}

extern "C" fn on_signal(signum: libc::c_int) {
    let saved = Errno::last_raw();
    if signum == Signal::SIGTERM as libc::c_int {
        TERMINATING.store(true, Ordering::SeqCst);
    }
    let fd = WAKE_FD.load(Ordering::Relaxed);
    if fd >= 0 {
        let byte = signum as u8;
        // A full pipe drops the byte; the loop is already awake in that case.
        unsafe {
            libc::write(fd, &byte as *const u8 as *const libc::c_void, 1);
        }
    }
    Errno::set_raw(saved);
}

/// Read end of the process-wide signal pipe.
#[derive(Debug)]
pub struct SignalPipe {
    rx: UnixStream,
    _tx: UnixStream,
}

impl SignalPipe {
    /// Route `signals` into the pipe. One pipe per process.
    ///
    /// Handlers are installed without `SA_RESTART`, so a blocked `poll` returns
    /// `EINTR` and the loop sees the pipe readable on its next wait. Stopped
    /// children do not raise SIGCHLD.
    pub fn install(signals: &[Signal]) -> Result<Self, SignalError> {
        let (rx, tx) = UnixStream::pair()?;
        rx.set_nonblocking(true)?;
        tx.set_nonblocking(true)?;
        WAKE_FD.store(tx.as_raw_fd(), Ordering::SeqCst);

        let action = SigAction::new(
            SigHandler::Handler(on_signal),
            SaFlags::SA_NOCLDSTOP,
            SigSet::empty(),
        );
        for &signal in signals {
            // SAFETY: the handler is async-signal-safe (atomic load + write(2)).
            unsafe { sigaction(signal, &action) }
                .map_err(|source| SignalError::Install { signal, source })?;
        }

        Ok(Self { rx, _tx: tx })
    }

    /// A pipe with no handlers attached; signals are injected by hand.
    #[cfg(test)]
    pub(crate) fn unarmed() -> io::Result<Self> {
        let (rx, tx) = UnixStream::pair()?;
        rx.set_nonblocking(true)?;
        Ok(Self { rx, _tx: tx })
    }

    #[cfg(test)]
    pub(crate) fn inject(&mut self, signal: Signal) -> io::Result<()> {
        use std::io::Write;
        self._tx.write_all(&[signal as i32 as u8])
    }

    /// Every signal delivered since the last drain, in arrival order.
    pub fn drain(&mut self) -> Vec<Signal> {
        let mut out = Vec::new();
        let mut buf = [0u8; 32];
        loop {
            match self.rx.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    out.extend(
                        buf[..n]
                            .iter()
                            .filter_map(|b| Signal::try_from(*b as i32).ok()),
                    );
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(_) => break,
            }
        }
        out
    }
}

impl AsFd for SignalPipe {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.rx.as_fd()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::sys::signal::raise;

    #[test]
    fn raised_signal_lands_in_pipe() {
        let mut pipe = SignalPipe::install(&[Signal::SIGUSR2]).unwrap();
        assert!(pipe.drain().is_empty());
        raise(Signal::SIGUSR2).unwrap();
        assert_eq!(pipe.drain(), vec![Signal::SIGUSR2]);
    }
}
