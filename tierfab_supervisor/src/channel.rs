//! Duplex parent/child channels and fixed-record reads.
//!
//! A record is read to completion or not at all: short reads are continued, and
//! end-of-stream is reported separately from a truncated record so callers can
//! tell "peer is gone" from "peer sent garbage". `EINTR` is retried unless
//! SIGTERM is pending; then `Interrupted` is returned and the loop exits.

use std::io::{self, Read, Write};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, FromRawFd, RawFd};
use std::os::unix::net::UnixStream;
use std::time::Duration;

use nix::fcntl::{fcntl, FcntlArg, FdFlag};
use thiserror::Error;

use tierfab_core::{IdentityFrame, Request, IDENTITY_FRAME_LEN, REQUEST_FRAME_LEN};

use crate::signals::termination_requested;

#[derive(Debug, Error)]
pub enum ChannelError {
    /// The descriptor handed to us on the command line is not open.
    #[error("descriptor {0} is not an open channel")]
    InvalidDescriptor(RawFd),

    #[error("channel I/O failed: {0}")]
    Io(#[from] io::Error),
}

/// Outcome of reading one fixed-size record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Recv<T> {
    /// A complete record.
    Record(T),
    /// End-of-stream before any byte of the record.
    Closed,
    /// End-of-stream after this many bytes; the fragment is discarded.
    Partial(usize),
}

impl<T> Recv<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Recv<U> {
        match self {
            Recv::Record(t) => Recv::Record(f(t)),
            Recv::Closed => Recv::Closed,
            Recv::Partial(n) => Recv::Partial(n),
        }
    }
}

/// Read exactly one `N`-byte record from `r`.
pub fn read_record<R: Read, const N: usize>(r: &mut R) -> io::Result<Recv<[u8; N]>> {
    read_record_unless(r, termination_requested)
}

/// `read_record`, giving up with `Interrupted` when `abort` holds at an `EINTR`.
pub fn read_record_unless<R: Read, const N: usize>(
    r: &mut R,
    abort: impl Fn() -> bool,
) -> io::Result<Recv<[u8; N]>> {
    let mut buf = [0u8; N];
    let mut filled = 0usize;
    while filled < N {
        match r.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted && !abort() => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(match filled {
        0 => Recv::Closed,
        n if n == N => Recv::Record(buf),
        n => Recv::Partial(n),
    })
}

/// Write all of `bytes`, giving up with `Interrupted` when `abort` holds at an
/// `EINTR`.
pub fn write_record_unless<W: Write>(
    w: &mut W,
    mut bytes: &[u8],
    abort: impl Fn() -> bool,
) -> io::Result<()> {
    while !bytes.is_empty() {
        match w.write(bytes) {
            Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
            Ok(n) => bytes = &bytes[n..],
            Err(e) if e.kind() == io::ErrorKind::Interrupted && !abort() => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// One end of a connected parent/child pair.
#[derive(Debug)]
pub struct Channel {
    stream: UnixStream,
}

impl Channel {
    pub fn new(stream: UnixStream) -> Self {
        Self { stream }
    }

    /// A connected pair, both ends close-on-exec.
    pub fn pair() -> io::Result<(Channel, Channel)> {
        let (a, b) = UnixStream::pair()?;
        Ok((Channel::new(a), Channel::new(b)))
    }

    /// Adopt the channel end a parent left open for us across `exec`.
    ///
    /// Close-on-exec is set again so our own children do not inherit it; otherwise
    /// a grandchild would hold our upward channel open after we exit.
    pub fn from_inherited(fd: RawFd) -> Result<Self, ChannelError> {
        if fd < 0 {
            return Err(ChannelError::InvalidDescriptor(fd));
        }
        let flags = fcntl(fd, FcntlArg::F_GETFD)
            .map_err(|_| ChannelError::InvalidDescriptor(fd))?;
        let flags = FdFlag::from_bits_truncate(flags) | FdFlag::FD_CLOEXEC;
        fcntl(fd, FcntlArg::F_SETFD(flags)).map_err(|e| ChannelError::Io(e.into()))?;
        // SAFETY: the descriptor is open and nothing else in this process owns it.
        let stream = unsafe { UnixStream::from_raw_fd(fd) };
        Ok(Self { stream })
    }

    pub fn recv_identity(&mut self) -> io::Result<Recv<IdentityFrame>> {
        Ok(read_record::<_, IDENTITY_FRAME_LEN>(&mut self.stream)?.map(IdentityFrame))
    }

    pub fn recv_request(&mut self) -> io::Result<Recv<Request>> {
        Ok(read_record::<_, REQUEST_FRAME_LEN>(&mut self.stream)?.map(|b| Request::decode(&b)))
    }

    /// Send a frame as-is. A short write is an error.
    pub fn send_identity(&mut self, frame: &IdentityFrame) -> io::Result<()> {
        write_record_unless(&mut self.stream, frame.as_bytes(), termination_requested)
    }

    pub fn send_request(&mut self, request: &Request) -> io::Result<()> {
        write_record_unless(&mut self.stream, &request.encode(), termination_requested)
    }

    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        self.stream.set_read_timeout(timeout)
    }

    pub fn into_inner(self) -> UnixStream {
        self.stream
    }
}

impl AsFd for Channel {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.stream.as_fd()
    }
}

impl AsRawFd for Channel {
    fn as_raw_fd(&self) -> RawFd {
        self.stream.as_raw_fd()
    }
}
