//! Child spawning: one duplex pair per slot, child end inherited across `exec`.
//!
//! Every child is started as `<program> <global-index> <fd>`. The parent end of each
//! pair stays close-on-exec, so later siblings never hold an earlier sibling's
//! channel open and end-of-stream still means "that child is gone".

use std::ffi::OsString;
use std::io;
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;
use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};

use nix::fcntl::{fcntl, FcntlArg, FdFlag};
use thiserror::Error;
use tracing::{debug, info};

use tierfab_core::{global_index, SlotError, SlotTable};

use crate::channel::Channel;

#[derive(Debug, Error)]
pub enum SpawnError {
    #[error("failed to allocate channel for slot {slot}: {source}")]
    Channel { slot: usize, source: io::Error },

    #[error("failed to start {program} for slot {slot}: {source}")]
    Exec {
        program: String,
        slot: usize,
        source: io::Error,
    },

    #[error(transparent)]
    Slot(#[from] SlotError),
}

/// What to start and where the children sit in the tree.
#[derive(Clone, Debug)]
pub struct SpawnSpec {
    pub program: PathBuf,
    pub fanout: usize,
    /// Global index of the spawning process.
    pub parent_index: i32,
    /// Extra environment on top of the inherited one.
    pub envs: Vec<(OsString, OsString)>,
    /// Hand the child a fresh stderr pipe instead of ours.
    pub pipe_stderr: bool,
}

impl SpawnSpec {
    pub fn new(program: impl Into<PathBuf>, fanout: usize, parent_index: i32) -> Self {
        Self {
            program: program.into(),
            fanout,
            parent_index,
            envs: Vec::new(),
            pipe_stderr: false,
        }
    }

    pub fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    pub fn pipe_stderr(mut self) -> Self {
        self.pipe_stderr = true;
        self
    }

    pub fn child_index(&self, slot: usize) -> i32 {
        global_index(slot, self.parent_index, self.fanout)
    }
}

/// Parent-side view of one child: its channel and, when we started it, its process.
#[derive(Debug)]
pub struct ChildLink {
    pub channel: Channel,
    pub process: Option<Child>,
}

impl ChildLink {
    pub fn new(channel: Channel, process: Option<Child>) -> Self {
        Self { channel, process }
    }
}

fn clear_cloexec(fd: RawFd) -> io::Result<()> {
    // Runs between fork and exec: plain syscalls only.
    let flags = FdFlag::from_bits_truncate(fcntl(fd, FcntlArg::F_GETFD)?);
    fcntl(fd, FcntlArg::F_SETFD(flags.difference(FdFlag::FD_CLOEXEC)))?;
    Ok(())
}

/// Start the child for `slot`, returning our end of its channel.
pub fn spawn_one(spec: &SpawnSpec, slot: usize) -> Result<(Channel, Child), SpawnError> {
    let (parent_end, child_end) =
        UnixStream::pair().map_err(|source| SpawnError::Channel { slot, source })?;
    let child_fd = child_end.as_raw_fd();
    let index = spec.child_index(slot);

    let mut cmd = Command::new(&spec.program);
    cmd.arg(index.to_string()).arg(child_fd.to_string());
    for (k, v) in &spec.envs {
        cmd.env(k, v);
    }
    if spec.pipe_stderr {
        cmd.stderr(Stdio::piped());
    }
    // SAFETY: the hook only calls fcntl on a descriptor we own.
    unsafe {
        cmd.pre_exec(move || clear_cloexec(child_fd));
    }

    let child = cmd.spawn().map_err(|source| SpawnError::Exec {
        program: spec.program.display().to_string(),
        slot,
        source,
    })?;

    // The child has its own copy now.
    drop(child_end);
    debug!(slot, index, fd = child_fd, "child channel handed over");

    Ok((Channel::new(parent_end), child))
}

/// Fill a fresh slot table with `spec.fanout` children.
///
/// Stops at the first failure; the caller treats that as fatal.
pub fn spawn_children(spec: &SpawnSpec) -> Result<SlotTable<ChildLink>, SpawnError> {
    let mut table = SlotTable::new(spec.fanout);
    for slot in 0..spec.fanout {
        let (channel, child) = spawn_one(spec, slot)?;
        let pid = child.id();
        info!(
            slot,
            index = spec.child_index(slot),
            pid,
            program = %spec.program.display(),
            "child spawned"
        );
        table.open(slot, ChildLink::new(channel, Some(child)), Some(pid))?;
    }
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_indices_follow_parent_index() {
        let spec = SpawnSpec::new("/bin/true", 3, 2);
        assert_eq!(spec.child_index(0), 6);
        assert_eq!(spec.child_index(2), 8);
    }

    #[test]
    fn missing_program_is_fatal() {
        let spec = SpawnSpec::new("/nonexistent/tierfab-child", 2, 0);
        match spawn_children(&spec) {
            Err(SpawnError::Exec { slot, .. }) => assert_eq!(slot, 0),
            other => panic!("expected exec failure, got {other:?}"),
        }
    }

    #[test]
    fn child_sees_inherited_descriptor() {
        use std::io::Read;

        let (mut parent_end, child_end) = UnixStream::pair().unwrap();
        let fd = child_end.as_raw_fd();
        let mut cmd = Command::new("/bin/sh");
        cmd.arg("-c").arg(r#"printf x >&"$1""#).arg("sh").arg(fd.to_string());
        unsafe {
            cmd.pre_exec(move || clear_cloexec(fd));
        }
        let mut child = cmd.spawn().unwrap();
        drop(child_end);

        let mut byte = [0u8; 1];
        parent_end.read_exact(&mut byte).unwrap();
        assert_eq!(&byte, b"x");
        assert!(child.wait().unwrap().success());
    }
}
