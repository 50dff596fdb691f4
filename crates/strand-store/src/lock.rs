//! Per-block advisory locking, ported from the original `KVStore`'s
//! `ReadBlockLock`/`WriteBlockLock`. Locks are taken with `fcntl` open-file-
//! description (OFD) locks over a byte range keyed by block id, so two
//! locks on the same block from different threads actually contend instead
//! of silently coexisting the way a plain per-process `flock` would.
//!
//! OFD locks are scoped to the open file description that created them, and
//! all of them would share one description if callers shared a single fd;
//! the original avoids that with a `fd_map_` keyed by thread id. This port
//! gets the same effect with a thread-local fd, closed on thread exit by
//! its `Drop` impl.
//!
//! Callers that need more than one block locked at once MUST acquire them
//! in ascending block-id order, matching the invariant the original states
//! explicitly, to avoid deadlocking against another thread locking the same
//! two blocks in the opposite order.

use std::cell::RefCell;
use std::fs::File;
use std::os::fd::AsRawFd;
use std::path::Path;

use crate::error::{Error, Result};
use crate::layout::BlockId;

thread_local! {
    static LOCK_FD: RefCell<Option<File>> = const { RefCell::new(None) };
}

fn with_lock_fd<R>(path: &Path, f: impl FnOnce(&File) -> Result<R>) -> Result<R> {
    LOCK_FD.with(|cell| {
        let mut slot = cell.borrow_mut();
        if slot.is_none() {
            *slot = Some(File::options().read(true).write(true).open(path).map_err(Error::Io)?);
        }
        f(slot.as_ref().unwrap())
    })
}

fn block_range(block_id: BlockId) -> (libc::off_t, libc::off_t) {
    // One reserved byte per block, far past any real block-sized region of
    // the file; this file exists solely to carry OFD lock state.
    (block_id as libc::off_t, 1)
}

fn apply_lock(path: &Path, block_id: BlockId, lock_type: libc::c_short, blocking: bool) -> Result<()> {
    let (start, len) = block_range(block_id);
    with_lock_fd(path, |file| {
        let mut lock = libc::flock {
            l_type: lock_type,
            l_whence: libc::SEEK_SET as libc::c_short,
            l_start: start,
            l_len: len,
            l_pid: 0,
        };
        let cmd = if blocking { libc::F_OFD_SETLKW } else { libc::F_OFD_SETLK };
        let rc = unsafe { libc::fcntl(file.as_raw_fd(), cmd, &mut lock) };
        if rc == -1 { Err(Error::Lock(std::io::Error::last_os_error())) } else { Ok(()) }
    })
}

fn release_lock(path: &Path, block_id: BlockId) {
    let _ = apply_lock(path, block_id, libc::F_UNLCK as libc::c_short, true);
}

/// Shared (read) lock on one block's OFD lock range, released on drop.
pub struct ReadBlockLock {
    path: std::path::PathBuf,
    block_id: BlockId,
}

impl ReadBlockLock {
    pub fn acquire(path: &Path, block_id: BlockId) -> Result<Self> {
        apply_lock(path, block_id, libc::F_RDLCK as libc::c_short, true)?;
        Ok(Self { path: path.to_path_buf(), block_id })
    }
}

impl Drop for ReadBlockLock {
    fn drop(&mut self) {
        release_lock(&self.path, self.block_id);
    }
}

/// Exclusive (write) lock on one block's OFD lock range, released on drop.
pub struct WriteBlockLock {
    path: std::path::PathBuf,
    block_id: BlockId,
}

impl WriteBlockLock {
    pub fn acquire(path: &Path, block_id: BlockId) -> Result<Self> {
        apply_lock(path, block_id, libc::F_WRLCK as libc::c_short, true)?;
        Ok(Self { path: path.to_path_buf(), block_id })
    }
}

impl Drop for WriteBlockLock {
    fn drop(&mut self) {
        release_lock(&self.path, self.block_id);
    }
}

/// Acquire exclusive locks on several blocks at once, always in ascending
/// block-id order, regardless of the order `block_ids` is given in.
pub fn write_lock_ascending(path: &Path, block_ids: &mut [BlockId]) -> Result<Vec<WriteBlockLock>> {
    block_ids.sort_unstable();
    block_ids.iter().map(|&id| WriteBlockLock::acquire(path, id)).collect()
}
