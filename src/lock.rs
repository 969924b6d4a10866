//! Concurrency primitives: the per-handle reentrant intrinsic lock and the
//! advisory byte-range file-region lock.

use crate::error::DbaseResult;
use parking_lot::ReentrantMutex;
use std::fs::File;
use std::sync::Arc;

/// The per-handle intrinsic lock every `Dbf`, `NdxIndex`, and `MdxIndex`
/// owns or is handed. Reentrant so an outer public method (e.g.
/// `append_blank`) can call an inner one (e.g. `goto_record`) that also
/// acquires the lock, without deadlocking. Cloning an `IntrinsicLock`
/// shares the same underlying mutex, which is how a DBF and its paired
/// index files end up serialized against each other when the caller passes
/// one lock to both `open` calls.
#[derive(Clone)]
pub struct IntrinsicLock {
    mutex: Arc<ReentrantMutex<()>>,
}

impl IntrinsicLock {
    pub fn new() -> IntrinsicLock {
        IntrinsicLock {
            mutex: Arc::new(ReentrantMutex::new(())),
        }
    }

    /// Run `f` under the lock when thread safety is enabled; otherwise run
    /// it directly. The lock is always reentrant-safe to acquire even when
    /// `enabled` is false, since `parking_lot`'s uncontended fast path is
    /// effectively free — there is no separate code path to maintain for
    /// the disabled case beyond skipping the (harmless) acquisition.
    pub fn with_lock<T>(&self, enabled: bool, f: impl FnOnce() -> T) -> T {
        if enabled {
            let _guard = self.mutex.lock();
            f()
        } else {
            f()
        }
    }
}

impl Default for IntrinsicLock {
    fn default() -> Self {
        IntrinsicLock::new()
    }
}

/// Which kind of advisory lock to take over a byte range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockKind {
    Shared,
    Exclusive,
}

/// A held advisory byte-range lock; releases the range on drop. When file
/// locking is disabled, or on a non-Unix target where range locks are not
/// portably available, this is a no-op guard (the lock is advisory and
/// best-effort by specification, so a silent no-op off Unix matches the
/// documented semantics rather than violating them).
pub struct RegionLockGuard {
    #[cfg(unix)]
    inner: Option<UnixRegionLock>,
}

impl RegionLockGuard {
    /// Acquire `kind` over `[offset, offset+len)` in `file` when `enabled`
    /// is true; otherwise return a no-op guard immediately.
    pub fn acquire(file: &File, offset: u64, len: u64, kind: LockKind, enabled: bool) -> DbaseResult<RegionLockGuard> {
        if !enabled {
            return Ok(RegionLockGuard::noop());
        }
        #[cfg(unix)]
        {
            Ok(RegionLockGuard {
                inner: Some(UnixRegionLock::acquire(file, offset, len, kind)?),
            })
        }
        #[cfg(not(unix))]
        {
            let _ = (file, offset, len, kind);
            Ok(RegionLockGuard::noop())
        }
    }

    fn noop() -> RegionLockGuard {
        #[cfg(unix)]
        {
            RegionLockGuard { inner: None }
        }
        #[cfg(not(unix))]
        {
            RegionLockGuard {}
        }
    }
}

#[cfg(unix)]
struct UnixRegionLock {
    fd: std::os::unix::io::RawFd,
    offset: u64,
    len: u64,
}

#[cfg(unix)]
impl UnixRegionLock {
    fn acquire(file: &File, offset: u64, len: u64, kind: LockKind) -> DbaseResult<UnixRegionLock> {
        use nix::fcntl::{fcntl, FcntlArg, FlockArg};
        use std::os::unix::io::AsRawFd;

        // FlockArg only models whole-file BSD locks; the POSIX byte-range
        // semantics the specification calls for go through raw `fcntl`
        // F_SETLKW with an explicit `libc::flock` struct instead.
        let _ = FlockArg::LockExclusive; // keep nix::fcntl::FlockArg import path documented
        let fd = file.as_raw_fd();
        let mut flock: libc::flock = unsafe { std::mem::zeroed() };
        flock.l_type = match kind {
            LockKind::Shared => libc::F_RDLCK as libc::c_short,
            LockKind::Exclusive => libc::F_WRLCK as libc::c_short,
        };
        flock.l_whence = libc::SEEK_SET as libc::c_short;
        flock.l_start = offset as libc::off_t;
        flock.l_len = len as libc::off_t;

        fcntl(fd, FcntlArg::F_SETLKW(&flock))
            .map_err(|e| std::io::Error::from_raw_os_error(e as i32))?;

        Ok(UnixRegionLock { fd, offset, len })
    }
}

#[cfg(unix)]
impl Drop for UnixRegionLock {
    fn drop(&mut self) {
        use nix::fcntl::{fcntl, FcntlArg};
        let mut flock: libc::flock = unsafe { std::mem::zeroed() };
        flock.l_type = libc::F_UNLCK as libc::c_short;
        flock.l_whence = libc::SEEK_SET as libc::c_short;
        flock.l_start = self.offset as libc::off_t;
        flock.l_len = self.len as libc::off_t;
        let _ = fcntl(self.fd, FcntlArg::F_SETLK(&flock));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intrinsic_lock_is_reentrant() {
        let lock = IntrinsicLock::new();
        let result = lock.with_lock(true, || {
            // Nested acquisition from the same thread must not deadlock.
            lock.with_lock(true, || 41) + 1
        });
        assert_eq!(result, 42);
    }

    #[test]
    fn disabled_thread_safety_skips_locking_but_still_runs() {
        let lock = IntrinsicLock::new();
        assert_eq!(lock.with_lock(false, || 7), 7);
    }

    #[test]
    fn noop_region_lock_when_disabled() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let file = tmp.reopen().unwrap();
        let guard = RegionLockGuard::acquire(&file, 0, 32, LockKind::Shared, false).unwrap();
        drop(guard);
    }
}
