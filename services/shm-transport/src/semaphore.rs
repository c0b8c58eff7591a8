//! Process-shared semaphores
//!
//! Unnamed POSIX semaphores embedded in the shared segment, used as binary
//! mutexes (initial value 1, `pshared = 1`).

use std::io::{self, ErrorKind};
use std::marker::PhantomData;

use crate::error::ShmError;

/// Initialize a semaphore in place.
///
/// # Safety
///
/// `sem` must point into a mapped, writable segment and must not be in use
/// by any other process yet.
pub(crate) unsafe fn init_shared(sem: *mut libc::sem_t) -> Result<(), ShmError> {
    // SAFETY: caller guarantees `sem` is valid and not yet shared
    if unsafe { libc::sem_init(sem, 1, 1) } != 0 {
        return Err(ShmError::last_os("sem_init"));
    }
    Ok(())
}

/// Held semaphore; released on drop
pub struct SemGuard<'a> {
    sem: *mut libc::sem_t,
    _segment: PhantomData<&'a ()>,
}

impl<'a> SemGuard<'a> {
    /// Acquire `sem`, retrying when interrupted by a signal.
    ///
    /// # Safety
    ///
    /// `sem` must point to an initialized semaphore that stays mapped for `'a`.
    pub(crate) unsafe fn acquire(sem: *mut libc::sem_t) -> io::Result<SemGuard<'a>> {
        loop {
            // SAFETY: caller guarantees `sem` is initialized and mapped
            if unsafe { libc::sem_wait(sem) } == 0 {
                return Ok(SemGuard {
                    sem,
                    _segment: PhantomData,
                });
            }
            let err = io::Error::last_os_error();
            if err.kind() != ErrorKind::Interrupted {
                return Err(err);
            }
        }
    }
}

impl Drop for SemGuard<'_> {
    fn drop(&mut self) {
        // SAFETY: we hold the semaphore, which is still mapped for 'a
        if unsafe { libc::sem_post(self.sem) } != 0 {
            tracing::warn!("sem_post failed: {}", io::Error::last_os_error());
        }
    }
}
