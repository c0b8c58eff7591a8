//! Shared registry segment
//!
//! A POSIX shared-memory object holding the registry and the two
//! semaphores that guard it. The first process to `shm_open` with
//! `O_EXCL` creates and initializes it; everybody else attaches.
//!
//! The segment is never unlinked by normal operation, so it survives the
//! processes that use it. Stale entries left behind by dead processes are
//! reclaimed by whoever attaches next.

use std::ffi::CString;
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::ops::{Deref, DerefMut};
use std::ptr::{self, addr_of_mut, NonNull};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use svar_matching::Registry;

use crate::error::ShmError;
use crate::semaphore::{self, SemGuard};

/// Written to `Segment::init` once the creator has set everything up
const INIT_MAGIC: u32 = 0x5356_4152; // "SVAR"

/// How long an attaching process waits for the creator
const ATTACH_WAIT: Duration = Duration::from_secs(1);
const ATTACH_POLL: Duration = Duration::from_millis(5);

/// In-memory layout of the segment
#[repr(C)]
pub struct Segment {
    init: AtomicU32,
    db_sem: libc::sem_t,
    print_sem: libc::sem_t,
    registry: Registry,
}

/// Bytes a well-formed segment must have at least
pub fn segment_size() -> usize {
    std::mem::size_of::<Segment>()
}

fn page_size() -> usize {
    // SAFETY: sysconf has no preconditions
    let page = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if page > 0 {
        page as usize
    } else {
        4096
    }
}

fn c_name(name: &str) -> Result<CString, ShmError> {
    if !name.starts_with('/') || name.len() < 2 || name[1..].contains('/') {
        return Err(ShmError::BadName(name.to_string()));
    }
    CString::new(name).map_err(|_| ShmError::BadName(name.to_string()))
}

/// This process's mapping of the segment
pub struct MappedSegment {
    ptr: NonNull<Segment>,
    len: usize,
    created: bool,
    name: String,
}

// SAFETY: the mapping is process-wide and every access to its contents goes
// through the process-shared semaphores
unsafe impl Send for MappedSegment {}

impl MappedSegment {
    /// Create the segment, or attach to it if it already exists.
    pub fn open(name: &str) -> Result<Self, ShmError> {
        let cname = c_name(name)?;
        let size = segment_size();

        // SAFETY: cname is a valid NUL-terminated string
        let fd = unsafe {
            libc::shm_open(
                cname.as_ptr(),
                libc::O_CREAT | libc::O_EXCL | libc::O_RDWR,
                0o666 as libc::mode_t,
            )
        };
        if fd >= 0 {
            // SAFETY: shm_open just returned this descriptor to us
            let fd = unsafe { OwnedFd::from_raw_fd(fd) };
            return Self::create(fd, name, size);
        }

        let err = io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::EEXIST) {
            return Err(ShmError::Open {
                name: name.to_string(),
                source: err,
            });
        }

        // SAFETY: as above
        let fd = unsafe { libc::shm_open(cname.as_ptr(), libc::O_RDWR, 0 as libc::mode_t) };
        if fd < 0 {
            return Err(ShmError::Open {
                name: name.to_string(),
                source: io::Error::last_os_error(),
            });
        }
        // SAFETY: shm_open just returned this descriptor to us
        let fd = unsafe { OwnedFd::from_raw_fd(fd) };
        Self::attach(fd, name, size)
    }

    fn create(fd: OwnedFd, name: &str, size: usize) -> Result<Self, ShmError> {
        // the umask may have cut the mode passed to shm_open
        // SAFETY: fd is a valid open descriptor
        if unsafe { libc::fchmod(fd.as_raw_fd(), 0o666 as libc::mode_t) } != 0 {
            return Err(ShmError::last_os("fchmod"));
        }
        // SAFETY: as above
        if unsafe { libc::ftruncate(fd.as_raw_fd(), size as libc::off_t) } != 0 {
            return Err(ShmError::last_os("ftruncate"));
        }

        let seg = Self::map(&fd, name, size, true)?;
        let raw = seg.ptr.as_ptr();
        // SAFETY: the segment is freshly truncated (all zero), mapped, and not
        // visible as initialized to anyone else until `init` is published
        unsafe {
            semaphore::init_shared(addr_of_mut!((*raw).db_sem))?;
            semaphore::init_shared(addr_of_mut!((*raw).print_sem))?;
        }
        seg.header().store(INIT_MAGIC, Ordering::Release);

        info!(name, size, "created shared variable segment");
        Ok(seg)
    }

    fn attach(fd: OwnedFd, name: &str, size: usize) -> Result<Self, ShmError> {
        let max = size.div_ceil(page_size()) * page_size();

        // the creator may not have truncated yet
        let start = Instant::now();
        let found = loop {
            // SAFETY: an all-zero stat is a valid out-parameter
            let mut st: libc::stat = unsafe { std::mem::zeroed() };
            // SAFETY: fd is valid and st is writable
            if unsafe { libc::fstat(fd.as_raw_fd(), &mut st) } != 0 {
                return Err(ShmError::last_os("fstat"));
            }
            if st.st_size > 0 || start.elapsed() >= ATTACH_WAIT {
                break st.st_size.max(0) as u64;
            }
            std::thread::sleep(ATTACH_POLL);
        };
        if found < size as u64 || found > max as u64 {
            return Err(ShmError::BadSize {
                found,
                expected: size,
                max,
            });
        }

        let seg = Self::map(&fd, name, size, false)?;
        while seg.header().load(Ordering::Acquire) != INIT_MAGIC {
            if start.elapsed() >= ATTACH_WAIT {
                return Err(ShmError::NotInitialized);
            }
            std::thread::sleep(ATTACH_POLL);
        }

        info!(name, "attached to shared variable segment");
        Ok(seg)
    }

    fn map(fd: &OwnedFd, name: &str, len: usize, created: bool) -> Result<Self, ShmError> {
        // SAFETY: fd refers to a shared-memory object of at least `len` bytes
        let addr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd.as_raw_fd(),
                0,
            )
        };
        if addr == libc::MAP_FAILED {
            return Err(ShmError::last_os("mmap"));
        }
        let ptr = NonNull::new(addr.cast::<Segment>()).ok_or(ShmError::Os {
            op: "mmap",
            source: io::Error::new(io::ErrorKind::Other, "null mapping"),
        })?;
        debug!(name, len, "segment mapped");
        Ok(Self {
            ptr,
            len,
            created,
            name: name.to_string(),
        })
    }

    fn header(&self) -> &AtomicU32 {
        // SAFETY: the mapping is live for as long as self is, and `init` is
        // only ever accessed atomically
        unsafe { &*ptr::addr_of!((*self.ptr.as_ptr()).init) }
    }

    /// `true` if this process created the segment
    pub fn created(&self) -> bool {
        self.created
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Take the database semaphore and borrow the registry.
    pub fn lock(&mut self) -> Result<RegistryGuard<'_>, ShmError> {
        self.lock_inner(false)
    }

    /// Like `lock`, but also hold the print semaphore (taken first).
    pub fn lock_for_print(&mut self) -> Result<RegistryGuard<'_>, ShmError> {
        self.lock_inner(true)
    }

    fn lock_inner(&mut self, print: bool) -> Result<RegistryGuard<'_>, ShmError> {
        let raw = self.ptr.as_ptr();
        let to_err = |source| ShmError::Os {
            op: "sem_wait",
            source,
        };
        // SAFETY: both semaphores were initialized before `init` was
        // published, and stay mapped for the borrow of self
        let print = if print {
            Some(unsafe { SemGuard::acquire(addr_of_mut!((*raw).print_sem)) }.map_err(to_err)?)
        } else {
            None
        };
        // SAFETY: as above
        let db = unsafe { SemGuard::acquire(addr_of_mut!((*raw).db_sem)) }.map_err(to_err)?;
        // SAFETY: db_sem gives exclusive access across processes, the &mut
        // borrow of self gives it within this one
        let registry = unsafe { &mut *addr_of_mut!((*raw).registry) };
        Ok(RegistryGuard {
            registry,
            _db: db,
            _print: print,
        })
    }

    /// Remove the segment name; mapped processes keep their mapping.
    pub fn unlink(name: &str) -> Result<(), ShmError> {
        let cname = c_name(name)?;
        // SAFETY: cname is a valid NUL-terminated string
        if unsafe { libc::shm_unlink(cname.as_ptr()) } != 0 {
            return Err(ShmError::last_os("shm_unlink"));
        }
        info!(name, "unlinked shared variable segment");
        Ok(())
    }
}

impl Drop for MappedSegment {
    fn drop(&mut self) {
        // SAFETY: ptr/len describe our own live mapping
        if unsafe { libc::munmap(self.ptr.as_ptr().cast(), self.len) } != 0 {
            tracing::warn!(name = %self.name, "munmap failed: {}", io::Error::last_os_error());
        }
    }
}

/// Exclusive access to the shared registry; semaphores are released on drop
pub struct RegistryGuard<'a> {
    registry: &'a mut Registry,
    _db: SemGuard<'a>,
    _print: Option<SemGuard<'a>>,
}

impl Deref for RegistryGuard<'_> {
    type Target = Registry;

    fn deref(&self) -> &Registry {
        self.registry
    }
}

impl DerefMut for RegistryGuard<'_> {
    fn deref_mut(&mut self) -> &mut Registry {
        self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use svar_types::ids::ApNum3;

    fn unique_name(tag: &str) -> String {
        static N: AtomicUsize = AtomicUsize::new(0);
        format!(
            "/svar-seg-{}-{}-{}",
            tag,
            std::process::id(),
            N.fetch_add(1, Ordering::Relaxed)
        )
    }

    #[test]
    fn test_rejects_bad_names() {
        assert!(matches!(MappedSegment::open("no-slash"), Err(ShmError::BadName(_))));
        assert!(matches!(MappedSegment::open("/a/b"), Err(ShmError::BadName(_))));
        assert!(matches!(MappedSegment::open("/"), Err(ShmError::BadName(_))));
    }

    #[test]
    fn test_create_then_attach_share_memory() {
        let name = unique_name("share");
        let mut first = MappedSegment::open(&name).unwrap();
        assert!(first.created());
        let mut second = MappedSegment::open(&name).unwrap();
        assert!(!second.created());

        first
            .lock()
            .unwrap()
            .register_processor(ApNum3::single(1001), 42, 0);
        assert!(second.lock().unwrap().is_registered(&ApNum3::single(1001)));

        drop(first);
        drop(second);
        MappedSegment::unlink(&name).unwrap();
    }

    #[test]
    fn test_fresh_segment_is_empty() {
        let name = unique_name("empty");
        let mut seg = MappedSegment::open(&name).unwrap();
        {
            let reg = seg.lock_for_print().unwrap();
            assert_eq!(reg.used_rows().count(), 0);
            assert!(reg.slots().iter().all(|s| !s.is_used()));
        }
        // both semaphores were released
        assert!(seg.lock().is_ok());
        drop(seg);
        MappedSegment::unlink(&name).unwrap();
    }

    #[test]
    fn test_attach_rejects_wrong_size() {
        let name = unique_name("size");
        let cname = c_name(&name).unwrap();
        unsafe {
            let fd = libc::shm_open(cname.as_ptr(), libc::O_CREAT | libc::O_RDWR, 0o600);
            assert!(fd >= 0);
            assert_eq!(libc::ftruncate(fd, 16), 0);
            libc::close(fd);
        }
        assert!(matches!(
            MappedSegment::open(&name),
            Err(ShmError::BadSize { found: 16, .. })
        ));
        MappedSegment::unlink(&name).unwrap();
    }
}
