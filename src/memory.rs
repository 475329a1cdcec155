use crate::error::Error;
use core::ptr::NonNull;
use nix::sys::memfd::{memfd_create, MFdFlags};
use nix::sys::mman::{mmap, mmap_anonymous, munmap, MapFlags, ProtFlags};
use nix::unistd::ftruncate;
use std::num::NonZero;
use tracing::debug;

/// Owner of the doubled mapping.
///
/// The region is `2 * size` bytes of virtual address space whose halves
/// alias the same `size` bytes of backing pages, so a range starting
/// anywhere in the first half may extend up to `size` bytes past its
/// start and stay contiguous.
pub(crate) struct Memory {
    ptr: NonNull<u8>,
    size: usize,
    page_size: usize,
    unmapped: bool,
}

/// Unmaps the reserved range on drop unless defused. Keeps a failed
/// construction from leaving partial mappings live.
struct Reservation {
    ptr: NonNull<libc::c_void>,
    len: usize,
    armed: bool,
}

impl Reservation {
    fn release(mut self) -> NonNull<libc::c_void> {
        self.armed = false;
        self.ptr
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if self.armed {
            unsafe {
                let _ = munmap(self.ptr, self.len);
            }
        }
    }
}

impl Memory {
    pub(crate) fn new(size: usize) -> Result<Self, Error> {
        let page_size = query_page_size();
        if size == 0 || size % page_size != 0 {
            return Err(Error::InvalidSize { size, page_size });
        }

        let fd = memfd_create(c"magicbuf", MFdFlags::MFD_CLOEXEC).map_err(|source| {
            Error::MappingFailed {
                step: "creating backing storage",
                source,
            }
        })?;
        ftruncate(&fd, size as i64).map_err(|source| Error::MappingFailed {
            step: "sizing backing storage",
            source,
        })?;

        let total_size = size * 2;
        let base = unsafe {
            mmap_anonymous(
                None,
                NonZero::new(total_size).unwrap(),
                ProtFlags::PROT_NONE,
                MapFlags::MAP_PRIVATE | MapFlags::MAP_ANONYMOUS,
            )
        }
        .map_err(|source| Error::MappingFailed {
            step: "reserving address space",
            source,
        })?;
        let reservation = Reservation {
            ptr: base,
            len: total_size,
            armed: true,
        };

        unsafe {
            mmap(
                Some(NonZero::new(reservation.ptr.as_ptr() as usize).unwrap()),
                NonZero::new(size).unwrap(),
                ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
                MapFlags::MAP_SHARED | MapFlags::MAP_FIXED,
                &fd,
                0,
            )
        }
        .map_err(|source| Error::MappingFailed {
            step: "mapping first half",
            source,
        })?;

        unsafe {
            mmap(
                Some(NonZero::new(reservation.ptr.as_ptr() as usize + size).unwrap()),
                NonZero::new(size).unwrap(),
                ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
                MapFlags::MAP_SHARED | MapFlags::MAP_FIXED,
                &fd,
                0,
            )
        }
        .map_err(|source| Error::MappingFailed {
            step: "mapping second half",
            source,
        })?;

        // The two shared mappings keep the backing pages alive from here
        // on; the descriptor is no longer needed and drops at end of scope.
        let ptr = reservation.release().cast::<u8>();
        debug!(size, page_size, "mapped doubled ring region");

        Ok(Memory {
            ptr,
            size,
            page_size,
            unmapped: false,
        })
    }

    pub(crate) fn as_ptr(&self) -> NonNull<u8> {
        self.ptr
    }

    pub(crate) fn size(&self) -> usize {
        self.size
    }

    pub(crate) fn page_size(&self) -> usize {
        self.page_size
    }

    /// Strict sequential teardown: second half, first half, then the
    /// whole reservation. Stops at the first failing step, so a failure
    /// mid-way can leak the remaining mappings; `Drop` stays best-effort
    /// for buffers that are never torn down explicitly.
    pub(crate) fn unmap(&mut self) -> Result<(), Error> {
        if self.unmapped {
            return Ok(());
        }
        let base = self.ptr.cast::<libc::c_void>();
        unsafe {
            let second_half = NonNull::new_unchecked(self.ptr.as_ptr().add(self.size)).cast();
            munmap(second_half, self.size).map_err(Error::UnmapFailed)?;
            munmap(base, self.size).map_err(Error::UnmapFailed)?;
            munmap(base, self.size * 2).map_err(Error::UnmapFailed)?;
        }
        self.unmapped = true;
        debug!(size = self.size, "released doubled ring region");
        Ok(())
    }
}

impl Drop for Memory {
    fn drop(&mut self) {
        if !self.unmapped {
            unsafe {
                let _ = munmap(self.ptr.cast(), self.size * 2);
            }
        }
    }
}

unsafe impl Send for Memory {}

fn query_page_size() -> usize {
    unsafe { libc::sysconf(libc::_SC_PAGESIZE) as usize }
}
