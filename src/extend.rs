//! Address-space extension: the one resource every heap instance shares.
//!
//! A heap never asks the platform for memory directly. It goes through an
//! [`AddressSpace`], whose implementations serialize the raw growth call with
//! a lock that covers nothing else. Header initialization happens after the
//! lock is released, since a freshly returned region is only visible to the
//! caller until it gets linked into a heap.

use core::ptr::{self, NonNull};
use std::sync::atomic::{AtomicUsize, Ordering};

use libc::{c_void, intptr_t, sbrk};
use parking_lot::Mutex;

use crate::{align, error::AllocError};

/// A source of fresh, contiguous, word-aligned memory.
///
/// # Safety
///
/// A successful [`extend`](AddressSpace::extend) must return the base of
/// `bytes` writable bytes, aligned to the machine word, that nobody else will
/// hand out again for as long as the implementation is alive. Implementations
/// must tolerate concurrent calls.
pub unsafe trait AddressSpace: Sync {
  /// Grows the address space by `bytes` and returns the base of the new
  /// region.
  fn extend(
    &self,
    bytes: usize,
  ) -> Result<NonNull<u8>, AllocError>;
}

static BREAK_LOCK: Mutex<()> = parking_lot::const_mutex(());

/// The process program break, moved with `sbrk(2)`.
///
/// `sbrk` is not safe to call concurrently, so all calls made through this
/// type are serialized by one process-wide lock. Code outside this crate that
/// moves the break (the system allocator, for instance) is not covered by that
/// lock; heaps that assume chain order equals address order must not share
/// the break with such code.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProgramBreak;

impl ProgramBreak {
  /// Current program break, as reported by `sbrk(0)`.
  pub fn current() -> *mut u8 {
    let _guard = BREAK_LOCK.lock();
    unsafe { sbrk(0) }.cast::<u8>()
  }
}

unsafe impl AddressSpace for ProgramBreak {
  fn extend(
    &self,
    bytes: usize,
  ) -> Result<NonNull<u8>, AllocError> {
    let increment =
      intptr_t::try_from(bytes).map_err(|_| AllocError::SizeOverflow { requested: bytes })?;

    let address = {
      let _guard = BREAK_LOCK.lock();
      // SAFETY: serialized with every other `sbrk` issued by this crate.
      unsafe {
        let current = sbrk(0);
        if current == usize::MAX as *mut c_void {
          return Err(AllocError::Exhausted { requested: bytes });
        }

        let padding = align!(current as usize) - current as usize;
        if padding != 0 && sbrk(padding as intptr_t) == usize::MAX as *mut c_void {
          return Err(AllocError::Exhausted { requested: bytes });
        }

        sbrk(increment)
      }
    };

    if address == usize::MAX as *mut c_void {
      tracing::debug!(bytes, "sbrk refused to grow the program break");
      return Err(AllocError::Exhausted { requested: bytes });
    }

    NonNull::new(address.cast::<u8>()).ok_or(AllocError::Exhausted { requested: bytes })
  }
}

/// A fixed-capacity reservation handed out front to back.
///
/// Behaves like a private program break: every extension continues exactly
/// where the previous one ended, no matter which heap asked for it. Several
/// heaps sharing one region therefore see their growth interleaved, the same
/// way per-thread heaps interleave on the real program break. Such heaps must
/// be [`Verified`](crate::Verified); an unchecked heap takes the region with
/// [`Heap::exclusive`](crate::Heap::exclusive).
pub struct Region {
  base: NonNull<u8>,
  capacity: usize,
  cursor: Mutex<usize>,
  granted: AtomicUsize,
}

// SAFETY: the mapping is owned by the region, and the cursor that partitions
// it is behind a mutex.
unsafe impl Send for Region {}
unsafe impl Sync for Region {}

impl Region {
  /// Reserves `capacity` bytes of anonymous memory.
  pub fn new(capacity: usize) -> Result<Self, AllocError> {
    if capacity == 0 {
      return Err(AllocError::Reserve { capacity });
    }

    // SAFETY: anonymous private mapping with no address hint.
    let address = unsafe {
      libc::mmap(
        ptr::null_mut(),
        capacity,
        libc::PROT_READ | libc::PROT_WRITE,
        libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
        -1,
        0,
      )
    };

    if address == libc::MAP_FAILED {
      return Err(AllocError::Reserve { capacity });
    }

    let base = NonNull::new(address.cast::<u8>()).ok_or(AllocError::Reserve { capacity })?;

    Ok(Self {
      base,
      capacity,
      cursor: Mutex::new(0),
      granted: AtomicUsize::new(0),
    })
  }

  /// First byte of the reservation.
  pub fn base(&self) -> *mut u8 {
    self.base.as_ptr()
  }

  pub fn capacity(&self) -> usize {
    self.capacity
  }

  /// Total bytes handed out so far.
  pub fn granted(&self) -> usize {
    self.granted.load(Ordering::Acquire)
  }
}

unsafe impl AddressSpace for Region {
  fn extend(
    &self,
    bytes: usize,
  ) -> Result<NonNull<u8>, AllocError> {
    let offset = {
      let mut cursor = self.cursor.lock();
      let end = cursor
        .checked_add(bytes)
        .filter(|end| *end <= self.capacity)
        .ok_or(AllocError::Exhausted { requested: bytes })?;
      let offset = *cursor;
      *cursor = end;
      offset
    };

    self.granted.fetch_add(bytes, Ordering::AcqRel);
    tracing::trace!(bytes, offset, "region extended");

    // SAFETY: `offset + bytes <= capacity`, so the pointer stays inside the
    // mapping.
    Ok(unsafe { self.base.add(offset) })
  }
}

impl Drop for Region {
  fn drop(&mut self) {
    // SAFETY: the mapping was created in `new` with exactly this length.
    unsafe {
      libc::munmap(self.base.as_ptr().cast::<c_void>(), self.capacity);
    }
  }
}
