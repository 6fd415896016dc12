//! Shared-heap variant: one heap for every thread, one lock around it.

use parking_lot::{Mutex, MutexGuard};

use crate::{
  allocation::Allocation,
  error::{AllocError, InvariantViolation, ReleaseError},
  extend::{AddressSpace, ProgramBreak, Region},
  heap::Heap,
  policy::{Adjacency, Contiguous, Verified},
};

/// A [`Heap`] behind a mutex.
///
/// Every operation holds the lock for its whole duration, growth included, so
/// list mutations of one heap never interleave. The guard releases the lock on
/// every exit path.
pub struct LockedHeap<'s, P> {
  heap: Mutex<Heap<'s, P>>,
}

impl<'s> LockedHeap<'s, Verified> {
  /// See [`Heap::new`].
  pub const fn new(space: &'s dyn AddressSpace) -> Self {
    Self {
      heap: parking_lot::const_mutex(Heap::new(space)),
    }
  }
}

impl<'s> LockedHeap<'s, Contiguous> {
  /// See [`Heap::exclusive`].
  pub fn exclusive(region: &'s mut Region) -> Self {
    Self {
      heap: Mutex::new(Heap::exclusive(region)),
    }
  }

  /// See [`Heap::new_contiguous`].
  ///
  /// # Safety
  ///
  /// Nothing but this heap may extend `space` while it is alive.
  pub const unsafe fn new_contiguous(space: &'s dyn AddressSpace) -> Self {
    Self {
      heap: parking_lot::const_mutex(unsafe { Heap::new_contiguous(space) }),
    }
  }
}

impl<'s, P: Adjacency> LockedHeap<'s, P> {
  pub fn allocate(
    &self,
    size: usize,
  ) -> Result<Allocation<'s>, AllocError> {
    self.heap.lock().allocate(size)
  }

  pub fn release(
    &self,
    allocation: Allocation<'s>,
  ) -> Result<(), ReleaseError> {
    self.heap.lock().release(allocation)
  }

  pub fn total_heap_bytes(&self) -> usize {
    self.heap.lock().total_heap_bytes()
  }

  pub fn total_free_bytes(&self) -> usize {
    self.heap.lock().total_free_bytes()
  }

  pub fn check(&self) -> Result<(), InvariantViolation> {
    self.heap.lock().check()
  }

  /// Locks the heap for a longer inspection, e.g. walking its blocks.
  pub fn lock(&self) -> MutexGuard<'_, Heap<'s, P>> {
    self.heap.lock()
  }
}

/// The process-wide shared heap on the program break.
///
/// Merges are address-verified: the system allocator may move the program
/// break too, so chain neighbours of this heap are not guaranteed to touch.
static SHARED_HEAP: LockedHeap<'static, Verified> = LockedHeap::new(&ProgramBreak);

pub fn shared_heap() -> &'static LockedHeap<'static, Verified> {
  &SHARED_HEAP
}

/// Allocates `size` bytes from the shared heap.
pub fn allocate_locking(size: usize) -> Result<Allocation<'static>, AllocError> {
  SHARED_HEAP.allocate(size)
}

/// Returns an allocation from [`allocate_locking`] to the shared heap. May be
/// called from any thread.
pub fn release_locking(allocation: Allocation<'static>) -> Result<(), ReleaseError> {
  SHARED_HEAP.release(allocation)
}

/// Header plus payload of every block of the shared heap.
pub fn total_heap_bytes() -> usize {
  SHARED_HEAP.total_heap_bytes()
}

/// Header plus payload of every free block of the shared heap.
pub fn total_free_bytes() -> usize {
  SHARED_HEAP.total_free_bytes()
}

#[cfg(test)]
mod tests {
  use std::thread;

  use super::*;
  use crate::HEADER_SIZE;

  #[test]
  fn test_locked_heap_coalesces_chain_neighbours() {
    let mut region = Region::new(4096).unwrap();
    let heap = LockedHeap::exclusive(&mut region);

    let a = heap.allocate(16).unwrap();
    let b = heap.allocate(40).unwrap();
    let a_header = a.as_ptr().as_ptr() as usize - HEADER_SIZE;

    heap.release(a).unwrap();
    heap.release(b).unwrap();

    let blocks: Vec<_> = heap.lock().blocks().collect();
    assert_eq!(1, blocks.len());
    assert_eq!(a_header, blocks[0].address);
    assert_eq!(HEADER_SIZE + 16 + 40, blocks[0].size);
    assert_eq!(heap.total_heap_bytes(), heap.total_free_bytes());
    heap.check().unwrap();
  }

  #[test]
  fn test_locked_heap_across_threads() {
    let region = Region::new(1 << 20).unwrap();
    // SAFETY: no other heap draws from `region`.
    let heap = unsafe { LockedHeap::new_contiguous(&region) };

    thread::scope(|scope| {
      for t in 0..4 {
        let heap = &heap;
        scope.spawn(move || {
          let mut live = Vec::new();
          for i in 0..200 {
            let mut allocation = heap.allocate(8 + (i + t) % 64).unwrap();
            for byte in allocation.as_uninit_slice_mut() {
              byte.write(t as u8);
            }
            live.push(allocation);
            if live.len() > 8 {
              heap.release(live.remove(0)).unwrap();
            }
          }
          for allocation in live {
            heap.release(allocation).unwrap();
          }
        });
      }
    });

    heap.check().unwrap();
    assert_eq!(region.granted(), heap.total_heap_bytes());
    assert_eq!(heap.total_heap_bytes(), heap.total_free_bytes());
  }

  #[test]
  fn test_release_from_another_thread() {
    let mut region = Region::new(4096).unwrap();
    let heap = LockedHeap::exclusive(&mut region);

    let allocation = heap.allocate(32).unwrap();
    let heap = &heap;
    thread::scope(|scope| {
      scope.spawn(move || heap.release(allocation).unwrap());
    });

    assert_eq!(HEADER_SIZE + 32, heap.total_free_bytes());
  }

  #[test]
  fn test_shared_heap_round_trip() {
    let allocation = allocate_locking(48).unwrap();
    assert!(allocation.len() >= 48);
    assert!(shared_heap().lock().owns(&allocation));

    release_locking(allocation).unwrap();

    let heap = shared_heap().lock();
    assert!(heap.total_free_bytes() >= HEADER_SIZE + 48);
    assert!(heap.total_heap_bytes() >= heap.total_free_bytes());
    drop(heap);
    shared_heap().check().unwrap();
  }
}
