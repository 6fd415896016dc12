//! Per-thread-heap variant: every thread owns its block chain and free list.
//!
//! The lists need no lock because no other thread ever reaches them. All
//! threads still grow the one program break, so a thread's chain neighbours
//! can be separated by blocks of other threads; merges are therefore always
//! address-verified.

use core::cell::RefCell;

use crate::{
  allocation::Allocation,
  error::{AllocError, InvariantViolation, ReleaseError},
  extend::ProgramBreak,
  heap::{BlockInfo, Heap},
  policy::Verified,
};

thread_local! {
  // Created on first use, never torn down: blocks of an exited thread stay
  // in the address space until the process ends.
  static THREAD_HEAP: RefCell<Heap<'static, Verified>> =
    const { RefCell::new(Heap::new(&ProgramBreak)) };
}

/// Allocates `size` bytes from the calling thread's heap.
pub fn allocate_threadlocal(size: usize) -> Result<Allocation<'static>, AllocError> {
  THREAD_HEAP.with_borrow_mut(|heap| heap.allocate(size))
}

/// Returns an allocation to the calling thread's heap.
///
/// Allocations made on another thread are rejected with
/// [`ReleaseError::ForeignHeap`] and stay allocated.
pub fn release_threadlocal(allocation: Allocation<'static>) -> Result<(), ReleaseError> {
  THREAD_HEAP.with_borrow_mut(|heap| heap.release(allocation))
}

/// Header plus payload of every block of the calling thread's heap.
pub fn total_heap_bytes() -> usize {
  THREAD_HEAP.with_borrow(|heap| heap.total_heap_bytes())
}

/// Header plus payload of every free block of the calling thread's heap.
pub fn total_free_bytes() -> usize {
  THREAD_HEAP.with_borrow(|heap| heap.total_free_bytes())
}

/// Snapshot of the calling thread's block chain.
pub fn blocks() -> Vec<BlockInfo> {
  THREAD_HEAP.with_borrow(|heap| heap.blocks().collect())
}

pub fn check() -> Result<(), InvariantViolation> {
  THREAD_HEAP.with_borrow(|heap| heap.check())
}

#[cfg(test)]
mod tests {
  use std::thread;

  use super::*;
  use crate::HEADER_SIZE;

  #[test]
  fn test_thread_heap_round_trip() {
    thread::spawn(|| {
      assert_eq!(0, total_heap_bytes());

      let a = allocate_threadlocal(24).unwrap();
      let b = allocate_threadlocal(40).unwrap();
      assert_eq!(2, blocks().len());

      release_threadlocal(a).unwrap();
      release_threadlocal(b).unwrap();

      assert_eq!(total_heap_bytes(), total_free_bytes());
      assert_eq!(2 * HEADER_SIZE + 24 + 40, total_heap_bytes());
      check().unwrap();
    })
    .join()
    .unwrap();
  }

  #[test]
  fn test_threads_have_separate_heaps() {
    let allocation = thread::spawn(|| allocate_threadlocal(16).unwrap()).join().unwrap();

    thread::spawn(move || {
      let _own = allocate_threadlocal(8).unwrap();
      let error = release_threadlocal(allocation).unwrap_err();

      assert!(matches!(error, ReleaseError::ForeignHeap { .. }));
      assert_eq!(1, blocks().len());
      assert_eq!(0, total_free_bytes());
    })
    .join()
    .unwrap();
  }
}
