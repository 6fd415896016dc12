use thiserror::Error;

/// Failure of an allocation request.
///
/// Both variants leave the heap untouched: nothing is linked into the block
/// chain before the address space has actually been extended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AllocError {
  /// The address space could not be extended by `requested` bytes.
  #[error("address space exhausted: could not extend the heap by {requested} bytes")]
  Exhausted { requested: usize },
  /// Header plus payload does not fit in a `usize`.
  #[error("allocation of {requested} bytes overflows the address space")]
  SizeOverflow { requested: usize },
  /// A [`Region`](crate::Region) could not reserve its backing memory.
  #[error("failed to reserve a region of {capacity} bytes")]
  Reserve { capacity: usize },
}

/// Failure of a release request. The heap is not modified when one of these
/// is returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ReleaseError {
  /// The pointer does not carry a live block header.
  #[error("pointer {address:#x} was not returned by this allocator")]
  InvalidPointer { address: usize },
  /// The block behind the pointer is already free.
  #[error("block at {address:#x} is already released")]
  DoubleRelease { address: usize },
  /// The block belongs to a different heap instance (another thread's heap in
  /// the thread-local variant).
  #[error("block at {address:#x} is owned by heap {owner}, not by heap {heap}")]
  ForeignHeap { address: usize, owner: u32, heap: u32 },
}

/// A broken structural invariant found by [`Heap::check`](crate::Heap::check).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InvariantViolation {
  #[error("block {address:#x} has a corrupted header")]
  CorruptHeader { address: usize },
  #[error("chain link between {address:#x} and its successor is not symmetric")]
  BrokenChain { address: usize },
  #[error("last block of the chain is not the heap tail")]
  TailMismatch,
  #[error("free list link at {address:#x} is not symmetric")]
  BrokenFreeList { address: usize },
  #[error("used block {address:#x} is on the free list")]
  UsedBlockInFreeList { address: usize },
  #[error("block {address:#x} is on the free list more than once")]
  DuplicateFreeEntry { address: usize },
  #[error("free block {address:#x} is missing from the free list")]
  MissingFreeEntry { address: usize },
}
