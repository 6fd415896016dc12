//! A single heap instance: block chain, free list, and the engines that work
//! on them.

use core::{
  fmt,
  marker::PhantomData,
  ptr::{self, NonNull},
};
use std::{
  collections::HashSet,
  sync::atomic::{AtomicU32, Ordering},
};

use crate::{
  align::checked_align,
  allocation::Allocation,
  block::{Block, HEADER_SIZE, MAGIC},
  error::{AllocError, InvariantViolation, ReleaseError},
  extend::{AddressSpace, Region},
  list::{self, Links},
  policy::{Adjacency, Contiguous, Verified},
};

static NEXT_HEAP_ID: AtomicU32 = AtomicU32::new(1);

/// Takes the next heap id from `counter`. `0` marks a heap that has not
/// allocated yet, so it is skipped when the counter wraps.
fn next_heap_id(counter: &AtomicU32) -> u32 {
  loop {
    let id = counter.fetch_add(1, Ordering::Relaxed);
    if id != 0 {
      return id;
    }
  }
}

/// Snapshot of one block of the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
  /// Address of the header.
  pub address: usize,
  /// Payload bytes.
  pub size: usize,
  pub used: bool,
}

impl BlockInfo {
  fn of(block: *mut Block) -> Self {
    // SAFETY: only built from links of a live heap.
    unsafe {
      Self {
        address: block as usize,
        size: (*block).size,
        used: (*block).used,
      }
    }
  }

  /// Address of the first payload byte.
  pub fn payload(&self) -> usize {
    self.address + HEADER_SIZE
  }

  /// Header plus payload.
  pub fn footprint(&self) -> usize {
    HEADER_SIZE + self.size
  }
}

/// One best-fit free-list heap over an [`AddressSpace`].
///
/// ```text
///   first                                                   last
///     │                                                      │
///     ▼                                                      ▼
///   ┌─────┬────────┐   ┌─────┬──────┐   ┌─────┬─────────┐   ┌─────┬────┐
///   │ hdr │ used   │ ⇄ │ hdr │ free │ ⇄ │ hdr │ used    │ ⇄ │ hdr │free│
///   └─────┴────────┘   └─────┴──────┘   └─────┴─────────┘   └─────┴────┘
///                         ▲                                    ▲
///   free_head ────────────┼────────────────────────────────────┘
///                         └─────── free_next ──────────────────┘
/// ```
///
/// The heap grows at the tail and never splits or shrinks blocks; freed blocks
/// are coalesced with free chain neighbours whenever the policy `P` says the
/// two are adjacent in memory.
///
/// A heap is not synchronized. Share it through a
/// [`LockedHeap`](crate::LockedHeap) or keep it thread-local.
pub struct Heap<'s, P> {
  space: &'s dyn AddressSpace,
  id: u32,
  first: *mut Block,
  last: *mut Block,
  free_head: *mut Block,
  _policy: PhantomData<fn() -> P>,
}

// SAFETY: every block reachable from the heap is owned by it alone, and the
// address space is `Sync`. Moving the heap moves that ownership with it.
unsafe impl<P> Send for Heap<'_, P> {}

impl<'s> Heap<'s, Verified> {
  /// An empty heap that merges only blocks whose addresses meet. Nothing is
  /// requested from `space` before the first allocation.
  ///
  /// Any number of heaps may share `space`.
  pub const fn new(space: &'s dyn AddressSpace) -> Self {
    Self::with_space(space)
  }
}

impl<'s> Heap<'s, Contiguous> {
  /// An empty heap that takes `region` for itself, which makes merging chain
  /// neighbours without an address check sound.
  ///
  /// The region stays mutably borrowed for as long as the heap lives, so no
  /// second heap can grow into it:
  ///
  /// ```compile_fail
  /// use tsalloc::{Heap, Region};
  ///
  /// let mut region = Region::new(4096).unwrap();
  /// let mine = Heap::exclusive(&mut region);
  /// let other = Heap::exclusive(&mut region);
  /// drop((mine, other));
  /// ```
  ///
  /// A shared address space only gets a [`Verified`] heap from the safe
  /// constructors:
  ///
  /// ```compile_fail
  /// use tsalloc::{Contiguous, Heap, Region};
  ///
  /// let region = Region::new(4096).unwrap();
  /// let heap = Heap::<Contiguous>::new(&region);
  /// ```
  pub fn exclusive(region: &'s mut Region) -> Self {
    Self::with_space(region)
  }

  /// An empty heap that merges chain neighbours without an address check.
  ///
  /// # Safety
  ///
  /// While the heap is alive, nothing but this heap may extend `space`: no
  /// other heap, and no code calling the underlying primitive directly.
  /// Otherwise a merge can swallow memory that belongs to someone else.
  pub const unsafe fn new_contiguous(space: &'s dyn AddressSpace) -> Self {
    Self::with_space(space)
  }
}

impl<'s, P: Adjacency> Heap<'s, P> {
  const fn with_space(space: &'s dyn AddressSpace) -> Self {
    Self {
      space,
      id: 0,
      first: ptr::null_mut(),
      last: ptr::null_mut(),
      free_head: ptr::null_mut(),
      _policy: PhantomData,
    }
  }

  /// Id stamped into every header this heap creates; `0` until the first
  /// allocation.
  pub fn id(&self) -> u32 {
    self.id
  }

  /// Allocates at least `size` bytes.
  ///
  /// The size is rounded up to the machine word. A size of `0` produces a
  /// 0-byte block with its own payload address. The best-fitting free block
  /// is reused whole; if none fits, the heap grows by
  /// [`HEADER_SIZE`] plus the rounded size.
  pub fn allocate(
    &mut self,
    size: usize,
  ) -> Result<Allocation<'s>, AllocError> {
    let size = checked_align(size).ok_or(AllocError::SizeOverflow { requested: size })?;

    if self.first.is_null() {
      return self.grow(size);
    }

    match self.best_fit(size) {
      Some(block) => {
        // SAFETY: `block` came from this heap's free list.
        unsafe {
          list::remove(&mut self.free_head, block.as_ptr());
          (*block.as_ptr()).used = true;
          tracing::trace!(
            heap = self.id,
            size,
            available = (*block.as_ptr()).size,
            "reused free block"
          );
        }
        Ok(Allocation::new(block))
      }
      None => self.grow(size),
    }
  }

  /// Smallest free block of at least `size` bytes. An exact fit ends the scan;
  /// among equally good candidates the first one on the free list wins.
  fn best_fit(
    &self,
    size: usize,
  ) -> Option<NonNull<Block>> {
    let mut best: Option<(NonNull<Block>, usize)> = None;

    // SAFETY: the free list only links live headers of this heap.
    for block in unsafe { Links::free(self.free_head) } {
      let available = unsafe { (*block).size };
      if available < size {
        continue;
      }
      if available == size {
        return NonNull::new(block);
      }

      let diff = available - size;
      if best.is_none_or(|(_, best_diff)| diff < best_diff) {
        best = NonNull::new(block).map(|block| (block, diff));
      }
    }

    best.map(|(block, _)| block)
  }

  /// Extends the address space and appends a used block of `size` bytes.
  fn grow(
    &mut self,
    size: usize,
  ) -> Result<Allocation<'s>, AllocError> {
    let bytes = HEADER_SIZE
      .checked_add(size)
      .ok_or(AllocError::SizeOverflow { requested: size })?;

    let base = self.space.extend(bytes).inspect_err(|error| {
      tracing::debug!(heap = self.id, bytes, %error, "heap growth failed");
    })?;

    if self.id == 0 {
      self.id = next_heap_id(&NEXT_HEAP_ID);
    }

    let block = base.cast::<Block>();
    // SAFETY: `extend` returned `bytes` fresh, word-aligned bytes that nobody
    // else can see yet.
    unsafe {
      block.as_ptr().write(Block::new(size, self.id, ptr::null_mut()));
      list::append(&mut self.first, &mut self.last, block.as_ptr());
    }

    tracing::trace!(heap = self.id, bytes, base = ?base, "heap grown");
    Ok(Allocation::new(block))
  }

  /// Whether `allocation` was handed out by this heap.
  pub fn owns(
    &self,
    allocation: &Allocation<'_>,
  ) -> bool {
    self.id != 0 && allocation.owner() == self.id
  }

  /// Gives a block back to the heap.
  ///
  /// The block is merged with its chain successor and then its predecessor
  /// when those are free and adjacent under `P`. Whatever is left is pushed
  /// onto the front of the free list. A block of another heap is rejected
  /// untouched, and the handle is dropped without freeing it.
  pub fn release(
    &mut self,
    allocation: Allocation<'s>,
  ) -> Result<(), ReleaseError> {
    let block = allocation.block();

    if !self.owns(&allocation) {
      return Err(ReleaseError::ForeignHeap {
        address: allocation.as_ptr().as_ptr() as usize,
        owner: allocation.owner(),
        heap: self.id,
      });
    }

    // SAFETY: the handle proves `block` is a used header of this heap.
    unsafe {
      (*block).used = false;
      self.coalesce(block);
    }

    Ok(())
  }

  /// Merges a just-freed `block` into its free neighbours, or lists it.
  unsafe fn coalesce(
    &mut self,
    block: *mut Block,
  ) {
    unsafe {
      let next = (*block).next;
      if !next.is_null() && !(*next).used {
        if P::adjacent(Block::end(block), next as usize) {
          list::remove(&mut self.free_head, next);
          (*block).size += Block::footprint(next);
          list::splice_out(&mut self.last, next);
          tracing::trace!(heap = self.id, block = ?block, size = (*block).size, "merged forwards");
        } else {
          tracing::debug!(heap = self.id, block = ?block, next = ?next, "successor not adjacent");
        }
      }

      let prev = (*block).prev;
      if !prev.is_null() && !(*prev).used {
        if P::adjacent(Block::end(prev), block as usize) {
          (*prev).size += Block::footprint(block);
          list::splice_out(&mut self.last, block);
          tracing::trace!(heap = self.id, block = ?prev, size = (*prev).size, "merged backwards");
          return;
        }
        tracing::debug!(heap = self.id, block = ?block, prev = ?prev, "predecessor not adjacent");
      }

      list::insert_at_head(&mut self.free_head, block);
    }
  }

  /// Header plus payload of every block, used or free. Equals the sum of all
  /// extensions this heap was granted.
  pub fn total_heap_bytes(&self) -> usize {
    self.blocks().map(|block| block.footprint()).sum()
  }

  /// Header plus payload of every block on the free list.
  pub fn total_free_bytes(&self) -> usize {
    self.free_blocks().map(|block| block.footprint()).sum()
  }

  /// The block chain in growth order.
  pub fn blocks(&self) -> impl Iterator<Item = BlockInfo> + '_ {
    // SAFETY: the chain only links live headers of this heap.
    unsafe { Links::chain(self.first) }.map(BlockInfo::of)
  }

  /// The free list, most recently freed first.
  pub fn free_blocks(&self) -> impl Iterator<Item = BlockInfo> + '_ {
    // SAFETY: the free list only links live headers of this heap.
    unsafe { Links::free(self.free_head) }.map(BlockInfo::of)
  }

  /// Walks both lists and verifies their structure: intact headers,
  /// symmetric links, and a free list holding exactly the unused blocks,
  /// each once.
  pub fn check(&self) -> Result<(), InvariantViolation> {
    let mut unused = HashSet::new();
    let mut tail = ptr::null_mut();

    // SAFETY: read-only walk over headers reachable from this heap.
    unsafe {
      for block in Links::chain(self.first) {
        let address = block as usize;
        if (*block).magic != MAGIC || (*block).owner != self.id {
          return Err(InvariantViolation::CorruptHeader { address });
        }
        if (*block).prev != tail {
          return Err(InvariantViolation::BrokenChain { address: tail as usize });
        }
        if !(*block).used {
          unused.insert(address);
        }
        tail = block;
      }

      if tail != self.last {
        return Err(InvariantViolation::TailMismatch);
      }

      let mut listed = HashSet::new();
      let mut prev = ptr::null_mut();
      for block in Links::free(self.free_head) {
        let address = block as usize;
        if (*block).free_prev != prev {
          return Err(InvariantViolation::BrokenFreeList { address });
        }
        if (*block).used {
          return Err(InvariantViolation::UsedBlockInFreeList { address });
        }
        if !listed.insert(address) {
          return Err(InvariantViolation::DuplicateFreeEntry { address });
        }
        prev = block;
      }

      if let Some(&address) = unused.difference(&listed).next() {
        return Err(InvariantViolation::MissingFreeEntry { address });
      }
      if let Some(&address) = listed.difference(&unused).next() {
        return Err(InvariantViolation::CorruptHeader { address });
      }
    }

    Ok(())
  }
}

impl<P: Adjacency> fmt::Display for Heap<'_, P> {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    writeln!(
      f,
      "heap {}: {} bytes total, {} bytes free",
      self.id,
      self.total_heap_bytes(),
      self.total_free_bytes()
    )?;

    for block in self.blocks() {
      writeln!(
        f,
        "  {:#014x}  {:>8} bytes  {}",
        block.address,
        block.size,
        if block.used { "used" } else { "free" }
      )?;
    }

    Ok(())
  }
}
