use core::{
  fmt,
  marker::PhantomData,
  mem::MaybeUninit,
  ptr::NonNull,
  slice,
};

use crate::{
  block::{Block, MAGIC},
  error::ReleaseError,
};

/// Handle to a block handed out by a heap.
///
/// The handle owns the payload until it is given back with `release`, which
/// consumes it, so the safe API cannot release a block twice. Header recovery
/// (payload address minus [`HEADER_SIZE`](crate::HEADER_SIZE)) stays behind
/// this type; the only way back from a raw pointer is the validating
/// [`from_raw`](Allocation::from_raw).
///
/// The lifetime ties the handle to the address space its heap draws from.
pub struct Allocation<'s> {
  block: NonNull<Block>,
  _space: PhantomData<&'s ()>,
}

// SAFETY: the payload is exclusively owned by the handle; the header is only
// touched by the owning heap, which checks ownership before mutating it.
unsafe impl Send for Allocation<'_> {}
unsafe impl Sync for Allocation<'_> {}

impl<'s> Allocation<'s> {
  pub(crate) fn new(block: NonNull<Block>) -> Self {
    Self {
      block,
      _space: PhantomData,
    }
  }

  pub(crate) fn block(&self) -> *mut Block {
    self.block.as_ptr()
  }

  /// First byte of the payload. The memory is uninitialized until written.
  pub fn as_ptr(&self) -> NonNull<u8> {
    // SAFETY: a header is never at the very end of the address space, the
    // payload follows it.
    unsafe { NonNull::new_unchecked(Block::payload(self.block.as_ptr())) }
  }

  /// Usable payload bytes. At least the requested size, more when a larger
  /// free block was reused.
  pub fn len(&self) -> usize {
    // SAFETY: used headers are never rewritten while the handle is alive.
    unsafe { (*self.block.as_ptr()).size }
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Id of the heap that created the block.
  pub fn owner(&self) -> u32 {
    unsafe { (*self.block.as_ptr()).owner }
  }

  pub fn as_uninit_slice_mut(&mut self) -> &mut [MaybeUninit<u8>] {
    // SAFETY: `len()` bytes behind the payload belong to this handle.
    let payload = self.as_ptr().as_ptr().cast::<MaybeUninit<u8>>();
    unsafe { slice::from_raw_parts_mut(payload, self.len()) }
  }

  /// Gives up the handle, returning the payload pointer. Use
  /// [`from_raw`](Allocation::from_raw) to get the handle back.
  pub fn into_raw(self) -> NonNull<u8> {
    self.as_ptr()
  }

  /// Recovers a handle from a payload pointer.
  ///
  /// The header in front of `payload` is validated first: a missing canary
  /// yields [`ReleaseError::InvalidPointer`], a block that is already free
  /// yields [`ReleaseError::DoubleRelease`].
  ///
  /// # Safety
  ///
  /// The [`HEADER_SIZE`](crate::HEADER_SIZE) bytes in front of `payload` must
  /// be readable. This holds for every pointer obtained from `into_raw`, even
  /// after the block was released, as long as the address space it came from
  /// is alive. At most one handle may exist per block.
  pub unsafe fn from_raw(payload: NonNull<u8>) -> Result<Self, ReleaseError> {
    let block = Block::from_payload(payload.as_ptr());
    let address = payload.as_ptr() as usize;

    // SAFETY: the caller guarantees the header bytes are readable.
    let (magic, used) = unsafe { ((*block).magic, (*block).used) };
    if magic != MAGIC {
      return Err(ReleaseError::InvalidPointer { address });
    }
    if !used {
      return Err(ReleaseError::DoubleRelease { address });
    }

    NonNull::new(block)
      .map(Allocation::new)
      .ok_or(ReleaseError::InvalidPointer { address })
  }
}

impl fmt::Debug for Allocation<'_> {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    f.debug_struct("Allocation")
      .field("ptr", &self.as_ptr())
      .field("len", &self.len())
      .field("owner", &self.owner())
      .finish()
  }
}
