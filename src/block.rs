use core::{mem, ptr};

use crate::align;

/// Canary stored in every live header. Cleared when a header is absorbed by
/// coalescing so stale pointers into the middle of a merged block are caught.
pub(crate) const MAGIC: u32 = 0x7473_616c;

/// Bytes occupied by a header in front of every payload.
pub const HEADER_SIZE: usize = align!(mem::size_of::<Block>());

/// Intrusive metadata prefixed to every region handed out by a heap.
///
/// ```text
///   ┌──────────────────────────────┬──────────────────────────┐
///   │ Block                        │ payload (`size` bytes)   │
///   │ size | used | magic | owner  │                          │
///   │ next | prev                  │                          │
///   │ free_next | free_prev        │                          │
///   └──────────────────────────────┴──────────────────────────┘
///                                  ▲
///                                  └── Allocation::as_ptr()
/// ```
#[repr(C)]
pub(crate) struct Block {
  pub size: usize,
  pub used: bool,
  pub magic: u32,
  pub owner: u32,
  pub next: *mut Block,
  pub prev: *mut Block,
  pub free_next: *mut Block,
  pub free_prev: *mut Block,
}

impl Block {
  pub fn new(
    size: usize,
    owner: u32,
    prev: *mut Block,
  ) -> Self {
    Self {
      size,
      used: true,
      magic: MAGIC,
      owner,
      next: ptr::null_mut(),
      prev,
      free_next: ptr::null_mut(),
      free_prev: ptr::null_mut(),
    }
  }

  /// Address of the first payload byte of `block`.
  pub fn payload(block: *mut Block) -> *mut u8 {
    block.cast::<u8>().wrapping_add(HEADER_SIZE)
  }

  /// Header in front of a payload pointer.
  pub fn from_payload(payload: *mut u8) -> *mut Block {
    payload.wrapping_sub(HEADER_SIZE).cast::<Block>()
  }

  /// First address past the payload of `block`.
  ///
  /// # Safety
  ///
  /// `block` must point at an initialized header.
  pub unsafe fn end(block: *const Block) -> usize {
    block as usize + HEADER_SIZE + unsafe { (*block).size }
  }

  /// Header plus payload.
  ///
  /// # Safety
  ///
  /// `block` must point at an initialized header.
  pub unsafe fn footprint(block: *const Block) -> usize {
    HEADER_SIZE + unsafe { (*block).size }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_header_is_word_aligned() {
    assert_eq!(0, HEADER_SIZE % mem::size_of::<usize>());
    assert!(HEADER_SIZE >= mem::size_of::<Block>());
    assert!(mem::align_of::<Block>() <= mem::size_of::<usize>());
  }

  #[test]
  fn test_payload_round_trip() {
    let mut slot = [0usize; 16];
    let block = slot.as_mut_ptr().cast::<Block>();
    let payload = Block::payload(block);

    assert_eq!(block as usize + HEADER_SIZE, payload as usize);
    assert_eq!(block, Block::from_payload(payload));
  }

  #[test]
  fn test_end_and_footprint() {
    let mut block = Block::new(32, 1, ptr::null_mut());
    let address = &mut block as *mut Block;

    unsafe {
      assert_eq!(address as usize + HEADER_SIZE + 32, Block::end(address));
      assert_eq!(HEADER_SIZE + 32, Block::footprint(address));
    }
    assert!(block.used);
    assert_eq!(MAGIC, block.magic);
  }
}
