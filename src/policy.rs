//! When may two chain neighbours be coalesced?
//!
//! Chain order is the order in which a heap grew. Whether that also means the
//! blocks touch in memory depends on who else draws from the same address
//! space, so the release engine asks the heap's policy before every merge.

/// Decides whether a block ending at `left_end` and a block starting at
/// `right_start` form one contiguous range.
pub trait Adjacency {
  fn adjacent(
    left_end: usize,
    right_start: usize,
  ) -> bool;
}

/// Chain neighbours are physically adjacent by construction.
///
/// Only sound when the heap is the sole user of its address space, so no
/// other growth can land between two of its blocks.
#[derive(Debug, Clone, Copy, Default)]
pub struct Contiguous;

impl Adjacency for Contiguous {
  #[inline]
  fn adjacent(
    _left_end: usize,
    _right_start: usize,
  ) -> bool {
    true
  }
}

/// Chain neighbours are merged only if their addresses actually meet.
///
/// Required whenever several heaps (or foreign code) extend the same address
/// space, since another heap's block may sit between two chain neighbours.
#[derive(Debug, Clone, Copy, Default)]
pub struct Verified;

impl Adjacency for Verified {
  #[inline]
  fn adjacent(
    left_end: usize,
    right_start: usize,
  ) -> bool {
    left_end == right_start
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_contiguous_ignores_addresses() {
    assert!(Contiguous::adjacent(0x1000, 0x1000));
    assert!(Contiguous::adjacent(0x1000, 0x2000));
  }

  #[test]
  fn test_verified_requires_touching_ranges() {
    assert!(Verified::adjacent(0x1000, 0x1000));
    assert!(!Verified::adjacent(0x1000, 0x1040));
    assert!(!Verified::adjacent(0x1040, 0x1000));
  }
}
