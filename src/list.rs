//! Intrusive list plumbing shared by every heap.
//!
//! Two lists are threaded through the same headers: the block chain
//! (`next`/`prev`, every block in growth order) and the free list
//! (`free_next`/`free_prev`, unused blocks only, most recently freed first).
//! All functions require every pointer they touch to be a live header of the
//! same heap.

use core::ptr;

use crate::block::Block;

/// Pushes `block` onto the front of the free list.
pub(crate) unsafe fn insert_at_head(
  head: &mut *mut Block,
  block: *mut Block,
) {
  unsafe {
    (*block).free_prev = ptr::null_mut();
    (*block).free_next = *head;

    if !(*head).is_null() {
      (**head).free_prev = block;
    }
  }

  *head = block;
}

/// Unlinks `block` from the free list and clears its free-list links.
pub(crate) unsafe fn remove(
  head: &mut *mut Block,
  block: *mut Block,
) {
  unsafe {
    let next = (*block).free_next;
    let prev = (*block).free_prev;

    if *head == block {
      *head = next;
    }
    if !next.is_null() {
      (*next).free_prev = prev;
    }
    if !prev.is_null() {
      (*prev).free_next = next;
    }

    (*block).free_next = ptr::null_mut();
    (*block).free_prev = ptr::null_mut();
  }
}

/// Appends `block` to the chain ending at `last`.
pub(crate) unsafe fn append(
  first: &mut *mut Block,
  last: &mut *mut Block,
  block: *mut Block,
) {
  unsafe {
    (*block).prev = *last;
    (*block).next = ptr::null_mut();

    if (*last).is_null() {
      *first = block;
    } else {
      (**last).next = block;
    }
  }

  *last = block;
}

/// Splices `block` out of the chain. Its predecessor must exist: the first
/// block of a heap is never absorbed.
pub(crate) unsafe fn splice_out(
  last: &mut *mut Block,
  block: *mut Block,
) {
  unsafe {
    let next = (*block).next;
    let prev = (*block).prev;

    (*prev).next = next;
    if next.is_null() {
      *last = prev;
    } else {
      (*next).prev = prev;
    }

    (*block).next = ptr::null_mut();
    (*block).prev = ptr::null_mut();
    (*block).magic = 0;
  }
}

/// Iterates a list starting at `start`, following the link picked by `step`.
pub(crate) struct Links {
  current: *mut Block,
  step: fn(*mut Block) -> *mut Block,
}

impl Links {
  pub unsafe fn chain(first: *mut Block) -> Self {
    Self {
      current: first,
      step: |block| unsafe { (*block).next },
    }
  }

  pub unsafe fn free(head: *mut Block) -> Self {
    Self {
      current: head,
      step: |block| unsafe { (*block).free_next },
    }
  }
}

impl Iterator for Links {
  type Item = *mut Block;

  fn next(&mut self) -> Option<Self::Item> {
    if self.current.is_null() {
      return None;
    }

    let block = self.current;
    self.current = (self.step)(block);
    Some(block)
  }
}
