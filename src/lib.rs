//! # tsalloc - A Thread-Safe Free-List Allocator
//!
//! This crate provides a **best-fit free-list allocator** that manages memory
//! it obtains by moving the program break with `sbrk(2)`. It comes in two
//! flavours that share the same block and merge algorithms:
//!
//! - **Shared heap**: one heap for the whole process, every call takes one
//!   lock ([`allocate_locking`] / [`release_locking`]).
//! - **Per-thread heaps**: every thread owns its own lists and never locks
//!   them; only the growth of the program break is serialized
//!   ([`allocate_threadlocal`] / [`release_threadlocal`]).
//!
//! ## Overview
//!
//! Every block carries a header with its size, its state, and two pairs of
//! links: one into the block chain (all blocks, in growth order) and one into
//! the free list (unused blocks, most recently freed first).
//!
//! ```text
//!   Heap Memory (one heap, nobody else growing the break):
//!
//!   ┌──────────────────────────────────────────────────────────────────────┐
//!   │  ┌─────┬──────┬─────┬────────────┬─────┬──────┬─────┬──────────┐     │
//!   │  │ hdr │  A   │ hdr │     B      │ hdr │  C   │ hdr │    D     │     │
//!   │  └─────┴──────┴─────┴────────────┴─────┴──────┴─────┴──────────┘     │
//!   │   used          free               used         free           ▲     │
//!   │                                                                │     │
//!   │   free list: D ⇄ B                                      Program      │
//!   │                                                          Break       │
//!   └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Crate Structure
//!
//! ```text
//!   tsalloc
//!   ├── align       - Word rounding (align!)
//!   ├── block       - Block header (internal)
//!   ├── list        - Intrusive chain / free-list operations (internal)
//!   ├── extend      - AddressSpace, ProgramBreak, Region
//!   ├── policy      - Adjacency policies: Contiguous, Verified
//!   ├── allocation  - Allocation handle
//!   ├── heap        - Heap: best-fit allocation, coalescing release
//!   ├── locking     - LockedHeap and the process-wide shared heap
//!   ├── threadlocal - Per-thread heaps
//!   └── error       - AllocError, ReleaseError, InvariantViolation
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tsalloc::{allocate_locking, release_locking};
//!
//! let mut allocation = allocate_locking(64).unwrap();
//! for byte in allocation.as_uninit_slice_mut() {
//!   byte.write(0);
//! }
//! release_locking(allocation).unwrap();
//! ```
//!
//! A heap can also run over a private reservation instead of the program
//! break. Holding the region exclusively lets it merge chain neighbours
//! without checking their addresses:
//!
//! ```rust
//! use tsalloc::{Heap, Region};
//!
//! let mut region = Region::new(4096).unwrap();
//! let mut heap = Heap::exclusive(&mut region);
//!
//! let a = heap.allocate(16).unwrap();
//! let b = heap.allocate(32).unwrap();
//! heap.release(a).unwrap();
//! heap.release(b).unwrap();
//!
//! // Both blocks were merged into one free block.
//! assert_eq!(1, heap.blocks().count());
//! assert_eq!(heap.total_heap_bytes(), heap.total_free_bytes());
//! ```
//!
//! ## How It Works
//!
//! **Allocation** scans the free list for the smallest block that is large
//! enough. An exact fit stops the scan; ties go to the block found first. The
//! chosen block is handed out whole, it is never split. When nothing fits, the
//! heap grows by one header plus the requested size and appends the new block
//! to its chain.
//!
//! **Release** marks the block free, then tries to merge it with its chain
//! successor and predecessor:
//!
//! ```text
//!   before:  ┌─────┬──────┬─────┬──────┬─────┬──────┐
//!            │ hdr │ free │ hdr │ ──── │ hdr │ free │    releasing the middle
//!            └─────┴──────┴─────┴──────┴─────┴──────┘
//!
//!   after:   ┌─────┬──────────────────────────────────┐
//!            │ hdr │              free                │    one block, one header
//!            └─────┴──────────────────────────────────┘
//! ```
//!
//! Chain neighbours are only merged when the heap's [`Adjacency`] policy
//! agrees. With per-thread heaps, other threads grow the same program break
//! in between, so a thread's neighbours may not touch at all:
//!
//! ```text
//!   ┌─────┬──────┬─────┬──────┬─────┬──────┐
//!   │ hdr │ T1 a │ hdr │ T2 x │ hdr │ T1 b │    a and b are chain neighbours
//!   └─────┴──────┴─────┴──────┴─────┴──────┘    in T1's heap, but x sits
//!                                                between them: never merge.
//! ```
//!
//! [`Verified`] checks `prev + HEADER_SIZE + prev.size == next` before every
//! merge; [`Contiguous`] skips the check and is only sound for a heap that is
//! the sole user of its address space. That is why a `Contiguous` heap is built
//! either from a `&mut Region` ([`Heap::exclusive`]) or through the `unsafe`
//! [`Heap::new_contiguous`].
//!
//! ## Limitations
//!
//! - **No splitting**: a reused block may be much larger than requested
//! - **No shrinking**: memory is never returned to the OS
//! - **Word alignment only**: payloads are aligned to `usize`, nothing more
//! - **Unix-only**: requires `libc`, `sbrk` and `mmap`
//!
//! ## Safety
//!
//! The safe API hands out [`Allocation`] handles that are consumed on
//! release, so a block cannot be released twice through it. Going through raw
//! pointers ([`Allocation::into_raw`] / [`Allocation::from_raw`]) is `unsafe`;
//! headers carry a canary that catches most misuse before anything is
//! modified.

pub mod align;
mod allocation;
mod block;
pub mod error;
pub mod extend;
pub mod heap;
mod list;
pub mod locking;
pub mod policy;
pub mod threadlocal;

pub use allocation::Allocation;
pub use block::HEADER_SIZE;
pub use error::{AllocError, InvariantViolation, ReleaseError};
pub use extend::{AddressSpace, ProgramBreak, Region};
pub use heap::{BlockInfo, Heap};
pub use locking::{LockedHeap, allocate_locking, release_locking};
pub use policy::{Adjacency, Contiguous, Verified};
pub use threadlocal::{allocate_threadlocal, release_threadlocal};
