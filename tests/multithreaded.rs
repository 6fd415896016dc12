//! Multi-threaded tests of the process-wide entry points.

use std::{sync::mpsc, thread};

use tsalloc::{
  Allocation, HEADER_SIZE, ReleaseError, allocate_locking, allocate_threadlocal, locking,
  release_locking, release_threadlocal, threadlocal,
};

fn fill(
  allocation: &mut Allocation<'_>,
  value: u8,
) {
  for byte in allocation.as_uninit_slice_mut() {
    byte.write(value);
  }
}

fn holds(
  allocation: &Allocation<'_>,
  value: u8,
) -> bool {
  let bytes = unsafe { std::slice::from_raw_parts(allocation.as_ptr().as_ptr(), allocation.len()) };
  bytes.iter().all(|byte| *byte == value)
}

#[test]
fn test_shared_heap_from_many_threads() {
  let num_threads = 8;
  let iterations = 500;

  let handles: Vec<_> = (0..num_threads)
    .map(|t| {
      thread::spawn(move || {
        let mut live: Vec<Allocation<'static>> = Vec::new();
        for i in 0..iterations {
          let mut allocation = allocate_locking(8 + (i * 13 + t) % 120).unwrap();
          fill(&mut allocation, t as u8);
          live.push(allocation);
          if live.len() > 10 {
            let oldest = live.remove(0);
            assert!(holds(&oldest, t as u8));
            release_locking(oldest).unwrap();
          }
        }
        for allocation in live {
          assert!(holds(&allocation, t as u8));
          release_locking(allocation).unwrap();
        }
      })
    })
    .collect();

  for handle in handles {
    handle.join().unwrap();
  }

  // Other tests share this heap; read both totals under one lock.
  let heap = locking::shared_heap().lock();
  heap.check().unwrap();
  assert!(heap.total_heap_bytes() >= heap.total_free_bytes());
}

#[test]
fn test_shared_heap_cross_thread_release() {
  let (tx, rx) = mpsc::channel::<Vec<Allocation<'static>>>();

  let producers: Vec<_> = (0..4)
    .map(|t| {
      let tx = tx.clone();
      thread::spawn(move || {
        let items = (0..100)
          .map(|_| {
            let mut allocation = allocate_locking(64).unwrap();
            fill(&mut allocation, t);
            allocation
          })
          .collect();
        tx.send(items).unwrap();
      })
    })
    .collect();

  drop(tx);

  let mut total = 0;
  for items in rx {
    total += items.len();
    for allocation in items {
      release_locking(allocation).unwrap();
    }
  }

  for producer in producers {
    producer.join().unwrap();
  }

  assert_eq!(400, total);
  locking::shared_heap().check().unwrap();
}

#[test]
fn test_thread_heaps_are_independent() {
  let handles: Vec<_> = (0..8u8)
    .map(|t| {
      thread::spawn(move || {
        let mut live = Vec::new();
        for i in 0..300usize {
          let mut allocation = allocate_threadlocal(16 + (i % 7) * 8).unwrap();
          fill(&mut allocation, t);
          live.push(allocation);
          if i % 2 == 1 {
            let allocation = live.swap_remove(i % live.len());
            assert!(holds(&allocation, t));
            release_threadlocal(allocation).unwrap();
          }
        }

        for allocation in &live {
          assert!(holds(allocation, t));
        }
        for allocation in live {
          release_threadlocal(allocation).unwrap();
        }

        threadlocal::check().unwrap();
        assert_eq!(threadlocal::total_heap_bytes(), threadlocal::total_free_bytes());

        // Free blocks of this heap never overlap each other.
        let mut ranges: Vec<_> = threadlocal::blocks()
          .iter()
          .map(|block| (block.address, block.address + block.footprint()))
          .collect();
        ranges.sort();
        assert!(ranges.windows(2).all(|pair| pair[0].1 <= pair[1].0));
      })
    })
    .collect();

  for handle in handles {
    handle.join().unwrap();
  }
}

#[test]
fn test_thread_heap_rejects_other_threads_blocks() {
  let foreign = thread::spawn(|| allocate_threadlocal(32).unwrap()).join().unwrap();

  thread::spawn(move || {
    let own = allocate_threadlocal(32).unwrap();

    let error = release_threadlocal(foreign).unwrap_err();
    assert!(matches!(error, ReleaseError::ForeignHeap { .. }));

    release_threadlocal(own).unwrap();
    assert_eq!(HEADER_SIZE + 32, threadlocal::total_free_bytes());
  })
  .join()
  .unwrap();
}
