use std::{io::Read, thread};

use tsalloc::{
  Allocation, ProgramBreak, allocate_locking, allocate_threadlocal, locking, release_locking,
  release_threadlocal, threadlocal,
};

/// Waits until the user presses ENTER when the demo runs with `--step`.
/// Useful when you want to inspect memory state with tools like `pmap` or
/// `gdb` between steps.
fn pause(step: bool) {
  if step {
    println!("\n>>> Press ENTER to continue...");
    let _ = std::io::stdin().bytes().next();
  }
}

/// Prints the current program break.
fn print_program_break(label: &str) {
  println!(
    "[{}] PID = {}, program break = {:?}",
    label,
    std::process::id(),
    ProgramBreak::current(),
  );
}

fn print_allocation(
  label: &str,
  allocation: &Allocation<'_>,
) {
  println!(
    "[{}] {} usable bytes at {:?}, program break = {:?}",
    label,
    allocation.len(),
    allocation.as_ptr(),
    ProgramBreak::current()
  );
}

fn main() {
  let step = std::env::args().any(|arg| arg == "--step");

  print_program_break("start");
  pause(step);

  // --------------------------------------------------------------------
  // 1) Shared heap: three blocks A(16), B(32), C(16) in a row.
  // --------------------------------------------------------------------
  let a = allocate_locking(16).unwrap();
  let b = allocate_locking(32).unwrap();
  let c = allocate_locking(16).unwrap();
  print_allocation("A", &a);
  print_allocation("B", &b);
  print_allocation("C", &c);
  println!("\n{}", locking::shared_heap().lock());
  pause(step);

  // --------------------------------------------------------------------
  // 2) Release A and C. C is freed last, so it heads the free list and an
  //    exact request for 16 bytes gets C back.
  // --------------------------------------------------------------------
  let c_address = c.as_ptr();
  release_locking(a).unwrap();
  release_locking(c).unwrap();
  let again = allocate_locking(16).unwrap();
  println!(
    "[2] allocate(16) reused C? {}",
    if again.as_ptr() == c_address { "yes" } else { "no" }
  );
  pause(step);

  // --------------------------------------------------------------------
  // 3) Release B: it merges with the free A in front of it, and a request
  //    for 10 bytes gets the merged block.
  // --------------------------------------------------------------------
  release_locking(b).unwrap();
  println!("\n{}", locking::shared_heap().lock());
  let merged = allocate_locking(10).unwrap();
  print_allocation("3", &merged);
  pause(step);

  // --------------------------------------------------------------------
  // 4) Per-thread heaps: two threads growing the same program break.
  // --------------------------------------------------------------------
  let workers: Vec<_> = (0..2)
    .map(|t| {
      thread::spawn(move || {
        let allocations: Vec<_> = (0..4)
          .map(|i| allocate_threadlocal(16 * (i + 1)).unwrap())
          .collect();
        for allocation in allocations {
          release_threadlocal(allocation).unwrap();
        }
        println!(
          "[4] thread {}: {} bytes in heap, {} bytes free, {} blocks",
          t,
          threadlocal::total_heap_bytes(),
          threadlocal::total_free_bytes(),
          threadlocal::blocks().len()
        );
      })
    })
    .collect();
  for worker in workers {
    worker.join().unwrap();
  }

  release_locking(again).unwrap();
  release_locking(merged).unwrap();
  print_program_break("end");
  println!(
    "\n[5] shared heap: {} bytes, {} free. Memory is never given back; the OS reclaims it at exit.",
    locking::total_heap_bytes(),
    locking::total_free_bytes()
  );
}
