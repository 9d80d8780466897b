use std::{io::Read, ptr};

use brkalloc::{BrkGrower, FirstFit, grower::program_break};

/// Waits until the user presses ENTER.
/// Useful when you want to inspect memory state with tools like `pmap`, `htop`,
/// `gdb`, or just visually track how allocations move the program break.
fn block_until_enter_pressed() {
  println!("\n>>> Press ENTER to continue...");
  let _ = std::io::stdin().bytes().next();
}

fn print_program_break(label: &str) {
  println!(
    "[{}] PID = {}, program break (sbrk(0)) = {:?}",
    label,
    std::process::id(),
    program_break(),
  );
}

fn print_alloc(
  allocator: &FirstFit<BrkGrower>,
  requested: usize,
  addr: *mut u8,
) {
  println!(
    "Allocated {} bytes, address = {:?}, usable = {:?}, heap end = {:?}",
    requested,
    addr,
    unsafe { allocator.usable_size(addr) },
    allocator.heap().end(),
  );
}

fn main() {
  let mut allocator = FirstFit::new(BrkGrower::new());

  print_program_break("start");
  block_until_enter_pressed();

  // 1) The first allocation sets up the heap with one extension step.
  let first = match allocator.allocate(10) {
    Ok(payload) => payload.as_ptr(),
    Err(error) => {
      eprintln!("allocation failed: {error}");
      return;
    }
  };
  println!("\n[1] Allocate 10 bytes");
  print_alloc(&allocator, 10, first);
  print_program_break("after first alloc");

  unsafe { ptr::write_bytes(first, 0xAB, 10) };
  block_until_enter_pressed();

  // 2) A second small block lands in the slack, the break does not move.
  let second = match allocator.allocate(100) {
    Ok(payload) => payload.as_ptr(),
    Err(error) => {
      eprintln!("allocation failed: {error}");
      return;
    }
  };
  println!("\n[2] Allocate 100 bytes");
  print_alloc(&allocator, 100, second);
  print_program_break("after second alloc");
  block_until_enter_pressed();

  // 3) Free the first block and ask for the same size again.
  if let Err(error) = unsafe { allocator.release(first) } {
    eprintln!("release failed: {error}");
  }
  let reused = allocator.allocate(10).map(|payload| payload.as_ptr());
  println!("\n[3] Release the first block and allocate 10 bytes again");
  println!(
    "[3] reused the freed block? {}",
    if reused == Ok(first) { "yes" } else { "no" }
  );
  block_until_enter_pressed();

  // 4) A large request does not fit the slack and grows the heap.
  print_program_break("before large alloc");
  match allocator.allocate(64 * 1024) {
    Ok(payload) => print_alloc(&allocator, 64 * 1024, payload.as_ptr()),
    Err(error) => eprintln!("large allocation failed: {error}"),
  }
  print_program_break("after large alloc");
  block_until_enter_pressed();

  println!("\n[5] Blocks in the heap:");
  for block in allocator.blocks() {
    println!(
      "    {:?}  capacity = {:>6}  {:?}",
      block.payload, block.capacity, block.status
    );
  }

  println!("\nThe heap never shrinks; the OS reclaims it when the process exits.");
}
