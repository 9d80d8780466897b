//! # brkalloc - A First-Fit `malloc` Replacement
//!
//! This crate implements a small **first-fit allocator** that manages a single
//! heap grown with `sbrk(2)` and can stand in for `malloc`, `free`, `calloc`
//! and `realloc`.
//!
//! ## Overview
//!
//! The heap is one contiguous region. Every block starts with a one-quantum
//! header pointing at the next block, so the headers themselves form the
//! block list:
//!
//! ```text
//!   start                                                          end
//!     │                                                              │
//!     ▼                                                              ▼
//!   ┌────┬──────────┬────┬──────┬────┬─────────────────┬────┬────────┐
//!   │ H0 │ payload  │ H1 │ pay. │ H2 │    payload      │ T  │ unused │
//!   └─┬──┴──────────┴─┬──┴──────┴─┬──┴─────────────────┴────┴────────┘
//!     │    ▲          │  ▲        │                     ▲
//!     └────┼──────────┘  └────────┼─────────────────────┘
//!          │                      │
//!     returned handle        next pointers
//!
//!   H = header { next, status }     T = tail marker { null, free }
//! ```
//!
//! Allocation walks the chain from `start` and takes the first free block
//! that is large enough, whole. If none fits, the block goes to the tail,
//! growing the heap first when the slack before `end` is too small. If some
//! other code moved the break in the meantime, the foreign bytes end up inside
//! a fence block that is never handed out.
//!
//! ## Crate Structure
//!
//! ```text
//!   brkalloc
//!   ├── align      - QUANTUM, align! and the padded block size
//!   ├── header     - In-band block header (internal)
//!   ├── grower     - Grower trait, sbrk and arena growers
//!   ├── heap       - Heap manager: start/end and growth
//!   ├── first_fit  - FirstFit block allocator
//!   ├── locked     - LockedHeap, a spin-locked GlobalAlloc
//!   └── ffi        - C ABI malloc family (feature "ffi")
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use brkalloc::{ArenaGrower, FirstFit};
//!
//! let mut allocator = FirstFit::new(ArenaGrower::new(1 << 16));
//!
//! let ptr = allocator.allocate(10).unwrap();
//! assert!(unsafe { allocator.usable_size(ptr.as_ptr()) }.unwrap() >= 10);
//!
//! unsafe { allocator.release(ptr.as_ptr()) }.unwrap();
//! assert_eq!(allocator.allocate(10).unwrap(), ptr);
//! ```
//!
//! ## Limitations
//!
//! - **No coalescing or splitting**: free blocks are reused whole
//! - **No trimming**: the heap never shrinks
//! - **Quantum alignment only**: payloads are 16-byte aligned
//! - **Single-threaded core**: [`FirstFit`] has no locking, use
//!   [`LockedHeap`] to share a heap between threads
//!
//! ## Safety
//!
//! Handles are checked against the heap bounds, but a forged address inside
//! the heap is not detected. Release, resize and size queries are `unsafe`.

#![forbid(unsafe_op_in_unsafe_fn)]

use std::sync::atomic::{AtomicBool, Ordering};

#[macro_use]
mod logging;

pub mod align;
mod error;
#[cfg(feature = "ffi")]
pub mod ffi;
mod first_fit;
pub mod grower;
mod header;
pub mod heap;
mod locked;

pub use error::AllocError;
pub use first_fit::{BlockInfo, Blocks, FirstFit};
pub use grower::{ArenaGrower, BrkGrower, Grower};
pub use header::Status;
pub use heap::{Heap, HeapConfig};
pub use locked::LockedHeap;

static ALLOC_LOG: AtomicBool = AtomicBool::new(false);

/// Enables logging for the allocator.
pub fn enable_logging() {
  ALLOC_LOG.store(true, Ordering::Relaxed);
}

/// Disables logging for the allocator.
pub fn disable_logging() {
  ALLOC_LOG.store(false, Ordering::Relaxed);
}

pub(crate) fn should_log() -> bool {
  ALLOC_LOG.load(Ordering::Relaxed)
}

#[cfg(test)]
pub(crate) mod test_common {
  use std::ptr::NonNull;

  use crate::grower::{ArenaGrower, Grower};

  /// Routes allocator logs to the test output.
  pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();

    // With `ffi` the logger's own allocations would come back through us.
    if cfg!(not(feature = "ffi")) {
      crate::enable_logging();
    }
  }

  /// An arena whose break is pushed forward by `jump` bytes right before the
  /// growth call numbered `on_call`, the way a second `sbrk` user would.
  pub struct Interloper {
    pub arena: ArenaGrower,
    jump: usize,
    on_call: usize,
    calls: usize,
  }

  impl Interloper {
    pub fn new(
      capacity: usize,
      jump: usize,
      on_call: usize,
    ) -> Self {
      Self {
        arena: ArenaGrower::new(capacity),
        jump,
        on_call,
        calls: 0,
      }
    }
  }

  unsafe impl Grower for Interloper {
    fn grow(
      &mut self,
      increment: usize,
    ) -> Option<NonNull<u8>> {
      if self.calls == self.on_call {
        self.arena.grow(self.jump)?;
      }
      self.calls += 1;

      self.arena.grow(increment)
    }
  }
}
