//! Sources of fresh heap memory.
//!
//! A grower behaves like `sbrk(2)`: it owns a contiguous region that only ever
//! grows at its upper end, and every successful call returns the end of the
//! region as it was *before* the call.

use std::{alloc, ptr::NonNull};

use libc::{c_void, intptr_t, sbrk};

use crate::align::QUANTUM;

/// Something that can extend a contiguous region of memory.
///
/// # Safety
///
/// A returned pointer must be valid for reads and writes of `increment`
/// bytes until the grower is dropped. Consecutive successful calls must hand
/// out adjacent ranges unless something outside the grower moved its end.
pub unsafe trait Grower {
  /// Extends the region by `increment` bytes and returns the previous end.
  /// An `increment` of zero only reports the current end. `None` means the
  /// request was refused and nothing changed.
  fn grow(
    &mut self,
    increment: usize,
  ) -> Option<NonNull<u8>>;
}

/// Grows the process data segment with `sbrk(2)`.
#[derive(Debug, Default, Clone, Copy)]
pub struct BrkGrower;

impl BrkGrower {
  pub const fn new() -> Self {
    Self
  }
}

unsafe impl Grower for BrkGrower {
  fn grow(
    &mut self,
    increment: usize,
  ) -> Option<NonNull<u8>> {
    let increment = intptr_t::try_from(increment).ok()?;

    let previous = unsafe { sbrk(increment) };

    if previous == usize::MAX as *mut c_void {
      return None;
    }

    NonNull::new(previous.cast())
  }
}

/// Current program break, as reported by `sbrk(0)`.
pub fn program_break() -> *mut u8 {
  unsafe { sbrk(0) }.cast()
}

/// Hands out a fixed buffer front to back.
///
/// Used to give a [`FirstFit`](crate::FirstFit) a private heap that never
/// touches the program break.
#[derive(Debug)]
pub struct ArenaGrower {
  base: NonNull<u8>,
  layout: alloc::Layout,
  used: usize,
}

// The buffer is owned exclusively by the grower.
unsafe impl Send for ArenaGrower {}

impl ArenaGrower {
  /// Creates an arena of `capacity` zeroed bytes.
  ///
  /// # Panics
  ///
  /// Panics if `capacity` rounded up to the quantum exceeds `isize::MAX`.
  pub fn new(capacity: usize) -> Self {
    Self::with_fill(capacity, 0)
  }

  /// Creates an arena whose bytes all start out as `fill`.
  ///
  /// # Panics
  ///
  /// Same as [`ArenaGrower::new`].
  pub fn with_fill(
    capacity: usize,
    fill: u8,
  ) -> Self {
    let layout = alloc::Layout::from_size_align(capacity.max(1), QUANTUM)
      .expect("arena capacity overflows isize");

    let raw = unsafe { alloc::alloc(layout) };
    let Some(base) = NonNull::new(raw) else {
      alloc::handle_alloc_error(layout);
    };

    unsafe { base.as_ptr().write_bytes(fill, layout.size()) };

    Self {
      base,
      layout,
      used: 0,
    }
  }

  pub fn capacity(&self) -> usize {
    self.layout.size()
  }

  /// Bytes handed out so far.
  pub fn used(&self) -> usize {
    self.used
  }
}

unsafe impl Grower for ArenaGrower {
  fn grow(
    &mut self,
    increment: usize,
  ) -> Option<NonNull<u8>> {
    let used = self.used.checked_add(increment)?;

    if used > self.capacity() {
      return None;
    }

    let previous = unsafe { self.base.add(self.used) };
    self.used = used;

    Some(previous)
  }
}

impl Drop for ArenaGrower {
  fn drop(&mut self) {
    unsafe { alloc::dealloc(self.base.as_ptr(), self.layout) }
  }
}
