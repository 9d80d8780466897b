use std::{cmp, ptr};

use crate::{AllocError, align, align::QUANTUM, grower::Grower};

/// Default growth step: one page plus a header.
pub const DEFAULT_EXTENSION: usize = 4096 + QUANTUM;

/// Tunables of the heap manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapConfig {
  /// Minimum number of bytes requested from the grower at a time.
  pub extension: usize,
}

impl HeapConfig {
  pub const DEFAULT: Self = Self {
    extension: DEFAULT_EXTENSION,
  };

  /// Rounds `bytes` up to a non-zero multiple of the quantum.
  pub const fn with_extension(bytes: usize) -> Self {
    let extension = if bytes == 0 {
      QUANTUM
    } else if bytes > usize::MAX - QUANTUM {
      usize::MAX & !(QUANTUM - 1)
    } else {
      align!(bytes)
    };

    Self { extension }
  }
}

impl Default for HeapConfig {
  fn default() -> Self {
    Self::DEFAULT
  }
}

/// Where a growth put the new bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Grant {
  /// First new byte, quantum-aligned.
  pub at: *mut u8,
  /// Foreign memory sits between the previous end and `at`.
  pub skipped: bool,
}

/// Owner of the managed region `[start, end)`.
///
/// `start` is fixed by the first growth and quantum-aligned; `end` only moves
/// up and stays quantum-aligned.
#[derive(Debug)]
pub struct Heap<G> {
  grower: G,
  config: HeapConfig,
  start: *mut u8,
  end: *mut u8,
}

// The region is only reachable through the heap that owns it.
unsafe impl<G: Send> Send for Heap<G> {}

impl<G: Grower> Heap<G> {
  pub const fn new(grower: G) -> Self {
    Self::with_config(grower, HeapConfig::DEFAULT)
  }

  pub const fn with_config(
    grower: G,
    config: HeapConfig,
  ) -> Self {
    Self {
      grower,
      config,
      start: ptr::null_mut(),
      end: ptr::null_mut(),
    }
  }

  pub fn is_initialized(&self) -> bool {
    !self.start.is_null()
  }

  /// First byte of the region, null before the first growth.
  pub fn start(&self) -> *mut u8 {
    self.start
  }

  /// One past the last byte of the region, null before the first growth.
  pub fn end(&self) -> *mut u8 {
    self.end
  }

  pub fn config(&self) -> &HeapConfig {
    &self.config
  }

  pub fn grower(&self) -> &G {
    &self.grower
  }

  /// Bytes currently managed.
  pub fn len(&self) -> usize {
    self.end.addr() - self.start.addr()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Grows the region by at least `min_bytes` (and at least one extension
  /// step). The new bytes are `[grant.at, end)`.
  ///
  /// If something else moved the break up since the last growth, the foreign
  /// bytes between the old `end` and `grant.at` are skipped and
  /// `grant.skipped` is set; the caller has to fence them off.
  ///
  /// `min_bytes` must be a multiple of the quantum.
  pub fn ensure_capacity(
    &mut self,
    min_bytes: usize,
  ) -> Result<Grant, AllocError> {
    debug_assert_eq!(min_bytes % QUANTUM, 0);

    let increment = cmp::max(min_bytes, self.config.extension);
    let out_of_memory = AllocError::OutOfMemory {
      requested: min_bytes,
    };

    let base = self.grower.grow(increment).ok_or(out_of_memory)?.as_ptr();

    if self.is_initialized() && base < self.end {
      awarn!("break {base:p} is below the heap end {:p}", self.end);
      return Err(AllocError::Discontiguous {
        expected: self.end.addr(),
        found: base.addr(),
      });
    }

    let pad = base.align_offset(QUANTUM);
    if pad != 0 {
      let expected = base.wrapping_add(increment);
      let more = self.grower.grow(pad).ok_or(out_of_memory)?.as_ptr();

      if more != expected {
        awarn!("break moved from {expected:p} to {more:p} while aligning");
        return Err(AllocError::Discontiguous {
          expected: expected.addr(),
          found: more.addr(),
        });
      }
    }

    let at = unsafe { base.add(pad) };
    let skipped = self.is_initialized() && at != self.end;

    if skipped {
      awarn!(
        "skipping {} foreign bytes between {:p} and {at:p}",
        at.addr() - self.end.addr(),
        self.end
      );
    }

    if !self.is_initialized() {
      self.start = at;
    }
    self.end = unsafe { at.add(increment) };

    adebug!("heap grown by {increment} bytes at {at:p}: end = {:p}", self.end);

    Ok(Grant { at, skipped })
  }
}

#[cfg(test)]
mod tests {
  use std::ptr::NonNull;

  use super::*;
  use crate::{
    grower::ArenaGrower,
    test_common::{Interloper, init_logging},
  };

  #[test]
  fn test_first_growth_sets_bounds() {
    init_logging();
    let mut heap = Heap::new(ArenaGrower::new(1 << 16));

    assert!(!heap.is_initialized());

    let grant = heap.ensure_capacity(32).unwrap();

    assert!(heap.is_initialized());
    assert!(!grant.skipped);
    assert_eq!(grant.at, heap.start());
    assert_eq!(grant.at.addr() % QUANTUM, 0);
    assert_eq!(heap.len(), DEFAULT_EXTENSION);
  }

  #[test]
  fn test_large_growth_uses_requested_size() {
    let mut heap = Heap::new(ArenaGrower::new(1 << 16));

    heap.ensure_capacity(32).unwrap();
    let old_end = heap.end();

    let grant = heap.ensure_capacity(8192).unwrap();

    assert_eq!(grant.at, old_end);
    assert!(!grant.skipped);
    assert_eq!(heap.len(), DEFAULT_EXTENSION + 8192);
  }

  #[test]
  fn test_custom_extension() {
    let config = HeapConfig::with_extension(100);
    assert_eq!(config.extension, 112);

    let mut heap = Heap::with_config(ArenaGrower::new(1024), config);
    heap.ensure_capacity(16).unwrap();

    assert_eq!(heap.len(), 112);
    assert_eq!(heap.config(), &config);
    assert_eq!(heap.grower().used(), 112);
    assert_eq!(HeapConfig::with_extension(0).extension, QUANTUM);
  }

  #[test]
  fn test_refused_growth_changes_nothing() {
    let mut heap = Heap::new(ArenaGrower::new(DEFAULT_EXTENSION));

    assert_eq!(
      heap.ensure_capacity(DEFAULT_EXTENSION + QUANTUM),
      Err(AllocError::OutOfMemory {
        requested: DEFAULT_EXTENSION + QUANTUM
      })
    );
    assert!(!heap.is_initialized());

    heap.ensure_capacity(QUANTUM).unwrap();
    let end = heap.end();

    assert!(heap.ensure_capacity(QUANTUM).is_err());
    assert_eq!(heap.end(), end);
  }

  #[test]
  fn test_foreign_break_move_is_skipped() {
    init_logging();
    let mut heap = Heap::new(Interloper::new(1 << 16, QUANTUM, 1));

    heap.ensure_capacity(QUANTUM).unwrap();
    let old_end = heap.end();

    let grant = heap.ensure_capacity(QUANTUM).unwrap();

    assert!(grant.skipped);
    assert_eq!(grant.at, old_end.wrapping_add(QUANTUM));
    assert_eq!(heap.end(), grant.at.wrapping_add(DEFAULT_EXTENSION));

    let next = heap.ensure_capacity(QUANTUM).unwrap();
    assert!(!next.skipped);
    assert_eq!(next.at, grant.at.wrapping_add(DEFAULT_EXTENSION));
  }

  #[test]
  fn test_unaligned_foreign_move_is_realigned() {
    let mut heap = Heap::new(Interloper::new(1 << 16, 8, 1));

    heap.ensure_capacity(QUANTUM).unwrap();
    let old_end = heap.end();

    let grant = heap.ensure_capacity(QUANTUM).unwrap();

    assert!(grant.skipped);
    assert_eq!(grant.at, old_end.wrapping_add(QUANTUM));
    assert_eq!(heap.end().addr() % QUANTUM, 0);
    assert_eq!(heap.end(), grant.at.wrapping_add(DEFAULT_EXTENSION));
    assert_eq!(heap.grower().arena.used(), 2 * DEFAULT_EXTENSION + 16);
  }

  /// Hands out the same base on every call.
  struct Rewind {
    arena: ArenaGrower,
    base: Option<NonNull<u8>>,
  }

  unsafe impl Grower for Rewind {
    fn grow(
      &mut self,
      increment: usize,
    ) -> Option<NonNull<u8>> {
      let at = self.arena.grow(increment)?;
      Some(*self.base.get_or_insert(at))
    }
  }

  #[test]
  fn test_break_below_end_is_refused() {
    let mut heap = Heap::new(Rewind {
      arena: ArenaGrower::new(1 << 16),
      base: None,
    });

    heap.ensure_capacity(QUANTUM).unwrap();
    let end = heap.end();

    assert!(matches!(
      heap.ensure_capacity(QUANTUM),
      Err(AllocError::Discontiguous { .. })
    ));
    assert_eq!(heap.end(), end);
  }
}
