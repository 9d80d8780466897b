use thiserror::Error;

/// Everything that can go wrong inside the allocator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AllocError {
  /// The grower refused to extend the heap, or the request cannot be
  /// represented once padded.
  #[error("cannot extend the heap to fit a {requested} byte request")]
  OutOfMemory { requested: usize },
  /// `count * size` does not fit in a `usize`.
  #[error("{count} elements of {size} bytes overflow usize")]
  SizeOverflow { count: usize, size: usize },
  /// The address was never handed out by this allocator.
  #[error("{address:#x} is not a handle owned by this heap")]
  InvalidHandle { address: usize },
  /// The break moved below the heap end, or away while being aligned.
  #[error("expected the break at {expected:#x} but found it at {found:#x}")]
  Discontiguous { expected: usize, found: usize },
}
