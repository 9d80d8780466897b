/// Header size and payload rounding unit. Every block starts on a multiple of
/// this and every payload capacity is a multiple of it.
pub const QUANTUM: usize = 16;

/// Rounds the given size up to the next multiple of [`QUANTUM`].
///
/// Wraps on overflow, use [`padded_size`] for untrusted sizes.
///
/// # Examples
///
/// ```rust
/// use brkalloc::align;
///
/// assert_eq!(align!(0), 0);
/// assert_eq!(align!(13), 16);
/// assert_eq!(align!(16), 16);
/// assert_eq!(align!(17), 32);
/// ```
#[macro_export]
macro_rules! align {
  ($value:expr) => {
    ($value + $crate::align::QUANTUM - 1) & !($crate::align::QUANTUM - 1)
  };
}

/// Total block span needed for a payload of `size` bytes: the payload rounded
/// up to the quantum plus one header. `None` if that overflows.
pub const fn padded_size(size: usize) -> Option<usize> {
  match size.checked_add(QUANTUM - 1) {
    Some(bumped) => (bumped & !(QUANTUM - 1)).checked_add(QUANTUM),
    None => None,
  }
}
