use std::{mem, ptr};

use crate::align::QUANTUM;

/// Whether a block is handed out.
#[repr(usize)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
  Free = 0,
  Occupied = 1,
  /// Covers memory between two growths that belongs to someone else. Never
  /// handed out or released.
  Fence = 2,
}

/// Metadata stored in the quantum right before every payload.
///
/// `next` points at the header of the following block. A null `next` marks
/// the tail: the bytes from this header up to the heap end are unused. Every
/// chain ends in exactly one tail marker.
#[repr(C, align(16))]
pub(crate) struct Header {
  pub next: *mut Header,
  pub status: Status,
}

const _: () = assert!(mem::size_of::<Header>() == QUANTUM);

impl Header {
  pub fn new(
    next: *mut Header,
    status: Status,
  ) -> Self {
    Self { next, status }
  }

  /// Writes a header at `at`.
  ///
  /// # Safety
  ///
  /// `at` must be quantum-aligned and valid for a write of one quantum.
  pub unsafe fn write(
    at: *mut Header,
    next: *mut Header,
    status: Status,
  ) {
    unsafe { ptr::write(at, Header::new(next, status)) }
  }

  /// Writes a tail marker at `at`.
  ///
  /// # Safety
  ///
  /// Same as [`Header::write`].
  pub unsafe fn write_tail(at: *mut Header) {
    unsafe { Header::write(at, ptr::null_mut(), Status::Free) }
  }

  /// Bytes from `header` to its successor, header included.
  ///
  /// # Safety
  ///
  /// `header` must point at a placed (non-tail) header.
  pub unsafe fn span(header: *const Header) -> usize {
    unsafe { (*header).next.addr() - header.addr() }
  }

  pub fn payload(header: *mut Header) -> *mut u8 {
    header.cast::<u8>().wrapping_add(QUANTUM)
  }

  pub fn from_payload(payload: *mut u8) -> *mut Header {
    payload.wrapping_sub(QUANTUM).cast()
  }
}
