use std::{
  alloc::{GlobalAlloc, Layout},
  ptr,
};

use spin::{Mutex, MutexGuard};

use crate::{align::QUANTUM, first_fit::FirstFit, grower::Grower};

/// A [`FirstFit`] behind a spin lock, usable from several threads and as a
/// `#[global_allocator]`.
///
/// The lock is held for the whole of each call.
#[derive(Debug)]
pub struct LockedHeap<G> {
  inner: Mutex<FirstFit<G>>,
}

impl<G: Grower> LockedHeap<G> {
  pub const fn new(grower: G) -> Self {
    Self {
      inner: Mutex::new(FirstFit::new(grower)),
    }
  }

  pub const fn from_allocator(allocator: FirstFit<G>) -> Self {
    Self {
      inner: Mutex::new(allocator),
    }
  }

  pub fn lock(&self) -> MutexGuard<'_, FirstFit<G>> {
    self.inner.lock()
  }
}

/// Requests aligned beyond the quantum get a null pointer.
unsafe impl<G: Grower + Send> GlobalAlloc for LockedHeap<G> {
  unsafe fn alloc(
    &self,
    layout: Layout,
  ) -> *mut u8 {
    if layout.align() > QUANTUM {
      return ptr::null_mut();
    }

    self
      .lock()
      .allocate(layout.size())
      .map_or(ptr::null_mut(), |payload| payload.as_ptr())
  }

  unsafe fn alloc_zeroed(
    &self,
    layout: Layout,
  ) -> *mut u8 {
    if layout.align() > QUANTUM {
      return ptr::null_mut();
    }

    self
      .lock()
      .zero_allocate(1, layout.size())
      .map_or(ptr::null_mut(), |payload| payload.as_ptr())
  }

  unsafe fn dealloc(
    &self,
    ptr: *mut u8,
    _layout: Layout,
  ) {
    if let Err(error) = unsafe { self.lock().release(ptr) } {
      awarn!("dealloc: {error}");
    }
  }

  unsafe fn realloc(
    &self,
    ptr: *mut u8,
    layout: Layout,
    new_size: usize,
  ) -> *mut u8 {
    if layout.align() > QUANTUM {
      return ptr::null_mut();
    }

    match unsafe { self.lock().resize(ptr, new_size) } {
      Ok(Some(payload)) => payload.as_ptr(),
      _ => ptr::null_mut(),
    }
  }
}

#[cfg(test)]
mod tests {
  use std::{sync::Arc, thread};

  use super::*;
  use crate::{HeapConfig, grower::ArenaGrower, test_common::init_logging};

  #[test]
  fn test_global_alloc_round_trip() {
    init_logging();
    let heap = LockedHeap::new(ArenaGrower::new(1 << 16));

    unsafe {
      let layout = Layout::new::<[u64; 4]>();
      let ptr = heap.alloc(layout) as *mut [u64; 4];
      assert!(!ptr.is_null());

      ptr.write([1, 2, 3, 4]);

      let grown = heap.realloc(ptr.cast(), layout, 256) as *mut [u64; 4];
      assert!(!grown.is_null());
      assert_eq!(grown.read(), [1, 2, 3, 4]);

      heap.dealloc(grown.cast(), Layout::from_size_align(256, 8).unwrap());
      assert!(!heap.lock().owns(grown.cast::<u8>()));
    }
  }

  #[test]
  fn test_global_alloc_zeroed() {
    let heap = LockedHeap::new(ArenaGrower::with_fill(1 << 13, 0xEE));

    unsafe {
      let layout = Layout::from_size_align(50, 2).unwrap();
      let ptr = heap.alloc_zeroed(layout);

      assert!(!ptr.is_null());
      assert!(std::slice::from_raw_parts(ptr, 50).iter().all(|&b| b == 0));
    }
  }

  #[test]
  fn test_over_aligned_requests_are_refused() {
    let allocator = FirstFit::with_config(
      ArenaGrower::new(1 << 12),
      HeapConfig::with_extension(256),
    );
    let heap = LockedHeap::from_allocator(allocator);

    unsafe {
      assert!(heap.alloc(Layout::from_size_align(8, 64).unwrap()).is_null());
      assert!(!heap.alloc(Layout::from_size_align(8, QUANTUM).unwrap()).is_null());
    }
    assert_eq!(heap.lock().heap().len(), 256);
  }

  #[test]
  fn test_threads_share_one_heap() {
    init_logging();
    let heap = Arc::new(LockedHeap::new(ArenaGrower::new(1 << 22)));

    let workers: Vec<_> = (0..4u8)
      .map(|id| {
        let heap = Arc::clone(&heap);
        thread::spawn(move || {
          for round in 0..200usize {
            let size = 1 + (round * 13 + usize::from(id) * 7) % 500;
            let payload = heap.lock().allocate(size).unwrap();

            unsafe {
              payload.as_ptr().write_bytes(id, size);
              let bytes = std::slice::from_raw_parts(payload.as_ptr(), size);
              assert!(bytes.iter().all(|&b| b == id));

              heap.lock().release(payload.as_ptr()).unwrap();
            }
          }
        })
      })
      .collect();

    for worker in workers {
      worker.join().unwrap();
    }

    assert!(heap.lock().blocks().all(|block| block.status == crate::Status::Free));
  }
}
