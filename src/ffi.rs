//! C ABI replacements for the libc allocation functions.
//!
//! Built with `--features ffi`, the `cdylib` output can be preloaded in front
//! of the C library so every `malloc` in the process is served from the
//! program break by this crate. Logging must stay disabled in that setup.

use std::ptr;

use libc::{c_void, size_t};

use crate::{grower::BrkGrower, locked::LockedHeap};

static HEAP: LockedHeap<BrkGrower> = LockedHeap::new(BrkGrower::new());

#[cfg(target_os = "linux")]
fn set_enomem() {
  unsafe { *libc::__errno_location() = libc::ENOMEM }
}

#[cfg(not(target_os = "linux"))]
fn set_enomem() {}

fn out_of_memory() -> *mut c_void {
  set_enomem();
  ptr::null_mut()
}

#[unsafe(no_mangle)]
pub extern "C" fn malloc(size: size_t) -> *mut c_void {
  match HEAP.lock().allocate(size) {
    Ok(payload) => payload.as_ptr().cast(),
    Err(_) => out_of_memory(),
  }
}

/// # Safety
///
/// `address` must be null or a live pointer from this allocator.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn free(address: *mut c_void) {
  let _ = unsafe { HEAP.lock().release(address.cast()) };
}

#[unsafe(no_mangle)]
pub extern "C" fn calloc(
  count: size_t,
  size: size_t,
) -> *mut c_void {
  match HEAP.lock().zero_allocate(count, size) {
    Ok(payload) => payload.as_ptr().cast(),
    Err(_) => out_of_memory(),
  }
}

/// # Safety
///
/// `address` must be null or a live pointer from this allocator.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn realloc(
  address: *mut c_void,
  size: size_t,
) -> *mut c_void {
  match unsafe { HEAP.lock().resize(address.cast(), size) } {
    Ok(Some(payload)) => payload.as_ptr().cast(),
    Ok(None) => ptr::null_mut(),
    Err(_) => out_of_memory(),
  }
}

/// # Safety
///
/// `address` must be null or a live pointer from this allocator.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn malloc_usable_size(address: *mut c_void) -> size_t {
  if address.is_null() {
    return 0;
  }

  unsafe { HEAP.lock().usable_size(address.cast()) }.unwrap_or(0)
}
