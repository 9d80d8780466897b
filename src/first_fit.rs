use std::{marker::PhantomData, ptr, ptr::NonNull};

use crate::{
  AllocError,
  align::{self, QUANTUM},
  grower::Grower,
  header::{Header, Status},
  heap::{Heap, HeapConfig},
};

/// A block as seen by [`FirstFit::blocks`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
  pub payload: NonNull<u8>,
  pub capacity: usize,
  pub status: Status,
}

/// Where a request can be served.
enum Fit {
  /// A free block at least as large as the request.
  Reuse(*mut Header),
  /// Nothing fits; this is the tail marker.
  Tail(*mut Header),
}

/// First-fit allocator over a single growing heap.
///
/// The block headers embedded in the heap are the only bookkeeping. Free
/// blocks are reused whole and never split or merged. Once the heap exists
/// the chain always ends in a tail marker, so there is room for one more
/// header below `end`.
#[derive(Debug)]
pub struct FirstFit<G> {
  heap: Heap<G>,
}

impl<G: Grower> FirstFit<G> {
  pub const fn new(grower: G) -> Self {
    Self::with_config(grower, HeapConfig::DEFAULT)
  }

  pub const fn with_config(
    grower: G,
    config: HeapConfig,
  ) -> Self {
    Self {
      heap: Heap::with_config(grower, config),
    }
  }

  pub fn heap(&self) -> &Heap<G> {
    &self.heap
  }

  /// Walks the chain from `start` looking for the first free block spanning
  /// at least `padded` bytes.
  fn first_fit(
    &self,
    padded: usize,
  ) -> Fit {
    let mut current: *mut Header = self.heap.start().cast();

    unsafe {
      while !(*current).next.is_null() {
        if (*current).status == Status::Free && Header::span(current) >= padded {
          return Fit::Reuse(current);
        }
        current = (*current).next;
      }
    }

    Fit::Tail(current)
  }

  /// Occupies a new block of `padded` bytes at `at` and writes the tail
  /// marker right after it.
  ///
  /// # Safety
  ///
  /// `[at, at + padded + QUANTUM)` must lie inside the heap.
  unsafe fn place(
    &mut self,
    at: *mut Header,
    padded: usize,
  ) -> NonNull<u8> {
    let next: *mut Header = at.cast::<u8>().wrapping_add(padded).cast();

    unsafe {
      Header::write(at, next, Status::Occupied);
      Header::write_tail(next);

      NonNull::new_unchecked(Header::payload(at))
    }
  }

  /// Allocates at least `size` bytes, aligned to the quantum.
  pub fn allocate(
    &mut self,
    size: usize,
  ) -> Result<NonNull<u8>, AllocError> {
    let out_of_memory = AllocError::OutOfMemory { requested: size };
    let padded = align::padded_size(size).ok_or(out_of_memory)?;
    // The block plus the tail marker behind it.
    let needed = padded.checked_add(QUANTUM).ok_or(out_of_memory)?;

    if !self.heap.is_initialized() {
      let grant = self.heap.ensure_capacity(needed)?;
      let payload = unsafe { self.place(grant.at.cast(), padded) };

      atrace!("allocate({size}) = {payload:p} (first block)");
      return Ok(payload);
    }

    let tail = match self.first_fit(padded) {
      Fit::Reuse(header) => {
        let payload = unsafe {
          (*header).status = Status::Occupied;
          NonNull::new_unchecked(Header::payload(header))
        };

        atrace!("allocate({size}) = {payload:p} (reused)");
        return Ok(payload);
      }
      Fit::Tail(tail) => tail,
    };

    let slack = self.heap.end().addr() - tail.addr();
    let mut at = tail;

    if slack < needed {
      let grant = self.heap.ensure_capacity(needed)?;

      if grant.skipped {
        at = grant.at.cast();
        unsafe { Header::write(tail, at, Status::Fence) };
      }
    }

    let payload = unsafe { self.place(at, padded) };

    atrace!("allocate({size}) = {payload:p} (tail, {slack} bytes of slack)");
    Ok(payload)
  }

  /// Finds the header of `handle`, rejecting addresses whose header cannot
  /// lie inside this heap.
  fn header_of(
    &self,
    handle: *mut u8,
  ) -> Result<*mut Header, AllocError> {
    let address = handle.addr();
    let start = self.heap.start().addr();

    if !self.heap.is_initialized()
      || address < start + QUANTUM
      || address - QUANTUM >= self.heap.end().addr()
      || (address - start) % QUANTUM != 0
    {
      awarn!("rejected handle {handle:p}");
      return Err(AllocError::InvalidHandle { address });
    }

    let header = Header::from_payload(handle);

    // The tail marker is not a block.
    if unsafe { (*header).next.is_null() } {
      awarn!("rejected handle {handle:p} past the last block");
      return Err(AllocError::InvalidHandle { address });
    }

    Ok(header)
  }

  /// Capacity of the block whose payload is `payload`.
  ///
  /// # Safety
  ///
  /// `payload` must belong to a placed block.
  unsafe fn capacity_of(payload: *mut u8) -> usize {
    unsafe { (*Header::from_payload(payload)).next.addr() - payload.addr() }
  }

  /// Marks the block behind `handle` as free. A null handle is ignored.
  ///
  /// # Safety
  ///
  /// A non-null `handle` must have been returned by this allocator. Handles
  /// outside the heap are rejected, but a forged address inside it is not
  /// detected.
  pub unsafe fn release(
    &mut self,
    handle: *mut u8,
  ) -> Result<(), AllocError> {
    if handle.is_null() {
      return Ok(());
    }

    let header = self.header_of(handle)?;

    unsafe {
      if (*header).status == Status::Fence {
        awarn!("refusing to release the fence at {handle:p}");
        return Err(AllocError::InvalidHandle {
          address: handle.addr(),
        });
      }
      (*header).status = Status::Free;
    }

    atrace!("release({handle:p})");
    Ok(())
  }

  /// Payload capacity of the block behind `handle`.
  ///
  /// # Safety
  ///
  /// `handle` must be an occupied block of this allocator.
  pub unsafe fn usable_size(
    &self,
    handle: *mut u8,
  ) -> Result<usize, AllocError> {
    let header = self.header_of(handle)?;

    Ok(unsafe { Self::capacity_of(Header::payload(header)) })
  }

  /// Allocates `count * size` bytes and zeroes the whole usable capacity.
  pub fn zero_allocate(
    &mut self,
    count: usize,
    size: usize,
  ) -> Result<NonNull<u8>, AllocError> {
    let total = count
      .checked_mul(size)
      .ok_or(AllocError::SizeOverflow { count, size })?;

    let payload = self.allocate(total)?;

    unsafe {
      let capacity = Self::capacity_of(payload.as_ptr());
      payload.as_ptr().write_bytes(0, capacity);
    }

    Ok(payload)
  }

  /// Resizes the block behind `handle` to hold `new_size` bytes.
  ///
  /// A null handle allocates; a zero size releases and returns `None`. Blocks
  /// never shrink: if the current capacity suffices the handle comes back
  /// unchanged. Otherwise the content moves to a new block and the old one is
  /// released. If that allocation fails the old block is left untouched.
  ///
  /// # Safety
  ///
  /// Same as [`FirstFit::release`].
  pub unsafe fn resize(
    &mut self,
    handle: *mut u8,
    new_size: usize,
  ) -> Result<Option<NonNull<u8>>, AllocError> {
    if new_size == 0 {
      unsafe { self.release(handle)? };
      return Ok(None);
    }

    let Some(old) = NonNull::new(handle) else {
      return self.allocate(new_size).map(Some);
    };

    let capacity = unsafe { self.usable_size(handle)? };

    if capacity >= new_size {
      return Ok(Some(old));
    }

    let new = self.allocate(new_size)?;

    unsafe {
      ptr::copy_nonoverlapping(old.as_ptr(), new.as_ptr(), capacity);
      self.release(handle)?;
    }

    atrace!("resize({handle:p}, {new_size}) moved to {new:p}");
    Ok(Some(new))
  }

  /// Whether `handle` is the payload of an occupied block, checked by walking
  /// the whole chain.
  pub fn owns(
    &self,
    handle: *const u8,
  ) -> bool {
    self
      .blocks()
      .any(|block| block.status == Status::Occupied && ptr::eq(block.payload.as_ptr(), handle))
  }

  /// Every placed block in address order.
  pub fn blocks(&self) -> Blocks<'_> {
    Blocks {
      current: self.heap.start().cast(),
      _heap: PhantomData,
    }
  }
}

/// Iterator over the block chain, see [`FirstFit::blocks`].
#[derive(Debug)]
pub struct Blocks<'a> {
  current: *mut Header,
  _heap: PhantomData<&'a ()>,
}

impl Iterator for Blocks<'_> {
  type Item = BlockInfo;

  fn next(&mut self) -> Option<BlockInfo> {
    if self.current.is_null() {
      return None;
    }

    unsafe {
      let header = self.current;
      if (*header).next.is_null() {
        return None;
      }

      self.current = (*header).next;

      Some(BlockInfo {
        payload: NonNull::new_unchecked(Header::payload(header)),
        capacity: Header::span(header) - QUANTUM,
        status: (*header).status,
      })
    }
  }
}
