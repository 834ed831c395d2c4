//! Primitives that grow the managed region.
//!
//! An extender knows nothing about blocks. It moves a single boundary forward
//! and reports where the new span starts.

use std::{
  alloc::{self, Layout},
  ptr::{self, NonNull},
};

use libc::{c_void, intptr_t, sbrk};
use log::{debug, trace};

use crate::align::{WORD, align_up};

/// Grows a contiguous region by a requested number of bytes.
///
/// # Safety
///
/// On success `extend` must return the start of `byte_count` writable bytes,
/// aligned to [`WORD`], that nothing else will touch for as long as the
/// extender lives. On failure the boundary must be left where it was.
///
/// Successive spans are expected to follow each other, but only a single
/// caller at a time can rely on that.
pub unsafe trait RegionExtender {
  fn extend(
    &mut self,
    byte_count: usize,
  ) -> Option<NonNull<u8>>;
}

unsafe impl<E: RegionExtender + ?Sized> RegionExtender for &mut E {
  fn extend(
    &mut self,
    byte_count: usize,
  ) -> Option<NonNull<u8>> {
    <E as RegionExtender>::extend(&mut **self, byte_count)
  }
}

/// Extends the program break with `sbrk(2)`.
///
/// ```text
///   before:  ... data │ heap ........ │ ← break
///   after:   ... data │ heap ........ │ new span │ ← break
///                                     ▲
///                                     └── returned address
/// ```
///
/// Nothing guards the break against other users in the process, including
/// the system allocator. Two `Sbrk` values share the same break. Each call
/// pads the break back to a word boundary when someone else left it
/// unaligned, so spans stay aligned but are only contiguous while `Sbrk` is
/// the break's sole user.
#[derive(Debug)]
pub struct Sbrk {
  end: *mut u8,
}

impl Default for Sbrk {
  fn default() -> Self {
    Self::new()
  }
}

impl Sbrk {
  pub const fn new() -> Self {
    Self {
      end: ptr::null_mut(),
    }
  }

  /// Current program break, as reported by `sbrk(0)`.
  pub fn program_break() -> *mut u8 {
    unsafe { sbrk(0) }.cast::<u8>()
  }

  /// Pads the break up to a word boundary so that headers can be written in
  /// place.
  fn align_break(&mut self) -> Option<()> {
    let current = Self::program_break();
    if is_failure(current.cast::<c_void>()) {
      return None;
    }

    if !self.end.is_null() && current != self.end {
      debug!("program break moved from {:?} to {current:?} by another user", self.end);
    }

    let pad = align_up(current.addr())? - current.addr();
    if pad != 0 {
      trace!("padding program break {current:?} by {pad} bytes");
      let previous = unsafe { sbrk(pad as intptr_t) };
      if is_failure(previous) {
        return None;
      }
    }

    Some(())
  }
}

unsafe impl RegionExtender for Sbrk {
  fn extend(
    &mut self,
    byte_count: usize,
  ) -> Option<NonNull<u8>> {
    let increment = intptr_t::try_from(byte_count).ok()?;

    self.align_break()?;

    let address = unsafe { sbrk(increment) };
    if is_failure(address) {
      debug!("sbrk refused {byte_count} bytes");
      return None;
    }

    let start = address.cast::<u8>();
    if start.addr() % WORD != 0 {
      // The break moved between the alignment check and the increment.
      debug!("sbrk({byte_count}) returned unaligned {start:?}, giving it back");
      unsafe { sbrk(-increment) };
      return None;
    }

    self.end = start.wrapping_add(byte_count);
    trace!(
      "sbrk({byte_count}) = {start:?}, program break = {:?}",
      Self::program_break()
    );
    NonNull::new(start)
  }
}

fn is_failure(address: *mut c_void) -> bool {
  address == usize::MAX as *mut c_void
}

/// Fixed-capacity region carved out of one owned buffer.
///
/// Grows exactly like the program break but stops at `capacity`, which makes
/// exhaustion reproducible. Every heap built on its own arena is independent
/// of the others.
#[derive(Debug)]
pub struct Arena {
  base: NonNull<u8>,
  capacity: usize,
  used: usize,
}

impl Arena {
  /// Reserves `capacity` bytes, rounded up to a whole number of words.
  ///
  /// # Panics
  ///
  /// Panics if the rounded capacity exceeds `isize::MAX`, or if the buffer
  /// cannot be obtained from the system allocator.
  pub fn with_capacity(capacity: usize) -> Self {
    let capacity = match align_up(capacity) {
      Some(rounded) if rounded <= isize::MAX as usize => rounded,
      _ => panic!("arena capacity of {capacity} bytes is not representable"),
    };

    let base = match Self::layout(capacity) {
      Some(layout) => {
        let raw = unsafe { alloc::alloc(layout) };
        match NonNull::new(raw) {
          Some(base) => base,
          None => alloc::handle_alloc_error(layout),
        }
      }
      None => NonNull::<usize>::dangling().cast::<u8>(),
    };

    Self {
      base,
      capacity,
      used: 0,
    }
  }

  pub fn capacity(&self) -> usize {
    self.capacity
  }

  /// Bytes handed out so far.
  pub fn used(&self) -> usize {
    self.used
  }

  fn layout(capacity: usize) -> Option<Layout> {
    if capacity == 0 {
      return None;
    }
    Layout::from_size_align(capacity, WORD).ok()
  }
}

unsafe impl RegionExtender for Arena {
  fn extend(
    &mut self,
    byte_count: usize,
  ) -> Option<NonNull<u8>> {
    let remaining = self.capacity - self.used;
    if byte_count > remaining {
      debug!("arena exhausted: {byte_count} requested, {remaining} left");
      return None;
    }

    let start = unsafe { self.base.add(self.used) };
    self.used += byte_count;
    Some(start)
  }
}

impl Drop for Arena {
  fn drop(&mut self) {
    if let Some(layout) = Self::layout(self.capacity) {
      unsafe { alloc::dealloc(self.base.as_ptr(), layout) };
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_arena_spans_are_contiguous() {
    let mut arena = Arena::with_capacity(64);

    let first = arena.extend(16).unwrap();
    let second = arena.extend(24).unwrap();

    assert_eq!(first.as_ptr().addr() % WORD, 0);
    assert_eq!(unsafe { first.add(16) }, second);
    assert_eq!(arena.used(), 40);
  }

  #[test]
  fn test_arena_refuses_past_capacity() {
    let mut arena = Arena::with_capacity(32);

    assert!(arena.extend(24).is_some());
    assert!(arena.extend(16).is_none());
    // A failed request leaves the boundary alone.
    assert_eq!(arena.used(), 24);
    assert!(arena.extend(8).is_some());
    assert!(arena.extend(1).is_none());
  }

  #[test]
  fn test_arena_capacity_rounds_to_words() {
    let arena = Arena::with_capacity(WORD + 1);
    assert_eq!(arena.capacity(), WORD * 2);

    let mut empty = Arena::with_capacity(0);
    assert!(empty.extend(WORD).is_none());
  }

  #[test]
  fn test_sbrk_advances_break() {
    let mut extender = Sbrk::new();

    let span = extender.extend(WORD * 4).unwrap();
    assert_eq!(span.as_ptr().addr() % WORD, 0);

    unsafe {
      span.cast::<usize>().write(0xDEAD_BEEF);
      assert_eq!(span.cast::<usize>().read(), 0xDEAD_BEEF);
    }
  }

  #[test]
  fn test_sbrk_realigns_after_foreign_growth() {
    let mut extender = Sbrk::new();

    let first = extender.extend(16).unwrap();
    let foreign = unsafe { sbrk(3) };
    assert!(!is_failure(foreign));

    let second = extender.extend(16).unwrap();
    assert_eq!(second.as_ptr().addr() % WORD, 0);
    assert!(second.as_ptr().addr() >= first.as_ptr().addr() + 16 + 3);

    unsafe {
      second.cast::<usize>().write(0xC0FFEE);
      assert_eq!(second.cast::<usize>().read(), 0xC0FFEE);
    }
  }

  #[test]
  fn test_sbrk_rejects_unrepresentable_increment() {
    let mut extender = Sbrk::new();
    assert!(extender.extend(usize::MAX).is_none());
  }
}
