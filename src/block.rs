use std::{fmt, mem, ptr::NonNull};

/// Bytes occupied by a block header. The payload starts right after it.
pub const HEADER_SIZE: usize = mem::size_of::<Block>();

/// Records how a block reached its current state.
///
/// Only consulted by the consistency checks in `release` and `resize`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum BlockTag {
  /// Appended at the end of the region by the latest extension.
  Created = 0x1234_5678,
  /// A released block handed out again.
  Reused = 0x7777_7777,
  /// Released by its owner, available for reuse.
  Released = 0x5555_5555,
}

impl BlockTag {
  /// Decodes a raw header word. Anything else means the header is not ours.
  pub fn from_raw(raw: u32) -> Option<Self> {
    match raw {
      0x1234_5678 => Some(Self::Created),
      0x7777_7777 => Some(Self::Reused),
      0x5555_5555 => Some(Self::Released),
      _ => None,
    }
  }

  pub fn in_use(self) -> bool {
    matches!(self, Self::Created | Self::Reused)
  }
}

impl fmt::Display for BlockTag {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    let name = match self {
      Self::Created => "created",
      Self::Reused => "reused",
      Self::Released => "released",
    };
    f.write_str(name)
  }
}

/// Header written in front of every payload.
///
/// The tag is stored as a raw word so that a header reached through a bad
/// pointer can be inspected without materializing an invalid enum.
#[repr(C)]
pub(crate) struct Block {
  pub size: usize,
  pub next: *mut Block,
  pub free: bool,
  tag: u32,
}

impl Block {
  pub fn new(
    size: usize,
    next: *mut Block,
    tag: BlockTag,
  ) -> Self {
    Self {
      size,
      next,
      free: !tag.in_use(),
      tag: tag as u32,
    }
  }

  pub fn raw_tag(&self) -> u32 {
    self.tag
  }

  pub fn tag(&self) -> Option<BlockTag> {
    BlockTag::from_raw(self.tag)
  }

  /// Moves the block into `tag`'s state, keeping `free` in step with it.
  pub fn mark(
    &mut self,
    tag: BlockTag,
  ) {
    self.free = !tag.in_use();
    self.tag = tag as u32;
  }

  /// First payload byte of `block`.
  ///
  /// # Safety
  ///
  /// `block` must point at a header inside a span that extends at least
  /// `HEADER_SIZE` bytes past it.
  pub unsafe fn payload(block: NonNull<Block>) -> NonNull<u8> {
    unsafe { block.cast::<u8>().add(HEADER_SIZE) }
  }

  /// Header sitting `HEADER_SIZE` bytes before `payload`.
  ///
  /// Returns `None` if the subtraction would wrap below address zero. The
  /// result is not validated; see `Heap::owning_block`.
  ///
  /// # Safety
  ///
  /// `payload` and the recovered address must belong to the same span.
  pub unsafe fn from_payload(payload: NonNull<u8>) -> Option<NonNull<Block>> {
    if payload.as_ptr().addr() <= HEADER_SIZE {
      return None;
    }
    Some(unsafe { payload.sub(HEADER_SIZE) }.cast::<Block>())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::align::WORD;
  use std::ptr;

  #[test]
  fn test_header_is_word_multiple() {
    assert_eq!(HEADER_SIZE % WORD, 0);
    assert_eq!(mem::align_of::<Block>(), WORD);
  }

  #[test]
  fn test_tag_round_trip_and_rejection() {
    for tag in [BlockTag::Created, BlockTag::Reused, BlockTag::Released] {
      assert_eq!(BlockTag::from_raw(tag as u32), Some(tag));
    }
    assert_eq!(BlockTag::from_raw(0), None);
    assert_eq!(BlockTag::from_raw(0xDEAD_BEEF), None);
  }

  #[test]
  fn test_mark_keeps_free_flag_in_step() {
    let mut block = Block::new(16, ptr::null_mut(), BlockTag::Created);
    assert!(!block.free);
    assert_eq!(block.tag(), Some(BlockTag::Created));

    block.mark(BlockTag::Released);
    assert!(block.free);
    assert_eq!(block.raw_tag(), 0x5555_5555);

    block.mark(BlockTag::Reused);
    assert!(!block.free);
    assert_eq!(block.tag(), Some(BlockTag::Reused));
  }

  #[test]
  fn test_payload_offset() {
    let mut words = [0usize; 8];
    let block = NonNull::new(words.as_mut_ptr().cast::<Block>()).unwrap();

    unsafe {
      let payload = Block::payload(block);
      assert_eq!(payload.as_ptr().addr() - block.as_ptr().addr(), HEADER_SIZE);
      assert_eq!(Block::from_payload(payload), Some(block));
    }
  }

  #[test]
  fn test_from_payload_rejects_low_addresses() {
    let low = NonNull::new(ptr::without_provenance_mut::<u8>(HEADER_SIZE)).unwrap();
    assert_eq!(unsafe { Block::from_payload(low) }, None);
  }
}
