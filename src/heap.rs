use std::{
  fmt,
  marker::PhantomData,
  ptr::{self, NonNull},
};

use log::{debug, error, trace};

use crate::{
  align::{WORD, align_up},
  block::{Block, BlockTag, HEADER_SIZE},
  error::{AllocError, Violation},
  extender::{RegionExtender, Sbrk},
};

/// Outcome of a first-fit walk over the block list.
enum Fit {
  /// A released block large enough for the request.
  Free(NonNull<Block>),
  /// Nothing fits. Holds the last block visited, or null for an empty list.
  Append(*mut Block),
}

/// First-fit block allocator layered over a [`RegionExtender`].
///
/// The heap owns every block it ever created. Blocks are never split, merged,
/// or given back to the extender: a released block only waits for a request
/// it is large enough for.
///
/// The heap holds raw pointers into its region, so it is neither `Send` nor
/// `Sync`. Only one caller at a time can use it.
pub struct Heap<E: RegionExtender = Sbrk> {
  extender: E,
  head: *mut Block,
  region_bytes: usize,
}

impl Heap<Sbrk> {
  /// A heap that grows the program break.
  pub const fn new() -> Self {
    Self::with_extender(Sbrk::new())
  }
}

impl Default for Heap<Sbrk> {
  fn default() -> Self {
    Self::new()
  }
}

impl<E: RegionExtender> Heap<E> {
  pub const fn with_extender(extender: E) -> Self {
    Self {
      extender,
      head: ptr::null_mut(),
      region_bytes: 0,
    }
  }

  pub fn extender(&self) -> &E {
    &self.extender
  }

  /// True until the first successful allocation.
  pub fn is_empty(&self) -> bool {
    self.head.is_null()
  }

  /// Walks the list from the head and stops at the first released block
  /// holding at least `size` bytes.
  fn find_free(
    &self,
    size: usize,
  ) -> Fit {
    let mut current = self.head;
    let mut last = ptr::null_mut();
    let mut visited = 0usize;

    while let Some(block) = NonNull::new(current) {
      let header = unsafe { block.as_ref() };
      if header.free && header.size >= size {
        trace!("first fit for {size} bytes after {visited} blocks: {block:?}");
        return Fit::Free(block);
      }
      visited += 1;
      last = current;
      current = header.next;
    }

    trace!("no free block for {size} bytes among {visited} blocks");
    Fit::Append(last)
  }

  /// Extends the region by one block of `size` payload bytes and links it
  /// after `last`.
  ///
  /// Nothing is linked when the extender refuses.
  fn grow_list(
    &mut self,
    last: *mut Block,
    size: usize,
  ) -> Result<NonNull<Block>, AllocError> {
    let span = HEADER_SIZE
      .checked_add(size)
      .and_then(align_up)
      .ok_or(AllocError::Overflow)?;

    let address = self
      .extender
      .extend(span)
      .ok_or(AllocError::Exhausted { requested: span })?;
    debug_assert_eq!(address.as_ptr().addr() % WORD, 0);

    let block = address.cast::<Block>();
    unsafe {
      block.write(Block::new(size, ptr::null_mut(), BlockTag::Created));
      if !last.is_null() {
        (*last).next = block.as_ptr();
      }
    }
    self.region_bytes += span;

    debug!("created block {block:?}: {size} bytes, {span} bytes of region");
    Ok(block)
  }

  /// Hands out at least `size` bytes, reusing the first released block that
  /// is large enough or appending a new one.
  ///
  /// The heap is left untouched when an error is returned.
  pub fn allocate(
    &mut self,
    size: usize,
  ) -> Result<NonNull<u8>, AllocError> {
    if size == 0 {
      return Err(AllocError::ZeroSize);
    }

    let block = match self.find_free(size) {
      Fit::Free(mut block) => {
        let header = unsafe { block.as_mut() };
        header.mark(BlockTag::Reused);
        debug!("reused block {block:?}: {} bytes for {size}", header.size);
        block
      }
      Fit::Append(last) => {
        let block = self.grow_list(last, size)?;
        if self.head.is_null() {
          self.head = block.as_ptr();
        }
        block
      }
    };

    Ok(unsafe { Block::payload(block) })
  }

  /// Like [`allocate`](Self::allocate) for `count * element_size` bytes, all
  /// of them zeroed.
  ///
  /// A product that overflows `usize` is refused with
  /// [`AllocError::Overflow`].
  pub fn zero_allocate(
    &mut self,
    count: usize,
    element_size: usize,
  ) -> Result<NonNull<u8>, AllocError> {
    let total = count
      .checked_mul(element_size)
      .ok_or(AllocError::Overflow)?;

    let payload = self.allocate(total)?;
    unsafe { payload.write_bytes(0, total) };
    Ok(payload)
  }

  /// Marks the block behind `ptr` free for reuse. A null `ptr` is ignored.
  ///
  /// The payload is not scrubbed and the region does not shrink.
  ///
  /// # Safety
  ///
  /// `ptr` must be null or a pointer returned by this heap.
  ///
  /// # Panics
  ///
  /// Panics when `ptr` was already released, or does not lead back to a
  /// header this heap wrote.
  pub unsafe fn release(
    &mut self,
    ptr: *mut u8,
  ) {
    let Some(payload) = NonNull::new(ptr) else {
      return;
    };

    let block = match unsafe { self.live_block(payload) } {
      Ok(block) => block,
      Err(violation) => contract_violation(violation),
    };
    unsafe { self.mark_released(block) };
  }

  /// Makes room for `new_size` bytes behind `ptr`.
  ///
  /// A null `ptr` behaves exactly like [`allocate`](Self::allocate). A block
  /// that is already large enough is returned as is and keeps its recorded
  /// size. Otherwise the payload moves to a new block and the old one is
  /// released. If that allocation fails, `ptr` stays allocated and the
  /// caller still owns it.
  ///
  /// # Safety
  ///
  /// `ptr` must be null or a pointer returned by this heap.
  ///
  /// # Panics
  ///
  /// Panics when `ptr` was already released, or does not lead back to a
  /// header this heap wrote.
  pub unsafe fn resize(
    &mut self,
    ptr: *mut u8,
    new_size: usize,
  ) -> Result<NonNull<u8>, AllocError> {
    let Some(payload) = NonNull::new(ptr) else {
      return self.allocate(new_size);
    };

    let block = match unsafe { self.live_block(payload) } {
      Ok(block) => block,
      Err(Violation::DoubleRelease { address }) => {
        contract_violation(Violation::UseAfterRelease { address })
      }
      Err(violation) => contract_violation(violation),
    };

    let old_size = unsafe { block.as_ref().size };
    if old_size >= new_size {
      trace!("block {block:?} already holds {old_size} >= {new_size} bytes");
      return Ok(payload);
    }

    let moved = self.allocate(new_size)?;
    unsafe {
      ptr::copy_nonoverlapping(payload.as_ptr(), moved.as_ptr(), old_size);
      self.mark_released(block);
    }

    debug!("moved {old_size} bytes from {payload:?} to {moved:?} for {new_size}");
    Ok(moved)
  }

  /// Recorded payload size of a live allocation.
  ///
  /// This is the size the block was created with, which may exceed what the
  /// current owner asked for.
  ///
  /// # Safety
  ///
  /// `ptr` must have been returned by this heap.
  ///
  /// # Panics
  ///
  /// Panics under the same conditions as [`release`](Self::release).
  pub unsafe fn usable_size(
    &self,
    ptr: NonNull<u8>,
  ) -> usize {
    match unsafe { self.live_block(ptr) } {
      Ok(block) => unsafe { block.as_ref().size },
      Err(violation) => contract_violation(violation),
    }
  }

  /// Recovers the header in front of `payload` and checks that it belongs
  /// to a block currently handed out.
  unsafe fn live_block(
    &self,
    payload: NonNull<u8>,
  ) -> Result<NonNull<Block>, Violation> {
    let address = payload.as_ptr().addr();
    if address % WORD != 0 {
      return Err(Violation::Misaligned { address });
    }
    let block = unsafe { Block::from_payload(payload) }
      .ok_or(Violation::Misaligned { address })?;

    let header = unsafe { block.as_ref() };
    let tag = header.tag().ok_or(Violation::CorruptTag {
      address,
      tag: header.raw_tag(),
    })?;

    if header.free {
      return Err(Violation::DoubleRelease { address });
    }
    if !tag.in_use() {
      return Err(Violation::CorruptTag {
        address,
        tag: header.raw_tag(),
      });
    }

    Ok(block)
  }

  unsafe fn mark_released(
    &mut self,
    mut block: NonNull<Block>,
  ) {
    let header = unsafe { block.as_mut() };
    header.mark(BlockTag::Released);
    debug!("released block {block:?}: {} bytes", header.size);
  }

  /// Blocks in list order, which is also the order they were created in.
  pub fn blocks(&self) -> Blocks<'_> {
    Blocks {
      current: self.head,
      _heap: PhantomData,
    }
  }

  pub fn stats(&self) -> HeapStats {
    let mut stats = HeapStats {
      region_bytes: self.region_bytes,
      ..HeapStats::default()
    };

    for block in self.blocks() {
      stats.blocks += 1;
      if block.free {
        stats.free_blocks += 1;
        stats.free_bytes += block.size;
      } else {
        stats.in_use_bytes += block.size;
      }
    }

    stats
  }
}

/// Reports a broken pointer contract and stops. The heap is untouched.
#[cold]
#[track_caller]
fn contract_violation(violation: Violation) -> ! {
  error!("heap contract violation: {violation}");
  panic!("heap contract violation: {violation}");
}

/// Snapshot of one block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
  /// Address handed to the owner.
  pub payload: NonNull<u8>,
  pub size: usize,
  pub free: bool,
  /// `None` if the header was overwritten.
  pub tag: Option<BlockTag>,
}

/// Iterator returned by [`Heap::blocks`].
pub struct Blocks<'a> {
  current: *mut Block,
  _heap: PhantomData<&'a Block>,
}

impl Iterator for Blocks<'_> {
  type Item = BlockInfo;

  fn next(&mut self) -> Option<Self::Item> {
    let block = NonNull::new(self.current)?;
    let header = unsafe { block.as_ref() };
    self.current = header.next;

    Some(BlockInfo {
      payload: unsafe { Block::payload(block) },
      size: header.size,
      free: header.free,
      tag: header.tag(),
    })
  }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HeapStats {
  pub blocks: usize,
  pub free_blocks: usize,
  /// Payload bytes recorded by blocks currently handed out.
  pub in_use_bytes: usize,
  /// Payload bytes recorded by released blocks.
  pub free_bytes: usize,
  /// Bytes obtained from the extender, headers and rounding included.
  pub region_bytes: usize,
}

impl<E: RegionExtender> fmt::Debug for Heap<E> {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    struct List<'a, E: RegionExtender>(&'a Heap<E>);

    impl<E: RegionExtender> fmt::Debug for List<'_, E> {
      fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
      ) -> fmt::Result {
        f.debug_list().entries(self.0.blocks()).finish()
      }
    }

    f.debug_struct("Heap")
      .field("region_bytes", &self.region_bytes)
      .field("blocks", &List(self))
      .finish()
  }
}
