//! # brkalloc - A First-Fit Block List Allocator
//!
//! This crate provides a small **first-fit allocator** that manages one
//! contiguous, growable region without relying on any other allocator. By
//! default the region is the process heap, grown with the `sbrk` system call.
//!
//! ## Overview
//!
//! Every allocation is a block: a header followed by its payload. Blocks are
//! chained in a singly linked list in the order they were created:
//!
//! ```text
//!   Managed Region:
//!
//!   ┌────────┬─────────┬────────┬──────────────┬────────┬──────┐
//!   │ header │ payload │ header │   payload    │ header │ pay. │ ← break
//!   └────────┴─────────┴────────┴──────────────┴────────┴──────┘
//!    │  next            ▲ │  next                ▲
//!    └──────────────────┘ └──────────────────────┘
//!
//!   head ──► block 0 ──► block 1 ──► block 2 ──► null
//! ```
//!
//! ## Crate Structure
//!
//! ```text
//!   brkalloc
//!   ├── align      - Word rounding (WORD, align_up)
//!   ├── block      - Block header and tags (internal)
//!   ├── error      - AllocError
//!   ├── extender   - RegionExtender, Sbrk, Arena
//!   └── heap       - Heap: allocate, zero_allocate, resize, release
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use brkalloc::{Arena, Heap};
//!
//! let mut heap = Heap::with_extender(Arena::with_capacity(4096));
//!
//! let ptr = heap.allocate(20).unwrap();
//! unsafe {
//!     std::ptr::copy_nonoverlapping(b"Hello, World!\0".as_ptr(), ptr.as_ptr(), 14);
//!
//!     // Grow it; the first 20 bytes move with it.
//!     let ptr = heap.resize(ptr.as_ptr(), 40).unwrap();
//!     heap.release(ptr.as_ptr());
//! }
//! ```
//!
//! ## How It Works
//!
//! A request walks the list from the head and takes the first released block
//! whose size is at least the requested size. If none qualifies, the region
//! extender grows the region by one header plus the payload, rounded up to a
//! machine word, and the new block is linked after the last one:
//!
//! ```text
//!   Block Lifecycle:
//!
//!   extend ──► Created ──release──► Released ──allocate──► Reused
//!                                       ▲                     │
//!                                       └──────release────────┘
//! ```
//!
//! Each header records the size it was created with, a free flag, and a tag
//! naming its last transition:
//!
//! ```text
//!   ┌───────────────────────┬────────────────────────────────┐
//!   │    Block Header       │         Payload                │
//!   │  ┌─────────────────┐  │                                │
//!   │  │ size: N         │  │  ┌──────────────────────────┐  │
//!   │  │ next: null/ptr  │  │  │                          │  │
//!   │  │ free: false     │  │  │     N bytes usable       │  │
//!   │  │ tag: Created    │  │  │                          │  │
//!   │  └─────────────────┘  │  └──────────────────────────┘  │
//!   │   HEADER_SIZE bytes   │                                │
//!   └───────────────────────┴────────────────────────────────┘
//!                           ▲
//!                           └── Pointer returned to the caller
//! ```
//!
//! `release` and `resize` go back from the payload to the header and check the
//! tag before trusting it. A double release or a pointer the heap never handed
//! out panics; running out of region is an ordinary [`AllocError`].
//!
//! ## Limitations
//!
//! - **Single-threaded only**: `Heap` is neither `Send` nor `Sync`
//! - **No splitting**: a large released block serves a small request whole
//! - **No coalescing**: neighbouring released blocks stay separate
//! - **Never shrinks**: released blocks are not returned to the OS
//! - **Word alignment only**: payloads are aligned to `usize`, nothing more
//!
//! ## Safety
//!
//! Allocation is safe to call. Releasing and resizing take raw pointers and
//! are `unsafe`: the pointer must be null or have come from the same heap.

pub mod align;
mod block;
mod error;
pub mod extender;
mod heap;

pub use block::{BlockTag, HEADER_SIZE};
pub use error::AllocError;
pub use extender::{Arena, RegionExtender, Sbrk};
pub use heap::{BlockInfo, Blocks, Heap, HeapStats};
