use std::{error, fmt};

/// Recoverable allocation failure. The heap is unchanged when one is returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocError {
  /// Zero-byte requests are refused.
  ZeroSize,
  /// The region extender would not grant the bytes needed for a new block.
  Exhausted { requested: usize },
  /// The request does not fit in `usize` once the header and rounding are added,
  /// or `count * element_size` overflowed.
  Overflow,
}

impl fmt::Display for AllocError {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    match self {
      Self::ZeroSize => write!(f, "zero-size allocation requested"),
      Self::Exhausted { requested } => {
        write!(f, "region extender refused {requested} more bytes")
      }
      Self::Overflow => write!(f, "allocation size overflows usize"),
    }
  }
}

impl error::Error for AllocError {}

/// A pointer handed back to the heap that it cannot trust.
///
/// Never returned to callers: it only feeds the fatal path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Violation {
  /// Not word aligned, or too low to have a header in front of it.
  Misaligned { address: usize },
  DoubleRelease { address: usize },
  CorruptTag { address: usize, tag: u32 },
  UseAfterRelease { address: usize },
}

impl fmt::Display for Violation {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    match self {
      Self::Misaligned { address } => {
        write!(f, "{address:#x} is not a payload address")
      }
      Self::DoubleRelease { address } => {
        write!(f, "double release of {address:#x}")
      }
      Self::CorruptTag { address, tag } => {
        write!(f, "block at {address:#x} carries unknown tag {tag:#010x}")
      }
      Self::UseAfterRelease { address } => {
        write!(f, "resize of released block {address:#x}")
      }
    }
  }
}
