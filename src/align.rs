use std::mem;

/// Machine word size. Every span the heap requests is a multiple of it.
pub const WORD: usize = mem::size_of::<usize>();

/// Rounds `value` up to the next multiple of [`WORD`].
///
/// Returns `None` when the rounded value does not fit in a `usize`.
///
/// # Examples
///
/// ```rust
/// use brkalloc::align::{WORD, align_up};
///
/// match WORD {
///     8 => assert_eq!(align_up(13), Some(16)), // 64 bit machine.
///     4 => assert_eq!(align_up(11), Some(12)), // 32 bit machine.
///     _ => {},
/// };
/// assert_eq!(align_up(usize::MAX), None);
/// ```
pub const fn align_up(value: usize) -> Option<usize> {
  match value.checked_add(WORD - 1) {
    Some(bumped) => Some(bumped & !(WORD - 1)),
    None => None,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_align_up() {
    let mut alignments = Vec::new();

    for i in 0..10 {
      let sizes = (WORD * i + 1)..=(WORD * (i + 1));

      let expected_alignment = WORD * (i + 1);

      alignments.push((sizes, expected_alignment));
    }

    for (sizes, expected) in alignments {
      for size in sizes {
        assert_eq!(Some(expected), align_up(size));
      }
    }
  }

  #[test]
  fn test_align_up_zero_and_overflow() {
    assert_eq!(align_up(0), Some(0));
    assert_eq!(align_up(usize::MAX - WORD + 1), Some(usize::MAX - WORD + 1));
    assert_eq!(align_up(usize::MAX - WORD + 2), None);
  }
}
