/// Rounds the given size up to the machine word, which is also the alignment
/// of every block header.
///
/// Block footprints are `HEADER_SIZE + align!(request)`, so a header placed
/// right behind another block's payload is aligned as well.
///
/// # Examples
///
/// ```rust
/// use tsalloc::{HEADER_SIZE, align};
///
/// let word = core::mem::size_of::<usize>();
/// assert_eq!(HEADER_SIZE, align!(HEADER_SIZE));
///
/// let footprint = HEADER_SIZE + align!(13usize);
/// assert_eq!(0, footprint % word);
/// assert!(footprint - HEADER_SIZE < 13 + word);
/// ```
#[macro_export]
macro_rules! align {
  ($value:expr) => {
    ($value + ::core::mem::size_of::<usize>() - 1) & !(::core::mem::size_of::<usize>() - 1)
  };
}

/// Overflow-checked variant of [`align!`]: `None` if rounding up would wrap.
pub(crate) fn checked_align(value: usize) -> Option<usize> {
  let word = core::mem::size_of::<usize>();
  value.checked_add(word - 1).map(|v| v & !(word - 1))
}
