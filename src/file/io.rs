//! Byte-order aware primitive reads over byte slices.
//!
//! Everything in the file and metadata layers goes through these helpers so
//! that no raw indexing can run past a buffer: a read that would cross the
//! end of the slice returns [`crate::Error::OutOfBounds`] instead.

use crate::{Error::OutOfBounds, Result};

/// A fixed-width primitive that can be reconstructed from little-endian bytes.
///
/// Implemented for the integer and float widths that occur in PE headers,
/// CLI metadata and IL operands.
pub trait LeRead: Sized {
    #[allow(missing_docs)]
    type Bytes: Sized + for<'a> TryFrom<&'a [u8]>;

    /// Build the value from its little-endian byte representation.
    fn from_le_bytes(bytes: Self::Bytes) -> Self;
}

macro_rules! impl_le_read {
    ($($t:ty),* $(,)?) => {$(
        impl LeRead for $t {
            type Bytes = [u8; std::mem::size_of::<$t>()];

            fn from_le_bytes(bytes: Self::Bytes) -> Self {
                <$t>::from_le_bytes(bytes)
            }
        }
    )*};
}

impl_le_read!(u8, i8, u16, i16, u32, i32, u64, i64, f32, f64);

/// Read a `T` in little-endian from the start of `data`.
pub fn read_le<T: LeRead>(data: &[u8]) -> Result<T> {
    let mut offset = 0_usize;
    read_le_at(data, &mut offset)
}

/// Read a `T` in little-endian from `offset`, advancing the offset by the
/// number of bytes consumed.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if the read would cross the end of
/// `data`.
pub fn read_le_at<T: LeRead>(data: &[u8], offset: &mut usize) -> Result<T> {
    let width = std::mem::size_of::<T>();
    let Some(end) = offset.checked_add(width) else {
        return Err(OutOfBounds);
    };
    if end > data.len() {
        return Err(OutOfBounds);
    }

    let Ok(bytes) = data[*offset..end].try_into() else {
        return Err(OutOfBounds);
    };

    *offset = end;
    Ok(T::from_le_bytes(bytes))
}
