use widestring::U16Str;

use crate::{Error::OutOfBounds, Result};

/// The `#US` heap: UTF-16 user string literals addressed by `ldstr`
/// token rows.
///
/// Each entry is a compressed byte count followed by the UTF-16 code units
/// and one trailing flag byte (which is not part of the text).
pub struct UserStringsHeap<'a> {
    data: &'a [u8],
}

impl<'a> UserStringsHeap<'a> {
    /// Create a heap view. A valid heap starts with a zero byte.
    ///
    /// # Errors
    /// Returns an error if the heap is empty or does not start with 0.
    pub fn parse(data: &'a [u8]) -> Result<UserStringsHeap<'a>> {
        if data.is_empty() || data[0] != 0 {
            return Err(malformed_error!("Invalid #US heap"));
        }

        Ok(UserStringsHeap { data })
    }

    /// Decode the user string at heap offset `index`.
    ///
    /// # Errors
    /// Returns an error if the entry is malformed or crosses the heap end.
    pub fn get(&self, index: usize) -> Result<String> {
        let (text, _) = self.entry(index)?;
        Ok(text)
    }

    /// All entries of the heap in storage order, as `(offset, text)` pairs.
    /// Zero-length padding bytes between and after entries are skipped.
    ///
    /// # Errors
    /// Returns an error if any entry is malformed.
    pub fn all(&self) -> Result<Vec<(u32, String)>> {
        let mut entries = Vec::new();
        let mut offset = 1_usize;

        while offset < self.data.len() {
            if self.data[offset] == 0 {
                offset += 1;
                continue;
            }

            let position = offset as u32;
            let (text, next) = self.entry(offset)?;
            entries.push((position, text));
            offset = next;
        }

        Ok(entries)
    }

    /// Decode one entry, returning the text and the offset just past it.
    fn entry(&self, index: usize) -> Result<(String, usize)> {
        if index == 0 || index >= self.data.len() {
            return Err(OutOfBounds);
        }

        let first = self.data[index];
        let (prefix, length) = if first & 0x80 == 0 {
            (1_usize, usize::from(first))
        } else if first & 0xC0 == 0x80 {
            if index + 1 >= self.data.len() {
                return Err(OutOfBounds);
            }
            (
                2,
                (usize::from(first & 0x3F) << 8) | usize::from(self.data[index + 1]),
            )
        } else if first & 0xE0 == 0xC0 {
            if index + 3 >= self.data.len() {
                return Err(OutOfBounds);
            }
            (
                4,
                (usize::from(first & 0x1F) << 24)
                    | (usize::from(self.data[index + 1]) << 16)
                    | (usize::from(self.data[index + 2]) << 8)
                    | usize::from(self.data[index + 3]),
            )
        } else {
            return Err(malformed_error!(
                "Invalid user string length prefix at {}",
                index
            ));
        };

        let start = index + prefix;
        let Some(end) = start.checked_add(length) else {
            return Err(OutOfBounds);
        };
        if end > self.data.len() {
            return Err(OutOfBounds);
        }

        // drop the trailing flag byte of non-empty entries
        let text_bytes = length & !1;
        let mut units = Vec::with_capacity(text_bytes / 2);
        for pair in self.data[start..start + text_bytes].chunks_exact(2) {
            units.push(u16::from_le_bytes([pair[0], pair[1]]));
        }

        Ok((U16Str::from_slice(&units).to_string_lossy(), end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crafted() {
        #[rustfmt::skip]
        let data = [
            0x00,
            0x05, 0x68, 0x00, 0x69, 0x00, 0x00, // "hi" + flag byte
            0x07, 0x61, 0x00, 0x62, 0x00, 0x63, 0x00, 0x01, // "abc" + flag byte
            0x00, 0x00, // trailing padding
        ];

        let heap = UserStringsHeap::parse(&data).unwrap();
        assert_eq!(heap.get(1).unwrap(), "hi");
        assert_eq!(heap.get(7).unwrap(), "abc");

        let all = heap.all().unwrap();
        assert_eq!(all, vec![(1, "hi".into()), (7, "abc".into())]);
    }

    #[test]
    fn invalid_entries() {
        assert!(UserStringsHeap::parse(&[]).is_err());
        assert!(UserStringsHeap::parse(&[0x22]).is_err());

        let truncated = [0x00, 0x09, 0x68, 0x00];
        let heap = UserStringsHeap::parse(&truncated).unwrap();
        assert!(heap.get(1).is_err());
        assert!(heap.all().is_err());
    }
}
