use crate::{Error::OutOfBounds, Result};

/// The `#Strings` heap: null-terminated UTF-8 names referenced by the
/// metadata tables.
pub struct StringsHeap<'a> {
    data: &'a [u8],
}

impl<'a> StringsHeap<'a> {
    /// Create a heap view. A valid heap starts with a zero byte (the empty
    /// string at index 0).
    ///
    /// # Errors
    /// Returns an error if the heap is empty or does not start with 0.
    pub fn parse(data: &'a [u8]) -> Result<StringsHeap<'a>> {
        if data.is_empty() || data[0] != 0 {
            return Err(malformed_error!("Invalid #Strings heap"));
        }

        Ok(StringsHeap { data })
    }

    /// The string at heap index `index`.
    ///
    /// # Errors
    /// Returns an error if the index is out of bounds, the string is not
    /// terminated, or it is not valid UTF-8.
    pub fn get(&self, index: usize) -> Result<&'a str> {
        if index >= self.data.len() {
            return Err(OutOfBounds);
        }

        let tail = &self.data[index..];
        let Some(end) = tail.iter().position(|&byte| byte == 0) else {
            return Err(malformed_error!(
                "Unterminated string at heap index {}",
                index
            ));
        };

        std::str::from_utf8(&tail[..end])
            .map_err(|_| malformed_error!("Invalid UTF-8 at heap index {}", index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup() {
        let data = b"\0Widget\0Demo\0";
        let heap = StringsHeap::parse(data).unwrap();

        assert_eq!(heap.get(0).unwrap(), "");
        assert_eq!(heap.get(1).unwrap(), "Widget");
        assert_eq!(heap.get(8).unwrap(), "Demo");
        // an index into the middle of an entry yields its tail
        assert_eq!(heap.get(4).unwrap(), "get");

        assert!(heap.get(100).is_err());
    }

    #[test]
    fn invalid_heaps() {
        assert!(StringsHeap::parse(&[]).is_err());
        assert!(StringsHeap::parse(b"x\0").is_err());

        let unterminated = [0_u8, b'a', b'b'];
        let heap = StringsHeap::parse(&unterminated).unwrap();
        assert!(heap.get(1).is_err());
    }
}
