use crate::{
    file::io::{read_le, read_le_at},
    Error::OutOfBounds,
    Result,
};

/// Magic signature of physical metadata: `BSJB`.
pub const METADATA_MAGIC: u32 = 0x424A_5342;

/// One entry of the stream directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamHeader {
    /// Offset of the stream, relative to the metadata root.
    pub offset: u32,
    /// Size of the stream in bytes.
    pub size: u32,
    /// Stream name (`#~`, `#Strings`, `#US`, `#GUID`, `#Blob`, `#-`).
    pub name: String,
}

/// The metadata root: version string and stream directory.
///
/// This is the first structure parsed when opening a metadata scope; its
/// stream headers locate everything else.
pub struct Root {
    /// Major version of the metadata format.
    pub major_version: u16,
    /// Minor version of the metadata format.
    pub minor_version: u16,
    /// Runtime version string, e.g. `v4.0.30319`.
    pub version: String,
    /// Reserved flags, always 0.
    pub flags: u16,
    /// The stream directory.
    pub stream_headers: Vec<StreamHeader>,
}

impl Root {
    /// Parse the metadata root from the start of `data`, which must span
    /// the whole metadata blob so stream extents can be validated.
    ///
    /// # Errors
    /// Returns an error on a bad magic, truncated data, or a stream that
    /// lies outside the metadata.
    pub fn parse(data: &[u8]) -> Result<Root> {
        if data.len() < 20 {
            return Err(OutOfBounds);
        }

        let signature = read_le::<u32>(data)?;
        if signature != METADATA_MAGIC {
            return Err(malformed_error!(
                "Metadata magic does not match - {:#x}",
                signature
            ));
        }

        let major_version = read_le::<u16>(&data[4..])?;
        let minor_version = read_le::<u16>(&data[6..])?;

        // length is the allocated (4-aligned) size of the version string
        let version_length = read_le::<u32>(&data[12..])? as usize;
        let Some(version_end) = version_length.checked_add(16) else {
            return Err(malformed_error!(
                "Version string length causes overflow - {}",
                version_length
            ));
        };
        if version_end + 4 > data.len() {
            return Err(OutOfBounds);
        }

        let version: String = data[16..version_end]
            .iter()
            .take_while(|&&byte| byte != 0)
            .map(|&byte| char::from(byte))
            .collect();

        let mut offset = version_end;
        let flags = read_le_at::<u16>(data, &mut offset)?;
        let stream_count = read_le_at::<u16>(data, &mut offset)?;
        if stream_count == 0 || stream_count > 6 {
            return Err(malformed_error!("Invalid stream count - {}", stream_count));
        }

        let mut stream_headers = Vec::with_capacity(stream_count as usize);
        for _ in 0..stream_count {
            let stream_offset = read_le_at::<u32>(data, &mut offset)?;
            let stream_size = read_le_at::<u32>(data, &mut offset)?;

            let mut name = String::new();
            loop {
                if name.len() > 32 {
                    return Err(malformed_error!("Stream name too long"));
                }
                let byte = read_le_at::<u8>(data, &mut offset)?;
                if byte == 0 {
                    break;
                }
                name.push(char::from(byte));
            }

            // names are padded with NULs to a 4-byte boundary
            while offset % 4 != 0 {
                read_le_at::<u8>(data, &mut offset)?;
            }

            match stream_offset.checked_add(stream_size) {
                Some(end) if end as usize <= data.len() => {}
                _ => {
                    return Err(malformed_error!(
                        "Stream '{}' lies outside the metadata - {} + {}",
                        name,
                        stream_offset,
                        stream_size
                    ))
                }
            }

            stream_headers.push(StreamHeader {
                offset: stream_offset,
                size: stream_size,
                name,
            });
        }

        Ok(Root {
            major_version,
            minor_version,
            version,
            flags,
            stream_headers,
        })
    }

    /// Find a stream by name.
    #[must_use]
    pub fn stream(&self, name: &str) -> Option<&StreamHeader> {
        self.stream_headers.iter().find(|header| header.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn crafted_root() -> Vec<u8> {
        #[rustfmt::skip]
        let mut data = vec![
            0x42, 0x53, 0x4A, 0x42, // magic
            0x01, 0x00,             // major
            0x01, 0x00,             // minor
            0x00, 0x00, 0x00, 0x00, // reserved
            0x0C, 0x00, 0x00, 0x00, // version length 12
            b'v', b'4', b'.', b'0', b'.', b'3', b'0', b'3', b'1', b'9', 0x00, 0x00,
            0x00, 0x00,             // flags
            0x02, 0x00,             // two streams
            0x40, 0x00, 0x00, 0x00, // #~ offset
            0x10, 0x00, 0x00, 0x00, // #~ size
            b'#', b'~', 0x00, 0x00,
            0x50, 0x00, 0x00, 0x00, // #Strings offset
            0x08, 0x00, 0x00, 0x00, // #Strings size
            b'#', b'S', b't', b'r', b'i', b'n', b'g', b's', 0x00, 0x00, 0x00, 0x00,
        ];
        data.resize(0x58, 0);
        data
    }

    #[test]
    fn crafted() {
        let root = Root::parse(&crafted_root()).unwrap();

        assert_eq!(root.major_version, 1);
        assert_eq!(root.version, "v4.0.30319");
        assert_eq!(root.stream_headers.len(), 2);

        let tables = root.stream("#~").unwrap();
        assert_eq!((tables.offset, tables.size), (0x40, 0x10));

        let strings = root.stream("#Strings").unwrap();
        assert_eq!((strings.offset, strings.size), (0x50, 0x08));

        assert!(root.stream("#Blob").is_none());
    }

    #[test]
    fn rejects_bad_magic() {
        let mut data = crafted_root();
        data[0] = 0x41;
        assert!(Root::parse(&data).is_err());
    }

    #[test]
    fn rejects_stream_outside_metadata() {
        let mut data = crafted_root();
        // push the #Strings stream offset past the end of the blob
        data[46] = 0xFF;
        assert!(Root::parse(&data).is_err());
    }
}
