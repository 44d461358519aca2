//! CLR 2.0 (Cor20) header parsing.
//!
//! The Cor20 header sits at the start of the CLR runtime data directory of
//! a CLI module and points at the physical metadata.
//!
//! # Reference
//! - ECMA-335 6th Edition, Partition II, Section 25.3.3

use crate::{file::parser::Parser, Error::OutOfBounds, Result};

/// The main CLI header of a module.
pub struct Cor20Header {
    /// Size of the header in bytes, always 72.
    pub cb: u32,
    /// Minimum major runtime version required to run this module.
    pub major_runtime_version: u16,
    /// Minor portion of the required runtime version.
    pub minor_runtime_version: u16,
    /// RVA of the physical metadata.
    pub meta_data_rva: u32,
    /// Size of the physical metadata in bytes.
    pub meta_data_size: u32,
    /// Runtime flags (IL-only, 32-bit required, strong-name signed, ...).
    pub flags: u32,
    /// Token of the entry point method, or 0.
    pub entry_point_token: u32,
    /// RVA of embedded resources.
    pub resource_rva: u32,
    /// Size of embedded resources.
    pub resource_size: u32,
    /// RVA of the strong-name signature hash.
    pub strong_name_signature_rva: u32,
    /// Size of the strong-name signature hash.
    pub strong_name_signature_size: u32,
    /// RVA of the vtable fixup table.
    pub vtable_fixups_rva: u32,
    /// Size of the vtable fixup table.
    pub vtable_fixups_size: u32,
}

impl Cor20Header {
    /// Parse a Cor20 header from the start of `data`.
    ///
    /// # Errors
    /// Returns an error if the data is shorter than 72 bytes, the declared
    /// size is wrong, or the metadata directory is absent.
    pub fn parse(data: &[u8]) -> Result<Cor20Header> {
        if data.len() < 72 {
            return Err(OutOfBounds);
        }

        let mut parser = Parser::new(data);

        let cb = parser.read_le::<u32>()?;
        if cb != 72 {
            return Err(malformed_error!(
                "Invalid CLR header size: expected 72, got {}",
                cb
            ));
        }

        let major_runtime_version = parser.read_le::<u16>()?;
        let minor_runtime_version = parser.read_le::<u16>()?;

        let meta_data_rva = parser.read_le::<u32>()?;
        let meta_data_size = parser.read_le::<u32>()?;
        if meta_data_rva == 0 || meta_data_size == 0 {
            return Err(malformed_error!("Module carries no physical metadata"));
        }

        let flags = parser.read_le::<u32>()?;
        let entry_point_token = parser.read_le::<u32>()?;
        let resource_rva = parser.read_le::<u32>()?;
        let resource_size = parser.read_le::<u32>()?;
        let strong_name_signature_rva = parser.read_le::<u32>()?;
        let strong_name_signature_size = parser.read_le::<u32>()?;

        // code manager table, always zero
        parser.read_le::<u64>()?;

        let vtable_fixups_rva = parser.read_le::<u32>()?;
        let vtable_fixups_size = parser.read_le::<u32>()?;

        Ok(Cor20Header {
            cb,
            major_runtime_version,
            minor_runtime_version,
            meta_data_rva,
            meta_data_size,
            flags,
            entry_point_token,
            resource_rva,
            resource_size,
            strong_name_signature_rva,
            strong_name_signature_size,
            vtable_fixups_rva,
            vtable_fixups_size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crafted() {
        #[rustfmt::skip]
        let data = [
            0x48, 0x00, 0x00, 0x00, // cb = 72
            0x02, 0x00,             // major runtime version
            0x05, 0x00,             // minor runtime version
            0x58, 0x20, 0x00, 0x00, // metadata RVA
            0x78, 0x01, 0x00, 0x00, // metadata size
            0x01, 0x00, 0x00, 0x00, // flags: IL only
            0x01, 0x00, 0x00, 0x06, // entry point 0x06000001
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // resources
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // strong name
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // code manager
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // vtable fixups
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // export jumps
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // native header
        ];

        let header = Cor20Header::parse(&data).unwrap();
        assert_eq!(header.cb, 72);
        assert_eq!(header.major_runtime_version, 2);
        assert_eq!(header.meta_data_rva, 0x2058);
        assert_eq!(header.meta_data_size, 0x178);
        assert_eq!(header.flags, 1);
        assert_eq!(header.entry_point_token, 0x0600_0001);
    }

    #[test]
    fn rejects_bad_size_and_missing_metadata() {
        let mut data = [0_u8; 72];
        data[0] = 70;
        assert!(Cor20Header::parse(&data).is_err());

        data[0] = 72;
        // metadata rva/size still zero
        assert!(Cor20Header::parse(&data).is_err());

        assert!(matches!(Cor20Header::parse(&[0_u8; 10]), Err(OutOfBounds)));
    }
}
