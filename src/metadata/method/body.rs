use bitflags::bitflags;

use crate::{
    file::io::{read_le, read_le_at},
    metadata::{
        method::{EhClause, EhTable},
        typesystem::TypeRef,
    },
    Error::OutOfBounds,
    Result,
};

bitflags! {
    /// Flags carried in the first 12 bits of a method header.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MethodBodyFlags: u16 {
        /// Tiny method header format.
        const TINY_FORMAT = 0x2;
        /// Fat method header format.
        const FAT_FORMAT = 0x3;
        /// More data sections follow the code (exception handling).
        const MORE_SECTS = 0x8;
        /// Local variables shall be default-initialized.
        const INIT_LOCALS = 0x10;
    }
}

bitflags! {
    /// Flags of a trailing method data section.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SectionFlags: u8 {
        /// Section contains exception-handling data.
        const EHTABLE = 0x1;
        /// Reserved, shall be 0.
        const OPT_ILTABLE = 0x2;
        /// Section uses the fat (24-byte clause) layout.
        const FAT_FORMAT = 0x40;
        /// Another section follows this one.
        const MORE_SECTS = 0x80;
    }
}

/// The decoded prologue of an IL method: header fields and the
/// exception-handling sections that trail the code.
///
/// Parsing starts at the method's first header byte; bits 0..1 select the
/// format. A tiny header is a single byte carrying the code size; a fat
/// header is 12 bytes with flags, max stack, code size, and the
/// local-variable signature token.
pub struct MethodBody {
    /// Length of the IL code in bytes, excluding the header.
    pub size_code: usize,
    /// Length of the header in bytes (1 for tiny, 12 for fat).
    pub size_header: usize,
    /// Token of the local-variable signature; 0 when there are no locals.
    pub local_var_sig_token: u32,
    /// Maximum number of items on the operand stack. Tiny bodies imply 8.
    pub max_stack: u32,
    /// Whether the header uses the fat format.
    pub is_fat: bool,
    /// Whether locals are default-initialized on entry.
    pub is_init_locals: bool,
    /// The decoded exception-handling clauses.
    pub eh: EhTable,
}

impl MethodBody {
    /// Parse a method body header from `data`, which must start at the
    /// first header byte and extend at least to the end of the code.
    ///
    /// # Errors
    /// Returns an error if the data is empty or truncated, or the format
    /// bits select neither tiny nor fat.
    pub fn parse(data: &[u8]) -> Result<MethodBody> {
        if data.is_empty() {
            return Err(malformed_error!("Provided data for body parsing is empty"));
        }

        let first_byte = read_le::<u8>(data)?;
        match MethodBodyFlags::from_bits_truncate(u16::from(first_byte & 0b0000_0011)) {
            MethodBodyFlags::TINY_FORMAT => {
                let size_code = (first_byte >> 2) as usize;
                if size_code + 1 > data.len() {
                    return Err(OutOfBounds);
                }

                Ok(MethodBody {
                    size_code,
                    size_header: 1,
                    local_var_sig_token: 0,
                    max_stack: 8,
                    is_fat: false,
                    is_init_locals: false,
                    eh: EhTable::default(),
                })
            }
            MethodBodyFlags::FAT_FORMAT => {
                if data.len() < 12 {
                    return Err(OutOfBounds);
                }

                let first_duo = read_le::<u16>(data)?;
                let size_header = ((first_duo >> 12) * 4) as usize;
                let max_stack = u32::from(read_le::<u16>(&data[2..])?);
                let size_code = read_le::<u32>(&data[4..])? as usize;
                if data.len() < size_code + size_header {
                    return Err(OutOfBounds);
                }

                let local_var_sig_token = read_le::<u32>(&data[8..])?;
                let flags = MethodBodyFlags::from_bits_truncate(first_duo & 0x0FFF);

                let mut clauses = Vec::new();
                if flags.contains(MethodBodyFlags::MORE_SECTS) {
                    // Sections start after the code, 4-byte aligned
                    let mut cursor = (size_header + size_code + 3) & !3;
                    Self::parse_eh_sections(data, &mut cursor, &mut clauses)?;
                }

                Ok(MethodBody {
                    size_code,
                    size_header,
                    local_var_sig_token,
                    max_stack,
                    is_fat: true,
                    is_init_locals: flags.contains(MethodBodyFlags::INIT_LOCALS),
                    eh: EhTable { clauses },
                })
            }
            _ => Err(malformed_error!(
                "Method header is neither fat nor tiny - {}",
                first_byte
            )),
        }
    }

    fn parse_eh_sections(
        data: &[u8],
        cursor: &mut usize,
        clauses: &mut Vec<EhClause>,
    ) -> Result<()> {
        while data.len() > *cursor + 4 {
            let section_flags = SectionFlags::from_bits_truncate(read_le::<u8>(&data[*cursor..])?);
            if !section_flags.contains(SectionFlags::EHTABLE) {
                break;
            }

            if section_flags.contains(SectionFlags::FAT_FORMAT) {
                let section_size = read_le::<u32>(&data[*cursor + 1..])? & 0x00FF_FFFF;
                if section_size < 4 || data.len() < *cursor + section_size as usize {
                    break;
                }

                *cursor += 4;
                for _ in 0..(section_size - 4) / 24 {
                    clauses.push(EhClause::from_raw(
                        read_le_at::<u32>(data, cursor)?,
                        read_le_at::<u32>(data, cursor)?,
                        read_le_at::<u32>(data, cursor)?,
                        read_le_at::<u32>(data, cursor)?,
                        read_le_at::<u32>(data, cursor)?,
                        read_le_at::<u32>(data, cursor)?,
                    ));
                }
            } else {
                let section_size = u32::from(read_le::<u8>(&data[*cursor + 1..])?);
                if section_size < 4 || data.len() < *cursor + section_size as usize {
                    break;
                }

                *cursor += 4;
                for _ in 0..(section_size - 4) / 12 {
                    clauses.push(EhClause::from_raw(
                        u32::from(read_le_at::<u16>(data, cursor)?),
                        u32::from(read_le_at::<u16>(data, cursor)?),
                        u32::from(read_le_at::<u8>(data, cursor)?),
                        u32::from(read_le_at::<u16>(data, cursor)?),
                        u32::from(read_le_at::<u8>(data, cursor)?),
                        read_le_at::<u32>(data, cursor)?,
                    ));
                }
            }

            if !section_flags.contains(SectionFlags::MORE_SECTS) {
                break;
            }
        }

        Ok(())
    }

    /// Full size of the method: header plus code.
    #[must_use]
    pub fn size(&self) -> usize {
        self.size_code + self.size_header
    }
}

/// The owned, decoded body of one method, as handed out by the loader.
///
/// Methods without IL (native, abstract, runtime-provided) carry
/// `code == None` and an empty locals/EH complement; that state is not an
/// error. The two local-variable arrays are parallel and describe the
/// locals in declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MethodCode {
    /// Maximum number of items on the operand stack.
    pub max_stack: u32,
    /// The IL bytes, copied into an owned buffer; `None` when the method
    /// has no body.
    pub code: Option<Vec<u8>>,
    /// The exception-handling clauses.
    pub eh: EhTable,
    /// Base type per local variable.
    pub local_var_base_types: Vec<TypeRef>,
    /// Declarator string per local variable (parallel to the base types).
    pub local_var_declarators: Vec<String>,
}

impl MethodCode {
    /// The body of a method without IL.
    #[must_use]
    pub fn empty() -> MethodCode {
        MethodCode::default()
    }

    /// Whether this method has an IL body at all.
    #[must_use]
    pub fn is_il(&self) -> bool {
        self.code.is_some()
    }

    /// Length of the IL code in bytes; 0 when there is no body.
    #[must_use]
    pub fn code_size(&self) -> usize {
        self.code.as_ref().map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::method::{EhClauseKind, EhParam};
    use crate::metadata::token::Token;

    #[test]
    fn tiny() {
        // header 0x06: tiny, one byte of code; the code is `ret`
        let data = [0x06_u8, 0x2A];
        let body = MethodBody::parse(&data).unwrap();

        assert!(!body.is_fat);
        assert!(!body.is_init_locals);
        assert_eq!(body.size_code, 1);
        assert_eq!(body.size_header, 1);
        assert_eq!(body.size(), 2);
        assert_eq!(body.max_stack, 8);
        assert_eq!(body.local_var_sig_token, 0);
        assert!(body.eh.is_empty());
        assert_eq!(data[body.size_header..body.size()], [0x2A]);
    }

    #[test]
    fn tiny_truncated() {
        // header promises 5 bytes of code, buffer has 2
        assert!(MethodBody::parse(&[0x16, 0x00, 0x2A]).is_err());
    }

    #[test]
    fn fat() {
        #[rustfmt::skip]
        let data = [
            0x13, 0x30,             // fat, init locals, header size 12
            0x02, 0x00,             // max stack 2
            0x04, 0x00, 0x00, 0x00, // code size 4
            0x01, 0x00, 0x00, 0x11, // local var sig token 0x11000001
            0x00, 0x00, 0x00, 0x2A, // code
        ];

        let body = MethodBody::parse(&data).unwrap();

        assert!(body.is_fat);
        assert!(body.is_init_locals);
        assert_eq!(body.max_stack, 2);
        assert_eq!(body.size_code, 4);
        assert_eq!(body.size_header, 12);
        assert_eq!(body.size(), 16);
        assert_eq!(body.local_var_sig_token, 0x1100_0001);
        assert!(body.eh.is_empty());
    }

    #[test]
    fn fat_with_tiny_eh_section() {
        #[rustfmt::skip]
        let data = [
            0x1B, 0x30,             // fat, more sections, init locals
            0x01, 0x00,             // max stack 1
            0x08, 0x00, 0x00, 0x00, // code size 8
            0x00, 0x00, 0x00, 0x00, // no locals
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x2A, // code (8 bytes)
            // tiny EH section, one 12-byte clause
            0x01, 0x10, 0x00, 0x00, // EHTABLE, size 16, padding
            0x00, 0x00,             // flags: typed exception
            0x00, 0x00,             // try offset 0
            0x04,                   // try length 4
            0x04, 0x00,             // handler offset 4
            0x04,                   // handler length 4
            0x05, 0x00, 0x00, 0x01, // class token 0x01000005
        ];

        let body = MethodBody::parse(&data).unwrap();
        assert_eq!(body.eh.len(), 1);

        let clause = &body.eh.clauses[0];
        assert_eq!(clause.kind, EhClauseKind::TypeFiltered);
        assert_eq!(clause.try_offset, 0);
        assert_eq!(clause.try_length, 4);
        assert_eq!(clause.handler_offset, 4);
        assert_eq!(clause.handler_length, 4);
        assert_eq!(clause.param, EhParam::Class(Token::new(0x0100_0005)));

        // clause ranges stay inside the code
        assert!((clause.try_offset + clause.try_length) as usize <= body.size_code);
        assert!((clause.handler_offset + clause.handler_length) as usize <= body.size_code);
    }

    #[test]
    fn fat_with_fat_eh_section() {
        #[rustfmt::skip]
        let data = [
            0x1B, 0x30,             // fat, more sections, init locals
            0x02, 0x00,             // max stack 2
            0x0C, 0x00, 0x00, 0x00, // code size 12
            0x00, 0x00, 0x00, 0x00, // no locals
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x2A, // code (12 bytes)
            // fat EH section, two 24-byte clauses
            0x41, 0x34, 0x00, 0x00, // EHTABLE | FAT_FORMAT, size 52
            0x02, 0x00, 0x00, 0x00, // finally
            0x00, 0x00, 0x00, 0x00, // try offset 0
            0x08, 0x00, 0x00, 0x00, // try length 8
            0x08, 0x00, 0x00, 0x00, // handler offset 8
            0x04, 0x00, 0x00, 0x00, // handler length 4
            0x00, 0x00, 0x00, 0x00, // no param
            0x01, 0x00, 0x00, 0x00, // filter
            0x00, 0x00, 0x00, 0x00, // try offset 0
            0x04, 0x00, 0x00, 0x00, // try length 4
            0x04, 0x00, 0x00, 0x00, // handler offset 4
            0x04, 0x00, 0x00, 0x00, // handler length 4
            0x02, 0x00, 0x00, 0x00, // filter offset 2
        ];

        let body = MethodBody::parse(&data).unwrap();
        assert_eq!(body.eh.len(), 2);
        assert_eq!(body.eh.clauses[0].kind, EhClauseKind::Finally);
        assert_eq!(body.eh.clauses[0].param, EhParam::None);
        assert_eq!(body.eh.clauses[1].kind, EhClauseKind::UserFiltered);
        assert_eq!(body.eh.clauses[1].param, EhParam::FilterOffset(2));
    }

    #[test]
    fn invalid_format_bits() {
        assert!(MethodBody::parse(&[0x00]).is_err());
        assert!(MethodBody::parse(&[]).is_err());
    }

    #[test]
    fn method_code_states() {
        let absent = MethodCode::empty();
        assert!(!absent.is_il());
        assert_eq!(absent.code_size(), 0);

        let present = MethodCode {
            max_stack: 8,
            code: Some(vec![0x2A]),
            ..MethodCode::default()
        };
        assert!(present.is_il());
        assert_eq!(present.code_size(), 1);
    }
}
