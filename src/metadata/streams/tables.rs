use crate::{
    file::io::{read_le, read_le_at},
    metadata::token::Token,
    Error::{NotSupported, OutOfBounds},
    Result,
};

/// Number of table slots the ECMA-335 table stream defines, Module (0x00)
/// through GenericParamConstraint (0x2C).
pub const TABLE_COUNT: usize = 0x2D;

/// The coded-index groups of ECMA-335 II.24.2.6. Each group packs a table
/// tag into the low bits of a row index; its byte width depends on the
/// largest tagged table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum CodedIndex {
    TypeDefOrRef,
    HasConstant,
    HasCustomAttribute,
    HasFieldMarshal,
    HasDeclSecurity,
    MemberRefParent,
    HasSemantics,
    MethodDefOrRef,
    MemberForwarded,
    Implementation,
    CustomAttributeType,
    ResolutionScope,
    TypeOrMethodDef,
}

/// Marks a tag slot no table is assigned to.
const NO_TABLE: u8 = 0xFF;

impl CodedIndex {
    /// Number of tag bits this group occupies.
    #[must_use]
    pub fn tag_bits(self) -> u32 {
        match self {
            CodedIndex::HasCustomAttribute => 5,
            CodedIndex::MemberRefParent | CodedIndex::CustomAttributeType => 3,
            CodedIndex::TypeDefOrRef
            | CodedIndex::HasConstant
            | CodedIndex::HasDeclSecurity
            | CodedIndex::Implementation
            | CodedIndex::ResolutionScope => 2,
            CodedIndex::HasFieldMarshal
            | CodedIndex::HasSemantics
            | CodedIndex::MethodDefOrRef
            | CodedIndex::MemberForwarded
            | CodedIndex::TypeOrMethodDef => 1,
        }
    }

    /// The table id per tag value; `NO_TABLE` slots are invalid tags.
    fn tables(self) -> &'static [u8] {
        match self {
            CodedIndex::TypeDefOrRef => &[0x02, 0x01, 0x1B],
            CodedIndex::HasConstant => &[0x04, 0x08, 0x17],
            CodedIndex::HasCustomAttribute => &[
                0x06, 0x04, 0x01, 0x02, 0x08, 0x09, 0x0A, 0x00, 0x0E, 0x17, 0x14, 0x11, 0x1A,
                0x1B, 0x20, 0x23, 0x26, 0x27, 0x28, 0x2A, 0x2C, 0x2B,
            ],
            CodedIndex::HasFieldMarshal => &[0x04, 0x08],
            CodedIndex::HasDeclSecurity => &[0x02, 0x06, 0x20],
            CodedIndex::MemberRefParent => &[0x02, 0x01, 0x1A, 0x06, 0x1B],
            CodedIndex::HasSemantics => &[0x14, 0x17],
            CodedIndex::MethodDefOrRef => &[0x06, 0x0A],
            CodedIndex::MemberForwarded => &[0x04, 0x06],
            CodedIndex::Implementation => &[0x26, 0x23, 0x27],
            CodedIndex::CustomAttributeType => &[NO_TABLE, NO_TABLE, 0x06, 0x0A, NO_TABLE],
            CodedIndex::ResolutionScope => &[0x00, 0x1A, 0x23, 0x01],
            CodedIndex::TypeOrMethodDef => &[0x02, 0x06],
        }
    }

    /// Decode a coded value into a full metadata token.
    ///
    /// # Errors
    /// Returns an error for a tag value the group does not define.
    pub fn token(self, coded: u32) -> Result<Token> {
        let tag = (coded & ((1 << self.tag_bits()) - 1)) as usize;
        let row = coded >> self.tag_bits();

        match self.tables().get(tag) {
            Some(&table) if table != NO_TABLE => Ok(Token::from_parts(table, row)),
            _ => Err(malformed_error!(
                "Invalid coded index tag {} for {:?}",
                tag,
                self
            )),
        }
    }
}

/// The dimensioned `#~` stream: row counts, index widths, and per-table
/// offsets, giving row-level access to the physical tables.
///
/// Column layouts are not materialized; a [`RowCursor`] walks the columns
/// of one row on demand with the index widths recorded here.
pub struct TablesStream {
    /// Major version of the table schema, shall be 2.
    pub major_version: u8,
    /// Minor version of the table schema, shall be 0.
    pub minor_version: u8,
    /// Bit vector of present tables.
    pub valid: u64,
    /// Bit vector of sorted tables.
    pub sorted: u64,
    wide_strings: bool,
    wide_guids: bool,
    wide_blobs: bool,
    rows: [u32; TABLE_COUNT],
    offsets: [usize; TABLE_COUNT],
    row_sizes: [u32; TABLE_COUNT],
}

impl TablesStream {
    /// Dimension the tables stream from its raw bytes.
    ///
    /// # Errors
    /// Returns an error on truncation, or [`NotSupported`] when the valid
    /// mask names tables beyond GenericParamConstraint (portable PDB
    /// tables), whose unknown row sizes would corrupt every later offset.
    pub fn parse(data: &[u8]) -> Result<TablesStream> {
        if data.len() < 24 {
            return Err(OutOfBounds);
        }

        let major_version = read_le::<u8>(&data[4..])?;
        let minor_version = read_le::<u8>(&data[5..])?;
        let heap_sizes = read_le::<u8>(&data[6..])?;
        let valid = read_le::<u64>(&data[8..])?;
        let sorted = read_le::<u64>(&data[16..])?;

        if valid >> TABLE_COUNT != 0 {
            return Err(NotSupported);
        }
        if valid == 0 {
            return Err(malformed_error!("No valid rows in any of the tables"));
        }

        let mut rows = [0_u32; TABLE_COUNT];
        let mut offset = 24_usize;
        for (table, count) in rows.iter_mut().enumerate() {
            if valid & (1 << table) != 0 {
                *count = read_le_at::<u32>(data, &mut offset)?;
            }
        }

        let mut stream = TablesStream {
            major_version,
            minor_version,
            valid,
            sorted,
            wide_strings: heap_sizes & 0x01 != 0,
            wide_guids: heap_sizes & 0x02 != 0,
            wide_blobs: heap_sizes & 0x04 != 0,
            rows,
            offsets: [0; TABLE_COUNT],
            row_sizes: [0; TABLE_COUNT],
        };

        for table in 0..TABLE_COUNT {
            stream.row_sizes[table] = stream.row_size(table as u8);
            stream.offsets[table] = offset;
            offset += stream.rows[table] as usize * stream.row_sizes[table] as usize;
        }

        if offset > data.len() {
            return Err(OutOfBounds);
        }

        Ok(stream)
    }

    /// Number of rows in `table`.
    #[must_use]
    pub fn rows(&self, table: u8) -> u32 {
        self.rows.get(table as usize).copied().unwrap_or(0)
    }

    /// Width in bytes of a `#Strings` index column.
    #[must_use]
    pub fn str_index_size(&self) -> usize {
        if self.wide_strings {
            4
        } else {
            2
        }
    }

    /// Width in bytes of a `#GUID` index column.
    #[must_use]
    pub fn guid_index_size(&self) -> usize {
        if self.wide_guids {
            4
        } else {
            2
        }
    }

    /// Width in bytes of a `#Blob` index column.
    #[must_use]
    pub fn blob_index_size(&self) -> usize {
        if self.wide_blobs {
            4
        } else {
            2
        }
    }

    /// Width in bytes of a plain index into `table`.
    #[must_use]
    pub fn table_index_size(&self, table: u8) -> usize {
        if self.rows(table) > 0xFFFF {
            4
        } else {
            2
        }
    }

    /// Width in bytes of a coded index of `group`.
    #[must_use]
    pub fn coded_index_size(&self, group: CodedIndex) -> usize {
        let max_rows = group
            .tables()
            .iter()
            .filter(|&&table| table != NO_TABLE)
            .map(|&table| self.rows(table))
            .max()
            .unwrap_or(0);

        if max_rows < (1 << (16 - group.tag_bits())) {
            2
        } else {
            4
        }
    }

    /// Position a cursor on row `index` (1-based) of `table`, within
    /// `data`, which must be the same slice the stream was parsed from.
    ///
    /// # Errors
    /// Returns an error if the row does not exist.
    pub fn row<'a>(&'a self, data: &'a [u8], table: u8, index: u32) -> Result<RowCursor<'a>> {
        let count = self.rows(table);
        if index == 0 || index > count {
            return Err(malformed_error!(
                "Row {} is outside table {:#04x} ({} rows)",
                index,
                table,
                count
            ));
        }

        let size = self.row_sizes[table as usize] as usize;
        let start = self.offsets[table as usize] + (index - 1) as usize * size;
        if start + size > data.len() {
            return Err(OutOfBounds);
        }

        Ok(RowCursor {
            data,
            pos: start,
            tables: self,
        })
    }

    /// Size in bytes of one row of `table` under the current index widths
    /// (ECMA-335 II.22 column layouts).
    fn row_size(&self, table: u8) -> u32 {
        let s = self.str_index_size() as u32;
        let g = self.guid_index_size() as u32;
        let b = self.blob_index_size() as u32;
        let idx = |t: u8| self.table_index_size(t) as u32;
        let coded = |c: CodedIndex| self.coded_index_size(c) as u32;

        match table {
            0x00 => 2 + s + 3 * g,                                    // Module
            0x01 => coded(CodedIndex::ResolutionScope) + 2 * s,       // TypeRef
            0x02 => 4 + 2 * s + coded(CodedIndex::TypeDefOrRef) + idx(0x04) + idx(0x06),
            0x03 => idx(0x04),                                        // FieldPtr
            0x04 => 2 + s + b,                                        // Field
            0x05 => idx(0x06),                                        // MethodPtr
            0x06 => 8 + s + b + idx(0x08),                            // MethodDef
            0x07 => idx(0x08),                                        // ParamPtr
            0x08 => 4 + s,                                            // Param
            0x09 => idx(0x02) + coded(CodedIndex::TypeDefOrRef),      // InterfaceImpl
            0x0A => coded(CodedIndex::MemberRefParent) + s + b,       // MemberRef
            0x0B => 2 + coded(CodedIndex::HasConstant) + b,           // Constant
            0x0C => {
                coded(CodedIndex::HasCustomAttribute) + coded(CodedIndex::CustomAttributeType) + b
            }
            0x0D => coded(CodedIndex::HasFieldMarshal) + b,           // FieldMarshal
            0x0E => 2 + coded(CodedIndex::HasDeclSecurity) + b,       // DeclSecurity
            0x0F => 6 + idx(0x02),                                    // ClassLayout
            0x10 => 4 + idx(0x04),                                    // FieldLayout
            0x11 => b,                                                // StandAloneSig
            0x12 => idx(0x02) + idx(0x14),                            // EventMap
            0x13 => idx(0x14),                                        // EventPtr
            0x14 => 2 + s + coded(CodedIndex::TypeDefOrRef),          // Event
            0x15 => idx(0x02) + idx(0x17),                            // PropertyMap
            0x16 => idx(0x17),                                        // PropertyPtr
            0x17 => 2 + s + b,                                        // Property
            0x18 => 2 + idx(0x06) + coded(CodedIndex::HasSemantics),  // MethodSemantics
            0x19 => idx(0x02) + 2 * coded(CodedIndex::MethodDefOrRef), // MethodImpl
            0x1A => s,                                                // ModuleRef
            0x1B => b,                                                // TypeSpec
            0x1C => 2 + coded(CodedIndex::MemberForwarded) + s + idx(0x1A), // ImplMap
            0x1D => 4 + idx(0x04),                                    // FieldRVA
            0x1E => 8,                                                // EncLog
            0x1F => 4,                                                // EncMap
            0x20 => 16 + b + 2 * s,                                   // Assembly
            0x21 => 4,                                                // AssemblyProcessor
            0x22 => 12,                                               // AssemblyOS
            0x23 => 12 + 2 * b + 2 * s,                               // AssemblyRef
            0x24 => 4 + idx(0x23),                                    // AssemblyRefProcessor
            0x25 => 12 + idx(0x23),                                   // AssemblyRefOS
            0x26 => 4 + s + b,                                        // File
            0x27 => 8 + 2 * s + coded(CodedIndex::Implementation),    // ExportedType
            0x28 => 8 + s + coded(CodedIndex::Implementation),        // ManifestResource
            0x29 => 2 * idx(0x02),                                    // NestedClass
            0x2A => 4 + coded(CodedIndex::TypeOrMethodDef) + s,       // GenericParam
            0x2B => coded(CodedIndex::MethodDefOrRef) + b,            // MethodSpec
            _ => idx(0x2A) + coded(CodedIndex::TypeDefOrRef),         // GenericParamConstraint
        }
    }
}

/// A cursor over the columns of one table row.
///
/// Column reads advance left to right; the caller must consume columns in
/// the order the table layout defines them.
pub struct RowCursor<'a> {
    data: &'a [u8],
    pos: usize,
    tables: &'a TablesStream,
}

impl RowCursor<'_> {
    /// Read a fixed 16-bit column.
    ///
    /// # Errors
    /// Returns an error past the end of the stream.
    pub fn u16(&mut self) -> Result<u32> {
        Ok(u32::from(read_le_at::<u16>(self.data, &mut self.pos)?))
    }

    /// Read a fixed 32-bit column.
    ///
    /// # Errors
    /// Returns an error past the end of the stream.
    pub fn u32(&mut self) -> Result<u32> {
        read_le_at::<u32>(self.data, &mut self.pos)
    }

    fn index(&mut self, wide: bool) -> Result<u32> {
        if wide {
            read_le_at::<u32>(self.data, &mut self.pos)
        } else {
            Ok(u32::from(read_le_at::<u16>(self.data, &mut self.pos)?))
        }
    }

    /// Read a `#Strings` heap index column.
    ///
    /// # Errors
    /// Returns an error past the end of the stream.
    pub fn str_index(&mut self) -> Result<u32> {
        self.index(self.tables.wide_strings)
    }

    /// Read a `#GUID` heap index column.
    ///
    /// # Errors
    /// Returns an error past the end of the stream.
    pub fn guid_index(&mut self) -> Result<u32> {
        self.index(self.tables.wide_guids)
    }

    /// Read a `#Blob` heap index column.
    ///
    /// # Errors
    /// Returns an error past the end of the stream.
    pub fn blob_index(&mut self) -> Result<u32> {
        self.index(self.tables.wide_blobs)
    }

    /// Read a plain index column into `table`.
    ///
    /// # Errors
    /// Returns an error past the end of the stream.
    pub fn table_index(&mut self, table: u8) -> Result<u32> {
        self.index(self.tables.table_index_size(table) == 4)
    }

    /// Read a coded index column of `group`, returning the raw coded value.
    ///
    /// # Errors
    /// Returns an error past the end of the stream.
    pub fn coded_index(&mut self, group: CodedIndex) -> Result<u32> {
        self.index(self.tables.coded_index_size(group) == 4)
    }
}
