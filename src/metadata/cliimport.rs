//! The shipped metadata backend: a pure-Rust reader of the physical CLI
//! metadata.
//!
//! [`CliImport`] opens a metadata scope over a shared [`PeImage`]: it walks
//! the Cor20 header to the metadata root, dimensions the `#~` stream, and
//! then serves every [`MetadataImport`] operation directly from the tables
//! and heaps. No platform metadata facility is involved.

use std::ops::Range;
use std::sync::Arc;

use log::debug;

use crate::{
    file::PeImage,
    metadata::{
        cor20::Cor20Header,
        import::{MdPair, MetadataImport, RawMemberRef, RawMethod, RawTypeDef, RawTypeSpec, RawTypeRef},
        streams::{BlobHeap, CodedIndex, Root, RowCursor, StringsHeap, TablesStream, UserStringsHeap},
        token::{
            Token, TABLE_ASSEMBLY_REF, TABLE_FIELD, TABLE_MEMBER_REF, TABLE_METHOD_DEF,
            TABLE_MODULE, TABLE_MODULE_REF, TABLE_NESTED_CLASS, TABLE_STANDALONE_SIG,
            TABLE_TYPE_DEF, TABLE_TYPE_REF, TABLE_TYPE_SPEC, TABLE_USER_STRING,
        },
    },
    Result,
};

/// Visibility values of the TypeDef flags nibble that mark nested types
/// (NestedPublic through NestedFamOrAssem).
const NESTED_VISIBILITY: std::ops::RangeInclusive<u32> = 2..=7;

/// A metadata scope opened over a loaded image.
///
/// Construction parses the headers and dimensions the tables once; row and
/// heap data is read on demand. The image is shared by `Arc` and stays
/// alive as long as the scope does.
pub struct CliImport {
    image: Arc<PeImage>,
    tables: TablesStream,
    tables_range: Range<usize>,
    strings_range: Option<Range<usize>>,
    blob_range: Option<Range<usize>>,
    us_range: Option<Range<usize>>,
}

impl CliImport {
    /// Open the metadata scope of `image`.
    ///
    /// # Errors
    /// Returns an error when the CLR header, metadata root, or tables
    /// stream is missing or malformed.
    pub fn open(image: Arc<PeImage>) -> Result<CliImport> {
        let (clr_rva, _) = image.clr();
        let clr_offset = image.rva_to_offset(clr_rva)?;
        let cor20 = Cor20Header::parse(image.data_slice(clr_offset, 72)?)?;

        let meta_offset = image.rva_to_offset(cor20.meta_data_rva)?;
        let meta = image.data_slice(meta_offset, cor20.meta_data_size as usize)?;
        let root = Root::parse(meta)?;

        let locate = |name: &str| -> Option<Range<usize>> {
            root.stream(name).map(|header| {
                meta_offset + header.offset as usize
                    ..meta_offset + (header.offset + header.size) as usize
            })
        };

        let Some(tables_range) = locate("#~").or_else(|| locate("#-")) else {
            return Err(malformed_error!("Metadata has no tables stream"));
        };

        let tables = TablesStream::parse(&image.data()[tables_range.clone()])?;

        debug!(
            "opened metadata scope: version '{}', {} streams, {} tables",
            root.version,
            root.stream_headers.len(),
            tables.valid.count_ones()
        );

        Ok(CliImport {
            strings_range: locate("#Strings"),
            blob_range: locate("#Blob"),
            us_range: locate("#US"),
            image,
            tables,
            tables_range,
        })
    }

    fn tables_data(&self) -> &[u8] {
        &self.image.data()[self.tables_range.clone()]
    }

    fn row(&self, table: u8, index: u32) -> Result<RowCursor<'_>> {
        self.tables.row(self.tables_data(), table, index)
    }

    fn str_at(&self, index: u32) -> Result<String> {
        let Some(range) = &self.strings_range else {
            return Err(crate::Error::Metadata("No #Strings heap".into()));
        };

        let heap = StringsHeap::parse(&self.image.data()[range.clone()])?;
        Ok(heap.get(index as usize)?.to_string())
    }

    /// Join namespace and name the way reflection renders them.
    fn qualified(&self, namespace: u32, name: u32) -> Result<String> {
        let name = self.str_at(name)?;
        if namespace == 0 {
            return Ok(name);
        }

        let namespace = self.str_at(namespace)?;
        if namespace.is_empty() {
            Ok(name)
        } else {
            Ok(format!("{namespace}.{name}"))
        }
    }

    fn blob_at(&self, index: u32) -> Result<Vec<u8>> {
        let Some(range) = &self.blob_range else {
            return Err(crate::Error::Metadata("No #Blob heap".into()));
        };

        let heap = BlobHeap::parse(&self.image.data()[range.clone()])?;
        Ok(heap.get(index as usize)?.to_vec())
    }

    /// Check that `token` names an existing row of `table`.
    fn expect_row(&self, token: Token, table: u8) -> Result<u32> {
        let row = token.row();
        if token.table() != table || row == 0 || row > self.tables.rows(table) {
            return Err(crate::Error::Metadata(format!(
                "Token {token} is not a valid row of table {table:#04x}"
            )));
        }
        Ok(row)
    }

    /// The FieldList and MethodList columns of TypeDef row `row`.
    fn typedef_lists(&self, row: u32) -> Result<(u32, u32)> {
        let mut cursor = self.row(TABLE_TYPE_DEF, row)?;
        cursor.u32()?; // flags
        cursor.str_index()?;
        cursor.str_index()?;
        cursor.coded_index(CodedIndex::TypeDefOrRef)?;

        Ok((
            cursor.table_index(TABLE_FIELD)?,
            cursor.table_index(TABLE_METHOD_DEF)?,
        ))
    }

    /// The FieldList/MethodList range of TypeDef row `row`: from its own
    /// list start up to the next row's (or the end of the member table).
    fn member_range(&self, row: u32, member_table: u8) -> Result<Range<u32>> {
        let pick = |(fields, methods): (u32, u32)| {
            if member_table == TABLE_FIELD {
                fields
            } else {
                methods
            }
        };

        let start = pick(self.typedef_lists(row)?);
        let end = if row < self.tables.rows(TABLE_TYPE_DEF) {
            pick(self.typedef_lists(row + 1)?)
        } else {
            self.tables.rows(member_table) + 1
        };

        Ok(start..end.max(start))
    }

    /// The enclosing class of TypeDef row `row`, through the NestedClass
    /// table; the null token when the type is not nested.
    fn enclosing_class(&self, row: u32) -> Result<Token> {
        for i in 1..=self.tables.rows(TABLE_NESTED_CLASS) {
            let mut cursor = self.row(TABLE_NESTED_CLASS, i)?;
            let nested = cursor.table_index(TABLE_TYPE_DEF)?;
            let enclosing = cursor.table_index(TABLE_TYPE_DEF)?;

            if nested == row {
                return Ok(Token::from_parts(TABLE_TYPE_DEF, enclosing));
            }
        }

        Ok(Token::new(0))
    }
}

/// Decode a coded index column, treating the all-zero value as the null
/// token rather than row 0 of the tag-0 table.
fn coded_token(group: CodedIndex, coded: u32) -> Result<Token> {
    if coded == 0 {
        Ok(Token::new(0))
    } else {
        group.token(coded)
    }
}

impl MetadataImport for CliImport {
    fn user_strings(&self) -> Result<Vec<MdPair>> {
        let Some(range) = &self.us_range else {
            return Ok(Vec::new());
        };

        let heap = UserStringsHeap::parse(&self.image.data()[range.clone()])?;
        Ok(heap
            .all()?
            .into_iter()
            .map(|(offset, name)| MdPair {
                token: Token::from_parts(TABLE_USER_STRING, offset),
                name,
                extra: 0,
            })
            .collect())
    }

    fn assembly_refs(&self) -> Result<Vec<MdPair>> {
        let mut refs = Vec::new();
        for i in 1..=self.tables.rows(TABLE_ASSEMBLY_REF) {
            let mut cursor = self.row(TABLE_ASSEMBLY_REF, i)?;
            cursor.u16()?; // major
            cursor.u16()?; // minor
            cursor.u16()?; // build
            cursor.u16()?; // revision
            cursor.u32()?; // flags
            cursor.blob_index()?; // public key or token
            let name = cursor.str_index()?;

            refs.push(MdPair {
                token: Token::from_parts(TABLE_ASSEMBLY_REF, i),
                name: self.str_at(name)?,
                extra: 0,
            });
        }
        Ok(refs)
    }

    fn module_token(&self) -> Result<Token> {
        if self.tables.rows(TABLE_MODULE) == 0 {
            return Err(crate::Error::Metadata("Scope has no Module row".into()));
        }
        Ok(Token::from_parts(TABLE_MODULE, 1))
    }

    fn module_refs(&self) -> Result<Vec<MdPair>> {
        let mut refs = Vec::new();
        for i in 1..=self.tables.rows(TABLE_MODULE_REF) {
            let mut cursor = self.row(TABLE_MODULE_REF, i)?;
            let name = cursor.str_index()?;

            refs.push(MdPair {
                token: Token::from_parts(TABLE_MODULE_REF, i),
                name: self.str_at(name)?,
                extra: 0,
            });
        }
        Ok(refs)
    }

    fn type_defs(&self) -> Result<Vec<RawTypeDef>> {
        let mut defs = Vec::new();
        // row 1 is the <Module> pseudo-type, which enumeration skips
        for i in 2..=self.tables.rows(TABLE_TYPE_DEF) {
            let mut cursor = self.row(TABLE_TYPE_DEF, i)?;
            let flags = cursor.u32()?;
            let name = cursor.str_index()?;
            let namespace = cursor.str_index()?;
            let extends = cursor.coded_index(CodedIndex::TypeDefOrRef)?;

            let enclosing = if NESTED_VISIBILITY.contains(&(flags & 0x7)) {
                self.enclosing_class(i)?
            } else {
                Token::new(0)
            };

            defs.push(RawTypeDef {
                token: Token::from_parts(TABLE_TYPE_DEF, i),
                name: self.qualified(namespace, name)?,
                flags,
                extends: coded_token(CodedIndex::TypeDefOrRef, extends)?,
                enclosing,
            });
        }
        Ok(defs)
    }

    fn type_refs(&self) -> Result<Vec<RawTypeRef>> {
        let mut refs = Vec::new();
        for i in 1..=self.tables.rows(TABLE_TYPE_REF) {
            let mut cursor = self.row(TABLE_TYPE_REF, i)?;
            let scope = cursor.coded_index(CodedIndex::ResolutionScope)?;
            let name = cursor.str_index()?;
            let namespace = cursor.str_index()?;

            refs.push(RawTypeRef {
                token: Token::from_parts(TABLE_TYPE_REF, i),
                name: self.qualified(namespace, name)?,
                scope: coded_token(CodedIndex::ResolutionScope, scope)?,
            });
        }
        Ok(refs)
    }

    fn methods(&self, class: Token) -> Result<Vec<Token>> {
        let row = self.expect_row(class, TABLE_TYPE_DEF)?;
        Ok(self
            .member_range(row, TABLE_METHOD_DEF)?
            .map(|i| Token::from_parts(TABLE_METHOD_DEF, i))
            .collect())
    }

    fn method_props(&self, method: Token) -> Result<RawMethod> {
        let row = self.expect_row(method, TABLE_METHOD_DEF)?;
        let mut cursor = self.row(TABLE_METHOD_DEF, row)?;

        let rva = cursor.u32()?;
        cursor.u16()?; // impl flags
        cursor.u16()?; // flags
        let name = cursor.str_index()?;
        let signature = cursor.blob_index()?;

        Ok(RawMethod {
            name: self.str_at(name)?,
            rva,
            signature: self.blob_at(signature)?,
        })
    }

    fn fields(&self, class: Token) -> Result<Vec<MdPair>> {
        let row = self.expect_row(class, TABLE_TYPE_DEF)?;

        let mut fields = Vec::new();
        for i in self.member_range(row, TABLE_FIELD)? {
            let mut cursor = self.row(TABLE_FIELD, i)?;
            cursor.u16()?; // flags
            let name = self.str_at(cursor.str_index()?)?;
            let name_length = name.encode_utf16().count() as i64;

            fields.push(MdPair {
                token: Token::from_parts(TABLE_FIELD, i),
                name,
                extra: name_length,
            });
        }
        Ok(fields)
    }

    fn member_refs(&self, class: Token) -> Result<Vec<RawMemberRef>> {
        let mut refs = Vec::new();
        for i in 1..=self.tables.rows(TABLE_MEMBER_REF) {
            let mut cursor = self.row(TABLE_MEMBER_REF, i)?;
            let parent = cursor.coded_index(CodedIndex::MemberRefParent)?;
            if coded_token(CodedIndex::MemberRefParent, parent)? != class {
                continue;
            }

            let name = cursor.str_index()?;
            let signature = cursor.blob_index()?;

            refs.push(RawMemberRef {
                token: Token::from_parts(TABLE_MEMBER_REF, i),
                name: self.str_at(name)?,
                signature: self.blob_at(signature)?,
            });
        }
        Ok(refs)
    }

    fn type_specs(&self) -> Result<Vec<RawTypeSpec>> {
        let mut specs = Vec::new();
        for i in 1..=self.tables.rows(TABLE_TYPE_SPEC) {
            let mut cursor = self.row(TABLE_TYPE_SPEC, i)?;
            let signature = cursor.blob_index()?;

            specs.push(RawTypeSpec {
                token: Token::from_parts(TABLE_TYPE_SPEC, i),
                signature: self.blob_at(signature)?,
            });
        }
        Ok(specs)
    }

    fn signature_of(&self, token: Token) -> Result<Vec<u8>> {
        let row = self.expect_row(token, token.table())?;
        let mut cursor = self.row(token.table(), row)?;

        let blob_index = match token.table() {
            TABLE_STANDALONE_SIG | TABLE_TYPE_SPEC => cursor.blob_index()?,
            TABLE_METHOD_DEF => {
                cursor.u32()?; // rva
                cursor.u16()?; // impl flags
                cursor.u16()?; // flags
                cursor.str_index()?;
                cursor.blob_index()?
            }
            TABLE_FIELD => {
                cursor.u16()?; // flags
                cursor.str_index()?;
                cursor.blob_index()?
            }
            TABLE_MEMBER_REF => {
                cursor.coded_index(CodedIndex::MemberRefParent)?;
                cursor.str_index()?;
                cursor.blob_index()?
            }
            table => {
                return Err(crate::Error::Metadata(format!(
                    "Table {table:#04x} carries no signatures"
                )))
            }
        };

        self.blob_at(blob_index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::build_assembly;

    fn open_scope() -> CliImport {
        let image = Arc::new(PeImage::from_mem(build_assembly()).unwrap());
        CliImport::open(image).unwrap()
    }

    #[test]
    fn module_and_refs() {
        let import = open_scope();

        assert_eq!(import.module_token().unwrap(), Token::new(0x0000_0001));

        let module_refs = import.module_refs().unwrap();
        assert_eq!(module_refs.len(), 1);
        assert_eq!(module_refs[0].token, Token::new(0x1A00_0001));
        assert_eq!(module_refs[0].name, "native");

        let assembly_refs = import.assembly_refs().unwrap();
        assert_eq!(assembly_refs.len(), 1);
        assert_eq!(assembly_refs[0].token, Token::new(0x2300_0001));
        assert_eq!(assembly_refs[0].name, "mscorlib");
    }

    #[test]
    fn type_defs_skip_module_pseudo_type() {
        let import = open_scope();
        let defs = import.type_defs().unwrap();

        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].token, Token::new(0x0200_0002));
        assert_eq!(defs[0].name, "Demo.Widget");
        assert_eq!(defs[0].extends, Token::new(0x0100_0001));
        assert!(defs[0].enclosing.is_null());

        // every returned token carries the TypeDef table tag
        assert!(defs.iter().all(|def| def.token.table() == TABLE_TYPE_DEF));
    }

    #[test]
    fn type_refs_carry_scope() {
        let import = open_scope();
        let refs = import.type_refs().unwrap();

        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].token, Token::new(0x0100_0001));
        assert_eq!(refs[0].name, "System.Object");
        assert_eq!(refs[0].scope, Token::new(0x2300_0001));
    }

    #[test]
    fn methods_and_props() {
        let import = open_scope();

        let methods = import.methods(Token::new(0x0200_0002)).unwrap();
        assert_eq!(methods, vec![Token::new(0x0600_0001)]);

        // the <Module> pseudo-type exists but has no members
        assert!(import.methods(Token::new(0x0200_0001)).unwrap().is_empty());

        let props = import.method_props(Token::new(0x0600_0001)).unwrap();
        assert_eq!(props.name, "Run");
        assert_eq!(props.rva, 0x1000);
        assert_eq!(props.signature, vec![0x20, 0x00, 0x01]);

        assert!(import.methods(Token::new(0x0200_0009)).is_err());
        assert!(import.method_props(Token::new(0x0600_0002)).is_err());
    }

    #[test]
    fn fields_carry_name_length() {
        let import = open_scope();
        let fields = import.fields(Token::new(0x0200_0002)).unwrap();

        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].token, Token::new(0x0400_0001));
        assert_eq!(fields[0].name, "count");
        assert_eq!(fields[0].extra, 5);
    }

    #[test]
    fn member_refs_filter_by_class() {
        let import = open_scope();

        let refs = import.member_refs(Token::new(0x0100_0001)).unwrap();
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].name, ".ctor");
        assert_eq!(refs[0].signature, vec![0x20, 0x00, 0x01]);
        assert_eq!(refs[1].name, "count");
        assert_eq!(refs[1].signature, vec![0x06, 0x08]);

        // no member refs hang off the type def
        assert!(import
            .member_refs(Token::new(0x0200_0002))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn type_specs_and_signatures() {
        let import = open_scope();

        let specs = import.type_specs().unwrap();
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].token, Token::new(0x1B00_0001));
        assert_eq!(specs[0].signature, vec![0x1D, 0x08]);

        // standalone local variable signature
        assert_eq!(
            import.signature_of(Token::new(0x1100_0001)).unwrap(),
            vec![0x07, 0x01, 0x08]
        );
        // any signature-bearing token works
        assert_eq!(
            import.signature_of(Token::new(0x0600_0001)).unwrap(),
            vec![0x20, 0x00, 0x01]
        );
        assert_eq!(
            import.signature_of(Token::new(0x0400_0001)).unwrap(),
            vec![0x06, 0x08]
        );
        // module tokens carry none
        assert!(import.signature_of(Token::new(0x0000_0001)).is_err());
    }

    #[test]
    fn user_strings() {
        let import = open_scope();
        let strings = import.user_strings().unwrap();

        assert_eq!(strings.len(), 1);
        assert_eq!(strings[0].token, Token::new(0x7000_0001));
        assert_eq!(strings[0].name, "hi");
    }
}
