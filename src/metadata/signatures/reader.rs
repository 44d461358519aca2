use crate::{
    file::parser::Parser,
    metadata::{
        token::Token,
        typesystem::{call_conv, element_type, TypeRef},
    },
    Error::RecursionLimit,
    Result,
};

/// Maximum nesting depth accepted while parsing a single type.
const MAX_RECURSION_DEPTH: usize = 50;

/// A stateful cursor over a borrowed signature byte slice.
///
/// Wraps the compressed-integer codec with the operations signature
/// decoding needs: a rewinding [`SignatureReader::match_tag`], custom
/// modifier skipping, and the recursive [`SignatureReader::parse_type`]
/// descent that accumulates declarator text alongside the semantic type.
///
/// A reader instance is single-use: create one per signature blob.
///
/// # Example
///
/// ```
/// use cilload::metadata::signatures::SignatureReader;
/// use cilload::TypeRef;
///
/// // SZARRAY of STRING
/// let mut reader = SignatureReader::new(&[0x1D, 0x0E]);
/// let mut decls = String::new();
/// let base = reader.parse_type(&mut decls)?;
/// assert_eq!(base, TypeRef::String);
/// assert_eq!(decls, "[]");
/// # Ok::<(), cilload::Error>(())
/// ```
pub struct SignatureReader<'a> {
    parser: Parser<'a>,
    depth: usize,
}

impl<'a> SignatureReader<'a> {
    /// Create a reader over a signature blob.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        SignatureReader {
            parser: Parser::new(data),
            depth: 0,
        }
    }

    /// Read one compressed unsigned integer.
    ///
    /// # Errors
    /// Returns an error on truncated or invalid compression.
    pub fn read_unsigned(&mut self) -> Result<u32> {
        self.parser.read_compressed_uint()
    }

    /// Read one compressed signed integer.
    ///
    /// # Errors
    /// Returns an error on truncated or invalid compression.
    pub fn read_signed(&mut self) -> Result<i32> {
        self.parser.read_compressed_int()
    }

    /// Read one compressed metadata token.
    ///
    /// # Errors
    /// Returns an error on truncated or invalid compression.
    pub fn read_token(&mut self) -> Result<Token> {
        self.parser.read_compressed_token()
    }

    /// Returns true if at least one more byte can be read.
    #[must_use]
    pub fn has_more_data(&self) -> bool {
        self.parser.has_more_data()
    }

    /// Consume the next compressed unsigned if it equals `tag`.
    ///
    /// Advances only on a match; otherwise the cursor rewinds to where it
    /// was, including when the data ends here.
    pub fn match_tag(&mut self, tag: u32) -> bool {
        let marker = self.parser.pos();

        match self.parser.read_compressed_uint() {
            Ok(value) if value == tag => true,
            _ => {
                // the marker position is always valid to seek back to
                let _ = self.parser.seek(marker);
                false
            }
        }
    }

    /// Skip any run of custom modifiers (`CMOD_OPT` / `CMOD_REQD` followed
    /// by a token). The modifiers are discarded.
    ///
    /// # Errors
    /// Returns an error if a modifier tag is not followed by a valid token.
    pub fn skip_custom_mods(&mut self) -> Result<()> {
        loop {
            let matched = self.match_tag(element_type::CMOD_OPT)
                || self.match_tag(element_type::CMOD_REQD);

            if !matched {
                return Ok(());
            }

            self.read_token()?;
        }
    }

    /// Parse one type from the signature, appending its declarator
    /// decorations (array rank markers, `[]`) to `decls` in the order the
    /// grammar produces them.
    ///
    /// Class and valuetype references come back as [`TypeRef::Token`],
    /// unresolved. Array size and lower-bound lists are not consumed; the
    /// rank is read as `signed + 1`.
    ///
    /// # Errors
    /// Returns an error for `FNPTR`, unknown element tags, truncated data,
    /// or overly deep nesting.
    pub fn parse_type(&mut self, decls: &mut String) -> Result<TypeRef> {
        self.depth += 1;
        if self.depth >= MAX_RECURSION_DEPTH {
            return Err(RecursionLimit(MAX_RECURSION_DEPTH));
        }

        let result = self.parse_type_inner(decls);
        self.depth -= 1;
        result
    }

    fn parse_type_inner(&mut self, decls: &mut String) -> Result<TypeRef> {
        let tag = self.read_unsigned()?;
        match tag {
            element_type::BOOLEAN => Ok(TypeRef::Boolean),
            element_type::CHAR => Ok(TypeRef::Char),
            element_type::I1 => Ok(TypeRef::I1),
            element_type::U1 => Ok(TypeRef::U1),
            element_type::I2 => Ok(TypeRef::I2),
            element_type::U2 => Ok(TypeRef::U2),
            element_type::I4 => Ok(TypeRef::I4),
            element_type::U4 => Ok(TypeRef::U4),
            element_type::I8 => Ok(TypeRef::I8),
            element_type::U8 => Ok(TypeRef::U8),
            element_type::R4 => Ok(TypeRef::R4),
            element_type::R8 => Ok(TypeRef::R8),
            element_type::I => Ok(TypeRef::I),
            element_type::U => Ok(TypeRef::U),
            element_type::STRING => Ok(TypeRef::String),
            element_type::OBJECT => Ok(TypeRef::Object),
            element_type::TYPEDBYREF => Ok(TypeRef::TypedReference),
            element_type::VALUETYPE | element_type::CLASS => {
                Ok(TypeRef::Token(self.read_token()?))
            }
            element_type::PTR => {
                self.skip_custom_mods()?;
                if self.match_tag(element_type::VOID) {
                    Ok(TypeRef::Pointer(None))
                } else {
                    Ok(TypeRef::Pointer(Some(Box::new(self.parse_type(decls)?))))
                }
            }
            element_type::FNPTR => {
                Err(malformed_error!("FNPTR element type is not supported"))
            }
            element_type::ARRAY => {
                let element = self.parse_type(decls)?;
                let rank = self.read_signed()? + 1;

                decls.push('[');
                for _ in 1..rank {
                    decls.push(',');
                }
                decls.push(']');

                Ok(element)
            }
            element_type::SZARRAY => {
                decls.push_str("[]");
                self.parse_type(decls)
            }
            _ => Err(malformed_error!("Unsupported element type - {}", tag)),
        }
    }

    /// Parse a local-variable signature: the `LOCAL_SIG` header byte, the
    /// local count, and one entry per local (optional `PINNED`, accepted
    /// and dropped; optional `BYREF`, appending `&`).
    ///
    /// Returns parallel base-type and declarator arrays in declaration
    /// order.
    ///
    /// # Errors
    /// Returns an error if the blob does not start with `LOCAL_SIG` or a
    /// local's type cannot be parsed.
    pub fn parse_locals(&mut self) -> Result<(Vec<TypeRef>, Vec<String>)> {
        let header = self.read_unsigned()?;
        if header != call_conv::LOCAL_SIG {
            return Err(malformed_error!(
                "Local variable signature has calling convention {} instead of LOCAL_SIG",
                header
            ));
        }

        let count = self.read_unsigned()? as usize;
        let mut base_types = Vec::with_capacity(count);
        let mut declarators = Vec::with_capacity(count);

        for _ in 0..count {
            let _is_pinned = self.match_tag(element_type::PINNED);
            let is_byref = self.match_tag(element_type::BYREF);

            let mut decls = String::new();
            let base = self.parse_type(&mut decls)?;
            if is_byref {
                decls.push('&');
            }

            base_types.push(base);
            declarators.push(decls);
        }

        Ok((base_types, declarators))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_one(data: &[u8]) -> (TypeRef, String) {
        let mut reader = SignatureReader::new(data);
        let mut decls = String::new();
        let base = reader.parse_type(&mut decls).unwrap();
        (base, decls)
    }

    #[test]
    fn primitives() {
        let cases: &[(&[u8], TypeRef)] = &[
            (&[0x02], TypeRef::Boolean),
            (&[0x03], TypeRef::Char),
            (&[0x04], TypeRef::I1),
            (&[0x05], TypeRef::U1),
            (&[0x06], TypeRef::I2),
            (&[0x07], TypeRef::U2),
            (&[0x08], TypeRef::I4),
            (&[0x09], TypeRef::U4),
            (&[0x0A], TypeRef::I8),
            (&[0x0B], TypeRef::U8),
            (&[0x0C], TypeRef::R4),
            (&[0x0D], TypeRef::R8),
            (&[0x0E], TypeRef::String),
            (&[0x18], TypeRef::I),
            (&[0x19], TypeRef::U),
            (&[0x1C], TypeRef::Object),
            (&[0x16], TypeRef::TypedReference),
        ];

        for (bytes, expected) in cases {
            let (base, decls) = parse_one(bytes);
            assert_eq!(&base, expected);
            assert!(decls.is_empty());
        }
    }

    #[test]
    fn class_and_valuetype_stay_tokens() {
        // CLASS, compressed token tag 2 = TypeSpec
        let (base, _) = parse_one(&[0x12, 0x42]);
        assert_eq!(base, TypeRef::Token(Token::new(0x1B00_0010)));

        // VALUETYPE, compressed token tag 1 = TypeRef
        let (base, _) = parse_one(&[0x11, 0x35]);
        assert_eq!(base, TypeRef::Token(Token::new(0x0100_000D)));
    }

    #[test]
    fn szarray_appends_and_recurses() {
        let (base, decls) = parse_one(&[0x1D, 0x08]);
        assert_eq!(base, TypeRef::I4);
        assert_eq!(decls, "[]");

        // jagged: string[][]
        let (base, decls) = parse_one(&[0x1D, 0x1D, 0x0E]);
        assert_eq!(base, TypeRef::String);
        assert_eq!(decls, "[][]");
    }

    #[test]
    fn array_rank_markers() {
        // ARRAY of I4; the stored rank byte decodes through the signed
        // codec, so 0x02 comes out as rank 2
        let (base, decls) = parse_one(&[0x14, 0x08, 0x02]);
        assert_eq!(base, TypeRef::I4);
        assert_eq!(decls, "[,]");

        // rank byte 0x04 decodes to signed 2, rank 3
        let (base, decls) = parse_one(&[0x14, 0x08, 0x04]);
        assert_eq!(base, TypeRef::I4);
        assert_eq!(decls, "[,,]");
    }

    #[test]
    fn pointers_are_explicit() {
        // PTR VOID
        let (base, decls) = parse_one(&[0x0F, 0x01]);
        assert_eq!(base, TypeRef::Pointer(None));
        assert!(decls.is_empty());

        // PTR I4
        let (base, _) = parse_one(&[0x0F, 0x08]);
        assert_eq!(base, TypeRef::Pointer(Some(Box::new(TypeRef::I4))));
    }

    #[test]
    fn fnptr_is_rejected() {
        let mut reader = SignatureReader::new(&[0x1B, 0x00]);
        let mut decls = String::new();
        assert!(reader.parse_type(&mut decls).is_err());
    }

    #[test]
    fn match_tag_rewinds() {
        let mut reader = SignatureReader::new(&[0x08]);
        assert!(!reader.match_tag(0x0E));
        assert!(reader.match_tag(0x08));
        // at end of data every match fails without moving
        assert!(!reader.match_tag(0x08));
    }

    #[test]
    fn custom_mods_are_dropped() {
        // CMOD_OPT tk, CMOD_REQD tk, then I4
        let mut reader = SignatureReader::new(&[0x20, 0x42, 0x1F, 0x49, 0x08]);
        reader.skip_custom_mods().unwrap();

        let mut decls = String::new();
        assert_eq!(reader.parse_type(&mut decls).unwrap(), TypeRef::I4);
    }

    #[test]
    fn locals() {
        // LOCAL_SIG, 3 locals: I4; BYREF string; PINNED object
        let mut reader = SignatureReader::new(&[0x07, 0x03, 0x08, 0x10, 0x0E, 0x45, 0x1C]);
        let (base_types, declarators) = reader.parse_locals().unwrap();

        assert_eq!(
            base_types,
            vec![TypeRef::I4, TypeRef::String, TypeRef::Object]
        );
        assert_eq!(declarators, vec!["", "&", ""]);
    }

    #[test]
    fn locals_header_enforced() {
        let mut reader = SignatureReader::new(&[0x06, 0x01, 0x08]);
        assert!(reader.parse_locals().is_err());
    }

    #[test]
    fn runaway_nesting_stops() {
        // a long chain of SZARRAY tags with no element type
        let data = vec![0x1D_u8; 80];
        let mut reader = SignatureReader::new(&data);
        let mut decls = String::new();
        assert!(matches!(
            reader.parse_type(&mut decls),
            Err(RecursionLimit(_))
        ));
    }
}
