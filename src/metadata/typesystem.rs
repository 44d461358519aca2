//! The type representation produced by signature decoding, and the
//! caller-populated token→object map.
//!
//! Signature decoding yields two things per type: a semantic base type
//! ([`TypeRef`]) and a textual declarator string holding the array, byref
//! and similar decorations in the order the grammar produced them. The base
//! carries identity so callers can reason about types without string
//! parsing; the declarator is enough to reconstruct the source-level
//! declaration.

use rustc_hash::FxHashMap;

use crate::metadata::token::Token;

/// ECMA-335 II.23.1.16 element type constants used in signature blobs.
#[allow(missing_docs)]
pub mod element_type {
    pub const END: u32 = 0x00;
    pub const VOID: u32 = 0x01;
    pub const BOOLEAN: u32 = 0x02;
    pub const CHAR: u32 = 0x03;
    pub const I1: u32 = 0x04;
    pub const U1: u32 = 0x05;
    pub const I2: u32 = 0x06;
    pub const U2: u32 = 0x07;
    pub const I4: u32 = 0x08;
    pub const U4: u32 = 0x09;
    pub const I8: u32 = 0x0A;
    pub const U8: u32 = 0x0B;
    pub const R4: u32 = 0x0C;
    pub const R8: u32 = 0x0D;
    pub const STRING: u32 = 0x0E;
    pub const PTR: u32 = 0x0F;
    pub const BYREF: u32 = 0x10;
    pub const VALUETYPE: u32 = 0x11;
    pub const CLASS: u32 = 0x12;
    pub const VAR: u32 = 0x13;
    pub const ARRAY: u32 = 0x14;
    pub const GENERICINST: u32 = 0x15;
    pub const TYPEDBYREF: u32 = 0x16;
    pub const I: u32 = 0x18;
    pub const U: u32 = 0x19;
    pub const FNPTR: u32 = 0x1B;
    pub const OBJECT: u32 = 0x1C;
    pub const SZARRAY: u32 = 0x1D;
    pub const MVAR: u32 = 0x1E;
    pub const CMOD_REQD: u32 = 0x1F;
    pub const CMOD_OPT: u32 = 0x20;
    pub const SENTINEL: u32 = 0x41;
    pub const PINNED: u32 = 0x45;
}

/// ECMA-335 II.23.2.3 calling-convention bytes found at the head of
/// signature blobs.
#[allow(missing_docs)]
pub mod call_conv {
    /// Default managed calling convention.
    pub const DEFAULT: u32 = 0x00;
    /// Vararg method signature (low nibble).
    pub const VARARG: u32 = 0x05;
    /// Field signature marker.
    pub const FIELD: u32 = 0x06;
    /// Local-variable signature marker.
    pub const LOCAL_SIG: u32 = 0x07;
    /// Property signature marker.
    pub const PROPERTY: u32 = 0x08;
    /// Signature carries a generic parameter count.
    pub const GENERIC: u32 = 0x10;
    /// Instance method; a `this` pointer is passed.
    pub const HAS_THIS: u32 = 0x20;
    /// The `this` parameter is explicitly in the parameter list.
    pub const EXPLICIT_THIS: u32 = 0x40;
}

/// A parsed type reference: the semantic half of the dual representation.
///
/// Class and valuetype references stay unresolved as their raw token; the
/// caller resolves them later through its own means and records the result
/// in a [`TokenMap`]. Pointer types carry their pointee explicitly, with
/// `None` standing for an unknown (`void`) pointee.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeRef {
    /// `bool`
    Boolean,
    /// `char` (UTF-16 code unit)
    Char,
    /// signed 8-bit integer
    I1,
    /// unsigned 8-bit integer
    U1,
    /// signed 16-bit integer
    I2,
    /// unsigned 16-bit integer
    U2,
    /// signed 32-bit integer
    I4,
    /// unsigned 32-bit integer
    U4,
    /// signed 64-bit integer
    I8,
    /// unsigned 64-bit integer
    U8,
    /// 32-bit floating point
    R4,
    /// 64-bit floating point
    R8,
    /// native-sized signed integer
    I,
    /// native-sized unsigned integer
    U,
    /// `System.String`
    String,
    /// `System.Object`
    Object,
    /// `System.TypedReference`
    TypedReference,
    /// A class or valuetype, unresolved: just the metadata token.
    Token(Token),
    /// A pointer type; `None` when the pointee is unknown (`void*`).
    Pointer(Option<Box<TypeRef>>),
}

/// What the caller resolved a metadata token to.
///
/// The loader core never inserts into a [`TokenMap`]; the upstream
/// evaluator fills it while walking the metadata (user strings, resolved
/// types, members), and the IL reader and exception-table fixup read from
/// it. Tokens the caller left out surface as their decimal string form, so
/// unknown tokens stay printable downstream.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenValue {
    /// The token resolved to a type.
    Type(TypeRef),
    /// The token resolved to a string (user-string tokens, or the fallback
    /// rendering of an unresolved token).
    String(String),
    /// The token resolved to a named method or field.
    Member {
        /// The member's own token.
        token: Token,
        /// The member's name.
        name: String,
    },
}

/// The token→object map supplied by the caller.
pub type TokenMap = FxHashMap<Token, TokenValue>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_map_round_trip() {
        let mut map = TokenMap::default();
        map.insert(
            Token::new(0x0100_0001),
            TokenValue::Type(TypeRef::Token(Token::new(0x0100_0001))),
        );
        map.insert(
            Token::new(0x7000_0001),
            TokenValue::String("hello".into()),
        );

        assert_eq!(
            map.get(&Token::new(0x7000_0001)),
            Some(&TokenValue::String("hello".into()))
        );
        assert!(map.get(&Token::new(0x0200_0001)).is_none());
    }

    #[test]
    fn pointer_shapes() {
        let void_ptr = TypeRef::Pointer(None);
        let int_ptr = TypeRef::Pointer(Some(Box::new(TypeRef::I4)));

        assert_ne!(void_ptr, int_ptr);
        assert_eq!(int_ptr, TypeRef::Pointer(Some(Box::new(TypeRef::I4))));
    }
}
