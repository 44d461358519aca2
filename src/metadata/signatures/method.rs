use bitflags::bitflags;

use crate::{
    metadata::{
        signatures::SignatureReader,
        typesystem::{call_conv, element_type, TokenMap, TokenValue, TypeRef},
    },
    Result,
};

bitflags! {
    /// Calling-convention flags of a decoded method signature, mirroring
    /// the reflection `CallingConventions` values.
    ///
    /// Exactly one of `STANDARD` and `VARARGS` is set, combined with
    /// `HAS_THIS` and `EXPLICIT_THIS` as the signature byte dictates.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CallingConventions: u8 {
        /// Fixed-arity managed call.
        const STANDARD = 0x01;
        /// Variable-arity call (`vararg` low nibble in the raw byte).
        const VARARGS = 0x02;
        /// An instance `this` pointer is passed.
        const HAS_THIS = 0x20;
        /// The `this` pointer appears explicitly in the parameter list.
        const EXPLICIT_THIS = 0x40;
    }
}

/// The decoded return type of a method signature.
#[derive(Debug, Clone, PartialEq)]
pub enum ReturnType {
    /// The method returns nothing.
    Void,
    /// The method returns a `System.TypedReference`.
    TypedByRef,
    /// Any other return type, with its declarator decorations (`[]`, `&`).
    Value {
        /// The semantic base type.
        base: TypeRef,
        /// Textual decorations in grammar order.
        decls: String,
    },
}

/// A decoded method signature: calling convention, parameter types with
/// their declarators, and the return type.
///
/// Parameter data is held as two parallel arrays in declaration order.
/// When `EXPLICIT_THIS` is set, the first raw entry describes the `this`
/// pointer and is excluded from [`MethodSignature::param_count`], so
/// `param_count` can be smaller than the array length.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodSignature {
    /// Calling-convention flags.
    pub calling_conv: CallingConventions,
    /// Number of declared parameters, excluding an explicit `this` entry.
    pub param_count: u32,
    /// Semantic base type per raw parameter.
    pub param_base_types: Vec<TypeRef>,
    /// Declarator string per raw parameter (parallel to the base types).
    pub param_declarators: Vec<String>,
    /// The declared return type.
    pub return_type: ReturnType,
    /// Whether this signature came from a member-ref site. Vararg call
    /// sites carry the SENTINEL marker there.
    pub is_method_ref: bool,
}

impl MethodSignature {
    /// Decode a method signature from `reader`.
    ///
    /// # Errors
    /// Returns an error on truncated data or invalid signature grammar.
    pub fn parse(reader: &mut SignatureReader, is_method_ref: bool) -> Result<MethodSignature> {
        // First byte: calling convention
        let first = reader.read_unsigned()?;
        let has_this = first & call_conv::HAS_THIS != 0;
        let explicit_this = first & call_conv::EXPLICIT_THIS != 0;
        let vararg = first & 0x0F == call_conv::VARARG;

        let mut calling_conv = if vararg {
            CallingConventions::VARARGS
        } else {
            CallingConventions::STANDARD
        };
        if has_this {
            calling_conv |= CallingConventions::HAS_THIS;
        }
        if explicit_this {
            calling_conv |= CallingConventions::EXPLICIT_THIS;
        }

        let raw_param_count = reader.read_unsigned()?;

        // Return type
        reader.skip_custom_mods()?;
        let return_type = if reader.match_tag(element_type::VOID) {
            ReturnType::Void
        } else if reader.match_tag(element_type::TYPEDBYREF) {
            ReturnType::TypedByRef
        } else {
            let by_ref = reader.match_tag(element_type::BYREF);
            let mut decls = String::new();
            let base = reader.parse_type(&mut decls)?;
            if by_ref {
                decls.push('&');
            }
            ReturnType::Value { base, decls }
        };

        // Parameters; a SENTINEL marks the vararg boundary and ends the
        // declared list
        let mut param_count = 0_u32;
        let mut param_base_types = Vec::with_capacity(raw_param_count as usize);
        let mut param_declarators = Vec::with_capacity(raw_param_count as usize);

        for i in 0..raw_param_count {
            if reader.match_tag(element_type::SENTINEL) {
                break;
            }

            reader.skip_custom_mods()?;

            if reader.match_tag(element_type::TYPEDBYREF) {
                param_base_types.push(TypeRef::TypedReference);
                param_declarators.push(String::new());
            } else {
                let is_byref = reader.match_tag(element_type::BYREF);

                let mut decls = String::new();
                param_base_types.push(reader.parse_type(&mut decls)?);
                if is_byref {
                    decls.push('&');
                }
                param_declarators.push(decls);
            }

            if i > 0 || !explicit_this {
                param_count += 1;
            }
        }

        Ok(MethodSignature {
            calling_conv,
            param_count,
            param_base_types,
            param_declarators,
            return_type,
            is_method_ref,
        })
    }

    /// Whether this signature matches `other`: bit-equal calling
    /// conventions, equal parameter counts, and per-parameter type equality
    /// after resolving this signature's token references through `map`.
    ///
    /// With an empty map, token references only match when they are the
    /// same raw token.
    #[must_use]
    pub fn matches(&self, other: &MethodSignature, map: &TokenMap) -> bool {
        if self.calling_conv != other.calling_conv
            || self.param_count != other.param_count
            || self.param_base_types.len() != other.param_base_types.len()
        {
            return false;
        }

        self.param_base_types
            .iter()
            .zip(&other.param_base_types)
            .all(|(own, declared)| resolve(own, map) == declared)
    }
}

/// Resolve a token reference through the caller map, leaving every other
/// type untouched.
fn resolve<'a>(ty: &'a TypeRef, map: &'a TokenMap) -> &'a TypeRef {
    if let TypeRef::Token(token) = ty {
        if let Some(TokenValue::Type(resolved)) = map.get(token) {
            return resolved;
        }
    }
    ty
}
