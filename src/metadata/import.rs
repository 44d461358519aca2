//! The metadata backend capability trait.
//!
//! [`MetadataImport`] is the only surface the [`crate::PeLoader`] facade
//! depends on for raw token data. The crate ships one implementation,
//! [`crate::metadata::cliimport::CliImport`], which reads the physical
//! metadata tables itself; callers can substitute their own backend at
//! facade construction.
//!
//! All enumerations return fully materialized vectors in table order;
//! empty input yields an empty vector, never an error; and any resource a
//! backend holds is released on drop.

use crate::{metadata::token::Token, Result};

/// A token paired with its name and table-specific auxiliary data.
///
/// The `extra` field carries: for type-defs the enclosing class token (0 if
/// not nested); for type-refs the resolution-scope token; for fields the
/// name length in UTF-16 code units; 0 elsewhere.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MdPair {
    /// The metadata token.
    pub token: Token,
    /// The associated name; empty for tables that carry none.
    pub name: String,
    /// Table-specific auxiliary data.
    pub extra: i64,
}

/// Raw properties of one type definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTypeDef {
    /// The TypeDef token.
    pub token: Token,
    /// Namespace-qualified type name.
    pub name: String,
    /// The TypeDef flags (visibility, layout, semantics).
    pub flags: u32,
    /// Token of the superclass, null for interfaces and `<Module>`.
    pub extends: Token,
    /// Token of the enclosing class; null when the type is not nested.
    pub enclosing: Token,
}

/// Raw properties of one type reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTypeRef {
    /// The TypeRef token.
    pub token: Token,
    /// Namespace-qualified type name.
    pub name: String,
    /// Resolution-scope token (assembly-ref, module-ref, module, or the
    /// enclosing type-ref for nested references).
    pub scope: Token,
}

/// Raw properties of one method definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMethod {
    /// Method name.
    pub name: String,
    /// RVA of the method body; 0 for methods without one.
    pub rva: u32,
    /// The raw signature blob.
    pub signature: Vec<u8>,
}

/// Raw properties of one member reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMemberRef {
    /// The MemberRef token.
    pub token: Token,
    /// Member name.
    pub name: String,
    /// The raw signature blob; a leading FIELD byte marks a field
    /// reference.
    pub signature: Vec<u8>,
}

/// Raw properties of one type specification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTypeSpec {
    /// The TypeSpec token.
    pub token: Token,
    /// The raw signature blob.
    pub signature: Vec<u8>,
}

/// The narrow capability interface the loader core depends on.
///
/// Implementations enumerate the well-known token namespaces of one open
/// metadata scope and resolve per-token raw properties. Ordering follows
/// the physical tables. Operations refused by the backend surface as
/// [`crate::Error::Metadata`].
pub trait MetadataImport {
    /// All user strings of the `#US` heap, as token/text pairs.
    ///
    /// # Errors
    /// Fails when the heap is malformed.
    fn user_strings(&self) -> Result<Vec<MdPair>>;

    /// All assembly references.
    ///
    /// # Errors
    /// Fails when the backend cannot read the table.
    fn assembly_refs(&self) -> Result<Vec<MdPair>>;

    /// The token of the module itself.
    ///
    /// # Errors
    /// Fails when the scope has no Module row.
    fn module_token(&self) -> Result<Token>;

    /// All module references.
    ///
    /// # Errors
    /// Fails when the backend cannot read the table.
    fn module_refs(&self) -> Result<Vec<MdPair>>;

    /// All type definitions, excluding the `<Module>` pseudo-type.
    ///
    /// # Errors
    /// Fails when the backend cannot read the table.
    fn type_defs(&self) -> Result<Vec<RawTypeDef>>;

    /// All type references.
    ///
    /// # Errors
    /// Fails when the backend cannot read the table.
    fn type_refs(&self) -> Result<Vec<RawTypeRef>>;

    /// The method tokens of one class, in declaration order. The
    /// `<Module>` pseudo-type token enumerates global methods.
    ///
    /// # Errors
    /// Fails when `class` is not a type-def token of this scope.
    fn methods(&self, class: Token) -> Result<Vec<Token>>;

    /// Name, RVA and signature blob of one method.
    ///
    /// # Errors
    /// Fails when `method` is not a method-def token of this scope.
    fn method_props(&self, method: Token) -> Result<RawMethod>;

    /// The fields of one class, in declaration order.
    ///
    /// # Errors
    /// Fails when `class` is not a type-def token of this scope.
    fn fields(&self, class: Token) -> Result<Vec<MdPair>>;

    /// The member references scoped to one class token.
    ///
    /// # Errors
    /// Fails when the backend cannot read the table.
    fn member_refs(&self, class: Token) -> Result<Vec<RawMemberRef>>;

    /// All type specifications.
    ///
    /// # Errors
    /// Fails when the backend cannot read the table.
    fn type_specs(&self) -> Result<Vec<RawTypeSpec>>;

    /// The signature blob carried by `token` (standalone-sig, type-spec,
    /// method-def, field or member-ref tokens).
    ///
    /// # Errors
    /// Fails when the token carries no signature in this scope.
    fn signature_of(&self, token: Token) -> Result<Vec<u8>>;
}
