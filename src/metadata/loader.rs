//! The loader facade tying the image, the metadata backend, and the
//! decoders together.
//!
//! [`PeLoader`] is what a caller holds: it owns the loaded image and an
//! open metadata scope, and lifts the backend's raw token data into the
//! typed records of this module: decoded method signatures, method bodies
//! with locals and exception tables, parsed type specifications.

use std::path::Path;
use std::sync::Arc;

use log::debug;

use crate::{
    file::PeImage,
    metadata::{
        cliimport::CliImport,
        import::MetadataImport,
        method::{MethodBody, MethodCode},
        signatures::{MethodSignature, SignatureReader},
        token::Token,
        typesystem::{call_conv, TypeRef},
    },
    Result,
};

pub use crate::metadata::import::MdPair;

/// A decoded type specification.
#[derive(Debug, Clone, PartialEq)]
pub struct MdTypeSpec {
    /// The TypeSpec token.
    pub token: Token,
    /// The semantic base type of the specification.
    pub base_type: TypeRef,
    /// Declarator decorations in grammar order.
    pub decls: String,
}

/// A decoded member reference.
///
/// `signature` is `None` when the referenced member is a field, detected
/// by the leading FIELD calling-convention byte of its blob.
#[derive(Debug, Clone, PartialEq)]
pub struct MdMemberRef {
    /// The MemberRef token.
    pub token: Token,
    /// Member name.
    pub name: String,
    /// The decoded method signature; `None` for field references.
    pub signature: Option<MethodSignature>,
}

/// The fully decoded properties of one method.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodProps {
    /// Method name.
    pub name: String,
    /// The decoded method signature.
    pub signature: MethodSignature,
    /// The decoded body; empty (not an error) for methods without IL.
    pub code: MethodCode,
}

/// A loaded CLI module with an open metadata scope.
///
/// One loader owns one image exclusively; enumerations are sequential and
/// return fully formed vectors (empty input yields an empty vector, never
/// an error). Dropping the loader closes the scope and releases the image.
pub struct PeLoader {
    image: Arc<PeImage>,
    import: Box<dyn MetadataImport>,
}

impl PeLoader {
    /// Load the module at `path` and open its metadata scope with the
    /// shipped backend.
    ///
    /// # Errors
    /// Returns an error when the file is unreadable, not a CLI module, or
    /// its metadata is malformed.
    pub fn from_file(path: &Path) -> Result<PeLoader> {
        let image = Arc::new(PeImage::from_file(path)?);
        let import = CliImport::open(Arc::clone(&image))?;

        debug!("loaded module from {}", path.display());
        Ok(PeLoader {
            image,
            import: Box::new(import),
        })
    }

    /// Load a module from an owned buffer and open its metadata scope with
    /// the shipped backend.
    ///
    /// # Errors
    /// Returns an error when the buffer is not a CLI module or its
    /// metadata is malformed.
    pub fn from_mem(data: Vec<u8>) -> Result<PeLoader> {
        let image = Arc::new(PeImage::from_mem(data)?);
        let import = CliImport::open(Arc::clone(&image))?;

        Ok(PeLoader {
            image,
            import: Box::new(import),
        })
    }

    /// Tie a loaded image to a caller-supplied metadata backend.
    pub fn with_import(image: Arc<PeImage>, import: Box<dyn MetadataImport>) -> PeLoader {
        PeLoader { image, import }
    }

    /// The loaded image.
    #[must_use]
    pub fn image(&self) -> &Arc<PeImage> {
        &self.image
    }

    /// All user strings, as token/text pairs.
    ///
    /// # Errors
    /// Fails when the `#US` heap is malformed.
    pub fn user_strings(&self) -> Result<Vec<MdPair>> {
        self.import.user_strings()
    }

    /// All assembly references.
    ///
    /// # Errors
    /// Fails when the backend cannot read the table.
    pub fn assembly_refs(&self) -> Result<Vec<MdPair>> {
        self.import.assembly_refs()
    }

    /// The token of the module itself.
    ///
    /// # Errors
    /// Fails when the scope has no Module row.
    pub fn module_token(&self) -> Result<Token> {
        self.import.module_token()
    }

    /// All module references.
    ///
    /// # Errors
    /// Fails when the backend cannot read the table.
    pub fn module_refs(&self) -> Result<Vec<MdPair>> {
        self.import.module_refs()
    }

    /// All type definitions; `extra` carries the enclosing class token of
    /// nested types, 0 otherwise.
    ///
    /// # Errors
    /// Fails when the backend cannot read the table.
    pub fn type_defs(&self) -> Result<Vec<MdPair>> {
        Ok(self
            .import
            .type_defs()?
            .into_iter()
            .map(|def| MdPair {
                token: def.token,
                name: def.name,
                extra: i64::from(def.enclosing.value()),
            })
            .collect())
    }

    /// All type references; `extra` carries the resolution-scope token.
    ///
    /// # Errors
    /// Fails when the backend cannot read the table.
    pub fn type_refs(&self) -> Result<Vec<MdPair>> {
        Ok(self
            .import
            .type_refs()?
            .into_iter()
            .map(|type_ref| MdPair {
                token: type_ref.token,
                name: type_ref.name,
                extra: i64::from(type_ref.scope.value()),
            })
            .collect())
    }

    /// The method tokens of one class, in declaration order.
    ///
    /// # Errors
    /// Fails when `class` is not a type-def token of this scope.
    pub fn methods(&self, class: Token) -> Result<Vec<Token>> {
        self.import.methods(class)
    }

    /// The fields of one class; `extra` carries the name length.
    ///
    /// # Errors
    /// Fails when `class` is not a type-def token of this scope.
    pub fn fields(&self, class: Token) -> Result<Vec<MdPair>> {
        self.import.fields(class)
    }

    /// The member references scoped to `class`, with their signatures
    /// decoded. Field references carry no method signature.
    ///
    /// # Errors
    /// Fails when a signature blob is malformed.
    pub fn member_refs(&self, class: Token) -> Result<Vec<MdMemberRef>> {
        let mut refs = Vec::new();
        for raw in self.import.member_refs(class)? {
            let mut reader = SignatureReader::new(&raw.signature);

            let signature = if reader.match_tag(call_conv::FIELD) {
                None
            } else {
                Some(MethodSignature::parse(&mut reader, true)?)
            };

            refs.push(MdMemberRef {
                token: raw.token,
                name: raw.name,
                signature,
            });
        }
        Ok(refs)
    }

    /// All type specifications, with their signatures decoded.
    ///
    /// # Errors
    /// Fails when a signature blob is malformed.
    pub fn type_specs(&self) -> Result<Vec<MdTypeSpec>> {
        let mut specs = Vec::new();
        for raw in self.import.type_specs()? {
            let mut reader = SignatureReader::new(&raw.signature);
            let mut decls = String::new();
            let base_type = reader.parse_type(&mut decls)?;

            specs.push(MdTypeSpec {
                token: raw.token,
                base_type,
                decls,
            });
        }
        Ok(specs)
    }

    /// The fully decoded properties of one method: name, signature, and
    /// body.
    ///
    /// A method whose RVA does not fall into a code section (native,
    /// abstract, runtime-provided) comes back with an empty body; that is
    /// not an error. For fat bodies with a local-variable signature token,
    /// the locals are decoded through the backend.
    ///
    /// # Errors
    /// Fails when the method token is unknown, the signature or body is
    /// malformed, or the local-variable signature does not carry the
    /// LOCAL_SIG marker.
    pub fn method_props(&self, method: Token) -> Result<MethodProps> {
        let raw = self.import.method_props(method)?;

        let mut sig_reader = SignatureReader::new(&raw.signature);
        let signature = MethodSignature::parse(&mut sig_reader, false)?;

        let code = match self.image.rva_to_code_pos(raw.rva) {
            None => MethodCode::empty(),
            Some(pos) => {
                let Some(header_data) = self.image.data().get(pos..) else {
                    return Err(crate::Error::OutOfBounds);
                };
                let body = MethodBody::parse(header_data)?;

                let (local_var_base_types, local_var_declarators) =
                    if body.is_fat && body.local_var_sig_token != 0 {
                        let locals_sig = self
                            .import
                            .signature_of(Token::new(body.local_var_sig_token))?;
                        SignatureReader::new(&locals_sig).parse_locals()?
                    } else {
                        (Vec::new(), Vec::new())
                    };

                let code_bytes = self
                    .image
                    .data_slice(pos + body.size_header, body.size_code)?
                    .to_vec();

                MethodCode {
                    max_stack: body.max_stack,
                    code: Some(code_bytes),
                    eh: body.eh,
                    local_var_base_types,
                    local_var_declarators,
                }
            }
        };

        Ok(MethodProps {
            name: raw.name,
            signature,
            code,
        })
    }
}
