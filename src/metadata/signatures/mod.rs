//! Decoding of ECMA-335 compressed signature blobs.
//!
//! [`SignatureReader`] is the stateful cursor that understands the
//! `ELEMENT_TYPE_*` grammar and produces the dual base-type/declarator
//! representation; [`MethodSignature`] decodes the calling convention,
//! return type and parameter list of method and member-ref signatures on
//! top of it.
//!
//! # Reference
//! - ECMA-335 6th Edition, Partition II, Section 23.2

mod method;
mod reader;

pub use method::{CallingConventions, MethodSignature, ReturnType};
pub use reader::SignatureReader;
