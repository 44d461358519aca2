//! ECMA-335 metadata: tokens, signatures, method bodies, and the loader
//! facade.
//!
//! The layers, bottom up:
//!
//! - [`token`]: the 32-bit metadata token and its table namespace constants.
//! - [`typesystem`]: the [`typesystem::TypeRef`] tagged sum produced by
//!   signature decoding, plus the caller-populated token→object map.
//! - [`signatures`]: the compressed signature grammar: type references with
//!   declarator accumulation, method signatures, local-variable lists.
//! - [`method`]: fat/tiny IL header decoding, owned method code, and the
//!   exception-handling clause table.
//! - [`streams`]: the physical metadata: root, heap, and table-stream
//!   readers backing the shipped import implementation.
//! - [`import`]: the narrow backend capability trait the facade depends on;
//!   [`cliimport`] is the pure-Rust implementation over [`streams`].
//! - [`loader`]: the [`loader::PeLoader`] facade a caller actually holds.

pub mod cliimport;
pub mod cor20;
pub mod import;
pub mod loader;
pub mod method;
pub mod signatures;
pub mod streams;
pub mod token;
pub mod typesystem;
