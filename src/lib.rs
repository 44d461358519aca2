// Copyright 2026 the cilload developers
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![warn(missing_docs)]

//! # cilload
//!
//! A loader and decoder for compiled CLI (.NET) modules in their PE
//! container, written for consumption by a partial evaluator. The crate
//! parses the embedded ECMA-335 metadata tables and per-method IL bodies and
//! exposes a typed view of that content: token enumerations, decoded method
//! signatures, method bodies with exception-handling tables, and a cursor
//! over the IL opcode stream.
//!
//! # Architecture
//!
//! - **File layer** ([`file`]): image buffer backends (owned memory or a
//!   memory-mapped file), PE container parsing, the code-section map that
//!   translates method RVAs to file positions, and the cursor/compressed
//!   integer codec shared by all decoders.
//! - **Metadata layer** ([`metadata`]): tokens, the ECMA-335 signature
//!   grammar, method body and exception-clause decoding, the replaceable
//!   [`metadata::import::MetadataImport`] backend trait with its shipped
//!   pure-Rust implementation, and the [`PeLoader`] facade tying it all
//!   together.
//! - **IL layer** ([`il`]): [`IlReader`], a sequential cursor over a decoded
//!   method body that reads opcodes, inline operands, switch tables, and
//!   metadata-token operands resolved through a caller-supplied map.
//!
//! # Usage
//!
//! ```rust,no_run
//! use cilload::{PeLoader, IlReader, TokenMap};
//! use std::path::Path;
//!
//! let loader = PeLoader::from_file(Path::new("module.dll"))?;
//!
//! let map = TokenMap::default();
//! for class in loader.type_defs()? {
//!     for method in loader.methods(class.token)? {
//!         let props = loader.method_props(method)?;
//!         if props.code.is_il() {
//!             let mut il = IlReader::new(&props.code, &map);
//!             let opcode = il.read_opcode()?;
//!             println!("{}: first opcode {:#x}", props.name, opcode);
//!         }
//!     }
//! }
//! # Ok::<(), cilload::Error>(())
//! ```
//!
//! # Concurrency
//!
//! The crate is single-threaded per image: a [`PeLoader`] owns its buffer,
//! metadata scope, and cursors exclusively, with no internal locking. To
//! work on several modules in parallel, construct one loader per image.
//!
//! # References
//!
//! - ECMA-335 6th Edition, Partitions II.22–II.25

#[macro_use]
pub(crate) mod error;

pub mod file;
pub mod il;
pub mod metadata;

#[cfg(test)]
pub(crate) mod test;

/// Crate-wide result type; every fallible operation returns this.
pub type Result<T> = std::result::Result<T, Error>;

pub use error::Error;
pub use file::{parser::Parser, CodeSection, PeImage};
pub use il::IlReader;
pub use metadata::{
    loader::{MdMemberRef, MdPair, MdTypeSpec, MethodProps, PeLoader},
    method::{EhClause, EhClauseKind, EhParam, EhTable, MethodBody, MethodCode},
    signatures::{CallingConventions, MethodSignature, ReturnType, SignatureReader},
    token::Token,
    typesystem::{TokenMap, TokenValue, TypeRef},
};
