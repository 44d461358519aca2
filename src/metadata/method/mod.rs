//! IL method bodies: header decoding, owned method code, and the
//! exception-handling clause table.
//!
//! [`MethodBody`] parses the fat/tiny prologue of a method at its RVA;
//! [`MethodCode`] is the owned result the loader hands out (code bytes,
//! max-stack, locals, EH); [`EhTable`] holds the decoded clauses with their
//! post-pass token fixup.
//!
//! # Reference
//! - ECMA-335 6th Edition, Partition II, Section 25.4

mod body;
mod exceptions;

pub use body::{MethodBody, MethodBodyFlags, MethodCode, SectionFlags};
pub use exceptions::{EhClause, EhClauseKind, EhParam, EhTable};
