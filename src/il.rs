//! Sequential reading of the IL opcode stream of a decoded method body.
//!
//! [`IlReader`] is a cursor over a [`MethodCode`]: the caller drives it one
//! opcode or operand at a time, in the schedule the instruction encoding
//! dictates. Metadata-token operands resolve through a caller-supplied
//! [`TokenMap`]; unknown tokens degrade to their decimal string form
//! instead of failing.
//!
//! # Example
//!
//! ```
//! use cilload::{IlReader, MethodCode, TokenMap};
//!
//! let code = MethodCode {
//!     max_stack: 8,
//!     code: Some(vec![0x00, 0x2A]), // nop, ret
//!     ..MethodCode::default()
//! };
//!
//! let map = TokenMap::default();
//! let mut reader = IlReader::new(&code, &map);
//! assert_eq!(reader.read_opcode()?, 0x00);
//! assert_eq!(reader.read_opcode()?, 0x2A);
//! assert!(reader.end_of_code());
//! # Ok::<(), cilload::Error>(())
//! ```

use crate::{
    file::io::{read_le_at, LeRead},
    metadata::{
        method::{EhTable, MethodCode},
        token::Token,
        typesystem::{TokenMap, TokenValue, TypeRef},
    },
    Result,
};

/// Two-byte opcodes (`0xFE` prefix) are reported in this range:
/// `EXTENDED_OPCODE_BASE + second byte`.
pub const EXTENDED_OPCODE_BASE: u16 = 0xE100;

/// A stateful cursor over the IL bytes of one method body.
///
/// All reads advance the cursor and fail once they would cross
/// `code_size`; [`IlReader::end_of_code`] holds exactly when the cursor
/// sits at `code_size`. The reader borrows the body and the token map and
/// carries no other state, so one body can be re-read by [`IlReader::reset`]
/// or by constructing a fresh reader.
pub struct IlReader<'a> {
    code: &'a [u8],
    pos: usize,
    method: &'a MethodCode,
    map: &'a TokenMap,
}

impl<'a> IlReader<'a> {
    /// Create a reader over `method`, resolving token operands through
    /// `map`. A bodyless method yields a reader that is immediately at the
    /// end of its (empty) code.
    #[must_use]
    pub fn new(method: &'a MethodCode, map: &'a TokenMap) -> IlReader<'a> {
        IlReader {
            code: method.code.as_deref().unwrap_or(&[]),
            pos: 0,
            method,
            map,
        }
    }

    /// Whether the method has an IL body at all.
    #[must_use]
    pub fn is_il(&self) -> bool {
        self.method.is_il()
    }

    /// Length of the IL code in bytes.
    #[must_use]
    pub fn code_size(&self) -> usize {
        self.code.len()
    }

    /// Maximum number of items on the operand stack.
    #[must_use]
    pub fn max_stack(&self) -> u32 {
        self.method.max_stack
    }

    /// The exception-handling clauses of the body.
    #[must_use]
    pub fn eh(&self) -> &'a EhTable {
        &self.method.eh
    }

    /// The base types of the local variables, in declaration order.
    #[must_use]
    pub fn local_var_types(&self) -> &'a [TypeRef] {
        &self.method.local_var_base_types
    }

    /// Current cursor position within the code.
    #[must_use]
    pub fn pos(&self) -> usize {
        self.pos
    }

    /// Move the cursor back to the start of the code.
    pub fn reset(&mut self) {
        self.pos = 0;
    }

    /// Whether the cursor has consumed the entire code.
    #[must_use]
    pub fn end_of_code(&self) -> bool {
        self.pos == self.code.len()
    }

    fn read<T: LeRead>(&mut self) -> Result<T> {
        read_le_at::<T>(self.code, &mut self.pos)
    }

    /// Read one opcode. Single-byte opcodes come back as themselves; the
    /// `0xFE` prefix selects the two-byte page, reported as
    /// [`EXTENDED_OPCODE_BASE`] plus the second byte.
    ///
    /// # Errors
    /// Returns an error when the read would cross the end of the code.
    pub fn read_opcode(&mut self) -> Result<u16> {
        let first = self.read::<u8>()?;
        if first == 0xFE {
            Ok(EXTENDED_OPCODE_BASE + u16::from(self.read::<u8>()?))
        } else {
            Ok(u16::from(first))
        }
    }

    /// Read a signed 8-bit operand, sign-extended to 16 bits.
    ///
    /// # Errors
    /// Returns an error when the read would cross the end of the code.
    pub fn read_int8(&mut self) -> Result<i16> {
        Ok(i16::from(self.read::<i8>()?))
    }

    /// Read an unsigned 8-bit operand.
    ///
    /// # Errors
    /// Returns an error when the read would cross the end of the code.
    pub fn read_uint8(&mut self) -> Result<u8> {
        self.read::<u8>()
    }

    /// Read a signed 16-bit operand, sign-extended to 32 bits.
    ///
    /// # Errors
    /// Returns an error when the read would cross the end of the code.
    pub fn read_int16(&mut self) -> Result<i32> {
        Ok(i32::from(self.read::<i16>()?))
    }

    /// Read an unsigned 16-bit operand, zero-extended to 32 bits.
    ///
    /// # Errors
    /// Returns an error when the read would cross the end of the code.
    pub fn read_uint16(&mut self) -> Result<i32> {
        Ok(i32::from(self.read::<u16>()?))
    }

    /// Read a signed 32-bit operand.
    ///
    /// # Errors
    /// Returns an error when the read would cross the end of the code.
    pub fn read_int32(&mut self) -> Result<i32> {
        self.read::<i32>()
    }

    /// Read a signed 64-bit operand.
    ///
    /// # Errors
    /// Returns an error when the read would cross the end of the code.
    pub fn read_int64(&mut self) -> Result<i64> {
        self.read::<i64>()
    }

    /// Read a 32-bit IEEE-754 operand.
    ///
    /// # Errors
    /// Returns an error when the read would cross the end of the code.
    pub fn read_float32(&mut self) -> Result<f32> {
        self.read::<f32>()
    }

    /// Read a 64-bit IEEE-754 operand.
    ///
    /// # Errors
    /// Returns an error when the read would cross the end of the code.
    pub fn read_float64(&mut self) -> Result<f64> {
        self.read::<f64>()
    }

    /// Read a switch table: a 32-bit target count followed by that many
    /// signed 32-bit branch deltas.
    ///
    /// # Errors
    /// Returns an error on a negative count or when the table crosses the
    /// end of the code.
    pub fn read_switch(&mut self) -> Result<Vec<i32>> {
        let count = self.read::<i32>()?;
        if count < 0 {
            return Err(malformed_error!("Negative switch target count - {}", count));
        }

        let mut targets = Vec::with_capacity(count as usize);
        for _ in 0..count {
            targets.push(self.read::<i32>()?);
        }
        Ok(targets)
    }

    /// Read a metadata-token operand and resolve it through the token map.
    ///
    /// A token absent from the map comes back as its decimal string form,
    /// so downstream code can uniformly display unknown tokens; this is
    /// data, not a failure.
    ///
    /// # Errors
    /// Returns an error when the read would cross the end of the code.
    pub fn read_token(&mut self) -> Result<TokenValue> {
        #[allow(clippy::cast_sign_loss)]
        let token = Token::new(self.read::<i32>()? as u32);

        match self.map.get(&token) {
            Some(value) => Ok(value.clone()),
            None => Ok(TokenValue::String(token.value().to_string())),
        }
    }
}
