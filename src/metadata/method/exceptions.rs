use crate::metadata::{
    token::Token,
    typesystem::{TokenMap, TokenValue, TypeRef},
};

/// The kind of protection a clause provides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EhClauseKind {
    /// Runs on every exit from the try range.
    Finally,
    /// Runs only when an exception unwinds through the try range.
    Fault,
    /// Catches exceptions of a given class; the clause parameter is the
    /// class token, or the resolved type after fixup.
    TypeFiltered,
    /// Catches exceptions a filter expression accepts; the clause parameter
    /// is the filter's IL offset.
    UserFiltered,
}

/// The per-kind clause parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum EhParam {
    /// Finally and fault clauses carry nothing.
    None,
    /// Unresolved class token of a type-filtered clause.
    Class(Token),
    /// Resolved type of a type-filtered clause after
    /// [`EhTable::fix_params`].
    Type(TypeRef),
    /// IL offset of the filter of a user-filtered clause.
    FilterOffset(u32),
}

/// One try/handler descriptor attached to a method body.
#[derive(Debug, Clone, PartialEq)]
pub struct EhClause {
    /// What the handler does.
    pub kind: EhClauseKind,
    /// Offset in bytes of the try block from the start of the code.
    pub try_offset: u32,
    /// Length in bytes of the try block.
    pub try_length: u32,
    /// Offset in bytes of the handler from the start of the code.
    pub handler_offset: u32,
    /// Length in bytes of the handler.
    pub handler_length: u32,
    /// The clause parameter, per [`EhClauseKind`].
    pub param: EhParam,
}

impl EhClause {
    /// Build a clause from the raw flag and field values of an EH section
    /// entry. The final field doubles as class token and filter offset,
    /// discriminated by the flags.
    #[must_use]
    pub(crate) fn from_raw(
        flags: u32,
        try_offset: u32,
        try_length: u32,
        handler_offset: u32,
        handler_length: u32,
        param: u32,
    ) -> EhClause {
        const FILTER: u32 = 0x0001;
        const FINALLY: u32 = 0x0002;
        const FAULT: u32 = 0x0004;

        let (kind, param) = match flags {
            FILTER => (EhClauseKind::UserFiltered, EhParam::FilterOffset(param)),
            FINALLY => (EhClauseKind::Finally, EhParam::None),
            FAULT => (EhClauseKind::Fault, EhParam::None),
            _ => (EhClauseKind::TypeFiltered, EhParam::Class(Token::new(param))),
        };

        EhClause {
            kind,
            try_offset,
            try_length,
            handler_offset,
            handler_length,
            param,
        }
    }
}

/// The exception-handling clauses of one method body, in section order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EhTable {
    /// The decoded clauses.
    pub clauses: Vec<EhClause>,
}

impl EhTable {
    /// Number of clauses.
    #[must_use]
    pub fn len(&self) -> usize {
        self.clauses.len()
    }

    /// Returns true when the method has no exception handling.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Post-pass: swap the class token of every type-filtered clause for
    /// the resolved type recorded in `map`.
    ///
    /// Clauses whose token does not resolve keep the raw token; callers may
    /// treat that as an unresolved reference. Never fails.
    pub fn fix_params(&mut self, map: &TokenMap) {
        for clause in &mut self.clauses {
            if let EhParam::Class(token) = &clause.param {
                if let Some(TokenValue::Type(resolved)) = map.get(token) {
                    clause.param = EhParam::Type(resolved.clone());
                }
            }
        }
    }
}
