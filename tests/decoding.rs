//! End-to-end decoding checks over crafted method bodies and signature
//! blobs, driven through the public API only.

use cilload::file::parser::{compress_uint, Parser};
use cilload::{
    EhClauseKind, EhParam, IlReader, MethodBody, MethodCode, MethodSignature, ReturnType,
    SignatureReader, Token, TokenMap, TokenValue, TypeRef,
};

fn code_only(bytes: &[u8], max_stack: u32) -> MethodCode {
    MethodCode {
        max_stack,
        code: Some(bytes.to_vec()),
        ..MethodCode::default()
    }
}

#[test]
fn tiny_header_to_il() {
    // header byte 0x06: tiny format, one byte of code; the code is `ret`
    let data = [0x06_u8, 0x2A];
    let body = MethodBody::parse(&data).unwrap();

    assert_eq!(body.size_code, 1);
    assert_eq!(body.size_header, 1);
    assert_eq!(body.max_stack, 8);
    assert_eq!(body.local_var_sig_token, 0);
    assert!(body.eh.is_empty());

    let code = MethodCode {
        max_stack: body.max_stack,
        code: Some(data[body.size_header..body.size()].to_vec()),
        eh: body.eh,
        ..MethodCode::default()
    };
    assert_eq!(code.code_size(), 1);

    let map = TokenMap::default();
    let mut reader = IlReader::new(&code, &map);
    assert_eq!(reader.read_opcode().unwrap(), 0x2A);
    assert!(reader.end_of_code());
    assert_eq!(reader.pos(), reader.code_size());
}

#[test]
fn two_byte_opcode() {
    let code = code_only(&[0xFE, 0x16, 0x0A], 8);
    let map = TokenMap::default();
    let mut reader = IlReader::new(&code, &map);

    assert_eq!(reader.read_opcode().unwrap(), 0xE116);
    assert_eq!(reader.read_uint8().unwrap(), 0x0A);
}

#[test]
fn switch_operand() {
    #[rustfmt::skip]
    let code = code_only(&[
        0x45,
        0x02, 0x00, 0x00, 0x00,
        0x10, 0x00, 0x00, 0x00,
        0xF0, 0xFF, 0xFF, 0xFF,
    ], 8);
    let map = TokenMap::default();
    let mut reader = IlReader::new(&code, &map);

    assert_eq!(reader.read_opcode().unwrap(), 0x45);
    assert_eq!(reader.read_switch().unwrap(), vec![16, -16]);
}

#[test]
fn token_operand_resolution() {
    let bytes = [0x01, 0x00, 0x00, 0x0A];

    let mut map = TokenMap::default();
    map.insert(
        Token::new(0x0A00_0001),
        TokenValue::Type(TypeRef::Token(Token::new(0x0100_0007))),
    );

    let code = code_only(&bytes, 8);
    let mut reader = IlReader::new(&code, &map);
    assert_eq!(
        reader.read_token().unwrap(),
        TokenValue::Type(TypeRef::Token(Token::new(0x0100_0007)))
    );

    // same bytes, empty map: the decimal fallback
    let empty = TokenMap::default();
    let mut reader = IlReader::new(&code, &empty);
    assert_eq!(
        reader.read_token().unwrap(),
        TokenValue::String("167772161".into())
    );
}

#[test]
fn method_signature_decoding() {
    // HasThis, 2 params, returns void, (int32, string[])
    let blob = [0x20, 0x02, 0x01, 0x08, 0x1D, 0x0E];
    let mut reader = SignatureReader::new(&blob);
    let signature = MethodSignature::parse(&mut reader, false).unwrap();

    assert_eq!(signature.param_count, 2);
    assert_eq!(
        signature.param_base_types,
        vec![TypeRef::I4, TypeRef::String]
    );
    assert_eq!(signature.param_declarators, vec!["", "[]"]);
    assert_eq!(signature.return_type, ReturnType::Void);
    assert_eq!(
        signature.param_base_types.len(),
        signature.param_declarators.len()
    );
}

#[test]
fn eh_clause_fixup_round_trip() {
    #[rustfmt::skip]
    let data = [
        0x1B, 0x30,             // fat, more sections, init locals
        0x01, 0x00,             // max stack 1
        0x08, 0x00, 0x00, 0x00, // code size 8
        0x00, 0x00, 0x00, 0x00, // no locals
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x2A,
        0x01, 0x10, 0x00, 0x00, // tiny EH section, one clause
        0x00, 0x00,             // typed exception
        0x00, 0x00,             // try offset 0
        0x04,                   // try length 4
        0x04, 0x00,             // handler offset 4
        0x04,                   // handler length 4
        0x08, 0x00, 0x00, 0x02, // class token 0x02000008
    ];

    let body = MethodBody::parse(&data).unwrap();
    let mut eh = body.eh;
    assert_eq!(eh.len(), 1);
    assert_eq!(eh.clauses[0].kind, EhClauseKind::TypeFiltered);
    assert_eq!(eh.clauses[0].param, EhParam::Class(Token::new(0x0200_0008)));

    // clause ranges stay inside the code
    for clause in &eh.clauses {
        assert!((clause.try_offset + clause.try_length) as usize <= body.size_code);
        assert!((clause.handler_offset + clause.handler_length) as usize <= body.size_code);
    }

    let mut map = TokenMap::default();
    map.insert(
        Token::new(0x0200_0008),
        TokenValue::Type(TypeRef::Token(Token::new(0x0200_0008))),
    );
    eh.fix_params(&map);
    assert_eq!(
        eh.clauses[0].param,
        EhParam::Type(TypeRef::Token(Token::new(0x0200_0008)))
    );
}

#[test]
fn compressed_uint_round_trip() {
    for value in [0_u32, 1, 0x7F, 0x80, 0x1234, 0x3FFF, 0x4000, 0x1FFF_FFFF] {
        let mut encoded = Vec::new();
        compress_uint(value, &mut encoded).unwrap();

        let mut parser = Parser::new(&encoded);
        assert_eq!(parser.read_compressed_uint().unwrap(), value);

        let mut re_encoded = Vec::new();
        compress_uint(value, &mut re_encoded).unwrap();
        assert_eq!(encoded, re_encoded);
    }
}

#[test]
fn full_operand_schedule_lands_on_code_size() {
    // ldstr <token> / ldc.i4.s 5 / br.s -8 / ret
    #[rustfmt::skip]
    let code = code_only(&[
        0x72, 0x01, 0x00, 0x00, 0x70,
        0x1F, 0x05,
        0x2B, 0xF8,
        0x2A,
    ], 2);

    let mut map = TokenMap::default();
    map.insert(
        Token::new(0x7000_0001),
        TokenValue::String("hello".into()),
    );

    let mut reader = IlReader::new(&code, &map);
    assert_eq!(reader.read_opcode().unwrap(), 0x72);
    assert_eq!(
        reader.read_token().unwrap(),
        TokenValue::String("hello".into())
    );
    assert_eq!(reader.read_opcode().unwrap(), 0x1F);
    assert_eq!(reader.read_int8().unwrap(), 5);
    assert_eq!(reader.read_opcode().unwrap(), 0x2B);
    assert_eq!(reader.read_int8().unwrap(), -8);
    assert_eq!(reader.read_opcode().unwrap(), 0x2A);

    assert!(reader.end_of_code());
    assert_eq!(reader.pos(), reader.code_size());
}
