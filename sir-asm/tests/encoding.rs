use sir_asm::{CodeBuilder, EncodeError, Layout, Opcode};
use strum::IntoEnumIterator;

#[test]
fn every_layout_has_a_stable_width() {
    for op in Opcode::iter() {
        match op.layout() {
            Layout::Table => assert_eq!(op, Opcode::JmpTable),
            layout => {
                let len = layout.imm_len().expect("fixed-width layout");
                assert!(len <= 8, "{op} immediate too wide");
            }
        }
    }
}

#[test]
fn call_shape_encodes_id_then_count() {
    let mut b = CodeBuilder::new();
    b.with_id_count(Opcode::Call, 7, 2);
    let code = b.finish().unwrap();
    assert_eq!(code, [Opcode::Call as u8, 7, 0, 0, 0, 2]);
}

#[test]
fn jmp_table_layout() {
    let mut b = CodeBuilder::new();
    let default = b.new_label();
    let case = b.new_label();
    b.jmp_table(&[case], default);
    b.bind_label(default).unwrap();
    b.simple(Opcode::Nop);
    b.bind_label(case).unwrap();
    b.ret();
    let code = b.finish().unwrap();

    assert_eq!(code[0], Opcode::JmpTable as u8);
    assert_eq!(u16::from_le_bytes(code[1..3].try_into().unwrap()), 1);
    // default slot ends at 7; default bound at 11.
    assert_eq!(i32::from_le_bytes(code[3..7].try_into().unwrap()), 4);
    // case slot ends at 11; case bound at 12.
    assert_eq!(i32::from_le_bytes(code[7..11].try_into().unwrap()), 1);
}

#[test]
fn finish_reports_the_first_unbound_label() {
    let mut b = CodeBuilder::new();
    let bound = b.new_label();
    let unbound = b.new_label();
    b.with_jump(Opcode::Jmp, bound);
    b.with_jump(Opcode::JmpTrue, unbound);
    b.bind_label(bound).unwrap();
    assert_eq!(b.finish(), Err(EncodeError::UnboundLabel(1)));
}

#[test]
fn mnemonics_follow_the_dotted_convention() {
    for op in Opcode::iter() {
        let mnemonic = op.mnemonic();
        assert!(mnemonic.chars().all(|c| c.is_ascii_lowercase()
            || c.is_ascii_digit()
            || c == '.'
            || c == '$'));
    }
}
