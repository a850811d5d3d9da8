use crate::fixtures::{MIXED_ACCESS, procedure};
use color_eyre::Result;
use mixweave_core::Instruction;
use mixweave_core::asm::{parse_body, print_body};
use mixweave_core::literal::{Constant, Literal, PushForm};
use mixweave_core::opcode::Opcode;

#[test]
fn printed_listing_reparses_to_the_same_body() -> Result<()> {
    crate::init_tracing();
    let body = parse_body(MIXED_ACCESS)?;
    let listing = print_body(&body);
    let reparsed = parse_body(&listing)?;
    assert_eq!(reparsed, body, "{listing}");
    assert_eq!(print_body(&reparsed), listing);
    Ok(())
}

#[test]
fn push_forms_survive_the_listing() -> Result<()> {
    let body = parse_body(
        "
        ICONST_5
        BIPUSH 5
        SIPUSH 5
        LDC int 5
        LDC2_W long 1
        LCONST_1
        ",
    )?;
    let forms: Vec<_> = body
        .instructions()
        .filter_map(|(_, insn)| match insn {
            Instruction::Push(constant) => Some((constant.literal.clone(), constant.form)),
            _ => None,
        })
        .collect();
    assert_eq!(
        forms,
        vec![
            (Literal::Int(5), PushForm::Const),
            (Literal::Int(5), PushForm::Byte),
            (Literal::Int(5), PushForm::Short),
            (Literal::Int(5), PushForm::Pooled),
            (Literal::Long(1), PushForm::Pooled),
            (Literal::Long(1), PushForm::Const),
        ]
    );

    let listing = print_body(&body);
    for line in ["ICONST_5", "BIPUSH 5", "SIPUSH 5", "LDC int 5", "LDC2_W long 1", "LCONST_1"] {
        assert!(listing.lines().any(|l| l.trim() == line), "missing {line} in\n{listing}");
    }
    Ok(())
}

#[test]
fn push_forms_must_fit_their_literal() {
    assert!(Constant::with_form(Literal::Int(300), PushForm::Byte).is_err());
    assert!(Constant::with_form(Literal::Int(300), PushForm::Short).is_ok());
    assert!(Constant::with_form(Literal::String("x".into()), PushForm::Const).is_err());
    assert_eq!(
        Instruction::push(Literal::Int(300)).opcode(),
        Opcode::SIPUSH
    );
    assert_eq!(Instruction::push(Literal::Int(70_000)).opcode(), Opcode::LDC);
}

#[test]
fn fixture_procedures_reserve_argument_slots() {
    let mixed = procedure("demo/Probe", "mixed", "(I)D", false, MIXED_ACCESS);
    assert_eq!(mixed.max_locals, 2);
    let wide = procedure("demo/Probe", "wide", "(JD)V", true, "RETURN");
    assert_eq!(wide.max_locals, 4);
}

#[test]
fn unknown_mnemonics_and_duplicate_labels_are_rejected() {
    assert!(parse_body("FROB 1").is_err());
    assert!(parse_body("top:\ntop:\nRETURN").is_err());
    assert!(parse_body("GOTO nowhere").is_err());
}
