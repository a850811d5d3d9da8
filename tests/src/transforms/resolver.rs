use crate::fixtures::{self, procedure};
use color_eyre::Result;
use mixweave_core::Instruction;
use mixweave_core::opcode::Opcode;
use mixweave_core::sequence::InsnId;
use mixweave_core::unit::Procedure;
use mixweave_transform::resolver::{InstructionWindow, resolve_all, resolve_slice, resolve_targets};
use mixweave_transform::target::{SliceSpec, TargetDescriptor};
use mixweave_transform::{Error, SliceBound, SliceFailure};

fn mixed() -> Procedure {
    fixtures::probe().procedures.remove(0)
}

fn target(text: &str) -> TargetDescriptor {
    text.parse().unwrap()
}

fn opcodes(procedure: &Procedure, sites: &[InsnId]) -> Vec<Opcode> {
    sites
        .iter()
        .filter_map(|id| procedure.body.instruction(*id))
        .map(Instruction::opcode)
        .collect()
}

/// Sites of several descriptors in body order, each site once.
fn union(procedure: &Procedure, targets: &[&str]) -> Result<Vec<InsnId>> {
    let mut sites = Vec::new();
    for text in targets {
        for site in resolve_all(procedure, &target(text))? {
            if !sites.contains(&site) {
                sites.push(site);
            }
        }
    }
    sites.sort_by_key(|id| procedure.body.index_of(*id));
    Ok(sites)
}

#[test]
fn returns_and_tail() -> Result<()> {
    crate::init_tracing();
    let mixed = mixed();
    let returns = resolve_all(&mixed, &target("RETURN"))?;
    assert_eq!(opcodes(&mixed, &returns), vec![Opcode::IRETURN, Opcode::DRETURN]);
    let tail = resolve_all(&mixed, &target("TAIL"))?;
    assert_eq!(opcodes(&mixed, &tail), vec![Opcode::DRETURN]);
    let throws = resolve_all(&mixed, &target("THROW"))?;
    assert_eq!(opcodes(&mixed, &throws), vec![Opcode::ATHROW]);
    Ok(())
}

#[test]
fn field_kinds_cover_static_and_instance_accesses() -> Result<()> {
    let mixed = mixed();
    let field = union(
        &mixed,
        &["FIELD:demo/Probe;static:I", "FIELD:demo/Probe;virtual:Z"],
    )?;
    assert_eq!(
        opcodes(&mixed, &field),
        vec![Opcode::GETSTATIC, Opcode::PUTSTATIC, Opcode::GETFIELD, Opcode::PUTFIELD]
    );

    let reads = union(
        &mixed,
        &["GETFIELD:demo/Probe;static:I", "GETFIELD:demo/Probe;virtual:Z"],
    )?;
    assert_eq!(opcodes(&mixed, &reads), vec![Opcode::GETSTATIC, Opcode::GETFIELD]);

    let writes = resolve_all(&mixed, &target("PUTFIELD:virtual"))?;
    assert_eq!(opcodes(&mixed, &writes), vec![Opcode::PUTFIELD]);
    Ok(())
}

#[test]
fn ordinals_pick_from_the_full_match_list() -> Result<()> {
    let calls = procedure(
        fixtures::COUNTER,
        "calls",
        "()I",
        true,
        "
        ICONST_1
        INVOKESTATIC demo/Sink.record(I)V
        LDC int 1
        INVOKESTATIC demo/Sink.record(I)V
        ICONST_1
        IRETURN
        ",
    );
    let cases = [
        (mixed(), "RETURN", 2),
        (mixed(), "THROW", 1),
        (mixed(), "FIELD:demo/Probe;static:I", 2),
        (mixed(), "FIELD:virtual", 2),
        (mixed(), "OPCODE:ILOAD", 2),
        (calls.clone(), "INVOKE:demo/Sink;record(I)V", 2),
        (calls, "CONSTANT:int 1", 3),
    ];
    for (procedure, text, count) in cases {
        let all = resolve_all(&procedure, &target(text))?;
        assert_eq!(all.len(), count, "{text}");
        for (ordinal, expected) in all.iter().enumerate() {
            let one = resolve_all(&procedure, &target(&format!("{text}@{ordinal}")))?;
            assert_eq!(one, vec![*expected], "{text}@{ordinal}");
        }
        let past = resolve_all(&procedure, &target(&format!("{text}@{count}")))?;
        assert!(past.is_empty(), "{text}@{count}");
    }
    Ok(())
}

#[test]
fn unbounded_slices_leave_the_body_whole() -> Result<()> {
    let mixed = mixed();
    let whole = InstructionWindow::whole(&mixed.body);
    assert_eq!(resolve_slice(&mixed, None)?, whole);
    assert_eq!(resolve_slice(&mixed, Some(&SliceSpec::default()))?, whole);

    let slice = SliceSpec {
        from: Some(target("OPCODE:SWAP")),
        to: Some(target("TAIL")),
    };
    let window = resolve_slice(&mixed, Some(&slice))?;
    let returns = resolve_targets(&mixed, &window, &target("RETURN"))?;
    assert_eq!(returns, resolve_all(&mixed, &target("RETURN"))?);
    let reads = resolve_targets(&mixed, &window, &target("GETFIELD:virtual"))?;
    assert!(reads.is_empty());
    Ok(())
}

#[test]
fn slice_bounds_must_match_exactly_once() {
    let mixed = mixed();
    let slice = |from: &str, to: &str| SliceSpec {
        from: Some(target(from)),
        to: Some(target(to)),
    };

    let err = resolve_slice(&mixed, Some(&slice("OPCODE:ILOAD", "TAIL"))).unwrap_err();
    assert!(matches!(
        err,
        Error::SliceResolution {
            bound: SliceBound::From,
            reason: SliceFailure::Ambiguous(2),
            ..
        }
    ));

    let err = resolve_slice(&mixed, Some(&slice("HEAD", "INVOKE:nowhere"))).unwrap_err();
    assert!(matches!(
        err,
        Error::SliceResolution {
            bound: SliceBound::To,
            reason: SliceFailure::NotFound,
            ..
        }
    ));

    let err = resolve_slice(&mixed, Some(&slice("TAIL", "HEAD"))).unwrap_err();
    assert!(matches!(
        err,
        Error::SliceResolution {
            reason: SliceFailure::Inverted,
            ..
        }
    ));
}

#[test]
fn head_follows_the_delegated_constructor_call() -> Result<()> {
    let init = procedure(
        fixtures::COUNTER,
        "<init>",
        "()V",
        false,
        "
        ALOAD 0 Ldemo/Counter;
        NEW demo/Helper
        DUP
        INVOKESPECIAL demo/Helper.<init>()V
        POP
        INVOKESPECIAL java/lang/Object.<init>()V
        ICONST_0
        POP
        RETURN
        ",
    );
    let head = resolve_all(&init, &target("HEAD"))?;
    assert_eq!(opcodes(&init, &head), vec![Opcode::ICONST_0]);

    let allocations = resolve_all(&init, &target("NEW:demo/Helper()V"))?;
    assert_eq!(opcodes(&init, &allocations), vec![Opcode::NEW]);
    assert!(resolve_all(&init, &target("NEW:demo/Helper(I)V"))?.is_empty());
    Ok(())
}

#[test]
fn constants_match_by_value_across_forms() -> Result<()> {
    let limits = procedure(
        fixtures::COUNTER,
        "limits",
        "()I",
        true,
        "BIPUSH 7\nLDC int 7\nIADD\nICONST_5\nIADD\nIRETURN",
    );
    assert_eq!(resolve_all(&limits, &target("CONSTANT:int 7"))?.len(), 2);
    assert_eq!(resolve_all(&limits, &target("CONSTANT:int 5"))?.len(), 1);
    assert!(resolve_all(&limits, &target("CONSTANT:long 7"))?.is_empty());
    Ok(())
}
