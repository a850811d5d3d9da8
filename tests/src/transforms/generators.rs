use crate::fixtures::{self, COUNTER, guard, handler, hooks, procedure, weave};
use crate::interp::{Machine, Value};
use color_eyre::Result;
use mixweave_core::asm::print_body;
use mixweave_core::types::MethodType;
use mixweave_core::unit::CompiledUnit;
use mixweave_transform::Error;
use mixweave_transform::handler::{HandlerOptions, InjectionKind};
use std::cell::Cell;
use std::rc::Rc;

const CALLS: usize = 4;

fn listing(unit: &CompiledUnit, name: &str, desc: &str) -> Result<Vec<String>> {
    let desc = MethodType::parse(desc)?;
    let procedure = unit
        .procedure(name, &desc)
        .ok_or_else(|| color_eyre::eyre::eyre!("{name}{desc} missing"))?;
    Ok(print_body(&procedure.body)
        .lines()
        .map(|line| line.trim().to_string())
        .collect())
}

fn bump_times(unit: CompiledUnit, machine: &mut Machine) -> Result<Option<Value>> {
    machine.load(unit);
    let counter = machine.allocate(COUNTER);
    for _ in 0..CALLS {
        machine.invoke(COUNTER, "bump", "()V", vec![counter.clone()])?;
    }
    Ok(machine
        .object(&counter)
        .and_then(|object| object.fields.get("hits"))
        .cloned())
}

#[test]
fn wrap_condition_skips_writes_while_the_guard_holds() -> Result<()> {
    crate::init_tracing();
    for (answer, expected) in [(true, None), (false, Some(Value::Int(CALLS as i32)))] {
        let guard = guard(answer, "(Ldemo/Counter;I)Z", "PUTFIELD:demo/Counter;hits:I");
        let (woven, report) = weave(fixtures::counter(), hooks(vec![guard]), false)?;
        assert_eq!(report.sites, 1);

        let mut machine = Machine::new();
        let hits = bump_times(woven, &mut machine)?;
        assert_eq!(hits, expected, "guard answering {answer}");
        assert_eq!(
            machine.count_calls("demo/Counter.skip(Ldemo/Counter;I)Z"),
            CALLS
        );
    }
    Ok(())
}

#[test]
fn wrap_condition_skips_void_calls() -> Result<()> {
    for (answer, expected) in [(true, 0), (false, CALLS)] {
        let guard = guard(answer, "(I)Z", "INVOKE:demo/Sink;record(I)V");
        let (woven, _) = weave(fixtures::counter(), hooks(vec![guard]), false)?;

        let recorded = Rc::new(Cell::new(0));
        let sink = Rc::clone(&recorded);
        let mut machine = Machine::new();
        machine.load(woven).native("demo/Sink.record(I)V", move |_| {
            sink.set(sink.get() + 1);
            None
        });
        let counter = machine.allocate(COUNTER);
        for n in 0..CALLS {
            machine.invoke(COUNTER, "ping", "(I)V", vec![counter.clone(), Value::Int(n as i32)])?;
        }
        assert_eq!(recorded.get(), expected, "guard answering {answer}");
    }
    Ok(())
}

#[test]
fn wrap_condition_rejects_sites_that_leave_a_value() {
    let guard = guard(true, "(Ldemo/Counter;)Z", "GETFIELD:hits");
    let err = weave(fixtures::counter(), hooks(vec![guard]), false).unwrap_err();
    assert!(matches!(err, Error::InvalidTarget { .. }), "{err}");
}

#[test]
fn modify_constant_keeps_the_original_push() -> Result<()> {
    let mut unit = fixtures::counter();
    unit.procedures.push(procedure(
        COUNTER,
        "limit",
        "()I",
        true,
        "SIPUSH 300\nIRETURN",
    ));
    let scale = handler(
        "scale",
        "(I)I",
        InjectionKind::ModifyConstant,
        "CONSTANT:int 300",
        "ILOAD 0\nICONST_2\nIMUL\nIRETURN",
    );
    let (woven, _) = weave(unit, hooks(vec![scale]), false)?;
    assert_eq!(
        listing(&woven, "limit", "()I")?,
        vec!["SIPUSH 300", "INVOKESTATIC demo/Counter.scale(I)I", "IRETURN"]
    );

    let mut machine = Machine::new();
    machine.load(woven);
    assert_eq!(
        machine.invoke(COUNTER, "limit", "()I", Vec::new())?,
        Some(Value::Int(600))
    );
    Ok(())
}

#[test]
fn modify_constant_replaces_the_push_with_a_supplier() -> Result<()> {
    let mut unit = fixtures::counter();
    unit.procedures.push(procedure(
        COUNTER,
        "limit",
        "()I",
        true,
        "LDC int 300\nIRETURN",
    ));
    let supply = handler(
        "supply",
        "()I",
        InjectionKind::ModifyConstant,
        "CONSTANT:int 300",
        "BIPUSH 9\nIRETURN",
    );
    let (woven, _) = weave(unit, hooks(vec![supply]), false)?;
    assert_eq!(
        listing(&woven, "limit", "()I")?,
        vec!["INVOKESTATIC demo/Counter.supply()I", "IRETURN"]
    );
    Ok(())
}

#[test]
fn redirected_reads_take_the_handler_value() -> Result<()> {
    let base = handler(
        "base",
        "(Ldemo/Counter;)I",
        InjectionKind::Redirect,
        "GETFIELD:demo/Counter;hits:I",
        "BIPUSH 41\nIRETURN",
    );
    let (woven, _) = weave(fixtures::counter(), hooks(vec![base]), false)?;
    let bump = listing(&woven, "bump", "()V")?;
    assert!(!bump.iter().any(|line| line.starts_with("GETFIELD")), "{bump:?}");

    let mut machine = Machine::new();
    machine.load(woven);
    let counter = machine.allocate(COUNTER);
    machine.invoke(COUNTER, "bump", "()V", vec![counter.clone()])?;
    let hits = machine
        .object(&counter)
        .and_then(|object| object.fields.get("hits"))
        .cloned();
    assert_eq!(hits, Some(Value::Int(42)));
    Ok(())
}

#[test]
fn redirected_reads_need_the_receiver() {
    let base = handler(
        "base",
        "()I",
        InjectionKind::Redirect,
        "GETFIELD:demo/Counter;hits:I",
        "BIPUSH 41\nIRETURN",
    );
    let err = weave(fixtures::counter(), hooks(vec![base]), false).unwrap_err();
    assert!(matches!(err, Error::SignatureMismatch { .. }), "{err}");
}

#[test]
fn cancellable_injection_leaves_early() -> Result<()> {
    for (cancelled, expected) in [(1, None), (0, Some(Value::Int(1)))] {
        let mut on_bump = handler(
            "onBump",
            "(Lmixweave/runtime/CallbackInfo;)V",
            InjectionKind::Inject,
            "HEAD",
            "RETURN",
        )
        .with_options(HandlerOptions {
            cancellable: true,
            ..HandlerOptions::default()
        });
        on_bump.methods = vec!["bump".parse()?];
        let (woven, _) = weave(fixtures::counter(), hooks(vec![on_bump]), false)?;

        let mut machine = Machine::new();
        machine.native(
            "mixweave/runtime/CallbackInfo.isCancelled()Z",
            move |_| Some(Value::Int(cancelled)),
        );
        machine.load(woven);
        let counter = machine.allocate(COUNTER);
        machine.invoke(COUNTER, "bump", "()V", vec![counter.clone()])?;
        let hits = machine
            .object(&counter)
            .and_then(|object| object.fields.get("hits"))
            .cloned();
        assert_eq!(hits, expected, "isCancelled answering {cancelled}");
        assert_eq!(machine.count_calls("demo/Counter.onBump(Lmixweave/runtime/CallbackInfo;)V"), 1);
    }
    Ok(())
}
