use crate::fixtures::{self, COUNTER, COUNTER_HOOKS, hooks, procedure, weave};
use crate::interp::{Machine, Value};
use color_eyre::Result;
use mixweave_core::types::Type;
use mixweave_core::unit::{Annotation, Field};
use mixweave_transform::Error;
use mixweave_transform::handler::HandlerUnit;

fn super_init(extra: &str) -> String {
    format!(
        "
        ALOAD 0 Ldemo/CounterHooks;
        INVOKESPECIAL java/lang/Object.<init>()V
        {extra}
        RETURN
        "
    )
}

fn initializing_hooks(second_init: Option<&str>) -> HandlerUnit {
    let mut hooks = hooks(Vec::new());
    hooks.unit.fields.push(Field::new("limit", Type::Int, false));
    hooks.unit.fields.push(Field::new("created", Type::Int, true));
    hooks.unit.procedures.push(procedure(
        COUNTER_HOOKS,
        "<init>",
        "()V",
        false,
        &super_init("ALOAD 0 Ldemo/CounterHooks;\nBIPUSH 10\nPUTFIELD demo/CounterHooks.limit:I"),
    ));
    if let Some(push) = second_init {
        hooks.unit.procedures.push(procedure(
            COUNTER_HOOKS,
            "<init>",
            "(I)V",
            false,
            &super_init(&format!(
                "ALOAD 0 Ldemo/CounterHooks;\n{push}\nPUTFIELD demo/CounterHooks.limit:I"
            )),
        ));
    }
    hooks.unit.procedures.push(procedure(
        COUNTER_HOOKS,
        "<clinit>",
        "()V",
        true,
        "ICONST_3\nPUTSTATIC demo/CounterHooks.created:I\nRETURN",
    ));
    hooks
}

#[test]
fn initializers_run_in_the_target_constructors() -> Result<()> {
    crate::init_tracing();
    let (woven, report) = weave(fixtures::counter(), initializing_hooks(None), false)?;
    assert!(report.merged >= 4, "{report:?}");
    assert!(woven.field("limit").is_some_and(|f| !f.is_static));

    let mut machine = Machine::new();
    machine.load(woven);
    machine.invoke(COUNTER, "<clinit>", "()V", Vec::new())?;
    assert_eq!(machine.static_field(COUNTER, "created"), Some(&Value::Int(3)));

    let counter = machine.allocate(COUNTER);
    machine.invoke(COUNTER, "<init>", "()V", vec![counter.clone()])?;
    let limit = machine
        .object(&counter)
        .and_then(|object| object.fields.get("limit"))
        .cloned();
    assert_eq!(limit, Some(Value::Int(10)));
    Ok(())
}

#[test]
fn identical_initializers_in_several_constructors_merge_once() -> Result<()> {
    let (woven, _) = weave(fixtures::counter(), initializing_hooks(Some("BIPUSH 10")), false)?;
    let puts = woven
        .procedures
        .iter()
        .filter(|p| p.is_constructor())
        .flat_map(|p| p.body.instructions().map(|(_, insn)| insn.to_string()).collect::<Vec<_>>())
        .filter(|line| line == "PUTFIELD demo/Counter.limit:I")
        .count();
    assert_eq!(puts, 1);
    Ok(())
}

#[test]
fn divergent_initializers_are_rejected() -> Result<()> {
    let err = weave(fixtures::counter(), initializing_hooks(Some("LDC int 10")), false).unwrap_err();
    assert!(
        matches!(&err, Error::MergeDivergence { unit, field } if unit == COUNTER_HOOKS && field == "limit"),
        "{err}"
    );

    let (unit, report) = weave(fixtures::counter(), initializing_hooks(Some("LDC int 10")), true)?;
    assert_eq!(unit, fixtures::counter());
    assert_eq!(report.failed.len(), 1);
    assert!(!report.is_modified());
    Ok(())
}

#[test]
fn shadow_members_bind_to_the_target() -> Result<()> {
    let mut hooks = hooks(Vec::new());
    let mut hits = Field::new("hits", Type::Int, false);
    hits.annotations.push(Annotation::marker(Annotation::SHADOW));
    hooks.unit.fields.push(hits);
    hooks.unit.procedures.push(procedure(
        COUNTER_HOOKS,
        "twice",
        "()I",
        false,
        "
        ALOAD 0 Ldemo/CounterHooks;
        GETFIELD demo/CounterHooks.hits:I
        ICONST_2
        IMUL
        IRETURN
        ",
    ));
    let (woven, _) = weave(fixtures::counter(), hooks, false)?;
    assert_eq!(woven.fields.len(), 1);

    let mut machine = Machine::new();
    machine.load(woven);
    let counter = machine.allocate(COUNTER);
    for _ in 0..2 {
        machine.invoke(COUNTER, "bump", "()V", vec![counter.clone()])?;
    }
    assert_eq!(
        machine.invoke(COUNTER, "twice", "()I", vec![counter])?,
        Some(Value::Int(4))
    );
    Ok(())
}

#[test]
fn shadows_without_a_counterpart_fail() {
    let mut hooks = hooks(Vec::new());
    let mut total = Field::new("total", Type::Long, false);
    total.annotations.push(Annotation::marker(Annotation::SHADOW));
    hooks.unit.fields.push(total);
    let err = weave(fixtures::counter(), hooks, false).unwrap_err();
    assert!(matches!(err, Error::ShadowNotFound { .. }), "{err}");
}

#[test]
fn overwritten_procedures_replace_the_target_body() -> Result<()> {
    let mut hooks = hooks(Vec::new());
    let mut ping = procedure(COUNTER_HOOKS, "ping", "(I)V", false, "RETURN");
    ping.annotations.push(Annotation::marker(Annotation::OVERWRITE));
    hooks.unit.procedures.push(ping);
    let (woven, _) = weave(fixtures::counter(), hooks, false)?;

    let mut machine = Machine::new();
    machine.load(woven);
    let counter = machine.allocate(COUNTER);
    machine.invoke(COUNTER, "ping", "(I)V", vec![counter, Value::Int(1)])?;
    assert_eq!(machine.count_calls("demo/Sink.record(I)V"), 0);
    Ok(())
}

#[test]
fn added_members_must_not_clash() {
    let mut hooks = hooks(Vec::new());
    hooks.unit.fields.push(Field::new("hits", Type::Int, false));
    let err = weave(fixtures::counter(), hooks, false).unwrap_err();
    assert!(matches!(err, Error::MergeConflict { .. }), "{err}");
}
