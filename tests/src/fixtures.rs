//! Units and bodies used across the integration tests.

use mixweave_core::asm::parse_body;
use mixweave_core::types::{MethodType, Type};
use mixweave_core::unit::{CompiledUnit, Field, Procedure};
use mixweave_transform::handler::{HandlerProcedure, HandlerUnit, InjectionKind};
use mixweave_transform::hierarchy::ClassHierarchy;
use mixweave_transform::registry::HandlerRegistry;
use mixweave_transform::weaver::{WeaveReport, Weaver};
use mixweave_transform::{Result, WeaveConfig};
use std::sync::Arc;

pub const PROBE: &str = "demo/Probe";
pub const COUNTER: &str = "demo/Counter";
pub const COUNTER_HOOKS: &str = "demo/CounterHooks";

/// Builds a procedure from assembly text. Panics on malformed fixtures.
pub fn procedure(owner: &str, name: &str, desc: &str, is_static: bool, text: &str) -> Procedure {
    let desc = MethodType::parse(desc).unwrap_or_else(|e| panic!("fixture descriptor {desc}: {e}"));
    let body = parse_body(text).unwrap_or_else(|e| panic!("fixture body of {name}: {e}"));
    Procedure::new(owner, name, desc, is_static, body)
}

/// A procedure touching a static int and an instance boolean, returning from two places and
/// throwing from a third.
pub const MIXED_ACCESS: &str = "
    GETSTATIC demo/Probe.static:I
    PUTSTATIC demo/Probe.static:I
    ALOAD 0 Ldemo/Probe;
    GETFIELD demo/Probe.virtual:Z
    ALOAD 0 Ldemo/Probe;
    SWAP
    PUTFIELD demo/Probe.virtual:Z
    ILOAD 1
    IFEQ negative
    ICONST_1
    IRETURN
negative:
    ILOAD 1
    IFGE done
    NEW java/lang/IllegalStateException
    ATHROW
done:
    DCONST_0
    DRETURN
";

pub fn probe() -> CompiledUnit {
    let mut unit = CompiledUnit::new(PROBE, Some("java/lang/Object".into()));
    unit.fields.push(Field::new("static", Type::Int, true));
    unit.fields.push(Field::new("virtual", Type::Boolean, false));
    unit.procedures
        .push(procedure(PROBE, "mixed", "(I)D", false, MIXED_ACCESS));
    unit
}

/// `bump()` increments `hits`; `ping()` reports to `demo/Sink.record()`.
pub fn counter() -> CompiledUnit {
    let mut unit = CompiledUnit::new(COUNTER, Some("java/lang/Object".into()));
    unit.fields.push(Field::new("hits", Type::Int, false));
    unit.procedures.push(procedure(
        COUNTER,
        "<init>",
        "()V",
        false,
        "
        ALOAD 0 Ldemo/Counter;
        INVOKESPECIAL java/lang/Object.<init>()V
        RETURN
        ",
    ));
    unit.procedures.push(procedure(
        COUNTER,
        "bump",
        "()V",
        false,
        "
        ALOAD 0 Ldemo/Counter;
        DUP
        GETFIELD demo/Counter.hits:I
        ICONST_1
        IADD
        PUTFIELD demo/Counter.hits:I
        RETURN
        ",
    ));
    unit.procedures.push(procedure(
        COUNTER,
        "ping",
        "(I)V",
        false,
        "
        ILOAD 1
        INVOKESTATIC demo/Sink.record(I)V
        RETURN
        ",
    ));
    unit
}

/// A static handler of `demo/CounterHooks` applied to every procedure of [`counter`].
pub fn handler(name: &str, desc: &str, kind: InjectionKind, at: &str, text: &str) -> HandlerProcedure {
    HandlerProcedure::new(
        procedure(COUNTER_HOOKS, name, desc, true, text),
        kind,
        vec!["*".parse().unwrap_or_else(|e| panic!("{e}"))],
        vec![at.parse().unwrap_or_else(|e| panic!("{e}"))],
    )
}

/// `demo/CounterHooks`, targeting [`counter`], declaring `handlers`.
pub fn hooks(handlers: Vec<HandlerProcedure>) -> HandlerUnit {
    handlers.into_iter().fold(
        HandlerUnit::new(
            CompiledUnit::new(COUNTER_HOOKS, Some("java/lang/Object".into())),
            vec![COUNTER.into()],
        ),
        HandlerUnit::with_handler,
    )
}

/// A `skip` guard that always answers `answer`.
pub fn guard(answer: bool, desc: &str, at: &str) -> HandlerProcedure {
    let push = if answer { "ICONST_1" } else { "ICONST_0" };
    handler(
        "skip",
        desc,
        InjectionKind::WrapCondition,
        at,
        &format!("{push}\nIRETURN Z"),
    )
}

/// Weaves `hooks` into `unit` with a fresh weaver.
pub fn weave(
    mut unit: CompiledUnit,
    hooks: HandlerUnit,
    best_effort: bool,
) -> Result<(CompiledUnit, WeaveReport)> {
    let registry = HandlerRegistry::new();
    registry.register(hooks)?;
    let config = WeaveConfig {
        best_effort,
        ..WeaveConfig::default()
    };
    let weaver = Weaver::new(config, Arc::new(registry), Arc::new(ClassHierarchy::new()));
    let report = weaver.weave_unit(&mut unit)?;
    Ok((unit, report))
}
