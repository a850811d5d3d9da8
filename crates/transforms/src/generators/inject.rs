//! Inject: call the handler next to a site, leaving the site itself alone.
//!
//! The handler receives a callback carrier and, optionally, the target's parameters first and
//! captured locals last. A cancellable injection checks the carrier afterwards and leaves the
//! procedure early when the handler cancelled it:
//!
//! ```text
//! NEW mixweave/runtime/CallbackInfo
//! DUP
//! LDC string "onTick"
//! ICONST_1
//! INVOKESPECIAL mixweave/runtime/CallbackInfo.<init>(Ljava/lang/String;Z)V
//! ASTORE 2
//! ALOAD 0
//! ALOAD 2
//! INVOKEVIRTUAL demo/Widget.onTick(Lmixweave/runtime/CallbackInfo;)V
//! ALOAD 2
//! INVOKEVIRTUAL mixweave/runtime/CallbackInfo.isCancelled()Z
//! IFEQ resume
//! RETURN
//! resume:
//! ```
//!
//! At a return of a value-returning procedure the returned value is parked, boxed into the
//! carrier, and pushed back after the call; cancelling substitutes the carried value.

use super::SpliceContext;
use crate::Result;
use crate::signature::{Coercion, coerce};
use crate::slots::{Buffered, SlotAllocator};
use crate::target::Shift;
use mixweave_core::insn::{CONSTRUCTOR, Dispatch, Instruction, JumpCond, MethodRef, StackOp};
use mixweave_core::literal::Literal;
use mixweave_core::sequence::{InsnId, Node};
use mixweave_core::types::{MethodType, OBJECT, STRING, Type};
use mixweave_core::unit::Procedure;

pub(super) fn splice(
    ctx: &SpliceContext<'_>,
    procedure: &mut Procedure,
    slots: &mut SlotAllocator,
    site: InsnId,
) -> Result<()> {
    let insn = super::site_instruction(procedure, site)?;
    let options = &ctx.handler.options;
    let ret = procedure.desc.ret.clone();
    let carrier = Type::object(if ret == Type::Void {
        ctx.config.callback_type.as_str()
    } else {
        ctx.config.returnable_callback_type.as_str()
    });

    if options.cancellable && procedure.is_constructor() {
        return Err(ctx.invalid("cancellable injection into a constructor"));
    }
    let ends_flow = insn.is_return()
        || matches!(
            insn,
            Instruction::Throw
                | Instruction::Switch { .. }
                | Instruction::Jump {
                    cond: JumpCond::Always,
                    ..
                }
        );
    if ctx.target.shift == Shift::After && ends_flow {
        return Err(ctx.invalid(format!("nothing runs after {}", insn.opcode())));
    }

    let (params, captures) = check_signature(ctx, procedure, &carrier)?;

    let mut nodes: Vec<Node> = Vec::new();
    let returned = if insn.is_return() && ret != Type::Void {
        let (buffered, stores) = Buffered::spill(slots, std::slice::from_ref(&ret));
        extend(&mut nodes, stores);
        Some(buffered)
    } else {
        None
    };

    let mut ctor_params = vec![Type::object(STRING), Type::Boolean];
    let mut build = vec![
        Instruction::Allocate {
            ty: carrier.cast_name(),
        },
        Instruction::Stack(StackOp::Dup),
        Instruction::push(Literal::String(ctx.handler.procedure.name.clone())),
        Instruction::push(Literal::Int(i32::from(options.cancellable))),
    ];
    if let Some(value) = &returned {
        build.extend(value.reload());
        build.extend(boxing(&ret));
        ctor_params.push(Type::object(OBJECT));
    }
    build.push(Instruction::invoke(
        Dispatch::Special,
        MethodRef::new(
            carrier.cast_name(),
            CONSTRUCTOR,
            MethodType::new(ctor_params, Type::Void),
        ),
    ));
    let info = slots.alloc(&carrier);
    build.push(Instruction::store(info, carrier.clone()));
    extend(&mut nodes, build);

    let mut args = Vec::new();
    if let Some(coercions) = &params {
        for ((slot, ty), coercion) in procedure
            .param_slots()
            .into_iter()
            .zip(&procedure.desc.params)
            .zip(coercions)
        {
            args.push(Instruction::load(slot, ty.clone()));
            args.extend(coercion.instructions());
        }
    }
    args.push(Instruction::load(info, carrier.clone()));
    for (slot, ty) in options.locals.iter().zip(&captures) {
        args.push(Instruction::load(*slot, ty.clone()));
    }
    let mut call = ctx.receiver(procedure)?;
    call.extend(args);
    call.push(ctx.call());
    extend(&mut nodes, call);

    if options.cancellable {
        let resume = procedure.body.new_label();
        let mut check = vec![
            Instruction::load(info, carrier.clone()),
            Instruction::invoke(
                Dispatch::Virtual,
                MethodRef::new(
                    carrier.cast_name(),
                    "isCancelled",
                    MethodType::new(Vec::new(), Type::Boolean),
                ),
            ),
            Instruction::jump(JumpCond::IfEq, resume),
        ];
        if ret != Type::Void {
            check.push(Instruction::load(info, carrier.clone()));
            check.push(Instruction::invoke(
                Dispatch::Virtual,
                MethodRef::new(
                    carrier.cast_name(),
                    "getReturnValue",
                    MethodType::new(Vec::new(), Type::object(OBJECT)),
                ),
            ));
            check.extend(unboxing(&ret));
        }
        check.push(Instruction::Return(ret.clone()));
        extend(&mut nodes, check);
        nodes.push(Node::Label(resume));
    }

    if let Some(value) = &returned {
        extend(&mut nodes, value.reload());
    }

    match ctx.target.shift {
        Shift::Before => procedure.body.insert_all_before(site, nodes)?,
        Shift::After => procedure.body.insert_all_after(site, nodes)?,
    };
    Ok(())
}

/// Checks the handler's parameters and returns the conversions for target parameters (when
/// the handler takes them) and the types of captured locals.
fn check_signature(
    ctx: &SpliceContext<'_>,
    procedure: &Procedure,
    carrier: &Type,
) -> Result<(Option<Vec<Coercion>>, Vec<Type>)> {
    let handler = &ctx.handler.procedure.desc;
    let locals = &ctx.handler.options.locals;
    let target_params = &procedure.desc.params;

    let long_form = handler.params.len() == target_params.len() + 1 + locals.len();
    let short_form = handler.params.len() == 1 + locals.len();
    let mut expected_params = target_params.clone();
    expected_params.push(carrier.clone());
    let tail = handler
        .params
        .len()
        .checked_sub(locals.len())
        .map(|at| handler.params[at..].to_vec())
        .unwrap_or_default();
    expected_params.extend(tail.iter().cloned());
    let expected = MethodType::new(expected_params, Type::Void);
    let mismatch = || ctx.mismatch(&expected);

    if handler.ret != Type::Void || !(long_form || short_form) {
        return Err(mismatch());
    }
    let offset = if long_form { target_params.len() } else { 0 };
    if coerce(carrier, &handler.params[offset], ctx.hierarchy) != Some(Coercion::Identity) {
        return Err(mismatch());
    }

    let params = if long_form && !target_params.is_empty() {
        let coercions = target_params
            .iter()
            .zip(&handler.params)
            .map(|(site, param)| coerce(site, param, ctx.hierarchy).ok_or_else(mismatch))
            .collect::<Result<Vec<_>>>()?;
        Some(coercions)
    } else {
        None
    };

    let captures = handler.params[offset + 1..].to_vec();
    for (slot, ty) in locals.iter().zip(&captures) {
        let declared = procedure
            .locals
            .iter()
            .flatten()
            .find(|local| local.slot == *slot)
            .map(|local| &local.ty);
        if let Some(declared) = declared
            && coerce(declared, ty, ctx.hierarchy) != Some(Coercion::Identity)
        {
            return Err(mismatch());
        }
    }
    Ok((params, captures))
}

fn extend(nodes: &mut Vec<Node>, insns: Vec<Instruction>) {
    nodes.extend(insns.into_iter().map(Node::Insn));
}

fn boxing(ty: &Type) -> Vec<Instruction> {
    match ty.boxing() {
        Some((wrapper, _)) => vec![Instruction::invoke(
            Dispatch::Static,
            MethodRef::new(
                wrapper,
                "valueOf",
                MethodType::new(vec![ty.clone()], Type::object(wrapper)),
            ),
        )],
        None => Vec::new(),
    }
}

fn unboxing(ty: &Type) -> Vec<Instruction> {
    match ty.boxing() {
        Some((wrapper, unbox)) => vec![
            Instruction::CheckCast {
                ty: Type::object(wrapper),
            },
            Instruction::invoke(
                Dispatch::Virtual,
                MethodRef::new(wrapper, unbox, MethodType::new(Vec::new(), ty.clone())),
            ),
        ],
        None if *ty == Type::object(OBJECT) => Vec::new(),
        None => vec![Instruction::CheckCast { ty: ty.clone() }],
    }
}
