//! Redirect: replace a field access, invocation or allocation with a handler call.
//!
//! | site | handler |
//! |---|---|
//! | `GETSTATIC T` | `()T` |
//! | `GETFIELD O.T` | `(O)T` |
//! | `PUTSTATIC T` | `(T)V` |
//! | `PUTFIELD O.T` | `(O T)V` |
//! | `INVOKE* O.m(A)R` | `([O] A)R` |
//! | `NEW T` + `<init>(A)V` | `(A)T` |
//!
//! Handler results may be narrower or wider than the site's type; the difference is bridged
//! with a widening opcode or a `CHECKCAST`.

use super::{SpliceContext, consumed_operands, replace_site, site_instruction};
use crate::Result;
use crate::resolver::paired_constructor;
use crate::slots::{Buffered, SlotAllocator};
use mixweave_core::insn::{FieldMode, Instruction, Scope, StackOp};
use mixweave_core::sequence::InsnId;
use mixweave_core::types::{MethodType, Type};
use mixweave_core::unit::Procedure;

pub(super) fn splice(
    ctx: &SpliceContext<'_>,
    procedure: &mut Procedure,
    slots: &mut SlotAllocator,
    site: InsnId,
) -> Result<()> {
    let insn = site_instruction(procedure, site)?;
    match &insn {
        Instruction::Field {
            mode: FieldMode::Get,
            scope,
            field,
        } => {
            let params = match scope {
                Scope::Static => Vec::new(),
                Scope::Instance => vec![Type::object(field.owner.clone())],
            };
            let plan = ctx.check(&MethodType::new(params, field.ty.clone()))?;
            let mut replacement = Vec::new();
            if !ctx.handler.procedure.is_static {
                replacement.extend(ctx.receiver(procedure)?);
                if *scope == Scope::Instance {
                    // The owner is already on the stack; slide the receiver beneath it.
                    replacement.push(Instruction::Stack(StackOp::Swap));
                }
            }
            if let Some(coercion) = plan.params.first() {
                replacement.extend(coercion.instructions());
            }
            replacement.push(ctx.call());
            replacement.extend(plan.ret.instructions());
            replace_site(&mut procedure.body, site, replacement)
        }
        Instruction::Field {
            mode: FieldMode::Put,
            ..
        }
        | Instruction::Invoke { .. } => {
            if let Instruction::Invoke { method, .. } = &insn
                && method.is_constructor()
            {
                return Err(ctx.invalid("constructor calls are redirected through NEW"));
            }
            let operands = consumed_operands(&insn).unwrap_or_default();
            let ret = match &insn {
                Instruction::Invoke { method, .. } => method.desc.ret.clone(),
                _ => Type::Void,
            };
            let plan = ctx.check(&MethodType::new(operands.clone(), ret))?;
            let (buffered, mut replacement) = Buffered::spill(slots, &operands);
            replacement.extend(ctx.call_with(
                procedure,
                buffered.reload_coerced(&plan.params),
                &plan,
            )?);
            replace_site(&mut procedure.body, site, replacement)
        }
        Instruction::Allocate { ty } => {
            let init = paired_constructor(&procedure.body, site)
                .ok_or_else(|| ctx.invalid(format!("NEW {ty} is never initialised")))?;
            let Some(Instruction::Invoke { method, .. }) = procedure.body.instruction(init) else {
                return Err(ctx.invalid(format!("NEW {ty} is never initialised")));
            };
            let args = method.desc.params.clone();
            let allocated = Type::object(ty.clone());
            let plan = ctx.check(&MethodType::new(args.clone(), allocated))?;

            let dup = procedure
                .body
                .next(site)
                .filter(|id| procedure.body.instruction(*id) == Some(&Instruction::Stack(StackOp::Dup)));
            let (buffered, mut replacement) = Buffered::spill(slots, &args);
            replacement.extend(ctx.call_with(
                procedure,
                buffered.reload_coerced(&plan.params),
                &plan,
            )?);
            if dup.is_none() {
                replacement.push(Instruction::Stack(StackOp::Pop));
            }

            replace_site(&mut procedure.body, init, replacement)?;
            if let Some(dup) = dup {
                procedure.body.remove(dup)?;
            }
            procedure.body.remove(site)?;
            Ok(())
        }
        other => Err(ctx.invalid(format!("{} cannot be redirected", other.opcode()))),
    }
}
