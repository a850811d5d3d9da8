//! WrapCondition: guard a field write or void invocation with a handler call.
//!
//! The handler sees the site's operands and answers whether to skip it:
//!
//! ```text
//! // stack: owner value
//! ISTORE 4
//! ASTORE 3
//! ALOAD 3
//! ILOAD 4
//! INVOKESTATIC demo/Widget.skipWrite(Ldemo/Widget;I)Z
//! IFNE skip
//! ALOAD 3
//! ILOAD 4
//! PUTFIELD demo/Widget.count:I
//! skip:
//! ```
//!
//! Only sites that leave nothing on the stack can be skipped without unbalancing it.

use super::{SpliceContext, consumed_operands, site_instruction};
use crate::Result;
use crate::slots::{Buffered, SlotAllocator};
use mixweave_core::insn::{FieldMode, Instruction, JumpCond};
use mixweave_core::sequence::{InsnId, Node};
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
            mode: FieldMode::Put,
            ..
        } => {}
        Instruction::Invoke { method, .. }
            if method.desc.ret == Type::Void && !method.is_constructor() => {}
        other => {
            return Err(ctx.invalid(format!(
                "{other} leaves a value behind and cannot be skipped"
            )));
        }
    }

    let operands = consumed_operands(&insn).unwrap_or_default();
    let plan = ctx.check(&MethodType::new(operands.clone(), Type::Boolean))?;
    let (buffered, mut guard) = Buffered::spill(slots, &operands);
    guard.extend(ctx.call_with(procedure, buffered.reload_coerced(&plan.params), &plan)?);

    let skip = procedure.body.new_label();
    guard.push(Instruction::jump(JumpCond::IfNe, skip));
    guard.extend(buffered.reload());

    procedure
        .body
        .insert_all_before(site, guard.into_iter().map(Node::Insn))?;
    procedure.body.insert_after(site, Node::Label(skip))?;
    Ok(())
}
