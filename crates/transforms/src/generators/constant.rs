//! ModifyConstant: route one pushed literal through a handler.
//!
//! The handler returns the literal's type and either takes nothing or takes the original
//! value. In the second case the original push stays in front of the call exactly as it
//! was encoded.

use super::{SpliceContext, replace_site, site_instruction};
use crate::Result;
use mixweave_core::insn::Instruction;
use mixweave_core::sequence::InsnId;
use mixweave_core::types::MethodType;
use mixweave_core::unit::Procedure;

pub(super) fn splice(ctx: &SpliceContext<'_>, procedure: &mut Procedure, site: InsnId) -> Result<()> {
    let Instruction::Push(original) = site_instruction(procedure, site)? else {
        return Err(ctx.invalid("site does not push a constant"));
    };
    let ty = original.literal.ty();
    let expected = if ctx.handler.procedure.desc.params.is_empty() {
        MethodType::new(Vec::new(), ty)
    } else {
        MethodType::new(vec![ty.clone()], ty)
    };
    let plan = ctx.check(&expected)?;

    let mut args = Vec::new();
    if let Some(coercion) = plan.params.first() {
        args.push(Instruction::Push(original));
        args.extend(coercion.instructions());
    }
    let replacement = ctx.call_with(procedure, args, &plan)?;
    replace_site(&mut procedure.body, site, replacement)
}
