//! Call-splice generators.
//!
//! One generator per [`InjectionKind`]; [`splice`] picks it with an exhaustive match. Every
//! generator first derives the descriptor its handler must have from the site, checks it,
//! builds the bridging instructions, and only then touches the body.
//!
//! Handler calls always name the target unit as owner: the handler procedure is merged into
//! the target afterwards, so the reference is valid once the unit is complete.

pub mod constant;
pub mod inject;
pub mod redirect;
pub mod wrap;

use crate::handler::{HandlerProcedure, InjectionKind};
use crate::hierarchy::ClassHierarchy;
use crate::signature::{CallPlan, check_call};
use crate::slots::SlotAllocator;
use crate::target::TargetDescriptor;
use crate::{Error, Result, WeaveConfig};
use mixweave_core::insn::{Dispatch, Instruction, MethodRef};
use mixweave_core::sequence::{InsnId, InstructionSequence, Node};
use mixweave_core::types::{MethodType, Type};
use mixweave_core::unit::Procedure;
use tracing::debug;

/// Everything a generator needs besides the body it rewrites.
pub struct SpliceContext<'a> {
    /// Internal name of the unit being woven.
    pub unit: &'a str,
    pub unit_is_interface: bool,
    pub handler: &'a HandlerProcedure,
    /// Descriptor the sites were resolved from.
    pub target: &'a TargetDescriptor,
    pub config: &'a WeaveConfig,
    pub hierarchy: &'a ClassHierarchy,
}

impl SpliceContext<'_> {
    pub fn handler_id(&self) -> String {
        self.handler.id()
    }

    pub fn invalid(&self, reason: impl Into<String>) -> Error {
        Error::InvalidTarget {
            handler: self.handler_id(),
            target: self.target.to_string(),
            reason: reason.into(),
        }
    }

    pub fn mismatch(&self, expected: &MethodType) -> Error {
        Error::SignatureMismatch {
            expected: expected.to_string(),
            actual: self.handler.procedure.desc.to_string(),
            handler: self.handler_id(),
        }
    }

    /// Checks the handler against the descriptor the site implies.
    pub fn check(&self, expected: &MethodType) -> Result<CallPlan> {
        check_call(
            &self.handler_id(),
            expected,
            &self.handler.procedure.desc,
            self.hierarchy,
        )
    }

    /// Receiver load for instance handlers; nothing for static ones.
    pub fn receiver(&self, procedure: &Procedure) -> Result<Vec<Instruction>> {
        if self.handler.procedure.is_static {
            return Ok(Vec::new());
        }
        if procedure.is_static {
            return Err(self.invalid(format!(
                "instance handler cannot be called from static {}",
                procedure.name
            )));
        }
        Ok(vec![Instruction::load_this(self.unit)])
    }

    /// The handler invocation, owned by the target unit.
    pub fn call(&self) -> Instruction {
        let handler = &self.handler.procedure;
        let dispatch = if handler.is_static {
            Dispatch::Static
        } else if self.unit_is_interface {
            Dispatch::Interface
        } else {
            Dispatch::Virtual
        };
        Instruction::invoke(
            dispatch,
            MethodRef::new(self.unit, handler.name.clone(), handler.desc.clone()),
        )
    }

    /// Receiver, `args`, the call and the result conversion, in that order.
    pub fn call_with(
        &self,
        procedure: &Procedure,
        args: Vec<Instruction>,
        plan: &CallPlan,
    ) -> Result<Vec<Instruction>> {
        let mut out = self.receiver(procedure)?;
        out.extend(args);
        out.push(self.call());
        out.extend(plan.ret.instructions());
        Ok(out)
    }
}

/// Stack operands a field access or invocation consumes, bottom first.
pub(crate) fn consumed_operands(insn: &Instruction) -> Option<Vec<Type>> {
    use mixweave_core::insn::{FieldMode, Scope};
    match insn {
        Instruction::Field { mode, scope, field } => {
            let mut operands = Vec::new();
            if *scope == Scope::Instance {
                operands.push(Type::object(field.owner.clone()));
            }
            if *mode == FieldMode::Put {
                operands.push(field.ty.clone());
            }
            Some(operands)
        }
        Instruction::Invoke { dispatch, method } => {
            let mut operands = Vec::new();
            if *dispatch != Dispatch::Static {
                operands.push(Type::object(method.owner.clone()));
            }
            operands.extend(method.desc.params.iter().cloned());
            Some(operands)
        }
        _ => None,
    }
}

/// Swaps the instruction at `site` for `replacement`.
pub(crate) fn replace_site(
    body: &mut InstructionSequence,
    site: InsnId,
    replacement: Vec<Instruction>,
) -> Result<()> {
    body.insert_all_before(site, replacement.into_iter().map(Node::Insn))?;
    body.remove(site)?;
    Ok(())
}

pub(crate) fn site_instruction(procedure: &Procedure, site: InsnId) -> Result<Instruction> {
    procedure
        .body
        .instruction(site)
        .cloned()
        .ok_or(Error::Core(mixweave_core::Error::UnknownNode(site.index() as u32)))
}

/// Splices the handler of `ctx` at every site, returning how many were rewritten.
pub fn splice(ctx: &SpliceContext<'_>, procedure: &mut Procedure, sites: &[InsnId]) -> Result<usize> {
    let mut slots = SlotAllocator::for_procedure(procedure);
    match ctx.handler.kind {
        InjectionKind::Inject => {
            for site in sites {
                inject::splice(ctx, procedure, &mut slots, *site)?;
            }
        }
        InjectionKind::Redirect => {
            for site in sites {
                redirect::splice(ctx, procedure, &mut slots, *site)?;
            }
        }
        InjectionKind::WrapCondition => {
            for site in sites {
                wrap::splice(ctx, procedure, &mut slots, *site)?;
            }
        }
        InjectionKind::ModifyConstant => match sites {
            [site] => constant::splice(ctx, procedure, *site)?,
            [] => {}
            many => {
                return Err(Error::AmbiguousTarget {
                    handler: ctx.handler_id(),
                    target: ctx.target.to_string(),
                    found: many.len(),
                    allowed: 1,
                });
            }
        },
    }
    procedure.max_locals = procedure.max_locals.max(slots.high_water());
    debug!(
        "{} {} into {}: {} site(s)",
        ctx.handler.kind,
        ctx.handler_id(),
        procedure,
        sites.len()
    );
    Ok(sites.len())
}
