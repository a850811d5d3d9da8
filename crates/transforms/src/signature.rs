//! Handler signature contracts.
//!
//! Each generator derives the descriptor a handler must have from its site. A handler matches
//! when every parameter can receive the site's operand and the site can use the handler's
//! result, either directly, through a primitive widening, or through a reference cast.

use crate::hierarchy::ClassHierarchy;
use crate::{Error, Result};
use mixweave_core::insn::Instruction;
use mixweave_core::opcode::Opcode;
use mixweave_core::types::{MethodType, Type};

/// Conversion applied to a value flowing from one static type into another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Coercion {
    Identity,
    /// Primitive widening opcode (`I2L`, `F2D`, ...).
    Widen(Opcode),
    /// Reference narrowing through `CHECKCAST`.
    Cast(Type),
}

impl Coercion {
    pub fn instructions(&self) -> Vec<Instruction> {
        match self {
            Coercion::Identity => Vec::new(),
            Coercion::Widen(op) => vec![Instruction::simple(*op)],
            Coercion::Cast(ty) => vec![Instruction::CheckCast { ty: ty.clone() }],
        }
    }
}

/// How a value of type `from` becomes a value of type `to`, if it can.
pub fn coerce(from: &Type, to: &Type, hierarchy: &ClassHierarchy) -> Option<Coercion> {
    if from == to {
        return Some(Coercion::Identity);
    }
    if from.is_primitive() && to.is_primitive() {
        return from.widening_to(to).map(|op| match op {
            Some(op) => Coercion::Widen(op),
            None => Coercion::Identity,
        });
    }
    if from.is_reference() && to.is_reference() {
        if hierarchy.is_assignable(from, to) {
            return Some(Coercion::Identity);
        }
        if hierarchy.is_assignable(to, from) {
            return Some(Coercion::Cast(to.clone()));
        }
    }
    None
}

/// Parameter and return conversions for calling a handler at a site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallPlan {
    pub params: Vec<Coercion>,
    pub ret: Coercion,
}

/// Checks `actual` against the descriptor a site `expected`: the site supplies values of
/// `expected.params` and consumes a value of `expected.ret`.
pub fn check_call(
    handler: &str,
    expected: &MethodType,
    actual: &MethodType,
    hierarchy: &ClassHierarchy,
) -> Result<CallPlan> {
    let mismatch = || Error::SignatureMismatch {
        expected: expected.to_string(),
        actual: actual.to_string(),
        handler: handler.to_string(),
    };
    if expected.params.len() != actual.params.len() {
        return Err(mismatch());
    }
    let params = expected
        .params
        .iter()
        .zip(&actual.params)
        .map(|(site, param)| coerce(site, param, hierarchy).ok_or_else(mismatch))
        .collect::<Result<Vec<_>>>()?;
    let ret = match (&actual.ret, &expected.ret) {
        (Type::Void, Type::Void) => Coercion::Identity,
        (Type::Void, _) | (_, Type::Void) => return Err(mismatch()),
        (produced, consumed) => coerce(produced, consumed, hierarchy).ok_or_else(mismatch)?,
    };
    Ok(CallPlan { params, ret })
}
