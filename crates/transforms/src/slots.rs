//! Free local slots and operand buffering.
//!
//! Operands that have to survive a spliced call are popped into slots beyond everything the
//! procedure already uses, then pushed back where they are needed:
//!
//! ```text
//! // stack: owner value
//! ISTORE 7                 // value
//! ASTORE 6                 // owner
//! ALOAD 0                  // handler receiver
//! ALOAD 6
//! ILOAD 7
//! INVOKEVIRTUAL ...
//! ```

use crate::signature::Coercion;
use mixweave_core::insn::Instruction;
use mixweave_core::types::Type;
use mixweave_core::unit::Procedure;

/// Hands out local slots no instruction of a procedure touches yet.
#[derive(Debug, Clone)]
pub struct SlotAllocator {
    next: u16,
}

impl SlotAllocator {
    /// Starts past the declared locals, the arguments, every slot the body reads or writes,
    /// and every named local.
    pub fn for_procedure(procedure: &Procedure) -> Self {
        let from_body = procedure
            .body
            .instructions()
            .filter_map(|(_, insn)| insn.local_slot())
            .map(|(slot, width)| slot + width)
            .max()
            .unwrap_or(0);
        let from_table = procedure
            .locals
            .iter()
            .flatten()
            .map(|local| local.slot + local.ty.slot_size().max(1))
            .max()
            .unwrap_or(0);
        let next = procedure
            .max_locals
            .max(procedure.arg_slots())
            .max(from_body)
            .max(from_table);
        Self { next }
    }

    /// Reserves room for one value of `ty`.
    pub fn alloc(&mut self, ty: &Type) -> u16 {
        let slot = self.next;
        self.next += ty.slot_size().max(1);
        slot
    }

    /// One past the highest slot handed out so far.
    pub fn high_water(&self) -> u16 {
        self.next
    }
}

/// Values parked in locals, in the order they were on the stack (bottom first).
#[derive(Debug, Clone, Default)]
pub struct Buffered {
    values: Vec<(u16, Type)>,
}

impl Buffered {
    /// Allocates slots for stack operands of `types` (bottom first) and returns the stores
    /// that pop them, top of stack first.
    pub fn spill(slots: &mut SlotAllocator, types: &[Type]) -> (Self, Vec<Instruction>) {
        let values: Vec<(u16, Type)> = types
            .iter()
            .map(|ty| (slots.alloc(ty), ty.clone()))
            .collect();
        let stores = values
            .iter()
            .rev()
            .map(|(slot, ty)| Instruction::store(*slot, ty.clone()))
            .collect();
        (Self { values }, stores)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Pushes every value back, bottom first.
    pub fn reload(&self) -> Vec<Instruction> {
        self.values
            .iter()
            .map(|(slot, ty)| Instruction::load(*slot, ty.clone()))
            .collect()
    }

    /// Pushes every value back, converting each with the matching coercion.
    pub fn reload_coerced(&self, coercions: &[Coercion]) -> Vec<Instruction> {
        let mut out = Vec::new();
        for ((slot, ty), coercion) in self.values.iter().zip(coercions) {
            out.push(Instruction::load(*slot, ty.clone()));
            out.extend(coercion.instructions());
        }
        out
    }
}
