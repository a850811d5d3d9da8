//! Name remapping for woven units.
//!
//! A [`Remapper`] answers three questions: the new name of a type, of a field, and of a
//! procedure. [`remap_unit`] asks them for every symbolic reference of a unit in one pass.
//! Member lookups are keyed by the member's original owner and descriptor.

use mixweave_core::insn::{FieldRef, Instruction, MethodRef};
use mixweave_core::literal::{Constant, Literal};
use mixweave_core::sequence::{InstructionSequence, Node};
use mixweave_core::types::{MethodType, Type};
use mixweave_core::unit::CompiledUnit;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub trait Remapper: Send + Sync {
    /// New internal name for a type, if it changes.
    fn map_type_name(&self, name: &str) -> Option<String>;

    fn map_field_name(&self, _owner: &str, _name: &str, _ty: &Type) -> Option<String> {
        None
    }

    fn map_method_name(&self, _owner: &str, _name: &str, _desc: &MethodType) -> Option<String> {
        None
    }

    fn map_type(&self, ty: &Type) -> Type {
        match ty {
            Type::Object(name) => self
                .map_type_name(name)
                .map(Type::Object)
                .unwrap_or_else(|| ty.clone()),
            Type::Array(elem) => Type::Array(Box::new(self.map_type(elem))),
            other => other.clone(),
        }
    }

    fn map_method_type(&self, desc: &MethodType) -> MethodType {
        MethodType::new(
            desc.params.iter().map(|p| self.map_type(p)).collect(),
            self.map_type(&desc.ret),
        )
    }

    fn map_owner(&self, owner: &str) -> String {
        self.map_type_name(owner)
            .unwrap_or_else(|| owner.to_string())
    }
}

/// Mapping loaded from a manifest.
///
/// Field keys are `owner.name:desc`, procedure keys `owner.name(desc)`, both in original names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingTable {
    #[serde(default)]
    pub types: BTreeMap<String, String>,
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
    #[serde(default)]
    pub methods: BTreeMap<String, String>,
}

impl MappingTable {
    /// Table renaming a single type.
    pub fn rename_type(from: impl Into<String>, to: impl Into<String>) -> Self {
        let mut table = Self::default();
        table.types.insert(from.into(), to.into());
        table
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty() && self.fields.is_empty() && self.methods.is_empty()
    }
}

impl Remapper for MappingTable {
    fn map_type_name(&self, name: &str) -> Option<String> {
        self.types.get(name).cloned()
    }

    fn map_field_name(&self, owner: &str, name: &str, ty: &Type) -> Option<String> {
        self.fields.get(&format!("{owner}.{name}:{ty}")).cloned()
    }

    fn map_method_name(&self, owner: &str, name: &str, desc: &MethodType) -> Option<String> {
        self.methods.get(&format!("{owner}.{name}{desc}")).cloned()
    }
}

fn remap_field(field: &FieldRef, remapper: &dyn Remapper) -> FieldRef {
    FieldRef {
        owner: remapper.map_owner(&field.owner),
        name: remapper
            .map_field_name(&field.owner, &field.name, &field.ty)
            .unwrap_or_else(|| field.name.clone()),
        ty: remapper.map_type(&field.ty),
    }
}

fn remap_method(method: &MethodRef, remapper: &dyn Remapper) -> MethodRef {
    MethodRef {
        owner: remapper.map_owner(&method.owner),
        name: remapper
            .map_method_name(&method.owner, &method.name, &method.desc)
            .unwrap_or_else(|| method.name.clone()),
        desc: remapper.map_method_type(&method.desc),
    }
}

fn remap_cast_name(name: &str, remapper: &dyn Remapper) -> String {
    if name.starts_with('[') {
        Type::parse(name)
            .map(|ty| remapper.map_type(&ty).cast_name())
            .unwrap_or_else(|_| name.to_string())
    } else {
        remapper.map_owner(name)
    }
}

/// Rewrites the symbolic references of one instruction.
pub fn remap_instruction(insn: &Instruction, remapper: &dyn Remapper) -> Instruction {
    match insn {
        Instruction::Field { mode, scope, field } => Instruction::Field {
            mode: *mode,
            scope: *scope,
            field: remap_field(field, remapper),
        },
        Instruction::Invoke { dispatch, method } => Instruction::Invoke {
            dispatch: *dispatch,
            method: remap_method(method, remapper),
        },
        Instruction::Allocate { ty } => Instruction::Allocate {
            ty: remap_cast_name(ty, remapper),
        },
        Instruction::Push(Constant {
            literal: Literal::Type(name),
            form,
        }) => Instruction::Push(Constant {
            literal: Literal::Type(remap_cast_name(name, remapper)),
            form: *form,
        }),
        Instruction::Return(ty) => Instruction::Return(remapper.map_type(ty)),
        Instruction::Load { slot, ty } => Instruction::load(*slot, remapper.map_type(ty)),
        Instruction::Store { slot, ty } => Instruction::store(*slot, remapper.map_type(ty)),
        Instruction::CheckCast { ty } => Instruction::CheckCast {
            ty: remapper.map_type(ty),
        },
        other => other.clone(),
    }
}

/// Rewrites every instruction of a body in place.
pub fn remap_body(body: &mut InstructionSequence, remapper: &dyn Remapper) {
    for id in body.ids() {
        let remapped = match body.get(id) {
            Some(Node::Insn(insn)) => remap_instruction(insn, remapper),
            _ => continue,
        };
        // Ids come straight from `ids()`, so they are live.
        let _ = body.replace(id, remapped);
    }
}

/// Rewrites the unit's own name, its super types, members and every body.
pub fn remap_unit(unit: &mut CompiledUnit, remapper: &dyn Remapper) {
    let owner = unit.name.clone();
    unit.name = remapper.map_owner(&owner);
    unit.super_name = unit.super_name.as_deref().map(|s| remapper.map_owner(s));
    for interface in &mut unit.interfaces {
        *interface = remapper.map_owner(interface);
    }
    for field in &mut unit.fields {
        if let Some(name) = remapper.map_field_name(&owner, &field.name, &field.ty) {
            field.name = name;
        }
        field.ty = remapper.map_type(&field.ty);
    }
    for procedure in &mut unit.procedures {
        if let Some(name) = remapper.map_method_name(&owner, &procedure.name, &procedure.desc) {
            procedure.name = name;
        }
        procedure.owner = unit.name.clone();
        procedure.desc = remapper.map_method_type(&procedure.desc);
        remap_body(&mut procedure.body, remapper);
        for local in procedure.locals.iter_mut().flatten() {
            local.ty = remapper.map_type(&local.ty);
        }
    }
}
