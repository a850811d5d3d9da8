//! Compiled units, their members, and declarative metadata.

use crate::insn::{CONSTRUCTOR, STATIC_INIT};
use crate::sequence::InstructionSequence;
use crate::types::{MethodType, Type};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Value stored in an annotation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnnotationValue {
    Bool(bool),
    Int(i64),
    String(String),
    List(Vec<AnnotationValue>),
}

/// One declarative annotation attached to a unit or member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub values: BTreeMap<String, AnnotationValue>,
}

impl Annotation {
    /// Marks a member as a reference to an existing member of the target unit.
    pub const SHADOW: &'static str = "Shadow";
    /// Marks a method that replaces the target's method of the same signature.
    pub const OVERWRITE: &'static str = "Overwrite";
    /// Marks a member that is added to the target unit as is.
    pub const UNIQUE: &'static str = "Unique";

    pub fn marker(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: BTreeMap::new(),
        }
    }
}

/// How a member of a handler-declaring unit relates to the target unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MemberRole {
    /// Copied into the target; clashes are conflicts.
    Added,
    /// Stands in for a member the target already has; never copied.
    Shadow,
    /// Replaces the target's member with the same signature.
    Overwrite,
}

fn role_of(annotations: &[Annotation]) -> MemberRole {
    if annotations.iter().any(|a| a.name == Annotation::SHADOW) {
        MemberRole::Shadow
    } else if annotations.iter().any(|a| a.name == Annotation::OVERWRITE) {
        MemberRole::Overwrite
    } else {
        MemberRole::Added
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub ty: Type,
    #[serde(default)]
    pub is_static: bool,
    #[serde(default)]
    pub is_final: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub annotations: Vec<Annotation>,
}

impl Field {
    pub fn new(name: impl Into<String>, ty: Type, is_static: bool) -> Self {
        Self {
            name: name.into(),
            ty,
            is_static,
            is_final: false,
            annotations: Vec::new(),
        }
    }

    pub fn role(&self) -> MemberRole {
        role_of(&self.annotations)
    }
}

/// Named local variable covering part of a body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalVar {
    pub slot: u16,
    pub name: String,
    pub ty: Type,
}

/// One procedure (method, constructor or static initializer).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Procedure {
    /// Internal name of the declaring unit.
    pub owner: String,
    pub name: String,
    pub desc: MethodType,
    #[serde(default)]
    pub is_static: bool,
    #[serde(default)]
    pub is_abstract: bool,
    #[serde(default)]
    pub body: InstructionSequence,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locals: Option<Vec<LocalVar>>,
    #[serde(default)]
    pub max_stack: u16,
    #[serde(default)]
    pub max_locals: u16,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub annotations: Vec<Annotation>,
}

impl Procedure {
    pub fn new(
        owner: impl Into<String>,
        name: impl Into<String>,
        desc: MethodType,
        is_static: bool,
        body: InstructionSequence,
    ) -> Self {
        let mut proc = Self {
            owner: owner.into(),
            name: name.into(),
            desc,
            is_static,
            is_abstract: false,
            body,
            locals: None,
            max_stack: 0,
            max_locals: 0,
            annotations: Vec::new(),
        };
        proc.max_locals = proc.arg_slots();
        proc
    }

    pub fn is_constructor(&self) -> bool {
        self.name == CONSTRUCTOR
    }

    pub fn is_static_initializer(&self) -> bool {
        self.name == STATIC_INIT
    }

    /// Slots taken by the receiver (if any) and the parameters.
    pub fn arg_slots(&self) -> u16 {
        self.desc.param_slots() + u16::from(!self.is_static)
    }

    /// First slot of each parameter, in declaration order.
    pub fn param_slots(&self) -> Vec<u16> {
        let mut slot = u16::from(!self.is_static);
        self.desc
            .params
            .iter()
            .map(|ty| {
                let current = slot;
                slot += ty.slot_size();
                current
            })
            .collect()
    }

    pub fn role(&self) -> MemberRole {
        role_of(&self.annotations)
    }

    /// `owner;name(desc)`, the identity used in diagnostics.
    pub fn id(&self) -> String {
        format!("{};{}{}", self.owner, self.name, self.desc)
    }

    pub fn has_annotation(&self, name: &str) -> bool {
        self.annotations.iter().any(|a| a.name == name)
    }
}

impl fmt::Display for Procedure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id())
    }
}

/// A compiled type definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledUnit {
    /// Internal name (`com/example/Widget`).
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub super_name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub interfaces: Vec<String>,
    #[serde(default)]
    pub is_interface: bool,
    #[serde(default)]
    pub fields: Vec<Field>,
    #[serde(default)]
    pub procedures: Vec<Procedure>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub annotations: Vec<Annotation>,
}

impl CompiledUnit {
    pub fn new(name: impl Into<String>, super_name: Option<String>) -> Self {
        Self {
            name: name.into(),
            super_name,
            interfaces: Vec::new(),
            is_interface: false,
            fields: Vec::new(),
            procedures: Vec::new(),
            annotations: Vec::new(),
        }
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn procedure(&self, name: &str, desc: &MethodType) -> Option<&Procedure> {
        self.procedures
            .iter()
            .find(|p| p.name == name && p.desc == *desc)
    }

    pub fn procedure_index(&self, name: &str, desc: &MethodType) -> Option<usize> {
        self.procedures
            .iter()
            .position(|p| p.name == name && p.desc == *desc)
    }

    pub fn procedure_mut(&mut self, name: &str, desc: &MethodType) -> Option<&mut Procedure> {
        self.procedures
            .iter_mut()
            .find(|p| p.name == name && p.desc == *desc)
    }

    /// This unit as a reference type.
    pub fn as_type(&self) -> Type {
        Type::object(self.name.clone())
    }
}
