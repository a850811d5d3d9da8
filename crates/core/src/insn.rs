//! Typed instructions.
//!
//! Every instruction the weaver reasons about has its own variant; everything else travels
//! as [`Instruction::Opaque`] and is carried through unchanged. Control flow never uses
//! offsets: jumps and switches reference [`Label`]s placed in the same sequence.

use crate::literal::{Constant, Literal};
use crate::opcode::Opcode;
use crate::types::{Category, MethodType, Type};
use serde::{Deserialize, Serialize};

/// Jump target placed in an instruction sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Label(pub u32);

/// Name of instance constructors.
pub const CONSTRUCTOR: &str = "<init>";
/// Name of static initializers.
pub const STATIC_INIT: &str = "<clinit>";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldMode {
    Get,
    Put,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scope {
    Static,
    Instance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dispatch {
    Static,
    Virtual,
    Interface,
    Special,
}

/// Operand-stack shuffles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StackOp {
    Pop,
    Pop2,
    Dup,
    DupX1,
    DupX2,
    Dup2,
    Dup2X1,
    Dup2X2,
    Swap,
}

/// Branch condition; `Always` is an unconditional `GOTO`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JumpCond {
    Always,
    IfEq,
    IfNe,
    IfLt,
    IfGe,
    IfGt,
    IfLe,
    IfICmpEq,
    IfICmpNe,
    IfICmpLt,
    IfICmpGe,
    IfICmpGt,
    IfICmpLe,
    IfACmpEq,
    IfACmpNe,
    IfNull,
    IfNonNull,
}

impl JumpCond {
    const ORDERED: [JumpCond; 16] = [
        JumpCond::IfEq,
        JumpCond::IfNe,
        JumpCond::IfLt,
        JumpCond::IfGe,
        JumpCond::IfGt,
        JumpCond::IfLe,
        JumpCond::IfICmpEq,
        JumpCond::IfICmpNe,
        JumpCond::IfICmpLt,
        JumpCond::IfICmpGe,
        JumpCond::IfICmpGt,
        JumpCond::IfICmpLe,
        JumpCond::IfACmpEq,
        JumpCond::IfACmpNe,
        JumpCond::IfNull,
        JumpCond::IfNonNull,
    ];

    pub fn opcode(self) -> Opcode {
        match self {
            JumpCond::Always => Opcode::GOTO,
            JumpCond::IfNull => Opcode::IFNULL,
            JumpCond::IfNonNull => Opcode::IFNONNULL,
            other => {
                let index = Self::ORDERED.iter().position(|c| *c == other).unwrap_or(0);
                Opcode(Opcode::IFEQ.0 + index as u8)
            }
        }
    }

    pub fn from_opcode(op: Opcode) -> Option<Self> {
        match op {
            Opcode::GOTO | Opcode::GOTO_W => Some(JumpCond::Always),
            Opcode::IFNULL => Some(JumpCond::IfNull),
            Opcode::IFNONNULL => Some(JumpCond::IfNonNull),
            Opcode(code) if (Opcode::IFEQ.0..=Opcode::IF_ACMPNE.0).contains(&code) => {
                Some(Self::ORDERED[(code - Opcode::IFEQ.0) as usize])
            }
            _ => None,
        }
    }
}

impl StackOp {
    pub fn opcode(self) -> Opcode {
        match self {
            StackOp::Pop => Opcode::POP,
            StackOp::Pop2 => Opcode::POP2,
            StackOp::Dup => Opcode::DUP,
            StackOp::DupX1 => Opcode::DUP_X1,
            StackOp::DupX2 => Opcode::DUP_X2,
            StackOp::Dup2 => Opcode::DUP2,
            StackOp::Dup2X1 => Opcode::DUP2_X1,
            StackOp::Dup2X2 => Opcode::DUP2_X2,
            StackOp::Swap => Opcode::SWAP,
        }
    }

    pub fn from_opcode(op: Opcode) -> Option<Self> {
        let op = match op {
            Opcode::POP => StackOp::Pop,
            Opcode::POP2 => StackOp::Pop2,
            Opcode::DUP => StackOp::Dup,
            Opcode::DUP_X1 => StackOp::DupX1,
            Opcode::DUP_X2 => StackOp::DupX2,
            Opcode::DUP2 => StackOp::Dup2,
            Opcode::DUP2_X1 => StackOp::Dup2X1,
            Opcode::DUP2_X2 => StackOp::Dup2X2,
            Opcode::SWAP => StackOp::Swap,
            _ => return None,
        };
        Some(op)
    }
}

/// Symbolic reference to a field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldRef {
    pub owner: String,
    pub name: String,
    pub ty: Type,
}

impl FieldRef {
    pub fn new(owner: impl Into<String>, name: impl Into<String>, ty: Type) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
            ty,
        }
    }
}

/// Symbolic reference to a procedure.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MethodRef {
    pub owner: String,
    pub name: String,
    pub desc: MethodType,
}

impl MethodRef {
    pub fn new(owner: impl Into<String>, name: impl Into<String>, desc: MethodType) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
            desc,
        }
    }

    pub fn is_constructor(&self) -> bool {
        self.name == CONSTRUCTOR
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Instruction {
    Field {
        mode: FieldMode,
        scope: Scope,
        field: FieldRef,
    },
    Invoke {
        dispatch: Dispatch,
        method: MethodRef,
    },
    /// `NEW`: allocates an uninitialised instance of the named type.
    Allocate {
        ty: String,
    },
    Push(Constant),
    /// Return of the given type; `Type::Void` is the plain `RETURN`.
    Return(Type),
    Throw,
    Jump {
        cond: JumpCond,
        target: Label,
    },
    /// `LOOKUPSWITCH`/`TABLESWITCH` over an int key.
    Switch {
        default: Label,
        cases: Vec<(i32, Label)>,
    },
    Load {
        slot: u16,
        ty: Type,
    },
    Store {
        slot: u16,
        ty: Type,
    },
    Stack(StackOp),
    /// Reference narrowing cast.
    CheckCast {
        ty: Type,
    },
    /// Anything the weaver does not interpret, kept byte for byte.
    Opaque {
        opcode: Opcode,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        operands: Vec<u8>,
    },
}

impl Instruction {
    pub fn get_field(scope: Scope, field: FieldRef) -> Self {
        Instruction::Field {
            mode: FieldMode::Get,
            scope,
            field,
        }
    }

    pub fn put_field(scope: Scope, field: FieldRef) -> Self {
        Instruction::Field {
            mode: FieldMode::Put,
            scope,
            field,
        }
    }

    pub fn invoke(dispatch: Dispatch, method: MethodRef) -> Self {
        Instruction::Invoke { dispatch, method }
    }

    pub fn push(literal: Literal) -> Self {
        Instruction::Push(Constant::canonical(literal))
    }

    pub fn load(slot: u16, ty: Type) -> Self {
        Instruction::Load { slot, ty }
    }

    pub fn store(slot: u16, ty: Type) -> Self {
        Instruction::Store { slot, ty }
    }

    /// `ALOAD 0`: the receiver of an instance procedure.
    pub fn load_this(owner: &str) -> Self {
        Instruction::Load {
            slot: 0,
            ty: Type::object(owner),
        }
    }

    pub fn jump(cond: JumpCond, target: Label) -> Self {
        Instruction::Jump { cond, target }
    }

    pub fn simple(opcode: Opcode) -> Self {
        Instruction::Opaque {
            opcode,
            operands: Vec::new(),
        }
    }

    /// Numeric operation this instruction encodes to.
    pub fn opcode(&self) -> Opcode {
        match self {
            Instruction::Field { mode, scope, .. } => match (mode, scope) {
                (FieldMode::Get, Scope::Static) => Opcode::GETSTATIC,
                (FieldMode::Put, Scope::Static) => Opcode::PUTSTATIC,
                (FieldMode::Get, Scope::Instance) => Opcode::GETFIELD,
                (FieldMode::Put, Scope::Instance) => Opcode::PUTFIELD,
            },
            Instruction::Invoke { dispatch, .. } => match dispatch {
                Dispatch::Static => Opcode::INVOKESTATIC,
                Dispatch::Virtual => Opcode::INVOKEVIRTUAL,
                Dispatch::Interface => Opcode::INVOKEINTERFACE,
                Dispatch::Special => Opcode::INVOKESPECIAL,
            },
            Instruction::Allocate { .. } => Opcode::NEW,
            Instruction::Push(constant) => constant.opcode(),
            Instruction::Return(ty) => ty.return_opcode(),
            Instruction::Throw => Opcode::ATHROW,
            Instruction::Jump { cond, .. } => cond.opcode(),
            Instruction::Switch { .. } => Opcode::LOOKUPSWITCH,
            Instruction::Load { ty, .. } => match ty.category() {
                Some(Category::Long) => Opcode::LLOAD,
                Some(Category::Float) => Opcode::FLOAD,
                Some(Category::Double) => Opcode::DLOAD,
                Some(Category::Reference) => Opcode::ALOAD,
                _ => Opcode::ILOAD,
            },
            Instruction::Store { ty, .. } => match ty.category() {
                Some(Category::Long) => Opcode::LSTORE,
                Some(Category::Float) => Opcode::FSTORE,
                Some(Category::Double) => Opcode::DSTORE,
                Some(Category::Reference) => Opcode::ASTORE,
                _ => Opcode::ISTORE,
            },
            Instruction::Stack(op) => op.opcode(),
            Instruction::CheckCast { .. } => Opcode::CHECKCAST,
            Instruction::Opaque { opcode, .. } => *opcode,
        }
    }

    pub fn is_return(&self) -> bool {
        matches!(self, Instruction::Return(_))
    }

    /// True for `INVOKESPECIAL <init>`.
    pub fn is_constructor_call(&self) -> bool {
        matches!(
            self,
            Instruction::Invoke {
                dispatch: Dispatch::Special,
                method,
            } if method.is_constructor()
        )
    }

    /// Labels this instruction may transfer control to.
    pub fn label_refs(&self) -> Vec<Label> {
        match self {
            Instruction::Jump { target, .. } => vec![*target],
            Instruction::Switch { default, cases } => std::iter::once(*default)
                .chain(cases.iter().map(|(_, label)| *label))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Rewrites every label reference through `map`.
    pub fn map_labels(&mut self, mut map: impl FnMut(Label) -> Label) {
        match self {
            Instruction::Jump { target, .. } => *target = map(*target),
            Instruction::Switch { default, cases } => {
                *default = map(*default);
                for (_, label) in cases.iter_mut() {
                    *label = map(*label);
                }
            }
            _ => {}
        }
    }

    /// Local slots read or written by this instruction, as `(first slot, width)`.
    pub fn local_slot(&self) -> Option<(u16, u16)> {
        match self {
            Instruction::Load { slot, ty } | Instruction::Store { slot, ty } => {
                Some((*slot, ty.slot_size()))
            }
            Instruction::Opaque { opcode, operands } if *opcode == Opcode::IINC => {
                operands.first().map(|slot| (*slot as u16, 1))
            }
            _ => None,
        }
    }
}
