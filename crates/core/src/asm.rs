//! Textual assembly for procedure bodies.
//!
//! One instruction per line, labels as `name:` on their own line, `//` starts a comment:
//!
//! ```text
//!     ALOAD 0 Lcom/example/Widget;
//!     GETFIELD com/example/Widget.size:I
//!     IFEQ empty
//!     ICONST_1
//!     IRETURN
//! empty:
//!     ICONST_0
//!     IRETURN
//! ```
//!
//! Loads, stores and value returns take an optional trailing type (`ALOAD 1 Ljava/lang/String;`,
//! `IRETURN Z`); without one they default to `int` or `java/lang/Object`. Pool loads use the
//! literal grammar (`LDC string hello`). Opcodes without a dedicated form accept raw operand
//! bytes as `#hex` and are carried as opaque instructions.

use crate::insn::{
    Dispatch, FieldMode, FieldRef, Instruction, JumpCond, Label, MethodRef, Scope, StackOp,
};
use crate::literal::{Constant, Literal, PushForm};
use crate::opcode::Opcode;
use crate::result::{Error, Result};
use crate::sequence::{InstructionSequence, Node};
use crate::types::{self, Category, MethodType, Type};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Parses a body listing into a fresh sequence.
pub fn parse_body(text: &str) -> Result<InstructionSequence> {
    let mut parser = Parser::default();
    let mut seq = InstructionSequence::new();
    for (line_no, raw) in text.lines().enumerate() {
        let line = raw.split("//").next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        let fail = |msg: String| Error::ParseError {
            line: line_no + 1,
            msg,
            raw: raw.to_string(),
        };

        if let Some(name) = line.strip_suffix(':')
            && !name.contains(char::is_whitespace)
        {
            let label = parser.label(name);
            if !parser.placed.insert(name.to_string()) {
                return Err(fail(format!("label `{name}` placed twice")));
            }
            seq.push_back(Node::Label(label));
            continue;
        }

        let (mnemonic, operand) = match line.split_once(char::is_whitespace) {
            Some((m, rest)) => (m, rest.trim()),
            None => (line, ""),
        };
        let insn = parser
            .instruction(mnemonic, operand)
            .map_err(|e| fail(e.to_string()))?;
        seq.push_back(insn);
    }

    if let Some(name) = parser
        .labels
        .keys()
        .find(|name| !parser.placed.contains(*name))
    {
        return Err(Error::ParseError {
            line: 0,
            msg: format!("label `{name}` is referenced but never placed"),
            raw: String::new(),
        });
    }
    Ok(seq)
}

/// Renders a body in the format accepted by [`parse_body`].
pub fn print_body(seq: &InstructionSequence) -> String {
    let mut out = String::new();
    for (_, node) in seq.iter() {
        match node {
            Node::Label(label) => out.push_str(&format!("L{}:\n", label.0)),
            Node::Insn(insn) => out.push_str(&format!("    {insn}\n")),
        }
    }
    out
}

#[derive(Default)]
struct Parser {
    labels: HashMap<String, Label>,
    placed: HashSet<String>,
}

impl Parser {
    fn label(&mut self, name: &str) -> Label {
        let next = Label(self.labels.len() as u32);
        *self.labels.entry(name.to_string()).or_insert(next)
    }

    fn instruction(&mut self, mnemonic: &str, operand: &str) -> Result<Instruction> {
        let op = Opcode::from_name(mnemonic)
            .ok_or_else(|| Error::UnknownOpcode(mnemonic.to_string()))?;
        let missing = || Error::ParseError {
            line: 0,
            msg: format!("{op} needs an operand"),
            raw: operand.to_string(),
        };

        let insn = match op {
            Opcode::GETSTATIC | Opcode::PUTSTATIC | Opcode::GETFIELD | Opcode::PUTFIELD => {
                let mode = if matches!(op, Opcode::GETSTATIC | Opcode::GETFIELD) {
                    FieldMode::Get
                } else {
                    FieldMode::Put
                };
                let scope = if matches!(op, Opcode::GETSTATIC | Opcode::PUTSTATIC) {
                    Scope::Static
                } else {
                    Scope::Instance
                };
                Instruction::Field {
                    mode,
                    scope,
                    field: parse_field_ref(operand)?,
                }
            }
            Opcode::INVOKEVIRTUAL
            | Opcode::INVOKESPECIAL
            | Opcode::INVOKESTATIC
            | Opcode::INVOKEINTERFACE => {
                let dispatch = match op {
                    Opcode::INVOKEVIRTUAL => Dispatch::Virtual,
                    Opcode::INVOKESPECIAL => Dispatch::Special,
                    Opcode::INVOKESTATIC => Dispatch::Static,
                    _ => Dispatch::Interface,
                };
                Instruction::Invoke {
                    dispatch,
                    method: parse_method_ref(operand)?,
                }
            }
            Opcode::NEW => {
                if operand.is_empty() {
                    return Err(missing());
                }
                Instruction::Allocate {
                    ty: parse_reference(operand).cast_name(),
                }
            }
            Opcode::CHECKCAST => {
                if operand.is_empty() {
                    return Err(missing());
                }
                Instruction::CheckCast {
                    ty: parse_reference(operand),
                }
            }
            Opcode(code) if (Opcode::ACONST_NULL.0..=Opcode::DCONST_1.0).contains(&code) => {
                Instruction::Push(Constant {
                    literal: const_literal(op),
                    form: PushForm::Const,
                })
            }
            Opcode::BIPUSH | Opcode::SIPUSH => {
                let value: i32 = operand.parse().map_err(|_| missing())?;
                let form = if op == Opcode::BIPUSH {
                    PushForm::Byte
                } else {
                    PushForm::Short
                };
                Instruction::Push(Constant::with_form(Literal::Int(value), form)?)
            }
            Opcode::LDC | Opcode::LDC_W | Opcode::LDC2_W => Instruction::Push(Constant {
                literal: Literal::parse(operand)?,
                form: PushForm::Pooled,
            }),
            Opcode(code) if (Opcode::IRETURN.0..=Opcode::RETURN.0).contains(&code) => {
                let default = match op {
                    Opcode::IRETURN => Type::Int,
                    Opcode::LRETURN => Type::Long,
                    Opcode::FRETURN => Type::Float,
                    Opcode::DRETURN => Type::Double,
                    Opcode::ARETURN => Type::object(types::OBJECT),
                    _ => Type::Void,
                };
                Instruction::Return(typed_operand(operand, default, op)?)
            }
            Opcode::ATHROW => Instruction::Throw,
            Opcode::LOOKUPSWITCH | Opcode::TABLESWITCH => self.switch(operand)?,
            _ if JumpCond::from_opcode(op).is_some() => {
                if operand.is_empty() {
                    return Err(missing());
                }
                Instruction::Jump {
                    cond: JumpCond::from_opcode(op).unwrap_or(JumpCond::Always),
                    target: self.label(operand),
                }
            }
            _ if local_access(op).is_some() => {
                let Some((is_load, default, fixed_slot)) = local_access(op) else {
                    return Err(missing());
                };
                let mut parts = operand.split_whitespace();
                let slot = match fixed_slot {
                    Some(slot) => slot,
                    None => parts
                        .next()
                        .and_then(|s| s.parse::<u16>().ok())
                        .ok_or_else(missing)?,
                };
                let ty = typed_operand(parts.next().unwrap_or(""), default, op)?;
                if is_load {
                    Instruction::Load { slot, ty }
                } else {
                    Instruction::Store { slot, ty }
                }
            }
            _ if StackOp::from_opcode(op).is_some() => match StackOp::from_opcode(op) {
                Some(stack) => Instruction::Stack(stack),
                None => return Err(missing()),
            },
            _ => {
                let operands = match operand.strip_prefix('#') {
                    Some(hex_bytes) => hex::decode(hex_bytes)?,
                    None if operand.is_empty() => Vec::new(),
                    None => {
                        return Err(Error::ParseError {
                            line: 0,
                            msg: format!("raw operands for {op} must be written as #hex"),
                            raw: operand.to_string(),
                        });
                    }
                };
                Instruction::Opaque {
                    opcode: op,
                    operands,
                }
            }
        };
        Ok(insn)
    }

    fn switch(&mut self, operand: &str) -> Result<Instruction> {
        let mut default = None;
        let mut cases = Vec::new();
        for part in operand.split_whitespace() {
            if let Some(name) = part.strip_prefix("default=") {
                default = Some(self.label(name));
            } else if let Some((key, name)) = part.split_once(':') {
                let key = key.parse().map_err(|_| Error::ParseError {
                    line: 0,
                    msg: "switch key must be an int".into(),
                    raw: part.to_string(),
                })?;
                cases.push((key, self.label(name)));
            }
        }
        let default = default.ok_or_else(|| Error::ParseError {
            line: 0,
            msg: "switch needs default=<label>".into(),
            raw: operand.to_string(),
        })?;
        Ok(Instruction::Switch { default, cases })
    }
}

fn const_literal(op: Opcode) -> Literal {
    match op {
        Opcode::ACONST_NULL => Literal::Null,
        Opcode(code) if code <= Opcode::ICONST_5.0 => {
            Literal::Int(code as i32 - Opcode::ICONST_0.0 as i32)
        }
        Opcode(code) if code <= Opcode::LCONST_1.0 => {
            Literal::Long((code - Opcode::LCONST_0.0) as i64)
        }
        Opcode(code) if code <= Opcode::FCONST_2.0 => {
            Literal::Float((code - Opcode::FCONST_0.0) as f32)
        }
        Opcode(code) => Literal::Double((code - Opcode::DCONST_0.0) as f64),
    }
}

/// `(is_load, default type, implied slot)` for the load/store family.
fn local_access(op: Opcode) -> Option<(bool, Type, Option<u16>)> {
    let object = || Type::object(types::OBJECT);
    let by_category = |index: u8| match index {
        0 => Type::Int,
        1 => Type::Long,
        2 => Type::Float,
        3 => Type::Double,
        _ => object(),
    };
    let code = op.0;
    if (Opcode::ILOAD.0..=Opcode::ALOAD.0).contains(&code) {
        return Some((true, by_category(code - Opcode::ILOAD.0), None));
    }
    if (Opcode::ILOAD_0.0..=Opcode::ALOAD_3.0).contains(&code) {
        let offset = code - Opcode::ILOAD_0.0;
        return Some((true, by_category(offset / 4), Some((offset % 4) as u16)));
    }
    if (Opcode::ISTORE.0..=Opcode::ASTORE.0).contains(&code) {
        return Some((false, by_category(code - Opcode::ISTORE.0), None));
    }
    if (Opcode::ISTORE_0.0..=Opcode::ASTORE_3.0).contains(&code) {
        let offset = code - Opcode::ISTORE_0.0;
        return Some((false, by_category(offset / 4), Some((offset % 4) as u16)));
    }
    None
}

/// Parses an optional explicit type, checking it belongs to the opcode's category.
fn typed_operand(text: &str, default: Type, op: Opcode) -> Result<Type> {
    if text.is_empty() {
        return Ok(default);
    }
    let ty = Type::parse(text)?;
    if ty.category() != default.category() {
        return Err(Error::InvalidDescriptor(format!(
            "{op} cannot carry a value of type {ty}"
        )));
    }
    Ok(ty)
}

fn parse_reference(text: &str) -> Type {
    match Type::parse(text) {
        Ok(ty) if ty.is_reference() => ty,
        _ => Type::object(text),
    }
}

/// Parses `owner.name:desc`.
pub fn parse_field_ref(text: &str) -> Result<FieldRef> {
    let invalid = || Error::InvalidMember(format!("expected owner.name:type, got `{text}`"));
    let (member, ty) = text.split_once(':').ok_or_else(invalid)?;
    let (owner, name) = member.rsplit_once('.').ok_or_else(invalid)?;
    if owner.is_empty() || name.is_empty() {
        return Err(invalid());
    }
    Ok(FieldRef::new(owner, name, Type::parse(ty)?))
}

/// Parses `owner.name(args)ret`.
pub fn parse_method_ref(text: &str) -> Result<MethodRef> {
    let invalid = || Error::InvalidMember(format!("expected owner.name(args)ret, got `{text}`"));
    let split = text.find('(').ok_or_else(invalid)?;
    let (member, desc) = text.split_at(split);
    let (owner, name) = member.rsplit_once('.').ok_or_else(invalid)?;
    if owner.is_empty() || name.is_empty() {
        return Err(invalid());
    }
    Ok(MethodRef::new(owner, name, MethodType::parse(desc)?))
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = self.opcode();
        match self {
            Instruction::Field { field, .. } => {
                write!(f, "{op} {}.{}:{}", field.owner, field.name, field.ty)
            }
            Instruction::Invoke { method, .. } => {
                write!(f, "{op} {}.{}{}", method.owner, method.name, method.desc)
            }
            Instruction::Allocate { ty } => write!(f, "{op} {ty}"),
            Instruction::Push(constant) => match constant.form {
                PushForm::Const => write!(f, "{op}"),
                PushForm::Byte | PushForm::Short => match &constant.literal {
                    Literal::Int(v) => write!(f, "{op} {v}"),
                    other => write!(f, "{op} {other}"),
                },
                PushForm::Pooled => write!(f, "{op} {}", constant.literal),
            },
            Instruction::Return(ty) => match ty {
                Type::Int | Type::Long | Type::Float | Type::Double | Type::Void => {
                    write!(f, "{op}")
                }
                other => write!(f, "{op} {other}"),
            },
            Instruction::Throw => write!(f, "{op}"),
            Instruction::Jump { target, .. } => write!(f, "{op} L{}", target.0),
            Instruction::Switch { default, cases } => {
                write!(f, "{op} default=L{}", default.0)?;
                for (key, label) in cases {
                    write!(f, " {key}:L{}", label.0)?;
                }
                Ok(())
            }
            Instruction::Load { slot, ty } | Instruction::Store { slot, ty } => {
                let plain = matches!(
                    (ty.category(), ty),
                    (Some(Category::Int), Type::Int)
                        | (Some(Category::Long), _)
                        | (Some(Category::Float), _)
                        | (Some(Category::Double), _)
                );
                if plain {
                    write!(f, "{op} {slot}")
                } else {
                    write!(f, "{op} {slot} {ty}")
                }
            }
            Instruction::Stack(_) => write!(f, "{op}"),
            Instruction::CheckCast { ty } => write!(f, "{op} {}", ty.cast_name()),
            Instruction::Opaque { operands, .. } if operands.is_empty() => write!(f, "{op}"),
            Instruction::Opaque { operands, .. } => write!(f, "{op} #{}", hex::encode(operands)),
        }
    }
}
