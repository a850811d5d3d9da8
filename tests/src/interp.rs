//! A small reference interpreter for woven bodies.
//!
//! It executes the typed instruction model directly and is only as complete as the tests
//! need: integer and long arithmetic, fields, calls between loaded units, natives standing in
//! for procedures that have no body, branches, switches and throws. Long and double values
//! take one operand-stack entry but two local slots, as in the compiled form.

use mixweave_core::insn::{Dispatch, FieldMode, Instruction, JumpCond, Label, Scope, StackOp};
use mixweave_core::literal::Literal;
use mixweave_core::opcode::Opcode;
use mixweave_core::sequence::Node;
use mixweave_core::types::{MethodType, Type};
use mixweave_core::unit::{CompiledUnit, Procedure};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Null,
    /// Index into the machine heap.
    Ref(usize),
    Str(String),
    Class(String),
}

impl Value {
    fn zero(ty: &Type) -> Self {
        match ty {
            Type::Long => Value::Long(0),
            Type::Float => Value::Float(0.0),
            Type::Double => Value::Double(0.0),
            Type::Object(_) | Type::Array(_) => Value::Null,
            _ => Value::Int(0),
        }
    }

    fn is_wide(&self) -> bool {
        matches!(self, Value::Long(_) | Value::Double(_))
    }
}

impl From<&Literal> for Value {
    fn from(literal: &Literal) -> Self {
        match literal {
            Literal::Null => Value::Null,
            Literal::Int(v) => Value::Int(*v),
            Literal::Long(v) => Value::Long(*v),
            Literal::Float(v) => Value::Float(*v),
            Literal::Double(v) => Value::Double(*v),
            Literal::String(v) => Value::Str(v.clone()),
            Literal::Type(v) => Value::Class(v.clone()),
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("no procedure or native for {0}")]
    Unresolved(String),
    #[error("operand stack underflow in {0}")]
    Underflow(String),
    #[error("expected {expected} but found {found:?}")]
    Type { expected: &'static str, found: Value },
    #[error("local slot {0} read before it was written")]
    UnsetLocal(u16),
    #[error("jump to unplaced label L{0}")]
    Label(u32),
    #[error("unsupported instruction {0}")]
    Unsupported(String),
    #[error("{0} thrown")]
    Thrown(String),
    #[error("out of fuel")]
    OutOfFuel,
    #[error("{0} fell off the end of its body")]
    FellThrough(String),
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone)]
pub struct Object {
    pub class: String,
    pub fields: HashMap<String, Value>,
}

type Native = Box<dyn FnMut(&[Value]) -> Option<Value>>;

/// Interpreter state shared by every frame.
pub struct Machine {
    units: HashMap<String, CompiledUnit>,
    natives: HashMap<String, Native>,
    heap: Vec<Object>,
    statics: HashMap<String, Value>,
    calls: Vec<String>,
    fuel: usize,
}

impl Default for Machine {
    fn default() -> Self {
        Self::new()
    }
}

fn call_key(owner: &str, name: &str, desc: &MethodType) -> String {
    format!("{owner}.{name}{desc}")
}

impl Machine {
    pub fn new() -> Self {
        Self {
            units: HashMap::new(),
            natives: HashMap::new(),
            heap: Vec::new(),
            statics: HashMap::new(),
            calls: Vec::new(),
            fuel: 100_000,
        }
    }

    pub fn load(&mut self, unit: CompiledUnit) -> &mut Self {
        self.units.insert(unit.name.clone(), unit);
        self
    }

    /// Registers a stand-in for `owner.name(desc)`, e.g. `demo/Sink.record(I)V`.
    pub fn native(
        &mut self,
        key: impl Into<String>,
        f: impl FnMut(&[Value]) -> Option<Value> + 'static,
    ) -> &mut Self {
        self.natives.insert(key.into(), Box::new(f));
        self
    }

    /// Allocates an instance without running a constructor.
    pub fn allocate(&mut self, class: &str) -> Value {
        self.heap.push(Object {
            class: class.to_string(),
            fields: HashMap::new(),
        });
        Value::Ref(self.heap.len() - 1)
    }

    pub fn object(&self, value: &Value) -> Option<&Object> {
        match value {
            Value::Ref(index) => self.heap.get(*index),
            _ => None,
        }
    }

    pub fn static_field(&self, owner: &str, name: &str) -> Option<&Value> {
        self.statics.get(&format!("{owner}.{name}"))
    }

    /// Every call executed so far, as `owner.name(desc)`.
    pub fn calls(&self) -> &[String] {
        &self.calls
    }

    pub fn count_calls(&self, key: &str) -> usize {
        self.calls.iter().filter(|call| *call == key).count()
    }

    /// Calls `owner.name(desc)` with `args`, receiver first for instance procedures.
    pub fn invoke(
        &mut self,
        owner: &str,
        name: &str,
        desc: &str,
        args: Vec<Value>,
    ) -> Result<Option<Value>> {
        let desc = MethodType::parse(desc).map_err(|e| Error::Unresolved(e.to_string()))?;
        self.call(owner, name, &desc, args)
    }

    fn call(
        &mut self,
        owner: &str,
        name: &str,
        desc: &MethodType,
        args: Vec<Value>,
    ) -> Result<Option<Value>> {
        let key = call_key(owner, name, desc);
        self.calls.push(key.clone());
        if let Some(native) = self.natives.get_mut(&key) {
            return Ok(native(&args));
        }
        match self.lookup(owner, name, desc) {
            Some(procedure) => self.run(&procedure, args),
            None if name == "<init>" => Ok(None),
            None => Err(Error::Unresolved(key)),
        }
    }

    fn lookup(&self, owner: &str, name: &str, desc: &MethodType) -> Option<Procedure> {
        let mut current = Some(owner.to_string());
        while let Some(unit_name) = current {
            let unit = self.units.get(&unit_name)?;
            if let Some(procedure) = unit.procedure(name, desc) {
                return Some(procedure.clone());
            }
            current = unit.super_name.clone();
        }
        None
    }

    fn run(&mut self, procedure: &Procedure, args: Vec<Value>) -> Result<Option<Value>> {
        let nodes = procedure.body.to_nodes();
        let labels: HashMap<Label, usize> = nodes
            .iter()
            .enumerate()
            .filter_map(|(index, node)| match node {
                Node::Label(label) => Some((*label, index)),
                Node::Insn(_) => None,
            })
            .collect();
        let jump = |label: Label| labels.get(&label).copied().ok_or(Error::Label(label.0));

        let mut locals: HashMap<u16, Value> = HashMap::new();
        let mut slot = 0u16;
        for value in args {
            let width = if value.is_wide() { 2 } else { 1 };
            locals.insert(slot, value);
            slot += width;
        }

        let frame = procedure.to_string();
        let mut stack: Vec<Value> = Vec::new();
        let mut pc = 0usize;
        while let Some(node) = nodes.get(pc) {
            self.fuel = self.fuel.checked_sub(1).ok_or(Error::OutOfFuel)?;
            pc += 1;
            let Node::Insn(insn) = node else { continue };
            let pop = |stack: &mut Vec<Value>| stack.pop().ok_or_else(|| Error::Underflow(frame.clone()));

            match insn {
                Instruction::Push(constant) => stack.push(Value::from(&constant.literal)),
                Instruction::Load { slot, .. } => {
                    let value = locals.get(slot).cloned().ok_or(Error::UnsetLocal(*slot))?;
                    stack.push(value);
                }
                Instruction::Store { slot, .. } => {
                    let value = pop(&mut stack)?;
                    locals.insert(*slot, value);
                }
                Instruction::Stack(op) => stack_op(*op, &mut stack, &frame)?,
                Instruction::Field { mode, scope, field } => {
                    let key = field.name.clone();
                    match (mode, scope) {
                        (FieldMode::Get, Scope::Static) => {
                            let value = self
                                .statics
                                .get(&format!("{}.{}", field.owner, key))
                                .cloned()
                                .unwrap_or_else(|| Value::zero(&field.ty));
                            stack.push(value);
                        }
                        (FieldMode::Put, Scope::Static) => {
                            let value = pop(&mut stack)?;
                            self.statics.insert(format!("{}.{}", field.owner, key), value);
                        }
                        (FieldMode::Get, Scope::Instance) => {
                            let target = pop(&mut stack)?;
                            let object = self.object_mut(target)?;
                            let value = object
                                .fields
                                .get(&key)
                                .cloned()
                                .unwrap_or_else(|| Value::zero(&field.ty));
                            stack.push(value);
                        }
                        (FieldMode::Put, Scope::Instance) => {
                            let value = pop(&mut stack)?;
                            let target = pop(&mut stack)?;
                            self.object_mut(target)?.fields.insert(key, value);
                        }
                    }
                }
                Instruction::Invoke { dispatch, method } => {
                    let mut args = Vec::with_capacity(method.desc.params.len() + 1);
                    for _ in &method.desc.params {
                        args.push(pop(&mut stack)?);
                    }
                    if *dispatch != Dispatch::Static {
                        args.push(pop(&mut stack)?);
                    }
                    args.reverse();
                    if let Some(value) = self.call(&method.owner, &method.name, &method.desc, args)? {
                        stack.push(value);
                    }
                }
                Instruction::Allocate { ty } => {
                    let value = self.allocate(ty);
                    stack.push(value);
                }
                Instruction::Return(ty) => {
                    return if *ty == Type::Void {
                        Ok(None)
                    } else {
                        pop(&mut stack).map(Some)
                    };
                }
                Instruction::Throw => {
                    let thrown = pop(&mut stack)?;
                    let class = self
                        .object(&thrown)
                        .map(|object| object.class.clone())
                        .unwrap_or_else(|| format!("{thrown:?}"));
                    return Err(Error::Thrown(class));
                }
                Instruction::Jump { cond, target } => {
                    if branch(*cond, &mut stack, &frame)? {
                        pc = jump(*target)?;
                    }
                }
                Instruction::Switch { default, cases } => {
                    let key = int(pop(&mut stack)?)?;
                    let target = cases
                        .iter()
                        .find(|(value, _)| *value == key)
                        .map(|(_, label)| *label)
                        .unwrap_or(*default);
                    pc = jump(target)?;
                }
                Instruction::CheckCast { .. } => {}
                Instruction::Opaque { opcode, .. } => {
                    arithmetic(*opcode, &mut stack, &frame)?;
                }
            }
        }
        Err(Error::FellThrough(frame))
    }

    fn object_mut(&mut self, value: Value) -> Result<&mut Object> {
        match value {
            Value::Ref(index) if index < self.heap.len() => Ok(&mut self.heap[index]),
            found => Err(Error::Type {
                expected: "object reference",
                found,
            }),
        }
    }
}

fn int(value: Value) -> Result<i32> {
    match value {
        Value::Int(v) => Ok(v),
        found => Err(Error::Type {
            expected: "int",
            found,
        }),
    }
}

fn long(value: Value) -> Result<i64> {
    match value {
        Value::Long(v) => Ok(v),
        found => Err(Error::Type {
            expected: "long",
            found,
        }),
    }
}

fn underflow(frame: &str) -> Error {
    Error::Underflow(frame.to_string())
}

fn stack_op(op: StackOp, stack: &mut Vec<Value>, frame: &str) -> Result<()> {
    let top = stack.last().cloned().ok_or_else(|| underflow(frame))?;
    match op {
        StackOp::Pop => {
            stack.pop();
        }
        StackOp::Pop2 => {
            stack.pop();
            if !top.is_wide() {
                stack.pop().ok_or_else(|| underflow(frame))?;
            }
        }
        StackOp::Dup => stack.push(top),
        StackOp::Dup2 if top.is_wide() => stack.push(top),
        StackOp::Dup2 => {
            let len = stack.len();
            if len < 2 {
                return Err(underflow(frame));
            }
            let pair = stack[len - 2..].to_vec();
            stack.extend(pair);
        }
        StackOp::DupX1 => {
            let len = stack.len();
            if len < 2 {
                return Err(underflow(frame));
            }
            stack.insert(len - 2, top);
        }
        StackOp::Swap => {
            let len = stack.len();
            if len < 2 {
                return Err(underflow(frame));
            }
            stack.swap(len - 1, len - 2);
        }
        other => return Err(Error::Unsupported(format!("{other:?}"))),
    }
    Ok(())
}

fn branch(cond: JumpCond, stack: &mut Vec<Value>, frame: &str) -> Result<bool> {
    let mut pop = || stack.pop().ok_or_else(|| underflow(frame));
    let taken = match cond {
        JumpCond::Always => true,
        JumpCond::IfEq => int(pop()?)? == 0,
        JumpCond::IfNe => int(pop()?)? != 0,
        JumpCond::IfLt => int(pop()?)? < 0,
        JumpCond::IfGe => int(pop()?)? >= 0,
        JumpCond::IfGt => int(pop()?)? > 0,
        JumpCond::IfLe => int(pop()?)? <= 0,
        JumpCond::IfNull => pop()? == Value::Null,
        JumpCond::IfNonNull => pop()? != Value::Null,
        JumpCond::IfACmpEq | JumpCond::IfACmpNe => {
            let (b, a) = (pop()?, pop()?);
            (a == b) == (cond == JumpCond::IfACmpEq)
        }
        cmp => {
            let (b, a) = (int(pop()?)?, int(pop()?)?);
            match cmp {
                JumpCond::IfICmpEq => a == b,
                JumpCond::IfICmpNe => a != b,
                JumpCond::IfICmpLt => a < b,
                JumpCond::IfICmpGe => a >= b,
                JumpCond::IfICmpGt => a > b,
                _ => a <= b,
            }
        }
    };
    Ok(taken)
}

fn arithmetic(opcode: Opcode, stack: &mut Vec<Value>, frame: &str) -> Result<()> {
    let mut pop = || stack.pop().ok_or_else(|| underflow(frame));
    let result = match opcode {
        Opcode::NOP => return Ok(()),
        Opcode::IADD | Opcode::ISUB | Opcode::IMUL => {
            let (b, a) = (int(pop()?)?, int(pop()?)?);
            Value::Int(match opcode {
                Opcode::IADD => a.wrapping_add(b),
                Opcode::ISUB => a.wrapping_sub(b),
                _ => a.wrapping_mul(b),
            })
        }
        Opcode::LADD => {
            let (b, a) = (long(pop()?)?, long(pop()?)?);
            Value::Long(a.wrapping_add(b))
        }
        Opcode::I2L => Value::Long(i64::from(int(pop()?)?)),
        other => return Err(Error::Unsupported(other.to_string())),
    };
    stack.push(result);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{self, COUNTER};
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn runs_the_unwoven_counter() {
        let mut machine = Machine::new();
        machine.load(fixtures::counter());
        let counter = machine.allocate(COUNTER);
        for _ in 0..3 {
            machine
                .invoke(COUNTER, "bump", "()V", vec![counter.clone()])
                .unwrap();
        }
        let object = machine.object(&counter).unwrap();
        assert_eq!(object.fields.get("hits"), Some(&Value::Int(3)));
    }

    #[test]
    fn natives_receive_arguments() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let mut machine = Machine::new();
        machine.load(fixtures::counter()).native("demo/Sink.record(I)V", move |args| {
            sink.borrow_mut().extend(args.iter().cloned());
            None
        });
        let counter = machine.allocate(COUNTER);
        machine
            .invoke(COUNTER, "ping", "(I)V", vec![counter, Value::Int(9)])
            .unwrap();
        assert_eq!(*seen.borrow(), vec![Value::Int(9)]);
        assert_eq!(machine.count_calls("demo/Sink.record(I)V"), 1);
    }

    #[test]
    fn probe_fields_and_branches() {
        let mut machine = Machine::new();
        machine.load(fixtures::probe());
        let probe = machine.allocate(fixtures::PROBE);
        let mut run = |arg: i32| {
            machine
                .invoke(fixtures::PROBE, "mixed", "(I)D", vec![probe.clone(), Value::Int(arg)])
                .unwrap()
        };
        assert_eq!(run(5), Some(Value::Int(1)));
        assert_eq!(run(0), Some(Value::Double(0.0)));
        assert_eq!(
            machine.static_field(fixtures::PROBE, "static"),
            Some(&Value::Int(0))
        );
        let object = machine.object(&probe).unwrap();
        assert_eq!(object.fields.get("virtual"), Some(&Value::Int(0)));
    }
}
