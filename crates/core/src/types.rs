//! Value types and method signatures in descriptor form.
//!
//! Types are written the way they appear inside compiled units (`I`, `J`,
//! `Ljava/lang/String;`, `[I`, `(IJ)V`). For hand-written member declarations the
//! parser also accepts keyword spellings (`int`, `bool`, `long`, ...), so
//! `owner;count:int` and `owner;count:I` declare the same field.

use crate::opcode::Opcode;
use crate::result::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Root of every reference type hierarchy.
pub const OBJECT: &str = "java/lang/Object";
/// Type pushed by string literals.
pub const STRING: &str = "java/lang/String";
/// Type pushed by type literals.
pub const CLASS: &str = "java/lang/Class";

/// A value type, or `Void` for procedures returning nothing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Type {
    Void,
    Boolean,
    Byte,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
    /// Reference to a named type, stored as an internal name (`java/lang/String`).
    Object(String),
    Array(Box<Type>),
}

/// Local-variable / operand category used to pick load, store and return opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Int,
    Long,
    Float,
    Double,
    Reference,
}

impl Type {
    /// Shorthand for `Type::Object` from any internal or dotted name.
    pub fn object(name: impl Into<String>) -> Self {
        Type::Object(name.into().replace('.', "/"))
    }

    /// Parses a single type, accepting descriptor or keyword form.
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        if let Some(ty) = Self::from_keyword(input) {
            return Ok(ty);
        }
        let (ty, rest) = Self::parse_prefix(input)?;
        if !rest.is_empty() {
            return Err(Error::InvalidDescriptor(format!(
                "trailing characters `{rest}` after type in `{input}`"
            )));
        }
        Ok(ty)
    }

    fn from_keyword(word: &str) -> Option<Self> {
        let ty = match word {
            "void" => Type::Void,
            "bool" | "boolean" => Type::Boolean,
            "byte" => Type::Byte,
            "char" => Type::Char,
            "short" => Type::Short,
            "int" => Type::Int,
            "long" => Type::Long,
            "float" => Type::Float,
            "double" => Type::Double,
            _ => {
                let elem = word.strip_suffix("[]")?;
                return Self::from_keyword(elem).map(|t| Type::Array(Box::new(t)));
            }
        };
        Some(ty)
    }

    /// Parses one descriptor from the front of `input`, returning the remainder.
    pub fn parse_prefix(input: &str) -> Result<(Self, &str)> {
        let mut chars = input.chars();
        let Some(tag) = chars.next() else {
            return Err(Error::InvalidDescriptor("empty type descriptor".into()));
        };
        let rest = chars.as_str();
        let ty = match tag {
            'V' => Type::Void,
            'Z' => Type::Boolean,
            'B' => Type::Byte,
            'C' => Type::Char,
            'S' => Type::Short,
            'I' => Type::Int,
            'J' => Type::Long,
            'F' => Type::Float,
            'D' => Type::Double,
            'L' => {
                let end = rest.find(';').ok_or_else(|| {
                    Error::InvalidDescriptor(format!("unterminated reference type in `{input}`"))
                })?;
                if end == 0 {
                    return Err(Error::InvalidDescriptor(format!(
                        "empty reference type in `{input}`"
                    )));
                }
                return Ok((Type::Object(rest[..end].to_string()), &rest[end + 1..]));
            }
            '[' => {
                let (elem, rest) = Self::parse_prefix(rest)?;
                if elem == Type::Void {
                    return Err(Error::InvalidDescriptor(format!(
                        "array of void in `{input}`"
                    )));
                }
                return Ok((Type::Array(Box::new(elem)), rest));
            }
            other => {
                return Err(Error::InvalidDescriptor(format!(
                    "unexpected `{other}` in `{input}`"
                )));
            }
        };
        Ok((ty, rest))
    }

    /// Descriptor form of this type.
    pub fn descriptor(&self) -> String {
        match self {
            Type::Void => "V".into(),
            Type::Boolean => "Z".into(),
            Type::Byte => "B".into(),
            Type::Char => "C".into(),
            Type::Short => "S".into(),
            Type::Int => "I".into(),
            Type::Long => "J".into(),
            Type::Float => "F".into(),
            Type::Double => "D".into(),
            Type::Object(name) => format!("L{name};"),
            Type::Array(elem) => format!("[{}", elem.descriptor()),
        }
    }

    /// Name used by `CHECKCAST`/`NEW` operands: internal name for objects, descriptor for arrays.
    pub fn cast_name(&self) -> String {
        match self {
            Type::Object(name) => name.clone(),
            other => other.descriptor(),
        }
    }

    /// Number of local-variable slots a value of this type occupies.
    pub fn slot_size(&self) -> u16 {
        match self {
            Type::Void => 0,
            Type::Long | Type::Double => 2,
            _ => 1,
        }
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, Type::Object(_) | Type::Array(_))
    }

    pub fn is_primitive(&self) -> bool {
        !self.is_reference() && *self != Type::Void
    }

    pub fn category(&self) -> Option<Category> {
        match self {
            Type::Void => None,
            Type::Boolean | Type::Byte | Type::Char | Type::Short | Type::Int => {
                Some(Category::Int)
            }
            Type::Long => Some(Category::Long),
            Type::Float => Some(Category::Float),
            Type::Double => Some(Category::Double),
            Type::Object(_) | Type::Array(_) => Some(Category::Reference),
        }
    }

    /// Opcode that returns a value of this type (`RETURN` for void).
    pub fn return_opcode(&self) -> Opcode {
        match self.category() {
            None => Opcode::RETURN,
            Some(Category::Int) => Opcode::IRETURN,
            Some(Category::Long) => Opcode::LRETURN,
            Some(Category::Float) => Opcode::FRETURN,
            Some(Category::Double) => Opcode::DRETURN,
            Some(Category::Reference) => Opcode::ARETURN,
        }
    }

    /// Conversion needed to widen a value of `self` into `to`.
    ///
    /// `Some(None)` means the value is usable as is, `Some(Some(op))` means `op` performs the
    /// widening, `None` means no primitive widening exists.
    pub fn widening_to(&self, to: &Type) -> Option<Option<Opcode>> {
        use Type::*;
        if self == to {
            return Some(None);
        }
        match (self, to) {
            (Byte, Short | Int) | (Short | Char, Int) => Some(None),
            (Byte | Short | Char | Int, Long) => Some(Some(Opcode::I2L)),
            (Byte | Short | Char | Int, Float) => Some(Some(Opcode::I2F)),
            (Byte | Short | Char | Int, Double) => Some(Some(Opcode::I2D)),
            (Long, Float) => Some(Some(Opcode::L2F)),
            (Long, Double) => Some(Some(Opcode::L2D)),
            (Float, Double) => Some(Some(Opcode::F2D)),
            _ => None,
        }
    }

    /// Wrapper type and unwrapping method for primitives (`Integer`, `intValue`).
    pub fn boxing(&self) -> Option<(&'static str, &'static str)> {
        let pair = match self {
            Type::Boolean => ("java/lang/Boolean", "booleanValue"),
            Type::Byte => ("java/lang/Byte", "byteValue"),
            Type::Char => ("java/lang/Character", "charValue"),
            Type::Short => ("java/lang/Short", "shortValue"),
            Type::Int => ("java/lang/Integer", "intValue"),
            Type::Long => ("java/lang/Long", "longValue"),
            Type::Float => ("java/lang/Float", "floatValue"),
            Type::Double => ("java/lang/Double", "doubleValue"),
            _ => return None,
        };
        Some(pair)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.descriptor())
    }
}

impl FromStr for Type {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Type::parse(s)
    }
}

impl From<Type> for String {
    fn from(ty: Type) -> Self {
        ty.descriptor()
    }
}

impl TryFrom<String> for Type {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Type::parse(&value)
    }
}

/// Parameter and return types of a procedure.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct MethodType {
    pub params: Vec<Type>,
    pub ret: Type,
}

impl MethodType {
    pub fn new(params: Vec<Type>, ret: Type) -> Self {
        Self { params, ret }
    }

    /// Parses a `(params)ret` descriptor.
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        let mut rest = input.strip_prefix('(').ok_or_else(|| {
            Error::InvalidDescriptor(format!("method descriptor `{input}` must start with `(`"))
        })?;
        let mut params = Vec::new();
        loop {
            if let Some(after) = rest.strip_prefix(')') {
                rest = after;
                break;
            }
            if rest.is_empty() {
                return Err(Error::InvalidDescriptor(format!(
                    "unterminated parameter list in `{input}`"
                )));
            }
            let (param, after) = Type::parse_prefix(rest)?;
            if param == Type::Void {
                return Err(Error::InvalidDescriptor(format!(
                    "void parameter in `{input}`"
                )));
            }
            params.push(param);
            rest = after;
        }
        let (ret, rest) = Type::parse_prefix(rest)?;
        if !rest.is_empty() {
            return Err(Error::InvalidDescriptor(format!(
                "trailing characters `{rest}` in `{input}`"
            )));
        }
        Ok(Self { params, ret })
    }

    pub fn descriptor(&self) -> String {
        let params: String = self.params.iter().map(Type::descriptor).collect();
        format!("({params}){}", self.ret.descriptor())
    }

    /// Local slots taken by the parameters, excluding any receiver.
    pub fn param_slots(&self) -> u16 {
        self.params.iter().map(Type::slot_size).sum()
    }
}

impl fmt::Display for MethodType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.descriptor())
    }
}

impl FromStr for MethodType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        MethodType::parse(s)
    }
}

impl From<MethodType> for String {
    fn from(desc: MethodType) -> Self {
        desc.descriptor()
    }
}

impl TryFrom<String> for MethodType {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        MethodType::parse(&value)
    }
}
