//! Constant literals and the instruction forms that push them.
//!
//! The same literal can be pushed several ways (`ICONST_5`, `BIPUSH 5`, `LDC int 5`). The
//! form is part of an instruction's identity: a literal is matched by value, but whoever
//! re-emits a matched push copies its form instead of re-deriving one.

use crate::opcode::Opcode;
use crate::result::{Error, Result};
use crate::types::{self, Type};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A constant value pushed onto the operand stack.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Literal {
    Null,
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
    /// Type literal (`Foo.class`), stored as an internal name or array descriptor.
    Type(String),
}

impl PartialEq for Literal {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Literal::Null, Literal::Null) => true,
            (Literal::Int(a), Literal::Int(b)) => a == b,
            (Literal::Long(a), Literal::Long(b)) => a == b,
            (Literal::Float(a), Literal::Float(b)) => a.to_bits() == b.to_bits(),
            (Literal::Double(a), Literal::Double(b)) => a.to_bits() == b.to_bits(),
            (Literal::String(a), Literal::String(b)) => a == b,
            (Literal::Type(a), Literal::Type(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Literal {}

/// How a push instruction encodes its literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PushForm {
    /// Dedicated opcode (`ACONST_NULL`, `ICONST_n`, `LCONST_n`, `FCONST_n`, `DCONST_n`).
    Const,
    /// `BIPUSH` signed byte immediate.
    Byte,
    /// `SIPUSH` signed short immediate.
    Short,
    /// Constant-pool load (`LDC`, `LDC2_W`).
    Pooled,
}

impl Literal {
    /// Parses the `<kind> <value>` grammar (`int 5`, `string hello world`, `null`).
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        let (kind, value) = match input.split_once(char::is_whitespace) {
            Some((kind, value)) => (kind, value.trim_start()),
            None => (input, ""),
        };
        let invalid = |why: &str| Error::InvalidLiteral(format!("{why} in `{input}`"));
        let literal = match kind {
            "null" if value.is_empty() => Literal::Null,
            "null" => return Err(invalid("null takes no value")),
            "int" => Literal::Int(parse_int(value).ok_or_else(|| invalid("bad int"))?),
            "long" => Literal::Long(
                parse_long(value.trim_end_matches(['L', 'l'])).ok_or_else(|| invalid("bad long"))?,
            ),
            "float" => Literal::Float(
                value
                    .trim_end_matches(['F', 'f'])
                    .parse()
                    .map_err(|_| invalid("bad float"))?,
            ),
            "double" => Literal::Double(
                value
                    .trim_end_matches(['D', 'd'])
                    .parse()
                    .map_err(|_| invalid("bad double"))?,
            ),
            "string" => Literal::String(unquote(value)),
            "type" if !value.is_empty() => {
                let ty = Type::parse(value).unwrap_or_else(|_| Type::object(value));
                if !ty.is_reference() {
                    return Err(invalid("type literal must name a reference type"));
                }
                Literal::Type(ty.cast_name())
            }
            _ => return Err(invalid("unknown literal kind")),
        };
        Ok(literal)
    }

    /// Static type of the pushed value.
    pub fn ty(&self) -> Type {
        match self {
            Literal::Null => Type::object(types::OBJECT),
            Literal::Int(_) => Type::Int,
            Literal::Long(_) => Type::Long,
            Literal::Float(_) => Type::Float,
            Literal::Double(_) => Type::Double,
            Literal::String(_) => Type::object(types::STRING),
            Literal::Type(_) => Type::object(types::CLASS),
        }
    }

    /// Shortest form able to push this literal.
    pub fn canonical_form(&self) -> PushForm {
        [PushForm::Const, PushForm::Byte, PushForm::Short]
            .into_iter()
            .find(|form| self.fits(*form))
            .unwrap_or(PushForm::Pooled)
    }

    /// True when `form` can encode this literal.
    pub fn fits(&self, form: PushForm) -> bool {
        match (self, form) {
            (Literal::Null, PushForm::Const) => true,
            (Literal::Null, _) => false,
            (Literal::Int(v), PushForm::Const) => (-1..=5).contains(v),
            (Literal::Int(v), PushForm::Byte) => i8::try_from(*v).is_ok(),
            (Literal::Int(v), PushForm::Short) => i16::try_from(*v).is_ok(),
            (Literal::Long(v), PushForm::Const) => *v == 0 || *v == 1,
            (Literal::Float(v), PushForm::Const) => {
                [0.0f32, 1.0, 2.0].iter().any(|c| c.to_bits() == v.to_bits())
            }
            (Literal::Double(v), PushForm::Const) => {
                [0.0f64, 1.0].iter().any(|c| c.to_bits() == v.to_bits())
            }
            (_, PushForm::Pooled) => true,
            _ => false,
        }
    }

    /// Opcode that pushes this literal in the given form.
    ///
    /// Callers guarantee `self.fits(form)`; a mismatched pair falls back to the pool load.
    pub fn opcode(&self, form: PushForm) -> Opcode {
        match (self, form) {
            (Literal::Null, PushForm::Const) => Opcode::ACONST_NULL,
            (Literal::Int(v), PushForm::Const) if (-1..=5).contains(v) => {
                Opcode((Opcode::ICONST_0.0 as i32 + v) as u8)
            }
            (Literal::Long(v), PushForm::Const) if *v == 0 || *v == 1 => {
                Opcode(Opcode::LCONST_0.0 + *v as u8)
            }
            (Literal::Float(v), PushForm::Const) if self.fits(PushForm::Const) => {
                Opcode(Opcode::FCONST_0.0 + *v as u8)
            }
            (Literal::Double(v), PushForm::Const) if self.fits(PushForm::Const) => {
                Opcode(Opcode::DCONST_0.0 + *v as u8)
            }
            (Literal::Int(_), PushForm::Byte) => Opcode::BIPUSH,
            (Literal::Int(_), PushForm::Short) => Opcode::SIPUSH,
            (Literal::Long(_) | Literal::Double(_), _) => Opcode::LDC2_W,
            _ => Opcode::LDC,
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Null => write!(f, "null"),
            Literal::Int(v) => write!(f, "int {v}"),
            Literal::Long(v) => write!(f, "long {v}"),
            Literal::Float(v) => write!(f, "float {v:?}"),
            Literal::Double(v) => write!(f, "double {v:?}"),
            Literal::String(v) => write!(f, "string {v:?}"),
            Literal::Type(v) => write!(f, "type {v}"),
        }
    }
}

/// A literal together with the form used to push it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Constant {
    pub literal: Literal,
    pub form: PushForm,
}

impl Constant {
    /// Builds a push in the shortest form for `literal`.
    pub fn canonical(literal: Literal) -> Self {
        let form = literal.canonical_form();
        Self { literal, form }
    }

    /// Builds a push in an explicit form, rejecting forms that cannot encode the literal.
    pub fn with_form(literal: Literal, form: PushForm) -> Result<Self> {
        if !literal.fits(form) {
            return Err(Error::InvalidLiteral(format!(
                "{literal} cannot be pushed in {form:?} form"
            )));
        }
        Ok(Self { literal, form })
    }

    pub fn opcode(&self) -> Opcode {
        self.literal.opcode(self.form)
    }
}

fn parse_int(value: &str) -> Option<i32> {
    match value.strip_prefix("0x") {
        Some(hex) => u32::from_str_radix(hex, 16).ok().map(|v| v as i32),
        None => value.parse().ok(),
    }
}

fn parse_long(value: &str) -> Option<i64> {
    match value.strip_prefix("0x") {
        Some(hex) => u64::from_str_radix(hex, 16).ok().map(|v| v as i64),
        None => value.parse().ok(),
    }
}

fn unquote(value: &str) -> String {
    match value
        .strip_prefix('"')
        .and_then(|inner| inner.strip_suffix('"'))
    {
        Some(inner) => inner.replace("\\\"", "\"").replace("\\\\", "\\"),
        None => value.to_string(),
    }
}
