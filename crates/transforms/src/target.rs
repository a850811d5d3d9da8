//! Target descriptors: the declarative rules that pick instructions out of a body.
//!
//! A descriptor is written `KIND[:matcher]`, optionally followed by `@ordinal` and a
//! `<`/`>` shift marker. A `>` that closes a `<init>`-style name belongs to the matcher, and a
//! `string` constant keeps its whole text, so its ordinal and shift are set through the fields:
//!
//! ```text
//! HEAD
//! RETURN@0
//! INVOKE:com/example/Log;info(Ljava/lang/String;)V>
//! FIELD:Lcom/example/Widget;size:I
//! NEW:com/example/Widget(I)V
//! OPCODE:IADD
//! CONSTANT:int 40
//! ```

use crate::{Error, Result};
use mixweave_core::descriptor::MemberDecl;
use mixweave_core::literal::Literal;
use mixweave_core::opcode::Opcode;
use mixweave_core::types::MethodType;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TargetKind {
    Head,
    Return,
    Throw,
    Tail,
    Invoke,
    Field,
    GetField,
    PutField,
    New,
    Opcode,
    Constant,
}

impl TargetKind {
    const NAMES: [(TargetKind, &'static str); 11] = [
        (TargetKind::Head, "HEAD"),
        (TargetKind::Return, "RETURN"),
        (TargetKind::Throw, "THROW"),
        (TargetKind::Tail, "TAIL"),
        (TargetKind::Invoke, "INVOKE"),
        (TargetKind::Field, "FIELD"),
        (TargetKind::GetField, "GETFIELD"),
        (TargetKind::PutField, "PUTFIELD"),
        (TargetKind::New, "NEW"),
        (TargetKind::Opcode, "OPCODE"),
        (TargetKind::Constant, "CONSTANT"),
    ];

    pub fn name(self) -> &'static str {
        Self::NAMES
            .iter()
            .find(|(kind, _)| *kind == self)
            .map(|(_, name)| *name)
            .unwrap_or("?")
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::NAMES
            .iter()
            .find(|(_, n)| n.eq_ignore_ascii_case(name))
            .map(|(kind, _)| *kind)
    }

    /// Kinds that select by position and take no matcher.
    pub fn is_positional(self) -> bool {
        matches!(
            self,
            TargetKind::Head | TargetKind::Return | TargetKind::Throw | TargetKind::Tail
        )
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Whether spliced code goes before or after the matched instruction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Shift {
    #[default]
    Before,
    After,
}

fn all_ordinals() -> i32 {
    -1
}

fn is_all(ordinal: &i32) -> bool {
    *ordinal == -1
}

/// A declarative rule selecting instructions within a body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetDescriptor {
    pub kind: TargetKind,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub matcher: String,
    #[serde(default)]
    pub shift: Shift,
    /// `-1` selects every match, otherwise the zero-based match to keep.
    #[serde(default = "all_ordinals", skip_serializing_if = "is_all")]
    pub ordinal: i32,
}

/// Parsed form of a descriptor's matcher string.
#[derive(Debug, Clone, PartialEq)]
pub enum Matcher {
    Any,
    Member(MemberDecl),
    Allocation {
        ty: String,
        init: Option<MethodType>,
    },
    Opcode(Opcode),
    Constant(Literal),
}

impl TargetDescriptor {
    pub fn new(kind: TargetKind, matcher: impl Into<String>) -> Self {
        Self {
            kind,
            matcher: matcher.into(),
            shift: Shift::Before,
            ordinal: -1,
        }
    }

    pub fn at(kind: TargetKind) -> Self {
        Self::new(kind, "")
    }

    pub fn with_ordinal(mut self, ordinal: i32) -> Self {
        self.ordinal = ordinal;
        self
    }

    pub fn with_shift(mut self, shift: Shift) -> Self {
        self.shift = shift;
        self
    }

    /// Interprets the matcher string for this descriptor's kind.
    pub fn matcher(&self) -> Result<Matcher> {
        let text = self.matcher.trim();
        let invalid = |reason: String| Error::InvalidTarget {
            handler: String::new(),
            target: self.to_string(),
            reason,
        };
        if self.kind.is_positional() {
            return Ok(Matcher::Any);
        }
        if text.is_empty() {
            return Err(invalid(format!("{} requires a matcher", self.kind)));
        }
        let matcher = match self.kind {
            TargetKind::Invoke
            | TargetKind::Field
            | TargetKind::GetField
            | TargetKind::PutField => {
                Matcher::Member(MemberDecl::parse(text).map_err(|e| invalid(e.to_string()))?)
            }
            TargetKind::New => parse_allocation(text).map_err(|e| invalid(e.to_string()))?,
            TargetKind::Opcode => {
                Matcher::Opcode(Opcode::parse(text).map_err(|e| invalid(e.to_string()))?)
            }
            TargetKind::Constant => {
                Matcher::Constant(Literal::parse(text).map_err(|e| invalid(e.to_string()))?)
            }
            TargetKind::Head | TargetKind::Return | TargetKind::Throw | TargetKind::Tail => {
                Matcher::Any
            }
        };
        Ok(matcher)
    }
}

fn parse_allocation(text: &str) -> mixweave_core::Result<Matcher> {
    let (ty, init) = match text.find('(') {
        Some(at) => (&text[..at], Some(MethodType::parse(&text[at..])?)),
        None => (text, None),
    };
    let ty = match ty.strip_prefix('L').and_then(|t| t.strip_suffix(';')) {
        Some(inner) => inner,
        None => ty,
    };
    if ty.is_empty() {
        return Err(mixweave_core::Error::InvalidMember(format!(
            "missing type in `{text}`"
        )));
    }
    Ok(Matcher::Allocation {
        ty: ty.replace('.', "/"),
        init,
    })
}

impl fmt::Display for TargetDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind.name())?;
        if !self.matcher.is_empty() {
            write!(f, ":{}", self.matcher)?;
        }
        if self.ordinal != -1 {
            write!(f, "@{}", self.ordinal)?;
        }
        if self.shift == Shift::After {
            f.write_str(">")?;
        }
        Ok(())
    }
}

impl FromStr for TargetDescriptor {
    type Err = Error;

    fn from_str(input: &str) -> Result<Self> {
        let text = input.trim();
        let (kind, mut matcher) = text.split_once(':').unwrap_or((text, ""));
        let kind = TargetKind::from_name(kind.trim())
            .ok_or_else(|| Error::Configuration(format!("unknown target kind in `{input}`")))?;

        let mut shift = Shift::Before;
        let mut ordinal = -1;
        // A string literal owns every character after its kind.
        let literal_text =
            kind == TargetKind::Constant && matcher.split_whitespace().next() == Some("string");
        if !literal_text {
            if let Some(rest) = strip_shift(matcher, '>') {
                shift = Shift::After;
                matcher = rest;
            } else if let Some(rest) = strip_shift(matcher, '<') {
                matcher = rest;
            }
            if let Some((head, tail)) = matcher.rsplit_once('@')
                && let Ok(n) = tail.parse::<i32>()
            {
                ordinal = n;
                matcher = head;
            }
        }

        Ok(Self {
            kind,
            matcher: matcher.trim().to_string(),
            shift,
            ordinal,
        })
    }
}

/// Strips a trailing shift `marker` unless it closes a `<init>`-style name.
fn strip_shift(text: &str, marker: char) -> Option<&str> {
    let rest = text.strip_suffix(marker)?;
    let open = rest.matches('<').count();
    let close = rest.matches('>').count();
    (open == close).then_some(rest)
}

/// Optional window restricting where a descriptor is searched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SliceSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<TargetDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<TargetDescriptor>,
}

impl SliceSpec {
    pub fn is_unbounded(&self) -> bool {
        self.from.is_none() && self.to.is_none()
    }
}
