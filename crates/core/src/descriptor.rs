//! Member declarations used by target descriptors.
//!
//! ```text
//! [owner;]name[(args)ret]     procedure
//! [owner;]name:type           field
//! ```
//!
//! The owner may be written as `pkg/Name`, `pkg.Name` or `Lpkg/Name;`. Leaving out the owner
//! or the descriptor widens the match to every owner or descriptor; a name of `*` matches
//! every name.

use crate::insn::{FieldRef, MethodRef};
use crate::result::{Error, Result};
use crate::types::{MethodType, Type};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Descriptor part of a member declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MemberDesc {
    Method(MethodType),
    Field(Type),
}

/// Parsed `[owner;]name[desc]` declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct MemberDecl {
    pub owner: Option<String>,
    pub name: String,
    pub desc: Option<MemberDesc>,
}

impl MemberDecl {
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        let invalid = |why: &str| Error::InvalidMember(format!("{why} in `{input}`"));
        let split = input.find(['(', ':']).unwrap_or(input.len());
        let (head, tail) = input.split_at(split);

        let (owner, name) = match head.rfind(';') {
            Some(at) => (Some(normalise_owner(&head[..at])), &head[at + 1..]),
            None => (None, head),
        };
        if name.is_empty() {
            return Err(invalid("missing member name"));
        }
        if owner.as_deref() == Some("") {
            return Err(invalid("empty owner"));
        }

        let desc = if let Some(field_ty) = tail.strip_prefix(':') {
            Some(MemberDesc::Field(Type::parse(field_ty)?))
        } else if tail.is_empty() {
            None
        } else {
            Some(MemberDesc::Method(MethodType::parse(tail)?))
        };

        Ok(Self {
            owner,
            name: name.to_string(),
            desc,
        })
    }

    fn name_matches(&self, name: &str) -> bool {
        self.name == "*" || self.name == name
    }

    fn owner_matches(&self, owner: &str) -> bool {
        self.owner.as_deref().is_none_or(|o| o == owner)
    }

    /// True when this declaration selects the referenced field.
    pub fn matches_field(&self, field: &FieldRef) -> bool {
        if !self.owner_matches(&field.owner) || !self.name_matches(&field.name) {
            return false;
        }
        match &self.desc {
            None => true,
            Some(MemberDesc::Field(ty)) => *ty == field.ty,
            Some(MemberDesc::Method(_)) => false,
        }
    }

    /// True when this declaration selects the referenced procedure.
    pub fn matches_method(&self, method: &MethodRef) -> bool {
        self.matches_signature(&method.owner, &method.name, &method.desc)
    }

    pub fn matches_signature(&self, owner: &str, name: &str, desc: &MethodType) -> bool {
        if !self.owner_matches(owner) || !self.name_matches(name) {
            return false;
        }
        match &self.desc {
            None => true,
            Some(MemberDesc::Method(expected)) => expected == desc,
            Some(MemberDesc::Field(_)) => false,
        }
    }

    pub fn method_desc(&self) -> Option<&MethodType> {
        match &self.desc {
            Some(MemberDesc::Method(desc)) => Some(desc),
            _ => None,
        }
    }
}

/// Converts `Lpkg/Name;`-style and dotted owners to internal names.
fn normalise_owner(owner: &str) -> String {
    let owner = match owner.strip_prefix('L') {
        Some(stripped) if stripped.contains('/') => stripped,
        _ => owner,
    };
    owner.replace('.', "/")
}

impl fmt::Display for MemberDecl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(owner) = &self.owner {
            write!(f, "{owner};")?;
        }
        f.write_str(&self.name)?;
        match &self.desc {
            Some(MemberDesc::Method(desc)) => write!(f, "{desc}"),
            Some(MemberDesc::Field(ty)) => write!(f, ":{ty}"),
            None => Ok(()),
        }
    }
}

impl FromStr for MemberDecl {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        MemberDecl::parse(s)
    }
}

impl From<MemberDecl> for String {
    fn from(decl: MemberDecl) -> Self {
        decl.to_string()
    }
}

impl TryFrom<String> for MemberDecl {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        MemberDecl::parse(&value)
    }
}
