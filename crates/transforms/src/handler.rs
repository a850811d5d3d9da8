//! Handler procedures and their configuration-time checks.

use crate::target::{SliceSpec, TargetDescriptor, TargetKind};
use crate::{Error, Result};
use mixweave_core::descriptor::MemberDecl;
use mixweave_core::unit::{CompiledUnit, Procedure};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How a handler is spliced into its sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InjectionKind {
    /// Call the handler next to the site, leaving the site in place.
    Inject,
    /// Replace a field access, invocation or allocation with a handler call.
    Redirect,
    /// Guard a field write or void invocation with a handler call.
    WrapCondition,
    /// Replace a constant push with a handler call.
    ModifyConstant,
}

impl InjectionKind {
    /// Target kinds this injection kind can splice at.
    pub fn accepts(self, kind: TargetKind) -> bool {
        use TargetKind::*;
        match self {
            InjectionKind::Inject => true,
            InjectionKind::Redirect => {
                matches!(kind, Invoke | Field | GetField | PutField | New)
            }
            InjectionKind::WrapCondition => matches!(kind, Invoke | Field | PutField),
            InjectionKind::ModifyConstant => kind == Constant,
        }
    }
}

impl fmt::Display for InjectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

fn one() -> usize {
    1
}

fn is_one(n: &usize) -> bool {
    *n == 1
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandlerOptions {
    /// Inject only: the handler may cancel the rest of the target procedure.
    #[serde(default)]
    pub cancellable: bool,
    /// Inject only: local slots of the target procedure passed after the carrier.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub locals: Vec<u16>,
    /// Minimum number of sites across all target procedures.
    #[serde(default = "one", skip_serializing_if = "is_one")]
    pub require: usize,
    /// Maximum number of sites across all target procedures.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow: Option<usize>,
}

impl Default for HandlerOptions {
    fn default() -> Self {
        Self {
            cancellable: false,
            locals: Vec::new(),
            require: 1,
            allow: None,
        }
    }
}

/// A procedure of a handler unit together with where and how it is spliced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandlerProcedure {
    pub procedure: Procedure,
    pub kind: InjectionKind,
    /// Procedures of the target unit to splice into.
    pub methods: Vec<MemberDecl>,
    pub at: Vec<TargetDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slice: Option<SliceSpec>,
    #[serde(default)]
    pub options: HandlerOptions,
}

impl HandlerProcedure {
    pub fn new(
        procedure: Procedure,
        kind: InjectionKind,
        methods: Vec<MemberDecl>,
        at: Vec<TargetDescriptor>,
    ) -> Self {
        Self {
            procedure,
            kind,
            methods,
            at,
            slice: None,
            options: HandlerOptions::default(),
        }
    }

    pub fn with_slice(mut self, slice: SliceSpec) -> Self {
        self.slice = Some(slice);
        self
    }

    pub fn with_options(mut self, options: HandlerOptions) -> Self {
        self.options = options;
        self
    }

    /// `owner;name(desc)` of the handler procedure.
    pub fn id(&self) -> String {
        self.procedure.id()
    }

    /// Whether `procedure` of the target unit is one this handler applies to.
    pub fn selects(&self, owner: &str, procedure: &Procedure) -> bool {
        self.methods
            .iter()
            .any(|decl| decl.matches_signature(owner, &procedure.name, &procedure.desc))
    }

    fn invalid(&self, target: &TargetDescriptor, reason: impl Into<String>) -> Error {
        Error::InvalidTarget {
            handler: self.id(),
            target: target.to_string(),
            reason: reason.into(),
        }
    }

    /// Checks everything that can be checked without a target unit.
    pub fn validate(&self) -> Result<()> {
        let config = |msg: String| Error::Configuration(format!("handler {}: {msg}", self.id()));
        if self.methods.is_empty() {
            return Err(config("no target procedures".into()));
        }
        if self.at.is_empty() {
            return Err(config("no target descriptors".into()));
        }
        if self.procedure.is_abstract {
            return Err(config("handler procedure has no body".into()));
        }
        if self.procedure.is_constructor() || self.procedure.is_static_initializer() {
            return Err(config("initializers cannot be handlers".into()));
        }
        if self.kind == InjectionKind::ModifyConstant && self.at.len() > 1 {
            return Err(config(format!(
                "ModifyConstant takes a single target, {} given",
                self.at.len()
            )));
        }
        if let Some(allow) = self.options.allow
            && allow < self.options.require
        {
            return Err(config(format!(
                "allow ({allow}) is below require ({})",
                self.options.require
            )));
        }
        if self.kind != InjectionKind::Inject
            && (self.options.cancellable || !self.options.locals.is_empty())
        {
            return Err(config(format!(
                "cancellable and locals only apply to Inject, not {}",
                self.kind
            )));
        }

        for target in &self.at {
            if !self.kind.accepts(target.kind) {
                return Err(self.invalid(target, format!("{} cannot target {}", self.kind, target.kind)));
            }
            if target.ordinal < -1 {
                return Err(self.invalid(target, "ordinal must be -1 or a match index"));
            }
            target.matcher().map_err(|e| match e {
                Error::InvalidTarget { target, reason, .. } => Error::InvalidTarget {
                    handler: self.id(),
                    target,
                    reason,
                },
                other => other,
            })?;
        }
        if let Some(slice) = &self.slice {
            for bound in slice.from.iter().chain(slice.to.iter()) {
                bound.matcher()?;
            }
        }
        Ok(())
    }
}

/// A handler-declaring unit, the units it applies to, and its handler procedures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandlerUnit {
    pub unit: CompiledUnit,
    pub targets: Vec<String>,
    pub handlers: Vec<HandlerProcedure>,
}

impl HandlerUnit {
    pub fn new(unit: CompiledUnit, targets: Vec<String>) -> Self {
        Self {
            unit,
            targets,
            handlers: Vec::new(),
        }
    }

    /// Adds a handler, declaring its procedure on the unit if the unit does not have it yet.
    pub fn with_handler(mut self, handler: HandlerProcedure) -> Self {
        let proc = &handler.procedure;
        if self.unit.procedure(&proc.name, &proc.desc).is_none() {
            self.unit.procedures.push(proc.clone());
        }
        self.handlers.push(handler);
        self
    }

    pub fn name(&self) -> &str {
        &self.unit.name
    }

    pub fn validate(&self) -> Result<()> {
        if self.targets.is_empty() {
            return Err(Error::Configuration(format!(
                "handler unit {} names no target units",
                self.unit.name
            )));
        }
        for handler in &self.handlers {
            if handler.procedure.owner != self.unit.name {
                return Err(Error::Configuration(format!(
                    "handler {} is not declared by {}",
                    handler.id(),
                    self.unit.name
                )));
            }
            handler.validate()?;
        }
        Ok(())
    }
}
