//! JSON manifest declaring handler units.
//!
//! ```json
//! {
//!   "handlers": [{
//!     "unit": "hooks/WidgetHooks.json",
//!     "targets": ["demo/Widget"],
//!     "handlers": [{
//!       "procedure": "onDraw(Lmixweave/runtime/CallbackInfo;)V",
//!       "kind": "Inject",
//!       "methods": ["draw"],
//!       "at": ["HEAD"],
//!       "options": { "cancellable": true }
//!     }]
//!   }],
//!   "mappings": { "types": { "demo/Widget": "a/b" } }
//! }
//! ```
//!
//! Targets are written in the descriptor syntax of [`crate::target`]. Unit paths are relative
//! to the manifest.

use crate::handler::{HandlerOptions, HandlerProcedure, HandlerUnit, InjectionKind};
use crate::remap::MappingTable;
use crate::target::{SliceSpec, TargetDescriptor};
use crate::{Error, Result};
use mixweave_core::codec::{UnitCodec, read_unit};
use mixweave_core::descriptor::MemberDecl;
use mixweave_core::unit::CompiledUnit;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WeaveManifest {
    #[serde(default)]
    pub handlers: Vec<HandlerUnitEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mappings: Option<MappingTable>,
}

/// One handler unit: where to load it from and which units it applies to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandlerUnitEntry {
    pub unit: PathBuf,
    pub targets: Vec<String>,
    #[serde(default)]
    pub handlers: Vec<HandlerEntry>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SliceEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
}

/// One handler procedure of a handler unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandlerEntry {
    /// The handler procedure, looked up in the loaded unit.
    pub procedure: MemberDecl,
    pub kind: InjectionKind,
    pub methods: Vec<MemberDecl>,
    pub at: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slice: Option<SliceEntry>,
    #[serde(default)]
    pub options: HandlerOptions,
}

impl WeaveManifest {
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| Error::Configuration(format!("manifest: {e}")))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| mixweave_core::Error::FileRead {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&text)
    }

    /// Loads every handler unit relative to `base` and binds its handlers.
    pub fn load_units(&self, base: &Path, codec: &dyn UnitCodec) -> Result<Vec<HandlerUnit>> {
        self.handlers
            .iter()
            .map(|entry| {
                let unit = read_unit(&base.join(&entry.unit), codec)?;
                entry.bind(unit)
            })
            .collect()
    }
}

fn parse_target(text: &str) -> Result<TargetDescriptor> {
    let target: TargetDescriptor = text.parse()?;
    target.matcher()?;
    Ok(target)
}

impl HandlerEntry {
    fn bind(&self, unit: &CompiledUnit) -> Result<HandlerProcedure> {
        let mut candidates = unit.procedures.iter().filter(|p| {
            self.procedure
                .matches_signature(&unit.name, &p.name, &p.desc)
        });
        let procedure = match (candidates.next(), candidates.next()) {
            (Some(found), None) => found.clone(),
            (None, _) => {
                return Err(Error::Configuration(format!(
                    "{} declares no procedure {}",
                    unit.name, self.procedure
                )));
            }
            (Some(_), Some(_)) => {
                return Err(Error::Configuration(format!(
                    "{} in {} is ambiguous; add a descriptor",
                    self.procedure, unit.name
                )));
            }
        };

        let at = self
            .at
            .iter()
            .map(|text| parse_target(text.as_str()))
            .collect::<Result<Vec<_>>>()?;
        let mut handler = HandlerProcedure::new(procedure, self.kind, self.methods.clone(), at)
            .with_options(self.options.clone());
        if let Some(slice) = &self.slice {
            handler = handler.with_slice(SliceSpec {
                from: slice.from.as_deref().map(parse_target).transpose()?,
                to: slice.to.as_deref().map(parse_target).transpose()?,
            });
        }
        Ok(handler)
    }
}

impl HandlerUnitEntry {
    /// Binds the declared handlers to the procedures of the loaded `unit`.
    pub fn bind(&self, unit: CompiledUnit) -> Result<HandlerUnit> {
        let handlers = self
            .handlers
            .iter()
            .map(|entry| entry.bind(&unit))
            .collect::<Result<Vec<_>>>()?;
        let bound = handlers
            .into_iter()
            .fold(HandlerUnit::new(unit, self.targets.clone()), HandlerUnit::with_handler);
        bound.validate()?;
        Ok(bound)
    }
}
