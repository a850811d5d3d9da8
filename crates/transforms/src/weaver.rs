//! The weaving driver.
//!
//! For a target unit the driver runs, per registered handler unit:
//!
//! 1. every handler procedure as its own [`Transform`] on a snapshot of the unit, committed
//!    only when the handler resolved and spliced all its sites;
//! 2. the member merge, which commits the handler unit as a whole or not at all.
//!
//! With `best_effort` a failing step is logged and recorded in the [`WeaveReport`] and the
//! remaining handlers still apply; otherwise the first failure aborts the unit.

use crate::generators::{self, SpliceContext};
use crate::handler::{HandlerProcedure, HandlerUnit};
use crate::hierarchy::ClassHierarchy;
use crate::merge::merge_members;
use crate::registry::HandlerRegistry;
use crate::remap::{Remapper, remap_unit};
use crate::resolver::{resolve_slice, resolve_targets};
use crate::target::TargetDescriptor;
use crate::{Error, Result, Transform, WeaveConfig, WeaveContext};
use mixweave_core::codec::{JsonCodec, UnitCodec};
use mixweave_core::sequence::InsnId;
use mixweave_core::unit::CompiledUnit;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// One handler (or handler unit, for merge failures) that did not apply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandlerFailure {
    pub handler: String,
    pub error: String,
}

/// Outcome of weaving one unit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeaveReport {
    pub unit: String,
    /// Handlers spliced and committed, by identity.
    pub applied: Vec<String>,
    pub failed: Vec<HandlerFailure>,
    /// Sites rewritten across all committed handlers.
    pub sites: usize,
    /// Members and initializer runs merged in.
    pub merged: usize,
}

impl WeaveReport {
    pub fn is_modified(&self) -> bool {
        !self.applied.is_empty() || self.merged > 0
    }
}

/// Resolves and splices a single handler procedure.
pub struct HandlerSplice<'h> {
    id: String,
    handler: &'h HandlerProcedure,
}

impl<'h> HandlerSplice<'h> {
    pub fn new(handler: &'h HandlerProcedure) -> Self {
        Self {
            id: handler.id(),
            handler,
        }
    }

    fn not_found(&self, found: usize) -> Error {
        Error::TargetNotFound {
            handler: self.id.clone(),
            target: self.targets(),
            found,
            required: self.handler.options.require,
        }
    }

    fn targets(&self) -> String {
        self.handler
            .at
            .iter()
            .map(TargetDescriptor::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl Transform for HandlerSplice<'_> {
    fn name(&self) -> &str {
        &self.id
    }

    fn apply(&self, unit: &mut CompiledUnit, ctx: &WeaveContext<'_>) -> Result<usize> {
        let handler = self.handler;

        // Resolve everything before the first body changes.
        let mut plans: Vec<(usize, &TargetDescriptor, Vec<InsnId>)> = Vec::new();
        for (index, procedure) in unit.procedures.iter().enumerate() {
            if procedure.is_abstract || !handler.selects(&unit.name, procedure) {
                continue;
            }
            let window = resolve_slice(procedure, handler.slice.as_ref())?;
            let mut claimed = HashSet::new();
            for target in &handler.at {
                let sites: Vec<InsnId> = resolve_targets(procedure, &window, target)?
                    .into_iter()
                    .filter(|site| claimed.insert(*site))
                    .collect();
                if !sites.is_empty() {
                    plans.push((index, target, sites));
                }
            }
        }

        let found: usize = plans.iter().map(|(_, _, sites)| sites.len()).sum();
        if found < handler.options.require {
            return Err(self.not_found(found));
        }
        if let Some(allowed) = handler.options.allow
            && found > allowed
        {
            return Err(Error::AmbiguousTarget {
                handler: self.id.clone(),
                target: self.targets(),
                found,
                allowed,
            });
        }

        let name = unit.name.clone();
        let mut spliced = 0;
        for (index, target, sites) in plans {
            let splice = SpliceContext {
                unit: &name,
                unit_is_interface: unit.is_interface,
                handler,
                target,
                config: ctx.config,
                hierarchy: ctx.hierarchy,
            };
            let procedure = &mut unit.procedures[index];
            spliced += generators::splice(&splice, procedure, &sites)?;
            procedure.body.validate_labels()?;
        }
        Ok(spliced)
    }
}

/// Copies the members of a handler unit into the target.
pub struct MemberMerge<'h> {
    source: &'h HandlerUnit,
}

impl<'h> MemberMerge<'h> {
    pub fn new(source: &'h HandlerUnit) -> Self {
        Self { source }
    }
}

impl Transform for MemberMerge<'_> {
    fn name(&self) -> &str {
        self.source.name()
    }

    fn apply(&self, unit: &mut CompiledUnit, _ctx: &WeaveContext<'_>) -> Result<usize> {
        Ok(merge_members(unit, &self.source.unit)?.total())
    }
}

pub struct Weaver {
    config: WeaveConfig,
    registry: Arc<HandlerRegistry>,
    hierarchy: Arc<ClassHierarchy>,
    codec: Box<dyn UnitCodec>,
    remapper: Option<Arc<dyn Remapper>>,
}

impl Weaver {
    pub fn new(
        config: WeaveConfig,
        registry: Arc<HandlerRegistry>,
        hierarchy: Arc<ClassHierarchy>,
    ) -> Self {
        Self {
            config,
            registry,
            hierarchy,
            codec: Box::new(JsonCodec::default()),
            remapper: None,
        }
    }

    pub fn with_codec(mut self, codec: Box<dyn UnitCodec>) -> Self {
        self.codec = codec;
        self
    }

    pub fn with_remapper(mut self, remapper: Arc<dyn Remapper>) -> Self {
        self.remapper = Some(remapper);
        self
    }

    pub fn config(&self) -> &WeaveConfig {
        &self.config
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// Weaves the encoded unit `unit_name`, returning `None` when nothing applies to it.
    pub fn transform(&self, unit_name: &str, bytes: &[u8]) -> Result<Option<Vec<u8>>> {
        if !self.registry.has_handlers(unit_name) {
            return Ok(None);
        }
        let mut unit = self.codec.decode(bytes)?;
        if unit.name != unit_name {
            return Err(Error::Configuration(format!(
                "asked for {unit_name} but the bytes define {}",
                unit.name
            )));
        }
        let report = self.weave_unit(&mut unit)?;
        if !report.is_modified() {
            return Ok(None);
        }
        Ok(Some(self.codec.encode(&unit)?))
    }

    /// Applies every registered handler unit to `unit` in place.
    pub fn weave_unit(&self, unit: &mut CompiledUnit) -> Result<WeaveReport> {
        let mut report = WeaveReport {
            unit: unit.name.clone(),
            ..WeaveReport::default()
        };
        let handler_units = self.registry.handlers_for(&unit.name);
        if handler_units.is_empty() {
            return Ok(report);
        }

        self.hierarchy.register(unit);
        for handler_unit in &handler_units {
            self.hierarchy.register(&handler_unit.unit);
        }
        let ctx = WeaveContext {
            config: &self.config,
            hierarchy: &self.hierarchy,
        };

        for handler_unit in &handler_units {
            self.apply_unit(unit, handler_unit, &ctx, &mut report)?;
        }

        if report.is_modified()
            && self.config.remap
            && let Some(remapper) = &self.remapper
        {
            remap_unit(unit, remapper.as_ref());
            debug!("remapped {} to {}", report.unit, unit.name);
        }
        info!(
            "{}: {} handler(s) applied, {} failed, {} site(s)",
            report.unit,
            report.applied.len(),
            report.failed.len(),
            report.sites
        );
        Ok(report)
    }

    fn apply_unit(
        &self,
        unit: &mut CompiledUnit,
        handler_unit: &HandlerUnit,
        ctx: &WeaveContext<'_>,
        report: &mut WeaveReport,
    ) -> Result<()> {
        let mut snapshot = unit.clone();
        let mut applied = Vec::new();
        let mut sites = 0;

        for handler in &handler_unit.handlers {
            let pass = HandlerSplice::new(handler);
            let mut attempt = snapshot.clone();
            match pass.apply(&mut attempt, ctx) {
                Ok(spliced) => {
                    info!("{:>14} {} site(s) in {}", handler.kind, spliced, unit.name);
                    snapshot = attempt;
                    sites += spliced;
                    applied.push(pass.name().to_string());
                }
                Err(e) => self.isolate(report, pass.name(), e)?,
            }
        }
        if applied.is_empty() && !handler_unit.handlers.is_empty() {
            return Ok(());
        }

        let merge = MemberMerge::new(handler_unit);
        match merge.apply(&mut snapshot, ctx) {
            Ok(merged) => {
                *unit = snapshot;
                report.applied.extend(applied);
                report.sites += sites;
                report.merged += merged;
                Ok(())
            }
            Err(e) => self.isolate(report, merge.name(), e),
        }
    }

    fn isolate(&self, report: &mut WeaveReport, name: &str, e: Error) -> Result<()> {
        if !self.config.best_effort {
            error!("{name} failed on {}: {e}", report.unit);
            return Err(e);
        }
        warn!("{name} skipped on {}: {e}", report.unit);
        report.failed.push(HandlerFailure {
            handler: name.to_string(),
            error: e.to_string(),
        });
        Ok(())
    }
}
