//! Target unit name to handler units.

use crate::Result;
use crate::handler::HandlerUnit;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Read-mostly lookup of the handler units that apply to a target unit.
///
/// Registration order is preserved per target; it is also the order handler units are applied.
#[derive(Debug, Default)]
pub struct HandlerRegistry {
    by_target: RwLock<HashMap<String, Vec<Arc<HandlerUnit>>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates `unit` and files it under each of its targets.
    pub fn register(&self, unit: HandlerUnit) -> Result<Arc<HandlerUnit>> {
        unit.validate()?;
        let unit = Arc::new(unit);
        let mut by_target = self.by_target.write();
        for target in &unit.targets {
            let entries = by_target.entry(target.clone()).or_default();
            if !entries.iter().any(|known| known.name() == unit.name()) {
                entries.push(Arc::clone(&unit));
            }
        }
        debug!(
            "registered {} with {} handler(s) for {:?}",
            unit.name(),
            unit.handlers.len(),
            unit.targets
        );
        Ok(unit)
    }

    pub fn handlers_for(&self, target: &str) -> Vec<Arc<HandlerUnit>> {
        self.by_target.read().get(target).cloned().unwrap_or_default()
    }

    pub fn has_handlers(&self, target: &str) -> bool {
        self.by_target
            .read()
            .get(target)
            .is_some_and(|units| !units.is_empty())
    }

    /// Names of all target units with at least one handler unit.
    pub fn targets(&self) -> Vec<String> {
        let mut names: Vec<String> = self.by_target.read().keys().cloned().collect();
        names.sort();
        names
    }
}
