//! Boundary between encoded units and the in-memory model.

use crate::result::{Error, Result};
use crate::unit::CompiledUnit;
use std::path::Path;

/// Turns encoded units into [`CompiledUnit`] graphs and back.
pub trait UnitCodec: Send + Sync {
    fn decode(&self, bytes: &[u8]) -> Result<CompiledUnit>;
    fn encode(&self, unit: &CompiledUnit) -> Result<Vec<u8>>;
}

/// Units encoded as JSON documents of the model types.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonCodec {
    pub pretty: bool,
}

impl UnitCodec for JsonCodec {
    fn decode(&self, bytes: &[u8]) -> Result<CompiledUnit> {
        let unit: CompiledUnit = serde_json::from_slice(bytes)?;
        for procedure in &unit.procedures {
            procedure.body.validate_labels()?;
        }
        tracing::debug!(
            "Decoded unit {} ({} fields, {} procedures)",
            unit.name,
            unit.fields.len(),
            unit.procedures.len()
        );
        Ok(unit)
    }

    fn encode(&self, unit: &CompiledUnit) -> Result<Vec<u8>> {
        let bytes = if self.pretty {
            serde_json::to_vec_pretty(unit)?
        } else {
            serde_json::to_vec(unit)?
        };
        Ok(bytes)
    }
}

/// Reads and decodes a unit file.
pub fn read_unit(path: &Path, codec: &dyn UnitCodec) -> Result<CompiledUnit> {
    let bytes = std::fs::read(path).map_err(|source| Error::FileRead {
        path: path.display().to_string(),
        source,
    })?;
    codec.decode(&bytes)
}
