pub mod generators;
pub mod handler;
pub mod hierarchy;
pub mod manifest;
pub mod merge;
pub mod registry;
pub mod remap;
pub mod resolver;
pub mod signature;
pub mod slots;
pub mod target;
pub mod weaver;

use mixweave_core::unit::CompiledUnit;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::hierarchy::ClassHierarchy;

/// Which end of a slice failed to resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SliceBound {
    From,
    To,
}

impl fmt::Display for SliceBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SliceBound::From => f.write_str("from"),
            SliceBound::To => f.write_str("to"),
        }
    }
}

/// Why a slice bound did not pin down a single instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SliceFailure {
    NotFound,
    Ambiguous(usize),
    /// `from` resolved after `to`.
    Inverted,
}

impl fmt::Display for SliceFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SliceFailure::NotFound => f.write_str("no match"),
            SliceFailure::Ambiguous(n) => write!(f, "{n} matches"),
            SliceFailure::Inverted => f.write_str("bound lies beyond the other bound"),
        }
    }
}

/// Transform error type encompassing all weaving errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Instruction model operation failed.
    #[error(transparent)]
    Core(#[from] mixweave_core::Error),

    /// A handler's target resolved to fewer sites than it requires.
    #[error("handler {handler}: target `{target}` found {found} site(s), {required} required")]
    TargetNotFound {
        handler: String,
        target: String,
        found: usize,
        required: usize,
    },

    /// A handler's target resolved to more sites than it allows.
    #[error("handler {handler}: target `{target}` found {found} site(s), at most {allowed} allowed")]
    AmbiguousTarget {
        handler: String,
        target: String,
        found: usize,
        allowed: usize,
    },

    /// A slice bound did not resolve to exactly one instruction.
    #[error("slice `{bound}` bound `{matcher}` failed: {reason}")]
    SliceResolution {
        bound: SliceBound,
        reason: SliceFailure,
        matcher: String,
    },

    /// The target kind, matcher or site cannot be used with the handler.
    #[error("handler {handler}: invalid target `{target}`: {reason}")]
    InvalidTarget {
        handler: String,
        target: String,
        reason: String,
    },

    /// The handler's descriptor does not satisfy the site's contract.
    #[error("handler {handler}: signature mismatch, expected {expected} but found {actual}")]
    SignatureMismatch {
        expected: String,
        actual: String,
        handler: String,
    },

    /// A copied member clashes with an existing one.
    #[error("cannot merge {member} from {source_unit} into {unit}: member already exists")]
    MergeConflict {
        unit: String,
        source_unit: String,
        member: String,
    },

    /// Constructors of the handler unit initialise a field differently.
    #[error("initializers for {unit}.{field} differ between constructors")]
    MergeDivergence { unit: String, field: String },

    /// A member marked as shadow (or overwrite) has no counterpart in the target.
    #[error("{member} of {source_unit} has no counterpart in {unit}")]
    ShadowNotFound {
        unit: String,
        source_unit: String,
        member: String,
    },

    /// Invalid handler or weaver configuration.
    #[error("configuration error: {0}")]
    Configuration(String),
}

/// Transform result type
pub type Result<T> = std::result::Result<T, Error>;

/// Shared state a transform may consult while rewriting a unit.
pub struct WeaveContext<'a> {
    pub config: &'a WeaveConfig,
    pub hierarchy: &'a ClassHierarchy,
}

/// A rewrite applied to one compiled unit.
pub trait Transform: Send + Sync {
    /// Returns the transform's name for logging and identification.
    fn name(&self) -> &str;
    /// Applies the transform to the unit, returning the number of sites rewritten.
    fn apply(&self, unit: &mut CompiledUnit, ctx: &WeaveContext<'_>) -> Result<usize>;
}

/// Configuration for weaving passes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeaveConfig {
    /// Carrier passed to handlers injected into void procedures.
    pub callback_type: String,
    /// Carrier passed to handlers injected into value-returning procedures.
    pub returnable_callback_type: String,
    /// Keep applying other handlers when one fails.
    pub best_effort: bool,
    /// Run the remapper over woven units.
    pub remap: bool,
}

impl Default for WeaveConfig {
    fn default() -> Self {
        Self {
            callback_type: "mixweave/runtime/CallbackInfo".into(),
            returnable_callback_type: "mixweave/runtime/ReturnableCallbackInfo".into(),
            best_effort: true,
            remap: true,
        }
    }
}
