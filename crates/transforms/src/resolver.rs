//! Target resolution.
//!
//! Resolution is a filter over a window of the body: [`resolve_slice`] narrows the body to the
//! inclusive range between two uniquely resolving bounds, and [`resolve_targets`] keeps the
//! instructions of that window the descriptor's kind and matcher select. Labels never match.
//!
//! ```text
//!     ALOAD 0
//!     INVOKESPECIAL java/lang/Object.<init>()V
//!     ICONST_1             <- HEAD (constructor)
//!     IFEQ done
//!     ICONST_2
//!     IRETURN              <- RETURN@0
//! done:
//!     ICONST_3
//!     IRETURN              <- RETURN@1, TAIL
//! ```
//!
//! Not finding anything is not an error here; callers decide how many sites they need.

use crate::target::{Matcher, SliceSpec, TargetDescriptor, TargetKind};
use crate::{Error, Result, SliceBound, SliceFailure};
use mixweave_core::insn::{FieldMode, Instruction};
use mixweave_core::sequence::{InsnId, InstructionSequence};
use mixweave_core::unit::Procedure;
use tracing::debug;

/// Inclusive, ordered range of nodes a descriptor is matched against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstructionWindow {
    ids: Vec<InsnId>,
}

impl InstructionWindow {
    /// Every node of `body`.
    pub fn whole(body: &InstructionSequence) -> Self {
        Self { ids: body.ids() }
    }

    pub fn ids(&self) -> &[InsnId] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains(&self, id: InsnId) -> bool {
        self.ids.contains(&id)
    }

    fn instructions<'a>(
        &'a self,
        body: &'a InstructionSequence,
    ) -> impl DoubleEndedIterator<Item = (InsnId, &'a Instruction)> + 'a {
        self.ids
            .iter()
            .filter_map(|id| body.instruction(*id).map(|insn| (*id, insn)))
    }
}

/// Narrows the body of `procedure` to the window described by `slice`.
///
/// Each bound is resolved against the whole body with every match kept; anything other than
/// exactly one match fails. Bounds ignore their shift.
pub fn resolve_slice(
    procedure: &Procedure,
    slice: Option<&SliceSpec>,
) -> Result<InstructionWindow> {
    let body = &procedure.body;
    let whole = InstructionWindow::whole(body);
    let Some(slice) = slice.filter(|s| !s.is_unbounded()) else {
        return Ok(whole);
    };

    let bound = |which: SliceBound, target: &TargetDescriptor| -> Result<usize> {
        let all = target.clone().with_ordinal(-1);
        let found = resolve_targets(procedure, &whole, &all)?;
        let fail = |reason| Error::SliceResolution {
            bound: which,
            reason,
            matcher: target.to_string(),
        };
        match found.as_slice() {
            [] => Err(fail(SliceFailure::NotFound)),
            [single] => whole
                .ids
                .iter()
                .position(|id| id == single)
                .ok_or_else(|| fail(SliceFailure::NotFound)),
            many => Err(fail(SliceFailure::Ambiguous(many.len()))),
        }
    };

    let start = match &slice.from {
        Some(from) => bound(SliceBound::From, from)?,
        None => 0,
    };
    let end = match &slice.to {
        Some(to) => bound(SliceBound::To, to)?,
        None => whole.len().saturating_sub(1),
    };
    if start > end {
        let matcher = slice
            .from
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default();
        return Err(Error::SliceResolution {
            bound: SliceBound::From,
            reason: SliceFailure::Inverted,
            matcher,
        });
    }

    debug!("Slice of {} spans nodes {}..={}", procedure, start, end);
    Ok(InstructionWindow {
        ids: whole.ids[start..=end].to_vec(),
    })
}

/// Instructions of `window` selected by `target`, in body order.
///
/// An ordinal of `-1` keeps every match; otherwise only the match at that index is kept, and
/// an out-of-range ordinal yields nothing.
pub fn resolve_targets(
    procedure: &Procedure,
    window: &InstructionWindow,
    target: &TargetDescriptor,
) -> Result<Vec<InsnId>> {
    let body = &procedure.body;
    let matcher = target.matcher()?;

    let mut found: Vec<InsnId> = match target.kind {
        TargetKind::Head => head(procedure, window).into_iter().collect(),
        TargetKind::Tail => window
            .instructions(body)
            .rev()
            .find(|(_, insn)| insn.is_return())
            .map(|(id, _)| id)
            .into_iter()
            .collect(),
        TargetKind::Return => filter(window, body, |_, insn| insn.is_return()),
        TargetKind::Throw => filter(window, body, |_, insn| {
            matches!(insn, Instruction::Throw)
        }),
        TargetKind::Invoke => filter(window, body, |_, insn| match (insn, &matcher) {
            (Instruction::Invoke { method, .. }, Matcher::Member(decl)) => {
                decl.matches_method(method)
            }
            _ => false,
        }),
        TargetKind::Field | TargetKind::GetField | TargetKind::PutField => {
            let wanted = match target.kind {
                TargetKind::GetField => Some(FieldMode::Get),
                TargetKind::PutField => Some(FieldMode::Put),
                _ => None,
            };
            filter(window, body, |_, insn| match (insn, &matcher) {
                (Instruction::Field { mode, field, .. }, Matcher::Member(decl)) => {
                    wanted.is_none_or(|m| m == *mode) && decl.matches_field(field)
                }
                _ => false,
            })
        }
        TargetKind::New => filter(window, body, |id, insn| match (insn, &matcher) {
            (Instruction::Allocate { ty }, Matcher::Allocation { ty: wanted, init }) => {
                ty == wanted
                    && init.as_ref().is_none_or(|desc| {
                        paired_constructor(body, id)
                            .and_then(|call| body.instruction(call))
                            .is_some_and(|call| match call {
                                Instruction::Invoke { method, .. } => method.desc == *desc,
                                _ => false,
                            })
                    })
            }
            _ => false,
        }),
        TargetKind::Opcode => filter(window, body, |_, insn| match &matcher {
            Matcher::Opcode(op) => insn.opcode() == *op,
            _ => false,
        }),
        TargetKind::Constant => filter(window, body, |_, insn| match (insn, &matcher) {
            (Instruction::Push(constant), Matcher::Constant(literal)) => {
                constant.literal == *literal
            }
            _ => false,
        }),
    };

    if target.ordinal >= 0 {
        let nth = found.get(target.ordinal as usize).copied();
        found = nth.into_iter().collect();
    }
    debug!(
        "Resolved {} in {}: {} site(s)",
        target,
        procedure,
        found.len()
    );
    Ok(found)
}

/// Resolves `target` against the whole body.
pub fn resolve_all(procedure: &Procedure, target: &TargetDescriptor) -> Result<Vec<InsnId>> {
    resolve_targets(procedure, &InstructionWindow::whole(&procedure.body), target)
}

fn filter(
    window: &InstructionWindow,
    body: &InstructionSequence,
    mut predicate: impl FnMut(InsnId, &Instruction) -> bool,
) -> Vec<InsnId> {
    window
        .instructions(body)
        .filter(|(id, insn)| predicate(*id, *insn))
        .map(|(id, _)| id)
        .collect()
}

fn head(procedure: &Procedure, window: &InstructionWindow) -> Option<InsnId> {
    let body = &procedure.body;
    let mut sites = window.instructions(body).map(|(id, _)| id);
    if !procedure.is_constructor() {
        return sites.next();
    }
    let Some(delegate) = delegated_constructor_call(body) else {
        return sites.next();
    };
    if window.contains(delegate) {
        return sites.skip_while(|id| *id != delegate).nth(1);
    }
    // The window lies wholly before or wholly after the delegated call.
    let start = body.index_of(*window.ids().first()?)?;
    let after = body.index_of(delegate)?;
    if start > after { sites.next() } else { None }
}

/// The constructor call a constructor body delegates to: the first `INVOKESPECIAL <init>`
/// that does not initialise an object allocated earlier in the same body.
pub fn delegated_constructor_call(body: &InstructionSequence) -> Option<InsnId> {
    let mut pending = 0usize;
    for (id, insn) in body.instructions() {
        match insn {
            Instruction::Allocate { .. } => pending += 1,
            insn if insn.is_constructor_call() => {
                if pending == 0 {
                    return Some(id);
                }
                pending -= 1;
            }
            _ => {}
        }
    }
    None
}

/// The `INVOKESPECIAL <init>` that initialises the object allocated at `allocation`.
pub fn paired_constructor(body: &InstructionSequence, allocation: InsnId) -> Option<InsnId> {
    let mut nested = 0usize;
    let mut cursor = body.next(allocation);
    while let Some(id) = cursor {
        match body.instruction(id) {
            Some(Instruction::Allocate { .. }) => nested += 1,
            Some(insn) if insn.is_constructor_call() => {
                if nested == 0 {
                    return Some(id);
                }
                nested -= 1;
            }
            _ => {}
        }
        cursor = body.next(id);
    }
    None
}
