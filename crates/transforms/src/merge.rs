//! Member and initializer merge.
//!
//! Once every handler of a handler unit has been spliced, the unit's own members move into
//! the target: fields, procedures other than initializers, and implemented interfaces. Any
//! reference to the handler unit's name inside copied code is rewritten to the target's name.
//!
//! Field initializers are lifted out of the handler unit's constructors as runs: the exact
//! nodes between the delegated super constructor call (or the start of the static
//! initializer) and each write of a handler-declared field. Runs for the same field must be
//! identical across constructors.

use crate::remap::{MappingTable, Remapper, remap_body, remap_instruction};
use crate::resolver::delegated_constructor_call;
use crate::slots::SlotAllocator;
use crate::{Error, Result};
use mixweave_core::insn::{FieldMode, Instruction, STATIC_INIT, Scope};
use mixweave_core::sequence::{InsnId, InstructionSequence, Node};
use mixweave_core::types::{MethodType, Type};
use mixweave_core::unit::{Annotation, CompiledUnit, MemberRole, Procedure};
use std::collections::HashSet;
use tracing::debug;

/// What a merge added to the target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeSummary {
    pub fields: usize,
    pub procedures: usize,
    pub interfaces: usize,
    pub initializers: usize,
}

impl MergeSummary {
    pub fn total(&self) -> usize {
        self.fields + self.procedures + self.interfaces + self.initializers
    }
}

/// Initializer runs in discovery order, keyed by field name.
type Runs = Vec<(String, Vec<Node>)>;

fn is_merge_marker(annotation: &Annotation) -> bool {
    matches!(
        annotation.name.as_str(),
        Annotation::SHADOW | Annotation::OVERWRITE | Annotation::UNIQUE
    )
}

/// Merges `source` into `target`. On error `target` is left untouched.
pub fn merge_members(target: &mut CompiledUnit, source: &CompiledUnit) -> Result<MergeSummary> {
    let rename = MappingTable::rename_type(source.name.clone(), target.name.clone());
    let instance_runs = initializer_runs(source, Scope::Instance)?;
    let static_runs = initializer_runs(source, Scope::Static)?;

    let mut merged = target.clone();
    let mut summary = MergeSummary::default();
    let conflict = |member: String| Error::MergeConflict {
        unit: target.name.clone(),
        source_unit: source.name.clone(),
        member,
    };
    let missing = |member: String| Error::ShadowNotFound {
        unit: target.name.clone(),
        source_unit: source.name.clone(),
        member,
    };

    for interface in &source.interfaces {
        let interface = rename.map_owner(interface);
        if interface != merged.name && !merged.interfaces.contains(&interface) {
            merged.interfaces.push(interface);
            summary.interfaces += 1;
        }
    }

    for field in &source.fields {
        let ty = rename.map_type(&field.ty);
        let member = format!("{}:{}", field.name, ty);
        let existing = merged.field(&field.name);
        match field.role() {
            MemberRole::Shadow | MemberRole::Overwrite => {
                if existing.is_none_or(|f| f.ty != ty || f.is_static != field.is_static) {
                    return Err(missing(member));
                }
            }
            MemberRole::Added => {
                if existing.is_some() {
                    return Err(conflict(member));
                }
                let mut copy = field.clone();
                copy.ty = ty;
                copy.annotations.retain(|a| !is_merge_marker(a));
                merged.fields.push(copy);
                summary.fields += 1;
            }
        }
    }

    for procedure in &source.procedures {
        if procedure.is_constructor() || procedure.is_static_initializer() {
            continue;
        }
        let desc = rename.map_method_type(&procedure.desc);
        let member = format!("{}{}", procedure.name, desc);
        match (procedure.role(), merged.procedure_index(&procedure.name, &desc)) {
            (MemberRole::Shadow, Some(_)) => {}
            (MemberRole::Shadow | MemberRole::Overwrite, None) => return Err(missing(member)),
            (MemberRole::Overwrite, Some(index)) => {
                merged.procedures[index] = adapt(procedure, &merged.name, &rename);
                summary.procedures += 1;
            }
            (MemberRole::Added, Some(_)) => return Err(conflict(member)),
            (MemberRole::Added, None) => {
                merged.procedures.push(adapt(procedure, &merged.name, &rename));
                summary.procedures += 1;
            }
        }
    }

    if !instance_runs.is_empty() {
        let own_name = merged.name.clone();
        for procedure in merged.procedures.iter_mut().filter(|p| p.is_constructor()) {
            let anchor = match delegated_constructor_call(&procedure.body) {
                Some(call) if delegates_to(&procedure.body, call, &own_name) => continue,
                found => found,
            };
            splice_runs(procedure, anchor, &instance_runs, &rename)?;
        }
        summary.initializers += instance_runs.len();
    }

    if !static_runs.is_empty() {
        let init_desc = MethodType::new(Vec::new(), Type::Void);
        let index = match merged.procedure_index(STATIC_INIT, &init_desc) {
            Some(index) => index,
            None => {
                merged.procedures.push(Procedure::new(
                    merged.name.clone(),
                    STATIC_INIT,
                    init_desc,
                    true,
                    InstructionSequence::from_instructions([Instruction::Return(Type::Void)]),
                ));
                merged.procedures.len() - 1
            }
        };
        splice_runs(&mut merged.procedures[index], None, &static_runs, &rename)?;
        summary.initializers += static_runs.len();
    }

    debug!(
        "merged {} into {}: {} field(s), {} procedure(s), {} interface(s), {} initializer(s)",
        source.name,
        target.name,
        summary.fields,
        summary.procedures,
        summary.interfaces,
        summary.initializers
    );
    *target = merged;
    Ok(summary)
}

/// Copy of a handler-unit procedure as declared by `owner`.
fn adapt(procedure: &Procedure, owner: &str, rename: &MappingTable) -> Procedure {
    let mut copy = procedure.clone();
    copy.owner = owner.to_string();
    copy.desc = rename.map_method_type(&procedure.desc);
    remap_body(&mut copy.body, rename);
    for local in copy.locals.iter_mut().flatten() {
        local.ty = rename.map_type(&local.ty);
    }
    copy.annotations.retain(|a| !is_merge_marker(a));
    copy
}

fn delegates_to(body: &InstructionSequence, call: InsnId, owner: &str) -> bool {
    matches!(body.instruction(call), Some(Instruction::Invoke { method, .. }) if method.owner == owner)
}

/// Collects the initializer run of every handler-declared field of `scope`.
fn initializer_runs(source: &CompiledUnit, scope: Scope) -> Result<Runs> {
    let is_static = scope == Scope::Static;
    let fields: HashSet<&str> = source
        .fields
        .iter()
        .filter(|f| f.role() == MemberRole::Added && f.is_static == is_static)
        .map(|f| f.name.as_str())
        .collect();
    let mut runs: Runs = Vec::new();
    if fields.is_empty() {
        return Ok(runs);
    }

    for procedure in &source.procedures {
        let body = &procedure.body;
        let mut cursor = match scope {
            Scope::Static if procedure.is_static_initializer() => body.first(),
            Scope::Instance if procedure.is_constructor() => {
                match delegated_constructor_call(body) {
                    // `this(...)` leaves field initialization to the constructor it calls.
                    Some(call) if delegates_to(body, call, &source.name) => continue,
                    Some(call) => body.next(call),
                    None => continue,
                }
            }
            _ => continue,
        };

        let mut run = Vec::new();
        while let Some(id) = cursor {
            cursor = body.next(id);
            let Some(node) = body.get(id) else { break };
            if let Node::Insn(insn) = node
                && (insn.is_return() || *insn == Instruction::Throw)
            {
                break;
            }
            run.push(node.clone());
            let Node::Insn(Instruction::Field {
                mode: FieldMode::Put,
                scope: written,
                field,
            }) = node
            else {
                continue;
            };
            if *written != scope || field.owner != source.name || !fields.contains(field.name.as_str()) {
                continue;
            }
            let complete = std::mem::take(&mut run);
            match runs.iter().find(|(name, _)| *name == field.name) {
                Some((_, existing)) if *existing != complete => {
                    return Err(Error::MergeDivergence {
                        unit: source.name.clone(),
                        field: field.name.clone(),
                    });
                }
                Some(_) => {}
                None => runs.push((field.name.clone(), complete)),
            }
        }
    }
    Ok(runs)
}

/// Places every run after `anchor`, or at the start of the body without one.
fn splice_runs(
    procedure: &mut Procedure,
    anchor: Option<InsnId>,
    runs: &Runs,
    rename: &MappingTable,
) -> Result<()> {
    let mut nodes = Vec::new();
    for (_, run) in runs {
        let renamed: Vec<Node> = run
            .iter()
            .map(|node| match node {
                Node::Insn(insn) => Node::Insn(remap_instruction(insn, rename)),
                label => label.clone(),
            })
            .collect();
        nodes.extend(procedure.body.adopt(&renamed));
    }

    match (anchor, procedure.body.first()) {
        (Some(anchor), _) => {
            procedure.body.insert_all_after(anchor, nodes)?;
        }
        (None, Some(first)) => {
            procedure.body.insert_all_before(first, nodes)?;
        }
        (None, None) => {
            for node in nodes {
                procedure.body.push_back(node);
            }
        }
    }
    procedure.max_locals = SlotAllocator::for_procedure(procedure).high_water();
    Ok(())
}
