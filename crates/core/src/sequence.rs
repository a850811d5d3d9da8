//! Mutable instruction sequences.
//!
//! A sequence is an arena of nodes threaded into a doubly linked list. Nodes are addressed by
//! [`InsnId`], which stays valid while other nodes are inserted or removed around it, so a set
//! of locations resolved up front can be spliced one after another without re-resolving.
//!
//! ```text
//! entries: [ n0 | n1 | n2 (dead) | n3 ]     order: n0 -> n3 -> n1
//! ```
//!
//! Removing a node only unlinks it; its slot is never reused, so a stale id is reported as
//! [`Error::UnknownNode`] instead of silently addressing a different node.

use crate::insn::{Instruction, Label};
use crate::result::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Stable handle to a node in one [`InstructionSequence`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InsnId(u32);

impl InsnId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// One element of a sequence: an instruction or a placed label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Node {
    Insn(Instruction),
    Label(Label),
}

impl Node {
    pub fn as_insn(&self) -> Option<&Instruction> {
        match self {
            Node::Insn(insn) => Some(insn),
            Node::Label(_) => None,
        }
    }
}

impl From<Instruction> for Node {
    fn from(insn: Instruction) -> Self {
        Node::Insn(insn)
    }
}

#[derive(Debug, Clone)]
struct Entry {
    node: Node,
    prev: Option<InsnId>,
    next: Option<InsnId>,
    live: bool,
}

/// Ordered, mutable body of a procedure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "Vec<Node>", into = "Vec<Node>")]
pub struct InstructionSequence {
    entries: Vec<Entry>,
    head: Option<InsnId>,
    tail: Option<InsnId>,
    len: usize,
    next_label: u32,
}

impl InstructionSequence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a sequence from nodes in order.
    pub fn from_nodes(nodes: impl IntoIterator<Item = Node>) -> Self {
        let mut seq = Self::new();
        for node in nodes {
            seq.push_back(node);
        }
        seq
    }

    /// Builds a label-free sequence from instructions in order.
    pub fn from_instructions(insns: impl IntoIterator<Item = Instruction>) -> Self {
        Self::from_nodes(insns.into_iter().map(Node::Insn))
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn first(&self) -> Option<InsnId> {
        self.head
    }

    pub fn last(&self) -> Option<InsnId> {
        self.tail
    }

    fn entry(&self, id: InsnId) -> Result<&Entry> {
        self.entries
            .get(id.index())
            .filter(|entry| entry.live)
            .ok_or(Error::UnknownNode(id.0))
    }

    pub fn contains(&self, id: InsnId) -> bool {
        self.entry(id).is_ok()
    }

    pub fn get(&self, id: InsnId) -> Option<&Node> {
        self.entry(id).ok().map(|entry| &entry.node)
    }

    /// Instruction at `id`, or `None` for labels and dead ids.
    pub fn instruction(&self, id: InsnId) -> Option<&Instruction> {
        self.get(id).and_then(Node::as_insn)
    }

    pub fn next(&self, id: InsnId) -> Option<InsnId> {
        self.entry(id).ok().and_then(|entry| entry.next)
    }

    pub fn prev(&self, id: InsnId) -> Option<InsnId> {
        self.entry(id).ok().and_then(|entry| entry.prev)
    }

    /// Ids of all nodes in order.
    pub fn ids(&self) -> Vec<InsnId> {
        self.iter().map(|(id, _)| id).collect()
    }

    /// Nodes in order with their ids.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            seq: self,
            cursor: self.head,
        }
    }

    /// Instructions in order with their ids, skipping labels.
    pub fn instructions(&self) -> impl Iterator<Item = (InsnId, &Instruction)> {
        self.iter()
            .filter_map(|(id, node)| node.as_insn().map(|insn| (id, insn)))
    }

    /// Position of `id` in the current order.
    pub fn index_of(&self, id: InsnId) -> Option<usize> {
        self.iter().position(|(candidate, _)| candidate == id)
    }

    fn alloc(&mut self, node: Node) -> InsnId {
        if let Node::Label(Label(n)) = &node {
            self.next_label = self.next_label.max(n + 1);
        }
        let id = InsnId(self.entries.len() as u32);
        self.entries.push(Entry {
            node,
            prev: None,
            next: None,
            live: true,
        });
        id
    }

    pub fn push_back(&mut self, node: impl Into<Node>) -> InsnId {
        let id = self.alloc(node.into());
        match self.tail {
            Some(tail) => {
                self.entries[tail.index()].next = Some(id);
                self.entries[id.index()].prev = Some(tail);
            }
            None => self.head = Some(id),
        }
        self.tail = Some(id);
        self.len += 1;
        id
    }

    pub fn push_front(&mut self, node: impl Into<Node>) -> InsnId {
        match self.head {
            Some(head) => self.link_before(head, node.into()),
            None => self.push_back(node),
        }
    }

    fn link_before(&mut self, anchor: InsnId, node: Node) -> InsnId {
        let prev = self.entries[anchor.index()].prev;
        let id = self.alloc(node);
        self.entries[id.index()].prev = prev;
        self.entries[id.index()].next = Some(anchor);
        self.entries[anchor.index()].prev = Some(id);
        match prev {
            Some(prev) => self.entries[prev.index()].next = Some(id),
            None => self.head = Some(id),
        }
        self.len += 1;
        id
    }

    fn link_after(&mut self, anchor: InsnId, node: Node) -> InsnId {
        let next = self.entries[anchor.index()].next;
        let id = self.alloc(node);
        self.entries[id.index()].prev = Some(anchor);
        self.entries[id.index()].next = next;
        self.entries[anchor.index()].next = Some(id);
        match next {
            Some(next) => self.entries[next.index()].prev = Some(id),
            None => self.tail = Some(id),
        }
        self.len += 1;
        id
    }

    pub fn insert_before(&mut self, anchor: InsnId, node: impl Into<Node>) -> Result<InsnId> {
        self.entry(anchor)?;
        Ok(self.link_before(anchor, node.into()))
    }

    pub fn insert_after(&mut self, anchor: InsnId, node: impl Into<Node>) -> Result<InsnId> {
        self.entry(anchor)?;
        Ok(self.link_after(anchor, node.into()))
    }

    /// Inserts `nodes` in order directly before `anchor`.
    pub fn insert_all_before(
        &mut self,
        anchor: InsnId,
        nodes: impl IntoIterator<Item = Node>,
    ) -> Result<Vec<InsnId>> {
        self.entry(anchor)?;
        Ok(nodes
            .into_iter()
            .map(|node| self.link_before(anchor, node))
            .collect())
    }

    /// Inserts `nodes` in order directly after `anchor`.
    pub fn insert_all_after(
        &mut self,
        anchor: InsnId,
        nodes: impl IntoIterator<Item = Node>,
    ) -> Result<Vec<InsnId>> {
        self.entry(anchor)?;
        let mut cursor = anchor;
        let mut ids = Vec::new();
        for node in nodes {
            cursor = self.link_after(cursor, node);
            ids.push(cursor);
        }
        Ok(ids)
    }

    /// Unlinks `id`, returning its node.
    pub fn remove(&mut self, id: InsnId) -> Result<Node> {
        self.entry(id)?;
        let (prev, next) = {
            let entry = &mut self.entries[id.index()];
            entry.live = false;
            (entry.prev.take(), entry.next.take())
        };
        match prev {
            Some(prev) => self.entries[prev.index()].next = next,
            None => self.head = next,
        }
        match next {
            Some(next) => self.entries[next.index()].prev = prev,
            None => self.tail = prev,
        }
        self.len -= 1;
        Ok(std::mem::replace(
            &mut self.entries[id.index()].node,
            Node::Label(Label(u32::MAX)),
        ))
    }

    /// Swaps the node at `id` for `node` in place, keeping the id.
    pub fn replace(&mut self, id: InsnId, node: impl Into<Node>) -> Result<Node> {
        self.entry(id)?;
        let node = node.into();
        if let Node::Label(Label(n)) = &node {
            self.next_label = self.next_label.max(n + 1);
        }
        Ok(std::mem::replace(&mut self.entries[id.index()].node, node))
    }

    /// Allocates a label not used anywhere in this sequence. It still has to be placed.
    pub fn new_label(&mut self) -> Label {
        let label = Label(self.next_label);
        self.next_label += 1;
        label
    }

    /// Node at which `label` is placed.
    pub fn label_position(&self, label: Label) -> Option<InsnId> {
        self.iter()
            .find(|(_, node)| matches!(node, Node::Label(placed) if *placed == label))
            .map(|(id, _)| id)
    }

    /// Checks that every referenced label is placed exactly once.
    pub fn validate_labels(&self) -> Result<()> {
        let mut placed = HashSet::new();
        for (_, node) in self.iter() {
            if let Node::Label(label) = node
                && !placed.insert(*label)
            {
                return Err(Error::DuplicateLabel(label.0));
            }
        }
        for (_, insn) in self.instructions() {
            if let Some(missing) = insn.label_refs().into_iter().find(|l| !placed.contains(l)) {
                return Err(Error::DanglingLabel(missing.0));
            }
        }
        Ok(())
    }

    /// Gives every label placed inside `nodes` a fresh label of this sequence so the run can be
    /// spliced here without colliding with existing labels.
    pub fn adopt(&mut self, nodes: &[Node]) -> Vec<Node> {
        let mut fresh: HashMap<Label, Label> = HashMap::new();
        for node in nodes {
            if let Node::Label(label) = node {
                let renamed = self.new_label();
                fresh.insert(*label, renamed);
            }
        }
        nodes
            .iter()
            .map(|node| match node {
                Node::Label(label) => Node::Label(fresh[label]),
                Node::Insn(insn) => {
                    let mut insn = insn.clone();
                    insn.map_labels(|l| fresh.get(&l).copied().unwrap_or(l));
                    Node::Insn(insn)
                }
            })
            .collect()
    }

    /// Owned copy of all nodes in order.
    pub fn to_nodes(&self) -> Vec<Node> {
        self.iter().map(|(_, node)| node.clone()).collect()
    }
}

impl PartialEq for InstructionSequence {
    fn eq(&self, other: &Self) -> bool {
        self.len == other.len && self.iter().map(|(_, n)| n).eq(other.iter().map(|(_, n)| n))
    }
}

impl From<Vec<Node>> for InstructionSequence {
    fn from(nodes: Vec<Node>) -> Self {
        Self::from_nodes(nodes)
    }
}

impl From<InstructionSequence> for Vec<Node> {
    fn from(seq: InstructionSequence) -> Self {
        seq.to_nodes()
    }
}

/// In-order iterator over a sequence.
pub struct Iter<'a> {
    seq: &'a InstructionSequence,
    cursor: Option<InsnId>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = (InsnId, &'a Node);

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.cursor?;
        let entry = &self.seq.entries[id.index()];
        self.cursor = entry.next;
        Some((id, &entry.node))
    }
}
