//! Process-wide super-type graph.
//!
//! Nodes are internal type names, edges point from a type to its direct super type or to an
//! interface it implements. The graph fills up from units handed to the weaver and, for
//! anything else, from an optional [`UnitProvider`]. Entries are deterministic for a given
//! input, so concurrent populations of the same name may race; the last write wins.

use mixweave_core::types::{OBJECT, Type};
use mixweave_core::unit::CompiledUnit;
use parking_lot::RwLock;
use petgraph::Direction;
use petgraph::algo::has_path_connecting;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::debug;

/// Edge kind between a type and one of its super types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Relation {
    Extends,
    Implements,
}

/// What the hierarchy needs to know about a unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitHeader {
    pub name: String,
    pub super_name: Option<String>,
    pub interfaces: Vec<String>,
    pub is_interface: bool,
}

impl From<&CompiledUnit> for UnitHeader {
    fn from(unit: &CompiledUnit) -> Self {
        Self {
            name: unit.name.clone(),
            super_name: unit.super_name.clone(),
            interfaces: unit.interfaces.clone(),
            is_interface: unit.is_interface,
        }
    }
}

/// Source of headers for units the weaver has not seen.
pub trait UnitProvider: Send + Sync {
    fn lookup(&self, name: &str) -> Option<UnitHeader>;
}

#[derive(Default)]
struct Graph {
    graph: DiGraph<String, Relation>,
    nodes: HashMap<String, NodeIndex>,
    /// Names whose outgoing edges are complete.
    known: HashSet<String>,
    interfaces: HashSet<String>,
}

impl Graph {
    fn node(&mut self, name: &str) -> NodeIndex {
        if let Some(index) = self.nodes.get(name) {
            return *index;
        }
        let index = self.graph.add_node(name.to_string());
        self.nodes.insert(name.to_string(), index);
        index
    }

    fn insert(&mut self, header: &UnitHeader) {
        let node = self.node(&header.name);
        let mut stale: Vec<_> = self.graph.edges(node).map(|edge| edge.id()).collect();
        stale.sort();
        for edge in stale.into_iter().rev() {
            self.graph.remove_edge(edge);
        }
        if let Some(parent) = &header.super_name {
            let parent = self.node(parent);
            self.graph.add_edge(node, parent, Relation::Extends);
        }
        for interface in &header.interfaces {
            let interface = self.node(interface);
            self.graph.add_edge(node, interface, Relation::Implements);
        }
        if header.is_interface {
            self.interfaces.insert(header.name.clone());
        }
        self.known.insert(header.name.clone());
    }

    fn supers(&self, name: &str) -> Vec<(String, Relation)> {
        let Some(index) = self.nodes.get(name) else {
            return Vec::new();
        };
        self.graph
            .edges_directed(*index, Direction::Outgoing)
            .map(|edge| (self.graph[edge.target()].clone(), *edge.weight()))
            .collect()
    }
}

/// Shared, lazily populated view of the type hierarchy.
#[derive(Default)]
pub struct ClassHierarchy {
    inner: RwLock<Graph>,
    provider: Option<Box<dyn UnitProvider>>,
}

impl ClassHierarchy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_provider(provider: Box<dyn UnitProvider>) -> Self {
        Self {
            inner: RwLock::new(Graph::default()),
            provider: Some(provider),
        }
    }

    pub fn register(&self, unit: &CompiledUnit) {
        self.register_header(&UnitHeader::from(unit));
    }

    pub fn register_header(&self, header: &UnitHeader) {
        self.inner.write().insert(header);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.read().known.contains(name)
    }

    /// Number of units with known super types.
    pub fn len(&self) -> usize {
        self.inner.read().known.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn ensure(&self, name: &str) {
        if self.contains(name) {
            return;
        }
        if let Some(header) = self.provider.as_ref().and_then(|p| p.lookup(name)) {
            debug!("Loaded hierarchy entry for {}", name);
            self.register_header(&header);
        }
    }

    /// Loads `name` and all of its ancestors the provider knows about.
    fn ensure_ancestors(&self, name: &str) {
        let mut queue = VecDeque::from([name.to_string()]);
        let mut seen = HashSet::new();
        while let Some(current) = queue.pop_front() {
            if !seen.insert(current.clone()) {
                continue;
            }
            self.ensure(&current);
            let supers = self.inner.read().supers(&current);
            queue.extend(supers.into_iter().map(|(name, _)| name));
        }
    }

    pub fn super_name(&self, name: &str) -> Option<String> {
        self.ensure(name);
        self.inner
            .read()
            .supers(name)
            .into_iter()
            .find(|(_, relation)| *relation == Relation::Extends)
            .map(|(name, _)| name)
    }

    pub fn is_interface(&self, name: &str) -> bool {
        self.ensure(name);
        self.inner.read().interfaces.contains(name)
    }

    /// True when `sub` is `sup` or inherits from it.
    pub fn is_subtype(&self, sub: &str, sup: &str) -> bool {
        if sub == sup || sup == OBJECT {
            return true;
        }
        self.ensure_ancestors(sub);
        let graph = self.inner.read();
        match (graph.nodes.get(sub), graph.nodes.get(sup)) {
            (Some(a), Some(b)) => has_path_connecting(&graph.graph, *a, *b, None),
            _ => false,
        }
    }

    /// True when a value of static type `from` may be used where `to` is expected.
    pub fn is_assignable(&self, from: &Type, to: &Type) -> bool {
        match (from, to) {
            _ if from == to => true,
            (Type::Object(_) | Type::Array(_), Type::Object(name)) if name == OBJECT => true,
            (Type::Object(sub), Type::Object(sup)) => self.is_subtype(sub, sup),
            (Type::Array(a), Type::Array(b)) if a.is_reference() && b.is_reference() => {
                self.is_assignable(a, b)
            }
            (Type::Array(_), Type::Object(name)) => {
                name == "java/lang/Cloneable" || name == "java/io/Serializable"
            }
            _ => false,
        }
    }

    /// Closest class both `a` and `b` extend; interfaces meet at the root type.
    pub fn common_super(&self, a: &str, b: &str) -> String {
        if self.is_subtype(a, b) {
            return b.to_string();
        }
        if self.is_subtype(b, a) {
            return a.to_string();
        }
        if self.is_interface(a) || self.is_interface(b) {
            return OBJECT.to_string();
        }
        let mut current = self.super_name(a);
        while let Some(candidate) = current {
            if self.is_subtype(b, &candidate) {
                return candidate;
            }
            current = self.super_name(&candidate);
        }
        OBJECT.to_string()
    }
}
