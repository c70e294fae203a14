//! Relation graph: one [`PredicateNode`] per table reference.
//!
//! Nodes live in an arena owned by [`RelationGraph`]. Children are owned
//! through the arena and addressed by [`NodeId`]; the parent link is a plain
//! index and never owns anything, so the graph stays a tree.

use crate::clause::JoinDescriptor;
use crate::error::{CbError, CbResult};
use crate::meta::{ForeignInfo, TableInfo};
use crate::subquery::SubqueryDescriptor;
use indexmap::IndexMap;

/// Index of a node in its graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    pub const ROOT: NodeId = NodeId(0);
}

/// One table reference: the root table or a joined relation.
#[derive(Debug)]
pub struct PredicateNode {
    pub table: String,
    pub alias: String,
    /// Join hops from the root (root = 0).
    pub depth: usize,
    /// Relation numbers from the root, e.g. `_0_1`; empty for the root.
    pub relation_path: String,
    /// Foreign property this node was reached through.
    pub property: Option<String>,
    parent: Option<NodeId>,
    children: IndexMap<String, NodeId>,
    pub(crate) subqueries: IndexMap<String, SubqueryDescriptor>,
}

impl PredicateNode {
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub fn child(&self, property: &str) -> Option<NodeId> {
        self.children.get(property).copied()
    }

    pub fn children(&self) -> impl Iterator<Item = (&str, NodeId)> {
        self.children.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn subqueries(&self) -> impl Iterator<Item = &SubqueryDescriptor> {
        self.subqueries.values()
    }
}

/// Arena of predicate nodes plus relation-number bookkeeping.
#[derive(Debug)]
pub struct RelationGraph {
    level: usize,
    nodes: Vec<PredicateNode>,
    /// local table -> foreign property -> relation number
    numbers: IndexMap<String, IndexMap<String, usize>>,
}

impl RelationGraph {
    /// Create a graph rooted at `table` for a descriptor at nesting `level`.
    pub fn new(table: &str, level: usize) -> Self {
        let root = PredicateNode {
            table: table.to_string(),
            alias: Self::resolve_join_alias_name("", level),
            depth: 0,
            relation_path: String::new(),
            property: None,
            parent: None,
            children: IndexMap::new(),
            subqueries: IndexMap::new(),
        };
        Self {
            level,
            nodes: vec![root],
            numbers: IndexMap::new(),
        }
    }

    pub fn level(&self) -> usize {
        self.level
    }

    pub fn root(&self) -> &PredicateNode {
        &self.nodes[0]
    }

    pub fn node(&self, id: NodeId) -> &PredicateNode {
        &self.nodes[id.0]
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut PredicateNode {
        &mut self.nodes[id.0]
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &PredicateNode)> {
        self.nodes.iter().enumerate().map(|(i, n)| (NodeId(i), n))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Stable relation number for `(table, property)`, allocated on first use.
    fn relation_number(&mut self, table: &str, property: &str) -> usize {
        let per_table = self.numbers.entry(table.to_string()).or_default();
        let next = per_table.len();
        *per_table.entry(property.to_string()).or_insert(next)
    }

    /// Relation path of `property` reached from `parent`.
    ///
    /// The same parent and property always yield the same path.
    pub fn resolve_next_relation_path(&mut self, parent: NodeId, property: &str) -> String {
        let table = self.node(parent).table.clone();
        let number = self.relation_number(&table, property);
        format!("{}_{number}", self.node(parent).relation_path)
    }

    /// Deterministic alias for a relation path at a nesting level.
    pub fn resolve_join_alias_name(relation_path: &str, level: usize) -> String {
        if relation_path.is_empty() {
            format!("t{level}")
        } else {
            format!("t{level}r{relation_path}")
        }
    }

    /// Return the child reached through `property`, creating it when missing.
    ///
    /// The boolean is true when the node was created by this call.
    pub(crate) fn attach_child(
        &mut self,
        parent: NodeId,
        property: &str,
        table: &str,
    ) -> (NodeId, bool) {
        if let Some(existing) = self.node(parent).child(property) {
            return (existing, false);
        }
        let relation_path = self.resolve_next_relation_path(parent, property);
        let id = NodeId(self.nodes.len());
        let node = PredicateNode {
            table: table.to_string(),
            alias: Self::resolve_join_alias_name(&relation_path, self.level),
            depth: self.node(parent).depth + 1,
            relation_path,
            property: Some(property.to_string()),
            parent: Some(parent),
            children: IndexMap::new(),
            subqueries: IndexMap::new(),
        };
        tracing::trace!(
            target: crate::log::TARGET,
            alias = %node.alias,
            table = %node.table,
            property,
            "relation node attached"
        );
        self.nodes.push(node);
        self.node_mut(parent)
            .children
            .insert(property.to_string(), id);
        (id, true)
    }

    /// Foreign property names from the root down to `id`.
    pub fn property_path(&self, id: NodeId) -> Vec<&str> {
        let mut props = Vec::new();
        let mut cur = Some(id);
        while let Some(node_id) = cur {
            let node = self.node(node_id);
            if let Some(p) = &node.property {
                props.push(p.as_str());
            }
            cur = node.parent;
        }
        props.reverse();
        props
    }

    /// Walk `properties` from the root without creating anything.
    pub fn find_path(&self, properties: &[&str]) -> Option<NodeId> {
        let mut cur = NodeId::ROOT;
        for p in properties {
            cur = self.node(cur).child(p)?;
        }
        Some(cur)
    }

    pub fn find_by_alias(&self, alias: &str) -> Option<NodeId> {
        self.nodes().find(|(_, n)| n.alias == alias).map(|(id, _)| id)
    }
}

/// Build the join descriptor for a freshly attached relation node.
///
/// ON pairs are qualified with both aliases. A fixed condition is folded
/// into ON, or kept apart for an inline view when the relation asks for it;
/// its dynamic parameters are named under `fixed.{alias}`.
pub(crate) fn build_join(
    graph: &RelationGraph,
    node: NodeId,
    local: &TableInfo,
    foreign: &ForeignInfo,
    foreign_table: &TableInfo,
) -> CbResult<JoinDescriptor> {
    let child = graph.node(node);
    let parent_id = child
        .parent()
        .ok_or_else(|| CbError::validation("the root node has no join"))?;
    let parent = graph.node(parent_id);
    let local_alias = parent.alias.clone();
    let foreign_alias = child.alias.clone();

    let mut on_pairs = Vec::with_capacity(foreign.column_pairs.len());
    let mut fk_not_null = true;
    for (local_col, foreign_col) in &foreign.column_pairs {
        let lc = local.column(local_col)?;
        let fc = foreign_table.column(foreign_col)?;
        fk_not_null &= lc.not_null;
        on_pairs.push((
            format!("{local_alias}.{}", lc.sql_name),
            format!("{foreign_alias}.{}", fc.sql_name),
        ));
    }

    let mut fixed = None;
    let mut fixed_params = Vec::new();
    let mut inline = false;
    if let Some(cond) = &foreign.fixed {
        inline = cond.inline;
        if inline && cond.template.contains("{local}") {
            return Err(CbError::configuration(format!(
                "fixed condition of '{}' is rendered as an inline view and cannot refer to {{local}}",
                foreign.property
            )));
        }
        let foreign_ref = if inline {
            JoinDescriptor::inline_alias(&foreign_alias)
        } else {
            foreign_alias.clone()
        };
        let prefix = format!("fixed.{foreign_alias}");
        fixed = Some(cond.render(&local_alias, &foreign_ref, &prefix));
        fixed_params = cond
            .dynamic_params()
            .iter()
            .map(|name| format!("{prefix}.{name}"))
            .collect();
    }

    let parent_join_alias = parent.parent().is_some().then(|| parent.alias.clone());

    Ok(JoinDescriptor {
        local_alias,
        foreign_alias,
        foreign_table: foreign_table.sql_name.clone(),
        on_pairs,
        fixed,
        fixed_params,
        inline,
        inner_ineligible: !fk_not_null || foreign.fixed.is_some(),
        parent_alias: parent_join_alias,
        forced_inner: false,
        on_predicates: Vec::new(),
        inline_predicates: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relation_path_is_idempotent_per_pair() {
        let mut graph = RelationGraph::new("member", 0);
        let a = graph.resolve_next_relation_path(NodeId::ROOT, "member_status");
        let b = graph.resolve_next_relation_path(NodeId::ROOT, "member_status");
        let c = graph.resolve_next_relation_path(NodeId::ROOT, "member_security");
        assert_eq!(a, "_0");
        assert_eq!(a, b);
        assert_eq!(c, "_1");
    }

    #[test]
    fn aliases_follow_path_and_level() {
        assert_eq!(RelationGraph::resolve_join_alias_name("", 0), "t0");
        assert_eq!(RelationGraph::resolve_join_alias_name("_0_1", 0), "t0r_0_1");
        assert_eq!(RelationGraph::resolve_join_alias_name("_2", 1), "t1r_2");
    }

    #[test]
    fn attach_child_builds_tree() {
        let mut graph = RelationGraph::new("purchase", 0);
        let (member, created) = graph.attach_child(NodeId::ROOT, "member", "member");
        assert!(created);
        let (status, _) = graph.attach_child(member, "member_status", "member_status");
        let (again, created_again) = graph.attach_child(NodeId::ROOT, "member", "member");
        assert_eq!(member, again);
        assert!(!created_again);
        assert_eq!(graph.node(status).alias, "t0r_0_0");
        assert_eq!(graph.node(status).depth, 2);
        assert_eq!(graph.property_path(status), vec!["member", "member_status"]);
        assert_eq!(graph.find_path(&["member", "member_status"]), Some(status));
        assert_eq!(graph.node(status).parent(), Some(member));
    }

    #[test]
    fn relation_numbers_are_scoped_to_the_local_table() {
        let mut graph = RelationGraph::new("purchase", 0);
        let (member, _) = graph.attach_child(NodeId::ROOT, "member", "member");
        let (product, _) = graph.attach_child(NodeId::ROOT, "product", "product");
        let (status, _) = graph.attach_child(member, "member_status", "member_status");
        assert_eq!(graph.node(product).relation_path, "_1");
        assert_eq!(graph.node(status).relation_path, "_0_0");
    }
}
