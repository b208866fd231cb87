//! A pipeline: a named directed graph of typed nodes with an init pointer.
//!
//! All mutations validate before touching the graph, so a failed operation
//! leaves the pipeline exactly as it was. Node removal refuses to orphan
//! live edges: the caller must rewire every inbound edge first, which is how
//! the flex-based cutover protocol tears down replaced sub-pipelines.

use std::collections::HashSet;

use indexmap::IndexMap;

use crate::error::GraphError;
use crate::node::{Branch, Conditional, MatchTable, Node, TableOutcome};

/// A named directed graph of pipeline nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pipeline {
    pub name: String,
    init_node: Option<String>,
    nodes: IndexMap<String, Node>,
}

impl Pipeline {
    /// Creates an empty pipeline with no init node.
    pub fn new(name: impl Into<String>) -> Self {
        Pipeline {
            name: name.into(),
            init_node: None,
            nodes: IndexMap::new(),
        }
    }

    // -----------------------------------------------------------------------
    // Read-only accessors
    // -----------------------------------------------------------------------

    pub fn init_node(&self) -> Option<&str> {
        self.init_node.as_deref()
    }

    pub fn node(&self, name: &str) -> Option<&Node> {
        self.nodes.get(name)
    }

    pub fn contains_node(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Node names in insertion order.
    pub fn node_names(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub(crate) fn nodes_mut(&mut self) -> impl Iterator<Item = &mut Node> {
        self.nodes.values_mut()
    }

    // -----------------------------------------------------------------------
    // Mutation
    // -----------------------------------------------------------------------

    /// Adds a detached node. The name must be free.
    pub fn add_node(&mut self, node: Node) -> Result<(), GraphError> {
        let name = node.name().to_string();
        if self.nodes.contains_key(&name) {
            return Err(GraphError::DuplicateNode {
                pipeline: self.name.clone(),
                name,
            });
        }
        self.nodes.insert(name, node);
        Ok(())
    }

    /// Removes a node by name.
    ///
    /// The node must not be the current init node and must not be the target
    /// of any edge of any other node. Detached nodes count too: a staged copy
    /// that still names this node keeps it pinned until it is rewired.
    pub fn remove_node(&mut self, name: &str) -> Result<Node, GraphError> {
        if !self.nodes.contains_key(name) {
            return Err(self.not_found(name));
        }
        if self.init_node.as_deref() == Some(name) {
            return Err(GraphError::DeleteInitNode {
                pipeline: self.name.clone(),
                name: name.to_string(),
            });
        }
        if let Some(referrer) = self
            .nodes
            .values()
            .find(|n| n.name() != name && n.references(name))
        {
            return Err(GraphError::NodeInUse {
                name: name.to_string(),
                referrer: referrer.name().to_string(),
            });
        }
        // shift_remove keeps the insertion order of the survivors, so a
        // snapshot after an insert/delete pair matches the original program.
        Ok(self
            .nodes
            .shift_remove(name)
            .expect("presence checked above"))
    }

    /// Atomically retargets the pipeline's entry pointer.
    pub fn set_init_node(&mut self, next: Option<String>) -> Result<(), GraphError> {
        if let Some(target) = &next {
            if !self.nodes.contains_key(target) {
                return Err(self.not_found(target));
            }
        }
        self.init_node = next;
        Ok(())
    }

    /// Rebinds one outgoing edge of a table node.
    pub fn change_table_next(
        &mut self,
        table: &str,
        label: &str,
        next: Option<String>,
    ) -> Result<(), GraphError> {
        self.check_target(&next)?;
        let pipeline = self.name.clone();
        match self.nodes.get_mut(table) {
            Some(Node::Table(t)) => t.set_next(label, next),
            Some(other) => Err(GraphError::WrongNodeKind {
                name: table.to_string(),
                expected: "table",
                actual: other.kind(),
            }),
            None => Err(GraphError::NodeNotFound {
                pipeline,
                name: table.to_string(),
            }),
        }
    }

    /// Rebinds the true/false branch of a conditional or flex node.
    pub fn change_branch_next(
        &mut self,
        node: &str,
        branch: Branch,
        next: Option<String>,
    ) -> Result<(), GraphError> {
        self.check_target(&next)?;
        let pipeline = self.name.clone();
        match self.nodes.get_mut(node) {
            Some(n) => n.set_branch(branch, next),
            None => Err(GraphError::NodeNotFound {
                pipeline,
                name: node.to_string(),
            }),
        }
    }

    // -----------------------------------------------------------------------
    // Traversal
    // -----------------------------------------------------------------------

    /// Walks the pipeline from the init node, returning the visited node
    /// names in order.
    ///
    /// `table_outcome` decides which edge a table takes and `condition`
    /// evaluates a conditional; flex nodes route on their own armed bit. The
    /// walk stops at a null edge or at an edge naming a node that is not in
    /// the graph (a detached frontier). A walk longer than the node count is
    /// reported as a cycle.
    pub fn walk<T, C>(&self, mut table_outcome: T, mut condition: C) -> Result<Vec<String>, GraphError>
    where
        T: FnMut(&MatchTable) -> TableOutcome,
        C: FnMut(&Conditional) -> bool,
    {
        let mut visited = Vec::new();
        let mut current = self.init_node.clone();
        let step_limit = self.nodes.len();

        while let Some(name) = current {
            let Some(node) = self.nodes.get(&name) else {
                break;
            };
            if visited.len() >= step_limit {
                return Err(GraphError::TraversalCycle {
                    pipeline: self.name.clone(),
                    steps: visited.len(),
                });
            }
            visited.push(name.clone());

            current = match node {
                Node::Table(t) => t.next_for(&table_outcome(t))?.map(str::to_string),
                Node::Conditional(c) => {
                    let next = if condition(c) { &c.true_next } else { &c.false_next };
                    next.clone()
                }
                Node::Flex(f) => f.active_next().map(str::to_string),
            };
        }
        Ok(visited)
    }

    /// Walks following table default edges and false conditional branches.
    pub fn walk_default(&self) -> Result<Vec<String>, GraphError> {
        self.walk(|_| TableOutcome::Default, |_| false)
    }

    // -----------------------------------------------------------------------
    // Consistency checks
    // -----------------------------------------------------------------------

    /// Node names reachable from the init node.
    pub fn reachable(&self) -> HashSet<&str> {
        let mut seen = HashSet::new();
        let mut stack = Vec::new();
        if let Some(init) = self.init_node.as_deref() {
            stack.push(init);
        }
        while let Some(name) = stack.pop() {
            let Some(node) = self.nodes.get(name) else {
                continue;
            };
            if !seen.insert(name) {
                continue;
            }
            for (_, target) in node.out_edges() {
                if let Some(target) = target {
                    stack.push(target);
                }
            }
        }
        seen
    }

    /// Verifies that every edge of every reachable node resolves to a node
    /// present in this pipeline or to the null edge.
    pub fn check_edge_closure(&self) -> Result<(), GraphError> {
        for name in self.reachable() {
            let node = &self.nodes[name];
            for (_, target) in node.out_edges() {
                if let Some(target) = target {
                    if !self.nodes.contains_key(target) {
                        return Err(self.not_found(target));
                    }
                }
            }
        }
        Ok(())
    }

    fn check_target(&self, next: &Option<String>) -> Result<(), GraphError> {
        if let Some(target) = next {
            if !self.nodes.contains_key(target) {
                return Err(self.not_found(target));
            }
        }
        Ok(())
    }

    fn not_found(&self, name: &str) -> GraphError {
        GraphError::NodeNotFound {
            pipeline: self.name.clone(),
            name: name.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::FlexNode;

    fn table(name: &str, default_next: Option<&str>) -> Node {
        let mut t = MatchTable::new(name);
        t.base_default_next = default_next.map(str::to_string);
        Node::Table(t)
    }

    fn two_table_pipeline() -> Pipeline {
        let mut p = Pipeline::new("ingress");
        p.add_node(table("a", Some("b"))).unwrap();
        p.add_node(table("b", None)).unwrap();
        p.set_init_node(Some("a".into())).unwrap();
        p
    }

    #[test]
    fn add_duplicate_node_errors() {
        let mut p = two_table_pipeline();
        let err = p.add_node(table("a", None)).unwrap_err();
        assert!(matches!(err, GraphError::DuplicateNode { .. }));
        assert_eq!(p.node_count(), 2);
    }

    #[test]
    fn walk_default_follows_default_edges() {
        let p = two_table_pipeline();
        assert_eq!(p.walk_default().unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn walk_stops_at_detached_frontier() {
        let mut p = Pipeline::new("ingress");
        p.add_node(table("a", Some("ghost"))).unwrap();
        p.set_init_node(Some("a".into())).unwrap();
        // "ghost" is not in the graph; the walk ends after "a".
        assert_eq!(p.walk_default().unwrap(), vec!["a"]);
    }

    #[test]
    fn walk_detects_cycles() {
        let mut p = Pipeline::new("ingress");
        p.add_node(table("a", Some("b"))).unwrap();
        p.add_node(table("b", Some("a"))).unwrap();
        p.set_init_node(Some("a".into())).unwrap();
        let err = p.walk_default().unwrap_err();
        assert!(matches!(err, GraphError::TraversalCycle { .. }));
    }

    #[test]
    fn walk_routes_flex_by_armed_bit() {
        let mut p = two_table_pipeline();
        p.add_node(Node::Flex(FlexNode::new(
            "f",
            Some("b".into()),
            None,
            None,
        )))
        .unwrap();
        p.set_init_node(Some("f".into())).unwrap();

        assert_eq!(p.walk_default().unwrap(), vec!["f"]);

        if let Some(Node::Flex(f)) = p.nodes.get_mut("f") {
            f.armed = true;
        }
        assert_eq!(p.walk_default().unwrap(), vec!["f", "b"]);
    }

    #[test]
    fn remove_node_rejects_init_and_referenced_nodes() {
        let mut p = two_table_pipeline();

        let err = p.remove_node("a").unwrap_err();
        assert!(matches!(err, GraphError::DeleteInitNode { .. }));

        let err = p.remove_node("b").unwrap_err();
        assert!(matches!(err, GraphError::NodeInUse { .. }));

        // After rewiring a's default edge away, b becomes deletable.
        p.change_table_next("a", crate::node::EDGE_DEFAULT, None)
            .unwrap();
        p.remove_node("b").unwrap();
        assert_eq!(p.node_count(), 1);
    }

    #[test]
    fn set_init_node_requires_existing_target() {
        let mut p = two_table_pipeline();
        let err = p.set_init_node(Some("ghost".into())).unwrap_err();
        assert!(matches!(err, GraphError::NodeNotFound { .. }));
        assert_eq!(p.init_node(), Some("a"));
    }

    #[test]
    fn change_table_next_validates_target_and_kind() {
        let mut p = two_table_pipeline();
        p.add_node(Node::Conditional(Conditional::new("c"))).unwrap();

        let err = p
            .change_table_next("a", crate::node::EDGE_DEFAULT, Some("ghost".into()))
            .unwrap_err();
        assert!(matches!(err, GraphError::NodeNotFound { .. }));

        let err = p
            .change_table_next("c", crate::node::EDGE_DEFAULT, None)
            .unwrap_err();
        assert!(matches!(err, GraphError::WrongNodeKind { .. }));
    }

    #[test]
    fn change_branch_next_works_for_conditional_and_flex() {
        let mut p = two_table_pipeline();
        p.add_node(Node::Conditional(Conditional::new("c"))).unwrap();
        p.add_node(Node::Flex(FlexNode::new("f", None, None, None)))
            .unwrap();

        p.change_branch_next("c", Branch::True, Some("a".into()))
            .unwrap();
        p.change_branch_next("f", Branch::False, Some("b".into()))
            .unwrap();

        assert!(p.node("c").unwrap().references("a"));
        assert!(p.node("f").unwrap().references("b"));
    }

    #[test]
    fn reachable_ignores_detached_nodes() {
        let mut p = two_table_pipeline();
        p.add_node(table("island", None)).unwrap();
        let reachable = p.reachable();
        assert!(reachable.contains("a"));
        assert!(reachable.contains("b"));
        assert!(!reachable.contains("island"));
    }

    #[test]
    fn edge_closure_holds_for_reachable_graph() {
        let p = two_table_pipeline();
        p.check_edge_closure().unwrap();
    }
}
