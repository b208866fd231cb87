//! Typed pipeline nodes.
//!
//! A pipeline step is one of three kinds: a match-action [`MatchTable`], a
//! packet-derived [`Conditional`], or a controller-driven [`FlexNode`].
//! [`Node`] is the tagged union stored in a pipeline's node map.
//!
//! Outgoing edges are stored as **names**, not references: `Option<String>`
//! where `None` is the null edge (traversal stops there). Names are resolved
//! against the owning pipeline's node map at traversal and mutation time.
//! A node freshly copied out of a staged program may therefore carry edge
//! names that do not (yet) resolve in the running graph; such a node is
//! detached and unreachable until later commands splice it in.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::GraphError;

/// Edge label selecting a table's unconditional default next node.
pub const EDGE_DEFAULT: &str = "__default__";
/// Edge label selecting a table's on-hit next node.
pub const EDGE_HIT: &str = "__hit__";
/// Edge label selecting a table's on-miss next node.
pub const EDGE_MISS: &str = "__miss__";

/// One outgoing branch of a conditional or flex node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Branch {
    True,
    False,
}

impl Branch {
    /// The edge label used on the wire and in plan files.
    pub fn label(self) -> &'static str {
        match self {
            Branch::True => "true_next",
            Branch::False => "false_next",
        }
    }

    /// Maps the control-facade boolean (`true` = true branch) to a `Branch`.
    pub fn from_flag(flag: bool) -> Self {
        if flag {
            Branch::True
        } else {
            Branch::False
        }
    }
}

/// The outcome of matching a packet against a table, used to pick the
/// outgoing edge during traversal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableOutcome {
    /// A specific action was selected.
    Action(String),
    /// The table hit and hit/miss routing is in use.
    Hit,
    /// The table missed and hit/miss routing is in use.
    Miss,
    /// Follow the unconditional default edge.
    Default,
}

// ---------------------------------------------------------------------------
// Node kinds
// ---------------------------------------------------------------------------

/// A match-action table node.
///
/// Outgoing edges are labeled by action name, plus the three special labels
/// [`EDGE_DEFAULT`], [`EDGE_HIT`] and [`EDGE_MISS`]. The action map preserves
/// insertion order so serialized programs are stable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchTable {
    pub name: String,
    /// Per-action next node. `None` means the pipeline ends after the action.
    #[serde(default)]
    pub next_tables: IndexMap<String, Option<String>>,
    /// Unconditional default next node.
    #[serde(default)]
    pub base_default_next: Option<String>,
    /// Next node when the table hits, for programs using hit/miss routing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hit_next: Option<String>,
    /// Next node when the table misses, for programs using hit/miss routing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub miss_next: Option<String>,
}

impl MatchTable {
    /// Creates a table with no actions and no outgoing edges.
    pub fn new(name: impl Into<String>) -> Self {
        MatchTable {
            name: name.into(),
            next_tables: IndexMap::new(),
            base_default_next: None,
            hit_next: None,
            miss_next: None,
        }
    }

    /// Returns the next node selected by a match outcome.
    pub fn next_for(&self, outcome: &TableOutcome) -> Result<Option<&str>, GraphError> {
        match outcome {
            TableOutcome::Default => Ok(self.base_default_next.as_deref()),
            TableOutcome::Hit => Ok(self.hit_next.as_deref()),
            TableOutcome::Miss => Ok(self.miss_next.as_deref()),
            TableOutcome::Action(action) => self
                .next_tables
                .get(action)
                .map(Option::as_deref)
                .ok_or_else(|| GraphError::UnknownEdgeLabel {
                    table: self.name.clone(),
                    label: action.clone(),
                }),
        }
    }

    /// Rebinds a single outgoing edge.
    ///
    /// `label` is an action name or one of the special labels. Unknown action
    /// labels are rejected; a rewire never grows the edge set.
    pub fn set_next(&mut self, label: &str, next: Option<String>) -> Result<(), GraphError> {
        match label {
            EDGE_DEFAULT => self.base_default_next = next,
            EDGE_HIT => self.hit_next = next,
            EDGE_MISS => self.miss_next = next,
            action => {
                let slot = self.next_tables.get_mut(action).ok_or_else(|| {
                    GraphError::UnknownEdgeLabel {
                        table: self.name.clone(),
                        label: action.to_string(),
                    }
                })?;
                *slot = next;
            }
        }
        Ok(())
    }
}

/// A conditional node with a packet-derived boolean.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conditional {
    pub name: String,
    #[serde(default)]
    pub true_next: Option<String>,
    #[serde(default)]
    pub false_next: Option<String>,
}

impl Conditional {
    pub fn new(name: impl Into<String>) -> Self {
        Conditional {
            name: name.into(),
            true_next: None,
            false_next: None,
        }
    }
}

/// A flex node: a conditional whose boolean is controller-set.
///
/// The armed bit is flipped by the trigger command, swinging traffic between
/// `false_next` (disarmed) and `true_next` (armed) in one control step. A
/// flex node may carry a mount-point number so that a trigger can address it
/// individually.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlexNode {
    pub name: String,
    #[serde(default)]
    pub true_next: Option<String>,
    #[serde(default)]
    pub false_next: Option<String>,
    /// Armed routes via `true_next`, disarmed via `false_next`.
    #[serde(default)]
    pub armed: bool,
    /// Target-defined mount slot, `None` for anonymous flex nodes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mount_point: Option<u32>,
}

impl FlexNode {
    /// Creates a disarmed flex node with the given branch targets.
    pub fn new(
        name: impl Into<String>,
        true_next: Option<String>,
        false_next: Option<String>,
        mount_point: Option<u32>,
    ) -> Self {
        FlexNode {
            name: name.into(),
            true_next,
            false_next,
            armed: false,
            mount_point,
        }
    }

    /// The branch a packet takes given the current armed bit.
    pub fn active_next(&self) -> Option<&str> {
        if self.armed {
            self.true_next.as_deref()
        } else {
            self.false_next.as_deref()
        }
    }
}

// ---------------------------------------------------------------------------
// The tagged union
// ---------------------------------------------------------------------------

/// A pipeline node of any kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Node {
    Table(MatchTable),
    Conditional(Conditional),
    Flex(FlexNode),
}

impl Node {
    /// The node's unique name within its pipeline.
    pub fn name(&self) -> &str {
        match self {
            Node::Table(t) => &t.name,
            Node::Conditional(c) => &c.name,
            Node::Flex(f) => &f.name,
        }
    }

    /// The kind name used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Node::Table(_) => "table",
            Node::Conditional(_) => "conditional",
            Node::Flex(_) => "flex",
        }
    }

    pub fn as_table(&self) -> Option<&MatchTable> {
        match self {
            Node::Table(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_flex(&self) -> Option<&FlexNode> {
        match self {
            Node::Flex(f) => Some(f),
            _ => None,
        }
    }

    /// All outgoing edges as `(label, target)` pairs.
    ///
    /// Used for inbound-reference scans and edge-closure checks; labels are
    /// the same strings accepted by the rewire operations.
    pub fn out_edges(&self) -> Vec<(&str, Option<&str>)> {
        match self {
            Node::Table(t) => {
                let mut edges: Vec<(&str, Option<&str>)> = t
                    .next_tables
                    .iter()
                    .map(|(label, next)| (label.as_str(), next.as_deref()))
                    .collect();
                edges.push((EDGE_DEFAULT, t.base_default_next.as_deref()));
                if t.hit_next.is_some() {
                    edges.push((EDGE_HIT, t.hit_next.as_deref()));
                }
                if t.miss_next.is_some() {
                    edges.push((EDGE_MISS, t.miss_next.as_deref()));
                }
                edges
            }
            Node::Conditional(c) => vec![
                (Branch::True.label(), c.true_next.as_deref()),
                (Branch::False.label(), c.false_next.as_deref()),
            ],
            Node::Flex(f) => vec![
                (Branch::True.label(), f.true_next.as_deref()),
                (Branch::False.label(), f.false_next.as_deref()),
            ],
        }
    }

    /// Returns `true` if any outgoing edge targets `name`.
    pub fn references(&self, name: &str) -> bool {
        self.out_edges()
            .iter()
            .any(|(_, target)| *target == Some(name))
    }

    /// Rebinds the true/false branch of a conditional or flex node.
    ///
    /// Tables are rejected; both conditionals and flex nodes share this
    /// rewire path.
    pub fn set_branch(&mut self, branch: Branch, next: Option<String>) -> Result<(), GraphError> {
        match self {
            Node::Conditional(c) => {
                match branch {
                    Branch::True => c.true_next = next,
                    Branch::False => c.false_next = next,
                }
                Ok(())
            }
            Node::Flex(f) => {
                match branch {
                    Branch::True => f.true_next = next,
                    Branch::False => f.false_next = next,
                }
                Ok(())
            }
            Node::Table(t) => Err(GraphError::WrongNodeKind {
                name: t.name.clone(),
                expected: "conditional",
                actual: "table",
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_table() -> MatchTable {
        let mut t = MatchTable::new("acl");
        t.next_tables.insert("permit".to_string(), Some("fwd".to_string()));
        t.next_tables.insert("deny".to_string(), None);
        t.base_default_next = Some("fwd".to_string());
        t
    }

    #[test]
    fn table_next_for_action_and_default() {
        let t = sample_table();
        assert_eq!(
            t.next_for(&TableOutcome::Action("permit".into())).unwrap(),
            Some("fwd")
        );
        assert_eq!(t.next_for(&TableOutcome::Action("deny".into())).unwrap(), None);
        assert_eq!(t.next_for(&TableOutcome::Default).unwrap(), Some("fwd"));
    }

    #[test]
    fn table_next_for_unknown_action_errors() {
        let t = sample_table();
        let err = t.next_for(&TableOutcome::Action("nope".into())).unwrap_err();
        assert!(matches!(err, GraphError::UnknownEdgeLabel { .. }));
    }

    #[test]
    fn table_set_next_rewires_without_growing() {
        let mut t = sample_table();
        t.set_next("permit", None).unwrap();
        assert_eq!(t.next_tables["permit"], None);

        t.set_next(EDGE_DEFAULT, Some("acl2".into())).unwrap();
        assert_eq!(t.base_default_next.as_deref(), Some("acl2"));

        let err = t.set_next("unknown_action", Some("x".into())).unwrap_err();
        assert!(matches!(err, GraphError::UnknownEdgeLabel { .. }));
        assert_eq!(t.next_tables.len(), 2);
    }

    #[test]
    fn flex_active_next_follows_armed_bit() {
        let mut f = FlexNode::new("cut", Some("new_path".into()), Some("old_path".into()), None);
        assert_eq!(f.active_next(), Some("old_path"));
        f.armed = true;
        assert_eq!(f.active_next(), Some("new_path"));
    }

    #[test]
    fn set_branch_rejects_tables() {
        let mut node = Node::Table(sample_table());
        let err = node.set_branch(Branch::True, None).unwrap_err();
        assert!(matches!(err, GraphError::WrongNodeKind { .. }));
    }

    #[test]
    fn references_scans_all_edges() {
        let node = Node::Table(sample_table());
        assert!(node.references("fwd"));
        assert!(!node.references("acl"));

        let cond = Node::Conditional(Conditional {
            name: "c".into(),
            true_next: Some("t".into()),
            false_next: None,
        });
        assert!(cond.references("t"));
        assert!(!cond.references("f"));
    }

    #[test]
    fn serde_roundtrip_node() {
        let node = Node::Flex(FlexNode::new("f", Some("a".into()), None, Some(3)));
        let json = serde_json::to_string(&node).unwrap();
        let back: Node = serde_json::from_str(&json).unwrap();
        assert_eq!(node, back);
    }
}
