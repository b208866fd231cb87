//! The program container: every pipeline and register array of one loaded
//! switch configuration, plus the graph-surgery primitives used by runtime
//! reconfiguration.
//!
//! Two `Program` values coexist during a reconfiguration session: the running
//! program traversed by packets and a staged program loaded from JSON. The
//! insert primitives deep-copy nodes out of the staged program into the
//! running one; the copy keeps the edge names it had in the staged graph and
//! is detached until later rewires splice it in.

use indexmap::IndexMap;

use crate::error::GraphError;
use crate::node::{Branch, FlexNode, Node};
use crate::pipeline::Pipeline;
use crate::registers::RegisterArray;

/// Which property of a register array a change command rewrites.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterChange {
    /// Change the element count.
    Resize(usize),
    /// Change the element bit width.
    SetBitwidth(u32),
}

/// A complete switch program: pipelines plus register arrays.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Program {
    pipelines: IndexMap<String, Pipeline>,
    register_arrays: IndexMap<String, RegisterArray>,
    /// Counter minting names for freshly constructed flex nodes.
    flex_counter: u64,
}

impl Program {
    /// Creates an empty program with no pipelines.
    pub fn new() -> Self {
        Program::default()
    }

    // -----------------------------------------------------------------------
    // Read-only accessors
    // -----------------------------------------------------------------------

    pub fn pipeline(&self, name: &str) -> Result<&Pipeline, GraphError> {
        self.pipelines
            .get(name)
            .ok_or_else(|| GraphError::PipelineNotFound {
                name: name.to_string(),
            })
    }

    pub fn pipelines(&self) -> impl Iterator<Item = &Pipeline> {
        self.pipelines.values()
    }

    pub fn pipeline_count(&self) -> usize {
        self.pipelines.len()
    }

    pub fn register_array(&self, name: &str) -> Result<&RegisterArray, GraphError> {
        self.register_arrays
            .get(name)
            .ok_or_else(|| GraphError::RegisterNotFound {
                name: name.to_string(),
            })
    }

    pub fn register_arrays(&self) -> impl Iterator<Item = &RegisterArray> {
        self.register_arrays.values()
    }

    /// Returns `true` if `name` is a node in any pipeline or a register array.
    pub fn contains_name(&self, name: &str) -> bool {
        self.register_arrays.contains_key(name)
            || self.pipelines.values().any(|p| p.contains_node(name))
    }

    // -----------------------------------------------------------------------
    // Construction (used by the config builder)
    // -----------------------------------------------------------------------

    pub(crate) fn add_pipeline(&mut self, pipeline: Pipeline) -> Result<(), GraphError> {
        if self.pipelines.contains_key(&pipeline.name) {
            return Err(GraphError::DuplicatePipeline {
                name: pipeline.name,
            });
        }
        self.pipelines.insert(pipeline.name.clone(), pipeline);
        Ok(())
    }

    pub(crate) fn add_register_array(&mut self, array: RegisterArray) -> Result<(), GraphError> {
        if self.register_arrays.contains_key(&array.name) {
            return Err(GraphError::DuplicateRegister { name: array.name });
        }
        self.register_arrays.insert(array.name.clone(), array);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Node insertion (deep copy from a staged program)
    // -----------------------------------------------------------------------

    /// Copies the match table `actual_name` from `staged` into this program's
    /// `pipeline`, returning the name it is stored under.
    ///
    /// The copy keeps the outgoing edge names it had in the staged graph and
    /// is detached: nothing in the running graph points at it yet.
    pub fn insert_match_table(
        &mut self,
        staged: &Program,
        pipeline: &str,
        actual_name: &str,
    ) -> Result<String, GraphError> {
        self.insert_from_staged(staged, pipeline, actual_name, "table")
    }

    /// Copies the conditional `actual_name` from `staged` into this program's
    /// `pipeline`. Same shape as the table case.
    pub fn insert_conditional(
        &mut self,
        staged: &Program,
        pipeline: &str,
        actual_name: &str,
    ) -> Result<String, GraphError> {
        self.insert_from_staged(staged, pipeline, actual_name, "conditional")
    }

    fn insert_from_staged(
        &mut self,
        staged: &Program,
        pipeline: &str,
        actual_name: &str,
        expected_kind: &'static str,
    ) -> Result<String, GraphError> {
        let staged_pipeline = staged.pipeline(pipeline)?;
        let node = staged_pipeline
            .node(actual_name)
            .ok_or_else(|| GraphError::NodeNotFound {
                pipeline: pipeline.to_string(),
                name: actual_name.to_string(),
            })?;
        if node.kind() != expected_kind {
            return Err(GraphError::WrongNodeKind {
                name: actual_name.to_string(),
                expected: expected_kind,
                actual: node.kind(),
            });
        }

        let target = self.pipeline_mut(pipeline)?;
        target.add_node(node.clone())?;
        Ok(actual_name.to_string())
    }

    /// Constructs a fresh flex node in `pipeline` with the given branch
    /// targets, returning its assigned name.
    ///
    /// Both targets must resolve in the running pipeline at insertion time
    /// (the null edge is always acceptable). The node starts disarmed.
    pub fn insert_flex(
        &mut self,
        pipeline: &str,
        true_next: Option<String>,
        false_next: Option<String>,
        mount_point: Option<u32>,
    ) -> Result<String, GraphError> {
        {
            let p = self.pipeline(pipeline)?;
            for target in [&true_next, &false_next].into_iter().flatten() {
                if !p.contains_node(target) {
                    return Err(GraphError::NodeNotFound {
                        pipeline: pipeline.to_string(),
                        name: target.clone(),
                    });
                }
            }
        }

        let name = self.mint_flex_name(pipeline);
        let node = Node::Flex(FlexNode::new(name.clone(), true_next, false_next, mount_point));
        self.pipeline_mut(pipeline)?.add_node(node)?;
        Ok(name)
    }

    fn mint_flex_name(&mut self, pipeline: &str) -> String {
        loop {
            let candidate = format!("flex_{}", self.flex_counter);
            self.flex_counter += 1;
            let taken = self
                .pipelines
                .get(pipeline)
                .map(|p| p.contains_node(&candidate))
                .unwrap_or(false);
            if !taken {
                return candidate;
            }
        }
    }

    // -----------------------------------------------------------------------
    // Edge rewiring
    // -----------------------------------------------------------------------

    /// Rebinds one outgoing edge of a table node.
    pub fn change_table_next(
        &mut self,
        pipeline: &str,
        table: &str,
        label: &str,
        next: Option<String>,
    ) -> Result<(), GraphError> {
        self.pipeline_mut(pipeline)?
            .change_table_next(table, label, next)
    }

    /// Rebinds the true/false branch of a conditional or flex node.
    pub fn change_branch_next(
        &mut self,
        pipeline: &str,
        node: &str,
        branch: Branch,
        next: Option<String>,
    ) -> Result<(), GraphError> {
        self.pipeline_mut(pipeline)?
            .change_branch_next(node, branch, next)
    }

    /// Atomically retargets a pipeline's entry pointer.
    pub fn change_init_node(
        &mut self,
        pipeline: &str,
        next: Option<String>,
    ) -> Result<(), GraphError> {
        self.pipeline_mut(pipeline)?.set_init_node(next)
    }

    // -----------------------------------------------------------------------
    // Node deletion
    // -----------------------------------------------------------------------

    pub fn delete_match_table(&mut self, pipeline: &str, name: &str) -> Result<(), GraphError> {
        self.delete_node(pipeline, name, "table")
    }

    pub fn delete_conditional(&mut self, pipeline: &str, name: &str) -> Result<(), GraphError> {
        self.delete_node(pipeline, name, "conditional")
    }

    pub fn delete_flex(&mut self, pipeline: &str, name: &str) -> Result<(), GraphError> {
        self.delete_node(pipeline, name, "flex")
    }

    fn delete_node(
        &mut self,
        pipeline: &str,
        name: &str,
        expected_kind: &'static str,
    ) -> Result<(), GraphError> {
        let p = self.pipeline(pipeline)?;
        match p.node(name) {
            Some(node) if node.kind() != expected_kind => {
                return Err(GraphError::WrongNodeKind {
                    name: name.to_string(),
                    expected: expected_kind,
                    actual: node.kind(),
                });
            }
            Some(_) => {}
            None => {
                return Err(GraphError::NodeNotFound {
                    pipeline: pipeline.to_string(),
                    name: name.to_string(),
                });
            }
        }
        self.pipeline_mut(pipeline)?.remove_node(name)?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Register arrays
    // -----------------------------------------------------------------------

    /// Constructs a zeroed register array, returning the name it is stored
    /// under.
    pub fn insert_register_array(
        &mut self,
        actual_name: &str,
        size: usize,
        bitwidth: u32,
    ) -> Result<String, GraphError> {
        if self.register_arrays.contains_key(actual_name) {
            return Err(GraphError::DuplicateRegister {
                name: actual_name.to_string(),
            });
        }
        let array = RegisterArray::new(actual_name, size, bitwidth)?;
        self.register_arrays.insert(actual_name.to_string(), array);
        Ok(actual_name.to_string())
    }

    /// Resizes or re-widths a register array.
    pub fn change_register_array(
        &mut self,
        name: &str,
        change: RegisterChange,
    ) -> Result<(), GraphError> {
        let array = self.register_array_mut(name)?;
        match change {
            RegisterChange::Resize(size) => {
                array.resize(size);
                Ok(())
            }
            RegisterChange::SetBitwidth(bitwidth) => array.set_bitwidth(bitwidth),
        }
    }

    pub fn delete_register_array(&mut self, name: &str) -> Result<(), GraphError> {
        self.register_arrays
            .shift_remove(name)
            .map(|_| ())
            .ok_or_else(|| GraphError::RegisterNotFound {
                name: name.to_string(),
            })
    }

    pub fn register_read(&self, name: &str, index: usize) -> Result<u64, GraphError> {
        self.register_array(name)?.read(index)
    }

    pub fn register_write(&mut self, name: &str, index: usize, value: u64) -> Result<(), GraphError> {
        self.register_array_mut(name)?.write(index, value)
    }

    pub fn register_reset(&mut self, name: &str) -> Result<(), GraphError> {
        self.register_array_mut(name)?.reset();
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Flex trigger
    // -----------------------------------------------------------------------

    /// Sets the armed bit on flex nodes across all pipelines.
    ///
    /// With `mount_point = None` every flex node is affected; otherwise only
    /// the nodes registered at that mount slot. Returns the number of nodes
    /// whose bit was set.
    pub fn flex_trigger(&mut self, armed: bool, mount_point: Option<u32>) -> usize {
        let mut touched = 0;
        for pipeline in self.pipelines.values_mut() {
            for node in pipeline.nodes_mut() {
                if let Node::Flex(f) = node {
                    let selected = match mount_point {
                        None => true,
                        Some(k) => f.mount_point == Some(k),
                    };
                    if selected {
                        f.armed = armed;
                        touched += 1;
                    }
                }
            }
        }
        touched
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn pipeline_mut(&mut self, name: &str) -> Result<&mut Pipeline, GraphError> {
        self.pipelines
            .get_mut(name)
            .ok_or_else(|| GraphError::PipelineNotFound {
                name: name.to_string(),
            })
    }

    fn register_array_mut(&mut self, name: &str) -> Result<&mut RegisterArray, GraphError> {
        self.register_arrays
            .get_mut(name)
            .ok_or_else(|| GraphError::RegisterNotFound {
                name: name.to_string(),
            })
    }
}
