//! Graph-level error types for flexpipe-core.
//!
//! Uses `thiserror` for structured, matchable error variants covering the
//! failure modes of pipeline graph surgery and register array maintenance.
//! The runtime crate folds these into its wire-level taxonomy.

use thiserror::Error;

/// Errors produced by pipeline graph and register array operations.
#[derive(Debug, Error)]
pub enum GraphError {
    /// A pipeline name was not found in the program.
    #[error("pipeline not found: '{name}'")]
    PipelineNotFound { name: String },

    /// Loading a program that declares the same pipeline twice.
    #[error("duplicate pipeline: '{name}'")]
    DuplicatePipeline { name: String },

    /// A node name was not found in the given pipeline.
    #[error("node not found in pipeline '{pipeline}': '{name}'")]
    NodeNotFound { pipeline: String, name: String },

    /// Inserting a node under a name that is already taken.
    #[error("duplicate node in pipeline '{pipeline}': '{name}'")]
    DuplicateNode { pipeline: String, name: String },

    /// A node exists but has the wrong kind for the requested operation.
    #[error("node '{name}' is a {actual}, expected a {expected}")]
    WrongNodeKind {
        name: String,
        expected: &'static str,
        actual: &'static str,
    },

    /// A table has no outgoing edge with the given label.
    #[error("table '{table}' has no edge labeled '{label}'")]
    UnknownEdgeLabel { table: String, label: String },

    /// Deleting a node that is still the target of a live edge.
    #[error("node '{name}' is still referenced by '{referrer}'")]
    NodeInUse { name: String, referrer: String },

    /// Deleting the node the pipeline currently starts at.
    #[error("node '{name}' is the init node of pipeline '{pipeline}'")]
    DeleteInitNode { pipeline: String, name: String },

    /// A register array name was not found in the program.
    #[error("register array not found: '{name}'")]
    RegisterNotFound { name: String },

    /// Inserting a register array under a name that is already taken.
    #[error("duplicate register array: '{name}'")]
    DuplicateRegister { name: String },

    /// A register access outside the array bounds.
    #[error("index {index} out of range for register array '{name}' (size {size})")]
    RegisterIndexOutOfRange {
        name: String,
        index: usize,
        size: usize,
    },

    /// A register array bit width outside the supported 1..=64 range.
    #[error("unsupported bit width {bitwidth} for register array '{name}'")]
    RegisterBitwidth { name: String, bitwidth: u32 },

    /// A pipeline walk took more steps than there are nodes.
    #[error("traversal of pipeline '{pipeline}' exceeded {steps} steps, cycle suspected")]
    TraversalCycle { pipeline: String, steps: usize },
}
