//! Pipeline graph model for the FlexPipe reconfigurable switch.
//!
//! The model is a set of named pipelines, each a directed graph of typed
//! nodes (match-action tables, conditionals, and controller-driven flex
//! nodes), plus stateful register arrays. Edges are names resolved through
//! the owning pipeline's node map, which lets a node copied from a staged
//! program sit detached in the running graph until reconfiguration commands
//! splice it in.

pub mod config;
pub mod error;
pub mod node;
pub mod pipeline;
pub mod program;
pub mod registers;

// Re-export commonly used types
pub use config::{program_from_json, BuildError, PipelineConfig, ProgramConfig, RegisterArrayConfig};
pub use error::GraphError;
pub use node::{
    Branch, Conditional, FlexNode, MatchTable, Node, TableOutcome, EDGE_DEFAULT, EDGE_HIT,
    EDGE_MISS,
};
pub use pipeline::Pipeline;
pub use program::{Program, RegisterChange};
pub use registers::RegisterArray;
