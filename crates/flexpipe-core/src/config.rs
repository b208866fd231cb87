//! The pipeline JSON dialect and the program builder.
//!
//! Programs are loaded from and snapshotted to the same JSON shape, so a
//! load → snapshot round-trip is the identity. The config layer is a plain
//! serde mirror of the model; [`ProgramConfig::build`] performs the only
//! validation the builder guarantees: unique names and a resolvable init
//! node per pipeline.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::GraphError;
use crate::node::{Conditional, FlexNode, MatchTable, Node};
use crate::pipeline::Pipeline;
use crate::program::Program;
use crate::registers::RegisterArray;

/// Errors raised while building a program from JSON.
#[derive(Debug, Error)]
pub enum BuildError {
    /// The input was not valid JSON for the pipeline dialect.
    #[error("malformed pipeline JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The JSON parsed but violated a structural constraint.
    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// Top-level JSON shape of a switch program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ProgramConfig {
    #[serde(default)]
    pub pipelines: Vec<PipelineConfig>,
    #[serde(default)]
    pub register_arrays: Vec<RegisterArrayConfig>,
}

/// One pipeline with its nodes grouped by kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub name: String,
    #[serde(default)]
    pub init_node: Option<String>,
    #[serde(default)]
    pub tables: Vec<MatchTable>,
    #[serde(default)]
    pub conditionals: Vec<Conditional>,
    #[serde(default)]
    pub flex_nodes: Vec<FlexNode>,
}

/// Declared shape of a register array (state is not part of the config).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterArrayConfig {
    pub name: String,
    pub size: usize,
    pub bitwidth: u32,
}

impl ProgramConfig {
    /// Parses the JSON dialect.
    pub fn from_json(text: &str) -> Result<Self, BuildError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Builds the in-memory program, validating name uniqueness and the init
    /// node of each pipeline.
    pub fn build(self) -> Result<Program, BuildError> {
        let mut program = Program::new();
        for pipeline_cfg in self.pipelines {
            let mut pipeline = Pipeline::new(pipeline_cfg.name);
            for table in pipeline_cfg.tables {
                pipeline.add_node(Node::Table(table))?;
            }
            for conditional in pipeline_cfg.conditionals {
                pipeline.add_node(Node::Conditional(conditional))?;
            }
            for flex in pipeline_cfg.flex_nodes {
                pipeline.add_node(Node::Flex(flex))?;
            }
            pipeline.set_init_node(pipeline_cfg.init_node)?;
            program.add_pipeline(pipeline)?;
        }
        for array_cfg in self.register_arrays {
            let array = RegisterArray::new(array_cfg.name, array_cfg.size, array_cfg.bitwidth)?;
            program.add_register_array(array)?;
        }
        Ok(program)
    }
}

/// Parses and builds a program from JSON text in one step.
pub fn program_from_json(text: &str) -> Result<Program, BuildError> {
    ProgramConfig::from_json(text)?.build()
}

impl Program {
    /// Projects the program back into the config dialect.
    ///
    /// Node order within each kind follows the node map's insertion order, so
    /// snapshots are stable across load/mutate/undo cycles.
    pub fn to_config(&self) -> ProgramConfig {
        let pipelines = self
            .pipelines()
            .map(|p| {
                let mut cfg = PipelineConfig {
                    name: p.name.clone(),
                    init_node: p.init_node().map(str::to_string),
                    tables: Vec::new(),
                    conditionals: Vec::new(),
                    flex_nodes: Vec::new(),
                };
                for node in p.nodes() {
                    match node {
                        Node::Table(t) => cfg.tables.push(t.clone()),
                        Node::Conditional(c) => cfg.conditionals.push(c.clone()),
                        Node::Flex(f) => cfg.flex_nodes.push(f.clone()),
                    }
                }
                cfg
            })
            .collect();

        let register_arrays = self
            .register_arrays()
            .map(|r| RegisterArrayConfig {
                name: r.name.clone(),
                size: r.size(),
                bitwidth: r.bitwidth(),
            })
            .collect();

        ProgramConfig {
            pipelines,
            register_arrays,
        }
    }

    /// Serializes the program snapshot in the JSON dialect.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.to_config())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "pipelines": [
            {
                "name": "ingress",
                "init_node": "acl",
                "tables": [
                    {
                        "name": "acl",
                        "next_tables": {"permit": "fwd", "deny": null},
                        "base_default_next": "fwd"
                    },
                    {"name": "fwd", "next_tables": {}, "base_default_next": null}
                ],
                "conditionals": [
                    {"name": "is_v4", "true_next": "acl", "false_next": null}
                ]
            }
        ],
        "register_arrays": [
            {"name": "flow_count", "size": 16, "bitwidth": 32}
        ]
    }"#;

    #[test]
    fn build_sample_program() {
        let program = program_from_json(SAMPLE).unwrap();
        let ingress = program.pipeline("ingress").unwrap();
        assert_eq!(ingress.init_node(), Some("acl"));
        assert_eq!(ingress.node_count(), 3);
        assert_eq!(program.register_array("flow_count").unwrap().size(), 16);
    }

    #[test]
    fn empty_object_builds_empty_program() {
        let program = program_from_json("{}").unwrap();
        assert_eq!(program.pipeline_count(), 0);
    }

    #[test]
    fn malformed_json_is_a_build_error() {
        let err = program_from_json("{not json").unwrap_err();
        assert!(matches!(err, BuildError::Json(_)));
    }

    #[test]
    fn duplicate_node_name_rejected() {
        let text = r#"{
            "pipelines": [{
                "name": "p",
                "init_node": null,
                "tables": [{"name": "t"}, {"name": "t"}]
            }]
        }"#;
        let err = program_from_json(text).unwrap_err();
        assert!(matches!(
            err,
            BuildError::Graph(GraphError::DuplicateNode { .. })
        ));
    }

    #[test]
    fn unknown_init_node_rejected() {
        let text = r#"{
            "pipelines": [{"name": "p", "init_node": "ghost"}]
        }"#;
        let err = program_from_json(text).unwrap_err();
        assert!(matches!(
            err,
            BuildError::Graph(GraphError::NodeNotFound { .. })
        ));
    }

    #[test]
    fn load_snapshot_roundtrip() {
        let program = program_from_json(SAMPLE).unwrap();
        let snapshot = program.to_json_pretty().unwrap();
        let reloaded = program_from_json(&snapshot).unwrap();
        assert_eq!(program.to_config(), reloaded.to_config());
    }
}
