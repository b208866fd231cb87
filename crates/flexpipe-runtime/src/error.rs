//! The wire-level reconfiguration error taxonomy.
//!
//! Every controller command returns exactly one code from this taxonomy.
//! The integer values are stable: controllers and the PI shim match on them
//! across versions, so new variants may only be appended.

use thiserror::Error;

use flexpipe_core::{BuildError, GraphError};

/// Status code of a successful command.
pub const SUCCESS: i32 = 0;

/// Reconfiguration command failures.
///
/// Graph-level failures from the core fold into this taxonomy through the
/// `From<GraphError>` impl: not-found becomes [`ReconfigError::UnknownId`],
/// duplicates become [`ReconfigError::DuplicateId`], and every structural
/// refusal (wrong kind, live inbound edge, cycle, bad bit width) becomes
/// [`ReconfigError::InvalidCommand`].
#[derive(Debug, Error)]
pub enum ReconfigError {
    /// The pipeline JSON file could not be opened.
    #[error("cannot open pipeline JSON file '{path}': {source}")]
    OpenJsonFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The plan file could not be opened.
    #[error("cannot open plan file '{path}': {source}")]
    OpenPlanFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The snapshot output could not be written.
    #[error("cannot write snapshot '{path}': {source}")]
    OpenOutputFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// An in-memory JSON stream could not be read.
    #[error("cannot read staged pipeline JSON stream: {source}")]
    OpenJsonStream {
        #[source]
        source: std::io::Error,
    },

    /// The staged program could not be built from the JSON.
    #[error("staged program could not be built: {source}")]
    StagedInit {
        #[source]
        source: BuildError,
    },

    /// An identifier carries a prefix other than `new_`, `old_` or `flx_`.
    #[error("id '{id}' does not have a 'new_', 'old_' or 'flx_' prefix")]
    Prefix { id: String },

    /// Inserting an identifier that is already registered.
    #[error("id '{id}' is already registered")]
    DuplicateId { id: String },

    /// Resolving an identifier that has not been registered, or a name that
    /// is not present in the running graph.
    #[error("id '{id}' is not registered")]
    UnknownId { id: String },

    /// A malformed command or an out-of-range argument.
    #[error("invalid command: {reason}")]
    InvalidCommand { reason: String },
}

impl ReconfigError {
    /// The stable wire code of this failure. `0` is reserved for success.
    pub fn code(&self) -> i32 {
        match self {
            ReconfigError::OpenJsonFile { .. } => 1,
            ReconfigError::OpenPlanFile { .. } => 2,
            ReconfigError::OpenOutputFile { .. } => 3,
            ReconfigError::OpenJsonStream { .. } => 4,
            ReconfigError::StagedInit { .. } => 5,
            ReconfigError::Prefix { .. } => 6,
            ReconfigError::DuplicateId { .. } => 7,
            ReconfigError::UnknownId { .. } => 8,
            ReconfigError::InvalidCommand { .. } => 9,
        }
    }
}

impl From<GraphError> for ReconfigError {
    fn from(err: GraphError) -> Self {
        match err {
            GraphError::PipelineNotFound { name }
            | GraphError::NodeNotFound { name, .. }
            | GraphError::RegisterNotFound { name } => ReconfigError::UnknownId { id: name },
            GraphError::DuplicateNode { name, .. }
            | GraphError::DuplicateRegister { name }
            | GraphError::DuplicatePipeline { name } => ReconfigError::DuplicateId { id: name },
            other => ReconfigError::InvalidCommand {
                reason: other.to_string(),
            },
        }
    }
}

impl From<BuildError> for ReconfigError {
    fn from(err: BuildError) -> Self {
        ReconfigError::StagedInit { source: err }
    }
}
