//! Per-context reconfiguration sessions.
//!
//! A [`Context`] owns one running program, at most one staged program, and
//! the session's name registry. Each controller command is a method that
//! either succeeds atomically or returns a taxonomy error leaving all three
//! untouched: identifier validation runs first, the graph primitive itself
//! validates before mutating, and registry bindings are only written after
//! the graph mutation succeeded.
//!
//! The context is not synchronized; the switch layer wraps it in the
//! readers/writer + quiescence discipline.

use std::io::Read;

use flexpipe_core::{program_from_json, Branch, Program, RegisterChange};

use crate::error::ReconfigError;
use crate::plan::{parse_plan, PlanCommand};
use crate::registry::{flex_mount_point, split_id, IdPrefix, NameRegistry};

/// Where a session stands, per the staging state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No staged program; only staging initialization is legal.
    Idle,
    /// A staged program is present; mutation commands are legal.
    Staged,
}

/// One reconfiguration context: running graph, staged graph, name registry.
#[derive(Debug, Default)]
pub struct Context {
    running: Program,
    staged: Option<Program>,
    registry: NameRegistry,
}

impl Context {
    /// Creates a context executing `running`.
    pub fn new(running: Program) -> Self {
        Context {
            running,
            staged: None,
            registry: NameRegistry::new(),
        }
    }

    // -----------------------------------------------------------------------
    // Read-only accessors
    // -----------------------------------------------------------------------

    pub fn running(&self) -> &Program {
        &self.running
    }

    pub fn staged(&self) -> Option<&Program> {
        self.staged.as_ref()
    }

    pub fn registry(&self) -> &NameRegistry {
        &self.registry
    }

    pub fn state(&self) -> SessionState {
        if self.staged.is_some() {
            SessionState::Staged
        } else {
            SessionState::Idle
        }
    }

    /// Replaces the running program wholesale (initial load, config swap).
    pub fn replace_running(&mut self, running: Program) {
        self.running = running;
        self.staged = None;
        self.registry.clear();
    }

    // -----------------------------------------------------------------------
    // Staging
    // -----------------------------------------------------------------------

    /// Builds the staged program from JSON text and starts a fresh session.
    ///
    /// On failure the staged slot and the registry keep their previous
    /// contents.
    pub fn init_staged(&mut self, json: &str) -> Result<(), ReconfigError> {
        let staged = program_from_json(json).map_err(|err| {
            tracing::error!(error = %err, "staged program initialization failed");
            ReconfigError::from(err)
        })?;
        self.staged = Some(staged);
        self.registry.clear();
        Ok(())
    }

    /// Like [`init_staged`](Self::init_staged) but consumes a reader.
    pub fn init_staged_from_reader(&mut self, mut reader: impl Read) -> Result<(), ReconfigError> {
        let mut json = String::new();
        reader
            .read_to_string(&mut json)
            .map_err(|source| ReconfigError::OpenJsonStream { source })?;
        self.init_staged(&json)
    }

    // -----------------------------------------------------------------------
    // Table commands
    // -----------------------------------------------------------------------

    /// Copies table `new_X` out of the staged program, detached.
    pub fn insert_table(&mut self, pipeline: &str, id: &str) -> Result<(), ReconfigError> {
        let actual_name = self.check_insert_id(id, IdPrefix::New, "table")?;
        let staged = require_staged(&self.staged)?;
        let assigned = self
            .running
            .insert_match_table(staged, pipeline, &actual_name)?;
        self.registry.bind(id, assigned);
        self.debug_check();
        Ok(())
    }

    /// Rewires `resolve(id).edge -> resolve(next_id)`.
    pub fn change_table(
        &mut self,
        pipeline: &str,
        id: &str,
        edge: &str,
        next_id: &str,
    ) -> Result<(), ReconfigError> {
        self.staged_required()?;
        let table = self.resolve_node(id)?;
        let next = self.registry.resolve(next_id)?;
        self.running
            .change_table_next(pipeline, &table, edge, next)?;
        self.debug_check();
        Ok(())
    }

    /// Removes the table `resolve(id)` and drops its registry binding.
    pub fn delete_table(&mut self, pipeline: &str, id: &str) -> Result<(), ReconfigError> {
        self.staged_required()?;
        let name = self.resolve_node(id)?;
        self.running.delete_match_table(pipeline, &name)?;
        self.unbind_session_id(id)?;
        self.debug_check();
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Conditional commands
    // -----------------------------------------------------------------------

    pub fn insert_conditional(&mut self, pipeline: &str, id: &str) -> Result<(), ReconfigError> {
        let actual_name = self.check_insert_id(id, IdPrefix::New, "conditional")?;
        let staged = require_staged(&self.staged)?;
        let assigned = self
            .running
            .insert_conditional(staged, pipeline, &actual_name)?;
        self.registry.bind(id, assigned);
        self.debug_check();
        Ok(())
    }

    pub fn change_conditional(
        &mut self,
        pipeline: &str,
        id: &str,
        branch: Branch,
        next_id: &str,
    ) -> Result<(), ReconfigError> {
        self.change_branch(pipeline, id, branch, next_id)
    }

    pub fn delete_conditional(&mut self, pipeline: &str, id: &str) -> Result<(), ReconfigError> {
        self.staged_required()?;
        let name = self.resolve_node(id)?;
        self.running.delete_conditional(pipeline, &name)?;
        self.unbind_session_id(id)?;
        self.debug_check();
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Flex commands
    // -----------------------------------------------------------------------

    /// Constructs a flex node routing between two resolved targets.
    pub fn insert_flex(
        &mut self,
        pipeline: &str,
        id: &str,
        true_id: &str,
        false_id: &str,
    ) -> Result<(), ReconfigError> {
        self.staged_required()?;
        let actual_name = self.check_insert_id(id, IdPrefix::Flx, "flex")?;
        let true_next = self.registry.resolve(true_id)?;
        let false_next = self.registry.resolve(false_id)?;
        let mount_point = flex_mount_point(&actual_name)?;
        let assigned = self
            .running
            .insert_flex(pipeline, true_next, false_next, mount_point)?;
        self.registry.bind(id, assigned);
        self.debug_check();
        Ok(())
    }

    /// Flex rewiring shares the conditional branch path.
    pub fn change_flex(
        &mut self,
        pipeline: &str,
        id: &str,
        branch: Branch,
        next_id: &str,
    ) -> Result<(), ReconfigError> {
        self.change_branch(pipeline, id, branch, next_id)
    }

    pub fn delete_flex(&mut self, pipeline: &str, id: &str) -> Result<(), ReconfigError> {
        self.staged_required()?;
        let name = self.resolve_node(id)?;
        self.running.delete_flex(pipeline, &name)?;
        self.unbind_session_id(id)?;
        self.debug_check();
        Ok(())
    }

    /// Sets the armed bit on all flex nodes, or on the mount slot `number`.
    pub fn trigger(&mut self, armed: bool, number: Option<u32>) -> Result<(), ReconfigError> {
        self.staged_required()?;
        let touched = self.running.flex_trigger(armed, number);
        tracing::info!(armed, ?number, touched, "flex trigger applied");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Register array commands
    // -----------------------------------------------------------------------

    pub fn insert_register_array(
        &mut self,
        id: &str,
        size: usize,
        bitwidth: u32,
    ) -> Result<(), ReconfigError> {
        self.staged_required()?;
        let actual_name = self.check_insert_id(id, IdPrefix::New, "register_array")?;
        let assigned = self
            .running
            .insert_register_array(&actual_name, size, bitwidth)?;
        self.registry.bind(id, assigned);
        self.debug_check();
        Ok(())
    }

    /// `change_type` 0 resizes, 1 changes the bit width.
    pub fn change_register_array(
        &mut self,
        id: &str,
        change_type: u32,
        value: u32,
    ) -> Result<(), ReconfigError> {
        self.staged_required()?;
        let name = self.resolve_node(id)?;
        let change = match change_type {
            0 => RegisterChange::Resize(value as usize),
            1 => RegisterChange::SetBitwidth(value),
            other => {
                tracing::error!(id, change_type = other, "invalid register array change type");
                return Err(ReconfigError::InvalidCommand {
                    reason: format!("register array change type {other} is not 0 or 1"),
                });
            }
        };
        self.running.change_register_array(&name, change)?;
        self.debug_check();
        Ok(())
    }

    pub fn delete_register_array(&mut self, id: &str) -> Result<(), ReconfigError> {
        self.staged_required()?;
        let name = self.resolve_node(id)?;
        self.running.delete_register_array(&name)?;
        self.unbind_session_id(id)?;
        self.debug_check();
        Ok(())
    }

    /// Reads one register cell. State access takes running-graph names, not
    /// controller ids.
    pub fn register_read(&self, name: &str, index: usize) -> Result<u64, ReconfigError> {
        Ok(self.running.register_read(name, index)?)
    }

    /// Writes one register cell, masked to the array's bit width.
    pub fn register_write(
        &mut self,
        name: &str,
        index: usize,
        value: u64,
    ) -> Result<(), ReconfigError> {
        Ok(self.running.register_write(name, index, value)?)
    }

    /// Zeroes a register array.
    pub fn register_reset(&mut self, name: &str) -> Result<(), ReconfigError> {
        Ok(self.running.register_reset(name)?)
    }

    // -----------------------------------------------------------------------
    // Init node command
    // -----------------------------------------------------------------------

    /// Retargets a pipeline's entry pointer; the null id is rejected because
    /// a loaded pipeline always has an entry.
    pub fn change_init(&mut self, pipeline: &str, id: &str) -> Result<(), ReconfigError> {
        self.staged_required()?;
        let Some(next) = self.registry.resolve(id)? else {
            return Err(ReconfigError::InvalidCommand {
                reason: format!("pipeline '{pipeline}' init node cannot be null"),
            });
        };
        self.running.change_init_node(pipeline, Some(next))?;
        self.debug_check();
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Batch entry point
    // -----------------------------------------------------------------------

    /// Applies one parsed plan command.
    pub fn apply(&mut self, command: &PlanCommand) -> Result<(), ReconfigError> {
        match command {
            PlanCommand::TableInit { pipeline, id } => self.insert_table(pipeline, id),
            PlanCommand::TableChange {
                pipeline,
                id,
                edge,
                next_id,
            } => self.change_table(pipeline, id, edge, next_id),
            PlanCommand::TableDelete { pipeline, id } => self.delete_table(pipeline, id),
            PlanCommand::CondInit { pipeline, id } => self.insert_conditional(pipeline, id),
            PlanCommand::CondChange {
                pipeline,
                id,
                branch,
                next_id,
            } => self.change_conditional(pipeline, id, *branch, next_id),
            PlanCommand::CondDelete { pipeline, id } => self.delete_conditional(pipeline, id),
            PlanCommand::FlexInit {
                pipeline,
                id,
                true_id,
                false_id,
            } => self.insert_flex(pipeline, id, true_id, false_id),
            PlanCommand::FlexChange {
                pipeline,
                id,
                branch,
                next_id,
            } => self.change_flex(pipeline, id, *branch, next_id),
            PlanCommand::FlexDelete { pipeline, id } => self.delete_flex(pipeline, id),
            PlanCommand::RegInit { id, size, bitwidth } => {
                self.insert_register_array(id, *size, *bitwidth)
            }
            PlanCommand::RegChange {
                id,
                change_type,
                value,
            } => self.change_register_array(id, *change_type, *value),
            PlanCommand::RegDelete { id } => self.delete_register_array(id),
            PlanCommand::Trigger { armed, number } => self.trigger(*armed, *number),
            PlanCommand::InitChange { pipeline, id } => self.change_init(pipeline, id),
        }
    }

    /// Stages `json` and applies `plan` command by command.
    ///
    /// The first failing command aborts the batch and its error is returned;
    /// commands already applied are **not** rolled back, so the running graph
    /// reflects the successful prefix.
    pub fn run_plan(&mut self, json: &str, plan: &str) -> Result<(), ReconfigError> {
        self.init_staged(json)?;
        let commands = parse_plan(plan)?;
        for (index, command) in commands.iter().enumerate() {
            self.apply(command).map_err(|err| {
                tracing::error!(index, error = %err, "plan aborted at failing command");
                err
            })?;
        }
        tracing::info!(commands = commands.len(), "plan applied");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    /// Prefix + duplicate validation for an insert command's identifier.
    fn check_insert_id(
        &self,
        id: &str,
        required: IdPrefix,
        what: &str,
    ) -> Result<String, ReconfigError> {
        let (prefix, actual_name) = split_id(id)?;
        if prefix != required {
            tracing::error!(id, what, "inserted id has the wrong prefix");
            return Err(ReconfigError::Prefix { id: id.to_string() });
        }
        self.registry.dup_check(id)?;
        Ok(actual_name.to_string())
    }

    /// Resolves an id that must name a node (the null id is not a node).
    fn resolve_node(&self, id: &str) -> Result<String, ReconfigError> {
        self.registry
            .resolve(id)?
            .ok_or_else(|| ReconfigError::InvalidCommand {
                reason: format!("'{}' does not name a node", crate::registry::NULL_ID),
            })
    }

    fn change_branch(
        &mut self,
        pipeline: &str,
        id: &str,
        branch: Branch,
        next_id: &str,
    ) -> Result<(), ReconfigError> {
        self.staged_required()?;
        let node = self.resolve_node(id)?;
        let next = self.registry.resolve(next_id)?;
        self.running
            .change_branch_next(pipeline, &node, branch, next)?;
        self.debug_check();
        Ok(())
    }

    fn staged_required(&self) -> Result<(), ReconfigError> {
        require_staged(&self.staged).map(|_| ())
    }

    /// Drops the registry binding after a successful delete; `old_` ids have
    /// no binding to drop.
    fn unbind_session_id(&mut self, id: &str) -> Result<(), ReconfigError> {
        match split_id(id)? {
            (IdPrefix::New | IdPrefix::Flx, _) => self.registry.unbind(id),
            (IdPrefix::Old, _) => Ok(()),
        }
    }

    fn debug_check(&self) {
        #[cfg(debug_assertions)]
        self.assert_consistency();
    }

    /// Verifies that every registered id maps to a name that exists in the
    /// running program, as a node or a register array.
    ///
    /// Only called in debug builds.
    #[cfg(debug_assertions)]
    fn assert_consistency(&self) {
        for (id, name) in self.registry.entries() {
            assert!(
                self.running.contains_name(name),
                "registry id {id:?} maps to {name:?} which is not in the running program"
            );
        }
    }
}

/// Free-standing so callers can keep a disjoint `&mut self.running` borrow.
fn require_staged(staged: &Option<Program>) -> Result<&Program, ReconfigError> {
    staged.as_ref().ok_or_else(|| {
        tracing::error!("mutation command issued with no staged program");
        ReconfigError::InvalidCommand {
            reason: "no staged program; initialize staging first".to_string(),
        }
    })
}
