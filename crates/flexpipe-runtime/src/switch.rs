//! The switch: per-context locking around reconfiguration sessions.
//!
//! Each context pairs its [`Context`] with a readers/writer lock and a
//! [`PacketGate`]. Packet traversal takes a gate ticket and the read lock,
//! so a traversal sees the graph as of the moment its lock was granted.
//! Mutation commands take the write lock; the commands that change the
//! shape of the graph under a traversal cursor (deletes, init retargeting,
//! and whole plans) open a quiescence window first.
//!
//! `std::sync::RwLock` is the right primitive here: packet threads are
//! plain OS threads and hold the read side only for the duration of one
//! traversal, so there is nothing to await.

use std::fs;
use std::path::Path;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use flexpipe_core::{program_from_json, Branch, Conditional, MatchTable, TableOutcome};

use crate::context::Context;
use crate::error::ReconfigError;
use crate::gate::PacketGate;

struct ContextCell {
    session: RwLock<Context>,
    gate: PacketGate,
}

/// A switch holding one or more independent reconfiguration contexts.
pub struct Switch {
    contexts: Vec<ContextCell>,
}

impl Switch {
    /// Creates a switch with `context_count` empty contexts.
    pub fn new(context_count: usize) -> Self {
        let contexts = (0..context_count)
            .map(|_| ContextCell {
                session: RwLock::new(Context::default()),
                gate: PacketGate::new(),
            })
            .collect();
        Switch { contexts }
    }

    /// Loads the initial running program of a context from JSON text.
    pub fn load_program(&self, context_id: usize, json: &str) -> Result<(), ReconfigError> {
        let program = program_from_json(json)?;
        let cell = self.cell(context_id)?;
        let _quiesce = cell.gate.pause();
        write_lock(&cell.session).replace_running(program);
        tracing::info!(context_id, "running program loaded");
        Ok(())
    }

    pub fn context_count(&self) -> usize {
        self.contexts.len()
    }

    // -----------------------------------------------------------------------
    // Controller commands (write side)
    // -----------------------------------------------------------------------

    pub fn init_staged(&self, context_id: usize, json: &str) -> Result<(), ReconfigError> {
        self.with_write(context_id, |ctx| ctx.init_staged(json))
    }

    pub fn insert_table(
        &self,
        context_id: usize,
        pipeline: &str,
        id: &str,
    ) -> Result<(), ReconfigError> {
        self.with_write(context_id, |ctx| ctx.insert_table(pipeline, id))
    }

    pub fn change_table(
        &self,
        context_id: usize,
        pipeline: &str,
        id: &str,
        edge: &str,
        next_id: &str,
    ) -> Result<(), ReconfigError> {
        self.with_write(context_id, |ctx| ctx.change_table(pipeline, id, edge, next_id))
    }

    pub fn delete_table(
        &self,
        context_id: usize,
        pipeline: &str,
        id: &str,
    ) -> Result<(), ReconfigError> {
        self.with_quiesced_write(context_id, |ctx| ctx.delete_table(pipeline, id))
    }

    pub fn insert_conditional(
        &self,
        context_id: usize,
        pipeline: &str,
        id: &str,
    ) -> Result<(), ReconfigError> {
        self.with_write(context_id, |ctx| ctx.insert_conditional(pipeline, id))
    }

    pub fn change_conditional(
        &self,
        context_id: usize,
        pipeline: &str,
        id: &str,
        branch: Branch,
        next_id: &str,
    ) -> Result<(), ReconfigError> {
        self.with_write(context_id, |ctx| {
            ctx.change_conditional(pipeline, id, branch, next_id)
        })
    }

    pub fn delete_conditional(
        &self,
        context_id: usize,
        pipeline: &str,
        id: &str,
    ) -> Result<(), ReconfigError> {
        self.with_quiesced_write(context_id, |ctx| ctx.delete_conditional(pipeline, id))
    }

    pub fn insert_flex(
        &self,
        context_id: usize,
        pipeline: &str,
        id: &str,
        true_id: &str,
        false_id: &str,
    ) -> Result<(), ReconfigError> {
        self.with_write(context_id, |ctx| {
            ctx.insert_flex(pipeline, id, true_id, false_id)
        })
    }

    pub fn change_flex(
        &self,
        context_id: usize,
        pipeline: &str,
        id: &str,
        branch: Branch,
        next_id: &str,
    ) -> Result<(), ReconfigError> {
        self.with_write(context_id, |ctx| ctx.change_flex(pipeline, id, branch, next_id))
    }

    pub fn delete_flex(
        &self,
        context_id: usize,
        pipeline: &str,
        id: &str,
    ) -> Result<(), ReconfigError> {
        self.with_quiesced_write(context_id, |ctx| ctx.delete_flex(pipeline, id))
    }

    pub fn insert_register_array(
        &self,
        context_id: usize,
        id: &str,
        size: usize,
        bitwidth: u32,
    ) -> Result<(), ReconfigError> {
        self.with_write(context_id, |ctx| ctx.insert_register_array(id, size, bitwidth))
    }

    pub fn change_register_array(
        &self,
        context_id: usize,
        id: &str,
        change_type: u32,
        value: u32,
    ) -> Result<(), ReconfigError> {
        self.with_write(context_id, |ctx| {
            ctx.change_register_array(id, change_type, value)
        })
    }

    pub fn delete_register_array(&self, context_id: usize, id: &str) -> Result<(), ReconfigError> {
        self.with_write(context_id, |ctx| ctx.delete_register_array(id))
    }

    pub fn trigger(
        &self,
        context_id: usize,
        armed: bool,
        number: Option<u32>,
    ) -> Result<(), ReconfigError> {
        self.with_write(context_id, |ctx| ctx.trigger(armed, number))
    }

    pub fn change_init(
        &self,
        context_id: usize,
        pipeline: &str,
        id: &str,
    ) -> Result<(), ReconfigError> {
        self.with_quiesced_write(context_id, |ctx| ctx.change_init(pipeline, id))
    }

    // -----------------------------------------------------------------------
    // Register state access
    // -----------------------------------------------------------------------

    pub fn register_read(
        &self,
        context_id: usize,
        name: &str,
        index: usize,
    ) -> Result<u64, ReconfigError> {
        let cell = self.cell(context_id)?;
        let ctx = read_lock(&cell.session);
        ctx.register_read(name, index)
    }

    pub fn register_write(
        &self,
        context_id: usize,
        name: &str,
        index: usize,
        value: u64,
    ) -> Result<(), ReconfigError> {
        self.with_write(context_id, |ctx| ctx.register_write(name, index, value))
    }

    pub fn register_reset(&self, context_id: usize, name: &str) -> Result<(), ReconfigError> {
        self.with_write(context_id, |ctx| ctx.register_reset(name))
    }

    // -----------------------------------------------------------------------
    // Batch entry points
    // -----------------------------------------------------------------------

    /// Stages `json` and applies `plan`, quiescing the context for the whole
    /// batch. First failure aborts; the applied prefix stays in force.
    pub fn runtime_reconfig(
        &self,
        context_id: usize,
        json: &str,
        plan: &str,
    ) -> Result<(), ReconfigError> {
        self.with_quiesced_write(context_id, |ctx| ctx.run_plan(json, plan))
    }

    /// File-level batch entry: opens both inputs, runs the plan, and on
    /// success snapshots the running graph to `<output>.new`.
    pub fn runtime_reconfig_files(
        &self,
        context_id: usize,
        json_path: &Path,
        plan_path: &Path,
        output_path: Option<&Path>,
    ) -> Result<(), ReconfigError> {
        let json = fs::read_to_string(json_path).map_err(|source| {
            tracing::error!(path = %json_path.display(), "JSON input file can't be opened");
            ReconfigError::OpenJsonFile {
                path: json_path.display().to_string(),
                source,
            }
        })?;
        let plan = fs::read_to_string(plan_path).map_err(|source| {
            tracing::error!(path = %plan_path.display(), "plan file can't be opened");
            ReconfigError::OpenPlanFile {
                path: plan_path.display().to_string(),
                source,
            }
        })?;

        self.runtime_reconfig(context_id, &json, &plan)?;

        if let Some(output_path) = output_path {
            let snapshot_path = format!("{}.new", output_path.display());
            let snapshot = self.snapshot(context_id)?;
            fs::write(&snapshot_path, snapshot).map_err(|source| {
                tracing::error!(path = %snapshot_path, "cannot open output file");
                ReconfigError::OpenOutputFile {
                    path: snapshot_path.clone(),
                    source,
                }
            })?;
        }
        Ok(())
    }

    /// Serializes a context's running graph in the pipeline JSON dialect.
    pub fn snapshot(&self, context_id: usize) -> Result<String, ReconfigError> {
        let cell = self.cell(context_id)?;
        let ctx = read_lock(&cell.session);
        ctx.running()
            .to_json_pretty()
            .map_err(|err| ReconfigError::InvalidCommand {
                reason: format!("snapshot serialization failed: {err}"),
            })
    }

    // -----------------------------------------------------------------------
    // Dataplane side (read locks)
    // -----------------------------------------------------------------------

    /// Traverses a pipeline the way one packet would, following table
    /// default edges and false conditional branches.
    pub fn walk_pipeline(
        &self,
        context_id: usize,
        pipeline: &str,
    ) -> Result<Vec<String>, ReconfigError> {
        self.walk_pipeline_with(
            context_id,
            pipeline,
            |_| TableOutcome::Default,
            |_| false,
        )
    }

    /// Traverses a pipeline with caller-provided steering for tables and
    /// conditionals. Holds a gate ticket and the read lock for the walk.
    pub fn walk_pipeline_with<T, C>(
        &self,
        context_id: usize,
        pipeline: &str,
        table_outcome: T,
        condition: C,
    ) -> Result<Vec<String>, ReconfigError>
    where
        T: FnMut(&MatchTable) -> TableOutcome,
        C: FnMut(&Conditional) -> bool,
    {
        let cell = self.cell(context_id)?;
        let _ticket = cell.gate.enter();
        let ctx = read_lock(&cell.session);
        let visited = ctx
            .running()
            .pipeline(pipeline)?
            .walk(table_outcome, condition)?;
        Ok(visited)
    }

    /// Runs a read-only closure against a context.
    pub fn with_read<R>(
        &self,
        context_id: usize,
        f: impl FnOnce(&Context) -> R,
    ) -> Result<R, ReconfigError> {
        let cell = self.cell(context_id)?;
        let ctx = read_lock(&cell.session);
        Ok(f(&ctx))
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn cell(&self, context_id: usize) -> Result<&ContextCell, ReconfigError> {
        self.contexts
            .get(context_id)
            .ok_or_else(|| ReconfigError::InvalidCommand {
                reason: format!("context {context_id} does not exist"),
            })
    }

    fn with_write<R>(
        &self,
        context_id: usize,
        f: impl FnOnce(&mut Context) -> Result<R, ReconfigError>,
    ) -> Result<R, ReconfigError> {
        let cell = self.cell(context_id)?;
        let mut ctx = write_lock(&cell.session);
        f(&mut ctx)
    }

    fn with_quiesced_write<R>(
        &self,
        context_id: usize,
        f: impl FnOnce(&mut Context) -> Result<R, ReconfigError>,
    ) -> Result<R, ReconfigError> {
        let cell = self.cell(context_id)?;
        let _quiesce = cell.gate.pause();
        let mut ctx = write_lock(&cell.session);
        f(&mut ctx)
    }
}

fn read_lock(lock: &RwLock<Context>) -> RwLockReadGuard<'_, Context> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write_lock(lock: &RwLock<Context>) -> RwLockWriteGuard<'_, Context> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}
