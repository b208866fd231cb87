//! The control-plane status facade.
//!
//! One function per reconfiguration primitive, in the shape the host status
//! space expects: an opaque session handle, a device target, and an integer
//! status. Success is `0`; failures are the taxonomy code shifted by
//! [`TARGET_STATUS_BASE`] into the target-specific status region.

use std::sync::Arc;

use flexpipe_core::Branch;

use crate::error::{ReconfigError, SUCCESS};
use crate::switch::Switch;

/// Base of the target-specific region of the host status space.
pub const TARGET_STATUS_BASE: i32 = 256;

/// Opaque controller session handle. The core serializes commands per
/// context, so the handle is carried for interface fidelity only.
pub type SessionHandle = u64;

/// A device-target descriptor: which device, which context within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceTarget {
    pub device_id: u64,
    pub context_id: usize,
}

/// Status-returning facade over one switch.
#[derive(Clone)]
pub struct ControlPlane {
    switch: Arc<Switch>,
}

impl ControlPlane {
    pub fn new(switch: Arc<Switch>) -> Self {
        ControlPlane { switch }
    }

    /// Lifts a command result into the host status space.
    fn status(result: Result<(), ReconfigError>) -> i32 {
        match result {
            Ok(()) => SUCCESS,
            Err(err) => {
                tracing::error!(code = err.code(), error = %err, "reconfig command failed");
                TARGET_STATUS_BASE + err.code()
            }
        }
    }

    pub fn init_staged(&self, _session: SessionHandle, tgt: DeviceTarget, json: &str) -> i32 {
        Self::status(self.switch.init_staged(tgt.context_id, json))
    }

    pub fn insert_table(
        &self,
        _session: SessionHandle,
        tgt: DeviceTarget,
        pipeline: &str,
        id: &str,
    ) -> i32 {
        Self::status(self.switch.insert_table(tgt.context_id, pipeline, id))
    }

    pub fn change_table(
        &self,
        _session: SessionHandle,
        tgt: DeviceTarget,
        pipeline: &str,
        id: &str,
        edge: &str,
        next_id: &str,
    ) -> i32 {
        Self::status(
            self.switch
                .change_table(tgt.context_id, pipeline, id, edge, next_id),
        )
    }

    pub fn delete_table(
        &self,
        _session: SessionHandle,
        tgt: DeviceTarget,
        pipeline: &str,
        id: &str,
    ) -> i32 {
        Self::status(self.switch.delete_table(tgt.context_id, pipeline, id))
    }

    pub fn insert_conditional(
        &self,
        _session: SessionHandle,
        tgt: DeviceTarget,
        pipeline: &str,
        id: &str,
    ) -> i32 {
        Self::status(self.switch.insert_conditional(tgt.context_id, pipeline, id))
    }

    pub fn change_conditional(
        &self,
        _session: SessionHandle,
        tgt: DeviceTarget,
        pipeline: &str,
        id: &str,
        true_or_false_next: bool,
        next_id: &str,
    ) -> i32 {
        Self::status(self.switch.change_conditional(
            tgt.context_id,
            pipeline,
            id,
            Branch::from_flag(true_or_false_next),
            next_id,
        ))
    }

    pub fn delete_conditional(
        &self,
        _session: SessionHandle,
        tgt: DeviceTarget,
        pipeline: &str,
        id: &str,
    ) -> i32 {
        Self::status(self.switch.delete_conditional(tgt.context_id, pipeline, id))
    }

    pub fn insert_flex(
        &self,
        _session: SessionHandle,
        tgt: DeviceTarget,
        pipeline: &str,
        id: &str,
        true_id: &str,
        false_id: &str,
    ) -> i32 {
        Self::status(
            self.switch
                .insert_flex(tgt.context_id, pipeline, id, true_id, false_id),
        )
    }

    pub fn change_flex(
        &self,
        _session: SessionHandle,
        tgt: DeviceTarget,
        pipeline: &str,
        id: &str,
        true_or_false_next: bool,
        next_id: &str,
    ) -> i32 {
        Self::status(self.switch.change_flex(
            tgt.context_id,
            pipeline,
            id,
            Branch::from_flag(true_or_false_next),
            next_id,
        ))
    }

    pub fn delete_flex(
        &self,
        _session: SessionHandle,
        tgt: DeviceTarget,
        pipeline: &str,
        id: &str,
    ) -> i32 {
        Self::status(self.switch.delete_flex(tgt.context_id, pipeline, id))
    }

    pub fn insert_register_array(
        &self,
        _session: SessionHandle,
        tgt: DeviceTarget,
        id: &str,
        size: u32,
        bitwidth: u32,
    ) -> i32 {
        Self::status(
            self.switch
                .insert_register_array(tgt.context_id, id, size as usize, bitwidth),
        )
    }

    pub fn change_register_array(
        &self,
        _session: SessionHandle,
        tgt: DeviceTarget,
        id: &str,
        change_type: u32,
        value: u32,
    ) -> i32 {
        Self::status(
            self.switch
                .change_register_array(tgt.context_id, id, change_type, value),
        )
    }

    pub fn delete_register_array(
        &self,
        _session: SessionHandle,
        tgt: DeviceTarget,
        id: &str,
    ) -> i32 {
        Self::status(self.switch.delete_register_array(tgt.context_id, id))
    }

    /// Negative trigger numbers address every flex node.
    pub fn trigger(
        &self,
        _session: SessionHandle,
        tgt: DeviceTarget,
        armed: bool,
        trigger_number: i32,
    ) -> i32 {
        let number = u32::try_from(trigger_number).ok();
        Self::status(self.switch.trigger(tgt.context_id, armed, number))
    }

    pub fn change_init(
        &self,
        _session: SessionHandle,
        tgt: DeviceTarget,
        pipeline: &str,
        id: &str,
    ) -> i32 {
        Self::status(self.switch.change_init(tgt.context_id, pipeline, id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RUNNING_JSON: &str = r#"{
        "pipelines": [{
            "name": "p",
            "init_node": "a",
            "tables": [
                {"name": "a", "base_default_next": "b"},
                {"name": "b", "base_default_next": null}
            ]
        }]
    }"#;

    fn control() -> (ControlPlane, DeviceTarget) {
        let switch = Arc::new(Switch::new(1));
        switch.load_program(0, RUNNING_JSON).unwrap();
        let tgt = DeviceTarget {
            device_id: 0,
            context_id: 0,
        };
        (ControlPlane::new(switch), tgt)
    }

    #[test]
    fn success_is_zero_and_failures_are_offset() {
        let (cp, tgt) = control();
        assert_eq!(cp.init_staged(0, tgt, "{}"), SUCCESS);
        // Prefix error is code 6 in the taxonomy.
        assert_eq!(
            cp.insert_table(0, tgt, "p", "bad_c"),
            TARGET_STATUS_BASE + 6
        );
    }

    #[test]
    fn negative_trigger_number_means_all() {
        let (cp, tgt) = control();
        assert_eq!(cp.init_staged(0, tgt, "{}"), SUCCESS);
        assert_eq!(cp.insert_flex(0, tgt, "p", "flx_f", "null", "old_b"), SUCCESS);
        assert_eq!(cp.trigger(0, tgt, true, -1), SUCCESS);
        assert_eq!(cp.trigger(0, tgt, false, 0), SUCCESS);
    }
}
