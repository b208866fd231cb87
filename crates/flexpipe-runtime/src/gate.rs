//! The packet quiescence gate.
//!
//! Structural graph changes (node deletion, init retargeting) must not run
//! while a packet holds a traversal cursor into the old shape. The gate
//! counts in-flight packets: [`PacketGate::enter`] admits a packet unless a
//! pause is in progress, and [`PacketGate::pause`] blocks new packets and
//! waits for the in-flight count to drain to zero. Both sides are RAII:
//! dropping the ticket retires the packet, dropping the guard reopens the
//! gate.

use std::sync::{Condvar, Mutex, PoisonError};

#[derive(Debug, Default)]
struct GateState {
    paused: bool,
    in_flight: usize,
}

/// Blocks new packet instances and drains in-flight ones on demand.
#[derive(Debug, Default)]
pub struct PacketGate {
    state: Mutex<GateState>,
    changed: Condvar,
}

/// Admission for one packet; retires on drop.
#[derive(Debug)]
pub struct PacketTicket<'a> {
    gate: &'a PacketGate,
}

/// Exclusive quiescence window; reopens the gate on drop.
#[derive(Debug)]
pub struct QuiesceGuard<'a> {
    gate: &'a PacketGate,
}

impl PacketGate {
    pub fn new() -> Self {
        PacketGate::default()
    }

    /// Admits one packet, blocking while a quiescence window is open.
    pub fn enter(&self) -> PacketTicket<'_> {
        let mut state = self.lock();
        while state.paused {
            state = self
                .changed
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        state.in_flight += 1;
        PacketTicket { gate: self }
    }

    /// Opens a quiescence window: blocks new packets, waits for the
    /// in-flight count to reach zero, and holds the gate shut until the
    /// returned guard is dropped.
    pub fn pause(&self) -> QuiesceGuard<'_> {
        let mut state = self.lock();
        // Only one quiescence window at a time; later pausers queue here.
        while state.paused {
            state = self
                .changed
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        state.paused = true;
        while state.in_flight > 0 {
            state = self
                .changed
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        QuiesceGuard { gate: self }
    }

    /// In-flight packet count at this instant.
    pub fn in_flight(&self) -> usize {
        self.lock().in_flight
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for PacketTicket<'_> {
    fn drop(&mut self) {
        let mut state = self.gate.lock();
        state.in_flight -= 1;
        if state.in_flight == 0 {
            self.gate.changed.notify_all();
        }
    }
}

impl Drop for QuiesceGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.gate.lock();
        state.paused = false;
        self.gate.changed.notify_all();
    }
}
