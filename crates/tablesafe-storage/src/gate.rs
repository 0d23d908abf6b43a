//! Single-writer gate: `Idle -> Applying -> Idle`.
//!
//! Concurrent attempts fail fast instead of queueing.

use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Applying,
}

#[derive(Debug, Default)]
pub struct SessionGate {
    applying: AtomicBool,
}

impl SessionGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter `Applying`. `None` when another operation holds the gate.
    pub fn try_enter(&self) -> Option<GateGuard<'_>> {
        self.applying
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| GateGuard { gate: self })
    }

    pub fn state(&self) -> SessionState {
        if self.applying.load(Ordering::Acquire) {
            SessionState::Applying
        } else {
            SessionState::Idle
        }
    }
}

/// Returns the gate to `Idle` on drop, including on early return or panic.
#[derive(Debug)]
pub struct GateGuard<'a> {
    gate: &'a SessionGate,
}

impl Drop for GateGuard<'_> {
    fn drop(&mut self) {
        self.gate.applying.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_entry_is_refused_until_release() {
        let gate = SessionGate::new();
        let guard = gate.try_enter().unwrap();
        assert_eq!(gate.state(), SessionState::Applying);
        assert!(gate.try_enter().is_none());
        drop(guard);
        assert_eq!(gate.state(), SessionState::Idle);
        assert!(gate.try_enter().is_some());
    }
}
