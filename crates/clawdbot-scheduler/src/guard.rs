//! Overlap protection.
//!
//! One run per command name at a time, shared by the scheduler and the
//! manual trigger path. The permit releases on drop, so a panicking job
//! still frees its slot.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// Tracks which commands are currently running.
#[derive(Clone, Default)]
pub struct OverlapGuard {
    running: Arc<Mutex<HashSet<String>>>,
}

impl OverlapGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to claim the slot for `command`. None means a run is in flight.
    pub fn try_acquire(&self, command: &str) -> Option<RunPermit> {
        let mut running = self.running.lock().ok()?;
        if !running.insert(command.to_string()) {
            return None;
        }
        Some(RunPermit {
            guard: self.clone(),
            command: command.to_string(),
        })
    }

    /// Claim the slot unconditionally. A forced run still registers as the
    /// holder so the next scheduled tick sees it and skips.
    pub fn acquire_forced(&self, command: &str) -> RunPermit {
        if let Ok(mut running) = self.running.lock() {
            running.insert(command.to_string());
        }
        RunPermit {
            guard: self.clone(),
            command: command.to_string(),
        }
    }

    pub fn is_running(&self, command: &str) -> bool {
        self.running
            .lock()
            .map(|r| r.contains(command))
            .unwrap_or(false)
    }

    fn release(&self, command: &str) {
        if let Ok(mut running) = self.running.lock() {
            running.remove(command);
        }
    }
}

/// RAII hold on a command slot.
pub struct RunPermit {
    guard: OverlapGuard,
    command: String,
}

impl Drop for RunPermit {
    fn drop(&mut self) {
        self.guard.release(&self.command);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_blocked_until_drop() {
        let guard = OverlapGuard::new();
        let permit = guard.try_acquire("property-cleanup").unwrap();
        assert!(guard.try_acquire("property-cleanup").is_none());
        // A different command is unaffected
        assert!(guard.try_acquire("daily-summary").is_some());

        drop(permit);
        assert!(guard.try_acquire("property-cleanup").is_some());
    }

    #[test]
    fn test_forced_acquire_registers_holder() {
        let guard = OverlapGuard::new();
        let _forced = guard.acquire_forced("system-maintenance");
        assert!(guard.is_running("system-maintenance"));
        assert!(guard.try_acquire("system-maintenance").is_none());
    }
}
