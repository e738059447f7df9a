//! Ordered heuristic fallback chains.

use std::sync::atomic::{AtomicBool, Ordering};

use super::catalog::ProtocolId;
use super::error::RegistrationError;
use super::registry::Handler;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeuristicOptions {
    /// Higher priorities are tried first; equal priorities keep registration order.
    pub priority: i32,
    pub enabled: bool,
}

impl Default for HeuristicOptions {
    fn default() -> Self {
        Self {
            priority: 0,
            enabled: true,
        }
    }
}

#[derive(Debug)]
pub struct HeuristicEntry {
    handler: Handler,
    priority: i32,
    enabled: AtomicBool,
}

impl HeuristicEntry {
    pub fn protocol(&self) -> ProtocolId {
        self.handler.id()
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }
}

#[derive(Debug)]
pub struct HeuristicChain {
    anchor: String,
    entries: Vec<HeuristicEntry>,
}

impl HeuristicChain {
    pub(crate) fn new(anchor: &str) -> Self {
        Self {
            anchor: anchor.to_string(),
            entries: Vec::new(),
        }
    }

    pub(crate) fn push(
        &mut self,
        handler: Handler,
        options: HeuristicOptions,
    ) -> Result<(), RegistrationError> {
        if self.position(handler.id()).is_some() {
            return Err(RegistrationError::DuplicateHeuristic {
                anchor: self.anchor.clone(),
                protocol: handler.id(),
            });
        }

        let at = self
            .entries
            .iter()
            .position(|entry| entry.priority < options.priority)
            .unwrap_or(self.entries.len());

        self.entries.insert(
            at,
            HeuristicEntry {
                handler,
                priority: options.priority,
                enabled: AtomicBool::new(options.enabled),
            },
        );
        Ok(())
    }

    pub fn anchor(&self) -> &str {
        &self.anchor
    }

    /// Enabled handlers in the order they are tried.
    pub fn candidates(&self) -> impl Iterator<Item = &Handler> {
        self.entries
            .iter()
            .filter(|entry| entry.is_enabled())
            .map(|entry| &entry.handler)
    }

    pub fn entries(&self) -> &[HeuristicEntry] {
        &self.entries
    }

    /// Toggles an entry without removing its registration. Returns `false`
    /// if `protocol` has no heuristic on this chain.
    pub fn set_enabled(&self, protocol: ProtocolId, enabled: bool) -> bool {
        match self.position(protocol) {
            Some(idx) => {
                self.entries[idx].enabled.store(enabled, Ordering::Relaxed);
                true
            }
            None => false,
        }
    }

    pub fn is_enabled(&self, protocol: ProtocolId) -> Option<bool> {
        self.position(protocol)
            .map(|idx| self.entries[idx].is_enabled())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position(&self, protocol: ProtocolId) -> Option<usize> {
        self.entries
            .iter()
            .position(|entry| entry.handler.id() == protocol)
    }
}
