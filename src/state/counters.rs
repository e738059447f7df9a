use std::collections::HashMap;

use crate::engine::catalog::ProtocolId;
use crate::engine::dispatch::{DissectOutcome, DissectStatus};

/// Session-scoped totals folded from per-packet outcomes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionCounters {
    packets: u64,
    malformed_packets: u64,
    recursion_limited: u64,
    bytes: u64,
    /// Every occurrence, so a protocol seen twice in one packet counts twice.
    occurrences: HashMap<ProtocolId, u64>,
    /// Packets in which the protocol appeared at least once.
    packets_by_protocol: HashMap<ProtocolId, u64>,
}

impl SessionCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fold(&mut self, outcome: &DissectOutcome) {
        self.packets += 1;
        self.bytes += outcome.consumed as u64;

        match outcome.status {
            DissectStatus::Ok(_) => {}
            DissectStatus::Malformed { .. } => self.malformed_packets += 1,
            DissectStatus::RecursionLimitExceeded => self.recursion_limited += 1,
        }

        for (id, count) in &outcome.protocol_counts {
            *self.occurrences.entry(*id).or_insert(0) += count;
            *self.packets_by_protocol.entry(*id).or_insert(0) += 1;
        }
    }

    /// Combines totals from another worker.
    pub fn merge(&mut self, other: &SessionCounters) {
        self.packets += other.packets;
        self.malformed_packets += other.malformed_packets;
        self.recursion_limited += other.recursion_limited;
        self.bytes += other.bytes;
        for (id, count) in &other.occurrences {
            *self.occurrences.entry(*id).or_insert(0) += count;
        }
        for (id, count) in &other.packets_by_protocol {
            *self.packets_by_protocol.entry(*id).or_insert(0) += count;
        }
    }

    pub fn packets(&self) -> u64 {
        self.packets
    }

    pub fn malformed_packets(&self) -> u64 {
        self.malformed_packets
    }

    pub fn recursion_limited(&self) -> u64 {
        self.recursion_limited
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    pub fn occurrences(&self, id: ProtocolId) -> u64 {
        self.occurrences.get(&id).copied().unwrap_or(0)
    }

    pub fn packets_with(&self, id: ProtocolId) -> u64 {
        self.packets_by_protocol.get(&id).copied().unwrap_or(0)
    }

    pub fn protocols(&self) -> impl Iterator<Item = (ProtocolId, u64)> + '_ {
        self.packets_by_protocol
            .iter()
            .map(|(id, count)| (*id, *count))
    }
}
