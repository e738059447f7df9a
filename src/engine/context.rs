use std::collections::HashMap;
use std::net::IpAddr;

use smallvec::SmallVec;

use super::catalog::ProtocolId;
use super::dispatch::{DispatchEngine, DissectOutcome, DissectStatus};
use super::error::DissectError;
use super::registry::{HandlerRegistry, Key};
use super::tree::{FieldNode, FieldTree, FieldValue, NodeId};
use crate::packet::ByteView;
use crate::state::ConversationKey;

/// Ceiling on nested dispatch calls for one top-level buffer.
pub const MAX_DISSECT_DEPTH: u32 = 500;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DissectMode {
    /// Full dissection: every handler invocation and field lands in a [`FieldTree`].
    #[default]
    Tree,
    /// Counting pre-scan: protocol counters only, no tree.
    Count,
}

#[derive(Debug, Clone)]
pub struct DispatchConfig {
    pub mode: DissectMode,
    pub max_depth: u32,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            mode: DissectMode::Tree,
            max_depth: MAX_DISSECT_DEPTH,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedMarker {
    pub protocol: ProtocolId,
    pub reason: String,
}

/// Where a context stood before a handler ran; see [`Context::rollback`].
#[derive(Debug, Clone)]
pub(crate) struct Checkpoint {
    layers: usize,
    summary: usize,
    malformed: usize,
    tree: usize,
    current_node: Option<NodeId>,
    conversation_key: Option<ConversationKey>,
    addresses: Option<(IpAddr, IpAddr)>,
}

/// Per-buffer state threaded through every handler call.
///
/// A context is owned by exactly one dissection call; handlers reach back
/// into the engine through [`Context::dispatch`] and friends.
pub struct Context<'e> {
    engine: &'e DispatchEngine,
    mode: DissectMode,
    pub(crate) depth: u32,
    pub(crate) recursion_limited: bool,
    protocol_counts: HashMap<ProtocolId, u64>,
    layers: SmallVec<[ProtocolId; 8]>,
    conversation_key: Option<ConversationKey>,
    addresses: Option<(IpAddr, IpAddr)>,
    summary: Vec<String>,
    malformed: Vec<MalformedMarker>,
    tree: Option<FieldTree>,
    current_node: Option<NodeId>,
}

impl<'e> Context<'e> {
    pub(crate) fn new(engine: &'e DispatchEngine, mode: DissectMode) -> Self {
        Self {
            engine,
            mode,
            depth: 0,
            recursion_limited: false,
            protocol_counts: HashMap::new(),
            layers: SmallVec::new(),
            conversation_key: None,
            addresses: None,
            summary: Vec::new(),
            malformed: Vec::new(),
            tree: (mode == DissectMode::Tree).then(FieldTree::default),
            current_node: None,
        }
    }

    pub fn mode(&self) -> DissectMode {
        self.mode
    }

    pub fn is_building_tree(&self) -> bool {
        self.tree.is_some()
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn registry(&self) -> &'e HandlerRegistry {
        self.engine.registry()
    }

    /// Counts one occurrence of `id` and appends it to the protocol stack.
    pub fn note_protocol(&mut self, id: ProtocolId) {
        *self.protocol_counts.entry(id).or_insert(0) += 1;
        self.layers.push(id);
    }

    pub fn protocol_counts(&self) -> &HashMap<ProtocolId, u64> {
        &self.protocol_counts
    }

    pub fn protocol_count(&self, id: ProtocolId) -> u64 {
        self.protocol_counts.get(&id).copied().unwrap_or(0)
    }

    /// Protocols in invocation order.
    pub fn layers(&self) -> &[ProtocolId] {
        &self.layers
    }

    pub fn conversation_key(&self) -> Option<&ConversationKey> {
        self.conversation_key.as_ref()
    }

    pub fn set_conversation_key(&mut self, key: ConversationKey) {
        self.conversation_key = Some(key);
    }

    /// Network-layer endpoints, left by the network handler for transports.
    pub fn addresses(&self) -> Option<(IpAddr, IpAddr)> {
        self.addresses
    }

    pub fn set_addresses(&mut self, src: IpAddr, dst: IpAddr) {
        self.addresses = Some((src, dst));
    }

    pub fn append_summary(&mut self, line: impl Into<String>) {
        self.summary.push(line.into());
    }

    pub fn summary(&self) -> &[String] {
        &self.summary
    }

    pub fn malformed(&self) -> &[MalformedMarker] {
        &self.malformed
    }

    pub fn mark_malformed(&mut self, protocol: ProtocolId, reason: impl Into<String>) {
        let reason = reason.into();
        let name = self
            .registry()
            .catalog()
            .short_name(protocol)
            .unwrap_or("unknown");
        self.summary
            .push(format!("[Malformed Packet: {}] {}", name, reason));

        let parent = self.current_node;
        if let Some(tree) = self.tree.as_mut() {
            tree.push(FieldNode {
                protocol,
                label: "malformed".to_string(),
                value: FieldValue::Str(reason.clone()),
                offset: 0,
                length: 0,
                parent,
            });
        }

        self.malformed.push(MalformedMarker { protocol, reason });
    }

    /// Adds a field under the protocol node of the running handler. Does
    /// nothing in counting mode.
    pub fn add_field(
        &mut self,
        view: &ByteView,
        rel_offset: usize,
        len: usize,
        label: &str,
        value: FieldValue,
    ) {
        let Some(parent) = self.current_node else {
            return;
        };
        let Some(tree) = self.tree.as_mut() else {
            return;
        };
        let Some(protocol) = tree.get(parent).map(|node| node.protocol) else {
            return;
        };

        tree.push(FieldNode {
            protocol,
            label: label.to_string(),
            value,
            offset: view.offset() + rel_offset,
            length: len,
            parent: Some(parent),
        });
    }

    pub fn tree(&self) -> Option<&FieldTree> {
        self.tree.as_ref()
    }

    pub fn dispatch(
        &mut self,
        table: &str,
        key: impl Into<Key>,
        view: &ByteView,
    ) -> Result<usize, DissectError> {
        let engine = self.engine;
        engine.dispatch(table, key, view, self)
    }

    /// Exact lookup only; `None` when the key is unbound or its handler
    /// rejects the data.
    pub fn try_table(
        &mut self,
        table: &str,
        key: impl Into<Key>,
        view: &ByteView,
    ) -> Result<Option<usize>, DissectError> {
        let engine = self.engine;
        engine.try_table(table, key, view, self)
    }

    pub fn try_heuristic(
        &mut self,
        anchor: &str,
        view: &ByteView,
    ) -> Result<Option<usize>, DissectError> {
        let engine = self.engine;
        engine.try_heuristic(anchor, view, self)
    }

    pub fn call_data(&mut self, view: &ByteView) -> Result<usize, DissectError> {
        let engine = self.engine;
        engine.call_data(view, self)
    }

    pub fn call_named(
        &mut self,
        name: &str,
        view: &ByteView,
    ) -> Result<Option<usize>, DissectError> {
        let engine = self.engine;
        engine.call_named(name, view, self)
    }

    pub(crate) fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            layers: self.layers.len(),
            summary: self.summary.len(),
            malformed: self.malformed.len(),
            tree: self.tree.as_ref().map_or(0, FieldTree::len),
            current_node: self.current_node,
            conversation_key: self.conversation_key,
            addresses: self.addresses,
        }
    }

    /// Undoes everything recorded since `checkpoint` was taken.
    pub(crate) fn rollback(&mut self, checkpoint: Checkpoint) {
        while self.layers.len() > checkpoint.layers {
            let Some(id) = self.layers.pop() else {
                break;
            };
            if let Some(count) = self.protocol_counts.get_mut(&id) {
                *count -= 1;
                if *count == 0 {
                    self.protocol_counts.remove(&id);
                }
            }
        }

        self.summary.truncate(checkpoint.summary);
        self.malformed.truncate(checkpoint.malformed);
        if let Some(tree) = self.tree.as_mut() {
            tree.truncate(checkpoint.tree);
        }
        self.current_node = checkpoint.current_node;
        self.conversation_key = checkpoint.conversation_key;
        self.addresses = checkpoint.addresses;
    }

    /// Opens the protocol node for a handler about to run. Returns the node
    /// to restore once it finishes.
    pub(crate) fn open_protocol_node(
        &mut self,
        protocol: ProtocolId,
        view: &ByteView,
    ) -> Option<NodeId> {
        let parent = self.current_node;
        let engine = self.engine;
        if let Some(tree) = self.tree.as_mut() {
            let label = engine
                .registry()
                .catalog()
                .short_name(protocol)
                .unwrap_or("unknown")
                .to_string();
            let node = tree.push(FieldNode {
                protocol,
                label,
                value: FieldValue::None,
                offset: view.offset(),
                length: 0,
                parent,
            });
            self.current_node = Some(node);
        }
        parent
    }

    pub(crate) fn close_protocol_node(&mut self, parent: Option<NodeId>, length: usize) {
        if let (Some(tree), Some(current)) = (self.tree.as_mut(), self.current_node)
            && let Some(node) = tree.get_mut(current)
        {
            node.length = length;
        }
        self.current_node = parent;
    }

    pub(crate) fn into_outcome(
        self,
        view: &ByteView,
        result: Result<usize, DissectError>,
    ) -> DissectOutcome {
        let (consumed, status) = match result {
            Ok(consumed) => {
                let status = if self.recursion_limited {
                    DissectStatus::RecursionLimitExceeded
                } else if let Some(marker) = self.malformed.first() {
                    DissectStatus::Malformed {
                        protocol_id: marker.protocol,
                        reason: marker.reason.clone(),
                    }
                } else {
                    DissectStatus::Ok(consumed)
                };
                (consumed, status)
            }
            // `DispatchEngine::dispatch` turns every other handler error
            // into a malformed marker before returning.
            Err(_) => (
                view.remaining_captured(),
                DissectStatus::RecursionLimitExceeded,
            ),
        };

        DissectOutcome {
            status,
            consumed,
            protocol_counts: self.protocol_counts,
            layers: self.layers.into_vec(),
            summary: self.summary,
            malformed: self.malformed,
            conversation_key: self.conversation_key,
            tree: self.tree,
        }
    }
}
