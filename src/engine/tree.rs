use bytes::Bytes;

use super::catalog::ProtocolId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    None,
    UInt(u64),
    Str(String),
    Bytes(Bytes),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldNode {
    pub protocol: ProtocolId,
    pub label: String,
    pub value: FieldValue,
    /// Absolute offset inside the top-level buffer.
    pub offset: usize,
    pub length: usize,
    pub parent: Option<NodeId>,
}

/// Flat arena of protocol and field nodes, in the order they were added.
#[derive(Debug, Default, Clone)]
pub struct FieldTree {
    nodes: Vec<FieldNode>,
}

impl FieldTree {
    pub fn push(&mut self, node: FieldNode) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(node);
        id
    }

    pub fn get(&self, id: NodeId) -> Option<&FieldNode> {
        self.nodes.get(id.0)
    }

    pub(crate) fn get_mut(&mut self, id: NodeId) -> Option<&mut FieldNode> {
        self.nodes.get_mut(id.0)
    }

    /// Drops every node added after the first `len`.
    pub(crate) fn truncate(&mut self, len: usize) {
        self.nodes.truncate(len);
    }

    pub fn nodes(&self) -> &[FieldNode] {
        &self.nodes
    }

    pub fn children(&self, parent: NodeId) -> impl Iterator<Item = (NodeId, &FieldNode)> {
        self.nodes
            .iter()
            .enumerate()
            .filter(move |(_, node)| node.parent == Some(parent))
            .map(|(idx, node)| (NodeId(idx), node))
    }

    pub fn roots(&self) -> impl Iterator<Item = (NodeId, &FieldNode)> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| node.parent.is_none())
            .map(|(idx, node)| (NodeId(idx), node))
    }

    /// First node carrying `label`.
    pub fn find(&self, label: &str) -> Option<&FieldNode> {
        self.nodes.iter().find(|node| node.label == label)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
