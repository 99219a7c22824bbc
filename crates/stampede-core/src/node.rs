//! Node representation for the numbered circuit.

use std::fmt;

/// Unique identifier for a node in the analyzed circuit.
///
/// Ids are contiguous: `0` is ground and `1..=n` map onto matrix rows
/// `0..n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    /// The ground node (node 0).
    pub const GROUND: NodeId = NodeId(0);

    /// Create a new NodeId from a raw value.
    pub fn new(id: u32) -> Self {
        NodeId(id)
    }

    /// Get the raw node ID value.
    pub fn as_u32(self) -> u32 {
        self.0
    }

    /// Check if this is the ground node.
    pub fn is_ground(self) -> bool {
        self.0 == 0
    }

    /// Matrix row of this node, `None` for ground.
    pub fn index(self) -> Option<usize> {
        if self.is_ground() {
            None
        } else {
            Some((self.0 - 1) as usize)
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_ground() {
            write!(f, "GND")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// A node in the numbered circuit.
#[derive(Debug, Clone)]
pub struct Node {
    id: NodeId,
    /// Net label for post nodes; internal nodes have none.
    net: Option<String>,
    /// Owning device index for internal nodes.
    owner: Option<usize>,
    voltage_source_constrained: bool,
}

impl Node {
    /// Create a node attached to an external net.
    pub fn external(id: NodeId, net: impl Into<String>) -> Self {
        Self {
            id,
            net: Some(net.into()),
            owner: None,
            voltage_source_constrained: false,
        }
    }

    /// Create a hidden node owned by one device.
    pub fn internal(id: NodeId, owner: usize) -> Self {
        Self {
            id,
            net: None,
            owner: Some(owner),
            voltage_source_constrained: false,
        }
    }

    /// Get the node's ID.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Net label, if this node is reachable from outside a device.
    pub fn net(&self) -> Option<&str> {
        self.net.as_deref()
    }

    /// Device index owning this node, for internal nodes.
    pub fn owner(&self) -> Option<usize> {
        self.owner
    }

    /// Check if this is the ground node.
    pub fn is_ground(&self) -> bool {
        self.id.is_ground()
    }

    pub fn is_internal(&self) -> bool {
        self.owner.is_some()
    }

    /// True if some device pins this node through a voltage source.
    pub fn is_voltage_source_constrained(&self) -> bool {
        self.voltage_source_constrained
    }

    pub(crate) fn set_voltage_source_constrained(&mut self, constrained: bool) {
        self.voltage_source_constrained = constrained;
    }

    /// Human-readable label used in diagnostics.
    pub fn label(&self) -> String {
        match (&self.net, self.owner) {
            (Some(net), _) => net.clone(),
            (None, Some(owner)) => format!("internal of device #{owner}"),
            (None, None) => self.id.to_string(),
        }
    }
}
