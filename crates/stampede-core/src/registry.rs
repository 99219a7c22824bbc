//! Node numbering for a wired device list.

use indexmap::IndexMap;

use crate::device::{Device, Pins};
use crate::error::{Error, Result};
use crate::mna::MnaSystem;
use crate::net::Net;
use crate::node::{Node, NodeId};

#[derive(Debug, Clone)]
struct Entry {
    nets: Vec<Net>,
    internal: usize,
    sources: usize,
    ground_reference: Option<usize>,
    grounded: bool,
}

/// Collects devices and their wiring, then numbers every node.
///
/// Nets map to nodes in order of first appearance. Ground is always node 0
/// and each device's internal nodes are numbered right after its posts, so
/// the same wiring always yields the same numbering.
#[derive(Debug, Default)]
pub struct NodeRegistry {
    entries: Vec<Entry>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number a whole device list in one go.
    pub fn number<'a, I>(devices: I) -> Result<Topology>
    where
        I: IntoIterator<Item = (&'a dyn Device, &'a [Net])>,
    {
        let mut registry = Self::new();
        for (device, nets) in devices {
            registry.add(device, nets)?;
        }
        Ok(registry.assign())
    }

    /// Register the next device. Rejects wiring that does not match the
    /// device's declared posts.
    pub fn add(&mut self, device: &dyn Device, nets: &[Net]) -> Result<()> {
        let index = self.entries.len();
        let posts = device.post_count();
        if posts == 0 {
            return Err(Error::MalformedDevice {
                index,
                device: device.name().to_string(),
                reason: "device declares no posts".to_string(),
            });
        }
        if nets.len() != posts {
            return Err(Error::MalformedDevice {
                index,
                device: device.name().to_string(),
                reason: format!("expected {posts} nets, got {}", nets.len()),
            });
        }
        self.entries.push(Entry {
            nets: nets.to_vec(),
            internal: device.internal_node_count(),
            sources: device.voltage_source_count(),
            ground_reference: device.ground_reference_post().filter(|p| *p < posts),
            grounded: (0..posts).any(|p| device.has_ground_connection(p)),
        });
        Ok(())
    }

    /// Net that stands in for ground when nothing is wired to it. Devices
    /// referenced internally to ground already tie the circuit down.
    fn implicit_ground(&self) -> Option<Net> {
        if self
            .entries
            .iter()
            .any(|e| e.grounded || e.nets.iter().any(Net::is_ground))
        {
            return None;
        }
        let adopted = self
            .entries
            .iter()
            .find_map(|e| e.ground_reference.map(|p| e.nets[p].clone()))
            .or_else(|| self.entries.first().map(|e| e.nets[0].clone()));
        if let Some(net) = &adopted {
            log::debug!("no post wired to ground, using net {net} as reference");
        }
        adopted
    }

    /// Assign node ids and voltage-source blocks.
    pub fn assign(self) -> Topology {
        let alias = self.implicit_ground();
        let mut nodes = vec![Node::external(NodeId::GROUND, Net::ground().name())];
        let mut nets: IndexMap<Net, NodeId> = IndexMap::new();
        let mut pins = Vec::with_capacity(self.entries.len());
        let mut vs_base = 0;

        for (index, entry) in self.entries.into_iter().enumerate() {
            let mut ids = Vec::with_capacity(entry.nets.len() + entry.internal);
            for net in entry.nets {
                let id = if net.is_ground() || alias.as_ref() == Some(&net) {
                    nets.entry(net).or_insert(NodeId::GROUND);
                    NodeId::GROUND
                } else if let Some(id) = nets.get(&net) {
                    *id
                } else {
                    let id = NodeId::new(nodes.len() as u32);
                    nodes.push(Node::external(id, net.name()));
                    nets.insert(net, id);
                    id
                };
                ids.push(id);
            }
            for _ in 0..entry.internal {
                let id = NodeId::new(nodes.len() as u32);
                nodes.push(Node::internal(id, index));
                ids.push(id);
            }
            pins.push(Pins::new(ids, vs_base, entry.sources));
            vs_base += entry.sources;
        }

        Topology {
            nodes,
            pins,
            num_vsources: vs_base,
            nets,
        }
    }
}

/// The numbered circuit: nodes, per-device pins and the net map.
#[derive(Debug, Clone, Default)]
pub struct Topology {
    nodes: Vec<Node>,
    pins: Vec<Pins>,
    num_vsources: usize,
    nets: IndexMap<Net, NodeId>,
}

impl Topology {
    /// Number of nodes excluding ground.
    pub fn num_nodes(&self) -> usize {
        self.nodes.len().saturating_sub(1)
    }

    pub fn num_vsources(&self) -> usize {
        self.num_vsources
    }

    /// Unknown count: non-ground nodes plus voltage sources.
    pub fn size(&self) -> usize {
        self.num_nodes() + self.num_vsources
    }

    /// All nodes, ground first.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.as_u32() as usize)
    }

    pub fn pins(&self) -> &[Pins] {
        &self.pins
    }

    /// Hand the per-device pins to the caller.
    pub fn take_pins(&mut self) -> Vec<Pins> {
        std::mem::take(&mut self.pins)
    }

    pub fn node_of(&self, net: &Net) -> Result<NodeId> {
        if net.is_ground() {
            return Ok(NodeId::GROUND);
        }
        self.nets
            .get(net)
            .copied()
            .ok_or_else(|| Error::UnknownNet(net.to_string()))
    }

    pub fn nets(&self) -> impl Iterator<Item = (&Net, NodeId)> {
        self.nets.iter().map(|(net, id)| (net, *id))
    }

    /// Copy the voltage-source flags recorded by a stamp pass.
    pub fn mark_constrained(&mut self, mna: &MnaSystem) {
        for node in self.nodes.iter_mut() {
            let constrained = mna.is_constrained(node.id());
            node.set_voltage_source_constrained(constrained);
        }
    }

    /// Non-internal nodes without a conductive path to ground.
    ///
    /// `devices` must be in the order they were registered; `pins` may be
    /// the ones taken out with [`Topology::take_pins`].
    pub fn floating_nodes<'a, I>(&self, devices: I, pins: &[Pins]) -> Vec<NodeId>
    where
        I: IntoIterator<Item = &'a dyn Device>,
        I::IntoIter: Clone,
    {
        let devices = devices.into_iter();
        let mut closure = vec![false; self.nodes.len()];
        if let Some(g) = closure.first_mut() {
            *g = true;
        }
        let mut changed = true;
        while changed {
            changed = false;
            for (device, pins) in devices.clone().zip(pins) {
                let posts = device.post_count().min(pins.len());
                for j in 0..posts {
                    let nj = pins.node(j).as_u32() as usize;
                    if !closure[nj] {
                        if device.has_ground_connection(j) {
                            closure[nj] = true;
                            changed = true;
                        }
                        continue;
                    }
                    for k in 0..posts {
                        if j == k || !device.connection(j, k) {
                            continue;
                        }
                        let nk = pins.node(k).as_u32() as usize;
                        if !closure[nk] {
                            closure[nk] = true;
                            changed = true;
                        }
                    }
                }
            }
        }
        self.nodes
            .iter()
            .filter(|n| !n.is_internal() && !closure[n.id().as_u32() as usize])
            .map(Node::id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Blob {
        posts: usize,
        internal: usize,
        sources: usize,
        linked: bool,
        grounded_post: Option<usize>,
        reference: Option<usize>,
    }

    impl Blob {
        fn two_terminal() -> Self {
            Self {
                posts: 2,
                internal: 0,
                sources: 0,
                linked: true,
                grounded_post: None,
                reference: None,
            }
        }
    }

    impl Device for Blob {
        fn name(&self) -> &str {
            "blob"
        }
        fn post_count(&self) -> usize {
            self.posts
        }
        fn internal_node_count(&self) -> usize {
            self.internal
        }
        fn voltage_source_count(&self) -> usize {
            self.sources
        }
        fn reset(&mut self) {}
        fn connection(&self, _a: usize, _b: usize) -> bool {
            self.linked
        }
        fn has_ground_connection(&self, post: usize) -> bool {
            self.grounded_post == Some(post)
        }
        fn ground_reference_post(&self) -> Option<usize> {
            self.reference
        }
    }

    fn nets(names: &[&str]) -> Vec<Net> {
        names.iter().map(|n| Net::from(*n)).collect()
    }

    #[test]
    fn test_first_appearance_numbering() {
        let a = Blob::two_terminal();
        let b = Blob {
            internal: 1,
            sources: 1,
            ..Blob::two_terminal()
        };
        let wa = nets(&["in", "gnd"]);
        let wb = nets(&["in", "out"]);
        let topo = NodeRegistry::number([(&a as &dyn Device, &wa[..]), (&b, &wb[..])]).unwrap();

        assert_eq!(topo.num_nodes(), 3);
        assert_eq!(topo.num_vsources(), 1);
        assert_eq!(topo.size(), 4);
        assert_eq!(topo.node_of(&Net::from("in")).unwrap(), NodeId::new(1));
        assert_eq!(topo.node_of(&Net::from("out")).unwrap(), NodeId::new(2));
        // internal node follows the device's posts
        assert_eq!(topo.pins()[1].node(2), NodeId::new(3));
        assert!(topo.nodes()[3].is_internal());
        assert_eq!(topo.pins()[1].source(0).0, 0);
    }

    #[test]
    fn test_zero_volt_link_keeps_nets_apart() {
        let short = Blob {
            sources: 1,
            ..Blob::two_terminal()
        };
        let load = Blob::two_terminal();
        let ws = nets(&["a", "b"]);
        let wl = nets(&["b", "gnd"]);
        let topo =
            NodeRegistry::number([(&short as &dyn Device, &ws[..]), (&load, &wl[..])]).unwrap();

        assert_eq!(topo.num_nodes(), 2);
        assert_eq!(topo.num_vsources(), 1);
        assert_ne!(
            topo.node_of(&Net::from("a")).unwrap(),
            topo.node_of(&Net::from("b")).unwrap()
        );
    }

    #[test]
    fn test_ground_aliases_share_node_zero() {
        let a = Blob::two_terminal();
        let wa = nets(&["0", "GND"]);
        let topo = NodeRegistry::number([(&a as &dyn Device, &wa[..])]).unwrap();
        assert_eq!(topo.num_nodes(), 0);
        assert_eq!(topo.pins()[0].node(0), NodeId::GROUND);
        assert_eq!(topo.pins()[0].node(1), NodeId::GROUND);
    }

    #[test]
    fn test_numbering_is_stable() {
        let a = Blob::two_terminal();
        let wa = nets(&["x", "gnd"]);
        let first = NodeRegistry::number([(&a as &dyn Device, &wa[..])]).unwrap();
        let second = NodeRegistry::number([(&a as &dyn Device, &wa[..])]).unwrap();
        assert_eq!(first.pins(), second.pins());
    }

    #[test]
    fn test_wiring_length_mismatch_rejected() {
        let a = Blob::two_terminal();
        let wa = nets(&["x"]);
        let err = NodeRegistry::number([(&a as &dyn Device, &wa[..])]).unwrap_err();
        assert!(matches!(err, Error::MalformedDevice { index: 0, .. }));
    }

    #[test]
    fn test_zero_posts_rejected() {
        let a = Blob {
            posts: 0,
            ..Blob::two_terminal()
        };
        let mut registry = NodeRegistry::new();
        assert!(registry.add(&a, &[]).is_err());
    }

    #[test]
    fn test_implicit_ground_from_reference_post() {
        let r = Blob::two_terminal();
        let src = Blob {
            sources: 1,
            reference: Some(1),
            ..Blob::two_terminal()
        };
        let wr = nets(&["a", "b"]);
        let ws = nets(&["a", "b"]);
        let topo = NodeRegistry::number([(&r as &dyn Device, &wr[..]), (&src, &ws[..])]).unwrap();
        assert_eq!(topo.pins()[0].node(1), NodeId::GROUND);
        assert_eq!(topo.num_nodes(), 1);
    }

    #[test]
    fn test_internally_grounded_device_needs_no_alias() {
        let gate = Blob {
            linked: false,
            grounded_post: Some(1),
            ..Blob::two_terminal()
        };
        let w = nets(&["in", "out"]);
        let topo = NodeRegistry::number([(&gate as &dyn Device, &w[..])]).unwrap();
        assert_eq!(topo.num_nodes(), 2);
        assert_eq!(topo.node_of(&Net::from("in")).unwrap(), NodeId::new(1));
    }

    #[test]
    fn test_floating_nodes() {
        let linked = Blob::two_terminal();
        let open = Blob {
            linked: false,
            ..Blob::two_terminal()
        };
        let wl = nets(&["a", "gnd"]);
        let wo = nets(&["a", "b"]);
        let devices: Vec<&dyn Device> = vec![&linked, &open];
        let topo =
            NodeRegistry::number([(devices[0], &wl[..]), (devices[1], &wo[..])]).unwrap();
        let floating = topo.floating_nodes(devices.iter().copied(), topo.pins());
        assert_eq!(floating, vec![topo.node_of(&Net::from("b")).unwrap()]);
    }

    #[test]
    fn test_ground_connection_closes_node() {
        let gate = Blob {
            linked: false,
            grounded_post: Some(1),
            ..Blob::two_terminal()
        };
        let w = nets(&["in", "out"]);
        let other = Blob::two_terminal();
        let wo = nets(&["in", "gnd"]);
        let devices: Vec<&dyn Device> = vec![&gate, &other];
        let topo = NodeRegistry::number([(devices[0], &w[..]), (devices[1], &wo[..])]).unwrap();
        assert!(topo.floating_nodes(devices.iter().copied(), topo.pins()).is_empty());
    }
}
