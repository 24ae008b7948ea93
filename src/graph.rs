/*!

  Read-only analyses built from a [Circuit].

*/

use crate::circuit::Circuit;
#[cfg(feature = "graph")]
use crate::circuit::Connection;
use crate::error::{Error, Result};
use crate::gate::{GateId, InputSlot};
#[cfg(feature = "graph")]
use petgraph::graph::DiGraph;
use std::collections::{HashMap, HashSet};

/// A common trait of analyses than can be performed on a circuit.
/// An analysis becomes stale when the circuit is modified.
pub trait Analysis<'a>
where
    Self: Sized + 'a,
{
    /// Construct the analysis to the current state of the circuit.
    fn build(circuit: &'a Circuit) -> Result<Self>;
}

/// A table that maps each gate to the gates it drives
#[derive(Debug)]
pub struct FanOutTable<'a> {
    // A reference to the underlying circuit
    circuit: &'a Circuit,
    // Maps a gate to its consumers, one entry per connection
    fan_out: HashMap<GateId, Vec<GateId>>,
}

impl FanOutTable<'_> {
    /// Returns an iterator to the gates that read `gate`.
    pub fn get_users(&self, gate: GateId) -> impl Iterator<Item = GateId> {
        self.fan_out
            .get(&gate)
            .into_iter()
            .flat_map(|users| users.iter().copied())
    }

    /// Returns `true` if the gate drives at least one other gate
    pub fn has_uses(&self, gate: GateId) -> bool {
        self.fan_out.get(&gate).is_some_and(|users| !users.is_empty())
    }

    /// Returns the gates that drive nothing, i.e. the circuit outputs
    pub fn sinks(&self) -> impl Iterator<Item = GateId> {
        self.circuit.gates().filter(|g| !self.has_uses(*g))
    }
}

impl<'a> Analysis<'a> for FanOutTable<'a> {
    fn build(circuit: &'a Circuit) -> Result<Self> {
        let mut fan_out: HashMap<GateId, Vec<GateId>> = HashMap::new();
        for c in circuit.connections() {
            fan_out.entry(c.producer).or_default().push(c.consumer);
        }
        Ok(FanOutTable {
            circuit,
            fan_out,
        })
    }
}

/// The logic depth of every gate, computed from the structure alone.
///
/// Unlike evaluation, this does not need every input to be bound: signal and
/// unbound inputs both count as depth 0 sources. A gate with inputs sits one
/// level above its deepest producer; a gate without inputs is at depth 0.
/// Errors if the circuit contains a cycle.
#[derive(Debug)]
pub struct LogicDepth<'a> {
    // A reference to the underlying circuit
    _circuit: &'a Circuit,
    // The depth of each gate
    depth: HashMap<GateId, usize>,
    /// The maximum depth of the circuit
    max_depth: usize,
}

impl LogicDepth<'_> {
    /// Returns the logic depth of a gate.
    pub fn get_depth(&self, gate: GateId) -> Option<usize> {
        self.depth.get(&gate).copied()
    }

    /// Returns the maximum logic depth of the circuit.
    pub fn get_max_depth(&self) -> usize {
        self.max_depth
    }
}

impl<'a> Analysis<'a> for LogicDepth<'a> {
    fn build(circuit: &'a Circuit) -> Result<Self> {
        let mut depth: HashMap<GateId, usize> = HashMap::new();
        let mut on_stack: HashSet<GateId> = HashSet::new();

        for root in circuit.gates() {
            if depth.contains_key(&root) {
                continue;
            }
            // (gate, next input, deepest producer so far)
            let mut stack = vec![(root, 0usize, 0usize)];
            on_stack.insert(root);
            while let Some(&(id, next, deepest)) = stack.last() {
                let gate = circuit.get(id)?;
                if next == gate.inputs.len() {
                    let d = if gate.inputs.is_empty() { 0 } else { deepest + 1 };
                    depth.insert(id, d);
                    on_stack.remove(&id);
                    stack.pop();
                    if let Some(parent) = stack.last_mut() {
                        parent.2 = parent.2.max(d);
                    }
                    continue;
                }
                if let Some(top) = stack.last_mut() {
                    top.1 += 1;
                }
                let InputSlot::Gate(b) = &gate.inputs[next] else {
                    continue;
                };
                if let Some(d) = depth.get(&b.gate).copied() {
                    if let Some(top) = stack.last_mut() {
                        top.2 = top.2.max(d);
                    }
                } else if !on_stack.insert(b.gate) {
                    return Err(Error::Inconsistent(format!(
                        "cycle through gate {}",
                        b.gate
                    )));
                } else {
                    stack.push((b.gate, 0, 0));
                }
            }
        }

        let max_depth = depth.values().max().copied().unwrap_or(0);

        Ok(LogicDepth {
            _circuit: circuit,
            depth,
            max_depth,
        })
    }
}

/// A node of the exported graph
#[cfg(feature = "graph")]
#[derive(Debug, Clone)]
pub enum Node {
    /// A gate of the circuit
    Gate(GateId),
    /// An external signal, numbered in order of first use
    Signal(usize),
}

#[cfg(feature = "graph")]
impl std::fmt::Display for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Node::Gate(id) => std::fmt::Display::fmt(id, f),
            Node::Signal(i) => write!(f, "s{i}"),
        }
    }
}

/// An edge of the exported graph
#[cfg(feature = "graph")]
#[derive(Debug, Clone)]
pub enum Edge {
    /// A gate-to-gate connection
    Connection(Connection),
    /// A signal read by the given input slot
    Signal(usize),
}

#[cfg(feature = "graph")]
impl std::fmt::Display for Edge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Edge::Connection(c) => std::fmt::Display::fmt(c, f),
            Edge::Signal(input) => write!(f, "in[{input}]"),
        }
    }
}

/// A petgraph representation of the circuit as a directed multi-graph.
/// Edges point from producers to consumers.
#[cfg(feature = "graph")]
#[derive(Debug)]
pub struct MultiDiGraph<'a> {
    _circuit: &'a Circuit,
    graph: DiGraph<Node, Edge>,
}

#[cfg(feature = "graph")]
impl MultiDiGraph<'_> {
    /// Return a reference to the graph constructed by this analysis
    pub fn get_graph(&self) -> &DiGraph<Node, Edge> {
        &self.graph
    }
}

#[cfg(feature = "graph")]
impl<'a> Analysis<'a> for MultiDiGraph<'a> {
    fn build(circuit: &'a Circuit) -> Result<Self> {
        circuit.verify()?;
        let mut gates = HashMap::new();
        let mut signals = HashMap::new();
        let mut graph = DiGraph::new();

        for id in circuit.gates() {
            gates.insert(id, graph.add_node(Node::Gate(id)));
        }

        for connection in circuit.connections() {
            let s_id = gates[&connection.producer];
            let t_id = gates[&connection.consumer];
            graph.add_edge(s_id, t_id, Edge::Connection(connection));
        }

        for id in circuit.gates() {
            let t_id = gates[&id];
            for (input, slot) in circuit.get(id)?.inputs.iter().enumerate() {
                if let InputSlot::Signal(s) = slot {
                    let next = signals.len();
                    let s_id = *signals
                        .entry(s.as_ptr())
                        .or_insert_with(|| graph.add_node(Node::Signal(next)));
                    graph.add_edge(s_id, t_id, Edge::Signal(input));
                }
            }
        }

        Ok(Self {
            _circuit: circuit,
            graph,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::Signal;

    fn ripple() -> (Circuit, Vec<GateId>) {
        let mut circuit = Circuit::new("ripple".to_string());
        let s = Signal::new(true);
        let first = circuit.create(2).unwrap();
        circuit.connect_signal(&s, first, 0).unwrap();
        circuit.connect_signal(&s, first, 1).unwrap();
        let mut chain = vec![first];
        for _ in 0..3 {
            let g = circuit.create(2).unwrap();
            circuit.connect_gate(*chain.last().unwrap(), g, 0).unwrap();
            circuit.connect_signal(&s, g, 1).unwrap();
            chain.push(g);
        }
        (circuit, chain)
    }

    #[test]
    fn fanout_table() {
        let (circuit, chain) = ripple();
        let analysis = circuit.get_analysis::<FanOutTable>().unwrap();
        for pair in chain.windows(2) {
            assert_eq!(analysis.get_users(pair[0]).collect::<Vec<_>>(), vec![pair[1]]);
        }
        assert!(!analysis.has_uses(chain[3]));
        assert_eq!(analysis.sinks().collect::<Vec<_>>(), vec![chain[3]]);
    }

    #[test]
    fn depth_matches_evaluation() {
        let (circuit, chain) = ripple();
        let depth = circuit.get_analysis::<LogicDepth>().unwrap();
        assert_eq!(depth.get_max_depth(), 4);
        for (i, g) in chain.iter().enumerate() {
            assert_eq!(depth.get_depth(*g), Some(i + 1));
        }
        let result = circuit.evaluate(&[chain[3]]).unwrap();
        assert_eq!(result.critical_path, depth.get_max_depth());
    }

    #[test]
    fn depth_rejects_cycles() {
        let (mut circuit, chain) = ripple();
        circuit.connect_gate(chain[3], chain[0], 0).unwrap();
        assert!(matches!(
            circuit.get_analysis::<LogicDepth>(),
            Err(Error::Inconsistent(_))
        ));
    }
}
