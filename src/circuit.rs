/*!

  API for a circuit of NAND gates.

*/

use crate::{
    error::{Error, Result},
    gate::{Binding, EvalState, Gate, GateId, Input, InputSlot, Signal},
    graph::Analysis,
};
use std::collections::HashMap;
use tracing::{debug, trace};

/// An arena slot. The generation is bumped whenever the gate is deleted.
#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    gate: Option<Gate>,
}

/// A circuit of NAND gates stored in an arena.
///
/// Gates are addressed with [GateId] handles. Deleting a gate makes every
/// outstanding handle to it stale; stale handles are rejected by every
/// fallible operation.
#[derive(Debug, Default)]
pub struct Circuit {
    /// The name of the circuit, used as the module name when rendered
    name: String,
    /// Gate storage, holes are reused by [Circuit::create]
    slots: Vec<Slot>,
    /// Free arena slots
    free: Vec<usize>,
    /// Number of live gates
    live: usize,
}

fn stale(circuit: &str, id: GateId) -> Error {
    Error::InvalidArgument(format!("gate {id} is not part of circuit {circuit}"))
}

/// A live connection from an output slot of one gate to an input slot of another
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Connection {
    /// The driving gate
    pub producer: GateId,
    /// The output slot on the driving gate
    pub output_slot: usize,
    /// The driven gate
    pub consumer: GateId,
    /// The input slot on the driven gate
    pub input: usize,
}

impl std::fmt::Display for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}.out[{}] -> {}.in[{}]",
            self.producer, self.output_slot, self.consumer, self.input
        )
    }
}

impl Circuit {
    /// Creates a new, empty circuit with the given name
    pub fn new(name: String) -> Self {
        Self {
            name,
            ..Default::default()
        }
    }

    /// Returns the name of the circuit
    pub fn get_name(&self) -> &str {
        &self.name
    }

    /// Returns the number of live gates
    pub fn len(&self) -> usize {
        self.live
    }

    /// Returns `true` if the circuit holds no gates
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Returns `true` if `id` refers to a live gate
    pub fn contains(&self, id: GateId) -> bool {
        self.gate(id).is_some()
    }

    pub(crate) fn gate(&self, id: GateId) -> Option<&Gate> {
        self.slots
            .get(id.index())
            .filter(|slot| slot.generation == id.generation())
            .and_then(|slot| slot.gate.as_ref())
    }

    fn gate_mut(&mut self, id: GateId) -> Option<&mut Gate> {
        self.slots
            .get_mut(id.index())
            .filter(|slot| slot.generation == id.generation())
            .and_then(|slot| slot.gate.as_mut())
    }

    pub(crate) fn get(&self, id: GateId) -> Result<&Gate> {
        self.gate(id).ok_or_else(|| stale(&self.name, id))
    }

    fn get_mut(&mut self, id: GateId) -> Result<&mut Gate> {
        let name = &self.name;
        self.slots
            .get_mut(id.index())
            .filter(|slot| slot.generation == id.generation())
            .and_then(|slot| slot.gate.as_mut())
            .ok_or_else(|| stale(name, id))
    }

    /// Checks that `input` is a valid input index of `gate`
    fn check_input(&self, gate: GateId, input: usize) -> Result<()> {
        let count = self.get(gate)?.inputs.len();
        if input >= count {
            return Err(Error::InvalidArgument(format!(
                "input {input} out of range for gate {gate} with {count} inputs"
            )));
        }
        Ok(())
    }

    /// Creates a gate with `inputs` unbound input slots and no outputs.
    /// A gate with zero inputs is a constant-false source.
    pub fn create(&mut self, inputs: usize) -> Result<GateId> {
        let gate = Gate::try_new(inputs)?;
        let id = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index];
                slot.gate = Some(gate);
                GateId::new(index, slot.generation)
            }
            None => {
                self.slots.try_reserve(1)?;
                let index = self.slots.len();
                self.slots.push(Slot {
                    generation: 0,
                    gate: Some(gate),
                });
                GateId::new(index, 0)
            }
        };
        self.live += 1;
        debug!(gate = %id, inputs, "created gate");
        Ok(id)
    }

    /// Deletes a gate, severing every binding it takes part in.
    /// Stale handles are ignored.
    pub fn delete(&mut self, id: GateId) {
        let Some(slot) = self
            .slots
            .get_mut(id.index())
            .filter(|slot| slot.generation == id.generation())
        else {
            return;
        };
        let Some(gate) = slot.gate.take() else {
            return;
        };
        // A slot whose generation would wrap is retired for good.
        if let Some(next) = slot.generation.checked_add(1) {
            slot.generation = next;
            self.free.push(id.index());
        }
        self.live -= 1;

        // Self-loops resolve to the now stale handle and are skipped.
        for b in gate.consumers() {
            if let Some(consumer) = self.gate_mut(b.gate) {
                consumer.inputs[b.slot] = InputSlot::Unbound;
            }
        }
        for b in gate.producers() {
            if let Some(producer) = self.gate_mut(b.gate) {
                producer.outputs[b.slot] = None;
            }
        }
        debug!(gate = %id, "deleted gate");
    }

    /// Resets input `input` of `gate` and returns what was bound to it.
    /// The caller has already validated both.
    fn unbind(&mut self, gate: GateId, input: usize) -> InputSlot {
        let Some(g) = self.gate_mut(gate) else {
            return InputSlot::Unbound;
        };
        let prev = std::mem::take(&mut g.inputs[input]);
        if let InputSlot::Gate(b) = &prev {
            if let Some(producer) = self.gate_mut(b.gate) {
                producer.outputs[b.slot] = None;
            }
            trace!(producer = %b.gate, slot = b.slot, consumer = %gate, input, "unbound gate");
        }
        prev
    }

    /// Connects the output of `producer` to input `input` of `consumer`,
    /// replacing whatever was bound there.
    ///
    /// On [Error::OutOfMemory] the circuit is left as it was.
    pub fn connect_gate(&mut self, producer: GateId, consumer: GateId, input: usize) -> Result<()> {
        self.check_input(consumer, input)?;
        self.get(producer)?;
        if let InputSlot::Gate(b) = &self.get(consumer)?.inputs[input] {
            if b.gate == producer {
                return Ok(());
            }
        }
        let slot = {
            let p = self.get_mut(producer)?;
            match p.free_output() {
                Some(slot) => slot,
                None => p.grow_outputs()?,
            }
        };

        self.unbind(consumer, input);
        self.get_mut(producer)?.outputs[slot] = Some(Binding::new(consumer, input));
        self.get_mut(consumer)?.inputs[input] = InputSlot::Gate(Binding::new(producer, slot));
        debug!(%producer, slot, %consumer, input, "connected gate");
        Ok(())
    }

    /// Binds input `input` of `gate` to an external signal, replacing whatever
    /// was bound there. The gate keeps a shared handle; it never writes to it.
    pub fn connect_signal(&mut self, signal: &Signal, gate: GateId, input: usize) -> Result<()> {
        self.check_input(gate, input)?;
        self.unbind(gate, input);
        self.get_mut(gate)?.inputs[input] = InputSlot::Signal(signal.clone());
        debug!(%gate, input, "connected signal");
        Ok(())
    }

    /// Disconnects input `input` of `gate` and returns what was bound before
    pub fn disconnect(&mut self, gate: GateId, input: usize) -> Result<Input> {
        self.check_input(gate, input)?;
        let prev = self.unbind(gate, input);
        Ok(Input::from(&prev))
    }

    /// Returns the number of input slots of `gate`
    pub fn input_count(&self, gate: GateId) -> Result<usize> {
        Ok(self.get(gate)?.inputs.len())
    }

    /// Returns the number of live connections driven by `gate`.
    /// Unused output capacity is not counted.
    pub fn fan_out(&self, gate: GateId) -> Result<usize> {
        Ok(self.get(gate)?.consumers().count())
    }

    /// Returns what input `index` of `gate` is bound to
    pub fn input(&self, gate: GateId, index: usize) -> Result<Input> {
        self.check_input(gate, index)?;
        Ok(Input::from(&self.get(gate)?.inputs[index]))
    }

    /// Returns the consumer at the `index`th live output of `gate`, counting
    /// live connections in storage order. The order is only stable as long as
    /// no connection to or from `gate` changes.
    pub fn output(&self, gate: GateId, index: usize) -> Option<GateId> {
        self.gate(gate)?.consumers().nth(index).map(|b| b.gate)
    }

    /// Returns an iterator over the consumers of `gate`
    pub fn outputs(&self, gate: GateId) -> impl Iterator<Item = GateId> {
        self.gate(gate)
            .into_iter()
            .flat_map(|g| g.consumers().map(|b| b.gate))
    }

    /// Returns the transient evaluation state of `gate`
    pub fn eval_state(&self, gate: GateId) -> Result<EvalState> {
        Ok(self.get(gate)?.state.get())
    }

    /// Constructs an analysis of the circuit.
    pub fn get_analysis<'a, A: Analysis<'a>>(&'a self) -> Result<A> {
        A::build(self)
    }

    /// Verifies that every binding is mirrored on the other side and that no
    /// gate is left with evaluation state.
    pub fn verify(&self) -> Result<()> {
        for id in self.gates() {
            let gate = self.get(id)?;
            if gate.state.get() != EvalState::Cleared {
                return Err(Error::Inconsistent(format!(
                    "gate {id} is in state {:?}",
                    gate.state.get()
                )));
            }
            for (j, b) in gate.outputs.iter().enumerate() {
                let Some(b) = b else { continue };
                let mirrored = self
                    .gate(b.gate)
                    .and_then(|c| c.inputs.get(b.slot))
                    .is_some_and(|slot| {
                        matches!(slot, InputSlot::Gate(back) if *back == Binding::new(id, j))
                    });
                if !mirrored {
                    return Err(Error::Inconsistent(format!(
                        "output {j} of gate {id} points to input {} of {} which does not point back",
                        b.slot, b.gate
                    )));
                }
            }
            for (k, slot) in gate.inputs.iter().enumerate() {
                let InputSlot::Gate(b) = slot else { continue };
                let mirrored = self
                    .gate(b.gate)
                    .and_then(|p| p.outputs.get(b.slot))
                    .is_some_and(|out| *out == Some(Binding::new(id, k)));
                if !mirrored {
                    return Err(Error::Inconsistent(format!(
                        "input {k} of gate {id} points to output {} of {} which does not point back",
                        b.slot, b.gate
                    )));
                }
            }
        }
        Ok(())
    }
}

/// A collection of iterators for the circuit
pub mod iter {

    use super::{Circuit, Connection};
    use crate::gate::{GateId, InputSlot};
    use std::collections::HashSet;

    /// An iterator over the live gates of a circuit, in arena order
    #[derive(Debug)]
    pub struct GateIterator<'a> {
        circuit: &'a Circuit,
        index: usize,
    }

    impl<'a> GateIterator<'a> {
        /// Creates a new iterator for the circuit
        pub fn new(circuit: &'a Circuit) -> Self {
            Self { circuit, index: 0 }
        }
    }

    impl Iterator for GateIterator<'_> {
        type Item = GateId;

        fn next(&mut self) -> Option<Self::Item> {
            while self.index < self.circuit.slots.len() {
                let slot = &self.circuit.slots[self.index];
                let index = self.index;
                self.index += 1;
                if slot.gate.is_some() {
                    return Some(GateId::new(index, slot.generation));
                }
            }
            None
        }
    }

    /// An iterator over the live connections of a circuit, grouped by producer
    #[derive(Debug)]
    pub struct ConnectionIterator<'a> {
        gates: GateIterator<'a>,
        current: Option<GateId>,
        subindex: usize,
    }

    impl<'a> ConnectionIterator<'a> {
        /// Create a new connection iterator for the circuit
        pub fn new(circuit: &'a Circuit) -> Self {
            let mut gates = GateIterator::new(circuit);
            let current = gates.next();
            Self {
                gates,
                current,
                subindex: 0,
            }
        }
    }

    impl Iterator for ConnectionIterator<'_> {
        type Item = Connection;

        fn next(&mut self) -> Option<Self::Item> {
            while let Some(producer) = self.current {
                if let Some(gate) = self.gates.circuit.gate(producer) {
                    while self.subindex < gate.outputs.len() {
                        let output_slot = self.subindex;
                        self.subindex += 1;
                        if let Some(b) = gate.outputs[output_slot] {
                            return Some(Connection {
                                producer,
                                output_slot,
                                consumer: b.gate,
                                input: b.slot,
                            });
                        }
                    }
                }
                self.subindex = 0;
                self.current = self.gates.next();
            }
            None
        }
    }

    /// A depth-first iterator that walks from a gate towards its producers.
    /// Each gate is yielded once, in pre-order.
    /// # Examples
    ///
    /// ```
    /// use nand_circuit::circuit::Circuit;
    ///
    /// let mut circuit = Circuit::new("example".to_string());
    /// let a = circuit.create(0).unwrap();
    /// let b = circuit.create(1).unwrap();
    /// circuit.connect_gate(a, b, 0).unwrap();
    /// let mut dfs = circuit.dfs(b);
    /// let mut nodes = Vec::new();
    /// while let Some(n) = dfs.next() {
    ///     if dfs.check_cycles() {
    ///         panic!("Cycle detected in the circuit");
    ///     }
    ///     nodes.push(n);
    /// }
    /// assert_eq!(nodes, vec![b, a]);
    /// ```
    #[derive(Debug)]
    pub struct DfsIterator<'a> {
        circuit: &'a Circuit,
        root: Option<GateId>,
        /// Gates on the current path and the next input to inspect on each
        stack: Vec<(GateId, usize)>,
        visited: HashSet<GateId>,
        on_path: HashSet<GateId>,
        cycles: bool,
    }

    impl<'a> DfsIterator<'a> {
        /// Create a new DFS iterator for the circuit starting at `from`.
        pub fn new(circuit: &'a Circuit, from: GateId) -> Self {
            Self {
                circuit,
                root: Some(from),
                stack: Vec::new(),
                visited: HashSet::new(),
                on_path: HashSet::new(),
                cycles: false,
            }
        }

        /// Check if the DFS traversal has encountered a cycle yet.
        pub fn check_cycles(&self) -> bool {
            self.cycles
        }

        /// Consumes the iterator to detect cycles reachable from the start.
        pub fn detect_cycles(mut self) -> bool {
            while !self.cycles && self.next().is_some() {}
            self.cycles
        }

        fn enter(&mut self, id: GateId) {
            self.visited.insert(id);
            self.on_path.insert(id);
            self.stack.push((id, 0));
        }
    }

    impl Iterator for DfsIterator<'_> {
        type Item = GateId;

        fn next(&mut self) -> Option<Self::Item> {
            if let Some(root) = self.root.take() {
                if !self.circuit.contains(root) {
                    return None;
                }
                self.enter(root);
                return Some(root);
            }

            let circuit = self.circuit;
            while let Some(&(id, next)) = self.stack.last() {
                let Some(gate) = circuit.gate(id) else {
                    self.stack.pop();
                    continue;
                };
                if next == gate.inputs.len() {
                    self.stack.pop();
                    self.on_path.remove(&id);
                    continue;
                }
                if let Some(top) = self.stack.last_mut() {
                    top.1 += 1;
                }
                if let InputSlot::Gate(b) = &gate.inputs[next] {
                    if self.on_path.contains(&b.gate) {
                        self.cycles = true;
                    } else if !self.visited.contains(&b.gate) {
                        self.enter(b.gate);
                        return Some(b.gate);
                    }
                }
            }

            None
        }
    }
}

impl Circuit {
    /// Returns an iterator over the live gates.
    pub fn gates(&self) -> impl Iterator<Item = GateId> {
        iter::GateIterator::new(self)
    }

    /// Returns an iterator over the live connections.
    pub fn connections(&self) -> impl Iterator<Item = Connection> {
        iter::ConnectionIterator::new(self)
    }

    /// Returns a depth-first iterator over `from` and its transitive producers.
    pub fn dfs(&self, from: GateId) -> iter::DfsIterator<'_> {
        iter::DfsIterator::new(self, from)
    }

    /// Assigns each distinct signal a port number, in order of first use.
    fn signal_ports(&self) -> HashMap<*const std::cell::Cell<bool>, usize> {
        let mut ports = HashMap::new();
        for id in self.gates() {
            let Some(gate) = self.gate(id) else { continue };
            for slot in &gate.inputs {
                if let InputSlot::Signal(s) = slot {
                    let next = ports.len();
                    ports.entry(s.as_ptr()).or_insert(next);
                }
            }
        }
        ports
    }
}

impl std::fmt::Display for Circuit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ports = self.signal_ports();
        let mut inputs: Vec<usize> = ports.values().copied().collect();
        inputs.sort_unstable();
        let (outputs, wires): (Vec<GateId>, Vec<GateId>) = self
            .gates()
            .partition(|id| self.outputs(*id).next().is_none());

        writeln!(f, "module {} (", self.name)?;

        let indent = " ".repeat(2);
        let names: Vec<String> = inputs
            .iter()
            .map(|i| format!("s{i}"))
            .chain(outputs.iter().map(|id| id.to_string()))
            .collect();
        for (i, name) in names.iter().enumerate() {
            if i == names.len() - 1 {
                writeln!(f, "{indent}{name}")?;
            } else {
                writeln!(f, "{indent}{name},")?;
            }
        }
        writeln!(f, ");")?;

        for i in &inputs {
            writeln!(f, "{indent}input s{i};")?;
        }
        for id in &outputs {
            writeln!(f, "{indent}output {id};")?;
        }
        for id in &wires {
            writeln!(f, "{indent}wire {id};")?;
        }

        for id in self.gates() {
            let Some(gate) = self.gate(id) else { continue };
            if gate.inputs.is_empty() {
                writeln!(f, "{indent}assign {id} = 1'b0;")?;
                continue;
            }
            let operands: Vec<String> = gate
                .inputs
                .iter()
                .map(|slot| match slot {
                    InputSlot::Unbound => "1'bz".to_string(),
                    InputSlot::Signal(s) => format!("s{}", ports[&s.as_ptr()]),
                    InputSlot::Gate(b) => b.gate.to_string(),
                })
                .collect();
            writeln!(
                f,
                "{indent}nand u{} ({id}, {});",
                id.index(),
                operands.join(", ")
            )?;
        }

        writeln!(f, "endmodule")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delete_frees_and_reuses_slot() {
        let mut circuit = Circuit::new("reuse".to_string());
        let a = circuit.create(1).unwrap();
        let b = circuit.create(1).unwrap();
        assert_eq!(circuit.len(), 2);
        circuit.delete(a);
        assert_eq!(circuit.len(), 1);
        assert!(!circuit.contains(a));
        let c = circuit.create(3).unwrap();
        assert_eq!(c.index(), a.index());
        assert_ne!(c, a);
        assert!(circuit.input_count(a).is_err());
        assert_eq!(circuit.input_count(c).unwrap(), 3);
        assert_eq!(circuit.gates().collect::<Vec<_>>(), vec![c, b]);
    }

    #[test]
    fn output_slots_are_reused_before_growing() {
        let mut circuit = Circuit::new("holes".to_string());
        let p = circuit.create(0).unwrap();
        let c = circuit.create(3).unwrap();
        for k in 0..3 {
            circuit.connect_gate(p, c, k).unwrap();
        }
        assert_eq!(circuit.gate(p).unwrap().outputs.len(), 4);
        circuit.disconnect(c, 1).unwrap();
        assert_eq!(circuit.fan_out(p).unwrap(), 2);
        assert_eq!(circuit.gate(p).unwrap().outputs[1], None);
        circuit.connect_gate(p, c, 1).unwrap();
        assert_eq!(circuit.gate(p).unwrap().outputs.len(), 4);
        assert_eq!(
            circuit.gate(p).unwrap().outputs[1],
            Some(Binding::new(c, 1))
        );
        assert!(circuit.verify().is_ok());
    }

    #[test]
    fn verify_catches_one_sided_binding() {
        let mut circuit = Circuit::new("broken".to_string());
        let p = circuit.create(0).unwrap();
        let c = circuit.create(1).unwrap();
        circuit.connect_gate(p, c, 0).unwrap();
        circuit.gate_mut(c).unwrap().inputs[0] = InputSlot::Unbound;
        assert!(matches!(circuit.verify(), Err(Error::Inconsistent(_))));
    }

    #[test]
    fn exhausted_slot_is_retired() {
        let mut circuit = Circuit::new("retire".to_string());
        let g = circuit.create(0).unwrap();
        circuit.slots[g.index()].generation = u32::MAX;
        let last = GateId::new(g.index(), u32::MAX);
        assert!(circuit.contains(last));
        circuit.delete(last);
        assert!(circuit.is_empty());
        assert!(!circuit.contains(last));
        let fresh = circuit.create(0).unwrap();
        assert_ne!(fresh.index(), g.index());
        assert!(!circuit.contains(last));
        assert!(circuit.verify().is_ok());
    }

    #[test]
    fn delete_self_loop() {
        let mut circuit = Circuit::new("loop".to_string());
        let g = circuit.create(1).unwrap();
        circuit.connect_gate(g, g, 0).unwrap();
        assert_eq!(circuit.fan_out(g).unwrap(), 1);
        circuit.delete(g);
        assert!(circuit.is_empty());
        assert!(circuit.verify().is_ok());
    }
}
