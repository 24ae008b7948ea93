/*!

  Gates, handles and the slots that bind them together.

*/

use std::{cell::Cell, rc::Rc};

/// A generation-checked handle to a gate stored in a [crate::circuit::Circuit].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GateId {
    /// The slot in the arena
    index: usize,
    /// Bumped every time the slot is freed
    generation: u32,
}

impl GateId {
    pub(crate) fn new(index: usize, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Returns the arena slot of the gate
    pub fn index(&self) -> usize {
        self.index
    }

    /// Returns the generation of the arena slot this handle was issued for
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl std::fmt::Display for GateId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "g{}", self.index)
    }
}

/// A boolean value owned by the caller and read by the gates bound to it.
/// Clones share the same cell, so flipping one clone is seen by every gate.
#[derive(Debug, Clone, Default)]
pub struct Signal(Rc<Cell<bool>>);

impl Signal {
    /// Creates a new signal holding `value`
    pub fn new(value: bool) -> Self {
        Self(Rc::new(Cell::new(value)))
    }

    /// Returns the current value
    pub fn get(&self) -> bool {
        self.0.get()
    }

    /// Overwrites the current value
    pub fn set(&self, value: bool) {
        self.0.set(value)
    }

    /// Returns `true` if both handles refer to the same cell
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn as_ptr(&self) -> *const Cell<bool> {
        Rc::as_ptr(&self.0)
    }
}

impl From<bool> for Signal {
    fn from(value: bool) -> Self {
        Self::new(value)
    }
}

/// One end of a connection: the gate on the other side and the slot index
/// on that gate which points back here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct Binding {
    pub(crate) gate: GateId,
    pub(crate) slot: usize,
}

impl Binding {
    pub(crate) fn new(gate: GateId, slot: usize) -> Self {
        Self { gate, slot }
    }
}

/// What an input slot is currently bound to
#[derive(Debug, Clone, Default)]
pub(crate) enum InputSlot {
    #[default]
    Unbound,
    Signal(Signal),
    /// The producer and its output slot
    Gate(Binding),
}

/// The public view of an input slot, as returned by [crate::circuit::Circuit::input]
#[derive(Debug, Clone)]
pub enum Input {
    /// Nothing is bound to the slot
    Unbound,
    /// The slot reads an external signal
    Signal(Signal),
    /// The slot reads the output of another gate
    Gate(GateId),
}

impl Input {
    /// Returns `true` if nothing is bound
    pub fn is_unbound(&self) -> bool {
        matches!(self, Input::Unbound)
    }

    /// Returns the driving gate, if the slot is bound to one
    pub fn as_gate(&self) -> Option<GateId> {
        match self {
            Input::Gate(id) => Some(*id),
            _ => None,
        }
    }

    /// Returns the bound signal, if the slot is bound to one
    pub fn as_signal(&self) -> Option<&Signal> {
        match self {
            Input::Signal(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&InputSlot> for Input {
    fn from(slot: &InputSlot) -> Self {
        match slot {
            InputSlot::Unbound => Input::Unbound,
            InputSlot::Signal(s) => Input::Signal(s.clone()),
            InputSlot::Gate(b) => Input::Gate(b.gate),
        }
    }
}

/// Progress of a gate through an evaluation batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EvalState {
    /// At rest, ready to be evaluated
    #[default]
    Cleared,
    /// Its inputs are being evaluated
    Visiting,
    /// The cached signal and path length are valid
    Done,
    /// The gate cannot produce a value in this batch
    Failed,
}

/// A NAND gate. It only stores its bindings and the transient state of the
/// current evaluation; every behavior lives in [crate::circuit::Circuit].
#[derive(Debug)]
pub(crate) struct Gate {
    /// Fixed at construction
    pub(crate) inputs: Vec<InputSlot>,
    /// Sparse, `None` marks a hole left by a disconnect
    pub(crate) outputs: Vec<Option<Binding>>,
    pub(crate) state: Cell<EvalState>,
    /// Valid only when `state` is [EvalState::Done]
    pub(crate) signal: Cell<bool>,
    /// Valid only when `state` is [EvalState::Done]
    pub(crate) path_length: Cell<usize>,
}

impl Gate {
    /// Creates a gate with `inputs` unbound inputs, reporting allocation failure
    pub(crate) fn try_new(inputs: usize) -> Result<Self, std::collections::TryReserveError> {
        let mut slots = Vec::new();
        slots.try_reserve_exact(inputs)?;
        slots.resize_with(inputs, InputSlot::default);
        Ok(Self {
            inputs: slots,
            outputs: Vec::new(),
            state: Cell::new(EvalState::Cleared),
            signal: Cell::new(false),
            path_length: Cell::new(0),
        })
    }

    /// Returns the index of the first hole in the output slots
    pub(crate) fn free_output(&self) -> Option<usize> {
        self.outputs.iter().position(Option::is_none)
    }

    /// Grows the output slots to at least double their length and returns
    /// the first new slot. Leaves the gate untouched on failure.
    pub(crate) fn grow_outputs(&mut self) -> Result<usize, std::collections::TryReserveError> {
        let old_len = self.outputs.len();
        self.resize_outputs((old_len * 2).max(1))?;
        Ok(old_len)
    }

    fn resize_outputs(&mut self, new_len: usize) -> Result<(), std::collections::TryReserveError> {
        self.outputs
            .try_reserve_exact(new_len.saturating_sub(self.outputs.len()))?;
        self.outputs.resize(new_len, None);
        Ok(())
    }

    /// Returns the consumers this gate feeds, skipping holes
    pub(crate) fn consumers(&self) -> impl Iterator<Item = &Binding> {
        self.outputs.iter().flatten()
    }

    /// Returns the producers feeding this gate, in input order
    pub(crate) fn producers(&self) -> impl DoubleEndedIterator<Item = &Binding> {
        self.inputs.iter().filter_map(|slot| match slot {
            InputSlot::Gate(b) => Some(b),
            _ => None,
        })
    }
}
