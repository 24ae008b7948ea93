/*!

  Memoized evaluation of NAND gates.

  Each call walks the producers of the requested gates with an explicit
  stack, so arbitrarily deep circuits do not exhaust the call stack. Every
  gate is evaluated at most once per batch, however many consumers reach it.
  Once the batch is done, successfully or not, a cleanup walk returns every
  visited gate to [EvalState::Cleared].

*/

use crate::{
    circuit::Circuit,
    error::{Error, EvalFailure, Result},
    gate::{EvalState, Gate, GateId, InputSlot},
};
use bitvec::vec::BitVec;
use tracing::{debug, warn};

/// The outcome of a successful evaluation batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    /// The output of each requested gate, in batch order
    pub signals: BitVec,
    /// The longest critical path among the requested gates
    pub critical_path: usize,
}

/// A gate whose inputs are being evaluated
#[derive(Debug)]
struct Frame {
    gate: GateId,
    /// The next input slot to read
    next: usize,
    /// Longest path among the gate inputs seen so far
    max_path: usize,
    /// Whether every input seen so far was true
    all_true: bool,
}

impl Frame {
    fn new(gate: GateId) -> Self {
        Self {
            gate,
            next: 0,
            max_path: 0,
            all_true: true,
        }
    }

    /// Folds the result of one evaluated input into the frame
    fn absorb(&mut self, path: usize, signal: bool) {
        self.max_path = self.max_path.max(path);
        self.all_true &= signal;
    }
}

/// What entering a gate produced
enum Step {
    /// The value is known: (path length, signal)
    Resolved(usize, bool),
    /// The gate now needs its inputs evaluated
    Descend,
}

impl Circuit {
    /// Evaluates `gates` in order and returns their signals together with the
    /// longest critical path among them.
    ///
    /// Evaluation stops at the first gate that hits a cycle or an unbound
    /// input. The evaluation state of every gate is reset before returning.
    pub fn evaluate(&self, gates: &[GateId]) -> Result<Evaluation> {
        let mut buffer = vec![false; gates.len()];
        let critical_path = self.evaluate_into(gates, &mut buffer)?;
        Ok(Evaluation {
            signals: buffer.into_iter().collect(),
            critical_path,
        })
    }

    /// Evaluates `gates` in order, writing the output of each into the same
    /// position of `signals`, and returns the longest critical path.
    ///
    /// On failure the contents of `signals` past the last successfully
    /// evaluated gate are unspecified.
    pub fn evaluate_into(&self, gates: &[GateId], signals: &mut [bool]) -> Result<usize> {
        if gates.is_empty() {
            return Err(Error::InvalidArgument("empty evaluation batch".to_string()));
        }
        if signals.len() != gates.len() {
            return Err(Error::InvalidArgument(format!(
                "signal buffer holds {} values for {} gates",
                signals.len(),
                gates.len()
            )));
        }
        for id in gates {
            self.get(*id)?;
        }

        let mut critical_path = 0;
        let mut outcome = Ok(());
        for (i, id) in gates.iter().enumerate() {
            match self.evaluate_one(*id) {
                Ok((path, signal)) => {
                    critical_path = critical_path.max(path);
                    signals[i] = signal;
                }
                Err(failure) => {
                    outcome = Err(failure);
                    break;
                }
            }
        }

        for id in gates {
            self.cleanup(*id);
        }

        match outcome {
            Ok(()) => {
                debug!(gates = gates.len(), critical_path, "evaluated batch");
                Ok(critical_path)
            }
            Err(failure) => {
                warn!(%failure, "evaluation failed");
                Err(failure.into())
            }
        }
    }

    /// Moves `id` out of [EvalState::Cleared] if its value is not yet known
    fn enter(&self, id: GateId, gate: &Gate) -> std::result::Result<Step, EvalFailure> {
        match gate.state.get() {
            EvalState::Done => Ok(Step::Resolved(gate.path_length.get(), gate.signal.get())),
            EvalState::Failed => Err(EvalFailure::DependencyFailed { gate: id }),
            EvalState::Visiting => {
                gate.state.set(EvalState::Failed);
                Err(EvalFailure::Cycle { gate: id })
            }
            EvalState::Cleared if gate.inputs.is_empty() => {
                gate.state.set(EvalState::Done);
                gate.signal.set(false);
                gate.path_length.set(0);
                Ok(Step::Resolved(0, false))
            }
            EvalState::Cleared => {
                gate.state.set(EvalState::Visiting);
                Ok(Step::Descend)
            }
        }
    }

    /// Evaluates a single gate and returns its critical path length and
    /// signal. Leaves transient state behind for [Circuit::cleanup].
    fn evaluate_one(&self, root: GateId) -> std::result::Result<(usize, bool), EvalFailure> {
        let gate = self.live(root)?;
        let mut stack = match self.enter(root, gate)? {
            Step::Resolved(path, signal) => return Ok((path, signal)),
            Step::Descend => vec![Frame::new(root)],
        };

        while let Some(frame) = stack.last_mut() {
            let gate = match self.live(frame.gate) {
                Ok(gate) => gate,
                Err(failure) => return Err(self.fail(&stack, failure)),
            };

            if frame.next == gate.inputs.len() {
                let path = frame.max_path + 1;
                let signal = !frame.all_true;
                gate.signal.set(signal);
                gate.path_length.set(path);
                gate.state.set(EvalState::Done);
                stack.pop();
                match stack.last_mut() {
                    Some(parent) => parent.absorb(path, signal),
                    None => return Ok((path, signal)),
                }
                continue;
            }

            let input = frame.next;
            frame.next += 1;
            match &gate.inputs[input] {
                InputSlot::Unbound => {
                    let failure = EvalFailure::MissingInput {
                        gate: frame.gate,
                        input,
                    };
                    return Err(self.fail(&stack, failure));
                }
                InputSlot::Signal(s) => frame.all_true &= s.get(),
                InputSlot::Gate(b) => {
                    let producer = b.gate;
                    let step = self
                        .live(producer)
                        .and_then(|g| self.enter(producer, g));
                    match step {
                        Ok(Step::Resolved(path, signal)) => frame.absorb(path, signal),
                        Ok(Step::Descend) => stack.push(Frame::new(producer)),
                        Err(failure) => return Err(self.fail(&stack, failure)),
                    }
                }
            }
        }

        unreachable!("the root frame returns when it pops")
    }

    /// Marks every gate still waiting on its inputs as failed
    fn fail(&self, stack: &[Frame], failure: EvalFailure) -> EvalFailure {
        for frame in stack {
            if let Some(gate) = self.gate(frame.gate) {
                gate.state.set(EvalState::Failed);
            }
        }
        failure
    }

    /// Looks up a gate reached through a binding. Bindings never point at
    /// deleted gates, so a miss means the arena is corrupted.
    fn live(&self, id: GateId) -> std::result::Result<&Gate, EvalFailure> {
        self.gate(id)
            .ok_or(EvalFailure::DependencyFailed { gate: id })
    }

    /// Resets `root` and every gate it transitively reads from to
    /// [EvalState::Cleared]. Stops at gates that are already cleared.
    fn cleanup(&self, root: GateId) {
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let Some(gate) = self.gate(id) else { continue };
            if gate.state.get() == EvalState::Cleared {
                continue;
            }
            gate.state.set(EvalState::Cleared);
            stack.extend(gate.producers().rev().map(|b| b.gate));
        }
    }
}
