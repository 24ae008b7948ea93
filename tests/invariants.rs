use nand_circuit::{Circuit, EvalState, GateId, Input, Signal};

/// A small deterministic generator so the edit sequence is reproducible
struct Lcg(u64);

impl Lcg {
    fn next(&mut self, bound: usize) -> usize {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        ((self.0 >> 33) as usize) % bound
    }
}

/// Counts the input slots across the circuit that read `producer`
fn readers(circuit: &Circuit, producer: GateId) -> usize {
    circuit
        .gates()
        .map(|g| {
            (0..circuit.input_count(g).unwrap())
                .filter(|k| circuit.input(g, *k).unwrap().as_gate() == Some(producer))
                .count()
        })
        .sum()
}

#[test]
fn random_edits_keep_bindings_mirrored() {
    let mut rng = Lcg(0x5eed);
    let mut circuit = Circuit::new("random".to_string());
    let signals: Vec<Signal> = (0..4).map(|i| Signal::new(i % 2 == 0)).collect();
    let mut gates: Vec<GateId> = (0..8).map(|i| circuit.create(i % 4).unwrap()).collect();

    for step in 0..2000 {
        match rng.next(5) {
            0 | 1 => {
                let p = gates[rng.next(gates.len())];
                let c = gates[rng.next(gates.len())];
                let n = circuit.input_count(c).unwrap();
                if n > 0 {
                    circuit.connect_gate(p, c, rng.next(n)).unwrap();
                }
            }
            2 => {
                let g = gates[rng.next(gates.len())];
                let n = circuit.input_count(g).unwrap();
                if n > 0 {
                    let s = &signals[rng.next(signals.len())];
                    circuit.connect_signal(s, g, rng.next(n)).unwrap();
                }
            }
            3 => {
                let g = gates[rng.next(gates.len())];
                let n = circuit.input_count(g).unwrap();
                if n > 0 {
                    circuit.disconnect(g, rng.next(n)).unwrap();
                }
            }
            _ => {
                let i = rng.next(gates.len());
                circuit.delete(gates[i]);
                gates[i] = circuit.create(rng.next(4)).unwrap();
            }
        }

        assert!(circuit.verify().is_ok(), "step {step}: {:?}", circuit.verify());
        if step % 50 == 0 {
            for g in &gates {
                assert_eq!(circuit.fan_out(*g).unwrap(), readers(&circuit, *g));
            }
            // Whatever the outcome, evaluation leaves no state behind
            let _ = circuit.evaluate(&gates);
            for g in &gates {
                assert_eq!(circuit.eval_state(*g).unwrap(), EvalState::Cleared);
            }
        }
    }
}

#[test]
fn reconnect_round_trip_restores_unbound() {
    let mut circuit = Circuit::new("round_trip".to_string());
    let p = circuit.create(0).unwrap();
    let c = circuit.create(1).unwrap();
    circuit.connect_gate(p, c, 0).unwrap();
    circuit.delete(p);
    assert!(matches!(circuit.input(c, 0).unwrap(), Input::Unbound));

    let p = circuit.create(0).unwrap();
    circuit.connect_gate(p, c, 0).unwrap();
    circuit.disconnect(c, 0).unwrap();
    assert!(circuit.input(c, 0).unwrap().is_unbound());
    assert_eq!(circuit.fan_out(p).unwrap(), 0);
    assert!(circuit.output(p, 0).is_none());
}
