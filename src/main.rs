use nand_circuit::{Circuit, GateId, Signal};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Three NAND gates, each fed by its own pair of signals, all driving a
/// three-input NAND gate.
fn fan_in_example(signals: &[Signal]) -> (Circuit, Vec<GateId>, GateId) {
    let mut circuit = Circuit::new("fan_in".to_string());

    let mut first_level = Vec::new();
    for pair in signals.chunks(2) {
        let gate = circuit.create(2).unwrap();
        circuit.connect_signal(&pair[0], gate, 0).unwrap();
        circuit.connect_signal(&pair[1], gate, 1).unwrap();
        first_level.push(gate);
    }

    // All previous gates are connected to this one
    let master = circuit.create(first_level.len()).unwrap();
    for (i, gate) in first_level.iter().enumerate() {
        circuit.connect_gate(*gate, master, i).unwrap();
    }

    (circuit, first_level, master)
}

fn main() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let signals: Vec<Signal> = (0..6).map(|_| Signal::new(false)).collect();
    let (mut circuit, first_level, master) = fan_in_example(&signals);

    for gate in &first_level {
        // Each gate has one live output
        assert_eq!(circuit.fan_out(*gate).unwrap(), 1);
    }

    // For each of the three gates the critical path is 1
    let result = circuit.evaluate(&first_level).unwrap();
    assert_eq!(result.critical_path, 1);
    // NAND of two false inputs is true
    assert!(result.signals.all());

    // All gates connected to master give out true so this should be false
    let result = circuit.evaluate(&[master]).unwrap();
    assert_eq!(result.critical_path, 2);
    assert!(!result.signals[0]);

    print!("{circuit}");

    for gate in first_level {
        circuit.delete(gate);
    }
    circuit.delete(master);
    assert!(circuit.is_empty());
}
