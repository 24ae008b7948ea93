use nand_circuit::{Circuit, Signal};

fn main() {
    let mut circuit = Circuit::new("example".to_string());

    // Add the two inputs
    let a = Signal::new(true);
    let b = Signal::new(false);

    // Instantiate a NAND gate
    let gate = circuit.create(2).unwrap();
    circuit.connect_signal(&a, gate, 0).unwrap();
    circuit.connect_signal(&b, gate, 1).unwrap();

    let result = circuit.evaluate(&[gate]).unwrap();
    assert!(result.signals[0]);
    assert_eq!(result.critical_path, 1);

    // Flip an input and evaluate again
    b.set(true);
    let result = circuit.evaluate(&[gate]).unwrap();
    assert!(!result.signals[0]);

    // Print the circuit
    println!("{circuit}");
}
