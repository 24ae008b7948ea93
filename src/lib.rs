#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs, unreachable_pub)]
/*!

`nand-circuit`

Combinational circuits made of NAND gates. Gates live in an arena owned by a
[circuit::Circuit] and are wired to each other, or to caller-owned
[gate::Signal]s, through bidirectional bindings. Evaluating a batch of gates
yields their outputs and the longest chain of dependent gates.

*/
#![doc = "## Simple Example\n```"]
#![doc = include_str!("../demos/simple.rs")]
#![doc = "\n```"]

pub mod circuit;
pub mod error;
pub mod eval;
pub mod gate;
pub mod graph;
pub mod util;

pub use circuit::Circuit;
pub use error::{Error, EvalFailure, Result};
pub use eval::Evaluation;
pub use gate::{EvalState, GateId, Input, Signal};
