//! # logic_circuit
//!
//! **Digital logic simulation with reversible editing**
//!
//! Assemble gates, latches, flip-flops, switches and displays into a circuit
//! and read settled signal levels back after every edit. Each edit is a
//! command that can be undone and redone with the same ids.
//!
//! ## Quick Start
//!
//! ```rust
//! use logic_circuit::{Position, Session};
//!
//! let mut session = Session::new();
//! let a = session.create_gate("SWITCH", Position::new(0.0, 0.0)).unwrap();
//! let b = session.create_gate("SWITCH", Position::new(0.0, 2.0)).unwrap();
//! let and = session.create_gate("AND", Position::new(2.0, 1.0)).unwrap();
//! let bulb = session.create_gate("LIGHTBULB", Position::new(4.0, 1.0)).unwrap();
//! session.add_connection(a, and, 0);
//! session.add_connection(b, and, 1);
//! session.add_connection(and, bulb, 0);
//!
//! session.toggle_switch(a);
//! session.toggle_switch(b);
//! assert!(session.level(bulb));
//!
//! session.undo();
//! assert!(!session.level(bulb));
//!
//! let doc = session.save();
//! println!("circuit identity: blake3:{}", session.hash());
//! # assert_eq!(doc.gates.len(), 4);
//! ```
//!
//! ## Key Concepts
//!
//! - **GateKind**: closed set of 21 primitives with fixed input slots
//! - **Circuit**: arena of gates, connections and labels keyed by ids
//! - **Propagation**: pull `evaluate`, push `propagate`, coalesced `flush`
//! - **Command**: reversible edit recorded by id in a [`CommandLog`]
//! - **CircuitDoc**: validated JSON form used for files and the clipboard

pub mod circuit;
pub mod clock;
pub mod codec;
pub mod command;
pub mod config;
pub mod engine;
pub mod gate;
pub mod session;
pub mod stress;

pub use circuit::{Circuit, ConnectionId, GateId, LabelId, Position};
pub use codec::{CircuitDoc, CodecError};
pub use command::{Command, CommandLog};
pub use config::{ConfigError, SessionConfig};
pub use engine::{FlushReport, PropagationReport};
pub use gate::{GateKind, TruthRow, UnknownGateKind};
pub use session::Session;
