//! # Gate kinds
//!
//! The closed set of primitives a circuit is assembled from. Every kind is a
//! pure function of its input levels, plus a small retained [`GateMemory`] for
//! switches, clocks, latches and flip-flops.
//!
//! ## Example
//!
//! ```rust
//! use logic_circuit::gate::GateKind;
//!
//! let xor: GateKind = "XOR".parse().unwrap();
//! assert!(xor.evaluate_fresh(&[true, false]));
//! assert!(!xor.evaluate_fresh(&[true, true]));
//! ```

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Primitive gate behaviours.
///
/// Input slot order is fixed per kind, see [`GateKind::input_names`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GateKind {
    And,
    Or,
    Not,
    Nand,
    Nor,
    Xor,
    Xnor,
    Buffer,
    /// Slot 0 data, slot 1 enable. Not driving while enable is low.
    TriState,
    /// User-operated level source.
    Switch,
    /// Level source flipped by a periodic timer.
    Clock,
    HighConst,
    LowConst,
    /// Sink lit while any input is high.
    LightBulb,
    /// Sink showing how many of its four inputs are high.
    FourBitDisplay,
    /// `[S, R]`, reacts immediately.
    RsLatchAsync,
    /// `[S, R, CLK]`, reacts while the clock is high.
    RsLatchSync,
    /// `[D, EN]`, transparent while enable is high.
    DLatchLevel,
    /// `[D, CLK]`, samples D on a rising clock edge.
    DFlipFlopEdge,
    /// `[J, K, CLK]`, samples on a rising clock edge.
    JkFlipFlopEdge,
    /// `[T, CLK]`, toggles on a rising clock edge while T is high.
    TFlipFlopSync,
}

/// Every kind, in declaration order.
pub const ALL_KINDS: [GateKind; 21] = [
    GateKind::And,
    GateKind::Or,
    GateKind::Not,
    GateKind::Nand,
    GateKind::Nor,
    GateKind::Xor,
    GateKind::Xnor,
    GateKind::Buffer,
    GateKind::TriState,
    GateKind::Switch,
    GateKind::Clock,
    GateKind::HighConst,
    GateKind::LowConst,
    GateKind::LightBulb,
    GateKind::FourBitDisplay,
    GateKind::RsLatchAsync,
    GateKind::RsLatchSync,
    GateKind::DLatchLevel,
    GateKind::DFlipFlopEdge,
    GateKind::JkFlipFlopEdge,
    GateKind::TFlipFlopSync,
];

/// State a gate keeps between evaluations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GateMemory {
    /// Held output level: switch position, clock phase, latch/flip-flop Q.
    pub q: bool,
    /// Clock input level seen by the previous evaluation.
    pub last_clock: bool,
}

impl GateMemory {
    /// Records the current clock level and reports a low-to-high transition.
    fn rising_edge(&mut self, clock: Option<bool>) -> bool {
        let level = clock.unwrap_or(false);
        let edge = !self.last_clock && level;
        self.last_clock = level;
        edge
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown gate type {0:?}")]
pub struct UnknownGateKind(pub String);

/// One line of a truth table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TruthRow {
    pub inputs: Vec<bool>,
    pub output: bool,
}

type Table = &'static [(&'static [bool], bool)];

const F: bool = false;
const T: bool = true;

const SOURCE_LOW: Table = &[(&[], F)];
const SOURCE_HIGH: Table = &[(&[], T)];
const NOT_TABLE: Table = &[(&[F], T), (&[T], F)];
const PASS_TABLE: Table = &[(&[F], F), (&[T], T)];
const AND_TABLE: Table = &[(&[F, F], F), (&[F, T], F), (&[T, F], F), (&[T, T], T)];
const OR_TABLE: Table = &[(&[F, F], F), (&[F, T], T), (&[T, F], T), (&[T, T], T)];
const NAND_TABLE: Table = &[(&[F, F], T), (&[F, T], T), (&[T, F], T), (&[T, T], F)];
const NOR_TABLE: Table = &[(&[F, F], T), (&[F, T], F), (&[T, F], F), (&[T, T], F)];
const XOR_TABLE: Table = &[(&[F, F], F), (&[F, T], T), (&[T, F], T), (&[T, T], F)];
const XNOR_TABLE: Table = &[(&[F, F], T), (&[F, T], F), (&[T, F], F), (&[T, T], T)];
const RS_ASYNC_TABLE: Table = &[(&[F, F], F), (&[F, T], F), (&[T, F], T), (&[T, T], F)];
const RS_SYNC_TABLE: Table = &[
    (&[F, F, F], F),
    (&[F, F, T], F),
    (&[F, T, F], F),
    (&[F, T, T], F),
    (&[T, F, F], F),
    (&[T, F, T], T),
    (&[T, T, F], F),
    (&[T, T, T], F),
];
const JK_TABLE: Table = &[
    (&[F, F, F], F),
    (&[F, F, T], F),
    (&[F, T, F], F),
    (&[F, T, T], F),
    (&[T, F, F], F),
    (&[T, F, T], T),
    (&[T, T, F], F),
    (&[T, T, T], T),
];
/// High when any input is high, for both sinks.
const ANY_HIGH_TABLE: Table = &[
    (&[F, F, F, F], F),
    (&[F, F, F, T], T),
    (&[F, F, T, F], T),
    (&[F, F, T, T], T),
    (&[F, T, F, F], T),
    (&[F, T, F, T], T),
    (&[F, T, T, F], T),
    (&[F, T, T, T], T),
    (&[T, F, F, F], T),
    (&[T, F, F, T], T),
    (&[T, F, T, F], T),
    (&[T, F, T, T], T),
    (&[T, T, F, F], T),
    (&[T, T, F, T], T),
    (&[T, T, T, F], T),
    (&[T, T, T, T], T),
];

impl FromStr for GateKind {
    type Err = UnknownGateKind;

    /// Parse a kind from its codec name.
    fn from_str(name: &str) -> Result<Self, Self::Err> {
        ALL_KINDS
            .iter()
            .copied()
            .find(|k| k.as_str() == name)
            .ok_or_else(|| UnknownGateKind(name.to_string()))
    }
}

impl GateKind {
    /// Codec name of the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            GateKind::And => "AND",
            GateKind::Or => "OR",
            GateKind::Not => "NOT",
            GateKind::Nand => "NAND",
            GateKind::Nor => "NOR",
            GateKind::Xor => "XOR",
            GateKind::Xnor => "XNOR",
            GateKind::Buffer => "BUFFER",
            GateKind::TriState => "TRISTATE",
            GateKind::Switch => "SWITCH",
            GateKind::Clock => "CLOCK",
            GateKind::HighConst => "HIGH_CONST",
            GateKind::LowConst => "LOW_CONST",
            GateKind::LightBulb => "LIGHTBULB",
            GateKind::FourBitDisplay => "FOUR_BIT_DISPLAY",
            GateKind::RsLatchAsync => "RS_LATCH_ASYNC",
            GateKind::RsLatchSync => "RS_LATCH_SYNC",
            GateKind::DLatchLevel => "D_LATCH_LEVEL",
            GateKind::DFlipFlopEdge => "D_FLIPFLOP_EDGE",
            GateKind::JkFlipFlopEdge => "JK_FLIPFLOP_EDGE",
            GateKind::TFlipFlopSync => "T_FLIPFLOP_SYNC",
        }
    }

    /// Names of the input slots, in slot order.
    pub fn input_names(&self) -> &'static [&'static str] {
        match self {
            GateKind::Switch | GateKind::Clock | GateKind::HighConst | GateKind::LowConst => &[],
            GateKind::Not | GateKind::Buffer => &["A"],
            GateKind::LightBulb => &["A", "B", "C", "D"],
            GateKind::And
            | GateKind::Or
            | GateKind::Nand
            | GateKind::Nor
            | GateKind::Xor
            | GateKind::Xnor => &["A", "B"],
            GateKind::TriState => &["D", "EN"],
            GateKind::FourBitDisplay => &["B3", "B2", "B1", "B0"],
            GateKind::RsLatchAsync => &["S", "R"],
            GateKind::RsLatchSync => &["S", "R", "CLK"],
            GateKind::DLatchLevel => &["D", "EN"],
            GateKind::DFlipFlopEdge => &["D", "CLK"],
            GateKind::JkFlipFlopEdge => &["J", "K", "CLK"],
            GateKind::TFlipFlopSync => &["T", "CLK"],
        }
    }

    pub fn input_count(&self) -> usize {
        self.input_names().len()
    }

    /// Sinks have no output port and can never source a connection.
    pub fn has_output(&self) -> bool {
        !matches!(self, GateKind::LightBulb | GateKind::FourBitDisplay)
    }

    /// Kinds whose output depends on retained state rather than inputs alone.
    pub fn has_memory(&self) -> bool {
        matches!(self, GateKind::Switch | GateKind::Clock) || self.is_sequential()
    }

    pub fn is_sequential(&self) -> bool {
        matches!(
            self,
            GateKind::RsLatchAsync
                | GateKind::RsLatchSync
                | GateKind::DLatchLevel
                | GateKind::DFlipFlopEdge
                | GateKind::JkFlipFlopEdge
                | GateKind::TFlipFlopSync
        )
    }

    pub fn is_edge_triggered(&self) -> bool {
        matches!(
            self,
            GateKind::DFlipFlopEdge | GateKind::JkFlipFlopEdge | GateKind::TFlipFlopSync
        )
    }

    /// Compute the output from input levels, `None` marking an unwired slot.
    ///
    /// Sequential kinds update `memory` as part of evaluation: this is where a
    /// latch follows its data input and where a flip-flop samples on an edge.
    pub fn evaluate(&self, inputs: &[Option<bool>], memory: &mut GateMemory) -> bool {
        let slot = |i: usize| inputs.get(i).copied().flatten();
        let all_wired =
            inputs.len() >= self.input_count() && inputs.iter().all(|v| v.is_some());
        let highs = inputs.iter().flatten().filter(|v| **v).count();
        match self {
            GateKind::And => all_wired && highs == inputs.len(),
            GateKind::Or => all_wired && highs > 0,
            GateKind::Nand => !all_wired || highs != inputs.len(),
            GateKind::Nor => !all_wired || highs == 0,
            GateKind::Xor => highs % 2 == 1,
            GateKind::Xnor => highs % 2 == 0,
            GateKind::Not => slot(0).map_or(false, |v| !v),
            GateKind::Buffer => slot(0).unwrap_or(false),
            GateKind::TriState => match (slot(0), slot(1)) {
                (Some(data), Some(true)) => data,
                _ => false,
            },
            GateKind::Switch | GateKind::Clock => memory.q,
            GateKind::HighConst => true,
            GateKind::LowConst => false,
            GateKind::LightBulb | GateKind::FourBitDisplay => highs > 0,
            GateKind::RsLatchAsync => {
                memory.q = set_reset(memory.q, slot(0), slot(1));
                memory.q
            }
            GateKind::RsLatchSync => {
                if slot(2) == Some(true) {
                    memory.q = set_reset(memory.q, slot(0), slot(1));
                }
                memory.q
            }
            GateKind::DLatchLevel => {
                if slot(1) == Some(true) {
                    memory.q = slot(0).unwrap_or(false);
                }
                memory.q
            }
            GateKind::DFlipFlopEdge => {
                if memory.rising_edge(slot(1)) {
                    memory.q = slot(0).unwrap_or(false);
                }
                memory.q
            }
            GateKind::JkFlipFlopEdge => {
                if memory.rising_edge(slot(2)) {
                    memory.q = match (slot(0) == Some(true), slot(1) == Some(true)) {
                        (true, false) => true,
                        (false, true) => false,
                        (true, true) => !memory.q,
                        (false, false) => memory.q,
                    };
                }
                memory.q
            }
            GateKind::TFlipFlopSync => {
                let edge = memory.rising_edge(slot(1));
                if edge && slot(0) == Some(true) {
                    memory.q = !memory.q;
                }
                memory.q
            }
        }
    }

    /// Evaluate a freshly created instance with every slot wired.
    ///
    /// Works on scratch memory, so it is safe for inspection tooling.
    pub fn evaluate_fresh(&self, inputs: &[bool]) -> bool {
        let wired: Vec<Option<bool>> = inputs.iter().copied().map(Some).collect();
        self.evaluate(&wired, &mut GateMemory::default())
    }

    /// A tri-state output stops driving unless both slots are wired and
    /// enable is high.
    pub fn is_high_impedance(&self, inputs: &[Option<bool>]) -> bool {
        match self {
            GateKind::TriState => !matches!(
                (inputs.first().copied().flatten(), inputs.get(1).copied().flatten()),
                (Some(_), Some(true))
            ),
            _ => false,
        }
    }

    /// Number of high inputs, as shown by a four-bit display.
    pub fn active_inputs(inputs: &[Option<bool>]) -> u8 {
        inputs.iter().flatten().filter(|v| **v).count() as u8
    }

    /// Static truth table: each input combination mapped to the output of a
    /// freshly created instance (Q low, previous clock low).
    pub fn truth_table(&self) -> Vec<TruthRow> {
        self.table()
            .iter()
            .map(|(inputs, output)| TruthRow {
                inputs: inputs.to_vec(),
                output: *output,
            })
            .collect()
    }

    fn table(&self) -> Table {
        match self {
            GateKind::And => AND_TABLE,
            GateKind::Or => OR_TABLE,
            GateKind::Nand => NAND_TABLE,
            GateKind::Nor => NOR_TABLE,
            GateKind::Xor => XOR_TABLE,
            GateKind::Xnor => XNOR_TABLE,
            GateKind::Not => NOT_TABLE,
            GateKind::Buffer => PASS_TABLE,
            GateKind::TriState
            | GateKind::DLatchLevel
            | GateKind::DFlipFlopEdge
            | GateKind::TFlipFlopSync => AND_TABLE,
            GateKind::Switch | GateKind::Clock | GateKind::LowConst => SOURCE_LOW,
            GateKind::HighConst => SOURCE_HIGH,
            GateKind::LightBulb | GateKind::FourBitDisplay => ANY_HIGH_TABLE,
            GateKind::RsLatchAsync => RS_ASYNC_TABLE,
            GateKind::RsLatchSync => RS_SYNC_TABLE,
            GateKind::JkFlipFlopEdge => JK_TABLE,
        }
    }
}

impl fmt::Display for GateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// R=S=1 holds the previous Q.
fn set_reset(q: bool, set: Option<bool>, reset: Option<bool>) -> bool {
    match (set == Some(true), reset == Some(true)) {
        (true, false) => true,
        (false, true) => false,
        _ => q,
    }
}
