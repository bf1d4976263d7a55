//! # Editing session
//!
//! A [`Session`] owns one circuit, its command log and the timers of its
//! running clocks. Every structural edit goes through a [`Command`], and every
//! command is followed by a flush, so levels read back from the session are
//! always settled.
//!
//! ## Example
//!
//! ```rust
//! use logic_circuit::circuit::Position;
//! use logic_circuit::session::Session;
//!
//! let mut session = Session::new();
//! let sw = session.create_gate("SWITCH", Position::new(0.0, 0.0)).unwrap();
//! let bulb = session.create_gate("LIGHTBULB", Position::new(2.0, 0.0)).unwrap();
//! session.add_connection(sw, bulb, 0).unwrap();
//! session.toggle_switch(sw);
//! assert!(session.level(bulb));
//! session.undo();
//! assert!(!session.level(bulb));
//! ```

use crate::circuit::{Circuit, ConnectionId, GateId, LabelId, Position};
use crate::clock::ClockDriver;
use crate::codec::{self, CircuitDoc, CodecError};
use crate::command::{Command, CommandLog};
use crate::config::SessionConfig;
use crate::engine::FlushReport;
use crate::gate::{GateKind, TruthRow};
use tracing::{debug, info};

pub struct Session {
    circuit: Circuit,
    log: CommandLog,
    config: SessionConfig,
    clocks: ClockDriver,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self::with_config(SessionConfig::default())
    }

    pub fn with_config(config: SessionConfig) -> Self {
        let circuit = configured_circuit(&config);
        Session {
            circuit,
            log: CommandLog::with_history_limit(config.history_limit),
            config,
            clocks: ClockDriver::new(),
        }
    }

    /// Open a saved document. The history starts empty.
    pub fn from_doc(doc: &CircuitDoc, config: SessionConfig) -> Result<Self, CodecError> {
        let circuit = codec::load_with(doc, configured_circuit(&config))?;
        info!(gates = circuit.gate_count(), "opened circuit");
        Ok(Session {
            circuit,
            log: CommandLog::with_history_limit(config.history_limit),
            config,
            clocks: ClockDriver::new(),
        })
    }

    pub fn circuit(&self) -> &Circuit {
        &self.circuit
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn history(&self) -> &CommandLog {
        &self.log
    }

    fn execute(&mut self, command: Command) -> Option<&Command> {
        self.log.execute(command, &mut self.circuit);
        self.circuit.flush();
        self.retire_removed_clocks();
        self.log.last()
    }

    /// Stop the timers of clocks that are no longer in the circuit.
    fn retire_removed_clocks(&mut self) {
        let circuit = &self.circuit;
        let stopped = self
            .clocks
            .retain(|id| circuit.gate(id).map_or(false, |g| g.kind == GateKind::Clock));
        if !stopped.is_empty() {
            debug!(count = stopped.len(), "stopped timers of removed clocks");
        }
    }

    /// Create a gate from its type name. Unknown names create nothing.
    pub fn create_gate(&mut self, type_name: &str, position: Position) -> Option<GateId> {
        let Ok(kind) = type_name.parse::<GateKind>() else {
            debug!(type_name, "unknown gate type");
            return None;
        };
        self.add_gate(kind, position)
    }

    pub fn add_gate(&mut self, kind: GateKind, position: Position) -> Option<GateId> {
        self.execute(Command::add_gate(kind, position))
            .and_then(|c| c.created_gates().first().copied())
    }

    /// Wire `source` into `target`'s input `slot`. Returns `None`, still
    /// recording the attempt, when the connection is not allowed.
    pub fn add_connection(
        &mut self,
        source: GateId,
        target: GateId,
        slot: usize,
    ) -> Option<ConnectionId> {
        self.execute(Command::add_connection(source, target, slot))
            .and_then(Command::created_connection)
    }

    pub fn remove_connection(&mut self, id: ConnectionId) -> bool {
        let exists = self.circuit.connection(id).is_some();
        self.execute(Command::remove_connection(id));
        exists
    }

    pub fn remove_gate(&mut self, id: GateId) -> bool {
        let exists = self.circuit.gate(id).is_some();
        self.execute(Command::remove_gate(id));
        exists
    }

    pub fn toggle_switch(&mut self, id: GateId) -> bool {
        let is_switch = self
            .circuit
            .gate(id)
            .map_or(false, |g| g.kind == GateKind::Switch);
        self.execute(Command::toggle_switch(id));
        is_switch
    }

    pub fn remove_selected(&mut self, gates: &[GateId], labels: &[LabelId]) {
        self.execute(Command::remove_selected(gates.to_vec(), labels.to_vec()));
    }

    pub fn add_label(&mut self, text: &str, position: Position) -> Option<LabelId> {
        self.execute(Command::add_label(text, position))
            .and_then(Command::created_label)
    }

    pub fn copy_selection(&self, gates: &[GateId], labels: &[LabelId]) -> CircuitDoc {
        codec::copy_selection(&self.circuit, gates, labels)
    }

    /// Paste a clipboard document with its top-left corner at `at`. The
    /// document is validated first; a rejected paste changes nothing.
    pub fn paste(&mut self, doc: &CircuitDoc, at: Position) -> Result<Vec<GateId>, CodecError> {
        let fragment = codec::resolve(doc)?;
        Ok(self
            .execute(Command::paste(fragment, at))
            .map(Command::created_gates)
            .unwrap_or_default())
    }

    pub fn undo(&mut self) -> bool {
        let done = self.log.undo(&mut self.circuit);
        self.circuit.flush();
        self.retire_removed_clocks();
        done
    }

    pub fn redo(&mut self) -> bool {
        let done = self.log.redo(&mut self.circuit);
        self.circuit.flush();
        self.retire_removed_clocks();
        done
    }

    pub fn can_undo(&self) -> bool {
        self.log.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.log.can_redo()
    }

    /// Propagated output level of a gate, low for unknown ids.
    pub fn level(&self, id: GateId) -> bool {
        self.circuit.gate(id).map_or(false, |g| g.cached_state())
    }

    /// Recompute a gate from its inputs.
    pub fn evaluate(&mut self, id: GateId) -> bool {
        self.circuit.evaluate(id)
    }

    pub fn truth_table_data(&self, id: GateId) -> Option<Vec<TruthRow>> {
        self.circuit.truth_table_data(id)
    }

    pub fn display_value(&self, id: GateId) -> Option<u8> {
        self.circuit.display_value(id)
    }

    pub fn is_high_impedance(&self, id: GateId) -> bool {
        self.circuit.is_high_impedance(id)
    }

    /// Change a gate's fan-out bound as an undoable edit. Returns false, still
    /// recording the attempt, for sinks and bounds below the current fan-out.
    pub fn set_max_output_connections(&mut self, id: GateId, max: usize) -> bool {
        self.execute(Command::set_max_output_connections(id, max))
            .map_or(false, Command::bound_applied)
    }

    pub fn save(&self) -> CircuitDoc {
        codec::save(&self.circuit)
    }

    pub fn hash(&self) -> String {
        codec::circuit_hash(&self.circuit)
    }

    /// Start the timer of a CLOCK gate.
    pub fn start_clock(&mut self, id: GateId) -> bool {
        match self.circuit.gate(id) {
            Some(gate) if gate.kind == GateKind::Clock => {
                self.clocks.start(id, self.config.clock_half_period())
            }
            _ => false,
        }
    }

    pub fn stop_clock(&mut self, id: GateId) -> bool {
        self.clocks.stop(id)
    }

    pub fn stop_all_clocks(&mut self) {
        self.clocks.stop_all();
    }

    pub fn clock_running(&self, id: GateId) -> bool {
        self.clocks.is_running(id)
    }

    /// Apply every clock tick received so far, each followed by a flush.
    /// Returns the number of ticks applied.
    pub fn pump(&mut self) -> usize {
        self.retire_removed_clocks();
        let mut applied = 0;
        for tick in self.clocks.drain() {
            if self.tick_clock(tick.gate).is_some() {
                applied += 1;
            }
        }
        applied
    }

    /// Flip a clock by hand and settle the circuit.
    pub fn tick_clock(&mut self, id: GateId) -> Option<FlushReport> {
        if !self.circuit.flip_clock(id) {
            return None;
        }
        Some(self.circuit.flush())
    }
}

fn configured_circuit(config: &SessionConfig) -> Circuit {
    let mut circuit = Circuit::new();
    circuit.configure(
        config.default_max_output_connections,
        config.max_propagation_steps,
    );
    circuit
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha20Rng;
    use std::time::Duration;

    fn at(x: f64, y: f64) -> Position {
        Position::new(x, y)
    }

    #[test]
    fn and_of_switches_lights_the_bulb() {
        let mut s = Session::new();
        let a = s.create_gate("SWITCH", at(0.0, 0.0)).unwrap();
        let b = s.create_gate("SWITCH", at(0.0, 2.0)).unwrap();
        let and = s.create_gate("AND", at(2.0, 1.0)).unwrap();
        let bulb = s.create_gate("LIGHTBULB", at(4.0, 1.0)).unwrap();
        s.add_connection(a, and, 0).unwrap();
        s.add_connection(b, and, 1).unwrap();
        s.add_connection(and, bulb, 0).unwrap();
        assert!(!s.level(bulb));

        s.toggle_switch(a);
        assert!(!s.level(bulb));
        s.toggle_switch(b);
        assert!(s.level(bulb));
        assert!(s.evaluate(bulb));

        s.undo();
        assert!(!s.level(bulb));
        s.redo();
        assert!(s.level(bulb));
    }

    #[test]
    fn unknown_type_creates_nothing() {
        let mut s = Session::new();
        assert_eq!(s.create_gate("WIDGET", at(0.0, 0.0)), None);
        assert_eq!(s.circuit().gate_count(), 0);
        assert!(!s.can_undo());
    }

    #[test]
    fn removing_a_gate_with_two_fan_outs_undoes_cleanly() {
        let mut s = Session::new();
        let high = s.create_gate("HIGH_CONST", at(0.0, 0.0)).unwrap();
        assert!(s.set_max_output_connections(high, 2));
        let b1 = s.create_gate("LIGHTBULB", at(2.0, 0.0)).unwrap();
        let b2 = s.create_gate("LIGHTBULB", at(2.0, 2.0)).unwrap();
        let c1 = s.add_connection(high, b1, 0).unwrap();
        let c2 = s.add_connection(high, b2, 0).unwrap();
        assert!(s.level(b1) && s.level(b2));
        let before = s.save();

        assert!(s.remove_gate(high));
        assert_eq!(s.circuit().connection_count(), 0);
        assert!(!s.level(b1) && !s.level(b2));

        assert!(s.undo());
        assert_eq!(s.save(), before);
        assert_eq!(s.circuit().gate(high).unwrap().outputs(), &[c1, c2]);
        assert!(s.level(b1) && s.level(b2));
    }

    #[test]
    fn rs_latch_holds_under_set_and_reset() {
        let mut s = Session::new();
        let set = s.create_gate("SWITCH", at(0.0, 0.0)).unwrap();
        let reset = s.create_gate("SWITCH", at(0.0, 1.0)).unwrap();
        let latch = s.create_gate("RS_LATCH_ASYNC", at(2.0, 0.0)).unwrap();
        s.add_connection(set, latch, 0);
        s.add_connection(reset, latch, 1);
        s.toggle_switch(set);
        assert!(s.level(latch));
        s.toggle_switch(reset);
        assert!(s.level(latch));
        s.toggle_switch(set);
        assert!(!s.level(latch));
    }

    #[test]
    fn d_flipflop_follows_manual_clock() {
        let mut s = Session::new();
        let d = s.create_gate("SWITCH", at(0.0, 0.0)).unwrap();
        let clk = s.create_gate("CLOCK", at(0.0, 1.0)).unwrap();
        let ff = s.create_gate("D_FLIPFLOP_EDGE", at(2.0, 0.0)).unwrap();
        s.add_connection(d, ff, 0);
        s.add_connection(clk, ff, 1);
        s.toggle_switch(d);
        assert!(!s.level(ff));
        assert!(s.tick_clock(clk).is_some());
        assert!(s.level(ff));
        s.toggle_switch(d);
        assert!(s.level(ff), "D is only sampled on the edge");
        s.tick_clock(clk);
        assert!(s.level(ff));
        s.tick_clock(clk);
        assert!(!s.level(ff));
        assert!(s.tick_clock(d).is_none());
    }

    #[test]
    fn paste_mints_fresh_ids_and_undoes_atomically() {
        let mut s = Session::new();
        let sw = s.create_gate("SWITCH", at(3.0, 3.0)).unwrap();
        let not = s.create_gate("NOT", at(5.0, 3.0)).unwrap();
        s.add_connection(sw, not, 0);
        s.add_label("invert", at(4.0, 2.0));
        let labels: Vec<LabelId> = s.circuit().labels().map(|l| l.id).collect();
        let clip = s.copy_selection(&[sw, not], &labels);

        let pasted = s.paste(&clip, at(10.0, 0.0)).unwrap();
        assert_eq!(pasted.len(), 2);
        assert!(pasted.iter().all(|id| *id != sw && *id != not));
        assert_eq!(s.circuit().gate_count(), 4);
        assert_eq!(s.circuit().connection_count(), 2);
        assert_eq!(s.circuit().labels().count(), 2);
        let copy = s.circuit().gate(pasted[0]).unwrap();
        assert_eq!(copy.position, at(10.0, 1.0));
        assert!(s.level(pasted[1]), "pasted inverter settles high");

        s.undo();
        assert_eq!(s.circuit().gate_count(), 2);
        assert_eq!(s.circuit().labels().count(), 1);
        s.redo();
        assert_eq!(s.circuit().gate_count(), 4);
        assert!(s.circuit().gate(pasted[0]).is_some());
    }

    #[test]
    fn rejected_paste_changes_nothing() {
        let mut s = Session::new();
        s.create_gate("AND", at(0.0, 0.0));
        let before = s.hash();
        let mut clip = s.copy_selection(&s.circuit().gate_ids(), &[]);
        clip.gates[0].kind = "MYSTERY".into();
        assert!(matches!(
            s.paste(&clip, at(1.0, 1.0)),
            Err(CodecError::UnknownGateType(_))
        ));
        assert_eq!(s.hash(), before);
        assert_eq!(s.history().undo_len(), 1);
    }

    #[test]
    fn fan_out_bound_holds_under_random_wiring() {
        let mut rng = ChaCha20Rng::seed_from_u64(7);
        let mut s = Session::new();
        let kinds = ["AND", "OR", "NOT", "XOR", "SWITCH", "LIGHTBULB", "JK_FLIPFLOP_EDGE"];
        let mut ids = Vec::new();
        for i in 0..12 {
            let kind = kinds[rng.gen_range(0..kinds.len())];
            ids.push(s.create_gate(kind, at(i as f64, 0.0)).unwrap());
        }
        for _ in 0..200 {
            let src = ids[rng.gen_range(0..ids.len())];
            let dst = ids[rng.gen_range(0..ids.len())];
            let slot = rng.gen_range(0..4);
            if rng.gen_bool(0.3) {
                s.set_max_output_connections(src, rng.gen_range(0..3));
            }
            s.add_connection(src, dst, slot);
            assert!(s.circuit().invariant_violations().is_empty());
        }
    }

    #[test]
    fn configuration_reaches_new_gates() {
        let config = SessionConfig {
            default_max_output_connections: 3,
            history_limit: Some(1),
            ..SessionConfig::default()
        };
        let mut s = Session::with_config(config.clone());
        let g = s.create_gate("BUFFER", at(0.0, 0.0)).unwrap();
        assert_eq!(s.circuit().gate(g).unwrap().max_output_connections(), 3);
        s.create_gate("BUFFER", at(1.0, 0.0));
        assert!(s.undo());
        assert!(!s.undo());

        let reopened = Session::from_doc(&s.save(), config).unwrap();
        assert_eq!(reopened.hash(), s.hash());
        assert!(!reopened.can_undo());
    }

    #[test]
    fn running_clock_is_applied_by_pump() {
        let config = SessionConfig {
            clock_half_period_ms: 1,
            ..SessionConfig::default()
        };
        let mut s = Session::with_config(config);
        let clk = s.create_gate("CLOCK", at(0.0, 0.0)).unwrap();
        let sw = s.create_gate("SWITCH", at(0.0, 1.0)).unwrap();
        assert!(!s.start_clock(sw));
        assert!(s.start_clock(clk));
        std::thread::sleep(Duration::from_millis(50));
        assert!(s.pump() > 0);
        assert!(s.stop_clock(clk));
        let level = s.level(clk);
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(s.pump(), 0);
        assert_eq!(s.level(clk), level);
    }

    #[test]
    fn removed_clock_stops_ticking() {
        let config = SessionConfig {
            clock_half_period_ms: 1,
            ..SessionConfig::default()
        };
        let mut s = Session::with_config(config);
        let clk = s.create_gate("CLOCK", at(0.0, 0.0)).unwrap();
        let other = s.create_gate("CLOCK", at(0.0, 2.0)).unwrap();
        assert!(s.start_clock(clk));
        assert!(s.start_clock(other));

        assert!(s.remove_gate(clk));
        assert!(!s.clock_running(clk));
        assert!(s.clock_running(other));

        s.remove_selected(&[other], &[]);
        assert!(!s.clock_running(other));
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(s.pump(), 0);

        assert!(s.undo());
        assert!(s.circuit().gate(other).is_some());
        assert!(!s.clock_running(other), "restored clocks start stopped");
    }

    #[test]
    fn lowered_fan_out_bound_is_undone_first() {
        let mut s = Session::new();
        let sw = s.create_gate("SWITCH", at(0.0, 0.0)).unwrap();
        assert!(s.set_max_output_connections(sw, 2));
        let b1 = s.create_gate("LIGHTBULB", at(2.0, 0.0)).unwrap();
        let b2 = s.create_gate("LIGHTBULB", at(2.0, 2.0)).unwrap();
        let c1 = s.add_connection(sw, b1, 0).unwrap();
        let c2 = s.add_connection(sw, b2, 0).unwrap();
        let before = s.save();

        assert!(s.remove_connection(c1));
        assert!(s.set_max_output_connections(sw, 1));
        assert!(!s.set_max_output_connections(sw, 0));

        assert!(s.undo() && s.undo() && s.undo());
        assert_eq!(s.save(), before);
        assert_eq!(s.circuit().gate(sw).unwrap().outputs(), &[c1, c2]);
    }

    #[test]
    fn display_and_truth_table_inspection() {
        let mut s = Session::new();
        let display = s.create_gate("FOUR_BIT_DISPLAY", at(4.0, 0.0)).unwrap();
        for slot in 0..3 {
            let high = s.create_gate("HIGH_CONST", at(0.0, slot as f64)).unwrap();
            s.add_connection(high, display, slot);
        }
        assert_eq!(s.display_value(display), Some(3));
        let table = s.truth_table_data(display).unwrap();
        assert_eq!(table.len(), 16);
        assert!(!table[0].output);
        assert!(table[15].output);
    }
}
