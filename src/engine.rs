//! # Evaluation and propagation
//!
//! Two separate operations keep signal levels consistent with the wiring:
//!
//! - **evaluate** pulls: it recomputes one gate from scratch by recursively
//!   evaluating the gates feeding it. Sequential gates update their retained
//!   state while being evaluated.
//! - **propagate** pushes: it re-evaluates a gate and, only if the output
//!   differs from the cached level, stores the new level and continues into
//!   every gate it drives.
//!
//! Edits do not propagate directly. They enqueue the affected gates in an
//! [`UpdateScheduler`], and [`Circuit::flush`] drains the queue once per
//! processing step so several edits in one step cost one pass.
//!
//! Stopping at the first unchanged gate is inherited behaviour. It bounds the
//! work to paths whose level changed, but it is not proven for every
//! reconvergent topology; the diamond tests below pin down what it does.

use crate::circuit::{Circuit, GateId};
use crate::gate::{GateKind, GateMemory, TruthRow};
use indexmap::IndexSet;
use std::collections::HashMap;
use tracing::{debug, trace, warn};

/// Gates waiting for the next flush, in first-scheduled order.
#[derive(Debug, Clone, Default)]
pub struct UpdateScheduler {
    pending: IndexSet<GateId>,
}

impl UpdateScheduler {
    /// Enqueue a gate. Scheduling an already pending gate keeps its place.
    pub fn schedule(&mut self, id: GateId) {
        self.pending.insert(id);
    }

    pub(crate) fn forget(&mut self, id: GateId) {
        self.pending.shift_remove(&id);
    }

    pub fn contains(&self, id: GateId) -> bool {
        self.pending.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    fn take(&mut self) -> IndexSet<GateId> {
        std::mem::take(&mut self.pending)
    }
}

/// What a propagate call or a flush did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropagationReport {
    /// Pending gates drained by a flush.
    pub flushed: usize,
    /// Gate visits, changed or not.
    pub steps: usize,
    /// Gates whose output changed, first change first.
    pub changed: Vec<GateId>,
    /// Set when a propagate call ran out of its step budget.
    pub truncated: bool,
}

/// Report returned by [`Circuit::flush`].
pub type FlushReport = PropagationReport;

impl Circuit {
    /// Recompute a gate's output by pulling from its inputs. Missing gates
    /// evaluate low.
    ///
    /// A gate reached again while it is already being evaluated (feedback
    /// wiring) contributes its cached level instead of recursing. Within one
    /// call each upstream gate is computed once, so a reconvergent cone is
    /// not re-walked per path.
    pub fn evaluate(&mut self, id: GateId) -> bool {
        let mut visiting = Vec::new();
        let mut computed = HashMap::new();
        self.evaluate_inner(id, &mut visiting, &mut computed)
    }

    fn evaluate_inner(
        &mut self,
        id: GateId,
        visiting: &mut Vec<GateId>,
        computed: &mut HashMap<GateId, bool>,
    ) -> bool {
        if let Some(level) = computed.get(&id) {
            return *level;
        }
        let Some(gate) = self.gates.get(&id) else {
            return false;
        };
        if visiting.contains(&id) {
            return gate.cached_state;
        }
        let kind = gate.kind;
        let sources: Vec<Option<GateId>> = gate
            .inputs
            .iter()
            .map(|c| c.and_then(|c| self.connections.get(&c)).map(|c| c.source))
            .collect();
        visiting.push(id);
        let levels: Vec<Option<bool>> = sources
            .into_iter()
            .map(|s| s.map(|s| self.evaluate_inner(s, visiting, computed)))
            .collect();
        visiting.pop();
        let level = match self.gates.get_mut(&id) {
            Some(gate) => kind.evaluate(&levels, &mut gate.memory),
            None => false,
        };
        computed.insert(id, level);
        level
    }

    /// Re-evaluate `id` and push a changed output downstream.
    pub fn propagate(&mut self, id: GateId) -> PropagationReport {
        let mut report = PropagationReport::default();
        self.propagate_into(id, &mut report);
        report
    }

    /// Depth-first with an explicit stack; targets are visited in output
    /// order, each subtree finishing before its next sibling starts.
    fn propagate_into(&mut self, start: GateId, report: &mut PropagationReport) {
        let budget = self.max_propagation_steps;
        let mut steps = 0usize;
        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            if steps >= budget {
                warn!(
                    gate = %start,
                    budget,
                    "propagation step budget exhausted, circuit may oscillate"
                );
                report.truncated = true;
                break;
            }
            steps += 1;
            let new_state = self.evaluate(id);
            let Some(gate) = self.gates.get_mut(&id) else {
                continue;
            };
            if gate.cached_state == new_state {
                continue;
            }
            gate.cached_state = new_state;
            trace!(gate = %id, state = new_state, "output changed");
            if !report.changed.contains(&id) {
                report.changed.push(id);
            }
            let outputs = gate.outputs.clone();
            let mut targets = Vec::with_capacity(outputs.len());
            for cid in &outputs {
                if let Some(conn) = self.connections.get_mut(cid) {
                    conn.active = new_state;
                    targets.push(conn.target);
                }
            }
            stack.extend(targets.into_iter().rev());
        }
        report.steps += steps;
    }

    /// Schedule a gate for the next flush.
    pub fn schedule(&mut self, id: GateId) {
        if self.gates.contains_key(&id) {
            self.scheduler.schedule(id);
        }
    }

    /// Schedule every gate, as after a load.
    pub fn schedule_all(&mut self) {
        for id in self.gates.keys() {
            self.scheduler.schedule(*id);
        }
    }

    /// Propagate each pending gate exactly once, in scheduling order.
    pub fn flush(&mut self) -> FlushReport {
        let pending = self.scheduler.take();
        let mut report = PropagationReport {
            flushed: pending.len(),
            ..PropagationReport::default()
        };
        for id in pending {
            self.propagate_into(id, &mut report);
        }
        if report.flushed > 0 {
            debug!(
                flushed = report.flushed,
                steps = report.steps,
                changed = report.changed.len(),
                "flushed updates"
            );
        }
        report
    }

    /// Cached level of each source feeding `id`, `None` for unwired slots.
    pub fn input_levels(&self, id: GateId) -> Option<Vec<Option<bool>>> {
        let gate = self.gates.get(&id)?;
        Some(
            gate.inputs
                .iter()
                .map(|c| {
                    c.and_then(|c| self.connections.get(&c))
                        .and_then(|c| self.gates.get(&c.source))
                        .map(|g| g.cached_state)
                })
                .collect(),
        )
    }

    /// Output a fresh gate of `kind` gives for `inputs`, on scratch memory.
    pub fn evaluate_with(kind: GateKind, inputs: &[Option<bool>]) -> bool {
        kind.evaluate(inputs, &mut GateMemory::default())
    }

    /// Static truth table of the gate's kind.
    pub fn truth_table_data(&self, id: GateId) -> Option<Vec<TruthRow>> {
        self.gates.get(&id).map(|g| g.kind.truth_table())
    }

    /// Active input count of a four-bit display, from the displayed levels.
    pub fn display_value(&self, id: GateId) -> Option<u8> {
        if self.gates.get(&id)?.kind != GateKind::FourBitDisplay {
            return None;
        }
        self.input_levels(id).map(|levels| GateKind::active_inputs(&levels))
    }

    /// Whether a tri-state gate is currently not driving its output.
    pub fn is_high_impedance(&self, id: GateId) -> bool {
        match (self.gates.get(&id), self.input_levels(id)) {
            (Some(gate), Some(levels)) => gate.kind.is_high_impedance(&levels),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::Position;

    fn place(c: &mut Circuit, kind: GateKind) -> GateId {
        let x = c.gate_count() as f64;
        c.insert_gate(kind, Position::new(x, 0.0))
    }

    fn state(c: &Circuit, id: GateId) -> bool {
        c.gate(id).unwrap().cached_state()
    }

    #[test]
    fn and_of_switches_drives_bulb() {
        let mut c = Circuit::new();
        let a = place(&mut c, GateKind::Switch);
        let b = place(&mut c, GateKind::Switch);
        let and = place(&mut c, GateKind::And);
        let bulb = place(&mut c, GateKind::LightBulb);
        c.connect(a, and, 0);
        c.connect(b, and, 1);
        c.connect(and, bulb, 0);
        c.flush();
        assert!(!state(&c, bulb));

        c.toggle_switch(a);
        c.toggle_switch(b);
        c.flush();
        assert!(c.evaluate(and));
        assert!(state(&c, bulb));

        c.toggle_switch(b);
        let report = c.flush();
        assert_eq!(report.flushed, 1);
        assert!(!state(&c, and));
        assert!(!state(&c, bulb));
        assert!(report.changed.contains(&bulb));
    }

    #[test]
    fn bulb_is_lit_by_any_of_its_inputs() {
        let mut c = Circuit::new();
        let low = place(&mut c, GateKind::LowConst);
        let high = place(&mut c, GateKind::HighConst);
        let bulb = place(&mut c, GateKind::LightBulb);
        assert!(c.connect(low, bulb, 0).is_some());
        assert!(c.connect(high, bulb, 1).is_some());
        c.flush();
        assert!(state(&c, bulb));
        assert!(c.evaluate(bulb));

        let from_high = c.connection_into(bulb, 1).unwrap().id;
        c.disconnect(from_high);
        c.flush();
        assert!(!state(&c, bulb));
    }

    #[test]
    fn propagate_twice_is_a_no_op() {
        let mut c = Circuit::new();
        let sw = place(&mut c, GateKind::Switch);
        let not = place(&mut c, GateKind::Not);
        let bulb = place(&mut c, GateKind::LightBulb);
        c.connect(sw, not, 0);
        c.connect(not, bulb, 0);
        c.flush();
        c.toggle_switch(sw);

        let first = c.propagate(sw);
        assert_eq!(first.changed, vec![sw, not, bulb]);
        let snapshot: Vec<bool> = c.gates().map(|g| g.cached_state()).collect();
        let second = c.propagate(sw);
        assert!(second.changed.is_empty());
        assert_eq!(second.steps, 1);
        let again: Vec<bool> = c.gates().map(|g| g.cached_state()).collect();
        assert_eq!(snapshot, again);
    }

    #[test]
    fn flush_visits_each_pending_gate_once() {
        let mut c = Circuit::new();
        let high = place(&mut c, GateKind::HighConst);
        let buf = place(&mut c, GateKind::Buffer);
        c.connect(high, buf, 0);
        c.schedule(buf);
        c.schedule(high);
        assert_eq!(c.pending().len(), 2);
        let report = c.flush();
        assert_eq!(report.flushed, 2);
        assert!(c.pending().is_empty());
        assert!(state(&c, high));
        assert!(state(&c, buf));
        assert!(c.flush().changed.is_empty());
    }

    #[test]
    fn connection_activity_follows_source() {
        let mut c = Circuit::new();
        let sw = place(&mut c, GateKind::Switch);
        let bulb = place(&mut c, GateKind::LightBulb);
        let wire = c.connect(sw, bulb, 0).unwrap();
        c.flush();
        assert!(!c.connection(wire).unwrap().active());
        c.toggle_switch(sw);
        c.flush();
        assert!(c.connection(wire).unwrap().active());
    }

    // Halt-on-unchanged on a reconvergent diamond:
    // sw -> buf -> and[0], sw -> not -> and[1].
    #[test]
    fn diamond_reconvergence_settles() {
        let mut c = Circuit::new();
        let sw = place(&mut c, GateKind::Switch);
        c.set_max_output_connections(sw, 2);
        let buf = place(&mut c, GateKind::Buffer);
        let not = place(&mut c, GateKind::Not);
        let and = place(&mut c, GateKind::And);
        let bulb = place(&mut c, GateKind::LightBulb);
        c.connect(sw, buf, 0);
        c.connect(sw, not, 0);
        c.connect(buf, and, 0);
        c.connect(not, and, 1);
        c.connect(and, bulb, 0);
        c.flush();
        for _ in 0..4 {
            c.toggle_switch(sw);
            c.flush();
            for id in c.gate_ids() {
                let cached = state(&c, id);
                assert_eq!(c.evaluate(id), cached, "{id} stale after flush");
            }
            assert!(!state(&c, and));
            assert!(!state(&c, bulb));
        }
    }

    // Diamond whose branches disagree in timing: or = a | (a & b).
    #[test]
    fn diamond_with_masking_branch() {
        let mut c = Circuit::new();
        let a = place(&mut c, GateKind::Switch);
        let b = place(&mut c, GateKind::HighConst);
        c.set_max_output_connections(a, 2);
        let and = place(&mut c, GateKind::And);
        let or = place(&mut c, GateKind::Or);
        c.connect(a, or, 0);
        c.connect(a, and, 0);
        c.connect(b, and, 1);
        c.connect(and, or, 1);
        c.flush();
        assert!(!state(&c, or));
        c.toggle_switch(a);
        let report = c.flush();
        assert!(state(&c, or));
        assert!(state(&c, and));
        // or is reached twice, the second visit sees no change
        assert_eq!(report.changed, vec![a, or, and]);
    }

    #[test]
    fn clocked_d_flipflop_samples_once_per_edge() {
        let mut c = Circuit::new();
        let d = place(&mut c, GateKind::Switch);
        let clk = place(&mut c, GateKind::Switch);
        let ff = place(&mut c, GateKind::DFlipFlopEdge);
        c.connect(d, ff, 0);
        c.connect(clk, ff, 1);
        c.flush();
        c.toggle_switch(d);
        c.flush();
        assert!(!state(&c, ff));

        c.toggle_switch(clk);
        c.flush();
        assert!(state(&c, ff));

        c.toggle_switch(d);
        c.flush();
        c.propagate(ff);
        assert!(c.evaluate(ff), "clock held high must not resample D");
        assert!(state(&c, ff));
    }

    #[test]
    fn rs_latch_with_both_inputs_holds() {
        let mut c = Circuit::new();
        let s = place(&mut c, GateKind::Switch);
        let r = place(&mut c, GateKind::Switch);
        let latch = place(&mut c, GateKind::RsLatchAsync);
        c.connect(s, latch, 0);
        c.connect(r, latch, 1);
        c.toggle_switch(s);
        c.flush();
        assert!(state(&c, latch));
        c.toggle_switch(r);
        c.flush();
        assert!(state(&c, latch), "R=S=1 keeps the previous Q");
        assert!(c.evaluate(latch));
        c.toggle_switch(s);
        c.flush();
        assert!(!state(&c, latch));
        c.toggle_switch(s);
        c.flush();
        assert!(!state(&c, latch));
    }

    #[test]
    fn removing_a_driver_resets_its_targets() {
        let mut c = Circuit::new();
        let high = place(&mut c, GateKind::HighConst);
        c.set_max_output_connections(high, 2);
        let buf = place(&mut c, GateKind::Buffer);
        let bulb = place(&mut c, GateKind::LightBulb);
        c.connect(high, buf, 0);
        c.connect(high, bulb, 0);
        c.flush();
        assert!(state(&c, buf) && state(&c, bulb));

        let removed = c.remove_gate(high).unwrap();
        assert_eq!(removed.connections.len(), 2);
        assert_eq!(c.connection_count(), 0);
        c.flush();
        assert!(!state(&c, buf));
        assert!(!state(&c, bulb));
    }

    #[test]
    fn feedback_loop_terminates() {
        let mut c = Circuit::new();
        let a = place(&mut c, GateKind::Nor);
        let b = place(&mut c, GateKind::Nor);
        let s = place(&mut c, GateKind::LowConst);
        let r = place(&mut c, GateKind::LowConst);
        c.connect(r, a, 0);
        c.connect(b, a, 1);
        c.connect(s, b, 0);
        c.connect(a, b, 1);
        let report = c.flush();
        assert!(!report.truncated);
        assert!(c.invariant_violations().is_empty());
        c.evaluate(a);
        c.evaluate(b);
    }

    #[test]
    fn oscillator_hits_step_budget() {
        let mut c = Circuit::new();
        c.configure(1, 50);
        let not = place(&mut c, GateKind::Not);
        let buf = place(&mut c, GateKind::Buffer);
        c.connect(not, buf, 0);
        c.connect(buf, not, 0);
        let report = c.flush();
        assert!(report.truncated);
        assert!(report.steps <= 2 * 50);
    }

    #[test]
    fn inspection_reads_displayed_levels() {
        let mut c = Circuit::new();
        let high = place(&mut c, GateKind::HighConst);
        let low = place(&mut c, GateKind::LowConst);
        let high2 = place(&mut c, GateKind::HighConst);
        let display = place(&mut c, GateKind::FourBitDisplay);
        c.connect(high, display, 0);
        c.connect(low, display, 1);
        c.connect(high2, display, 3);
        c.flush();
        assert_eq!(c.display_value(display), Some(2));
        assert_eq!(c.display_value(high), None);
        assert!(state(&c, display));
        assert_eq!(c.truth_table_data(display).unwrap().len(), 16);

        let tri = place(&mut c, GateKind::TriState);
        let data = place(&mut c, GateKind::HighConst);
        assert!(c.is_high_impedance(tri));
        c.connect(data, tri, 0);
        c.flush();
        assert!(c.is_high_impedance(tri));
        assert!(!state(&c, tri));

        assert!(Circuit::evaluate_with(GateKind::Nand, &[Some(true), None]));
        assert!(Circuit::evaluate_with(GateKind::DFlipFlopEdge, &[Some(true), Some(true)]));
    }
}
