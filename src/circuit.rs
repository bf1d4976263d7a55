//! # Circuit graph
//!
//! Arena of gates, connections and labels keyed by stable integer ids.
//! Connections are explicit records; each gate only stores the ids of the
//! connections feeding its input slots and leaving its output.
//!
//! Structural mutation is crate-private: callers go through
//! [`crate::command::Command`] so every edit has an inverse.

use crate::engine::UpdateScheduler;
use crate::gate::{GateKind, GateMemory};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

/// Fan-out bound given to new gates unless configured otherwise.
pub const DEFAULT_MAX_OUTPUT_CONNECTIONS: usize = 1;
/// Propagation visits allowed per propagate call before it gives up.
pub const DEFAULT_MAX_PROPAGATION_STEPS: usize = 100_000;

/// Gate identity, rendered as `g<n>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GateId(pub u64);

/// Connection identity, rendered as `c<n>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

/// Label identity, rendered as `l<n>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LabelId(pub u64);

impl GateId {
    pub fn parse(text: &str) -> Option<Self> {
        parse_prefixed(text, 'g').map(GateId)
    }
}

impl LabelId {
    pub fn parse(text: &str) -> Option<Self> {
        parse_prefixed(text, 'l').map(LabelId)
    }
}

fn parse_prefixed(text: &str, prefix: char) -> Option<u64> {
    let digits = text.strip_prefix(prefix)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

impl fmt::Display for GateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "g{}", self.0)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "c{}", self.0)
    }
}

impl fmt::Display for LabelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "l{}", self.0)
    }
}

/// Placement on the editing canvas. Never read by evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Position { x, y }
    }

    pub fn offset(self, by: Position) -> Self {
        Position::new(self.x + by.x, self.y + by.y)
    }

    pub fn relative_to(self, origin: Position) -> Self {
        Position::new(self.x - origin.x, self.y - origin.y)
    }
}

/// One simulated primitive.
#[derive(Debug, Clone, PartialEq)]
pub struct Gate {
    pub id: GateId,
    pub kind: GateKind,
    pub position: Position,
    pub(crate) max_output_connections: usize,
    pub(crate) inputs: Vec<Option<ConnectionId>>,
    pub(crate) outputs: Vec<ConnectionId>,
    pub(crate) cached_state: bool,
    pub(crate) memory: GateMemory,
}

impl Gate {
    pub(crate) fn new(id: GateId, kind: GateKind, position: Position, max_outputs: usize) -> Self {
        Gate {
            id,
            kind,
            position,
            max_output_connections: if kind.has_output() { max_outputs } else { 0 },
            inputs: vec![None; kind.input_count()],
            outputs: Vec::new(),
            cached_state: false,
            memory: GateMemory::default(),
        }
    }

    /// Connection feeding each input slot.
    pub fn inputs(&self) -> &[Option<ConnectionId>] {
        &self.inputs
    }

    /// Outgoing connections in the order they were made.
    pub fn outputs(&self) -> &[ConnectionId] {
        &self.outputs
    }

    pub fn max_output_connections(&self) -> usize {
        self.max_output_connections
    }

    /// Output level as of the last propagation.
    pub fn cached_state(&self) -> bool {
        self.cached_state
    }

    pub fn memory(&self) -> GateMemory {
        self.memory
    }
}

/// Directed edge from a gate's output to one input slot of another gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    pub id: ConnectionId,
    pub source: GateId,
    pub target: GateId,
    pub slot: usize,
    pub(crate) active: bool,
}

impl Connection {
    /// Level the wire is drawn with.
    pub fn active(&self) -> bool {
        self.active
    }
}

/// Free text annotation placed on the canvas.
#[derive(Debug, Clone, PartialEq)]
pub struct Label {
    pub id: LabelId,
    pub text: String,
    pub position: Position,
}

/// Everything needed to put a removed connection back exactly where it was.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionRecord {
    pub id: ConnectionId,
    pub source: GateId,
    pub target: GateId,
    pub slot: usize,
    /// Position in the source gate's output list.
    pub output_index: usize,
}

/// A gate taken out of the graph together with the connections that touched
/// it, in removal order.
#[derive(Debug, Clone, PartialEq)]
pub struct RemovedGate {
    pub gate: Gate,
    pub connections: Vec<ConnectionRecord>,
}

/// The mutable graph of gates, connections and labels.
#[derive(Debug, Clone)]
pub struct Circuit {
    pub(crate) gates: BTreeMap<GateId, Gate>,
    pub(crate) connections: BTreeMap<ConnectionId, Connection>,
    labels: BTreeMap<LabelId, Label>,
    next_gate: u64,
    next_connection: u64,
    next_label: u64,
    default_max_outputs: usize,
    pub(crate) max_propagation_steps: usize,
    pub(crate) scheduler: UpdateScheduler,
}

impl Default for Circuit {
    fn default() -> Self {
        Self::new()
    }
}

impl Circuit {
    pub fn new() -> Self {
        Circuit {
            gates: BTreeMap::new(),
            connections: BTreeMap::new(),
            labels: BTreeMap::new(),
            next_gate: 0,
            next_connection: 0,
            next_label: 0,
            default_max_outputs: DEFAULT_MAX_OUTPUT_CONNECTIONS,
            max_propagation_steps: DEFAULT_MAX_PROPAGATION_STEPS,
            scheduler: UpdateScheduler::default(),
        }
    }

    /// Set the fan-out bound for gates created from now on and the
    /// per-call propagation budget.
    pub fn configure(&mut self, default_max_outputs: usize, max_propagation_steps: usize) {
        self.default_max_outputs = default_max_outputs;
        self.max_propagation_steps = max_propagation_steps.max(1);
    }

    pub fn gate(&self, id: GateId) -> Option<&Gate> {
        self.gates.get(&id)
    }

    pub fn gates(&self) -> impl Iterator<Item = &Gate> {
        self.gates.values()
    }

    pub fn gate_ids(&self) -> Vec<GateId> {
        self.gates.keys().copied().collect()
    }

    pub fn gate_count(&self) -> usize {
        self.gates.len()
    }

    pub fn connection(&self, id: ConnectionId) -> Option<&Connection> {
        self.connections.get(&id)
    }

    pub fn connections(&self) -> impl Iterator<Item = &Connection> {
        self.connections.values()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn label(&self, id: LabelId) -> Option<&Label> {
        self.labels.get(&id)
    }

    pub fn labels(&self) -> impl Iterator<Item = &Label> {
        self.labels.values()
    }

    /// The connection currently feeding `target`'s input `slot`.
    pub fn connection_into(&self, target: GateId, slot: usize) -> Option<&Connection> {
        let id = self.gates.get(&target)?.inputs.get(slot).copied().flatten()?;
        self.connections.get(&id)
    }

    /// Gates pending propagation at the next flush.
    pub fn pending(&self) -> &UpdateScheduler {
        &self.scheduler
    }

    /// Whether `add_connection(source, target, slot)` would take effect.
    pub fn can_connect(&self, source: GateId, target: GateId, slot: usize) -> bool {
        if source == target {
            return false;
        }
        let (Some(src), Some(dst)) = (self.gates.get(&source), self.gates.get(&target)) else {
            return false;
        };
        src.kind.has_output()
            && src.outputs.len() < src.max_output_connections
            && matches!(dst.inputs.get(slot), Some(None))
    }

    pub(crate) fn connection_record(&self, id: ConnectionId) -> Option<ConnectionRecord> {
        let conn = self.connections.get(&id)?;
        let output_index = self
            .gates
            .get(&conn.source)?
            .outputs
            .iter()
            .position(|c| *c == id)?;
        Some(ConnectionRecord {
            id,
            source: conn.source,
            target: conn.target,
            slot: conn.slot,
            output_index,
        })
    }

    pub(crate) fn insert_gate(&mut self, kind: GateKind, position: Position) -> GateId {
        let id = GateId(self.next_gate);
        self.next_gate += 1;
        self.gates
            .insert(id, Gate::new(id, kind, position, self.default_max_outputs));
        self.scheduler.schedule(id);
        debug!(gate = %id, kind = kind.as_str(), "added gate");
        id
    }

    /// Put a gate back under its original id. The gate must carry no
    /// connections; those are restored separately.
    pub(crate) fn restore_gate(&mut self, gate: Gate) -> bool {
        if self.gates.contains_key(&gate.id) {
            return false;
        }
        let id = gate.id;
        self.next_gate = self.next_gate.max(id.0 + 1);
        let mut gate = gate;
        gate.inputs = vec![None; gate.kind.input_count()];
        gate.outputs.clear();
        self.gates.insert(id, gate);
        self.scheduler.schedule(id);
        debug!(gate = %id, "restored gate");
        true
    }

    /// Remove a gate and every connection touching it.
    pub(crate) fn remove_gate(&mut self, id: GateId) -> Option<RemovedGate> {
        let gate = self.gates.get(&id)?;
        let touching: Vec<ConnectionId> = gate
            .inputs
            .iter()
            .flatten()
            .copied()
            .chain(gate.outputs.iter().copied())
            .collect();
        let mut connections = Vec::with_capacity(touching.len());
        for cid in touching {
            if let Some(record) = self.disconnect(cid) {
                connections.push(record);
            }
        }
        let gate = self.gates.remove(&id)?;
        self.scheduler.forget(id);
        debug!(
            gate = %id,
            kind = gate.kind.as_str(),
            connections = connections.len(),
            "removed gate"
        );
        Some(RemovedGate { gate, connections })
    }

    /// Undo a [`Circuit::remove_gate`]: the gate first, then its connections
    /// in reverse removal order.
    pub(crate) fn restore_removed(&mut self, removed: &RemovedGate) -> bool {
        if !self.restore_gate(removed.gate.clone()) {
            return false;
        }
        for record in removed.connections.iter().rev() {
            self.restore_connection(record);
        }
        true
    }

    /// Wire `source`'s output into `target`'s input `slot`. No-op when the
    /// slot is taken, the source is at its fan-out bound, either gate is
    /// missing or the slot does not exist.
    pub(crate) fn connect(
        &mut self,
        source: GateId,
        target: GateId,
        slot: usize,
    ) -> Option<ConnectionId> {
        if !self.can_connect(source, target, slot) {
            debug!(%source, %target, slot, "connection rejected");
            return None;
        }
        let id = ConnectionId(self.next_connection);
        self.next_connection += 1;
        let active = self.attach(id, source, target, slot, usize::MAX);
        self.connections.insert(
            id,
            Connection {
                id,
                source,
                target,
                slot,
                active,
            },
        );
        self.scheduler.schedule(target);
        debug!(connection = %id, %source, %target, slot, "connected");
        Some(id)
    }

    /// Put a removed connection back under its original id and at its
    /// original position in the source's output list.
    pub(crate) fn restore_connection(&mut self, record: &ConnectionRecord) -> bool {
        if self.connections.contains_key(&record.id)
            || !self.can_connect(record.source, record.target, record.slot)
        {
            return false;
        }
        self.next_connection = self.next_connection.max(record.id.0 + 1);
        let active = self.attach(
            record.id,
            record.source,
            record.target,
            record.slot,
            record.output_index,
        );
        self.connections.insert(
            record.id,
            Connection {
                id: record.id,
                source: record.source,
                target: record.target,
                slot: record.slot,
                active,
            },
        );
        self.scheduler.schedule(record.target);
        true
    }

    fn attach(
        &mut self,
        id: ConnectionId,
        source: GateId,
        target: GateId,
        slot: usize,
        index: usize,
    ) -> bool {
        let mut active = false;
        if let Some(src) = self.gates.get_mut(&source) {
            let index = index.min(src.outputs.len());
            src.outputs.insert(index, id);
            active = src.cached_state;
        }
        if let Some(entry) = self.gates.get_mut(&target).and_then(|g| g.inputs.get_mut(slot)) {
            *entry = Some(id);
        }
        active
    }

    pub(crate) fn disconnect(&mut self, id: ConnectionId) -> Option<ConnectionRecord> {
        let conn = self.connections.remove(&id)?;
        let mut output_index = 0;
        if let Some(src) = self.gates.get_mut(&conn.source) {
            if let Some(pos) = src.outputs.iter().position(|c| *c == id) {
                src.outputs.remove(pos);
                output_index = pos;
            }
        }
        if let Some(entry) = self
            .gates
            .get_mut(&conn.target)
            .and_then(|g| g.inputs.get_mut(conn.slot))
        {
            if *entry == Some(id) {
                *entry = None;
            }
        }
        self.scheduler.schedule(conn.target);
        debug!(connection = %id, source = %conn.source, target = %conn.target, "disconnected");
        Some(ConnectionRecord {
            id,
            source: conn.source,
            target: conn.target,
            slot: conn.slot,
            output_index,
        })
    }

    /// Flip a switch. Returns false for anything that is not a switch.
    pub(crate) fn toggle_switch(&mut self, id: GateId) -> bool {
        self.flip(id, GateKind::Switch)
    }

    /// Advance a clock by one half period.
    pub(crate) fn flip_clock(&mut self, id: GateId) -> bool {
        self.flip(id, GateKind::Clock)
    }

    fn flip(&mut self, id: GateId, kind: GateKind) -> bool {
        match self.gates.get_mut(&id) {
            Some(gate) if gate.kind == kind => {
                gate.memory.q = !gate.memory.q;
                self.scheduler.schedule(id);
                true
            }
            _ => false,
        }
    }

    /// Seed a gate's retained level and cached output, as a loader does.
    pub(crate) fn seed_state(&mut self, id: GateId, state: bool) {
        if let Some(gate) = self.gates.get_mut(&id) {
            gate.cached_state = state;
            if gate.kind.has_memory() {
                gate.memory.q = state;
            }
            // no clock edge on the first evaluation after a load
            gate.memory.last_clock = gate.kind.is_edge_triggered();
        }
    }

    /// Change a gate's fan-out bound. Refused when the gate has no output
    /// port or already drives more connections than `max`.
    pub fn set_max_output_connections(&mut self, id: GateId, max: usize) -> bool {
        match self.gates.get_mut(&id) {
            Some(gate) if gate.kind.has_output() && gate.outputs.len() <= max => {
                gate.max_output_connections = max;
                true
            }
            _ => false,
        }
    }

    pub(crate) fn insert_label(&mut self, text: String, position: Position) -> LabelId {
        let id = LabelId(self.next_label);
        self.next_label += 1;
        self.labels.insert(id, Label { id, text, position });
        id
    }

    pub(crate) fn restore_label(&mut self, label: Label) -> bool {
        if self.labels.contains_key(&label.id) {
            return false;
        }
        self.next_label = self.next_label.max(label.id.0 + 1);
        self.labels.insert(label.id, label);
        true
    }

    pub(crate) fn remove_label(&mut self, id: LabelId) -> Option<Label> {
        self.labels.remove(&id)
    }

    /// Describe every broken structural invariant. Empty for a sound graph.
    pub fn invariant_violations(&self) -> Vec<String> {
        let mut out = Vec::new();
        for gate in self.gates.values() {
            if gate.inputs.len() != gate.kind.input_count() {
                out.push(format!("{} has {} slots", gate.id, gate.inputs.len()));
            }
            if gate.outputs.len() > gate.max_output_connections {
                out.push(format!(
                    "{} drives {} connections over bound {}",
                    gate.id,
                    gate.outputs.len(),
                    gate.max_output_connections
                ));
            }
            for (slot, cid) in gate.inputs.iter().enumerate() {
                let Some(cid) = cid else { continue };
                match self.connections.get(cid) {
                    Some(c) if c.target == gate.id && c.slot == slot => {}
                    _ => out.push(format!("{}[{}] holds stale {}", gate.id, slot, cid)),
                }
            }
            for cid in &gate.outputs {
                match self.connections.get(cid) {
                    Some(c) if c.source == gate.id => {}
                    _ => out.push(format!("{} lists stale output {}", gate.id, cid)),
                }
            }
        }
        for conn in self.connections.values() {
            let fed = self
                .gates
                .get(&conn.target)
                .and_then(|g| g.inputs.get(conn.slot).copied().flatten());
            if fed != Some(conn.id) {
                out.push(format!("{} not registered at {}[{}]", conn.id, conn.target, conn.slot));
            }
            let listed = self
                .gates
                .get(&conn.source)
                .map_or(false, |g| g.outputs.contains(&conn.id));
            if !listed {
                out.push(format!("{} not registered at source {}", conn.id, conn.source));
            }
        }
        out
    }
}
