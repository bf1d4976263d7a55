//! # Command log
//!
//! Every structural edit is a [`Command`] that can be executed, undone and
//! executed again. Commands remember what they did by id, so undoing and
//! redoing reproduces the same gate and connection identities rather than an
//! equivalent copy.
//!
//! ## Example
//!
//! ```rust
//! use logic_circuit::circuit::{Circuit, Position};
//! use logic_circuit::command::{Command, CommandLog};
//! use logic_circuit::gate::GateKind;
//!
//! let mut circuit = Circuit::new();
//! let mut log = CommandLog::new();
//! log.execute(Command::add_gate(GateKind::And, Position::default()), &mut circuit);
//! assert_eq!(circuit.gate_count(), 1);
//! log.undo(&mut circuit);
//! assert_eq!(circuit.gate_count(), 0);
//! log.redo(&mut circuit);
//! assert_eq!(circuit.gate_count(), 1);
//! ```

use crate::circuit::{
    Circuit, ConnectionId, ConnectionRecord, Gate, GateId, Label, LabelId, Position, RemovedGate,
};
use crate::codec::Fragment;
use crate::gate::GateKind;
use tracing::debug;

/// A reversible edit.
#[derive(Debug, Clone)]
pub enum Command {
    AddGate(AddGate),
    RemoveGate(RemoveGate),
    AddConnection(AddConnection),
    RemoveConnection(RemoveConnection),
    ToggleSwitchState(ToggleSwitchState),
    AddLabel(AddLabel),
    PasteComponents(PasteComponents),
    RemoveSelected(RemoveSelected),
    SetMaxOutputConnections(SetMaxOutputConnections),
}

#[derive(Debug, Clone)]
pub struct AddGate {
    kind: GateKind,
    position: Position,
    created: Option<Gate>,
}

#[derive(Debug, Clone)]
pub struct RemoveGate {
    gate: GateId,
    removed: Option<RemovedGate>,
}

#[derive(Debug, Clone)]
pub struct AddConnection {
    source: GateId,
    target: GateId,
    slot: usize,
    attempted: bool,
    created: Option<ConnectionRecord>,
}

#[derive(Debug, Clone)]
pub struct RemoveConnection {
    connection: ConnectionId,
    removed: Option<ConnectionRecord>,
}

#[derive(Debug, Clone)]
pub struct ToggleSwitchState {
    gate: GateId,
    applied: bool,
}

#[derive(Debug, Clone)]
pub struct AddLabel {
    text: String,
    position: Position,
    created: Option<Label>,
}

/// Batch insert of a copied fragment. Ids are minted on the first execution
/// and reused by every redo.
#[derive(Debug, Clone)]
pub struct PasteComponents {
    fragment: Fragment,
    at: Position,
    minted: bool,
    gates: Vec<Gate>,
    connections: Vec<ConnectionRecord>,
    labels: Vec<Label>,
}

/// Change of a gate's fan-out bound. `previous` is set only when the new
/// bound was accepted.
#[derive(Debug, Clone)]
pub struct SetMaxOutputConnections {
    gate: GateId,
    max: usize,
    previous: Option<usize>,
}

/// Batch removal of gates and labels.
#[derive(Debug, Clone)]
pub struct RemoveSelected {
    gates: Vec<GateId>,
    labels: Vec<LabelId>,
    removed_gates: Vec<RemovedGate>,
    removed_labels: Vec<Label>,
}

impl Command {
    pub fn add_gate(kind: GateKind, position: Position) -> Self {
        Command::AddGate(AddGate {
            kind,
            position,
            created: None,
        })
    }

    pub fn remove_gate(gate: GateId) -> Self {
        Command::RemoveGate(RemoveGate {
            gate,
            removed: None,
        })
    }

    pub fn add_connection(source: GateId, target: GateId, slot: usize) -> Self {
        Command::AddConnection(AddConnection {
            source,
            target,
            slot,
            attempted: false,
            created: None,
        })
    }

    pub fn remove_connection(connection: ConnectionId) -> Self {
        Command::RemoveConnection(RemoveConnection {
            connection,
            removed: None,
        })
    }

    pub fn toggle_switch(gate: GateId) -> Self {
        Command::ToggleSwitchState(ToggleSwitchState {
            gate,
            applied: false,
        })
    }

    pub fn add_label(text: impl Into<String>, position: Position) -> Self {
        Command::AddLabel(AddLabel {
            text: text.into(),
            position,
            created: None,
        })
    }

    /// Paste a validated fragment with its top-left corner at `at`.
    pub fn paste(fragment: Fragment, at: Position) -> Self {
        Command::PasteComponents(PasteComponents {
            fragment,
            at,
            minted: false,
            gates: Vec::new(),
            connections: Vec::new(),
            labels: Vec::new(),
        })
    }

    pub fn remove_selected(gates: Vec<GateId>, labels: Vec<LabelId>) -> Self {
        Command::RemoveSelected(RemoveSelected {
            gates,
            labels,
            removed_gates: Vec::new(),
            removed_labels: Vec::new(),
        })
    }

    pub fn set_max_output_connections(gate: GateId, max: usize) -> Self {
        Command::SetMaxOutputConnections(SetMaxOutputConnections {
            gate,
            max,
            previous: None,
        })
    }

    /// Whether a fan-out bound change was accepted. False for every other
    /// command.
    pub fn bound_applied(&self) -> bool {
        matches!(self, Command::SetMaxOutputConnections(c) if c.previous.is_some())
    }

    pub fn name(&self) -> &'static str {
        match self {
            Command::AddGate(_) => "add_gate",
            Command::RemoveGate(_) => "remove_gate",
            Command::AddConnection(_) => "add_connection",
            Command::RemoveConnection(_) => "remove_connection",
            Command::ToggleSwitchState(_) => "toggle_switch",
            Command::AddLabel(_) => "add_label",
            Command::PasteComponents(_) => "paste",
            Command::RemoveSelected(_) => "remove_selected",
            Command::SetMaxOutputConnections(_) => "set_max_output_connections",
        }
    }

    /// Gates this command created, once executed.
    pub fn created_gates(&self) -> Vec<GateId> {
        match self {
            Command::AddGate(c) => c.created.iter().map(|g| g.id).collect(),
            Command::PasteComponents(c) => c.gates.iter().map(|g| g.id).collect(),
            _ => Vec::new(),
        }
    }

    /// Connection this command created, once executed.
    pub fn created_connection(&self) -> Option<ConnectionId> {
        match self {
            Command::AddConnection(c) => c.created.as_ref().map(|r| r.id),
            _ => None,
        }
    }

    pub fn created_label(&self) -> Option<LabelId> {
        match self {
            Command::AddLabel(c) => c.created.as_ref().map(|l| l.id),
            _ => None,
        }
    }

    pub fn execute(&mut self, circuit: &mut Circuit) {
        match self {
            Command::AddGate(c) => match &c.created {
                Some(gate) => {
                    circuit.restore_gate(gate.clone());
                }
                None => {
                    let id = circuit.insert_gate(c.kind, c.position);
                    c.created = circuit.gate(id).cloned();
                }
            },
            Command::RemoveGate(c) => {
                c.removed = circuit.remove_gate(c.gate);
            }
            Command::AddConnection(c) => match &c.created {
                Some(record) => {
                    circuit.restore_connection(record);
                }
                None if !c.attempted => {
                    c.attempted = true;
                    c.created = circuit
                        .connect(c.source, c.target, c.slot)
                        .and_then(|id| circuit.connection_record(id));
                }
                None => {}
            },
            Command::RemoveConnection(c) => {
                c.removed = circuit.disconnect(c.connection);
            }
            Command::ToggleSwitchState(c) => {
                c.applied = circuit.toggle_switch(c.gate);
            }
            Command::AddLabel(c) => match &c.created {
                Some(label) => {
                    circuit.restore_label(label.clone());
                }
                None => {
                    let id = circuit.insert_label(c.text.clone(), c.position);
                    c.created = circuit.label(id).cloned();
                }
            },
            Command::PasteComponents(c) => c.execute(circuit),
            Command::RemoveSelected(c) => {
                c.removed_gates = c
                    .gates
                    .iter()
                    .filter_map(|id| circuit.remove_gate(*id))
                    .collect();
                c.removed_labels = c
                    .labels
                    .iter()
                    .filter_map(|id| circuit.remove_label(*id))
                    .collect();
            }
            Command::SetMaxOutputConnections(c) => {
                let current = circuit.gate(c.gate).map(|g| g.max_output_connections());
                c.previous = match current {
                    Some(previous) if circuit.set_max_output_connections(c.gate, c.max) => {
                        Some(previous)
                    }
                    _ => None,
                };
            }
        }
    }

    pub fn undo(&mut self, circuit: &mut Circuit) {
        match self {
            Command::AddGate(c) => {
                // keep property changes made since, for the redo
                if let Some(id) = c.created.as_ref().map(|g| g.id) {
                    if let Some(removed) = circuit.remove_gate(id) {
                        c.created = Some(removed.gate);
                    }
                }
            }
            Command::RemoveGate(c) => {
                if let Some(removed) = c.removed.take() {
                    circuit.restore_removed(&removed);
                }
            }
            Command::AddConnection(c) => {
                if let Some(record) = &c.created {
                    circuit.disconnect(record.id);
                }
            }
            Command::RemoveConnection(c) => {
                if let Some(record) = c.removed.take() {
                    circuit.restore_connection(&record);
                }
            }
            Command::ToggleSwitchState(c) => {
                if c.applied {
                    circuit.toggle_switch(c.gate);
                }
            }
            Command::AddLabel(c) => {
                if let Some(label) = &c.created {
                    circuit.remove_label(label.id);
                }
            }
            Command::PasteComponents(c) => c.undo(circuit),
            Command::RemoveSelected(c) => {
                for label in c.removed_labels.drain(..).rev() {
                    circuit.restore_label(label);
                }
                for removed in c.removed_gates.drain(..).rev() {
                    circuit.restore_removed(&removed);
                }
            }
            Command::SetMaxOutputConnections(c) => {
                if let Some(previous) = c.previous.take() {
                    circuit.set_max_output_connections(c.gate, previous);
                }
            }
        }
    }
}

impl PasteComponents {
    fn execute(&mut self, circuit: &mut Circuit) {
        if self.minted {
            for gate in &self.gates {
                circuit.restore_gate(gate.clone());
            }
            for record in &self.connections {
                circuit.restore_connection(record);
            }
            for label in &self.labels {
                circuit.restore_label(label.clone());
            }
            return;
        }
        self.minted = true;
        let mut ids = Vec::with_capacity(self.fragment.gates.len());
        for item in &self.fragment.gates {
            let id = circuit.insert_gate(item.kind, item.position.offset(self.at));
            circuit.set_max_output_connections(id, item.max_outputs);
            circuit.seed_state(id, item.state);
            if let Some(gate) = circuit.gate(id) {
                self.gates.push(gate.clone());
            }
            ids.push(id);
        }
        for wire in &self.fragment.connections {
            let (Some(&source), Some(&target)) = (ids.get(wire.source), ids.get(wire.target)) else {
                continue;
            };
            let record = circuit
                .connect(source, target, wire.slot)
                .and_then(|id| circuit.connection_record(id));
            if let Some(record) = record {
                self.connections.push(record);
            }
        }
        for item in &self.fragment.labels {
            let id = circuit.insert_label(item.text.clone(), item.position.offset(self.at));
            if let Some(label) = circuit.label(id) {
                self.labels.push(label.clone());
            }
        }
        debug!(
            gates = self.gates.len(),
            connections = self.connections.len(),
            labels = self.labels.len(),
            "pasted fragment"
        );
    }

    fn undo(&mut self, circuit: &mut Circuit) {
        for label in self.labels.iter().rev() {
            circuit.remove_label(label.id);
        }
        for record in self.connections.iter().rev() {
            circuit.disconnect(record.id);
        }
        for gate in self.gates.iter_mut().rev() {
            if let Some(removed) = circuit.remove_gate(gate.id) {
                *gate = removed.gate;
            }
        }
    }
}

/// Linear undo/redo history. Executing a new command discards the redo stack.
#[derive(Debug, Default)]
pub struct CommandLog {
    undo_stack: Vec<Command>,
    redo_stack: Vec<Command>,
    history_limit: Option<usize>,
}

impl CommandLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep at most `limit` undoable commands, dropping the oldest.
    pub fn with_history_limit(limit: Option<usize>) -> Self {
        CommandLog {
            history_limit: limit,
            ..Self::default()
        }
    }

    pub fn execute(&mut self, mut command: Command, circuit: &mut Circuit) {
        command.execute(circuit);
        debug!(command = command.name(), "executed");
        self.undo_stack.push(command);
        self.redo_stack.clear();
        if let Some(limit) = self.history_limit {
            let excess = self.undo_stack.len().saturating_sub(limit);
            self.undo_stack.drain(..excess);
        }
    }

    /// Reverse the latest command. Returns false when there is nothing to undo.
    pub fn undo(&mut self, circuit: &mut Circuit) -> bool {
        let Some(mut command) = self.undo_stack.pop() else {
            return false;
        };
        command.undo(circuit);
        debug!(command = command.name(), "undone");
        self.redo_stack.push(command);
        true
    }

    /// Re-apply the latest undone command. Returns false when there is
    /// nothing to redo.
    pub fn redo(&mut self, circuit: &mut Circuit) -> bool {
        let Some(mut command) = self.redo_stack.pop() else {
            return false;
        };
        command.execute(circuit);
        debug!(command = command.name(), "redone");
        self.undo_stack.push(command);
        true
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_len(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_len(&self) -> usize {
        self.redo_stack.len()
    }

    /// The most recently executed or redone command.
    pub fn last(&self) -> Option<&Command> {
        self.undo_stack.last()
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }
}
