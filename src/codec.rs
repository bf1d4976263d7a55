//! # Circuit documents
//!
//! Translation between a live [`Circuit`] and its persistable JSON form.
//!
//! ```text
//! {
//!   "version": 1,
//!   "gates": [
//!     { "id": "g0", "type": "SWITCH", "position": {"x": 0, "y": 0},
//!       "state": true, "maxOutputConnections": 1,
//!       "inputs": [], "outputs": [{"targetId": "g1", "slotIndex": 0}] },
//!     { "id": "g1", "type": "LIGHTBULB", "position": {"x": 2, "y": 0},
//!       "state": true, "maxOutputConnections": 0,
//!       "inputs": [{"sourceId": "g0", "slotIndex": 0}], "outputs": [] }
//!   ],
//!   "labels": [{ "id": "l0", "text": "lamp", "position": {"x": 2, "y": -1} }]
//! }
//! ```
//!
//! A document is validated as a whole into a [`Fragment`] before anything is
//! built, so a rejected document never leaves a partial graph behind. The
//! same fragment is what a paste inserts.

use crate::circuit::{
    Circuit, Gate, GateId, Label, LabelId, Position, DEFAULT_MAX_OUTPUT_CONNECTIONS,
};
use crate::gate::GateKind;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use thiserror::Error;
use tracing::{debug, warn};

/// Document version written by [`save`].
pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitDoc {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub gates: Vec<GateRecord>,
    #[serde(default)]
    pub labels: Vec<LabelRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GateRecord {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub position: Option<Position>,
    #[serde(default)]
    pub state: bool,
    #[serde(default = "default_max_outputs")]
    pub max_output_connections: usize,
    #[serde(default)]
    pub inputs: Vec<InputRef>,
    #[serde(default)]
    pub outputs: Vec<OutputRef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputRef {
    pub source_id: String,
    pub slot_index: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputRef {
    pub target_id: String,
    pub slot_index: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelRecord {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub position: Option<Position>,
}

fn default_version() -> u32 {
    FORMAT_VERSION
}

fn default_max_outputs() -> usize {
    DEFAULT_MAX_OUTPUT_CONNECTIONS
}

impl Default for CircuitDoc {
    fn default() -> Self {
        CircuitDoc {
            version: FORMAT_VERSION,
            gates: Vec::new(),
            labels: Vec::new(),
        }
    }
}

/// Reasons a document cannot be turned into a graph.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("malformed document: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported document version {0}")]
    UnsupportedVersion(u32),
    #[error("record is missing `{0}`")]
    MissingField(&'static str),
    #[error("duplicate id {0}")]
    DuplicateId(String),
    #[error("unknown gate type {0:?}")]
    UnknownGateType(String),
    #[error("{gate} references unknown gate {missing}")]
    DanglingReference { gate: String, missing: String },
    #[error("{gate} has no input slot {slot}")]
    SlotOutOfRange { gate: String, slot: usize },
    #[error("{gate} input slot {slot} is fed more than once")]
    SlotOccupied { gate: String, slot: usize },
    #[error("outputs of {driver} do not mirror inputs of {gate} slot {slot}")]
    OutputMismatch {
        driver: String,
        gate: String,
        slot: usize,
    },
    #[error("{gate} drives {count} connections over its bound of {max}")]
    FanOutExceeded { gate: String, count: usize, max: usize },
    #[error("{0} has no output port")]
    NoOutputPort(String),
    #[error("{0} is wired to itself")]
    SelfLoop(String),
}

/// A validated document, with references resolved to positions in
/// [`Fragment`]'s own gate list.
#[derive(Debug, Clone, PartialEq)]
pub struct Fragment {
    pub(crate) gates: Vec<FragmentGate>,
    pub(crate) connections: Vec<FragmentWire>,
    pub(crate) labels: Vec<FragmentLabel>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct FragmentGate {
    pub(crate) key: String,
    pub(crate) kind: GateKind,
    pub(crate) position: Position,
    pub(crate) state: bool,
    pub(crate) max_outputs: usize,
}

/// Connection between two fragment gates, listed in each driver's output
/// order.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct FragmentWire {
    pub(crate) source: usize,
    pub(crate) target: usize,
    pub(crate) slot: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct FragmentLabel {
    pub(crate) key: String,
    pub(crate) text: String,
    pub(crate) position: Position,
}

impl Fragment {
    pub fn gate_count(&self) -> usize {
        self.gates.len()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn label_count(&self) -> usize {
        self.labels.len()
    }
}

/// Validate a document without building anything.
pub fn resolve(doc: &CircuitDoc) -> Result<Fragment, CodecError> {
    if doc.version != FORMAT_VERSION {
        return Err(CodecError::UnsupportedVersion(doc.version));
    }

    let mut index: HashMap<&str, usize> = HashMap::with_capacity(doc.gates.len());
    let mut gates = Vec::with_capacity(doc.gates.len());
    for (i, rec) in doc.gates.iter().enumerate() {
        if rec.id.is_empty() {
            return Err(CodecError::MissingField("id"));
        }
        if index.insert(rec.id.as_str(), i).is_some() {
            return Err(CodecError::DuplicateId(rec.id.clone()));
        }
        let position = rec.position.ok_or(CodecError::MissingField("position"))?;
        let kind: GateKind = rec
            .kind
            .parse()
            .map_err(|_| CodecError::UnknownGateType(rec.kind.clone()))?;
        if !kind.has_output() && !rec.outputs.is_empty() {
            return Err(CodecError::NoOutputPort(rec.id.clone()));
        }
        let max_outputs = if kind.has_output() {
            rec.max_output_connections
        } else {
            0
        };
        if rec.outputs.len() > max_outputs {
            return Err(CodecError::FanOutExceeded {
                gate: rec.id.clone(),
                count: rec.outputs.len(),
                max: max_outputs,
            });
        }
        gates.push(FragmentGate {
            key: rec.id.clone(),
            kind,
            position,
            state: rec.state,
            max_outputs,
        });
    }

    let lookup = |from: &str, id: &str| {
        index
            .get(id)
            .copied()
            .ok_or_else(|| CodecError::DanglingReference {
                gate: from.to_string(),
                missing: id.to_string(),
            })
    };

    // (driver, target, slot) as declared by the targets' inputs
    let mut fed: HashSet<(usize, usize, usize)> = HashSet::new();
    for (target, rec) in doc.gates.iter().enumerate() {
        let mut slots = BTreeSet::new();
        for input in &rec.inputs {
            let source = lookup(&rec.id, &input.source_id)?;
            if input.slot_index >= gates[target].kind.input_count() {
                return Err(CodecError::SlotOutOfRange {
                    gate: rec.id.clone(),
                    slot: input.slot_index,
                });
            }
            if !slots.insert(input.slot_index) {
                return Err(CodecError::SlotOccupied {
                    gate: rec.id.clone(),
                    slot: input.slot_index,
                });
            }
            if source == target {
                return Err(CodecError::SelfLoop(rec.id.clone()));
            }
            if !gates[source].kind.has_output() {
                return Err(CodecError::NoOutputPort(input.source_id.clone()));
            }
            fed.insert((source, target, input.slot_index));
        }
    }

    let mut connections = Vec::with_capacity(fed.len());
    let mut seen = HashSet::with_capacity(fed.len());
    for (source, rec) in doc.gates.iter().enumerate() {
        for output in &rec.outputs {
            let target = lookup(&rec.id, &output.target_id)?;
            let wire = (source, target, output.slot_index);
            if !fed.contains(&wire) || !seen.insert(wire) {
                return Err(CodecError::OutputMismatch {
                    driver: rec.id.clone(),
                    gate: output.target_id.clone(),
                    slot: output.slot_index,
                });
            }
            connections.push(FragmentWire {
                source,
                target,
                slot: output.slot_index,
            });
        }
    }
    if let Some(&(source, target, slot)) = fed.iter().find(|w| !seen.contains(*w)) {
        return Err(CodecError::OutputMismatch {
            driver: doc.gates[source].id.clone(),
            gate: doc.gates[target].id.clone(),
            slot,
        });
    }

    let mut label_ids = HashSet::with_capacity(doc.labels.len());
    let mut labels = Vec::with_capacity(doc.labels.len());
    for rec in &doc.labels {
        if rec.id.is_empty() {
            return Err(CodecError::MissingField("id"));
        }
        if !label_ids.insert(rec.id.as_str()) {
            return Err(CodecError::DuplicateId(rec.id.clone()));
        }
        labels.push(FragmentLabel {
            key: rec.id.clone(),
            text: rec.text.clone(),
            position: rec.position.ok_or(CodecError::MissingField("position"))?,
        });
    }

    Ok(Fragment {
        gates,
        connections,
        labels,
    })
}

/// Build a circuit from a document with default settings.
pub fn load(doc: &CircuitDoc) -> Result<Circuit, CodecError> {
    load_with(doc, Circuit::new())
}

/// Build the document's graph inside `base`, which must be empty and carries
/// the fan-out and propagation settings to use.
///
/// Ids of the form `g<n>` and `l<n>` are kept. Any other id, or one already
/// present in `base`, is replaced with a freshly minted id.
pub fn load_with(doc: &CircuitDoc, base: Circuit) -> Result<Circuit, CodecError> {
    let fragment = resolve(doc).map_err(|err| {
        warn!(error = %err, "rejected circuit document");
        err
    })?;
    let mut circuit = base;

    let mut ids: Vec<Option<GateId>> = vec![None; fragment.gates.len()];
    for (slot, item) in ids.iter_mut().zip(&fragment.gates) {
        let Some(id) = GateId::parse(&item.key) else {
            continue;
        };
        let gate = Gate::new(id, item.kind, item.position, item.max_outputs);
        if circuit.restore_gate(gate) {
            *slot = Some(id);
        }
    }
    let mut resolved = Vec::with_capacity(ids.len());
    for (id, item) in ids.into_iter().zip(&fragment.gates) {
        let id = match id {
            Some(id) => id,
            None => {
                let id = circuit.insert_gate(item.kind, item.position);
                circuit.set_max_output_connections(id, item.max_outputs);
                id
            }
        };
        resolved.push(id);
    }

    for wire in &fragment.connections {
        let (source, target) = (resolved[wire.source], resolved[wire.target]);
        if circuit.connect(source, target, wire.slot).is_none() {
            return Err(CodecError::OutputMismatch {
                driver: source.to_string(),
                gate: target.to_string(),
                slot: wire.slot,
            });
        }
    }
    for (id, item) in resolved.iter().zip(&fragment.gates) {
        circuit.seed_state(*id, item.state);
    }

    for item in &fragment.labels {
        let kept = LabelId::parse(&item.key).is_some_and(|id| {
            circuit.restore_label(Label {
                id,
                text: item.text.clone(),
                position: item.position,
            })
        });
        if !kept {
            circuit.insert_label(item.text.clone(), item.position);
        }
    }

    circuit.schedule_all();
    circuit.flush();
    debug!(
        gates = circuit.gate_count(),
        connections = circuit.connection_count(),
        labels = fragment.labels.len(),
        "loaded circuit"
    );
    Ok(circuit)
}

/// Snapshot the whole circuit.
pub fn save(circuit: &Circuit) -> CircuitDoc {
    let gates: Vec<GateId> = circuit.gate_ids();
    let labels: Vec<LabelId> = circuit.labels().map(|l| l.id).collect();
    let doc = snapshot(circuit, &gates, &labels, Position::default(), true);
    debug!(gates = doc.gates.len(), labels = doc.labels.len(), "saved circuit");
    doc
}

/// Snapshot without signal levels: two circuits with the same wiring,
/// placement and ids compare equal whatever their switches are set to.
pub fn save_structure(circuit: &Circuit) -> CircuitDoc {
    let gates: Vec<GateId> = circuit.gate_ids();
    let labels: Vec<LabelId> = circuit.labels().map(|l| l.id).collect();
    snapshot(circuit, &gates, &labels, Position::default(), false)
}

/// Clipboard document for a selection: the selected gates and labels,
/// connections whose both ends are selected, and positions relative to the
/// selection's top-left corner.
pub fn copy_selection(circuit: &Circuit, gates: &[GateId], labels: &[LabelId]) -> CircuitDoc {
    let gates: Vec<GateId> = gates
        .iter()
        .copied()
        .filter(|id| circuit.gate(*id).is_some())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let labels: Vec<LabelId> = labels
        .iter()
        .copied()
        .filter(|id| circuit.label(*id).is_some())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let positions = gates
        .iter()
        .filter_map(|id| circuit.gate(*id).map(|g| g.position))
        .chain(labels.iter().filter_map(|id| circuit.label(*id).map(|l| l.position)));
    let origin = positions
        .reduce(|a, b| Position::new(a.x.min(b.x), a.y.min(b.y)))
        .unwrap_or_default();
    snapshot(circuit, &gates, &labels, origin, true)
}

fn snapshot(
    circuit: &Circuit,
    gates: &[GateId],
    labels: &[LabelId],
    origin: Position,
    with_state: bool,
) -> CircuitDoc {
    let selected: HashSet<GateId> = gates.iter().copied().collect();
    let mut doc = CircuitDoc::default();
    for gate in gates.iter().filter_map(|id| circuit.gate(*id)) {
        let state = if gate.kind.has_memory() {
            gate.memory().q
        } else {
            gate.cached_state()
        };
        let inputs = gate
            .inputs()
            .iter()
            .flatten()
            .filter_map(|cid| circuit.connection(*cid))
            .filter(|c| selected.contains(&c.source))
            .map(|c| InputRef {
                source_id: c.source.to_string(),
                slot_index: c.slot,
            })
            .collect();
        let outputs = gate
            .outputs()
            .iter()
            .filter_map(|cid| circuit.connection(*cid))
            .filter(|c| selected.contains(&c.target))
            .map(|c| OutputRef {
                target_id: c.target.to_string(),
                slot_index: c.slot,
            })
            .collect();
        doc.gates.push(GateRecord {
            id: gate.id.to_string(),
            kind: gate.kind.as_str().to_string(),
            position: Some(gate.position.relative_to(origin)),
            state: with_state && state,
            max_output_connections: gate.max_output_connections(),
            inputs,
            outputs,
        });
    }
    for label in labels.iter().filter_map(|id| circuit.label(*id)) {
        doc.labels.push(LabelRecord {
            id: label.id.to_string(),
            text: label.text.clone(),
            position: Some(label.position.relative_to(origin)),
        });
    }
    doc
}

pub fn from_json(text: &str) -> Result<CircuitDoc, CodecError> {
    Ok(serde_json::from_str(text)?)
}

pub fn to_json_pretty(doc: &CircuitDoc) -> Result<String, CodecError> {
    Ok(serde_json::to_string_pretty(doc)?)
}

/// Hex BLAKE3 digest of the document's compact JSON.
pub fn doc_hash(doc: &CircuitDoc) -> String {
    let canon = serde_json::to_vec(doc).unwrap_or_default();
    hex::encode(blake3::hash(&canon).as_bytes())
}

/// Identity of the circuit including signal levels.
pub fn circuit_hash(circuit: &Circuit) -> String {
    doc_hash(&save(circuit))
}

/// Identity of the circuit's wiring, placement and ids only.
pub fn structure_hash(circuit: &Circuit) -> String {
    doc_hash(&save_structure(circuit))
}

#[cfg(test)]
mod tests {
    use super::*;

    const LAMP: &str = r#"{
        "version": 1,
        "gates": [
            {"id": "g0", "type": "SWITCH", "position": {"x": 0, "y": 0}, "state": true,
             "maxOutputConnections": 1, "inputs": [],
             "outputs": [{"targetId": "g1", "slotIndex": 0}]},
            {"id": "g1", "type": "LIGHTBULB", "position": {"x": 2, "y": 0}, "state": false,
             "maxOutputConnections": 0, "inputs": [{"sourceId": "g0", "slotIndex": 0}],
             "outputs": []}
        ],
        "labels": [{"id": "l0", "text": "lamp", "position": {"x": 2, "y": -1}}]
    }"#;

    fn gate(id: &str, kind: &str) -> GateRecord {
        GateRecord {
            id: id.to_string(),
            kind: kind.to_string(),
            position: Some(Position::default()),
            state: false,
            max_output_connections: 1,
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    fn wire(doc: &mut CircuitDoc, from: usize, to: usize, slot: usize) {
        let source_id = doc.gates[from].id.clone();
        let target_id = doc.gates[to].id.clone();
        doc.gates[from].outputs.push(OutputRef { target_id, slot_index: slot });
        doc.gates[to].inputs.push(InputRef { source_id, slot_index: slot });
    }

    fn doc(gates: Vec<GateRecord>) -> CircuitDoc {
        CircuitDoc {
            gates,
            ..CircuitDoc::default()
        }
    }

    #[test]
    fn loads_camel_case_document() {
        let doc = from_json(LAMP).unwrap();
        assert_eq!(doc.gates[0].max_output_connections, 1);
        let c = load(&doc).unwrap();
        let bulb = c.gate(GateId(1)).unwrap();
        assert!(bulb.cached_state(), "bulb recomputed from the switch");
        assert_eq!(c.label(LabelId(0)).unwrap().text, "lamp");
        let text = to_json_pretty(&save(&c)).unwrap();
        assert!(text.contains("\"maxOutputConnections\""));
        assert!(text.contains("\"slotIndex\""));
        assert!(text.contains("\"type\": \"LIGHTBULB\""));
    }

    #[test]
    fn save_load_preserves_ids_and_hash() {
        let c = load(&from_json(LAMP).unwrap()).unwrap();
        let saved = save(&c);
        let again = load(&saved).unwrap();
        assert_eq!(save(&again), saved);
        assert_eq!(circuit_hash(&again), circuit_hash(&c));
        assert_eq!(circuit_hash(&c).len(), 64);
    }

    #[test]
    fn foreign_ids_are_reminted_consistently() {
        let mut d = doc(vec![gate("a", "HIGH_CONST"), gate("g0", "NOT"), gate("b", "BUFFER")]);
        wire(&mut d, 0, 1, 0);
        wire(&mut d, 1, 2, 0);
        let c = load(&d).unwrap();
        assert_eq!(c.gate(GateId(0)).unwrap().kind, GateKind::Not);
        assert_eq!(c.gate_count(), 3);
        assert_eq!(c.connection_count(), 2);
        assert!(c.invariant_violations().is_empty());
        let buffer = c.gates().find(|g| g.kind == GateKind::Buffer).unwrap();
        assert!(!buffer.cached_state());
    }

    #[test]
    fn unknown_type_is_rejected() {
        let err = load(&doc(vec![gate("g0", "FLUX_CAPACITOR")])).unwrap_err();
        assert!(matches!(err, CodecError::UnknownGateType(t) if t == "FLUX_CAPACITOR"));
    }

    #[test]
    fn structural_errors_are_rejected() {
        let err = load(&doc(vec![gate("g0", "AND"), gate("g0", "OR")])).unwrap_err();
        assert!(matches!(err, CodecError::DuplicateId(_)));

        let err = load(&doc(vec![gate("", "AND")])).unwrap_err();
        assert!(matches!(err, CodecError::MissingField("id")));

        let unplaced = r#"{"version": 1,
            "gates": [{"id": "g0", "type": "AND", "inputs": [], "outputs": []}]}"#;
        let err = load(&from_json(unplaced).unwrap()).unwrap_err();
        assert!(matches!(err, CodecError::MissingField("position")));

        let mut d = doc(vec![gate("g0", "AND")]);
        d.labels.push(LabelRecord { id: "l0".into(), text: "x".into(), position: None });
        assert!(matches!(load(&d).unwrap_err(), CodecError::MissingField("position")));

        let mut d = doc(vec![gate("g0", "NOT")]);
        d.gates[0].inputs.push(InputRef { source_id: "g9".into(), slot_index: 0 });
        assert!(matches!(load(&d).unwrap_err(), CodecError::DanglingReference { .. }));

        let mut d = doc(vec![gate("g0", "SWITCH"), gate("g1", "NOT")]);
        wire(&mut d, 0, 1, 1);
        assert!(matches!(load(&d).unwrap_err(), CodecError::SlotOutOfRange { slot: 1, .. }));

        let mut d = doc(vec![gate("g0", "SWITCH"), gate("g1", "SWITCH"), gate("g2", "NOT")]);
        wire(&mut d, 0, 2, 0);
        wire(&mut d, 1, 2, 0);
        assert!(matches!(load(&d).unwrap_err(), CodecError::SlotOccupied { .. }));

        let mut d = doc(vec![gate("g0", "SWITCH"), gate("g1", "NOT")]);
        wire(&mut d, 0, 1, 0);
        d.gates[0].outputs.clear();
        assert!(matches!(load(&d).unwrap_err(), CodecError::OutputMismatch { .. }));

        let mut d = doc(vec![gate("g0", "SWITCH"), gate("g1", "NOT"), gate("g2", "NOT")]);
        wire(&mut d, 0, 1, 0);
        wire(&mut d, 0, 2, 0);
        assert!(matches!(load(&d).unwrap_err(), CodecError::FanOutExceeded { count: 2, .. }));

        let mut d = doc(vec![gate("g0", "LIGHTBULB"), gate("g1", "NOT")]);
        wire(&mut d, 0, 1, 0);
        assert!(matches!(load(&d).unwrap_err(), CodecError::NoOutputPort(_)));

        let d = CircuitDoc { version: 7, ..CircuitDoc::default() };
        assert!(matches!(load(&d).unwrap_err(), CodecError::UnsupportedVersion(7)));

        assert!(matches!(from_json("{\"gates\": 3}").unwrap_err(), CodecError::Json(_)));
    }

    #[test]
    fn load_does_not_fabricate_a_clock_edge() {
        let mut d = doc(vec![
            gate("g0", "HIGH_CONST"),
            gate("g1", "HIGH_CONST"),
            gate("g2", "D_FLIPFLOP_EDGE"),
        ]);
        wire(&mut d, 0, 2, 0);
        wire(&mut d, 1, 2, 1);
        let c = load(&d).unwrap();
        assert!(!c.gate(GateId(2)).unwrap().cached_state());
        assert!(!c.gate(GateId(2)).unwrap().memory().q);
    }

    #[test]
    fn copy_selection_keeps_internal_wiring_only() {
        let mut c = Circuit::new();
        let sw = c.insert_gate(GateKind::Switch, Position::new(5.0, 5.0));
        let not = c.insert_gate(GateKind::Not, Position::new(7.0, 4.0));
        let bulb = c.insert_gate(GateKind::LightBulb, Position::new(9.0, 4.0));
        c.connect(sw, not, 0);
        c.connect(not, bulb, 0);
        let label = c.insert_label("inv".into(), Position::new(6.0, 3.0));
        c.flush();

        let clip = copy_selection(&c, &[not, bulb], &[label]);
        assert_eq!(clip.gates.len(), 2);
        assert!(clip.gates[0].inputs.is_empty());
        assert_eq!(clip.gates[0].outputs.len(), 1);
        assert_eq!(clip.gates[0].position, Some(Position::new(1.0, 1.0)));
        assert_eq!(clip.labels[0].position, Some(Position::new(0.0, 0.0)));

        let fragment = resolve(&clip).unwrap();
        assert_eq!(fragment.gate_count(), 2);
        assert_eq!(fragment.connection_count(), 1);
        assert_eq!(fragment.label_count(), 1);
    }

    #[test]
    fn structure_hash_ignores_levels() {
        let mut c = load(&from_json(LAMP).unwrap()).unwrap();
        let structure = structure_hash(&c);
        let full = circuit_hash(&c);
        c.toggle_switch(GateId(0));
        c.flush();
        assert_eq!(structure_hash(&c), structure);
        assert_ne!(circuit_hash(&c), full);
    }
}
