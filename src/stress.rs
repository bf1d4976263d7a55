//! Randomised edit sequences against a [`Session`].
//!
//! A run applies a seeded mix of edits, undos and redos, checking the graph
//! invariants after every step. It then redoes whatever is left, unwinds the
//! whole history back to the empty circuit and replays it, comparing the
//! structure hash at both ends.
//!
//! ```rust,no_run
//! use logic_circuit::stress;
//!
//! let report = stress::run(42, 500)?;
//! println!("{} edits, final {}", report.edits, report.final_hash);
//! # Ok::<(), anyhow::Error>(())
//! ```

use crate::circuit::{GateId, Position};
use crate::codec;
use crate::config::SessionConfig;
use crate::gate::{GateKind, ALL_KINDS};
use crate::session::Session;
use anyhow::{anyhow, bail, Result};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use rayon::prelude::*;
use serde::Serialize;
use tracing::debug;

#[derive(Debug, Clone, Serialize)]
pub struct StressReport {
    pub seed: u64,
    pub edits: usize,
    pub undos: usize,
    pub redos: usize,
    pub history: usize,
    pub gates: usize,
    pub connections: usize,
    pub initial_hash: String,
    pub final_hash: String,
}

#[derive(Debug, Clone, Copy)]
enum Edit {
    AddGate,
    RemoveGate,
    Connect,
    Disconnect,
    Toggle,
    Tick,
    Label,
    CopyPaste,
    RemoveSelected,
    Undo,
    Redo,
}

const EDITS: [Edit; 11] = [
    Edit::AddGate,
    Edit::RemoveGate,
    Edit::Connect,
    Edit::Disconnect,
    Edit::Toggle,
    Edit::Tick,
    Edit::Label,
    Edit::CopyPaste,
    Edit::RemoveSelected,
    Edit::Undo,
    Edit::Redo,
];

fn pick_gate(session: &Session, rng: &mut ChaCha20Rng) -> Option<GateId> {
    session.circuit().gate_ids().choose(rng).copied()
}

fn random_position(rng: &mut ChaCha20Rng) -> Position {
    Position::new(rng.gen_range(0.0..64.0), rng.gen_range(0.0..64.0))
}

/// One seeded run of `edits` random steps.
pub fn run(seed: u64, edits: usize) -> Result<StressReport> {
    let mut rng = ChaCha20Rng::seed_from_u64(seed);
    // random wiring can oscillate, keep each flush short
    let mut session = Session::with_config(SessionConfig {
        max_propagation_steps: 2_000,
        ..SessionConfig::default()
    });
    let initial_hash = codec::structure_hash(session.circuit());
    let (mut undos, mut redos) = (0, 0);

    for step in 0..edits {
        let edit = EDITS[rng.gen_range(0..EDITS.len())];
        match edit {
            Edit::AddGate => {
                let kind = ALL_KINDS[rng.gen_range(0..ALL_KINDS.len())];
                let position = random_position(&mut rng);
                let id = session
                    .add_gate(kind, position)
                    .ok_or_else(|| anyhow!("step {step}: add_gate created nothing"))?;
                if rng.gen_bool(0.5) {
                    session.set_max_output_connections(id, rng.gen_range(1..4));
                }
            }
            Edit::RemoveGate => {
                if let Some(id) = pick_gate(&session, &mut rng) {
                    session.remove_gate(id);
                }
            }
            Edit::Connect => {
                if let (Some(source), Some(target)) =
                    (pick_gate(&session, &mut rng), pick_gate(&session, &mut rng))
                {
                    let slot = rng.gen_range(0..4);
                    let allowed = session.circuit().can_connect(source, target, slot);
                    let made = session.add_connection(source, target, slot);
                    if allowed != made.is_some() {
                        bail!(
                            "step {step}: connect {source}->{target}[{slot}] \
                             disagreed with can_connect"
                        );
                    }
                }
            }
            Edit::Disconnect => {
                let ids: Vec<_> = session.circuit().connections().map(|c| c.id).collect();
                if let Some(id) = ids.choose(&mut rng) {
                    session.remove_connection(*id);
                }
            }
            Edit::Toggle => {
                if let Some(id) = pick_gate(&session, &mut rng) {
                    session.toggle_switch(id);
                }
            }
            Edit::Tick => {
                let clocks: Vec<GateId> = session
                    .circuit()
                    .gates()
                    .filter(|g| g.kind == GateKind::Clock)
                    .map(|g| g.id)
                    .collect();
                if let Some(id) = clocks.choose(&mut rng) {
                    session.tick_clock(*id);
                }
            }
            Edit::Label => {
                let position = random_position(&mut rng);
                session.add_label(&format!("note {step}"), position);
            }
            Edit::CopyPaste => {
                let mut ids = session.circuit().gate_ids();
                ids.shuffle(&mut rng);
                ids.truncate(rng.gen_range(1..4));
                let clip = session.copy_selection(&ids, &[]);
                let at = random_position(&mut rng);
                session
                    .paste(&clip, at)
                    .map_err(|e| anyhow!("step {step}: copied selection failed to paste: {e}"))?;
            }
            Edit::RemoveSelected => {
                let mut ids = session.circuit().gate_ids();
                ids.shuffle(&mut rng);
                ids.truncate(rng.gen_range(1..4));
                let labels: Vec<_> = session.circuit().labels().map(|l| l.id).take(1).collect();
                session.remove_selected(&ids, &labels);
            }
            Edit::Undo => {
                if session.undo() {
                    undos += 1;
                }
            }
            Edit::Redo => {
                if session.redo() {
                    redos += 1;
                }
            }
        }
        let violations = session.circuit().invariant_violations();
        if !violations.is_empty() {
            bail!("step {step} ({edit:?}): {}", violations.join("; "));
        }
        if !session.circuit().pending().is_empty() {
            bail!("step {step} ({edit:?}): updates left unflushed");
        }
    }

    while session.redo() {}
    let final_hash = codec::structure_hash(session.circuit());
    let history = session.history().undo_len();

    while session.undo() {}
    let unwound = codec::structure_hash(session.circuit());
    if unwound != initial_hash {
        bail!("seed {seed}: undoing {history} commands did not restore the empty circuit");
    }
    while session.redo() {}
    let replayed = codec::structure_hash(session.circuit());
    if replayed != final_hash {
        bail!("seed {seed}: redoing {history} commands did not reproduce the final circuit");
    }

    let report = StressReport {
        seed,
        edits,
        undos,
        redos,
        history,
        gates: session.circuit().gate_count(),
        connections: session.circuit().connection_count(),
        initial_hash,
        final_hash,
    };
    debug!(seed, history, gates = report.gates, "stress run passed");
    Ok(report)
}

/// `runs` independent runs on consecutive seeds, spread over the rayon pool.
pub fn run_many(seed: u64, edits: usize, runs: usize) -> Result<Vec<StressReport>> {
    (0..runs as u64)
        .into_par_iter()
        .map(|i| run(seed.wrapping_add(i), edits))
        .collect()
}
