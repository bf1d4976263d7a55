//! Periodic timers for CLOCK gates.
//!
//! Each running clock owns a background thread that sleeps for half a period
//! and then sends a [`ClockTick`]. Ticks are only ever applied on the thread
//! that owns the circuit, when it drains the channel.

use crate::circuit::GateId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, trace};

/// One half period of a clock has elapsed. `generation` identifies the
/// `start` call that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockTick {
    pub gate: GateId,
    pub generation: u64,
}

struct Timer {
    stop: Arc<AtomicBool>,
    half_period: Duration,
    generation: u64,
}

pub struct ClockDriver {
    sender: Sender<ClockTick>,
    receiver: Receiver<ClockTick>,
    timers: HashMap<GateId, Timer>,
    next_generation: u64,
}

impl Default for ClockDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl ClockDriver {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::channel();
        ClockDriver {
            sender,
            receiver,
            timers: HashMap::new(),
            next_generation: 0,
        }
    }

    /// Start ticking `gate` every `half_period`. Returns false if it is
    /// already running.
    pub fn start(&mut self, gate: GateId, half_period: Duration) -> bool {
        if self.timers.contains_key(&gate) {
            return false;
        }
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let sender = self.sender.clone();
        let generation = self.next_generation;
        self.next_generation += 1;
        thread::spawn(move || loop {
            thread::sleep(half_period);
            if flag.load(Ordering::Acquire) {
                break;
            }
            trace!(%gate, generation, "clock tick");
            if sender.send(ClockTick { gate, generation }).is_err() {
                break;
            }
        });
        let timer = Timer {
            stop,
            half_period,
            generation,
        };
        self.timers.insert(gate, timer);
        debug!(%gate, generation, half_period_ms = half_period.as_millis() as u64, "clock started");
        true
    }

    /// Stop future ticks of `gate`. Ticks already applied stay applied.
    pub fn stop(&mut self, gate: GateId) -> bool {
        match self.timers.remove(&gate) {
            Some(timer) => {
                timer.stop.store(true, Ordering::Release);
                debug!(%gate, "clock stopped");
                true
            }
            None => false,
        }
    }

    pub fn stop_all(&mut self) {
        for (_, timer) in self.timers.drain() {
            timer.stop.store(true, Ordering::Release);
        }
    }

    pub fn is_running(&self, gate: GateId) -> bool {
        self.timers.contains_key(&gate)
    }

    pub fn half_period(&self, gate: GateId) -> Option<Duration> {
        self.timers.get(&gate).map(|t| t.half_period)
    }

    /// Running clocks, in id order.
    pub fn running(&self) -> Vec<GateId> {
        let mut ids: Vec<GateId> = self.timers.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Stop every running clock for which `keep` is false. Returns the
    /// stopped ids.
    pub fn retain(&mut self, mut keep: impl FnMut(GateId) -> bool) -> Vec<GateId> {
        let gone: Vec<GateId> = self.running().into_iter().filter(|id| !keep(*id)).collect();
        for gate in &gone {
            self.stop(*gate);
        }
        gone
    }

    /// Take every tick received so far. Ticks of clocks stopped since, or
    /// sent by an earlier start of the same gate, are dropped.
    pub fn drain(&self) -> Vec<ClockTick> {
        self.receiver
            .try_iter()
            .filter(|tick| {
                self.timers
                    .get(&tick.gate)
                    .map_or(false, |t| t.generation == tick.generation)
            })
            .collect()
    }
}

impl Drop for ClockDriver {
    fn drop(&mut self) {
        self.stop_all();
    }
}
