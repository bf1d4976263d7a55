use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use logic_circuit::codec::{self, CircuitDoc};
use logic_circuit::gate::{GateKind, ALL_KINDS};
use logic_circuit::{stress, GateId, Position, Session, SessionConfig};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Parser)]
#[command(name = "circuit", version, about = "Logic circuit simulator")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Session settings as JSON
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// List gate types and their input slots
    Kinds,
    /// Print the static truth table of a gate type
    TruthTable {
        #[arg(long)]
        kind: String,
    },
    /// Build a half adder and a clocked flip-flop and show their levels
    Demo {
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Load a circuit, tick every clock and print the settled levels
    Run {
        #[arg(long)]
        file: PathBuf,
        #[arg(long, default_value_t = 0)]
        ticks: usize,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Validate a circuit document and print its hash
    Verify {
        #[arg(long)]
        file: PathBuf,
    },
    /// Random edit, undo and redo sequences
    Stress {
        #[arg(long, default_value_t = 0)]
        seed: u64,
        #[arg(long, default_value_t = 1000)]
        edits: usize,
        #[arg(long, default_value_t = 8)]
        runs: usize,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt().with_env_filter(log_level).init();

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Kinds => {
            for kind in ALL_KINDS {
                let slots = kind.input_names().join(",");
                let port = if kind.has_output() { "out" } else { "-" };
                println!("{:<18} in=[{}] {}", kind.as_str(), slots, port);
            }
        }
        Commands::TruthTable { kind } => {
            let kind: GateKind = kind.parse()?;
            println!("{} | Q", kind.input_names().join(" "));
            for row in kind.truth_table() {
                let bits: Vec<&str> =
                    row.inputs.iter().map(|b| if *b { "1" } else { "0" }).collect();
                println!("{} | {}", bits.join(" "), u8::from(row.output));
            }
        }
        Commands::Demo { out } => {
            let session = demo(config)?;
            print_levels(&session);
            println!("hash={}", session.hash());
            if let Some(path) = out {
                write_doc(&path, &session.save())?;
                println!("written to {}", path.display());
            }
        }
        Commands::Run { file, ticks, out } => {
            let doc = read_doc(&file)?;
            let mut session = Session::from_doc(&doc, config)?;
            let clocks: Vec<GateId> = session
                .circuit()
                .gates()
                .filter(|g| g.kind == GateKind::Clock)
                .map(|g| g.id)
                .collect();
            for _ in 0..ticks {
                for clock in &clocks {
                    session.tick_clock(*clock);
                }
            }
            info!(ticks, clocks = clocks.len(), "run finished");
            print_levels(&session);
            println!("hash={}", session.hash());
            if let Some(path) = out {
                write_doc(&path, &session.save())?;
            }
        }
        Commands::Verify { file } => {
            let doc = read_doc(&file)?;
            let fragment = codec::resolve(&doc)?;
            println!(
                "ok gates={} connections={} labels={} hash={}",
                fragment.gate_count(),
                fragment.connection_count(),
                fragment.label_count(),
                codec::doc_hash(&doc)
            );
        }
        Commands::Stress { seed, edits, runs } => {
            let reports = stress::run_many(seed, edits, runs)?;
            for report in &reports {
                println!("{}", serde_json::to_string(report)?);
            }
            info!(runs = reports.len(), "stress passed");
        }
    }
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<SessionConfig> {
    match path {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            Ok(SessionConfig::from_json_str(&text)?)
        }
        None => Ok(SessionConfig::default()),
    }
}

fn read_doc(path: &Path) -> Result<CircuitDoc> {
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    Ok(codec::from_json(&text)?)
}

fn write_doc(path: &Path, doc: &CircuitDoc) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(path, codec::to_json_pretty(doc)?)
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

fn print_levels(session: &Session) {
    for gate in session.circuit().gates() {
        let level = u8::from(gate.cached_state());
        let mut line = format!("{} {:<18} {}", gate.id, gate.kind.as_str(), level);
        if let Some(value) = session.display_value(gate.id) {
            line.push_str(&format!(" display={value}"));
        }
        println!("{line}");
    }
}

/// Half adder on two switches plus a D flip-flop clocked by hand.
fn demo(config: SessionConfig) -> Result<Session> {
    let mut s = Session::with_config(config);
    let place = |s: &mut Session, kind: &str, x: f64, y: f64| {
        s.create_gate(kind, Position::new(x, y))
            .ok_or_else(|| anyhow!("cannot create {kind}"))
    };
    let a = place(&mut s, "SWITCH", 0.0, 0.0)?;
    let b = place(&mut s, "SWITCH", 0.0, 2.0)?;
    let xor = place(&mut s, "XOR", 2.0, 0.0)?;
    let and = place(&mut s, "AND", 2.0, 2.0)?;
    let sum = place(&mut s, "LIGHTBULB", 4.0, 0.0)?;
    let carry = place(&mut s, "LIGHTBULB", 4.0, 2.0)?;
    s.set_max_output_connections(a, 2);
    s.set_max_output_connections(b, 2);
    let wires = [
        (a, xor, 0),
        (b, xor, 1),
        (a, and, 0),
        (b, and, 1),
        (xor, sum, 0),
        (and, carry, 0),
    ];
    for (src, dst, slot) in wires {
        s.add_connection(src, dst, slot)
            .ok_or_else(|| anyhow!("cannot wire {src} into {dst}[{slot}]"))?;
    }
    s.add_label("half adder", Position::new(0.0, -1.0));

    let clk = place(&mut s, "CLOCK", 0.0, 5.0)?;
    let ff = place(&mut s, "D_FLIPFLOP_EDGE", 2.0, 4.0)?;
    let display = place(&mut s, "FOUR_BIT_DISPLAY", 4.0, 4.0)?;
    s.set_max_output_connections(xor, 2);
    s.add_connection(xor, ff, 0);
    s.add_connection(clk, ff, 1);
    s.add_connection(ff, display, 0);

    s.toggle_switch(a);
    s.tick_clock(clk);
    info!(sum = s.level(sum), carry = s.level(carry), q = s.level(ff), "demo built");
    Ok(s)
}
