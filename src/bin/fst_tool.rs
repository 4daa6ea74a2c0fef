// src/bin/fst_tool.rs
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use decoder_core::config::StoreConfig;
use decoder_core::core::types::StateId;
use decoder_core::persistence::convert_text_to_binary;
use decoder_core::{logging, TransitionStore};
use std::io::{stdout, BufWriter, Write};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "fst_tool", about = "Convert and inspect binary transition stores")]
struct Cli {
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Convert a text WFST into offsets.bin and data.bin.
    Convert { text: PathBuf, out_dir: PathBuf },
    /// Print a binary store back as a text WFST.
    Dump { dir: PathBuf },
    /// Print state, record and label counts.
    Stats { dir: PathBuf },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    match cli.command {
        Command::Convert { text, out_dir } => {
            let summary = convert_text_to_binary(&text, &out_dir)
                .with_context(|| format!("converting {}", text.display()))?;
            println!(
                "{} states, {} records written to {}",
                summary.states,
                summary.records,
                out_dir.display()
            );
        }
        Command::Dump { dir } => {
            let store = load(&dir)?;
            store.write_text(BufWriter::new(stdout().lock()))?;
        }
        Command::Stats { dir } => {
            let store = load(&dir)?;
            let (mut arcs, mut input_epsilons, mut outputs) = (0usize, 0usize, 0usize);
            for state in 0..store.state_count() as StateId {
                for transition in store.transitions(state)? {
                    arcs += 1;
                    input_epsilons += usize::from(transition.is_input_epsilon());
                    outputs += usize::from(transition.has_output());
                }
            }
            let mut out = stdout().lock();
            writeln!(out, "states:          {}", store.state_count())?;
            writeln!(out, "records:         {}", store.record_count())?;
            writeln!(out, "arcs:            {arcs}")?;
            writeln!(out, "input epsilons:  {input_epsilons}")?;
            writeln!(out, "output labels:   {outputs}")?;
            writeln!(out, "final states:    {}", store.final_states().len())?;
            writeln!(out, "blocks:          {} x {}", store.block_count(), store.block_size())?;
        }
    }
    Ok(())
}

fn load(dir: &std::path::Path) -> Result<TransitionStore> {
    TransitionStore::load(dir, &StoreConfig::default())
        .with_context(|| format!("loading store from {}", dir.display()))
}
