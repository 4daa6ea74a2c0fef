// src/bin/decode.rs
use anyhow::{bail, Context, Result};
use clap::Parser;
use crossterm::style::Stylize;
use crossterm::tty::IsTty;
use decoder_core::acoustic::scorer::{load_frame_matrix, FrameScores, PdfPriors};
use decoder_core::acoustic::TransitionModel;
use decoder_core::{logging, DecodeResult, Decoder, DecoderConfig, TransitionStore, WordLexicon};
use serde::Serialize;
use std::io::{stdout, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Parser)]
#[command(name = "decode", about = "Viterbi beam search over a binary WFST")]
struct Args {
    /// Directory holding offsets.bin and data.bin.
    #[arg(long)]
    graph: PathBuf,

    /// Transition id table (`<phone>_<hmmState>_<pdf> <id>` per line).
    #[arg(long)]
    transitions: PathBuf,

    /// Score matrices, one utterance each.
    #[arg(long, required = true, num_args = 1..)]
    scores: Vec<PathBuf>,

    /// Pdf counts; when given, score matrices are read as posteriors.
    #[arg(long)]
    priors: Option<PathBuf>,

    /// Word table used to print words instead of label ids.
    #[arg(long)]
    lexicon: Option<PathBuf>,

    /// JSON decoder configuration.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print one JSON object per utterance.
    #[arg(long, default_value_t = false)]
    json: bool,

    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

#[derive(Serialize)]
struct UtteranceReport<'a> {
    utterance: String,
    words: Vec<String>,
    #[serde(flatten)]
    result: &'a DecodeResult,
}

fn main() -> Result<()> {
    let args = Args::parse();
    logging::init(args.verbose);

    let config = match &args.config {
        Some(path) => DecoderConfig::from_json_file(path)
            .with_context(|| format!("reading config {}", path.display()))?,
        None => DecoderConfig::default(),
    };
    let store = TransitionStore::load(&args.graph, &config.store)
        .with_context(|| format!("loading graph from {}", args.graph.display()))?;
    let model = Arc::new(
        TransitionModel::load(&args.transitions)
            .with_context(|| format!("loading transitions {}", args.transitions.display()))?,
    );
    let lexicon = args
        .lexicon
        .as_deref()
        .map(WordLexicon::load)
        .transpose()
        .context("loading lexicon")?;
    let priors = args
        .priors
        .as_deref()
        .map(PdfPriors::load)
        .transpose()
        .context("loading pdf priors")?;
    let decoder = Decoder::new(Arc::new(store), config)?;

    let styled = !args.json && stdout().is_tty();
    let mut out = stdout().lock();
    let mut failures = 0usize;
    for path in &args.scores {
        match decode_one(&decoder, path, &model, priors.as_ref()) {
            Ok(result) => {
                let words = match &lexicon {
                    Some(lexicon) => result.words(lexicon),
                    None => result.word_ids.iter().map(u32::to_string).collect(),
                };
                let utterance = utterance_name(path);
                if args.json {
                    let report = UtteranceReport { utterance, words, result: &result };
                    writeln!(out, "{}", serde_json::to_string(&report)?)?;
                } else if styled {
                    let partial = if result.reached_final { "" } else { ", partial" };
                    let score = format!("({:.3}{partial})", result.score);
                    writeln!(
                        out,
                        "{} {} {}",
                        format!("{utterance}:").bold(),
                        words.join(" ").green(),
                        score.dark_grey()
                    )?;
                } else {
                    writeln!(out, "{utterance}: {}", words.join(" "))?;
                }
            }
            Err(e) => {
                failures += 1;
                tracing::error!(utterance = %path.display(), "{e:#}");
            }
        }
    }
    out.flush()?;

    if failures > 0 {
        bail!("{failures} of {} utterances failed", args.scores.len());
    }
    Ok(())
}

fn decode_one(
    decoder: &Decoder,
    path: &Path,
    model: &Arc<TransitionModel>,
    priors: Option<&PdfPriors>,
) -> Result<DecodeResult> {
    let frames = load_frame_matrix(path)
        .with_context(|| format!("reading scores {}", path.display()))?;
    let scorer = match priors {
        Some(priors) => FrameScores::from_posteriors(frames, priors, Arc::clone(model))?,
        None => FrameScores::new(frames, Arc::clone(model))?,
    };
    Ok(decoder.decode(&scorer)?)
}

fn utterance_name(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
