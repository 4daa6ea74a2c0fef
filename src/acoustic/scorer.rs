// File: src/acoustic/scorer.rs
use crate::acoustic::transitions::TransitionModel;
use crate::core::types::TransitionId;
use crate::error::{DecoderError, Result, ResultExt};
use std::fs;
use std::path::Path;
use std::sync::Arc;

/// Scale applied to log pdf priors before they are subtracted from posteriors.
pub const PRIOR_SCALE: f32 = 0.7;

/// Source of per-frame acoustic log-likelihoods for one utterance.
pub trait AcousticScorer {
    fn frame_count(&self) -> usize;

    /// Log-likelihood of `transition_id` at `frame`; higher is better.
    fn log_likelihood(&self, frame: usize, transition_id: TransitionId) -> Result<f32>;
}

/// Log pdf priors estimated from training alignment counts.
#[derive(Debug, Clone)]
pub struct PdfPriors {
    log_priors: Vec<f32>,
}

impl PdfPriors {
    pub fn load(path: &Path) -> Result<Self> {
        Self::from_counts(&fs::read_to_string(path)?)
    }

    /// Parses `[ c0 c1 ... ]`. Counts are normalised to probabilities, moved
    /// to the log domain and scaled by [`PRIOR_SCALE`].
    pub fn from_counts(text: &str) -> Result<Self> {
        let counts = text
            .split_whitespace()
            .map(|token| token.trim_matches(|c: char| c == '[' || c == ']'))
            .filter(|token| !token.is_empty())
            .map(|token| token.parse::<f32>().malformed(&format!("bad pdf count '{token}'")))
            .collect::<Result<Vec<f32>>>()?;

        if counts.iter().any(|&c| c < 0.0 || !c.is_finite()) {
            return Err(DecoderError::Malformed(
                "pdf counts must be finite and non-negative".into(),
            ));
        }
        let total: f32 = counts.iter().sum();
        if total <= 0.0 {
            return Err(DecoderError::Malformed("pdf counts sum to zero".into()));
        }
        let log_priors = counts
            .iter()
            .map(|&count| (count / total).max(f32::MIN_POSITIVE).ln() * PRIOR_SCALE)
            .collect();
        Ok(Self { log_priors })
    }

    /// Turns linear posteriors into scaled log-likelihoods in place.
    pub fn apply(&self, posteriors: &mut [f32]) -> Result<()> {
        if posteriors.len() != self.log_priors.len() {
            return Err(DecoderError::Malformed(format!(
                "frame has {} pdfs but there are {} priors",
                posteriors.len(),
                self.log_priors.len()
            )));
        }
        for (value, prior) in posteriors.iter_mut().zip(&self.log_priors) {
            *value = value.ln() - prior;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.log_priors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.log_priors.is_empty()
    }
}

/// Pdf log-likelihood matrix of one utterance, looked up through the
/// transition model.
#[derive(Debug, Clone)]
pub struct FrameScores {
    frames: Vec<Vec<f32>>,
    model: Arc<TransitionModel>,
}

impl FrameScores {
    /// Every frame must have the same width and cover every pdf of `model`.
    pub fn new(frames: Vec<Vec<f32>>, model: Arc<TransitionModel>) -> Result<Self> {
        if let Some(first) = frames.first() {
            let width = first.len();
            let ragged = frames.iter().enumerate().find(|(_, row)| row.len() != width);
            if let Some((frame, row)) = ragged {
                return Err(DecoderError::Malformed(format!(
                    "frame {frame} has {} scores, frame 0 has {width}",
                    row.len()
                )));
            }
            if let Some(max_pdf) = model.max_pdf() {
                if max_pdf as usize >= width {
                    return Err(DecoderError::Malformed(format!(
                        "transition model references pdf {max_pdf} \
                         but frames only have {width} scores"
                    )));
                }
            }
        }
        Ok(Self { frames, model })
    }

    /// Builds scores from network posteriors by subtracting the pdf priors.
    pub fn from_posteriors(
        mut posteriors: Vec<Vec<f32>>,
        priors: &PdfPriors,
        model: Arc<TransitionModel>,
    ) -> Result<Self> {
        for frame in posteriors.iter_mut() {
            priors.apply(frame)?;
        }
        Self::new(posteriors, model)
    }
}

impl AcousticScorer for FrameScores {
    fn frame_count(&self) -> usize {
        self.frames.len()
    }

    fn log_likelihood(&self, frame: usize, transition_id: TransitionId) -> Result<f32> {
        let unit = self
            .model
            .unit(transition_id)
            .ok_or(DecoderError::UnknownTransition(transition_id))?;
        let Some(pdf) = unit.pdf() else {
            return Ok(0.0);
        };
        let row = self.frames.get(frame).ok_or_else(|| {
            DecoderError::Malformed(format!(
                "frame {frame} is past the last of {} frames",
                self.frames.len()
            ))
        })?;
        Ok(row[pdf as usize])
    }
}

/// Reads a text matrix: one frame per line, whitespace separated values.
/// Bracket tokens (`[`, `]`) are ignored.
pub fn load_frame_matrix(path: &Path) -> Result<Vec<Vec<f32>>> {
    parse_frame_matrix(&fs::read_to_string(path)?, &path.display().to_string())
}

pub fn parse_frame_matrix(text: &str, origin: &str) -> Result<Vec<Vec<f32>>> {
    let mut frames = Vec::new();
    for (line_number, line) in text.lines().enumerate() {
        let row = line
            .split_whitespace()
            .map(|token| token.trim_matches(|c: char| c == '[' || c == ']'))
            .filter(|token| !token.is_empty())
            .map(|token| {
                token
                    .parse::<f32>()
                    .map_err(|e| {
                        let reason = format!("bad score '{token}': {e}");
                        DecoderError::malformed_line(origin, line_number + 1, reason)
                    })
            })
            .collect::<Result<Vec<f32>>>()?;
        if !row.is_empty() {
            frames.push(row);
        }
    }
    Ok(frames)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> Arc<TransitionModel> {
        let table = "<eps>\t0\nA_0_0\t1\nA_1_1\t2\n";
        Arc::new(TransitionModel::from_reader(table.as_bytes(), "tids").unwrap())
    }

    #[test]
    fn looks_up_pdf_scores() {
        let scores = FrameScores::new(vec![vec![-1.0, -2.0], vec![-3.0, -0.5]], model()).unwrap();
        assert_eq!(scores.frame_count(), 2);
        assert_eq!(scores.log_likelihood(0, 1).unwrap(), -1.0);
        assert_eq!(scores.log_likelihood(1, 2).unwrap(), -0.5);
        assert_eq!(scores.log_likelihood(1, 0).unwrap(), 0.0);
        assert!(matches!(scores.log_likelihood(0, 7), Err(DecoderError::UnknownTransition(7))));
    }

    #[test]
    fn rejects_narrow_or_ragged_frames() {
        assert!(matches!(
            FrameScores::new(vec![vec![0.0]], model()),
            Err(DecoderError::Malformed(_))
        ));
        assert!(matches!(
            FrameScores::new(vec![vec![0.0, 0.0], vec![0.0]], model()),
            Err(DecoderError::Malformed(_))
        ));
        assert!(FrameScores::new(Vec::new(), model()).is_ok());
    }

    #[test]
    fn priors_from_counts() {
        let priors = PdfPriors::from_counts("[ 1 3 ]").unwrap();
        assert_eq!(priors.len(), 2);

        let mut frame = vec![0.5f32, 0.5];
        priors.apply(&mut frame).unwrap();
        let expected0 = 0.5f32.ln() - 0.25f32.ln() * PRIOR_SCALE;
        let expected1 = 0.5f32.ln() - 0.75f32.ln() * PRIOR_SCALE;
        assert!((frame[0] - expected0).abs() < 1e-6);
        assert!((frame[1] - expected1).abs() < 1e-6);

        assert!(priors.apply(&mut [0.1f32, 0.2, 0.7]).is_err());
    }

    #[test]
    fn bad_counts_rejected() {
        assert!(PdfPriors::from_counts("[ 0 0 ]").is_err());
        assert!(PdfPriors::from_counts("[ 1 -2 ]").is_err());
        assert!(PdfPriors::from_counts("[ 1 x ]").is_err());
    }

    #[test]
    fn posteriors_become_scores() {
        let priors = PdfPriors::from_counts("[ 1 1 ]").unwrap();
        let scores = FrameScores::from_posteriors(vec![vec![0.9, 0.1]], &priors, model()).unwrap();
        assert!(scores.log_likelihood(0, 1).unwrap() > scores.log_likelihood(0, 2).unwrap());
    }

    #[test]
    fn matrix_text_with_brackets() {
        let frames = parse_frame_matrix("[ 0.5 -1\n  2 3.25 ]\n\n", "scores").unwrap();
        assert_eq!(frames, vec![vec![0.5, -1.0], vec![2.0, 3.25]]);
        assert!(parse_frame_matrix("1 two\n", "scores").is_err());
    }
}
