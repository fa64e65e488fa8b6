use std::path::Path;

use super::engine::{Engine, LoadError};
use super::labels::LabelTable;
use super::preprocess::{self, DecodeError};

#[derive(Debug, Clone)]
pub struct Classification {
    pub label: String,
    pub confidence: f32,
    pub probabilities: Vec<f32>,
}

#[derive(Debug, thiserror::Error)]
pub enum ClassifyError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("inference failed: {0}")]
    Inference(#[from] tch::TchError),
    #[error("model output did not match the label table")]
    OutputMismatch,
}

/// The ready-to-serve inference engine paired with its label table. Built
/// once at startup, then shared read-only across all requests.
pub struct Classifier {
    engine: Engine,
    labels: LabelTable,
}

impl Classifier {
    pub fn build(
        model_path: &Path,
        labels: LabelTable,
        input_size: u32,
    ) -> Result<Self, LoadError> {
        let engine = Engine::load(model_path, input_size, labels.len())?;
        Ok(Self { engine, labels })
    }

    pub fn labels(&self) -> &LabelTable {
        &self.labels
    }

    /// Decodes the image, runs one forward pass and maps the arg-max index
    /// through the label table. Never mutates shared state.
    pub fn classify(&self, image: &[u8]) -> Result<Classification, ClassifyError> {
        let input = preprocess::image_to_tensor(image, self.engine.input_size())?;
        let probabilities = self.engine.forward(&input)?;

        let (index, confidence) = argmax(&probabilities).ok_or(ClassifyError::OutputMismatch)?;
        let label = self
            .labels
            .get(index)
            .ok_or(ClassifyError::OutputMismatch)?
            .to_string();

        Ok(Classification {
            label,
            confidence,
            probabilities,
        })
    }
}

/// Index and value of the largest probability. Strict comparison keeps the
/// first index on ties.
fn argmax(probs: &[f32]) -> Option<(usize, f32)> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &p) in probs.iter().enumerate() {
        if best.map_or(true, |(_, bp)| p > bp) {
            best = Some((i, p));
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn argmax_picks_largest() {
        assert_eq!(argmax(&[0.1, 0.7, 0.2]), Some((1, 0.7)));
    }

    #[test]
    fn argmax_breaks_ties_by_lowest_index() {
        assert_eq!(argmax(&[0.4, 0.4, 0.2]), Some((0, 0.4)));
    }

    #[test]
    fn argmax_of_empty_is_none() {
        assert_eq!(argmax(&[]), None);
    }

    #[test]
    fn argmax_maps_to_label_table() {
        let labels = LabelTable::new(vec!["cat".into(), "dog".into(), "bird".into()]);
        let probs = [0.1f32, 0.7, 0.2];
        let (index, confidence) = argmax(&probs).unwrap();
        assert_eq!(labels.get(index), Some("dog"));
        assert!((confidence - 0.7).abs() < f32::EPSILON);
    }
}
