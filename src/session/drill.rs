//! Turning a stitch into multiple-choice drill items

use rand::Rng;
use serde::Serialize;

use crate::content::Stitch;

/// One question with its answer options
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DrillItem {
    pub question_id: String,
    pub prompt: String,
    pub options: Vec<String>,
    pub correct_index: usize,
}

impl DrillItem {
    pub fn is_correct(&self, choice: usize) -> bool {
        choice == self.correct_index
    }

    pub fn correct_answer(&self) -> &str {
        &self.options[self.correct_index]
    }
}

/// Pair each question's correct answer with the distractor for `level`, in
/// random order. A question with no usable distractor gets a single option.
pub fn build_drill<R: Rng + ?Sized>(stitch: &Stitch, level: u8, rng: &mut R) -> Vec<DrillItem> {
    stitch
        .questions
        .iter()
        .map(|q| {
            let distractor = q
                .distractor_for(level)
                .filter(|d| *d != q.correct_answer);

            let (options, correct_index) = match distractor {
                Some(d) if rng.gen_bool(0.5) => (vec![d.to_string(), q.correct_answer.clone()], 1),
                Some(d) => (vec![q.correct_answer.clone(), d.to_string()], 0),
                None => (vec![q.correct_answer.clone()], 0),
            };

            DrillItem {
                question_id: q.id.clone(),
                prompt: q.prompt.clone(),
                options,
                correct_index,
            }
        })
        .collect()
}
