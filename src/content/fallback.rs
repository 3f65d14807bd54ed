//! Synthetic fallback content
//!
//! The one place placeholder stitches are made. Output depends only on the
//! stitch id, so repeated requests for a missing stitch look the same.

use std::collections::BTreeMap;

use super::models::{Question, Stitch};

pub const FALLBACK_THREAD_ID: &str = "fallback";

const QUESTION_COUNT: u64 = 5;

/// Build a placeholder stitch for an id no tier could supply.
///
/// Callers tell placeholders apart by `SourceTier::Synthetic` on the cache
/// entry, not by the thread id.
pub fn synthesize(stitch_id: &str) -> Stitch {
    let seed = stable_hash(stitch_id);

    let questions = (0..QUESTION_COUNT)
        .map(|i| {
            let a = 2 + (seed.wrapping_add(i * 7) % 9);
            let b = 1 + (seed.wrapping_add(i * 3) % 10);
            placeholder_question(stitch_id, i + 1, a, b)
        })
        .collect();

    Stitch {
        id: stitch_id.to_string(),
        thread_id: FALLBACK_THREAD_ID.to_string(),
        title: format!("Content unavailable ({})", stitch_id),
        body: "This stitch could not be loaded. Practise these facts while it is unavailable."
            .to_string(),
        questions,
    }
}

fn placeholder_question(stitch_id: &str, n: u64, a: u64, b: u64) -> Question {
    let answer = a * b;
    let mut distractors = BTreeMap::new();
    distractors.insert(1, (answer + 10 + a).to_string());
    distractors.insert(2, (answer + a).to_string());
    distractors.insert(3, (answer + b.max(2)).to_string());
    distractors.insert(4, (answer + 2).to_string());
    distractors.insert(5, (answer + 1).to_string());

    Question {
        id: format!("{}-fallback-{}", stitch_id, n),
        prompt: format!("{} × {}", a, b),
        correct_answer: answer.to_string(),
        distractors,
    }
}

/// FNV-1a; std's `DefaultHasher` is not stable across releases
fn stable_hash(s: &str) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in s.bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    hash
}
