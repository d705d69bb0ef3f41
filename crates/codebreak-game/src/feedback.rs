//! Feedback computation: evaluating a guess against a secret.

use codebreak_protocol::{Feedback, GameMode};

use crate::Code;

/// Computes the feedback for `guess` evaluated against `secret`.
///
/// Precondition: both codes have the same length (guaranteed when both
/// came through the same [`CodeRules`](crate::CodeRules)); this function
/// does not re-validate.
///
/// Counting is multiplicity-capped: a digit contributes to
/// `total_correct` at most as many times as it occurs in the secret, so
/// `exact + misplaced + out_of_place == length` holds for every input,
/// repeated digits included.
///
/// In hard mode the positional breakdown is withheld — `misplaced` and
/// `out_of_place` come back as zero — but `exact` is still filled in;
/// the win check upstream needs it, and `exact == length` is the win
/// condition in every mode.
///
/// Pure and deterministic; safe to call concurrently from any number of
/// sessions.
pub fn compute_feedback(
    guess: &Code,
    secret: &Code,
    mode: GameMode,
) -> Feedback {
    let mut exact = 0u8;
    let mut remaining = [0u8; 10];

    for (&g, &s) in guess.digits().iter().zip(secret.digits()) {
        if g == s {
            exact += 1;
        }
        remaining[s as usize] += 1;
    }

    let mut total_correct = 0u8;
    for &g in guess.digits() {
        if remaining[g as usize] > 0 {
            remaining[g as usize] -= 1;
            total_correct += 1;
        }
    }

    match mode {
        GameMode::Hard => Feedback {
            exact,
            misplaced: 0,
            out_of_place: 0,
            total_correct,
        },
        GameMode::Standard => Feedback {
            exact,
            misplaced: total_correct - exact,
            out_of_place: guess.len() as u8 - total_correct,
            total_correct,
        },
    }
}

// =========================================================================
// Tests
// =========================================================================
