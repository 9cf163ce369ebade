use std::collections::HashMap;

use crate::db::models::{AnswerSlot, Question};

/// Equal-weight score of `slots` against the answer key in `questions`.
///
/// Every question is worth `total_marks / max(1, questions.len())`. A question
/// scores only when it has a correct index and the slot for its index holds
/// exactly that selection. Slots are matched by `question_index`, so their
/// order is irrelevant.
pub(crate) fn grade(questions: &[Question], slots: &[AnswerSlot], total_marks: f64) -> f64 {
    let per_question = total_marks / questions.len().max(1) as f64;

    let selections: HashMap<u32, u32> = slots
        .iter()
        .filter_map(|slot| slot.selected_index.map(|selected| (slot.question_index, selected)))
        .collect();

    let correct = questions
        .iter()
        .enumerate()
        .filter(|(index, question)| {
            let Some(expected) = question.correct_option else {
                return false;
            };
            u32::try_from(*index)
                .ok()
                .and_then(|index| selections.get(&index))
                .is_some_and(|selected| *selected == expected)
        })
        .count();

    round_cents(per_question * correct as f64)
}

/// Rounds to two decimals, halves going up.
pub(crate) fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
