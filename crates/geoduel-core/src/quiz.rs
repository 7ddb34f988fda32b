//! Question sourcing for quiz matches.
//!
//! How many questions a match has and where their content comes from is a
//! pluggable collaborator, not part of the room state machine: the engine
//! asks the [`QuestionSource`] for the next question and finishes the match
//! when it returns `None`.

use serde::{Deserialize, Serialize};

/// One question dealt to a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    /// Zero-based index within the match.
    pub index: u32,
    /// Total number of questions in the match.
    pub total: u32,
    /// Question text.
    pub text: String,
}

/// Supplies question content and bounds the match length.
///
/// Implementations may be stateful (draw from a shuffled pool, call an
/// external service) but must be deterministic per `(room_id, index)` while
/// a match is running, since the engine may never ask twice.
pub trait QuestionSource {
    /// Produce the question at `index` for the given room.
    ///
    /// Returning `None` ends the match: the room transitions to its
    /// finished state after the current scoreboard.
    fn next_question(&mut self, room_id: u128, index: u32) -> Option<Question>;
}

/// Fixed in-memory question deck.
///
/// Deals `per_match` questions per room, cycling through the configured
/// prompts. The default deck carries a handful of ice-breaker prompts
/// matching the duel format: one participant answers, the other judges.
#[derive(Debug, Clone)]
pub struct FixedDeck {
    prompts: Vec<String>,
    per_match: u32,
}

impl FixedDeck {
    /// Create a deck from explicit prompts and a per-match question count.
    #[must_use]
    pub fn new(prompts: Vec<String>, per_match: u32) -> Self {
        Self { prompts, per_match }
    }

    /// Deck with the built-in prompts and the given match length.
    #[must_use]
    pub fn with_match_length(per_match: u32) -> Self {
        let prompts = [
            "What is your opponent's favorite food?",
            "Which city would your opponent most like to visit?",
            "What was your opponent's first job?",
            "What genre of music does your opponent listen to most?",
            "What is your opponent's go-to karaoke song?",
            "Which season does your opponent like best?",
            "What is your opponent's most used app?",
        ]
        .map(str::to_string)
        .to_vec();

        Self::new(prompts, per_match)
    }

    /// Number of questions each match is dealt.
    #[must_use]
    pub fn per_match(&self) -> u32 {
        self.per_match
    }
}

impl Default for FixedDeck {
    fn default() -> Self {
        Self::with_match_length(5)
    }
}

impl QuestionSource for FixedDeck {
    fn next_question(&mut self, _room_id: u128, index: u32) -> Option<Question> {
        if index >= self.per_match || self.prompts.is_empty() {
            return None;
        }

        let text = self.prompts[index as usize % self.prompts.len()].clone();
        Some(Question { index, total: self.per_match, text })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deck_deals_exactly_per_match_questions() {
        let mut deck = FixedDeck::with_match_length(3);

        for index in 0..3 {
            let question = deck.next_question(1, index).unwrap();
            assert_eq!(question.index, index);
            assert_eq!(question.total, 3);
            assert!(!question.text.is_empty());
        }

        assert!(deck.next_question(1, 3).is_none());
    }

    #[test]
    fn deck_cycles_prompts_when_short() {
        let mut deck = FixedDeck::new(vec!["only one".to_string()], 3);

        let first = deck.next_question(1, 0).unwrap();
        let third = deck.next_question(1, 2).unwrap();
        assert_eq!(first.text, third.text);
    }

    #[test]
    fn empty_deck_never_deals() {
        let mut deck = FixedDeck::new(Vec::new(), 5);
        assert!(deck.next_question(1, 0).is_none());
    }
}
