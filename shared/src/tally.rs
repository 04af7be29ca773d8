use serde::{Serialize, Deserialize};

use crate::models::Candidate;

pub const NO_WINNER: &str = "No one";
const TIE_SEPARATOR: &str = " & ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OutcomeKind {
    NoVotes,
    Winner,
    Tie,
}

/// Winner summary derived from a declared tally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Outcome {
    pub kind: OutcomeKind,
    /// Every candidate holding the maximum count, ascending by id.
    pub winners: Vec<Candidate>,
    pub top_votes: u64,
    pub tie: bool,
    pub summary: String,
}

impl Outcome {
    fn no_votes() -> Self {
        Self {
            kind: OutcomeKind::NoVotes,
            winners: Vec::new(),
            top_votes: 0,
            tie: false,
            summary: NO_WINNER.to_owned(),
        }
    }

    pub fn names(&self) -> Vec<&str> {
        self.winners.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn winner(&self) -> Option<&Candidate> {
        match self.kind {
            OutcomeKind::Winner => self.winners.first(),
            _ => None,
        }
    }
}

/// Pure function over a snapshot of candidates.
pub fn determine_outcome(candidates: &[Candidate]) -> Outcome {
    let total: u64 = candidates.iter().map(|c| c.vote_count).sum();
    if total == 0 {
        return Outcome::no_votes();
    }

    let top_votes = candidates.iter().map(|c| c.vote_count).max().unwrap_or(0);
    let mut winners: Vec<Candidate> = candidates.iter()
        .filter(|c| c.vote_count == top_votes)
        .cloned()
        .collect();
    winners.sort_by_key(|c| c.id);

    let tie = winners.len() > 1;
    let summary = winners.iter()
        .map(|c| c.name.as_str())
        .collect::<Vec<_>>()
        .join(TIE_SEPARATOR);

    Outcome {
        kind: if tie { OutcomeKind::Tie } else { OutcomeKind::Winner },
        winners,
        top_votes,
        tie,
        summary,
    }
}
