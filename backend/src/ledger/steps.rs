use shared::{CandidateId, VoterId};

use super::Operation;

/// One mutation in a relational-style commit. Steps run in order inside a
/// single transaction; the first failure aborts all of them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    RequireOpen,
    Declare,
    InsertCandidate(String),
    /// Fails with `AlreadyVoted` when the voter is already recorded.
    RecordVoter(VoterId),
    IncrementVotes(CandidateId),
    ClearElection,
}

impl Operation {
    pub fn steps(self) -> Vec<Step> {
        match self {
            Operation::AddCandidate { name } => vec![Step::RequireOpen, Step::InsertCandidate(name)],
            Operation::CastVote { voter, candidate } => vec![
                Step::RequireOpen,
                Step::RecordVoter(voter),
                Step::IncrementVotes(candidate),
            ],
            Operation::DeclareResults => vec![Step::Declare],
            Operation::Reset => vec![Step::ClearElection],
        }
    }
}
