use std::collections::HashSet;
use std::sync::Mutex;

use shared::{Candidate, CandidateId, ElectionState, LedgerError, Tally, VoterId};

use super::{BackendKind, Committed, Operation, Signer, Step, TransactionCommitter};

#[derive(Debug, Default)]
struct ElectionModel {
    candidates: Vec<Candidate>,
    voters: HashSet<VoterId>,
    state: ElectionState,
    last_id: u64,
}

impl ElectionModel {
    /// Rejects a step without touching the model.
    fn check(&self, step: &Step) -> Result<(), LedgerError> {
        match step {
            Step::RequireOpen => self.state.ensure_open(),
            Step::Declare => self.state.declare().map(|_| ()),
            Step::RecordVoter(voter) if self.voters.contains(voter) => Err(LedgerError::AlreadyVoted),
            Step::IncrementVotes(id) if !self.candidates.iter().any(|c| c.id == *id) => {
                Err(LedgerError::CandidateNotFound(*id))
            }
            _ => Ok(()),
        }
    }

    /// Only called once every step of the commit passed `check`.
    fn apply(&mut self, step: Step, committed: &mut Committed) {
        match step {
            Step::RequireOpen => {}
            Step::Declare => self.state = ElectionState::Declared,
            Step::InsertCandidate(name) => {
                self.last_id += 1;
                let id = CandidateId(self.last_id);
                self.candidates.push(Candidate::new(id, name));
                committed.candidate_id = Some(id);
            }
            Step::RecordVoter(voter) => {
                self.voters.insert(voter);
            }
            Step::IncrementVotes(id) => {
                if let Some(candidate) = self.candidates.iter_mut().find(|c| c.id == id) {
                    candidate.vote_count += 1;
                }
            }
            Step::ClearElection => *self = Self::default(),
        }
    }

    fn tally(&self) -> Tally {
        Tally {
            candidates: self.candidates.clone(),
            results_declared: self.state.is_declared(),
            recorded_voters: Some(self.voters.len() as u64),
        }
    }
}

/// In-process backend. Every step is checked against the live model under the
/// lock before any of them is applied, so a rejected commit changes nothing.
#[derive(Debug, Default)]
pub struct MemoryCommitter {
    election: Mutex<ElectionModel>,
}

impl MemoryCommitter {
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, ElectionModel>, LedgerError> {
        self.election.lock()
            .map_err(|_| LedgerError::unavailable("election store lock poisoned"))
    }
}

#[rocket::async_trait]
impl TransactionCommitter for MemoryCommitter {
    fn kind(&self) -> BackendKind {
        BackendKind::Memory
    }

    async fn commit(&self, op: Operation, _signer: Option<Signer>) -> Result<Committed, LedgerError> {
        let mut election = self.lock()?;
        let steps = op.steps();
        for step in &steps {
            election.check(step)?;
        }

        let mut committed = Committed::default();
        for step in steps {
            election.apply(step, &mut committed);
        }
        Ok(committed)
    }

    async fn snapshot(&self) -> Result<Tally, LedgerError> {
        Ok(self.lock()?.tally())
    }

    async fn has_voted(&self, voter: &VoterId) -> Result<bool, LedgerError> {
        Ok(self.lock()?.voters.contains(voter))
    }
}
