//! The election ledger: candidate registry, voter record and lifecycle flag
//! behind one serialized write path, committed through a swappable backend.

use std::fmt;
use std::sync::Arc;

use shared::{
    validate_candidate_name, Ack, CandidateId, LedgerError, Registered, Tally, VoterId,
};
use tokio::sync::Mutex;
use tracing::{error, info, instrument, warn};

pub mod chain;
pub mod memory;
pub mod relational;
pub mod signer;
mod steps;

pub use memory::MemoryCommitter;
pub use signer::{KeyRing, Signer, SignerPolicy};
pub use steps::Step;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Postgres,
    Chain,
    Memory,
}

impl BackendKind {
    /// Chain transactions must be signed by the caller's key.
    pub fn requires_signer(self) -> bool {
        self == Self::Chain
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Postgres => "postgres",
            Self::Chain => "chain",
            Self::Memory => "memory",
        })
    }
}

/// A mutating ledger operation, already validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    AddCandidate { name: String },
    CastVote { voter: VoterId, candidate: CandidateId },
    DeclareResults,
    Reset,
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Self::AddCandidate { .. } => "add_candidate",
            Self::CastVote { .. } => "cast_vote",
            Self::DeclareResults => "declare_results",
            Self::Reset => "reset",
        }
    }
}

/// What a backend reports back from a successful commit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Committed {
    pub candidate_id: Option<CandidateId>,
    pub transaction: Option<String>,
}

/// Backend-specific commit mechanics. Every call to `commit` is one atomic
/// unit of work: it either applies in full or leaves no trace.
#[rocket::async_trait]
pub trait TransactionCommitter: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// The signer, if any, is consumed by this call and dropped with it.
    async fn commit(&self, op: Operation, signer: Option<Signer>) -> Result<Committed, LedgerError>;

    async fn snapshot(&self) -> Result<Tally, LedgerError>;

    async fn has_voted(&self, voter: &VoterId) -> Result<bool, LedgerError>;
}

pub struct Ledger {
    committer: Arc<dyn TransactionCommitter>,
    writer: Mutex<()>,
}

impl Ledger {
    pub fn new(committer: Arc<dyn TransactionCommitter>) -> Self {
        Self { committer, writer: Mutex::new(()) }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryCommitter::default()))
    }

    pub fn backend(&self) -> BackendKind {
        self.committer.kind()
    }

    #[instrument(skip(self, signer), fields(backend = %self.backend()))]
    pub async fn add_candidate(&self, name: &str, signer: Option<Signer>) -> Result<Registered, LedgerError> {
        let name = validate_candidate_name(name)?;
        let committed = self.submit(Operation::AddCandidate { name: name.clone() }, signer).await?;
        let id = committed.candidate_id
            .ok_or_else(|| LedgerError::unavailable("backend did not report the new candidate id"))?;

        info!(candidate_id = %id, "Candidate registered");
        Ok(Registered { id, name, transaction: committed.transaction })
    }

    #[instrument(skip(self, signer), fields(backend = %self.backend()))]
    pub async fn cast_vote(
        &self,
        voter: &VoterId,
        candidate: CandidateId,
        signer: Option<Signer>,
    ) -> Result<Ack, LedgerError> {
        let op = Operation::CastVote { voter: voter.clone(), candidate };
        let committed = self.submit(op, signer).await?;

        info!("Vote recorded");
        Ok(Ack { transaction: committed.transaction })
    }

    #[instrument(skip(self, signer), fields(backend = %self.backend()))]
    pub async fn declare_results(&self, signer: Option<Signer>) -> Result<Ack, LedgerError> {
        let committed = self.submit(Operation::DeclareResults, signer).await?;

        info!("Results declared");
        Ok(Ack { transaction: committed.transaction })
    }

    #[instrument(skip(self, signer), fields(backend = %self.backend()))]
    pub async fn reset(&self, signer: Option<Signer>) -> Result<Ack, LedgerError> {
        let committed = self.submit(Operation::Reset, signer).await?;

        info!("Election reset");
        Ok(Ack { transaction: committed.transaction })
    }

    /// Reads never take the writer gate.
    pub async fn tally(&self) -> Result<Tally, LedgerError> {
        let tally = self.committer.snapshot().await?;
        if !tally.is_consistent() {
            error!(
                total_votes = tally.total_votes(),
                recorded_voters = ?tally.recorded_voters,
                "Vote counters disagree with the voter record"
            );
        }
        Ok(tally)
    }

    pub async fn has_voted(&self, voter: &VoterId) -> Result<bool, LedgerError> {
        self.committer.has_voted(voter).await
    }

    /// All mutations pass through here one at a time. Failures are returned
    /// as-is; resubmitting is left to the caller.
    async fn submit(&self, op: Operation, signer: Option<Signer>) -> Result<Committed, LedgerError> {
        let _gate = self.writer.lock().await;
        let name = op.name();

        self.committer.commit(op, signer).await.map_err(|e| {
            match &e {
                LedgerError::BackendUnavailable(_) | LedgerError::BackendConflict(_) => {
                    error!(operation = name, "Commit failed: {}", e)
                }
                _ => warn!(operation = name, "Operation rejected: {}", e),
            }
            e
        })
    }
}
