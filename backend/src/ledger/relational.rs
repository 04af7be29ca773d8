use shared::{Candidate, CandidateId, ElectionState, LedgerError, Tally, VoterId};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{debug, warn};

use super::{BackendKind, Committed, Operation, Signer, Step, TransactionCommitter};

const SERIALIZATION_FAILURE: &str = "40001";
const DEADLOCK_DETECTED: &str = "40P01";

#[derive(Debug, sqlx::FromRow)]
struct CandidateRow {
    id: i64,
    name: String,
    vote_count: i64,
}

impl From<CandidateRow> for Candidate {
    fn from(row: CandidateRow) -> Self {
        Candidate {
            id: CandidateId(row.id as u64),
            name: row.name,
            vote_count: row.vote_count.max(0) as u64,
        }
    }
}

/// Postgres backend. Every commit locks the `election_state` row first, so
/// mutations are serialized across processes as well as within one; the
/// primary key on `voted_voters` backs the at-most-once rule regardless.
#[derive(Debug, Clone)]
pub struct PgCommitter {
    pool: PgPool,
    conflict_retries: u32,
}

impl PgCommitter {
    pub fn new(pool: PgPool, conflict_retries: u32) -> Self {
        Self { pool, conflict_retries }
    }

    /// Serialization failures and deadlocks abort the whole transaction, so
    /// they are retried here up to `conflict_retries` times.
    pub async fn commit_steps(&self, steps: &[Step]) -> Result<Committed, LedgerError> {
        let mut attempt = 0;
        loop {
            match self.try_commit(steps).await {
                Err(LedgerError::BackendConflict(reason)) if attempt < self.conflict_retries => {
                    attempt += 1;
                    warn!(attempt, "Retrying commit after conflict: {}", reason);
                }
                result => return result,
            }
        }
    }

    async fn try_commit(&self, steps: &[Step]) -> Result<Committed, LedgerError> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        let declared: bool = sqlx::query_scalar(
            "SELECT results_declared FROM election_state WHERE id = 1 FOR UPDATE"
        )
        .fetch_one(&mut *tx)
        .await
        .map_err(db_error)?;

        let mut state = ElectionState::from_declared(declared);
        let mut committed = Committed::default();

        for step in steps {
            apply(&mut tx, &mut state, step, &mut committed).await?;
        }

        tx.commit().await
            .map_err(|e| LedgerError::unavailable(format!("commit outcome unknown: {}", e)))?;

        debug!(steps = steps.len(), "Transaction committed");
        Ok(committed)
    }
}

async fn apply(
    tx: &mut Transaction<'_, Postgres>,
    state: &mut ElectionState,
    step: &Step,
    committed: &mut Committed,
) -> Result<(), LedgerError> {
    match step {
        Step::RequireOpen => state.ensure_open(),

        Step::Declare => {
            *state = state.declare()?;
            sqlx::query("UPDATE election_state SET results_declared = TRUE WHERE id = 1")
                .execute(&mut **tx)
                .await
                .map_err(db_error)?;
            Ok(())
        }

        Step::InsertCandidate(name) => {
            // Ids restart at 1 after a reset; the state row lock keeps MAX(id) stable.
            let id: i64 = sqlx::query_scalar(
                "INSERT INTO candidates (id, name)
                 SELECT COALESCE(MAX(id), 0) + 1, $1 FROM candidates
                 RETURNING id"
            )
            .bind(name)
            .fetch_one(&mut **tx)
            .await
            .map_err(db_error)?;

            committed.candidate_id = Some(CandidateId(id as u64));
            Ok(())
        }

        Step::RecordVoter(voter) => {
            sqlx::query("INSERT INTO voted_voters (voter_id) VALUES ($1)")
                .bind(voter.as_str())
                .execute(&mut **tx)
                .await
                .map_err(|e| match &e {
                    sqlx::Error::Database(db) if db.is_unique_violation() => LedgerError::AlreadyVoted,
                    _ => db_error(e),
                })?;
            Ok(())
        }

        Step::IncrementVotes(id) => {
            let Ok(key) = i64::try_from(id.0) else {
                return Err(LedgerError::CandidateNotFound(*id));
            };
            let result = sqlx::query("UPDATE candidates SET vote_count = vote_count + 1 WHERE id = $1")
                .bind(key)
                .execute(&mut **tx)
                .await
                .map_err(db_error)?;

            if result.rows_affected() == 0 {
                return Err(LedgerError::CandidateNotFound(*id));
            }
            Ok(())
        }

        Step::ClearElection => {
            sqlx::query("DELETE FROM voted_voters")
                .execute(&mut **tx)
                .await
                .map_err(db_error)?;
            sqlx::query("DELETE FROM candidates")
                .execute(&mut **tx)
                .await
                .map_err(db_error)?;
            sqlx::query("UPDATE election_state SET results_declared = FALSE WHERE id = 1")
                .execute(&mut **tx)
                .await
                .map_err(db_error)?;

            *state = state.reset();
            Ok(())
        }
    }
}

pub(crate) fn db_error(err: sqlx::Error) -> LedgerError {
    match &err {
        sqlx::Error::Database(db) => match db.code().as_deref() {
            Some(SERIALIZATION_FAILURE) | Some(DEADLOCK_DETECTED) => {
                LedgerError::conflict(db.message().to_owned())
            }
            _ => LedgerError::unavailable(err.to_string()),
        },
        sqlx::Error::RowNotFound => LedgerError::unavailable("election state row is missing"),
        _ => LedgerError::unavailable(err.to_string()),
    }
}

#[rocket::async_trait]
impl TransactionCommitter for PgCommitter {
    fn kind(&self) -> BackendKind {
        BackendKind::Postgres
    }

    async fn commit(&self, op: Operation, _signer: Option<Signer>) -> Result<Committed, LedgerError> {
        self.commit_steps(&op.steps()).await
    }

    /// Reads run in one read-only repeatable-read transaction, so counters
    /// and the voter record come from the same snapshot.
    async fn snapshot(&self) -> Result<Tally, LedgerError> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;

        let declared: bool = sqlx::query_scalar("SELECT results_declared FROM election_state WHERE id = 1")
            .fetch_one(&mut *tx)
            .await
            .map_err(db_error)?;

        let candidates = sqlx::query_as::<_, CandidateRow>(
            "SELECT id, name, vote_count FROM candidates ORDER BY id ASC"
        )
        .fetch_all(&mut *tx)
        .await
        .map_err(db_error)?;

        let voters: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM voted_voters")
            .fetch_one(&mut *tx)
            .await
            .map_err(db_error)?;

        tx.commit().await.map_err(db_error)?;

        Ok(Tally {
            candidates: candidates.into_iter().map(Candidate::from).collect(),
            results_declared: declared,
            recorded_voters: Some(voters.max(0) as u64),
        })
    }

    async fn has_voted(&self, voter: &VoterId) -> Result<bool, LedgerError> {
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM voted_voters WHERE voter_id = $1)")
            .bind(voter.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(db_error)
    }
}
