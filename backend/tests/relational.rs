//! Postgres-backed ledger tests. Run with `DATABASE_URL` set and `--ignored`.

use std::sync::Arc;

use backend::accounts::{AccountError, Accounts};
use backend::ledger::relational::PgCommitter;
use backend::ledger::Ledger;
use futures::future::join_all;
use shared::{CandidateId, LedgerError, OutcomeKind, VoterId};
use sqlx::PgPool;

fn ledger(pool: PgPool) -> Arc<Ledger> {
    Arc::new(Ledger::new(Arc::new(PgCommitter::new(pool, 3))))
}

fn voter(id: &str) -> VoterId {
    VoterId::new(id).unwrap()
}

#[ignore]
#[sqlx::test(migrations = "./migrations")]
async fn test_relational_election(pool: PgPool) {
    let ledger = ledger(pool);
    assert_eq!(ledger.add_candidate("Alice", None).await.unwrap().id, CandidateId(1));
    assert_eq!(ledger.add_candidate("Bob", None).await.unwrap().id, CandidateId(2));

    ledger.cast_vote(&voter("u1"), CandidateId(1), None).await.unwrap();
    ledger.cast_vote(&voter("u2"), CandidateId(1), None).await.unwrap();
    ledger.cast_vote(&voter("u3"), CandidateId(2), None).await.unwrap();
    assert_eq!(
        ledger.cast_vote(&voter("u1"), CandidateId(2), None).await.unwrap_err(),
        LedgerError::AlreadyVoted
    );

    ledger.declare_results(None).await.unwrap();
    let tally = ledger.tally().await.unwrap();
    assert!(tally.is_consistent());
    assert_eq!(tally.recorded_voters, Some(3));
    assert_eq!(tally.outcome().unwrap().kind, OutcomeKind::Winner);
    assert_eq!(tally.outcome().unwrap().summary, "Alice");
}

#[ignore]
#[sqlx::test(migrations = "./migrations")]
async fn test_failed_vote_is_rolled_back(pool: PgPool) {
    let ledger = ledger(pool);
    ledger.add_candidate("Alice", None).await.unwrap();

    assert_eq!(
        ledger.cast_vote(&voter("u1"), CandidateId(5), None).await.unwrap_err(),
        LedgerError::CandidateNotFound(CandidateId(5))
    );
    assert!(!ledger.has_voted(&voter("u1")).await.unwrap());
}

#[ignore]
#[sqlx::test(migrations = "./migrations")]
async fn test_independent_ledgers_share_the_voter_record(pool: PgPool) {
    // Two ledgers over one database behave like two server processes.
    let first = ledger(pool.clone());
    let second = ledger(pool);
    first.add_candidate("Alice", None).await.unwrap();

    let attempts = (0..10).map(|i| {
        let ledger = if i % 2 == 0 { first.clone() } else { second.clone() };
        tokio::spawn(async move { ledger.cast_vote(&voter("same"), CandidateId(1), None).await })
    });
    let results: Vec<_> = join_all(attempts).await.into_iter().map(|r| r.unwrap()).collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    let tally = first.tally().await.unwrap();
    assert_eq!(tally.total_votes(), 1);
    assert!(tally.is_consistent());
}

#[ignore]
#[sqlx::test(migrations = "./migrations")]
async fn test_reset_restarts_ids(pool: PgPool) {
    let ledger = ledger(pool);
    ledger.add_candidate("Alice", None).await.unwrap();
    ledger.cast_vote(&voter("u1"), CandidateId(1), None).await.unwrap();
    ledger.declare_results(None).await.unwrap();

    ledger.reset(None).await.unwrap();
    let tally = ledger.tally().await.unwrap();
    assert!(tally.candidates.is_empty());
    assert!(!tally.results_declared);

    assert_eq!(ledger.add_candidate("Carol", None).await.unwrap().id, CandidateId(1));
    ledger.cast_vote(&voter("u1"), CandidateId(1), None).await.unwrap();
}

#[ignore]
#[sqlx::test(migrations = "./migrations")]
async fn test_accounts(pool: PgPool) {
    let accounts = Accounts::new(pool, "admin");

    let user = accounts.register(" ann ", "secret").await.unwrap();
    assert_eq!(user.username, "ann");
    assert!(!user.is_admin);
    assert!(matches!(accounts.register("ann", "other").await, Err(AccountError::UsernameTaken)));

    assert_eq!(accounts.verify("ann", "secret").await.unwrap().id, user.id);
    assert!(matches!(accounts.verify("ann", "wrong").await, Err(AccountError::InvalidCredentials)));
    assert!(matches!(accounts.verify("nobody", "secret").await, Err(AccountError::InvalidCredentials)));

    assert!(accounts.ensure_admin_exists("rootpw").await.unwrap());
    assert!(!accounts.ensure_admin_exists("rootpw").await.unwrap());
    assert!(accounts.verify("admin", "rootpw").await.unwrap().is_admin);
}
