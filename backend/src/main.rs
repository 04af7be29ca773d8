use std::sync::Arc;

use backend::{
    accounts::Accounts,
    app::build_rocket,
    config::Settings,
    ledger::{chain::ChainCommitter, relational::PgCommitter, BackendKind, Ledger, MemoryCommitter, TransactionCommitter},
    routes::AppState,
    sessions::SessionStore,
};
use shuttle_runtime::CustomError;
use sqlx::PgPool;
use tokio::time::{interval, Duration};
use tracing::{error, info, warn};

const AUDIT_INTERVAL_SECS: u64 = 60;

async fn audit(ledger: &Ledger, sessions: &SessionStore) {
    let purged = sessions.purge_expired();
    if purged > 0 {
        info!("Purged {} expired sessions", purged);
    }

    match ledger.tally().await {
        Ok(tally) if !tally.is_consistent() => error!(
            total_votes = tally.total_votes(),
            recorded_voters = ?tally.recorded_voters,
            "Audit found vote counters out of step with the voter record"
        ),
        Ok(_) => {}
        Err(e) => warn!("Audit could not read the ledger: {}", e),
    }
}

async fn run_audit_task(ledger: Arc<Ledger>, sessions: Arc<SessionStore>) {
    let mut interval = interval(Duration::from_secs(AUDIT_INTERVAL_SECS));
    info!("Audit service started");

    loop {
        interval.tick().await;
        audit(&ledger, &sessions).await;
    }
}

async fn connect_committer(settings: &Settings, pool: &PgPool) -> Result<Arc<dyn TransactionCommitter>, CustomError> {
    let committer: Arc<dyn TransactionCommitter> = match settings.backend {
        BackendKind::Postgres => Arc::new(PgCommitter::new(pool.clone(), settings.conflict_retries)),
        BackendKind::Memory => {
            warn!("Using the in-memory ledger; election state is lost on restart");
            Arc::new(MemoryCommitter::default())
        }
        BackendKind::Chain => {
            let chain = settings.chain.as_ref()
                .ok_or_else(|| CustomError::msg("chain backend selected without chain settings"))?;
            Arc::new(ChainCommitter::connect(chain).await.map_err(CustomError::new)?)
        }
    };
    Ok(committer)
}

#[shuttle_runtime::main]
async fn rocket(
    #[shuttle_shared_db::Postgres] pool: PgPool,
    #[shuttle_runtime::Secrets] secret_store: shuttle_runtime::SecretStore,
) -> shuttle_rocket::ShuttleRocket {
    let settings = Settings::from_secrets(&secret_store).map_err(CustomError::new)?;
    info!(backend = %settings.backend, keys = settings.keyring.len(), "Starting election ledger server");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(CustomError::new)?;

    info!("Migrations complete");

    let accounts = Accounts::new(pool.clone(), settings.admin_username.clone());
    match settings.admin_password.as_deref() {
        Some(password) => {
            if accounts.ensure_admin_exists(password).await.map_err(CustomError::new)? {
                info!(admin = %settings.admin_username, "Administrator account created");
            }
        }
        None => warn!("ADMIN_PASSWORD not set - the administrator must register manually"),
    }

    let committer = connect_committer(&settings, &pool).await?;
    let ledger = Arc::new(Ledger::new(committer));
    let state = AppState::new(ledger.clone(), accounts, &settings);

    tokio::spawn(run_audit_task(ledger, state.sessions.clone()));

    Ok(build_rocket(state).into())
}
