use std::sync::Arc;

use rocket::http::{CookieJar, Status};
use rocket::serde::json::Json;
use rocket::{get, post, State};
use rocket_client_addr::ClientRealAddr;
use shared::{
    require_candidate, AddCandidateRequest, AdminResults, Credentials, LoginResponse,
    MessageResponse, PublicResults, Registered, SessionStatus, SessionUser, ValidationError,
    VoteRequest, VoterId,
};
use tracing::{debug, info, instrument};

use crate::accounts::Accounts;
use crate::config::Settings;
use crate::error::ApiError;
use crate::ledger::{KeyRing, Ledger, Signer};
use crate::rate_limiter::{RateLimitError, RateLimiter};
use crate::sessions::{clear_session_cookie, session_cookie, AdminSession, Session, SessionStore};

pub struct AppState {
    pub ledger: Arc<Ledger>,
    pub accounts: Accounts,
    pub sessions: Arc<SessionStore>,
    pub login_limiter: RateLimiter,
    pub keyring: KeyRing,
    pub allowed_origin: String,
}

impl AppState {
    pub fn new(ledger: Arc<Ledger>, accounts: Accounts, settings: &Settings) -> Self {
        Self {
            ledger,
            accounts,
            sessions: Arc::new(SessionStore::default()),
            login_limiter: RateLimiter::new(settings.login_max_attempts, settings.login_window_minutes),
            keyring: settings.keyring.clone(),
            allowed_origin: settings.allowed_origin.clone(),
        }
    }

    /// The ledger identity of a user and, on the chain backend, the key that
    /// signs their vote.
    fn voter_credentials(&self, user: &SessionUser) -> Result<(VoterId, Option<Signer>), ApiError> {
        if !self.ledger.backend().requires_signer() {
            let voter = VoterId::new(user.id.as_str())
                .ok_or_else(|| ApiError::Internal("session has no user id".into()))?;
            return Ok((voter, None));
        }

        let no_key = || ApiError::Forbidden("No signing key is registered for this account.".into());
        let voter = self.keyring.voter_id(&user.username).ok_or_else(no_key)?;
        let signer = self.keyring.vote_signer(&user.username).ok_or_else(no_key)?;
        Ok((voter, Some(signer)))
    }

    fn voter_id(&self, user: &SessionUser) -> Option<VoterId> {
        if self.ledger.backend().requires_signer() {
            self.keyring.voter_id(&user.username)
        } else {
            VoterId::new(user.id.as_str())
        }
    }

    fn admin_signer(&self) -> Result<Option<Signer>, ApiError> {
        if !self.ledger.backend().requires_signer() {
            return Ok(None);
        }
        self.keyring.admin_signer()
            .map(Some)
            .ok_or_else(|| ApiError::Forbidden("No signing key is registered for the administrator.".into()))
    }
}

#[rocket::options("/<_..>")]
pub async fn all_options() -> Status {
    Status::Ok
}

#[instrument(skip(state, credentials))]
#[post("/register", format = "json", data = "<credentials>")]
pub async fn register(
    state: &State<AppState>,
    credentials: Json<Credentials>,
) -> Result<(Status, Json<MessageResponse>), ApiError> {
    let Credentials { username, password } = credentials.into_inner();
    state.accounts.register(&username, &password).await?;
    Ok((Status::Created, Json(MessageResponse::new("Registration successful."))))
}

#[instrument(skip(state, credentials, cookies, client))]
#[post("/login", format = "json", data = "<credentials>")]
pub async fn login(
    state: &State<AppState>,
    credentials: Json<Credentials>,
    cookies: &CookieJar<'_>,
    client: Option<&ClientRealAddr>,
) -> Result<Json<LoginResponse>, ApiError> {
    let limit_key = format!("login:{}", client.map_or_else(|| "unknown".to_owned(), |c| c.ip.to_string()));
    state.login_limiter.check(&limit_key).map_err(|e| match e {
        RateLimitError::Exceeded(_) => ApiError::RateLimited(e.to_string()),
        RateLimitError::Unavailable => ApiError::Internal(e.to_string()),
    })?;

    let Credentials { username, password } = credentials.into_inner();
    let user = state.accounts.verify(&username, &password).await?;
    state.login_limiter.clear(&limit_key);

    let is_admin = user.is_admin;
    let token = state.sessions.create(user)?;
    cookies.add(session_cookie(token));

    info!(is_admin, "User logged in");
    Ok(Json(LoginResponse { message: "Login successful.".into(), is_admin }))
}

#[instrument(skip(state, session, cookies))]
#[post("/logout")]
pub async fn logout(state: &State<AppState>, session: Session, cookies: &CookieJar<'_>) -> Json<MessageResponse> {
    state.sessions.destroy(&session.token);
    clear_session_cookie(cookies);
    Json(MessageResponse::new("Logged out."))
}

#[instrument(skip(state, session))]
#[get("/session")]
pub async fn session_status(state: &State<AppState>, session: Option<Session>) -> Result<Json<SessionStatus>, ApiError> {
    let Some(session) = session else {
        return Ok(Json(SessionStatus { logged_in: false, user: None, has_voted: None }));
    };

    let has_voted = match state.voter_id(&session.user) {
        Some(voter) => Some(state.ledger.has_voted(&voter).await?),
        None => None,
    };

    Ok(Json(SessionStatus { logged_in: true, user: Some(session.user), has_voted }))
}

#[instrument(skip(state, session))]
#[get("/results")]
pub async fn results(state: &State<AppState>, session: Option<Session>) -> Result<Json<PublicResults>, ApiError> {
    let tally = state.ledger.tally().await?;
    let user_has_voted = match session.and_then(|s| state.voter_id(&s.user)) {
        Some(voter) => state.ledger.has_voted(&voter).await?,
        None => false,
    };
    Ok(Json(PublicResults::from_tally(&tally, user_has_voted)))
}

#[instrument(skip(state, session, request), fields(user = %session.user.username, candidate_id))]
#[post("/vote", format = "json", data = "<request>")]
pub async fn vote(
    state: &State<AppState>,
    session: Session,
    request: Json<VoteRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let candidate = require_candidate(request.into_inner().candidate_id)?;
    tracing::Span::current().record("candidate_id", candidate.0);

    let (voter, signer) = state.voter_credentials(&session.user)?;
    let ack = state.ledger.cast_vote(&voter, candidate, signer).await?;
    Ok(Json(MessageResponse::with_receipt("Vote cast successfully.", ack.transaction)))
}

#[instrument(skip(state, _admin))]
#[get("/admin/results")]
pub async fn admin_results(state: &State<AppState>, _admin: AdminSession) -> Result<Json<AdminResults>, ApiError> {
    let tally = state.ledger.tally().await?;
    Ok(Json(AdminResults::from(tally)))
}

#[instrument(skip(state, _admin, request))]
#[post("/admin/add_candidate", format = "json", data = "<request>")]
pub async fn add_candidate(
    state: &State<AppState>,
    _admin: AdminSession,
    request: Json<AddCandidateRequest>,
) -> Result<(Status, Json<Registered>), ApiError> {
    let name = request.into_inner().name.ok_or(ValidationError::EmptyName)?;
    let signer = state.admin_signer()?;
    let registered = state.ledger.add_candidate(&name, signer).await?;
    debug!(candidate_id = %registered.id, "Candidate added");
    Ok((Status::Created, Json(registered)))
}

#[instrument(skip(state, _admin))]
#[post("/admin/declare_results")]
pub async fn declare_results(state: &State<AppState>, _admin: AdminSession) -> Result<Json<MessageResponse>, ApiError> {
    let signer = state.admin_signer()?;
    let ack = state.ledger.declare_results(signer).await?;
    Ok(Json(MessageResponse::with_receipt("Results declared.", ack.transaction)))
}

#[instrument(skip(state, _admin))]
#[post("/admin/reset")]
pub async fn reset(state: &State<AppState>, _admin: AdminSession) -> Result<Json<MessageResponse>, ApiError> {
    let signer = state.admin_signer()?;
    let ack = state.ledger.reset(signer).await?;
    Ok(Json(MessageResponse::with_receipt("Election reset.", ack.transaction)))
}
