use std::collections::HashMap;
use std::sync::Mutex;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use ring::rand::{SecureRandom, SystemRandom};
use rocket::http::{Cookie, CookieJar, SameSite, Status};
use rocket::request::{FromRequest, Outcome, Request};
use shared::SessionUser;
use time::{Duration, OffsetDateTime};
use tracing::{debug, error};

use crate::error::ApiError;
use crate::routes::AppState;

pub const SESSION_COOKIE: &str = "poll_session";
const SESSION_TTL_HOURS: i64 = 24;

#[derive(Debug, Clone)]
struct SessionEntry {
    user: SessionUser,
    expires_at: OffsetDateTime,
}

/// Live login sessions keyed by an opaque random token.
pub struct SessionStore {
    sessions: Mutex<HashMap<String, SessionEntry>>,
    rng: SystemRandom,
    ttl: Duration,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(Duration::hours(SESSION_TTL_HOURS))
    }
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            rng: SystemRandom::new(),
            ttl,
        }
    }

    pub fn create(&self, user: SessionUser) -> Result<String, ApiError> {
        let mut bytes = [0u8; 32];
        self.rng.fill(&mut bytes)
            .map_err(|_| ApiError::Internal("could not generate session token".into()))?;
        let token = URL_SAFE_NO_PAD.encode(bytes);

        let entry = SessionEntry { user, expires_at: OffsetDateTime::now_utc() + self.ttl };
        self.lock()?.insert(token.clone(), entry);
        debug!("Session created");
        Ok(token)
    }

    /// Expired sessions are dropped on access.
    pub fn get(&self, token: &str) -> Option<SessionUser> {
        let mut sessions = self.lock().ok()?;
        match sessions.get(token) {
            Some(entry) if entry.expires_at > OffsetDateTime::now_utc() => Some(entry.user.clone()),
            Some(_) => {
                sessions.remove(token);
                None
            }
            None => None,
        }
    }

    pub fn destroy(&self, token: &str) -> bool {
        self.lock().map(|mut s| s.remove(token).is_some()).unwrap_or(false)
    }

    pub fn purge_expired(&self) -> usize {
        let now = OffsetDateTime::now_utc();
        match self.lock() {
            Ok(mut sessions) => {
                let before = sessions.len();
                sessions.retain(|_, entry| entry.expires_at > now);
                before - sessions.len()
            }
            Err(_) => 0,
        }
    }

    pub fn len(&self) -> usize {
        self.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, SessionEntry>>, ApiError> {
        self.sessions.lock().map_err(|e| {
            error!("Failed to acquire session lock: {}", e);
            ApiError::Internal("session store unavailable".into())
        })
    }
}

pub fn session_cookie(token: String) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(Duration::hours(SESSION_TTL_HOURS))
        .build()
}

pub fn clear_session_cookie(cookies: &CookieJar<'_>) {
    cookies.remove(Cookie::build(SESSION_COOKIE).path("/").build());
}

/// A logged-in user.
#[derive(Debug, Clone)]
pub struct Session {
    pub token: String,
    pub user: SessionUser,
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for Session {
    type Error = ApiError;

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let Some(state) = req.rocket().state::<AppState>() else {
            error!("Application state is not managed");
            return Outcome::Error((Status::InternalServerError, ApiError::Internal("missing state".into())));
        };

        let token = req.cookies().get(SESSION_COOKIE).map(|c| c.value().to_owned());
        match token.and_then(|t| state.sessions.get(&t).map(|user| Session { token: t, user })) {
            Some(session) => Outcome::Success(session),
            None => Outcome::Error((Status::Unauthorized, ApiError::Unauthorized)),
        }
    }
}

/// A logged-in administrator.
#[derive(Debug, Clone)]
pub struct AdminSession(pub Session);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AdminSession {
    type Error = ApiError;

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        match Session::from_request(req).await {
            Outcome::Success(session) if session.user.is_admin => Outcome::Success(AdminSession(session)),
            Outcome::Success(_) => Outcome::Error((Status::Forbidden, ApiError::AdminRequired)),
            Outcome::Error(e) => Outcome::Error(e),
            Outcome::Forward(status) => Outcome::Forward(status),
        }
    }
}
