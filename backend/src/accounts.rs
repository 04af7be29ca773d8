use std::num::NonZeroU32;

use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine;
use ring::pbkdf2;
use ring::rand::{SecureRandom, SystemRandom};
use shared::{validate_registration, SessionUser, ValidationError};
use sqlx::PgPool;
use thiserror::Error;
use tracing::{info, instrument, warn};
use uuid::Uuid;

const HASH_SCHEME: &str = "pbkdf2-sha256";
const SALT_LEN: usize = 16;
const HASH_LEN: usize = 32;
const ITERATIONS: NonZeroU32 = match NonZeroU32::new(100_000) {
    Some(n) => n,
    None => panic!("iteration count must be non-zero"),
};

#[derive(Debug, Error)]
pub enum AccountError {
    #[error("Username already exists.")]
    UsernameTaken,
    #[error("Invalid username or password.")]
    InvalidCredentials,
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error("account store unavailable: {0}")]
    Database(String),
    #[error("password hashing failed")]
    Hashing,
}

impl From<sqlx::Error> for AccountError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => AccountError::UsernameTaken,
            _ => AccountError::Database(err.to_string()),
        }
    }
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    username: String,
    password_hash: String,
}

/// Registered user accounts.
pub struct Accounts {
    pool: PgPool,
    admin_username: String,
    rng: SystemRandom,
}

impl Accounts {
    pub fn new(pool: PgPool, admin_username: impl Into<String>) -> Self {
        Self { pool, admin_username: admin_username.into(), rng: SystemRandom::new() }
    }

    pub fn is_admin(&self, username: &str) -> bool {
        username == self.admin_username
    }

    #[instrument(skip(self, password))]
    pub async fn register(&self, username: &str, password: &str) -> Result<SessionUser, AccountError> {
        validate_registration(username, password)?;
        let username = username.trim();
        let hash = hash_password(&self.rng, password)?;
        let id = Uuid::new_v4();

        sqlx::query("INSERT INTO users (id, username, password_hash) VALUES ($1, $2, $3)")
            .bind(id)
            .bind(username)
            .bind(&hash)
            .execute(&self.pool)
            .await?;

        info!(user_id = %id, "Account registered");
        Ok(self.session_user(id, username))
    }

    /// Unknown users and wrong passwords are indistinguishable to the caller.
    #[instrument(skip(self, password))]
    pub async fn verify(&self, username: &str, password: &str) -> Result<SessionUser, AccountError> {
        let username = username.trim();
        if username.is_empty() || password.is_empty() {
            return Err(ValidationError::MissingCredentials.into());
        }

        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, username, password_hash FROM users WHERE username = $1",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(user) if verify_password(&user.password_hash, password) => {
                Ok(self.session_user(user.id, &user.username))
            }
            _ => {
                warn!("Failed login attempt");
                Err(AccountError::InvalidCredentials)
            }
        }
    }

    /// Creates the administrator account when it does not exist yet.
    pub async fn ensure_admin_exists(&self, password: &str) -> Result<bool, AccountError> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE username = $1)")
            .bind(&self.admin_username)
            .fetch_one(&self.pool)
            .await?;
        if exists {
            return Ok(false);
        }

        let admin = self.admin_username.clone();
        match self.register(&admin, password).await {
            Ok(_) => Ok(true),
            Err(AccountError::UsernameTaken) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn session_user(&self, id: Uuid, username: &str) -> SessionUser {
        SessionUser {
            id: id.to_string(),
            username: username.to_owned(),
            is_admin: self.is_admin(username),
        }
    }
}

/// Encodes as `pbkdf2-sha256$<iterations>$<salt>$<hash>`.
pub fn hash_password(rng: &dyn SecureRandom, password: &str) -> Result<String, AccountError> {
    let mut salt = [0u8; SALT_LEN];
    rng.fill(&mut salt).map_err(|_| AccountError::Hashing)?;

    let mut hash = [0u8; HASH_LEN];
    pbkdf2::derive(pbkdf2::PBKDF2_HMAC_SHA256, ITERATIONS, &salt, password.as_bytes(), &mut hash);

    Ok(format!(
        "{}${}${}${}",
        HASH_SCHEME,
        ITERATIONS,
        STANDARD_NO_PAD.encode(salt),
        STANDARD_NO_PAD.encode(hash)
    ))
}

pub fn verify_password(stored: &str, password: &str) -> bool {
    let mut parts = stored.split('$');
    let (Some(HASH_SCHEME), Some(iterations), Some(salt), Some(hash), None) =
        (parts.next(), parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return false;
    };

    let Some(iterations) = iterations.parse::<u32>().ok().and_then(NonZeroU32::new) else {
        return false;
    };
    let (Ok(salt), Ok(hash)) = (STANDARD_NO_PAD.decode(salt), STANDARD_NO_PAD.decode(hash)) else {
        return false;
    };

    pbkdf2::verify(pbkdf2::PBKDF2_HMAC_SHA256, iterations, &salt, password.as_bytes(), &hash).is_ok()
}
