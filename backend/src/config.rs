use std::str::FromStr;
use std::time::Duration;

use ethers_core::types::Address;
use thiserror::Error;

use crate::ledger::chain::ChainSettings;
use crate::ledger::signer::KeyRingError;
use crate::ledger::{BackendKind, KeyRing, SignerPolicy};

const DEFAULT_ADMIN: &str = "admin";
const DEFAULT_ORIGIN: &str = "http://localhost";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
    #[error("invalid SIGNER_KEYS: {0}")]
    KeyRing(#[from] KeyRingError),
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "relational" | "sql" => Ok(Self::Postgres),
            "chain" | "blockchain" | "ethereum" => Ok(Self::Chain),
            "memory" => Ok(Self::Memory),
            other => Err(format!("unknown ledger backend '{}'", other)),
        }
    }
}

/// Service settings, read from the deployment's secret store.
#[derive(Debug)]
pub struct Settings {
    pub backend: BackendKind,
    pub admin_username: String,
    pub admin_password: Option<String>,
    pub allowed_origin: String,
    pub login_max_attempts: u32,
    pub login_window_minutes: i64,
    pub conflict_retries: u32,
    pub chain: Option<ChainSettings>,
    pub keyring: KeyRing,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            backend: BackendKind::Postgres,
            admin_username: DEFAULT_ADMIN.into(),
            admin_password: None,
            allowed_origin: DEFAULT_ORIGIN.into(),
            login_max_attempts: 5,
            login_window_minutes: 15,
            conflict_retries: 3,
            chain: None,
            keyring: KeyRing::default(),
        }
    }
}

impl Settings {
    pub fn from_secrets(secrets: &shuttle_runtime::SecretStore) -> Result<Self, ConfigError> {
        Self::from_lookup(|key| secrets.get(key))
    }

    /// Builds settings from any key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let backend = parse_or(&get, "LEDGER_BACKEND", defaults.backend)?;
        let admin_username = get("ADMIN_USERNAME")
            .map(|v| v.trim().to_owned())
            .unwrap_or(defaults.admin_username);
        let policy = parse_or(&get, "SIGNER_POLICY", SignerPolicy::default())?;
        let keyring = KeyRing::parse(&get("SIGNER_KEYS").unwrap_or_default(), admin_username.clone(), policy)?;

        let chain = match backend {
            BackendKind::Chain => Some(ChainSettings {
                rpc_url: get("CHAIN_RPC_URL").ok_or(ConfigError::Missing("CHAIN_RPC_URL"))?,
                contract: get("CONTRACT_ADDRESS")
                    .ok_or(ConfigError::Missing("CONTRACT_ADDRESS"))?
                    .trim()
                    .parse::<Address>()
                    .map_err(|e| ConfigError::Invalid { key: "CONTRACT_ADDRESS", reason: e.to_string() })?,
                chain_id: get("CHAIN_ID").map(|v| parse_value("CHAIN_ID", &v)).transpose()?,
                policy,
                receipt_timeout: Duration::from_secs(parse_or(&get, "RECEIPT_TIMEOUT_SECS", 60)?),
                confirmations: parse_or(&get, "CONFIRMATIONS", 1)?,
            }),
            _ => None,
        };

        if backend == BackendKind::Chain && keyring.address_of(&admin_username).is_none() {
            return Err(ConfigError::Invalid {
                key: "SIGNER_KEYS",
                reason: format!("no key for administrator '{}'", admin_username),
            });
        }

        Ok(Self {
            backend,
            admin_password: get("ADMIN_PASSWORD"),
            allowed_origin: get("ALLOWED_ORIGIN").unwrap_or(defaults.allowed_origin),
            login_max_attempts: parse_or(&get, "LOGIN_MAX_ATTEMPTS", defaults.login_max_attempts)?,
            login_window_minutes: parse_or(&get, "LOGIN_WINDOW_MINUTES", defaults.login_window_minutes)?,
            conflict_retries: parse_or(&get, "CONFLICT_RETRIES", defaults.conflict_retries)?,
            admin_username,
            chain,
            keyring,
        })
    }
}

fn parse_value<T>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: ToString,
{
    raw.trim().parse::<T>().map_err(|e| ConfigError::Invalid { key, reason: e.to_string() })
}

fn parse_or<T, G>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: ToString,
    G: Fn(&str) -> Option<String>,
{
    get(key).map_or(Ok(default), |raw| parse_value(key, &raw))
}
