use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use ethers_core::types::transaction::eip2718::TypedTransaction;
use ethers_core::types::{Address, Signature};
use ethers_signers::{LocalWallet, Signer as _};
use shared::{LedgerError, VoterId};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignerPolicy {
    /// Each voter signs their own `vote` transaction.
    #[default]
    PerVoter,
    /// The administrator key submits `castVoteFor(voter, id)` for everyone.
    Shared,
}

impl FromStr for SignerPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "per-voter" | "per_voter" | "pervoter" => Ok(Self::PerVoter),
            "shared" => Ok(Self::Shared),
            other => Err(format!("unknown signer policy '{}'", other)),
        }
    }
}

/// Authority to sign exactly the transactions of one commit. Never cloned,
/// serialized or stored past the request that created it.
pub struct Signer {
    wallet: LocalWallet,
}

impl Signer {
    pub fn address(&self) -> Address {
        self.wallet.address()
    }

    pub fn sign(&self, tx: &TypedTransaction) -> Result<Signature, LedgerError> {
        self.wallet.sign_transaction_sync(tx)
            .map_err(|e| LedgerError::invalid(format!("could not sign transaction: {}", e)))
    }
}

impl fmt::Debug for Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signer").field("address", &self.address()).finish()
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyRingError {
    #[error("malformed key ring entry #{0}, expected user=hexkey")]
    MalformedEntry(usize),
    #[error("invalid private key for user '{0}'")]
    InvalidKey(String),
    #[error("duplicate key ring entry for user '{0}'")]
    Duplicate(String),
}

/// Private keys of the chain accounts, by username.
#[derive(Clone, Default)]
pub struct KeyRing {
    wallets: HashMap<String, LocalWallet>,
    admin: String,
    policy: SignerPolicy,
}

impl KeyRing {
    /// Parses `user=hexkey` entries separated by `;`, `,` or newlines.
    pub fn parse(keys: &str, admin: impl Into<String>, policy: SignerPolicy) -> Result<Self, KeyRingError> {
        let mut wallets = HashMap::new();

        let entries = keys.split([';', ',', '\n']).map(str::trim).filter(|e| !e.is_empty());
        for (position, entry) in entries.enumerate() {
            let (user, key) = entry.split_once('=')
                .map(|(u, k)| (u.trim(), k.trim()))
                .filter(|(u, k)| !u.is_empty() && !k.is_empty())
                .ok_or(KeyRingError::MalformedEntry(position + 1))?;

            let wallet = key.parse::<LocalWallet>()
                .map_err(|_| KeyRingError::InvalidKey(user.to_owned()))?;

            if wallets.insert(user.to_owned(), wallet).is_some() {
                return Err(KeyRingError::Duplicate(user.to_owned()));
            }
        }

        Ok(Self { wallets, admin: admin.into(), policy })
    }

    pub fn policy(&self) -> SignerPolicy {
        self.policy
    }

    pub fn len(&self) -> usize {
        self.wallets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wallets.is_empty()
    }

    pub fn address_of(&self, username: &str) -> Option<Address> {
        self.wallets.get(username).map(|w| w.address())
    }

    /// The chain identity of a user: the lowercase hex address of their key.
    pub fn voter_id(&self, username: &str) -> Option<VoterId> {
        self.address_of(username).and_then(|a| VoterId::new(format!("{:#x}", a)))
    }

    pub fn admin_signer(&self) -> Option<Signer> {
        self.signer(&self.admin)
    }

    /// Who signs a vote for `username` under the configured policy.
    pub fn vote_signer(&self, username: &str) -> Option<Signer> {
        match self.policy {
            SignerPolicy::PerVoter => self.signer(username),
            SignerPolicy::Shared => self.admin_signer(),
        }
    }

    fn signer(&self, username: &str) -> Option<Signer> {
        self.wallets.get(username).map(|wallet| Signer { wallet: wallet.clone() })
    }
}

impl fmt::Debug for KeyRing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut users: Vec<_> = self.wallets.keys().collect();
        users.sort();
        f.debug_struct("KeyRing")
            .field("users", &users)
            .field("admin", &self.admin)
            .field("policy", &self.policy)
            .finish()
    }
}
