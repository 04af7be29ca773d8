use serde::{Serialize, Deserialize};
use std::fmt;

use crate::tally::{self, Outcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CandidateId(pub u64);

impl fmt::Display for CandidateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for CandidateId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Opaque identity of a voter: an account id for the relational backend, a
/// wallet address for the chain backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VoterId(String);

impl VoterId {
    pub fn new(raw: impl Into<String>) -> Option<Self> {
        let raw = raw.into();
        let trimmed = raw.trim();
        (!trimmed.is_empty()).then(|| Self(trimmed.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VoterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub id: CandidateId,
    pub name: String,
    pub vote_count: u64,
}

impl Candidate {
    pub fn new(id: CandidateId, name: impl Into<String>) -> Self {
        Self { id, name: name.into(), vote_count: 0 }
    }
}

/// A consistent snapshot of the election.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Tally {
    pub candidates: Vec<Candidate>,
    pub results_declared: bool,
    /// Size of the voter record, when the backend can count it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recorded_voters: Option<u64>,
}

impl Tally {
    pub fn empty() -> Self {
        Self { candidates: Vec::new(), results_declared: false, recorded_voters: Some(0) }
    }

    pub fn total_votes(&self) -> u64 {
        self.candidates.iter().map(|c| c.vote_count).sum()
    }

    /// `None` while the election is open.
    pub fn outcome(&self) -> Option<Outcome> {
        self.results_declared.then(|| tally::determine_outcome(&self.candidates))
    }

    /// Checks that the counters and the voter record agree. Backends that
    /// cannot count their voter record always pass.
    pub fn is_consistent(&self) -> bool {
        self.recorded_voters.map_or(true, |voters| voters == self.total_votes())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Ack {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Registered {
    pub id: CandidateId,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CandidateEntry {
    pub id: CandidateId,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vote_count: Option<u64>,
}

/// Voter-facing results: counts stay hidden until the results are declared.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PublicResults {
    pub candidates: Vec<CandidateEntry>,
    pub total_votes: u64,
    pub results_declared: bool,
    pub user_has_voted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winner: Option<Outcome>,
}

impl PublicResults {
    pub fn from_tally(tally: &Tally, user_has_voted: bool) -> Self {
        let declared = tally.results_declared;
        let candidates = tally.candidates.iter()
            .map(|c| CandidateEntry {
                id: c.id,
                name: c.name.clone(),
                vote_count: declared.then_some(c.vote_count),
            })
            .collect();

        Self {
            candidates,
            total_votes: if declared { tally.total_votes() } else { 0 },
            results_declared: declared,
            user_has_voted,
            winner: tally.outcome(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AdminResults {
    pub candidates: Vec<Candidate>,
    pub total_votes: u64,
    pub results_declared: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winner: Option<Outcome>,
}

impl From<Tally> for AdminResults {
    fn from(tally: Tally) -> Self {
        let winner = tally.outcome();
        Self {
            total_votes: tally.total_votes(),
            results_declared: tally.results_declared,
            candidates: tally.candidates,
            winner,
        }
    }
}

/// A candidate id as clients send it: a JSON number or a numeric string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CandidateRef {
    Id(u64),
    Text(String),
}

impl From<CandidateId> for CandidateRef {
    fn from(id: CandidateId) -> Self {
        Self::Id(id.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteRequest {
    #[serde(default, alias = "candidateId")]
    pub candidate_id: Option<CandidateRef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddCandidateRequest {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionUser {
    pub id: String,
    pub username: String,
    pub is_admin: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub logged_in: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<SessionUser>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_voted: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MessageResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receipt: Option<String>,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into(), receipt: None }
    }

    pub fn with_receipt(message: impl Into<String>, receipt: Option<String>) -> Self {
        Self { message: message.into(), receipt }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub message: String,
    pub is_admin: bool,
}
