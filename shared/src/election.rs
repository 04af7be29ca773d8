use serde::{Serialize, Deserialize};

use crate::error::LedgerError;

/// Lifecycle of the single election. `Declared` is terminal until a reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElectionState {
    #[default]
    Open,
    Declared,
}

impl ElectionState {
    pub fn from_declared(results_declared: bool) -> Self {
        if results_declared { Self::Declared } else { Self::Open }
    }

    pub fn is_declared(self) -> bool {
        self == Self::Declared
    }

    /// Gate for `AddCandidate` and `CastVote`.
    pub fn ensure_open(self) -> Result<(), LedgerError> {
        match self {
            Self::Open => Ok(()),
            Self::Declared => Err(LedgerError::ElectionClosed),
        }
    }

    pub fn declare(self) -> Result<Self, LedgerError> {
        match self {
            Self::Open => Ok(Self::Declared),
            Self::Declared => Err(LedgerError::AlreadyDeclared),
        }
    }

    pub fn reset(self) -> Self {
        Self::Open
    }
}
