pub mod election;
pub mod error;
pub mod models;
pub mod tally;
pub mod validation;

pub use election::ElectionState;
pub use error::{ErrorCode, ErrorResponse, LedgerError, Result};
pub use models::*;
pub use tally::{determine_outcome, Outcome, OutcomeKind};
pub use validation::*;

#[cfg(test)]
mod tests;
