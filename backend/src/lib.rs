pub mod accounts;
pub mod app;
pub mod catchers;
pub mod config;
pub mod cors;
pub mod error;
pub mod ledger;
pub mod rate_limiter;
pub mod routes;
pub mod sessions;

pub use shared::{models::*, error::*};
