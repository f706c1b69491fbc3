//! Shared types and models for the branch inventory ledger
//!
//! This crate contains the domain types exchanged between the ledger backend
//! and the controller layer that calls into it.

pub mod models;
pub mod types;
pub mod validation;

pub use models::*;
pub use types::*;
pub use validation::*;
