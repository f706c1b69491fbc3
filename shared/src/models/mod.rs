//! Domain models for the branch inventory ledger

mod sale;
mod stock;
mod transfer;

pub use sale::*;
pub use stock::*;
pub use transfer::*;
