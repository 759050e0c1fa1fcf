//! Request and response bodies

pub mod billing;
pub mod ledger;
pub mod payments;
