//! API handlers module

pub mod documents;
pub mod health;
pub mod ledger;
pub mod notifications;
pub mod routing;
pub mod workflow;
