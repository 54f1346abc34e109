//! Triage data models.

pub mod alert;
pub mod audit;
pub mod delivery;
pub mod failure;
pub mod metric;
pub mod payload;
pub mod rule;
pub mod user;
